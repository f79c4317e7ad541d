use ash::vk;
use pyrovis_gfx::{
    commands::command_buffer::GfxCommandBuffer,
    device::GfxDevice,
    error::GfxResult,
    resources::{
        buffer::{GfxBuffer, GfxBufferCreateInfo},
        image::GfxImage,
        resource_id::ResourceId,
    },
};
use pyrovis_render_interface::{
    descriptor_manager::{DescriptorCategory, DescriptorHandle},
    error::DescriptorResult,
    render_context::RenderContext,
};

/// 场景拥有的 buffer 与 image，以及它们在注册表中的记录
///
/// 资源先放入存储再注册，注册失败时资源仍然会在 [`SceneStorage::destroy`] 中释放
#[derive(Default)]
pub struct SceneStorage {
    buffers: Vec<GfxBuffer>,
    images: Vec<GfxImage>,
    bindless: Vec<ResourceId>,
    parameters: Vec<ResourceId>,
}

// new & init
impl SceneStorage {
    pub fn add_buffer(&mut self, buffer: GfxBuffer) -> ResourceId {
        let id = buffer.id();
        self.buffers.push(buffer);
        id
    }

    pub fn register_buffer(
        &mut self,
        ctx: &mut RenderContext,
        buffer: GfxBuffer,
        category: DescriptorCategory,
    ) -> DescriptorResult<(ResourceId, DescriptorHandle)> {
        let id = self.add_buffer(buffer);
        let handle = ctx.descriptors.register_buffer(&*ctx.device, &self.buffers[self.buffers.len() - 1], category)?;
        self.bindless.push(id);
        Ok((id, handle))
    }

    pub fn register_image(
        &mut self,
        ctx: &mut RenderContext,
        image: GfxImage,
    ) -> DescriptorResult<(ResourceId, DescriptorHandle)> {
        let id = image.id();
        self.images.push(image);
        let handle = ctx.descriptors.register_image(
            &*ctx.device,
            &self.images[self.images.len() - 1],
            DescriptorCategory::CombinedImageSampler,
        )?;
        self.bindless.push(id);
        Ok((id, handle))
    }

    pub fn register_parameter(&mut self, ctx: &mut RenderContext, buffer: GfxBuffer) -> DescriptorResult<ResourceId> {
        let id = self.add_buffer(buffer);
        ctx.descriptors.register_parameter(&*ctx.device, &self.buffers[self.buffers.len() - 1])?;
        self.parameters.push(id);
        Ok(id)
    }
}

// getters
impl SceneStorage {
    pub fn buffer(&self, id: ResourceId) -> Option<&GfxBuffer> {
        self.buffers.iter().find(|buffer| buffer.id() == id)
    }

    #[inline]
    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    #[inline]
    pub fn image_count(&self) -> usize {
        self.images.len()
    }
}

// destroy
impl SceneStorage {
    /// 先注销，再释放
    pub fn destroy(self, ctx: &mut RenderContext) {
        let Self {
            buffers,
            images,
            bindless,
            parameters,
        } = self;

        for id in parameters {
            if let Err(e) = ctx.descriptors.remove_parameter(&*ctx.device, id) {
                log::error!("failed to remove scene parameter: {e}");
            }
        }
        for id in bindless {
            if let Err(e) = ctx.descriptors.remove_resource_registration(id) {
                log::error!("failed to remove scene resource registration: {e}");
            }
        }

        let device = &*ctx.device;
        buffers.into_iter().for_each(|buffer| buffer.destroy(device));
        images.into_iter().for_each(|image| image.destroy(device));
    }
}

/// 持久映射的 buffer，写入初始数据
pub fn new_host_buffer(
    device: &dyn GfxDevice,
    usage: vk::BufferUsageFlags,
    bytes: &[u8],
    name: &str,
) -> GfxResult<GfxBuffer> {
    let info = GfxBufferCreateInfo::new(bytes.len() as vk::DeviceSize, usage, name).mapped(true);
    new_buffer_with_data(device, &info, bytes)
}

/// device local 的 buffer，通过 stage buffer 写入初始数据
pub fn new_device_buffer(
    device: &dyn GfxDevice,
    usage: vk::BufferUsageFlags,
    bytes: &[u8],
    name: &str,
) -> GfxResult<GfxBuffer> {
    let size = bytes.len() as vk::DeviceSize;
    let info = GfxBufferCreateInfo::new(size, usage | vk::BufferUsageFlags::TRANSFER_DST, name);
    new_buffer_with_data(device, &info, bytes)
}

pub fn new_buffer_with_data(device: &dyn GfxDevice, info: &GfxBufferCreateInfo, bytes: &[u8]) -> GfxResult<GfxBuffer> {
    let buffer = GfxBuffer::new(device, info)?;
    if let Err(e) = buffer.update(device, bytes, 0) {
        buffer.destroy(device);
        return Err(e);
    }
    Ok(buffer)
}

/// 把像素写入 image，结束后 image 处于 SHADER_READ_ONLY_OPTIMAL
pub fn upload_image(device: &dyn GfxDevice, image: &mut GfxImage, bytes: &[u8]) -> GfxResult<()> {
    let name = image.debug_name().to_string();
    let stage = GfxBuffer::new_stage_buffer(device, bytes.len() as vk::DeviceSize, format!("{name}-stage"))?;
    let result = stage.update(device, bytes, 0).and_then(|_| {
        GfxCommandBuffer::one_time_exec(device, &name, |encoder| {
            image.transition_layout(encoder, vk::ImageLayout::TRANSFER_DST_OPTIMAL)?;
            stage.copy_to_image(encoder, image)?;
            image.transition_layout(encoder, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
        })
    });
    stage.destroy(device);
    result
}
