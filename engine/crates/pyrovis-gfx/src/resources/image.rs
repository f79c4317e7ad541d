use ash::vk;

use crate::{
    commands::{
        barrier::GfxImageBarrier,
        command_buffer::{GfxCommandBuffer, GfxCommandEncoder},
    },
    device::GfxDevice,
    error::{GfxError, GfxResult},
    interop::ExternalHandle,
    resources::{buffer::GfxBuffer, format::VulkanFormatUtils, resource_id::ResourceId},
    sampler::GfxSamplerDesc,
};

/// 创建 2D image 所需的参数
#[derive(Debug, Clone)]
pub struct GfxImageCreateInfo {
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
    pub tiling: vk::ImageTiling,
    /// 使用可导出的 memory，供其他 API 导入
    pub external: bool,
    pub name: String,
}

impl GfxImageCreateInfo {
    #[inline]
    pub fn new_image_2d_info(
        extent: vk::Extent2D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        name: impl AsRef<str>,
    ) -> Self {
        Self {
            extent,
            format,
            usage,
            tiling: vk::ImageTiling::OPTIMAL,
            external: false,
            name: name.as_ref().to_string(),
        }
    }

    // builder
    #[inline]
    pub fn external(mut self, external: bool) -> Self {
        self.external = external;
        self
    }
}

/// 创建 image view 所需的参数
#[derive(Debug, Clone)]
pub struct GfxImageViewDesc {
    pub image: vk::Image,
    pub format: vk::Format,
    pub aspect: vk::ImageAspectFlags,
    pub name: String,
}

/// Image 来源枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSource {
    /// 由设备分配的 Image
    Allocated,
    /// 外部 Image（例如 Swapchain Image），不管理其内存生命周期
    External,
}

/// 带有身份、view、可选 sampler 以及当前 layout 记录的 2D image
///
/// layout 只在通过 [`GfxImage::transition_layout`] 转换时更新，
/// 因此外部直接录制的 barrier 需要调用 [`GfxImage::assume_layout`] 同步记录
pub struct GfxImage {
    id: ResourceId,
    source: ImageSource,

    handle: vk::Image,
    view: vk::ImageView,
    sampler: Option<(vk::Sampler, GfxSamplerDesc)>,

    extent: vk::Extent2D,
    format: vk::Format,
    usage: vk::ImageUsageFlags,
    aspect: vk::ImageAspectFlags,
    layout: vk::ImageLayout,

    create_info: Option<GfxImageCreateInfo>,
    debug_name: String,
}

// new & init
impl GfxImage {
    pub fn new(device: &dyn GfxDevice, info: &GfxImageCreateInfo) -> GfxResult<Self> {
        let aspect = VulkanFormatUtils::aspect_of(info.format);
        let handle = device.create_image(info)?;
        let view = match device.create_image_view(&GfxImageViewDesc {
            image: handle,
            format: info.format,
            aspect: Self::view_aspect(aspect),
            name: info.name.clone(),
        }) {
            Ok(view) => view,
            Err(e) => {
                device.destroy_image(handle);
                return Err(e);
            }
        };

        Ok(Self {
            id: ResourceId::new(),
            source: ImageSource::Allocated,
            handle,
            view,
            sampler: None,
            extent: info.extent,
            format: info.format,
            usage: info.usage,
            aspect,
            layout: vk::ImageLayout::UNDEFINED,
            create_info: Some(info.clone()),
            debug_name: info.name.clone(),
        })
    }

    /// 包装一个不由自身分配的 image，例如 swapchain image
    pub fn from_external(
        device: &dyn GfxDevice,
        handle: vk::Image,
        format: vk::Format,
        extent: vk::Extent2D,
        usage: vk::ImageUsageFlags,
        name: impl AsRef<str>,
    ) -> GfxResult<Self> {
        let aspect = VulkanFormatUtils::aspect_of(format);
        let view = device.create_image_view(&GfxImageViewDesc {
            image: handle,
            format,
            aspect: Self::view_aspect(aspect),
            name: name.as_ref().to_string(),
        })?;

        Ok(Self {
            id: ResourceId::new(),
            source: ImageSource::External,
            handle,
            view,
            sampler: None,
            extent,
            format,
            usage,
            aspect,
            layout: vk::ImageLayout::UNDEFINED,
            create_info: None,
            debug_name: name.as_ref().to_string(),
        })
    }

    /// 为 image 添加 sampler，已有的 sampler 会被替换
    pub fn add_sampler(&mut self, device: &dyn GfxDevice, desc: &GfxSamplerDesc) -> GfxResult<()> {
        let sampler = device.create_sampler(desc)?;
        if let Some((old, _)) = self.sampler.replace((sampler, desc.clone())) {
            device.destroy_sampler(old);
        }
        Ok(())
    }

    /// 以新的尺寸原地重建 image
    ///
    /// 身份、格式、用途以及 sampler 配置保持不变，layout 回到 UNDEFINED。
    /// 新 image 创建失败时旧 image 保持原样。
    pub fn recreate(&mut self, device: &dyn GfxDevice, extent: vk::Extent2D) -> GfxResult<()> {
        let Some(mut info) = self.create_info.clone() else {
            return Err(GfxError::Unsupported(format!("external image `{}` can not be recreated", self.debug_name)));
        };
        info.extent = extent;

        let mut fresh = Self::new(device, &info)?;
        fresh.id = self.id;
        if let Some((_, desc)) = self.sampler.as_ref() {
            if let Err(e) = fresh.add_sampler(device, desc) {
                fresh.destroy(device);
                return Err(e);
            }
        }

        self.destroy_mut(device);
        *self = fresh;
        Ok(())
    }

    fn view_aspect(aspect: vk::ImageAspectFlags) -> vk::ImageAspectFlags {
        // 用于采样的 view 只能包含一个 aspect
        if aspect.contains(vk::ImageAspectFlags::DEPTH) { vk::ImageAspectFlags::DEPTH } else { aspect }
    }
}

// destroy
impl GfxImage {
    pub fn destroy(mut self, device: &dyn GfxDevice) {
        self.destroy_mut(device);
    }

    fn destroy_mut(&mut self, device: &dyn GfxDevice) {
        if let Some((sampler, _)) = self.sampler.take() {
            device.destroy_sampler(sampler);
        }
        if self.view != vk::ImageView::null() {
            device.destroy_image_view(self.view);
            self.view = vk::ImageView::null();
        }
        if self.source == ImageSource::Allocated && self.handle != vk::Image::null() {
            device.destroy_image(self.handle);
        }
        self.handle = vk::Image::null();
    }
}

// getters
impl GfxImage {
    #[inline]
    pub fn id(&self) -> ResourceId {
        self.id
    }

    #[inline]
    pub fn source(&self) -> ImageSource {
        self.source
    }

    #[inline]
    pub fn vk_image(&self) -> vk::Image {
        self.handle
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    #[inline]
    pub fn sampler(&self) -> Option<vk::Sampler> {
        self.sampler.as_ref().map(|(sampler, _)| *sampler)
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn usage(&self) -> vk::ImageUsageFlags {
        self.usage
    }

    #[inline]
    pub fn aspect(&self) -> vk::ImageAspectFlags {
        self.aspect
    }

    #[inline]
    pub fn layout(&self) -> vk::ImageLayout {
        self.layout
    }

    #[inline]
    pub fn debug_name(&self) -> &str {
        &self.debug_name
    }

    #[inline]
    pub fn is_external_memory(&self) -> bool {
        self.create_info.as_ref().is_some_and(|info| info.external)
    }

    /// 整张 image 的字节数
    pub fn byte_size(&self) -> GfxResult<vk::DeviceSize> {
        let element = VulkanFormatUtils::pixel_size_in_bytes(self.format)? as vk::DeviceSize;
        Ok(self.extent.width as vk::DeviceSize * self.extent.height as vk::DeviceSize * element)
    }

    #[inline]
    pub fn subresource_range(&self) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            aspect_mask: self.aspect,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        }
    }

    /// 覆盖整张 image 的 buffer-image 拷贝区域，buffer 紧密排列
    pub fn full_copy_region(&self) -> vk::BufferImageCopy {
        vk::BufferImageCopy {
            buffer_offset: 0,
            buffer_row_length: 0,
            buffer_image_height: 0,
            image_subresource: vk::ImageSubresourceLayers {
                aspect_mask: Self::view_aspect(self.aspect),
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            },
            image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
            image_extent: vk::Extent3D {
                width: self.extent.width,
                height: self.extent.height,
                depth: 1,
            },
        }
    }
}

// tools
impl GfxImage {
    /// 录制一个 layout 转换 barrier，并更新记录的 layout
    pub fn transition_layout(&mut self, encoder: &GfxCommandEncoder, new_layout: vk::ImageLayout) -> GfxResult<()> {
        let barrier = GfxImageBarrier::layout_transition(self.handle, self.layout, new_layout, self.aspect)?;
        encoder.image_memory_barrier(std::slice::from_ref(&barrier));
        self.layout = new_layout;
        Ok(())
    }

    /// 立即执行一次 layout 转换，并阻塞等待完成
    pub fn transition_layout_now(&mut self, device: &dyn GfxDevice, new_layout: vk::ImageLayout) -> GfxResult<()> {
        let name = format!("{}-transition", self.debug_name);
        GfxCommandBuffer::one_time_exec(device, &name, |encoder| self.transition_layout(encoder, new_layout))
    }

    /// 外部（例如 render pass 的 final layout）改变了 layout 时，同步记录
    #[inline]
    pub fn assume_layout(&mut self, layout: vk::ImageLayout) {
        self.layout = layout;
    }

    /// 记录 image 到 buffer 的拷贝，buffer 不足以容纳整张 image 时返回错误
    pub fn copy_to_buffer(&self, encoder: &GfxCommandEncoder, buffer: &GfxBuffer) -> GfxResult<()> {
        let needed = self.byte_size()?;
        if needed > buffer.size() {
            return Err(GfxError::OutOfRange(format!(
                "copy image `{}` ({} bytes) to buffer `{}` ({} bytes)",
                self.debug_name,
                needed,
                buffer.debug_name(),
                buffer.size()
            )));
        }

        encoder.copy_image_to_buffer(self.handle, self.layout, buffer.vk_buffer(), &[self.full_copy_region()]);
        Ok(())
    }

    /// 记录 image 到 image 的拷贝，目标 image 的尺寸必须能容纳源 image
    pub fn copy_to_image(&self, encoder: &GfxCommandEncoder, dst: &GfxImage) -> GfxResult<()> {
        if self.extent.width > dst.extent.width || self.extent.height > dst.extent.height {
            return Err(GfxError::OutOfRange(format!(
                "copy image `{}` ({}x{}) to image `{}` ({}x{})",
                self.debug_name,
                self.extent.width,
                self.extent.height,
                dst.debug_name,
                dst.extent.width,
                dst.extent.height
            )));
        }

        let subresource = |aspect| vk::ImageSubresourceLayers {
            aspect_mask: Self::view_aspect(aspect),
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
        };
        let region = vk::ImageCopy {
            src_subresource: subresource(self.aspect),
            src_offset: vk::Offset3D::default(),
            dst_subresource: subresource(dst.aspect),
            dst_offset: vk::Offset3D::default(),
            extent: vk::Extent3D {
                width: self.extent.width,
                height: self.extent.height,
                depth: 1,
            },
        };
        encoder.copy_image(self.handle, self.layout, dst.handle, dst.layout, &[region]);
        Ok(())
    }

    /// 导出 memory 句柄，只对 external image 有效
    pub fn export(&self, device: &dyn GfxDevice) -> GfxResult<ExternalHandle> {
        if !self.is_external_memory() {
            return Err(GfxError::Unsupported(format!("image `{}` is not exportable", self.debug_name)));
        }
        device.export_image_memory(self.handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::{GfxCall, HeadlessDevice};

    fn color_info(width: u32, height: u32) -> GfxImageCreateInfo {
        GfxImageCreateInfo::new_image_2d_info(
            vk::Extent2D { width, height },
            vk::Format::R32G32B32A32_SFLOAT,
            vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
            "color",
        )
    }

    #[test]
    fn recreate_keeps_identity_and_sampler() {
        let device = HeadlessDevice::new();
        let mut image = GfxImage::new(&device, &color_info(800, 600)).unwrap();
        image.add_sampler(&device, &GfxSamplerDesc::default()).unwrap();
        image.transition_layout_now(&device, vk::ImageLayout::GENERAL).unwrap();

        let id = image.id();
        let old_handle = image.vk_image();
        image.recreate(&device, vk::Extent2D { width: 1920, height: 1080 }).unwrap();

        assert_eq!(image.id(), id);
        assert_ne!(image.vk_image(), old_handle);
        assert_eq!(image.extent(), vk::Extent2D { width: 1920, height: 1080 });
        assert_eq!(image.layout(), vk::ImageLayout::UNDEFINED);
        assert!(image.sampler().is_some());
        assert!(device.calls().contains(&GfxCall::DestroyImage { image: old_handle }));
    }

    #[test]
    fn failed_recreate_keeps_old_image() {
        let device = HeadlessDevice::new();
        let mut image = GfxImage::new(&device, &color_info(800, 600)).unwrap();
        image.add_sampler(&device, &GfxSamplerDesc::default()).unwrap();
        let old_handle = image.vk_image();
        let old_sampler = image.sampler();

        device.fail_next_sampler();
        assert!(image.recreate(&device, vk::Extent2D { width: 1920, height: 1080 }).is_err());
        assert_eq!(device.live_image_count(), 1);
        assert_eq!(image.vk_image(), old_handle);
        assert_eq!(image.sampler(), old_sampler);
        assert_eq!(image.extent(), vk::Extent2D { width: 800, height: 600 });

        image.recreate(&device, vk::Extent2D { width: 1920, height: 1080 }).unwrap();
        assert_eq!(device.live_image_count(), 1);
        image.destroy(&device);
        assert_eq!(device.live_image_count(), 0);
    }

    #[test]
    fn transition_tracks_layout() {
        let device = HeadlessDevice::new();
        let mut image = GfxImage::new(&device, &color_info(4, 4)).unwrap();
        let cmd = GfxCommandBuffer::new(&device, "t").unwrap();
        let encoder = cmd.begin(&device, false).unwrap();

        image.transition_layout(&encoder, vk::ImageLayout::TRANSFER_DST_OPTIMAL).unwrap();
        image.transition_layout(&encoder, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL).unwrap();
        encoder.end().unwrap();

        let barriers = device.recorded_barriers();
        assert_eq!(barriers.len(), 2);
        assert_eq!(barriers[1].old_layout(), vk::ImageLayout::TRANSFER_DST_OPTIMAL);
        assert_eq!(image.layout(), vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    }

    #[test]
    fn copy_guards() {
        let device = HeadlessDevice::new();
        let small = GfxImage::new(&device, &color_info(4, 4)).unwrap();
        let large = GfxImage::new(&device, &color_info(8, 8)).unwrap();
        // 4x4x16 = 256 bytes
        let short_buffer = GfxBuffer::new_readback_buffer(&device, 255, "short").unwrap();
        let fit_buffer = GfxBuffer::new_readback_buffer(&device, 256, "fit").unwrap();

        let cmd = GfxCommandBuffer::new(&device, "c").unwrap();
        let encoder = cmd.begin(&device, false).unwrap();
        assert!(small.copy_to_buffer(&encoder, &short_buffer).is_err());
        assert!(small.copy_to_buffer(&encoder, &fit_buffer).is_ok());
        assert!(large.copy_to_image(&encoder, &small).is_err());
        assert!(small.copy_to_image(&encoder, &large).is_ok());
        assert!(fit_buffer.copy_to_image(&encoder, &small).is_ok());
        assert!(short_buffer.copy_to_image(&encoder, &small).is_err());
        encoder.end().unwrap();
    }

    #[test]
    fn depth_image_aspect() {
        let device = HeadlessDevice::new();
        let image = GfxImage::new(
            &device,
            &GfxImageCreateInfo::new_image_2d_info(
                vk::Extent2D { width: 2, height: 2 },
                vk::Format::D32_SFLOAT,
                vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
                "depth",
            ),
        )
        .unwrap();
        assert_eq!(image.aspect(), vk::ImageAspectFlags::DEPTH);
    }
}
