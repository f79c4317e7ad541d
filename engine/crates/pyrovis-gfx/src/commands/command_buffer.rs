use ash::vk;

use crate::{
    commands::{barrier::GfxImageBarrier, fence::GfxFence, submit_info::GfxSubmitInfo},
    device::GfxDevice,
    error::GfxResult,
};

/// command buffer 的句柄
///
/// 本身只保存 handle，录制时通过 [`GfxCommandBuffer::begin`] 得到绑定了设备的 [`GfxCommandEncoder`]
#[derive(Debug, Clone)]
pub struct GfxCommandBuffer {
    handle: vk::CommandBuffer,
    debug_name: String,
}

// new & init
impl GfxCommandBuffer {
    pub fn new(device: &dyn GfxDevice, debug_name: &str) -> GfxResult<Self> {
        let handle = device.allocate_command_buffer(debug_name)?;
        Ok(Self {
            handle,
            debug_name: debug_name.to_string(),
        })
    }
}

// destroy
impl GfxCommandBuffer {
    #[inline]
    pub fn free(self, device: &dyn GfxDevice) {
        device.free_command_buffer(self.handle);
    }
}

// getters
impl GfxCommandBuffer {
    #[inline]
    pub fn vk_handle(&self) -> vk::CommandBuffer {
        self.handle
    }

    #[inline]
    pub fn debug_name(&self) -> &str {
        &self.debug_name
    }
}

// tools
impl GfxCommandBuffer {
    #[inline]
    pub fn reset(&self, device: &dyn GfxDevice) -> GfxResult<()> {
        device.reset_command_buffer(self.handle)
    }

    /// 开始录制，返回的 encoder 在 [`GfxCommandEncoder::end`] 时结束录制
    pub fn begin<'a>(&self, device: &'a dyn GfxDevice, one_time: bool) -> GfxResult<GfxCommandEncoder<'a>> {
        device.begin_command_buffer(self.handle, one_time)?;
        Ok(GfxCommandEncoder {
            device,
            handle: self.handle,
        })
    }

    /// 立即执行一次命令，并阻塞等待执行完成
    ///
    /// 临时的 command buffer 和 fence 在返回前被释放
    pub fn one_time_exec<R>(
        device: &dyn GfxDevice,
        name: &str,
        func: impl FnOnce(&GfxCommandEncoder) -> GfxResult<R>,
    ) -> GfxResult<R> {
        let cmd = Self::new(device, &format!("one-time-{name}"))?;
        let fence = GfxFence::new(device, false, &format!("one-time-{name}"))?;

        let result = (|| -> GfxResult<R> {
            let encoder = cmd.begin(device, true)?;
            let ret = func(&encoder)?;
            encoder.end()?;

            device.submit(&GfxSubmitInfo::new(&[&cmd]), fence.handle())?;
            fence.wait(device)?;
            Ok(ret)
        })();

        fence.destroy(device);
        cmd.free(device);
        result
    }
}

/// 处于录制状态的 command buffer
pub struct GfxCommandEncoder<'a> {
    device: &'a dyn GfxDevice,
    handle: vk::CommandBuffer,
}

// getters
impl<'a> GfxCommandEncoder<'a> {
    #[inline]
    pub fn device(&self) -> &'a dyn GfxDevice {
        self.device
    }

    #[inline]
    pub fn vk_handle(&self) -> vk::CommandBuffer {
        self.handle
    }
}

// end
impl GfxCommandEncoder<'_> {
    #[inline]
    pub fn end(self) -> GfxResult<()> {
        self.device.end_command_buffer(self.handle)
    }
}

// 各种命令
impl GfxCommandEncoder<'_> {
    #[inline]
    pub fn image_memory_barrier(&self, barriers: &[GfxImageBarrier]) {
        self.device.cmd_image_barriers(self.handle, barriers);
    }

    #[inline]
    pub fn clear_color_image(
        &self,
        image: vk::Image,
        layout: vk::ImageLayout,
        color: vk::ClearColorValue,
        range: vk::ImageSubresourceRange,
    ) {
        self.device.cmd_clear_color_image(self.handle, image, layout, color, range);
    }

    #[inline]
    pub fn clear_depth_image(
        &self,
        image: vk::Image,
        layout: vk::ImageLayout,
        value: vk::ClearDepthStencilValue,
        range: vk::ImageSubresourceRange,
    ) {
        self.device.cmd_clear_depth_image(self.handle, image, layout, value, range);
    }

    #[inline]
    pub fn begin_render_pass(
        &self,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
        clear_values: &[vk::ClearValue],
    ) {
        self.device.cmd_begin_render_pass(self.handle, render_pass, framebuffer, extent, clear_values);
    }

    #[inline]
    pub fn end_render_pass(&self) {
        self.device.cmd_end_render_pass(self.handle);
    }

    #[inline]
    pub fn bind_pipeline(&self, pipeline: vk::Pipeline) {
        self.device.cmd_bind_pipeline(self.handle, pipeline);
    }

    #[inline]
    pub fn bind_descriptor_sets(&self, layout: vk::PipelineLayout, first_set: u32, sets: &[vk::DescriptorSet]) {
        self.device.cmd_bind_descriptor_sets(self.handle, layout, first_set, sets);
    }

    #[inline]
    pub fn push_constants<T: bytemuck::Pod>(
        &self,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        offset: u32,
        data: &T,
    ) {
        self.device.cmd_push_constants(self.handle, layout, stages, offset, bytemuck::bytes_of(data));
    }

    #[inline]
    pub fn bind_vertex_buffers(&self, first_binding: u32, buffers: &[vk::Buffer]) {
        self.device.cmd_bind_vertex_buffers(self.handle, first_binding, buffers);
    }

    #[inline]
    pub fn bind_index_buffer(&self, buffer: vk::Buffer, index_type: vk::IndexType) {
        self.device.cmd_bind_index_buffer(self.handle, buffer, index_type);
    }

    #[inline]
    pub fn set_viewport_scissor(&self, extent: vk::Extent2D) {
        self.device.cmd_set_viewport_scissor(self.handle, extent);
    }

    #[inline]
    pub fn draw(&self, vertex_count: u32, instance_count: u32) {
        self.device.cmd_draw(self.handle, vertex_count, instance_count);
    }

    #[inline]
    pub fn draw_indexed(&self, index_count: u32, instance_count: u32) {
        self.device.cmd_draw_indexed(self.handle, index_count, instance_count);
    }

    #[inline]
    pub fn copy_buffer(&self, src: vk::Buffer, dst: vk::Buffer, regions: &[vk::BufferCopy]) {
        self.device.cmd_copy_buffer(self.handle, src, dst, regions);
    }

    #[inline]
    pub fn copy_image_to_buffer(
        &self,
        image: vk::Image,
        layout: vk::ImageLayout,
        buffer: vk::Buffer,
        regions: &[vk::BufferImageCopy],
    ) {
        self.device.cmd_copy_image_to_buffer(self.handle, image, layout, buffer, regions);
    }

    #[inline]
    pub fn copy_buffer_to_image(
        &self,
        buffer: vk::Buffer,
        image: vk::Image,
        layout: vk::ImageLayout,
        regions: &[vk::BufferImageCopy],
    ) {
        self.device.cmd_copy_buffer_to_image(self.handle, buffer, image, layout, regions);
    }

    #[inline]
    pub fn copy_image(
        &self,
        src: vk::Image,
        src_layout: vk::ImageLayout,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::ImageCopy],
    ) {
        self.device.cmd_copy_image(self.handle, src, src_layout, dst, dst_layout, regions);
    }
}
