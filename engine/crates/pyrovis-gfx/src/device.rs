use ash::vk;

use crate::{
    commands::{barrier::GfxImageBarrier, submit_info::GfxSubmitInfo},
    descriptors::{GfxDescriptorCopy, GfxDescriptorPoolDesc, GfxDescriptorSetLayoutDesc, GfxDescriptorWrite},
    error::GfxResult,
    interop::GfxInterop,
    pipeline::{GfxGraphicsPipelineDesc, GfxPipelineLayoutDesc, GfxRenderPassDesc},
    resources::{buffer::GfxBufferCreateInfo, image::GfxImageCreateInfo, image::GfxImageViewDesc},
    sampler::GfxSamplerDesc,
    swapchain::{GfxAcquireResult, GfxPresentResult, GfxSwapchainDesc},
};

/// GPU 设备的能力接口
///
/// 上层（资源注册表、render graph、帧驱动）只依赖这个 trait，
/// 因此可以在真实的 Vulkan 设备和 headless 记录设备之间切换。
///
/// 所有方法只需要 `&self`：设备内部的分配表使用内部可变性，整个引擎只在一个 CPU 线程上运行。
/// Vulkan 的 handle 类型（`vk::Buffer`、`vk::Image` 等）作为公共词汇在各层之间传递。
pub trait GfxDevice: GfxInterop {
    /// 等待设备空闲后释放设备本身，之后不能再使用任何由它创建的对象
    fn destroy(self: Box<Self>);

    // 设备信息
    fn device_name(&self) -> String;

    /// surface 当前的尺寸；窗口最小化时为 0
    fn surface_extent(&self) -> vk::Extent2D;

    /// 窗口系统通知的窗口尺寸，surface 不提供 current_extent 时使用
    fn set_window_extent(&self, extent: vk::Extent2D);

    fn wait_idle(&self) -> GfxResult<()>;

    // buffer
    fn create_buffer(&self, info: &GfxBufferCreateInfo) -> GfxResult<vk::Buffer>;
    fn destroy_buffer(&self, buffer: vk::Buffer);
    /// 写入 host visible 的 buffer，调用方负责越界检查
    fn write_buffer(&self, buffer: vk::Buffer, offset: vk::DeviceSize, data: &[u8]) -> GfxResult<()>;
    /// 读取 host visible 的 buffer，调用方负责越界检查
    fn read_buffer(&self, buffer: vk::Buffer, offset: vk::DeviceSize, out: &mut [u8]) -> GfxResult<()>;

    // image
    fn create_image(&self, info: &GfxImageCreateInfo) -> GfxResult<vk::Image>;
    fn destroy_image(&self, image: vk::Image);
    fn create_image_view(&self, desc: &GfxImageViewDesc) -> GfxResult<vk::ImageView>;
    fn destroy_image_view(&self, view: vk::ImageView);
    fn create_sampler(&self, desc: &GfxSamplerDesc) -> GfxResult<vk::Sampler>;
    fn destroy_sampler(&self, sampler: vk::Sampler);

    // 同步对象
    fn create_semaphore(&self, exportable: bool, name: &str) -> GfxResult<vk::Semaphore>;
    fn destroy_semaphore(&self, semaphore: vk::Semaphore);
    fn create_fence(&self, signaled: bool, name: &str) -> GfxResult<vk::Fence>;
    fn destroy_fence(&self, fence: vk::Fence);
    fn wait_fence(&self, fence: vk::Fence, timeout: u64) -> GfxResult<()>;
    fn reset_fence(&self, fence: vk::Fence) -> GfxResult<()>;

    // command buffer
    fn allocate_command_buffer(&self, name: &str) -> GfxResult<vk::CommandBuffer>;
    fn free_command_buffer(&self, cmd: vk::CommandBuffer);
    fn begin_command_buffer(&self, cmd: vk::CommandBuffer, one_time: bool) -> GfxResult<()>;
    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> GfxResult<()>;
    fn reset_command_buffer(&self, cmd: vk::CommandBuffer) -> GfxResult<()>;
    fn submit(&self, submit_info: &GfxSubmitInfo, fence: vk::Fence) -> GfxResult<()>;

    // 命令录制
    fn cmd_image_barriers(&self, cmd: vk::CommandBuffer, barriers: &[GfxImageBarrier]);
    fn cmd_clear_color_image(
        &self,
        cmd: vk::CommandBuffer,
        image: vk::Image,
        layout: vk::ImageLayout,
        color: vk::ClearColorValue,
        range: vk::ImageSubresourceRange,
    );
    fn cmd_clear_depth_image(
        &self,
        cmd: vk::CommandBuffer,
        image: vk::Image,
        layout: vk::ImageLayout,
        value: vk::ClearDepthStencilValue,
        range: vk::ImageSubresourceRange,
    );
    fn cmd_begin_render_pass(
        &self,
        cmd: vk::CommandBuffer,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
        clear_values: &[vk::ClearValue],
    );
    fn cmd_end_render_pass(&self, cmd: vk::CommandBuffer);
    fn cmd_bind_pipeline(&self, cmd: vk::CommandBuffer, pipeline: vk::Pipeline);
    fn cmd_bind_descriptor_sets(
        &self,
        cmd: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
    );
    fn cmd_push_constants(
        &self,
        cmd: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        offset: u32,
        data: &[u8],
    );
    fn cmd_bind_vertex_buffers(&self, cmd: vk::CommandBuffer, first_binding: u32, buffers: &[vk::Buffer]);
    fn cmd_bind_index_buffer(&self, cmd: vk::CommandBuffer, buffer: vk::Buffer, index_type: vk::IndexType);
    fn cmd_set_viewport_scissor(&self, cmd: vk::CommandBuffer, extent: vk::Extent2D);
    fn cmd_draw(&self, cmd: vk::CommandBuffer, vertex_count: u32, instance_count: u32);
    fn cmd_draw_indexed(&self, cmd: vk::CommandBuffer, index_count: u32, instance_count: u32);
    fn cmd_copy_buffer(&self, cmd: vk::CommandBuffer, src: vk::Buffer, dst: vk::Buffer, regions: &[vk::BufferCopy]);
    fn cmd_copy_image_to_buffer(
        &self,
        cmd: vk::CommandBuffer,
        image: vk::Image,
        layout: vk::ImageLayout,
        buffer: vk::Buffer,
        regions: &[vk::BufferImageCopy],
    );
    fn cmd_copy_buffer_to_image(
        &self,
        cmd: vk::CommandBuffer,
        buffer: vk::Buffer,
        image: vk::Image,
        layout: vk::ImageLayout,
        regions: &[vk::BufferImageCopy],
    );
    fn cmd_copy_image(
        &self,
        cmd: vk::CommandBuffer,
        src: vk::Image,
        src_layout: vk::ImageLayout,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::ImageCopy],
    );

    // descriptor
    fn create_descriptor_set_layout(&self, desc: &GfxDescriptorSetLayoutDesc) -> GfxResult<vk::DescriptorSetLayout>;
    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout);
    fn create_descriptor_pool(&self, desc: &GfxDescriptorPoolDesc) -> GfxResult<vk::DescriptorPool>;
    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool);
    /// 池子耗尽时返回 [`crate::error::GfxError::PoolExhausted`]
    fn allocate_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> GfxResult<vk::DescriptorSet>;
    /// pool 需要带有 FREE_DESCRIPTOR_SET 标记
    fn free_descriptor_set(&self, pool: vk::DescriptorPool, set: vk::DescriptorSet) -> GfxResult<()>;
    fn write_descriptors(&self, writes: &[GfxDescriptorWrite]);
    fn copy_descriptors(&self, copies: &[GfxDescriptorCopy]);

    // pipeline
    fn create_render_pass(&self, desc: &GfxRenderPassDesc) -> GfxResult<vk::RenderPass>;
    fn destroy_render_pass(&self, render_pass: vk::RenderPass);
    fn create_framebuffer(
        &self,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> GfxResult<vk::Framebuffer>;
    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer);
    fn create_pipeline_layout(&self, desc: &GfxPipelineLayoutDesc) -> GfxResult<vk::PipelineLayout>;
    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout);
    fn create_graphics_pipeline(&self, desc: &GfxGraphicsPipelineDesc) -> GfxResult<vk::Pipeline>;
    fn destroy_pipeline(&self, pipeline: vk::Pipeline);

    // swapchain
    /// 以当前 surface 尺寸创建 swapchain，`old` 不为 null 时会被替换并销毁
    fn create_swapchain(&self, old: vk::SwapchainKHR, vsync: bool) -> GfxResult<GfxSwapchainDesc>;
    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR);
    fn acquire_next_image(&self, swapchain: vk::SwapchainKHR, signal: vk::Semaphore) -> GfxResult<GfxAcquireResult>;
    fn present(&self, swapchain: vk::SwapchainKHR, image_index: u32, wait: vk::Semaphore)
    -> GfxResult<GfxPresentResult>;
}
