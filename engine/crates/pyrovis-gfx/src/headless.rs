//! 不依赖 GPU 的记录型设备
//!
//! - handle 由递增计数器伪造
//! - 所有录制的命令以 [`GfxCall`] 的形式保存，供测试断言
//! - buffer 的内容保存在内存中，拷贝命令在录制时立即生效
//! - descriptor pool 会检查容量，耗尽时返回 [`GfxError::PoolExhausted`]
//! - acquire / present 的结果可以预先编排
//! - clone 出来的设备共享同一份状态，测试可以在设备交给上层之后继续观察它

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::ops::Deref;
use std::rc::Rc;

use ash::vk;
use ash::vk::Handle;

use crate::{
    commands::{barrier::GfxImageBarrier, submit_info::GfxSubmitInfo},
    descriptors::{
        GfxDescriptorCopy, GfxDescriptorInfo, GfxDescriptorPoolDesc, GfxDescriptorSetLayoutDesc, GfxDescriptorWrite,
    },
    device::GfxDevice,
    error::{GfxError, GfxResult},
    interop::{ExternalHandle, GfxInterop, RawExternalHandle},
    pipeline::{GfxGraphicsPipelineDesc, GfxPipelineLayoutDesc, GfxRenderPassDesc},
    resources::{buffer::GfxBufferCreateInfo, image::GfxImageCreateInfo, image::GfxImageViewDesc},
    sampler::GfxSamplerDesc,
    swapchain::{GfxAcquireResult, GfxPresentResult, GfxSwapchainDesc},
};

/// headless 设备记录下来的调用
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GfxCall {
    CreateBuffer { buffer: vk::Buffer, size: vk::DeviceSize },
    DestroyBuffer { buffer: vk::Buffer },
    CreateImage { image: vk::Image, extent: vk::Extent2D, format: vk::Format },
    DestroyImage { image: vk::Image },
    CreateSemaphore { semaphore: vk::Semaphore, exportable: bool },
    WaitFence { fence: vk::Fence },
    ResetFence { fence: vk::Fence },
    WaitIdle,

    BeginCommandBuffer { cmd: vk::CommandBuffer },
    EndCommandBuffer { cmd: vk::CommandBuffer },
    ResetCommandBuffer { cmd: vk::CommandBuffer },
    Submit { info: GfxSubmitInfo, fence: vk::Fence },

    Barrier { image: vk::Image, old_layout: vk::ImageLayout, new_layout: vk::ImageLayout },
    ClearColor { image: vk::Image, layout: vk::ImageLayout },
    ClearDepth { image: vk::Image, layout: vk::ImageLayout },
    BeginRenderPass { render_pass: vk::RenderPass, framebuffer: vk::Framebuffer, extent: vk::Extent2D },
    EndRenderPass,
    BindPipeline { pipeline: vk::Pipeline },
    BindDescriptorSets { first_set: u32, sets: Vec<vk::DescriptorSet> },
    PushConstants { size: usize },
    BindVertexBuffers { buffers: Vec<vk::Buffer> },
    BindIndexBuffer { buffer: vk::Buffer },
    SetViewportScissor { extent: vk::Extent2D },
    Draw { vertex_count: u32, instance_count: u32 },
    DrawIndexed { index_count: u32, instance_count: u32 },
    CopyBuffer { src: vk::Buffer, dst: vk::Buffer, size: vk::DeviceSize },
    CopyImageToBuffer { image: vk::Image, layout: vk::ImageLayout, buffer: vk::Buffer },
    CopyBufferToImage { buffer: vk::Buffer, image: vk::Image },
    CopyImage { src: vk::Image, dst: vk::Image },

    CreateDescriptorPool { pool: vk::DescriptorPool, max_sets: u32 },
    DestroyDescriptorPool { pool: vk::DescriptorPool },
    CopyDescriptors { count: usize },

    CreateRenderPass { render_pass: vk::RenderPass, attachment_count: usize },
    CreateFramebuffer { framebuffer: vk::Framebuffer, extent: vk::Extent2D },
    DestroyFramebuffer { framebuffer: vk::Framebuffer },

    CreateSwapchain { swapchain: vk::SwapchainKHR, extent: vk::Extent2D },
    DestroySwapchain { swapchain: vk::SwapchainKHR },
    Acquire { result: GfxAcquireResult },
    Present { image_index: u32, wait: vk::Semaphore },

    ExportSemaphore { semaphore: vk::Semaphore },
    ExportMemory { raw: u64 },
}

struct HeadlessPool {
    max_sets: u32,
    sets: Vec<vk::DescriptorSet>,
}

pub struct HeadlessState {
    next_raw: Cell<u64>,

    calls: RefCell<Vec<GfxCall>>,
    barriers: RefCell<Vec<GfxImageBarrier>>,

    buffers: RefCell<HashMap<vk::Buffer, (Vec<u8>, GfxBufferCreateInfo)>>,
    images: RefCell<HashMap<vk::Image, GfxImageCreateInfo>>,
    semaphores: RefCell<HashMap<vk::Semaphore, bool>>,
    pools: RefCell<HashMap<vk::DescriptorPool, HeadlessPool>>,
    descriptors: RefCell<HashMap<(vk::DescriptorSet, u32, u32), GfxDescriptorInfo>>,
    swapchains: RefCell<HashMap<vk::SwapchainKHR, Vec<vk::Image>>>,

    window_extent: Cell<vk::Extent2D>,
    swapchain_image_count: u32,
    next_image_index: Cell<u32>,
    acquire_script: RefCell<VecDeque<GfxAcquireResult>>,
    present_script: RefCell<VecDeque<GfxPresentResult>>,
    fail_next_sampler: Cell<bool>,
    destroyed: Cell<bool>,
}

#[derive(Clone)]
pub struct HeadlessDevice {
    state: Rc<HeadlessState>,
}

impl Deref for HeadlessDevice {
    type Target = HeadlessState;

    fn deref(&self) -> &Self::Target {
        &self.state
    }
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new()
    }
}

// new & init
impl HeadlessDevice {
    pub fn new() -> Self {
        let state = HeadlessState {
            next_raw: Cell::new(0x1000),
            calls: RefCell::new(vec![]),
            barriers: RefCell::new(vec![]),
            buffers: RefCell::new(HashMap::new()),
            images: RefCell::new(HashMap::new()),
            semaphores: RefCell::new(HashMap::new()),
            pools: RefCell::new(HashMap::new()),
            descriptors: RefCell::new(HashMap::new()),
            swapchains: RefCell::new(HashMap::new()),
            window_extent: Cell::new(vk::Extent2D { width: 800, height: 600 }),
            swapchain_image_count: 3,
            next_image_index: Cell::new(0),
            acquire_script: RefCell::new(VecDeque::new()),
            present_script: RefCell::new(VecDeque::new()),
            fail_next_sampler: Cell::new(false),
            destroyed: Cell::new(false),
        };
        Self { state: Rc::new(state) }
    }

    fn fabricate<H: Handle>(&self) -> H {
        let raw = self.next_raw.get();
        self.next_raw.set(raw + 1);
        H::from_raw(raw)
    }

    fn record(&self, call: GfxCall) {
        self.calls.borrow_mut().push(call);
    }
}

// 测试用的查询与编排
impl HeadlessDevice {
    pub fn calls(&self) -> Vec<GfxCall> {
        self.calls.borrow().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
        self.barriers.borrow_mut().clear();
    }

    pub fn recorded_barriers(&self) -> Vec<GfxImageBarrier> {
        self.barriers.borrow().clone()
    }

    pub fn buffer_bytes(&self, buffer: vk::Buffer) -> Option<Vec<u8>> {
        self.buffers.borrow().get(&buffer).map(|(data, _)| data.clone())
    }

    pub fn live_buffer_count(&self) -> usize {
        self.buffers.borrow().len()
    }

    pub fn live_image_count(&self) -> usize {
        self.images.borrow().len()
    }

    pub fn is_live_pool(&self, pool: vk::DescriptorPool) -> bool {
        self.pools.borrow().contains_key(&pool)
    }

    pub fn descriptor(&self, set: vk::DescriptorSet, binding: u32, element: u32) -> Option<GfxDescriptorInfo> {
        self.descriptors.borrow().get(&(set, binding, element)).copied()
    }

    pub fn push_acquire_result(&self, result: GfxAcquireResult) {
        self.acquire_script.borrow_mut().push_back(result);
    }

    pub fn push_present_result(&self, result: GfxPresentResult) {
        self.present_script.borrow_mut().push_back(result);
    }

    /// 下一次 `create_sampler` 返回 OUT_OF_DEVICE_MEMORY
    pub fn fail_next_sampler(&self) {
        self.fail_next_sampler.set(true);
    }

    /// `GfxDevice::destroy` 是否已经被调用
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.get()
    }
}

impl GfxInterop for HeadlessDevice {
    fn export_buffer_memory(&self, buffer: vk::Buffer) -> GfxResult<ExternalHandle> {
        let buffers = self.buffers.borrow();
        let (_, info) = buffers.get(&buffer).ok_or_else(|| GfxError::unknown_handle("buffer", buffer))?;
        if !info.external {
            return Err(GfxError::Unsupported(format!("buffer `{}` is not exportable", info.name)));
        }
        self.record(GfxCall::ExportMemory { raw: buffer.as_raw() });
        Ok(fake_external_handle(buffer.as_raw()))
    }

    fn export_image_memory(&self, image: vk::Image) -> GfxResult<ExternalHandle> {
        let images = self.images.borrow();
        let info = images.get(&image).ok_or_else(|| GfxError::unknown_handle("image", image))?;
        if !info.external {
            return Err(GfxError::Unsupported(format!("image `{}` is not exportable", info.name)));
        }
        self.record(GfxCall::ExportMemory { raw: image.as_raw() });
        Ok(fake_external_handle(image.as_raw()))
    }

    fn export_semaphore(&self, semaphore: vk::Semaphore) -> GfxResult<ExternalHandle> {
        let exportable = self
            .semaphores
            .borrow()
            .get(&semaphore)
            .copied()
            .ok_or_else(|| GfxError::unknown_handle("semaphore", semaphore))?;
        if !exportable {
            return Err(GfxError::Unsupported("semaphore is not exportable".to_string()));
        }
        self.record(GfxCall::ExportSemaphore { semaphore });
        Ok(fake_external_handle(semaphore.as_raw()))
    }
}

#[cfg(unix)]
fn fake_external_handle(raw: u64) -> ExternalHandle {
    ExternalHandle::new(raw as RawExternalHandle)
}
#[cfg(windows)]
fn fake_external_handle(raw: u64) -> ExternalHandle {
    ExternalHandle::new(raw as usize as RawExternalHandle)
}

impl GfxDevice for HeadlessDevice {
    fn destroy(self: Box<Self>) {
        self.record(GfxCall::WaitIdle);
        self.destroyed.set(true);
    }

    fn device_name(&self) -> String {
        "headless".to_string()
    }

    fn surface_extent(&self) -> vk::Extent2D {
        self.window_extent.get()
    }

    fn set_window_extent(&self, extent: vk::Extent2D) {
        self.window_extent.set(extent);
    }

    fn wait_idle(&self) -> GfxResult<()> {
        self.record(GfxCall::WaitIdle);
        Ok(())
    }

    fn create_buffer(&self, info: &GfxBufferCreateInfo) -> GfxResult<vk::Buffer> {
        let buffer: vk::Buffer = self.fabricate();
        self.buffers.borrow_mut().insert(buffer, (vec![0u8; info.size as usize], info.clone()));
        self.record(GfxCall::CreateBuffer {
            buffer,
            size: info.size,
        });
        Ok(buffer)
    }

    fn destroy_buffer(&self, buffer: vk::Buffer) {
        self.buffers.borrow_mut().remove(&buffer);
        self.record(GfxCall::DestroyBuffer { buffer });
    }

    fn write_buffer(&self, buffer: vk::Buffer, offset: vk::DeviceSize, data: &[u8]) -> GfxResult<()> {
        let mut buffers = self.buffers.borrow_mut();
        let (bytes, _) = buffers.get_mut(&buffer).ok_or_else(|| GfxError::unknown_handle("buffer", buffer))?;
        let begin = offset as usize;
        let end = begin + data.len();
        if end > bytes.len() {
            return Err(GfxError::OutOfRange(format!("headless write {begin}..{end} > {}", bytes.len())));
        }
        bytes[begin..end].copy_from_slice(data);
        Ok(())
    }

    fn read_buffer(&self, buffer: vk::Buffer, offset: vk::DeviceSize, out: &mut [u8]) -> GfxResult<()> {
        let buffers = self.buffers.borrow();
        let (bytes, _) = buffers.get(&buffer).ok_or_else(|| GfxError::unknown_handle("buffer", buffer))?;
        let begin = offset as usize;
        let end = begin + out.len();
        if end > bytes.len() {
            return Err(GfxError::OutOfRange(format!("headless read {begin}..{end} > {}", bytes.len())));
        }
        out.copy_from_slice(&bytes[begin..end]);
        Ok(())
    }

    fn create_image(&self, info: &GfxImageCreateInfo) -> GfxResult<vk::Image> {
        let image: vk::Image = self.fabricate();
        self.images.borrow_mut().insert(image, info.clone());
        self.record(GfxCall::CreateImage {
            image,
            extent: info.extent,
            format: info.format,
        });
        Ok(image)
    }

    fn destroy_image(&self, image: vk::Image) {
        self.images.borrow_mut().remove(&image);
        self.record(GfxCall::DestroyImage { image });
    }

    fn create_image_view(&self, _desc: &GfxImageViewDesc) -> GfxResult<vk::ImageView> {
        Ok(self.fabricate())
    }

    fn destroy_image_view(&self, _view: vk::ImageView) {}

    fn create_sampler(&self, _desc: &GfxSamplerDesc) -> GfxResult<vk::Sampler> {
        if self.fail_next_sampler.replace(false) {
            return Err(GfxError::Vk {
                op: "create_sampler",
                result: vk::Result::ERROR_OUT_OF_DEVICE_MEMORY,
            });
        }
        Ok(self.fabricate())
    }

    fn destroy_sampler(&self, _sampler: vk::Sampler) {}

    fn create_semaphore(&self, exportable: bool, _name: &str) -> GfxResult<vk::Semaphore> {
        let semaphore: vk::Semaphore = self.fabricate();
        self.semaphores.borrow_mut().insert(semaphore, exportable);
        self.record(GfxCall::CreateSemaphore { semaphore, exportable });
        Ok(semaphore)
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        self.semaphores.borrow_mut().remove(&semaphore);
    }

    fn create_fence(&self, _signaled: bool, _name: &str) -> GfxResult<vk::Fence> {
        Ok(self.fabricate())
    }

    fn destroy_fence(&self, _fence: vk::Fence) {}

    fn wait_fence(&self, fence: vk::Fence, _timeout: u64) -> GfxResult<()> {
        self.record(GfxCall::WaitFence { fence });
        Ok(())
    }

    fn reset_fence(&self, fence: vk::Fence) -> GfxResult<()> {
        self.record(GfxCall::ResetFence { fence });
        Ok(())
    }

    fn allocate_command_buffer(&self, _name: &str) -> GfxResult<vk::CommandBuffer> {
        Ok(self.fabricate())
    }

    fn free_command_buffer(&self, _cmd: vk::CommandBuffer) {}

    fn begin_command_buffer(&self, cmd: vk::CommandBuffer, _one_time: bool) -> GfxResult<()> {
        self.record(GfxCall::BeginCommandBuffer { cmd });
        Ok(())
    }

    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> GfxResult<()> {
        self.record(GfxCall::EndCommandBuffer { cmd });
        Ok(())
    }

    fn reset_command_buffer(&self, cmd: vk::CommandBuffer) -> GfxResult<()> {
        self.record(GfxCall::ResetCommandBuffer { cmd });
        Ok(())
    }

    fn submit(&self, submit_info: &GfxSubmitInfo, fence: vk::Fence) -> GfxResult<()> {
        self.record(GfxCall::Submit {
            info: submit_info.clone(),
            fence,
        });
        Ok(())
    }

    fn cmd_image_barriers(&self, _cmd: vk::CommandBuffer, barriers: &[GfxImageBarrier]) {
        for barrier in barriers {
            self.record(GfxCall::Barrier {
                image: barrier.vk_image(),
                old_layout: barrier.old_layout(),
                new_layout: barrier.new_layout(),
            });
        }
        self.barriers.borrow_mut().extend_from_slice(barriers);
    }

    fn cmd_clear_color_image(
        &self,
        _cmd: vk::CommandBuffer,
        image: vk::Image,
        layout: vk::ImageLayout,
        _color: vk::ClearColorValue,
        _range: vk::ImageSubresourceRange,
    ) {
        self.record(GfxCall::ClearColor { image, layout });
    }

    fn cmd_clear_depth_image(
        &self,
        _cmd: vk::CommandBuffer,
        image: vk::Image,
        layout: vk::ImageLayout,
        _value: vk::ClearDepthStencilValue,
        _range: vk::ImageSubresourceRange,
    ) {
        self.record(GfxCall::ClearDepth { image, layout });
    }

    fn cmd_begin_render_pass(
        &self,
        _cmd: vk::CommandBuffer,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
        _clear_values: &[vk::ClearValue],
    ) {
        self.record(GfxCall::BeginRenderPass {
            render_pass,
            framebuffer,
            extent,
        });
    }

    fn cmd_end_render_pass(&self, _cmd: vk::CommandBuffer) {
        self.record(GfxCall::EndRenderPass);
    }

    fn cmd_bind_pipeline(&self, _cmd: vk::CommandBuffer, pipeline: vk::Pipeline) {
        self.record(GfxCall::BindPipeline { pipeline });
    }

    fn cmd_bind_descriptor_sets(
        &self,
        _cmd: vk::CommandBuffer,
        _layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
    ) {
        self.record(GfxCall::BindDescriptorSets {
            first_set,
            sets: sets.to_vec(),
        });
    }

    fn cmd_push_constants(
        &self,
        _cmd: vk::CommandBuffer,
        _layout: vk::PipelineLayout,
        _stages: vk::ShaderStageFlags,
        _offset: u32,
        data: &[u8],
    ) {
        self.record(GfxCall::PushConstants { size: data.len() });
    }

    fn cmd_bind_vertex_buffers(&self, _cmd: vk::CommandBuffer, _first_binding: u32, buffers: &[vk::Buffer]) {
        self.record(GfxCall::BindVertexBuffers {
            buffers: buffers.to_vec(),
        });
    }

    fn cmd_bind_index_buffer(&self, _cmd: vk::CommandBuffer, buffer: vk::Buffer, _index_type: vk::IndexType) {
        self.record(GfxCall::BindIndexBuffer { buffer });
    }

    fn cmd_set_viewport_scissor(&self, _cmd: vk::CommandBuffer, extent: vk::Extent2D) {
        self.record(GfxCall::SetViewportScissor { extent });
    }

    fn cmd_draw(&self, _cmd: vk::CommandBuffer, vertex_count: u32, instance_count: u32) {
        self.record(GfxCall::Draw {
            vertex_count,
            instance_count,
        });
    }

    fn cmd_draw_indexed(&self, _cmd: vk::CommandBuffer, index_count: u32, instance_count: u32) {
        self.record(GfxCall::DrawIndexed {
            index_count,
            instance_count,
        });
    }

    fn cmd_copy_buffer(&self, _cmd: vk::CommandBuffer, src: vk::Buffer, dst: vk::Buffer, regions: &[vk::BufferCopy]) {
        let mut buffers = self.buffers.borrow_mut();
        for region in regions {
            let src_range = region.src_offset as usize..(region.src_offset + region.size) as usize;
            let bytes = buffers.get(&src).and_then(|(data, _)| data.get(src_range).map(|s| s.to_vec()));
            if let (Some(bytes), Some((dst_data, _))) = (bytes, buffers.get_mut(&dst)) {
                let begin = region.dst_offset as usize;
                if let Some(target) = dst_data.get_mut(begin..begin + bytes.len()) {
                    target.copy_from_slice(&bytes);
                }
            }
            self.calls.borrow_mut().push(GfxCall::CopyBuffer {
                src,
                dst,
                size: region.size,
            });
        }
    }

    fn cmd_copy_image_to_buffer(
        &self,
        _cmd: vk::CommandBuffer,
        image: vk::Image,
        layout: vk::ImageLayout,
        buffer: vk::Buffer,
        _regions: &[vk::BufferImageCopy],
    ) {
        self.record(GfxCall::CopyImageToBuffer { image, layout, buffer });
    }

    fn cmd_copy_buffer_to_image(
        &self,
        _cmd: vk::CommandBuffer,
        buffer: vk::Buffer,
        image: vk::Image,
        _layout: vk::ImageLayout,
        _regions: &[vk::BufferImageCopy],
    ) {
        self.record(GfxCall::CopyBufferToImage { buffer, image });
    }

    fn cmd_copy_image(
        &self,
        _cmd: vk::CommandBuffer,
        src: vk::Image,
        _src_layout: vk::ImageLayout,
        dst: vk::Image,
        _dst_layout: vk::ImageLayout,
        _regions: &[vk::ImageCopy],
    ) {
        self.record(GfxCall::CopyImage { src, dst });
    }

    fn create_descriptor_set_layout(&self, _desc: &GfxDescriptorSetLayoutDesc) -> GfxResult<vk::DescriptorSetLayout> {
        Ok(self.fabricate())
    }

    fn destroy_descriptor_set_layout(&self, _layout: vk::DescriptorSetLayout) {}

    fn create_descriptor_pool(&self, desc: &GfxDescriptorPoolDesc) -> GfxResult<vk::DescriptorPool> {
        let pool: vk::DescriptorPool = self.fabricate();
        self.pools.borrow_mut().insert(
            pool,
            HeadlessPool {
                max_sets: desc.max_sets,
                sets: vec![],
            },
        );
        self.record(GfxCall::CreateDescriptorPool {
            pool,
            max_sets: desc.max_sets,
        });
        Ok(pool)
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        if let Some(removed) = self.pools.borrow_mut().remove(&pool) {
            self.descriptors.borrow_mut().retain(|(set, _, _), _| !removed.sets.contains(set));
        }
        self.record(GfxCall::DestroyDescriptorPool { pool });
    }

    fn allocate_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        _layout: vk::DescriptorSetLayout,
    ) -> GfxResult<vk::DescriptorSet> {
        let mut pools = self.pools.borrow_mut();
        let pool_state = pools.get_mut(&pool).ok_or_else(|| GfxError::unknown_handle("descriptor pool", pool))?;
        if pool_state.sets.len() as u32 >= pool_state.max_sets {
            return Err(GfxError::PoolExhausted);
        }
        let set: vk::DescriptorSet = self.fabricate();
        pool_state.sets.push(set);
        Ok(set)
    }

    fn free_descriptor_set(&self, pool: vk::DescriptorPool, set: vk::DescriptorSet) -> GfxResult<()> {
        let mut pools = self.pools.borrow_mut();
        let pool_state = pools.get_mut(&pool).ok_or_else(|| GfxError::unknown_handle("descriptor pool", pool))?;
        let before = pool_state.sets.len();
        pool_state.sets.retain(|live| *live != set);
        if pool_state.sets.len() == before {
            return Err(GfxError::unknown_handle("descriptor set", set));
        }
        self.descriptors.borrow_mut().retain(|(live, _, _), _| *live != set);
        Ok(())
    }

    fn write_descriptors(&self, writes: &[GfxDescriptorWrite]) {
        let mut descriptors = self.descriptors.borrow_mut();
        for write in writes {
            descriptors.insert((write.set, write.binding, write.array_element), write.info);
        }
    }

    fn copy_descriptors(&self, copies: &[GfxDescriptorCopy]) {
        let mut descriptors = self.descriptors.borrow_mut();
        for copy in copies {
            for element in 0..copy.count {
                if let Some(info) = descriptors.get(&(copy.src_set, copy.src_binding, element)).copied() {
                    descriptors.insert((copy.dst_set, copy.dst_binding, element), info);
                }
            }
        }
        drop(descriptors);
        self.record(GfxCall::CopyDescriptors { count: copies.len() });
    }

    fn create_render_pass(&self, desc: &GfxRenderPassDesc) -> GfxResult<vk::RenderPass> {
        let render_pass: vk::RenderPass = self.fabricate();
        self.record(GfxCall::CreateRenderPass {
            render_pass,
            attachment_count: desc.attachments.len(),
        });
        Ok(render_pass)
    }

    fn destroy_render_pass(&self, _render_pass: vk::RenderPass) {}

    fn create_framebuffer(
        &self,
        _render_pass: vk::RenderPass,
        _attachments: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> GfxResult<vk::Framebuffer> {
        let framebuffer: vk::Framebuffer = self.fabricate();
        self.record(GfxCall::CreateFramebuffer { framebuffer, extent });
        Ok(framebuffer)
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        self.record(GfxCall::DestroyFramebuffer { framebuffer });
    }

    fn create_pipeline_layout(&self, _desc: &GfxPipelineLayoutDesc) -> GfxResult<vk::PipelineLayout> {
        Ok(self.fabricate())
    }

    fn destroy_pipeline_layout(&self, _layout: vk::PipelineLayout) {}

    fn create_graphics_pipeline(&self, _desc: &GfxGraphicsPipelineDesc) -> GfxResult<vk::Pipeline> {
        Ok(self.fabricate())
    }

    fn destroy_pipeline(&self, _pipeline: vk::Pipeline) {}

    fn create_swapchain(&self, old: vk::SwapchainKHR, _vsync: bool) -> GfxResult<GfxSwapchainDesc> {
        if old != vk::SwapchainKHR::null() {
            self.destroy_swapchain(old);
        }

        let swapchain: vk::SwapchainKHR = self.fabricate();
        let images: Vec<vk::Image> = (0..self.swapchain_image_count).map(|_| self.fabricate()).collect();
        self.swapchains.borrow_mut().insert(swapchain, images.clone());

        let extent = self.window_extent.get();
        self.record(GfxCall::CreateSwapchain { swapchain, extent });
        self.next_image_index.set(0);
        Ok(GfxSwapchainDesc {
            handle: swapchain,
            format: vk::Format::B8G8R8A8_UNORM,
            extent,
            usage: vk::ImageUsageFlags::COLOR_ATTACHMENT
                | vk::ImageUsageFlags::TRANSFER_DST
                | vk::ImageUsageFlags::TRANSFER_SRC,
            images,
        })
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        self.swapchains.borrow_mut().remove(&swapchain);
        self.record(GfxCall::DestroySwapchain { swapchain });
    }

    fn acquire_next_image(&self, swapchain: vk::SwapchainKHR, _signal: vk::Semaphore) -> GfxResult<GfxAcquireResult> {
        if !self.swapchains.borrow().contains_key(&swapchain) {
            return Err(GfxError::unknown_handle("swapchain", swapchain));
        }
        let result = self.acquire_script.borrow_mut().pop_front().unwrap_or_else(|| {
            let index = self.next_image_index.get();
            self.next_image_index.set((index + 1) % self.swapchain_image_count);
            GfxAcquireResult::Acquired {
                index,
                suboptimal: false,
            }
        });
        self.record(GfxCall::Acquire { result });
        Ok(result)
    }

    fn present(
        &self,
        _swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> GfxResult<GfxPresentResult> {
        self.record(GfxCall::Present { image_index, wait });
        Ok(self.present_script.borrow_mut().pop_front().unwrap_or(GfxPresentResult::Ok))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_pool_capacity() {
        let device = HeadlessDevice::new();
        let pool = device
            .create_descriptor_pool(&GfxDescriptorPoolDesc {
                sizes: vec![],
                max_sets: 2,
                flags: vk::DescriptorPoolCreateFlags::empty(),
                name: "p".to_string(),
            })
            .unwrap();
        let layout = vk::DescriptorSetLayout::null();
        device.allocate_descriptor_set(pool, layout).unwrap();
        device.allocate_descriptor_set(pool, layout).unwrap();
        assert!(matches!(device.allocate_descriptor_set(pool, layout), Err(GfxError::PoolExhausted)));
    }

    #[test]
    fn handles_are_unique() {
        let device = HeadlessDevice::new();
        let a: vk::Buffer = device.fabricate();
        let b: vk::Buffer = device.fabricate();
        assert_ne!(a, b);
    }
}
