use std::{
    cell::{Cell, RefCell},
    collections::{HashMap, HashSet},
    ffi::{CStr, CString},
    mem::ManuallyDrop,
};

use ash::vk;
use itertools::Itertools;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

use crate::{
    commands::{barrier::GfxImageBarrier, submit_info::GfxSubmitInfo},
    descriptors::{
        GfxDescriptorCopy, GfxDescriptorInfo, GfxDescriptorPoolDesc, GfxDescriptorSetLayoutDesc, GfxDescriptorWrite,
    },
    device::GfxDevice,
    error::{GfxError, GfxResult, VkResultExt},
    interop::{
        EXTERNAL_MEMORY_HANDLE_TYPE, EXTERNAL_SEMAPHORE_HANDLE_TYPE, ExternalHandle, GfxInterop,
        interop_device_extensions,
    },
    pipeline::{GfxGraphicsPipelineDesc, GfxPipelineLayoutDesc, GfxRenderPassDesc},
    resources::{
        buffer::GfxBufferCreateInfo,
        image::{GfxImageCreateInfo, GfxImageViewDesc},
    },
    sampler::GfxSamplerDesc,
    swapchain::{GfxAcquireResult, GfxPresentResult, GfxSwapchainDesc},
    vulkan::{
        allocation::{GfxAllocator, GfxBufferAllocation, GfxImageAllocation},
        debug_messenger::GfxDebugMsger,
        instance::GfxInstance,
        physical_device::GfxPhysicalDevice,
        surface::GfxSurface,
    },
};

/// 创建 [`VulkanDevice`] 所需的窗口信息
pub struct VulkanDeviceCreateInfo {
    pub app_name: String,
    pub display_handle: RawDisplayHandle,
    pub window_handle: RawWindowHandle,
    pub window_extent: vk::Extent2D,
    pub enable_validation: bool,
}

#[cfg(unix)]
type ExternalMemoryDevice = ash::khr::external_memory_fd::Device;
#[cfg(windows)]
type ExternalMemoryDevice = ash::khr::external_memory_win32::Device;
#[cfg(unix)]
type ExternalSemaphoreDevice = ash::khr::external_semaphore_fd::Device;
#[cfg(windows)]
type ExternalSemaphoreDevice = ash::khr::external_semaphore_win32::Device;

/// 基于 ash + vk-mem 的 [`GfxDevice`] 实现
///
/// 只使用一个同时支持 graphics 和 present 的 queue；
/// buffer 与 image 的 memory 记录在以 handle 为 key 的表中
pub struct VulkanDevice {
    vk_entry: ash::Entry,
    instance: GfxInstance,
    debug_msger: GfxDebugMsger,
    surface: GfxSurface,
    physical_device: GfxPhysicalDevice,

    device: ash::Device,
    swapchain_pf: ash::khr::swapchain::Device,
    debug_utils: ash::ext::debug_utils::Device,
    external_memory_pf: ExternalMemoryDevice,
    external_semaphore_pf: ExternalSemaphoreDevice,

    queue: vk::Queue,
    command_pool: vk::CommandPool,
    allocator: ManuallyDrop<GfxAllocator>,

    buffers: RefCell<HashMap<vk::Buffer, GfxBufferAllocation>>,
    images: RefCell<HashMap<vk::Image, GfxImageAllocation>>,
    exportable_semaphores: RefCell<HashSet<vk::Semaphore>>,

    window_extent: Cell<vk::Extent2D>,
}

// new & init
impl VulkanDevice {
    pub fn new(info: &VulkanDeviceCreateInfo) -> GfxResult<Self> {
        let _span = tracy_client::span!("VulkanDevice::new");

        let vk_entry = unsafe { ash::Entry::load() }.map_err(|e| GfxError::Loading(e.to_string()))?;
        let instance =
            GfxInstance::new(&vk_entry, &info.app_name, "Pyrovis", info.display_handle, info.enable_validation)?;
        let debug_msger = GfxDebugMsger::new(&vk_entry, &instance.ash_instance)?;
        let surface = GfxSurface::new(&vk_entry, &instance.ash_instance, info.display_handle, info.window_handle)?;

        let device_exts = Self::basic_device_exts();
        let physical_device =
            GfxPhysicalDevice::new_discrete_physical_device(&instance.ash_instance, &surface, &device_exts)?;

        let device = Self::create_logical_device(&instance.ash_instance, &physical_device, &device_exts)?;
        let queue = unsafe { device.get_device_queue(physical_device.graphics_queue_family, 0) };

        let command_pool = unsafe {
            device.create_command_pool(
                &vk::CommandPoolCreateInfo::default()
                    .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
                    .queue_family_index(physical_device.graphics_queue_family),
                None,
            )
        }
        .vk_op("create_command_pool")?;

        let allocator = GfxAllocator::new(
            &instance.ash_instance,
            &device,
            physical_device.vk_handle,
            physical_device.memory_properties,
        )?;

        Ok(Self {
            swapchain_pf: ash::khr::swapchain::Device::new(&instance.ash_instance, &device),
            debug_utils: ash::ext::debug_utils::Device::new(&instance.ash_instance, &device),
            external_memory_pf: ExternalMemoryDevice::new(&instance.ash_instance, &device),
            external_semaphore_pf: ExternalSemaphoreDevice::new(&instance.ash_instance, &device),

            vk_entry,
            instance,
            debug_msger,
            surface,
            physical_device,
            device,

            queue,
            command_pool,
            allocator: ManuallyDrop::new(allocator),

            buffers: RefCell::new(HashMap::new()),
            images: RefCell::new(HashMap::new()),
            exportable_semaphores: RefCell::new(HashSet::new()),

            window_extent: Cell::new(info.window_extent),
        })
    }

    /// swapchain 以及跨 API 共享所需的 extension
    fn basic_device_exts() -> Vec<&'static CStr> {
        let mut exts = vec![ash::khr::swapchain::NAME];
        exts.extend(interop_device_extensions());
        exts
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: &GfxPhysicalDevice,
        device_exts: &[&'static CStr],
    ) -> GfxResult<ash::Device> {
        let exts_str = device_exts.iter().map(|ext| format!("\n\t{:?}", ext)).join("");
        log::info!("device exts: {}", exts_str);

        let priorities = [1.0];
        let queue_ci = vk::DeviceQueueCreateInfo::default()
            .queue_family_index(physical_device.graphics_queue_family)
            .queue_priorities(&priorities);

        let mut features13 = vk::PhysicalDeviceVulkan13Features::default().synchronization2(true);
        let mut features12 = vk::PhysicalDeviceVulkan12Features::default()
            .descriptor_indexing(true)
            .descriptor_binding_partially_bound(true)
            .runtime_descriptor_array(true);

        let ext_ptrs = device_exts.iter().map(|ext| ext.as_ptr()).collect_vec();
        let device_ci = vk::DeviceCreateInfo::default()
            .queue_create_infos(std::slice::from_ref(&queue_ci))
            .enabled_extension_names(&ext_ptrs)
            .push_next(&mut features13)
            .push_next(&mut features12);

        unsafe { instance.create_device(physical_device.vk_handle, &device_ci, None) }.vk_op("create_device")
    }
}

// destroy
impl VulkanDevice {
    /// 销毁顺序：残留资源、command pool、allocator、device、surface、debug messenger、instance
    pub fn teardown(mut self) {
        log::info!("Destroying VulkanDevice");
        if let Err(e) = self.wait_idle() {
            log::error!("wait idle before destroy failed: {e}");
        }

        let allocator = unsafe { ManuallyDrop::take(&mut self.allocator) };
        for (buffer, allocation) in self.buffers.take() {
            log::warn!("buffer {buffer:?} is still alive when destroying device");
            allocator.destroy_buffer(buffer, allocation);
        }
        for (image, allocation) in self.images.take() {
            log::warn!("image {image:?} is still alive when destroying device");
            allocator.destroy_image(image, allocation);
        }

        unsafe { self.device.destroy_command_pool(self.command_pool, None) };
        allocator.destroy();
        unsafe { self.device.destroy_device(None) };

        self.surface.destroy();
        self.debug_msger.destroy();
        self.instance.destroy();
        drop(self.vk_entry);
    }
}

// tools
impl VulkanDevice {
    fn set_debug_name<T: vk::Handle>(&self, handle: T, name: &str) {
        let Ok(name) = CString::new(name) else {
            return;
        };
        let result = unsafe {
            self.debug_utils.set_debug_utils_object_name(
                &vk::DebugUtilsObjectNameInfoEXT::default().object_handle(handle).object_name(&name),
            )
        };
        if let Err(e) = result {
            log::debug!("failed to set debug name {:?}: {e:?}", name);
        }
    }

    #[cfg(unix)]
    fn export_memory(&self, memory: vk::DeviceMemory) -> GfxResult<ExternalHandle> {
        let fd = unsafe {
            self.external_memory_pf.get_memory_fd(
                &vk::MemoryGetFdInfoKHR::default().memory(memory).handle_type(EXTERNAL_MEMORY_HANDLE_TYPE),
            )
        }
        .vk_op("get_memory_fd")?;
        Ok(ExternalHandle::new(fd))
    }

    #[cfg(windows)]
    fn export_memory(&self, memory: vk::DeviceMemory) -> GfxResult<ExternalHandle> {
        let handle = unsafe {
            self.external_memory_pf.get_memory_win32_handle(
                &vk::MemoryGetWin32HandleInfoKHR::default().memory(memory).handle_type(EXTERNAL_MEMORY_HANDLE_TYPE),
            )
        }
        .vk_op("get_memory_win32_handle")?;
        Ok(ExternalHandle::new(handle))
    }
}

impl GfxInterop for VulkanDevice {
    fn export_buffer_memory(&self, buffer: vk::Buffer) -> GfxResult<ExternalHandle> {
        let memory = {
            let buffers = self.buffers.borrow();
            let allocation = buffers.get(&buffer).ok_or_else(|| GfxError::unknown_handle("buffer", buffer))?;
            allocation
                .memory
                .exportable_memory()
                .ok_or_else(|| GfxError::Unsupported(format!("buffer {buffer:?} is not exportable")))?
        };
        self.export_memory(memory)
    }

    fn export_image_memory(&self, image: vk::Image) -> GfxResult<ExternalHandle> {
        let memory = {
            let images = self.images.borrow();
            let allocation = images.get(&image).ok_or_else(|| GfxError::unknown_handle("image", image))?;
            allocation
                .memory
                .exportable_memory()
                .ok_or_else(|| GfxError::Unsupported(format!("image {image:?} is not exportable")))?
        };
        self.export_memory(memory)
    }

    #[cfg(unix)]
    fn export_semaphore(&self, semaphore: vk::Semaphore) -> GfxResult<ExternalHandle> {
        if !self.exportable_semaphores.borrow().contains(&semaphore) {
            return Err(GfxError::Unsupported(format!("semaphore {semaphore:?} is not exportable")));
        }
        let fd = unsafe {
            self.external_semaphore_pf.get_semaphore_fd(
                &vk::SemaphoreGetFdInfoKHR::default().semaphore(semaphore).handle_type(EXTERNAL_SEMAPHORE_HANDLE_TYPE),
            )
        }
        .vk_op("get_semaphore_fd")?;
        Ok(ExternalHandle::new(fd))
    }

    #[cfg(windows)]
    fn export_semaphore(&self, semaphore: vk::Semaphore) -> GfxResult<ExternalHandle> {
        if !self.exportable_semaphores.borrow().contains(&semaphore) {
            return Err(GfxError::Unsupported(format!("semaphore {semaphore:?} is not exportable")));
        }
        let handle = unsafe {
            self.external_semaphore_pf.get_semaphore_win32_handle(
                &vk::SemaphoreGetWin32HandleInfoKHR::default()
                    .semaphore(semaphore)
                    .handle_type(EXTERNAL_SEMAPHORE_HANDLE_TYPE),
            )
        }
        .vk_op("get_semaphore_win32_handle")?;
        Ok(ExternalHandle::new(handle))
    }
}

impl GfxDevice for VulkanDevice {
    fn destroy(self: Box<Self>) {
        (*self).teardown();
    }

    fn device_name(&self) -> String {
        self.physical_device.device_name()
    }

    fn surface_extent(&self) -> vk::Extent2D {
        match self.surface.capabilities(self.physical_device.vk_handle) {
            Ok(caps) if caps.current_extent.width != u32::MAX => caps.current_extent,
            _ => self.window_extent.get(),
        }
    }

    fn set_window_extent(&self, extent: vk::Extent2D) {
        self.window_extent.set(extent);
    }

    fn wait_idle(&self) -> GfxResult<()> {
        unsafe { self.device.device_wait_idle() }.vk_op("device_wait_idle")
    }

    fn create_buffer(&self, info: &GfxBufferCreateInfo) -> GfxResult<vk::Buffer> {
        let (buffer, allocation) = self.allocator.create_buffer(info)?;
        self.set_debug_name(buffer, &format!("Buffer::{}", info.name));
        self.buffers.borrow_mut().insert(buffer, allocation);
        Ok(buffer)
    }

    fn destroy_buffer(&self, buffer: vk::Buffer) {
        match self.buffers.borrow_mut().remove(&buffer) {
            Some(allocation) => self.allocator.destroy_buffer(buffer, allocation),
            None => log::error!("destroying unknown buffer {buffer:?}"),
        }
    }

    fn write_buffer(&self, buffer: vk::Buffer, offset: vk::DeviceSize, data: &[u8]) -> GfxResult<()> {
        let buffers = self.buffers.borrow();
        let allocation = buffers.get(&buffer).ok_or_else(|| GfxError::unknown_handle("buffer", buffer))?;
        self.allocator.write(allocation, offset, data)
    }

    fn read_buffer(&self, buffer: vk::Buffer, offset: vk::DeviceSize, out: &mut [u8]) -> GfxResult<()> {
        let buffers = self.buffers.borrow();
        let allocation = buffers.get(&buffer).ok_or_else(|| GfxError::unknown_handle("buffer", buffer))?;
        self.allocator.read(allocation, offset, out)
    }

    fn create_image(&self, info: &GfxImageCreateInfo) -> GfxResult<vk::Image> {
        let (image, allocation) = self.allocator.create_image(info)?;
        self.set_debug_name(image, &format!("Image::{}", info.name));
        self.images.borrow_mut().insert(image, allocation);
        Ok(image)
    }

    fn destroy_image(&self, image: vk::Image) {
        match self.images.borrow_mut().remove(&image) {
            Some(allocation) => self.allocator.destroy_image(image, allocation),
            None => log::error!("destroying unknown image {image:?}"),
        }
    }

    fn create_image_view(&self, desc: &GfxImageViewDesc) -> GfxResult<vk::ImageView> {
        let view_ci = vk::ImageViewCreateInfo::default()
            .image(desc.image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(desc.format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: desc.aspect,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });
        let view = unsafe { self.device.create_image_view(&view_ci, None) }.vk_op("create_image_view")?;
        self.set_debug_name(view, &format!("ImageView::{}", desc.name));
        Ok(view)
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        unsafe { self.device.destroy_image_view(view, None) }
    }

    fn create_sampler(&self, desc: &GfxSamplerDesc) -> GfxResult<vk::Sampler> {
        let sampler = unsafe { self.device.create_sampler(&desc.as_info(), None) }.vk_op("create_sampler")?;
        self.set_debug_name(sampler, &format!("Sampler::{}", desc.name));
        Ok(sampler)
    }

    fn destroy_sampler(&self, sampler: vk::Sampler) {
        unsafe { self.device.destroy_sampler(sampler, None) }
    }

    fn create_semaphore(&self, exportable: bool, name: &str) -> GfxResult<vk::Semaphore> {
        let mut export_ci = vk::ExportSemaphoreCreateInfo::default().handle_types(EXTERNAL_SEMAPHORE_HANDLE_TYPE);
        let mut semaphore_ci = vk::SemaphoreCreateInfo::default();
        if exportable {
            semaphore_ci = semaphore_ci.push_next(&mut export_ci);
        }
        let semaphore = unsafe { self.device.create_semaphore(&semaphore_ci, None) }.vk_op("create_semaphore")?;
        self.set_debug_name(semaphore, &format!("Semaphore::{name}"));
        if exportable {
            self.exportable_semaphores.borrow_mut().insert(semaphore);
        }
        Ok(semaphore)
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        self.exportable_semaphores.borrow_mut().remove(&semaphore);
        unsafe { self.device.destroy_semaphore(semaphore, None) }
    }

    fn create_fence(&self, signaled: bool, name: &str) -> GfxResult<vk::Fence> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let fence_ci = vk::FenceCreateInfo::default().flags(flags);
        let fence = unsafe { self.device.create_fence(&fence_ci, None) }.vk_op("create_fence")?;
        self.set_debug_name(fence, &format!("Fence::{name}"));
        Ok(fence)
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.device.destroy_fence(fence, None) }
    }

    fn wait_fence(&self, fence: vk::Fence, timeout: u64) -> GfxResult<()> {
        unsafe { self.device.wait_for_fences(std::slice::from_ref(&fence), true, timeout) }.vk_op("wait_for_fences")
    }

    fn reset_fence(&self, fence: vk::Fence) -> GfxResult<()> {
        unsafe { self.device.reset_fences(std::slice::from_ref(&fence)) }.vk_op("reset_fences")
    }

    fn allocate_command_buffer(&self, name: &str) -> GfxResult<vk::CommandBuffer> {
        let allocate_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let cmd = unsafe { self.device.allocate_command_buffers(&allocate_info) }
            .vk_op("allocate_command_buffers")?
            .into_iter()
            .next()
            .ok_or_else(|| GfxError::Unsupported("command buffer allocation returned nothing".to_string()))?;
        self.set_debug_name(cmd, &format!("CommandBuffer::{name}"));
        Ok(cmd)
    }

    fn free_command_buffer(&self, cmd: vk::CommandBuffer) {
        unsafe { self.device.free_command_buffers(self.command_pool, std::slice::from_ref(&cmd)) }
    }

    fn begin_command_buffer(&self, cmd: vk::CommandBuffer, one_time: bool) -> GfxResult<()> {
        let flags = if one_time {
            vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT
        } else {
            vk::CommandBufferUsageFlags::empty()
        };
        unsafe { self.device.begin_command_buffer(cmd, &vk::CommandBufferBeginInfo::default().flags(flags)) }
            .vk_op("begin_command_buffer")
    }

    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> GfxResult<()> {
        unsafe { self.device.end_command_buffer(cmd) }.vk_op("end_command_buffer")
    }

    fn reset_command_buffer(&self, cmd: vk::CommandBuffer) -> GfxResult<()> {
        unsafe { self.device.reset_command_buffer(cmd, vk::CommandBufferResetFlags::RELEASE_RESOURCES) }
            .vk_op("reset_command_buffer")
    }

    fn submit(&self, submit_info: &GfxSubmitInfo, fence: vk::Fence) -> GfxResult<()> {
        let _span = tracy_client::span!("VulkanDevice::submit");
        let cmd_infos = submit_info
            .command_buffers()
            .iter()
            .map(|cmd| vk::CommandBufferSubmitInfo::default().command_buffer(*cmd))
            .collect_vec();
        let to_semaphore_info = |info: &crate::commands::submit_info::GfxSemaphoreSubmit| {
            vk::SemaphoreSubmitInfo::default().semaphore(info.semaphore).stage_mask(info.stage)
        };
        let wait_infos = submit_info.wait_infos().iter().map(to_semaphore_info).collect_vec();
        let signal_infos = submit_info.signal_infos().iter().map(to_semaphore_info).collect_vec();

        let submit = vk::SubmitInfo2::default()
            .command_buffer_infos(&cmd_infos)
            .wait_semaphore_infos(&wait_infos)
            .signal_semaphore_infos(&signal_infos);
        unsafe { self.device.queue_submit2(self.queue, std::slice::from_ref(&submit), fence) }.vk_op("queue_submit2")
    }

    fn cmd_image_barriers(&self, cmd: vk::CommandBuffer, barriers: &[GfxImageBarrier]) {
        let barriers = barriers.iter().map(|barrier| *barrier.inner()).collect_vec();
        let dependency_info = vk::DependencyInfo::default().image_memory_barriers(&barriers);
        unsafe { self.device.cmd_pipeline_barrier2(cmd, &dependency_info) }
    }

    fn cmd_clear_color_image(
        &self,
        cmd: vk::CommandBuffer,
        image: vk::Image,
        layout: vk::ImageLayout,
        color: vk::ClearColorValue,
        range: vk::ImageSubresourceRange,
    ) {
        unsafe { self.device.cmd_clear_color_image(cmd, image, layout, &color, std::slice::from_ref(&range)) }
    }

    fn cmd_clear_depth_image(
        &self,
        cmd: vk::CommandBuffer,
        image: vk::Image,
        layout: vk::ImageLayout,
        value: vk::ClearDepthStencilValue,
        range: vk::ImageSubresourceRange,
    ) {
        unsafe { self.device.cmd_clear_depth_stencil_image(cmd, image, layout, &value, std::slice::from_ref(&range)) }
    }

    fn cmd_begin_render_pass(
        &self,
        cmd: vk::CommandBuffer,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
        clear_values: &[vk::ClearValue],
    ) {
        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent,
            })
            .clear_values(clear_values);
        unsafe { self.device.cmd_begin_render_pass(cmd, &begin_info, vk::SubpassContents::INLINE) }
    }

    fn cmd_end_render_pass(&self, cmd: vk::CommandBuffer) {
        unsafe { self.device.cmd_end_render_pass(cmd) }
    }

    fn cmd_bind_pipeline(&self, cmd: vk::CommandBuffer, pipeline: vk::Pipeline) {
        unsafe { self.device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline) }
    }

    fn cmd_bind_descriptor_sets(
        &self,
        cmd: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
    ) {
        unsafe {
            self.device.cmd_bind_descriptor_sets(cmd, vk::PipelineBindPoint::GRAPHICS, layout, first_set, sets, &[])
        }
    }

    fn cmd_push_constants(
        &self,
        cmd: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        offset: u32,
        data: &[u8],
    ) {
        unsafe { self.device.cmd_push_constants(cmd, layout, stages, offset, data) }
    }

    fn cmd_bind_vertex_buffers(&self, cmd: vk::CommandBuffer, first_binding: u32, buffers: &[vk::Buffer]) {
        let offsets = vec![0; buffers.len()];
        unsafe { self.device.cmd_bind_vertex_buffers(cmd, first_binding, buffers, &offsets) }
    }

    fn cmd_bind_index_buffer(&self, cmd: vk::CommandBuffer, buffer: vk::Buffer, index_type: vk::IndexType) {
        unsafe { self.device.cmd_bind_index_buffer(cmd, buffer, 0, index_type) }
    }

    fn cmd_set_viewport_scissor(&self, cmd: vk::CommandBuffer, extent: vk::Extent2D) {
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = vk::Rect2D {
            offset: vk::Offset2D::default(),
            extent,
        };
        unsafe {
            self.device.cmd_set_viewport(cmd, 0, std::slice::from_ref(&viewport));
            self.device.cmd_set_scissor(cmd, 0, std::slice::from_ref(&scissor));
        }
    }

    fn cmd_draw(&self, cmd: vk::CommandBuffer, vertex_count: u32, instance_count: u32) {
        unsafe { self.device.cmd_draw(cmd, vertex_count, instance_count, 0, 0) }
    }

    fn cmd_draw_indexed(&self, cmd: vk::CommandBuffer, index_count: u32, instance_count: u32) {
        unsafe { self.device.cmd_draw_indexed(cmd, index_count, instance_count, 0, 0, 0) }
    }

    fn cmd_copy_buffer(&self, cmd: vk::CommandBuffer, src: vk::Buffer, dst: vk::Buffer, regions: &[vk::BufferCopy]) {
        unsafe { self.device.cmd_copy_buffer(cmd, src, dst, regions) }
    }

    fn cmd_copy_image_to_buffer(
        &self,
        cmd: vk::CommandBuffer,
        image: vk::Image,
        layout: vk::ImageLayout,
        buffer: vk::Buffer,
        regions: &[vk::BufferImageCopy],
    ) {
        unsafe { self.device.cmd_copy_image_to_buffer(cmd, image, layout, buffer, regions) }
    }

    fn cmd_copy_buffer_to_image(
        &self,
        cmd: vk::CommandBuffer,
        buffer: vk::Buffer,
        image: vk::Image,
        layout: vk::ImageLayout,
        regions: &[vk::BufferImageCopy],
    ) {
        unsafe { self.device.cmd_copy_buffer_to_image(cmd, buffer, image, layout, regions) }
    }

    fn cmd_copy_image(
        &self,
        cmd: vk::CommandBuffer,
        src: vk::Image,
        src_layout: vk::ImageLayout,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::ImageCopy],
    ) {
        unsafe { self.device.cmd_copy_image(cmd, src, src_layout, dst, dst_layout, regions) }
    }

    fn create_descriptor_set_layout(&self, desc: &GfxDescriptorSetLayoutDesc) -> GfxResult<vk::DescriptorSetLayout> {
        let bindings = desc
            .bindings
            .iter()
            .map(|binding| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(binding.binding)
                    .descriptor_type(binding.ty)
                    .descriptor_count(binding.count)
                    .stage_flags(binding.stages)
            })
            .collect_vec();
        let binding_flags = desc
            .bindings
            .iter()
            .map(|binding| {
                if binding.bindless {
                    vk::DescriptorBindingFlags::PARTIALLY_BOUND
                } else {
                    vk::DescriptorBindingFlags::empty()
                }
            })
            .collect_vec();

        let mut binding_flags_ci =
            vk::DescriptorSetLayoutBindingFlagsCreateInfo::default().binding_flags(&binding_flags);
        let mut layout_ci = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
        if desc.is_bindless() {
            layout_ci = layout_ci.push_next(&mut binding_flags_ci);
        }
        let layout = unsafe { self.device.create_descriptor_set_layout(&layout_ci, None) }
            .vk_op("create_descriptor_set_layout")?;
        self.set_debug_name(layout, &format!("DescriptorSetLayout::{}", desc.name));
        Ok(layout)
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        unsafe { self.device.destroy_descriptor_set_layout(layout, None) }
    }

    fn create_descriptor_pool(&self, desc: &GfxDescriptorPoolDesc) -> GfxResult<vk::DescriptorPool> {
        let pool_ci = vk::DescriptorPoolCreateInfo::default()
            .flags(desc.flags)
            .max_sets(desc.max_sets)
            .pool_sizes(&desc.sizes);
        let pool = unsafe { self.device.create_descriptor_pool(&pool_ci, None) }.vk_op("create_descriptor_pool")?;
        self.set_debug_name(pool, &format!("DescriptorPool::{}", desc.name));
        Ok(pool)
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        unsafe { self.device.destroy_descriptor_pool(pool, None) }
    }

    fn allocate_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> GfxResult<vk::DescriptorSet> {
        let allocate_info =
            vk::DescriptorSetAllocateInfo::default().descriptor_pool(pool).set_layouts(std::slice::from_ref(&layout));
        unsafe { self.device.allocate_descriptor_sets(&allocate_info) }
            .vk_op("allocate_descriptor_sets")?
            .into_iter()
            .next()
            .ok_or(GfxError::PoolExhausted)
    }

    fn free_descriptor_set(&self, pool: vk::DescriptorPool, set: vk::DescriptorSet) -> GfxResult<()> {
        unsafe { self.device.free_descriptor_sets(pool, std::slice::from_ref(&set)) }.vk_op("free_descriptor_sets")
    }

    fn write_descriptors(&self, writes: &[GfxDescriptorWrite]) {
        // 先收集 info，保证 WriteDescriptorSet 引用的数据在调用期间有效
        let infos = writes
            .iter()
            .map(|write| match write.info {
                GfxDescriptorInfo::Buffer {
                    buffer, offset, range, ..
                } => (Some(vk::DescriptorBufferInfo { buffer, offset, range }), None),
                GfxDescriptorInfo::CombinedImageSampler { sampler, view, layout } => (
                    None,
                    Some(vk::DescriptorImageInfo {
                        sampler,
                        image_view: view,
                        image_layout: layout,
                    }),
                ),
            })
            .collect_vec();

        let vk_writes = writes
            .iter()
            .zip(infos.iter())
            .map(|(write, (buffer_info, image_info))| {
                let mut vk_write = vk::WriteDescriptorSet::default()
                    .dst_set(write.set)
                    .dst_binding(write.binding)
                    .dst_array_element(write.array_element)
                    .descriptor_type(write.info.descriptor_type());
                if let Some(buffer_info) = buffer_info {
                    vk_write = vk_write.buffer_info(std::slice::from_ref(buffer_info));
                }
                if let Some(image_info) = image_info {
                    vk_write = vk_write.image_info(std::slice::from_ref(image_info));
                }
                vk_write
            })
            .collect_vec();

        unsafe { self.device.update_descriptor_sets(&vk_writes, &[]) }
    }

    fn copy_descriptors(&self, copies: &[GfxDescriptorCopy]) {
        let vk_copies = copies
            .iter()
            .map(|copy| {
                vk::CopyDescriptorSet::default()
                    .src_set(copy.src_set)
                    .src_binding(copy.src_binding)
                    .src_array_element(0)
                    .dst_set(copy.dst_set)
                    .dst_binding(copy.dst_binding)
                    .dst_array_element(0)
                    .descriptor_count(copy.count)
            })
            .collect_vec();
        unsafe { self.device.update_descriptor_sets(&[], &vk_copies) }
    }

    fn create_render_pass(&self, desc: &GfxRenderPassDesc) -> GfxResult<vk::RenderPass> {
        let attachments = desc.attachments.iter().map(|attachment| attachment.as_vk()).collect_vec();
        let mut subpass = vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&desc.color_refs);
        if let Some(depth_ref) = desc.depth_ref.as_ref() {
            subpass = subpass.depth_stencil_attachment(depth_ref);
        }

        let render_pass_ci = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(std::slice::from_ref(&subpass))
            .dependencies(&desc.dependencies);
        let render_pass =
            unsafe { self.device.create_render_pass(&render_pass_ci, None) }.vk_op("create_render_pass")?;
        self.set_debug_name(render_pass, &format!("RenderPass::{}", desc.name));
        Ok(render_pass)
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        unsafe { self.device.destroy_render_pass(render_pass, None) }
    }

    fn create_framebuffer(
        &self,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> GfxResult<vk::Framebuffer> {
        let framebuffer_ci = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass)
            .attachments(attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);
        unsafe { self.device.create_framebuffer(&framebuffer_ci, None) }.vk_op("create_framebuffer")
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        unsafe { self.device.destroy_framebuffer(framebuffer, None) }
    }

    fn create_pipeline_layout(&self, desc: &GfxPipelineLayoutDesc) -> GfxResult<vk::PipelineLayout> {
        let layout_ci = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(&desc.set_layouts)
            .push_constant_ranges(&desc.push_constant_ranges);
        let layout = unsafe { self.device.create_pipeline_layout(&layout_ci, None) }.vk_op("create_pipeline_layout")?;
        self.set_debug_name(layout, &format!("PipelineLayout::{}", desc.name));
        Ok(layout)
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        unsafe { self.device.destroy_pipeline_layout(layout, None) }
    }

    fn create_graphics_pipeline(&self, desc: &GfxGraphicsPipelineDesc) -> GfxResult<vk::Pipeline> {
        let _span = tracy_client::span!("VulkanDevice::create_graphics_pipeline");

        let mut modules = Vec::with_capacity(desc.stages.len());
        for stage in &desc.stages {
            let module_ci = vk::ShaderModuleCreateInfo::default().code(&stage.spirv);
            match unsafe { self.device.create_shader_module(&module_ci, None) } {
                Ok(module) => modules.push(module),
                Err(result) => {
                    modules.iter().for_each(|module| unsafe { self.device.destroy_shader_module(*module, None) });
                    return Err(GfxError::Vk {
                        op: "create_shader_module",
                        result,
                    });
                }
            }
        }
        let stage_infos = desc
            .stages
            .iter()
            .zip(modules.iter())
            .map(|(stage, module)| {
                vk::PipelineShaderStageCreateInfo::default()
                    .stage(stage.stage)
                    .module(*module)
                    .name(stage.entry_point)
            })
            .collect_vec();

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&desc.vertex_bindings)
            .vertex_attribute_descriptions(&desc.vertex_attributes);
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default().topology(desc.topology);
        let viewport_state = vk::PipelineViewportStateCreateInfo::default().viewport_count(1).scissor_count(1);
        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(vk::PolygonMode::FILL)
            .cull_mode(desc.cull_mode)
            .front_face(desc.front_face)
            .line_width(1.0);
        let multisample =
            vk::PipelineMultisampleStateCreateInfo::default().rasterization_samples(vk::SampleCountFlags::TYPE_1);
        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(desc.depth_test)
            .depth_write_enable(desc.depth_write)
            .depth_compare_op(vk::CompareOp::LESS_OR_EQUAL);

        let blend_attachment = vk::PipelineColorBlendAttachmentState::default()
            .blend_enable(desc.blend_enable)
            .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
            .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
            .color_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(vk::BlendFactor::ONE)
            .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
            .alpha_blend_op(vk::BlendOp::ADD)
            .color_write_mask(vk::ColorComponentFlags::RGBA);
        let blend_attachments = vec![blend_attachment; desc.color_attachment_count as usize];
        let color_blend = vk::PipelineColorBlendStateCreateInfo::default().attachments(&blend_attachments);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let pipeline_ci = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stage_infos)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic_state)
            .layout(desc.layout)
            .render_pass(desc.render_pass)
            .subpass(desc.subpass);

        let result = unsafe {
            self.device.create_graphics_pipelines(
                vk::PipelineCache::null(),
                std::slice::from_ref(&pipeline_ci),
                None,
            )
        };
        modules.iter().for_each(|module| unsafe { self.device.destroy_shader_module(*module, None) });

        let pipeline = result
            .map_err(|(_, result)| GfxError::Vk {
                op: "create_graphics_pipelines",
                result,
            })?
            .into_iter()
            .next()
            .ok_or_else(|| GfxError::Unsupported(format!("pipeline `{}` was not created", desc.name)))?;
        self.set_debug_name(pipeline, &format!("Pipeline::{}", desc.name));
        Ok(pipeline)
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        unsafe { self.device.destroy_pipeline(pipeline, None) }
    }

    fn create_swapchain(&self, old: vk::SwapchainKHR, vsync: bool) -> GfxResult<GfxSwapchainDesc> {
        let pdevice = self.physical_device.vk_handle;
        let caps = self.surface.capabilities(pdevice)?;
        let surface_format = self.surface.choose_format(pdevice)?;
        let present_mode = self.surface.choose_present_mode(pdevice, vsync)?;

        let extent = if caps.current_extent.width != u32::MAX {
            caps.current_extent
        } else {
            let window_extent = self.window_extent.get();
            vk::Extent2D {
                width: window_extent.width.clamp(caps.min_image_extent.width, caps.max_image_extent.width),
                height: window_extent.height.clamp(caps.min_image_extent.height, caps.max_image_extent.height),
            }
        };

        let mut image_count = caps.min_image_count + 1;
        if caps.max_image_count > 0 {
            image_count = image_count.min(caps.max_image_count);
        }

        // 录制节点需要从 swapchain image 拷贝
        let usage = (vk::ImageUsageFlags::COLOR_ATTACHMENT
            | vk::ImageUsageFlags::TRANSFER_DST
            | vk::ImageUsageFlags::TRANSFER_SRC)
            & caps.supported_usage_flags;

        let swapchain_ci = vk::SwapchainCreateInfoKHR::default()
            .surface(self.surface.handle)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(usage)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old);

        let handle = unsafe { self.swapchain_pf.create_swapchain(&swapchain_ci, None) }.vk_op("create_swapchain")?;
        if old != vk::SwapchainKHR::null() {
            unsafe { self.swapchain_pf.destroy_swapchain(old, None) };
        }
        let images = unsafe { self.swapchain_pf.get_swapchain_images(handle) }.vk_op("get_swapchain_images")?;

        log::info!("swapchain present mode: {:?}, format: {:?}", present_mode, surface_format.format);
        Ok(GfxSwapchainDesc {
            handle,
            format: surface_format.format,
            extent,
            usage,
            images,
        })
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        unsafe { self.swapchain_pf.destroy_swapchain(swapchain, None) }
    }

    fn acquire_next_image(&self, swapchain: vk::SwapchainKHR, signal: vk::Semaphore) -> GfxResult<GfxAcquireResult> {
        match unsafe { self.swapchain_pf.acquire_next_image(swapchain, u64::MAX, signal, vk::Fence::null()) } {
            Ok((index, suboptimal)) => Ok(GfxAcquireResult::Acquired { index, suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(GfxAcquireResult::OutOfDate),
            Err(result) => Err(GfxError::Vk {
                op: "acquire_next_image",
                result,
            }),
        }
    }

    fn present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> GfxResult<GfxPresentResult> {
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(std::slice::from_ref(&wait))
            .swapchains(std::slice::from_ref(&swapchain))
            .image_indices(std::slice::from_ref(&image_index));
        match unsafe { self.swapchain_pf.queue_present(self.queue, &present_info) } {
            Ok(false) => Ok(GfxPresentResult::Ok),
            Ok(true) => Ok(GfxPresentResult::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(GfxPresentResult::OutOfDate),
            Err(result) => Err(GfxError::Vk {
                op: "queue_present",
                result,
            }),
        }
    }
}
