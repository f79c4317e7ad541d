use ash::vk;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

use crate::error::{GfxResult, VkResultExt};

pub(crate) struct GfxSurface {
    pub(crate) handle: vk::SurfaceKHR,
    pub(crate) pf: ash::khr::surface::Instance,
}

// new & init
impl GfxSurface {
    pub fn new(
        vk_entry: &ash::Entry,
        instance: &ash::Instance,
        display_handle: RawDisplayHandle,
        window_handle: RawWindowHandle,
    ) -> GfxResult<Self> {
        let pf = ash::khr::surface::Instance::new(vk_entry, instance);
        let handle = unsafe { ash_window::create_surface(vk_entry, instance, display_handle, window_handle, None) }
            .vk_op("create_surface")?;
        Ok(Self { handle, pf })
    }
}

// getters
impl GfxSurface {
    pub fn capabilities(&self, pdevice: vk::PhysicalDevice) -> GfxResult<vk::SurfaceCapabilitiesKHR> {
        unsafe { self.pf.get_physical_device_surface_capabilities(pdevice, self.handle) }
            .vk_op("get_physical_device_surface_capabilities")
    }

    /// 优先选择 B8G8R8A8_UNORM + SRGB_NONLINEAR，与录制时的像素格式一致
    pub fn choose_format(&self, pdevice: vk::PhysicalDevice) -> GfxResult<vk::SurfaceFormatKHR> {
        let formats = unsafe { self.pf.get_physical_device_surface_formats(pdevice, self.handle) }
            .vk_op("get_physical_device_surface_formats")?;
        let preferred = formats.iter().find(|format| {
            format.format == vk::Format::B8G8R8A8_UNORM && format.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        });
        Ok(*preferred.or(formats.first()).unwrap_or(&vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }))
    }

    /// vsync 使用 FIFO；否则优先 MAILBOX，再退化到 IMMEDIATE 或 FIFO
    pub fn choose_present_mode(&self, pdevice: vk::PhysicalDevice, vsync: bool) -> GfxResult<vk::PresentModeKHR> {
        if vsync {
            return Ok(vk::PresentModeKHR::FIFO);
        }
        let modes = unsafe { self.pf.get_physical_device_surface_present_modes(pdevice, self.handle) }
            .vk_op("get_physical_device_surface_present_modes")?;
        Ok([vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE]
            .into_iter()
            .find(|mode| modes.contains(mode))
            .unwrap_or(vk::PresentModeKHR::FIFO))
    }

    pub fn supports_queue_family(&self, pdevice: vk::PhysicalDevice, queue_family_index: u32) -> bool {
        unsafe { self.pf.get_physical_device_surface_support(pdevice, queue_family_index, self.handle) }
            .unwrap_or(false)
    }
}

// destroy
impl GfxSurface {
    pub fn destroy(&self) {
        unsafe { self.pf.destroy_surface(self.handle, None) }
    }
}
