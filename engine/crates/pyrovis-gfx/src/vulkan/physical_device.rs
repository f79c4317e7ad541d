use std::ffi::CStr;

use ash::vk;
use itertools::Itertools;

use crate::{
    error::{GfxError, GfxResult, VkResultExt},
    vulkan::surface::GfxSurface,
};

/// 选中的物理设备，以及它的各种属性
pub(crate) struct GfxPhysicalDevice {
    pub(crate) vk_handle: vk::PhysicalDevice,
    pub(crate) properties: vk::PhysicalDeviceProperties,
    pub(crate) memory_properties: vk::PhysicalDeviceMemoryProperties,

    /// 同时支持 graphics 和 present 的 queue family
    pub(crate) graphics_queue_family: u32,
}

// new & init
impl GfxPhysicalDevice {
    /// 优先选择独显；必须有一个同时支持 graphics 和 present 的 queue family，并支持所需的 device extension
    pub fn new_discrete_physical_device(
        instance: &ash::Instance,
        surface: &GfxSurface,
        required_exts: &[&'static CStr],
    ) -> GfxResult<Self> {
        let pdevices = unsafe { instance.enumerate_physical_devices() }.vk_op("enumerate_physical_devices")?;

        let candidates = pdevices
            .into_iter()
            .filter_map(|pdevice| Self::inspect(instance, surface, pdevice, required_exts))
            .sorted_by_key(|candidate| match candidate.properties.device_type {
                vk::PhysicalDeviceType::DISCRETE_GPU => 0,
                vk::PhysicalDeviceType::INTEGRATED_GPU => 1,
                _ => 2,
            })
            .collect_vec();

        let chosen = candidates.into_iter().next().ok_or_else(|| {
            GfxError::NoSuitableDevice("no device supports graphics + present with interop extensions".to_string())
        })?;
        log::info!("physical device: {}", chosen.device_name());
        Ok(chosen)
    }

    fn inspect(
        instance: &ash::Instance,
        surface: &GfxSurface,
        pdevice: vk::PhysicalDevice,
        required_exts: &[&'static CStr],
    ) -> Option<Self> {
        let properties = unsafe { instance.get_physical_device_properties(pdevice) };
        let memory_properties = unsafe { instance.get_physical_device_memory_properties(pdevice) };

        let supported_exts = unsafe { instance.enumerate_device_extension_properties(pdevice) }.ok()?;
        let missing = required_exts
            .iter()
            .filter(|ext| {
                !supported_exts.iter().any(|prop| prop.extension_name_as_c_str().is_ok_and(|name| name == **ext))
            })
            .collect_vec();
        if !missing.is_empty() {
            log::info!(
                "skip physical device {:?}: missing extensions {:?}",
                properties.device_name_as_c_str().unwrap_or_default(),
                missing
            );
            return None;
        }

        let queue_families = unsafe { instance.get_physical_device_queue_family_properties(pdevice) };
        let graphics_queue_family = queue_families.iter().enumerate().find_map(|(idx, props)| {
            let idx = idx as u32;
            (props.queue_flags.contains(vk::QueueFlags::GRAPHICS) && surface.supports_queue_family(pdevice, idx))
                .then_some(idx)
        })?;

        Some(Self {
            vk_handle: pdevice,
            properties,
            memory_properties,
            graphics_queue_family,
        })
    }
}

// getters
impl GfxPhysicalDevice {
    pub fn device_name(&self) -> String {
        self.properties.device_name_as_c_str().unwrap_or_default().to_string_lossy().into_owned()
    }
}
