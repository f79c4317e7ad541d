//! 基于 ash + vk-mem 的 [`crate::device::GfxDevice`] 实现

mod allocation;
mod debug_messenger;
mod device;
mod instance;
mod physical_device;
mod surface;

pub use device::{VulkanDevice, VulkanDeviceCreateInfo};
