//! Vulkan RHI (Rendering Hardware Interface) 抽象层
//!
//! 所有 GPU 操作都通过 [`device::GfxDevice`] trait 完成，调用方显式地持有设备引用，
//! 不存在全局单例。
//!
//! - [`vulkan::VulkanDevice`]：基于 ash + vk-mem 的真实实现
//! - `headless::HeadlessDevice`：不依赖 GPU 的记录型实现，开启 `headless` feature 或在测试中可用

pub mod commands;
pub mod descriptors;
pub mod device;
pub mod error;
pub mod interop;
pub mod pipeline;
pub mod resources;
pub mod sampler;
pub mod swapchain;
pub mod vulkan;

#[cfg(any(test, feature = "headless"))]
pub mod headless;
