//! 逐帧驱动 render graph
//!
//! - [`cross_device::CrossDeviceSync`]：与计算侧（物理模拟）之间的 semaphore 握手
//! - [`frame_sync::FrameSync`]：acquire / render 的 semaphore、in-flight fence 与 command buffer
//! - [`render_engine::RenderEngine`]：一帧的完整流程以及 resize

pub mod cross_device;
pub mod error;
pub mod frame_sync;
pub mod render_engine;
