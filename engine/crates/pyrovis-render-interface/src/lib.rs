//! 渲染层与 GPU 资源之间的边界
//!
//! - [`descriptor_manager::DescriptorManager`]：bindless 表与参数 descriptor 池
//! - [`gfx_resource_manager::GfxResourceManager`]：以 slotmap 存储 buffer 和 image
//! - [`render_context::RenderContext`]：显式传递的渲染上下文，取代全局单例
//! - [`scene_source::SceneSource`]：场景向渲染节点提供数据的接口

pub mod descriptor_manager;
pub mod error;
pub mod frame_counter;
pub mod gfx_resource_manager;
pub mod render_context;
pub mod scene_source;
pub mod vertex;
