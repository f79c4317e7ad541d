//! 基于节点的渲染图
//!
//! # 核心概念
//!
//! - **AttachmentDescription**：节点对某个逻辑 attachment 的需求（类型、读写、layout、usage、format）
//! - **RenderAttachments**：按名字持有物理 image，resize 时原地重建
//! - **GraphNode**：拥有 render pass、framebuffer 和 pipeline 的渲染单元
//! - **RenderGraph**：合并描述、创建 attachment、按拓扑序录制每个节点
//!
//! # 使用示例
//!
//! ```ignore
//! let mut builder = RenderGraphBuilder::new();
//! builder.add_node(ObjectNode::opaque("object_color", "depth"));
//! builder.add_node(HdrToSdrNode::new("object_color", SWAPCHAIN_ATTACHMENT, swapchain_format));
//! builder.add_edge(HdrToSdrNode::NAME, ObjectNode::OPAQUE_NAME);
//!
//! let mut graph = builder.build(&mut ctx, &setup)?;
//! graph.record(&mut ctx, &cmd, &scene)?;
//! ```
//!
//! 节点自己从不转换 attachment 的 layout，所有转换都由 graph 在节点录制之前完成。

pub mod attachment;
pub mod error;
pub mod node;
pub mod render_attachments;
pub mod render_graph;
pub mod render_pass;
pub mod shader_library;
pub mod topology;
pub mod variants;
