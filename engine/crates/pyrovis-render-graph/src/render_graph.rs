//! render graph 的构建与逐帧执行
//!
//! 构建顺序：
//! 1. 按边表计算拓扑序（未知名字、环在这里报错，此时还没有创建任何 GPU 资源）
//! 2. 合并所有节点的 attachment 描述并创建 attachment
//! 3. 按插入顺序 init 每个节点
//!
//! 每帧录制：清空 attachment -> 按拓扑序转换 layout 并录制节点 -> swapchain 转换到 PRESENT_SRC

use ash::vk;
use indexmap::IndexMap;
use itertools::Itertools;
use pyrovis_gfx::commands::command_buffer::{GfxCommandBuffer, GfxCommandEncoder};
use pyrovis_render_interface::{
    gfx_resource_manager::GfxResourceManager, render_context::RenderContext, scene_source::SceneSource,
};
use pyrovis_gfx::swapchain::GfxSwapchain;

use crate::{
    attachment::{AttachmentSlots, AttachmentType, merge_descriptions},
    error::{GraphError, GraphResult},
    node::{FrameRecorder, GraphNode, NodeRecordContext, NodeSetup, UiDrawFn, UiNode},
    render_attachments::RenderAttachments,
    topology::topological_order,
};

/// 收集节点和依赖关系
#[derive(Default)]
pub struct RenderGraphBuilder {
    nodes: IndexMap<String, Box<dyn GraphNode>>,
    /// 节点 -> 它依赖的上游节点
    edges: IndexMap<String, Vec<String>>,
}

// builder
impl RenderGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: impl GraphNode + 'static) -> GraphResult<&mut Self> {
        let name = node.name().to_string();
        if self.nodes.contains_key(&name) {
            return Err(GraphError::DuplicateNode(name));
        }
        self.nodes.insert(name, Box::new(node));
        Ok(self)
    }

    /// `node` 在 `dependency` 之后执行
    pub fn add_edge(&mut self, node: &str, dependency: &str) -> &mut Self {
        self.edges.entry(node.to_string()).or_default().push(dependency.to_string());
        self
    }

    pub fn node_names(&self) -> Vec<&str> {
        self.nodes.keys().map(String::as_str).collect()
    }

    pub fn build(self, ctx: &mut RenderContext, setup: &NodeSetup) -> GraphResult<RenderGraph> {
        let _span = tracy_client::span!("RenderGraphBuilder::build");
        let Self { mut nodes, edges } = self;

        let names = nodes.keys().map(String::as_str).collect_vec();
        let order = topological_order(&names, &edges)?;
        log::info!("render graph order: {}", order.iter().map(|&i| names[i]).join(" -> "));

        let merged = merge_descriptions(nodes.values().flat_map(|node| node.attachment_descriptions().values()))?;

        let mut attachments = RenderAttachments::new();
        for desc in merged.values() {
            if let Err(e) = attachments.add_attachment(ctx, &desc.name, desc.ty, desc.usage, desc.format) {
                attachments.cleanup(ctx);
                return Err(e.into());
            }
        }

        for index in 0..nodes.len() {
            let Some((name, node)) = nodes.get_index_mut(index) else {
                continue;
            };
            if let Err(e) = node.init(ctx, &attachments, setup) {
                log::error!("failed to init node `{name}`: {e}");
                for (_, initialized) in nodes.iter_mut().take(index + 1) {
                    initialized.destroy(ctx);
                }
                attachments.cleanup(ctx);
                return Err(e);
            }
        }

        Ok(RenderGraph {
            nodes,
            order,
            attachments,
            ui_draw: None,
            recorder: None,
        })
    }
}

pub struct RenderGraph {
    nodes: IndexMap<String, Box<dyn GraphNode>>,
    /// 预先计算的执行顺序，nodes 的索引
    order: Vec<usize>,
    attachments: RenderAttachments,

    ui_draw: Option<Box<UiDrawFn>>,
    recorder: Option<Box<dyn FrameRecorder>>,
}

// getters
impl RenderGraph {
    #[inline]
    pub fn attachments(&self) -> &RenderAttachments {
        &self.attachments
    }

    /// 按执行顺序排列的节点名
    pub fn execution_order(&self) -> Vec<&str> {
        self.order
            .iter()
            .filter_map(|&index| self.nodes.get_index(index).map(|(name, _)| name.as_str()))
            .collect()
    }

    #[inline]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// UI 节点的 render pass，graph 中没有 UI 节点时为 None
    pub fn ui_render_pass(&self) -> Option<vk::RenderPass> {
        self.nodes.get(UiNode::NAME).map(|node| node.render_pass())
    }

    pub fn recorder(&self) -> Option<&(dyn FrameRecorder + 'static)> {
        self.recorder.as_deref()
    }

    pub fn recorder_mut(&mut self) -> Option<&mut (dyn FrameRecorder + 'static)> {
        self.recorder.as_deref_mut()
    }
}

// setters
impl RenderGraph {
    pub fn register_ui_draw(&mut self, draw: Box<UiDrawFn>) {
        self.ui_draw = Some(draw);
    }

    pub fn set_recorder(&mut self, recorder: Box<dyn FrameRecorder>) {
        self.recorder = Some(recorder);
    }
}

// record
impl RenderGraph {
    /// 录制一整帧，`cmd` 需要已经 reset
    pub fn record(
        &mut self,
        ctx: &mut RenderContext,
        cmd: &GfxCommandBuffer,
        scene: &dyn SceneSource,
    ) -> GraphResult<()> {
        let _span = tracy_client::span!("RenderGraph::record");

        let frame_id = ctx.frame_counter.frame_id();
        let RenderContext {
            device,
            resources,
            descriptors,
            swapchain,
            ..
        } = ctx;
        let encoder = cmd.begin(&**device, true)?;

        Self::clear_attachments(&encoder, &self.attachments, resources)?;

        for &index in &self.order {
            let Some((_, node)) = self.nodes.get_index_mut(index) else {
                continue;
            };
            Self::transition_slots(&encoder, node.attachment_descriptions(), &self.attachments, resources, swapchain)?;

            let mut node_ctx = NodeRecordContext {
                encoder: &encoder,
                resources,
                descriptors,
                swapchain,
                attachments: &self.attachments,
                scene,
                frame_id,
                ui_draw: self.ui_draw.as_deref_mut(),
                recorder: self.recorder.as_deref_mut(),
            };
            node.record(&mut node_ctx)?;
        }

        swapchain.current_image_mut().transition_layout(&encoder, vk::ImageLayout::PRESENT_SRC_KHR)?;
        encoder.end()?;
        Ok(())
    }

    /// 每个 attachment：转换到 TRANSFER_DST，清空，再转换回原来的 layout
    fn clear_attachments(
        encoder: &GfxCommandEncoder,
        attachments: &RenderAttachments,
        resources: &mut GfxResourceManager,
    ) -> GraphResult<()> {
        for attachment in attachments.iter() {
            let image = resources
                .get_image_mut(attachment.handle)
                .ok_or_else(|| crate::error::AttachmentError::NotFound(attachment.name.clone()))?;

            let saved = image.layout();
            image.transition_layout(encoder, vk::ImageLayout::TRANSFER_DST_OPTIMAL)?;
            if attachment.ty.contains(AttachmentType::DEPTH) {
                encoder.clear_depth_image(
                    image.vk_image(),
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
                    image.subresource_range(),
                );
            } else {
                encoder.clear_color_image(
                    image.vk_image(),
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    vk::ClearColorValue {
                        float32: [0.0, 0.0, 0.0, 1.0],
                    },
                    image.subresource_range(),
                );
            }
            if saved != vk::ImageLayout::UNDEFINED {
                image.transition_layout(encoder, saved)?;
            }
        }
        Ok(())
    }

    /// 把节点声明的每个 attachment 转换到所需的 layout，已经满足的跳过
    fn transition_slots(
        encoder: &GfxCommandEncoder,
        slots: &AttachmentSlots,
        attachments: &RenderAttachments,
        resources: &mut GfxResourceManager,
        swapchain: &mut GfxSwapchain,
    ) -> GraphResult<()> {
        for desc in slots.values() {
            let image = if desc.is_swapchain() {
                swapchain.current_image_mut()
            } else {
                let handle = attachments.get_attachment(&desc.name)?;
                resources
                    .get_image_mut(handle)
                    .ok_or_else(|| crate::error::AttachmentError::NotFound(desc.name.clone()))?
            };
            if image.layout() != desc.layout {
                image.transition_layout(encoder, desc.layout)?;
            }
        }
        Ok(())
    }
}

// resize & destroy
impl RenderGraph {
    /// swapchain 已经以新的尺寸重建之后调用：先重建 attachment，再通知每个节点
    pub fn on_resize(&mut self, ctx: &mut RenderContext) -> GraphResult<()> {
        let _span = tracy_client::span!("RenderGraph::on_resize");

        self.flush(ctx)?;
        self.attachments.on_resize(ctx)?;
        for node in self.nodes.values_mut() {
            node.on_resize(ctx, &self.attachments)?;
        }
        let extent = ctx.swapchain.extent();
        log::info!("render graph resized to {}x{}", extent.width, extent.height);
        Ok(())
    }

    fn flush(&mut self, ctx: &RenderContext) -> GraphResult<()> {
        for node in self.nodes.values_mut() {
            node.flush(ctx.device(), self.recorder.as_deref_mut())?;
        }
        Ok(())
    }

    /// 调用前设备需要已经 idle
    pub fn destroy(mut self, ctx: &mut RenderContext) {
        if let Err(e) = self.flush(ctx) {
            log::error!("failed to flush render graph before destroy: {e}");
        }
        if let Some(mut recorder) = self.recorder.take() {
            if recorder.is_recording() {
                if let Err(e) = recorder.end() {
                    log::error!("failed to finish recording: {e}");
                }
            }
        }

        for node in self.nodes.values_mut() {
            node.destroy(ctx);
        }
        self.attachments.cleanup(ctx);
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use pyrovis_gfx::{
        device::GfxDevice,
        headless::{GfxCall, HeadlessDevice},
        resources::resource_id::ResourceId,
    };
    use pyrovis_render_interface::scene_source::{SceneDraw, SceneField};

    use super::*;
    use crate::{
        attachment::{AttachmentDescription, AttachmentRw, SWAPCHAIN_ATTACHMENT},
        shader_library::ShaderLibrary,
    };

    struct EmptyScene;

    impl SceneSource for EmptyScene {
        fn camera(&self) -> ResourceId {
            ResourceId::new()
        }

        fn lights(&self) -> ResourceId {
            ResourceId::new()
        }

        fn fire_lights(&self) -> Option<ResourceId> {
            None
        }

        fn draws(&self) -> Vec<SceneDraw> {
            vec![]
        }

        fn field(&self) -> Option<SceneField> {
            None
        }
    }

    /// 只声明 attachment，录制时把自己的名字写进日志
    struct TraceNode {
        name: &'static str,
        slots: AttachmentSlots,
        log: Rc<RefCell<Vec<String>>>,
    }

    impl TraceNode {
        fn new(name: &'static str, log: &Rc<RefCell<Vec<String>>>) -> Self {
            Self {
                name,
                slots: AttachmentSlots::new(),
                log: log.clone(),
            }
        }

        fn slot(mut self, slot: &'static str, attachment: &str, ty: AttachmentType, layout: vk::ImageLayout) -> Self {
            let format = if ty.contains(AttachmentType::DEPTH) {
                vk::Format::D32_SFLOAT
            } else {
                vk::Format::R32G32B32A32_SFLOAT
            };
            self.slots.insert(
                slot,
                AttachmentDescription::new(
                    attachment,
                    ty,
                    AttachmentRw::READ | AttachmentRw::WRITE,
                    layout,
                    vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST,
                    format,
                ),
            );
            self
        }
    }

    impl GraphNode for TraceNode {
        fn name(&self) -> &str {
            self.name
        }

        fn attachment_descriptions(&self) -> &AttachmentSlots {
            &self.slots
        }

        fn init(&mut self, _: &mut RenderContext, _: &RenderAttachments, _: &NodeSetup) -> GraphResult<()> {
            self.log.borrow_mut().push(format!("init {}", self.name));
            Ok(())
        }

        fn record(&mut self, ctx: &mut NodeRecordContext) -> GraphResult<()> {
            self.log.borrow_mut().push(format!("record {}", self.name));
            ctx.encoder.draw(3, 1);
            Ok(())
        }

        fn on_resize(&mut self, _: &mut RenderContext, _: &RenderAttachments) -> GraphResult<()> {
            self.log.borrow_mut().push(format!("resize {}", self.name));
            Ok(())
        }

        fn destroy(&mut self, _: &mut RenderContext) {
            self.log.borrow_mut().push(format!("destroy {}", self.name));
        }
    }

    fn setup_parts() -> (EmptyScene, ShaderLibrary) {
        (EmptyScene, ShaderLibrary::new("."))
    }

    #[test]
    fn builds_in_insertion_order_and_records_in_topological_order() {
        let device = HeadlessDevice::new();
        let mut ctx = RenderContext::new(Box::new(device.clone()), true).unwrap();
        let log = Rc::new(RefCell::new(vec![]));

        let mut builder = RenderGraphBuilder::new();
        builder
            .add_node(
                TraceNode::new("present", &log).slot(
                    "color",
                    SWAPCHAIN_ATTACHMENT,
                    AttachmentType::COLOR,
                    vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                ),
            )
            .unwrap()
            .add_node(
                TraceNode::new("scene", &log).slot(
                    "color",
                    "hdr",
                    AttachmentType::COLOR,
                    vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                ),
            )
            .unwrap()
            .add_edge("present", "scene");

        let (scene, shaders) = setup_parts();
        let setup = NodeSetup {
            scene: &scene,
            shaders: &shaders,
        };
        let mut graph = builder.build(&mut ctx, &setup).unwrap();
        assert_eq!(graph.execution_order(), vec!["scene", "present"]);
        assert_eq!(graph.attachments().len(), 1);

        let cmd = GfxCommandBuffer::new(&*ctx.device, "frame").unwrap();
        graph.record(&mut ctx, &cmd, &scene).unwrap();

        assert_eq!(
            *log.borrow(),
            vec!["init present", "init scene", "record scene", "record present"]
        );
        let last_barrier = device.recorded_barriers().last().copied().unwrap();
        assert_eq!(last_barrier.new_layout(), vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(last_barrier.vk_image(), ctx.swapchain.current_image().vk_image());

        graph.destroy(&mut ctx);
        assert_eq!(log.borrow().iter().filter(|line| line.starts_with("destroy")).count(), 2);
        assert_eq!(device.live_image_count(), 0);
        cmd.free(&*ctx.device);
        ctx.destroy();
    }

    #[test]
    fn clear_happens_first_and_satisfied_layouts_are_skipped() {
        let device = HeadlessDevice::new();
        let mut ctx = RenderContext::new(Box::new(device.clone()), true).unwrap();
        let log = Rc::new(RefCell::new(vec![]));

        let mut builder = RenderGraphBuilder::new();
        builder
            .add_node(
                TraceNode::new("a", &log).slot(
                    "color",
                    "hdr",
                    AttachmentType::COLOR,
                    vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                ),
            )
            .unwrap()
            .add_node(
                TraceNode::new("b", &log).slot(
                    "color",
                    "hdr",
                    AttachmentType::COLOR,
                    vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                ),
            )
            .unwrap()
            .add_edge("b", "a");

        let (scene, shaders) = setup_parts();
        let setup = NodeSetup {
            scene: &scene,
            shaders: &shaders,
        };
        let mut graph = builder.build(&mut ctx, &setup).unwrap();
        let hdr = ctx.resources.get_image(graph.attachments().get_attachment("hdr").unwrap()).unwrap().vk_image();

        let cmd = GfxCommandBuffer::new(&*ctx.device, "frame").unwrap();
        device.clear_calls();
        graph.record(&mut ctx, &cmd, &scene).unwrap();

        let hdr_calls = device
            .calls()
            .into_iter()
            .filter(|call| match call {
                GfxCall::Barrier { image, .. } | GfxCall::ClearColor { image, .. } => *image == hdr,
                GfxCall::Draw { .. } => true,
                _ => false,
            })
            .collect_vec();
        assert_eq!(
            hdr_calls,
            vec![
                GfxCall::Barrier {
                    image: hdr,
                    old_layout: vk::ImageLayout::GENERAL,
                    new_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                },
                GfxCall::ClearColor {
                    image: hdr,
                    layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                },
                GfxCall::Barrier {
                    image: hdr,
                    old_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    new_layout: vk::ImageLayout::GENERAL,
                },
                GfxCall::Barrier {
                    image: hdr,
                    old_layout: vk::ImageLayout::GENERAL,
                    new_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                },
                // a
                GfxCall::Draw {
                    vertex_count: 3,
                    instance_count: 1,
                },
                // b 不需要再转换
                GfxCall::Draw {
                    vertex_count: 3,
                    instance_count: 1,
                },
            ]
        );

        graph.destroy(&mut ctx);
        cmd.free(&*ctx.device);
        ctx.destroy();
    }

    #[test]
    fn cycle_fails_before_creating_resources() {
        let device = HeadlessDevice::new();
        let mut ctx = RenderContext::new(Box::new(device.clone()), true).unwrap();
        let log = Rc::new(RefCell::new(vec![]));

        let mut builder = RenderGraphBuilder::new();
        builder
            .add_node(TraceNode::new("a", &log).slot("color", "hdr", AttachmentType::COLOR, vk::ImageLayout::GENERAL))
            .unwrap()
            .add_node(TraceNode::new("b", &log))
            .unwrap()
            .add_edge("a", "b")
            .add_edge("b", "a");

        let (scene, shaders) = setup_parts();
        let setup = NodeSetup {
            scene: &scene,
            shaders: &shaders,
        };
        let err = builder.build(&mut ctx, &setup).err().unwrap();
        assert!(matches!(err, GraphError::Cycle(ref nodes) if nodes.len() == 2));
        assert!(log.borrow().is_empty());
        assert_eq!(device.live_image_count(), 0);
        ctx.destroy();
    }

    #[test]
    fn duplicate_node_is_rejected() {
        let log = Rc::new(RefCell::new(vec![]));
        let mut builder = RenderGraphBuilder::new();
        builder.add_node(TraceNode::new("a", &log)).unwrap();
        assert!(matches!(builder.add_node(TraceNode::new("a", &log)), Err(GraphError::DuplicateNode(_))));
    }

    #[test]
    fn resize_recreates_attachments_before_nodes() {
        let device = HeadlessDevice::new();
        let mut ctx = RenderContext::new(Box::new(device.clone()), true).unwrap();
        let log = Rc::new(RefCell::new(vec![]));

        let mut builder = RenderGraphBuilder::new();
        builder
            .add_node(
                TraceNode::new("a", &log).slot(
                    "depth",
                    "depth",
                    AttachmentType::DEPTH,
                    vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
                ),
            )
            .unwrap();
        let (scene, shaders) = setup_parts();
        let setup = NodeSetup {
            scene: &scene,
            shaders: &shaders,
        };
        let mut graph = builder.build(&mut ctx, &setup).unwrap();
        let handle = graph.attachments().get_attachment("depth").unwrap();
        let id = ctx.resources.get_image(handle).unwrap().id();

        device.set_window_extent(vk::Extent2D { width: 1920, height: 1080 });
        ctx.swapchain.recreate(&*ctx.device).unwrap();
        graph.on_resize(&mut ctx).unwrap();

        let image = ctx.resources.get_image(graph.attachments().get_attachment("depth").unwrap()).unwrap();
        assert_eq!(image.id(), id);
        assert_eq!(image.extent(), vk::Extent2D { width: 1920, height: 1080 });
        assert_eq!(log.borrow().last().map(String::as_str), Some("resize a"));

        graph.destroy(&mut ctx);
        ctx.destroy();
    }
}
