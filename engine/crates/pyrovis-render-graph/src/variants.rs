//! 预定义的两种 graph 拓扑
//!
//! default：`DefaultObject -> HDRToSDR -> Record -> UI`
//!
//! fire：`FireObject -> Field -> HDRToSDR -> Record -> UI`

use ash::vk;

use crate::{
    attachment::SWAPCHAIN_ATTACHMENT,
    error::{GraphError, GraphResult},
    node::{FieldNode, HdrToSdrNode, ObjectNode, RecordNode, UiNode},
    render_graph::RenderGraphBuilder,
};

pub const DEFAULT_VARIANT: &str = "default";
pub const FIRE_VARIANT: &str = "fire";

const OBJECT_COLOR: &str = "object_color";
const OBJECT_DEPTH: &str = "depth";
const FIELD_COLOR: &str = "field_object_color";

/// 每个节点需要加载的 shader 目录（相对于 shader 根目录）
pub fn shader_dirs(variant: &str) -> GraphResult<&'static [&'static str]> {
    match variant {
        DEFAULT_VARIANT => Ok(&["default_object", "hdr_to_sdr"]),
        FIRE_VARIANT => Ok(&["fire_object", "field", "hdr_to_sdr"]),
        other => Err(GraphError::UnknownVariant(other.to_string())),
    }
}

pub fn builder_for_variant(variant: &str, swapchain_format: vk::Format) -> GraphResult<RenderGraphBuilder> {
    let mut builder = RenderGraphBuilder::new();
    match variant {
        DEFAULT_VARIANT => {
            builder
                .add_node(ObjectNode::opaque(OBJECT_COLOR, OBJECT_DEPTH))?
                .add_node(HdrToSdrNode::new(OBJECT_COLOR, SWAPCHAIN_ATTACHMENT, swapchain_format))?
                .add_node(UiNode::new(SWAPCHAIN_ATTACHMENT, swapchain_format))?
                .add_node(RecordNode::new(SWAPCHAIN_ATTACHMENT, swapchain_format))?
                .add_edge(HdrToSdrNode::NAME, ObjectNode::OPAQUE_NAME);
        }
        FIRE_VARIANT => {
            builder
                .add_node(ObjectNode::fire(OBJECT_COLOR, OBJECT_DEPTH))?
                .add_node(FieldNode::new(OBJECT_COLOR, OBJECT_DEPTH, FIELD_COLOR))?
                .add_node(HdrToSdrNode::new(FIELD_COLOR, SWAPCHAIN_ATTACHMENT, swapchain_format))?
                .add_node(UiNode::new(SWAPCHAIN_ATTACHMENT, swapchain_format))?
                .add_node(RecordNode::new(SWAPCHAIN_ATTACHMENT, swapchain_format))?
                .add_edge(FieldNode::NAME, ObjectNode::FIRE_NAME)
                .add_edge(HdrToSdrNode::NAME, FieldNode::NAME);
        }
        other => return Err(GraphError::UnknownVariant(other.to_string())),
    }

    // 录制的画面不包含 UI
    builder
        .add_edge(RecordNode::NAME, HdrToSdrNode::NAME)
        .add_edge(UiNode::NAME, RecordNode::NAME)
        .add_edge(UiNode::NAME, HdrToSdrNode::NAME);
    Ok(builder)
}

#[cfg(test)]
mod tests {
    use std::{cell::Cell, path::Path, rc::Rc};

    use pyrovis_gfx::{
        commands::command_buffer::GfxCommandBuffer,
        device::GfxDevice,
        headless::{GfxCall, HeadlessDevice},
        resources::{buffer::GfxBuffer, resource_id::ResourceId},
    };
    use pyrovis_render_interface::{
        descriptor_manager::DescriptorCategory,
        render_context::RenderContext,
        scene_source::{SceneDraw, SceneField, SceneSource},
    };

    use super::*;
    use crate::{
        node::{FrameRecorder, NodeSetup},
        shader_library::{ShaderLibrary, placeholder_spirv},
    };

    struct TestScene {
        camera: GfxBuffer,
        lights: GfxBuffer,
    }

    impl TestScene {
        fn new(ctx: &mut RenderContext) -> Self {
            let device = &*ctx.device;
            let camera = GfxBuffer::new_uniform_buffer(device, 64, "camera").unwrap();
            let lights = GfxBuffer::new_uniform_buffer(device, 64, "lights").unwrap();
            ctx.descriptors.register_buffer(device, &camera, DescriptorCategory::Uniform).unwrap();
            ctx.descriptors.register_buffer(device, &lights, DescriptorCategory::Uniform).unwrap();
            Self { camera, lights }
        }

        fn destroy(self, ctx: &mut RenderContext) {
            for buffer in [self.camera, self.lights] {
                ctx.descriptors.remove_resource_registration(buffer.id()).unwrap();
                buffer.destroy(&*ctx.device);
            }
        }
    }

    impl SceneSource for TestScene {
        fn camera(&self) -> ResourceId {
            self.camera.id()
        }

        fn lights(&self) -> ResourceId {
            self.lights.id()
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

    #[derive(Default)]
    struct CountingRecorder {
        recording: bool,
        frames: Rc<Cell<usize>>,
    }

    impl FrameRecorder for CountingRecorder {
        fn begin(&mut self, _: &Path, _: u32, _: u32) -> std::io::Result<()> {
            self.recording = true;
            Ok(())
        }

        fn append(&mut self, _: &[u8], _: u32, _: u32) -> std::io::Result<()> {
            self.frames.set(self.frames.get() + 1);
            Ok(())
        }

        fn end(&mut self) -> std::io::Result<()> {
            self.recording = false;
            Ok(())
        }

        fn is_recording(&self) -> bool {
            self.recording
        }
    }

    fn shaders(variant: &str) -> ShaderLibrary {
        let mut library = ShaderLibrary::new("/nonexistent");
        for dir in shader_dirs(variant).unwrap() {
            library.insert(format!("{dir}/node.vert.spv"), placeholder_spirv());
            library.insert(format!("{dir}/node.frag.spv"), placeholder_spirv());
        }
        library
    }

    #[test]
    fn variant_orders() {
        let format = vk::Format::B8G8R8A8_UNORM;
        for (variant, expected) in [
            (DEFAULT_VARIANT, vec!["DefaultObject", "HDRToSDR", "Record", "UI"]),
            (FIRE_VARIANT, vec!["FireObject", "Field", "HDRToSDR", "Record", "UI"]),
        ] {
            let device = HeadlessDevice::new();
            let mut ctx = RenderContext::new(Box::new(device.clone()), true).unwrap();
            let scene = TestScene::new(&mut ctx);
            let library = shaders(variant);
            let setup = NodeSetup {
                scene: &scene,
                shaders: &library,
            };

            let graph = builder_for_variant(variant, format).unwrap().build(&mut ctx, &setup).unwrap();
            assert_eq!(graph.execution_order(), expected);
            assert_ne!(graph.ui_render_pass(), Some(vk::RenderPass::null()));

            graph.destroy(&mut ctx);
            scene.destroy(&mut ctx);
            ctx.destroy();
            assert_eq!(device.live_image_count(), 0);
            assert_eq!(device.live_buffer_count(), 0);
        }
    }

    #[test]
    fn unknown_variant() {
        assert!(matches!(
            builder_for_variant("smoke", vk::Format::B8G8R8A8_UNORM),
            Err(GraphError::UnknownVariant(name)) if name == "smoke"
        ));
    }

    #[test]
    fn missing_shader_aborts_build_and_releases_attachments() {
        let device = HeadlessDevice::new();
        let mut ctx = RenderContext::new(Box::new(device.clone()), true).unwrap();
        let scene = TestScene::new(&mut ctx);
        let library = ShaderLibrary::new("/nonexistent");
        let setup = NodeSetup {
            scene: &scene,
            shaders: &library,
        };

        let err = builder_for_variant(FIRE_VARIANT, vk::Format::B8G8R8A8_UNORM)
            .unwrap()
            .build(&mut ctx, &setup)
            .err()
            .unwrap();
        assert!(matches!(err, GraphError::ShaderNotFound(_)));
        assert_eq!(ctx.resources.image_count(), 0);

        scene.destroy(&mut ctx);
        ctx.destroy();
        assert_eq!(device.live_image_count(), 0);
    }

    #[test]
    fn fire_frame_records_and_resizes() {
        let device = HeadlessDevice::new();
        let mut ctx = RenderContext::new(Box::new(device.clone()), true).unwrap();
        let mut scene = TestScene::new(&mut ctx);
        let library = shaders(FIRE_VARIANT);
        let setup = NodeSetup {
            scene: &scene,
            shaders: &library,
        };
        let mut graph = builder_for_variant(FIRE_VARIANT, ctx.swapchain.format())
            .unwrap()
            .build(&mut ctx, &setup)
            .unwrap();

        let mut recorder = CountingRecorder::default();
        let frames = recorder.frames.clone();
        recorder.begin(Path::new("out.raw"), 800, 600).unwrap();
        graph.set_recorder(Box::new(recorder));

        let cmd = GfxCommandBuffer::new(&*ctx.device, "frame").unwrap();
        device.clear_calls();
        graph.record(&mut ctx, &cmd, &scene).unwrap();
        assert_eq!(frames.get(), 0);

        let calls = device.calls();
        // 三个 render pass：FireObject、Field、HDRToSDR，再加上 UI
        assert_eq!(calls.iter().filter(|call| matches!(call, GfxCall::BeginRenderPass { .. })).count(), 4);
        assert!(calls.iter().any(|call| matches!(call, GfxCall::CopyImageToBuffer { .. })));
        let swapchain_image = ctx.swapchain.current_image().vk_image();
        assert!(matches!(
            calls.iter().rev().find(|call| matches!(call, GfxCall::Barrier { .. })),
            Some(GfxCall::Barrier {
                image,
                new_layout: vk::ImageLayout::PRESENT_SRC_KHR,
                ..
            }) if *image == swapchain_image
        ));

        let depth = graph.attachments().get_attachment(OBJECT_DEPTH).unwrap();
        let depth_id = ctx.resources.get_image(depth).unwrap().id();
        let slot = ctx.descriptors.get_resource_handle(depth_id).unwrap();

        device.set_window_extent(vk::Extent2D {
            width: 1920,
            height: 1080,
        });
        ctx.swapchain.recreate(&*ctx.device).unwrap();
        scene.on_resize(&*ctx.device, ctx.swapchain.extent()).unwrap();
        device.clear_calls();
        graph.on_resize(&mut ctx).unwrap();

        // resize 之前把挂起的一帧交给录制器
        assert_eq!(frames.get(), 1);
        let framebuffers = device
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                GfxCall::CreateFramebuffer { extent, .. } => Some(extent),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert!(!framebuffers.is_empty());
        assert!(framebuffers.iter().all(|extent| extent.width == 1920 && extent.height == 1080));

        let depth_after = graph.attachments().get_attachment(OBJECT_DEPTH).unwrap();
        assert_eq!(depth_after, depth);
        assert_eq!(ctx.resources.get_image(depth_after).unwrap().id(), depth_id);
        assert_eq!(ctx.descriptors.get_resource_handle(depth_id).unwrap(), slot);

        let recorder = graph.recorder_mut().unwrap();
        recorder.end().unwrap();
        assert!(!recorder.is_recording());

        graph.destroy(&mut ctx);
        cmd.free(&*ctx.device);
        scene.destroy(&mut ctx);
        ctx.destroy();
    }
}
