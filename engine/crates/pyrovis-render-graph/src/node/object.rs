use ash::vk;
use pyrovis_gfx::pipeline::GfxGraphicsPipelineDesc;
use pyrovis_render_interface::{
    descriptor_manager::{DescriptorHandle, DescriptorManager},
    render_context::RenderContext,
    scene_source::SceneSource,
    vertex::Vertex,
};

use crate::{
    attachment::{AttachmentDescription, AttachmentRw, AttachmentSlots, AttachmentType},
    error::{GraphError, GraphResult},
    node::{
        GraphNode, NodeRecordContext, NodeSetup,
        pipeline::{NodeParameter, NodePipeline},
    },
    render_attachments::RenderAttachments,
    render_pass::{AttachmentOps, NodeRenderPass, color_depth_dependency},
};

/// 物体节点的参数，fire_lights 在普通物体节点中为 NULL
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ObjectParams {
    pub camera: DescriptorHandle,
    pub lights: DescriptorHandle,
    pub fire_lights: DescriptorHandle,
}

impl ObjectParams {
    pub fn from_scene(scene: &dyn SceneSource, descriptors: &DescriptorManager, with_fire: bool) -> GraphResult<Self> {
        let fire_lights = match scene.fire_lights() {
            Some(id) if with_fire => descriptors.get_resource_handle(id)?,
            _ => DescriptorHandle::NULL,
        };
        Ok(Self {
            camera: descriptors.get_resource_handle(scene.camera())?,
            lights: descriptors.get_resource_handle(scene.lights())?,
            fire_lights,
        })
    }
}

struct ObjectState {
    pass: NodeRenderPass,
    pipeline: NodePipeline,
    parameter: NodeParameter,
}

/// 把场景中的每个物体绘制到 HDR color 与 depth 上
///
/// - `DefaultObject`：只使用场景光源
/// - `FireObject`：额外使用火焰的自发光光源
pub struct ObjectNode {
    name: &'static str,
    shader_dir: &'static str,
    with_fire: bool,
    slots: AttachmentSlots,
    state: Option<ObjectState>,
}

// new & init
impl ObjectNode {
    pub const OPAQUE_NAME: &'static str = "DefaultObject";
    pub const FIRE_NAME: &'static str = "FireObject";

    pub const COLOR_FORMAT: vk::Format = vk::Format::R32G32B32A32_SFLOAT;
    pub const DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

    pub fn opaque(color: &str, depth: &str) -> Self {
        Self::new(Self::OPAQUE_NAME, "default_object", false, color, depth)
    }

    pub fn fire(color: &str, depth: &str) -> Self {
        Self::new(Self::FIRE_NAME, "fire_object", true, color, depth)
    }

    fn new(name: &'static str, shader_dir: &'static str, with_fire: bool, color: &str, depth: &str) -> Self {
        let mut slots = AttachmentSlots::new();
        slots.insert(
            "color",
            AttachmentDescription::new(
                color,
                AttachmentType::COLOR,
                AttachmentRw::WRITE,
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST,
                Self::COLOR_FORMAT,
            ),
        );
        slots.insert(
            "depth",
            AttachmentDescription::new(
                depth,
                AttachmentType::DEPTH,
                AttachmentRw::READ | AttachmentRw::WRITE,
                vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
                vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST,
                Self::DEPTH_FORMAT,
            ),
        );

        Self {
            name,
            shader_dir,
            with_fire,
            slots,
            state: None,
        }
    }

    fn state(&self) -> GraphResult<&ObjectState> {
        self.state.as_ref().ok_or_else(|| GraphError::NotInitialized(self.name.to_string()))
    }
}

impl GraphNode for ObjectNode {
    fn name(&self) -> &str {
        self.name
    }

    fn attachment_descriptions(&self) -> &AttachmentSlots {
        &self.slots
    }

    fn init(
        &mut self,
        ctx: &mut RenderContext,
        attachments: &RenderAttachments,
        setup: &NodeSetup,
    ) -> GraphResult<()> {
        let device = &*ctx.device;
        let stages = setup.shaders.load_node(self.shader_dir)?;

        let mut pass = NodeRenderPass::new(
            device,
            self.name,
            &self.slots,
            &[AttachmentOps::load_store("color"), AttachmentOps::clear_store("depth")],
            color_depth_dependency(),
        )?;
        if let Err(e) = pass.rebuild_framebuffers(device, &self.slots, &ctx.swapchain, &ctx.resources, attachments) {
            pass.destroy(device);
            return Err(e);
        }

        let layout_desc = NodePipeline::layout_desc(&ctx.descriptors, true, vec![], self.name);
        let pipeline = match NodePipeline::new(device, &layout_desc, |layout| GfxGraphicsPipelineDesc {
            vertex_bindings: vec![Vertex::binding_description()],
            vertex_attributes: Vertex::attribute_descriptions(),
            cull_mode: vk::CullModeFlags::BACK,
            depth_test: true,
            depth_write: true,
            ..GfxGraphicsPipelineDesc::fullscreen(stages, layout, pass.render_pass(), pass.color_count(), self.name)
        }) {
            Ok(pipeline) => pipeline,
            Err(e) => {
                pass.destroy(device);
                return Err(e);
            }
        };

        let parameter = ObjectParams::from_scene(setup.scene, &ctx.descriptors, self.with_fire)
            .and_then(|params| NodeParameter::new(device, &mut ctx.descriptors, &params, self.name));
        let parameter = match parameter {
            Ok(parameter) => parameter,
            Err(e) => {
                pass.destroy(device);
                pipeline.destroy(device);
                return Err(e);
            }
        };

        self.state = Some(ObjectState {
            pass,
            pipeline,
            parameter,
        });
        Ok(())
    }

    fn record(&mut self, ctx: &mut NodeRecordContext) -> GraphResult<()> {
        let _span = tracy_client::span!("ObjectNode::record");
        let state = self.state()?;
        let encoder = ctx.encoder;

        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: [0.0, 0.0, 0.0, 1.0],
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
            },
        ];
        state.pass.begin(encoder, ctx.image_index(), &clear_values)?;

        let layout = state.pipeline.layout();
        encoder.bind_pipeline(state.pipeline.pipeline());
        encoder.bind_descriptor_sets(
            layout,
            0,
            &[ctx.descriptors.bindless_set(), state.parameter.set(ctx.descriptors)?],
        );
        for draw in ctx.scene.draws() {
            encoder.bind_descriptor_sets(layout, 2, &[ctx.descriptors.get_parameter_set(draw.parameter)?]);
            encoder.bind_vertex_buffers(0, &[draw.vertex_buffer]);
            encoder.bind_index_buffer(draw.index_buffer, vk::IndexType::UINT32);
            encoder.draw_indexed(draw.index_count, 1);
        }

        encoder.end_render_pass();
        Ok(())
    }

    fn on_resize(&mut self, ctx: &mut RenderContext, attachments: &RenderAttachments) -> GraphResult<()> {
        let state = self.state.as_mut().ok_or_else(|| GraphError::NotInitialized(self.name.to_string()))?;
        state.pass.rebuild_framebuffers(&*ctx.device, &self.slots, &ctx.swapchain, &ctx.resources, attachments)
    }

    fn destroy(&mut self, ctx: &mut RenderContext) {
        if let Some(mut state) = self.state.take() {
            let device = &*ctx.device;
            state.pass.destroy(device);
            state.pipeline.destroy(device);
            state.parameter.destroy(device, &mut ctx.descriptors);
        }
    }

    fn render_pass(&self) -> vk::RenderPass {
        self.state.as_ref().map_or(vk::RenderPass::null(), |state| state.pass.render_pass())
    }
}
