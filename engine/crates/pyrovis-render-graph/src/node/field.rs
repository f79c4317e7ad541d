use ash::vk;
use pyrovis_gfx::pipeline::GfxGraphicsPipelineDesc;
use pyrovis_render_interface::{
    descriptor_manager::{DescriptorHandle, DescriptorManager},
    gfx_resource_manager::GfxResourceManager,
    render_context::RenderContext,
    scene_source::SceneSource,
};

use crate::{
    attachment::{AttachmentDescription, AttachmentRw, AttachmentSlots, AttachmentType},
    error::{GraphError, GraphResult},
    node::{
        GraphNode, NodeRecordContext, NodeSetup,
        pipeline::{NodeParameter, NodePipeline},
        slot,
    },
    render_attachments::RenderAttachments,
    render_pass::{AttachmentOps, NodeRenderPass, color_output_dependency},
};

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FieldParams {
    pub camera: DescriptorHandle,
    pub lights: DescriptorHandle,
    pub self_illumination_lights: DescriptorHandle,
    pub fire_color: DescriptorHandle,
    pub previous_color: DescriptorHandle,
    pub previous_depth: DescriptorHandle,
}

struct FieldState {
    pass: NodeRenderPass,
    pipeline: NodePipeline,
    parameter: NodeParameter,
}

/// 对体积场做 ray marching，叠加到物体节点的结果上
///
/// 物体的 color 与 depth 通过 bindless 表采样，结果以 blend 的方式写入新的 color
pub struct FieldNode {
    slots: AttachmentSlots,
    state: Option<FieldState>,
}

// new & init
impl FieldNode {
    pub const NAME: &'static str = "Field";
    pub const COLOR_FORMAT: vk::Format = vk::Format::R32G32B32A32_SFLOAT;

    pub fn new(previous_color: &str, previous_depth: &str, color: &str) -> Self {
        let mut slots = AttachmentSlots::new();
        slots.insert(
            "previous_color",
            AttachmentDescription::new(
                previous_color,
                AttachmentType::COLOR | AttachmentType::SAMPLER,
                AttachmentRw::READ,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
                Self::COLOR_FORMAT,
            ),
        );
        slots.insert(
            "previous_depth",
            AttachmentDescription::new(
                previous_depth,
                AttachmentType::DEPTH | AttachmentType::SAMPLER,
                AttachmentRw::READ,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
                vk::Format::D32_SFLOAT,
            ),
        );
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

        Self { slots, state: None }
    }

    fn params(
        &self,
        scene: &dyn SceneSource,
        descriptors: &DescriptorManager,
        resources: &GfxResourceManager,
        attachments: &RenderAttachments,
    ) -> GraphResult<FieldParams> {
        let sampled = |slot_name: &str| -> GraphResult<DescriptorHandle> {
            let desc = slot(Self::NAME, &self.slots, slot_name)?;
            let image = attachments.image(resources, &desc.name)?;
            Ok(descriptors.get_resource_handle(image.id())?)
        };
        let optional = |id| -> GraphResult<DescriptorHandle> {
            match id {
                Some(id) => Ok(descriptors.get_resource_handle(id)?),
                None => Ok(DescriptorHandle::NULL),
            }
        };

        Ok(FieldParams {
            camera: descriptors.get_resource_handle(scene.camera())?,
            lights: descriptors.get_resource_handle(scene.lights())?,
            self_illumination_lights: optional(scene.self_illumination_lights())?,
            fire_color: optional(scene.field().map(|field| field.fire_color))?,
            previous_color: sampled("previous_color")?,
            previous_depth: sampled("previous_depth")?,
        })
    }
}

impl GraphNode for FieldNode {
    fn name(&self) -> &str {
        Self::NAME
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
        let stages = setup.shaders.load_node("field")?;
        let params = self.params(setup.scene, &ctx.descriptors, &ctx.resources, attachments)?;

        let mut pass = NodeRenderPass::new(
            device,
            Self::NAME,
            &self.slots,
            &[AttachmentOps::load_store("color")],
            color_output_dependency(),
        )?;
        if let Err(e) = pass.rebuild_framebuffers(device, &self.slots, &ctx.swapchain, &ctx.resources, attachments) {
            pass.destroy(device);
            return Err(e);
        }

        let push_constant = vk::PushConstantRange {
            stage_flags: vk::ShaderStageFlags::FRAGMENT,
            offset: 0,
            size: size_of::<f32>() as u32,
        };
        let layout_desc = NodePipeline::layout_desc(&ctx.descriptors, true, vec![push_constant], Self::NAME);
        let pipeline = match NodePipeline::new(device, &layout_desc, |layout| GfxGraphicsPipelineDesc {
            blend_enable: true,
            ..GfxGraphicsPipelineDesc::fullscreen(stages, layout, pass.render_pass(), pass.color_count(), Self::NAME)
        }) {
            Ok(pipeline) => pipeline,
            Err(e) => {
                pass.destroy(device);
                return Err(e);
            }
        };

        let parameter = match NodeParameter::new(device, &mut ctx.descriptors, &params, Self::NAME) {
            Ok(parameter) => parameter,
            Err(e) => {
                pass.destroy(device);
                pipeline.destroy(device);
                return Err(e);
            }
        };

        self.state = Some(FieldState {
            pass,
            pipeline,
            parameter,
        });
        Ok(())
    }

    fn record(&mut self, ctx: &mut NodeRecordContext) -> GraphResult<()> {
        let _span = tracy_client::span!("FieldNode::record");
        let state = self.state.as_ref().ok_or_else(|| GraphError::NotInitialized(Self::NAME.to_string()))?;
        let encoder = ctx.encoder;

        state.pass.begin(encoder, ctx.image_index(), &[])?;
        if let Some(field) = ctx.scene.field() {
            let layout = state.pipeline.layout();
            encoder.bind_pipeline(state.pipeline.pipeline());
            encoder.bind_descriptor_sets(
                layout,
                0,
                &[
                    ctx.descriptors.bindless_set(),
                    state.parameter.set(ctx.descriptors)?,
                    ctx.descriptors.get_parameter_set(field.parameter)?,
                ],
            );
            encoder.push_constants(layout, vk::ShaderStageFlags::FRAGMENT, 0, &field.step);
            // 两个三角形覆盖整个屏幕
            encoder.draw(6, 1);
        }
        encoder.end_render_pass();
        Ok(())
    }

    fn on_resize(&mut self, ctx: &mut RenderContext, attachments: &RenderAttachments) -> GraphResult<()> {
        let state = self.state.as_mut().ok_or_else(|| GraphError::NotInitialized(Self::NAME.to_string()))?;
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
