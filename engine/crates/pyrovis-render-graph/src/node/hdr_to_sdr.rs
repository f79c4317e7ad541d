use ash::vk;
use pyrovis_gfx::pipeline::GfxGraphicsPipelineDesc;
use pyrovis_render_interface::{descriptor_manager::DescriptorHandle, render_context::RenderContext};

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
pub struct HdrToSdrParams {
    pub hdr: DescriptorHandle,
}

struct HdrToSdrState {
    pass: NodeRenderPass,
    pipeline: NodePipeline,
    parameter: NodeParameter,
}

/// 采样 HDR attachment，tone mapping 之后写入 SDR 目标（通常是 swapchain）
pub struct HdrToSdrNode {
    slots: AttachmentSlots,
    state: Option<HdrToSdrState>,
}

// new & init
impl HdrToSdrNode {
    pub const NAME: &'static str = "HDRToSDR";
    pub const HDR_FORMAT: vk::Format = vk::Format::R32G32B32A32_SFLOAT;

    pub fn new(hdr: &str, sdr: &str, sdr_format: vk::Format) -> Self {
        let mut slots = AttachmentSlots::new();
        slots.insert(
            "hdr",
            AttachmentDescription::new(
                hdr,
                AttachmentType::COLOR | AttachmentType::SAMPLER,
                AttachmentRw::READ,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
                Self::HDR_FORMAT,
            ),
        );
        slots.insert(
            "sdr",
            AttachmentDescription::new(
                sdr,
                AttachmentType::COLOR,
                AttachmentRw::WRITE,
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST,
                sdr_format,
            ),
        );

        Self { slots, state: None }
    }
}

impl GraphNode for HdrToSdrNode {
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
        let stages = setup.shaders.load_node("hdr_to_sdr")?;

        let hdr = slot(Self::NAME, &self.slots, "hdr")?;
        let hdr_id = attachments.image(&ctx.resources, &hdr.name)?.id();
        let params = HdrToSdrParams {
            hdr: ctx.descriptors.get_resource_handle(hdr_id)?,
        };

        let mut pass = NodeRenderPass::new(
            device,
            Self::NAME,
            &self.slots,
            &[AttachmentOps::load_store("sdr")],
            color_output_dependency(),
        )?;
        if let Err(e) = pass.rebuild_framebuffers(device, &self.slots, &ctx.swapchain, &ctx.resources, attachments) {
            pass.destroy(device);
            return Err(e);
        }

        let layout_desc = NodePipeline::layout_desc(&ctx.descriptors, false, vec![], Self::NAME);
        let pipeline = match NodePipeline::new(device, &layout_desc, |layout| {
            GfxGraphicsPipelineDesc::fullscreen(stages, layout, pass.render_pass(), pass.color_count(), Self::NAME)
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

        self.state = Some(HdrToSdrState {
            pass,
            pipeline,
            parameter,
        });
        Ok(())
    }

    fn record(&mut self, ctx: &mut NodeRecordContext) -> GraphResult<()> {
        let state = self.state.as_ref().ok_or_else(|| GraphError::NotInitialized(Self::NAME.to_string()))?;
        let encoder = ctx.encoder;

        state.pass.begin(encoder, ctx.image_index(), &[])?;
        let layout = state.pipeline.layout();
        encoder.bind_pipeline(state.pipeline.pipeline());
        encoder.bind_descriptor_sets(
            layout,
            0,
            &[ctx.descriptors.bindless_set(), state.parameter.set(ctx.descriptors)?],
        );
        encoder.draw(6, 1);
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
