use ash::vk;
use pyrovis_render_interface::render_context::RenderContext;

use crate::{
    attachment::{AttachmentDescription, AttachmentRw, AttachmentSlots, AttachmentType},
    error::{GraphError, GraphResult},
    node::{GraphNode, NodeRecordContext, NodeSetup},
    render_attachments::RenderAttachments,
    render_pass::{AttachmentOps, NodeRenderPass, color_output_dependency},
};

/// 在 color 目标上打开一个 LOAD / STORE 的 render pass，由 UI 后端在其中录制
///
/// UI 后端需要在初始化时拿到这个 render pass 来创建自己的 pipeline
pub struct UiNode {
    slots: AttachmentSlots,
    pass: Option<NodeRenderPass>,
}

// new & init
impl UiNode {
    pub const NAME: &'static str = "UI";

    pub fn new(color: &str, format: vk::Format) -> Self {
        let mut slots = AttachmentSlots::new();
        slots.insert(
            "color",
            AttachmentDescription::new(
                color,
                AttachmentType::COLOR,
                AttachmentRw::WRITE,
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST,
                format,
            ),
        );
        Self { slots, pass: None }
    }
}

impl GraphNode for UiNode {
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
        _setup: &NodeSetup,
    ) -> GraphResult<()> {
        let device = &*ctx.device;
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
        self.pass = Some(pass);
        Ok(())
    }

    fn record(&mut self, ctx: &mut NodeRecordContext) -> GraphResult<()> {
        let pass = self.pass.as_ref().ok_or_else(|| GraphError::NotInitialized(Self::NAME.to_string()))?;
        pass.begin(ctx.encoder, ctx.image_index(), &[])?;
        if let Some(draw) = ctx.ui_draw.as_deref_mut() {
            draw(ctx.encoder);
        }
        ctx.encoder.end_render_pass();
        Ok(())
    }

    fn on_resize(&mut self, ctx: &mut RenderContext, attachments: &RenderAttachments) -> GraphResult<()> {
        let pass = self.pass.as_mut().ok_or_else(|| GraphError::NotInitialized(Self::NAME.to_string()))?;
        pass.rebuild_framebuffers(&*ctx.device, &self.slots, &ctx.swapchain, &ctx.resources, attachments)
    }

    fn destroy(&mut self, ctx: &mut RenderContext) {
        if let Some(mut pass) = self.pass.take() {
            pass.destroy(&*ctx.device);
        }
    }

    fn render_pass(&self) -> vk::RenderPass {
        self.pass.as_ref().map_or(vk::RenderPass::null(), |pass| pass.render_pass())
    }
}
