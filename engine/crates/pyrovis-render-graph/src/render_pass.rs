use ash::vk;
use pyrovis_gfx::{
    commands::command_buffer::GfxCommandEncoder,
    device::GfxDevice,
    error::GfxError,
    pipeline::{GfxAttachmentDesc, GfxRenderPassDesc},
    swapchain::GfxSwapchain,
};
use pyrovis_render_interface::gfx_resource_manager::GfxResourceManager;

use crate::{
    attachment::AttachmentSlots,
    error::{GraphError, GraphResult},
    render_attachments::RenderAttachments,
};

/// render pass 中一个槽位的 load / store 行为
#[derive(Debug, Clone, Copy)]
pub struct AttachmentOps {
    /// 节点 [`AttachmentSlots`] 中的槽位名
    pub slot: &'static str,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
}

impl AttachmentOps {
    #[inline]
    pub fn load_store(slot: &'static str) -> Self {
        Self {
            slot,
            load_op: vk::AttachmentLoadOp::LOAD,
            store_op: vk::AttachmentStoreOp::STORE,
        }
    }

    #[inline]
    pub fn clear_store(slot: &'static str) -> Self {
        Self {
            slot,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
        }
    }
}

/// 外部 -> subpass 0，等待之前对 color attachment 的写入
pub fn color_output_dependency() -> vk::SubpassDependency {
    vk::SubpassDependency {
        src_subpass: vk::SUBPASS_EXTERNAL,
        dst_subpass: 0,
        src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        dst_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        src_access_mask: vk::AccessFlags::empty(),
        dst_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        dependency_flags: vk::DependencyFlags::empty(),
    }
}

/// 在 [`color_output_dependency`] 的基础上加入深度测试阶段
pub fn color_depth_dependency() -> vk::SubpassDependency {
    vk::SubpassDependency {
        src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
            | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
        dst_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
            | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
        dst_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE
            | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        ..color_output_dependency()
    }
}

/// 单 subpass 的 render pass
///
/// - initial layout 与 final layout 都等于槽位声明的 layout
/// - color 槽位按 `ops` 的顺序依次编号
/// - depth 槽位单独引用，最多一个
pub fn default_render_pass_desc(
    name: &str,
    slots: &AttachmentSlots,
    ops: &[AttachmentOps],
    dependency: vk::SubpassDependency,
) -> GraphResult<GfxRenderPassDesc> {
    let mut desc = GfxRenderPassDesc {
        name: name.to_string(),
        dependencies: vec![dependency],
        ..Default::default()
    };

    for (index, op) in ops.iter().enumerate() {
        let slot = slots.get(op.slot).ok_or_else(|| GraphError::UnknownSlot {
            node: name.to_string(),
            slot: op.slot.to_string(),
        })?;

        desc.attachments.push(GfxAttachmentDesc {
            format: slot.format,
            load_op: op.load_op,
            store_op: op.store_op,
            initial_layout: slot.layout,
            final_layout: slot.layout,
        });

        let reference = vk::AttachmentReference {
            attachment: index as u32,
            layout: slot.layout,
        };
        if slot.is_depth() {
            if desc.depth_ref.replace(reference).is_some() {
                return Err(GraphError::MultipleDepth(name.to_string()));
            }
        } else {
            desc.color_refs.push(reference);
        }
    }

    Ok(desc)
}

/// 节点的 render pass，以及每张 swapchain image 对应的 framebuffer
pub struct NodeRenderPass {
    render_pass: vk::RenderPass,
    /// framebuffer 中 attachment 的顺序
    slots: Vec<&'static str>,
    color_count: u32,
    framebuffers: Vec<vk::Framebuffer>,
    extent: vk::Extent2D,
}

// new & init
impl NodeRenderPass {
    pub fn new(
        device: &dyn GfxDevice,
        name: &str,
        slots: &AttachmentSlots,
        ops: &[AttachmentOps],
        dependency: vk::SubpassDependency,
    ) -> GraphResult<Self> {
        let desc = default_render_pass_desc(name, slots, ops, dependency)?;
        let render_pass = device.create_render_pass(&desc)?;
        Ok(Self {
            render_pass,
            slots: ops.iter().map(|op| op.slot).collect(),
            color_count: desc.color_refs.len() as u32,
            framebuffers: vec![],
            extent: vk::Extent2D::default(),
        })
    }

    /// 为每张 swapchain image 创建一个 framebuffer，旧的 framebuffer 会先被销毁
    pub fn rebuild_framebuffers(
        &mut self,
        device: &dyn GfxDevice,
        slots: &AttachmentSlots,
        swapchain: &GfxSwapchain,
        resources: &GfxResourceManager,
        attachments: &RenderAttachments,
    ) -> GraphResult<()> {
        self.destroy_framebuffers(device);

        let extent = swapchain.extent();
        for (index, swapchain_image) in swapchain.images().iter().enumerate() {
            let views = self
                .slots
                .iter()
                .map(|slot| {
                    let desc = slots.get(slot).ok_or_else(|| GraphError::UnknownSlot {
                        node: format!("framebuffer-{index}"),
                        slot: slot.to_string(),
                    })?;
                    if desc.is_swapchain() {
                        Ok(swapchain_image.view())
                    } else {
                        Ok(attachments.image(resources, &desc.name)?.view())
                    }
                })
                .collect::<GraphResult<Vec<_>>>()?;
            self.framebuffers.push(device.create_framebuffer(self.render_pass, &views, extent)?);
        }
        self.extent = extent;
        Ok(())
    }
}

// getters
impl NodeRenderPass {
    #[inline]
    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    #[inline]
    pub fn color_count(&self) -> u32 {
        self.color_count
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn framebuffer_count(&self) -> usize {
        self.framebuffers.len()
    }
}

// tools
impl NodeRenderPass {
    /// 开始 render pass，并把 viewport 与 scissor 设为整个 framebuffer
    pub fn begin(
        &self,
        encoder: &GfxCommandEncoder,
        image_index: usize,
        clear_values: &[vk::ClearValue],
    ) -> GraphResult<()> {
        let framebuffer = self.framebuffers.get(image_index).copied().ok_or_else(|| {
            GraphError::Gfx(GfxError::OutOfRange(format!(
                "framebuffer index {image_index} >= {}",
                self.framebuffers.len()
            )))
        })?;
        encoder.begin_render_pass(self.render_pass, framebuffer, self.extent, clear_values);
        encoder.set_viewport_scissor(self.extent);
        Ok(())
    }
}

// destroy
impl NodeRenderPass {
    fn destroy_framebuffers(&mut self, device: &dyn GfxDevice) {
        for framebuffer in self.framebuffers.drain(..) {
            device.destroy_framebuffer(framebuffer);
        }
    }

    pub fn destroy(&mut self, device: &dyn GfxDevice) {
        self.destroy_framebuffers(device);
        if self.render_pass != vk::RenderPass::null() {
            device.destroy_render_pass(self.render_pass);
            self.render_pass = vk::RenderPass::null();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attachment::{AttachmentDescription, AttachmentRw, AttachmentType};

    fn slots() -> AttachmentSlots {
        let mut slots = AttachmentSlots::new();
        slots.insert(
            "depth",
            AttachmentDescription::new(
                "depth",
                AttachmentType::DEPTH,
                AttachmentRw::READ | AttachmentRw::WRITE,
                vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
                vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
                vk::Format::D32_SFLOAT,
            ),
        );
        slots.insert(
            "color",
            AttachmentDescription::new(
                "object_color",
                AttachmentType::COLOR,
                AttachmentRw::WRITE,
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                vk::ImageUsageFlags::COLOR_ATTACHMENT,
                vk::Format::R32G32B32A32_SFLOAT,
            ),
        );
        slots
    }

    #[test]
    fn depth_reference_points_at_its_own_attachment() {
        let ops = [AttachmentOps::load_store("color"), AttachmentOps::clear_store("depth")];
        let desc = default_render_pass_desc("object", &slots(), &ops, color_depth_dependency()).unwrap();

        assert_eq!(desc.attachments.len(), 2);
        assert_eq!(desc.color_refs.len(), 1);
        assert_eq!(desc.color_refs[0].attachment, 0);
        let depth = desc.depth_ref.unwrap();
        assert_eq!(depth.attachment, 1);
        assert_eq!(depth.layout, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);

        let depth_attachment = &desc.attachments[1];
        assert_eq!(depth_attachment.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(depth_attachment.initial_layout, depth_attachment.final_layout);
        assert_eq!(desc.dependencies.len(), 1);
    }

    #[test]
    fn second_depth_is_rejected() {
        let mut slots = slots();
        let mut shadow = slots["depth"].clone();
        shadow.name = "shadow".to_string();
        slots.insert("shadow", shadow);

        let ops = [AttachmentOps::clear_store("depth"), AttachmentOps::clear_store("shadow")];
        let err = default_render_pass_desc("object", &slots, &ops, color_depth_dependency()).unwrap_err();
        assert!(matches!(err, GraphError::MultipleDepth(name) if name == "object"));
    }

    #[test]
    fn unknown_slot_is_rejected() {
        let ops = [AttachmentOps::load_store("missing")];
        let err = default_render_pass_desc("object", &slots(), &ops, color_output_dependency()).unwrap_err();
        assert!(matches!(err, GraphError::UnknownSlot { .. }));
    }
}
