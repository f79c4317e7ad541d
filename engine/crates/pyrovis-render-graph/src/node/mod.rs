//! render graph 的节点
//!
//! 每个节点在构造时声明自己的 attachment（不访问设备），
//! 在 [`GraphNode::init`] 中创建 render pass、framebuffer 和 pipeline。
//! 录制前 graph 已经把节点声明的每个 attachment 转换到了所需的 layout。

use ash::vk;
use pyrovis_gfx::{
    commands::command_buffer::GfxCommandEncoder, device::GfxDevice, resources::image::GfxImage,
    swapchain::GfxSwapchain,
};
use pyrovis_render_interface::{
    descriptor_manager::DescriptorManager, gfx_resource_manager::GfxResourceManager, render_context::RenderContext,
    scene_source::SceneSource,
};

use crate::{
    attachment::{AttachmentDescription, AttachmentSlots},
    error::{GraphError, GraphResult},
    render_attachments::RenderAttachments,
    shader_library::ShaderLibrary,
};

pub mod field;
pub mod hdr_to_sdr;
pub mod object;
pub mod pipeline;
pub mod record;
pub mod ui;

pub use field::FieldNode;
pub use hdr_to_sdr::HdrToSdrNode;
pub use object::ObjectNode;
pub use record::{FrameRecorder, RecordNode};
pub use ui::UiNode;

/// UI 在自己的 render pass 内录制绘制命令
pub type UiDrawFn = dyn FnMut(&GfxCommandEncoder);

/// 节点初始化时需要的外部数据
pub struct NodeSetup<'a> {
    pub scene: &'a dyn SceneSource,
    pub shaders: &'a ShaderLibrary,
}

/// 节点录制时可以访问的状态
pub struct NodeRecordContext<'a> {
    pub encoder: &'a GfxCommandEncoder<'a>,
    pub resources: &'a GfxResourceManager,
    pub descriptors: &'a DescriptorManager,
    pub swapchain: &'a GfxSwapchain,
    pub attachments: &'a RenderAttachments,
    pub scene: &'a dyn SceneSource,
    pub frame_id: u64,

    pub ui_draw: Option<&'a mut UiDrawFn>,
    pub recorder: Option<&'a mut (dyn FrameRecorder + 'static)>,
}

impl NodeRecordContext<'_> {
    /// 槽位对应的物理 image，`swapchain` 解析为当前的 swapchain image
    pub fn image(&self, desc: &AttachmentDescription) -> GraphResult<&GfxImage> {
        slot_image(desc, self.swapchain, self.resources, self.attachments)
    }

    #[inline]
    pub fn image_index(&self) -> usize {
        self.swapchain.current_image_index()
    }
}

pub(crate) fn slot_image<'r>(
    desc: &AttachmentDescription,
    swapchain: &'r GfxSwapchain,
    resources: &'r GfxResourceManager,
    attachments: &RenderAttachments,
) -> GraphResult<&'r GfxImage> {
    if desc.is_swapchain() {
        Ok(swapchain.current_image())
    } else {
        Ok(attachments.image(resources, &desc.name)?)
    }
}

pub(crate) fn slot<'s>(node: &str, slots: &'s AttachmentSlots, name: &str) -> GraphResult<&'s AttachmentDescription> {
    slots.get(name).ok_or_else(|| GraphError::UnknownSlot {
        node: node.to_string(),
        slot: name.to_string(),
    })
}

/// render graph 节点
pub trait GraphNode {
    fn name(&self) -> &str;

    /// 构造时就确定的 attachment 描述，槽位名 -> 描述
    fn attachment_descriptions(&self) -> &AttachmentSlots;

    /// attachment 已经全部创建好之后调用
    fn init(&mut self, ctx: &mut RenderContext, attachments: &RenderAttachments, setup: &NodeSetup)
    -> GraphResult<()>;

    fn record(&mut self, ctx: &mut NodeRecordContext) -> GraphResult<()>;

    /// attachment 已经以新的尺寸重建之后调用
    fn on_resize(&mut self, ctx: &mut RenderContext, attachments: &RenderAttachments) -> GraphResult<()>;

    fn destroy(&mut self, ctx: &mut RenderContext);

    /// 没有 render pass 的节点返回 null
    fn render_pass(&self) -> vk::RenderPass {
        vk::RenderPass::null()
    }

    /// 在 resize 与销毁之前调用，处理已经提交但还没有消费的结果
    fn flush(
        &mut self,
        _device: &dyn GfxDevice,
        _recorder: Option<&mut (dyn FrameRecorder + 'static)>,
    ) -> GraphResult<()> {
        Ok(())
    }
}
