use std::path::Path;

use ash::vk;
use pyrovis_gfx::{device::GfxDevice, resources::buffer::GfxBuffer};
use pyrovis_render_interface::render_context::RenderContext;

use crate::{
    attachment::{AttachmentDescription, AttachmentRw, AttachmentSlots, AttachmentType},
    error::{GraphError, GraphResult},
    node::{GraphNode, NodeRecordContext, NodeSetup, slot, slot_image},
    render_attachments::RenderAttachments,
};

/// 接收逐帧画面的录制器
///
/// 每一帧是紧密排列的 B8G8R8A8 像素
pub trait FrameRecorder {
    fn begin(&mut self, path: &Path, width: u32, height: u32) -> std::io::Result<()>;

    /// 窗口 resize 之后帧的尺寸会和 `begin` 时不同，录制器需要自行处理
    fn append(&mut self, frame: &[u8], width: u32, height: u32) -> std::io::Result<()>;

    fn end(&mut self) -> std::io::Result<()>;

    fn is_recording(&self) -> bool;
}

/// 把 color 目标拷贝到 host 可见的 buffer，交给 [`FrameRecorder`]
///
/// 拷贝命令在第 N 帧录制，数据在第 N+1 帧（此时 in-flight fence 已经等待过）读取；
/// 最后一帧在 [`GraphNode::flush`] 中读取。
pub struct RecordNode {
    slots: AttachmentSlots,
    readback: Option<GfxBuffer>,
    /// readback 中一帧的尺寸
    extent: vk::Extent2D,
    /// readback 中有一帧已经拷贝但还没有交给录制器
    pending: bool,
}

// new & init
impl RecordNode {
    pub const NAME: &'static str = "Record";

    pub fn new(color: &str, format: vk::Format) -> Self {
        let mut slots = AttachmentSlots::new();
        slots.insert(
            "color",
            AttachmentDescription::new(
                color,
                AttachmentType::COLOR,
                AttachmentRw::READ,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                vk::ImageUsageFlags::TRANSFER_SRC,
                format,
            ),
        );

        Self {
            slots,
            readback: None,
            extent: vk::Extent2D::default(),
            pending: false,
        }
    }

    fn create_readback(&mut self, ctx: &RenderContext, attachments: &RenderAttachments) -> GraphResult<()> {
        let device = &*ctx.device;
        if let Some(old) = self.readback.take() {
            old.destroy(device);
        }

        let desc = slot(Self::NAME, &self.slots, "color")?;
        let image = slot_image(desc, &ctx.swapchain, &ctx.resources, attachments)?;
        self.readback = Some(GfxBuffer::new_readback_buffer(device, image.byte_size()?, "record-readback")?);
        self.extent = image.extent();
        self.pending = false;
        Ok(())
    }

    /// 把 readback 中的一帧交给录制器
    fn deliver(
        &mut self,
        device: &dyn GfxDevice,
        recorder: Option<&mut (dyn FrameRecorder + 'static)>,
    ) -> GraphResult<()> {
        if !std::mem::take(&mut self.pending) {
            return Ok(());
        }
        let (Some(recorder), Some(readback)) = (recorder, self.readback.as_ref()) else {
            return Ok(());
        };
        if !recorder.is_recording() {
            log::debug!("recorder stopped, drop pending frame");
            return Ok(());
        }

        let mut frame = vec![0u8; readback.size() as usize];
        readback.read(device, &mut frame, 0)?;
        recorder
            .append(&frame, self.extent.width, self.extent.height)
            .map_err(GraphError::Recorder)
    }

    #[inline]
    pub fn has_pending_frame(&self) -> bool {
        self.pending
    }
}

impl GraphNode for RecordNode {
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
        self.create_readback(ctx, attachments)
    }

    fn record(&mut self, ctx: &mut NodeRecordContext) -> GraphResult<()> {
        let device = ctx.encoder.device();
        self.deliver(device, ctx.recorder.as_deref_mut())?;

        let recording = ctx.recorder.as_deref().is_some_and(|recorder| recorder.is_recording());
        if !recording {
            return Ok(());
        }

        let readback = self.readback.as_ref().ok_or_else(|| GraphError::NotInitialized(Self::NAME.to_string()))?;
        let image = ctx.image(slot(Self::NAME, &self.slots, "color")?)?;
        image.copy_to_buffer(ctx.encoder, readback)?;
        self.pending = true;
        Ok(())
    }

    fn on_resize(&mut self, ctx: &mut RenderContext, attachments: &RenderAttachments) -> GraphResult<()> {
        self.create_readback(ctx, attachments)
    }

    fn destroy(&mut self, ctx: &mut RenderContext) {
        if let Some(readback) = self.readback.take() {
            readback.destroy(&*ctx.device);
        }
        self.pending = false;
    }

    fn flush(
        &mut self,
        device: &dyn GfxDevice,
        recorder: Option<&mut (dyn FrameRecorder + 'static)>,
    ) -> GraphResult<()> {
        self.deliver(device, recorder)
    }
}
