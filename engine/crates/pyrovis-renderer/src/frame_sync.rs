use pyrovis_gfx::{
    commands::{command_buffer::GfxCommandBuffer, fence::GfxFence, semaphore::GfxSemaphore},
    device::GfxDevice,
};
use pyrovis_render_interface::frame_counter::FrameCounter;

use crate::error::RendererResult;

/// 一个 in-flight 帧使用的同步对象
///
/// 同时只有 [`FrameCounter::MAX_FRAMES_IN_FLIGHT`] 帧在 GPU 上执行，因此只需要一组
pub struct FrameSync {
    /// acquire 完成后 signal
    pub image_available: GfxSemaphore,
    /// 图形提交完成后 signal，present 等待
    pub render_finished: GfxSemaphore,
    /// 创建时就是 signaled，第一帧不会阻塞
    pub in_flight: GfxFence,
    pub cmd: GfxCommandBuffer,
}

// new & init
impl FrameSync {
    pub fn new(device: &dyn GfxDevice) -> RendererResult<Self> {
        debug_assert_eq!(FrameCounter::MAX_FRAMES_IN_FLIGHT, 1);

        let image_available = GfxSemaphore::new(device, "image-available")?;
        let render_finished = GfxSemaphore::new(device, "render-finished")?;
        let in_flight = GfxFence::new(device, true, "frame-in-flight")?;
        let cmd = GfxCommandBuffer::new(device, "frame")?;
        Ok(Self {
            image_available,
            render_finished,
            in_flight,
            cmd,
        })
    }
}

// destroy
impl FrameSync {
    pub fn destroy(self, device: &dyn GfxDevice) {
        self.image_available.destroy(device);
        self.render_finished.destroy(device);
        self.in_flight.destroy(device);
        self.cmd.free(device);
    }
}
