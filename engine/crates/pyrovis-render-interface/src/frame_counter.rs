use std::time::{Duration, Instant};

pub struct FrameCounter {
    /// 当前的帧序号，一直累加
    frame_id: u64,

    last_frame: Instant,
    /// 上一帧的耗时
    delta: Duration,
}
impl Default for FrameCounter {
    fn default() -> Self {
        Self::new()
    }
}
// new & init
impl FrameCounter {
    pub fn new() -> Self {
        Self {
            frame_id: 0,
            last_frame: Instant::now(),
            delta: Duration::ZERO,
        }
    }
}
// update
impl FrameCounter {
    /// 一帧结束时调用
    #[inline]
    pub fn next_frame(&mut self) {
        let now = Instant::now();
        self.delta = now - self.last_frame;
        self.last_frame = now;
        self.frame_id = self.frame_id.wrapping_add(1);
    }
}
// getters
impl FrameCounter {
    /// 同时只有一帧在 GPU 上执行
    pub const MAX_FRAMES_IN_FLIGHT: usize = 1;

    #[inline]
    pub fn frame_id(&self) -> u64 {
        self.frame_id
    }

    /// 第 0 帧时计算侧还没有产生过数据，不需要等待
    #[inline]
    pub fn is_first_frame(&self) -> bool {
        self.frame_id == 0
    }

    #[inline]
    pub fn delta_time(&self) -> Duration {
        self.delta
    }

    #[inline]
    pub fn frame_name(&self) -> String {
        format!("[F{}]", self.frame_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_frames() {
        let mut counter = FrameCounter::new();
        assert!(counter.is_first_frame());
        counter.next_frame();
        counter.next_frame();
        assert_eq!(counter.frame_id(), 2);
        assert!(!counter.is_first_frame());
        assert_eq!(counter.frame_name(), "[F2]");
    }
}
