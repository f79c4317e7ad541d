use ash::vk;

use crate::commands::{command_buffer::GfxCommandBuffer, semaphore::GfxSemaphore};

/// 一个等待或 signal 的 semaphore 及其管线阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GfxSemaphoreSubmit {
    pub semaphore: vk::Semaphore,
    pub stage: vk::PipelineStageFlags2,
}

/// Gfx 关于 submitInfo 的封装，更易用
///
/// 只保存数据，具体的 `vk::SubmitInfo2` 由设备在提交时组装
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GfxSubmitInfo {
    command_buffers: Vec<vk::CommandBuffer>,
    wait_infos: Vec<GfxSemaphoreSubmit>,
    signal_infos: Vec<GfxSemaphoreSubmit>,
}

// new & init
impl GfxSubmitInfo {
    pub fn new(commands: &[&GfxCommandBuffer]) -> Self {
        Self {
            command_buffers: commands.iter().map(|cmd| cmd.vk_handle()).collect(),
            wait_infos: vec![],
            signal_infos: vec![],
        }
    }
}

// builder
impl GfxSubmitInfo {
    #[inline]
    pub fn wait(mut self, semaphore: &GfxSemaphore, stage: vk::PipelineStageFlags2) -> Self {
        self.wait_infos.push(GfxSemaphoreSubmit {
            semaphore: semaphore.handle(),
            stage,
        });
        self
    }

    #[inline]
    pub fn signal(mut self, semaphore: &GfxSemaphore, stage: vk::PipelineStageFlags2) -> Self {
        self.signal_infos.push(GfxSemaphoreSubmit {
            semaphore: semaphore.handle(),
            stage,
        });
        self
    }
}

// getters
impl GfxSubmitInfo {
    #[inline]
    pub fn command_buffers(&self) -> &[vk::CommandBuffer] {
        &self.command_buffers
    }

    #[inline]
    pub fn wait_infos(&self) -> &[GfxSemaphoreSubmit] {
        &self.wait_infos
    }

    #[inline]
    pub fn signal_infos(&self) -> &[GfxSemaphoreSubmit] {
        &self.signal_infos
    }
}
