//! 跨 API 共享的 memory 和 semaphore
//!
//! 平台在编译期选择：unix 上导出 OPAQUE_FD，windows 上导出 OPAQUE_WIN32。

use std::ffi::CStr;

use ash::vk;

use crate::error::GfxResult;

#[cfg(unix)]
pub type RawExternalHandle = std::os::raw::c_int;
#[cfg(windows)]
pub type RawExternalHandle = vk::HANDLE;

#[cfg(unix)]
pub const EXTERNAL_MEMORY_HANDLE_TYPE: vk::ExternalMemoryHandleTypeFlags =
    vk::ExternalMemoryHandleTypeFlags::OPAQUE_FD;
#[cfg(windows)]
pub const EXTERNAL_MEMORY_HANDLE_TYPE: vk::ExternalMemoryHandleTypeFlags =
    vk::ExternalMemoryHandleTypeFlags::OPAQUE_WIN32;

#[cfg(unix)]
pub const EXTERNAL_SEMAPHORE_HANDLE_TYPE: vk::ExternalSemaphoreHandleTypeFlags =
    vk::ExternalSemaphoreHandleTypeFlags::OPAQUE_FD;
#[cfg(windows)]
pub const EXTERNAL_SEMAPHORE_HANDLE_TYPE: vk::ExternalSemaphoreHandleTypeFlags =
    vk::ExternalSemaphoreHandleTypeFlags::OPAQUE_WIN32;

/// 导出外部 memory 和 semaphore 所需的 device extensions
pub fn interop_device_extensions() -> Vec<&'static CStr> {
    let mut exts = vec![ash::khr::external_memory::NAME, ash::khr::external_semaphore::NAME];
    #[cfg(unix)]
    {
        exts.push(ash::khr::external_memory_fd::NAME);
        exts.push(ash::khr::external_semaphore_fd::NAME);
    }
    #[cfg(windows)]
    {
        exts.push(ash::khr::external_memory_win32::NAME);
        exts.push(ash::khr::external_semaphore_win32::NAME);
    }
    exts
}

/// 导出的操作系统句柄，交给计算侧导入
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExternalHandle {
    raw: RawExternalHandle,
}

impl ExternalHandle {
    #[inline]
    pub fn new(raw: RawExternalHandle) -> Self {
        Self { raw }
    }

    #[inline]
    pub fn raw(&self) -> RawExternalHandle {
        self.raw
    }
}

/// 可以导出 memory 和 semaphore 句柄的设备
///
/// 只有创建时标记为 external / exportable 的对象才能导出
pub trait GfxInterop {
    fn export_buffer_memory(&self, buffer: vk::Buffer) -> GfxResult<ExternalHandle>;
    fn export_image_memory(&self, image: vk::Image) -> GfxResult<ExternalHandle>;
    fn export_semaphore(&self, semaphore: vk::Semaphore) -> GfxResult<ExternalHandle>;
}
