use ash::vk;

use crate::{device::GfxDevice, error::GfxResult, interop::ExternalHandle};

/// # Destroy
/// 可以 Clone，需要手动 destroy
#[derive(Clone, Debug)]
pub struct GfxSemaphore {
    semaphore: vk::Semaphore,
    exportable: bool,
}

// 创建与销毁
impl GfxSemaphore {
    pub fn new(device: &dyn GfxDevice, debug_name: &str) -> GfxResult<Self> {
        let semaphore = device.create_semaphore(false, debug_name)?;
        Ok(Self {
            semaphore,
            exportable: false,
        })
    }

    /// 可以导出给其他 API 的 semaphore
    pub fn new_exportable(device: &dyn GfxDevice, debug_name: &str) -> GfxResult<Self> {
        let semaphore = device.create_semaphore(true, debug_name)?;
        Ok(Self {
            semaphore,
            exportable: true,
        })
    }

    #[inline]
    pub fn destroy(self, device: &dyn GfxDevice) {
        device.destroy_semaphore(self.semaphore);
    }
}

// getters
impl GfxSemaphore {
    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }

    #[inline]
    pub fn is_exportable(&self) -> bool {
        self.exportable
    }
}

// tools
impl GfxSemaphore {
    #[inline]
    pub fn export(&self, device: &dyn GfxDevice) -> GfxResult<ExternalHandle> {
        device.export_semaphore(self.semaphore)
    }
}
