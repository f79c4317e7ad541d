use ash::vk;

/// GFX 层的错误类型
///
/// 携带失败的操作名，以及 Vulkan 返回值（如果有）
#[derive(thiserror::Error, Debug)]
pub enum GfxError {
    #[error("vulkan call `{op}` failed: {result:?}")]
    Vk { op: &'static str, result: vk::Result },

    #[error("failed to load vulkan entry: {0}")]
    Loading(String),

    #[error("no suitable physical device: {0}")]
    NoSuitableDevice(String),

    /// 拷贝或写入越界，在触碰内存或记录命令之前检测
    #[error("out of range: {0}")]
    OutOfRange(String),

    #[error("unsupported image layout: {0:?}")]
    UnsupportedLayout(vk::ImageLayout),

    #[error("descriptor pool exhausted")]
    PoolExhausted,

    #[error("unknown {kind} handle: {raw:#x}")]
    UnknownHandle { kind: &'static str, raw: u64 },

    #[error("{0}")]
    Unsupported(String),
}

pub type GfxResult<T> = Result<T, GfxError>;

/// 将 `VkResult` 转换为 [`GfxResult`]，附带操作名
pub trait VkResultExt<T> {
    fn vk_op(self, op: &'static str) -> GfxResult<T>;
}

impl<T> VkResultExt<T> for ash::prelude::VkResult<T> {
    #[inline]
    fn vk_op(self, op: &'static str) -> GfxResult<T> {
        self.map_err(|result| match result {
            vk::Result::ERROR_OUT_OF_POOL_MEMORY | vk::Result::ERROR_FRAGMENTED_POOL => GfxError::PoolExhausted,
            result => GfxError::Vk { op, result },
        })
    }
}

impl GfxError {
    pub fn unknown_handle(kind: &'static str, handle: impl vk::Handle) -> Self {
        Self::UnknownHandle {
            kind,
            raw: handle.as_raw(),
        }
    }
}
