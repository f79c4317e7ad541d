use pyrovis_gfx::{error::GfxError, resources::resource_id::ResourceId};

use crate::descriptor_manager::DescriptorCategory;

/// 资源注册表的错误
#[derive(thiserror::Error, Debug)]
pub enum DescriptorError {
    /// 某个类别的 1024 个槽位全部被占用，属于致命错误
    #[error("bindless category {0:?} is exhausted")]
    CategoryExhausted(DescriptorCategory),

    #[error("resource {0} is not registered")]
    UnknownResource(ResourceId),

    #[error("resource {0} is already registered")]
    AlreadyRegistered(ResourceId),

    #[error("{kind} can not be registered as {category:?}")]
    WrongCategory {
        kind: &'static str,
        category: DescriptorCategory,
    },

    #[error("image {0} has no sampler")]
    MissingSampler(ResourceId),

    #[error("parameter buffer {0} is not registered")]
    UnknownParameter(ResourceId),

    #[error(transparent)]
    Gfx(#[from] GfxError),
}

pub type DescriptorResult<T> = Result<T, DescriptorError>;
