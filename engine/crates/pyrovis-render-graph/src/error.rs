use std::path::PathBuf;

use ash::vk;
use pyrovis_gfx::error::GfxError;
use pyrovis_render_interface::error::DescriptorError;

use crate::attachment::AttachmentType;

#[derive(thiserror::Error, Debug)]
pub enum AttachmentError {
    #[error("`swapchain` is reserved and can not be used as an owned attachment")]
    Reserved,

    #[error("attachment `{0}` not found")]
    NotFound(String),

    #[error("attachment `{0}` already exists")]
    Duplicate(String),

    /// 只有 Sampler 而没有 Color / Depth 的类型无法确定 aspect
    #[error("attachment `{name}` has invalid type {ty:?}")]
    InvalidType { name: String, ty: AttachmentType },

    #[error(transparent)]
    Gfx(#[from] GfxError),

    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
}

/// render graph 构建与执行过程中的错误
#[derive(thiserror::Error, Debug)]
pub enum GraphError {
    #[error("attachment `{name}` declared with conflicting formats {first:?} and {second:?}")]
    FormatConflict {
        name: String,
        first: vk::Format,
        second: vk::Format,
    },

    #[error("node `{node}` depends on unknown node `{dependency}`")]
    UnknownDependency { node: String, dependency: String },

    #[error("edge map references unknown node `{0}`")]
    UnknownNode(String),

    #[error("node `{0}` is added twice")]
    DuplicateNode(String),

    /// 携带所有没能进入拓扑序的节点
    #[error("render graph contains a cycle through {0:?}")]
    Cycle(Vec<String>),

    #[error("render pass `{0}` declares more than one depth attachment")]
    MultipleDepth(String),

    #[error("node `{node}` has no attachment slot `{slot}`")]
    UnknownSlot { node: String, slot: String },

    #[error("node `{0}` is used before init")]
    NotInitialized(String),

    #[error("frame recorder failed: {0}")]
    Recorder(#[source] std::io::Error),

    #[error("unknown render graph variant `{0}`")]
    UnknownVariant(String),

    #[error("shader `{0}` not found")]
    ShaderNotFound(String),

    #[error("failed to read shader `{path}`: {source}")]
    ShaderIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Attachment(#[from] AttachmentError),

    #[error(transparent)]
    Descriptor(#[from] DescriptorError),

    #[error(transparent)]
    Gfx(#[from] GfxError),
}

pub type GraphResult<T> = Result<T, GraphError>;
