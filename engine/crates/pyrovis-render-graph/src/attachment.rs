use ash::vk;
use indexmap::IndexMap;

use crate::error::{GraphError, GraphResult};

/// 当前可呈现的 swapchain image，不会被实例化为 graph 持有的 attachment
pub const SWAPCHAIN_ATTACHMENT: &str = "swapchain";

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AttachmentType: u8 {
        const COLOR = 1;
        const DEPTH = 2;
        /// 需要被采样，创建时会附带 sampler 并注册到 bindless 表
        const SAMPLER = 4;
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AttachmentRw: u8 {
        const READ = 1;
        const WRITE = 2;
    }
}

/// 节点对一个逻辑 attachment 的需求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentDescription {
    /// graph 范围内的逻辑名字
    pub name: String,
    pub ty: AttachmentType,
    pub rw: AttachmentRw,
    /// 节点录制前 attachment 需要处于的 layout
    pub layout: vk::ImageLayout,
    pub usage: vk::ImageUsageFlags,
    pub format: vk::Format,
}

/// 节点内部的槽位名 -> 描述，保持声明顺序
pub type AttachmentSlots = IndexMap<&'static str, AttachmentDescription>;

// new & init
impl AttachmentDescription {
    pub fn new(
        name: impl Into<String>,
        ty: AttachmentType,
        rw: AttachmentRw,
        layout: vk::ImageLayout,
        usage: vk::ImageUsageFlags,
        format: vk::Format,
    ) -> Self {
        Self {
            name: name.into(),
            ty,
            rw,
            layout,
            usage,
            format,
        }
    }
}

// getters
impl AttachmentDescription {
    #[inline]
    pub fn is_swapchain(&self) -> bool {
        self.name == SWAPCHAIN_ATTACHMENT
    }

    #[inline]
    pub fn is_depth(&self) -> bool {
        self.ty.contains(AttachmentType::DEPTH)
    }
}

/// 合并所有节点对同名 attachment 的描述
///
/// - `swapchain` 被跳过
/// - 同名描述的 format 必须一致
/// - type、rw、usage 取并集，layout 保留第一次出现时的值
pub fn merge_descriptions<'a>(
    descriptions: impl IntoIterator<Item = &'a AttachmentDescription>,
) -> GraphResult<IndexMap<String, AttachmentDescription>> {
    let mut merged: IndexMap<String, AttachmentDescription> = IndexMap::new();

    for desc in descriptions.into_iter().filter(|desc| !desc.is_swapchain()) {
        match merged.get_mut(&desc.name) {
            Some(existing) => {
                if existing.format != desc.format {
                    return Err(GraphError::FormatConflict {
                        name: desc.name.clone(),
                        first: existing.format,
                        second: desc.format,
                    });
                }
                existing.ty |= desc.ty;
                existing.rw |= desc.rw;
                existing.usage |= desc.usage;
            }
            None => {
                merged.insert(desc.name.clone(), desc.clone());
            }
        }
    }

    Ok(merged)
}
