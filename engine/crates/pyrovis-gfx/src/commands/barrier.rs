use ash::vk;

use crate::error::{GfxError, GfxResult};

/// 某个 image layout 对应的访问方式和管线阶段
///
/// 作为 barrier 的 src 时表示"之前的访问"，作为 dst 时表示"之后的访问"
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct GfxLayoutDependency {
    pub access: vk::AccessFlags2,
    pub stage: vk::PipelineStageFlags2,
}

impl GfxLayoutDependency {
    /// layout 与同步范围的对照表，表之外的 layout 视为错误
    pub fn of(layout: vk::ImageLayout) -> GfxResult<Self> {
        let (access, stage) = match layout {
            vk::ImageLayout::UNDEFINED => (vk::AccessFlags2::NONE, vk::PipelineStageFlags2::TOP_OF_PIPE),
            vk::ImageLayout::TRANSFER_DST_OPTIMAL => {
                (vk::AccessFlags2::TRANSFER_WRITE, vk::PipelineStageFlags2::TRANSFER)
            }
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL => {
                (vk::AccessFlags2::TRANSFER_READ, vk::PipelineStageFlags2::TRANSFER)
            }
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL => (
                vk::AccessFlags2::COLOR_ATTACHMENT_READ | vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
                vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
            ),
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL | vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL => (
                vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE,
                vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS,
            ),
            vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL | vk::ImageLayout::DEPTH_READ_ONLY_OPTIMAL => (
                vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ | vk::AccessFlags2::SHADER_READ,
                vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS
                    | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS
                    | vk::PipelineStageFlags2::FRAGMENT_SHADER,
            ),
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL => {
                (vk::AccessFlags2::SHADER_READ, vk::PipelineStageFlags2::FRAGMENT_SHADER)
            }
            vk::ImageLayout::PRESENT_SRC_KHR => (
                vk::AccessFlags2::MEMORY_READ | vk::AccessFlags2::MEMORY_WRITE,
                vk::PipelineStageFlags2::BOTTOM_OF_PIPE,
            ),
            vk::ImageLayout::GENERAL => (
                vk::AccessFlags2::MEMORY_READ | vk::AccessFlags2::MEMORY_WRITE,
                vk::PipelineStageFlags2::ALL_GRAPHICS,
            ),
            other => return Err(GfxError::UnsupportedLayout(other)),
        };
        Ok(Self { access, stage })
    }

    /// depth 专用的 layout，转换时需要使用 DEPTH aspect
    #[inline]
    pub fn is_depth_layout(layout: vk::ImageLayout) -> bool {
        matches!(
            layout,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
                | vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL
                | vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL
                | vk::ImageLayout::DEPTH_READ_ONLY_OPTIMAL
        )
    }
}

/// 便捷创建 image memory barrier 的结构体
#[derive(Clone, Copy, Debug)]
pub struct GfxImageBarrier {
    inner: vk::ImageMemoryBarrier2<'static>,
}

impl Default for GfxImageBarrier {
    fn default() -> Self {
        Self {
            inner: vk::ImageMemoryBarrier2 {
                old_layout: vk::ImageLayout::UNDEFINED,
                new_layout: vk::ImageLayout::UNDEFINED,
                src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
                dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
                subresource_range: vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::empty(),
                    base_array_layer: 0,
                    layer_count: 1,
                    base_mip_level: 0,
                    level_count: 1,
                },
                ..Default::default()
            },
        }
    }
}

// new & init
impl GfxImageBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    /// 根据 layout 对照表生成一个完整的 layout 转换 barrier
    ///
    /// 任意一端是 depth layout 时，aspect 强制为 DEPTH
    pub fn layout_transition(
        image: vk::Image,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
        aspect: vk::ImageAspectFlags,
    ) -> GfxResult<Self> {
        let src = GfxLayoutDependency::of(old_layout)?;
        let dst = GfxLayoutDependency::of(new_layout)?;

        let aspect = if GfxLayoutDependency::is_depth_layout(old_layout)
            || GfxLayoutDependency::is_depth_layout(new_layout)
        {
            aspect | vk::ImageAspectFlags::DEPTH
        } else {
            aspect
        };

        Ok(Self::new()
            .image(image)
            .layout_transfer(old_layout, new_layout)
            .src_mask(src.stage, src.access)
            .dst_mask(dst.stage, dst.access)
            .image_aspect_flag(aspect))
    }
}

// getters
impl GfxImageBarrier {
    #[inline]
    pub fn inner(&self) -> &vk::ImageMemoryBarrier2<'static> {
        &self.inner
    }

    #[inline]
    pub fn vk_image(&self) -> vk::Image {
        self.inner.image
    }

    #[inline]
    pub fn old_layout(&self) -> vk::ImageLayout {
        self.inner.old_layout
    }

    #[inline]
    pub fn new_layout(&self) -> vk::ImageLayout {
        self.inner.new_layout
    }

    #[inline]
    pub fn aspect(&self) -> vk::ImageAspectFlags {
        self.inner.subresource_range.aspect_mask
    }
}

// builder
impl GfxImageBarrier {
    #[inline]
    pub fn layout_transfer(mut self, old_layout: vk::ImageLayout, new_layout: vk::ImageLayout) -> Self {
        self.inner.old_layout = old_layout;
        self.inner.new_layout = new_layout;
        self
    }

    #[inline]
    pub fn src_mask(mut self, src_stage_mask: vk::PipelineStageFlags2, src_access_mask: vk::AccessFlags2) -> Self {
        self.inner.src_stage_mask = src_stage_mask;
        self.inner.src_access_mask = src_access_mask;
        self
    }

    #[inline]
    pub fn dst_mask(mut self, dst_stage_mask: vk::PipelineStageFlags2, dst_access_mask: vk::AccessFlags2) -> Self {
        self.inner.dst_stage_mask = dst_stage_mask;
        self.inner.dst_access_mask = dst_access_mask;
        self
    }

    /// layer 和 miplevel 都使用默认值
    #[inline]
    pub fn image_aspect_flag(mut self, aspect_mask: vk::ImageAspectFlags) -> Self {
        self.inner.subresource_range.aspect_mask = aspect_mask;
        self
    }

    #[inline]
    pub fn image(mut self, image: vk::Image) -> Self {
        self.inner.image = image;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn undefined_to_transfer_dst() {
        let image = vk::Image::from_raw(7);
        let barrier = GfxImageBarrier::layout_transition(
            image,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageAspectFlags::COLOR,
        )
        .unwrap();

        let inner = barrier.inner();
        assert_eq!(inner.src_stage_mask, vk::PipelineStageFlags2::TOP_OF_PIPE);
        assert_eq!(inner.src_access_mask, vk::AccessFlags2::NONE);
        assert_eq!(inner.dst_stage_mask, vk::PipelineStageFlags2::TRANSFER);
        assert_eq!(inner.dst_access_mask, vk::AccessFlags2::TRANSFER_WRITE);
        assert_eq!(barrier.vk_image(), image);
        assert_eq!(barrier.aspect(), vk::ImageAspectFlags::COLOR);
    }

    #[test]
    fn depth_layout_forces_depth_aspect() {
        let barrier = GfxImageBarrier::layout_transition(
            vk::Image::from_raw(1),
            vk::ImageLayout::GENERAL,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            vk::ImageAspectFlags::empty(),
        )
        .unwrap();
        assert!(barrier.aspect().contains(vk::ImageAspectFlags::DEPTH));
        assert_eq!(
            barrier.inner().dst_stage_mask,
            vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS
        );
    }

    #[test]
    fn unsupported_layout_is_an_error() {
        let result = GfxImageBarrier::layout_transition(
            vk::Image::from_raw(1),
            vk::ImageLayout::GENERAL,
            vk::ImageLayout::PREINITIALIZED,
            vk::ImageAspectFlags::COLOR,
        );
        assert!(matches!(result, Err(GfxError::UnsupportedLayout(vk::ImageLayout::PREINITIALIZED))));
    }

    #[test]
    fn present_and_general() {
        let present = GfxLayoutDependency::of(vk::ImageLayout::PRESENT_SRC_KHR).unwrap();
        assert_eq!(present.stage, vk::PipelineStageFlags2::BOTTOM_OF_PIPE);
        let general = GfxLayoutDependency::of(vk::ImageLayout::GENERAL).unwrap();
        assert_eq!(general.stage, vk::PipelineStageFlags2::ALL_GRAPHICS);
        assert_eq!(general.access, vk::AccessFlags2::MEMORY_READ | vk::AccessFlags2::MEMORY_WRITE);
    }
}
