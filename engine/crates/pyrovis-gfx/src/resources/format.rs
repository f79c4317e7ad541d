use ash::vk;

use crate::error::{GfxError, GfxResult};

/// Vulkan 格式相关的工具类
pub struct VulkanFormatUtils;
impl VulkanFormatUtils {
    /// 计算指定 Vulkan 格式下每个像素需要的字节数
    ///
    /// 只覆盖引擎中用到的格式，其余格式返回错误
    pub fn pixel_size_in_bytes(format: vk::Format) -> GfxResult<u32> {
        let size = match format {
            vk::Format::R8_UNORM | vk::Format::R8_SRGB => 1,
            vk::Format::R8G8_UNORM => 2,
            vk::Format::R8G8B8A8_UNORM
            | vk::Format::R8G8B8A8_SRGB
            | vk::Format::B8G8R8A8_UNORM
            | vk::Format::B8G8R8A8_SRGB
            | vk::Format::A2B10G10R10_UNORM_PACK32
            | vk::Format::R32_SFLOAT
            | vk::Format::D32_SFLOAT
            | vk::Format::D24_UNORM_S8_UINT => 4,
            vk::Format::D32_SFLOAT_S8_UINT => 5,
            vk::Format::R16G16B16A16_SFLOAT | vk::Format::R16G16B16A16_UNORM | vk::Format::R32G32_SFLOAT => 8,
            vk::Format::R32G32B32_SFLOAT => 12,
            vk::Format::R32G32B32A32_SFLOAT => 16,
            _ => return Err(GfxError::Unsupported(format!("unsupported format: {format:?}"))),
        };
        Ok(size)
    }

    #[inline]
    pub fn is_depth_format(format: vk::Format) -> bool {
        matches!(
            format,
            vk::Format::D16_UNORM
                | vk::Format::D32_SFLOAT
                | vk::Format::D16_UNORM_S8_UINT
                | vk::Format::D24_UNORM_S8_UINT
                | vk::Format::D32_SFLOAT_S8_UINT
        )
    }

    #[inline]
    pub fn has_stencil(format: vk::Format) -> bool {
        matches!(
            format,
            vk::Format::D16_UNORM_S8_UINT | vk::Format::D24_UNORM_S8_UINT | vk::Format::D32_SFLOAT_S8_UINT
        )
    }

    /// 由格式推导 image aspect
    pub fn aspect_of(format: vk::Format) -> vk::ImageAspectFlags {
        if Self::has_stencil(format) {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        } else if Self::is_depth_format(format) {
            vk::ImageAspectFlags::DEPTH
        } else {
            vk::ImageAspectFlags::COLOR
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_sizes() {
        assert_eq!(VulkanFormatUtils::pixel_size_in_bytes(vk::Format::B8G8R8A8_UNORM).unwrap(), 4);
        assert_eq!(VulkanFormatUtils::pixel_size_in_bytes(vk::Format::R32G32B32A32_SFLOAT).unwrap(), 16);
        assert!(VulkanFormatUtils::pixel_size_in_bytes(vk::Format::BC7_SRGB_BLOCK).is_err());
    }

    #[test]
    fn depth_aspect() {
        assert_eq!(VulkanFormatUtils::aspect_of(vk::Format::D32_SFLOAT), vk::ImageAspectFlags::DEPTH);
        assert_eq!(
            VulkanFormatUtils::aspect_of(vk::Format::D24_UNORM_S8_UINT),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
        assert_eq!(VulkanFormatUtils::aspect_of(vk::Format::R8G8B8A8_UNORM), vk::ImageAspectFlags::COLOR);
    }
}
