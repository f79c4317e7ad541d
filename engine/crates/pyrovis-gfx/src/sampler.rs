use ash::vk;

/// sampler 的创建参数
///
/// 默认配置：linear 过滤，clamp to border，黑色边界
#[derive(Debug, Clone, PartialEq)]
pub struct GfxSamplerDesc {
    pub mag_filter: vk::Filter,
    pub min_filter: vk::Filter,
    pub mipmap_mode: vk::SamplerMipmapMode,
    pub address_mode: vk::SamplerAddressMode,
    pub border_color: vk::BorderColor,
    pub max_lod: f32,
    pub name: String,
}

impl Default for GfxSamplerDesc {
    fn default() -> Self {
        Self {
            mag_filter: vk::Filter::LINEAR,
            min_filter: vk::Filter::LINEAR,
            mipmap_mode: vk::SamplerMipmapMode::LINEAR,
            address_mode: vk::SamplerAddressMode::CLAMP_TO_BORDER,
            border_color: vk::BorderColor::INT_OPAQUE_BLACK,
            max_lod: 1.0,
            name: "default-sampler".to_string(),
        }
    }
}

impl GfxSamplerDesc {
    /// 用于纹理贴图：linear，repeat
    pub fn repeat() -> Self {
        Self {
            address_mode: vk::SamplerAddressMode::REPEAT,
            name: "repeat-sampler".to_string(),
            ..Default::default()
        }
    }

    pub fn as_info(&self) -> vk::SamplerCreateInfo<'static> {
        vk::SamplerCreateInfo::default()
            .mag_filter(self.mag_filter)
            .min_filter(self.min_filter)
            .address_mode_u(self.address_mode)
            .address_mode_v(self.address_mode)
            .address_mode_w(self.address_mode)
            .anisotropy_enable(false)
            .max_anisotropy(1.0)
            .border_color(self.border_color)
            .unnormalized_coordinates(false)
            .compare_enable(false)
            .compare_op(vk::CompareOp::ALWAYS)
            .mipmap_mode(self.mipmap_mode)
            .mip_lod_bias(0.0)
            .min_lod(0.0)
            .max_lod(self.max_lod)
    }
}
