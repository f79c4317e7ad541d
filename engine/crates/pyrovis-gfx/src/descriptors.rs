use ash::vk;

/// descriptor set layout 中的一个 binding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GfxDescriptorBinding {
    pub binding: u32,
    pub ty: vk::DescriptorType,
    pub count: u32,
    pub stages: vk::ShaderStageFlags,
    /// bindless 表使用 PARTIALLY_BOUND，未写入的槽位不会被校验
    pub bindless: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GfxDescriptorSetLayoutDesc {
    pub bindings: Vec<GfxDescriptorBinding>,
    pub name: String,
}

impl GfxDescriptorSetLayoutDesc {
    #[inline]
    pub fn is_bindless(&self) -> bool {
        self.bindings.iter().any(|binding| binding.bindless)
    }
}

#[derive(Debug, Clone)]
pub struct GfxDescriptorPoolDesc {
    pub sizes: Vec<vk::DescriptorPoolSize>,
    pub max_sets: u32,
    pub flags: vk::DescriptorPoolCreateFlags,
    pub name: String,
}

/// 写入 descriptor 的资源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GfxDescriptorInfo {
    Buffer {
        ty: vk::DescriptorType,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        range: vk::DeviceSize,
    },
    CombinedImageSampler {
        sampler: vk::Sampler,
        view: vk::ImageView,
        layout: vk::ImageLayout,
    },
}

impl GfxDescriptorInfo {
    #[inline]
    pub fn descriptor_type(&self) -> vk::DescriptorType {
        match self {
            Self::Buffer { ty, .. } => *ty,
            Self::CombinedImageSampler { .. } => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GfxDescriptorWrite {
    pub set: vk::DescriptorSet,
    pub binding: u32,
    pub array_element: u32,
    pub info: GfxDescriptorInfo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GfxDescriptorCopy {
    pub src_set: vk::DescriptorSet,
    pub src_binding: u32,
    pub dst_set: vk::DescriptorSet,
    pub dst_binding: u32,
    pub count: u32,
}
