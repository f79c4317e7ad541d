use std::collections::HashMap;

use anyhow::Context;
use ash::vk;
use pyrovis_crate_tools::resource::PyrovisPath;
use pyrovis_gfx::{
    resources::image::{GfxImage, GfxImageCreateInfo},
    sampler::GfxSamplerDesc,
};
use pyrovis_render_interface::{
    descriptor_manager::{DescriptorCategory, DescriptorHandle},
    render_context::RenderContext,
};

use crate::{
    config::{MaterialConfig, TextureConfig},
    scene::storage::{SceneStorage, new_host_buffer, upload_image},
};

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MaterialData {
    pub color: glam::Vec3,
    pub roughness: f32,
    pub metallic: f32,
    pub color_texture: DescriptorHandle,
    pub metallic_texture: DescriptorHandle,
    pub roughness_texture: DescriptorHandle,
    pub normal_texture: DescriptorHandle,
    pub ao_texture: DescriptorHandle,
    pub _padding: [u32; 2],
}

/// 纹理名 -> bindless handle
pub type TextureHandles = HashMap<String, DescriptorHandle>;

/// 图片解码不在引擎内完成，每个纹理先以 1x1 的白色占位
pub fn create_textures(
    ctx: &mut RenderContext,
    storage: &mut SceneStorage,
    paths: &PyrovisPath,
    configs: &[TextureConfig],
) -> anyhow::Result<TextureHandles> {
    let mut textures = TextureHandles::new();
    for config in configs {
        log::warn!(
            "texture `{}`: decoding {} is not supported, using a white placeholder",
            config.name,
            paths.resolve(&config.path).display()
        );

        let device = &*ctx.device;
        let mut image = GfxImage::new(
            device,
            &GfxImageCreateInfo::new_image_2d_info(
                vk::Extent2D { width: 1, height: 1 },
                vk::Format::R8G8B8A8_UNORM,
                vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
                &config.name,
            ),
        )?;
        let prepared = image
            .add_sampler(device, &GfxSamplerDesc::repeat())
            .and_then(|_| upload_image(device, &mut image, &[255u8; 4]));
        if let Err(e) = prepared {
            image.destroy(device);
            return Err(e).with_context(|| format!("failed to create texture `{}`", config.name));
        }

        let (_, handle) = storage.register_image(ctx, image)?;
        textures.insert(config.name.clone(), handle);
    }
    Ok(textures)
}

/// 材质名 -> 材质 buffer 的 bindless handle
pub fn create_materials(
    ctx: &mut RenderContext,
    storage: &mut SceneStorage,
    configs: &[MaterialConfig],
    textures: &TextureHandles,
) -> anyhow::Result<HashMap<String, DescriptorHandle>> {
    let texture = |name: &str| -> anyhow::Result<DescriptorHandle> {
        if name.is_empty() {
            return Ok(DescriptorHandle::NULL);
        }
        textures.get(name).copied().with_context(|| format!("unknown texture `{name}`"))
    };

    let mut materials = HashMap::new();
    for config in configs {
        let [color_texture, metallic_texture, roughness_texture, normal_texture, ao_texture] = config.texture_names();
        let data = MaterialData {
            color: config.color.into(),
            roughness: config.roughness,
            metallic: config.metallic,
            color_texture: texture(color_texture)?,
            metallic_texture: texture(metallic_texture)?,
            roughness_texture: texture(roughness_texture)?,
            normal_texture: texture(normal_texture)?,
            ao_texture: texture(ao_texture)?,
            _padding: [0; 2],
        };

        let buffer = new_host_buffer(
            &*ctx.device,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            bytemuck::bytes_of(&data),
            &format!("material-{}", config.name),
        )?;
        let (_, handle) = storage.register_buffer(ctx, buffer, DescriptorCategory::Uniform)?;
        materials.insert(config.name.clone(), handle);
    }
    Ok(materials)
}
