//! 体积场
//!
//! 每个场有一个 uniform 属性 buffer（[`FieldData`]）和一个 external 的 storage buffer，
//! 后者保存体素数据，由物理侧写入。

use anyhow::Context;
use ash::vk;
use pyrovis_gfx::resources::{
    buffer::GfxBufferCreateInfo,
    image::{GfxImage, GfxImageCreateInfo},
    resource_id::ResourceId,
};
use pyrovis_render_interface::{
    descriptor_manager::{DescriptorCategory, DescriptorHandle},
    render_context::RenderContext,
};

use crate::{
    config::{FieldConfig, FieldDataType, FieldsConfig},
    scene::storage::{SceneStorage, new_buffer_with_data, new_host_buffer, upload_image},
};

pub const MAX_FIELDS: usize = 2;

/// 火焰颜色表的采样数
pub const FIRE_COLOR_SAMPLES: u32 = 256;

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FieldData {
    /// 世界坐标到 [0, 1]^3 的变换
    pub to_local_uvw: glam::Mat4,
    pub scatter: glam::Vec3,
    pub data_type: u32,
    pub absorption: glam::Vec3,
    pub _padding0: f32,
    pub aabb_min: glam::Vec3,
    pub _padding1: f32,
    pub aabb_max: glam::Vec3,
    pub _padding2: f32,
    pub dimension: [u32; 3],
    pub _padding3: u32,
}

impl FieldData {
    pub fn from_config(config: &FieldConfig) -> Self {
        let start = glam::Vec3::from(config.start_pos);
        let size = glam::Vec3::from(config.size);
        Self {
            to_local_uvw: Self::to_local_uvw(start, size),
            scatter: config.scatter.into(),
            data_type: match config.data_type {
                FieldDataType::Concentration => 0,
                FieldDataType::Temperature => 1,
            },
            absorption: config.absorption.into(),
            _padding0: 0.0,
            aabb_min: start,
            _padding1: 0.0,
            aabb_max: start + size,
            _padding2: 0.0,
            dimension: config.dimension,
            _padding3: 0,
        }
    }

    pub fn to_local_uvw(start: glam::Vec3, size: glam::Vec3) -> glam::Mat4 {
        glam::Mat4::from_scale(size.recip()) * glam::Mat4::from_translation(-start)
    }

    pub fn voxel_count(&self) -> u64 {
        self.dimension.iter().map(|&d| d as u64).product()
    }
}

/// 场的参数 buffer；每个 handle 占 16 字节，与 std140 的数组步长一致
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FieldsParam {
    pub attr: [DescriptorHandle; MAX_FIELDS * 4],
    pub data: [DescriptorHandle; MAX_FIELDS * 4],
}

impl Default for FieldsParam {
    fn default() -> Self {
        Self {
            attr: [DescriptorHandle::NULL; MAX_FIELDS * 4],
            data: [DescriptorHandle::NULL; MAX_FIELDS * 4],
        }
    }
}

/// 场景中所有场对应的 GPU 资源
pub struct SceneFields {
    pub parameter: ResourceId,
    pub fire_color: ResourceId,
    pub step: f32,
    /// 体素数据 buffer，按配置顺序
    pub data_buffers: Vec<ResourceId>,
}

/// 黑体辐射近似的颜色表：黑 -> 红 -> 黄 -> 白
pub fn fire_color_ramp(samples: u32) -> Vec<glam::Vec4> {
    (0..samples)
        .map(|i| {
            let t = i as f32 / (samples.max(2) - 1) as f32;
            glam::Vec4::new(
                (3.0 * t).clamp(0.0, 1.0),
                (3.0 * t - 1.0).clamp(0.0, 1.0),
                (3.0 * t - 2.0).clamp(0.0, 1.0),
                1.0,
            )
        })
        .collect()
}

pub fn create_fields(
    ctx: &mut RenderContext,
    storage: &mut SceneStorage,
    config: &FieldsConfig,
) -> anyhow::Result<Option<SceneFields>> {
    if config.arr.is_empty() {
        return Ok(None);
    }

    let mut param = FieldsParam::default();
    let mut data_buffers = Vec::with_capacity(config.arr.len());
    for (index, field) in config.arr.iter().enumerate().take(MAX_FIELDS) {
        let data = FieldData::from_config(field);
        let attr = new_host_buffer(
            &*ctx.device,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            bytemuck::bytes_of(&data),
            &format!("{}-attr", field.name),
        )?;
        let (_, attr_handle) = storage.register_buffer(ctx, attr, DescriptorCategory::Uniform)?;

        let zeros = vec![0u8; (data.voxel_count() * size_of::<f32>() as u64) as usize];
        let info = GfxBufferCreateInfo::new(
            zeros.len() as vk::DeviceSize,
            vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
            &field.name,
        )
        .external(true);
        let voxels = new_buffer_with_data(&*ctx.device, &info, &zeros)
            .with_context(|| format!("failed to create field `{}`", field.name))?;
        let (data_id, data_handle) = storage.register_buffer(ctx, voxels, DescriptorCategory::Storage)?;

        param.attr[index * 4] = attr_handle;
        param.data[index * 4] = data_handle;
        data_buffers.push(data_id);
    }

    let fire_color = create_fire_color(ctx, storage, config)?;

    let param_buffer = new_host_buffer(
        &*ctx.device,
        vk::BufferUsageFlags::UNIFORM_BUFFER,
        bytemuck::bytes_of(&param),
        "fields-param",
    )?;
    let parameter = storage.register_parameter(ctx, param_buffer)?;

    Ok(Some(SceneFields {
        parameter,
        fire_color,
        step: config.step,
        data_buffers,
    }))
}

fn create_fire_color(
    ctx: &mut RenderContext,
    storage: &mut SceneStorage,
    config: &FieldsConfig,
) -> anyhow::Result<ResourceId> {
    if let Some(path) = &config.fire_configuration.fire_colors_path {
        log::warn!("fire colors {}: decoding is not supported, using the built-in ramp", path.display());
    }

    let device = &*ctx.device;
    let mut image = GfxImage::new(
        device,
        &GfxImageCreateInfo::new_image_2d_info(
            vk::Extent2D {
                width: FIRE_COLOR_SAMPLES,
                height: 1,
            },
            vk::Format::R32G32B32A32_SFLOAT,
            vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
            "fire_color",
        ),
    )?;
    let ramp = fire_color_ramp(FIRE_COLOR_SAMPLES);
    let prepared = image
        .add_sampler(device, &Default::default())
        .and_then(|_| upload_image(device, &mut image, bytemuck::cast_slice(&ramp)));
    if let Err(e) = prepared {
        image.destroy(device);
        return Err(e).context("failed to create fire color image");
    }

    let (id, _) = storage.register_image(ctx, image)?;
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_uvw_maps_aabb_to_unit_cube() {
        let start = glam::Vec3::new(-1.0, 0.0, 2.0);
        let size = glam::Vec3::new(2.0, 4.0, 1.0);
        let mat = FieldData::to_local_uvw(start, size);
        assert!(mat.transform_point3(start).abs_diff_eq(glam::Vec3::ZERO, 1e-6));
        assert!(mat.transform_point3(start + size).abs_diff_eq(glam::Vec3::ONE, 1e-6));
        assert_eq!(size_of::<FieldData>(), 144);
        assert_eq!(size_of::<FieldsParam>(), 64);
    }

    #[test]
    fn ramp_goes_from_black_to_white() {
        let ramp = fire_color_ramp(FIRE_COLOR_SAMPLES);
        assert_eq!(ramp.len(), 256);
        assert_eq!(ramp[0], glam::Vec4::new(0.0, 0.0, 0.0, 1.0));
        assert_eq!(ramp[255], glam::Vec4::ONE);
        assert!(ramp.windows(2).all(|pair| pair[1].x >= pair[0].x && pair[1].z >= pair[0].z));
    }
}
