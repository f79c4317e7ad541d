use ash::vk;
use pyrovis_gfx::resources::{buffer::GfxBufferCreateInfo, resource_id::ResourceId};
use pyrovis_render_interface::{descriptor_manager::DescriptorCategory, render_context::RenderContext};

use crate::{
    config::{FieldConfig, FireConfig, LightConfig},
    scene::storage::{SceneStorage, new_buffer_with_data, new_host_buffer},
};

/// 点光源；shader 中按 storage buffer 的数组长度遍历
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LightData {
    pub pos_or_dir: glam::Vec3,
    pub _padding0: f32,
    pub intensity: glam::Vec3,
    pub _padding1: f32,
}

impl LightData {
    pub fn new(pos_or_dir: glam::Vec3, intensity: glam::Vec3) -> Self {
        Self {
            pos_or_dir,
            intensity,
            ..Default::default()
        }
    }
}

/// 场景光源；没有配置光源时放入一个强度为 0 的光源，避免空 buffer
pub fn create_lights(
    ctx: &mut RenderContext,
    storage: &mut SceneStorage,
    configs: &[LightConfig],
) -> anyhow::Result<ResourceId> {
    let mut lights = configs
        .iter()
        .map(|light| LightData::new(light.pos_or_dir.into(), light.intensity.into()))
        .collect::<Vec<_>>();
    if lights.is_empty() {
        lights.push(LightData::default());
    }

    let buffer =
        new_host_buffer(&*ctx.device, vk::BufferUsageFlags::STORAGE_BUFFER, bytemuck::cast_slice(&lights), "lights")?;
    let (id, _) = storage.register_buffer(ctx, buffer, DescriptorCategory::Storage)?;
    Ok(id)
}

/// 温度场内均匀分布的火焰光源，强度由物理侧写入
pub fn fire_light_grid(temperature: &FieldConfig, fire: &FireConfig) -> Vec<LightData> {
    let dim = glam::UVec3::from(fire.light_sample_dim);
    let step = glam::Vec3::from(temperature.size) / dim.as_vec3();
    let start = glam::Vec3::from(temperature.start_pos) + step * 0.5;

    let mut lights = Vec::with_capacity((dim.x * dim.y * dim.z) as usize);
    for z in 0..dim.z {
        for y in 0..dim.y {
            for x in 0..dim.x {
                let offset = glam::Vec3::new(x as f32, y as f32, z as f32) * step;
                lights.push(LightData::new(start + offset, glam::Vec3::ZERO));
            }
        }
    }
    lights
}

/// 火焰光源的 buffer 需要导出给物理侧
pub fn create_fire_lights(
    ctx: &mut RenderContext,
    storage: &mut SceneStorage,
    lights: &[LightData],
) -> anyhow::Result<ResourceId> {
    let bytes: &[u8] = bytemuck::cast_slice(lights);
    let size = bytes.len() as vk::DeviceSize;
    let info = GfxBufferCreateInfo::new(size, vk::BufferUsageFlags::STORAGE_BUFFER, "fire_lights")
        .mapped(true)
        .external(true);
    let buffer = new_buffer_with_data(&*ctx.device, &info, bytes)?;
    let (id, _) = storage.register_buffer(ctx, buffer, DescriptorCategory::Storage)?;
    Ok(id)
}

/// 自发光采样点，w 分量为 0
pub fn create_self_illumination_lights(
    ctx: &mut RenderContext,
    storage: &mut SceneStorage,
    positions: &[[f32; 3]],
) -> anyhow::Result<Option<ResourceId>> {
    if positions.is_empty() {
        return Ok(None);
    }
    let points = positions.iter().map(|&[x, y, z]| glam::Vec4::new(x, y, z, 0.0)).collect::<Vec<_>>();
    let buffer = new_host_buffer(
        &*ctx.device,
        vk::BufferUsageFlags::STORAGE_BUFFER,
        bytemuck::cast_slice(&points),
        "self_illumination_lights",
    )?;
    let (id, _) = storage.register_buffer(ctx, buffer, DescriptorCategory::Storage)?;
    Ok(Some(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FieldDataType;

    #[test]
    fn grid_is_centered_in_cells() {
        let temperature = FieldConfig {
            name: "temperature".to_string(),
            path: None,
            data_type: FieldDataType::Temperature,
            start_pos: [-1.0, 0.0, -1.0],
            size: [2.0, 2.0, 2.0],
            dimension: [16, 16, 16],
            scatter: [0.0; 3],
            absorption: [0.0; 3],
        };
        let fire = FireConfig {
            light_sample_dim: [2, 1, 2],
            ..Default::default()
        };

        let lights = fire_light_grid(&temperature, &fire);
        assert_eq!(lights.len(), 4);
        assert_eq!(lights[0].pos_or_dir, glam::Vec3::new(-0.5, 1.0, -0.5));
        assert_eq!(lights[1].pos_or_dir, glam::Vec3::new(0.5, 1.0, -0.5));
        assert_eq!(lights[3].pos_or_dir, glam::Vec3::new(0.5, 1.0, 0.5));
        assert!(lights.iter().all(|light| light.intensity == glam::Vec3::ZERO));
        assert_eq!(size_of::<LightData>(), 32);
    }
}
