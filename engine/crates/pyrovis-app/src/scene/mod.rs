//! 场景资源：相机、光源、材质、网格、物体和体积场
//!
//! 所有 buffer / image 由 [`SceneStorage`] 持有，通过 [`SceneSource`] 暴露给 render graph。

pub mod field;
pub mod geometry;
pub mod light;
pub mod material;
pub mod storage;

use std::collections::HashMap;

use anyhow::Context;
use ash::vk;
use pyrovis_gfx::{
    device::GfxDevice,
    error::GfxResult,
    resources::{buffer::GfxBuffer, resource_id::ResourceId},
};
use pyrovis_render_interface::{
    descriptor_manager::{DescriptorCategory, DescriptorHandle},
    render_context::RenderContext,
    scene_source::{SceneDraw, SceneField, SceneSource},
};

use crate::{
    config::{FieldDataType, MeshConfig, PyrovisConfig},
    platform::{camera::Camera, camera_controller::CameraController},
    scene::{
        field::SceneFields,
        geometry::{GeometryGenerator, MeshData},
        storage::{SceneStorage, new_device_buffer, new_host_buffer},
    },
};

/// 物体的参数 buffer
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ObjectParam {
    pub material: DescriptorHandle,
    pub _padding: [u32; 3],
}

#[derive(Debug, Clone, Copy)]
struct MeshBuffers {
    vertex_buffer: vk::Buffer,
    index_buffer: vk::Buffer,
    index_count: u32,
}

pub struct SceneResources {
    storage: SceneStorage,
    camera_controller: CameraController,

    camera: ResourceId,
    lights: ResourceId,
    fire_lights: Option<ResourceId>,
    self_illumination_lights: Option<ResourceId>,
    draws: Vec<SceneDraw>,
    fields: Option<SceneFields>,
}

// new & init
impl SceneResources {
    /// 创建失败时，已经创建的资源会被释放
    pub fn new(config: &PyrovisConfig, ctx: &mut RenderContext) -> anyhow::Result<Self> {
        let _span = tracy_client::span!("SceneResources::new");

        let mut storage = SceneStorage::default();
        match Self::create(config, ctx, &mut storage) {
            Ok(scene) => Ok(scene),
            Err(e) => {
                storage.destroy(ctx);
                Err(e)
            }
        }
    }

    fn create(config: &PyrovisConfig, ctx: &mut RenderContext, storage: &mut SceneStorage) -> anyhow::Result<Self> {
        let extent = ctx.swapchain.extent();
        let camera = Camera::from_config(&config.camera, extent.width, extent.height);
        let camera_data = camera.data();
        let camera_buffer = new_host_buffer(
            &*ctx.device,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            bytemuck::bytes_of(&camera_data),
            "camera",
        )?;
        let (camera_id, _) = storage.register_buffer(ctx, camera_buffer, DescriptorCategory::Uniform)?;

        let lights = light::create_lights(ctx, storage, &config.lights)?;

        let (fire_lights, self_illumination_lights) = match config
            .fields
            .arr
            .iter()
            .find(|field| field.data_type == FieldDataType::Temperature)
        {
            Some(temperature) => {
                let fire = &config.fields.fire_configuration;
                let grid = light::fire_light_grid(temperature, fire);
                log::info!("{} fire lights sampled from `{}`", grid.len(), temperature.name);
                (
                    Some(light::create_fire_lights(ctx, storage, &grid)?),
                    light::create_self_illumination_lights(ctx, storage, &fire.self_illumination_lights)?,
                )
            }
            None => (None, None),
        };

        let textures = material::create_textures(ctx, storage, &config.paths(), &config.textures)?;
        let materials = material::create_materials(ctx, storage, &config.materials, &textures)?;

        let mut meshes = HashMap::new();
        for mesh in &config.meshes {
            if !config.objects.iter().any(|object| object.mesh == mesh.name()) {
                log::debug!("mesh `{}` is not used by any object", mesh.name());
                continue;
            }
            let buffers = Self::create_mesh(ctx, storage, mesh)?;
            meshes.insert(mesh.name().to_string(), buffers);
        }

        let mut draws = Vec::with_capacity(config.objects.len());
        for object in &config.objects {
            let mesh = meshes
                .get(&object.mesh)
                .with_context(|| format!("object `{}` references unknown mesh `{}`", object.name, object.mesh))?;
            let material = materials.get(&object.material).copied().with_context(|| {
                format!("object `{}` references unknown material `{}`", object.name, object.material)
            })?;

            let param = ObjectParam {
                material,
                _padding: [0; 3],
            };
            let buffer = new_host_buffer(
                &*ctx.device,
                vk::BufferUsageFlags::UNIFORM_BUFFER,
                bytemuck::bytes_of(&param),
                &format!("object-{}", object.name),
            )?;
            let parameter = storage.register_parameter(ctx, buffer)?;

            draws.push(SceneDraw {
                parameter,
                vertex_buffer: mesh.vertex_buffer,
                index_buffer: mesh.index_buffer,
                index_count: mesh.index_count,
            });
        }

        let fields = field::create_fields(ctx, storage, &config.fields)?;

        log::info!(
            "scene `{}` created: {} draws, {} fields, {} buffers, {} images",
            config.name,
            draws.len(),
            config.fields.arr.len(),
            storage.buffer_count(),
            storage.image_count()
        );

        Ok(Self {
            storage: std::mem::take(storage),
            camera_controller: CameraController::new(camera),
            camera: camera_id,
            lights,
            fire_lights,
            self_illumination_lights,
            draws,
            fields,
        })
    }

    fn create_mesh(
        ctx: &mut RenderContext,
        storage: &mut SceneStorage,
        mesh: &MeshConfig,
    ) -> anyhow::Result<MeshBuffers> {
        let data: MeshData = match mesh {
            MeshConfig::Sphere {
                name,
                pos,
                radius,
                tessellation,
            } => {
                let tessellation = tessellation.round() as i64;
                if tessellation < 3 {
                    anyhow::bail!("mesh `{name}`: tessellation must be at least 3, got {tessellation}");
                }
                GeometryGenerator::sphere((*pos).into(), *radius, tessellation as u32)
            }
            MeshConfig::Cube { pos, scale, .. } => GeometryGenerator::cube((*pos).into(), (*scale).into()),
            MeshConfig::Plane { pos, normal, size, .. } => {
                GeometryGenerator::plane((*pos).into(), (*normal).into(), *size)
            }
            MeshConfig::Obj { name, path } => {
                anyhow::bail!("mesh `{name}`: loading {} is not supported", path.display())
            }
        };

        let name = mesh.name();
        let device = &*ctx.device;
        let vertex = new_device_buffer(
            device,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            bytemuck::cast_slice(&data.vertices),
            &format!("{name}-vertex"),
        )?;
        let vertex_buffer = vertex.vk_buffer();
        storage.add_buffer(vertex);

        let index = new_device_buffer(
            device,
            vk::BufferUsageFlags::INDEX_BUFFER,
            bytemuck::cast_slice(&data.indices),
            &format!("{name}-index"),
        )?;
        let index_buffer = index.vk_buffer();
        storage.add_buffer(index);

        Ok(MeshBuffers {
            vertex_buffer,
            index_buffer,
            index_count: data.indices.len() as u32,
        })
    }
}

// getters
impl SceneResources {
    #[inline]
    pub fn camera_controller(&self) -> &CameraController {
        &self.camera_controller
    }

    #[inline]
    pub fn camera_controller_mut(&mut self) -> &mut CameraController {
        &mut self.camera_controller
    }

    #[inline]
    pub fn storage(&self) -> &SceneStorage {
        &self.storage
    }

    /// 需要导出给物理侧的 buffer：火焰光源在前，之后是各个场的体素数据
    pub fn shared_buffers(&self) -> Vec<&GfxBuffer> {
        let fields = self.fields.iter().flat_map(|fields| fields.data_buffers.iter());
        self.fire_lights.iter().chain(fields).filter_map(|&id| self.storage.buffer(id)).collect()
    }
}

// tools
impl SceneResources {
    /// 把相机的当前状态写入 uniform buffer
    pub fn update_camera(&self, device: &dyn GfxDevice) -> GfxResult<()> {
        if let Some(buffer) = self.storage.buffer(self.camera) {
            buffer.update_pod(device, &self.camera_controller.camera().data())?;
        }
        Ok(())
    }
}

// destroy
impl SceneResources {
    pub fn destroy(self, ctx: &mut RenderContext) {
        self.storage.destroy(ctx);
    }
}

impl SceneSource for SceneResources {
    fn camera(&self) -> ResourceId {
        self.camera
    }

    fn lights(&self) -> ResourceId {
        self.lights
    }

    fn fire_lights(&self) -> Option<ResourceId> {
        self.fire_lights
    }

    fn self_illumination_lights(&self) -> Option<ResourceId> {
        self.self_illumination_lights
    }

    fn draws(&self) -> Vec<SceneDraw> {
        self.draws.clone()
    }

    fn field(&self) -> Option<SceneField> {
        self.fields.as_ref().map(|fields| SceneField {
            parameter: fields.parameter,
            fire_color: fields.fire_color,
            step: fields.step,
        })
    }

    fn on_resize(&mut self, device: &dyn GfxDevice, extent: vk::Extent2D) -> GfxResult<()> {
        self.camera_controller.camera_mut().set_extent(extent.width, extent.height);
        self.update_camera(device)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use pyrovis_gfx::headless::HeadlessDevice;

    use super::*;
    use crate::platform::camera::CameraData;

    pub(crate) const FIRE_SCENE: &str = r#"{
        "name": "candle",
        "render_graph": "fire",
        "camera": { "position": [0, 1, 4], "view": [0, 0, -1], "fov": 60, "move_speed": 2 },
        "objects": [
            { "name": "floor", "mesh": "floor_mesh", "material": "grey" },
            { "name": "ball", "mesh": "ball_mesh", "material": "wood" }
        ],
        "meshes": [
            { "type": "plane", "name": "floor_mesh", "pos": [0, 0, 0], "normal": [0, 1, 0], "size": [10, 10] },
            { "type": "sphere", "name": "ball_mesh", "pos": [0, 1, 0], "radius": 0.5, "tessellation": 8.0 },
            { "type": "obj", "name": "unused", "path": "models/bunny.obj" }
        ],
        "materials": [
            { "name": "grey", "roughness": 0.8, "color": [0.5, 0.5, 0.5] },
            { "name": "wood", "color_texture": "wood_color" }
        ],
        "textures": [ { "name": "wood_color", "path": "textures/wood.png" } ],
        "lights": [ { "posOrDir": [1, 3, 1], "intensity": [10, 10, 10] } ],
        "fields": {
            "step": 0.02,
            "arr": [
                { "name": "density", "data_type": "concentration", "start_pos": [-1, 0, -1],
                  "size": [2, 2, 2], "dimension": [8, 8, 8] },
                { "name": "temperature", "data_type": "temperature", "start_pos": [-1, 0, -1],
                  "size": [2, 2, 2], "dimension": [8, 8, 8] }
            ],
            "fire_configuration": { "light_sample_dim": [2, 1, 2], "self_illumination_lights": [[0, 1, 0]] }
        }
    }"#;

    fn camera_bytes(device: &HeadlessDevice, scene: &SceneResources) -> Vec<u8> {
        let buffer = scene.storage().buffer(scene.camera()).unwrap();
        device.buffer_bytes(buffer.vk_buffer()).unwrap()
    }

    #[test]
    fn fire_scene_resources() {
        let device = HeadlessDevice::new();
        let mut ctx = RenderContext::new(Box::new(device.clone()), true).unwrap();
        let config = PyrovisConfig::from_json(FIRE_SCENE).unwrap();

        let mut scene = SceneResources::new(&config, &mut ctx).unwrap();
        let draws = scene.draws();
        assert_eq!(draws.len(), 2);
        assert_eq!(draws[0].index_count, 6);
        assert_eq!(draws[1].index_count, 6 * 8 * 7);
        assert!(scene.fire_lights().is_some());
        assert!(scene.self_illumination_lights().is_some());
        let field = scene.field().unwrap();
        assert_eq!(field.step, 0.02);

        // 火焰光源 + 两个场
        let shared = scene.shared_buffers();
        assert_eq!(shared.len(), 3);
        assert!(shared.iter().all(|buffer| buffer.is_external()));
        assert_eq!(shared[0].size(), 4 * size_of::<light::LightData>() as u64);
        assert_eq!(shared[1].size(), 8 * 8 * 8 * 4);

        for id in [scene.camera(), scene.lights(), field.fire_color] {
            assert!(ctx.descriptors.get_resource_handle(id).is_ok());
        }

        let before: CameraData = bytemuck::pod_read_unaligned(&camera_bytes(&device, &scene));
        assert_eq!(before.aspect_ratio, 800.0 / 600.0);
        scene
            .on_resize(&*ctx.device, vk::Extent2D {
                width: 1000,
                height: 500,
            })
            .unwrap();
        let after: CameraData = bytemuck::pod_read_unaligned(&camera_bytes(&device, &scene));
        assert_eq!(after.aspect_ratio, 2.0);

        scene.destroy(&mut ctx);
        ctx.destroy();
        assert_eq!(device.live_buffer_count(), 0);
        assert_eq!(device.live_image_count(), 0);
    }

    #[test]
    fn scene_without_fields_has_no_fire() {
        let device = HeadlessDevice::new();
        let mut ctx = RenderContext::new(Box::new(device.clone()), true).unwrap();
        let config = PyrovisConfig::from_json("{}").unwrap();

        let scene = SceneResources::new(&config, &mut ctx).unwrap();
        assert!(scene.draws().is_empty());
        assert!(scene.fire_lights().is_none());
        assert!(scene.field().is_none());
        assert!(scene.shared_buffers().is_empty());

        scene.destroy(&mut ctx);
        ctx.destroy();
        assert_eq!(device.live_buffer_count(), 0);
    }

    #[test]
    fn failed_creation_releases_resources() {
        let device = HeadlessDevice::new();
        let mut ctx = RenderContext::new(Box::new(device.clone()), true).unwrap();
        let config = PyrovisConfig::from_json(
            r#"{
                "objects": [ { "name": "bunny", "mesh": "bunny_mesh", "material": "m" } ],
                "meshes": [ { "type": "obj", "name": "bunny_mesh", "path": "bunny.obj" } ],
                "materials": [ { "name": "m" } ]
            }"#,
        )
        .unwrap();

        let err = SceneResources::new(&config, &mut ctx).err().unwrap();
        assert!(err.to_string().contains("bunny.obj"));
        ctx.destroy();
        assert_eq!(device.live_buffer_count(), 0);
        assert_eq!(device.live_image_count(), 0);
    }
}
