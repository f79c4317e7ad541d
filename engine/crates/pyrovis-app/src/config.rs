//! JSON 配置文件
//!
//! 未知字段会被忽略，缺失的可选部分使用默认值。
//! 资源路径都相对于 `engine_directory`，由 [`PyrovisPath`] 负责解析。

use std::path::{Path, PathBuf};

use anyhow::Context;
use pyrovis_crate_tools::{init_log::LogOptions, resource::PyrovisPath};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    pub level: String,
    /// 日志文件，为空时输出到 stderr
    pub output: Option<PathBuf>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            output: None,
        }
    }
}

impl LoggerConfig {
    pub fn log_options(&self, paths: &PyrovisPath) -> anyhow::Result<LogOptions> {
        Ok(LogOptions {
            level: LogOptions::parse_level(&self.level)?,
            output: self.output.as_ref().map(|output| paths.resolve(output)),
        })
    }
}

/// up 固定为 (0, 1, 0)
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub position: [f32; 3],
    /// 看向的方向，不要求归一化
    #[serde(alias = "view_dir")]
    pub view: [f32; 3],
    /// 垂直视野，单位是角度
    pub fov: f32,
    pub move_speed: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            position: [0.0, 0.0, 5.0],
            view: [0.0, 0.0, -1.0],
            fov: 45.0,
            move_speed: 1.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObjectConfig {
    pub name: String,
    pub mesh: String,
    pub material: String,
}

/// 网格，按 `type` 区分
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MeshConfig {
    Sphere {
        name: String,
        pos: [f32; 3],
        radius: f32,
        /// 经纬方向的分段数，配置文件中写作浮点数
        tessellation: f32,
    },
    Cube {
        name: String,
        pos: [f32; 3],
        scale: [f32; 3],
    },
    Plane {
        name: String,
        pos: [f32; 3],
        normal: [f32; 3],
        size: [f32; 2],
    },
    Obj {
        name: String,
        path: PathBuf,
    },
}

impl MeshConfig {
    pub fn name(&self) -> &str {
        match self {
            Self::Sphere { name, .. } | Self::Cube { name, .. } | Self::Plane { name, .. } | Self::Obj { name, .. } => {
                name
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MaterialConfig {
    pub name: String,
    pub roughness: f32,
    pub metallic: f32,
    pub color: [f32; 3],
    /// 以下贴图为纹理名，空字符串表示不使用
    pub color_texture: String,
    pub metallic_texture: String,
    pub roughness_texture: String,
    pub normal_texture: String,
    pub ao_texture: String,
}

impl Default for MaterialConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            roughness: 0.5,
            metallic: 0.0,
            color: [1.0, 1.0, 1.0],
            color_texture: String::new(),
            metallic_texture: String::new(),
            roughness_texture: String::new(),
            normal_texture: String::new(),
            ao_texture: String::new(),
        }
    }
}

impl MaterialConfig {
    /// 按 color、metallic、roughness、normal、ao 的顺序
    pub fn texture_names(&self) -> [&str; 5] {
        [
            &self.color_texture,
            &self.metallic_texture,
            &self.roughness_texture,
            &self.normal_texture,
            &self.ao_texture,
        ]
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TextureConfig {
    pub name: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LightConfig {
    #[serde(rename = "posOrDir", alias = "pos_or_dir")]
    pub pos_or_dir: [f32; 3],
    pub intensity: [f32; 3],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldDataType {
    Concentration,
    Temperature,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldConfig {
    pub name: String,
    /// 初始数据，由物理侧读取
    #[serde(default)]
    pub path: Option<PathBuf>,
    pub data_type: FieldDataType,
    pub start_pos: [f32; 3],
    pub size: [f32; 3],
    /// 体素数量
    pub dimension: [u32; 3],
    #[serde(default)]
    pub scatter: [f32; 3],
    #[serde(default)]
    pub absorption: [f32; 3],
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FireConfig {
    /// 火焰光源的采样网格
    pub light_sample_dim: [u32; 3],
    pub light_sample_avg_region: [f32; 3],
    pub self_illumination_lights: Vec<[f32; 3]>,
    pub light_sample_gain: f32,
    pub self_illumination_boost: f32,
    pub fire_colors_path: Option<PathBuf>,
}

impl Default for FireConfig {
    fn default() -> Self {
        Self {
            light_sample_dim: [2, 2, 2],
            light_sample_avg_region: [1.0, 1.0, 1.0],
            self_illumination_lights: Vec::new(),
            light_sample_gain: 1.0,
            self_illumination_boost: 1.0,
            fire_colors_path: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FieldsConfig {
    /// ray marching 步长
    pub step: f32,
    pub arr: Vec<FieldConfig>,
    pub fire_configuration: FireConfig,
}

impl Default for FieldsConfig {
    fn default() -> Self {
        Self {
            step: 0.01,
            arr: Vec::new(),
            fire_configuration: FireConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// 0 表示不限制
    pub total_frame: u64,
    pub frame_rate: u32,
    pub steps_per_frame: u32,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            total_frame: 0,
            frame_rate: 30,
            steps_per_frame: 1,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    pub output_path: PathBuf,
    pub bit_rate: u32,
    pub frame_rate: u32,
    pub record_from_start: bool,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            output_path: PathBuf::from("output/record.raw"),
            bit_rate: 8_000_000,
            frame_rate: 30,
            record_from_start: false,
        }
    }
}

/// 引擎的完整配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PyrovisConfig {
    pub name: String,
    pub engine_directory: PathBuf,
    pub logger: LoggerConfig,
    pub width: u32,
    pub height: u32,
    pub vsync: bool,
    pub validation: bool,

    /// `default` 或 `fire`
    pub render_graph: String,
    pub shader_directory: PathBuf,
    /// 物理后端的名字
    pub physics: String,
    /// UI 后端的名字
    pub ui: String,

    pub camera: CameraConfig,
    pub objects: Vec<ObjectConfig>,
    pub meshes: Vec<MeshConfig>,
    pub materials: Vec<MaterialConfig>,
    pub textures: Vec<TextureConfig>,
    pub lights: Vec<LightConfig>,
    pub fields: FieldsConfig,
    pub driver: DriverConfig,
    pub recorder: RecorderConfig,
}

impl Default for PyrovisConfig {
    fn default() -> Self {
        Self {
            name: "Pyrovis".to_string(),
            engine_directory: PathBuf::from("."),
            logger: LoggerConfig::default(),
            width: 1280,
            height: 720,
            vsync: true,
            validation: cfg!(debug_assertions),
            render_graph: "default".to_string(),
            shader_directory: PathBuf::from("shaders"),
            physics: "none".to_string(),
            ui: "none".to_string(),
            camera: CameraConfig::default(),
            objects: Vec::new(),
            meshes: Vec::new(),
            materials: Vec::new(),
            textures: Vec::new(),
            lights: Vec::new(),
            fields: FieldsConfig::default(),
            driver: DriverConfig::default(),
            recorder: RecorderConfig::default(),
        }
    }
}

// new & init
impl PyrovisConfig {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text =
            std::fs::read_to_string(path).with_context(|| format!("failed to read config: {}", path.display()))?;
        let config = Self::from_json(&text).with_context(|| format!("failed to parse config: {}", path.display()))?;
        Ok(config)
    }

    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// 检查名字引用与数量限制
    fn validate(&self) -> anyhow::Result<()> {
        if self.width == 0 || self.height == 0 {
            anyhow::bail!("window size must be non-zero, got {}x{}", self.width, self.height);
        }

        for object in &self.objects {
            if !self.meshes.iter().any(|mesh| mesh.name() == object.mesh) {
                anyhow::bail!("object `{}` references unknown mesh `{}`", object.name, object.mesh);
            }
            if !self.materials.iter().any(|material| material.name == object.material) {
                anyhow::bail!("object `{}` references unknown material `{}`", object.name, object.material);
            }
        }

        for material in &self.materials {
            for texture in material.texture_names().into_iter().filter(|name| !name.is_empty()) {
                if !self.textures.iter().any(|t| t.name == texture) {
                    anyhow::bail!("material `{}` references unknown texture `{texture}`", material.name);
                }
            }
        }

        let fields = &self.fields.arr;
        if fields.len() > crate::scene::field::MAX_FIELDS {
            anyhow::bail!("at most {} fields are supported, got {}", crate::scene::field::MAX_FIELDS, fields.len());
        }
        let temperature_count = fields.iter().filter(|field| field.data_type == FieldDataType::Temperature).count();
        if temperature_count > 1 {
            anyhow::bail!("only one temperature field is supported, got {temperature_count}");
        }
        if let Some(field) = fields.iter().find(|field| field.dimension.contains(&0)) {
            anyhow::bail!("field `{}` has an empty dimension {:?}", field.name, field.dimension);
        }
        if temperature_count == 1 && self.fields.fire_configuration.light_sample_dim.contains(&0) {
            anyhow::bail!("light_sample_dim must be non-zero");
        }

        Ok(())
    }
}

// getters
impl PyrovisConfig {
    pub fn paths(&self) -> PyrovisPath {
        PyrovisPath::new(&self.engine_directory)
    }

    pub fn has_temperature_field(&self) -> bool {
        self.fields.arr.iter().any(|field| field.data_type == FieldDataType::Temperature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "name": "candle",
        "engine_directory": "/opt/pyrovis",
        "logger": { "level": "warning" },
        "width": 800,
        "height": 600,
        "render_graph": "fire",
        "shader_directory": "shaders",
        "rigid_couple": { "anything": true },
        "camera": { "position": [0, 1, 4], "view": [0, 0, -1], "fov": 60, "move_speed": 2.5 },
        "objects": [ { "name": "floor", "mesh": "floor_mesh", "material": "grey" } ],
        "meshes": [
            { "type": "plane", "name": "floor_mesh", "pos": [0, 0, 0], "normal": [0, 1, 0], "size": [10, 10] },
            { "type": "sphere", "name": "ball", "pos": [0, 1, 0], "radius": 0.5, "tessellation": 16.0 }
        ],
        "materials": [ { "name": "grey", "roughness": 0.8, "metallic": 0.1, "color": [0.5, 0.5, 0.5] } ],
        "lights": [ { "posOrDir": [1, 3, 1], "intensity": [10, 10, 10] } ],
        "fields": {
            "step": 0.02,
            "arr": [
                { "name": "density", "data_type": "concentration", "start_pos": [-1, 0, -1],
                  "size": [2, 2, 2], "dimension": [32, 32, 32], "scatter": [1, 1, 1], "absorption": [0.1, 0.1, 0.1] },
                { "name": "temperature", "data_type": "temperature", "start_pos": [-1, 0, -1],
                  "size": [2, 2, 2], "dimension": [32, 32, 32] }
            ],
            "fire_configuration": { "light_sample_dim": [2, 2, 2], "self_illumination_lights": [[0, 1, 0]] }
        },
        "driver": { "total_frame": 300, "steps_per_frame": 2 }
    }"#;

    #[test]
    fn parses_sample_and_defaults_missing_sections() {
        let config = PyrovisConfig::from_json(SAMPLE).unwrap();
        assert_eq!(config.name, "candle");
        assert_eq!((config.width, config.height), (800, 600));
        assert_eq!(config.render_graph, "fire");
        assert_eq!(config.camera.fov, 60.0);
        assert_eq!(config.camera.view, [0.0, 0.0, -1.0]);
        assert!(matches!(&config.meshes[1], MeshConfig::Sphere { tessellation, .. } if *tessellation == 16.0));
        assert_eq!(config.lights[0].pos_or_dir, [1.0, 3.0, 1.0]);
        assert!(config.has_temperature_field());
        assert_eq!(config.fields.fire_configuration.self_illumination_lights.len(), 1);
        assert_eq!(config.driver.total_frame, 300);
        assert_eq!(config.driver.frame_rate, 30);

        // 缺省的部分
        assert!(config.textures.is_empty());
        assert!(!config.recorder.record_from_start);
        assert_eq!(config.physics, "none");
        assert_eq!(config.materials[0].color_texture, "");

        let options = config.logger.log_options(&config.paths()).unwrap();
        assert_eq!(options.level, log::LevelFilter::Warn);
        assert!(options.output.is_none());
    }

    #[test]
    fn empty_document_is_valid() {
        let config = PyrovisConfig::from_json("{}").unwrap();
        assert_eq!(config.render_graph, "default");
        assert!(config.objects.is_empty());
    }

    #[test]
    fn rejects_dangling_references() {
        let err = PyrovisConfig::from_json(
            r#"{ "objects": [ { "name": "o", "mesh": "missing", "material": "m" } ] }"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown mesh `missing`"));

        let err = PyrovisConfig::from_json(
            r#"{ "materials": [ { "name": "m", "color_texture": "wood" } ] }"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown texture `wood`"));
    }

    #[test]
    fn rejects_two_temperature_fields() {
        let field = r#"{ "name": "t", "data_type": "temperature",
            "start_pos": [0,0,0], "size": [1,1,1], "dimension": [4,4,4] }"#;
        let text = format!(r#"{{ "fields": {{ "arr": [{field}, {field}] }} }}"#);
        assert!(PyrovisConfig::from_json(&text).is_err());
    }

    #[test]
    fn load_reports_path() {
        let err = PyrovisConfig::load("/nonexistent/pyrovis.json").unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/pyrovis.json"));
    }
}
