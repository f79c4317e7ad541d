use ash::vk;
use pyrovis_gfx::{device::GfxDevice, error::GfxResult, resources::resource_id::ResourceId};

/// 一次 indexed draw 所需的数据
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneDraw {
    /// 物体的参数 buffer，需要已经通过 `register_parameter` 注册
    pub parameter: ResourceId,
    pub vertex_buffer: vk::Buffer,
    pub index_buffer: vk::Buffer,
    pub index_count: u32,
}

/// 体积场（火焰 / 烟雾）的绘制数据
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneField {
    /// 场的参数 buffer，需要已经通过 `register_parameter` 注册
    pub parameter: ResourceId,
    /// 火焰颜色表，注册为 combined image sampler
    pub fire_color: ResourceId,
    /// ray marching 的步长
    pub step: f32,
}

/// 场景向渲染节点提供数据的接口
///
/// 返回的 [`ResourceId`] 都必须已经在 bindless 表中注册（uniform 或 storage 类别），
/// 节点在初始化时把它们对应的 handle 写入自己的参数 buffer。
pub trait SceneSource {
    fn camera(&self) -> ResourceId;

    fn lights(&self) -> ResourceId;

    /// 火焰产生的自发光光源，没有火焰时为 None
    fn fire_lights(&self) -> Option<ResourceId>;

    /// 体积场内部用于自发光采样的点
    fn self_illumination_lights(&self) -> Option<ResourceId> {
        None
    }

    fn draws(&self) -> Vec<SceneDraw>;

    fn field(&self) -> Option<SceneField>;

    /// 呈现尺寸变化时调用，通常用于更新相机的宽高比
    fn on_resize(&mut self, _device: &dyn GfxDevice, _extent: vk::Extent2D) -> GfxResult<()> {
        Ok(())
    }
}
