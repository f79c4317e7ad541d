use ash::vk;
use pyrovis_gfx::{
    device::GfxDevice,
    pipeline::{GfxGraphicsPipelineDesc, GfxPipelineLayoutDesc},
    resources::buffer::GfxBuffer,
};
use pyrovis_render_interface::descriptor_manager::DescriptorManager;

use crate::error::GraphResult;

/// 节点的 pipeline layout 与 graphics pipeline
///
/// set 约定：
/// - set 0：bindless 表
/// - set 1：节点的参数
/// - set 2：物体或体积场的参数
pub struct NodePipeline {
    layout: vk::PipelineLayout,
    pipeline: vk::Pipeline,
}

// new & init
impl NodePipeline {
    /// `make_desc` 收到已经创建好的 pipeline layout
    pub fn new(
        device: &dyn GfxDevice,
        layout_desc: &GfxPipelineLayoutDesc,
        make_desc: impl FnOnce(vk::PipelineLayout) -> GfxGraphicsPipelineDesc,
    ) -> GraphResult<Self> {
        let layout = device.create_pipeline_layout(layout_desc)?;
        let pipeline = match device.create_graphics_pipeline(&make_desc(layout)) {
            Ok(pipeline) => pipeline,
            Err(e) => {
                device.destroy_pipeline_layout(layout);
                return Err(e.into());
            }
        };
        Ok(Self { layout, pipeline })
    }

    /// bindless + 节点参数（+ 可选的每物体参数）
    pub fn layout_desc(
        descriptors: &DescriptorManager,
        per_draw_set: bool,
        push_constant_ranges: Vec<vk::PushConstantRange>,
        name: &str,
    ) -> GfxPipelineLayoutDesc {
        let mut set_layouts = vec![descriptors.bindless_layout(), descriptors.parameter_layout()];
        if per_draw_set {
            set_layouts.push(descriptors.parameter_layout());
        }
        GfxPipelineLayoutDesc {
            set_layouts,
            push_constant_ranges,
            name: format!("{name}-layout"),
        }
    }
}

// getters
impl NodePipeline {
    #[inline]
    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }

    #[inline]
    pub fn pipeline(&self) -> vk::Pipeline {
        self.pipeline
    }
}

// destroy
impl NodePipeline {
    pub fn destroy(self, device: &dyn GfxDevice) {
        device.destroy_pipeline(self.pipeline);
        device.destroy_pipeline_layout(self.layout);
    }
}

/// 节点的参数 buffer，内容是 bindless handle
///
/// 参数池扩容时 descriptor set 会被替换，所以每次录制都要重新查询 set
pub struct NodeParameter {
    buffer: GfxBuffer,
}

// new & init
impl NodeParameter {
    pub fn new<T: bytemuck::Pod>(
        device: &dyn GfxDevice,
        descriptors: &mut DescriptorManager,
        value: &T,
        name: &str,
    ) -> GraphResult<Self> {
        let buffer = GfxBuffer::new_uniform_buffer(device, size_of::<T>() as vk::DeviceSize, format!("{name}-params"))?;
        let registered: GraphResult<_> = buffer
            .update_pod(device, value)
            .map_err(Into::into)
            .and_then(|_| descriptors.register_parameter(device, &buffer).map_err(Into::into));
        if let Err(e) = registered {
            buffer.destroy(device);
            return Err(e);
        }
        Ok(Self { buffer })
    }
}

// getters
impl NodeParameter {
    #[inline]
    pub fn buffer(&self) -> &GfxBuffer {
        &self.buffer
    }

    #[inline]
    pub fn set(&self, descriptors: &DescriptorManager) -> GraphResult<vk::DescriptorSet> {
        Ok(descriptors.get_parameter_set(self.buffer.id())?)
    }
}

// tools
impl NodeParameter {
    pub fn update<T: bytemuck::Pod>(&self, device: &dyn GfxDevice, value: &T) -> GraphResult<()> {
        Ok(self.buffer.update_pod(device, value)?)
    }
}

// destroy
impl NodeParameter {
    pub fn destroy(self, device: &dyn GfxDevice, descriptors: &mut DescriptorManager) {
        if let Err(e) = descriptors.remove_parameter(device, self.buffer.id()) {
            log::error!("failed to remove parameter `{}`: {e}", self.buffer.debug_name());
        }
        self.buffer.destroy(device);
    }
}
