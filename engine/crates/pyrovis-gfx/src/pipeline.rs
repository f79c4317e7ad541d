use std::ffi::CStr;

use ash::vk;

use crate::error::{GfxError, GfxResult};

/// render pass 中的一个 attachment
#[derive(Debug, Clone, Copy)]
pub struct GfxAttachmentDesc {
    pub format: vk::Format,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub initial_layout: vk::ImageLayout,
    pub final_layout: vk::ImageLayout,
}

impl GfxAttachmentDesc {
    pub fn as_vk(&self) -> vk::AttachmentDescription {
        vk::AttachmentDescription {
            flags: vk::AttachmentDescriptionFlags::empty(),
            format: self.format,
            samples: vk::SampleCountFlags::TYPE_1,
            load_op: self.load_op,
            store_op: self.store_op,
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: self.initial_layout,
            final_layout: self.final_layout,
        }
    }
}

/// 单个 subpass 的 render pass
#[derive(Debug, Clone, Default)]
pub struct GfxRenderPassDesc {
    pub attachments: Vec<GfxAttachmentDesc>,
    pub color_refs: Vec<vk::AttachmentReference>,
    pub depth_ref: Option<vk::AttachmentReference>,
    pub dependencies: Vec<vk::SubpassDependency>,
    pub name: String,
}

#[derive(Debug, Clone, Default)]
pub struct GfxPipelineLayoutDesc {
    pub set_layouts: Vec<vk::DescriptorSetLayout>,
    pub push_constant_ranges: Vec<vk::PushConstantRange>,
    pub name: String,
}

/// 一个 shader stage 的 SPIR-V 代码
#[derive(Debug, Clone)]
pub struct GfxShaderStage {
    pub stage: vk::ShaderStageFlags,
    pub spirv: Vec<u32>,
    pub entry_point: &'static CStr,
}

impl GfxShaderStage {
    /// 从 SPIR-V 字节流创建，字节流长度必须是 4 的倍数
    pub fn from_spirv_bytes(stage: vk::ShaderStageFlags, bytes: &[u8]) -> GfxResult<Self> {
        let spirv = ash::util::read_spv(&mut std::io::Cursor::new(bytes))
            .map_err(|e| GfxError::Unsupported(format!("invalid spir-v for {stage:?}: {e}")))?;
        Ok(Self {
            stage,
            spirv,
            entry_point: c"main",
        })
    }
}

/// 基于 render pass 的图形管线
///
/// viewport 与 scissor 是 dynamic state，由录制时设置
#[derive(Debug, Clone)]
pub struct GfxGraphicsPipelineDesc {
    pub stages: Vec<GfxShaderStage>,

    pub vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    pub vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    pub topology: vk::PrimitiveTopology,

    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,

    pub depth_test: bool,
    pub depth_write: bool,

    pub color_attachment_count: u32,
    pub blend_enable: bool,

    pub layout: vk::PipelineLayout,
    pub render_pass: vk::RenderPass,
    pub subpass: u32,

    pub name: String,
}

impl GfxGraphicsPipelineDesc {
    /// 全屏三角形对管线的默认配置：无顶点输入，无深度，无剔除
    pub fn fullscreen(
        stages: Vec<GfxShaderStage>,
        layout: vk::PipelineLayout,
        render_pass: vk::RenderPass,
        color_attachment_count: u32,
        name: impl AsRef<str>,
    ) -> Self {
        Self {
            stages,
            vertex_bindings: vec![],
            vertex_attributes: vec![],
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            cull_mode: vk::CullModeFlags::NONE,
            // 按照 OpenGL 的传统，将 CCW 视为 front face
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            depth_test: false,
            depth_write: false,
            color_attachment_count,
            blend_enable: false,
            layout,
            render_pass,
            subpass: 0,
            name: name.as_ref().to_string(),
        }
    }
}
