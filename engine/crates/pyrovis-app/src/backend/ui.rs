use ash::vk;
use pyrovis_gfx::commands::command_buffer::GfxCommandEncoder;
use pyrovis_render_graph::node::UiDrawFn;

use crate::{config::PyrovisConfig, platform::input_event::InputEvent};

/// UI 后端初始化时需要的图形对象
#[derive(Debug, Clone, Copy)]
pub struct UiInitInfo {
    /// UI 节点的 render pass，后端在其中创建自己的 pipeline
    pub render_pass: vk::RenderPass,
    pub descriptor_pool: vk::DescriptorPool,
    pub extent: vk::Extent2D,
}

pub trait UiBackend {
    fn name(&self) -> &str;

    fn init(&mut self, config: &PyrovisConfig, info: &UiInitInfo) -> anyhow::Result<()>;

    /// 在 UI 节点的 render pass 内录制绘制命令
    fn draw_fn(&mut self) -> Box<UiDrawFn>;

    /// 返回 true 表示事件被 UI 消费，不再传给相机
    fn handle_input(&mut self, event: &InputEvent) -> bool;

    fn cleanup(&mut self);
}

/// 不绘制任何内容
#[derive(Debug, Default)]
pub struct NullUi {
    initialized: bool,
}

impl NullUi {
    pub const NAME: &'static str = "none";
}

impl UiBackend for NullUi {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn init(&mut self, _config: &PyrovisConfig, info: &UiInitInfo) -> anyhow::Result<()> {
        if info.render_pass == vk::RenderPass::null() {
            anyhow::bail!("ui backend requires the UI render pass");
        }
        self.initialized = true;
        Ok(())
    }

    fn draw_fn(&mut self) -> Box<UiDrawFn> {
        Box::new(|_encoder: &GfxCommandEncoder<'_>| {})
    }

    fn handle_input(&mut self, _event: &InputEvent) -> bool {
        false
    }

    fn cleanup(&mut self) {
        self.initialized = false;
    }
}

pub fn create_ui_backend(name: &str) -> anyhow::Result<Box<dyn UiBackend>> {
    match name {
        "" | NullUi::NAME => Ok(Box::new(NullUi::default())),
        other => anyhow::bail!("unknown ui backend `{other}`"),
    }
}

#[cfg(test)]
mod tests {
    use ash::vk::Handle;

    use super::*;

    #[test]
    fn null_ui_needs_render_pass() {
        let mut ui = create_ui_backend("none").unwrap();
        let mut info = UiInitInfo {
            render_pass: vk::RenderPass::null(),
            descriptor_pool: vk::DescriptorPool::null(),
            extent: vk::Extent2D { width: 800, height: 600 },
        };
        assert!(ui.init(&PyrovisConfig::default(), &info).is_err());

        info.render_pass = vk::RenderPass::from_raw(7);
        ui.init(&PyrovisConfig::default(), &info).unwrap();
        assert!(!ui.handle_input(&InputEvent::Other));
        ui.cleanup();

        assert!(create_ui_backend("imgui").is_err());
    }
}
