use anyhow::Context;
use ash::vk;
use pyrovis_app::{config::PyrovisConfig, render_app::RenderApp};
use pyrovis_gfx::vulkan::{VulkanDevice, VulkanDeviceCreateInfo};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Window, WindowId},
};

use crate::winit_event_adapter::WinitEventAdapter;

pub struct WinitApp {
    /// 窗口创建之后交给 [`RenderApp`]
    config: Option<PyrovisConfig>,
    render_app: Option<RenderApp>,

    window: Option<Window>,

    /// 事件循环中发生的第一个错误
    error: Option<anyhow::Error>,
}

// 总的 main 函数
impl WinitApp {
    /// 整个程序的入口，事件循环结束后返回
    pub fn run(config: PyrovisConfig) -> anyhow::Result<()> {
        RenderApp::init_env();

        let event_loop = EventLoop::new().context("failed to create event loop")?;
        let mut app = Self {
            config: Some(config),
            render_app: None,
            window: None,
            error: None,
        };

        let result = event_loop.run_app(&mut app).context("event loop failed");
        log::info!("end run.");

        let error = app.error.take();
        app.destroy();
        result?;
        error.map_or(Ok(()), Err)
    }
}

// new & init
impl WinitApp {
    /// 创建窗口、Vulkan 设备和 RenderApp
    fn init_after_window(&mut self, event_loop: &ActiveEventLoop) -> anyhow::Result<()> {
        let Some(config) = self.config.take() else {
            return Ok(());
        };

        let window_attr = Window::default_attributes()
            .with_title(config.name.clone())
            .with_inner_size(winit::dpi::PhysicalSize::new(config.width, config.height));
        let window = event_loop.create_window(window_attr).context("failed to create window")?;

        let size = window.inner_size();
        let info = VulkanDeviceCreateInfo {
            app_name: config.name.clone(),
            display_handle: window.display_handle()?.as_raw(),
            window_handle: window.window_handle()?.as_raw(),
            window_extent: vk::Extent2D {
                width: size.width,
                height: size.height,
            },
            enable_validation: config.validation,
        };
        let device = VulkanDevice::new(&info).context("failed to create vulkan device")?;

        // device 持有 surface，window 需要比 RenderApp 活得更久
        self.window = Some(window);
        self.render_app = Some(RenderApp::new(config, Box::new(device))?);
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        if self.error.is_none() {
            self.error = Some(error);
        }
        event_loop.exit();
    }
}

// destroy
impl WinitApp {
    fn destroy(mut self) {
        if let Some(render_app) = self.render_app.take() {
            render_app.destroy();
        }
        self.window = None;
    }
}

// 各种 winit 的事件处理
impl ApplicationHandler for WinitApp {
    // 建议在这里创建 window 和 Renderer
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        log::info!("winit event: resumed");
        if self.window.is_some() {
            return;
        }

        if let Err(e) = self.init_after_window(event_loop) {
            self.fail(event_loop, e);
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        let Some(render_app) = self.render_app.as_mut() else {
            return;
        };
        render_app.handle_event(WinitEventAdapter::from_winit_event(&event));

        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::RedrawRequested => match render_app.run_frame() {
                Ok(true) => {
                    if let Some(window) = self.window.as_ref() {
                        window.set_title(&render_app.frame_title());
                    }
                }
                Ok(false) => {
                    log::info!("all {} frames rendered", render_app.frames());
                    event_loop.exit();
                }
                Err(e) => self.fail(event_loop, e),
            },
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }

    fn suspended(&mut self, _event_loop: &ActiveEventLoop) {
        log::warn!("winit event: suspended");
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        log::info!("loop exiting");
    }
}
