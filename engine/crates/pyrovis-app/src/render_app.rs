use anyhow::Context;
use ash::vk;
use pyrovis_gfx::device::GfxDevice;
use pyrovis_render_graph::{
    node::{FrameRecorder, NodeSetup},
    render_graph::RenderGraph,
    shader_library::ShaderLibrary,
    variants::builder_for_variant,
};
use pyrovis_render_interface::render_context::RenderContext;
use pyrovis_renderer::{
    cross_device::{CrossDeviceSync, ExtBufferDesc, SharedHandles},
    render_engine::{FrameOutcome, RenderEngine},
};

use crate::{
    backend::{
        physics::{PhysicsBackend, create_physics_backend},
        ui::{UiBackend, UiInitInfo, create_ui_backend},
    },
    config::PyrovisConfig,
    platform::{
        input_event::{InputEvent, KeyCode},
        input_manager::InputManager,
    },
    recorder::RawFrameRecorder,
    scene::SceneResources,
};

pub fn panic_handler(info: &std::panic::PanicHookInfo) {
    log::error!("{}", info);
}

/// 引擎的顶层对象：持有渲染、场景、物理与 UI，驱动每一帧
///
/// 启动顺序：渲染上下文、场景、render graph、物理后端、UI 后端、录制器。
/// 销毁时先停止物理与 UI，再释放 graph，最后释放场景和设备。
pub struct RenderApp {
    config: PyrovisConfig,
    engine: RenderEngine,
    scene: SceneResources,
    input_manager: InputManager,

    physics: Box<dyn PhysicsBackend>,
    ui: Box<dyn UiBackend>,

    /// 已经呈现的帧数
    frames: u64,
}

// new & init
impl RenderApp {
    pub fn init_env() {
        std::panic::set_hook(Box::new(panic_handler));

        tracy_client::Client::start();
        tracy_client::set_thread_name!("RenderThread");
    }

    /// 按配置中的名字创建物理与 UI 后端，shader 从磁盘读取
    ///
    /// 任何一步失败时，已经创建的对象和 `device` 都会被销毁
    pub fn new(config: PyrovisConfig, device: Box<dyn GfxDevice>) -> anyhow::Result<Self> {
        let backends = create_physics_backend(&config.physics)
            .and_then(|physics| Ok((physics, create_ui_backend(&config.ui)?)));
        let (physics, ui) = match backends {
            Ok(backends) => backends,
            Err(e) => {
                device.destroy();
                return Err(e);
            }
        };
        let shaders = ShaderLibrary::new(config.paths().resolve(&config.shader_directory));
        Self::new_with(config, device, &shaders, physics, ui)
    }

    pub fn new_with(
        config: PyrovisConfig,
        device: Box<dyn GfxDevice>,
        shaders: &ShaderLibrary,
        physics: Box<dyn PhysicsBackend>,
        ui: Box<dyn UiBackend>,
    ) -> anyhow::Result<Self> {
        let _span = tracy_client::span!("RenderApp::new");
        log::info!("starting `{}` on {}", config.name, device.device_name());

        let mut ctx = RenderContext::new(device, config.vsync).context("failed to create render context")?;

        let scene = match SceneResources::new(&config, &mut ctx) {
            Ok(scene) => scene,
            Err(e) => {
                ctx.destroy();
                return Err(e.context("failed to create scene"));
            }
        };

        let graph = match Self::build_graph(&config, &mut ctx, &scene, shaders) {
            Ok(graph) => graph,
            Err(e) => {
                scene.destroy(&mut ctx);
                ctx.destroy();
                return Err(e);
            }
        };

        let cross_device = if physics.requires_cross_device() {
            match CrossDeviceSync::new(ctx.device()) {
                Ok(cross_device) => Some(cross_device),
                Err(e) => {
                    graph.destroy(&mut ctx);
                    scene.destroy(&mut ctx);
                    ctx.destroy();
                    return Err(anyhow::Error::new(e).context("failed to create cross device semaphores"));
                }
            }
        } else {
            None
        };

        let engine = RenderEngine::new(ctx, graph, cross_device)?;
        let mut app = Self {
            config,
            engine,
            scene,
            input_manager: InputManager::new(),
            physics,
            ui,
            frames: 0,
        };

        if let Err(e) = app.init_backends() {
            app.destroy();
            return Err(e);
        }
        Ok(app)
    }

    fn build_graph(
        config: &PyrovisConfig,
        ctx: &mut RenderContext,
        scene: &SceneResources,
        shaders: &ShaderLibrary,
    ) -> anyhow::Result<RenderGraph> {
        let builder = builder_for_variant(&config.render_graph, ctx.swapchain.format())?;
        let setup = NodeSetup { scene, shaders };
        let graph = builder
            .build(ctx, &setup)
            .with_context(|| format!("failed to build render graph `{}`", config.render_graph))?;
        log::info!("render graph `{}`: {}", config.render_graph, graph.execution_order().join(" -> "));
        Ok(graph)
    }

    /// 物理、UI 与录制器，依赖已经建好的 graph
    fn init_backends(&mut self) -> anyhow::Result<()> {
        let shared = match self.engine.cross_device() {
            Some(cross_device) => {
                let device = self.engine.context().device();
                let mut shared = cross_device.export(device)?;
                for buffer in self.scene.shared_buffers() {
                    shared.buffers.push(ExtBufferDesc::export(device, buffer)?);
                }
                shared
            }
            None => SharedHandles::default(),
        };
        self.physics
            .init(&self.config, &shared)
            .with_context(|| format!("failed to init physics backend `{}`", self.physics.name()))?;

        let ctx = self.engine.context();
        let info = UiInitInfo {
            render_pass: self.engine.graph().ui_render_pass().context("render graph has no UI node")?,
            descriptor_pool: ctx.descriptors.ui_pool(),
            extent: ctx.swapchain.extent(),
        };
        self.ui
            .init(&self.config, &info)
            .with_context(|| format!("failed to init ui backend `{}`", self.ui.name()))?;
        let draw = self.ui.draw_fn();
        self.engine.graph_mut().register_ui_draw(draw);

        let recorder_config = &self.config.recorder;
        let mut recorder = RawFrameRecorder::new(recorder_config.frame_rate, recorder_config.bit_rate);
        if recorder_config.record_from_start {
            let path = self.config.paths().resolve(&recorder_config.output_path);
            let extent = self.engine.context().swapchain.extent();
            recorder.begin(&path, extent.width, extent.height)?;
        }
        self.engine.graph_mut().set_recorder(Box::new(recorder));
        Ok(())
    }
}

// getters
impl RenderApp {
    #[inline]
    pub fn config(&self) -> &PyrovisConfig {
        &self.config
    }

    #[inline]
    pub fn engine(&self) -> &RenderEngine {
        &self.engine
    }

    #[inline]
    pub fn engine_mut(&mut self) -> &mut RenderEngine {
        &mut self.engine
    }

    #[inline]
    pub fn scene(&self) -> &SceneResources {
        &self.scene
    }

    #[inline]
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// `driver.total_frame` 为 0 时不会结束
    pub fn is_finished(&self) -> bool {
        let total = self.config.driver.total_frame;
        total > 0 && self.frames >= total
    }

    pub fn frame_title(&self) -> String {
        self.engine.frame_title(&self.config.name)
    }

    pub fn is_recording(&self) -> bool {
        self.engine.graph().recorder().is_some_and(|recorder| recorder.is_recording())
    }
}

// update
impl RenderApp {
    /// UI 消费的事件不再传给相机；窗口尺寸的变化总是会被处理
    pub fn handle_event(&mut self, event: InputEvent) {
        if let InputEvent::Resized {
            physical_width,
            physical_height,
        } = event
        {
            self.engine.context().device().set_window_extent(vk::Extent2D {
                width: physical_width,
                height: physical_height,
            });
        }

        let consumed = self.ui.handle_input(&event);
        if !consumed || matches!(event, InputEvent::Resized { .. }) {
            self.input_manager.push_event(event);
        }
    }

    /// 处理输入、渲染一帧并推进物理；返回 false 表示已经达到总帧数
    pub fn run_frame(&mut self) -> anyhow::Result<bool> {
        let _span = tracy_client::span!("RenderApp::run_frame");
        if self.is_finished() {
            return Ok(false);
        }

        self.input_manager.process_events();
        let input_state = self.input_manager.state();
        if let Some([width, height]) = input_state.resized {
            log::debug!("window resized to {width}x{height}");
            self.engine.request_resize();
        }
        let toggle_recording = input_state.is_key_down_this_frame(KeyCode::KeyR);

        let delta_time = self.engine.context().frame_counter.delta_time();
        if self.scene.camera_controller_mut().update(input_state, delta_time) {
            self.scene.update_camera(self.engine.context().device())?;
        }

        if toggle_recording {
            self.toggle_recording()?;
        }

        let outcome = self.engine.render_frame(&mut self.scene)?;
        if outcome == FrameOutcome::Deferred {
            return Ok(true);
        }

        {
            let _span = tracy_client::span!("Physics::step");
            for _ in 0..self.config.driver.steps_per_frame {
                self.physics.step()?;
            }
        }

        self.frames += 1;
        tracy_client::frame_mark();
        Ok(!self.is_finished())
    }

    /// 录制从下一帧开始；停止时还没有读回的最后一帧会被丢弃
    pub fn toggle_recording(&mut self) -> anyhow::Result<()> {
        let path = self.config.paths().resolve(&self.config.recorder.output_path);
        let extent = self.engine.context().swapchain.extent();
        let Some(recorder) = self.engine.graph_mut().recorder_mut() else {
            return Ok(());
        };

        if recorder.is_recording() {
            recorder.end().context("failed to finish recording")?;
            log::info!("recording stopped");
        } else {
            recorder
                .begin(&path, extent.width, extent.height)
                .with_context(|| format!("failed to start recording to {}", path.display()))?;
        }
        Ok(())
    }
}

// destroy
impl RenderApp {
    pub fn destroy(self) {
        let Self {
            engine,
            scene,
            mut physics,
            mut ui,
            frames,
            ..
        } = self;

        if let Err(e) = physics.sync() {
            log::error!("failed to sync physics backend `{}`: {e:#}", physics.name());
        }
        physics.cleanup();
        ui.cleanup();

        let mut ctx = engine.into_context();
        scene.destroy(&mut ctx);
        ctx.destroy();
        log::info!("render app stopped after {frames} frames");
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use pyrovis_gfx::headless::HeadlessDevice;
    use pyrovis_render_graph::{shader_library::placeholder_spirv, variants::shader_dirs};

    use super::*;
    use crate::{
        backend::{physics::NullPhysics, ui::NullUi},
        platform::input_event::ElementState,
        scene::tests::FIRE_SCENE,
    };

    fn shaders(variant: &str) -> ShaderLibrary {
        let mut library = ShaderLibrary::new("/nonexistent");
        for dir in shader_dirs(variant).unwrap() {
            library.insert(format!("{dir}/node.vert.spv"), placeholder_spirv());
            library.insert(format!("{dir}/node.frag.spv"), placeholder_spirv());
        }
        library
    }

    fn fire_config() -> PyrovisConfig {
        PyrovisConfig::from_json(FIRE_SCENE).unwrap()
    }

    fn null_app(device: &HeadlessDevice, config: PyrovisConfig) -> RenderApp {
        let shaders = shaders(&config.render_graph);
        RenderApp::new_with(
            config,
            Box::new(device.clone()),
            &shaders,
            Box::new(NullPhysics::default()),
            Box::new(NullUi::default()),
        )
        .unwrap()
    }

    #[derive(Debug, Default)]
    struct Observed {
        shared_buffers: usize,
        has_semaphores: bool,
        steps: u32,
        synced: bool,
    }

    /// 需要跨设备同步的物理后端，记录收到的句柄
    struct SharedPhysics {
        observed: Rc<RefCell<Observed>>,
    }

    impl PhysicsBackend for SharedPhysics {
        fn name(&self) -> &str {
            "shared"
        }

        fn requires_cross_device(&self) -> bool {
            true
        }

        fn init(&mut self, _config: &PyrovisConfig, shared: &SharedHandles) -> anyhow::Result<()> {
            let mut observed = self.observed.borrow_mut();
            observed.shared_buffers = shared.buffers.len();
            observed.has_semaphores = shared.compute_done.is_some() && shared.graphics_done.is_some();
            Ok(())
        }

        fn step(&mut self) -> anyhow::Result<()> {
            self.observed.borrow_mut().steps += 1;
            Ok(())
        }

        fn sync(&mut self) -> anyhow::Result<()> {
            self.observed.borrow_mut().synced = true;
            Ok(())
        }

        fn cleanup(&mut self) {}
    }

    #[test]
    fn runs_until_total_frame() {
        let device = HeadlessDevice::new();
        let mut config = fire_config();
        config.driver.total_frame = 2;
        let mut app = null_app(&device, config);
        assert_eq!(app.engine().graph().execution_order(), ["FireObject", "Field", "HDRToSDR", "Record", "UI"]);
        assert!(app.engine().cross_device().is_none());

        assert!(app.run_frame().unwrap());
        assert!(!app.run_frame().unwrap());
        assert!(app.is_finished());
        assert!(!app.run_frame().unwrap());
        assert_eq!(app.frames(), 2);
        assert!(app.frame_title().starts_with("candle - "));

        app.destroy();
        assert_eq!(device.live_buffer_count(), 0);
        assert_eq!(device.live_image_count(), 0);
    }

    #[test]
    fn cross_device_physics_receives_shared_handles() {
        let device = HeadlessDevice::new();
        let mut config = fire_config();
        config.driver.steps_per_frame = 3;
        let observed = Rc::new(RefCell::new(Observed::default()));
        let physics = SharedPhysics {
            observed: observed.clone(),
        };

        let shaders = shaders(&config.render_graph);
        let mut app = RenderApp::new_with(
            config,
            Box::new(device.clone()),
            &shaders,
            Box::new(physics),
            Box::new(NullUi::default()),
        )
        .unwrap();
        assert!(app.engine().cross_device().is_some());
        {
            let observed = observed.borrow();
            // 火焰光源 + 两个场
            assert_eq!(observed.shared_buffers, 3);
            assert!(observed.has_semaphores);
        }

        app.run_frame().unwrap();
        assert_eq!(observed.borrow().steps, 3);

        app.destroy();
        assert!(observed.borrow().synced);
        assert_eq!(device.live_buffer_count(), 0);
    }

    #[test]
    fn resize_event_recreates_swapchain() {
        let device = HeadlessDevice::new();
        let mut app = null_app(&device, PyrovisConfig::default());
        assert_eq!(app.engine().graph().execution_order(), ["DefaultObject", "HDRToSDR", "Record", "UI"]);

        app.handle_event(InputEvent::Resized {
            physical_width: 1024,
            physical_height: 768,
        });
        app.run_frame().unwrap();
        assert_eq!(app.engine().context().swapchain.extent().width, 1024);
        assert_eq!(app.scene().camera_controller().camera().aspect_ratio(), 1024.0 / 768.0);

        app.destroy();
    }

    #[test]
    fn key_r_toggles_recording() {
        let output = std::env::temp_dir().join(format!("pyrovis-app-record-{}", std::process::id()));
        let device = HeadlessDevice::new();
        let mut config = PyrovisConfig::default();
        config.recorder.output_path = output.join("frames.raw");
        let mut app = null_app(&device, config);
        assert!(!app.is_recording());

        let press = |state| InputEvent::KeyboardInput {
            key_code: KeyCode::KeyR,
            state,
        };
        app.handle_event(press(ElementState::Pressed));
        app.run_frame().unwrap();
        assert!(app.is_recording());

        app.handle_event(press(ElementState::Released));
        app.run_frame().unwrap();
        assert!(app.is_recording());

        app.handle_event(press(ElementState::Pressed));
        app.run_frame().unwrap();
        assert!(!app.is_recording());

        app.destroy();
        assert!(RawFrameRecorder::metadata_path(&output.join("frames.raw")).exists());
        std::fs::remove_dir_all(&output).ok();
    }

    #[test]
    fn unknown_backends_are_rejected() {
        let device = HeadlessDevice::new();
        let mut config = PyrovisConfig::default();
        config.physics = "cuda".to_string();
        assert!(RenderApp::new(config, Box::new(device.clone())).is_err());
        assert!(device.is_destroyed());
        assert_eq!(device.live_buffer_count(), 0);
        assert_eq!(device.live_image_count(), 0);

        let device = HeadlessDevice::new();
        let mut config = PyrovisConfig::default();
        config.ui = "imgui".to_string();
        assert!(RenderApp::new(config, Box::new(device.clone())).is_err());
        assert!(device.is_destroyed());
    }

    #[test]
    fn recording_survives_resize() {
        let output = std::env::temp_dir().join(format!("pyrovis-app-record-resize-{}", std::process::id()));
        let path = output.join("frames.raw");
        let device = HeadlessDevice::new();
        let mut config = PyrovisConfig::default();
        config.recorder.output_path = path.clone();
        let mut app = null_app(&device, config);

        app.toggle_recording().unwrap();
        app.run_frame().unwrap();
        app.run_frame().unwrap();
        app.handle_event(InputEvent::Resized {
            physical_width: 1024,
            physical_height: 768,
        });
        for _ in 0..3 {
            app.run_frame().unwrap();
        }
        assert!(app.is_recording());
        assert_eq!(app.engine().context().swapchain.extent().width, 1024);
        app.destroy();

        let read_metadata = |path: &std::path::Path| -> serde_json::Value {
            serde_json::from_str(&std::fs::read_to_string(RawFrameRecorder::metadata_path(path)).unwrap()).unwrap()
        };
        let before = read_metadata(&path);
        let after = read_metadata(&RawFrameRecorder::segment_path(&path, 1));
        assert_eq!(before["width"], 800);
        assert_eq!(after["width"], 1024);
        assert_eq!(after["height"], 768);
        let frames = before["frames"].as_u64().unwrap() + after["frames"].as_u64().unwrap();
        assert_eq!(frames, 5);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), before["frames"].as_u64().unwrap() * 800 * 600 * 4);

        std::fs::remove_dir_all(&output).ok();
    }
}
