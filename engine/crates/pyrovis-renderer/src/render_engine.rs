use pyrovis_gfx::swapchain::GfxAcquireResult;
use pyrovis_render_graph::render_graph::RenderGraph;
use pyrovis_render_interface::{render_context::RenderContext, scene_source::SceneSource};

use crate::{
    cross_device::{CrossDeviceSync, frame_submit_info},
    error::RendererResult,
    frame_sync::FrameSync,
};

/// 一次 [`RenderEngine::render_frame`] 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented,
    /// surface 尺寸为 0（例如窗口最小化），这一帧没有渲染
    Deferred,
}

/// 驱动每一帧：等待 fence、acquire、录制、提交、present，以及 resize
pub struct RenderEngine {
    ctx: RenderContext,
    graph: RenderGraph,
    sync: FrameSync,
    cross_device: Option<CrossDeviceSync>,

    /// 由窗口事件设置，present 之后处理
    resize_requested: bool,
    /// surface 尺寸为 0 时推迟的 resize，下一帧开始前重试
    resize_deferred: bool,
}

// new & init
impl RenderEngine {
    pub fn new(ctx: RenderContext, graph: RenderGraph, cross_device: Option<CrossDeviceSync>) -> RendererResult<Self> {
        let sync = FrameSync::new(ctx.device())?;
        Ok(Self {
            ctx,
            graph,
            sync,
            cross_device,
            resize_requested: false,
            resize_deferred: false,
        })
    }
}

// getters
impl RenderEngine {
    #[inline]
    pub fn context(&self) -> &RenderContext {
        &self.ctx
    }

    #[inline]
    pub fn context_mut(&mut self) -> &mut RenderContext {
        &mut self.ctx
    }

    #[inline]
    pub fn graph(&self) -> &RenderGraph {
        &self.graph
    }

    #[inline]
    pub fn graph_mut(&mut self) -> &mut RenderGraph {
        &mut self.graph
    }

    #[inline]
    pub fn cross_device(&self) -> Option<&CrossDeviceSync> {
        self.cross_device.as_ref()
    }

    #[inline]
    pub fn is_resize_deferred(&self) -> bool {
        self.resize_deferred
    }

    /// 窗口标题，附带上一帧的耗时
    pub fn frame_title(&self, name: &str) -> String {
        let delta = self.ctx.frame_counter.delta_time();
        format!("{name} - {:.2} ms", delta.as_secs_f64() * 1000.0)
    }
}

// setters
impl RenderEngine {
    #[inline]
    pub fn request_resize(&mut self) {
        self.resize_requested = true;
    }
}

// frame
impl RenderEngine {
    pub fn render_frame(&mut self, scene: &mut dyn SceneSource) -> RendererResult<FrameOutcome> {
        let _span = tracy_client::span!("RenderEngine::render_frame");

        if self.resize_deferred && !self.resize(scene)? {
            return Ok(FrameOutcome::Deferred);
        }

        self.sync.in_flight.wait(self.ctx.device())?;
        loop {
            let acquired = self.ctx.swapchain.acquire_next_image(&*self.ctx.device, &self.sync.image_available)?;
            match acquired {
                GfxAcquireResult::Acquired { .. } => break,
                GfxAcquireResult::OutOfDate => {
                    if !self.resize(scene)? {
                        return Ok(FrameOutcome::Deferred);
                    }
                    self.sync.in_flight.wait(self.ctx.device())?;
                }
            }
        }

        let frame_id = self.ctx.frame_counter.frame_id();
        self.sync.in_flight.reset(self.ctx.device())?;
        self.sync.cmd.reset(self.ctx.device())?;
        self.graph.record(&mut self.ctx, &self.sync.cmd, scene)?;

        let submit_info = frame_submit_info(
            &self.sync.cmd,
            &self.sync.image_available,
            &self.sync.render_finished,
            self.cross_device.as_ref(),
            frame_id,
        );
        self.ctx.device.submit(&submit_info, self.sync.in_flight.handle())?;

        let presented = self.ctx.swapchain.present(&*self.ctx.device, &self.sync.render_finished)?;
        self.ctx.frame_counter.next_frame();

        if presented.need_recreate() || std::mem::take(&mut self.resize_requested) {
            self.resize(scene)?;
        }
        Ok(FrameOutcome::Presented)
    }

    /// 以当前 surface 尺寸重建 swapchain 和 graph
    ///
    /// surface 尺寸为 0 时不做任何事并返回 false，之后的每一帧会重试
    pub fn resize(&mut self, scene: &mut dyn SceneSource) -> RendererResult<bool> {
        let _span = tracy_client::span!("RenderEngine::resize");

        let extent = self.ctx.device.surface_extent();
        if extent.width == 0 || extent.height == 0 {
            if !self.resize_deferred {
                log::info!("surface extent is zero, defer resize");
            }
            self.resize_deferred = true;
            return Ok(false);
        }

        self.ctx.device.wait_idle()?;
        self.ctx.swapchain.recreate(&*self.ctx.device)?;
        self.graph.on_resize(&mut self.ctx)?;
        scene.on_resize(&*self.ctx.device, self.ctx.swapchain.extent())?;

        self.resize_deferred = false;
        Ok(true)
    }
}

// destroy
impl RenderEngine {
    /// 释放帧同步对象、跨设备 semaphore 与 graph，返回渲染上下文
    ///
    /// 场景资源需要在上下文销毁之前由调用方释放
    pub fn into_context(self) -> RenderContext {
        let Self {
            mut ctx,
            graph,
            sync,
            cross_device,
            ..
        } = self;

        if let Err(e) = ctx.device.wait_idle() {
            log::error!("wait idle before destroying render engine failed: {e}");
        }
        graph.destroy(&mut ctx);
        sync.destroy(ctx.device());
        if let Some(cross_device) = cross_device {
            cross_device.destroy(ctx.device());
        }
        ctx
    }
}

#[cfg(test)]
mod tests {
    use ash::vk;
    use itertools::Itertools;
    use pyrovis_gfx::{
        device::GfxDevice,
        error::GfxResult,
        headless::{GfxCall, HeadlessDevice},
        resources::resource_id::ResourceId,
        swapchain::GfxPresentResult,
    };
    use pyrovis_render_graph::{
        attachment::SWAPCHAIN_ATTACHMENT,
        node::{NodeSetup, UiNode},
        render_graph::RenderGraphBuilder,
        shader_library::ShaderLibrary,
    };
    use pyrovis_render_interface::scene_source::{SceneDraw, SceneField};

    use super::*;

    #[derive(Default)]
    struct AspectScene {
        aspect: Option<f32>,
    }

    impl SceneSource for AspectScene {
        fn camera(&self) -> ResourceId {
            ResourceId::new()
        }

        fn lights(&self) -> ResourceId {
            ResourceId::new()
        }

        fn fire_lights(&self) -> Option<ResourceId> {
            None
        }

        fn draws(&self) -> Vec<SceneDraw> {
            vec![]
        }

        fn field(&self) -> Option<SceneField> {
            None
        }

        fn on_resize(&mut self, _: &dyn GfxDevice, extent: vk::Extent2D) -> GfxResult<()> {
            self.aspect = Some(extent.width as f32 / extent.height as f32);
            Ok(())
        }
    }

    fn engine(device: &HeadlessDevice, scene: &AspectScene, cross_device: bool) -> RenderEngine {
        let mut ctx = RenderContext::new(Box::new(device.clone()), true).unwrap();
        let format = ctx.swapchain.format();
        let shaders = ShaderLibrary::new(".");
        let setup = NodeSetup { scene, shaders: &shaders };

        let mut builder = RenderGraphBuilder::new();
        builder.add_node(UiNode::new(SWAPCHAIN_ATTACHMENT, format)).unwrap();
        let graph = builder.build(&mut ctx, &setup).unwrap();

        let cross_device = cross_device.then(|| CrossDeviceSync::new(ctx.device()).unwrap());
        RenderEngine::new(ctx, graph, cross_device).unwrap()
    }

    /// 只保留帧流程相关的调用
    fn frame_calls(device: &HeadlessDevice) -> Vec<&'static str> {
        device
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                GfxCall::WaitFence { .. } => Some("wait"),
                GfxCall::Acquire { .. } => Some("acquire"),
                GfxCall::ResetFence { .. } => Some("reset-fence"),
                GfxCall::ResetCommandBuffer { .. } => Some("reset-cmd"),
                GfxCall::BeginCommandBuffer { .. } => Some("begin"),
                GfxCall::EndCommandBuffer { .. } => Some("end"),
                GfxCall::Submit { .. } => Some("submit"),
                GfxCall::Present { .. } => Some("present"),
                GfxCall::WaitIdle => Some("wait-idle"),
                GfxCall::CreateSwapchain { .. } => Some("create-swapchain"),
                _ => None,
            })
            .collect()
    }

    fn shutdown(engine: RenderEngine) {
        engine.into_context().destroy();
    }

    #[test]
    fn frame_order() {
        let device = HeadlessDevice::new();
        let mut scene = AspectScene::default();
        let mut engine = engine(&device, &scene, false);
        device.clear_calls();

        assert_eq!(engine.render_frame(&mut scene).unwrap(), FrameOutcome::Presented);
        assert_eq!(
            frame_calls(&device),
            vec!["wait", "acquire", "reset-fence", "reset-cmd", "begin", "end", "submit", "present"]
        );
        assert_eq!(engine.context().frame_counter.frame_id(), 1);
        assert!(engine.frame_title("pyrovis").starts_with("pyrovis - "));
        shutdown(engine);
    }

    #[test]
    fn out_of_date_acquire_resizes_and_retries() {
        let device = HeadlessDevice::new();
        let mut scene = AspectScene::default();
        let mut engine = engine(&device, &scene, false);
        device.push_acquire_result(GfxAcquireResult::OutOfDate);
        device.set_window_extent(vk::Extent2D {
            width: 1920,
            height: 1080,
        });
        device.clear_calls();

        assert_eq!(engine.render_frame(&mut scene).unwrap(), FrameOutcome::Presented);
        assert_eq!(
            frame_calls(&device)[..6],
            ["wait", "acquire", "wait-idle", "create-swapchain", "wait", "acquire"]
        );
        assert_eq!(engine.context().swapchain.extent().width, 1920);
        assert_eq!(scene.aspect, Some(1920.0 / 1080.0));
        shutdown(engine);
    }

    #[test]
    fn suboptimal_present_and_resize_request_recreate_after_present() {
        let device = HeadlessDevice::new();
        let mut scene = AspectScene::default();
        let mut engine = engine(&device, &scene, false);

        device.push_present_result(GfxPresentResult::Suboptimal);
        device.clear_calls();
        engine.render_frame(&mut scene).unwrap();
        assert_eq!(frame_calls(&device).last().copied(), Some("create-swapchain"));

        engine.request_resize();
        device.clear_calls();
        engine.render_frame(&mut scene).unwrap();
        let calls = frame_calls(&device);
        let present = calls.iter().position(|c| *c == "present").unwrap();
        assert_eq!(calls[present + 1..], ["wait-idle", "create-swapchain"]);

        // 请求只处理一次
        device.clear_calls();
        engine.render_frame(&mut scene).unwrap();
        assert!(!frame_calls(&device).contains(&"create-swapchain"));
        shutdown(engine);
    }

    #[test]
    fn zero_extent_defers_until_visible() {
        let device = HeadlessDevice::new();
        let mut scene = AspectScene::default();
        let mut engine = engine(&device, &scene, false);

        device.set_window_extent(vk::Extent2D { width: 0, height: 0 });
        engine.request_resize();
        engine.render_frame(&mut scene).unwrap();
        assert!(engine.is_resize_deferred());

        device.clear_calls();
        assert_eq!(engine.render_frame(&mut scene).unwrap(), FrameOutcome::Deferred);
        assert!(frame_calls(&device).is_empty());

        device.set_window_extent(vk::Extent2D {
            width: 1280,
            height: 720,
        });
        device.clear_calls();
        assert_eq!(engine.render_frame(&mut scene).unwrap(), FrameOutcome::Presented);
        assert_eq!(frame_calls(&device)[..2], ["wait-idle", "create-swapchain"]);
        assert!(!engine.is_resize_deferred());
        assert_eq!(engine.context().swapchain.extent().width, 1280);
        shutdown(engine);
    }

    #[test]
    fn compute_wait_starts_at_second_frame() {
        let device = HeadlessDevice::new();
        let mut scene = AspectScene::default();
        let mut engine = engine(&device, &scene, true);
        let compute_done = engine.cross_device().unwrap().compute_done().handle();

        device.clear_calls();
        engine.render_frame(&mut scene).unwrap();
        engine.render_frame(&mut scene).unwrap();

        let submits = device
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                GfxCall::Submit { info, .. } => Some(info),
                _ => None,
            })
            .collect_vec();
        assert_eq!(submits.len(), 2);
        assert!(submits[0].wait_infos().iter().all(|w| w.semaphore != compute_done));
        assert!(submits[1].wait_infos().iter().any(|w| w.semaphore == compute_done));
        shutdown(engine);
    }
}
