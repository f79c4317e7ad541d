use pyrovis_gfx::{device::GfxDevice, error::GfxResult, swapchain::GfxSwapchain};

use crate::{
    descriptor_manager::DescriptorManager, frame_counter::FrameCounter, gfx_resource_manager::GfxResourceManager,
};

/// 渲染过程中共享的状态，显式地传给 render graph 和各个节点
///
/// 字段是公开的，从而可以同时借用设备（只读）和资源表（可变）
pub struct RenderContext {
    pub device: Box<dyn GfxDevice>,
    pub resources: GfxResourceManager,
    pub descriptors: DescriptorManager,
    pub frame_counter: FrameCounter,
    pub swapchain: GfxSwapchain,
}

// new & init
impl RenderContext {
    /// 失败时 device 也会被销毁
    pub fn new(device: Box<dyn GfxDevice>, vsync: bool) -> GfxResult<Self> {
        let descriptors = match DescriptorManager::new(&*device) {
            Ok(descriptors) => descriptors,
            Err(e) => {
                device.destroy();
                return Err(e);
            }
        };
        let swapchain = match GfxSwapchain::new(&*device, vsync) {
            Ok(swapchain) => swapchain,
            Err(e) => {
                descriptors.destroy(&*device);
                device.destroy();
                return Err(e);
            }
        };

        Ok(Self {
            device,
            resources: GfxResourceManager::new(),
            descriptors,
            frame_counter: FrameCounter::new(),
            swapchain,
        })
    }
}

// getters
impl RenderContext {
    #[inline]
    pub fn device(&self) -> &dyn GfxDevice {
        &*self.device
    }
}

// destroy
impl RenderContext {
    /// 销毁顺序：swapchain、注册表、资源、设备
    pub fn destroy(self) {
        let Self {
            device,
            resources,
            descriptors,
            swapchain,
            ..
        } = self;
        if let Err(e) = device.wait_idle() {
            log::error!("wait idle before destroying render context failed: {e}");
        }

        swapchain.destroy(&*device);
        descriptors.destroy(&*device);
        resources.destroy(&*device);
        device.destroy();
    }
}
