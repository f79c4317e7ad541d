//! 图形与计算两个执行上下文之间的同步
//!
//! 每帧的握手：
//! - 图形提交等待 `compute_done`（从第 1 帧开始），完成后 signal `graphics_done`
//! - 计算侧等待 `graphics_done`，完成后 signal `compute_done`
//!
//! 第 0 帧时计算侧还没有运行过，`compute_done` 永远不会被 signal，因此图形侧不能等待它。

use ash::vk;
use pyrovis_gfx::{
    commands::{command_buffer::GfxCommandBuffer, semaphore::GfxSemaphore, submit_info::GfxSubmitInfo},
    device::GfxDevice,
    interop::ExternalHandle,
    resources::{buffer::GfxBuffer, format::VulkanFormatUtils, image::GfxImage},
};

use crate::error::{RendererError, RendererResult};

/// 导出给计算侧的 buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtBufferDesc {
    pub handle: ExternalHandle,
    pub buffer_size: u64,
    pub name: String,
}

/// 导出给计算侧的单通道 image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtImageDesc {
    pub handle: ExternalHandle,
    pub image_size: u64,
    pub element_size: u64,
    pub width: u64,
    pub height: u64,
    pub depth: u64,
    pub name: String,
}

impl ExtBufferDesc {
    pub fn export(device: &dyn GfxDevice, buffer: &GfxBuffer) -> RendererResult<Self> {
        let handle = buffer.export(device).map_err(|source| RendererError::Export {
            name: buffer.debug_name().to_string(),
            source,
        })?;
        Ok(Self {
            handle,
            buffer_size: buffer.size(),
            name: buffer.debug_name().to_string(),
        })
    }
}

impl ExtImageDesc {
    pub fn export(device: &dyn GfxDevice, image: &GfxImage) -> RendererResult<Self> {
        let export_err = |source| RendererError::Export {
            name: image.debug_name().to_string(),
            source,
        };
        let handle = image.export(device).map_err(export_err)?;
        let element_size = VulkanFormatUtils::pixel_size_in_bytes(image.format()).map_err(export_err)?;
        let image_size = image.byte_size().map_err(export_err)?;
        let extent = image.extent();

        Ok(Self {
            handle,
            image_size,
            element_size: element_size as u64,
            width: extent.width as u64,
            height: extent.height as u64,
            depth: 1,
            name: image.debug_name().to_string(),
        })
    }
}

/// 交给计算侧导入的全部句柄
#[derive(Debug, Clone, Default)]
pub struct SharedHandles {
    pub compute_done: Option<ExternalHandle>,
    pub graphics_done: Option<ExternalHandle>,
    pub buffers: Vec<ExtBufferDesc>,
    pub images: Vec<ExtImageDesc>,
}

/// 一对可导出的 semaphore
pub struct CrossDeviceSync {
    /// 计算侧 signal，图形侧等待
    compute_done: GfxSemaphore,
    /// 图形侧 signal，计算侧等待
    graphics_done: GfxSemaphore,
}

// new & init
impl CrossDeviceSync {
    pub fn new(device: &dyn GfxDevice) -> RendererResult<Self> {
        let compute_done = GfxSemaphore::new_exportable(device, "compute-done")?;
        let graphics_done = match GfxSemaphore::new_exportable(device, "graphics-done") {
            Ok(semaphore) => semaphore,
            Err(e) => {
                compute_done.destroy(device);
                return Err(e.into());
            }
        };
        Ok(Self {
            compute_done,
            graphics_done,
        })
    }

    /// 导出两个 semaphore 的句柄，任何一个失败都是致命的
    pub fn export(&self, device: &dyn GfxDevice) -> RendererResult<SharedHandles> {
        let export = |semaphore: &GfxSemaphore, name: &str| {
            semaphore.export(device).map_err(|source| RendererError::Export {
                name: name.to_string(),
                source,
            })
        };

        let shared = SharedHandles {
            compute_done: Some(export(&self.compute_done, "compute-done")?),
            graphics_done: Some(export(&self.graphics_done, "graphics-done")?),
            ..Default::default()
        };
        log::info!("exported cross-device semaphores");
        Ok(shared)
    }
}

// getters
impl CrossDeviceSync {
    #[inline]
    pub fn compute_done(&self) -> &GfxSemaphore {
        &self.compute_done
    }

    #[inline]
    pub fn graphics_done(&self) -> &GfxSemaphore {
        &self.graphics_done
    }
}

// tools
impl CrossDeviceSync {
    /// 在图形提交上追加跨设备的等待与 signal
    pub fn decorate(&self, submit_info: GfxSubmitInfo, frame_id: u64) -> GfxSubmitInfo {
        let submit_info = if frame_id >= 1 {
            submit_info.wait(&self.compute_done, vk::PipelineStageFlags2::ALL_COMMANDS)
        } else {
            submit_info
        };
        submit_info.signal(&self.graphics_done, vk::PipelineStageFlags2::ALL_COMMANDS)
    }
}

// destroy
impl CrossDeviceSync {
    pub fn destroy(self, device: &dyn GfxDevice) {
        self.compute_done.destroy(device);
        self.graphics_done.destroy(device);
    }
}

/// 组装一帧的图形提交
///
/// 总是等待 `image_available`，signal `render_finished`；有计算侧时再加上跨设备的握手
pub fn frame_submit_info(
    cmd: &GfxCommandBuffer,
    image_available: &GfxSemaphore,
    render_finished: &GfxSemaphore,
    cross_device: Option<&CrossDeviceSync>,
    frame_id: u64,
) -> GfxSubmitInfo {
    let submit_info = GfxSubmitInfo::new(&[cmd])
        .wait(image_available, vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)
        .signal(render_finished, vk::PipelineStageFlags2::ALL_COMMANDS);
    match cross_device {
        Some(cross_device) => cross_device.decorate(submit_info, frame_id),
        None => submit_info,
    }
}

#[cfg(test)]
mod tests {
    use pyrovis_gfx::{
        headless::{GfxCall, HeadlessDevice},
        resources::{buffer::GfxBufferCreateInfo, image::GfxImageCreateInfo},
    };

    use super::*;

    #[test]
    fn bootstrap_wait_asymmetry() {
        let device = HeadlessDevice::new();
        let cross = CrossDeviceSync::new(&device).unwrap();
        let cmd = GfxCommandBuffer::new(&device, "frame").unwrap();
        let image_available = GfxSemaphore::new(&device, "image-available").unwrap();
        let render_finished = GfxSemaphore::new(&device, "render-finished").unwrap();

        let first = frame_submit_info(&cmd, &image_available, &render_finished, Some(&cross), 0);
        let waits = first.wait_infos().iter().map(|w| w.semaphore).collect::<Vec<_>>();
        assert_eq!(waits, vec![image_available.handle()]);
        let signals = first.signal_infos().iter().map(|s| s.semaphore).collect::<Vec<_>>();
        assert_eq!(signals, vec![render_finished.handle(), cross.graphics_done().handle()]);

        let later = frame_submit_info(&cmd, &image_available, &render_finished, Some(&cross), 1);
        assert_eq!(later.wait_infos().len(), 2);
        assert_eq!(later.wait_infos()[0].stage, vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT);
        assert_eq!(later.wait_infos()[1].semaphore, cross.compute_done().handle());
        assert_eq!(later.wait_infos()[1].stage, vk::PipelineStageFlags2::ALL_COMMANDS);
        assert_eq!(later.signal_infos().len(), 2);

        let standalone = frame_submit_info(&cmd, &image_available, &render_finished, None, 5);
        assert_eq!(standalone.wait_infos().len(), 1);
        assert_eq!(standalone.signal_infos().len(), 1);

        cross.destroy(&device);
        cmd.free(&device);
        image_available.destroy(&device);
        render_finished.destroy(&device);
    }

    #[test]
    fn exports_semaphores_and_resources() {
        let device = HeadlessDevice::new();
        let cross = CrossDeviceSync::new(&device).unwrap();
        let shared = cross.export(&device).unwrap();
        assert!(shared.compute_done.is_some() && shared.graphics_done.is_some());
        assert_eq!(
            device.calls().iter().filter(|call| matches!(call, GfxCall::ExportSemaphore { .. })).count(),
            2
        );

        let buffer = GfxBuffer::new(
            &device,
            &GfxBufferCreateInfo::new(256, vk::BufferUsageFlags::STORAGE_BUFFER, "density").external(true),
        )
        .unwrap();
        let desc = ExtBufferDesc::export(&device, &buffer).unwrap();
        assert_eq!(desc.buffer_size, 256);
        assert_eq!(desc.name, "density");

        let image = GfxImage::new(
            &device,
            &GfxImageCreateInfo::new_image_2d_info(
                vk::Extent2D { width: 64, height: 32 },
                vk::Format::R32_SFLOAT,
                vk::ImageUsageFlags::STORAGE | vk::ImageUsageFlags::SAMPLED,
                "temperature",
            )
            .external(true),
        )
        .unwrap();
        let desc = ExtImageDesc::export(&device, &image).unwrap();
        assert_eq!((desc.width, desc.height, desc.depth), (64, 32, 1));
        assert_eq!(desc.element_size, 4);
        assert_eq!(desc.image_size, 64 * 32 * 4);

        buffer.destroy(&device);
        image.destroy(&device);
        cross.destroy(&device);
    }

    #[test]
    fn non_external_buffer_fails_export() {
        let device = HeadlessDevice::new();
        let buffer = GfxBuffer::new_uniform_buffer(&device, 16, "camera").unwrap();
        assert!(matches!(
            ExtBufferDesc::export(&device, &buffer),
            Err(RendererError::Export { name, .. }) if name == "camera"
        ));
        buffer.destroy(&device);
    }
}
