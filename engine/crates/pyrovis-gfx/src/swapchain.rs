use ash::vk;
use itertools::Itertools;

use crate::{
    commands::semaphore::GfxSemaphore,
    device::GfxDevice,
    error::{GfxError, GfxResult},
    resources::image::GfxImage,
};

/// acquire 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GfxAcquireResult {
    /// suboptimal 时依然可以继续使用该 image
    Acquired { index: u32, suboptimal: bool },
    /// swapchain 已经失效，需要重建后再 acquire
    OutOfDate,
}

/// present 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GfxPresentResult {
    Ok,
    Suboptimal,
    OutOfDate,
}

impl GfxPresentResult {
    #[inline]
    pub fn need_recreate(&self) -> bool {
        !matches!(self, Self::Ok)
    }
}

/// 设备创建 swapchain 后返回的信息
#[derive(Debug, Clone)]
pub struct GfxSwapchainDesc {
    pub handle: vk::SwapchainKHR,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub usage: vk::ImageUsageFlags,
    pub images: Vec<vk::Image>,
}

/// 可呈现的 image 集合
///
/// 每张 image 包装为 [`GfxImage`]（来源为 External），从而拥有 view 以及 layout 记录
pub struct GfxSwapchain {
    handle: vk::SwapchainKHR,
    images: Vec<GfxImage>,
    image_index: usize,

    color_format: vk::Format,
    extent: vk::Extent2D,
    vsync: bool,
}

// new & init
impl GfxSwapchain {
    pub fn new(device: &dyn GfxDevice, vsync: bool) -> GfxResult<Self> {
        let desc = device.create_swapchain(vk::SwapchainKHR::null(), vsync)?;
        let images = Self::wrap_images(device, &desc)?;

        log::info!(
            "swapchain created: {}x{}, {:?}, {} images",
            desc.extent.width,
            desc.extent.height,
            desc.format,
            images.len()
        );

        Ok(Self {
            handle: desc.handle,
            images,
            image_index: 0,
            color_format: desc.format,
            extent: desc.extent,
            vsync,
        })
    }

    fn wrap_images(device: &dyn GfxDevice, desc: &GfxSwapchainDesc) -> GfxResult<Vec<GfxImage>> {
        desc.images
            .iter()
            .enumerate()
            .map(|(idx, image)| {
                GfxImage::from_external(
                    device,
                    *image,
                    desc.format,
                    desc.extent,
                    desc.usage,
                    format!("swapchain-{idx}"),
                )
            })
            .collect::<GfxResult<Vec<_>>>()
    }

    /// 以当前 surface 尺寸重建，旧的 swapchain 及其 view 会被销毁
    pub fn recreate(&mut self, device: &dyn GfxDevice) -> GfxResult<()> {
        for image in self.images.drain(..) {
            image.destroy(device);
        }
        let desc = device.create_swapchain(self.handle, self.vsync)?;
        self.images = Self::wrap_images(device, &desc)?;
        self.handle = desc.handle;
        self.color_format = desc.format;
        self.extent = desc.extent;
        self.image_index = 0;

        log::info!("swapchain recreated: {}x{}", desc.extent.width, desc.extent.height);
        Ok(())
    }
}

// destroy
impl GfxSwapchain {
    pub fn destroy(mut self, device: &dyn GfxDevice) {
        for image in self.images.drain(..) {
            image.destroy(device);
        }
        device.destroy_swapchain(self.handle);
    }
}

// getters
impl GfxSwapchain {
    #[inline]
    pub fn vk_handle(&self) -> vk::SwapchainKHR {
        self.handle
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.color_format
    }

    #[inline]
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    #[inline]
    pub fn images(&self) -> &[GfxImage] {
        &self.images
    }

    #[inline]
    pub fn image_views(&self) -> Vec<vk::ImageView> {
        self.images.iter().map(|image| image.view()).collect_vec()
    }

    #[inline]
    pub fn current_image_index(&self) -> usize {
        self.image_index
    }

    #[inline]
    pub fn current_image(&self) -> &GfxImage {
        &self.images[self.image_index]
    }

    #[inline]
    pub fn current_image_mut(&mut self) -> &mut GfxImage {
        &mut self.images[self.image_index]
    }
}

// tools
impl GfxSwapchain {
    /// acquire 下一张 image，成功时更新当前 image index
    pub fn acquire_next_image(
        &mut self,
        device: &dyn GfxDevice,
        signal: &GfxSemaphore,
    ) -> GfxResult<GfxAcquireResult> {
        let result = device.acquire_next_image(self.handle, signal.handle())?;
        match result {
            GfxAcquireResult::Acquired { index, suboptimal } => {
                if index as usize >= self.images.len() {
                    return Err(GfxError::OutOfRange(format!(
                        "acquired image index {index} >= swapchain image count {}",
                        self.images.len()
                    )));
                }
                if suboptimal {
                    log::warn!("swapchain acquire image index {index} is suboptimal");
                }
                self.image_index = index as usize;
            }
            GfxAcquireResult::OutOfDate => log::warn!("swapchain out of date while acquiring"),
        }
        Ok(result)
    }

    #[inline]
    pub fn present(&self, device: &dyn GfxDevice, wait: &GfxSemaphore) -> GfxResult<GfxPresentResult> {
        device.present(self.handle, self.image_index as u32, wait.handle())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::GfxDevice;
    use crate::headless::HeadlessDevice;

    #[test]
    fn recreate_follows_surface_extent() {
        let device = HeadlessDevice::new();
        device.set_window_extent(vk::Extent2D { width: 800, height: 600 });
        let mut swapchain = GfxSwapchain::new(&device, true).unwrap();
        assert_eq!(swapchain.extent(), vk::Extent2D { width: 800, height: 600 });

        device.set_window_extent(vk::Extent2D { width: 1920, height: 1080 });
        swapchain.recreate(&device).unwrap();
        assert_eq!(swapchain.extent(), vk::Extent2D { width: 1920, height: 1080 });
        assert!(swapchain.images().iter().all(|image| image.extent().width == 1920));
        swapchain.destroy(&device);
    }

    #[test]
    fn acquire_updates_index() {
        let device = HeadlessDevice::new();
        let mut swapchain = GfxSwapchain::new(&device, true).unwrap();
        let semaphore = GfxSemaphore::new(&device, "image-available").unwrap();

        device.push_acquire_result(GfxAcquireResult::Acquired {
            index: 2,
            suboptimal: false,
        });
        swapchain.acquire_next_image(&device, &semaphore).unwrap();
        assert_eq!(swapchain.current_image_index(), 2);

        device.push_acquire_result(GfxAcquireResult::OutOfDate);
        assert_eq!(swapchain.acquire_next_image(&device, &semaphore).unwrap(), GfxAcquireResult::OutOfDate);
        assert_eq!(swapchain.current_image_index(), 2);
    }
}
