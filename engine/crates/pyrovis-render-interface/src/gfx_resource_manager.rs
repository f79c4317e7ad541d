use std::collections::HashMap;

use ash::vk;
use pyrovis_gfx::{
    device::GfxDevice,
    error::GfxResult,
    resources::{
        buffer::{GfxBuffer, GfxBufferCreateInfo},
        image::{GfxImage, GfxImageCreateInfo},
        resource_id::ResourceId,
    },
};
use slotmap::SlotMap;

slotmap::new_key_type! {
    pub struct GfxImageHandle;
    pub struct GfxBufferHandle;
}

/// 资源管理器
///
/// 使用 SlotMap 存储 buffer 和 image，对外提供轻量级的 Handle；
/// 同时维护 [`ResourceId`] 到 Handle 的索引。
///
/// image 可以以新的尺寸原地重建，Handle 与身份都保持不变。
pub struct GfxResourceManager {
    image_pool: SlotMap<GfxImageHandle, GfxImage>,
    buffer_pool: SlotMap<GfxBufferHandle, GfxBuffer>,

    image_lookup: HashMap<ResourceId, GfxImageHandle>,
    buffer_lookup: HashMap<ResourceId, GfxBufferHandle>,

    destroyed: bool,
}
impl Default for GfxResourceManager {
    fn default() -> Self {
        Self::new()
    }
}
// new & init
impl GfxResourceManager {
    pub fn new() -> Self {
        Self {
            image_pool: SlotMap::with_key(),
            buffer_pool: SlotMap::with_key(),
            image_lookup: HashMap::new(),
            buffer_lookup: HashMap::new(),
            destroyed: false,
        }
    }
}
// destroy
impl GfxResourceManager {
    pub fn destroy(mut self, device: &dyn GfxDevice) {
        self.destroy_mut(device);
    }

    pub fn destroy_mut(&mut self, device: &dyn GfxDevice) {
        let _span = tracy_client::span!("GfxResourceManager::destroy_all");

        for (_, image) in self.image_pool.drain() {
            image.destroy(device);
        }
        for (_, buffer) in self.buffer_pool.drain() {
            buffer.destroy(device);
        }
        self.image_lookup.clear();
        self.buffer_lookup.clear();
        self.destroyed = true;
    }
}
impl Drop for GfxResourceManager {
    fn drop(&mut self) {
        if !self.destroyed && (!self.image_pool.is_empty() || !self.buffer_pool.is_empty()) {
            log::error!(
                "GfxResourceManager dropped with {} images and {} buffers alive",
                self.image_pool.len(),
                self.buffer_pool.len()
            );
        }
    }
}
// Image API
impl GfxResourceManager {
    pub fn register_image(&mut self, image: GfxImage) -> GfxImageHandle {
        let id = image.id();
        let handle = self.image_pool.insert(image);
        self.image_lookup.insert(id, handle);
        handle
    }

    pub fn create_image(&mut self, device: &dyn GfxDevice, info: &GfxImageCreateInfo) -> GfxResult<GfxImageHandle> {
        let image = GfxImage::new(device, info)?;
        Ok(self.register_image(image))
    }

    #[inline]
    pub fn get_image(&self, handle: GfxImageHandle) -> Option<&GfxImage> {
        self.image_pool.get(handle)
    }

    #[inline]
    pub fn get_image_mut(&mut self, handle: GfxImageHandle) -> Option<&mut GfxImage> {
        self.image_pool.get_mut(handle)
    }

    #[inline]
    pub fn image_handle(&self, id: ResourceId) -> Option<GfxImageHandle> {
        self.image_lookup.get(&id).copied()
    }

    /// 以新的尺寸重建 image，身份和 Handle 不变
    ///
    /// # Returns
    /// handle 不存在时返回 `Ok(false)`
    pub fn recreate_image(
        &mut self,
        device: &dyn GfxDevice,
        handle: GfxImageHandle,
        extent: vk::Extent2D,
    ) -> GfxResult<bool> {
        let Some(image) = self.image_pool.get_mut(handle) else {
            return Ok(false);
        };
        image.recreate(device, extent)?;
        Ok(true)
    }

    /// 立即销毁，调用方需要保证 GPU 不再使用该 image
    pub fn destroy_image(&mut self, device: &dyn GfxDevice, handle: GfxImageHandle) {
        if let Some(image) = self.image_pool.remove(handle) {
            self.image_lookup.remove(&image.id());
            image.destroy(device);
        }
    }

    #[inline]
    pub fn image_count(&self) -> usize {
        self.image_pool.len()
    }
}
// Buffer API
impl GfxResourceManager {
    pub fn register_buffer(&mut self, buffer: GfxBuffer) -> GfxBufferHandle {
        let id = buffer.id();
        let handle = self.buffer_pool.insert(buffer);
        self.buffer_lookup.insert(id, handle);
        handle
    }

    pub fn create_buffer(&mut self, device: &dyn GfxDevice, info: &GfxBufferCreateInfo) -> GfxResult<GfxBufferHandle> {
        let buffer = GfxBuffer::new(device, info)?;
        Ok(self.register_buffer(buffer))
    }

    #[inline]
    pub fn get_buffer(&self, handle: GfxBufferHandle) -> Option<&GfxBuffer> {
        self.buffer_pool.get(handle)
    }

    #[inline]
    pub fn buffer_handle(&self, id: ResourceId) -> Option<GfxBufferHandle> {
        self.buffer_lookup.get(&id).copied()
    }

    /// 通过身份查找 buffer
    #[inline]
    pub fn buffer_by_id(&self, id: ResourceId) -> Option<&GfxBuffer> {
        self.buffer_handle(id).and_then(|handle| self.buffer_pool.get(handle))
    }

    pub fn destroy_buffer(&mut self, device: &dyn GfxDevice, handle: GfxBufferHandle) {
        if let Some(buffer) = self.buffer_pool.remove(handle) {
            self.buffer_lookup.remove(&buffer.id());
            buffer.destroy(device);
        }
    }

    #[inline]
    pub fn buffer_count(&self) -> usize {
        self.buffer_pool.len()
    }
}
