use std::collections::{BTreeSet, HashMap};

use ash::vk;
use indexmap::IndexMap;
use itertools::Itertools;
use pyrovis_gfx::{
    descriptors::{
        GfxDescriptorBinding, GfxDescriptorCopy, GfxDescriptorInfo, GfxDescriptorPoolDesc, GfxDescriptorSetLayoutDesc,
        GfxDescriptorWrite,
    },
    device::GfxDevice,
    error::GfxResult,
    resources::{buffer::GfxBuffer, image::GfxImage, resource_id::ResourceId},
};

use crate::error::{DescriptorError, DescriptorResult};

/// bindless 表中每个类别的槽位数量
pub const BINDLESS_CAPACITY: u32 = 1024;
/// 参数 descriptor 池的初始容量，写满后翻倍
pub const PARAMETER_POOL_INITIAL_SIZE: u32 = 128;

/// bindless 表中的资源类别，取值同时也是 bindless set 中的 binding 序号
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DescriptorCategory {
    Uniform = 0,
    Storage = 1,
    CombinedImageSampler = 2,
}

impl DescriptorCategory {
    pub const ALL: [Self; 3] = [Self::Uniform, Self::Storage, Self::CombinedImageSampler];

    #[inline]
    pub fn binding(self) -> u32 {
        self as u32
    }

    #[inline]
    pub fn descriptor_type(self) -> vk::DescriptorType {
        match self {
            Self::Uniform => vk::DescriptorType::UNIFORM_BUFFER,
            Self::Storage => vk::DescriptorType::STORAGE_BUFFER,
            Self::CombinedImageSampler => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        }
    }
}

/// bindless 表中的槽位下标，shader 通过它访问资源
///
/// 同一类别内，分配期间唯一；只有显式注销之后才会被复用
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DescriptorHandle(pub u32);

impl DescriptorHandle {
    pub const NULL: Self = Self(u32::MAX);

    #[inline]
    pub fn is_null(&self) -> bool {
        *self == Self::NULL
    }

    #[inline]
    pub fn index(&self) -> u32 {
        self.0
    }
}

impl Default for DescriptorHandle {
    fn default() -> Self {
        Self::NULL
    }
}

/// bindless 槽位的记账，不涉及任何设备调用
///
/// 每个类别维护一个空闲集合，分配时总是取最小的空闲下标
pub struct BindlessSlots {
    free: [BTreeSet<u32>; 3],
    allocated: HashMap<ResourceId, (DescriptorCategory, DescriptorHandle)>,
}

// new & init
impl BindlessSlots {
    pub fn new(capacity: u32) -> Self {
        Self {
            free: std::array::from_fn(|_| (0..capacity).collect()),
            allocated: HashMap::new(),
        }
    }
}

// getters
impl BindlessSlots {
    #[inline]
    pub fn get(&self, id: ResourceId) -> Option<(DescriptorCategory, DescriptorHandle)> {
        self.allocated.get(&id).copied()
    }

    #[inline]
    pub fn free_count(&self, category: DescriptorCategory) -> usize {
        self.free[category as usize].len()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.allocated.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.allocated.is_empty()
    }
}

// tools
impl BindlessSlots {
    pub fn allocate(&mut self, id: ResourceId, category: DescriptorCategory) -> DescriptorResult<DescriptorHandle> {
        if self.allocated.contains_key(&id) {
            return Err(DescriptorError::AlreadyRegistered(id));
        }
        let index = self.free[category as usize]
            .pop_first()
            .ok_or(DescriptorError::CategoryExhausted(category))?;

        let handle = DescriptorHandle(index);
        self.allocated.insert(id, (category, handle));
        Ok(handle)
    }

    pub fn release(&mut self, id: ResourceId) -> DescriptorResult<(DescriptorCategory, DescriptorHandle)> {
        let (category, handle) = self.allocated.remove(&id).ok_or(DescriptorError::UnknownResource(id))?;
        self.free[category as usize].insert(handle.0);
        Ok((category, handle))
    }
}

/// 资源注册表
///
/// # bindless set
/// - binding 0：uniform buffer 数组
/// - binding 1：storage buffer 数组
/// - binding 2：combined image sampler 数组
///
/// 每个数组 1024 个元素，shader 中通过 [`DescriptorHandle`] 索引。
///
/// # 参数 set
/// 每个参数 buffer 独占一个 descriptor set（binding 0，uniform buffer），
/// 来自一个可以增长的池子：写满后创建两倍容量的新池，把旧的 set 拷贝过去。
pub struct DescriptorManager {
    bindless_layout: vk::DescriptorSetLayout,
    bindless_pool: vk::DescriptorPool,
    bindless_set: vk::DescriptorSet,
    slots: BindlessSlots,

    parameter_layout: vk::DescriptorSetLayout,
    parameter_pool: vk::DescriptorPool,
    parameter_pool_size: u32,
    parameter_sets: IndexMap<ResourceId, vk::DescriptorSet>,

    /// 交给 UI 使用的小池子
    ui_pool: vk::DescriptorPool,

    destroyed: bool,
}

// new & init
impl DescriptorManager {
    pub fn new(device: &dyn GfxDevice) -> GfxResult<Self> {
        let bindless_layout = device.create_descriptor_set_layout(&GfxDescriptorSetLayoutDesc {
            bindings: DescriptorCategory::ALL
                .iter()
                .map(|category| GfxDescriptorBinding {
                    binding: category.binding(),
                    ty: category.descriptor_type(),
                    count: BINDLESS_CAPACITY,
                    stages: vk::ShaderStageFlags::ALL,
                    bindless: true,
                })
                .collect_vec(),
            name: "bindless".to_string(),
        })?;
        let bindless_pool = device.create_descriptor_pool(&GfxDescriptorPoolDesc {
            sizes: DescriptorCategory::ALL
                .iter()
                .map(|category| vk::DescriptorPoolSize {
                    ty: category.descriptor_type(),
                    descriptor_count: BINDLESS_CAPACITY,
                })
                .collect_vec(),
            max_sets: 1,
            flags: vk::DescriptorPoolCreateFlags::empty(),
            name: "bindless".to_string(),
        })?;
        let bindless_set = device.allocate_descriptor_set(bindless_pool, bindless_layout)?;

        let parameter_layout = device.create_descriptor_set_layout(&GfxDescriptorSetLayoutDesc {
            bindings: vec![GfxDescriptorBinding {
                binding: 0,
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                count: 1,
                stages: vk::ShaderStageFlags::ALL,
                bindless: false,
            }],
            name: "parameter".to_string(),
        })?;
        let parameter_pool = device.create_descriptor_pool(&Self::parameter_pool_desc(PARAMETER_POOL_INITIAL_SIZE))?;

        let ui_pool = device.create_descriptor_pool(&GfxDescriptorPoolDesc {
            sizes: vec![vk::DescriptorPoolSize {
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: 2,
            }],
            max_sets: 2,
            flags: vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET,
            name: "ui".to_string(),
        })?;

        log::info!("descriptor manager created, bindless capacity {BINDLESS_CAPACITY} per category");

        Ok(Self {
            bindless_layout,
            bindless_pool,
            bindless_set,
            slots: BindlessSlots::new(BINDLESS_CAPACITY),
            parameter_layout,
            parameter_pool,
            parameter_pool_size: PARAMETER_POOL_INITIAL_SIZE,
            parameter_sets: IndexMap::new(),
            ui_pool,
            destroyed: false,
        })
    }

    fn parameter_pool_desc(size: u32) -> GfxDescriptorPoolDesc {
        GfxDescriptorPoolDesc {
            sizes: vec![vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: size,
            }],
            max_sets: size,
            flags: vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET,
            name: format!("parameter-{size}"),
        }
    }
}

// destroy
impl DescriptorManager {
    pub fn destroy(mut self, device: &dyn GfxDevice) {
        device.destroy_descriptor_pool(self.ui_pool);
        device.destroy_descriptor_pool(self.parameter_pool);
        device.destroy_descriptor_pool(self.bindless_pool);
        device.destroy_descriptor_set_layout(self.parameter_layout);
        device.destroy_descriptor_set_layout(self.bindless_layout);
        self.parameter_sets.clear();
        self.destroyed = true;
    }
}
impl Drop for DescriptorManager {
    fn drop(&mut self) {
        if !self.destroyed {
            log::error!("DescriptorManager dropped without destroy");
        }
    }
}

// getters
impl DescriptorManager {
    #[inline]
    pub fn bindless_layout(&self) -> vk::DescriptorSetLayout {
        self.bindless_layout
    }

    #[inline]
    pub fn bindless_set(&self) -> vk::DescriptorSet {
        self.bindless_set
    }

    #[inline]
    pub fn parameter_layout(&self) -> vk::DescriptorSetLayout {
        self.parameter_layout
    }

    #[inline]
    pub fn parameter_pool_size(&self) -> u32 {
        self.parameter_pool_size
    }

    #[inline]
    pub fn ui_pool(&self) -> vk::DescriptorPool {
        self.ui_pool
    }

    #[inline]
    pub fn slots(&self) -> &BindlessSlots {
        &self.slots
    }
}

// bindless 注册
impl DescriptorManager {
    /// image 只能注册为 combined image sampler，并且必须带有 sampler
    pub fn register_image(
        &mut self,
        device: &dyn GfxDevice,
        image: &GfxImage,
        category: DescriptorCategory,
    ) -> DescriptorResult<DescriptorHandle> {
        let info = Self::image_info(image, category)?;
        let handle = self.slots.allocate(image.id(), category)?;
        self.write_slot(device, category, handle, info);
        log::debug!("register image `{}` as {category:?}[{}]", image.debug_name(), handle.0);
        Ok(handle)
    }

    /// buffer 只能注册为 uniform 或 storage
    pub fn register_buffer(
        &mut self,
        device: &dyn GfxDevice,
        buffer: &GfxBuffer,
        category: DescriptorCategory,
    ) -> DescriptorResult<DescriptorHandle> {
        let info = Self::buffer_info(buffer, category)?;
        let handle = self.slots.allocate(buffer.id(), category)?;
        self.write_slot(device, category, handle, info);
        log::debug!("register buffer `{}` as {category:?}[{}]", buffer.debug_name(), handle.0);
        Ok(handle)
    }

    /// 原地重写已注册的槽位，handle 保持不变
    ///
    /// 用于 image 以相同身份重建之后
    pub fn update_image_registration(
        &mut self,
        device: &dyn GfxDevice,
        image: &GfxImage,
    ) -> DescriptorResult<DescriptorHandle> {
        let (category, handle) = self.slots.get(image.id()).ok_or(DescriptorError::UnknownResource(image.id()))?;
        let info = Self::image_info(image, category)?;
        self.write_slot(device, category, handle, info);
        Ok(handle)
    }

    pub fn update_buffer_registration(
        &mut self,
        device: &dyn GfxDevice,
        buffer: &GfxBuffer,
    ) -> DescriptorResult<DescriptorHandle> {
        let (category, handle) = self.slots.get(buffer.id()).ok_or(DescriptorError::UnknownResource(buffer.id()))?;
        let info = Self::buffer_info(buffer, category)?;
        self.write_slot(device, category, handle, info);
        Ok(handle)
    }

    #[inline]
    pub fn get_resource_handle(&self, id: ResourceId) -> DescriptorResult<DescriptorHandle> {
        self.slots.get(id).map(|(_, handle)| handle).ok_or(DescriptorError::UnknownResource(id))
    }

    /// 归还槽位；bindless set 是 PARTIALLY_BOUND 的，旧的 descriptor 不需要清除
    pub fn remove_resource_registration(&mut self, id: ResourceId) -> DescriptorResult<DescriptorHandle> {
        let (category, handle) = self.slots.release(id)?;
        log::debug!("unregister resource {id} from {category:?}[{}]", handle.0);
        Ok(handle)
    }

    fn image_info(image: &GfxImage, category: DescriptorCategory) -> DescriptorResult<GfxDescriptorInfo> {
        if category != DescriptorCategory::CombinedImageSampler {
            return Err(DescriptorError::WrongCategory { kind: "image", category });
        }
        let sampler = image.sampler().ok_or(DescriptorError::MissingSampler(image.id()))?;
        // 被采样时 image 由 render graph 转换到 SHADER_READ_ONLY_OPTIMAL
        Ok(GfxDescriptorInfo::CombinedImageSampler {
            sampler,
            view: image.view(),
            layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        })
    }

    fn buffer_info(buffer: &GfxBuffer, category: DescriptorCategory) -> DescriptorResult<GfxDescriptorInfo> {
        if category == DescriptorCategory::CombinedImageSampler {
            return Err(DescriptorError::WrongCategory { kind: "buffer", category });
        }
        Ok(GfxDescriptorInfo::Buffer {
            ty: category.descriptor_type(),
            buffer: buffer.vk_buffer(),
            offset: 0,
            range: vk::WHOLE_SIZE,
        })
    }

    fn write_slot(
        &self,
        device: &dyn GfxDevice,
        category: DescriptorCategory,
        handle: DescriptorHandle,
        info: GfxDescriptorInfo,
    ) {
        device.write_descriptors(&[GfxDescriptorWrite {
            set: self.bindless_set,
            binding: category.binding(),
            array_element: handle.0,
            info,
        }]);
    }
}

// 参数 set
impl DescriptorManager {
    /// 为参数 buffer 分配独占的 descriptor set，池子写满时先扩容
    pub fn register_parameter(
        &mut self,
        device: &dyn GfxDevice,
        buffer: &GfxBuffer,
    ) -> DescriptorResult<vk::DescriptorSet> {
        if self.parameter_sets.contains_key(&buffer.id()) {
            return Err(DescriptorError::AlreadyRegistered(buffer.id()));
        }
        if self.parameter_sets.len() as u32 == self.parameter_pool_size {
            self.grow_parameter_pool(device)?;
        }

        let set = device.allocate_descriptor_set(self.parameter_pool, self.parameter_layout)?;
        device.write_descriptors(&[GfxDescriptorWrite {
            set,
            binding: 0,
            array_element: 0,
            info: GfxDescriptorInfo::Buffer {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                buffer: buffer.vk_buffer(),
                offset: 0,
                range: vk::WHOLE_SIZE,
            },
        }]);
        self.parameter_sets.insert(buffer.id(), set);
        Ok(set)
    }

    pub fn remove_parameter(&mut self, device: &dyn GfxDevice, id: ResourceId) -> DescriptorResult<()> {
        let set = self.parameter_sets.shift_remove(&id).ok_or(DescriptorError::UnknownParameter(id))?;
        device.free_descriptor_set(self.parameter_pool, set)?;
        Ok(())
    }

    #[inline]
    pub fn get_parameter_set(&self, id: ResourceId) -> DescriptorResult<vk::DescriptorSet> {
        self.parameter_sets.get(&id).copied().ok_or(DescriptorError::UnknownParameter(id))
    }

    #[inline]
    pub fn parameter_count(&self) -> usize {
        self.parameter_sets.len()
    }

    /// 容量翻倍：新池中为每个存活的参数分配 set，拷贝内容后替换，再销毁旧池
    fn grow_parameter_pool(&mut self, device: &dyn GfxDevice) -> DescriptorResult<()> {
        let _span = tracy_client::span!("DescriptorManager::grow_parameter_pool");

        let new_size = self.parameter_pool_size * 2;
        let new_pool = device.create_descriptor_pool(&Self::parameter_pool_desc(new_size))?;

        let mut new_sets = Vec::with_capacity(self.parameter_sets.len());
        for _ in 0..self.parameter_sets.len() {
            match device.allocate_descriptor_set(new_pool, self.parameter_layout) {
                Ok(set) => new_sets.push(set),
                Err(e) => {
                    device.destroy_descriptor_pool(new_pool);
                    return Err(e.into());
                }
            }
        }

        let copies = self
            .parameter_sets
            .values()
            .zip(new_sets.iter())
            .map(|(old_set, new_set)| GfxDescriptorCopy {
                src_set: *old_set,
                src_binding: 0,
                dst_set: *new_set,
                dst_binding: 0,
                count: 1,
            })
            .collect_vec();
        device.copy_descriptors(&copies);

        for (set, new_set) in self.parameter_sets.values_mut().zip(new_sets) {
            *set = new_set;
        }
        device.destroy_descriptor_pool(self.parameter_pool);

        log::info!("parameter descriptor pool grown: {} -> {new_size}", self.parameter_pool_size);
        self.parameter_pool = new_pool;
        self.parameter_pool_size = new_size;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pyrovis_gfx::{
        headless::{GfxCall, HeadlessDevice},
        resources::image::GfxImageCreateInfo,
        sampler::GfxSamplerDesc,
    };

    fn sampled_image(device: &dyn GfxDevice) -> GfxImage {
        let mut image = GfxImage::new(
            device,
            &GfxImageCreateInfo::new_image_2d_info(
                vk::Extent2D { width: 4, height: 4 },
                vk::Format::R32G32B32A32_SFLOAT,
                vk::ImageUsageFlags::SAMPLED,
                "sampled",
            ),
        )
        .unwrap();
        image.add_sampler(device, &GfxSamplerDesc::default()).unwrap();
        image
    }

    #[test]
    fn slots_take_lowest_free_and_recycle() {
        let mut slots = BindlessSlots::new(8);
        let ids = (0..3).map(|_| ResourceId::new()).collect_vec();
        for (expected, id) in ids.iter().enumerate() {
            let handle = slots.allocate(*id, DescriptorCategory::Storage).unwrap();
            assert_eq!(handle, DescriptorHandle(expected as u32));
        }

        slots.release(ids[1]).unwrap();
        let reused = slots.allocate(ResourceId::new(), DescriptorCategory::Storage).unwrap();
        assert_eq!(reused, DescriptorHandle(1));

        // 类别之间互不影响
        let uniform = slots.allocate(ResourceId::new(), DescriptorCategory::Uniform).unwrap();
        assert_eq!(uniform, DescriptorHandle(0));
    }

    #[test]
    fn slots_exhaust_at_capacity() {
        let mut slots = BindlessSlots::new(BINDLESS_CAPACITY);
        for _ in 0..BINDLESS_CAPACITY {
            slots.allocate(ResourceId::new(), DescriptorCategory::Uniform).unwrap();
        }
        assert_eq!(slots.free_count(DescriptorCategory::Uniform), 0);

        let result = slots.allocate(ResourceId::new(), DescriptorCategory::Uniform);
        assert!(matches!(result, Err(DescriptorError::CategoryExhausted(DescriptorCategory::Uniform))));
        assert_eq!(slots.free_count(DescriptorCategory::Storage), BINDLESS_CAPACITY as usize);
    }

    #[test]
    fn duplicate_and_unknown() {
        let mut slots = BindlessSlots::new(4);
        let id = ResourceId::new();
        slots.allocate(id, DescriptorCategory::Uniform).unwrap();
        assert!(matches!(
            slots.allocate(id, DescriptorCategory::Storage),
            Err(DescriptorError::AlreadyRegistered(_))
        ));
        assert!(matches!(slots.release(ResourceId::new()), Err(DescriptorError::UnknownResource(_))));
    }

    #[test]
    fn register_buffer_writes_bindless_slot() {
        let device = HeadlessDevice::new();
        let mut manager = DescriptorManager::new(&device).unwrap();
        let first = GfxBuffer::new_uniform_buffer(&device, 64, "camera").unwrap();
        let second = GfxBuffer::new_uniform_buffer(&device, 64, "lights").unwrap();

        manager.register_buffer(&device, &first, DescriptorCategory::Storage).unwrap();
        let handle = manager.register_buffer(&device, &second, DescriptorCategory::Storage).unwrap();
        assert_eq!(handle, DescriptorHandle(1));
        assert_eq!(manager.get_resource_handle(second.id()).unwrap(), handle);

        let written = device.descriptor(manager.bindless_set(), DescriptorCategory::Storage.binding(), 1);
        assert_eq!(
            written,
            Some(GfxDescriptorInfo::Buffer {
                ty: vk::DescriptorType::STORAGE_BUFFER,
                buffer: second.vk_buffer(),
                offset: 0,
                range: vk::WHOLE_SIZE,
            })
        );

        assert!(matches!(
            manager.register_buffer(&device, &first, DescriptorCategory::CombinedImageSampler),
            Err(DescriptorError::WrongCategory { kind: "buffer", .. })
        ));

        manager.remove_resource_registration(first.id()).unwrap();
        assert!(manager.get_resource_handle(first.id()).is_err());
        manager.destroy(&device);
    }

    #[test]
    fn register_buffer_reports_exhaustion_without_writing() {
        let device = HeadlessDevice::new();
        let mut manager = DescriptorManager::new(&device).unwrap();
        let binding = DescriptorCategory::Storage.binding();
        let buffers = (0..=BINDLESS_CAPACITY)
            .map(|i| GfxBuffer::new_uniform_buffer(&device, 16, format!("storage-{i}")).unwrap())
            .collect_vec();
        let (overflow, registered) = buffers.split_last().unwrap();

        for buffer in registered {
            manager.register_buffer(&device, buffer, DescriptorCategory::Storage).unwrap();
        }
        let last_slot = device.descriptor(manager.bindless_set(), binding, BINDLESS_CAPACITY - 1);

        assert!(matches!(
            manager.register_buffer(&device, overflow, DescriptorCategory::Storage),
            Err(DescriptorError::CategoryExhausted(DescriptorCategory::Storage))
        ));
        assert!(manager.get_resource_handle(overflow.id()).is_err());
        assert_eq!(device.descriptor(manager.bindless_set(), binding, BINDLESS_CAPACITY - 1), last_slot);
        assert_eq!(device.descriptor(manager.bindless_set(), binding, BINDLESS_CAPACITY), None);

        // 其他类别不受影响
        manager.register_buffer(&device, overflow, DescriptorCategory::Uniform).unwrap();
        manager.remove_resource_registration(overflow.id()).unwrap();

        // 释放一个槽位之后可以继续注册
        manager.remove_resource_registration(registered[5].id()).unwrap();
        let handle = manager.register_buffer(&device, overflow, DescriptorCategory::Storage).unwrap();
        assert_eq!(handle, DescriptorHandle(5));
        assert!(matches!(
            device.descriptor(manager.bindless_set(), binding, 5),
            Some(GfxDescriptorInfo::Buffer { buffer, .. }) if buffer == overflow.vk_buffer()
        ));

        manager.destroy(&device);
        buffers.into_iter().for_each(|buffer| buffer.destroy(&device));
        assert_eq!(device.live_buffer_count(), 0);
    }

    #[test]
    fn image_registration_rules() {
        let device = HeadlessDevice::new();
        let mut manager = DescriptorManager::new(&device).unwrap();

        let bare = GfxImage::new(
            &device,
            &GfxImageCreateInfo::new_image_2d_info(
                vk::Extent2D { width: 2, height: 2 },
                vk::Format::R32G32B32A32_SFLOAT,
                vk::ImageUsageFlags::SAMPLED,
                "bare",
            ),
        )
        .unwrap();
        assert!(matches!(
            manager.register_image(&device, &bare, DescriptorCategory::CombinedImageSampler),
            Err(DescriptorError::MissingSampler(_))
        ));

        let mut image = sampled_image(&device);
        assert!(matches!(
            manager.register_image(&device, &image, DescriptorCategory::Uniform),
            Err(DescriptorError::WrongCategory { kind: "image", .. })
        ));

        let handle = manager.register_image(&device, &image, DescriptorCategory::CombinedImageSampler).unwrap();
        image.recreate(&device, vk::Extent2D { width: 16, height: 16 }).unwrap();
        let updated = manager.update_image_registration(&device, &image).unwrap();
        assert_eq!(updated, handle);

        let written = device.descriptor(
            manager.bindless_set(),
            DescriptorCategory::CombinedImageSampler.binding(),
            handle.index(),
        );
        assert!(
            matches!(written, Some(GfxDescriptorInfo::CombinedImageSampler { view, .. }) if view == image.view())
        );
        manager.destroy(&device);
    }

    #[test]
    fn parameter_pool_doubles_once() {
        let device = HeadlessDevice::new();
        let mut manager = DescriptorManager::new(&device).unwrap();
        let first_pool = manager.parameter_pool;

        let buffers = (0..=PARAMETER_POOL_INITIAL_SIZE)
            .map(|i| GfxBuffer::new_uniform_buffer(&device, 16, format!("param-{i}")).unwrap())
            .collect_vec();

        let mut first_sets = vec![];
        for buffer in &buffers[..PARAMETER_POOL_INITIAL_SIZE as usize] {
            first_sets.push(manager.register_parameter(&device, buffer).unwrap());
        }
        device.clear_calls();
        manager.register_parameter(&device, buffers.last().unwrap()).unwrap();

        let grown_pools = device
            .calls()
            .into_iter()
            .filter(|call| matches!(call, GfxCall::CreateDescriptorPool { .. }))
            .collect_vec();
        assert_eq!(grown_pools.len(), 1);
        assert!(matches!(grown_pools[0], GfxCall::CreateDescriptorPool { max_sets: 256, .. }));
        assert_eq!(manager.parameter_pool_size(), 256);
        assert!(!device.is_live_pool(first_pool));

        // 旧的 set 被替换为新池中的 set，内容一致
        let relocated = manager.get_parameter_set(buffers[0].id()).unwrap();
        assert_ne!(relocated, first_sets[0]);
        assert!(matches!(
            device.descriptor(relocated, 0, 0),
            Some(GfxDescriptorInfo::Buffer { buffer, .. }) if buffer == buffers[0].vk_buffer()
        ));
        assert_eq!(manager.parameter_count(), PARAMETER_POOL_INITIAL_SIZE as usize + 1);

        assert!(matches!(
            manager.register_parameter(&device, &buffers[3]),
            Err(DescriptorError::AlreadyRegistered(_))
        ));
        manager.destroy(&device);
    }

    #[test]
    fn removed_parameter_frees_its_set() {
        let device = HeadlessDevice::new();
        let mut manager = DescriptorManager::new(&device).unwrap();
        let buffer = GfxBuffer::new_uniform_buffer(&device, 16, "param").unwrap();

        let set = manager.register_parameter(&device, &buffer).unwrap();
        manager.remove_parameter(&device, buffer.id()).unwrap();
        assert!(device.descriptor(set, 0, 0).is_none());
        assert!(matches!(
            manager.get_parameter_set(buffer.id()),
            Err(DescriptorError::UnknownParameter(_))
        ));
        assert!(manager.remove_parameter(&device, buffer.id()).is_err());
        manager.destroy(&device);
    }
}
