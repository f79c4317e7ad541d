use std::ptr;

use ash::vk;
use vk_mem::Alloc;

use crate::{
    error::{GfxError, GfxResult, VkResultExt},
    interop::EXTERNAL_MEMORY_HANDLE_TYPE,
    resources::{buffer::GfxBufferCreateInfo, image::GfxImageCreateInfo},
};

/// buffer 或 image 背后的 memory
///
/// 普通资源由 vma 分配；external 资源需要可导出的 dedicated memory，直接通过 vkAllocateMemory 分配
pub(crate) enum GfxMemory {
    Vma(vk_mem::Allocation),
    Dedicated(vk::DeviceMemory),
}

pub(crate) struct GfxBufferAllocation {
    pub(crate) memory: GfxMemory,
    pub(crate) mapped_ptr: Option<*mut u8>,
}

pub(crate) struct GfxImageAllocation {
    pub(crate) memory: GfxMemory,
}

impl GfxMemory {
    /// 只有 dedicated memory 可以导出
    #[inline]
    pub fn exportable_memory(&self) -> Option<vk::DeviceMemory> {
        match self {
            Self::Vma(_) => None,
            Self::Dedicated(memory) => Some(*memory),
        }
    }
}

pub(crate) struct GfxAllocator {
    vma: vk_mem::Allocator,
    device: ash::Device,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
}

// new & init
impl GfxAllocator {
    pub fn new(
        instance: &ash::Instance,
        device: &ash::Device,
        pdevice: vk::PhysicalDevice,
        memory_properties: vk::PhysicalDeviceMemoryProperties,
    ) -> GfxResult<Self> {
        let _span = tracy_client::span!("GfxAllocator::new");
        let mut vma_ci = vk_mem::AllocatorCreateInfo::new(instance, device, pdevice);
        vma_ci.vulkan_api_version = vk::API_VERSION_1_3;
        let vma = unsafe { vk_mem::Allocator::new(vma_ci) }.vk_op("vmaCreateAllocator")?;
        Ok(Self {
            vma,
            device: device.clone(),
            memory_properties,
        })
    }
}

// buffer
impl GfxAllocator {
    pub fn create_buffer(&self, info: &GfxBufferCreateInfo) -> GfxResult<(vk::Buffer, GfxBufferAllocation)> {
        if info.external {
            return self.create_external_buffer(info);
        }

        let buffer_ci = vk::BufferCreateInfo::default().size(info.size).usage(info.usage);
        let alloc_ci = vk_mem::AllocationCreateInfo {
            usage: vk_mem::MemoryUsage::AutoPreferDevice,
            flags: if info.mapped {
                vk_mem::AllocationCreateFlags::HOST_ACCESS_RANDOM
            } else {
                vk_mem::AllocationCreateFlags::empty()
            },
            ..Default::default()
        };
        let (buffer, mut allocation) =
            unsafe { self.vma.create_buffer(&buffer_ci, &alloc_ci) }.vk_op("vmaCreateBuffer")?;

        let mapped_ptr = if info.mapped {
            match unsafe { self.vma.map_memory(&mut allocation) } {
                Ok(ptr) => Some(ptr),
                Err(result) => {
                    unsafe { self.vma.destroy_buffer(buffer, &mut allocation) };
                    return Err(GfxError::Vk {
                        op: "vmaMapMemory",
                        result,
                    });
                }
            }
        } else {
            None
        };

        Ok((
            buffer,
            GfxBufferAllocation {
                memory: GfxMemory::Vma(allocation),
                mapped_ptr,
            },
        ))
    }

    fn create_external_buffer(&self, info: &GfxBufferCreateInfo) -> GfxResult<(vk::Buffer, GfxBufferAllocation)> {
        let mut external_ci = vk::ExternalMemoryBufferCreateInfo::default().handle_types(EXTERNAL_MEMORY_HANDLE_TYPE);
        let buffer_ci = vk::BufferCreateInfo::default()
            .size(info.size)
            .usage(info.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .push_next(&mut external_ci);
        let buffer = unsafe { self.device.create_buffer(&buffer_ci, None) }.vk_op("create_buffer")?;

        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };
        let memory_flags = if info.mapped {
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT
        } else {
            vk::MemoryPropertyFlags::DEVICE_LOCAL
        };
        let memory = match self.allocate_dedicated(requirements, memory_flags, |dedicated| dedicated.buffer(buffer)) {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { self.device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        let bind_and_map = || -> GfxResult<Option<*mut u8>> {
            unsafe { self.device.bind_buffer_memory(buffer, memory, 0) }.vk_op("bind_buffer_memory")?;
            if !info.mapped {
                return Ok(None);
            }
            let ptr = unsafe { self.device.map_memory(memory, 0, vk::WHOLE_SIZE, vk::MemoryMapFlags::empty()) }
                .vk_op("map_memory")?;
            Ok(Some(ptr as *mut u8))
        };
        match bind_and_map() {
            Ok(mapped_ptr) => Ok((
                buffer,
                GfxBufferAllocation {
                    memory: GfxMemory::Dedicated(memory),
                    mapped_ptr,
                },
            )),
            Err(e) => {
                unsafe {
                    self.device.destroy_buffer(buffer, None);
                    self.device.free_memory(memory, None);
                }
                Err(e)
            }
        }
    }

    pub fn destroy_buffer(&self, buffer: vk::Buffer, allocation: GfxBufferAllocation) {
        let GfxBufferAllocation { memory, mapped_ptr } = allocation;
        unsafe {
            match memory {
                GfxMemory::Vma(mut allocation) => {
                    if mapped_ptr.is_some() {
                        self.vma.unmap_memory(&mut allocation);
                    }
                    self.vma.destroy_buffer(buffer, &mut allocation);
                }
                GfxMemory::Dedicated(memory) => {
                    if mapped_ptr.is_some() {
                        self.device.unmap_memory(memory);
                    }
                    self.device.destroy_buffer(buffer, None);
                    self.device.free_memory(memory, None);
                }
            }
        }
    }

    /// 写入持久映射的 buffer，vma 分配的 memory 写入后需要 flush
    pub fn write(&self, allocation: &GfxBufferAllocation, offset: vk::DeviceSize, data: &[u8]) -> GfxResult<()> {
        let ptr = allocation
            .mapped_ptr
            .ok_or_else(|| GfxError::Unsupported("buffer memory is not mapped".to_string()))?;
        unsafe {
            ptr::copy_nonoverlapping(data.as_ptr(), ptr.add(offset as usize), data.len());
        }
        if let GfxMemory::Vma(vma_allocation) = &allocation.memory {
            self.vma
                .flush_allocation(vma_allocation, offset, data.len() as vk::DeviceSize)
                .vk_op("vmaFlushAllocation")?;
        }
        Ok(())
    }

    pub fn read(&self, allocation: &GfxBufferAllocation, offset: vk::DeviceSize, out: &mut [u8]) -> GfxResult<()> {
        let ptr = allocation
            .mapped_ptr
            .ok_or_else(|| GfxError::Unsupported("buffer memory is not mapped".to_string()))?;
        if let GfxMemory::Vma(vma_allocation) = &allocation.memory {
            self.vma
                .invalidate_allocation(vma_allocation, offset, out.len() as vk::DeviceSize)
                .vk_op("vmaInvalidateAllocation")?;
        }
        unsafe {
            ptr::copy_nonoverlapping(ptr.add(offset as usize), out.as_mut_ptr(), out.len());
        }
        Ok(())
    }
}

// image
impl GfxAllocator {
    pub fn create_image(&self, info: &GfxImageCreateInfo) -> GfxResult<(vk::Image, GfxImageAllocation)> {
        let mut external_ci = vk::ExternalMemoryImageCreateInfo::default().handle_types(EXTERNAL_MEMORY_HANDLE_TYPE);
        let mut image_ci = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(info.format)
            .extent(vk::Extent3D {
                width: info.extent.width,
                height: info.extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(info.tiling)
            .usage(info.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        if !info.external {
            let alloc_ci = vk_mem::AllocationCreateInfo {
                usage: vk_mem::MemoryUsage::AutoPreferDevice,
                ..Default::default()
            };
            let (image, allocation) = unsafe { self.vma.create_image(&image_ci, &alloc_ci) }.vk_op("vmaCreateImage")?;
            return Ok((
                image,
                GfxImageAllocation {
                    memory: GfxMemory::Vma(allocation),
                },
            ));
        }

        image_ci = image_ci.push_next(&mut external_ci);
        let image = unsafe { self.device.create_image(&image_ci, None) }.vk_op("create_image")?;
        let requirements = unsafe { self.device.get_image_memory_requirements(image) };
        let bound = self
            .allocate_dedicated(requirements, vk::MemoryPropertyFlags::DEVICE_LOCAL, |dedicated| dedicated.image(image))
            .and_then(|memory| match unsafe { self.device.bind_image_memory(image, memory, 0) } {
                Ok(()) => Ok(memory),
                Err(result) => {
                    unsafe { self.device.free_memory(memory, None) };
                    Err(GfxError::Vk {
                        op: "bind_image_memory",
                        result,
                    })
                }
            });
        match bound {
            Ok(memory) => Ok((
                image,
                GfxImageAllocation {
                    memory: GfxMemory::Dedicated(memory),
                },
            )),
            Err(e) => {
                unsafe { self.device.destroy_image(image, None) };
                Err(e)
            }
        }
    }

    pub fn destroy_image(&self, image: vk::Image, allocation: GfxImageAllocation) {
        unsafe {
            match allocation.memory {
                GfxMemory::Vma(mut allocation) => self.vma.destroy_image(image, &mut allocation),
                GfxMemory::Dedicated(memory) => {
                    self.device.destroy_image(image, None);
                    self.device.free_memory(memory, None);
                }
            }
        }
    }
}

// tools
impl GfxAllocator {
    fn find_memory_type(&self, type_bits: u32, flags: vk::MemoryPropertyFlags) -> GfxResult<u32> {
        self.memory_properties.memory_types[..self.memory_properties.memory_type_count as usize]
            .iter()
            .enumerate()
            .find(|(idx, memory_type)| (type_bits & (1 << idx)) != 0 && memory_type.property_flags.contains(flags))
            .map(|(idx, _)| idx as u32)
            .ok_or_else(|| GfxError::Unsupported(format!("no memory type for bits {type_bits:#b} with {flags:?}")))
    }

    /// 分配可导出的 dedicated memory
    fn allocate_dedicated(
        &self,
        requirements: vk::MemoryRequirements,
        flags: vk::MemoryPropertyFlags,
        dedicated: impl FnOnce(vk::MemoryDedicatedAllocateInfo<'static>) -> vk::MemoryDedicatedAllocateInfo<'static>,
    ) -> GfxResult<vk::DeviceMemory> {
        let memory_type_index = self.find_memory_type(requirements.memory_type_bits, flags)?;
        let mut export_info = vk::ExportMemoryAllocateInfo::default().handle_types(EXTERNAL_MEMORY_HANDLE_TYPE);
        let mut dedicated_info = dedicated(vk::MemoryDedicatedAllocateInfo::default());
        let allocate_info = vk::MemoryAllocateInfo::default()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index)
            .push_next(&mut export_info)
            .push_next(&mut dedicated_info);
        unsafe { self.device.allocate_memory(&allocate_info, None) }.vk_op("allocate_memory")
    }
}

// destroy
impl GfxAllocator {
    /// vma 必须在 device 之前销毁
    pub fn destroy(self) {
        log::info!("Destroying GfxAllocator");
        drop(self.vma);
    }
}
