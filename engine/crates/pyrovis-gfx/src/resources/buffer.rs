use ash::vk;

use crate::{
    commands::command_buffer::{GfxCommandBuffer, GfxCommandEncoder},
    device::GfxDevice,
    error::{GfxError, GfxResult},
    interop::ExternalHandle,
    resources::{format::VulkanFormatUtils, image::GfxImage, resource_id::ResourceId},
};

/// 创建 buffer 所需的参数
#[derive(Debug, Clone)]
pub struct GfxBufferCreateInfo {
    pub size: vk::DeviceSize,
    pub usage: vk::BufferUsageFlags,
    /// host visible 并在创建时持久映射
    pub mapped: bool,
    /// 使用可导出的 memory，供其他 API 导入
    pub external: bool,
    pub name: String,
}

impl GfxBufferCreateInfo {
    #[inline]
    pub fn new(size: vk::DeviceSize, usage: vk::BufferUsageFlags, name: impl AsRef<str>) -> Self {
        Self {
            size,
            usage,
            mapped: false,
            external: false,
            name: name.as_ref().to_string(),
        }
    }

    // builder
    #[inline]
    pub fn mapped(mut self, mapped: bool) -> Self {
        self.mapped = mapped;
        self
    }

    // builder
    #[inline]
    pub fn external(mut self, external: bool) -> Self {
        self.external = external;
        self
    }
}

pub struct GfxBuffer {
    id: ResourceId,
    handle: vk::Buffer,

    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,

    /// 在初始化阶段写死
    mapped: bool,
    external: bool,

    debug_name: String,
}

// new & init
impl GfxBuffer {
    pub fn new(device: &dyn GfxDevice, info: &GfxBufferCreateInfo) -> GfxResult<Self> {
        let handle = device.create_buffer(info)?;
        Ok(Self {
            id: ResourceId::new(),
            handle,
            size: info.size,
            usage: info.usage,
            mapped: info.mapped,
            external: info.external,
            debug_name: info.name.clone(),
        })
    }

    #[inline]
    pub fn new_stage_buffer(device: &dyn GfxDevice, size: vk::DeviceSize, name: impl AsRef<str>) -> GfxResult<Self> {
        Self::new(device, &GfxBufferCreateInfo::new(size, vk::BufferUsageFlags::TRANSFER_SRC, name).mapped(true))
    }

    /// host visible 的 uniform buffer，通常用作参数 buffer
    #[inline]
    pub fn new_uniform_buffer(device: &dyn GfxDevice, size: vk::DeviceSize, name: impl AsRef<str>) -> GfxResult<Self> {
        Self::new(device, &GfxBufferCreateInfo::new(size, vk::BufferUsageFlags::UNIFORM_BUFFER, name).mapped(true))
    }

    /// 用于从 GPU 读回数据的 buffer
    #[inline]
    pub fn new_readback_buffer(
        device: &dyn GfxDevice,
        size: vk::DeviceSize,
        name: impl AsRef<str>,
    ) -> GfxResult<Self> {
        Self::new(device, &GfxBufferCreateInfo::new(size, vk::BufferUsageFlags::TRANSFER_DST, name).mapped(true))
    }
}

// destroy
impl GfxBuffer {
    #[inline]
    pub fn destroy(self, device: &dyn GfxDevice) {
        device.destroy_buffer(self.handle);
    }
}

// getters
impl GfxBuffer {
    #[inline]
    pub fn id(&self) -> ResourceId {
        self.id
    }

    #[inline]
    pub fn vk_buffer(&self) -> vk::Buffer {
        self.handle
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    #[inline]
    pub fn usage(&self) -> vk::BufferUsageFlags {
        self.usage
    }

    #[inline]
    pub fn is_mapped(&self) -> bool {
        self.mapped
    }

    #[inline]
    pub fn is_external(&self) -> bool {
        self.external
    }

    #[inline]
    pub fn debug_name(&self) -> &str {
        &self.debug_name
    }
}

// tools
impl GfxBuffer {
    fn check_range(&self, op: &str, offset: vk::DeviceSize, size: vk::DeviceSize) -> GfxResult<()> {
        match offset.checked_add(size) {
            Some(end) if end <= self.size => Ok(()),
            _ => Err(GfxError::OutOfRange(format!(
                "{op} on buffer `{}`: offset {offset} + size {size} > buffer size {}",
                self.debug_name, self.size
            ))),
        }
    }

    /// 写入数据，写入前检查 `data.len() + offset <= size`
    ///
    /// - 持久映射的 buffer 直接 memcpy
    /// - 否则通过 stage buffer 拷贝，会阻塞等待拷贝完成
    pub fn update(&self, device: &dyn GfxDevice, data: &[u8], offset: vk::DeviceSize) -> GfxResult<()> {
        self.check_range("update", offset, data.len() as vk::DeviceSize)?;
        if data.is_empty() {
            return Ok(());
        }

        if self.mapped {
            return device.write_buffer(self.handle, offset, data);
        }

        let stage_buffer =
            Self::new_stage_buffer(device, data.len() as vk::DeviceSize, format!("{}-stage", self.debug_name))?;
        let result = stage_buffer.update(device, data, 0).and_then(|_| {
            GfxCommandBuffer::one_time_exec(device, &self.debug_name, |encoder| {
                stage_buffer.copy_to_buffer(encoder, self, 0, offset, data.len() as vk::DeviceSize)
            })
        });
        stage_buffer.destroy(device);
        result
    }

    #[inline]
    pub fn update_pod<T: bytemuck::Pod>(&self, device: &dyn GfxDevice, data: &T) -> GfxResult<()> {
        self.update(device, bytemuck::bytes_of(data), 0)
    }

    /// 读取持久映射的 buffer
    pub fn read(&self, device: &dyn GfxDevice, out: &mut [u8], offset: vk::DeviceSize) -> GfxResult<()> {
        self.check_range("read", offset, out.len() as vk::DeviceSize)?;
        if !self.mapped {
            return Err(GfxError::Unsupported(format!("buffer `{}` is not host visible", self.debug_name)));
        }
        device.read_buffer(self.handle, offset, out)
    }

    /// 记录 buffer 到 buffer 的拷贝，两端都做越界检查
    pub fn copy_to_buffer(
        &self,
        encoder: &GfxCommandEncoder,
        dst: &GfxBuffer,
        src_offset: vk::DeviceSize,
        dst_offset: vk::DeviceSize,
        size: vk::DeviceSize,
    ) -> GfxResult<()> {
        self.check_range("copy source", src_offset, size)?;
        dst.check_range("copy destination", dst_offset, size)?;

        encoder.copy_buffer(
            self.handle,
            dst.handle,
            &[vk::BufferCopy {
                src_offset,
                dst_offset,
                size,
            }],
        );
        Ok(())
    }

    /// 记录 buffer 到 image 的拷贝，image 需要处于 TRANSFER_DST 或 GENERAL
    pub fn copy_to_image(&self, encoder: &GfxCommandEncoder, image: &GfxImage) -> GfxResult<()> {
        let element_size = VulkanFormatUtils::pixel_size_in_bytes(image.format())? as vk::DeviceSize;
        let extent = image.extent();
        let needed = extent.width as vk::DeviceSize * extent.height as vk::DeviceSize;
        self.check_range("copy to image", 0, needed * element_size)?;

        encoder.copy_buffer_to_image(self.handle, image.vk_image(), image.layout(), &[image.full_copy_region()]);
        Ok(())
    }

    /// 导出 memory 句柄，只对 external buffer 有效
    pub fn export(&self, device: &dyn GfxDevice) -> GfxResult<ExternalHandle> {
        if !self.external {
            return Err(GfxError::Unsupported(format!("buffer `{}` is not exportable", self.debug_name)));
        }
        device.export_buffer_memory(self.handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::{GfxCall, HeadlessDevice};

    #[test]
    fn update_rejects_overflow_before_writing() {
        let device = HeadlessDevice::new();
        let buffer = GfxBuffer::new(
            &device,
            &GfxBufferCreateInfo::new(120, vk::BufferUsageFlags::UNIFORM_BUFFER, "params").mapped(true),
        )
        .unwrap();

        let data = [0xABu8; 100];
        let result = buffer.update(&device, &data, 50);
        assert!(matches!(result, Err(GfxError::OutOfRange(_))));

        // buffer 保持全零
        let mut out = [0xFFu8; 120];
        buffer.read(&device, &mut out, 0).unwrap();
        assert!(out.iter().all(|b| *b == 0));
    }

    #[test]
    fn update_mapped_buffer() {
        let device = HeadlessDevice::new();
        let buffer = GfxBuffer::new_uniform_buffer(&device, 16, "u").unwrap();
        buffer.update(&device, &[1, 2, 3, 4], 4).unwrap();

        let mut out = [0u8; 8];
        buffer.read(&device, &mut out, 0).unwrap();
        assert_eq!(out, [0, 0, 0, 0, 1, 2, 3, 4]);
    }

    #[test]
    fn update_device_local_uses_stage_copy() {
        let device = HeadlessDevice::new();
        let buffer =
            GfxBuffer::new(&device, &GfxBufferCreateInfo::new(8, vk::BufferUsageFlags::TRANSFER_DST, "dst")).unwrap();
        buffer.update(&device, &[9, 9], 6).unwrap();

        let copies = device
            .calls()
            .into_iter()
            .filter(|call| matches!(call, GfxCall::CopyBuffer { dst, .. } if *dst == buffer.vk_buffer()))
            .count();
        assert_eq!(copies, 1);
        assert_eq!(&device.buffer_bytes(buffer.vk_buffer()).unwrap()[6..8], &[9, 9]);
    }

    #[test]
    fn copy_checks_both_ends() {
        let device = HeadlessDevice::new();
        let src = GfxBuffer::new_stage_buffer(&device, 64, "src").unwrap();
        let dst = GfxBuffer::new_readback_buffer(&device, 32, "dst").unwrap();

        let cmd = GfxCommandBuffer::new(&device, "copy").unwrap();
        let encoder = cmd.begin(&device, true).unwrap();
        assert!(src.copy_to_buffer(&encoder, &dst, 0, 0, 48).is_err());
        assert!(src.copy_to_buffer(&encoder, &dst, 40, 0, 32).is_err());
        assert!(src.copy_to_buffer(&encoder, &dst, 32, 0, 32).is_ok());
        encoder.end().unwrap();
    }
}
