use ash::vk;
use indexmap::IndexMap;
use pyrovis_gfx::{
    device::GfxDevice,
    resources::image::{GfxImage, GfxImageCreateInfo},
    sampler::GfxSamplerDesc,
};
use pyrovis_render_interface::{
    descriptor_manager::{DescriptorCategory, DescriptorManager},
    gfx_resource_manager::{GfxImageHandle, GfxResourceManager},
    render_context::RenderContext,
};

use crate::{
    attachment::{AttachmentType, SWAPCHAIN_ATTACHMENT},
    error::AttachmentError,
};

/// graph 持有的一张物理 attachment
#[derive(Debug, Clone)]
pub struct RenderAttachment {
    pub name: String,
    pub ty: AttachmentType,
    pub usage: vk::ImageUsageFlags,
    pub format: vk::Format,
    pub handle: GfxImageHandle,
}

/// 按逻辑名字管理 attachment 的物理 image
///
/// image 存放在 [`GfxResourceManager`] 中，resize 时原地重建，
/// 因此名字、Handle、ResourceId 以及 bindless 槽位都保持不变。
#[derive(Default)]
pub struct RenderAttachments {
    attachments: IndexMap<String, RenderAttachment>,
}

// new & init
impl RenderAttachments {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以当前 swapchain 的尺寸创建 attachment，并转换到 GENERAL
    ///
    /// 类型包含 Sampler 时附带默认 sampler，并注册为 combined image sampler
    pub fn add_attachment(
        &mut self,
        ctx: &mut RenderContext,
        name: &str,
        ty: AttachmentType,
        usage: vk::ImageUsageFlags,
        format: vk::Format,
    ) -> Result<GfxImageHandle, AttachmentError> {
        if name == SWAPCHAIN_ATTACHMENT {
            return Err(AttachmentError::Reserved);
        }
        if self.attachments.contains_key(name) {
            return Err(AttachmentError::Duplicate(name.to_string()));
        }
        Self::aspect_flags(name, ty)?;

        let device = &*ctx.device;
        let extent = ctx.swapchain.extent();
        let mut image = GfxImage::new(device, &GfxImageCreateInfo::new_image_2d_info(extent, format, usage, name))?;
        if let Err(e) = Self::prepare_image(device, &mut ctx.descriptors, &mut image, ty) {
            image.destroy(device);
            return Err(e);
        }

        let handle = ctx.resources.register_image(image);
        self.attachments.insert(
            name.to_string(),
            RenderAttachment {
                name: name.to_string(),
                ty,
                usage,
                format,
                handle,
            },
        );
        log::info!("create attachment `{name}` {}x{} {format:?} {ty:?}", extent.width, extent.height);
        Ok(handle)
    }

    fn prepare_image(
        device: &dyn GfxDevice,
        descriptors: &mut DescriptorManager,
        image: &mut GfxImage,
        ty: AttachmentType,
    ) -> Result<(), AttachmentError> {
        image.transition_layout_now(device, vk::ImageLayout::GENERAL)?;
        if ty.contains(AttachmentType::SAMPLER) {
            image.add_sampler(device, &GfxSamplerDesc::default())?;
            descriptors.register_image(device, image, DescriptorCategory::CombinedImageSampler)?;
        }
        Ok(())
    }
}

// getters
impl RenderAttachments {
    pub fn get_attachment(&self, name: &str) -> Result<GfxImageHandle, AttachmentError> {
        if name == SWAPCHAIN_ATTACHMENT {
            return Err(AttachmentError::Reserved);
        }
        self.attachments
            .get(name)
            .map(|attachment| attachment.handle)
            .ok_or_else(|| AttachmentError::NotFound(name.to_string()))
    }

    /// 按名字取得物理 image
    pub fn image<'r>(&self, resources: &'r GfxResourceManager, name: &str) -> Result<&'r GfxImage, AttachmentError> {
        let handle = self.get_attachment(name)?;
        resources.get_image(handle).ok_or_else(|| AttachmentError::NotFound(name.to_string()))
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &RenderAttachment> {
        self.attachments.values()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.attachments.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.attachments.is_empty()
    }

    /// 由类型决定 image aspect，只有 Sampler 的类型是非法的
    pub fn aspect_flags(name: &str, ty: AttachmentType) -> Result<vk::ImageAspectFlags, AttachmentError> {
        if ty.contains(AttachmentType::DEPTH) {
            Ok(vk::ImageAspectFlags::DEPTH)
        } else if ty.contains(AttachmentType::COLOR) {
            Ok(vk::ImageAspectFlags::COLOR)
        } else {
            Err(AttachmentError::InvalidType {
                name: name.to_string(),
                ty,
            })
        }
    }
}

// resize
impl RenderAttachments {
    /// 以 swapchain 的新尺寸原地重建每一张 attachment
    ///
    /// 已注册的 bindless 槽位被原地重写，handle 不变
    pub fn on_resize(&mut self, ctx: &mut RenderContext) -> Result<(), AttachmentError> {
        let _span = tracy_client::span!("RenderAttachments::on_resize");

        let device = &*ctx.device;
        let extent = ctx.swapchain.extent();
        for attachment in self.attachments.values() {
            let image = ctx
                .resources
                .get_image_mut(attachment.handle)
                .ok_or_else(|| AttachmentError::NotFound(attachment.name.clone()))?;

            image.recreate(device, extent)?;
            image.transition_layout_now(device, vk::ImageLayout::GENERAL)?;
            if attachment.ty.contains(AttachmentType::SAMPLER) {
                ctx.descriptors.update_image_registration(device, image)?;
            }
            log::debug!("resize attachment `{}` to {}x{}", attachment.name, extent.width, extent.height);
        }
        Ok(())
    }
}

// destroy
impl RenderAttachments {
    pub fn remove_attachment(&mut self, ctx: &mut RenderContext, name: &str) -> Result<(), AttachmentError> {
        if name == SWAPCHAIN_ATTACHMENT {
            return Err(AttachmentError::Reserved);
        }
        let attachment =
            self.attachments.shift_remove(name).ok_or_else(|| AttachmentError::NotFound(name.to_string()))?;
        Self::release(ctx, &attachment)
    }

    pub fn cleanup(&mut self, ctx: &mut RenderContext) {
        for (_, attachment) in self.attachments.drain(..) {
            if let Err(e) = Self::release(ctx, &attachment) {
                log::error!("failed to release attachment `{}`: {e}", attachment.name);
            }
        }
    }

    fn release(ctx: &mut RenderContext, attachment: &RenderAttachment) -> Result<(), AttachmentError> {
        if attachment.ty.contains(AttachmentType::SAMPLER) {
            if let Some(image) = ctx.resources.get_image(attachment.handle) {
                ctx.descriptors.remove_resource_registration(image.id())?;
            }
        }
        ctx.resources.destroy_image(&*ctx.device, attachment.handle);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pyrovis_gfx::{descriptors::GfxDescriptorInfo, headless::HeadlessDevice};

    const SAMPLED_COLOR: AttachmentType = AttachmentType::COLOR.union(AttachmentType::SAMPLER);

    fn context(device: &HeadlessDevice) -> RenderContext {
        RenderContext::new(Box::new(device.clone()), true).unwrap()
    }

    #[test]
    fn reserved_and_sampler_only_are_rejected() {
        let device = HeadlessDevice::new();
        let mut ctx = context(&device);
        let mut attachments = RenderAttachments::new();

        let err = attachments
            .add_attachment(
                &mut ctx,
                SWAPCHAIN_ATTACHMENT,
                AttachmentType::COLOR,
                vk::ImageUsageFlags::COLOR_ATTACHMENT,
                vk::Format::B8G8R8A8_UNORM,
            )
            .unwrap_err();
        assert!(matches!(err, AttachmentError::Reserved));

        let err = attachments
            .add_attachment(
                &mut ctx,
                "lonely",
                AttachmentType::SAMPLER,
                vk::ImageUsageFlags::SAMPLED,
                vk::Format::R32G32B32A32_SFLOAT,
            )
            .unwrap_err();
        assert!(matches!(err, AttachmentError::InvalidType { .. }));
        assert!(matches!(attachments.get_attachment("lonely"), Err(AttachmentError::NotFound(_))));
        assert!(matches!(attachments.get_attachment(SWAPCHAIN_ATTACHMENT), Err(AttachmentError::Reserved)));
        assert_eq!(device.live_image_count(), 0);

        ctx.destroy();
    }

    #[test]
    fn resize_round_trip_keeps_identity_and_slot() {
        let device = HeadlessDevice::new();
        let mut ctx = context(&device);
        let mut attachments = RenderAttachments::new();

        let handle = attachments
            .add_attachment(
                &mut ctx,
                "object_color",
                SAMPLED_COLOR,
                vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
                vk::Format::R32G32B32A32_SFLOAT,
            )
            .unwrap();
        let (id, old_view) = {
            let image = ctx.resources.get_image(handle).unwrap();
            assert_eq!(image.extent(), vk::Extent2D { width: 800, height: 600 });
            assert_eq!(image.layout(), vk::ImageLayout::GENERAL);
            (image.id(), image.view())
        };
        let slot = ctx.descriptors.get_resource_handle(id).unwrap();

        device.set_window_extent(vk::Extent2D { width: 1920, height: 1080 });
        ctx.swapchain.recreate(&*ctx.device).unwrap();
        attachments.on_resize(&mut ctx).unwrap();

        assert_eq!(attachments.get_attachment("object_color").unwrap(), handle);
        let image = ctx.resources.get_image(handle).unwrap();
        assert_eq!(image.id(), id);
        assert_eq!(image.extent(), vk::Extent2D { width: 1920, height: 1080 });
        assert_eq!(image.layout(), vk::ImageLayout::GENERAL);
        assert!(image.sampler().is_some());
        assert_eq!(ctx.descriptors.get_resource_handle(id).unwrap(), slot);

        // 槽位指向重建后的 view
        let binding = DescriptorCategory::CombinedImageSampler.binding();
        let written = device.descriptor(ctx.descriptors.bindless_set(), binding, slot.index()).unwrap();
        assert!(matches!(written, GfxDescriptorInfo::CombinedImageSampler { view, .. } if view == image.view()));
        assert_ne!(image.view(), old_view);
        assert_eq!(device.live_image_count(), 1);

        attachments.cleanup(&mut ctx);
        assert!(ctx.descriptors.get_resource_handle(id).is_err());
        assert_eq!(device.live_image_count(), 0);
        ctx.destroy();
    }

    #[test]
    fn remove_attachment_releases_slot() {
        let device = HeadlessDevice::new();
        let mut ctx = context(&device);
        let mut attachments = RenderAttachments::new();

        let handle = attachments
            .add_attachment(
                &mut ctx,
                "depth",
                AttachmentType::DEPTH | AttachmentType::SAMPLER,
                vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
                vk::Format::D32_SFLOAT,
            )
            .unwrap();
        let id = ctx.resources.get_image(handle).unwrap().id();
        assert_eq!(ctx.resources.get_image(handle).unwrap().aspect(), vk::ImageAspectFlags::DEPTH);

        attachments.remove_attachment(&mut ctx, "depth").unwrap();
        assert!(attachments.is_empty());
        assert!(ctx.descriptors.get_resource_handle(id).is_err());
        assert!(matches!(attachments.remove_attachment(&mut ctx, "depth"), Err(AttachmentError::NotFound(_))));

        ctx.destroy();
    }
}
