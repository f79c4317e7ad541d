use std::{
    collections::HashSet,
    ffi::{CStr, CString, c_char},
};

use ash::vk;
use itertools::Itertools;
use raw_window_handle::RawDisplayHandle;

use crate::{
    error::{GfxError, GfxResult, VkResultExt},
    vulkan::debug_messenger::GfxDebugMsger,
};

pub(crate) struct GfxInstance {
    /// 仅仅是函数指针，以及一个裸的 handle，可以随意 clone
    pub(crate) ash_instance: ash::Instance,
}

// new & init
impl GfxInstance {
    /// 设置所需的 layers 和 extensions，创建 vk instance
    ///
    /// surface 所需的 extension 由 display handle 决定
    pub fn new(
        vk_entry: &ash::Entry,
        app_name: &str,
        engine_name: &str,
        display_handle: RawDisplayHandle,
        enable_validation: bool,
    ) -> GfxResult<Self> {
        let app_name = CString::new(app_name).map_err(|e| GfxError::Unsupported(e.to_string()))?;
        let engine_name = CString::new(engine_name).map_err(|e| GfxError::Unsupported(e.to_string()))?;
        let app_info = vk::ApplicationInfo::default()
            .api_version(vk::API_VERSION_1_3) // 版本过低时，有些函数无法正确加载
            .application_name(app_name.as_ref())
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(engine_name.as_ref())
            .engine_version(vk::make_api_version(0, 1, 0, 0));

        let surface_exts = ash_window::enumerate_required_extensions(display_handle)
            .vk_op("enumerate_required_extensions")?
            .iter()
            .map(|ext| unsafe { CStr::from_ptr(*ext) })
            .collect_vec();

        let enabled_extensions = Self::get_extensions(vk_entry, &surface_exts)?;
        let enabled_extensions_str =
            enabled_extensions.iter().map(|ext| format!("\n\t{:?}", unsafe { CStr::from_ptr(*ext) })).join("");
        log::info!("instance extensions: {}", enabled_extensions_str);

        let enabled_layers = Self::get_layers(vk_entry, enable_validation)?;
        let enabled_layers_str =
            enabled_layers.iter().map(|layer| format!("\n\t{:?}", unsafe { CStr::from_ptr(*layer) })).join("");
        log::info!("instance layers: {}", enabled_layers_str);

        // 为 instance info 添加 debug messenger，覆盖 instance 创建和销毁过程
        let mut debug_utils_messenger_ci = GfxDebugMsger::debug_utils_messenger_ci();
        let instance_ci = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&enabled_extensions)
            .enabled_layer_names(&enabled_layers)
            .push_next(&mut debug_utils_messenger_ci);

        let ash_instance = unsafe { vk_entry.create_instance(&instance_ci, None) }.vk_op("create_instance")?;
        Ok(Self { ash_instance })
    }

    /// instance 所需的，且受支持的 extension
    fn get_extensions(vk_entry: &ash::Entry, surface_exts: &[&'static CStr]) -> GfxResult<Vec<*const c_char>> {
        let all_ext_props =
            unsafe { vk_entry.enumerate_instance_extension_properties(None) }.vk_op("enumerate_instance_extensions")?;
        let mut enabled_extensions: HashSet<&'static CStr> = HashSet::new();

        // 检查某个 instance ext 并启用
        let mut enable_ext = |ext: &'static CStr| -> GfxResult<()> {
            let supported = all_ext_props
                .iter()
                .any(|supported_ext| supported_ext.extension_name_as_c_str().is_ok_and(|name| name == ext));
            if !supported {
                return Err(GfxError::Unsupported(format!("required instance extension {ext:?} is missing")));
            }
            enabled_extensions.insert(ext);
            Ok(())
        };

        for ext in surface_exts {
            enable_ext(ext)?;
        }
        // 这个 extension 可以单独使用，提供以下功能：
        // 1. debug messenger
        // 2. 为 vulkan object 设置 debug name
        enable_ext(vk::EXT_DEBUG_UTILS_NAME)?;

        Ok(enabled_extensions.iter().map(|ext| ext.as_ptr()).collect_vec())
    }

    /// validation layer 不可用时只打印警告
    fn get_layers(vk_entry: &ash::Entry, enable_validation: bool) -> GfxResult<Vec<*const c_char>> {
        const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";
        if !enable_validation {
            return Ok(vec![]);
        }

        let all_layer_props =
            unsafe { vk_entry.enumerate_instance_layer_properties() }.vk_op("enumerate_instance_layers")?;
        let supported = all_layer_props
            .iter()
            .any(|layer| layer.layer_name_as_c_str().is_ok_and(|name| name == VALIDATION_LAYER));
        if supported {
            Ok(vec![VALIDATION_LAYER.as_ptr()])
        } else {
            log::warn!("validation layer {:?} is not available", VALIDATION_LAYER);
            Ok(vec![])
        }
    }
}

// destroy
impl GfxInstance {
    pub fn destroy(&self) {
        log::info!("Destroying GfxInstance");
        unsafe {
            self.ash_instance.destroy_instance(None);
        }
    }
}
