// SPDX-License-Identifier: CEPL-1.0
//! Instance, window surface and the optional validation messenger.

use crate::error::VkCall;
use anyhow::{anyhow, Context, Result};
use ash::ext::debug_utils;
use ash::khr::surface;
use ash::{vk, Entry, Instance};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::ffi::{CStr, CString};
use tracing::{debug, error, info, warn};

pub const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

pub struct VkInstance {
    pub entry: Entry,
    pub instance: Instance,
    pub surface_loader: surface::Instance,
    pub surface: vk::SurfaceKHR,
    debug: Option<(debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
}

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    if data.is_null() || (*data).p_message.is_null() {
        return vk::FALSE;
    }
    let msg = CStr::from_ptr((*data).p_message).to_string_lossy();
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        error!("[vulkan] {msg}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        warn!("[vulkan] {msg}");
    } else {
        debug!("[vulkan] {msg}");
    }
    vk::FALSE
}

/// Layers to enable, given what the loader reports. A missing validation layer is not fatal.
pub fn validation_layers(requested: bool, available: &[CString]) -> Vec<&'static CStr> {
    if !requested {
        return Vec::new();
    }
    if available.iter().any(|l| l.as_c_str() == VALIDATION_LAYER) {
        vec![VALIDATION_LAYER]
    } else {
        warn!(
            "{} requested but not installed; continuing without validation",
            VALIDATION_LAYER.to_string_lossy()
        );
        Vec::new()
    }
}

unsafe fn available_layers(entry: &Entry) -> Result<Vec<CString>> {
    let props = entry
        .enumerate_instance_layer_properties()
        .vk("vkEnumerateInstanceLayerProperties")?;
    Ok(props
        .iter()
        .filter_map(|p| p.layer_name_as_c_str().ok().map(CStr::to_owned))
        .collect())
}

impl VkInstance {
    /// Creates the instance, then the surface from that same instance.
    pub unsafe fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        app_name: &str,
        validation: bool,
    ) -> Result<Self> {
        let dh = display
            .display_handle()
            .map_err(|e| anyhow!("{e}"))?
            .as_raw();
        let wh = window
            .window_handle()
            .map_err(|e| anyhow!("{e}"))?
            .as_raw();

        let entry = Entry::linked();
        let app = CString::new(app_name).context("application name contains NUL")?;
        let app_info = vk::ApplicationInfo {
            s_type: vk::StructureType::APPLICATION_INFO,
            p_application_name: app.as_ptr(),
            application_version: 0,
            p_engine_name: app.as_ptr(),
            engine_version: 0,
            api_version: vk::API_VERSION_1_0,
            ..Default::default()
        };

        let layers = validation_layers(validation, &available_layers(&entry)?);
        let layer_ptrs: Vec<_> = layers.iter().map(|l| l.as_ptr()).collect();

        let mut extensions = ash_window::enumerate_required_extensions(dh)
            .context("enumerate_required_extensions")?
            .to_vec();
        if !layers.is_empty() {
            extensions.push(debug_utils::NAME.as_ptr());
        }

        let create_info = vk::InstanceCreateInfo {
            s_type: vk::StructureType::INSTANCE_CREATE_INFO,
            p_application_info: &app_info,
            enabled_extension_count: extensions.len() as u32,
            pp_enabled_extension_names: extensions.as_ptr(),
            enabled_layer_count: layer_ptrs.len() as u32,
            pp_enabled_layer_names: layer_ptrs.as_ptr(),
            ..Default::default()
        };
        let instance = entry
            .create_instance(&create_info, None)
            .vk("vkCreateInstance")?;

        let debug = if layers.is_empty() {
            None
        } else {
            let loader = debug_utils::Instance::new(&entry, &instance);
            let ci = vk::DebugUtilsMessengerCreateInfoEXT {
                s_type: vk::StructureType::DEBUG_UTILS_MESSENGER_CREATE_INFO_EXT,
                message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
                message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
                pfn_user_callback: Some(debug_callback),
                ..Default::default()
            };
            let messenger = loader
                .create_debug_utils_messenger(&ci, None)
                .vk("vkCreateDebugUtilsMessengerEXT")?;
            info!("vk: validation enabled");
            Some((loader, messenger))
        };

        let surface_loader = surface::Instance::new(&entry, &instance);
        let surface = ash_window::create_surface(&entry, &instance, dh, wh, None)
            .vk("vkCreateSurfaceKHR")?;

        Ok(VkInstance {
            entry,
            instance,
            surface_loader,
            surface,
            debug,
        })
    }

    /// Must run after the logical device is gone.
    pub unsafe fn destroy(&mut self) {
        self.surface_loader.destroy_surface(self.surface, None);
        if let Some((loader, messenger)) = self.debug.take() {
            loader.destroy_debug_utils_messenger(messenger, None);
        }
        self.instance.destroy_instance(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layers(names: &[&str]) -> Vec<CString> {
        names.iter().map(|n| CString::new(*n).unwrap()).collect()
    }

    #[test]
    fn validation_enabled_when_installed() {
        let available = layers(&["VK_LAYER_MESA_device_select", "VK_LAYER_KHRONOS_validation"]);
        assert_eq!(validation_layers(true, &available), vec![VALIDATION_LAYER]);
    }

    #[test]
    fn missing_validation_layer_is_skipped() {
        let available = layers(&["VK_LAYER_MESA_device_select"]);
        assert!(validation_layers(true, &available).is_empty());
    }

    #[test]
    fn validation_not_requested() {
        let available = layers(&["VK_LAYER_KHRONOS_validation"]);
        assert!(validation_layers(false, &available).is_empty());
    }
}
