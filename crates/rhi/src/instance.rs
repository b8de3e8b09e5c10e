//! Vulkan instance management.
//!
//! This module handles VkInstance creation, validation layers, and the debug
//! messenger that forwards validation output to `tracing`.
//!
//! # Example
//!
//! ```no_run
//! use accele_rhi::instance::Instance;
//!
//! // Surface extensions normally come from the windowing layer
//! let instance = Instance::new("Accele", &[], cfg!(debug_assertions))
//!     .expect("Failed to create Vulkan instance");
//! let entry = instance.entry();
//! ```

use std::ffi::{CStr, CString, c_char};

use ash::{Entry, vk};
use tracing::{debug, error, info, warn};

use crate::error::RhiError;

/// The Khronos validation layer name.
const VALIDATION_LAYER_NAME: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Vulkan instance wrapper with optional validation layer support.
pub struct Instance {
    /// Vulkan entry point loader
    entry: Entry,
    /// Vulkan instance handle
    instance: ash::Instance,
    /// Debug utils loader and messenger (only present when validation is enabled)
    debug: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
}

impl Instance {
    /// Creates a new Vulkan instance.
    ///
    /// # Arguments
    ///
    /// * `app_name` - Application name reported to the driver
    /// * `surface_extensions` - Instance extensions needed to create the window surface
    /// * `enable_validation` - If true, enables validation layers when available
    ///
    /// # Errors
    ///
    /// Returns an error if the Vulkan library cannot be loaded or instance
    /// creation fails.
    pub fn new(
        app_name: &str,
        surface_extensions: &[*const c_char],
        enable_validation: bool,
    ) -> Result<Self, RhiError> {
        let entry = unsafe { Entry::load()? };

        let validation_available =
            enable_validation && Self::is_validation_layer_available(&entry)?;
        if enable_validation && !validation_available {
            warn!("Validation layer requested but not available, proceeding without it");
        }

        let app_name = CString::new(app_name).unwrap_or_else(|_| c"Accele".to_owned());
        let app_info = vk::ApplicationInfo::default()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(c"Accele")
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_3);

        let mut extensions = surface_extensions.to_vec();
        if validation_available {
            extensions.push(ash::ext::debug_utils::NAME.as_ptr());
        }

        let layers = if validation_available {
            vec![VALIDATION_LAYER_NAME.as_ptr()]
        } else {
            vec![]
        };

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);

        let instance = unsafe { entry.create_instance(&create_info, None)? };

        info!("Vulkan instance created (API version 1.3)");

        let debug = if validation_available {
            let debug_utils = ash::ext::debug_utils::Instance::new(&entry, &instance);
            match Self::setup_debug_messenger(&debug_utils) {
                Ok(messenger) => {
                    info!("Validation layers enabled");
                    Some((debug_utils, messenger))
                }
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e);
                }
            }
        } else {
            None
        };

        Ok(Self {
            entry,
            instance,
            debug,
        })
    }

    /// Returns the Vulkan instance handle.
    #[inline]
    pub fn handle(&self) -> &ash::Instance {
        &self.instance
    }

    /// Returns the Vulkan entry point loader.
    #[inline]
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    /// Returns whether validation layers are enabled.
    #[inline]
    pub fn has_validation(&self) -> bool {
        self.debug.is_some()
    }

    fn is_validation_layer_available(entry: &Entry) -> Result<bool, RhiError> {
        let available_layers = unsafe { entry.enumerate_instance_layer_properties()? };

        Ok(available_layers
            .iter()
            .any(|layer| {
                layer
                    .layer_name_as_c_str()
                    .is_ok_and(|name| name == VALIDATION_LAYER_NAME)
            }))
    }

    fn setup_debug_messenger(
        debug_utils: &ash::ext::debug_utils::Instance,
    ) -> Result<vk::DebugUtilsMessengerEXT, RhiError> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None)? };
        Ok(messenger)
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        unsafe {
            if let Some((debug_utils, messenger)) = &self.debug {
                debug_utils.destroy_debug_utils_messenger(*messenger, None);
            }
            self.instance.destroy_instance(None);
        }
        info!("Vulkan instance destroyed");
    }
}

/// Forwards validation layer messages to `tracing`.
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() {
        return vk::FALSE;
    }

    let callback_data = unsafe { &*p_callback_data };
    let message = if callback_data.p_message.is_null() {
        std::borrow::Cow::Borrowed("(no message)")
    } else {
        unsafe { CStr::from_ptr(callback_data.p_message).to_string_lossy() }
    };

    let type_str = match message_type {
        vk::DebugUtilsMessageTypeFlagsEXT::GENERAL => "General",
        vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION => "Validation",
        vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE => "Performance",
        _ => "Unknown",
    };

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => error!("[Vulkan {}] {}", type_str, message),
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            warn!("[Vulkan {}] {}", type_str, message)
        }
        _ => debug!("[Vulkan {}] {}", type_str, message),
    }

    vk::FALSE
}
