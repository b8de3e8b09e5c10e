//! Physical device (GPU) selection.
//!
//! The presentation chain uses exclusive image sharing, so a usable GPU needs
//! one queue family that supports both graphics and presentation to the
//! target surface, Vulkan 1.3 (dynamic rendering), `VK_KHR_swapchain`, and at
//! least one surface format and present mode.
//!
//! # Example
//!
//! ```no_run
//! use accele_rhi::instance::Instance;
//! use accele_rhi::physical_device::select_physical_device;
//! use ash::vk;
//!
//! let instance = Instance::new("Accele", &[], false).expect("Failed to create instance");
//! let surface: vk::SurfaceKHR = vk::SurfaceKHR::null(); // placeholder
//! let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
//!
//! let device_info = select_physical_device(instance.handle(), surface, &surface_loader)
//!     .expect("Failed to select physical device");
//! ```

use std::ffi::CStr;

use ash::vk;
use tracing::{debug, info, warn};

use crate::error::RhiError;
use crate::negotiate::SurfaceSupport;

/// Information about the selected physical device.
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle.
    pub device: vk::PhysicalDevice,
    /// Device properties (name, limits, API version, etc.).
    pub properties: vk::PhysicalDeviceProperties,
    /// Queue family used for both graphics and presentation.
    pub queue_family: u32,
}

impl PhysicalDeviceInfo {
    /// Returns the device name as a string.
    pub fn device_name(&self) -> &str {
        unsafe {
            CStr::from_ptr(self.properties.device_name.as_ptr())
                .to_str()
                .unwrap_or("Unknown Device")
        }
    }

    /// Returns a human-readable string for the device type.
    pub fn device_type_name(&self) -> &'static str {
        match self.properties.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => "Discrete GPU",
            vk::PhysicalDeviceType::INTEGRATED_GPU => "Integrated GPU",
            vk::PhysicalDeviceType::VIRTUAL_GPU => "Virtual GPU",
            vk::PhysicalDeviceType::CPU => "CPU",
            _ => "Other",
        }
    }
}

impl std::fmt::Debug for PhysicalDeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicalDeviceInfo")
            .field("name", &self.device_name())
            .field("type", &self.device_type_name())
            .field("queue_family", &self.queue_family)
            .finish()
    }
}

/// Selects the most suitable physical device for presenting to `surface`.
///
/// Discrete GPUs are preferred over integrated ones.
///
/// # Errors
///
/// Returns [`RhiError::NoSuitableGpu`] if no GPU meets the requirements.
pub fn select_physical_device(
    instance: &ash::Instance,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> Result<PhysicalDeviceInfo, RhiError> {
    let devices = unsafe { instance.enumerate_physical_devices()? };

    if devices.is_empty() {
        warn!("No Vulkan-capable GPUs found");
        return Err(RhiError::NoSuitableGpu);
    }

    info!("Found {} GPU(s)", devices.len());

    let selected = devices
        .into_iter()
        .filter_map(|device| check_device_suitability(instance, device, surface, surface_loader))
        .max_by_key(|info| device_type_rank(info.properties.device_type))
        .ok_or_else(|| {
            warn!("No suitable GPU found with required capabilities");
            RhiError::NoSuitableGpu
        })?;

    info!(
        "Selected GPU: '{}' ({}), queue family {}",
        selected.device_name(),
        selected.device_type_name(),
        selected.queue_family
    );

    Ok(selected)
}

fn check_device_suitability(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> Option<PhysicalDeviceInfo> {
    let properties = unsafe { instance.get_physical_device_properties(device) };
    let device_name = unsafe {
        CStr::from_ptr(properties.device_name.as_ptr())
            .to_str()
            .unwrap_or("Unknown")
    };

    if !supports_api_1_3(properties.api_version) {
        debug!("GPU '{}' skipped: Vulkan 1.3 not supported", device_name);
        return None;
    }

    if !supports_swapchain(instance, device) {
        debug!("GPU '{}' skipped: VK_KHR_swapchain missing", device_name);
        return None;
    }

    let Some(queue_family) = find_present_queue_family(instance, device, surface, surface_loader)
    else {
        debug!(
            "GPU '{}' skipped: no queue family supports both graphics and present",
            device_name
        );
        return None;
    };

    let adequate = query_surface_support(device, surface, surface_loader)
        .is_some_and(|support| support.is_adequate());
    if !adequate {
        debug!(
            "GPU '{}' skipped: surface reports no formats or present modes",
            device_name
        );
        return None;
    }

    Some(PhysicalDeviceInfo {
        device,
        properties,
        queue_family,
    })
}

fn supports_api_1_3(api_version: u32) -> bool {
    (vk::api_version_major(api_version), vk::api_version_minor(api_version)) >= (1, 3)
}

fn supports_swapchain(instance: &ash::Instance, device: vk::PhysicalDevice) -> bool {
    let Ok(extensions) = (unsafe { instance.enumerate_device_extension_properties(device) }) else {
        return false;
    };

    extensions.iter().any(|ext| {
        ext.extension_name_as_c_str()
            .is_ok_and(|name| name == ash::khr::swapchain::NAME)
    })
}

/// Finds a queue family that can both render and present to `surface`.
fn find_present_queue_family(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> Option<u32> {
    let families = unsafe { instance.get_physical_device_queue_family_properties(device) };

    families
        .iter()
        .enumerate()
        .filter(|(_, family)| {
            family.queue_count > 0 && family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
        })
        .map(|(i, _)| i as u32)
        .find(|&i| unsafe {
            surface_loader
                .get_physical_device_surface_support(device, i, surface)
                .unwrap_or(false)
        })
}

fn query_surface_support(
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> Option<SurfaceSupport> {
    unsafe {
        Some(SurfaceSupport {
            capabilities: surface_loader
                .get_physical_device_surface_capabilities(device, surface)
                .ok()?,
            formats: surface_loader
                .get_physical_device_surface_formats(device, surface)
                .ok()?,
            present_modes: surface_loader
                .get_physical_device_surface_present_modes(device, surface)
                .ok()?,
        })
    }
}

fn device_type_rank(device_type: vk::PhysicalDeviceType) -> u32 {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 4,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 3,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 2,
        vk::PhysicalDeviceType::CPU => 1,
        _ => 0,
    }
}
