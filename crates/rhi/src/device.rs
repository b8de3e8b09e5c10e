//! Vulkan logical device and queue management.
//!
//! # Overview
//!
//! The [`Device`] owns the logical device and the single queue used for both
//! rendering and presentation. Device creation enables `VK_KHR_swapchain`
//! and Vulkan 1.3 dynamic rendering.
//!
//! # Example
//!
//! ```no_run
//! use accele_rhi::instance::Instance;
//! use accele_rhi::physical_device::select_physical_device;
//! use accele_rhi::device::Device;
//! use ash::vk;
//!
//! let instance = Instance::new("Accele", &[], false).expect("Failed to create instance");
//! let surface: vk::SurfaceKHR = vk::SurfaceKHR::null(); // placeholder
//! let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
//!
//! let physical_device_info = select_physical_device(instance.handle(), surface, &surface_loader)
//!     .expect("No suitable GPU found");
//!
//! let device = Device::new(&instance, &physical_device_info)
//!     .expect("Failed to create logical device");
//! let queue = device.queue();
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::error::RhiError;
use crate::instance::Instance;
use crate::physical_device::PhysicalDeviceInfo;

/// Required device extensions.
const DEVICE_EXTENSIONS: &[&std::ffi::CStr] = &[ash::khr::swapchain::NAME];

/// Vulkan logical device wrapper.
///
/// # Thread Safety
///
/// The [`Device`] is shared through `Arc`. Queue submission is externally
/// synchronized by the single frame-owning thread.
pub struct Device {
    /// Vulkan logical device handle.
    device: ash::Device,
    /// Physical device handle.
    physical_device: vk::PhysicalDevice,
    /// Graphics + present queue handle.
    queue: vk::Queue,
    /// Family of `queue`.
    queue_family: u32,
}

impl Device {
    /// Creates a new logical device with one graphics/present queue.
    ///
    /// # Errors
    ///
    /// Returns an error if device creation fails.
    pub fn new(
        instance: &Instance,
        physical_device_info: &PhysicalDeviceInfo,
    ) -> Result<Arc<Self>, RhiError> {
        let queue_family = physical_device_info.queue_family;
        let queue_priorities = [1.0f32];

        let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
            .queue_family_index(queue_family)
            .queue_priorities(&queue_priorities)];

        let mut features_1_3 = vk::PhysicalDeviceVulkan13Features::default()
            .dynamic_rendering(true)
            .synchronization2(true);

        let extension_names: Vec<*const std::ffi::c_char> =
            DEVICE_EXTENSIONS.iter().map(|ext| ext.as_ptr()).collect();

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_names)
            .push_next(&mut features_1_3);

        let device = unsafe {
            instance
                .handle()
                .create_device(physical_device_info.device, &create_info, None)?
        };

        info!(
            "Logical device created with {} extension(s)",
            DEVICE_EXTENSIONS.len()
        );

        let queue = unsafe { device.get_device_queue(queue_family, 0) };
        debug!("Graphics/present queue retrieved from family {}", queue_family);

        Ok(Arc::new(Self {
            device,
            physical_device: physical_device_info.device,
            queue,
            queue_family,
        }))
    }

    /// Returns the Vulkan logical device handle.
    #[inline]
    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    /// Returns the physical device handle.
    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Returns the graphics/present queue handle.
    #[inline]
    pub fn queue(&self) -> vk::Queue {
        self.queue
    }

    /// Returns the queue family index of [`queue`](Self::queue).
    #[inline]
    pub fn queue_family(&self) -> u32 {
        self.queue_family
    }

    /// Waits for the device to become idle.
    ///
    /// # Errors
    ///
    /// Returns an error if the wait fails.
    pub fn wait_idle(&self) -> Result<(), RhiError> {
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                tracing::error!("Failed to wait for device idle during drop: {:?}", e);
            }
            self.device.destroy_device(None);
        }
        info!("Logical device destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_extensions_defined() {
        assert!(DEVICE_EXTENSIONS.contains(&ash::khr::swapchain::NAME));
    }

    #[test]
    fn test_device_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Device>();
    }
}
