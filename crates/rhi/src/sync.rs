//! Synchronization primitives for the frame loop.
//!
//! - [`Semaphore`] - GPU-to-GPU ordering between acquire, submit and present
//! - [`Fence`] - lets the host wait for a frame's GPU work
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use accele_rhi::device::Device;
//! use accele_rhi::sync::{Fence, Semaphore};
//!
//! # fn example(device: Arc<Device>) -> Result<(), accele_rhi::RhiError> {
//! let image_available = Semaphore::new(device.clone())?;
//! let in_flight = Fence::new(device, true)?;
//!
//! in_flight.wait(u64::MAX)?;
//! in_flight.reset()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;

/// Vulkan semaphore wrapper, created unsignaled.
pub struct Semaphore {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan semaphore handle.
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Creates a new semaphore.
    ///
    /// # Errors
    ///
    /// Returns an error if semaphore creation fails.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::default();
        let semaphore = unsafe { device.handle().create_semaphore(&create_info, None)? };

        debug!("Created semaphore");

        Ok(Self { device, semaphore })
    }

    /// Returns the Vulkan semaphore handle.
    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_semaphore(self.semaphore, None);
        }
        debug!("Destroyed semaphore");
    }
}

/// Vulkan fence wrapper.
pub struct Fence {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan fence handle.
    fence: vk::Fence,
}

impl Fence {
    /// Creates a new fence.
    ///
    /// A `signaled` fence lets the first wait of a frame slot return at once.
    ///
    /// # Errors
    ///
    /// Returns an error if fence creation fails.
    pub fn new(device: Arc<Device>, signaled: bool) -> RhiResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::default().flags(flags);
        let fence = unsafe { device.handle().create_fence(&create_info, None)? };

        debug!(
            "Created fence ({})",
            if signaled { "signaled" } else { "unsignaled" }
        );

        Ok(Self { device, fence })
    }

    /// Returns the Vulkan fence handle.
    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Blocks until the fence is signaled or `timeout` nanoseconds pass.
    ///
    /// # Errors
    ///
    /// Returns an error on timeout or if the wait fails.
    pub fn wait(&self, timeout: u64) -> RhiResult<()> {
        let fences = [self.fence];
        unsafe {
            self.device
                .handle()
                .wait_for_fences(&fences, true, timeout)?
        };
        Ok(())
    }

    /// Resets the fence to the unsignaled state.
    ///
    /// # Errors
    ///
    /// Returns an error if the reset operation fails.
    pub fn reset(&self) -> RhiResult<()> {
        let fences = [self.fence];
        unsafe { self.device.handle().reset_fences(&fences)? };
        Ok(())
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_fence(self.fence, None);
        }
        debug!("Destroyed fence");
    }
}
