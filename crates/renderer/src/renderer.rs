//! Renderer orchestration.
//!
//! [`Renderer`] owns the Vulkan objects behind one window and keeps the
//! presentation chain in step with it: resizes and invalidated frames mark
//! the chain for rebuilding, and the rebuild runs before the next acquire.

use std::mem::ManuallyDrop;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, error, info};

use accele_core::Config;
use accele_platform::{Surface, Window, get_required_extensions};
use accele_rhi::device::Device;
use accele_rhi::instance::Instance;
use accele_rhi::physical_device::select_physical_device;
use accele_rhi::{Generation, PresentationChain, RhiError, RhiResult, VulkanDriver};

use crate::frame::{FrameOutcome, RebuildTracker, rebuild_if_pending};
use crate::frame_manager::FrameLoop;

/// Owns the instance, surface, device, presentation chain and frame loop.
///
/// # Resource Destruction Order
///
/// 1. Frame loop (waits for the device to go idle)
/// 2. Presentation chain (views, then swapchain)
/// 3. Surface
/// 4. Device
/// 5. Instance
///
/// ManuallyDrop is used to enforce this order.
pub struct Renderer {
    frames: ManuallyDrop<FrameLoop>,
    chain: ManuallyDrop<PresentationChain<VulkanDriver>>,
    surface: ManuallyDrop<Surface>,
    device: ManuallyDrop<Arc<Device>>,
    instance: ManuallyDrop<Instance>,
    tracker: RebuildTracker,
}

impl Renderer {
    /// Creates a renderer for `window` and builds the first chain generation.
    ///
    /// A minimised window is not an error; the chain is built once the
    /// window has an area again.
    ///
    /// # Errors
    ///
    /// Returns an error if any Vulkan object cannot be created or no GPU can
    /// present to the window.
    pub fn new(window: &Window, config: &Config) -> RhiResult<Self> {
        let (width, height) = (window.width(), window.height());
        info!("Initializing renderer ({}x{})", width, height);

        let surface_extensions = window
            .raw_display_handle()
            .and_then(get_required_extensions)
            .map_err(|e| RhiError::SurfaceError(e.to_string()))?;

        let instance = Instance::new(&config.title, &surface_extensions, config.validation)?;

        let surface = window
            .create_surface(instance.entry(), instance.handle())
            .map_err(|e| RhiError::SurfaceError(e.to_string()))?;

        let physical_device_info =
            select_physical_device(instance.handle(), surface.handle(), surface.loader())?;
        let device = Device::new(&instance, &physical_device_info)?;

        let driver = VulkanDriver::new(&instance, device.clone(), surface.handle());
        let mut chain = PresentationChain::new(driver, width, height);
        let mut tracker = RebuildTracker::new(width, height);

        match chain.build() {
            Ok(_) => {}
            Err(RhiError::SurfaceUnavailable { .. }) => {
                info!("Window has no area yet, deferring presentation chain build");
                tracker.invalidate();
            }
            Err(e) => return Err(e),
        }

        let frames = FrameLoop::new(device.clone())?;

        Ok(Self {
            frames: ManuallyDrop::new(frames),
            chain: ManuallyDrop::new(chain),
            surface: ManuallyDrop::new(surface),
            device: ManuallyDrop::new(device),
            instance: ManuallyDrop::new(instance),
            tracker,
        })
    }

    /// Records a new framebuffer size.
    ///
    /// The chain is rebuilt before the next frame; a zero-sized framebuffer
    /// defers the rebuild until the window is restored.
    pub fn resize(&mut self, width: u32, height: u32) {
        if self.tracker.resize(width, height) {
            debug!("Resize pending: {}x{}", width, height);
        }
    }

    /// Renders one frame, rebuilding the chain first if needed.
    ///
    /// A rebuild that fails with a non-fatal error is retried on the next
    /// frame.
    ///
    /// # Errors
    ///
    /// Returns the frame loop's or the rebuild's error. Check
    /// [`RhiError::is_fatal`] to decide whether to keep running.
    pub fn render_frame(&mut self) -> RhiResult<FrameOutcome> {
        rebuild_if_pending(&mut *self.chain, &mut self.tracker)?;

        let outcome = self.frames.render_frame(&*self.chain)?;
        if outcome.needs_rebuild() {
            self.tracker.invalidate();
            if self.chain.is_live() {
                debug!("Frame reported {:?}, rebuilding presentation chain", outcome);
                rebuild_if_pending(&mut *self.chain, &mut self.tracker)?;
            }
        }

        Ok(outcome)
    }

    /// Returns the current chain extent, if the chain is live.
    pub fn extent(&self) -> Option<vk::Extent2D> {
        self.chain.resources().map(|r| r.extent())
    }

    /// Returns the current chain format, if the chain is live.
    pub fn format(&self) -> Option<vk::Format> {
        self.chain.resources().map(|r| r.format())
    }

    /// Returns the generation of the live chain.
    pub fn generation(&self) -> Option<Generation> {
        self.chain.generation()
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            error!(
                "Failed to wait for device idle during renderer drop: {:?}",
                e
            );
        }

        // SAFETY: each field is dropped exactly once, here, in dependency order.
        unsafe {
            ManuallyDrop::drop(&mut self.frames);
            ManuallyDrop::drop(&mut self.chain);
            ManuallyDrop::drop(&mut self.surface);
            ManuallyDrop::drop(&mut self.device);
            ManuallyDrop::drop(&mut self.instance);
        }

        info!("Renderer destroyed");
    }
}
