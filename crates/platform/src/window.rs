//! Window management using winit.
//!
//! [`Window`] wraps the winit window and tracks its framebuffer size, which
//! the presentation chain uses as its extent fallback. [`Surface`] is the
//! Vulkan surface created for it.

use std::ffi::{CStr, c_char};
use std::sync::Arc;

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle};
use winit::dpi::PhysicalSize;
use winit::event_loop::ActiveEventLoop;
use winit::window::{Window as WinitWindow, WindowAttributes};

use accele_core::{Error, Result};

/// RAII wrapper for a Vulkan surface.
///
/// The instance that created the surface must outlive it, and every
/// presentation chain built on it must be dropped first.
pub struct Surface {
    handle: vk::SurfaceKHR,
    surface_loader: ash::khr::surface::Instance,
}

impl Surface {
    /// Returns the raw Vulkan surface handle.
    ///
    /// The handle is only valid while this `Surface` is alive.
    #[inline]
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    /// Returns the surface loader used for capability queries.
    #[inline]
    pub fn loader(&self) -> &ash::khr::surface::Instance {
        &self.surface_loader
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        // SAFETY: the handle was created by ash_window::create_surface with the
        // same instance as the loader, and is destroyed only here.
        unsafe {
            self.surface_loader.destroy_surface(self.handle, None);
        }
        tracing::debug!("Vulkan surface destroyed");
    }
}

/// A resizable application window.
pub struct Window {
    window: Arc<WinitWindow>,
    width: u32,
    height: u32,
}

impl Window {
    /// Creates a window with the given inner size and title.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Window`] if winit cannot create the window.
    pub fn new(event_loop: &ActiveEventLoop, width: u32, height: u32, title: &str) -> Result<Self> {
        let attrs = WindowAttributes::default()
            .with_title(title)
            .with_inner_size(PhysicalSize::new(width, height))
            .with_resizable(true);

        let window = event_loop
            .create_window(attrs)
            .map_err(|e| Error::Window(e.to_string()))?;

        // The platform may not honour the requested size
        let size = window.inner_size();
        tracing::info!(
            "Window created: {}x{} (requested {}x{})",
            size.width,
            size.height,
            width,
            height
        );

        Ok(Self {
            window: Arc::new(window),
            width: size.width,
            height: size.height,
        })
    }

    /// Returns the underlying winit window.
    pub fn inner(&self) -> &WinitWindow {
        &self.window
    }

    /// Returns the framebuffer width from the last resize.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Returns the framebuffer height from the last resize.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Records a new framebuffer size from a resize event.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        tracing::debug!("Window resized: {}x{}", width, height);
    }

    /// Returns true if the framebuffer has no area (e.g. minimised).
    pub fn is_minimized(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Requests a redraw of the window.
    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }

    /// Returns the raw display handle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Window`] if the display handle is unavailable.
    pub fn raw_display_handle(&self) -> Result<RawDisplayHandle> {
        self.window
            .display_handle()
            .map(|handle| handle.as_raw())
            .map_err(|e| Error::Window(format!("Failed to get display handle: {}", e)))
    }

    /// Creates a Vulkan surface for this window.
    ///
    /// # Errors
    ///
    /// Returns an error if the window handles are unavailable or the driver
    /// refuses to create the surface.
    pub fn create_surface(&self, entry: &ash::Entry, instance: &ash::Instance) -> Result<Surface> {
        let display_handle = self.raw_display_handle()?;
        let window_handle = self
            .window
            .window_handle()
            .map_err(|e| Error::Window(format!("Failed to get window handle: {}", e)))?
            .as_raw();

        // SAFETY: entry and instance are live, and both handles come from the
        // winit window, which outlives the surface.
        let handle = unsafe {
            ash_window::create_surface(entry, instance, display_handle, window_handle, None)
                .map_err(|e| Error::Vulkan(format!("Failed to create Vulkan surface: {}", e)))?
        };

        let surface_loader = ash::khr::surface::Instance::new(entry, instance);

        tracing::info!("Vulkan surface created");

        Ok(Surface {
            handle,
            surface_loader,
        })
    }
}

/// Returns the instance extensions needed to create a surface on this display.
///
/// The returned pointers reference static strings owned by the Vulkan loader.
///
/// # Errors
///
/// Returns [`Error::Vulkan`] if the display is not supported.
pub fn get_required_extensions(display_handle: RawDisplayHandle) -> Result<Vec<*const c_char>> {
    let extensions = ash_window::enumerate_required_extensions(display_handle)
        .map_err(|e| Error::Vulkan(format!("Failed to enumerate required extensions: {}", e)))?;

    tracing::debug!(
        "Required Vulkan extensions for surface: {:?}",
        extensions
            .iter()
            // SAFETY: ash_window returns valid, null-terminated static strings.
            .map(|&ext| unsafe { CStr::from_ptr(ext) })
            .collect::<Vec<_>>()
    );

    Ok(extensions.to_vec())
}
