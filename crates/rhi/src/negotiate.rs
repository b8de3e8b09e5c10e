//! Surface capability negotiation.
//!
//! Pure functions that turn what the driver advertises for a surface into a
//! single [`ChainConfig`]. Nothing here touches the GPU, so every choice can be
//! tested against hand-written capability sets.
//!
//! # Policy
//!
//! - Format: B8G8R8A8_SRGB with SRGB_NONLINEAR, otherwise the first advertised pair
//! - Present mode: MAILBOX (low latency, no tearing), otherwise FIFO (vsync)
//! - Extent: the surface's fixed extent, otherwise the window size clamped to limits
//! - Image count: three images, within the surface's min/max

use ash::vk;
use tracing::{debug, warn};

use crate::error::{RhiError, RhiResult};

/// Preferred surface format.
pub const PREFERRED_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_SRGB,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// Number of images requested when the surface allows it.
pub const PREFERRED_IMAGE_COUNT: u32 = 3;

/// Surface support details.
///
/// A snapshot of what the surface supports, queried fresh for every build.
#[derive(Debug, Clone, Default)]
pub struct SurfaceSupport {
    /// Surface capabilities (min/max image count, extents, transforms, etc.)
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported surface formats (format and color space combinations)
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes (FIFO, MAILBOX, IMMEDIATE, etc.)
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    /// Checks if the support is adequate for presenting.
    ///
    /// Returns true if at least one format and one present mode are available.
    #[inline]
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// The negotiated configuration of one chain generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainConfig {
    /// Image format and color space
    pub surface_format: vk::SurfaceFormatKHR,
    /// Present mode
    pub present_mode: vk::PresentModeKHR,
    /// Image extent
    pub extent: vk::Extent2D,
    /// Minimum number of images requested from the driver
    pub image_count: u32,
    /// Transform applied by the presentation engine, copied from the surface
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
}

impl ChainConfig {
    /// Returns the image format.
    #[inline]
    pub fn format(&self) -> vk::Format {
        self.surface_format.format
    }

    /// Returns the image color space.
    #[inline]
    pub fn color_space(&self) -> vk::ColorSpaceKHR {
        self.surface_format.color_space
    }
}

/// Negotiates a full chain configuration.
///
/// `fallback` is the window's framebuffer size, used only when the surface
/// lets the application pick the extent.
///
/// # Errors
///
/// Returns [`RhiError::DriverCapability`] if the support set is empty or
/// contradictory.
pub fn negotiate(support: &SurfaceSupport, fallback: vk::Extent2D) -> RhiResult<ChainConfig> {
    let caps = &support.capabilities;
    check_capabilities(caps)?;

    let surface_format = choose_surface_format(&support.formats)?;
    let present_mode = choose_present_mode(&support.present_modes)?;
    let extent = choose_extent(caps, fallback);
    let image_count = choose_image_count(caps);

    Ok(ChainConfig {
        surface_format,
        present_mode,
        extent,
        image_count,
        pre_transform: caps.current_transform,
    })
}

fn check_capabilities(caps: &vk::SurfaceCapabilitiesKHR) -> RhiResult<()> {
    if caps.max_image_count != 0 && caps.min_image_count > caps.max_image_count {
        return Err(RhiError::DriverCapability(format!(
            "min image count {} exceeds max image count {}",
            caps.min_image_count, caps.max_image_count
        )));
    }

    let (min, max) = (caps.min_image_extent, caps.max_image_extent);
    if min.width > max.width || min.height > max.height {
        return Err(RhiError::DriverCapability(format!(
            "min extent {}x{} exceeds max extent {}x{}",
            min.width, min.height, max.width, max.height
        )));
    }

    Ok(())
}

/// Chooses the surface format.
///
/// Prefers [`PREFERRED_FORMAT`] and otherwise takes the first advertised pair;
/// any supported format is usable.
///
/// # Errors
///
/// Returns [`RhiError::DriverCapability`] if `formats` is empty.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> RhiResult<vk::SurfaceFormatKHR> {
    if formats.contains(&PREFERRED_FORMAT) {
        debug!("Selected preferred surface format: B8G8R8A8_SRGB with SRGB_NONLINEAR");
        return Ok(PREFERRED_FORMAT);
    }

    let first = formats.first().copied().ok_or_else(|| {
        RhiError::DriverCapability("surface reports no supported formats".to_string())
    })?;

    warn!(
        "Preferred surface format unavailable, using {:?} with {:?}",
        first.format, first.color_space
    );
    Ok(first)
}

/// Chooses the present mode.
///
/// MAILBOX wins wherever it appears in the list; otherwise FIFO, which every
/// conformant driver must expose.
///
/// # Errors
///
/// Returns [`RhiError::DriverCapability`] if neither mode is advertised.
pub fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> RhiResult<vk::PresentModeKHR> {
    if present_modes.contains(&vk::PresentModeKHR::MAILBOX) {
        debug!("Selected MAILBOX present mode (triple buffering)");
        return Ok(vk::PresentModeKHR::MAILBOX);
    }

    if present_modes.contains(&vk::PresentModeKHR::FIFO) {
        debug!("Selected FIFO present mode (vsync)");
        return Ok(vk::PresentModeKHR::FIFO);
    }

    Err(RhiError::DriverCapability(format!(
        "surface does not advertise FIFO present mode (got {present_modes:?})"
    )))
}

/// Chooses the image extent.
///
/// If the surface reports a fixed current extent it is used verbatim.
/// Otherwise (current extent width is `u32::MAX`), `fallback` is clamped
/// component-wise to the surface's min/max extents.
pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, fallback: vk::Extent2D) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        debug!(
            "Using current surface extent: {}x{}",
            caps.current_extent.width, caps.current_extent.height
        );
        return caps.current_extent;
    }

    // The maximum wins if the driver reports min above max
    let extent = vk::Extent2D {
        width: fallback
            .width
            .max(caps.min_image_extent.width)
            .min(caps.max_image_extent.width),
        height: fallback
            .height
            .max(caps.min_image_extent.height)
            .min(caps.max_image_extent.height),
    };

    debug!(
        "Calculated extent: {}x{} (requested: {}x{}, min: {}x{}, max: {}x{})",
        extent.width,
        extent.height,
        fallback.width,
        fallback.height,
        caps.min_image_extent.width,
        caps.min_image_extent.height,
        caps.max_image_extent.width,
        caps.max_image_extent.height
    );

    extent
}

/// Chooses how many images to request.
///
/// At least [`PREFERRED_IMAGE_COUNT`], never below the surface minimum, and
/// capped at the maximum unless it is 0 (unbounded).
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let preferred = PREFERRED_IMAGE_COUNT.max(caps.min_image_count);

    let image_count = if caps.max_image_count > 0 {
        preferred.min(caps.max_image_count)
    } else {
        preferred
    };

    debug!(
        "Image count: {} (min: {}, max: {})",
        image_count,
        caps.min_image_count,
        if caps.max_image_count == 0 {
            "unlimited".to_string()
        } else {
            caps.max_image_count.to_string()
        }
    );

    image_count
}
