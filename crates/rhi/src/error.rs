//! RHI-specific error types.

use ash::vk;
use thiserror::Error;

/// RHI-specific error type.
///
/// Presentation failures follow a small taxonomy: [`RhiError::DriverCapability`]
/// is never retryable, [`RhiError::DriverResource`] is left to the caller unless
/// the device was lost, and [`RhiError::SurfaceUnavailable`] clears up once the
/// window has a non-zero size again. Out-of-date and suboptimal surfaces are not
/// errors at all; they are reported through
/// [`PresentStatus`](crate::chain::PresentStatus).
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error outside the presentation chain
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] vk::Result),

    /// Failed to load Vulkan library
    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    /// No suitable GPU found
    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// Surface creation error
    #[error("Surface error: {0}")]
    SurfaceError(String),

    /// The driver reported an empty or contradictory capability set
    #[error("Driver capability error: {0}")]
    DriverCapability(String),

    /// A driver query or allocation failed
    #[error("Driver resource error while trying to {operation}: {result}")]
    DriverResource {
        /// What the chain was doing when the driver failed
        operation: &'static str,
        /// The code returned by the driver
        result: vk::Result,
    },

    /// The surface currently has no presentable area (e.g. minimised window)
    #[error("Surface unavailable: negotiated extent is {width}x{height}")]
    SurfaceUnavailable {
        /// Negotiated width
        width: u32,
        /// Negotiated height
        height: u32,
    },

    /// An operation was called in the wrong lifecycle state
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl RhiError {
    /// Returns a closure mapping a driver result to [`RhiError::DriverResource`].
    pub fn resource(operation: &'static str) -> impl FnOnce(vk::Result) -> Self {
        move |result| Self::DriverResource { operation, result }
    }

    /// Returns true if the error can never be recovered from by rebuilding.
    ///
    /// A lost device needs a new device and chain, which is the owner's job.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::DriverCapability(_) | Self::LoadingError(_) | Self::NoSuitableGpu => true,
            Self::DriverResource { result, .. } | Self::VulkanError(result) => {
                *result == vk::Result::ERROR_DEVICE_LOST
            }
            Self::SurfaceError(_) | Self::SurfaceUnavailable { .. } | Self::InvalidState(_) => {
                false
            }
        }
    }
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_errors_are_fatal() {
        let err = RhiError::DriverCapability("no surface formats".to_string());
        assert!(err.is_fatal());
    }

    #[test]
    fn test_device_lost_is_fatal() {
        let err = RhiError::resource("create swapchain")(vk::Result::ERROR_DEVICE_LOST);
        assert!(err.is_fatal());

        let err = RhiError::from(vk::Result::ERROR_DEVICE_LOST);
        assert!(err.is_fatal());
    }

    #[test]
    fn test_resource_errors_are_left_to_caller() {
        let err = RhiError::resource("create image view")(vk::Result::ERROR_OUT_OF_HOST_MEMORY);
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("create image view"));

        let err = RhiError::SurfaceUnavailable {
            width: 0,
            height: 0,
        };
        assert!(!err.is_fatal());
    }
}
