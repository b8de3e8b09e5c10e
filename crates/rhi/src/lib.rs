//! Vulkan abstraction layer (Render Hardware Interface).
//!
//! This crate provides a safe abstraction over Vulkan using the `ash` crate.
//! It handles:
//! - Instance, physical device and logical device creation
//! - Surface capability negotiation
//! - The presentation chain lifecycle (build, teardown, rebuild)
//! - Synchronization primitives

mod error;

pub mod chain;
pub mod command;
pub mod device;
pub mod driver;
pub mod instance;
pub mod negotiate;
pub mod physical_device;
pub mod sync;

pub use chain::{Acquire, ChainResources, ChainState, Generation, PresentStatus, PresentationChain};
pub use driver::{PresentationDriver, VulkanDriver};
pub use error::{RhiError, RhiResult};
pub use negotiate::{ChainConfig, SurfaceSupport};

// Re-export ash types that users might need
pub use ash::vk;
