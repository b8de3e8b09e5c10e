//! Frame loop and renderer orchestration.
//!
//! This crate drives the presentation chain:
//! - Per-frame synchronization and command recording
//! - Rebuilding the chain on resize and invalidation
//! - Owning the Vulkan objects in the right destruction order

pub mod frame;
pub mod frame_manager;
pub mod renderer;

pub use frame::{FrameOutcome, RebuildTracker, SlotState, rebuild_if_pending};
pub use frame_manager::FrameLoop;
pub use renderer::Renderer;

/// Maximum number of frames that can be in flight simultaneously.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;
