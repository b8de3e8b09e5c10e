//! Platform abstraction layer.
//!
//! This crate provides:
//! - Window management via winit
//! - Raw window handles and RAII Vulkan surfaces

mod window;

pub use window::{Surface, Window, get_required_extensions};

// Re-export winit types that users might need
pub use winit::event::WindowEvent;
pub use winit::event_loop::EventLoop;
