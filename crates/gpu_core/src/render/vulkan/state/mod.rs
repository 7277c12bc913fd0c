//! Vulkan state management

/// Per-mip-level image layout tracking and barrier derivation
pub mod layout;

pub use layout::{ImageLayout, LayoutTracker, LayoutTransition, MipRange};
