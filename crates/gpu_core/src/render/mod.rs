//! Rendering layer
//!
//! Backend-agnostic renderer configuration lives in [`config`]; the Vulkan
//! implementation of resources and pipelines lives in [`vulkan`].

pub mod config;
pub mod vulkan;

pub use config::{RendererConfig, RenderingMode, SampleCount};
