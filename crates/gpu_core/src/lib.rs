//! # GPU Core
//!
//! Resource and pipeline construction layer for a Vulkan renderer.
//!
//! ## Features
//!
//! - **Owned GPU memory**: buffers and images own exactly one memory block and
//!   release it on drop
//! - **Staged uploads**: host-visible staging buffers feed device-local images
//! - **Mip chains**: layout-tracked blit chains for arbitrary image dimensions
//! - **Textures**: image + shared sampler + descriptor set in one build call
//! - **Graphics pipelines**: deterministic pipeline derivation from settings,
//!   with replace-then-publish rebuilds
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gpu_core::prelude::*;
//!
//! fn upload(
//!     context: &GpuContext,
//!     sampler: &Sampler,
//!     layout: &DescriptorSetLayout,
//!     pool: &DescriptorPool,
//! ) -> VulkanResult<Texture> {
//!     let settings = TextureSettings {
//!         name: Some("checker".to_string()),
//!         texture_type: TextureType::Diffuse,
//!         ..TextureSettings::default()
//!     };
//!     let bindings = TextureBindings { sampler, descriptor_set_layout: layout, descriptor_pool: pool };
//!     let pixels = vec![255u8; 64 * 64 * 4];
//!     Texture::build(context, &settings, &bindings, 64, 64, &pixels)
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod assets;
pub mod config;
pub mod render;

/// Common imports for crate users
pub mod prelude {
    pub use crate::{
        assets::{AssetError, ImageData},
        config::{Config, ConfigError},
        render::config::{RendererConfig, RenderingMode, SampleCount},
        render::vulkan::{
            AllocationStats, Buffer, ColorComponents, DescriptorPool, DescriptorSetLayout,
            DescriptorSetLayoutBuilder, GpuContext, GraphicsPipeline, Image, ImageLayout,
            PipelineManager, PipelineSettings, QueueSelection, Sampler, SamplerSettings,
            StagingBuffer, Texture, TextureBindings, TextureSettings, TextureType, Vertex,
            VulkanError, VulkanResult,
        },
    };
}
