//! Command recording, shaders and graphics pipelines

pub mod commands;
pub mod pipeline;
pub mod pipeline_manager;
pub mod shader;
pub mod vertex_layout;

pub use commands::{BlitRegion, CommandPool, CommandSink, OneTimeCommands};
pub use pipeline::{default_push_constant_range, GraphicsPipeline, PipelineSettings, PipelineState};
pub use pipeline_manager::PipelineManager;
pub use shader::ShaderModule;
pub use vertex_layout::{Vertex, VulkanVertexLayout};
