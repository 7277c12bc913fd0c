//! Vulkan backend implementation
//!
//! Organized into initialization, resources, rendering, and state modules.

/// Vulkan initialization types (instance, devices, context)
pub mod initialization;

/// Vulkan resource management (memory, buffers, images, textures, descriptors)
pub mod resources;

/// Vulkan rendering operations (commands, shaders, pipelines)
pub mod rendering;

/// Vulkan state management
pub mod state;

// Re-export core initialization types
pub use initialization::context::{FormatSupport, GpuContext, VulkanError, VulkanResult};
pub use initialization::device::{required_features, LogicalDevice, PhysicalDeviceInfo, QueueSelection};
pub use initialization::instance::VulkanInstance;

// Re-export resource types
pub use resources::{
    AllocationStats, Buffer, ColorComponents, DescriptorPool, DescriptorSetLayout, DescriptorSetLayoutBuilder,
    DescriptorWriter, Image, ImageSpec, MemoryBlock, Sampler, SamplerSettings, StagingBuffer, Texture,
    TextureBindings, TexturePlan, TextureSettings, TextureType,
};

// Re-export rendering types
pub use rendering::{
    default_push_constant_range, CommandPool, CommandSink, GraphicsPipeline, OneTimeCommands, PipelineManager,
    PipelineSettings, PipelineState, ShaderModule, Vertex, VulkanVertexLayout,
};

// Re-export state types
pub use state::{ImageLayout, LayoutTracker, LayoutTransition, MipRange};
