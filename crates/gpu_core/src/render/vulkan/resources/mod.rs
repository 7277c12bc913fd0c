//! GPU resources: memory, buffers, images, samplers, descriptors, textures

pub mod buffer;
pub mod descriptor_set;
pub mod format;
pub mod image;
pub mod memory;
pub mod mipmap;
pub mod sampler;
pub mod texture;

pub use buffer::{Buffer, StagingBuffer};
pub use descriptor_set::{DescriptorPool, DescriptorSetLayout, DescriptorSetLayoutBuilder, DescriptorWriter};
pub use format::{texture_memory_size, ColorComponents, TextureType};
pub use image::{Image, ImageSpec};
pub use memory::{AllocationStats, MemoryBlock};
pub use mipmap::{mip_level_count, next_mip_extent, MipChain};
pub use sampler::{Sampler, SamplerSettings};
pub use texture::{Texture, TextureBindings, TexturePlan, TextureSettings};
