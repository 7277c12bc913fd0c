//! Descriptor set layouts, pools and writes
//!
//! Layouts and pools are owned by the renderer and lent to texture builds.
//! Textures allocate one set from the pool and write their image at the slot
//! derived from their [`TextureType`].

use ash::{vk, Device};

use super::format::TextureType;
use crate::render::config::RendererConfig;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Descriptor set layout builder for creating reusable layouts
#[derive(Default)]
pub struct DescriptorSetLayoutBuilder {
    bindings: Vec<vk::DescriptorSetLayoutBinding>,
}

impl DescriptorSetLayoutBuilder {
    /// Create a new descriptor set layout builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a uniform buffer binding
    pub fn add_uniform_buffer(mut self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.bindings.push(layout_binding(binding, vk::DescriptorType::UNIFORM_BUFFER, stage_flags));
        self
    }

    /// Add a combined image sampler binding
    pub fn add_combined_image_sampler(mut self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.bindings
            .push(layout_binding(binding, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, stage_flags));
        self
    }

    /// Add a fragment-stage sampler at the slot of every texture type
    pub fn add_texture_slots(self) -> Self {
        TextureType::ALL.into_iter().fold(self, |builder, texture_type| {
            builder.add_combined_image_sampler(texture_type.binding(), vk::ShaderStageFlags::FRAGMENT)
        })
    }

    /// Bindings added so far
    pub fn bindings(&self) -> &[vk::DescriptorSetLayoutBinding] {
        &self.bindings
    }

    /// Build the descriptor set layout
    pub fn build(self, device: &Device) -> VulkanResult<DescriptorSetLayout> {
        if let Some(duplicate) = self.duplicate_binding() {
            return Err(VulkanError::invalid(format!("Binding {duplicate} declared twice")));
        }

        let layout_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&self.bindings);

        let layout = unsafe {
            device
                .create_descriptor_set_layout(&layout_info, None)
                .map_err(VulkanError::creation("descriptor set layout"))?
        };

        Ok(DescriptorSetLayout {
            layout,
            device: device.clone(),
            bindings: self.bindings,
        })
    }

    fn duplicate_binding(&self) -> Option<u32> {
        self.bindings.iter().enumerate().find_map(|(i, binding)| {
            self.bindings[..i]
                .iter()
                .any(|earlier| earlier.binding == binding.binding)
                .then_some(binding.binding)
        })
    }
}

fn layout_binding(
    binding: u32,
    descriptor_type: vk::DescriptorType,
    stage_flags: vk::ShaderStageFlags,
) -> vk::DescriptorSetLayoutBinding {
    vk::DescriptorSetLayoutBinding::builder()
        .binding(binding)
        .descriptor_type(descriptor_type)
        .descriptor_count(1)
        .stage_flags(stage_flags)
        .build()
}

/// Descriptor set layout wrapper with automatic cleanup
pub struct DescriptorSetLayout {
    layout: vk::DescriptorSetLayout,
    device: Device,
    bindings: Vec<vk::DescriptorSetLayoutBinding>,
}

impl DescriptorSetLayout {
    /// Get the Vulkan descriptor set layout handle
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    /// Get the bindings used in this layout
    pub fn bindings(&self) -> &[vk::DescriptorSetLayoutBinding] {
        &self.bindings
    }

    /// Whether `binding` is a combined image sampler slot in this layout
    pub fn has_sampler_binding(&self, binding: u32) -> bool {
        self.bindings
            .iter()
            .any(|b| b.binding == binding && b.descriptor_type == vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

/// Descriptor pool for allocating descriptor sets
pub struct DescriptorPool {
    pool: vk::DescriptorPool,
    device: Device,
}

impl DescriptorPool {
    /// Create a pool holding up to `max_sets` sets
    pub fn new(device: &Device, max_sets: u32) -> VulkanResult<Self> {
        let texture_slots = TextureType::ALL.len() as u32;
        let pool_sizes = [
            vk::DescriptorPoolSize::builder()
                .ty(vk::DescriptorType::UNIFORM_BUFFER)
                .descriptor_count(max_sets.saturating_mul(2))
                .build(),
            vk::DescriptorPoolSize::builder()
                .ty(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .descriptor_count(max_sets.saturating_mul(texture_slots))
                .build(),
        ];

        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
            .max_sets(max_sets)
            .pool_sizes(&pool_sizes);

        let pool = unsafe {
            device
                .create_descriptor_pool(&pool_info, None)
                .map_err(VulkanError::creation("descriptor pool"))?
        };

        log::debug!("Created descriptor pool for {} sets", max_sets);
        Ok(Self { pool, device: device.clone() })
    }

    /// Pool sized by `config.descriptor_pool_capacity`
    pub fn from_config(device: &Device, config: &RendererConfig) -> VulkanResult<Self> {
        Self::new(device, config.descriptor_pool_capacity)
    }

    /// Allocate one set with `layout`
    pub fn allocate(&self, layout: &DescriptorSetLayout) -> VulkanResult<vk::DescriptorSet> {
        let layouts = [layout.handle()];
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts);

        unsafe { self.device.allocate_descriptor_sets(&alloc_info) }
            .map_err(VulkanError::creation("descriptor set"))?
            .into_iter()
            .next()
            .ok_or_else(|| VulkanError::invalid("Driver returned no descriptor set"))
    }

    /// Return `set` to the pool
    pub fn free(&self, set: vk::DescriptorSet) -> VulkanResult<()> {
        unsafe { self.device.free_descriptor_sets(self.pool, &[set]) }.map_err(VulkanError::Api)
    }

    /// Reset the descriptor pool (frees all allocated sets)
    pub fn reset(&self) -> VulkanResult<()> {
        unsafe {
            self.device
                .reset_descriptor_pool(self.pool, vk::DescriptorPoolResetFlags::empty())
        }
        .map_err(VulkanError::Api)
    }

    /// Get the pool handle
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_pool(self.pool, None);
        }
    }
}

/// Batched descriptor writes
///
/// Infos are stored before any `WriteDescriptorSet` is built so the pointers
/// handed to the driver stay valid until [`DescriptorWriter::update`].
#[derive(Default)]
pub struct DescriptorWriter {
    images: Vec<(vk::DescriptorSet, u32, vk::DescriptorImageInfo)>,
    buffers: Vec<(vk::DescriptorSet, u32, vk::DescriptorBufferInfo)>,
}

impl DescriptorWriter {
    /// Create an empty writer
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a shader-read-only image and sampler at `binding`
    pub fn write_image(
        mut self,
        descriptor_set: vk::DescriptorSet,
        binding: u32,
        image_view: vk::ImageView,
        sampler: vk::Sampler,
    ) -> Self {
        let info = vk::DescriptorImageInfo {
            sampler,
            image_view,
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        };
        self.images.push((descriptor_set, binding, info));
        self
    }

    /// Write a uniform buffer range at `binding`
    pub fn write_buffer(
        mut self,
        descriptor_set: vk::DescriptorSet,
        binding: u32,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        range: vk::DeviceSize,
    ) -> Self {
        let info = vk::DescriptorBufferInfo { buffer, offset, range };
        self.buffers.push((descriptor_set, binding, info));
        self
    }

    /// Number of pending writes
    pub fn len(&self) -> usize {
        self.images.len() + self.buffers.len()
    }

    /// Whether no writes are pending
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Execute all write operations
    pub fn update(self, device: &Device) {
        let image_writes = self.images.iter().map(|(set, binding, info)| {
            vk::WriteDescriptorSet::builder()
                .dst_set(*set)
                .dst_binding(*binding)
                .dst_array_element(0)
                .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .image_info(std::slice::from_ref(info))
                .build()
        });
        let buffer_writes = self.buffers.iter().map(|(set, binding, info)| {
            vk::WriteDescriptorSet::builder()
                .dst_set(*set)
                .dst_binding(*binding)
                .dst_array_element(0)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .buffer_info(std::slice::from_ref(info))
                .build()
        });
        let writes: Vec<vk::WriteDescriptorSet> = image_writes.chain(buffer_writes).collect();

        unsafe {
            device.update_descriptor_sets(&writes, &[]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_texture_slots_cover_every_type() {
        let builder = DescriptorSetLayoutBuilder::new().add_texture_slots();
        let bindings: Vec<u32> = builder.bindings().iter().map(|b| b.binding).collect();
        assert_eq!(bindings, vec![0, 1, 2, 3, 4]);
        assert!(builder
            .bindings()
            .iter()
            .all(|b| b.descriptor_type == vk::DescriptorType::COMBINED_IMAGE_SAMPLER
                && b.stage_flags == vk::ShaderStageFlags::FRAGMENT));
        assert_eq!(builder.duplicate_binding(), None);
    }

    #[test]
    fn test_duplicate_binding_detected() {
        let builder = DescriptorSetLayoutBuilder::new()
            .add_uniform_buffer(0, vk::ShaderStageFlags::VERTEX)
            .add_texture_slots();
        assert_eq!(builder.duplicate_binding(), Some(0));
    }

    #[test]
    fn test_writer_counts_pending_writes() {
        let writer = DescriptorWriter::new()
            .write_image(vk::DescriptorSet::null(), 1, vk::ImageView::null(), vk::Sampler::null())
            .write_buffer(vk::DescriptorSet::null(), 5, vk::Buffer::null(), 0, 64);
        assert_eq!(writer.len(), 2);
        assert!(DescriptorWriter::new().is_empty());
    }
}
