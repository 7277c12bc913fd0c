//! Vulkan texture management
//!
//! A [`Texture`] is a device-local image with a full mip chain, a view over
//! its color aspect and one descriptor set binding it together with a shared
//! sampler. Textures are built in one call from [`TextureSettings`] and are
//! immutable afterwards, except for their display name.
//!
//! Everything that can be rejected without touching the device (dimensions,
//! byte count, format support, binding slot) is checked in [`TexturePlan`]
//! before the first allocation. Later failures release whatever was already
//! created on the way out.

use std::path::Path;

use ash::vk;

use super::buffer::StagingBuffer;
use super::descriptor_set::{DescriptorPool, DescriptorSetLayout, DescriptorWriter};
use super::format::{texture_memory_size, ColorComponents, TextureType};
use super::image::{Image, ImageSpec};
use super::mipmap::{ensure_linear_blit, mip_level_count};
use super::sampler::Sampler;
use crate::assets::ImageData;
use crate::render::config::RendererConfig;
use crate::render::vulkan::initialization::context::FormatSupport;
use crate::render::vulkan::state::ImageLayout;
use crate::render::vulkan::{GpuContext, VulkanError, VulkanResult};

/// Options for building a texture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureSettings {
    /// Display name; file builds default to the path
    pub name: Option<String>,
    /// Role, which selects the descriptor binding slot
    pub texture_type: TextureType,
    /// Channel layout of the supplied bytes
    pub colors: ColorComponents,
    /// Generate a full mip chain
    pub generate_mipmaps: bool,
}

impl Default for TextureSettings {
    fn default() -> Self {
        Self {
            name: None,
            texture_type: TextureType::Diffuse,
            colors: ColorComponents::RedGreenBlueAlpha,
            generate_mipmaps: true,
        }
    }
}

impl TextureSettings {
    /// Default settings with mip generation taken from `config`
    pub fn from_config(config: &RendererConfig) -> Self {
        Self {
            generate_mipmaps: config.generate_mipmaps,
            ..Self::default()
        }
    }
}

/// Renderer-owned objects a texture binds against
///
/// Borrowed for the duration of a build only.
#[derive(Clone, Copy)]
pub struct TextureBindings<'a> {
    /// Shared sampler written into the descriptor
    pub sampler: &'a Sampler,
    /// Layout the descriptor set is allocated with
    pub descriptor_set_layout: &'a DescriptorSetLayout,
    /// Pool the descriptor set is allocated from
    pub descriptor_pool: &'a DescriptorPool,
}

/// Validated parameters of one texture build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TexturePlan {
    /// Width of level 0
    pub width: u32,
    /// Height of level 0
    pub height: u32,
    /// Image format
    pub format: vk::Format,
    /// Number of mip levels
    pub mip_levels: u32,
    /// Bytes of the level 0 upload
    pub memory_size: vk::DeviceSize,
    /// Descriptor binding slot
    pub binding: u32,
}

impl TexturePlan {
    /// Check everything that can be checked before allocating
    pub fn new(
        settings: &TextureSettings,
        width: u32,
        height: u32,
        byte_len: usize,
        formats: &impl FormatSupport,
    ) -> VulkanResult<Self> {
        if width == 0 || height == 0 {
            return Err(VulkanError::Decode(format!("Texture extent {width}x{height} is empty")));
        }

        let memory_size = texture_memory_size(width, height, settings.colors);
        if byte_len as vk::DeviceSize != memory_size {
            return Err(VulkanError::Decode(format!(
                "{width}x{height} {:?} texture needs {memory_size} bytes, got {byte_len}",
                settings.colors
            )));
        }

        let format = settings.colors.format();
        let features = formats.optimal_tiling_features(format);
        if !features.contains(vk::FormatFeatureFlags::SAMPLED_IMAGE) {
            return Err(VulkanError::UnsupportedFormat {
                format,
                reason: "format cannot be sampled with optimal tiling".to_string(),
            });
        }
        if settings.generate_mipmaps {
            ensure_linear_blit(features, format)?;
        }

        Ok(Self {
            width,
            height,
            format,
            mip_levels: mip_level_count(width, height, settings.generate_mipmaps),
            memory_size,
            binding: settings.texture_type.binding(),
        })
    }
}

/// Sampled texture with its descriptor set
pub struct Texture {
    name: String,
    texture_type: TextureType,
    colors: ColorComponents,
    sampler: vk::Sampler,
    descriptor_pool: vk::DescriptorPool,
    descriptor_set: vk::DescriptorSet,
    memory_size: vk::DeviceSize,
    image: Image,
}

impl Texture {
    /// Build a texture from tightly packed pixel bytes
    ///
    /// Blocks until the upload and mip generation have finished on the
    /// device.
    pub fn build(
        context: &GpuContext,
        settings: &TextureSettings,
        bindings: &TextureBindings<'_>,
        width: u32,
        height: u32,
        bytes: &[u8],
    ) -> VulkanResult<Self> {
        let plan = TexturePlan::new(settings, width, height, bytes.len(), context)?;
        if !bindings.descriptor_set_layout.has_sampler_binding(plan.binding) {
            return Err(VulkanError::invalid(format!(
                "Descriptor set layout has no sampler at binding {} for {:?}",
                plan.binding, settings.texture_type
            )));
        }

        let name = settings.name.clone().unwrap_or_else(|| format!("{:?} texture", settings.texture_type));
        log::debug!(
            "Building texture '{}' {}x{} ({:?}, {} mip levels)",
            name,
            width,
            height,
            plan.format,
            plan.mip_levels
        );

        let staging = StagingBuffer::with_bytes(context, bytes)?;
        let mut image = Image::new(
            context,
            &ImageSpec::sampled_texture(width, height, plan.mip_levels, plan.format),
        )?;

        {
            let mut commands = context.begin_one_time_commands()?;
            image.transition_all(&mut commands, ImageLayout::TransferDestination)?;
            staging.copy_to_image(&mut commands, &image)?;
            image.generate_mipmaps(&mut commands)?;
            commands.submit_and_wait()?;
        }
        drop(staging);

        let view = image.generate_image_view(vk::ImageAspectFlags::COLOR)?;

        let descriptor_set = bindings.descriptor_pool.allocate(bindings.descriptor_set_layout)?;
        DescriptorWriter::new()
            .write_image(descriptor_set, plan.binding, view, bindings.sampler.handle())
            .update(context.device());

        log::info!("Texture '{}' ready ({} bytes)", name, plan.memory_size);

        Ok(Self {
            name,
            texture_type: settings.texture_type,
            colors: settings.colors,
            sampler: bindings.sampler.handle(),
            descriptor_pool: bindings.descriptor_pool.handle(),
            descriptor_set,
            memory_size: plan.memory_size,
            image,
        })
    }

    /// Decode `path` and build a texture from it
    ///
    /// The path becomes the texture name unless `settings` names it.
    pub fn build_from_file<P: AsRef<Path>>(
        context: &GpuContext,
        settings: &TextureSettings,
        bindings: &TextureBindings<'_>,
        path: P,
    ) -> VulkanResult<Self> {
        let path = path.as_ref();
        let data = ImageData::from_file(path, settings.colors)?;

        let settings = TextureSettings {
            name: settings.name.clone().or_else(|| Some(path.display().to_string())),
            ..settings.clone()
        };
        Self::build(context, &settings, bindings, data.width, data.height, &data.data)
    }

    /// 1x1 texture holding the neutral value for `texture_type`
    pub fn placeholder(
        context: &GpuContext,
        bindings: &TextureBindings<'_>,
        texture_type: TextureType,
    ) -> VulkanResult<Self> {
        let settings = TextureSettings {
            name: Some(format!("placeholder {texture_type:?}")),
            texture_type,
            colors: ColorComponents::RedGreenBlueAlpha,
            generate_mipmaps: false,
        };
        Self::build(context, &settings, bindings, 1, 1, &texture_type.placeholder_pixel())
    }

    /// Display name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rename the texture
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Role of the texture
    pub fn texture_type(&self) -> TextureType {
        self.texture_type
    }

    /// Channel layout of the source pixels
    pub fn colors(&self) -> ColorComponents {
        self.colors
    }

    /// Width of level 0
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Height of level 0
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Number of mip levels
    pub fn mip_levels(&self) -> u32 {
        self.image.mip_levels()
    }

    /// Bytes uploaded for level 0
    pub fn memory_size(&self) -> vk::DeviceSize {
        self.memory_size
    }

    /// Descriptor set binding this texture
    pub fn handle(&self) -> vk::DescriptorSet {
        self.descriptor_set
    }

    /// Binding slot inside [`Texture::handle`]
    pub fn binding(&self) -> u32 {
        self.texture_type.binding()
    }

    /// Shared sampler written into the descriptor
    pub fn sampler(&self) -> vk::Sampler {
        self.sampler
    }

    /// Underlying image
    pub fn image(&self) -> &Image {
        &self.image
    }

    /// Destroy the texture and return its descriptor set to `pool`
    ///
    /// The device must no longer be using the set. Dropping without retiring
    /// leaves the set allocated until the pool is reset.
    pub fn retire(self, pool: &DescriptorPool) -> VulkanResult<()> {
        if pool.handle() != self.descriptor_pool {
            return Err(VulkanError::invalid(format!(
                "Texture '{}' was not allocated from this descriptor pool",
                self.name
            )));
        }
        pool.free(self.descriptor_set)
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        // the descriptor set belongs to the renderer's pool
        log::debug!("Dropping texture '{}'", self.name);
    }
}
