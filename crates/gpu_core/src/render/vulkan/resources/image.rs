//! GPU-resident 2D images
//!
//! An [`Image`] owns its handle, its memory and an optional view. The layout
//! of every mip level is tracked, and barriers are always recorded from the
//! tracked layout, never an assumed one.

use ash::{vk, Device};

use super::memory::MemoryBlock;
use super::mipmap;
use crate::render::vulkan::rendering::commands::CommandSink;
use crate::render::vulkan::state::{ImageLayout, LayoutTracker, MipRange};
use crate::render::vulkan::{GpuContext, VulkanError, VulkanResult};

/// Parameters of a 2D image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageSpec {
    /// Width of level 0
    pub width: u32,
    /// Height of level 0
    pub height: u32,
    /// Number of mip levels
    pub mip_levels: u32,
    /// Pixel format
    pub format: vk::Format,
    /// Usage flags
    pub usage: vk::ImageUsageFlags,
    /// Required memory properties
    pub memory_properties: vk::MemoryPropertyFlags,
}

impl ImageSpec {
    /// Device-local sampled image that is filled by transfers and blits
    pub const fn sampled_texture(width: u32, height: u32, mip_levels: u32, format: vk::Format) -> Self {
        Self {
            width,
            height,
            mip_levels,
            format,
            usage: vk::ImageUsageFlags::from_raw(
                vk::ImageUsageFlags::TRANSFER_SRC.as_raw()
                    | vk::ImageUsageFlags::TRANSFER_DST.as_raw()
                    | vk::ImageUsageFlags::SAMPLED.as_raw(),
            ),
            memory_properties: vk::MemoryPropertyFlags::DEVICE_LOCAL,
        }
    }

    fn validate(&self) -> VulkanResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(VulkanError::invalid(format!(
                "Image extent {}x{} must be non-zero",
                self.width, self.height
            )));
        }
        let max_levels = mipmap::mip_level_count(self.width, self.height, true);
        if self.mip_levels == 0 || self.mip_levels > max_levels {
            return Err(VulkanError::invalid(format!(
                "{} mip levels requested, {}x{} allows 1..={}",
                self.mip_levels, self.width, self.height, max_levels
            )));
        }
        Ok(())
    }
}

/// Device image with tracked per-level layouts
pub struct Image {
    device: Device,
    image: vk::Image,
    memory: MemoryBlock,
    view: Option<vk::ImageView>,
    width: u32,
    height: u32,
    mip_levels: u32,
    format: vk::Format,
    layouts: LayoutTracker,
}

impl Image {
    /// Create the image and bind freshly allocated memory
    pub fn new(context: &GpuContext, spec: &ImageSpec) -> VulkanResult<Self> {
        spec.validate()?;

        let device = context.device();
        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: spec.width,
                height: spec.height,
                depth: 1,
            })
            .mip_levels(spec.mip_levels)
            .array_layers(1)
            .format(spec.format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(spec.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .samples(vk::SampleCountFlags::TYPE_1);

        let image = unsafe {
            device
                .create_image(&image_info, None)
                .map_err(VulkanError::creation("image"))?
        };

        let requirements = unsafe { device.get_image_memory_requirements(image) };
        let memory = match MemoryBlock::allocate(context, requirements, spec.memory_properties) {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.destroy_image(image, None) };
                return Err(e);
            }
        };

        if let Err(result) = unsafe { device.bind_image_memory(image, memory.handle(), 0) } {
            unsafe { device.destroy_image(image, None) };
            return Err(VulkanError::Api(result));
        }

        log::debug!(
            "Created {}x{} image ({:?}, {} mip levels)",
            spec.width,
            spec.height,
            spec.format,
            spec.mip_levels
        );

        Ok(Self {
            device: device.clone(),
            image,
            memory,
            view: None,
            width: spec.width,
            height: spec.height,
            mip_levels: spec.mip_levels,
            format: spec.format,
            layouts: LayoutTracker::new(spec.mip_levels),
        })
    }

    /// Record a barrier moving `range` to `new_layout`
    pub fn transition_layout(
        &mut self,
        commands: &mut impl CommandSink,
        range: MipRange,
        new_layout: ImageLayout,
    ) -> VulkanResult<()> {
        let transition = self.layouts.transition(range, new_layout)?;
        commands.image_barrier(self.image, &transition, range);
        Ok(())
    }

    /// Record a barrier moving every level to `new_layout`
    pub fn transition_all(&mut self, commands: &mut impl CommandSink, new_layout: ImageLayout) -> VulkanResult<()> {
        self.transition_layout(commands, MipRange::all(self.mip_levels), new_layout)
    }

    /// Record blits filling levels 1.. from level 0
    ///
    /// All levels must be in TransferDestination; afterwards all are
    /// ShaderReadOnly. The caller is responsible for having checked linear
    /// blit support of the format.
    pub fn generate_mipmaps(&mut self, commands: &mut impl CommandSink) -> VulkanResult<()> {
        let extent = self.extent();
        mipmap::record_mip_chain(commands, self.image, extent, &mut self.layouts)
    }

    /// Create the view over all mip levels of `aspect`
    ///
    /// Replaces any previously created view.
    pub fn generate_image_view(&mut self, aspect: vk::ImageAspectFlags) -> VulkanResult<vk::ImageView> {
        let view_info = vk::ImageViewCreateInfo::builder()
            .image(self.image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(self.format)
            .subresource_range(MipRange::all(self.mip_levels).subresource_range(aspect));

        let view = unsafe {
            self.device
                .create_image_view(&view_info, None)
                .map_err(VulkanError::creation("image view"))?
        };

        if let Some(old) = self.view.replace(view) {
            unsafe { self.device.destroy_image_view(old, None) };
        }
        Ok(view)
    }

    /// Image handle
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    /// View created by [`Image::generate_image_view`]
    pub fn view(&self) -> Option<vk::ImageView> {
        self.view
    }

    /// Width of level 0
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height of level 0
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Extent of level 0
    pub fn extent(&self) -> vk::Extent2D {
        vk::Extent2D { width: self.width, height: self.height }
    }

    /// Number of mip levels
    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }

    /// Pixel format
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Tracked layouts
    pub fn layouts(&self) -> &LayoutTracker {
        &self.layouts
    }

    /// Backing memory
    pub fn memory(&self) -> &MemoryBlock {
        &self.memory
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        unsafe {
            if let Some(view) = self.view.take() {
                self.device.destroy_image_view(view, None);
            }
            self.device.destroy_image(self.image, None);
        }
        log::trace!("Destroyed {}x{} image", self.width, self.height);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sampled_texture_usage() {
        let spec = ImageSpec::sampled_texture(64, 32, 7, vk::Format::R8G8B8A8_SRGB);
        assert!(spec.usage.contains(vk::ImageUsageFlags::TRANSFER_SRC));
        assert!(spec.usage.contains(vk::ImageUsageFlags::TRANSFER_DST));
        assert!(spec.usage.contains(vk::ImageUsageFlags::SAMPLED));
        assert_eq!(spec.memory_properties, vk::MemoryPropertyFlags::DEVICE_LOCAL);
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_extent() {
        let spec = ImageSpec::sampled_texture(0, 32, 1, vk::Format::R8G8B8A8_SRGB);
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_rejects_too_many_levels() {
        let spec = ImageSpec::sampled_texture(4, 4, 4, vk::Format::R8G8B8A8_SRGB);
        assert!(spec.validate().is_err());
        let spec = ImageSpec::sampled_texture(4, 4, 0, vk::Format::R8G8B8A8_SRGB);
        assert!(spec.validate().is_err());
    }
}
