//! Pixel layout and texture role tables
//!
//! Both tables are total over their enums. Conversions from raw values
//! (channel counts, binding slots) are checked and fail instead of falling
//! back to a default.

use ash::vk;
use serde::{Deserialize, Serialize};

use crate::render::vulkan::{VulkanError, VulkanResult};

/// Channel layout of 8-bit sRGB pixel data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ColorComponents {
    /// One luminance channel
    Grey,
    /// Luminance and alpha
    GreyAlpha,
    /// Three color channels
    RedGreenBlue,
    /// Three color channels and alpha
    #[default]
    RedGreenBlueAlpha,
}

impl ColorComponents {
    /// All layouts, ordered by channel count
    pub const ALL: [Self; 4] = [Self::Grey, Self::GreyAlpha, Self::RedGreenBlue, Self::RedGreenBlueAlpha];

    /// Bytes occupied by one pixel
    pub const fn bytes_per_pixel(self) -> u32 {
        match self {
            Self::Grey => 1,
            Self::GreyAlpha => 2,
            Self::RedGreenBlue => 3,
            Self::RedGreenBlueAlpha => 4,
        }
    }

    /// Native image format
    pub const fn format(self) -> vk::Format {
        match self {
            Self::Grey => vk::Format::R8_SRGB,
            Self::GreyAlpha => vk::Format::R8G8_SRGB,
            Self::RedGreenBlue => vk::Format::R8G8B8_SRGB,
            Self::RedGreenBlueAlpha => vk::Format::R8G8B8A8_SRGB,
        }
    }

    /// Layout whose native format is `format`
    pub fn from_format(format: vk::Format) -> Option<Self> {
        Self::ALL.into_iter().find(|colors| colors.format() == format)
    }

    /// Layout with `channels` channels
    pub fn from_channel_count(channels: u32) -> VulkanResult<Self> {
        match channels {
            1 => Ok(Self::Grey),
            2 => Ok(Self::GreyAlpha),
            3 => Ok(Self::RedGreenBlue),
            4 => Ok(Self::RedGreenBlueAlpha),
            other => Err(VulkanError::Decode(format!("Unsupported channel count {other}"))),
        }
    }
}

/// Semantic role of a texture in a material
///
/// The role selects the descriptor binding slot the texture is written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TextureType {
    /// Unassigned role, slot 0
    None,
    /// Base color
    #[default]
    Diffuse,
    /// Specular intensity
    Specular,
    /// Tangent-space normal map
    Normal,
    /// Height/displacement map
    Height,
}

impl TextureType {
    /// All roles in binding order
    pub const ALL: [Self; 5] = [Self::None, Self::Diffuse, Self::Specular, Self::Normal, Self::Height];

    /// Descriptor binding slot for this role
    pub const fn binding(self) -> u32 {
        match self {
            Self::None => 0,
            Self::Diffuse => 1,
            Self::Specular => 2,
            Self::Normal => 3,
            Self::Height => 4,
        }
    }

    /// Role bound at `binding`
    pub fn from_binding(binding: u32) -> VulkanResult<Self> {
        Self::ALL
            .into_iter()
            .find(|texture_type| texture_type.binding() == binding)
            .ok_or_else(|| VulkanError::invalid(format!("No texture type for binding {binding}")))
    }

    /// Neutral RGBA value used for 1x1 placeholders
    pub const fn placeholder_pixel(self) -> [u8; 4] {
        match self {
            Self::None | Self::Diffuse | Self::Specular => [255, 255, 255, 255],
            Self::Normal => [128, 128, 255, 255],
            Self::Height => [0, 0, 0, 255],
        }
    }
}

/// Bytes needed for a `width` x `height` base level in `colors`
pub const fn texture_memory_size(width: u32, height: u32, colors: ColorComponents) -> vk::DeviceSize {
    width as vk::DeviceSize * height as vk::DeviceSize * colors.bytes_per_pixel() as vk::DeviceSize
}

/// Bytes a buffer must hold to fill level 0 of an image
pub fn image_upload_size(extent: vk::Extent2D, format: vk::Format) -> VulkanResult<vk::DeviceSize> {
    let colors = ColorComponents::from_format(format).ok_or_else(|| VulkanError::UnsupportedFormat {
        format,
        reason: "no known texel size for buffer uploads".to_string(),
    })?;
    Ok(texture_memory_size(extent.width, extent.height, colors))
}
