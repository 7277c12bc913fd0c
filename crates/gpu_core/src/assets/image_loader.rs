//! Image loading utilities for texture data
//!
//! Provides PNG loading for use with the texture system. Decoded pixels are
//! converted to the channel layout the texture asks for.

use std::path::Path;

use image::DynamicImage;

use crate::assets::AssetError;
use crate::render::vulkan::ColorComponents;

/// Loaded image data ready for GPU upload
#[derive(Debug, Clone)]
pub struct ImageData {
    /// Tightly packed pixel data
    pub data: Vec<u8>,
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
    /// Channel layout of `data`
    pub colors: ColorComponents,
}

impl ImageData {
    /// Load an image from a file path
    pub fn from_file<P: AsRef<Path>>(path: P, colors: ColorComponents) -> Result<Self, AssetError> {
        let path_ref = path.as_ref();

        log::debug!("Loading image from: {:?}", path_ref);

        if !path_ref.exists() {
            return Err(AssetError::NotFound(path_ref.display().to_string()));
        }

        let img = image::open(path_ref).map_err(|e| AssetError::LoadFailed(format!("Failed to load image: {e}")))?;
        let data = Self::convert(img, colors);

        log::info!("Loaded image {}x{} from {:?}", data.width, data.height, path_ref);
        Ok(data)
    }

    /// Load image from memory (useful for embedded resources)
    pub fn from_bytes(bytes: &[u8], colors: ColorComponents) -> Result<Self, AssetError> {
        let img = image::load_from_memory(bytes)
            .map_err(|e| AssetError::LoadFailed(format!("Failed to load image from bytes: {e}")))?;
        let data = Self::convert(img, colors);

        log::debug!("Loaded image {}x{} from memory", data.width, data.height);
        Ok(data)
    }

    /// Create a solid color image (useful for testing and defaults)
    pub fn solid_color(width: u32, height: u32, color: [u8; 4]) -> Self {
        let pixel_count = width as usize * height as usize;
        Self {
            data: color.repeat(pixel_count),
            width,
            height,
            colors: ColorComponents::RedGreenBlueAlpha,
        }
    }

    /// Get the size of the image data in bytes
    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }

    /// Check that `data` holds exactly `width * height` pixels of `colors`
    pub fn validate(&self) -> Result<(), AssetError> {
        let expected = self.width as usize * self.height as usize * self.colors.bytes_per_pixel() as usize;
        if self.width == 0 || self.height == 0 {
            return Err(AssetError::InvalidData(format!("Empty image {}x{}", self.width, self.height)));
        }
        if self.data.len() != expected {
            return Err(AssetError::InvalidData(format!(
                "{}x{} {:?} image needs {} bytes, got {}",
                self.width,
                self.height,
                self.colors,
                expected,
                self.data.len()
            )));
        }
        Ok(())
    }

    fn convert(img: DynamicImage, colors: ColorComponents) -> Self {
        let (width, height) = (img.width(), img.height());
        let data = match colors {
            ColorComponents::Grey => img.into_luma8().into_raw(),
            ColorComponents::GreyAlpha => img.into_luma_alpha8().into_raw(),
            ColorComponents::RedGreenBlue => img.into_rgb8().into_raw(),
            ColorComponents::RedGreenBlueAlpha => img.into_rgba8().into_raw(),
        };
        Self { data, width, height, colors }
    }
}
