//! Asset decoding
//!
//! Turns encoded image files into tightly packed pixel bytes for texture
//! uploads.

pub mod image_loader;

pub use image_loader::ImageData;

use thiserror::Error;

use crate::render::vulkan::VulkanError;

/// Asset-related errors
#[derive(Error, Debug)]
pub enum AssetError {
    /// Asset not found
    #[error("Asset not found: {0}")]
    NotFound(String),

    /// Failed to load asset
    #[error("Failed to load asset: {0}")]
    LoadFailed(String),

    /// Invalid asset data
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// IO error during asset loading
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<AssetError> for VulkanError {
    fn from(err: AssetError) -> Self {
        Self::Decode(err.to_string())
    }
}
