//! Renderer configuration for application-specific settings
//!
//! Applications describe how the renderer should rasterize and which optional
//! device features it may use. The configuration is passed explicitly to the
//! device bootstrap and to the pipeline assembler; nothing reads it globally.

use std::path::PathBuf;

use ash::vk;
use serde::{Deserialize, Serialize};

use crate::config::Config;

/// How polygons are rasterized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderingMode {
    /// Solid triangles
    #[default]
    Fill,
    /// Triangle edges only
    Wireframe,
    /// Triangle vertices only
    Point,
}

impl RenderingMode {
    /// Native polygon mode for this rendering mode
    pub const fn polygon_mode(self) -> vk::PolygonMode {
        match self {
            Self::Fill => vk::PolygonMode::FILL,
            Self::Wireframe => vk::PolygonMode::LINE,
            Self::Point => vk::PolygonMode::POINT,
        }
    }

    /// Whether this mode needs the `fillModeNonSolid` device feature
    pub const fn requires_non_solid_fill(self) -> bool {
        !matches!(self, Self::Fill)
    }
}

/// Multisample count used for rasterization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum SampleCount {
    /// No multisampling
    #[default]
    X1,
    /// 2 samples per pixel
    X2,
    /// 4 samples per pixel
    X4,
    /// 8 samples per pixel
    X8,
    /// 16 samples per pixel
    X16,
    /// 32 samples per pixel
    X32,
    /// 64 samples per pixel
    X64,
}

impl SampleCount {
    /// Native sample count flag
    pub const fn as_vk(self) -> vk::SampleCountFlags {
        match self {
            Self::X1 => vk::SampleCountFlags::TYPE_1,
            Self::X2 => vk::SampleCountFlags::TYPE_2,
            Self::X4 => vk::SampleCountFlags::TYPE_4,
            Self::X8 => vk::SampleCountFlags::TYPE_8,
            Self::X16 => vk::SampleCountFlags::TYPE_16,
            Self::X32 => vk::SampleCountFlags::TYPE_32,
            Self::X64 => vk::SampleCountFlags::TYPE_64,
        }
    }

    /// Number of samples per pixel
    pub const fn samples(self) -> u32 {
        match self {
            Self::X1 => 1,
            Self::X2 => 2,
            Self::X4 => 4,
            Self::X8 => 8,
            Self::X16 => 16,
            Self::X32 => 32,
            Self::X64 => 64,
        }
    }

    /// True when more than one sample per pixel is rasterized
    pub const fn is_multisampled(self) -> bool {
        !matches!(self, Self::X1)
    }

    /// Highest supported count not above `self`
    ///
    /// `supported` is the intersection of the device's color and depth
    /// framebuffer sample count limits.
    pub fn clamp_to(self, supported: vk::SampleCountFlags) -> Self {
        const DESCENDING: [SampleCount; 7] = [
            SampleCount::X64,
            SampleCount::X32,
            SampleCount::X16,
            SampleCount::X8,
            SampleCount::X4,
            SampleCount::X2,
            SampleCount::X1,
        ];

        DESCENDING
            .into_iter()
            .filter(|count| count.samples() <= self.samples())
            .find(|count| supported.contains(count.as_vk()))
            .unwrap_or(Self::X1)
    }
}

impl TryFrom<u32> for SampleCount {
    type Error = String;

    fn try_from(samples: u32) -> Result<Self, Self::Error> {
        match samples {
            1 => Ok(Self::X1),
            2 => Ok(Self::X2),
            4 => Ok(Self::X4),
            8 => Ok(Self::X8),
            16 => Ok(Self::X16),
            32 => Ok(Self::X32),
            64 => Ok(Self::X64),
            other => Err(format!("unsupported sample count {other}; expected a power of two from 1 to 64")),
        }
    }
}

impl From<SampleCount> for u32 {
    fn from(count: SampleCount) -> Self {
        count.samples()
    }
}

/// Configuration for the renderer's resource and pipeline layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Application name for Vulkan instance creation
    pub application_name: String,
    /// Polygon rasterization mode
    pub rendering_mode: RenderingMode,
    /// MSAA sample count
    pub msaa_samples: SampleCount,
    /// Per-sample shading when multisampling
    pub sample_shading: bool,
    /// Use anisotropic filtering when the device supports it
    pub anisotropy: bool,
    /// Upper bound for anisotropic filtering, clamped to the device limit
    pub max_anisotropy: f32,
    /// Generate full mip chains for textures by default
    pub generate_mipmaps: bool,
    /// Directory containing compiled SPIR-V shaders
    pub shader_directory: PathBuf,
    /// Vertex shader file, relative to `shader_directory`
    pub vertex_shader: PathBuf,
    /// Fragment shader file, relative to `shader_directory`
    pub fragment_shader: PathBuf,
    /// Number of descriptor sets the renderer's pool can hand out
    pub descriptor_pool_capacity: u32,
    /// Whether to enable Vulkan validation layers
    pub enable_validation: Option<bool>,
}

impl RendererConfig {
    /// Create a new renderer configuration
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            application_name: app_name.into(),
            rendering_mode: RenderingMode::Fill,
            msaa_samples: SampleCount::X1,
            sample_shading: false,
            anisotropy: true,
            max_anisotropy: 16.0,
            generate_mipmaps: true,
            shader_directory: PathBuf::from("Shaders"),
            vertex_shader: PathBuf::from("shader.vert.spv"),
            fragment_shader: PathBuf::from("shader.frag.spv"),
            descriptor_pool_capacity: 256,
            enable_validation: None, // Auto-detect based on debug build
        }
    }

    /// Set rendering mode
    pub fn with_rendering_mode(mut self, mode: RenderingMode) -> Self {
        self.rendering_mode = mode;
        self
    }

    /// Set MSAA sample count and per-sample shading
    pub fn with_multisampling(mut self, samples: SampleCount, sample_shading: bool) -> Self {
        self.msaa_samples = samples;
        self.sample_shading = sample_shading;
        self
    }

    /// Set custom shader paths
    pub fn with_shader_paths(mut self, vertex_path: impl Into<PathBuf>, fragment_path: impl Into<PathBuf>) -> Self {
        self.vertex_shader = vertex_path.into();
        self.fragment_shader = fragment_path.into();
        self
    }

    /// Enable or disable Vulkan validation layers
    pub fn with_validation(mut self, enable: bool) -> Self {
        self.enable_validation = Some(enable);
        self
    }

    /// Full path to the vertex shader binary
    pub fn vertex_shader_path(&self) -> PathBuf {
        self.shader_directory.join(&self.vertex_shader)
    }

    /// Full path to the fragment shader binary
    pub fn fragment_shader_path(&self) -> PathBuf {
        self.shader_directory.join(&self.fragment_shader)
    }

    /// Whether per-sample shading is actually in effect
    ///
    /// Sample shading only applies when more than one sample is rasterized.
    pub const fn sample_shading_active(&self) -> bool {
        self.sample_shading && self.msaa_samples.is_multisampled()
    }

    /// Validation layers requested, resolving the build-type default
    pub fn validation_enabled(&self) -> bool {
        self.enable_validation.unwrap_or(cfg!(debug_assertions))
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self::new("GPU Core Application")
    }
}

impl Config for RendererConfig {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_shader_paths() {
        let config = RendererConfig::default();
        assert_eq!(config.vertex_shader_path(), PathBuf::from("Shaders/shader.vert.spv"));
        assert_eq!(config.fragment_shader_path(), PathBuf::from("Shaders/shader.frag.spv"));
    }

    #[test]
    fn test_polygon_mode_mapping() {
        assert_eq!(RenderingMode::Fill.polygon_mode(), vk::PolygonMode::FILL);
        assert_eq!(RenderingMode::Wireframe.polygon_mode(), vk::PolygonMode::LINE);
        assert_eq!(RenderingMode::Point.polygon_mode(), vk::PolygonMode::POINT);
        assert!(!RenderingMode::Fill.requires_non_solid_fill());
        assert!(RenderingMode::Point.requires_non_solid_fill());
    }

    #[test]
    fn test_sample_count_conversion() {
        assert_eq!(SampleCount::try_from(4).unwrap(), SampleCount::X4);
        assert!(SampleCount::try_from(3).is_err());
        assert_eq!(u32::from(SampleCount::X16), 16);
        assert_eq!(SampleCount::X8.as_vk(), vk::SampleCountFlags::TYPE_8);
    }

    #[test]
    fn test_sample_count_clamps_to_device_support() {
        let supported = vk::SampleCountFlags::TYPE_1 | vk::SampleCountFlags::TYPE_2 | vk::SampleCountFlags::TYPE_4;
        assert_eq!(SampleCount::X8.clamp_to(supported), SampleCount::X4);
        assert_eq!(SampleCount::X2.clamp_to(supported), SampleCount::X2);
        assert_eq!(SampleCount::X4.clamp_to(vk::SampleCountFlags::empty()), SampleCount::X1);
    }

    #[test]
    fn test_sample_shading_requires_multisampling() {
        let config = RendererConfig::default().with_multisampling(SampleCount::X1, true);
        assert!(!config.sample_shading_active());

        let config = config.with_multisampling(SampleCount::X4, true);
        assert!(config.sample_shading_active());
    }

    #[test]
    fn test_toml_round_trip_keeps_mode_and_samples() {
        let config = RendererConfig::default()
            .with_rendering_mode(RenderingMode::Wireframe)
            .with_multisampling(SampleCount::X4, true);

        let text = toml::to_string_pretty(&config).unwrap();
        assert!(text.contains("rendering_mode = \"wireframe\""));
        assert!(text.contains("msaa_samples = 4"));

        let parsed = RendererConfig::from_toml_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_partial_ron_uses_defaults() {
        let parsed = RendererConfig::from_ron_str("(rendering_mode: point, msaa_samples: 2)").unwrap();
        assert_eq!(parsed.rendering_mode, RenderingMode::Point);
        assert_eq!(parsed.msaa_samples, SampleCount::X2);
        assert!(parsed.generate_mipmaps);
        assert_eq!(parsed.descriptor_pool_capacity, 256);
    }

    #[test]
    fn test_rejects_invalid_sample_count() {
        assert!(RendererConfig::from_toml_str("msaa_samples = 3").is_err());
    }
}
