//! Texture samplers
//!
//! A [`Sampler`] is created once by the renderer and shared by reference with
//! every texture build; textures never own it.

use ash::{vk, Device};

use crate::render::config::RendererConfig;
use crate::render::vulkan::{GpuContext, VulkanError, VulkanResult};

/// Sampler parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerSettings {
    /// Request anisotropic filtering
    pub anisotropy: bool,
    /// Requested anisotropy, clamped to the device limit
    pub max_anisotropy: f32,
    /// Highest mip level that may be sampled, unbounded by default
    pub max_lod: f32,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self {
            anisotropy: true,
            max_anisotropy: 16.0,
            max_lod: vk::LOD_CLAMP_NONE,
        }
    }
}

impl SamplerSettings {
    /// Settings from the renderer configuration capped at `mip_levels` levels
    #[allow(clippy::cast_precision_loss)]
    pub fn from_config(config: &RendererConfig, mip_levels: u32) -> Self {
        Self {
            anisotropy: config.anisotropy,
            max_anisotropy: config.max_anisotropy,
            max_lod: mip_levels.max(1) as f32,
        }
    }

    /// Anisotropy actually applied, `None` when disabled
    ///
    /// Disabled when not requested or when the feature was not enabled on the
    /// device; otherwise clamped to `[1, device_limit]`.
    pub fn effective_anisotropy(&self, feature_enabled: bool, device_limit: f32) -> Option<f32> {
        (self.anisotropy && feature_enabled).then(|| self.max_anisotropy.clamp(1.0, device_limit.max(1.0)))
    }

    fn create_info(&self, anisotropy: Option<f32>) -> vk::SamplerCreateInfo {
        vk::SamplerCreateInfo::builder()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .anisotropy_enable(anisotropy.is_some())
            .max_anisotropy(anisotropy.unwrap_or(1.0))
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .unnormalized_coordinates(false)
            .compare_enable(false)
            .compare_op(vk::CompareOp::ALWAYS)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .mip_lod_bias(0.0)
            .min_lod(0.0)
            .max_lod(self.max_lod)
            .build()
    }
}

/// Sampler with RAII cleanup
pub struct Sampler {
    device: Device,
    sampler: vk::Sampler,
    settings: SamplerSettings,
}

impl Sampler {
    /// Create a sampler on `context`
    pub fn new(context: &GpuContext, settings: SamplerSettings) -> VulkanResult<Self> {
        let anisotropy = settings.effective_anisotropy(
            context.enabled_features().sampler_anisotropy == vk::TRUE,
            context.limits().max_sampler_anisotropy,
        );
        let create_info = settings.create_info(anisotropy);

        let sampler = unsafe {
            context
                .device()
                .create_sampler(&create_info, None)
                .map_err(VulkanError::creation("sampler"))?
        };

        log::debug!("Created sampler (anisotropy: {:?}, max lod: {})", anisotropy, settings.max_lod);

        Ok(Self {
            device: context.device().clone(),
            sampler,
            settings,
        })
    }

    /// Sampler handle
    pub fn handle(&self) -> vk::Sampler {
        self.sampler
    }

    /// Settings the sampler was created with
    pub fn settings(&self) -> &SamplerSettings {
        &self.settings
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_sampler(self.sampler, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_anisotropy_clamped_to_device_limit() {
        let settings = SamplerSettings { max_anisotropy: 16.0, ..SamplerSettings::default() };
        let applied = settings.effective_anisotropy(true, 8.0).unwrap();
        assert_relative_eq!(applied, 8.0);
    }

    #[test]
    fn test_anisotropy_disabled_without_feature() {
        assert_eq!(SamplerSettings::default().effective_anisotropy(false, 16.0), None);
        let off = SamplerSettings { anisotropy: false, ..SamplerSettings::default() };
        assert_eq!(off.effective_anisotropy(true, 16.0), None);
    }

    #[test]
    fn test_create_info_linear_repeat() {
        let settings = SamplerSettings::from_config(&RendererConfig::default(), 11);
        let info = settings.create_info(None);
        assert_eq!(info.mag_filter, vk::Filter::LINEAR);
        assert_eq!(info.min_filter, vk::Filter::LINEAR);
        assert_eq!(info.address_mode_u, vk::SamplerAddressMode::REPEAT);
        assert_eq!(info.anisotropy_enable, vk::FALSE);
        assert_relative_eq!(info.max_lod, 11.0);
        assert_relative_eq!(info.max_anisotropy, 1.0);
    }

    #[test]
    fn test_default_reaches_every_generated_level() {
        assert_eq!(crate::render::vulkan::resources::mipmap::mip_level_count(1024, 1024, true), 11);
        let info = SamplerSettings::default().create_info(None);
        assert!(info.max_lod >= 10.0);
        assert_relative_eq!(info.max_lod, vk::LOD_CLAMP_NONE);
    }
}
