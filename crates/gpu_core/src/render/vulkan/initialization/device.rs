//! Physical device selection and logical device creation
//!
//! Queue families are deduplicated before device creation and optional
//! features are enabled only when the configuration needs them.

use std::ffi::CStr;

use ash::{vk, Device, Instance};

use super::context::{VulkanError, VulkanResult};
use crate::render::config::RendererConfig;

/// Graphics and presentation queue family indices
///
/// The two families may coincide. Immutable after device creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueSelection {
    /// Family used for graphics and transfer work
    pub graphics_family: u32,
    /// Family used for presentation
    pub present_family: u32,
}

impl QueueSelection {
    /// Selection for a device without a presentation surface
    pub const fn headless(graphics_family: u32) -> Self {
        Self { graphics_family, present_family: graphics_family }
    }

    /// Distinct families to request queues from, graphics first
    pub fn unique_families(&self) -> Vec<u32> {
        let mut families = vec![self.graphics_family];
        if self.present_family != self.graphics_family {
            families.push(self.present_family);
        }
        families
    }
}

/// Physical device selection and capabilities
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle
    pub device: vk::PhysicalDevice,
    /// Device properties and limits
    pub properties: vk::PhysicalDeviceProperties,
    /// Supported device features
    pub features: vk::PhysicalDeviceFeatures,
    /// Memory heaps and types
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Available queue families
    pub queue_families: Vec<vk::QueueFamilyProperties>,
}

impl PhysicalDeviceInfo {
    /// Query everything the resource layer needs about `device`
    pub fn query(instance: &Instance, device: vk::PhysicalDevice) -> Self {
        unsafe {
            Self {
                device,
                properties: instance.get_physical_device_properties(device),
                features: instance.get_physical_device_features(device),
                memory_properties: instance.get_physical_device_memory_properties(device),
                queue_families: instance.get_physical_device_queue_family_properties(device),
            }
        }
    }

    /// Select the first device with a graphics queue, for headless use
    pub fn select_headless(instance: &Instance) -> VulkanResult<(Self, QueueSelection)> {
        let devices = unsafe { instance.enumerate_physical_devices().map_err(VulkanError::Api)? };

        for device in devices {
            let info = Self::query(instance, device);
            if let Some(graphics_family) = info.graphics_family() {
                log::info!("Selected GPU: {}", info.name());
                return Ok((info, QueueSelection::headless(graphics_family)));
            }
        }

        Err(VulkanError::invalid("No GPU with a graphics queue found"))
    }

    /// First queue family supporting graphics
    pub fn graphics_family(&self) -> Option<u32> {
        self.queue_families
            .iter()
            .position(|family| family.queue_flags.contains(vk::QueueFlags::GRAPHICS))
            .and_then(|index| u32::try_from(index).ok())
    }

    /// Device name as reported by the driver
    pub fn name(&self) -> String {
        unsafe { CStr::from_ptr(self.properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned()
    }

    /// Sample counts usable for both color and depth attachments
    pub fn supported_sample_counts(&self) -> vk::SampleCountFlags {
        self.properties.limits.framebuffer_color_sample_counts
            & self.properties.limits.framebuffer_depth_sample_counts
    }
}

/// Device features the configuration actually needs
///
/// Non-solid fill for wireframe/point modes, anisotropy when both requested
/// and available, sample-rate shading when multisampling with per-sample
/// shading. Nothing is enabled unconditionally.
pub fn required_features(config: &RendererConfig, available: &vk::PhysicalDeviceFeatures) -> vk::PhysicalDeviceFeatures {
    let mut features = vk::PhysicalDeviceFeatures::default();

    if config.rendering_mode.requires_non_solid_fill() {
        features.fill_mode_non_solid = vk::TRUE;
    }

    if config.anisotropy && available.sampler_anisotropy == vk::TRUE {
        features.sampler_anisotropy = vk::TRUE;
    }

    if config.sample_shading_active() {
        features.sample_rate_shading = vk::TRUE;
    }

    features
}

/// Logical device wrapper with RAII cleanup
pub struct LogicalDevice {
    /// Vulkan logical device handle
    pub device: Device,
    /// Graphics operations queue
    pub graphics_queue: vk::Queue,
    /// Surface presentation queue
    pub present_queue: vk::Queue,
    /// Queue families the device was created with
    pub queues: QueueSelection,
    /// Features enabled at creation
    pub enabled_features: vk::PhysicalDeviceFeatures,
}

impl LogicalDevice {
    /// Create a new logical device with one queue per unique family
    pub fn new(
        instance: &Instance,
        physical_device: &PhysicalDeviceInfo,
        queues: QueueSelection,
        config: &RendererConfig,
    ) -> VulkanResult<Self> {
        let priorities = [1.0_f32];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = queues
            .unique_families()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&priorities)
                    .build()
            })
            .collect();

        let enabled_features = required_features(config, &physical_device.features);

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_features(&enabled_features);

        let device = unsafe {
            instance
                .create_device(physical_device.device, &create_info, None)
                .map_err(VulkanError::creation("logical device"))?
        };

        let graphics_queue = unsafe { device.get_device_queue(queues.graphics_family, 0) };
        let present_queue = unsafe { device.get_device_queue(queues.present_family, 0) };

        log::debug!(
            "Logical device created (non-solid fill: {}, anisotropy: {}, sample shading: {})",
            enabled_features.fill_mode_non_solid == vk::TRUE,
            enabled_features.sampler_anisotropy == vk::TRUE,
            enabled_features.sample_rate_shading == vk::TRUE
        );

        Ok(Self {
            device,
            graphics_queue,
            present_queue,
            queues,
            enabled_features,
        })
    }
}

impl Drop for LogicalDevice {
    fn drop(&mut self) {
        unsafe {
            // Ensure device is idle before destruction
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
        }
    }
}
