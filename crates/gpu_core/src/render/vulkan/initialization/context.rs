//! Vulkan context management
//!
//! [`GpuContext`] bundles the logical device, queues, the single-use command
//! pool and allocation statistics. It is handed explicitly to every builder
//! in the crate; there is no process-wide device.

use std::sync::Arc;

use ash::{vk, Device, Instance};
use thiserror::Error;

use super::device::{LogicalDevice, PhysicalDeviceInfo, QueueSelection};
use super::instance::VulkanInstance;
use crate::render::config::RendererConfig;
use crate::render::vulkan::rendering::commands::{CommandPool, OneTimeCommands};
use crate::render::vulkan::resources::memory::AllocationStats;

/// Vulkan-specific error types
#[derive(Error, Debug)]
pub enum VulkanError {
    /// No compatible memory type, or the device rejected the allocation
    #[error("Allocation of {requested} bytes failed: {reason}")]
    Allocation {
        /// Number of bytes that were requested
        requested: vk::DeviceSize,
        /// Why the allocation could not be satisfied
        reason: String,
    },

    /// Format lacks a feature the operation needs
    #[error("Format {format:?} unsupported: {reason}")]
    UnsupportedFormat {
        /// The offending format
        format: vk::Format,
        /// Missing capability
        reason: String,
    },

    /// The device refused to create a native object
    #[error("Failed to create {object}: {result:?}")]
    NativeObjectCreation {
        /// Kind of object being created
        object: &'static str,
        /// Result code returned by the driver
        result: vk::Result,
    },

    /// A shader binary could not be loaded
    #[error("Failed to load shader {path}: {reason}")]
    ShaderLoad {
        /// Shader file path
        path: String,
        /// Description of the failure
        reason: String,
    },

    /// Source image bytes are malformed
    #[error("Decode error: {0}")]
    Decode(String),

    /// Invalid operation attempted
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Description of why the operation is invalid
        reason: String,
    },

    /// General Vulkan API error with result code
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),
}

impl VulkanError {
    /// Shorthand for [`VulkanError::NativeObjectCreation`] in `map_err`
    pub fn creation(object: &'static str) -> impl FnOnce(vk::Result) -> Self {
        move |result| Self::NativeObjectCreation { object, result }
    }

    /// Shorthand for [`VulkanError::InvalidOperation`]
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidOperation { reason: reason.into() }
    }

    /// Whether the caller can carry on after this error
    ///
    /// Decode failures are answered with a placeholder texture and format
    /// failures with a different format. Allocation failures abort the
    /// resource being built. Native object creation and shader failures
    /// indicate a configuration bug and end startup.
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Decode(_) | Self::UnsupportedFormat { .. })
    }
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;

/// Query for per-format capabilities
///
/// Implemented by [`GpuContext`]; texture planning only needs this narrow view
/// of the device, so it can be validated before any memory is touched.
pub trait FormatSupport {
    /// Features of `format` with optimal tiling
    fn optimal_tiling_features(&self, format: vk::Format) -> vk::FormatFeatureFlags;
}

/// Device, queues and transient command resources shared by all builders
pub struct GpuContext {
    // Drops before the device
    command_pool: CommandPool,
    stats: Arc<AllocationStats>,
    physical_device: PhysicalDeviceInfo,
    device: LogicalDevice,
    instance: Instance,
}

impl GpuContext {
    /// Create the logical device and transient command pool
    pub fn new(
        instance: &VulkanInstance,
        physical_device: PhysicalDeviceInfo,
        queues: QueueSelection,
        config: &RendererConfig,
    ) -> VulkanResult<Self> {
        let device = LogicalDevice::new(&instance.instance, &physical_device, queues, config)?;
        let command_pool = CommandPool::new(device.device.clone(), queues.graphics_family, device.graphics_queue)?;

        log::info!(
            "GPU context ready on {} (graphics family {}, present family {})",
            physical_device.name(),
            queues.graphics_family,
            queues.present_family
        );

        Ok(Self {
            command_pool,
            stats: Arc::new(AllocationStats::default()),
            physical_device,
            device,
            instance: instance.instance.clone(),
        })
    }

    /// Get the raw Device handle
    pub fn device(&self) -> &Device {
        &self.device.device
    }

    /// Get the logical device wrapper
    pub fn logical_device(&self) -> &LogicalDevice {
        &self.device
    }

    /// Get a reference to the Vulkan instance
    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    /// Get the physical device info
    pub fn physical_device(&self) -> &PhysicalDeviceInfo {
        &self.physical_device
    }

    /// Memory heaps and types of the physical device
    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.physical_device.memory_properties
    }

    /// Device limits
    pub fn limits(&self) -> &vk::PhysicalDeviceLimits {
        &self.physical_device.properties.limits
    }

    /// Features that were enabled on the logical device
    pub fn enabled_features(&self) -> &vk::PhysicalDeviceFeatures {
        &self.device.enabled_features
    }

    /// Get the graphics queue
    pub fn graphics_queue(&self) -> vk::Queue {
        self.device.graphics_queue
    }

    /// Get the present queue
    pub fn present_queue(&self) -> vk::Queue {
        self.device.present_queue
    }

    /// Live allocation counters
    pub fn allocation_stats(&self) -> &Arc<AllocationStats> {
        &self.stats
    }

    /// Properties of `format` on this device
    pub fn format_properties(&self, format: vk::Format) -> vk::FormatProperties {
        unsafe {
            self.instance
                .get_physical_device_format_properties(self.physical_device.device, format)
        }
    }

    /// Begin recording a single-use command buffer
    ///
    /// The returned recorder holds the transient pool lock until it is
    /// submitted or dropped, so concurrent builds serialize here.
    pub fn begin_one_time_commands(&self) -> VulkanResult<OneTimeCommands<'_>> {
        self.command_pool.begin_one_time()
    }

    /// Block until the device has finished all submitted work
    pub fn wait_idle(&self) -> VulkanResult<()> {
        unsafe { self.device.device.device_wait_idle().map_err(VulkanError::Api) }
    }
}

impl FormatSupport for GpuContext {
    fn optimal_tiling_features(&self, format: vk::Format) -> vk::FormatFeatureFlags {
        self.format_properties(format).optimal_tiling_features
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        let live = self.stats.live_allocations();
        if live > 0 {
            log::warn!(
                "GPU context dropped with {} live allocations ({} bytes)",
                live,
                self.stats.live_bytes()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(VulkanError::Decode("truncated".into()).is_recoverable());
        assert!(VulkanError::UnsupportedFormat {
            format: vk::Format::R8G8B8_SRGB,
            reason: "no linear filter".into()
        }
        .is_recoverable());
        assert!(!VulkanError::creation("graphics pipeline")(vk::Result::ERROR_INITIALIZATION_FAILED).is_recoverable());
        assert!(!VulkanError::ShaderLoad { path: "a.spv".into(), reason: "missing".into() }.is_recoverable());
        assert!(!VulkanError::Allocation { requested: 1024, reason: "out of device memory".into() }.is_recoverable());
    }

    #[test]
    fn test_error_messages() {
        let err = VulkanError::creation("sampler")(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        assert_eq!(err.to_string(), "Failed to create sampler: ERROR_OUT_OF_DEVICE_MEMORY");

        let err = VulkanError::invalid("not host visible");
        assert_eq!(err.to_string(), "Invalid operation: not host visible");
    }
}
