//! Vulkan initialization types (instance, devices, context)

pub mod context;
pub mod device;
pub mod instance;
