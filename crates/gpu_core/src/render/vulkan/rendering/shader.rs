//! Shader management
//!
//! SPIR-V shader loading following RAII patterns. Load failures are reported
//! as [`VulkanError::ShaderLoad`] naming the offending file.

use std::ffi::CStr;
use std::io::Cursor;
use std::path::Path;

use ash::{vk, Device};

use crate::render::vulkan::{VulkanError, VulkanResult};

/// Entry point used by every shader stage
pub const SHADER_ENTRY_POINT: &CStr = {
    match CStr::from_bytes_with_nul(b"main\0") {
        Ok(name) => name,
        Err(_) => panic!("entry point literal is nul-terminated"),
    }
};

/// Decode SPIR-V words from raw bytes
///
/// `label` names the source in the error.
pub fn parse_spirv(label: &str, bytes: &[u8]) -> VulkanResult<Vec<u32>> {
    let words = ash::util::read_spv(&mut Cursor::new(bytes)).map_err(|e| VulkanError::ShaderLoad {
        path: label.to_string(),
        reason: e.to_string(),
    })?;

    if words.is_empty() {
        return Err(VulkanError::ShaderLoad {
            path: label.to_string(),
            reason: "empty SPIR-V binary".to_string(),
        });
    }
    Ok(words)
}

/// Shader module wrapper with RAII cleanup
pub struct ShaderModule {
    device: Device,
    module: vk::ShaderModule,
}

impl ShaderModule {
    /// Create shader module from SPIR-V bytecode
    pub fn from_bytes(device: &Device, label: &str, bytes: &[u8]) -> VulkanResult<Self> {
        let code = parse_spirv(label, bytes)?;
        let create_info = vk::ShaderModuleCreateInfo::builder().code(&code);

        let module = unsafe {
            device
                .create_shader_module(&create_info, None)
                .map_err(VulkanError::creation("shader module"))?
        };

        Ok(Self { device: device.clone(), module })
    }

    /// Load shader from SPIR-V file
    pub fn from_file<P: AsRef<Path>>(device: &Device, path: P) -> VulkanResult<Self> {
        let path = path.as_ref();
        let label = path.display().to_string();
        let bytes = std::fs::read(path).map_err(|e| VulkanError::ShaderLoad {
            path: label.clone(),
            reason: e.to_string(),
        })?;

        log::debug!("Loaded shader {} ({} bytes)", label, bytes.len());
        Self::from_bytes(device, &label, &bytes)
    }

    /// Get shader module handle
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }

    /// Create shader stage create info
    pub fn create_stage_info(&self, stage: vk::ShaderStageFlags) -> vk::PipelineShaderStageCreateInfo {
        vk::PipelineShaderStageCreateInfo::builder()
            .stage(stage)
            .module(self.module)
            .name(SHADER_ENTRY_POINT)
            .build()
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.module, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_little_endian_words() {
        let mut bytes = 0x0723_0203_u32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&0x0001_0000_u32.to_le_bytes());

        let words = parse_spirv("inline", &bytes).unwrap();
        assert_eq!(words, vec![0x0723_0203, 0x0001_0000]);
    }

    #[test]
    fn test_misaligned_binary_is_shader_error() {
        let err = parse_spirv("Shaders/broken.spv", &[0x03, 0x02, 0x23]).unwrap_err();
        match err {
            VulkanError::ShaderLoad { path, .. } => assert_eq!(path, "Shaders/broken.spv"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_empty_binary_rejected() {
        assert!(matches!(parse_spirv("empty", &[]), Err(VulkanError::ShaderLoad { .. })));
    }

    #[test]
    fn test_entry_point_is_main() {
        assert_eq!(SHADER_ENTRY_POINT.to_str().unwrap(), "main");
    }
}
