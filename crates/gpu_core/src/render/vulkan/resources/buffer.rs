//! Buffer management
//!
//! Memory management following RAII patterns with proper allocation and cleanup.
//! A [`StagingBuffer`] is the host-visible, transfer-source intermediate used
//! for every CPU to GPU upload; it must stay alive until the command buffer
//! that reads it has completed.

use ash::{vk, Device};

use super::format::image_upload_size;
use super::image::Image;
use super::memory::MemoryBlock;
use crate::render::vulkan::rendering::commands::CommandSink;
use crate::render::vulkan::state::ImageLayout;
use crate::render::vulkan::{GpuContext, VulkanError, VulkanResult};

/// Buffer wrapper with memory management
pub struct Buffer {
    device: Device,
    buffer: vk::Buffer,
    memory: MemoryBlock,
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
}

impl Buffer {
    /// Create a new buffer with memory allocation
    pub fn new(
        context: &GpuContext,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<Self> {
        if size == 0 {
            return Err(VulkanError::Allocation {
                requested: 0,
                reason: "buffer size must be greater than zero".to_string(),
            });
        }

        let device = context.device();
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe {
            device
                .create_buffer(&buffer_info, None)
                .map_err(VulkanError::creation("buffer"))?
        };

        let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };

        let memory = match MemoryBlock::allocate(context, requirements, properties) {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        if let Err(result) = unsafe { device.bind_buffer_memory(buffer, memory.handle(), 0) } {
            unsafe { device.destroy_buffer(buffer, None) };
            return Err(VulkanError::Api(result));
        }

        log::trace!("Created buffer of {} bytes ({:?})", size, usage);

        Ok(Self {
            device: device.clone(),
            buffer,
            memory,
            size,
            usage,
        })
    }

    /// Copy host bytes into the start of the buffer
    ///
    /// Fails with `InvalidOperation` on device-local memory.
    pub fn copy_bytes(&self, data: &[u8]) -> VulkanResult<()> {
        if data.len() as vk::DeviceSize > self.size {
            return Err(VulkanError::invalid(format!(
                "Cannot copy {} bytes into buffer of {} bytes",
                data.len(),
                self.size
            )));
        }
        self.memory.write_bytes(0, data)
    }

    /// Record a copy of the whole buffer into `destination`
    pub fn copy_to_buffer(&self, commands: &mut impl CommandSink, destination: &Self) -> VulkanResult<()> {
        if !self.usage.contains(vk::BufferUsageFlags::TRANSFER_SRC) {
            return Err(VulkanError::invalid("Source buffer lacks TRANSFER_SRC usage"));
        }
        if !destination.usage.contains(vk::BufferUsageFlags::TRANSFER_DST) {
            return Err(VulkanError::invalid("Destination buffer lacks TRANSFER_DST usage"));
        }
        if destination.size < self.size {
            return Err(VulkanError::invalid(format!(
                "Destination buffer of {} bytes cannot hold {} bytes",
                destination.size, self.size
            )));
        }

        commands.copy_buffer(self.buffer, destination.buffer, self.size);
        Ok(())
    }

    /// Record a copy of the buffer into mip level 0 of `image`
    ///
    /// Level 0 must already be in `TransferDestination` and the buffer must
    /// hold at least one full level 0 of pixels.
    pub fn copy_to_image(&self, commands: &mut impl CommandSink, image: &Image) -> VulkanResult<()> {
        image.layouts().require(0, ImageLayout::TransferDestination)?;
        check_image_upload(self.usage, self.size, image.extent(), image.format())?;
        commands.copy_buffer_to_image(self.buffer, image.handle(), image.extent());
        Ok(())
    }

    /// Release the buffer and its memory now
    pub fn destroy(self) {
        drop(self);
    }

    /// Get buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Get size
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Usage flags the buffer was created with
    pub fn usage(&self) -> vk::BufferUsageFlags {
        self.usage
    }

    /// Backing memory
    pub fn memory(&self) -> &MemoryBlock {
        &self.memory
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_buffer(self.buffer, None);
        }
        // memory is freed by MemoryBlock's drop after the buffer handle is gone
    }
}

/// Fail unless a buffer of `size` bytes with `usage` can fill level 0 of an image
fn check_image_upload(
    usage: vk::BufferUsageFlags,
    size: vk::DeviceSize,
    extent: vk::Extent2D,
    format: vk::Format,
) -> VulkanResult<()> {
    if !usage.contains(vk::BufferUsageFlags::TRANSFER_SRC) {
        return Err(VulkanError::invalid("Source buffer lacks TRANSFER_SRC usage"));
    }
    let required = image_upload_size(extent, format)?;
    if size < required {
        return Err(VulkanError::invalid(format!(
            "Buffer of {} bytes cannot fill a {}x{} {:?} image ({} bytes)",
            size, extent.width, extent.height, format, required
        )));
    }
    Ok(())
}

/// Host-visible transfer source holding one upload
pub struct StagingBuffer {
    buffer: Buffer,
}

impl StagingBuffer {
    /// Create a staging buffer sized for `bytes` and copy them in
    pub fn with_bytes(context: &GpuContext, bytes: &[u8]) -> VulkanResult<Self> {
        let buffer = Buffer::new(
            context,
            bytes.len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        buffer.copy_bytes(bytes)?;
        Ok(Self { buffer })
    }

    /// Underlying buffer
    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    /// Record a copy into mip level 0 of `image`
    pub fn copy_to_image(&self, commands: &mut impl CommandSink, image: &Image) -> VulkanResult<()> {
        self.buffer.copy_to_image(commands, image)
    }

    /// Record a copy into `destination`
    pub fn copy_to_buffer(&self, commands: &mut impl CommandSink, destination: &Buffer) -> VulkanResult<()> {
        self.buffer.copy_to_buffer(commands, destination)
    }

    /// Upload `bytes` into a new device-local buffer with `usage`
    ///
    /// Records, submits and waits on a single-use command buffer; the staging
    /// buffer is released only after the device has finished the copy.
    pub fn upload_to_device_local(
        context: &GpuContext,
        bytes: &[u8],
        usage: vk::BufferUsageFlags,
    ) -> VulkanResult<Buffer> {
        let staging = Self::with_bytes(context, bytes)?;
        let destination = Buffer::new(
            context,
            staging.buffer.size(),
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        let mut commands = context.begin_one_time_commands()?;
        staging.copy_to_buffer(&mut commands, &destination)?;
        commands.submit_and_wait()?;
        drop(staging);

        Ok(destination)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RGBA: vk::Format = vk::Format::R8G8B8A8_SRGB;

    #[test]
    fn test_short_buffer_cannot_fill_image() {
        let extent = vk::Extent2D { width: 4, height: 4 };
        let src = vk::BufferUsageFlags::TRANSFER_SRC;

        assert!(check_image_upload(src, 64, extent, RGBA).is_ok());
        assert!(check_image_upload(src, 128, extent, RGBA).is_ok());

        let err = check_image_upload(src, 63, extent, RGBA).unwrap_err();
        assert!(matches!(err, VulkanError::InvalidOperation { .. }));
    }

    #[test]
    fn test_image_upload_needs_transfer_source() {
        let extent = vk::Extent2D { width: 1, height: 1 };
        assert!(check_image_upload(vk::BufferUsageFlags::VERTEX_BUFFER, 4, extent, RGBA).is_err());
    }
}
