//! Command buffer management
//!
//! Resource builds record every transfer and transition into one single-use
//! command buffer, submit it once and block until the device finishes.
//! Recording goes through [`CommandSink`] so the ordering logic can be
//! exercised without a device.

use std::sync::{Mutex, MutexGuard};

use ash::{vk, Device};

use crate::render::vulkan::state::{LayoutTransition, MipRange};
use crate::render::vulkan::{VulkanError, VulkanResult};

/// One level-to-level blit inside a single image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlitRegion {
    /// Level read from
    pub src_level: u32,
    /// Level written to
    pub dst_level: u32,
    /// Full extent of the source level
    pub src_extent: vk::Extent2D,
    /// Full extent of the destination level
    pub dst_extent: vk::Extent2D,
}

/// Destination for recorded transfer and transition commands
pub trait CommandSink {
    /// Record an image memory barrier over `range`
    fn image_barrier(&mut self, image: vk::Image, transition: &LayoutTransition, range: MipRange);

    /// Record a linear-filtered blit between two levels of `image`
    fn blit_image(&mut self, image: vk::Image, region: &BlitRegion);

    /// Copy tightly packed pixels from `buffer` into level 0 of `image`
    fn copy_buffer_to_image(&mut self, buffer: vk::Buffer, image: vk::Image, extent: vk::Extent2D);

    /// Copy `size` bytes between buffers
    fn copy_buffer(&mut self, src: vk::Buffer, dst: vk::Buffer, size: vk::DeviceSize);
}

/// Command pool for single-use transfer work, with RAII cleanup
///
/// Allocation from and recording into the pool is serialized by an internal
/// lock held for the lifetime of each [`OneTimeCommands`].
pub struct CommandPool {
    device: Device,
    command_pool: vk::CommandPool,
    queue: vk::Queue,
    lock: Mutex<()>,
}

impl CommandPool {
    /// Create a new command pool submitting to `queue`
    pub fn new(device: Device, queue_family_index: u32, queue: vk::Queue) -> VulkanResult<Self> {
        let pool_create_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::TRANSIENT | vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(queue_family_index);

        let command_pool = unsafe {
            device
                .create_command_pool(&pool_create_info, None)
                .map_err(VulkanError::creation("command pool"))?
        };

        Ok(Self {
            device,
            command_pool,
            queue,
            lock: Mutex::new(()),
        })
    }

    /// Get the command pool handle
    pub fn handle(&self) -> vk::CommandPool {
        self.command_pool
    }

    /// Begin single-time command buffer
    pub fn begin_one_time(&self) -> VulkanResult<OneTimeCommands<'_>> {
        let lock = self
            .lock
            .lock()
            .map_err(|_| VulkanError::invalid("Transient command pool lock poisoned"))?;

        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let command_buffer = unsafe {
            self.device
                .allocate_command_buffers(&alloc_info)
                .map_err(VulkanError::creation("command buffer"))?
        }
        .into_iter()
        .next()
        .ok_or_else(|| VulkanError::invalid("Driver returned no command buffer"))?;

        let commands = OneTimeCommands {
            device: &self.device,
            command_pool: self.command_pool,
            queue: self.queue,
            command_buffer,
            _lock: lock,
        };

        let begin_info = vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            commands
                .device
                .begin_command_buffer(command_buffer, &begin_info)
                .map_err(VulkanError::Api)?;
        }

        Ok(commands)
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            // Wait for device to be idle to ensure all command buffers are finished
            let _ = self.device.device_wait_idle();

            // Destroy command pool (automatically frees all command buffers)
            self.device.destroy_command_pool(self.command_pool, None);
        }
    }
}

/// Recording single-use command buffer
///
/// The buffer is freed when this value drops, whether or not it was
/// submitted, so error paths never leak it.
pub struct OneTimeCommands<'a> {
    device: &'a Device,
    command_pool: vk::CommandPool,
    queue: vk::Queue,
    command_buffer: vk::CommandBuffer,
    _lock: MutexGuard<'a, ()>,
}

impl OneTimeCommands<'_> {
    /// Raw command buffer handle
    pub fn handle(&self) -> vk::CommandBuffer {
        self.command_buffer
    }

    /// End recording, submit, and block until the device has executed it
    pub fn submit_and_wait(self) -> VulkanResult<()> {
        unsafe {
            self.device
                .end_command_buffer(self.command_buffer)
                .map_err(VulkanError::Api)?;

            let fence = self
                .device
                .create_fence(&vk::FenceCreateInfo::builder(), None)
                .map_err(VulkanError::creation("fence"))?;

            let command_buffers = [self.command_buffer];
            let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers);

            if let Err(result) = self.device.queue_submit(self.queue, &[submit_info.build()], fence) {
                self.device.destroy_fence(fence, None);
                return Err(VulkanError::Api(result));
            }

            let waited = self.device.wait_for_fences(&[fence], true, u64::MAX);
            if let Err(result) = waited {
                // Submitted work may still read resources the caller is about to drop
                if must_idle_after_failed_wait(result) {
                    log::error!("Fence wait failed ({:?}), idling device before cleanup", result);
                    if let Err(idle) = self.device.device_wait_idle() {
                        log::error!("Device idle after failed fence wait also failed: {:?}", idle);
                    }
                }
            }

            self.device.destroy_fence(fence, None);
            waited.map_err(VulkanError::Api)
        }
    }
}

/// Whether a failed fence wait leaves submitted work that must be drained
///
/// A lost device executes nothing further, so there is nothing to wait for.
const fn must_idle_after_failed_wait(result: vk::Result) -> bool {
    result.as_raw() != vk::Result::ERROR_DEVICE_LOST.as_raw()
}

impl CommandSink for OneTimeCommands<'_> {
    fn image_barrier(&mut self, image: vk::Image, transition: &LayoutTransition, range: MipRange) {
        let barrier = vk::ImageMemoryBarrier::builder()
            .old_layout(transition.old_layout.as_vk())
            .new_layout(transition.new_layout.as_vk())
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(range.subresource_range(vk::ImageAspectFlags::COLOR))
            .src_access_mask(transition.src_access)
            .dst_access_mask(transition.dst_access);

        unsafe {
            self.device.cmd_pipeline_barrier(
                self.command_buffer,
                transition.src_stage,
                transition.dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier.build()],
            );
        }
    }

    fn blit_image(&mut self, image: vk::Image, region: &BlitRegion) {
        let blit = vk::ImageBlit {
            src_subresource: color_layers(region.src_level),
            src_offsets: [vk::Offset3D { x: 0, y: 0, z: 0 }, far_corner(region.src_extent)],
            dst_subresource: color_layers(region.dst_level),
            dst_offsets: [vk::Offset3D { x: 0, y: 0, z: 0 }, far_corner(region.dst_extent)],
        };

        unsafe {
            self.device.cmd_blit_image(
                self.command_buffer,
                image,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[blit],
                vk::Filter::LINEAR,
            );
        }
    }

    fn copy_buffer_to_image(&mut self, buffer: vk::Buffer, image: vk::Image, extent: vk::Extent2D) {
        let region = vk::BufferImageCopy::builder()
            .buffer_offset(0)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_subresource(color_layers(0))
            .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
            .image_extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            });

        unsafe {
            self.device.cmd_copy_buffer_to_image(
                self.command_buffer,
                buffer,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region.build()],
            );
        }
    }

    fn copy_buffer(&mut self, src: vk::Buffer, dst: vk::Buffer, size: vk::DeviceSize) {
        let region = vk::BufferCopy { src_offset: 0, dst_offset: 0, size };
        unsafe {
            self.device.cmd_copy_buffer(self.command_buffer, src, dst, &[region]);
        }
    }
}

impl Drop for OneTimeCommands<'_> {
    fn drop(&mut self) {
        unsafe {
            self.device
                .free_command_buffers(self.command_pool, &[self.command_buffer]);
        }
    }
}

const fn color_layers(mip_level: u32) -> vk::ImageSubresourceLayers {
    vk::ImageSubresourceLayers {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        mip_level,
        base_array_layer: 0,
        layer_count: 1,
    }
}

fn far_corner(extent: vk::Extent2D) -> vk::Offset3D {
    vk::Offset3D {
        x: i32::try_from(extent.width).unwrap_or(i32::MAX),
        y: i32::try_from(extent.height).unwrap_or(i32::MAX),
        z: 1,
    }
}
