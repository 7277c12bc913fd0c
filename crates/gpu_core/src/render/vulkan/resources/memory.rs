//! Device memory blocks
//!
//! A [`MemoryBlock`] is one `vkAllocateMemory` result, owned by exactly one
//! buffer or image and freed when that owner drops. Live allocations are
//! counted in [`AllocationStats`] so leaks on failure paths show up.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use ash::{vk, Device};

use crate::render::vulkan::{GpuContext, VulkanError, VulkanResult};

/// Live allocation counters
#[derive(Debug, Default)]
pub struct AllocationStats {
    live_allocations: AtomicUsize,
    live_bytes: AtomicU64,
    total_allocations: AtomicUsize,
}

impl AllocationStats {
    /// Record a successful allocation
    pub fn record_allocation(&self, bytes: vk::DeviceSize) {
        self.live_allocations.fetch_add(1, Ordering::Relaxed);
        self.total_allocations.fetch_add(1, Ordering::Relaxed);
        self.live_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Record a release
    pub fn record_free(&self, bytes: vk::DeviceSize) {
        self.live_allocations.fetch_sub(1, Ordering::Relaxed);
        self.live_bytes.fetch_sub(bytes, Ordering::Relaxed);
    }

    /// Allocations currently alive
    pub fn live_allocations(&self) -> usize {
        self.live_allocations.load(Ordering::Relaxed)
    }

    /// Bytes currently allocated
    pub fn live_bytes(&self) -> vk::DeviceSize {
        self.live_bytes.load(Ordering::Relaxed)
    }

    /// Allocations made over the lifetime of the context
    pub fn total_allocations(&self) -> usize {
        self.total_allocations.load(Ordering::Relaxed)
    }
}

/// Find memory type with required properties
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> VulkanResult<u32> {
    (0..memory_properties.memory_type_count.min(vk::MAX_MEMORY_TYPES as u32))
        .find(|&i| {
            (type_filter & (1 << i)) != 0
                && memory_properties.memory_types[i as usize].property_flags.contains(properties)
        })
        .ok_or_else(|| VulkanError::Allocation {
            requested: 0,
            reason: format!("no memory type with {properties:?} in filter {type_filter:#b}"),
        })
}

/// One allocated block of device memory
pub struct MemoryBlock {
    device: Device,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
    properties: vk::MemoryPropertyFlags,
    atom_size: vk::DeviceSize,
    stats: Arc<AllocationStats>,
}

impl MemoryBlock {
    /// Allocate memory satisfying `requirements` with `properties`
    pub fn allocate(
        context: &GpuContext,
        requirements: vk::MemoryRequirements,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<Self> {
        if requirements.size == 0 {
            return Err(VulkanError::Allocation {
                requested: 0,
                reason: "zero-sized allocation".to_string(),
            });
        }

        let memory_type_index =
            find_memory_type(context.memory_properties(), requirements.memory_type_bits, properties).map_err(
                |e| match e {
                    VulkanError::Allocation { reason, .. } => VulkanError::Allocation {
                        requested: requirements.size,
                        reason,
                    },
                    other => other,
                },
            )?;

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);

        let memory = unsafe {
            context
                .device()
                .allocate_memory(&alloc_info, None)
                .map_err(|result| VulkanError::Allocation {
                    requested: requirements.size,
                    reason: format!("{result:?}"),
                })?
        };

        let stats = Arc::clone(context.allocation_stats());
        stats.record_allocation(requirements.size);

        Ok(Self {
            device: context.device().clone(),
            memory,
            size: requirements.size,
            properties,
            atom_size: context.limits().non_coherent_atom_size.max(1),
            stats,
        })
    }

    /// Raw memory handle
    pub fn handle(&self) -> vk::DeviceMemory {
        self.memory
    }

    /// Allocated size, which may exceed the requested size
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Property flags the block was allocated with
    pub fn properties(&self) -> vk::MemoryPropertyFlags {
        self.properties
    }

    /// Whether the host can map this block
    pub fn is_host_visible(&self) -> bool {
        self.properties.contains(vk::MemoryPropertyFlags::HOST_VISIBLE)
    }

    /// Copy `bytes` into the block at `offset`
    ///
    /// Only valid on host-visible memory. Non-coherent memory is flushed after
    /// the write.
    pub fn write_bytes(&self, offset: vk::DeviceSize, bytes: &[u8]) -> VulkanResult<()> {
        if !self.is_host_visible() {
            return Err(VulkanError::invalid("Cannot copy host bytes into device-local memory"));
        }

        let len = bytes.len() as vk::DeviceSize;
        if offset.checked_add(len).map_or(true, |end| end > self.size) {
            return Err(VulkanError::invalid(format!(
                "Write of {} bytes at offset {} exceeds block of {} bytes",
                len, offset, self.size
            )));
        }
        if bytes.is_empty() {
            return Ok(());
        }

        // Map the atom-aligned range so the flush below stays inside the mapping
        let (map_offset, map_size) = aligned_range(offset, len, self.atom_size, self.size);
        let skip = usize::try_from(offset - map_offset).map_err(|_| VulkanError::invalid("Mapped offset overflow"))?;

        unsafe {
            let ptr = self
                .device
                .map_memory(self.memory, map_offset, map_size, vk::MemoryMapFlags::empty())
                .map_err(VulkanError::Api)?
                .cast::<u8>();
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.add(skip), bytes.len());

            let flushed = if self.properties.contains(vk::MemoryPropertyFlags::HOST_COHERENT) {
                Ok(())
            } else {
                let range = vk::MappedMemoryRange::builder()
                    .memory(self.memory)
                    .offset(map_offset)
                    .size(map_size);
                self.device.flush_mapped_memory_ranges(&[range.build()])
            };

            self.device.unmap_memory(self.memory);
            flushed.map_err(VulkanError::Api)
        }
    }
}

/// Expand `offset..offset + len` to `atom` boundaries within a block of `block_size`
///
/// Returns `(offset, size)`. The end is clamped to the block, which is valid
/// for a flush because the block is the whole allocation.
pub const fn aligned_range(
    offset: vk::DeviceSize,
    len: vk::DeviceSize,
    atom: vk::DeviceSize,
    block_size: vk::DeviceSize,
) -> (vk::DeviceSize, vk::DeviceSize) {
    let atom = if atom == 0 { 1 } else { atom };
    let start = offset / atom * atom;
    let end = (offset + len).div_ceil(atom) * atom;
    let end = if end > block_size { block_size } else { end };
    (start, end - start)
}

impl Drop for MemoryBlock {
    fn drop(&mut self) {
        unsafe {
            self.device.free_memory(self.memory, None);
        }
        self.stats.record_free(self.size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_properties(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut properties = vk::PhysicalDeviceMemoryProperties::default();
        properties.memory_type_count = types.len() as u32;
        for (i, flags) in types.iter().enumerate() {
            properties.memory_types[i] = vk::MemoryType { property_flags: *flags, heap_index: 0 };
        }
        properties
    }

    #[test]
    fn test_finds_first_matching_type() {
        let properties = memory_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        ]);

        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        assert_eq!(find_memory_type(&properties, 0b11, host).unwrap(), 1);
        assert_eq!(find_memory_type(&properties, 0b11, vk::MemoryPropertyFlags::DEVICE_LOCAL).unwrap(), 0);
    }

    #[test]
    fn test_respects_type_filter() {
        let properties = memory_properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL, vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        assert_eq!(find_memory_type(&properties, 0b10, vk::MemoryPropertyFlags::DEVICE_LOCAL).unwrap(), 1);
    }

    #[test]
    fn test_no_compatible_type_is_allocation_error() {
        let properties = memory_properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        let err = find_memory_type(&properties, 0b1, vk::MemoryPropertyFlags::HOST_VISIBLE).unwrap_err();
        assert!(matches!(err, VulkanError::Allocation { .. }));
    }

    #[test]
    fn test_stats_balance() {
        let stats = AllocationStats::default();
        stats.record_allocation(1024);
        stats.record_allocation(256);
        assert_eq!(stats.live_allocations(), 2);
        assert_eq!(stats.live_bytes(), 1280);

        stats.record_free(1024);
        assert_eq!(stats.live_allocations(), 1);
        assert_eq!(stats.live_bytes(), 256);
        assert_eq!(stats.total_allocations(), 2);
    }

    #[test]
    fn test_flush_range_covers_write_at_offset() {
        // A write at 100..110 with 64-byte atoms maps and flushes 64..128
        assert_eq!(aligned_range(100, 10, 64, 1024), (64, 64));
        assert_eq!(aligned_range(0, 64, 64, 1024), (0, 64));
        // The tail of the block is not atom-aligned
        assert_eq!(aligned_range(1000, 20, 64, 1020), (960, 60));
        assert_eq!(aligned_range(5, 3, 1, 16), (5, 3));
        assert_eq!(aligned_range(5, 3, 0, 16), (5, 3));
    }
}
