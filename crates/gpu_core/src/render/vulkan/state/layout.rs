//! Image layout state tracking
//!
//! Every image records the layout of each mip level. A transition is only
//! issued from the layout the level is actually in, and the barrier's access
//! masks and pipeline stages come from a fixed table keyed by the
//! (old, new) pair. Pairs outside the table are rejected.

use ash::vk;

use crate::render::vulkan::{VulkanError, VulkanResult};

/// Memory-access state of an image subresource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageLayout {
    /// Contents undefined, as after creation
    Undefined,
    /// Destination of copies and blits
    TransferDestination,
    /// Source of copies and blits
    TransferSource,
    /// Sampled by shaders
    ShaderReadOnly,
}

impl ImageLayout {
    /// Native layout value
    pub const fn as_vk(self) -> vk::ImageLayout {
        match self {
            Self::Undefined => vk::ImageLayout::UNDEFINED,
            Self::TransferDestination => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            Self::TransferSource => vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            Self::ShaderReadOnly => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }
    }
}

/// Barrier parameters for one layout change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutTransition {
    /// Layout before the barrier
    pub old_layout: ImageLayout,
    /// Layout after the barrier
    pub new_layout: ImageLayout,
    /// Accesses that must complete before the barrier
    pub src_access: vk::AccessFlags,
    /// Accesses that wait on the barrier
    pub dst_access: vk::AccessFlags,
    /// Stage producing `src_access`
    pub src_stage: vk::PipelineStageFlags,
    /// Stage consuming `dst_access`
    pub dst_stage: vk::PipelineStageFlags,
}

impl LayoutTransition {
    /// Barrier parameters for `old -> new`
    pub fn between(old_layout: ImageLayout, new_layout: ImageLayout) -> VulkanResult<Self> {
        use ImageLayout::{ShaderReadOnly, TransferDestination, TransferSource, Undefined};

        let (src_access, dst_access, src_stage, dst_stage) = match (old_layout, new_layout) {
            (Undefined, TransferDestination) => (
                vk::AccessFlags::empty(),
                vk::AccessFlags::TRANSFER_WRITE,
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::PipelineStageFlags::TRANSFER,
            ),
            (TransferDestination, TransferSource) => (
                vk::AccessFlags::TRANSFER_WRITE,
                vk::AccessFlags::TRANSFER_READ,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::TRANSFER,
            ),
            (TransferSource, ShaderReadOnly) => (
                vk::AccessFlags::TRANSFER_READ,
                vk::AccessFlags::SHADER_READ,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
            ),
            (TransferDestination, ShaderReadOnly) => (
                vk::AccessFlags::TRANSFER_WRITE,
                vk::AccessFlags::SHADER_READ,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
            ),
            (ShaderReadOnly, TransferDestination) => (
                vk::AccessFlags::SHADER_READ,
                vk::AccessFlags::TRANSFER_WRITE,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
                vk::PipelineStageFlags::TRANSFER,
            ),
            (old, new) => {
                return Err(VulkanError::invalid(format!(
                    "Unsupported layout transition {old:?} -> {new:?}"
                )))
            }
        };

        Ok(Self {
            old_layout,
            new_layout,
            src_access,
            dst_access,
            src_stage,
            dst_stage,
        })
    }
}

/// Contiguous range of mip levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MipRange {
    /// First level in the range
    pub base_level: u32,
    /// Number of levels
    pub level_count: u32,
}

impl MipRange {
    /// A single level
    pub const fn level(level: u32) -> Self {
        Self { base_level: level, level_count: 1 }
    }

    /// Levels `0..level_count`
    pub const fn all(level_count: u32) -> Self {
        Self { base_level: 0, level_count }
    }

    /// Color-aspect subresource range for barriers and views
    pub const fn subresource_range(self, aspect_mask: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            aspect_mask,
            base_mip_level: self.base_level,
            level_count: self.level_count,
            base_array_layer: 0,
            layer_count: 1,
        }
    }

    fn end(self) -> u32 {
        self.base_level.saturating_add(self.level_count)
    }
}

/// Current layout of every mip level of one image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutTracker {
    levels: Vec<ImageLayout>,
}

impl LayoutTracker {
    /// Tracker for a freshly created image
    pub fn new(mip_levels: u32) -> Self {
        Self { levels: vec![ImageLayout::Undefined; mip_levels as usize] }
    }

    /// Number of tracked levels
    pub fn mip_levels(&self) -> u32 {
        u32::try_from(self.levels.len()).unwrap_or(u32::MAX)
    }

    /// Layout of `level`, if it exists
    pub fn layout(&self, level: u32) -> Option<ImageLayout> {
        self.levels.get(level as usize).copied()
    }

    /// The layout shared by every level, if they all agree
    pub fn uniform_layout(&self) -> Option<ImageLayout> {
        let first = *self.levels.first()?;
        self.levels.iter().all(|&layout| layout == first).then_some(first)
    }

    /// Record a transition of `range` to `new_layout`
    ///
    /// All levels in the range must currently share one layout; the returned
    /// barrier parameters describe the change from that layout.
    pub fn transition(&mut self, range: MipRange, new_layout: ImageLayout) -> VulkanResult<LayoutTransition> {
        if range.level_count == 0 || range.end() > self.mip_levels() {
            return Err(VulkanError::invalid(format!(
                "Mip range {}..{} outside image with {} levels",
                range.base_level,
                range.end(),
                self.mip_levels()
            )));
        }

        let levels = &mut self.levels[range.base_level as usize..range.end() as usize];
        let old_layout = levels[0];
        if let Some(mismatch) = levels.iter().find(|&&layout| layout != old_layout) {
            return Err(VulkanError::invalid(format!(
                "Mip levels {}..{} are in mixed layouts ({:?} and {:?})",
                range.base_level,
                range.end(),
                old_layout,
                mismatch
            )));
        }

        let transition = LayoutTransition::between(old_layout, new_layout)?;
        levels.fill(new_layout);
        Ok(transition)
    }

    /// Fail unless `level` is in `expected`
    pub fn require(&self, level: u32, expected: ImageLayout) -> VulkanResult<()> {
        match self.layout(level) {
            Some(layout) if layout == expected => Ok(()),
            Some(layout) => Err(VulkanError::invalid(format!(
                "Mip level {level} is in {layout:?}, expected {expected:?}"
            ))),
            None => Err(VulkanError::invalid(format!("Mip level {level} does not exist"))),
        }
    }
}
