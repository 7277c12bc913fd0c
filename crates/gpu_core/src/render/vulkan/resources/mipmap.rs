//! Mip chain planning and recording
//!
//! Level `i` is produced by a linear blit from level `i - 1`, so each source
//! level moves TransferDestination -> TransferSource -> ShaderReadOnly and the
//! last level goes straight from TransferDestination to ShaderReadOnly.

use ash::vk;

use crate::render::vulkan::rendering::commands::{BlitRegion, CommandSink};
use crate::render::vulkan::state::{ImageLayout, LayoutTracker, MipRange};
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Number of mip levels for a `width` x `height` base level
///
/// `floor(log2(max(width, height))) + 1` when `generate` is set, otherwise 1.
pub const fn mip_level_count(width: u32, height: u32, generate: bool) -> u32 {
    let largest = if width > height { width } else { height };
    if !generate || largest == 0 {
        return 1;
    }
    u32::BITS - largest.leading_zeros()
}

/// Extent of the level below `extent`, halving and clamping each axis at 1
pub fn next_mip_extent(extent: vk::Extent2D) -> vk::Extent2D {
    vk::Extent2D {
        width: (extent.width / 2).max(1),
        height: (extent.height / 2).max(1),
    }
}

/// Iterator over the blits that fill a mip chain
#[derive(Debug, Clone)]
pub struct MipChain {
    extent: vk::Extent2D,
    next_level: u32,
    mip_levels: u32,
}

impl MipChain {
    /// Chain for a base level of `extent` with `mip_levels` levels
    pub const fn new(extent: vk::Extent2D, mip_levels: u32) -> Self {
        Self { extent, next_level: 1, mip_levels }
    }
}

impl Iterator for MipChain {
    type Item = BlitRegion;

    fn next(&mut self) -> Option<BlitRegion> {
        if self.next_level >= self.mip_levels {
            return None;
        }

        let src_extent = self.extent;
        let dst_extent = next_mip_extent(src_extent);
        let region = BlitRegion {
            src_level: self.next_level - 1,
            dst_level: self.next_level,
            src_extent,
            dst_extent,
        };

        self.extent = dst_extent;
        self.next_level += 1;
        Some(region)
    }
}

/// Fail unless `format` can be the source of a linear-filtered blit
pub fn ensure_linear_blit(features: vk::FormatFeatureFlags, format: vk::Format) -> VulkanResult<()> {
    if features.contains(vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR) {
        Ok(())
    } else {
        Err(VulkanError::UnsupportedFormat {
            format,
            reason: "texture image format does not support linear blitting".to_string(),
        })
    }
}

/// Record barriers and blits generating every level below level 0
///
/// Every level must be in TransferDestination with level 0 holding the
/// uploaded pixels. Afterwards every level is ShaderReadOnly.
pub fn record_mip_chain(
    commands: &mut impl CommandSink,
    image: vk::Image,
    extent: vk::Extent2D,
    layouts: &mut LayoutTracker,
) -> VulkanResult<()> {
    let mip_levels = layouts.mip_levels();
    if mip_levels == 0 {
        return Err(VulkanError::invalid("Image has no mip levels"));
    }
    for level in 0..mip_levels {
        layouts.require(level, ImageLayout::TransferDestination)?;
    }

    for region in MipChain::new(extent, mip_levels) {
        let source = MipRange::level(region.src_level);

        let to_source = layouts.transition(source, ImageLayout::TransferSource)?;
        commands.image_barrier(image, &to_source, source);

        commands.blit_image(image, &region);

        let to_read_only = layouts.transition(source, ImageLayout::ShaderReadOnly)?;
        commands.image_barrier(image, &to_read_only, source);
    }

    let last = MipRange::level(mip_levels - 1);
    let to_read_only = layouts.transition(last, ImageLayout::ShaderReadOnly)?;
    commands.image_barrier(image, &to_read_only, last);

    log::trace!("Recorded {} mip levels for {}x{} image", mip_levels, extent.width, extent.height);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::vulkan::rendering::commands::recording::{Recorded, RecordingSink};

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    fn prepared(levels: u32) -> LayoutTracker {
        let mut tracker = LayoutTracker::new(levels);
        tracker.transition(MipRange::all(levels), ImageLayout::TransferDestination).unwrap();
        tracker
    }

    #[test]
    fn test_level_count_matches_log2() {
        assert_eq!(mip_level_count(1024, 512, true), 11);
        assert_eq!(mip_level_count(1, 1, true), 1);
        assert_eq!(mip_level_count(300, 17, true), 9);
        assert_eq!(mip_level_count(4096, 4096, false), 1);

        for (width, height) in [(2, 1), (3, 3), (255, 7), (256, 1), (1, 640)] {
            let expected = f64::from(width.max(height)).log2().floor() as u32 + 1;
            assert_eq!(mip_level_count(width, height, true), expected, "{width}x{height}");
        }
    }

    #[test]
    fn test_halving_clamps_each_axis() {
        assert_eq!(next_mip_extent(extent(2, 1)), extent(1, 1));
        assert_eq!(next_mip_extent(extent(7, 300)), extent(3, 150));
        assert_eq!(next_mip_extent(extent(1, 1)), extent(1, 1));
    }

    #[test]
    fn test_chain_extents_non_increasing() {
        let regions: Vec<BlitRegion> = MipChain::new(extent(1024, 512), 11).collect();
        assert_eq!(regions.len(), 10);
        assert_eq!(regions[0].dst_extent, extent(512, 256));
        assert_eq!(regions[8].dst_extent, extent(2, 1));
        assert_eq!(regions[9].src_extent, extent(2, 1));
        assert_eq!(regions[9].dst_extent, extent(1, 1));

        for region in &regions {
            assert_eq!(region.dst_level, region.src_level + 1);
            assert!(region.dst_extent.width <= region.src_extent.width);
            assert!(region.dst_extent.height <= region.src_extent.height);
        }
    }

    #[test]
    fn test_non_power_of_two_chain() {
        let regions: Vec<BlitRegion> = MipChain::new(extent(5, 3), mip_level_count(5, 3, true)).collect();
        let extents: Vec<(u32, u32)> = regions.iter().map(|r| (r.dst_extent.width, r.dst_extent.height)).collect();
        assert_eq!(extents, vec![(2, 1), (1, 1)]);
    }

    #[test]
    fn test_single_level_records_no_blits() {
        let mut sink = RecordingSink::default();
        let mut layouts = prepared(1);

        record_mip_chain(&mut sink, vk::Image::null(), extent(1, 1), &mut layouts).unwrap();

        assert!(sink.blits().is_empty());
        let barriers = sink.barriers();
        assert_eq!(barriers.len(), 1);
        assert_eq!(barriers[0].0.old_layout, ImageLayout::TransferDestination);
        assert_eq!(barriers[0].0.new_layout, ImageLayout::ShaderReadOnly);
        assert_eq!(layouts.uniform_layout(), Some(ImageLayout::ShaderReadOnly));
    }

    #[test]
    fn test_barrier_and_blit_order() {
        let mut sink = RecordingSink::default();
        let mut layouts = prepared(3);

        record_mip_chain(&mut sink, vk::Image::null(), extent(4, 4), &mut layouts).unwrap();

        let summary: Vec<String> = sink
            .commands
            .iter()
            .map(|command| match command {
                Recorded::Barrier { transition, range, .. } => format!(
                    "{}:{:?}->{:?}",
                    range.base_level, transition.old_layout, transition.new_layout
                ),
                Recorded::Blit { region, .. } => format!("blit {}->{}", region.src_level, region.dst_level),
                other => format!("{other:?}"),
            })
            .collect();

        assert_eq!(
            summary,
            vec![
                "0:TransferDestination->TransferSource",
                "blit 0->1",
                "0:TransferSource->ShaderReadOnly",
                "1:TransferDestination->TransferSource",
                "blit 1->2",
                "1:TransferSource->ShaderReadOnly",
                "2:TransferDestination->ShaderReadOnly",
            ]
        );
        assert_eq!(layouts.uniform_layout(), Some(ImageLayout::ShaderReadOnly));
    }

    #[test]
    fn test_requires_transfer_destination() {
        let mut sink = RecordingSink::default();
        let mut layouts = LayoutTracker::new(2);

        assert!(record_mip_chain(&mut sink, vk::Image::null(), extent(2, 2), &mut layouts).is_err());
        assert!(sink.commands.is_empty());
    }

    #[test]
    fn test_linear_blit_check() {
        let linear = vk::FormatFeatureFlags::SAMPLED_IMAGE | vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR;
        assert!(ensure_linear_blit(linear, vk::Format::R8G8B8A8_SRGB).is_ok());

        let err = ensure_linear_blit(vk::FormatFeatureFlags::SAMPLED_IMAGE, vk::Format::R8G8B8_SRGB).unwrap_err();
        assert!(matches!(err, VulkanError::UnsupportedFormat { format: vk::Format::R8G8B8_SRGB, .. }));
    }
}
