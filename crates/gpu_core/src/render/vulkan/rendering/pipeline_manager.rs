//! Pipeline manager for rendering-mode and sample-count switches
//!
//! The published pipeline is only replaced once its successor has been fully
//! built. The device is idled before the old pipeline is dropped, so no frame
//! in flight can still reference it. A failed rebuild leaves the published
//! pipeline untouched.

use ash::vk;

use super::pipeline::{GraphicsPipeline, PipelineSettings};
use crate::render::config::{RenderingMode, SampleCount};
use crate::render::vulkan::{GpuContext, VulkanResult};

/// Owns the published graphics pipeline and the inputs to rebuild it
pub struct PipelineManager {
    current: GraphicsPipeline,
    render_pass: vk::RenderPass,
    set_layouts: Vec<vk::DescriptorSetLayout>,
    push_constant_range: vk::PushConstantRange,
}

impl PipelineManager {
    /// Build the initial pipeline
    pub fn new(
        context: &GpuContext,
        render_pass: vk::RenderPass,
        settings: &PipelineSettings,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constant_range: vk::PushConstantRange,
    ) -> VulkanResult<Self> {
        let current = GraphicsPipeline::new(context, render_pass, settings, set_layouts, push_constant_range)?;
        Ok(Self {
            current,
            render_pass,
            set_layouts: set_layouts.to_vec(),
            push_constant_range,
        })
    }

    /// The published pipeline
    pub fn current(&self) -> &GraphicsPipeline {
        &self.current
    }

    /// Settings of the published pipeline
    pub fn settings(&self) -> &PipelineSettings {
        self.current.settings()
    }

    /// Switch fill/wireframe/point rendering
    pub fn set_rendering_mode(&mut self, context: &GpuContext, mode: RenderingMode) -> VulkanResult<()> {
        if self.settings().rendering_mode == mode {
            return Ok(());
        }
        let settings = PipelineSettings { rendering_mode: mode, ..self.settings().clone() };
        self.rebuild(context, &settings)
    }

    /// Switch the rasterization sample count
    pub fn set_sample_count(&mut self, context: &GpuContext, samples: SampleCount) -> VulkanResult<()> {
        if self.settings().msaa_samples == samples {
            return Ok(());
        }
        let settings = PipelineSettings { msaa_samples: samples, ..self.settings().clone() };
        self.rebuild(context, &settings)
    }

    /// Build a pipeline from `settings` and publish it
    pub fn rebuild(&mut self, context: &GpuContext, settings: &PipelineSettings) -> VulkanResult<()> {
        log::debug!("Rebuilding graphics pipeline with {:?}", settings);

        let candidate = GraphicsPipeline::new(
            context,
            self.render_pass,
            settings,
            &self.set_layouts,
            self.push_constant_range,
        );

        publish(&mut self.current, candidate, || context.wait_idle()).map_err(|e| {
            log::error!("Pipeline rebuild failed, keeping previous pipeline: {}", e);
            e
        })
    }
}

/// Replace `current` with a successfully built `candidate`
///
/// `wait_idle` runs after the candidate exists and before the old value is
/// dropped. On any error `current` is left as it was.
fn publish<T>(
    current: &mut T,
    candidate: VulkanResult<T>,
    wait_idle: impl FnOnce() -> VulkanResult<()>,
) -> VulkanResult<()> {
    let candidate = candidate?;
    wait_idle()?;
    let retired = std::mem::replace(current, candidate);
    drop(retired);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::vulkan::VulkanError;
    use std::cell::RefCell;

    struct Tracked<'a> {
        id: u32,
        log: &'a RefCell<Vec<String>>,
    }

    impl Drop for Tracked<'_> {
        fn drop(&mut self) {
            self.log.borrow_mut().push(format!("drop {}", self.id));
        }
    }

    #[test]
    fn test_publish_waits_before_retiring() {
        let log = RefCell::new(Vec::new());
        let mut current = Tracked { id: 1, log: &log };

        publish(&mut current, Ok(Tracked { id: 2, log: &log }), || {
            log.borrow_mut().push("wait".to_string());
            Ok(())
        })
        .unwrap();

        assert_eq!(current.id, 2);
        assert_eq!(*log.borrow(), vec!["wait", "drop 1"]);
    }

    #[test]
    fn test_failed_build_keeps_current() {
        let mut current = 7;
        let mut waited = false;
        let result = publish(
            &mut current,
            Err(VulkanError::creation("graphics pipeline")(vk::Result::ERROR_INITIALIZATION_FAILED)),
            || {
                waited = true;
                Ok(())
            },
        );

        assert!(result.is_err());
        assert!(!waited);
        assert_eq!(current, 7);
    }

    #[test]
    fn test_failed_wait_drops_candidate_and_keeps_current() {
        let log = RefCell::new(Vec::new());
        let mut current = Tracked { id: 1, log: &log };

        let result = publish(&mut current, Ok(Tracked { id: 2, log: &log }), || {
            Err(VulkanError::Api(vk::Result::ERROR_DEVICE_LOST))
        });

        assert!(result.is_err());
        assert_eq!(current.id, 1);
        assert_eq!(*log.borrow(), vec!["drop 2"]);
    }
}
