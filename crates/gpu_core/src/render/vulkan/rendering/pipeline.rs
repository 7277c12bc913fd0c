//! Graphics pipeline assembly
//!
//! [`PipelineState`] is derived purely from [`PipelineSettings`]; the native
//! pipeline is a direct translation of it. Two builds from equal settings
//! always produce equal state.

use std::path::PathBuf;

use ash::{vk, Device};

use super::shader::ShaderModule;
use super::vertex_layout::VulkanVertexLayout;
use crate::render::config::{RendererConfig, RenderingMode, SampleCount};
use crate::render::vulkan::{GpuContext, VulkanError, VulkanResult};

/// Minimum fraction of samples shaded when per-sample shading is on
pub const MIN_SAMPLE_SHADING: f32 = 0.2;

/// Push constant block shared by the vertex and fragment stages
///
/// Model matrix followed by a 64-byte material block.
pub const fn default_push_constant_range() -> vk::PushConstantRange {
    vk::PushConstantRange {
        stage_flags: vk::ShaderStageFlags::from_raw(
            vk::ShaderStageFlags::VERTEX.as_raw() | vk::ShaderStageFlags::FRAGMENT.as_raw(),
        ),
        offset: 0,
        size: 128,
    }
}

/// Inputs that select a pipeline variant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    /// Polygon rasterization mode
    pub rendering_mode: RenderingMode,
    /// Rasterization sample count
    pub msaa_samples: SampleCount,
    /// Per-sample shading when multisampling
    pub sample_shading: bool,
    /// SPIR-V vertex shader
    pub vertex_shader: PathBuf,
    /// SPIR-V fragment shader
    pub fragment_shader: PathBuf,
}

impl PipelineSettings {
    /// Settings taken verbatim from the renderer configuration
    pub fn from_config(config: &RendererConfig) -> Self {
        Self {
            rendering_mode: config.rendering_mode,
            msaa_samples: config.msaa_samples,
            sample_shading: config.sample_shading,
            vertex_shader: config.vertex_shader_path(),
            fragment_shader: config.fragment_shader_path(),
        }
    }

    /// Settings with the sample count lowered to what the device supports
    pub fn for_device(config: &RendererConfig, supported_samples: vk::SampleCountFlags) -> Self {
        let mut settings = Self::from_config(config);
        let clamped = settings.msaa_samples.clamp_to(supported_samples);
        if clamped != settings.msaa_samples {
            log::warn!(
                "{} samples unsupported, using {}",
                settings.msaa_samples.samples(),
                clamped.samples()
            );
            settings.msaa_samples = clamped;
        }
        settings
    }
}

/// Fixed-function state of one pipeline build
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineState {
    /// Primitive topology
    pub topology: vk::PrimitiveTopology,
    /// Fill, line or point rasterization
    pub polygon_mode: vk::PolygonMode,
    /// Faces discarded by culling
    pub cull_mode: vk::CullModeFlags,
    /// Winding treated as front-facing
    pub front_face: vk::FrontFace,
    /// Rasterization samples
    pub samples: vk::SampleCountFlags,
    /// Per-sample shading on
    pub sample_shading_enable: bool,
    /// Minimum shaded sample fraction
    pub min_sample_shading: f32,
    /// Depth test on
    pub depth_test_enable: bool,
    /// Depth writes on
    pub depth_write_enable: bool,
    /// Depth comparison
    pub depth_compare_op: vk::CompareOp,
    /// Color blending on
    pub blend_enable: bool,
    /// States supplied at draw time
    pub dynamic_states: [vk::DynamicState; 2],
}

impl PipelineState {
    /// Derive every fixed-function choice from `settings`
    pub fn derive(settings: &PipelineSettings) -> Self {
        let sample_shading_enable = settings.sample_shading && settings.msaa_samples.is_multisampled();

        Self {
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            polygon_mode: settings.rendering_mode.polygon_mode(),
            cull_mode: vk::CullModeFlags::FRONT,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            samples: settings.msaa_samples.as_vk(),
            sample_shading_enable,
            min_sample_shading: if sample_shading_enable { MIN_SAMPLE_SHADING } else { 1.0 },
            depth_test_enable: true,
            depth_write_enable: true,
            depth_compare_op: vk::CompareOp::LESS,
            blend_enable: false,
            dynamic_states: [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR],
        }
    }

    /// Color attachment state; the alpha factors only apply when blending is on
    pub fn color_blend_attachment(&self) -> vk::PipelineColorBlendAttachmentState {
        vk::PipelineColorBlendAttachmentState {
            blend_enable: self.blend_enable.into(),
            src_color_blend_factor: vk::BlendFactor::SRC_ALPHA,
            dst_color_blend_factor: vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
            color_blend_op: vk::BlendOp::ADD,
            src_alpha_blend_factor: vk::BlendFactor::ONE,
            dst_alpha_blend_factor: vk::BlendFactor::ZERO,
            alpha_blend_op: vk::BlendOp::ADD,
            color_write_mask: vk::ColorComponentFlags::RGBA,
        }
    }

    /// Device features this state depends on, checked against `enabled`
    pub fn check_features(&self, enabled: &vk::PhysicalDeviceFeatures) -> VulkanResult<()> {
        if self.polygon_mode != vk::PolygonMode::FILL && enabled.fill_mode_non_solid != vk::TRUE {
            return Err(VulkanError::invalid(format!(
                "{:?} polygon mode needs the fillModeNonSolid feature",
                self.polygon_mode
            )));
        }
        if self.sample_shading_enable && enabled.sample_rate_shading != vk::TRUE {
            return Err(VulkanError::invalid("Sample shading needs the sampleRateShading feature"));
        }
        Ok(())
    }
}

/// Graphics pipeline wrapper with RAII cleanup
pub struct GraphicsPipeline {
    device: Device,
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
    state: PipelineState,
    settings: PipelineSettings,
}

impl GraphicsPipeline {
    /// Create the pipeline layout and graphics pipeline
    pub fn new(
        context: &GpuContext,
        render_pass: vk::RenderPass,
        settings: &PipelineSettings,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constant_range: vk::PushConstantRange,
    ) -> VulkanResult<Self> {
        let device = context.device();
        let state = PipelineState::derive(settings);
        state.check_features(context.enabled_features())?;

        let vertex_shader = ShaderModule::from_file(device, &settings.vertex_shader)?;
        let fragment_shader = ShaderModule::from_file(device, &settings.fragment_shader)?;
        let shader_stages = [
            vertex_shader.create_stage_info(vk::ShaderStageFlags::VERTEX),
            fragment_shader.create_stage_info(vk::ShaderStageFlags::FRAGMENT),
        ];

        let bindings = [VulkanVertexLayout::binding_description()];
        let attributes = VulkanVertexLayout::attribute_descriptions();
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(state.topology)
            .primitive_restart_enable(false);

        // Viewport and scissor are dynamic; only the counts are fixed
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(state.polygon_mode)
            .line_width(1.0)
            .cull_mode(state.cull_mode)
            .front_face(state.front_face)
            .depth_bias_enable(false);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .rasterization_samples(state.samples)
            .sample_shading_enable(state.sample_shading_enable)
            .min_sample_shading(state.min_sample_shading)
            .alpha_to_coverage_enable(false)
            .alpha_to_one_enable(false);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(state.depth_test_enable)
            .depth_write_enable(state.depth_write_enable)
            .depth_compare_op(state.depth_compare_op)
            .depth_bounds_test_enable(false)
            .min_depth_bounds(0.0)
            .max_depth_bounds(1.0)
            .stencil_test_enable(false);

        let color_blend_attachments = [state.color_blend_attachment()];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .logic_op(vk::LogicOp::COPY)
            .attachments(&color_blend_attachments);

        let dynamic_state = vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&state.dynamic_states);

        let push_constant_ranges = [push_constant_range];
        let layout_info = vk::PipelineLayoutCreateInfo::builder()
            .set_layouts(set_layouts)
            .push_constant_ranges(&push_constant_ranges);
        let layout = unsafe {
            device
                .create_pipeline_layout(&layout_info, None)
                .map_err(VulkanError::creation("pipeline layout"))?
        };

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .render_pass(render_pass)
            .subpass(0);

        let created = unsafe {
            device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info.build()], None)
        };
        let pipeline = match created.map(|pipelines| pipelines.into_iter().next()) {
            Ok(Some(pipeline)) => pipeline,
            Ok(None) => {
                unsafe { device.destroy_pipeline_layout(layout, None) };
                return Err(VulkanError::invalid("Driver returned no graphics pipeline"));
            }
            Err((_, result)) => {
                unsafe { device.destroy_pipeline_layout(layout, None) };
                return Err(VulkanError::creation("graphics pipeline")(result));
            }
        };

        log::info!(
            "Graphics pipeline built ({:?}, {} samples, sample shading: {})",
            settings.rendering_mode,
            settings.msaa_samples.samples(),
            state.sample_shading_enable
        );

        Ok(Self {
            device: device.clone(),
            pipeline,
            layout,
            state,
            settings: settings.clone(),
        })
    }

    /// Get pipeline handle
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    /// Get layout handle
    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }

    /// Fixed-function state the pipeline was built with
    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    /// Settings the pipeline was built from
    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
            self.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn settings(mode: RenderingMode, samples: SampleCount, shading: bool) -> PipelineSettings {
        let config = RendererConfig::default()
            .with_rendering_mode(mode)
            .with_multisampling(samples, shading);
        PipelineSettings::from_config(&config)
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let settings = settings(RenderingMode::Wireframe, SampleCount::X4, true);
        let first = PipelineState::derive(&settings);
        let second = PipelineState::derive(&settings.clone());

        assert_eq!(first.polygon_mode, second.polygon_mode);
        assert_eq!(first.sample_shading_enable, second.sample_shading_enable);
        assert_relative_eq!(first.min_sample_shading, second.min_sample_shading);
        assert_eq!(first, second);
    }

    #[test]
    fn test_sample_shading_with_msaa() {
        let state = PipelineState::derive(&settings(RenderingMode::Fill, SampleCount::X8, true));
        assert!(state.sample_shading_enable);
        assert_relative_eq!(state.min_sample_shading, 0.2);
        assert_eq!(state.samples, vk::SampleCountFlags::TYPE_8);
    }

    #[test]
    fn test_sample_shading_off_for_single_sample() {
        let state = PipelineState::derive(&settings(RenderingMode::Fill, SampleCount::X1, true));
        assert!(!state.sample_shading_enable);
        assert_relative_eq!(state.min_sample_shading, 1.0);
    }

    #[test]
    fn test_fixed_state() {
        let state = PipelineState::derive(&settings(RenderingMode::Point, SampleCount::X1, false));
        assert_eq!(state.polygon_mode, vk::PolygonMode::POINT);
        assert_eq!(state.topology, vk::PrimitiveTopology::TRIANGLE_LIST);
        assert_eq!(state.cull_mode, vk::CullModeFlags::FRONT);
        assert_eq!(state.front_face, vk::FrontFace::COUNTER_CLOCKWISE);
        assert!(state.depth_test_enable && state.depth_write_enable);
        assert_eq!(state.depth_compare_op, vk::CompareOp::LESS);
        let blend = state.color_blend_attachment();
        assert_eq!(blend.blend_enable, vk::FALSE);
        assert_eq!(blend.color_write_mask, vk::ColorComponentFlags::RGBA);
        assert_eq!(blend.src_color_blend_factor, vk::BlendFactor::SRC_ALPHA);
        assert_eq!(blend.dst_alpha_blend_factor, vk::BlendFactor::ZERO);
        assert_eq!(state.dynamic_states, [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR]);
    }

    #[test]
    fn test_feature_check() {
        let state = PipelineState::derive(&settings(RenderingMode::Wireframe, SampleCount::X1, false));
        assert!(state.check_features(&vk::PhysicalDeviceFeatures::default()).is_err());

        let enabled = vk::PhysicalDeviceFeatures { fill_mode_non_solid: vk::TRUE, ..Default::default() };
        assert!(state.check_features(&enabled).is_ok());
    }

    #[test]
    fn test_for_device_clamps_samples() {
        let config = RendererConfig::default().with_multisampling(SampleCount::X16, false);
        let supported = vk::SampleCountFlags::TYPE_1 | vk::SampleCountFlags::TYPE_4;
        assert_eq!(PipelineSettings::for_device(&config, supported).msaa_samples, SampleCount::X4);
    }

    #[test]
    fn test_default_push_constant_range() {
        let range = default_push_constant_range();
        assert_eq!(range.offset, 0);
        assert_eq!(range.size, 128);
        assert_eq!(range.stage_flags, vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT);
    }
}
