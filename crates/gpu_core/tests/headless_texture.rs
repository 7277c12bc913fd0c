//! Texture and pipeline construction against a real device
//!
//! These tests need a Vulkan driver and are ignored by default:
//! `cargo test -p gpu_core -- --ignored`

use ash::vk;
use gpu_core::prelude::*;
use gpu_core::render::vulkan::{default_push_constant_range, PhysicalDeviceInfo, VulkanInstance};

struct Harness {
    // Field order is drop order
    pool: DescriptorPool,
    layout: DescriptorSetLayout,
    sampler: Sampler,
    context: GpuContext,
    _instance: VulkanInstance,
}

impl Harness {
    fn new(config: &RendererConfig) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();

        let instance = VulkanInstance::from_config(config).expect("Vulkan instance");
        let (physical, queues) = PhysicalDeviceInfo::select_headless(&instance.instance).expect("GPU");
        let context = GpuContext::new(&instance, physical, queues, config).expect("context");

        let sampler = Sampler::new(&context, SamplerSettings::from_config(config, 12)).expect("sampler");
        let layout = DescriptorSetLayoutBuilder::new()
            .add_texture_slots()
            .build(context.device())
            .expect("layout");
        let pool = DescriptorPool::from_config(context.device(), config).expect("pool");

        Self { pool, layout, sampler, context, _instance: instance }
    }

    fn bindings(&self) -> TextureBindings<'_> {
        TextureBindings {
            sampler: &self.sampler,
            descriptor_set_layout: &self.layout,
            descriptor_pool: &self.pool,
        }
    }
}

fn checkerboard(width: u32, height: u32) -> Vec<u8> {
    (0..width * height)
        .flat_map(|i| if (i / width + i % width) % 2 == 0 { [255, 255, 255, 255] } else { [0, 0, 0, 255] })
        .collect()
}

#[test]
#[ignore = "requires a Vulkan driver"]
fn texture_keeps_dimensions_and_mip_count() {
    let harness = Harness::new(&RendererConfig::default());
    let pixels = checkerboard(300, 17);

    let texture = Texture::build(
        &harness.context,
        &TextureSettings::default(),
        &harness.bindings(),
        300,
        17,
        &pixels,
    )
    .expect("texture build");

    assert_eq!(texture.width(), 300);
    assert_eq!(texture.height(), 17);
    assert_eq!(texture.mip_levels(), 9);
    assert_eq!(texture.memory_size(), 300 * 17 * 4);
    assert_eq!(texture.image().layouts().uniform_layout(), Some(ImageLayout::ShaderReadOnly));
    assert_ne!(texture.handle(), vk::DescriptorSet::null());

    let live = harness.context.allocation_stats().live_allocations();
    drop(texture);
    assert_eq!(harness.context.allocation_stats().live_allocations(), live - 1);
}

#[test]
#[ignore = "requires a Vulkan driver"]
fn staging_memory_is_released_after_build() {
    let harness = Harness::new(&RendererConfig::default());

    let texture = Texture::placeholder(&harness.context, &harness.bindings(), TextureType::Normal).expect("placeholder");
    assert_eq!((texture.width(), texture.height(), texture.mip_levels()), (1, 1, 1));

    // Only the image memory outlives the build
    assert_eq!(harness.context.allocation_stats().live_allocations(), 1);
}

#[test]
#[ignore = "requires a Vulkan driver"]
fn rejected_format_allocates_nothing() {
    let harness = Harness::new(&RendererConfig::default());
    let settings = TextureSettings {
        colors: ColorComponents::RedGreenBlue,
        ..TextureSettings::default()
    };

    let features = harness.context.format_properties(ColorComponents::RedGreenBlue.format()).optimal_tiling_features;
    let result = Texture::build(&harness.context, &settings, &harness.bindings(), 8, 8, &[0; 8 * 8 * 3]);

    if features.contains(vk::FormatFeatureFlags::SAMPLED_IMAGE | vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR) {
        assert!(result.is_ok());
    } else {
        assert!(matches!(result, Err(VulkanError::UnsupportedFormat { .. })));
        assert_eq!(harness.context.allocation_stats().total_allocations(), 0);
    }
}

#[test]
#[ignore = "requires a Vulkan driver"]
fn malformed_pixels_fall_back_to_placeholder() {
    let harness = Harness::new(&RendererConfig::default());

    let err = Texture::build(
        &harness.context,
        &TextureSettings::default(),
        &harness.bindings(),
        4,
        4,
        &[0; 10],
    )
    .err()
    .expect("short pixel data must fail");
    assert!(err.is_recoverable());
    assert_eq!(harness.context.allocation_stats().live_allocations(), 0);

    let placeholder = Texture::placeholder(&harness.context, &harness.bindings(), TextureType::Diffuse);
    assert!(placeholder.is_ok());
}

#[test]
#[ignore = "requires a Vulkan driver"]
fn config_without_mipmaps_builds_single_level() {
    let config = RendererConfig { generate_mipmaps: false, ..RendererConfig::default() };
    let harness = Harness::new(&config);

    let texture = Texture::build(
        &harness.context,
        &TextureSettings::from_config(&config),
        &harness.bindings(),
        64,
        64,
        &checkerboard(64, 64),
    )
    .expect("texture build");
    assert_eq!(texture.mip_levels(), 1);
}

#[test]
#[ignore = "requires a Vulkan driver"]
fn host_copy_into_device_local_buffer_is_rejected() {
    let harness = Harness::new(&RendererConfig::default());
    let buffer = Buffer::new(
        &harness.context,
        64,
        vk::BufferUsageFlags::TRANSFER_DST,
        vk::MemoryPropertyFlags::DEVICE_LOCAL,
    )
    .expect("buffer");

    // Skip devices whose only device-local memory is also host-visible
    if buffer.memory().is_host_visible() {
        return;
    }
    let err = buffer.copy_bytes(&[1; 16]).unwrap_err();
    assert!(matches!(err, VulkanError::InvalidOperation { .. }));
}

#[test]
#[ignore = "requires a Vulkan driver"]
fn upload_to_device_local_releases_staging() {
    let harness = Harness::new(&RendererConfig::default());
    let bytes: Vec<u8> = (0..=255).collect();

    let buffer = StagingBuffer::upload_to_device_local(&harness.context, &bytes, vk::BufferUsageFlags::VERTEX_BUFFER)
        .expect("upload");

    assert!(buffer.size() >= 256);
    assert!(buffer.usage().contains(vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST));
    assert_eq!(harness.context.allocation_stats().live_allocations(), 1);
    assert_eq!(harness.context.allocation_stats().total_allocations(), 2);
}

#[test]
#[ignore = "requires a Vulkan driver"]
fn retired_texture_returns_its_descriptor_set() {
    let config = RendererConfig { descriptor_pool_capacity: 1, ..RendererConfig::default() };
    let harness = Harness::new(&config);

    let first = Texture::placeholder(&harness.context, &harness.bindings(), TextureType::Diffuse).expect("first");
    // The single set is taken
    assert!(Texture::placeholder(&harness.context, &harness.bindings(), TextureType::Diffuse).is_err());

    first.retire(&harness.pool).expect("retire");
    assert!(Texture::placeholder(&harness.context, &harness.bindings(), TextureType::Diffuse).is_ok());
}

#[test]
#[ignore = "requires a Vulkan driver"]
fn retire_rejects_foreign_pool() {
    let harness = Harness::new(&RendererConfig::default());
    let other = DescriptorPool::new(harness.context.device(), 1).expect("pool");

    let texture = Texture::placeholder(&harness.context, &harness.bindings(), TextureType::Height).expect("placeholder");
    assert!(matches!(texture.retire(&other), Err(VulkanError::InvalidOperation { .. })));
}

#[test]
#[ignore = "requires a Vulkan driver and compiled shaders"]
fn pipeline_rebuild_keeps_publishing() {
    let config = RendererConfig::default();
    if !config.vertex_shader_path().exists() || !config.fragment_shader_path().exists() {
        eprintln!("skipping: no shaders in {}", config.shader_directory.display());
        return;
    }

    let harness = Harness::new(&config);
    let device = harness.context.device();
    let render_pass = create_render_pass(device);

    let settings = PipelineSettings::for_device(&config, harness.context.physical_device().supported_sample_counts());
    let layouts = [harness.layout.handle()];
    let mut manager = PipelineManager::new(
        &harness.context,
        render_pass,
        &settings,
        &layouts,
        default_push_constant_range(),
    )
    .expect("initial pipeline");

    let first = manager.current().handle();
    // Wireframe needs fillModeNonSolid, which the default config did not enable
    assert!(manager.set_rendering_mode(&harness.context, RenderingMode::Wireframe).is_err());
    assert_eq!(manager.current().handle(), first);
    assert_eq!(manager.settings().rendering_mode, RenderingMode::Fill);

    drop(manager);
    unsafe { device.destroy_render_pass(render_pass, None) };
}

fn create_render_pass(device: &ash::Device) -> vk::RenderPass {
    let attachments = [
        vk::AttachmentDescription::builder()
            .format(vk::Format::B8G8R8A8_SRGB)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .build(),
        vk::AttachmentDescription::builder()
            .format(vk::Format::D32_SFLOAT)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
            .build(),
    ];
    let color_refs = [vk::AttachmentReference {
        attachment: 0,
        layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    }];
    let depth_ref = vk::AttachmentReference {
        attachment: 1,
        layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
    };
    let subpasses = [vk::SubpassDescription::builder()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_refs)
        .depth_stencil_attachment(&depth_ref)
        .build()];

    let info = vk::RenderPassCreateInfo::builder().attachments(&attachments).subpasses(&subpasses);
    unsafe { device.create_render_pass(&info, None) }.expect("render pass")
}
