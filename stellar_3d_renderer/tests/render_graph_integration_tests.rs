//! Integration tests for the render graph with VulkanGraphicsDevice
//!
//! No SPIR-V ships with the crate, so these tests exercise everything the
//! graph builds before its passes load shaders: the attachment store, the
//! five-subpass render pass and one framebuffer per swapchain image.
//!
//! Run with: cargo test --test render_graph_integration_tests -- --ignored

mod gpu_test_utils;

use std::sync::Arc;

use stellar_3d_renderer::stellar3d::Error;
use stellar_3d_renderer::stellar3d::graph::{AttachmentSlot, AttachmentStore, GraphState, MainCameraPass};
use stellar_3d_renderer::stellar3d::pass::{SceneResources, ShaderLibrary, ShaderProgram};
use stellar_3d_renderer::stellar3d::render::{
    Extent2D, GraphicsDevice, PipelineVariant, ShaderStage, TextureDesc, TextureFormat, TextureType,
    TextureUsage, VertexAttribute, VertexBinding, VertexInputRate, VertexLayout,
};
use gpu_test_utils::{get_test_graphics_device, test_config};
use serial_test::serial;

/// Library without any program
struct EmptyShaderLibrary;

impl ShaderLibrary for EmptyShaderLibrary {
    fn spirv(&self, _program: ShaderProgram, _stage: ShaderStage) -> Option<&[u32]> {
        None
    }
}

fn scene_resources(device: &dyn GraphicsDevice) -> SceneResources {
    let environment_map = device
        .create_texture(TextureDesc {
            label: "environment",
            width: 16,
            height: 16,
            format: TextureFormat::R16G16B16A16_SFLOAT,
            usage: TextureUsage::SAMPLED,
            texture_type: TextureType::Cube,
            array_layers: 6,
            mip_levels: 1,
            data: None,
        })
        .unwrap();
    SceneResources {
        environment_map,
        vertex_layout: VertexLayout {
            bindings: vec![VertexBinding { binding: 0, stride: 32, input_rate: VertexInputRate::Vertex }],
            attributes: vec![
                VertexAttribute { location: 0, binding: 0, format: TextureFormat::R32G32B32_SFLOAT, offset: 0 },
                VertexAttribute { location: 1, binding: 0, format: TextureFormat::R32G32B32_SFLOAT, offset: 12 },
                VertexAttribute { location: 2, binding: 0, format: TextureFormat::R32G32_SFLOAT, offset: 24 },
            ],
        },
        acceleration_structure: None,
    }
}

// ============================================================================
// ATTACHMENT STORE TESTS
// ============================================================================

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_integration_attachment_store_rebuild() {
    let device = get_test_graphics_device();
    let slots = AttachmentSlot::required(PipelineVariant::Deferred);
    let mut store = AttachmentStore::new();

    store.rebuild(device, Extent2D::new(800, 600), &slots).unwrap();
    assert_eq!(store.len(), slots.len());
    let generation = store.generation();

    store.rebuild(device, Extent2D::new(1024, 768), &slots).unwrap();
    assert_eq!(store.extent(), Extent2D::new(1024, 768));
    assert!(store.generation() > generation);
    for slot in &slots {
        let texture = store.texture(*slot).unwrap();
        assert_eq!((texture.info().width, texture.info().height), (1024, 768));
    }

    store.clear();
    assert!(store.is_empty());
}

// ============================================================================
// MAIN CAMERA PASS TESTS
// ============================================================================

#[test]
#[ignore] // Requires GPU and display
#[serial]
fn test_integration_graph_init_fails_on_missing_shader() {
    let device = get_test_graphics_device();
    let swapchain = device.create_swapchain(800, 600).unwrap();

    let mut graph = MainCameraPass::new(test_config(), Arc::new(EmptyShaderLibrary), None);
    let result = graph.initialize(device, swapchain.as_ref(), scene_resources(device));

    // The render pass and framebuffers were built; the first pass then
    // found no shader and everything was released again
    assert!(matches!(result, Err(Error::InitializationFailed(_))));
    assert_eq!(graph.state(), GraphState::Uninitialized);
    assert!(graph.attachments().is_empty());
    assert_eq!(graph.framebuffer_count(), 0);

    device.wait_idle().unwrap();
}

#[test]
#[ignore] // Requires GPU and display
#[serial]
fn test_integration_graph_ray_traced_variant_without_support() {
    let device = get_test_graphics_device();
    if device.capabilities().ray_tracing {
        return;
    }
    let swapchain = device.create_swapchain(800, 600).unwrap();

    let mut config = test_config();
    config.pipeline_variant = PipelineVariant::RayTraced;
    let mut graph = MainCameraPass::new(config, Arc::new(EmptyShaderLibrary), None);
    let result = graph.initialize(device, swapchain.as_ref(), scene_resources(device));

    assert!(result.is_err());
    assert_eq!(graph.state(), GraphState::Uninitialized);
}
