//! Unit tests for reflected binding checks (no GPU required)

use stellar_3d_renderer::stellar3d::Error;
use stellar_3d_renderer::stellar3d::render::{
    DescriptorSetLayoutDesc, DescriptorType, ShaderStage, ShaderStageFlags,
};
use crate::vulkan_shader::{check_reflected_bindings, spirq_descriptor_type, ReflectedBinding};

fn reflected(name: &str, set: u32, binding: u32, ty: Option<DescriptorType>) -> ReflectedBinding {
    ReflectedBinding {
        name: name.to_string(),
        set,
        binding,
        descriptor_type: ty,
    }
}

fn lighting_layouts() -> Vec<DescriptorSetLayoutDesc> {
    vec![
        DescriptorSetLayoutDesc::sequential(&[DescriptorType::UniformBuffer], ShaderStageFlags::ALL_GRAPHICS),
        DescriptorSetLayoutDesc::sequential(
            &[DescriptorType::InputAttachment, DescriptorType::InputAttachment],
            ShaderStageFlags::FRAGMENT,
        ),
    ]
}

// ============================================================================
// REFLECTION VS DECLARED LAYOUTS
// ============================================================================

#[test]
fn test_matching_bindings_pass() {
    let fragment = [
        reflected("frame", 0, 0, Some(DescriptorType::UniformBuffer)),
        reflected("albedo", 1, 0, Some(DescriptorType::InputAttachment)),
        reflected("normal", 1, 1, Some(DescriptorType::InputAttachment)),
    ];
    let result = check_reflected_bindings(
        "lighting",
        &[(ShaderStage::Fragment, &fragment[..])],
        &lighting_layouts(),
    );
    assert!(result.is_ok());
}

#[test]
fn test_undeclared_binding_is_invalid_resource() {
    let fragment = [reflected("ssao", 1, 2, Some(DescriptorType::InputAttachment))];
    let result = check_reflected_bindings(
        "lighting",
        &[(ShaderStage::Fragment, &fragment[..])],
        &lighting_layouts(),
    );
    match result {
        Err(Error::InvalidResource(message)) => assert!(message.contains("ssao")),
        other => panic!("expected InvalidResource, got {:?}", other),
    }
}

#[test]
fn test_missing_set_is_invalid_resource() {
    let vertex = [reflected("cascades", 3, 0, Some(DescriptorType::UniformBuffer))];
    let result = check_reflected_bindings(
        "shadow",
        &[(ShaderStage::Vertex, &vertex[..])],
        &lighting_layouts(),
    );
    assert!(matches!(result, Err(Error::InvalidResource(_))));
}

#[test]
fn test_type_mismatch_is_invalid_resource() {
    let fragment = [reflected("albedo", 1, 0, Some(DescriptorType::CombinedImageSampler))];
    let result = check_reflected_bindings(
        "lighting",
        &[(ShaderStage::Fragment, &fragment[..])],
        &lighting_layouts(),
    );
    match result {
        Err(Error::InvalidResource(message)) => assert!(message.contains("CombinedImageSampler")),
        other => panic!("expected InvalidResource, got {:?}", other),
    }
}

#[test]
fn test_unsupported_descriptor_kind_is_rejected() {
    let fragment = [reflected("texel", 0, 0, None)];
    let result = check_reflected_bindings(
        "lighting",
        &[(ShaderStage::Fragment, &fragment[..])],
        &lighting_layouts(),
    );
    assert!(matches!(result, Err(Error::BackendError(_))));
}

// ============================================================================
// SPIR-V DESCRIPTOR KIND MAPPING
// ============================================================================

#[test]
fn test_spirq_descriptor_kinds_map_to_engine_types() {
    use spirq::ty::{AccessType, DescriptorType as Spv};

    assert_eq!(spirq_descriptor_type(&Spv::UniformBuffer()), Some(DescriptorType::UniformBuffer));
    assert_eq!(
        spirq_descriptor_type(&Spv::StorageBuffer(AccessType::ReadWrite)),
        Some(DescriptorType::StorageBuffer)
    );
    assert_eq!(
        spirq_descriptor_type(&Spv::CombinedImageSampler()),
        Some(DescriptorType::CombinedImageSampler)
    );
    assert_eq!(spirq_descriptor_type(&Spv::InputAttachment(2)), Some(DescriptorType::InputAttachment));
    assert_eq!(
        spirq_descriptor_type(&Spv::StorageImage(AccessType::WriteOnly)),
        Some(DescriptorType::StorageImage)
    );
    assert_eq!(spirq_descriptor_type(&Spv::AccelStruct()), Some(DescriptorType::AccelerationStructure));
}

#[test]
fn test_spirq_unhandled_descriptor_kinds_map_to_none() {
    use spirq::ty::DescriptorType as Spv;

    assert_eq!(spirq_descriptor_type(&Spv::Sampler()), None);
    assert_eq!(spirq_descriptor_type(&Spv::SampledImage()), None);
}
