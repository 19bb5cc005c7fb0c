/// DescriptorSet trait, binding resources and acceleration structures

use crate::device::{Buffer, DescriptorSetLayoutDesc, DescriptorType, Texture};
use crate::error::{Error, Result};

/// Predefined sampler configurations, shared by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamplerType {
    LinearClamp,
    NearestClamp,
    LinearRepeat,
    /// Depth comparison sampler (`LessOrEqual`) for shadow maps
    ShadowCompare,
}

/// A GPU resource bound at one descriptor binding
///
/// The binding index is the position in the slice passed to
/// `GraphicsDevice::create_descriptor_set`.
#[derive(Clone, Copy)]
pub enum BindingResource<'a> {
    UniformBuffer(&'a dyn Buffer),
    StorageBuffer(&'a dyn Buffer),
    /// Texture default view with a shared sampler
    SampledTexture(&'a dyn Texture, SamplerType),
    /// Attachment read by `subpassLoad` in a later subpass
    InputAttachment(&'a dyn Texture),
    StorageImage(&'a dyn Texture),
    AccelerationStructure(&'a dyn AccelerationStructure),
}

impl BindingResource<'_> {
    pub fn descriptor_type(&self) -> DescriptorType {
        match self {
            BindingResource::UniformBuffer(_) => DescriptorType::UniformBuffer,
            BindingResource::StorageBuffer(_) => DescriptorType::StorageBuffer,
            BindingResource::SampledTexture(..) => DescriptorType::CombinedImageSampler,
            BindingResource::InputAttachment(_) => DescriptorType::InputAttachment,
            BindingResource::StorageImage(_) => DescriptorType::StorageImage,
            BindingResource::AccelerationStructure(_) => DescriptorType::AccelerationStructure,
        }
    }
}

/// Descriptor set trait
///
/// Immutable once created; rebuilt when a referenced resource is recreated.
pub trait DescriptorSet: Send + Sync {
    fn set_index(&self) -> u32;

    fn binding_count(&self) -> u32;
}

/// Top-level acceleration structure, built by the scene owner
pub trait AccelerationStructure: Send + Sync {
    fn device_address(&self) -> u64;
}

/// Check that `resources` match `layout` binding for binding
///
/// A mismatch is a declaration bug in the calling pass.
pub fn validate_bindings(layout: &DescriptorSetLayoutDesc, resources: &[BindingResource]) -> Result<()> {
    if layout.bindings.len() != resources.len() {
        return Err(Error::InvalidResource(format!(
            "descriptor binding count mismatch: layout has {}, got {}",
            layout.bindings.len(),
            resources.len()
        )));
    }
    for (index, (binding, resource)) in layout.bindings.iter().zip(resources).enumerate() {
        if binding.binding != index as u32 {
            return Err(Error::InvalidResource(format!(
                "descriptor layout binding {} declared at position {}",
                binding.binding, index
            )));
        }
        if binding.descriptor_type != resource.descriptor_type() {
            return Err(Error::InvalidResource(format!(
                "binding {} expects {:?}, got {:?}",
                index,
                binding.descriptor_type,
                resource.descriptor_type()
            )));
        }
    }
    Ok(())
}
