/// Shader - Vulkan implementation of the Shader trait
///
/// Each module is reflected with spirq at creation; pipelines check the
/// declared descriptor layouts against the reflected bindings.

use stellar_3d_renderer::stellar3d::{Result, Error};
use stellar_3d_renderer::stellar3d::render::{
    DescriptorSetLayoutDesc, DescriptorType, Shader as RendererShader, ShaderDesc, ShaderStage,
};
use stellar_3d_renderer::{engine_bail, engine_err};
use ash::vk;
use std::ffi::CString;
use std::sync::Arc;

use crate::vulkan_context::GpuContext;

const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Descriptor binding read from the SPIR-V of a module
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ReflectedBinding {
    pub name: String,
    pub set: u32,
    pub binding: u32,
    /// `None` for descriptor kinds the engine never declares (texel buffers, separate samplers)
    pub descriptor_type: Option<DescriptorType>,
}

/// Vulkan shader implementation
pub struct Shader {
    ctx: Arc<GpuContext>,
    pub(crate) module: vk::ShaderModule,
    stage: ShaderStage,
    pub(crate) entry_point: CString,
    bindings: Vec<ReflectedBinding>,
}

impl Shader {
    pub(crate) fn new(ctx: Arc<GpuContext>, desc: ShaderDesc) -> Result<Self> {
        if desc.code.first() != Some(&SPIRV_MAGIC) {
            return Err(Error::InvalidResource(format!(
                "{:?} shader '{}' is not SPIR-V (missing magic number)",
                desc.stage, desc.entry_point
            )));
        }

        let entry_point = CString::new(desc.entry_point).map_err(|_| {
            Error::InvalidResource(format!("shader entry point '{}' contains a NUL byte", desc.entry_point))
        })?;

        let bindings = reflect_bindings(desc.code)?;

        let create_info = vk::ShaderModuleCreateInfo::default().code(desc.code);
        let module = unsafe {
            ctx.device.create_shader_module(&create_info, None)
                .map_err(|e| engine_err!("stellar3d::vulkan", "Failed to create shader module: {:?}", e))?
        };

        Ok(Self {
            ctx,
            module,
            stage: desc.stage,
            entry_point,
            bindings,
        })
    }

    pub(crate) fn reflection(&self) -> (ShaderStage, &[ReflectedBinding]) {
        (self.stage, &self.bindings)
    }
}

impl RendererShader for Shader {
    fn stage(&self) -> ShaderStage {
        self.stage
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.destroy_shader_module(self.module, None);
        }
    }
}

fn reflect_bindings(code: &[u32]) -> Result<Vec<ReflectedBinding>> {
    let entry_points = spirq::ReflectConfig::new()
        .spv(code)
        .ref_all_rscs(true)
        .reflect()
        .map_err(|e| engine_err!("stellar3d::vulkan", "SPIR-V reflection failed: {:?}", e))?;

    let mut bindings = Vec::new();
    for entry_point in &entry_points {
        for var in entry_point.vars.iter() {
            if let spirq::var::Variable::Descriptor { name, desc_bind, desc_ty, .. } = var {
                let reflected = ReflectedBinding {
                    name: name.clone().unwrap_or_default(),
                    set: desc_bind.set(),
                    binding: desc_bind.bind(),
                    descriptor_type: spirq_descriptor_type(desc_ty),
                };
                if !bindings.contains(&reflected) {
                    bindings.push(reflected);
                }
            }
        }
    }
    Ok(bindings)
}

pub(crate) fn spirq_descriptor_type(desc_ty: &spirq::ty::DescriptorType) -> Option<DescriptorType> {
    use spirq::ty::DescriptorType as Spv;
    match desc_ty {
        Spv::UniformBuffer(..) => Some(DescriptorType::UniformBuffer),
        Spv::StorageBuffer(..) => Some(DescriptorType::StorageBuffer),
        Spv::CombinedImageSampler(..) => Some(DescriptorType::CombinedImageSampler),
        Spv::InputAttachment(..) => Some(DescriptorType::InputAttachment),
        Spv::StorageImage(..) => Some(DescriptorType::StorageImage),
        Spv::AccelStruct(..) => Some(DescriptorType::AccelerationStructure),
        _ => None,
    }
}

/// Check every binding a shader reads against the layouts the pipeline declares
///
/// A binding absent from `set_layouts`, or declared with another type, is
/// an `InvalidResource` error naming the shader variable.
pub(crate) fn check_reflected_bindings(
    label: &str,
    shaders: &[(ShaderStage, &[ReflectedBinding])],
    set_layouts: &[DescriptorSetLayoutDesc],
) -> Result<()> {
    for (stage, bindings) in shaders {
        for reflected in bindings.iter() {
            let declared = set_layouts
                .get(reflected.set as usize)
                .and_then(|layout| layout.bindings.iter().find(|b| b.binding == reflected.binding));

            match (declared, reflected.descriptor_type) {
                (None, _) => {
                    return Err(Error::InvalidResource(format!(
                        "pipeline '{}': {:?} shader reads '{}' at set {} binding {} which no layout declares",
                        label, stage, reflected.name, reflected.set, reflected.binding
                    )));
                }
                (Some(declared), Some(ty)) if declared.descriptor_type != ty => {
                    return Err(Error::InvalidResource(format!(
                        "pipeline '{}': '{}' at set {} binding {} is {:?} in the shader but declared {:?}",
                        label, reflected.name, reflected.set, reflected.binding, ty, declared.descriptor_type
                    )));
                }
                (Some(_), None) => {
                    engine_bail!("stellar3d::vulkan",
                        "pipeline '{}': unsupported descriptor kind for '{}' at set {} binding {}",
                        label, reflected.name, reflected.set, reflected.binding);
                }
                _ => {}
            }
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "vulkan_shader_tests.rs"]
mod tests;
