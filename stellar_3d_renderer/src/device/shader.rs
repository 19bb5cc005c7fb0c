/// Shader trait and shader descriptor

use bitflags::bitflags;

/// Shader stage of a single module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
    RayGen,
    Miss,
    ClosestHit,
}

impl ShaderStage {
    pub fn flags(&self) -> ShaderStageFlags {
        match self {
            ShaderStage::Vertex => ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => ShaderStageFlags::FRAGMENT,
            ShaderStage::Compute => ShaderStageFlags::COMPUTE,
            ShaderStage::RayGen => ShaderStageFlags::RAYGEN,
            ShaderStage::Miss => ShaderStageFlags::MISS,
            ShaderStage::ClosestHit => ShaderStageFlags::CLOSEST_HIT,
        }
    }
}

bitflags! {
    /// Set of shader stages (descriptor and push constant visibility)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderStageFlags: u32 {
        const VERTEX = 1 << 0;
        const FRAGMENT = 1 << 1;
        const COMPUTE = 1 << 2;
        const RAYGEN = 1 << 3;
        const MISS = 1 << 4;
        const CLOSEST_HIT = 1 << 5;
        const ALL_GRAPHICS = Self::VERTEX.bits() | Self::FRAGMENT.bits();
        const ALL_RAY_TRACING = Self::RAYGEN.bits() | Self::MISS.bits() | Self::CLOSEST_HIT.bits();
    }
}

/// Descriptor for creating a shader module from SPIR-V words
#[derive(Debug, Clone, Copy)]
pub struct ShaderDesc<'a> {
    pub code: &'a [u32],
    pub stage: ShaderStage,
    pub entry_point: &'a str,
}

/// Shader module trait
pub trait Shader: Send + Sync {
    fn stage(&self) -> ShaderStage;
}
