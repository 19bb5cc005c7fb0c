/// Pipeline trait and pipeline descriptors (graphics and ray tracing)

use std::sync::Arc;
use crate::device::{RenderPass, Shader, ShaderStageFlags, TextureFormat};

/// Index buffer element type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexType {
    U16,
    U32,
}

impl IndexType {
    /// Size in bytes of one index element
    pub fn size_bytes(&self) -> u32 {
        match self {
            IndexType::U16 => 2,
            IndexType::U32 => 4,
        }
    }
}

/// Vertex input rate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexInputRate {
    Vertex,
    Instance,
}

/// Vertex attribute description
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VertexAttribute {
    /// Attribute location in shader
    pub location: u32,
    pub binding: u32,
    pub format: TextureFormat,
    /// Offset in bytes from the start of the vertex
    pub offset: u32,
}

/// Vertex binding description
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VertexBinding {
    pub binding: u32,
    /// Stride in bytes between consecutive elements
    pub stride: u32,
    pub input_rate: VertexInputRate,
}

/// Vertex input layout
///
/// Empty for fullscreen passes that generate their triangle in the vertex shader.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VertexLayout {
    pub bindings: Vec<VertexBinding>,
    pub attributes: Vec<VertexAttribute>,
}

/// Descriptor type of one binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorType {
    UniformBuffer,
    StorageBuffer,
    CombinedImageSampler,
    InputAttachment,
    StorageImage,
    AccelerationStructure,
}

/// One binding of a descriptor set layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorBindingDesc {
    pub binding: u32,
    pub descriptor_type: DescriptorType,
    pub stages: ShaderStageFlags,
}

impl DescriptorBindingDesc {
    pub fn new(binding: u32, descriptor_type: DescriptorType, stages: ShaderStageFlags) -> Self {
        Self { binding, descriptor_type, stages }
    }
}

/// Layout of one descriptor set (bindings numbered from 0, in order)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DescriptorSetLayoutDesc {
    pub bindings: Vec<DescriptorBindingDesc>,
}

impl DescriptorSetLayoutDesc {
    /// Consecutive bindings 0..n of the given types, all visible to `stages`
    pub fn sequential(types: &[DescriptorType], stages: ShaderStageFlags) -> Self {
        Self {
            bindings: types
                .iter()
                .enumerate()
                .map(|(i, &ty)| DescriptorBindingDesc::new(i as u32, ty, stages))
                .collect(),
        }
    }
}

/// Push constant range descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushConstantRange {
    pub stages: ShaderStageFlags,
    /// Offset in bytes
    pub offset: u32,
    /// Size in bytes
    pub size: u32,
}

// ===== RASTERIZATION / DEPTH =====

/// Face culling mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CullMode {
    None,
    Front,
    Back,
}

/// Front face winding order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrontFace {
    CounterClockwise,
    Clockwise,
}

/// Comparison operator for depth tests and shadow samplers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Never,
    Less,
    Equal,
    LessOrEqual,
    Greater,
    NotEqual,
    GreaterOrEqual,
    Always,
}

/// Constant and slope-scaled depth bias
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthBias {
    pub constant: f32,
    pub slope: f32,
}

/// Depth test configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthState {
    pub test: bool,
    pub write: bool,
    pub compare: CompareOp,
    pub bias: Option<DepthBias>,
}

impl DepthState {
    /// No depth test, no depth write
    pub fn disabled() -> Self {
        Self { test: false, write: false, compare: CompareOp::Always, bias: None }
    }

    /// Standard opaque geometry: test and write with `Less`
    pub fn opaque() -> Self {
        Self { test: true, write: true, compare: CompareOp::Less, bias: None }
    }
}

/// Color blending applied to every color attachment of the subpass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorBlend {
    Opaque,
    AlphaBlend,
}

/// Descriptor for creating a graphics pipeline
///
/// Viewport and scissor are dynamic state, so pipelines survive swapchain
/// resizes without being rebuilt.
pub struct GraphicsPipelineDesc<'a> {
    pub label: &'static str,
    pub vertex_shader: &'a Arc<dyn Shader>,
    pub fragment_shader: Option<&'a Arc<dyn Shader>>,
    pub vertex_layout: VertexLayout,
    pub render_pass: &'a Arc<dyn RenderPass>,
    pub subpass: u32,
    pub color_attachment_count: u32,
    pub blend: ColorBlend,
    pub depth: DepthState,
    pub cull_mode: CullMode,
    pub front_face: FrontFace,
    pub set_layouts: Vec<DescriptorSetLayoutDesc>,
    pub push_constant_ranges: Vec<PushConstantRange>,
}

/// Descriptor for creating a ray tracing pipeline and its shader binding table
pub struct RayTracingPipelineDesc<'a> {
    pub label: &'static str,
    pub raygen_shader: &'a Arc<dyn Shader>,
    pub miss_shaders: Vec<&'a Arc<dyn Shader>>,
    pub closest_hit_shader: Option<&'a Arc<dyn Shader>>,
    pub max_recursion_depth: u32,
    pub set_layouts: Vec<DescriptorSetLayoutDesc>,
    pub push_constant_ranges: Vec<PushConstantRange>,
}

/// Pipeline kind, selects the bind point when binding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineBindPoint {
    Graphics,
    RayTracing,
}

/// Pipeline trait
pub trait Pipeline: Send + Sync {
    fn bind_point(&self) -> PipelineBindPoint;

    /// Layouts of the descriptor sets, indexed by set number
    fn set_layouts(&self) -> &[DescriptorSetLayoutDesc];

    fn push_constant_ranges(&self) -> &[PushConstantRange];
}
