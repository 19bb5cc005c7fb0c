/// Interfaces to the collaborators outside the renderer core: the scene,
/// the UI overlay and the shader bytecode source

use std::sync::Arc;
use glam::{Mat4, Vec3};

use crate::device::{
    AccelerationStructure, CommandList, GraphicsDevice, Pipeline, RenderPass, ShaderStage,
    ShaderStageFlags, Texture, VertexLayout,
};
use crate::error::Result;

/// Camera matrices for the current frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraData {
    pub view: Mat4,
    pub projection: Mat4,
    /// World-space eye position
    pub position: Vec3,
    pub near: f32,
    pub far: f32,
}

impl Default for CameraData {
    fn default() -> Self {
        Self {
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            position: Vec3::ZERO,
            near: 0.1,
            far: 100.0,
        }
    }
}

/// The directional light casting cascaded (or ray traced) shadows
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    /// World-space direction the light travels in
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            direction: Vec3::new(-0.3, -1.0, -0.2).normalize(),
            color: Vec3::ONE,
            intensity: 3.0,
        }
    }
}

/// Why a pass asks the scene for geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryPurpose {
    GBuffer,
    /// Depth-only draw into one shadow cascade
    ShadowCascade(u32),
}

/// Everything the scene needs to record its draws for one pass
///
/// The pipeline and the pass descriptor sets are already bound; the scene
/// binds vertex/index buffers, pushes per-object constants at offset 0 and
/// issues draws.
pub struct GeometryRequest<'a> {
    pub purpose: GeometryPurpose,
    pub pipeline: &'a Arc<dyn Pipeline>,
    /// Stages the per-object push constants are visible to
    pub push_constant_stages: ShaderStageFlags,
}

/// Frame-time scene access
pub trait SceneProvider {
    fn camera(&self) -> CameraData;

    fn directional_light(&self) -> DirectionalLight;

    /// Record the scene's geometry for one geometry-consuming pass
    fn draw_geometry(&self, cmd: &mut dyn CommandList, request: &GeometryRequest) -> Result<()>;
}

/// Immediate-mode UI drawn over the shaded image in the last subpass
pub trait UiOverlay {
    fn initialize(&mut self, device: &dyn GraphicsDevice, render_pass: &Arc<dyn RenderPass>, subpass: u32) -> Result<()>;

    /// Record the UI draws; returns true if vertex/index buffers changed
    fn record(&mut self, cmd: &mut dyn CommandList, subpass: u32) -> Result<bool>;

    fn clean(&mut self);
}

/// Shader programs used by the passes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderProgram {
    GBuffer,
    ShadowDepth,
    /// Vertex shader generating a screen-covering triangle
    FullscreenTriangle,
    Ssao,
    Lighting,
    LightingRayTraced,
    Shading,
    IrradianceConvolution,
    BrdfIntegration,
    ShadowRays,
}

/// Source of SPIR-V bytecode
pub trait ShaderLibrary: Send + Sync {
    fn spirv(&self, program: ShaderProgram, stage: ShaderStage) -> Option<&[u32]>;
}

/// Scene resources needed once, when the render graph initializes
pub struct SceneResources {
    /// Environment cube map convolved by the IBL precompute
    pub environment_map: Arc<dyn Texture>,
    /// Vertex layout of the scene's meshes
    pub vertex_layout: VertexLayout,
    /// Top-level acceleration structure, required by the ray traced variant
    pub acceleration_structure: Option<Arc<dyn AccelerationStructure>>,
}
