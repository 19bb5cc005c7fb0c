/// Pass trait and the contexts passes are initialized and recorded with

use std::sync::Arc;

use crate::attachment::AttachmentStore;
use crate::config::Config;
use crate::device::{
    Buffer, ColorBlend, CommandList, CullMode, DepthState, DescriptorSetLayoutDesc, Extent2D,
    FrontFace, GraphicsDevice, GraphicsPipelineDesc, Pipeline, PushConstantRange, RenderPass,
    Shader, ShaderDesc, ShaderStage, Texture, VertexLayout,
};
use crate::error::{Error, Result};
use crate::pass::{CameraData, DirectionalLight, SceneProvider, SceneResources, ShaderLibrary, ShaderProgram};
use crate::render_graph::{GraphLayout, SubpassId};

/// CPU-side inputs of one frame
#[derive(Debug, Clone, Copy)]
pub struct FrameData {
    /// Frame-in-flight slot whose buffers may be written
    pub frame_slot: usize,
    /// Number of frames drawn before this one
    pub frame_number: u64,
    pub camera: CameraData,
    pub light: DirectionalLight,
    pub extent: Extent2D,
}

/// Resources one pass publishes for the passes initialized after it
///
/// Filled in pass order during `initialize`; reading a resource whose
/// producer has not run yet is a declaration error.
#[derive(Default)]
pub struct SharedPassResources {
    /// Camera/light uniform buffer per frame slot (render graph)
    pub frame_uniforms: Vec<Arc<dyn Buffer>>,
    /// Layered cascade depth map (cascaded shadow pass)
    pub shadow_map: Option<Arc<dyn Texture>>,
    /// Cascade matrices per frame slot (cascaded shadow pass)
    pub cascade_uniforms: Vec<Arc<dyn Buffer>>,
    /// Diffuse irradiance cube (lighting pass precompute)
    pub irradiance_cube: Option<Arc<dyn Texture>>,
    /// Split-sum BRDF lookup table (lighting pass precompute)
    pub brdf_lut: Option<Arc<dyn Texture>>,
}

fn not_published(what: &str) -> Error {
    Error::GraphDeclaration(format!("{} read before its producing pass initialized", what))
}

impl SharedPassResources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frame_uniform(&self, slot: usize) -> Result<&Arc<dyn Buffer>> {
        self.frame_uniforms.get(slot).ok_or_else(|| not_published("frame uniforms"))
    }

    pub fn shadow_map(&self) -> Result<&Arc<dyn Texture>> {
        self.shadow_map.as_ref().ok_or_else(|| not_published("shadow map"))
    }

    pub fn cascade_uniform(&self, slot: usize) -> Result<&Arc<dyn Buffer>> {
        self.cascade_uniforms.get(slot).ok_or_else(|| not_published("cascade uniforms"))
    }

    pub fn irradiance_cube(&self) -> Result<&Arc<dyn Texture>> {
        self.irradiance_cube.as_ref().ok_or_else(|| not_published("irradiance cube"))
    }

    pub fn brdf_lut(&self) -> Result<&Arc<dyn Texture>> {
        self.brdf_lut.as_ref().ok_or_else(|| not_published("BRDF LUT"))
    }
}

/// Pipeline drawing one screen-covering triangle
pub struct FullscreenPipelineDesc<'a> {
    pub label: &'static str,
    pub fragment: ShaderProgram,
    pub render_pass: &'a Arc<dyn RenderPass>,
    pub subpass: u32,
    pub color_attachment_count: u32,
    pub blend: ColorBlend,
    pub set_layouts: Vec<DescriptorSetLayoutDesc>,
    pub push_constant_ranges: Vec<PushConstantRange>,
}

/// Everything a pass may use while creating or recreating GPU objects
pub struct PassGraphContext<'a> {
    pub device: &'a dyn GraphicsDevice,
    pub config: &'a Config,
    pub shaders: &'a dyn ShaderLibrary,
    pub attachments: &'a AttachmentStore,
    /// The main render pass
    pub render_pass: &'a Arc<dyn RenderPass>,
    pub layout: &'a GraphLayout,
    pub scene: &'a SceneResources,
    pub shared: &'a mut SharedPassResources,
    pub extent: Extent2D,
}

impl PassGraphContext<'_> {
    pub fn shader(&self, program: ShaderProgram, stage: ShaderStage) -> Result<Arc<dyn Shader>> {
        let code = self.shaders.spirv(program, stage).ok_or_else(|| {
            Error::InitializationFailed(format!("no {:?} shader for {:?}", stage, program))
        })?;
        self.device.create_shader(ShaderDesc { code, stage, entry_point: "main" })
    }

    /// Number of color attachments `subpass` writes
    pub fn color_count(&self, subpass: SubpassId) -> Result<u32> {
        self.layout
            .subpass(subpass)
            .map(|s| s.colors.len() as u32)
            .ok_or_else(|| Error::GraphDeclaration(format!("subpass {:?} is not declared", subpass)))
    }

    pub fn create_fullscreen_pipeline(&self, desc: FullscreenPipelineDesc) -> Result<Arc<dyn Pipeline>> {
        let vertex = self.shader(ShaderProgram::FullscreenTriangle, ShaderStage::Vertex)?;
        let fragment = self.shader(desc.fragment, ShaderStage::Fragment)?;
        self.device.create_graphics_pipeline(&GraphicsPipelineDesc {
            label: desc.label,
            vertex_shader: &vertex,
            fragment_shader: Some(&fragment),
            vertex_layout: VertexLayout::default(),
            render_pass: desc.render_pass,
            subpass: desc.subpass,
            color_attachment_count: desc.color_attachment_count,
            blend: desc.blend,
            depth: DepthState::disabled(),
            cull_mode: CullMode::None,
            front_face: FrontFace::CounterClockwise,
            set_layouts: desc.set_layouts,
            push_constant_ranges: desc.push_constant_ranges,
        })
    }
}

/// Per-frame recording state handed to every pass
pub struct PassRecorder<'a> {
    pub cmd: &'a mut dyn CommandList,
    pub scene: &'a dyn SceneProvider,
    pub frame_slot: usize,
    pub frame_number: u64,
    /// Acquired swapchain image
    pub image_index: u32,
    pub extent: Extent2D,
}

/// One stage of the deferred pipeline
///
/// The render graph calls `initialize` once, in pass order, then every frame
/// `prepare_pass_data` (CPU only), `draw_prepass` (outside the main render
/// pass) and `draw` (inside the pass's subpass). After a swapchain resize
/// `update_after_attachment_recreate` rebuilds whatever referenced the old
/// attachments.
pub trait Pass {
    fn name(&self) -> &'static str;

    /// Subpass of the main render pass this pass draws in, if any
    fn subpass(&self) -> Option<SubpassId>;

    fn initialize(&mut self, ctx: &mut PassGraphContext) -> Result<()>;

    fn prepare_pass_data(&mut self, _frame: &FrameData) -> Result<()> {
        Ok(())
    }

    /// Work recorded before the main render pass begins
    fn draw_prepass(&mut self, _rec: &mut PassRecorder) -> Result<()> {
        Ok(())
    }

    fn draw(&mut self, _rec: &mut PassRecorder) -> Result<()> {
        Ok(())
    }

    fn update_after_attachment_recreate(&mut self, _ctx: &mut PassGraphContext) -> Result<()> {
        Ok(())
    }

    /// Release every GPU object; the pass may be initialized again
    fn clean(&mut self);
}

/// Pipeline or descriptor set used before `initialize`
pub(crate) fn not_initialized(pass: &str) -> Error {
    Error::InvalidState(format!("{} used before initialize", pass))
}
