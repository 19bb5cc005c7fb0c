//! Main camera pass: the render graph of the deferred pipeline
//!
//! Owns the attachment store, the main render pass (five subpasses) with
//! one framebuffer per swapchain image, the per-slot frame uniforms and the
//! concrete passes. Every frame it records the shadow prepass and the
//! one-time IBL precompute, then the main render pass subpass by subpass.
//!
//! State machine:
//!
//! ```text
//! Uninitialized --initialize--> Ready --swapchain recreated--> Recreating --> Ready
//!       ^                         |
//!       +---- failed init         +--clean--> Destroyed
//! ```

use std::sync::Arc;

use crate::attachment::{AttachmentSlot, AttachmentStore};
use crate::config::{Config, PipelineVariant, MAX_FRAMES_IN_FLIGHT};
use crate::device::{
    BufferDesc, BufferUsage, ClearValue, Extent2D, Framebuffer, FramebufferDesc, GraphicsDevice, Rect2D,
    RenderPass, Swapchain, Viewport,
};
use crate::error::{Error, Result};
use crate::pass::{
    CascadeShadowMapPass, FrameData, FrameUniforms, GBufferPass, Pass, PassGraphContext, PassRecorder,
    PbrIblPass, RayTracingPass, SceneResources, ShaderLibrary, ShadingPass, SharedPassResources, SsaoPass,
    UiOverlay, UiOverlayPass,
};
use crate::render_graph::{GraphLayout, SubpassId};
use crate::{engine_debug, engine_error, engine_info};

/// Lifecycle of the render graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphState {
    Uninitialized,
    Ready,
    /// Attachments and framebuffers are being rebuilt for a new extent
    Recreating,
    Destroyed,
}

/// Notified by the frame synchronizer after the swapchain was recreated
pub trait SwapchainListener {
    fn on_swapchain_recreated(&mut self, device: &dyn GraphicsDevice, swapchain: &dyn Swapchain) -> Result<()>;
}

enum ShadowStage {
    Cascaded(CascadeShadowMapPass),
    RayTraced(RayTracingPass),
}

struct PassSet {
    shadow: ShadowStage,
    gbuffer: GBufferPass,
    ssao: SsaoPass,
    lighting: PbrIblPass,
    shading: ShadingPass,
    ui: UiOverlayPass,
}

impl PassSet {
    fn new(config: &Config, ui: Option<Box<dyn UiOverlay>>) -> Self {
        let shadow = match config.pipeline_variant {
            PipelineVariant::Deferred => ShadowStage::Cascaded(CascadeShadowMapPass::new(config.shadow)),
            PipelineVariant::RayTraced => ShadowStage::RayTraced(RayTracingPass::new()),
        };
        Self {
            shadow,
            gbuffer: GBufferPass::new(),
            ssao: SsaoPass::new(config.ssao),
            lighting: PbrIblPass::new(config.pipeline_variant),
            shading: ShadingPass::new(config.exposure),
            ui: UiOverlayPass::new(ui),
        }
    }

    /// Initialization and preparation order: G-buffer, shadow, SSAO,
    /// lighting, shading, UI
    fn in_order_mut(&mut self) -> [&mut dyn Pass; 6] {
        let shadow: &mut dyn Pass = match &mut self.shadow {
            ShadowStage::Cascaded(pass) => pass,
            ShadowStage::RayTraced(pass) => pass,
        };
        [&mut self.gbuffer, shadow, &mut self.ssao, &mut self.lighting, &mut self.shading, &mut self.ui]
    }
}

pub struct MainCameraPass {
    config: Config,
    shaders: Arc<dyn ShaderLibrary>,
    layout: GraphLayout,
    attachments: AttachmentStore,
    shared: SharedPassResources,
    scene: Option<SceneResources>,
    render_pass: Option<Arc<dyn RenderPass>>,
    /// One per swapchain image
    framebuffers: Vec<Arc<dyn Framebuffer>>,
    clear_values: Vec<ClearValue>,
    passes: PassSet,
    state: GraphState,
    extent: Extent2D,
}

impl MainCameraPass {
    pub fn new(config: Config, shaders: Arc<dyn ShaderLibrary>, ui: Option<Box<dyn UiOverlay>>) -> Self {
        let layout = GraphLayout::deferred(config.pipeline_variant);
        let clear_values = layout.clear_values(config.clear_color);
        let passes = PassSet::new(&config, ui);
        Self {
            config,
            shaders,
            layout,
            attachments: AttachmentStore::new(),
            shared: SharedPassResources::new(),
            scene: None,
            render_pass: None,
            framebuffers: Vec::new(),
            clear_values,
            passes,
            state: GraphState::Uninitialized,
            extent: Extent2D::default(),
        }
    }

    /// Build attachments, the main render pass, framebuffers and every pass
    ///
    /// Declaration errors (missing attachment, missing dependency edge) are
    /// reported here, before anything is recorded. On failure every resource
    /// created so far is released and the graph stays `Uninitialized`.
    pub fn initialize(
        &mut self,
        device: &dyn GraphicsDevice,
        swapchain: &dyn Swapchain,
        scene: SceneResources,
    ) -> Result<()> {
        if self.state != GraphState::Uninitialized {
            return Err(Error::InvalidState(format!("render graph initialize in state {:?}", self.state)));
        }
        self.scene = Some(scene);
        match self.build(device, swapchain) {
            Ok(()) => {
                self.state = GraphState::Ready;
                engine_info!("stellar3d::MainCameraPass", "Render graph ready ({:?}, {}x{}, {} framebuffers)",
                    self.config.pipeline_variant, self.extent.width, self.extent.height, self.framebuffers.len());
                Ok(())
            }
            Err(e) => {
                engine_error!("stellar3d::MainCameraPass", "Render graph initialization failed: {}", e);
                self.release();
                Err(e)
            }
        }
    }

    fn build(&mut self, device: &dyn GraphicsDevice, swapchain: &dyn Swapchain) -> Result<()> {
        self.config.validate()?;
        let extent = Extent2D::new(swapchain.width(), swapchain.height());
        self.attachments
            .rebuild(device, extent, &AttachmentSlot::required(self.config.pipeline_variant))?;
        self.layout.validate(&self.attachments)?;

        let render_pass = device.create_render_pass(&self.layout.render_pass_desc(&self.attachments, swapchain.format())?)?;
        self.extent = extent;
        self.framebuffers = self.create_framebuffers(device, swapchain, &render_pass)?;

        self.shared = SharedPassResources::new();
        self.shared.frame_uniforms = (0..MAX_FRAMES_IN_FLIGHT)
            .map(|_| {
                device.create_buffer(BufferDesc {
                    label: "frame_uniforms",
                    size: std::mem::size_of::<FrameUniforms>() as u64,
                    usage: BufferUsage::UNIFORM,
                })
            })
            .collect::<Result<_>>()?;

        let scene = self.scene.as_ref().ok_or_else(|| Error::InvalidState("no scene resources".to_string()))?;
        let mut ctx = PassGraphContext {
            device,
            config: &self.config,
            shaders: self.shaders.as_ref(),
            attachments: &self.attachments,
            render_pass: &render_pass,
            layout: &self.layout,
            scene,
            shared: &mut self.shared,
            extent,
        };
        for pass in self.passes.in_order_mut() {
            pass.initialize(&mut ctx)?;
            engine_debug!("stellar3d::MainCameraPass", "Initialized pass {}", pass.name());
        }

        self.render_pass = Some(render_pass);
        Ok(())
    }

    fn create_framebuffers(
        &self,
        device: &dyn GraphicsDevice,
        swapchain: &dyn Swapchain,
        render_pass: &Arc<dyn RenderPass>,
    ) -> Result<Vec<Arc<dyn Framebuffer>>> {
        (0..swapchain.image_count())
            .map(|index| {
                let image = swapchain.image_target(index)?;
                device.create_framebuffer(&FramebufferDesc {
                    render_pass,
                    attachments: self.layout.framebuffer_attachments(&self.attachments, &image)?,
                    width: self.extent.width,
                    height: self.extent.height,
                    layers: 1,
                })
            })
            .collect()
    }

    fn release(&mut self) {
        for pass in self.passes.in_order_mut().into_iter().rev() {
            pass.clean();
        }
        self.framebuffers.clear();
        self.render_pass = None;
        self.shared = SharedPassResources::new();
        self.attachments.clear();
        self.scene = None;
    }

    /// CPU-side per-frame updates: frame uniforms, cascade matrices
    pub fn prepare_pass_data(&mut self, frame: &FrameData) -> Result<()> {
        self.require_ready("prepare_pass_data")?;
        let uniforms = FrameUniforms::new(&frame.camera, &frame.light, self.extent);
        self.shared
            .frame_uniform(frame.frame_slot)?
            .update(0, bytemuck::bytes_of(&uniforms))?;
        for pass in self.passes.in_order_mut() {
            pass.prepare_pass_data(frame)?;
        }
        Ok(())
    }

    /// Record the prepasses and the main render pass into `rec.cmd`
    pub fn draw(&mut self, rec: &mut PassRecorder) -> Result<()> {
        self.require_ready("draw")?;
        let render_pass = self.render_pass.as_ref().ok_or_else(|| Error::InvalidState("no render pass".to_string()))?;
        let framebuffer = self.framebuffers.get(rec.image_index as usize).ok_or_else(|| {
            Error::InvalidState(format!(
                "no framebuffer for swapchain image {} ({} framebuffers)",
                rec.image_index,
                self.framebuffers.len()
            ))
        })?;

        for pass in self.passes.in_order_mut() {
            pass.draw_prepass(rec)?;
        }

        rec.cmd.begin_render_pass(render_pass, framebuffer, &self.clear_values)?;
        rec.cmd.set_viewport(Viewport::full(self.extent.width, self.extent.height))?;
        rec.cmd.set_scissor(Rect2D::full(self.extent.width, self.extent.height))?;
        for (i, &subpass) in SubpassId::ALL.iter().enumerate() {
            if i > 0 {
                rec.cmd.next_subpass()?;
            }
            for pass in self.passes.in_order_mut() {
                if pass.subpass() == Some(subpass) {
                    pass.draw(rec)?;
                }
            }
        }
        rec.cmd.end_render_pass()
    }

    /// Rebuild attachments and framebuffers at the swapchain's new extent
    ///
    /// Pipelines and the render pass survive. Passes rebuild the descriptor
    /// sets that referenced the old attachments, and the IBL precompute is
    /// recorded again on the next frame.
    pub fn update_after_attachment_recreate(
        &mut self,
        device: &dyn GraphicsDevice,
        swapchain: &dyn Swapchain,
    ) -> Result<()> {
        self.require_ready("update_after_attachment_recreate")?;
        self.state = GraphState::Recreating;
        self.framebuffers.clear();

        let extent = Extent2D::new(swapchain.width(), swapchain.height());
        self.attachments
            .rebuild(device, extent, &AttachmentSlot::required(self.config.pipeline_variant))?;
        self.layout.validate(&self.attachments)?;
        self.extent = extent;

        let render_pass = self.render_pass.clone().ok_or_else(|| Error::InvalidState("no render pass".to_string()))?;
        self.framebuffers = self.create_framebuffers(device, swapchain, &render_pass)?;

        let scene = self.scene.as_ref().ok_or_else(|| Error::InvalidState("no scene resources".to_string()))?;
        let mut ctx = PassGraphContext {
            device,
            config: &self.config,
            shaders: self.shaders.as_ref(),
            attachments: &self.attachments,
            render_pass: &render_pass,
            layout: &self.layout,
            scene,
            shared: &mut self.shared,
            extent,
        };
        for pass in self.passes.in_order_mut() {
            pass.update_after_attachment_recreate(&mut ctx)?;
        }

        self.state = GraphState::Ready;
        engine_debug!("stellar3d::MainCameraPass", "Attachments recreated at {}x{}", extent.width, extent.height);
        Ok(())
    }

    /// Release every GPU object; the graph cannot be used afterwards
    pub fn clean(&mut self) {
        if self.state == GraphState::Destroyed {
            return;
        }
        self.release();
        self.state = GraphState::Destroyed;
        engine_debug!("stellar3d::MainCameraPass", "Render graph destroyed");
    }

    /// Record the IBL precompute again on the next frame
    pub fn invalidate_precompute(&mut self) {
        self.passes.lighting.invalidate_precompute();
    }

    fn require_ready(&self, what: &str) -> Result<()> {
        if self.state != GraphState::Ready {
            return Err(Error::InvalidState(format!("render graph {} in state {:?}", what, self.state)));
        }
        Ok(())
    }

    pub fn state(&self) -> GraphState {
        self.state
    }

    pub fn attachments(&self) -> &AttachmentStore {
        &self.attachments
    }

    pub fn layout(&self) -> &GraphLayout {
        &self.layout
    }

    pub fn framebuffer_count(&self) -> usize {
        self.framebuffers.len()
    }

    pub fn extent(&self) -> Extent2D {
        self.extent
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Times `cascade` was rendered; None in the ray traced variant
    pub fn shadow_refresh_count(&self, cascade: u32) -> Option<u32> {
        match &self.passes.shadow {
            ShadowStage::Cascaded(pass) => Some(pass.refresh_count(cascade)),
            ShadowStage::RayTraced(_) => None,
        }
    }

    pub fn lighting_precompute_runs(&self) -> u32 {
        self.passes.lighting.precompute_runs()
    }
}

impl SwapchainListener for MainCameraPass {
    fn on_swapchain_recreated(&mut self, device: &dyn GraphicsDevice, swapchain: &dyn Swapchain) -> Result<()> {
        self.update_after_attachment_recreate(device, swapchain)
    }
}

#[cfg(test)]
#[path = "main_camera_pass_tests.rs"]
mod tests;
