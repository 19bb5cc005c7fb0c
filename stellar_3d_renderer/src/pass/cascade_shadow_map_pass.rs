//! Cascaded shadow maps
//!
//! The pass owns a layered depth texture with one layer per cascade, a
//! depth-only render pass, and one framebuffer per layer. Cascades due this
//! frame (see `CascadeSchedule`) get a fresh view-projection in
//! `prepare_pass_data` and are re-rendered by the nested `DepthPass` before
//! the main render pass; the others keep both their matrix and their layer
//! contents from the frame they were last rendered.

use std::sync::Arc;
use glam::Mat4;

use crate::config::{ShadowConfig, MAX_CASCADES, MAX_FRAMES_IN_FLIGHT};
use crate::device::{
    AttachmentDesc, BindingResource, Buffer, BufferDesc, BufferUsage, ClearValue, ColorBlend,
    CompareOp, CullMode, DepthBias, DepthState, DescriptorSet, DescriptorSetLayoutDesc,
    DescriptorType, Framebuffer, FramebufferDesc, FrontFace, GraphicsPipelineDesc, ImageLayout,
    LoadOp, Pipeline, PushConstantRange, Rect2D, RenderPass, RenderPassDesc, RenderTarget,
    ShaderStage, ShaderStageFlags, StoreOp, Texture, TextureDesc, TextureFormat, TextureType,
    TextureUsage, Viewport,
};
use crate::error::Result;
use crate::pass::cascade_math::{cascade_splits, cascade_view_projection, frustum_corners_world};
use crate::pass::{
    not_initialized, CascadeSchedule, CascadeUniforms, FrameData, GeometryPurpose, GeometryRequest, Pass,
    PassGraphContext, PassRecorder, ShaderProgram,
};
use crate::render_graph::SubpassId;
use crate::{engine_debug, engine_trace};

const SHADOW_MAP_FORMAT: TextureFormat = TextureFormat::D32_FLOAT;

/// Byte offset of the cascade index, after the per-object model matrix
const CASCADE_INDEX_OFFSET: u32 = 64;

/// Depth-only draw of the scene into one cascade layer
struct DepthPass {
    pipeline: Option<Arc<dyn Pipeline>>,
    /// Set 0 (cascade uniforms) per frame slot
    sets: Vec<Arc<dyn DescriptorSet>>,
}

impl DepthPass {
    fn new() -> Self {
        Self { pipeline: None, sets: Vec::new() }
    }

    fn initialize(
        &mut self,
        ctx: &PassGraphContext,
        render_pass: &Arc<dyn RenderPass>,
        cascade_uniforms: &[Arc<dyn Buffer>],
    ) -> Result<()> {
        let vertex = ctx.shader(ShaderProgram::ShadowDepth, ShaderStage::Vertex)?;
        let pipeline = ctx.device.create_graphics_pipeline(&GraphicsPipelineDesc {
            label: "shadow_depth",
            vertex_shader: &vertex,
            fragment_shader: None,
            vertex_layout: ctx.scene.vertex_layout.clone(),
            render_pass,
            subpass: 0,
            color_attachment_count: 0,
            blend: ColorBlend::Opaque,
            depth: DepthState {
                test: true,
                write: true,
                compare: CompareOp::LessOrEqual,
                bias: Some(DepthBias { constant: 1.25, slope: 1.75 }),
            },
            // Front-face culling moves acne to back faces
            cull_mode: CullMode::Front,
            front_face: FrontFace::CounterClockwise,
            set_layouts: vec![DescriptorSetLayoutDesc::sequential(
                &[DescriptorType::UniformBuffer],
                ShaderStageFlags::VERTEX,
            )],
            push_constant_ranges: vec![PushConstantRange {
                stages: ShaderStageFlags::VERTEX,
                offset: 0,
                size: CASCADE_INDEX_OFFSET + 4,
            }],
        })?;

        self.sets = cascade_uniforms
            .iter()
            .map(|buffer| ctx.device.create_descriptor_set(&pipeline, 0, &[BindingResource::UniformBuffer(buffer.as_ref())]))
            .collect::<Result<_>>()?;
        self.pipeline = Some(pipeline);
        Ok(())
    }

    fn record(&self, rec: &mut PassRecorder, cascade: u32) -> Result<()> {
        let pipeline = self.pipeline.as_ref().ok_or_else(|| not_initialized("DepthPass"))?;
        let set = self.sets.get(rec.frame_slot).ok_or_else(|| not_initialized("DepthPass"))?;

        rec.cmd.bind_pipeline(pipeline)?;
        rec.cmd.bind_descriptor_set(pipeline, 0, set)?;
        rec.cmd.push_constants(ShaderStageFlags::VERTEX, CASCADE_INDEX_OFFSET, &cascade.to_ne_bytes())?;
        rec.scene.draw_geometry(
            rec.cmd,
            &GeometryRequest {
                purpose: GeometryPurpose::ShadowCascade(cascade),
                pipeline,
                push_constant_stages: ShaderStageFlags::VERTEX,
            },
        )
    }

    fn clean(&mut self) {
        self.sets.clear();
        self.pipeline = None;
    }
}

pub struct CascadeShadowMapPass {
    config: ShadowConfig,
    schedule: CascadeSchedule,
    shadow_map: Option<Arc<dyn Texture>>,
    render_pass: Option<Arc<dyn RenderPass>>,
    layer_targets: Vec<Arc<dyn RenderTarget>>,
    framebuffers: Vec<Arc<dyn Framebuffer>>,
    cascade_uniforms: Vec<Arc<dyn Buffer>>,
    depth_pass: DepthPass,
    matrices: [Mat4; MAX_CASCADES],
    splits: [f32; MAX_CASCADES],
    /// Cascades to render this frame, set by `prepare_pass_data`
    due: Vec<u32>,
    refresh_counts: [u32; MAX_CASCADES],
}

impl CascadeShadowMapPass {
    pub fn new(config: ShadowConfig) -> Self {
        Self {
            config,
            schedule: CascadeSchedule::new(config.cascade_count, config.min_cascade),
            shadow_map: None,
            render_pass: None,
            layer_targets: Vec::new(),
            framebuffers: Vec::new(),
            cascade_uniforms: Vec::new(),
            depth_pass: DepthPass::new(),
            matrices: [Mat4::IDENTITY; MAX_CASCADES],
            splits: [0.0; MAX_CASCADES],
            due: Vec::new(),
            refresh_counts: [0; MAX_CASCADES],
        }
    }

    /// Times `cascade` was rendered since initialize
    pub fn refresh_count(&self, cascade: u32) -> u32 {
        self.refresh_counts.get(cascade as usize).copied().unwrap_or(0)
    }

    pub fn cascade_matrix(&self, cascade: u32) -> Option<Mat4> {
        self.matrices.get(cascade as usize).copied()
    }

    pub fn split_distances(&self) -> &[f32] {
        &self.splits[..self.config.cascade_count as usize]
    }

    pub fn schedule(&self) -> &CascadeSchedule {
        &self.schedule
    }
}

impl Pass for CascadeShadowMapPass {
    fn name(&self) -> &'static str {
        "CascadeShadowMap"
    }

    fn subpass(&self) -> Option<SubpassId> {
        None
    }

    fn initialize(&mut self, ctx: &mut PassGraphContext) -> Result<()> {
        let size = self.config.map_size;
        let mut desc = TextureDesc::new_2d(
            "shadow_map",
            size,
            size,
            SHADOW_MAP_FORMAT,
            TextureUsage::DEPTH_STENCIL_ATTACHMENT | TextureUsage::SAMPLED,
        );
        desc.texture_type = TextureType::Array2D;
        desc.array_layers = self.config.cascade_count;
        let shadow_map = ctx.device.create_texture(desc)?;

        let render_pass = ctx.device.create_render_pass(&RenderPassDesc::single_subpass(
            Vec::new(),
            Some(AttachmentDesc::depth(
                SHADOW_MAP_FORMAT,
                LoadOp::Clear,
                StoreOp::Store,
                ImageLayout::DepthStencilReadOnly,
            )),
        ))?;

        self.layer_targets = (0..self.config.cascade_count)
            .map(|layer| ctx.device.create_render_target(&shadow_map, layer, 0))
            .collect::<Result<_>>()?;
        self.framebuffers = self
            .layer_targets
            .iter()
            .map(|target| {
                ctx.device.create_framebuffer(&FramebufferDesc {
                    render_pass: &render_pass,
                    attachments: vec![target.clone()],
                    width: size,
                    height: size,
                    layers: 1,
                })
            })
            .collect::<Result<_>>()?;

        self.cascade_uniforms = (0..MAX_FRAMES_IN_FLIGHT)
            .map(|_| {
                ctx.device.create_buffer(BufferDesc {
                    label: "cascade_uniforms",
                    size: std::mem::size_of::<CascadeUniforms>() as u64,
                    usage: BufferUsage::UNIFORM,
                })
            })
            .collect::<Result<_>>()?;

        self.depth_pass.initialize(ctx, &render_pass, &self.cascade_uniforms)?;

        self.schedule = CascadeSchedule::new(self.config.cascade_count, self.config.min_cascade);
        self.matrices = [Mat4::IDENTITY; MAX_CASCADES];
        self.refresh_counts = [0; MAX_CASCADES];

        ctx.shared.shadow_map = Some(shadow_map.clone());
        ctx.shared.cascade_uniforms = self.cascade_uniforms.clone();
        self.shadow_map = Some(shadow_map);
        self.render_pass = Some(render_pass);
        Ok(())
    }

    fn prepare_pass_data(&mut self, frame: &FrameData) -> Result<()> {
        let camera = &frame.camera;
        let count = self.config.cascade_count;
        self.splits = cascade_splits(count, camera.near, camera.far, self.config.split_lambda);
        self.due = self.schedule.due_cascades(frame.frame_number);

        for &cascade in &self.due {
            let slice_near = if cascade == 0 { camera.near } else { self.splits[cascade as usize - 1] };
            let slice_far = self.splits[cascade as usize];
            let corners = frustum_corners_world(camera, slice_near, slice_far);
            self.matrices[cascade as usize] =
                cascade_view_projection(frame.light.direction, &corners, self.config.map_size);
        }

        let uniforms = CascadeUniforms::new(&self.matrices, &self.splits, count, self.config.map_size);
        let buffer = self
            .cascade_uniforms
            .get(frame.frame_slot)
            .ok_or_else(|| not_initialized("CascadeShadowMap"))?;
        buffer.update(0, bytemuck::bytes_of(&uniforms))
    }

    fn draw_prepass(&mut self, rec: &mut PassRecorder) -> Result<()> {
        let render_pass = self.render_pass.as_ref().ok_or_else(|| not_initialized("CascadeShadowMap"))?;
        let size = self.config.map_size;

        for &cascade in &self.due {
            let framebuffer = self
                .framebuffers
                .get(cascade as usize)
                .ok_or_else(|| not_initialized("CascadeShadowMap"))?;
            rec.cmd.begin_render_pass(render_pass, framebuffer, &[ClearValue::DepthStencil { depth: 1.0, stencil: 0 }])?;
            rec.cmd.set_viewport(Viewport::full(size, size))?;
            rec.cmd.set_scissor(Rect2D::full(size, size))?;
            self.depth_pass.record(rec, cascade)?;
            rec.cmd.end_render_pass()?;

            self.schedule.mark_computed(cascade, rec.frame_number);
            self.refresh_counts[cascade as usize] += 1;
        }

        engine_trace!("stellar3d::CascadeShadowMap", "Frame {}: refreshed cascades {:?}", rec.frame_number, self.due);
        self.due.clear();
        Ok(())
    }

    fn clean(&mut self) {
        self.depth_pass.clean();
        self.framebuffers.clear();
        self.layer_targets.clear();
        self.cascade_uniforms.clear();
        self.render_pass = None;
        self.shadow_map = None;
        self.due.clear();
        engine_debug!("stellar3d::CascadeShadowMap", "Cleaned");
    }
}
