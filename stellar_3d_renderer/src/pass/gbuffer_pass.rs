/// Geometry pass: scene meshes into the normal/albedo/material/position
/// G-buffers and depth (subpass 0)

use std::sync::Arc;

use crate::device::{
    BindingResource, ColorBlend, CullMode, DepthState, DescriptorSet, DescriptorSetLayoutDesc,
    DescriptorType, FrontFace, GraphicsPipelineDesc, Pipeline, PushConstantRange, ShaderStage,
    ShaderStageFlags,
};
use crate::error::Result;
use crate::pass::{
    not_initialized, GeometryPurpose, GeometryRequest, Pass, PassGraphContext, PassRecorder, ShaderProgram,
};
use crate::render_graph::SubpassId;

/// Model and normal matrix pushed per object by the scene
pub const GBUFFER_PUSH_CONSTANT_SIZE: u32 = 128;

pub struct GBufferPass {
    pipeline: Option<Arc<dyn Pipeline>>,
    /// Set 0 (frame uniforms) per frame slot
    frame_sets: Vec<Arc<dyn DescriptorSet>>,
}

impl GBufferPass {
    pub fn new() -> Self {
        Self { pipeline: None, frame_sets: Vec::new() }
    }
}

impl Default for GBufferPass {
    fn default() -> Self {
        Self::new()
    }
}

impl Pass for GBufferPass {
    fn name(&self) -> &'static str {
        "GBuffer"
    }

    fn subpass(&self) -> Option<SubpassId> {
        Some(SubpassId::GBuffer)
    }

    fn initialize(&mut self, ctx: &mut PassGraphContext) -> Result<()> {
        let vertex = ctx.shader(ShaderProgram::GBuffer, ShaderStage::Vertex)?;
        let fragment = ctx.shader(ShaderProgram::GBuffer, ShaderStage::Fragment)?;

        let pipeline = ctx.device.create_graphics_pipeline(&GraphicsPipelineDesc {
            label: "gbuffer",
            vertex_shader: &vertex,
            fragment_shader: Some(&fragment),
            vertex_layout: ctx.scene.vertex_layout.clone(),
            render_pass: ctx.render_pass,
            subpass: SubpassId::GBuffer.index(),
            color_attachment_count: ctx.color_count(SubpassId::GBuffer)?,
            blend: ColorBlend::Opaque,
            depth: DepthState::opaque(),
            cull_mode: CullMode::Back,
            front_face: FrontFace::CounterClockwise,
            set_layouts: vec![DescriptorSetLayoutDesc::sequential(
                &[DescriptorType::UniformBuffer],
                ShaderStageFlags::ALL_GRAPHICS,
            )],
            push_constant_ranges: vec![PushConstantRange {
                stages: ShaderStageFlags::VERTEX,
                offset: 0,
                size: GBUFFER_PUSH_CONSTANT_SIZE,
            }],
        })?;

        self.frame_sets = ctx
            .shared
            .frame_uniforms
            .iter()
            .map(|buffer| ctx.device.create_descriptor_set(&pipeline, 0, &[BindingResource::UniformBuffer(buffer.as_ref())]))
            .collect::<Result<_>>()?;
        self.pipeline = Some(pipeline);
        Ok(())
    }

    fn draw(&mut self, rec: &mut PassRecorder) -> Result<()> {
        let pipeline = self.pipeline.as_ref().ok_or_else(|| not_initialized("GBuffer"))?;
        let frame_set = self.frame_sets.get(rec.frame_slot).ok_or_else(|| not_initialized("GBuffer"))?;

        rec.cmd.bind_pipeline(pipeline)?;
        rec.cmd.bind_descriptor_set(pipeline, 0, frame_set)?;
        rec.scene.draw_geometry(
            rec.cmd,
            &GeometryRequest {
                purpose: GeometryPurpose::GBuffer,
                pipeline,
                push_constant_stages: ShaderStageFlags::VERTEX,
            },
        )
    }

    fn clean(&mut self) {
        self.frame_sets.clear();
        self.pipeline = None;
    }
}
