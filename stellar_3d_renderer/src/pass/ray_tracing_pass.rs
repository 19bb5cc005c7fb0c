//! Ray traced shadow visibility
//!
//! Replaces the cascaded shadow maps in the ray traced variant. Before the
//! main render pass, one shadow ray per pixel is traced toward the light
//! against the scene's top-level acceleration structure; the result is a
//! swapchain-sized storage image the lighting subpass samples.

use std::sync::Arc;

use crate::attachment::AttachmentSlot;
use crate::device::{
    AccelerationStructure, AccessFlags, BindingResource, DescriptorSet, DescriptorSetLayoutDesc,
    DescriptorType, ImageLayout, Pipeline, PipelineStages, RayTracingPipelineDesc, ShaderStage,
    ShaderStageFlags, Texture, TextureBarrier,
};
use crate::error::{Error, Result};
use crate::pass::{not_initialized, Pass, PassGraphContext, PassRecorder, ShaderProgram};
use crate::render_graph::SubpassId;

pub struct RayTracingPass {
    pipeline: Option<Arc<dyn Pipeline>>,
    tlas: Option<Arc<dyn AccelerationStructure>>,
    /// Current generation of the visibility image
    visibility: Option<Arc<dyn Texture>>,
    /// Set 0 per frame slot: TLAS, visibility image, frame uniforms
    sets: Vec<Arc<dyn DescriptorSet>>,
}

impl RayTracingPass {
    pub fn new() -> Self {
        Self { pipeline: None, tlas: None, visibility: None, sets: Vec::new() }
    }

    fn build_sets(&mut self, ctx: &PassGraphContext) -> Result<()> {
        let pipeline = self.pipeline.as_ref().ok_or_else(|| not_initialized("RayTracing"))?;
        let tlas = self.tlas.as_ref().ok_or_else(|| not_initialized("RayTracing"))?;
        let visibility = ctx.attachments.texture(AttachmentSlot::RayTracedShadow)?.clone();

        self.sets = ctx
            .shared
            .frame_uniforms
            .iter()
            .map(|frame_uniforms| {
                ctx.device.create_descriptor_set(
                    pipeline,
                    0,
                    &[
                        BindingResource::AccelerationStructure(tlas.as_ref()),
                        BindingResource::StorageImage(visibility.as_ref()),
                        BindingResource::UniformBuffer(frame_uniforms.as_ref()),
                    ],
                )
            })
            .collect::<Result<_>>()?;
        self.visibility = Some(visibility);
        Ok(())
    }
}

impl Default for RayTracingPass {
    fn default() -> Self {
        Self::new()
    }
}

impl Pass for RayTracingPass {
    fn name(&self) -> &'static str {
        "RayTracing"
    }

    fn subpass(&self) -> Option<SubpassId> {
        None
    }

    fn initialize(&mut self, ctx: &mut PassGraphContext) -> Result<()> {
        if !ctx.device.capabilities().ray_tracing {
            return Err(Error::Unsupported("ray traced shadows need ray tracing pipelines".to_string()));
        }
        let tlas = ctx.scene.acceleration_structure.clone().ok_or_else(|| {
            Error::InitializationFailed("ray traced shadows need a top-level acceleration structure".to_string())
        })?;

        let raygen = ctx.shader(ShaderProgram::ShadowRays, ShaderStage::RayGen)?;
        let miss = ctx.shader(ShaderProgram::ShadowRays, ShaderStage::Miss)?;
        let pipeline = ctx.device.create_ray_tracing_pipeline(&RayTracingPipelineDesc {
            label: "shadow_rays",
            raygen_shader: &raygen,
            miss_shaders: vec![&miss],
            closest_hit_shader: None,
            max_recursion_depth: 1,
            set_layouts: vec![DescriptorSetLayoutDesc::sequential(
                &[DescriptorType::AccelerationStructure, DescriptorType::StorageImage, DescriptorType::UniformBuffer],
                ShaderStageFlags::RAYGEN,
            )],
            push_constant_ranges: Vec::new(),
        })?;

        self.pipeline = Some(pipeline);
        self.tlas = Some(tlas);
        self.build_sets(ctx)
    }

    fn draw_prepass(&mut self, rec: &mut PassRecorder) -> Result<()> {
        let pipeline = self.pipeline.as_ref().ok_or_else(|| not_initialized("RayTracing"))?;
        let set = self.sets.get(rec.frame_slot).ok_or_else(|| not_initialized("RayTracing"))?;
        let visibility = self.visibility.as_ref().ok_or_else(|| not_initialized("RayTracing"))?;

        // Previous contents were consumed by last frame's lighting subpass
        rec.cmd.texture_barrier(
            visibility.as_ref(),
            TextureBarrier {
                old_layout: ImageLayout::Undefined,
                new_layout: ImageLayout::General,
                src_stages: PipelineStages::FRAGMENT_SHADER,
                dst_stages: PipelineStages::RAY_TRACING_SHADER,
                src_access: AccessFlags::SHADER_READ,
                dst_access: AccessFlags::SHADER_WRITE,
            },
        )?;
        rec.cmd.bind_pipeline(pipeline)?;
        rec.cmd.bind_descriptor_set(pipeline, 0, set)?;
        rec.cmd.trace_rays(pipeline, rec.extent.width, rec.extent.height)?;
        rec.cmd.texture_barrier(
            visibility.as_ref(),
            TextureBarrier {
                old_layout: ImageLayout::General,
                new_layout: ImageLayout::ShaderReadOnly,
                src_stages: PipelineStages::RAY_TRACING_SHADER,
                dst_stages: PipelineStages::FRAGMENT_SHADER,
                src_access: AccessFlags::SHADER_WRITE,
                dst_access: AccessFlags::SHADER_READ,
            },
        )
    }

    fn update_after_attachment_recreate(&mut self, ctx: &mut PassGraphContext) -> Result<()> {
        self.build_sets(ctx)
    }

    fn clean(&mut self) {
        self.sets.clear();
        self.visibility = None;
        self.tlas = None;
        self.pipeline = None;
    }
}
