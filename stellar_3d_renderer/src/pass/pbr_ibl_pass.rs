//! PBR lighting with image-based ambient (subpass 2)
//!
//! Two one-time precomputes feed the lighting shader: the environment map
//! convolved into a diffuse irradiance cube (`CubePass`, one draw per face)
//! and the split-sum BRDF lookup table (`LutPass`). Both are recorded before
//! the main render pass of the first frame and again on the first frame
//! after each attachment recreation; `invalidate_precompute` schedules them
//! after the environment changes.
//!
//! Shadowing comes from the cascaded shadow map in the deferred variant and
//! from the ray traced visibility image in the ray traced variant.

use std::sync::Arc;

use crate::attachment::AttachmentSlot;
use crate::config::{PipelineVariant, BRDF_LUT_SIZE, IRRADIANCE_CUBE_SIZE, MAX_FRAMES_IN_FLIGHT};
use crate::device::{
    AttachmentDesc, BindingResource, ClearValue, ColorBlend, DescriptorSet, DescriptorSetLayoutDesc,
    DescriptorType, Framebuffer, FramebufferDesc, ImageLayout, LoadOp, Pipeline, PushConstantRange,
    Rect2D, RenderPass, RenderPassDesc, RenderTarget, SamplerType, ShaderStageFlags, StoreOp, Texture,
    TextureDesc, TextureFormat, TextureType, TextureUsage, Viewport,
};
use crate::error::Result;
use crate::pass::{
    not_initialized, FullscreenPipelineDesc, Pass, PassGraphContext, PassRecorder, ShaderProgram,
};
use crate::render_graph::SubpassId;
use crate::{engine_debug, engine_info};

const IRRADIANCE_FORMAT: TextureFormat = TextureFormat::R16G16B16A16_SFLOAT;
const BRDF_LUT_FORMAT: TextureFormat = TextureFormat::R16G16_SFLOAT;
const CUBE_FACES: u32 = 6;

fn offscreen_render_pass(ctx: &PassGraphContext, format: TextureFormat) -> Result<Arc<dyn RenderPass>> {
    ctx.device.create_render_pass(&RenderPassDesc::single_subpass(
        vec![AttachmentDesc::color(format, LoadOp::Clear, StoreOp::Store, ImageLayout::ShaderReadOnly)],
        None,
    ))
}

/// Convolves the environment map into the irradiance cube, one face per draw
struct CubePass {
    render_pass: Option<Arc<dyn RenderPass>>,
    face_targets: Vec<Arc<dyn RenderTarget>>,
    framebuffers: Vec<Arc<dyn Framebuffer>>,
    pipeline: Option<Arc<dyn Pipeline>>,
    environment_set: Option<Arc<dyn DescriptorSet>>,
}

impl CubePass {
    fn new() -> Self {
        Self {
            render_pass: None,
            face_targets: Vec::new(),
            framebuffers: Vec::new(),
            pipeline: None,
            environment_set: None,
        }
    }

    fn initialize(&mut self, ctx: &PassGraphContext, cube: &Arc<dyn Texture>) -> Result<()> {
        let render_pass = offscreen_render_pass(ctx, IRRADIANCE_FORMAT)?;
        self.face_targets = (0..CUBE_FACES)
            .map(|face| ctx.device.create_render_target(cube, face, 0))
            .collect::<Result<_>>()?;
        self.framebuffers = self
            .face_targets
            .iter()
            .map(|target| {
                ctx.device.create_framebuffer(&FramebufferDesc {
                    render_pass: &render_pass,
                    attachments: vec![target.clone()],
                    width: IRRADIANCE_CUBE_SIZE,
                    height: IRRADIANCE_CUBE_SIZE,
                    layers: 1,
                })
            })
            .collect::<Result<_>>()?;

        let pipeline = ctx.create_fullscreen_pipeline(FullscreenPipelineDesc {
            label: "irradiance_convolution",
            fragment: ShaderProgram::IrradianceConvolution,
            render_pass: &render_pass,
            subpass: 0,
            color_attachment_count: 1,
            blend: ColorBlend::Opaque,
            set_layouts: vec![DescriptorSetLayoutDesc::sequential(
                &[DescriptorType::CombinedImageSampler],
                ShaderStageFlags::FRAGMENT,
            )],
            push_constant_ranges: vec![PushConstantRange { stages: ShaderStageFlags::FRAGMENT, offset: 0, size: 4 }],
        })?;
        self.environment_set = Some(ctx.device.create_descriptor_set(
            &pipeline,
            0,
            &[BindingResource::SampledTexture(ctx.scene.environment_map.as_ref(), SamplerType::LinearClamp)],
        )?);
        self.pipeline = Some(pipeline);
        self.render_pass = Some(render_pass);
        Ok(())
    }

    fn record(&self, rec: &mut PassRecorder) -> Result<()> {
        let render_pass = self.render_pass.as_ref().ok_or_else(|| not_initialized("CubePass"))?;
        let pipeline = self.pipeline.as_ref().ok_or_else(|| not_initialized("CubePass"))?;
        let set = self.environment_set.as_ref().ok_or_else(|| not_initialized("CubePass"))?;

        for (face, framebuffer) in self.framebuffers.iter().enumerate() {
            rec.cmd.begin_render_pass(render_pass, framebuffer, &[ClearValue::Color([0.0; 4])])?;
            rec.cmd.set_viewport(Viewport::full(IRRADIANCE_CUBE_SIZE, IRRADIANCE_CUBE_SIZE))?;
            rec.cmd.set_scissor(Rect2D::full(IRRADIANCE_CUBE_SIZE, IRRADIANCE_CUBE_SIZE))?;
            rec.cmd.bind_pipeline(pipeline)?;
            rec.cmd.bind_descriptor_set(pipeline, 0, set)?;
            rec.cmd.push_constants(ShaderStageFlags::FRAGMENT, 0, &(face as u32).to_ne_bytes())?;
            rec.cmd.draw(3, 0)?;
            rec.cmd.end_render_pass()?;
        }
        Ok(())
    }

    fn clean(&mut self) {
        self.environment_set = None;
        self.pipeline = None;
        self.framebuffers.clear();
        self.face_targets.clear();
        self.render_pass = None;
    }
}

/// Integrates the split-sum BRDF into a 2D lookup table
struct LutPass {
    render_pass: Option<Arc<dyn RenderPass>>,
    target: Option<Arc<dyn RenderTarget>>,
    framebuffer: Option<Arc<dyn Framebuffer>>,
    pipeline: Option<Arc<dyn Pipeline>>,
}

impl LutPass {
    fn new() -> Self {
        Self { render_pass: None, target: None, framebuffer: None, pipeline: None }
    }

    fn initialize(&mut self, ctx: &PassGraphContext, lut: &Arc<dyn Texture>) -> Result<()> {
        let render_pass = offscreen_render_pass(ctx, BRDF_LUT_FORMAT)?;
        let target = ctx.device.create_render_target(lut, 0, 0)?;
        let framebuffer = ctx.device.create_framebuffer(&FramebufferDesc {
            render_pass: &render_pass,
            attachments: vec![target.clone()],
            width: BRDF_LUT_SIZE,
            height: BRDF_LUT_SIZE,
            layers: 1,
        })?;
        let pipeline = ctx.create_fullscreen_pipeline(FullscreenPipelineDesc {
            label: "brdf_integration",
            fragment: ShaderProgram::BrdfIntegration,
            render_pass: &render_pass,
            subpass: 0,
            color_attachment_count: 1,
            blend: ColorBlend::Opaque,
            set_layouts: Vec::new(),
            push_constant_ranges: Vec::new(),
        })?;

        self.render_pass = Some(render_pass);
        self.target = Some(target);
        self.framebuffer = Some(framebuffer);
        self.pipeline = Some(pipeline);
        Ok(())
    }

    fn record(&self, rec: &mut PassRecorder) -> Result<()> {
        let render_pass = self.render_pass.as_ref().ok_or_else(|| not_initialized("LutPass"))?;
        let framebuffer = self.framebuffer.as_ref().ok_or_else(|| not_initialized("LutPass"))?;
        let pipeline = self.pipeline.as_ref().ok_or_else(|| not_initialized("LutPass"))?;

        rec.cmd.begin_render_pass(render_pass, framebuffer, &[ClearValue::Color([0.0; 4])])?;
        rec.cmd.set_viewport(Viewport::full(BRDF_LUT_SIZE, BRDF_LUT_SIZE))?;
        rec.cmd.set_scissor(Rect2D::full(BRDF_LUT_SIZE, BRDF_LUT_SIZE))?;
        rec.cmd.bind_pipeline(pipeline)?;
        rec.cmd.draw(3, 0)?;
        rec.cmd.end_render_pass()
    }

    fn clean(&mut self) {
        self.pipeline = None;
        self.framebuffer = None;
        self.target = None;
        self.render_pass = None;
    }
}

pub struct PbrIblPass {
    variant: PipelineVariant,
    irradiance_cube: Option<Arc<dyn Texture>>,
    brdf_lut: Option<Arc<dyn Texture>>,
    cube_pass: CubePass,
    lut_pass: LutPass,
    /// Precompute already recorded
    executed: bool,
    precompute_runs: u32,
    pipeline: Option<Arc<dyn Pipeline>>,
    /// Set 0 (frame uniforms) per frame slot
    frame_sets: Vec<Arc<dyn DescriptorSet>>,
    /// Set 1: G-buffer and occlusion input attachments
    gbuffer_set: Option<Arc<dyn DescriptorSet>>,
    /// Set 2 (shadow and IBL textures) per frame slot
    lighting_sets: Vec<Arc<dyn DescriptorSet>>,
}

impl PbrIblPass {
    pub fn new(variant: PipelineVariant) -> Self {
        Self {
            variant,
            irradiance_cube: None,
            brdf_lut: None,
            cube_pass: CubePass::new(),
            lut_pass: LutPass::new(),
            executed: false,
            precompute_runs: 0,
            pipeline: None,
            frame_sets: Vec::new(),
            gbuffer_set: None,
            lighting_sets: Vec::new(),
        }
    }

    /// Number of times the irradiance cube and BRDF LUT were recorded
    pub fn precompute_runs(&self) -> u32 {
        self.precompute_runs
    }

    /// Record the precompute again before the next frame
    pub fn invalidate_precompute(&mut self) {
        self.executed = false;
    }

    fn lighting_set_layout(&self) -> DescriptorSetLayoutDesc {
        let mut types = vec![DescriptorType::CombinedImageSampler; 4];
        if self.variant == PipelineVariant::Deferred {
            types.push(DescriptorType::UniformBuffer);
        }
        DescriptorSetLayoutDesc::sequential(&types, ShaderStageFlags::FRAGMENT)
    }

    /// Rebuild the sets that reference swapchain-sized attachments
    fn build_attachment_sets(&mut self, ctx: &PassGraphContext) -> Result<()> {
        let pipeline = self.pipeline.as_ref().ok_or_else(|| not_initialized("PbrIbl"))?;
        let irradiance = self.irradiance_cube.as_ref().ok_or_else(|| not_initialized("PbrIbl"))?;
        let lut = self.brdf_lut.as_ref().ok_or_else(|| not_initialized("PbrIbl"))?;

        let albedo = ctx.attachments.texture(AttachmentSlot::GBufferAlbedo)?;
        let normal = ctx.attachments.texture(AttachmentSlot::GBufferNormal)?;
        let material = ctx.attachments.texture(AttachmentSlot::GBufferMaterial)?;
        let position = ctx.attachments.texture(AttachmentSlot::GBufferPosition)?;
        let occlusion = ctx.attachments.texture(AttachmentSlot::AmbientOcclusion)?;
        self.gbuffer_set = Some(ctx.device.create_descriptor_set(
            pipeline,
            1,
            &[
                BindingResource::InputAttachment(albedo.as_ref()),
                BindingResource::InputAttachment(normal.as_ref()),
                BindingResource::InputAttachment(material.as_ref()),
                BindingResource::InputAttachment(position.as_ref()),
                BindingResource::InputAttachment(occlusion.as_ref()),
            ],
        )?);

        let environment = ctx.scene.environment_map.as_ref();
        let mut lighting_sets = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
        for slot in 0..MAX_FRAMES_IN_FLIGHT {
            let set = match self.variant {
                PipelineVariant::Deferred => {
                    let shadow_map = ctx.shared.shadow_map()?;
                    let cascades = ctx.shared.cascade_uniform(slot)?;
                    ctx.device.create_descriptor_set(
                        pipeline,
                        2,
                        &[
                            BindingResource::SampledTexture(shadow_map.as_ref(), SamplerType::ShadowCompare),
                            BindingResource::SampledTexture(irradiance.as_ref(), SamplerType::LinearClamp),
                            BindingResource::SampledTexture(lut.as_ref(), SamplerType::LinearClamp),
                            BindingResource::SampledTexture(environment, SamplerType::LinearClamp),
                            BindingResource::UniformBuffer(cascades.as_ref()),
                        ],
                    )?
                }
                PipelineVariant::RayTraced => {
                    let visibility = ctx.attachments.texture(AttachmentSlot::RayTracedShadow)?;
                    ctx.device.create_descriptor_set(
                        pipeline,
                        2,
                        &[
                            BindingResource::SampledTexture(visibility.as_ref(), SamplerType::NearestClamp),
                            BindingResource::SampledTexture(irradiance.as_ref(), SamplerType::LinearClamp),
                            BindingResource::SampledTexture(lut.as_ref(), SamplerType::LinearClamp),
                            BindingResource::SampledTexture(environment, SamplerType::LinearClamp),
                        ],
                    )?
                }
            };
            lighting_sets.push(set);
        }
        self.lighting_sets = lighting_sets;
        Ok(())
    }
}

impl Pass for PbrIblPass {
    fn name(&self) -> &'static str {
        "PbrIbl"
    }

    fn subpass(&self) -> Option<SubpassId> {
        Some(SubpassId::Lighting)
    }

    fn initialize(&mut self, ctx: &mut PassGraphContext) -> Result<()> {
        let mut cube_desc = TextureDesc::new_2d(
            "irradiance_cube",
            IRRADIANCE_CUBE_SIZE,
            IRRADIANCE_CUBE_SIZE,
            IRRADIANCE_FORMAT,
            TextureUsage::COLOR_ATTACHMENT | TextureUsage::SAMPLED,
        );
        cube_desc.texture_type = TextureType::Cube;
        cube_desc.array_layers = CUBE_FACES;
        let irradiance_cube = ctx.device.create_texture(cube_desc)?;
        let brdf_lut = ctx.device.create_texture(TextureDesc::new_2d(
            "brdf_lut",
            BRDF_LUT_SIZE,
            BRDF_LUT_SIZE,
            BRDF_LUT_FORMAT,
            TextureUsage::COLOR_ATTACHMENT | TextureUsage::SAMPLED,
        ))?;

        self.cube_pass.initialize(ctx, &irradiance_cube)?;
        self.lut_pass.initialize(ctx, &brdf_lut)?;

        let fragment = match self.variant {
            PipelineVariant::Deferred => ShaderProgram::Lighting,
            PipelineVariant::RayTraced => ShaderProgram::LightingRayTraced,
        };
        let pipeline = ctx.create_fullscreen_pipeline(FullscreenPipelineDesc {
            label: "pbr_ibl",
            fragment,
            render_pass: ctx.render_pass,
            subpass: SubpassId::Lighting.index(),
            color_attachment_count: ctx.color_count(SubpassId::Lighting)?,
            blend: ColorBlend::Opaque,
            set_layouts: vec![
                DescriptorSetLayoutDesc::sequential(&[DescriptorType::UniformBuffer], ShaderStageFlags::FRAGMENT),
                DescriptorSetLayoutDesc::sequential(&[DescriptorType::InputAttachment; 5], ShaderStageFlags::FRAGMENT),
                self.lighting_set_layout(),
            ],
            push_constant_ranges: Vec::new(),
        })?;

        self.frame_sets = ctx
            .shared
            .frame_uniforms
            .iter()
            .map(|buffer| ctx.device.create_descriptor_set(&pipeline, 0, &[BindingResource::UniformBuffer(buffer.as_ref())]))
            .collect::<Result<_>>()?;
        self.pipeline = Some(pipeline);
        self.irradiance_cube = Some(irradiance_cube.clone());
        self.brdf_lut = Some(brdf_lut.clone());
        self.build_attachment_sets(ctx)?;

        ctx.shared.irradiance_cube = Some(irradiance_cube);
        ctx.shared.brdf_lut = Some(brdf_lut);
        self.executed = false;
        Ok(())
    }

    fn draw_prepass(&mut self, rec: &mut PassRecorder) -> Result<()> {
        if self.executed {
            return Ok(());
        }
        self.cube_pass.record(rec)?;
        self.lut_pass.record(rec)?;
        self.executed = true;
        self.precompute_runs += 1;
        engine_info!("stellar3d::PbrIbl", "Recorded irradiance cube and BRDF LUT precompute");
        Ok(())
    }

    fn draw(&mut self, rec: &mut PassRecorder) -> Result<()> {
        let pipeline = self.pipeline.as_ref().ok_or_else(|| not_initialized("PbrIbl"))?;
        let frame_set = self.frame_sets.get(rec.frame_slot).ok_or_else(|| not_initialized("PbrIbl"))?;
        let gbuffer_set = self.gbuffer_set.as_ref().ok_or_else(|| not_initialized("PbrIbl"))?;
        let lighting_set = self.lighting_sets.get(rec.frame_slot).ok_or_else(|| not_initialized("PbrIbl"))?;

        rec.cmd.bind_pipeline(pipeline)?;
        rec.cmd.bind_descriptor_set(pipeline, 0, frame_set)?;
        rec.cmd.bind_descriptor_set(pipeline, 1, gbuffer_set)?;
        rec.cmd.bind_descriptor_set(pipeline, 2, lighting_set)?;
        rec.cmd.draw(3, 0)
    }

    fn update_after_attachment_recreate(&mut self, ctx: &mut PassGraphContext) -> Result<()> {
        self.build_attachment_sets(ctx)?;
        self.executed = false;
        Ok(())
    }

    fn clean(&mut self) {
        self.lighting_sets.clear();
        self.gbuffer_set = None;
        self.frame_sets.clear();
        self.pipeline = None;
        self.lut_pass.clean();
        self.cube_pass.clean();
        self.brdf_lut = None;
        self.irradiance_cube = None;
        self.executed = false;
        engine_debug!("stellar3d::PbrIbl", "Cleaned");
    }
}
