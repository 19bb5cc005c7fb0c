/// Screen-space ambient occlusion (subpass 1)
///
/// Reads the normal and position G-buffers as input attachments and writes
/// the occlusion term. The hemisphere kernel is generated once from Halton
/// sequences and lives in a uniform buffer.

use std::sync::Arc;
use glam::{Vec3, Vec4};

use crate::attachment::AttachmentSlot;
use crate::config::{SsaoConfig, SSAO_KERNEL_SIZE};
use crate::device::{
    BindingResource, Buffer, BufferDesc, BufferUsage, ColorBlend, DescriptorSet,
    DescriptorSetLayoutDesc, DescriptorType, Pipeline, ShaderStageFlags,
};
use crate::error::Result;
use crate::pass::{
    not_initialized, FullscreenPipelineDesc, Pass, PassGraphContext, PassRecorder, ShaderProgram, SsaoUniforms,
};
use crate::render_graph::SubpassId;

/// Radical inverse of `index` in `base`
pub fn halton(mut index: u32, base: u32) -> f32 {
    let mut f = 1.0;
    let mut result = 0.0;
    while index > 0 {
        f /= base as f32;
        result += f * (index % base) as f32;
        index /= base;
    }
    result
}

/// Tangent-space hemisphere samples (z up), denser near the origin
pub fn ssao_kernel() -> [Vec4; SSAO_KERNEL_SIZE] {
    let mut kernel = [Vec4::ZERO; SSAO_KERNEL_SIZE];
    for (i, sample) in kernel.iter_mut().enumerate() {
        let n = i as u32 + 1;
        let direction = Vec3::new(
            halton(n, 2) * 2.0 - 1.0,
            halton(n, 3) * 2.0 - 1.0,
            halton(n, 5).max(0.05),
        )
        .normalize();
        let t = i as f32 / SSAO_KERNEL_SIZE as f32;
        let scale = 0.1 + 0.9 * t * t;
        *sample = (direction * scale).extend(0.0);
    }
    kernel
}

pub struct SsaoPass {
    config: SsaoConfig,
    pipeline: Option<Arc<dyn Pipeline>>,
    kernel_buffer: Option<Arc<dyn Buffer>>,
    /// Set 0 (frame uniforms) per frame slot
    frame_sets: Vec<Arc<dyn DescriptorSet>>,
    /// Set 1: normal and position input attachments, kernel
    input_set: Option<Arc<dyn DescriptorSet>>,
}

impl SsaoPass {
    pub fn new(config: SsaoConfig) -> Self {
        Self {
            config,
            pipeline: None,
            kernel_buffer: None,
            frame_sets: Vec::new(),
            input_set: None,
        }
    }

    fn build_input_set(&mut self, ctx: &PassGraphContext) -> Result<()> {
        let pipeline = self.pipeline.as_ref().ok_or_else(|| not_initialized("SSAO"))?;
        let kernel = self.kernel_buffer.as_ref().ok_or_else(|| not_initialized("SSAO"))?;
        let normal = ctx.attachments.texture(AttachmentSlot::GBufferNormal)?;
        let position = ctx.attachments.texture(AttachmentSlot::GBufferPosition)?;

        self.input_set = Some(ctx.device.create_descriptor_set(
            pipeline,
            1,
            &[
                BindingResource::InputAttachment(normal.as_ref()),
                BindingResource::InputAttachment(position.as_ref()),
                BindingResource::UniformBuffer(kernel.as_ref()),
            ],
        )?);
        Ok(())
    }
}

impl Pass for SsaoPass {
    fn name(&self) -> &'static str {
        "SSAO"
    }

    fn subpass(&self) -> Option<SubpassId> {
        Some(SubpassId::Ssao)
    }

    fn initialize(&mut self, ctx: &mut PassGraphContext) -> Result<()> {
        let pipeline = ctx.create_fullscreen_pipeline(FullscreenPipelineDesc {
            label: "ssao",
            fragment: ShaderProgram::Ssao,
            render_pass: ctx.render_pass,
            subpass: SubpassId::Ssao.index(),
            color_attachment_count: ctx.color_count(SubpassId::Ssao)?,
            blend: ColorBlend::Opaque,
            set_layouts: vec![
                DescriptorSetLayoutDesc::sequential(&[DescriptorType::UniformBuffer], ShaderStageFlags::FRAGMENT),
                DescriptorSetLayoutDesc::sequential(
                    &[DescriptorType::InputAttachment, DescriptorType::InputAttachment, DescriptorType::UniformBuffer],
                    ShaderStageFlags::FRAGMENT,
                ),
            ],
            push_constant_ranges: Vec::new(),
        })?;

        let uniforms = SsaoUniforms {
            samples: ssao_kernel(),
            params: Vec4::new(
                self.config.radius,
                self.config.bias,
                self.config.intensity,
                SSAO_KERNEL_SIZE as f32,
            ),
        };
        let kernel_buffer = ctx.device.create_buffer(BufferDesc {
            label: "ssao_kernel",
            size: std::mem::size_of::<SsaoUniforms>() as u64,
            usage: BufferUsage::UNIFORM,
        })?;
        kernel_buffer.update(0, bytemuck::bytes_of(&uniforms))?;

        self.frame_sets = ctx
            .shared
            .frame_uniforms
            .iter()
            .map(|buffer| ctx.device.create_descriptor_set(&pipeline, 0, &[BindingResource::UniformBuffer(buffer.as_ref())]))
            .collect::<Result<_>>()?;
        self.pipeline = Some(pipeline);
        self.kernel_buffer = Some(kernel_buffer);
        self.build_input_set(ctx)
    }

    fn draw(&mut self, rec: &mut PassRecorder) -> Result<()> {
        let pipeline = self.pipeline.as_ref().ok_or_else(|| not_initialized("SSAO"))?;
        let frame_set = self.frame_sets.get(rec.frame_slot).ok_or_else(|| not_initialized("SSAO"))?;
        let input_set = self.input_set.as_ref().ok_or_else(|| not_initialized("SSAO"))?;

        rec.cmd.bind_pipeline(pipeline)?;
        rec.cmd.bind_descriptor_set(pipeline, 0, frame_set)?;
        rec.cmd.bind_descriptor_set(pipeline, 1, input_set)?;
        rec.cmd.draw(3, 0)
    }

    fn update_after_attachment_recreate(&mut self, ctx: &mut PassGraphContext) -> Result<()> {
        self.build_input_set(ctx)
    }

    fn clean(&mut self) {
        self.input_set = None;
        self.frame_sets.clear();
        self.kernel_buffer = None;
        self.pipeline = None;
    }
}

#[cfg(test)]
#[path = "ssao_pass_tests.rs"]
mod tests;
