/// Tone mapping of the HDR lighting result into the swapchain image (subpass 3)

use std::sync::Arc;

use crate::attachment::AttachmentSlot;
use crate::device::{
    BindingResource, ColorBlend, DescriptorSet, DescriptorSetLayoutDesc, DescriptorType, Pipeline,
    PushConstantRange, ShaderStageFlags,
};
use crate::error::Result;
use crate::pass::{
    not_initialized, FullscreenPipelineDesc, Pass, PassGraphContext, PassRecorder, ShaderProgram,
};
use crate::render_graph::SubpassId;

pub struct ShadingPass {
    exposure: f32,
    pipeline: Option<Arc<dyn Pipeline>>,
    /// Set 0: lighting input attachment
    input_set: Option<Arc<dyn DescriptorSet>>,
}

impl ShadingPass {
    pub fn new(exposure: f32) -> Self {
        Self { exposure, pipeline: None, input_set: None }
    }

    pub fn set_exposure(&mut self, exposure: f32) {
        self.exposure = exposure;
    }

    fn build_input_set(&mut self, ctx: &PassGraphContext) -> Result<()> {
        let pipeline = self.pipeline.as_ref().ok_or_else(|| not_initialized("Shading"))?;
        let lighting = ctx.attachments.texture(AttachmentSlot::Lighting)?;
        self.input_set = Some(ctx.device.create_descriptor_set(
            pipeline,
            0,
            &[BindingResource::InputAttachment(lighting.as_ref())],
        )?);
        Ok(())
    }
}

impl Pass for ShadingPass {
    fn name(&self) -> &'static str {
        "Shading"
    }

    fn subpass(&self) -> Option<SubpassId> {
        Some(SubpassId::Shading)
    }

    fn initialize(&mut self, ctx: &mut PassGraphContext) -> Result<()> {
        let pipeline = ctx.create_fullscreen_pipeline(FullscreenPipelineDesc {
            label: "shading",
            fragment: ShaderProgram::Shading,
            render_pass: ctx.render_pass,
            subpass: SubpassId::Shading.index(),
            color_attachment_count: ctx.color_count(SubpassId::Shading)?,
            blend: ColorBlend::Opaque,
            set_layouts: vec![DescriptorSetLayoutDesc::sequential(
                &[DescriptorType::InputAttachment],
                ShaderStageFlags::FRAGMENT,
            )],
            push_constant_ranges: vec![PushConstantRange { stages: ShaderStageFlags::FRAGMENT, offset: 0, size: 4 }],
        })?;
        self.pipeline = Some(pipeline);
        self.build_input_set(ctx)
    }

    fn draw(&mut self, rec: &mut PassRecorder) -> Result<()> {
        let pipeline = self.pipeline.as_ref().ok_or_else(|| not_initialized("Shading"))?;
        let input_set = self.input_set.as_ref().ok_or_else(|| not_initialized("Shading"))?;

        rec.cmd.bind_pipeline(pipeline)?;
        rec.cmd.bind_descriptor_set(pipeline, 0, input_set)?;
        rec.cmd.push_constants(ShaderStageFlags::FRAGMENT, 0, &self.exposure.to_ne_bytes())?;
        rec.cmd.draw(3, 0)
    }

    fn update_after_attachment_recreate(&mut self, ctx: &mut PassGraphContext) -> Result<()> {
        self.build_input_set(ctx)
    }

    fn clean(&mut self) {
        self.input_set = None;
        self.pipeline = None;
    }
}
