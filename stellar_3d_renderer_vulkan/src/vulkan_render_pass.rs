/// RenderPass - Vulkan implementation of the RenderPass trait

use stellar_3d_renderer::stellar3d::Result;
use stellar_3d_renderer::stellar3d::render::{
    AttachmentReference, RenderPass as RendererRenderPass, RenderPassDesc, SUBPASS_EXTERNAL,
};
use stellar_3d_renderer::{engine_bail, engine_err};
use ash::vk;
use std::sync::Arc;

use crate::vulkan_context::GpuContext;
use crate::vulkan_format::{
    access_flags_to_vk, image_layout_to_vk, load_op_to_vk, pipeline_stages_to_vk,
    sample_count_to_vk, store_op_to_vk, texture_format_to_vk,
};

/// Vulkan render pass implementation
pub struct RenderPass {
    ctx: Arc<GpuContext>,
    pub(crate) render_pass: vk::RenderPass,
    attachment_count: u32,
    subpass_count: u32,
}

/// Attachment references of one subpass, kept alive while the
/// `vk::SubpassDescription` borrowing them is in use
struct SubpassRefs {
    inputs: Vec<vk::AttachmentReference>,
    colors: Vec<vk::AttachmentReference>,
    depth: Option<vk::AttachmentReference>,
    preserve: Vec<u32>,
}

impl RenderPass {
    pub(crate) fn new(ctx: Arc<GpuContext>, desc: &RenderPassDesc) -> Result<Self> {
        validate_render_pass_desc(desc)?;

        let attachments: Vec<vk::AttachmentDescription> = desc.attachments
            .iter()
            .map(|attachment| {
                vk::AttachmentDescription::default()
                    .format(texture_format_to_vk(attachment.format))
                    .samples(sample_count_to_vk(attachment.samples))
                    .load_op(load_op_to_vk(attachment.load_op))
                    .store_op(store_op_to_vk(attachment.store_op))
                    .stencil_load_op(load_op_to_vk(attachment.stencil_load_op))
                    .stencil_store_op(store_op_to_vk(attachment.stencil_store_op))
                    .initial_layout(image_layout_to_vk(attachment.initial_layout))
                    .final_layout(image_layout_to_vk(attachment.final_layout))
            })
            .collect();

        let to_vk_ref = |reference: &AttachmentReference| {
            vk::AttachmentReference::default()
                .attachment(reference.attachment)
                .layout(image_layout_to_vk(reference.layout))
        };

        let refs: Vec<SubpassRefs> = desc.subpasses
            .iter()
            .map(|subpass| SubpassRefs {
                inputs: subpass.input_attachments.iter().map(to_vk_ref).collect(),
                colors: subpass.color_attachments.iter().map(to_vk_ref).collect(),
                depth: subpass.depth_stencil_attachment.as_ref().map(to_vk_ref),
                preserve: subpass.preserve_attachments.clone(),
            })
            .collect();

        let subpasses: Vec<vk::SubpassDescription> = refs
            .iter()
            .map(|r| {
                let mut subpass = vk::SubpassDescription::default()
                    .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
                    .input_attachments(&r.inputs)
                    .color_attachments(&r.colors)
                    .preserve_attachments(&r.preserve);
                if let Some(depth) = &r.depth {
                    subpass = subpass.depth_stencil_attachment(depth);
                }
                subpass
            })
            .collect();

        let dependencies: Vec<vk::SubpassDependency> = desc.dependencies
            .iter()
            .map(|dep| {
                vk::SubpassDependency::default()
                    .src_subpass(external_to_vk(dep.src_subpass))
                    .dst_subpass(external_to_vk(dep.dst_subpass))
                    .src_stage_mask(pipeline_stages_to_vk(dep.src_stages))
                    .dst_stage_mask(pipeline_stages_to_vk(dep.dst_stages))
                    .src_access_mask(access_flags_to_vk(dep.src_access))
                    .dst_access_mask(access_flags_to_vk(dep.dst_access))
                    .dependency_flags(if dep.by_region {
                        vk::DependencyFlags::BY_REGION
                    } else {
                        vk::DependencyFlags::empty()
                    })
            })
            .collect();

        let render_pass_info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        let render_pass = unsafe {
            ctx.device.create_render_pass(&render_pass_info, None)
                .map_err(|e| engine_err!("stellar3d::vulkan", "Failed to create render pass: {:?}", e))?
        };

        Ok(Self {
            ctx,
            render_pass,
            attachment_count: desc.attachments.len() as u32,
            subpass_count: desc.subpasses.len() as u32,
        })
    }
}

pub(crate) fn external_to_vk(subpass: u32) -> u32 {
    if subpass == SUBPASS_EXTERNAL {
        vk::SUBPASS_EXTERNAL
    } else {
        subpass
    }
}

/// Reject references the driver would otherwise accept silently or crash on
pub(crate) fn validate_render_pass_desc(desc: &RenderPassDesc) -> Result<()> {
    if desc.subpasses.is_empty() {
        engine_bail!("stellar3d::vulkan", "create_render_pass: no subpass declared");
    }

    let attachment_count = desc.attachments.len() as u32;
    for (index, subpass) in desc.subpasses.iter().enumerate() {
        let referenced = subpass.input_attachments.iter()
            .chain(subpass.color_attachments.iter())
            .chain(subpass.depth_stencil_attachment.iter())
            .map(|r| r.attachment)
            .chain(subpass.preserve_attachments.iter().copied());
        for attachment in referenced {
            if attachment >= attachment_count {
                engine_bail!("stellar3d::vulkan",
                    "create_render_pass: subpass {} references attachment {} (render pass has {})",
                    index, attachment, attachment_count);
            }
        }
    }

    let subpass_count = desc.subpasses.len() as u32;
    for dep in &desc.dependencies {
        let in_range = |s: u32| s == SUBPASS_EXTERNAL || s < subpass_count;
        if !in_range(dep.src_subpass) || !in_range(dep.dst_subpass) {
            engine_bail!("stellar3d::vulkan",
                "create_render_pass: dependency {} -> {} names a missing subpass",
                dep.src_subpass, dep.dst_subpass);
        }
    }

    Ok(())
}

impl RendererRenderPass for RenderPass {
    fn attachment_count(&self) -> u32 {
        self.attachment_count
    }

    fn subpass_count(&self) -> u32 {
        self.subpass_count
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.destroy_render_pass(self.render_pass, None);
        }
    }
}

#[cfg(test)]
#[path = "vulkan_render_pass_tests.rs"]
mod tests;
