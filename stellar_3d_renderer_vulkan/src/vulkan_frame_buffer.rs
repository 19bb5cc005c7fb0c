/// Framebuffer - Vulkan implementation of the Framebuffer trait
///
/// Groups the attachment views of one render pass instance. Created when
/// the render graph is built and rebuilt with it on resize.

use stellar_3d_renderer::stellar3d::Result;
use stellar_3d_renderer::stellar3d::render::{
    Framebuffer as RendererFramebuffer, FramebufferDesc, RenderPass as RendererRenderPass,
    RenderTarget as RendererRenderTarget,
};
use stellar_3d_renderer::{engine_bail, engine_err};
use ash::vk;
use std::sync::Arc;

use crate::vulkan_context::GpuContext;
use crate::vulkan_render_pass::RenderPass;
use crate::vulkan_render_target::RenderTarget;

/// Vulkan framebuffer implementation
///
/// Keeps its attachments alive; destroyed when dropped.
pub struct Framebuffer {
    ctx: Arc<GpuContext>,
    pub(crate) framebuffer: vk::Framebuffer,
    width: u32,
    height: u32,
    _attachments: Vec<Arc<dyn RendererRenderTarget>>,
}

impl Framebuffer {
    pub(crate) fn new(ctx: Arc<GpuContext>, desc: &FramebufferDesc) -> Result<Self> {
        let expected = desc.render_pass.attachment_count() as usize;
        if desc.attachments.len() != expected {
            engine_bail!("stellar3d::vulkan",
                "create_framebuffer: render pass has {} attachments, got {}",
                expected, desc.attachments.len());
        }
        if let Some(small) = desc.attachments.iter()
            .find(|rt| rt.width() < desc.width || rt.height() < desc.height)
        {
            engine_bail!("stellar3d::vulkan",
                "create_framebuffer: attachment {}x{} smaller than framebuffer {}x{}",
                small.width(), small.height(), desc.width, desc.height);
        }

        unsafe {
            let vk_render_pass = desc.render_pass.as_ref()
                as *const dyn RendererRenderPass
                as *const RenderPass;
            let vk_render_pass = &*vk_render_pass;

            let views: Vec<vk::ImageView> = desc.attachments
                .iter()
                .map(|rt| {
                    let vk_rt = rt.as_ref() as *const dyn RendererRenderTarget as *const RenderTarget;
                    (*vk_rt).image_view
                })
                .collect();

            let framebuffer_info = vk::FramebufferCreateInfo::default()
                .render_pass(vk_render_pass.render_pass)
                .attachments(&views)
                .width(desc.width)
                .height(desc.height)
                .layers(desc.layers.max(1));

            let framebuffer = ctx.device.create_framebuffer(&framebuffer_info, None)
                .map_err(|e| engine_err!("stellar3d::vulkan", "Failed to create framebuffer: {:?}", e))?;

            Ok(Self {
                ctx,
                framebuffer,
                width: desc.width,
                height: desc.height,
                _attachments: desc.attachments.clone(),
            })
        }
    }
}

impl RendererFramebuffer for Framebuffer {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.destroy_framebuffer(self.framebuffer, None);
        }
    }
}
