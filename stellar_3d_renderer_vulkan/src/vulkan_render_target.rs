/// RenderTarget - Vulkan implementation of the RenderTarget trait

use stellar_3d_renderer::stellar3d::Result;
use stellar_3d_renderer::stellar3d::render::{
    RenderTarget as RendererRenderTarget, Texture as RendererTexture, TextureFormat,
};
use stellar_3d_renderer::{engine_bail, engine_err};
use ash::vk;
use std::sync::Arc;

use crate::vulkan_context::GpuContext;
use crate::vulkan_format::{texture_format_to_vk, view_aspect};
use crate::vulkan_texture::Texture;

/// Vulkan render target implementation
///
/// Either a view on one layer/mip of a texture (owns the view and keeps the
/// texture alive) or a swapchain image view (owned by the swapchain).
pub struct RenderTarget {
    width: u32,
    height: u32,
    format: TextureFormat,
    pub(crate) image_view: vk::ImageView,
    /// Set when this target owns `image_view`
    ctx: Option<Arc<GpuContext>>,
    _texture: Option<Arc<dyn RendererTexture>>,
}

impl RenderTarget {
    /// Non-owning target on a swapchain image view
    pub(crate) fn new_swapchain_target(
        width: u32,
        height: u32,
        format: TextureFormat,
        image_view: vk::ImageView,
    ) -> Self {
        Self {
            width,
            height,
            format,
            image_view,
            ctx: None,
            _texture: None,
        }
    }

    /// View on `layer` / `mip_level` of an attachment texture
    pub(crate) fn new_texture_target(
        ctx: Arc<GpuContext>,
        texture: &Arc<dyn RendererTexture>,
        layer: u32,
        mip_level: u32,
    ) -> Result<Self> {
        let info = texture.info();

        if !info.usage.is_attachment() {
            engine_bail!("stellar3d::vulkan",
                "create_render_target: texture '{}' usage {:?} has no attachment flag",
                info.label, info.usage);
        }
        if layer >= info.array_layers {
            engine_bail!("stellar3d::vulkan",
                "create_render_target: layer {} out of range for '{}' (array_layers = {})",
                layer, info.label, info.array_layers);
        }
        if mip_level >= info.mip_levels {
            engine_bail!("stellar3d::vulkan",
                "create_render_target: mip_level {} out of range for '{}' (mip_levels = {})",
                mip_level, info.label, info.mip_levels);
        }

        unsafe {
            // Downcast to Vulkan texture to access VkImage
            let vk_texture = texture.as_ref() as *const dyn RendererTexture as *const Texture;
            let vk_texture = &*vk_texture;

            let view_create_info = vk::ImageViewCreateInfo::default()
                .image(vk_texture.image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(texture_format_to_vk(info.format))
                .components(vk::ComponentMapping::default())
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: view_aspect(info.format),
                    base_mip_level: mip_level,
                    level_count: 1,
                    base_array_layer: layer,
                    layer_count: 1,
                });

            let view = ctx.device.create_image_view(&view_create_info, None)
                .map_err(|e| engine_err!("stellar3d::vulkan",
                    "Failed to create render target view of '{}': {:?}", info.label, e))?;

            Ok(Self {
                width: (info.width >> mip_level).max(1),
                height: (info.height >> mip_level).max(1),
                format: info.format,
                image_view: view,
                ctx: Some(ctx),
                _texture: Some(Arc::clone(texture)),
            })
        }
    }
}

impl RendererRenderTarget for RenderTarget {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn format(&self) -> TextureFormat {
        self.format
    }
}

impl Drop for RenderTarget {
    fn drop(&mut self) {
        if let Some(ctx) = &self.ctx {
            unsafe {
                ctx.device.destroy_image_view(self.image_view, None);
            }
        }
    }
}
