/// Swapchain - Vulkan implementation of the Swapchain trait
///
/// Presentation only: acquire/present semaphores belong to the caller
/// (one pair per frame slot), so the swapchain itself holds no sync objects.

use stellar_3d_renderer::stellar3d::{Result, Error};
use stellar_3d_renderer::stellar3d::render::{
    AcquireOutcome, PresentOutcome, RenderTarget as RendererRenderTarget,
    Semaphore as RendererSemaphore, Swapchain as RendererSwapchain, TextureFormat,
};
use stellar_3d_renderer::{engine_debug, engine_err, engine_error, engine_info, engine_warn};
use ash::vk;
use std::sync::Arc;

use crate::vulkan_context::GpuContext;
use crate::vulkan_format::vk_format_to_texture_format;
use crate::vulkan_render_target::RenderTarget;
use crate::vulkan_sync::vk_semaphore;

/// Vulkan swapchain implementation
pub struct Swapchain {
    ctx: Arc<GpuContext>,
    physical_device: vk::PhysicalDevice,

    /// Owned by `VulkanGraphicsDevice`, which outlives every swapchain
    surface: vk::SurfaceKHR,
    surface_loader: ash::khr::surface::Instance,

    swapchain: vk::SwapchainKHR,
    swapchain_loader: ash::khr::swapchain::Device,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    surface_format: vk::SurfaceFormatKHR,
    format: TextureFormat,
    extent: vk::Extent2D,
}

/// Prefer an sRGB 8-bit surface format, else the first one the engine can name
pub(crate) fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<(vk::SurfaceFormatKHR, TextureFormat)> {
    let preferred = formats.iter().find(|f| {
        (f.format == vk::Format::B8G8R8A8_SRGB || f.format == vk::Format::R8G8B8A8_SRGB)
            && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
    });

    preferred
        .into_iter()
        .chain(formats.iter())
        .find_map(|f| vk_format_to_texture_format(f.format).map(|format| (*f, format)))
}

/// Surface extent, or the requested size clamped to the surface limits
/// when the surface lets the swapchain decide (`current_extent` is `u32::MAX`)
pub(crate) fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, width: u32, height: u32) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }
    vk::Extent2D {
        width: width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// One image above the minimum, capped by the maximum (0 = unbounded)
pub(crate) fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let image_count = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        image_count.min(capabilities.max_image_count)
    } else {
        image_count
    }
}

impl Swapchain {
    pub(crate) fn new(
        ctx: Arc<GpuContext>,
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: ash::khr::surface::Instance,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        let surface_formats = unsafe {
            surface_loader
                .get_physical_device_surface_formats(physical_device, surface)
                .map_err(|e| {
                    engine_error!("stellar3d::vulkan", "Failed to query surface formats: {:?}", e);
                    Error::InitializationFailed(format!("Failed to get surface formats: {:?}", e))
                })?
        };

        let (surface_format, format) = choose_surface_format(&surface_formats).ok_or_else(|| {
            engine_error!("stellar3d::vulkan", "No supported surface format among {} offered", surface_formats.len());
            Error::InitializationFailed("no supported surface format".to_string())
        })?;

        let swapchain_loader = ash::khr::swapchain::Device::new(instance, &ctx.device);

        let mut result = Self {
            ctx,
            physical_device,
            surface,
            surface_loader,
            swapchain: vk::SwapchainKHR::null(),
            swapchain_loader,
            images: Vec::new(),
            image_views: Vec::new(),
            surface_format,
            format,
            extent: vk::Extent2D { width, height },
        };
        result.build(width, height)?;

        engine_info!("stellar3d::vulkan", "Swapchain created: {}x{} {:?}, {} images",
            result.extent.width, result.extent.height, result.format, result.images.len());

        Ok(result)
    }

    /// (Re)build the swapchain, retiring the current one if any
    fn build(&mut self, width: u32, height: u32) -> Result<()> {
        unsafe {
            let capabilities = self.surface_loader
                .get_physical_device_surface_capabilities(self.physical_device, self.surface)
                .map_err(|e| {
                    engine_error!("stellar3d::vulkan", "Failed to get surface capabilities: {:?}", e);
                    Error::InitializationFailed(format!("Failed to get surface capabilities: {:?}", e))
                })?;

            let extent = choose_extent(&capabilities, width, height);
            if extent.width == 0 || extent.height == 0 {
                return Err(Error::InvalidState(format!(
                    "surface extent {}x{} cannot back a swapchain", extent.width, extent.height
                )));
            }

            let old_swapchain = self.swapchain;
            let swapchain_create_info = vk::SwapchainCreateInfoKHR::default()
                .surface(self.surface)
                .min_image_count(choose_image_count(&capabilities))
                .image_format(self.surface_format.format)
                .image_color_space(self.surface_format.color_space)
                .image_extent(extent)
                .image_array_layers(1)
                .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
                .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
                .pre_transform(capabilities.current_transform)
                .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
                .present_mode(vk::PresentModeKHR::FIFO)
                .clipped(true)
                .old_swapchain(old_swapchain);

            let swapchain = self.swapchain_loader
                .create_swapchain(&swapchain_create_info, None)
                .map_err(|e| {
                    engine_error!("stellar3d::vulkan", "Failed to create swapchain: {:?}", e);
                    Error::InitializationFailed(format!("Failed to create swapchain: {:?}", e))
                })?;

            self.destroy_image_views();
            if old_swapchain != vk::SwapchainKHR::null() {
                self.swapchain_loader.destroy_swapchain(old_swapchain, None);
            }
            self.swapchain = swapchain;
            self.extent = extent;

            self.images = self.swapchain_loader
                .get_swapchain_images(swapchain)
                .map_err(|e| {
                    engine_error!("stellar3d::vulkan", "Failed to get swapchain images: {:?}", e);
                    Error::InitializationFailed(format!("Failed to get swapchain images: {:?}", e))
                })?;

            for &image in &self.images {
                let create_info = vk::ImageViewCreateInfo::default()
                    .image(image)
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(self.surface_format.format)
                    .components(vk::ComponentMapping::default())
                    .subresource_range(vk::ImageSubresourceRange {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        base_mip_level: 0,
                        level_count: 1,
                        base_array_layer: 0,
                        layer_count: 1,
                    });
                let view = self.ctx.device.create_image_view(&create_info, None)
                    .map_err(|e| engine_err!("stellar3d::vulkan", "Failed to create swapchain image view: {:?}", e))?;
                self.image_views.push(view);
            }
        }
        Ok(())
    }

    fn destroy_image_views(&mut self) {
        for view in self.image_views.drain(..) {
            unsafe {
                self.ctx.device.destroy_image_view(view, None);
            }
        }
    }
}

impl RendererSwapchain for Swapchain {
    fn acquire_next_image(&mut self, signal: &dyn RendererSemaphore, timeout_ns: u64) -> Result<AcquireOutcome> {
        let result = unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                timeout_ns,
                vk_semaphore(signal),
                vk::Fence::null(),
            )
        };

        match result {
            Ok((image_index, false)) => Ok(AcquireOutcome::Acquired(image_index)),
            Ok((image_index, true)) => Ok(AcquireOutcome::Suboptimal(image_index)),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                engine_debug!("stellar3d::vulkan", "Swapchain out of date during acquire");
                Ok(AcquireOutcome::OutOfDate)
            }
            Err(vk::Result::TIMEOUT) | Err(vk::Result::NOT_READY) => {
                Err(Error::Timeout(format!("no swapchain image after {} ns", timeout_ns)))
            }
            Err(vk::Result::ERROR_DEVICE_LOST) => {
                engine_error!("stellar3d::vulkan", "Device lost during swapchain acquire");
                Err(Error::DeviceLost("device lost during acquire".to_string()))
            }
            Err(e) => Err(engine_err!("stellar3d::vulkan", "Failed to acquire next swapchain image: {:?}", e)),
        }
    }

    fn present(&mut self, image_index: u32, wait: &dyn RendererSemaphore) -> Result<PresentOutcome> {
        if image_index as usize >= self.images.len() {
            return Err(Error::InvalidResource(format!(
                "present of image {} (swapchain has {})", image_index, self.images.len()
            )));
        }

        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let wait_semaphores = [vk_semaphore(wait)];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe { self.swapchain_loader.queue_present(self.ctx.graphics_queue, &present_info) };
        match result {
            Ok(false) => Ok(PresentOutcome::Presented),
            Ok(true) | Err(vk::Result::SUBOPTIMAL_KHR) => Ok(PresentOutcome::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                engine_debug!("stellar3d::vulkan", "Swapchain out of date during present");
                Ok(PresentOutcome::OutOfDate)
            }
            Err(vk::Result::ERROR_DEVICE_LOST) => {
                engine_error!("stellar3d::vulkan", "Device lost during present");
                Err(Error::DeviceLost("device lost during present".to_string()))
            }
            Err(e) => Err(engine_err!("stellar3d::vulkan", "Failed to present swapchain image: {:?}", e)),
        }
    }

    fn recreate(&mut self, width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            engine_warn!("stellar3d::vulkan", "Swapchain recreate skipped for {}x{} surface", width, height);
            return Err(Error::InvalidState(format!("swapchain recreate at {}x{}", width, height)));
        }

        self.build(width, height)?;

        engine_info!("stellar3d::vulkan", "Swapchain recreated: {}x{}, {} images",
            self.extent.width, self.extent.height, self.images.len());
        Ok(())
    }

    fn image_count(&self) -> usize {
        self.images.len()
    }

    fn width(&self) -> u32 {
        self.extent.width
    }

    fn height(&self) -> u32 {
        self.extent.height
    }

    fn format(&self) -> TextureFormat {
        self.format
    }

    fn image_target(&self, index: usize) -> Result<Arc<dyn RendererRenderTarget>> {
        let view = self.image_views.get(index).copied().ok_or_else(|| {
            Error::InvalidResource(format!("swapchain image {} of {}", index, self.image_views.len()))
        })?;

        Ok(Arc::new(RenderTarget::new_swapchain_target(
            self.extent.width,
            self.extent.height,
            self.format,
            view,
        )))
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.destroy_image_views();
        if self.swapchain != vk::SwapchainKHR::null() {
            unsafe {
                self.swapchain_loader.destroy_swapchain(self.swapchain, None);
            }
        }
    }
}

#[cfg(test)]
#[path = "vulkan_swapchain_tests.rs"]
mod tests;
