/// Texture - Vulkan implementation of the Texture trait

use stellar_3d_renderer::stellar3d::{Result, Error};
use stellar_3d_renderer::stellar3d::render::{
    Buffer as RendererBuffer, Texture as RendererTexture, TextureDesc, TextureInfo, TextureType, TextureUsage,
    validate_texture_desc,
};
use stellar_3d_renderer::{engine_error, engine_err};
use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;
use std::sync::Arc;

use crate::vulkan_buffer::Buffer;
use crate::vulkan_context::GpuContext;
use crate::vulkan_format::{barrier_aspect, texture_format_to_vk, texture_usage_to_vk, view_aspect};

/// Vulkan texture implementation
///
/// Owns the image, its memory and the default view covering every layer
/// and mip.
pub struct Texture {
    ctx: Arc<GpuContext>,
    pub(crate) image: vk::Image,
    pub(crate) view: vk::ImageView,
    allocation: Option<Allocation>,
    info: TextureInfo,
}

impl Texture {
    pub(crate) fn new(ctx: Arc<GpuContext>, desc: TextureDesc) -> Result<Self> {
        validate_texture_desc(&desc)?;

        let format = texture_format_to_vk(desc.format);
        let mut usage = texture_usage_to_vk(desc.usage);
        if desc.data.is_some() {
            usage |= vk::ImageUsageFlags::TRANSFER_DST;
        }

        let (create_flags, view_type) = match desc.texture_type {
            TextureType::Tex2D => (vk::ImageCreateFlags::empty(), vk::ImageViewType::TYPE_2D),
            TextureType::Array2D => (vk::ImageCreateFlags::empty(), vk::ImageViewType::TYPE_2D_ARRAY),
            TextureType::Cube => (vk::ImageCreateFlags::CUBE_COMPATIBLE, vk::ImageViewType::CUBE),
        };

        unsafe {
            let image_create_info = vk::ImageCreateInfo::default()
                .flags(create_flags)
                .image_type(vk::ImageType::TYPE_2D)
                .format(format)
                .extent(vk::Extent3D {
                    width: desc.width,
                    height: desc.height,
                    depth: 1,
                })
                .mip_levels(desc.mip_levels)
                .array_layers(desc.array_layers)
                .samples(vk::SampleCountFlags::TYPE_1)
                .tiling(vk::ImageTiling::OPTIMAL)
                .usage(usage)
                .sharing_mode(vk::SharingMode::EXCLUSIVE)
                .initial_layout(vk::ImageLayout::UNDEFINED);

            let image = ctx.device.create_image(&image_create_info, None)
                .map_err(|e| engine_err!("stellar3d::vulkan", "Failed to create image for texture '{}': {:?}", desc.label, e))?;

            let requirements = ctx.device.get_image_memory_requirements(image);

            let allocation = ctx.allocator.lock().unwrap().allocate(&AllocationCreateDesc {
                name: desc.label,
                requirements,
                location: MemoryLocation::GpuOnly,
                linear: false,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            });
            let allocation = match allocation {
                Ok(allocation) => allocation,
                Err(_) => {
                    ctx.device.destroy_image(image, None);
                    let size_mb = requirements.size as f64 / (1024.0 * 1024.0);
                    engine_error!("stellar3d::vulkan",
                        "Out of GPU memory for texture '{}' ({}x{}, layers: {}, {:.2} MB)",
                        desc.label, desc.width, desc.height, desc.array_layers, size_mb);
                    return Err(Error::OutOfMemory);
                }
            };

            // From here on Drop releases the image, view and memory
            let mut texture = Self {
                ctx,
                image,
                view: vk::ImageView::null(),
                allocation: Some(allocation),
                info: TextureInfo::from_desc(&desc),
            };

            if let Some(allocation) = &texture.allocation {
                texture.ctx.device.bind_image_memory(image, allocation.memory(), allocation.offset())
                    .map_err(|e| engine_err!("stellar3d::vulkan", "Failed to bind memory of texture '{}': {:?}", desc.label, e))?;
            }

            let view_create_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(view_type)
                .format(format)
                .components(vk::ComponentMapping::default())
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: view_aspect(desc.format),
                    base_mip_level: 0,
                    level_count: desc.mip_levels,
                    base_array_layer: 0,
                    layer_count: desc.array_layers,
                });

            texture.view = texture.ctx.device.create_image_view(&view_create_info, None)
                .map_err(|e| engine_err!("stellar3d::vulkan", "Failed to create view of texture '{}': {:?}", desc.label, e))?;

            match &desc.data {
                Some(data) => texture.upload(data)?,
                // Sampled-only images must be in a readable layout before any descriptor uses them
                None if !desc.usage.is_attachment() && desc.usage.contains(TextureUsage::SAMPLED) => {
                    texture.transition_to_shader_read()?
                }
                None => {}
            }

            Ok(texture)
        }
    }

    fn full_range(&self) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            aspect_mask: barrier_aspect(self.info.format),
            base_mip_level: 0,
            level_count: self.info.mip_levels,
            base_array_layer: 0,
            layer_count: self.info.array_layers,
        }
    }

    /// Copy tightly packed layer data into mip 0 and leave every
    /// subresource in SHADER_READ_ONLY_OPTIMAL
    fn upload(&self, data: &[u8]) -> Result<()> {
        let staging = Buffer::allocate(
            Arc::clone(&self.ctx),
            "texture_staging_buffer",
            data.len() as u64,
            vk::BufferUsageFlags::TRANSFER_SRC,
            MemoryLocation::CpuToGpu,
        )?;
        staging.update(0, data)?;

        let range = self.full_range();
        let device = &self.ctx.device;
        let image = self.image;
        let info = &self.info;

        self.ctx.submit_one_shot(|command_buffer| unsafe {
            let to_transfer = vk::ImageMemoryBarrier::default()
                .old_layout(vk::ImageLayout::UNDEFINED)
                .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(image)
                .subresource_range(range)
                .src_access_mask(vk::AccessFlags::empty())
                .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE);

            device.cmd_pipeline_barrier(
                command_buffer,
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::PipelineStageFlags::TRANSFER,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[to_transfer],
            );

            // Layers are consecutive in the staging buffer
            let region = vk::BufferImageCopy::default()
                .buffer_offset(0)
                .buffer_row_length(0)
                .buffer_image_height(0)
                .image_subresource(vk::ImageSubresourceLayers {
                    aspect_mask: view_aspect(info.format),
                    mip_level: 0,
                    base_array_layer: 0,
                    layer_count: info.array_layers,
                })
                .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
                .image_extent(vk::Extent3D {
                    width: info.width,
                    height: info.height,
                    depth: 1,
                });

            device.cmd_copy_buffer_to_image(
                command_buffer,
                staging.buffer,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );

            let to_shader_read = vk::ImageMemoryBarrier::default()
                .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .new_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(image)
                .subresource_range(range)
                .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                .dst_access_mask(vk::AccessFlags::SHADER_READ);

            device.cmd_pipeline_barrier(
                command_buffer,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[to_shader_read],
            );
        })
    }

    fn transition_to_shader_read(&self) -> Result<()> {
        let range = self.full_range();
        let device = &self.ctx.device;
        let image = self.image;

        self.ctx.submit_one_shot(|command_buffer| unsafe {
            let barrier = vk::ImageMemoryBarrier::default()
                .old_layout(vk::ImageLayout::UNDEFINED)
                .new_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(image)
                .subresource_range(range)
                .src_access_mask(vk::AccessFlags::empty())
                .dst_access_mask(vk::AccessFlags::SHADER_READ);

            device.cmd_pipeline_barrier(
                command_buffer,
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            );
        })
    }
}

impl RendererTexture for Texture {
    fn info(&self) -> &TextureInfo {
        &self.info
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        unsafe {
            if self.view != vk::ImageView::null() {
                self.ctx.device.destroy_image_view(self.view, None);
            }

            if let Some(allocation) = self.allocation.take() {
                if let Ok(mut allocator) = self.ctx.allocator.lock() {
                    allocator.free(allocation).ok();
                }
            }

            self.ctx.device.destroy_image(self.image, None);
        }
    }
}
