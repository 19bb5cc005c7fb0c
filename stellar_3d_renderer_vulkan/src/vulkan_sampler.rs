/// SamplerCache - shared VkSampler objects of the Vulkan backend
///
/// Samplers are created on first use, one per `SamplerType`.

use stellar_3d_renderer::stellar3d::Result;
use stellar_3d_renderer::stellar3d::render::SamplerType;
use stellar_3d_renderer::engine_err;
use ash::vk;
use rustc_hash::FxHashMap;
use std::sync::Arc;

use crate::vulkan_context::GpuContext;

/// Creates VkSamplers on first use, destroys them on shutdown/drop
pub(crate) struct SamplerCache {
    ctx: Option<Arc<GpuContext>>,
    cache: FxHashMap<SamplerType, vk::Sampler>,
}

/// Filter, mipmap mode, address mode, border color and depth compare of one sampler type
struct SamplerParams {
    filter: vk::Filter,
    mipmap: vk::SamplerMipmapMode,
    address: vk::SamplerAddressMode,
    border: vk::BorderColor,
    compare: bool,
}

fn sampler_params(sampler_type: SamplerType) -> SamplerParams {
    match sampler_type {
        SamplerType::LinearClamp => SamplerParams {
            filter: vk::Filter::LINEAR,
            mipmap: vk::SamplerMipmapMode::LINEAR,
            address: vk::SamplerAddressMode::CLAMP_TO_EDGE,
            border: vk::BorderColor::FLOAT_OPAQUE_BLACK,
            compare: false,
        },
        SamplerType::NearestClamp => SamplerParams {
            filter: vk::Filter::NEAREST,
            mipmap: vk::SamplerMipmapMode::NEAREST,
            address: vk::SamplerAddressMode::CLAMP_TO_EDGE,
            border: vk::BorderColor::FLOAT_OPAQUE_BLACK,
            compare: false,
        },
        SamplerType::LinearRepeat => SamplerParams {
            filter: vk::Filter::LINEAR,
            mipmap: vk::SamplerMipmapMode::LINEAR,
            address: vk::SamplerAddressMode::REPEAT,
            border: vk::BorderColor::FLOAT_OPAQUE_BLACK,
            compare: false,
        },
        // Outside the shadow map counts as lit
        SamplerType::ShadowCompare => SamplerParams {
            filter: vk::Filter::LINEAR,
            mipmap: vk::SamplerMipmapMode::NEAREST,
            address: vk::SamplerAddressMode::CLAMP_TO_BORDER,
            border: vk::BorderColor::FLOAT_OPAQUE_WHITE,
            compare: true,
        },
    }
}

impl SamplerCache {
    pub(crate) fn new(ctx: Arc<GpuContext>) -> Self {
        Self {
            ctx: Some(ctx),
            cache: FxHashMap::default(),
        }
    }

    /// Get or create the VkSampler of `sampler_type`
    pub(crate) fn get(&mut self, sampler_type: SamplerType) -> Result<vk::Sampler> {
        if let Some(&sampler) = self.cache.get(&sampler_type) {
            return Ok(sampler);
        }

        let ctx = self.ctx.as_ref().ok_or_else(|| {
            engine_err!("stellar3d::vulkan", "Sampler {:?} requested after device shutdown", sampler_type)
        })?;
        let sampler = Self::create_vk_sampler(ctx, sampler_type)?;
        self.cache.insert(sampler_type, sampler);
        Ok(sampler)
    }

    /// Destroy all cached VkSamplers and release the GpuContext reference.
    /// Called from VulkanGraphicsDevice::drop() while the device is still alive.
    pub(crate) fn shutdown(&mut self) {
        if let Some(ctx) = &self.ctx {
            for (_, sampler) in self.cache.drain() {
                unsafe { ctx.device.destroy_sampler(sampler, None); }
            }
        }
        self.ctx = None;
    }

    fn create_vk_sampler(ctx: &GpuContext, sampler_type: SamplerType) -> Result<vk::Sampler> {
        let params = sampler_params(sampler_type);

        let create_info = vk::SamplerCreateInfo::default()
            .mag_filter(params.filter)
            .min_filter(params.filter)
            .mipmap_mode(params.mipmap)
            .address_mode_u(params.address)
            .address_mode_v(params.address)
            .address_mode_w(params.address)
            .mip_lod_bias(0.0)
            .min_lod(0.0)
            .max_lod(vk::LOD_CLAMP_NONE)
            .border_color(params.border)
            .compare_enable(params.compare)
            .compare_op(if params.compare { vk::CompareOp::LESS_OR_EQUAL } else { vk::CompareOp::ALWAYS })
            .anisotropy_enable(false)
            .max_anisotropy(1.0)
            .unnormalized_coordinates(false);

        unsafe {
            ctx.device.create_sampler(&create_info, None)
                .map_err(|e| engine_err!("stellar3d::vulkan", "Failed to create {:?} sampler: {:?}", sampler_type, e))
        }
    }
}

impl Drop for SamplerCache {
    fn drop(&mut self) {
        // Empty after shutdown()
        if let Some(ctx) = &self.ctx {
            for (_, sampler) in self.cache.drain() {
                unsafe { ctx.device.destroy_sampler(sampler, None); }
            }
        }
    }
}

#[cfg(test)]
#[path = "vulkan_sampler_tests.rs"]
mod tests;
