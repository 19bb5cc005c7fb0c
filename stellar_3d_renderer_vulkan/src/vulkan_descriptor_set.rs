/// DescriptorSet - Vulkan implementation of the DescriptorSet trait

use stellar_3d_renderer::stellar3d::render::DescriptorSet as RendererDescriptorSet;
use stellar_3d_renderer::engine_warn;
use ash::vk;
use std::sync::Arc;

use crate::vulkan_context::GpuContext;

/// Vulkan descriptor set implementation
///
/// Freed back into the pool it was allocated from when dropped, so a pass
/// rebuilding its sets on attachment recreation does not grow the pools.
pub struct DescriptorSet {
    pub(crate) descriptor_set: vk::DescriptorSet,
    pool: vk::DescriptorPool,
    set_index: u32,
    binding_count: u32,
    ctx: Arc<GpuContext>,
}

impl DescriptorSet {
    pub(crate) fn new(
        ctx: Arc<GpuContext>,
        pool: vk::DescriptorPool,
        descriptor_set: vk::DescriptorSet,
        set_index: u32,
        binding_count: u32,
    ) -> Self {
        Self {
            descriptor_set,
            pool,
            set_index,
            binding_count,
            ctx,
        }
    }
}

impl RendererDescriptorSet for DescriptorSet {
    fn set_index(&self) -> u32 {
        self.set_index
    }

    fn binding_count(&self) -> u32 {
        self.binding_count
    }
}

impl Drop for DescriptorSet {
    fn drop(&mut self) {
        // The pool is externally synchronized with allocation
        let pools = self.ctx.descriptor_pools.lock().unwrap();
        if !pools.contains(&self.pool) {
            return;
        }
        unsafe {
            if let Err(e) = self.ctx.device.free_descriptor_sets(self.pool, &[self.descriptor_set]) {
                engine_warn!("stellar3d::vulkan", "Failed to free descriptor set: {:?}", e);
            }
        }
    }
}

#[cfg(test)]
#[path = "vulkan_descriptor_set_tests.rs"]
mod tests;
