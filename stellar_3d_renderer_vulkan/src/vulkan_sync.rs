/// Fence and Semaphore - Vulkan implementations of the sync traits

use stellar_3d_renderer::stellar3d::{Result, Error};
use stellar_3d_renderer::stellar3d::render::{Fence as RendererFence, Semaphore as RendererSemaphore};
use stellar_3d_renderer::{engine_err, engine_error};
use ash::vk;
use std::sync::Arc;

use crate::vulkan_context::GpuContext;

/// Vulkan fence implementation
pub struct Fence {
    ctx: Arc<GpuContext>,
    pub(crate) fence: vk::Fence,
}

impl Fence {
    pub(crate) fn new(ctx: Arc<GpuContext>, signaled: bool) -> Result<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let create_info = vk::FenceCreateInfo::default().flags(flags);

        let fence = unsafe {
            ctx.device.create_fence(&create_info, None)
                .map_err(|e| engine_err!("stellar3d::vulkan", "Failed to create fence: {:?}", e))?
        };

        Ok(Self { ctx, fence })
    }
}

impl RendererFence for Fence {
    fn wait(&self, timeout_ns: u64) -> Result<()> {
        let result = unsafe { self.ctx.device.wait_for_fences(&[self.fence], true, timeout_ns) };
        match result {
            Ok(()) => Ok(()),
            Err(vk::Result::TIMEOUT) => Err(Error::Timeout(format!("fence not signaled after {} ns", timeout_ns))),
            Err(vk::Result::ERROR_DEVICE_LOST) => {
                engine_error!("stellar3d::vulkan", "Device lost while waiting on a fence");
                Err(Error::DeviceLost("device lost while waiting on a fence".to_string()))
            }
            Err(e) => Err(engine_err!("stellar3d::vulkan", "Failed to wait for fence: {:?}", e)),
        }
    }

    fn reset(&self) -> Result<()> {
        unsafe {
            self.ctx.device.reset_fences(&[self.fence])
                .map_err(|e| engine_err!("stellar3d::vulkan", "Failed to reset fence: {:?}", e))
        }
    }

    fn is_signaled(&self) -> Result<bool> {
        unsafe {
            match self.ctx.device.get_fence_status(self.fence) {
                Ok(signaled) => Ok(signaled),
                Err(vk::Result::ERROR_DEVICE_LOST) => {
                    Err(Error::DeviceLost("device lost while polling a fence".to_string()))
                }
                Err(e) => Err(engine_err!("stellar3d::vulkan", "Failed to query fence status: {:?}", e)),
            }
        }
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.destroy_fence(self.fence, None);
        }
    }
}

/// Vulkan binary semaphore implementation
pub struct Semaphore {
    ctx: Arc<GpuContext>,
    pub(crate) semaphore: vk::Semaphore,
}

impl Semaphore {
    pub(crate) fn new(ctx: Arc<GpuContext>) -> Result<Self> {
        let semaphore = unsafe {
            ctx.device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None)
                .map_err(|e| engine_err!("stellar3d::vulkan", "Failed to create semaphore: {:?}", e))?
        };

        Ok(Self { ctx, semaphore })
    }
}

/// Downcast an engine semaphore to its Vulkan handle
pub(crate) fn vk_semaphore(semaphore: &dyn RendererSemaphore) -> vk::Semaphore {
    unsafe { (*(semaphore as *const dyn RendererSemaphore as *const Semaphore)).semaphore }
}

/// Downcast an engine fence to its Vulkan handle
pub(crate) fn vk_fence(fence: &dyn RendererFence) -> vk::Fence {
    unsafe { (*(fence as *const dyn RendererFence as *const Fence)).fence }
}

impl RendererSemaphore for Semaphore {}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.destroy_semaphore(self.semaphore, None);
        }
    }
}
