/// Buffer - Vulkan implementation of the Buffer trait

use stellar_3d_renderer::stellar3d::{
    Result,
    Error,
    render::{Buffer as RendererBuffer, BufferDesc, BufferUsage},
};
use stellar_3d_renderer::{engine_error, engine_err, engine_bail};
use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;
use std::sync::Arc;

use crate::vulkan_context::GpuContext;

/// Vulkan buffer implementation
pub struct Buffer {
    /// Shared GPU context (device, allocator, queue, command pool)
    ctx: Arc<GpuContext>,
    pub(crate) buffer: vk::Buffer,
    allocation: Option<Allocation>,
    size: u64,
    pub(crate) usage: vk::BufferUsageFlags,
}

impl Buffer {
    /// Create a host-visible, persistently mapped buffer
    pub(crate) fn new(ctx: Arc<GpuContext>, desc: &BufferDesc) -> Result<Self> {
        if desc.size == 0 {
            engine_bail!("stellar3d::vulkan", "Buffer '{}' has zero size", desc.label);
        }
        Self::allocate(ctx, desc.label, desc.size, buffer_usage_to_vk(desc.usage), MemoryLocation::CpuToGpu)
    }

    /// Create a buffer with raw Vulkan usage flags (scratch, acceleration
    /// structure storage, shader binding tables)
    pub(crate) fn allocate(
        ctx: Arc<GpuContext>,
        label: &str,
        size: u64,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
    ) -> Result<Self> {
        unsafe {
            let buffer_create_info = vk::BufferCreateInfo::default()
                .size(size)
                .usage(usage)
                .sharing_mode(vk::SharingMode::EXCLUSIVE);

            let buffer = ctx.device.create_buffer(&buffer_create_info, None)
                .map_err(|e| engine_err!("stellar3d::vulkan", "Failed to create buffer '{}' of size {} bytes: {:?}", label, size, e))?;

            let requirements = ctx.device.get_buffer_memory_requirements(buffer);

            let allocation = ctx.allocator.lock().unwrap().allocate(&AllocationCreateDesc {
                name: label,
                requirements,
                location,
                linear: true,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            });
            let allocation = match allocation {
                Ok(allocation) => allocation,
                Err(_) => {
                    ctx.device.destroy_buffer(buffer, None);
                    let size_mb = requirements.size as f64 / (1024.0 * 1024.0);
                    engine_error!("stellar3d::vulkan", "Out of GPU memory for buffer '{}' (required: {:.2} MB)", label, size_mb);
                    return Err(Error::OutOfMemory);
                }
            };

            // From here on Drop releases the buffer and its memory
            let result = Self {
                ctx,
                buffer,
                allocation: Some(allocation),
                size,
                usage,
            };

            if let Some(allocation) = &result.allocation {
                result.ctx.device.bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
                    .map_err(|e| engine_err!("stellar3d::vulkan", "Failed to bind memory of buffer '{}': {:?}", label, e))?;
            }

            Ok(result)
        }
    }

    /// GPU virtual address (buffer created with SHADER_DEVICE_ADDRESS)
    pub(crate) fn device_address(&self) -> u64 {
        unsafe {
            let info = vk::BufferDeviceAddressInfo::default().buffer(self.buffer);
            self.ctx.device.get_buffer_device_address(&info)
        }
    }
}

impl RendererBuffer for Buffer {
    fn size(&self) -> u64 {
        self.size
    }

    fn update(&self, offset: u64, data: &[u8]) -> Result<()> {
        let end = offset.checked_add(data.len() as u64);
        if end.map_or(true, |end| end > self.size) {
            return Err(Error::InvalidResource(format!(
                "buffer update of {} bytes at offset {} exceeds buffer size {}",
                data.len(),
                offset,
                self.size
            )));
        }

        let allocation = self.allocation.as_ref().ok_or_else(|| {
            engine_err!("stellar3d::vulkan", "Buffer update failed: no GPU allocation")
        })?;

        let mapped_ptr = allocation
            .mapped_ptr()
            .ok_or_else(|| Error::BackendError("Buffer is not CPU-accessible".to_string()))?
            .as_ptr() as *mut u8;

        unsafe {
            std::ptr::copy_nonoverlapping(
                data.as_ptr(),
                mapped_ptr.add(offset as usize),
                data.len(),
            );
        }

        Ok(())
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            if let Some(allocation) = self.allocation.take() {
                // Don't panic if lock fails - we still need to destroy the buffer
                if let Ok(mut allocator) = self.ctx.allocator.lock() {
                    allocator.free(allocation).ok();
                }
            }

            self.ctx.device.destroy_buffer(self.buffer, None);
        }
    }
}

pub(crate) fn buffer_usage_to_vk(usage: BufferUsage) -> vk::BufferUsageFlags {
    let mut flags = vk::BufferUsageFlags::TRANSFER_DST;
    if usage.contains(BufferUsage::UNIFORM) {
        flags |= vk::BufferUsageFlags::UNIFORM_BUFFER;
    }
    if usage.contains(BufferUsage::STORAGE) {
        flags |= vk::BufferUsageFlags::STORAGE_BUFFER;
    }
    if usage.contains(BufferUsage::VERTEX) {
        flags |= vk::BufferUsageFlags::VERTEX_BUFFER;
    }
    if usage.contains(BufferUsage::INDEX) {
        flags |= vk::BufferUsageFlags::INDEX_BUFFER;
    }
    if usage.contains(BufferUsage::TRANSFER_SRC) {
        flags |= vk::BufferUsageFlags::TRANSFER_SRC;
    }
    if usage.contains(BufferUsage::DEVICE_ADDRESS) {
        flags |= vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS
            | vk::BufferUsageFlags::ACCELERATION_STRUCTURE_BUILD_INPUT_READ_ONLY_KHR;
    }
    flags
}
