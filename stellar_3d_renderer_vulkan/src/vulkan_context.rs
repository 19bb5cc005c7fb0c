/// GpuContext - Shared GPU state for all Vulkan objects
///
/// Every resource (textures, buffers, pipelines, command lists, fences)
/// keeps an `Arc<GpuContext>` so it can destroy itself on drop without
/// borrowing the device.

use ash::vk;
use gpu_allocator::vulkan::Allocator;
use std::mem::ManuallyDrop;
use std::sync::Mutex;
use stellar_3d_renderer::stellar3d::Result;
use stellar_3d_renderer::engine_err;

/// Extension loaders present only when ray tracing was enabled
pub(crate) struct RayTracingLoaders {
    pub pipeline: ash::khr::ray_tracing_pipeline::Device,
    pub acceleration_structure: ash::khr::acceleration_structure::Device,
    pub properties: RayTracingProperties,
}

/// Shader binding table limits of the physical device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RayTracingProperties {
    pub handle_size: u32,
    pub handle_alignment: u32,
    pub base_alignment: u32,
    pub max_recursion_depth: u32,
    /// Alignment of acceleration structure build scratch addresses
    pub scratch_alignment: u32,
}

/// Shared GPU context
///
/// Device and instance destruction is handled by `VulkanGraphicsDevice::drop()`,
/// which runs after every resource holding this context is gone.
pub struct GpuContext {
    pub device: ash::Device,

    /// Wrapped in ManuallyDrop so the device can free its pages before
    /// `vkDestroyDevice`
    pub allocator: ManuallyDrop<Mutex<Allocator>>,

    pub graphics_queue: vk::Queue,
    pub graphics_queue_family: u32,

    /// Pool for one-shot uploads and acceleration structure builds
    /// (TRANSIENT + RESET_COMMAND_BUFFER)
    pub upload_command_pool: Mutex<vk::CommandPool>,

    /// Descriptor pools (FREE_DESCRIPTOR_SET), grown when all are full
    ///
    /// Sets return their slot to the pool they came from on drop.
    pub descriptor_pools: Mutex<Vec<vk::DescriptorPool>>,

    pub(crate) ray_tracing: Option<RayTracingLoaders>,
}

impl GpuContext {
    pub(crate) fn new(
        device: ash::Device,
        allocator: Allocator,
        graphics_queue: vk::Queue,
        graphics_queue_family: u32,
        upload_command_pool: vk::CommandPool,
        descriptor_pool: vk::DescriptorPool,
        ray_tracing: Option<RayTracingLoaders>,
    ) -> Self {
        Self {
            device,
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            graphics_queue,
            graphics_queue_family,
            upload_command_pool: Mutex::new(upload_command_pool),
            descriptor_pools: Mutex::new(vec![descriptor_pool]),
            ray_tracing,
        }
    }

    /// Record commands into a transient command buffer, submit them and
    /// block until the GPU has executed them
    ///
    /// Used for texture uploads and acceleration structure builds, never
    /// on the per-frame path.
    pub(crate) fn submit_one_shot<F>(&self, record: F) -> Result<()>
    where
        F: FnOnce(vk::CommandBuffer),
    {
        let pool = self.upload_command_pool.lock().unwrap();

        unsafe {
            let allocate_info = vk::CommandBufferAllocateInfo::default()
                .command_pool(*pool)
                .level(vk::CommandBufferLevel::PRIMARY)
                .command_buffer_count(1);

            let command_buffers = self.device.allocate_command_buffers(&allocate_info)
                .map_err(|e| engine_err!("stellar3d::vulkan", "Failed to allocate upload command buffer: {:?}", e))?;
            let command_buffer = command_buffers[0];

            let result = self.record_and_wait(command_buffer, record);

            self.device.free_command_buffers(*pool, &command_buffers);
            result
        }
    }

    unsafe fn record_and_wait<F>(&self, command_buffer: vk::CommandBuffer, record: F) -> Result<()>
    where
        F: FnOnce(vk::CommandBuffer),
    {
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        self.device.begin_command_buffer(command_buffer, &begin_info)
            .map_err(|e| engine_err!("stellar3d::vulkan", "Failed to begin upload command buffer: {:?}", e))?;

        record(command_buffer);

        self.device.end_command_buffer(command_buffer)
            .map_err(|e| engine_err!("stellar3d::vulkan", "Failed to end upload command buffer: {:?}", e))?;

        let fence = self.device.create_fence(&vk::FenceCreateInfo::default(), None)
            .map_err(|e| engine_err!("stellar3d::vulkan", "Failed to create upload fence: {:?}", e))?;

        let submit_info = vk::SubmitInfo::default()
            .command_buffers(std::slice::from_ref(&command_buffer));

        let result = self.device
            .queue_submit(self.graphics_queue, &[submit_info], fence)
            .and_then(|_| self.device.wait_for_fences(&[fence], true, u64::MAX))
            .map_err(|e| engine_err!("stellar3d::vulkan", "One-shot upload failed: {:?}", e));

        self.device.destroy_fence(fence, None);
        result
    }
}
