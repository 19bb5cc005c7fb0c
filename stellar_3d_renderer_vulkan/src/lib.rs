/*!
# Stellar 3D Renderer - Vulkan Backend

Vulkan implementation of the Stellar 3D device traits.

This crate implements the `stellar_3d_renderer` device abstraction using the
Ash library for Vulkan bindings and gpu-allocator for memory management.
Ray tracing pipelines are enabled when the physical device exposes
`VK_KHR_ray_tracing_pipeline` and `VK_KHR_acceleration_structure`.

```no_run
use stellar_3d_renderer::stellar3d::render::Config;
use stellar_3d_renderer_vulkan::stellar3d::VulkanGraphicsDevice;
# fn run(window: &winit::window::Window) -> stellar_3d_renderer::stellar3d::Result<()> {
let device = VulkanGraphicsDevice::new(window, &Config::default())?;
# Ok(())
# }
```
*/

mod vulkan;
mod vulkan_context;
mod vulkan_format;
mod vulkan_texture;
mod vulkan_buffer;
mod vulkan_shader;
mod vulkan_pipeline;
mod vulkan_render_pass;
mod vulkan_render_target;
mod vulkan_frame_buffer;
mod vulkan_descriptor_set;
mod vulkan_command_list;
mod vulkan_sync;
mod vulkan_swapchain;
mod vulkan_sampler;
mod vulkan_ray_tracing;
mod debug;

pub mod stellar3d {
    pub use crate::vulkan::VulkanGraphicsDevice;
    pub use crate::vulkan_ray_tracing::{
        AccelerationStructure as VulkanAccelerationStructure, AccelerationStructureInstance, TriangleGeometry,
    };
    pub use crate::debug::{get_validation_stats, print_validation_stats_report};
}
