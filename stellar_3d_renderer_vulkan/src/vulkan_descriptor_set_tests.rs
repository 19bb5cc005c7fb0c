//! Descriptor set lifetime tests
//!
//! Require a GPU and a display, marked with #[ignore].

use ash::vk;
use serial_test::serial;
use std::sync::Arc;
use stellar_3d_renderer::stellar3d::render::Config;
use winit::event_loop::EventLoopBuilder;
use winit::window::Window;

use crate::vulkan::VulkanGraphicsDevice;
use crate::vulkan_descriptor_set::DescriptorSet;

#[cfg(target_os = "windows")]
use winit::platform::windows::EventLoopBuilderExtWindows;

#[allow(deprecated)]
fn create_test_device() -> VulkanGraphicsDevice {
    let event_loop = {
        #[cfg(target_os = "windows")]
        {
            EventLoopBuilder::new().with_any_thread(true).build().unwrap()
        }
        #[cfg(not(target_os = "windows"))]
        {
            EventLoopBuilder::new().build().unwrap()
        }
    };
    let window = event_loop
        .create_window(Window::default_attributes().with_visible(false))
        .unwrap();
    let device = VulkanGraphicsDevice::new(&window, &Config::default()).unwrap();

    // The surface must outlive the device
    std::mem::forget(window);
    std::mem::forget(event_loop);
    device
}

fn uniform_layout(device: &ash::Device) -> vk::DescriptorSetLayout {
    let bindings = [vk::DescriptorSetLayoutBinding::default()
        .binding(0)
        .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
        .descriptor_count(1)
        .stage_flags(vk::ShaderStageFlags::FRAGMENT)];
    let info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
    unsafe { device.create_descriptor_set_layout(&info, None).unwrap() }
}

// ============================================================================
// FREE ON DROP
// ============================================================================

// One device per process: winit refuses a second event loop
#[test]
#[ignore] // Requires GPU and display
#[serial]
fn test_dropped_sets_return_to_pool() {
    let device = create_test_device();
    let ctx = Arc::clone(device.gpu_context());
    let layout = uniform_layout(&ctx.device);

    // More rebuilds than one pool holds sets
    for _ in 0..1500 {
        let (pool, raw) = device.allocate_descriptor_set(layout).unwrap();
        drop(DescriptorSet::new(Arc::clone(&ctx), pool, raw, 0, 1));
    }
    assert_eq!(device.descriptor_pool_count(), 1);

    // Live sets past capacity do grow the pools
    let live: Vec<DescriptorSet> = (0..1100)
        .map(|_| {
            let (pool, raw) = device.allocate_descriptor_set(layout).unwrap();
            DescriptorSet::new(Arc::clone(&ctx), pool, raw, 0, 1)
        })
        .collect();
    assert_eq!(device.descriptor_pool_count(), 2);

    // Freed slots in either pool are reused
    drop(live);
    let (pool, raw) = device.allocate_descriptor_set(layout).unwrap();
    drop(DescriptorSet::new(Arc::clone(&ctx), pool, raw, 0, 1));
    assert_eq!(device.descriptor_pool_count(), 2);

    unsafe { ctx.device.destroy_descriptor_set_layout(layout, None) };
    drop(ctx);
}
