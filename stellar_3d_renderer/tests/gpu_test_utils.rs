#![allow(dead_code)]
//! GPU test utilities - shared VulkanGraphicsDevice for the core integration tests
//!
//! `ash-window::create_surface()` refuses a second surface for the same
//! window on some platforms, so every test in a binary shares one device
//! (and one hidden window), like an application would.

use stellar_3d_renderer::stellar3d::render::Config;
use stellar_3d_renderer_vulkan::stellar3d::VulkanGraphicsDevice;
use std::sync::OnceLock;
use winit::event_loop::{EventLoop, EventLoopBuilder};
use winit::window::Window;

#[cfg(target_os = "windows")]
use winit::platform::windows::EventLoopBuilderExtWindows;

/// Global VulkanGraphicsDevice instance (initialized once)
static GPU_GRAPHICS_DEVICE: OnceLock<VulkanGraphicsDevice> = OnceLock::new();

/// Window backing the shared device's surface
static GPU_WINDOW: OnceLock<Window> = OnceLock::new();

/// Get the shared VulkanGraphicsDevice for GPU tests
///
/// The EventLoop is leaked with `mem::forget`: it cannot live in a static
/// and the window must outlive every test.
pub fn get_test_graphics_device() -> &'static VulkanGraphicsDevice {
    GPU_GRAPHICS_DEVICE.get_or_init(|| {
        let (window, event_loop) = create_test_window();

        let graphics_device = VulkanGraphicsDevice::new(&window, &test_config())
            .expect("Failed to create VulkanGraphicsDevice for tests");

        std::mem::forget(event_loop);
        GPU_WINDOW.set(window).ok();

        graphics_device
    })
}

/// Window of the shared device
pub fn get_test_window() -> &'static Window {
    get_test_graphics_device();
    GPU_WINDOW.get().expect("test window initialized with the device")
}

pub fn test_config() -> Config {
    Config {
        app_name: "Stellar3D GPU Tests".to_string(),
        ..Config::default()
    }
}

/// Create a hidden 800x600 test window
#[allow(deprecated)]
pub fn create_test_window() -> (Window, EventLoop<()>) {
    // cargo test runs tests off the main thread
    let event_loop = {
        #[cfg(target_os = "windows")]
        {
            EventLoopBuilder::new()
                .with_any_thread(true)
                .build()
                .unwrap()
        }
        #[cfg(not(target_os = "windows"))]
        {
            EventLoopBuilder::new().build().unwrap()
        }
    };

    let window_attrs = Window::default_attributes()
        .with_title("Stellar3D GPU Test Window")
        .with_inner_size(winit::dpi::PhysicalSize::new(800, 600))
        .with_visible(false);

    let window = event_loop.create_window(window_attrs).unwrap();
    (window, event_loop)
}
