//! Integration tests for FrameSynchronizer with VulkanGraphicsDevice
//!
//! Each frame clears the acquired swapchain image in a one-subpass render
//! pass. Tests requiring GPU are marked with #[ignore].
//!
//! Run with: cargo test --test frame_synchronizer_integration_tests -- --ignored

mod gpu_test_utils;

use std::sync::Arc;

use stellar_3d_renderer::stellar3d::Result;
use stellar_3d_renderer::stellar3d::frame::{FrameStatus, FrameSynchronizer, PresentStatus};
use stellar_3d_renderer::stellar3d::graph::SwapchainListener;
use stellar_3d_renderer::stellar3d::render::{
    AttachmentDesc, ClearValue, Framebuffer, FramebufferDesc, GraphicsDevice, ImageLayout, LoadOp,
    RenderPass, RenderPassDesc, StoreOp, Swapchain, MAX_FRAMES_IN_FLIGHT,
};
use gpu_test_utils::{get_test_graphics_device, get_test_window, test_config};
use serial_test::serial;

/// Clear pass over every swapchain image, rebuilt on recreation
struct ClearPass {
    render_pass: Arc<dyn RenderPass>,
    framebuffers: Vec<Arc<dyn Framebuffer>>,
    recreations: u32,
}

impl ClearPass {
    fn new(device: &dyn GraphicsDevice, swapchain: &dyn Swapchain) -> Result<Self> {
        let render_pass = device.create_render_pass(&RenderPassDesc::single_subpass(
            vec![AttachmentDesc::color(swapchain.format(), LoadOp::Clear, StoreOp::Store, ImageLayout::PresentSrc)],
            None,
        ))?;
        let mut pass = Self { render_pass, framebuffers: Vec::new(), recreations: 0 };
        pass.build_framebuffers(device, swapchain)?;
        Ok(pass)
    }

    fn build_framebuffers(&mut self, device: &dyn GraphicsDevice, swapchain: &dyn Swapchain) -> Result<()> {
        self.framebuffers = (0..swapchain.image_count())
            .map(|index| {
                device.create_framebuffer(&FramebufferDesc {
                    render_pass: &self.render_pass,
                    attachments: vec![swapchain.image_target(index)?],
                    width: swapchain.width(),
                    height: swapchain.height(),
                    layers: 1,
                })
            })
            .collect::<Result<_>>()?;
        Ok(())
    }
}

impl SwapchainListener for ClearPass {
    fn on_swapchain_recreated(&mut self, device: &dyn GraphicsDevice, swapchain: &dyn Swapchain) -> Result<()> {
        self.recreations += 1;
        self.build_framebuffers(device, swapchain)
    }
}

/// Run one tick; returns the frame slot when a frame was presented
fn render_frame(
    synchronizer: &mut FrameSynchronizer,
    device: &dyn GraphicsDevice,
    pass: &mut ClearPass,
) -> Option<usize> {
    let window = get_test_window();
    let target = match synchronizer.prepare_before_pass(device, window, pass).unwrap() {
        FrameStatus::Ready(target) => target,
        FrameStatus::Skipped(_) => return None,
    };

    let framebuffer = Arc::clone(&pass.framebuffers[target.image_index as usize]);
    let cmd = synchronizer.command_list().unwrap();
    cmd.begin_render_pass(&pass.render_pass, &framebuffer, &[ClearValue::Color([0.1, 0.1, 0.2, 1.0])])
        .unwrap();
    cmd.end_render_pass().unwrap();

    let status = synchronizer.submit_command_buffers(device, window, pass).unwrap();
    assert_ne!(status, PresentStatus::RecreatePending);
    Some(target.frame_slot)
}

// ============================================================================
// FRAME LOOP TESTS
// ============================================================================

#[test]
#[ignore] // Requires GPU and display
#[serial]
fn test_integration_frames_rotate_through_slots() {
    let device = get_test_graphics_device();
    let mut synchronizer = FrameSynchronizer::new(device, get_test_window(), &test_config()).unwrap();
    let mut pass = ClearPass::new(device, synchronizer.swapchain()).unwrap();

    let slots: Vec<usize> = (0..6)
        .filter_map(|_| render_frame(&mut synchronizer, device, &mut pass))
        .collect();

    for pair in slots.windows(2) {
        // A skipped tick does not advance the slot, a presented one does
        assert!(pair[1] == (pair[0] + 1) % MAX_FRAMES_IN_FLIGHT || pass.recreations > 0);
    }
    assert!(synchronizer.stats().frames_presented >= 1);
    assert!(synchronizer.acquired().is_none());

    synchronizer.wait_all().unwrap();
}

#[test]
#[ignore] // Requires GPU and display
#[serial]
fn test_integration_images_in_flight_track_owner_slot() {
    let device = get_test_graphics_device();
    let mut synchronizer = FrameSynchronizer::new(device, get_test_window(), &test_config()).unwrap();
    let mut pass = ClearPass::new(device, synchronizer.swapchain()).unwrap();

    for _ in 0..4 {
        render_frame(&mut synchronizer, device, &mut pass);
    }

    assert_eq!(synchronizer.images_in_flight().len(), synchronizer.swapchain().image_count());
    assert!(synchronizer
        .images_in_flight()
        .iter()
        .flatten()
        .all(|&slot| slot < MAX_FRAMES_IN_FLIGHT));

    synchronizer.wait_all().unwrap();
}

// ============================================================================
// RESIZE TESTS
// ============================================================================

#[test]
#[ignore] // Requires GPU and display
#[serial]
fn test_integration_notify_resized_recreates_swapchain() {
    let device = get_test_graphics_device();
    let mut synchronizer = FrameSynchronizer::new(device, get_test_window(), &test_config()).unwrap();
    let mut pass = ClearPass::new(device, synchronizer.swapchain()).unwrap();

    render_frame(&mut synchronizer, device, &mut pass);
    let recreations_before = synchronizer.stats().swapchain_recreations;

    synchronizer.notify_resized();
    assert!(synchronizer.is_resize_pending());
    render_frame(&mut synchronizer, device, &mut pass);

    assert!(!synchronizer.is_resize_pending());
    assert!(synchronizer.stats().swapchain_recreations > recreations_before);
    assert!(pass.recreations >= 1);
    assert_eq!(pass.framebuffers.len(), synchronizer.swapchain().image_count());

    synchronizer.wait_all().unwrap();
}

#[test]
#[ignore] // Requires GPU and display
#[serial]
fn test_integration_explicit_recreate_notifies_listener() {
    let device = get_test_graphics_device();
    let window = get_test_window();
    let mut synchronizer = FrameSynchronizer::new(device, window, &test_config()).unwrap();
    let mut pass = ClearPass::new(device, synchronizer.swapchain()).unwrap();

    assert!(synchronizer.recreate_swapchain(device, window, &mut pass).unwrap());
    assert_eq!(pass.recreations, 1);
    assert_eq!(synchronizer.extent().width, synchronizer.swapchain().width());

    render_frame(&mut synchronizer, device, &mut pass);
    synchronizer.wait_all().unwrap();
}
