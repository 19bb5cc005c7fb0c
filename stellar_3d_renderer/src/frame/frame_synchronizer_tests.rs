//! Unit tests for frame_synchronizer.rs

use crate::config::Config;
use crate::device::mock_graphics_device::{MockGraphicsDevice, ScriptedAcquire};
use crate::device::{Extent2D, GraphicsDevice, PresentOutcome, Swapchain};
use crate::error::{Error, Result};
use crate::frame::{FrameStatus, FrameSynchronizer, FrameTarget, PresentStatus, SkipReason};
use crate::pass::mock_scene::MockSurface;
use crate::render_graph::SwapchainListener;

// ============================================================================
// TEST HELPERS
// ============================================================================

#[derive(Default)]
struct RecordingListener {
    extents: Vec<(u32, u32)>,
    fail: bool,
}

impl SwapchainListener for RecordingListener {
    fn on_swapchain_recreated(&mut self, _device: &dyn GraphicsDevice, swapchain: &dyn Swapchain) -> Result<()> {
        if self.fail {
            return Err(Error::InitializationFailed("listener rejected the new swapchain".to_string()));
        }
        self.extents.push((swapchain.width(), swapchain.height()));
        Ok(())
    }
}

fn setup() -> (MockGraphicsDevice, MockSurface, FrameSynchronizer) {
    let device = MockGraphicsDevice::new();
    let surface = MockSurface::new(800, 600);
    let sync = FrameSynchronizer::new(&device, &surface, &Config::default()).unwrap();
    (device, surface, sync)
}

fn run_frame(
    sync: &mut FrameSynchronizer,
    device: &MockGraphicsDevice,
    surface: &MockSurface,
    listener: &mut RecordingListener,
) -> (FrameTarget, PresentStatus) {
    let target = match sync.prepare_before_pass(device, surface, listener).unwrap() {
        FrameStatus::Ready(target) => target,
        FrameStatus::Skipped(reason) => panic!("frame skipped: {:?}", reason),
    };
    let status = sync.submit_command_buffers(device, surface, listener).unwrap();
    (target, status)
}

// ============================================================================
// CREATION TESTS
// ============================================================================

#[test]
fn test_new_creates_swapchain_at_surface_extent() {
    let (_device, _surface, sync) = setup();
    assert_eq!(sync.extent(), Extent2D::new(800, 600));
    assert_eq!(sync.images_in_flight(), &[None::<usize>; 3]);
    assert_eq!(sync.current_frame(), 0);
}

#[test]
fn test_new_rejects_minimized_surface() {
    let device = MockGraphicsDevice::new();
    let surface = MockSurface::new(0, 600);
    let result = FrameSynchronizer::new(&device, &surface, &Config::default());
    assert!(matches!(result, Err(Error::InitializationFailed(_))));
}

// ============================================================================
// FRAME PACING TESTS
// ============================================================================

#[test]
fn test_frames_rotate_through_slots() {
    let (device, surface, mut sync) = setup();
    let tracker = device.tracker();
    let mut listener = RecordingListener::default();

    let mut slots = Vec::new();
    for _ in 0..4 {
        let (target, status) = run_frame(&mut sync, &device, &surface, &mut listener);
        assert_eq!(status, PresentStatus::Presented);
        slots.push(target.frame_slot);
    }

    assert_eq!(slots, [0, 1, 0, 1]);
    assert_eq!(sync.stats().frames_presented, 4);
    assert_eq!(tracker.submission_count(), 4);
    // A slot never has two submissions outstanding
    for fence in tracker.fence_states() {
        assert!(fence.max_submits_since_wait <= 1, "{:?}", fence);
        assert_eq!(fence.total_submits, 2);
    }
    assert!(listener.extents.is_empty());
}

#[test]
fn test_ten_frames_over_three_images_and_two_slots() {
    let (device, surface, mut sync) = setup();
    let tracker = device.tracker();
    let mut listener = RecordingListener::default();

    let mut slots = Vec::new();
    let mut images = Vec::new();
    for _ in 0..10 {
        assert_eq!(sync.current_frame(), slots.len() % 2);
        let (target, status) = run_frame(&mut sync, &device, &surface, &mut listener);
        assert_eq!(status, PresentStatus::Presented);
        slots.push(target.frame_slot);
        images.push(target.image_index);
    }

    assert_eq!(slots, [0, 1, 0, 1, 0, 1, 0, 1, 0, 1]);
    assert_eq!(images, [0, 1, 2, 0, 1, 2, 0, 1, 2, 0]);
    assert_eq!(tracker.submission_count(), 10);
    assert_eq!(sync.stats().frames_presented, 10);
    assert_eq!(sync.stats().frames_skipped, 0);
    for fence in tracker.fence_states() {
        assert!(fence.max_submits_since_wait <= 1, "{:?}", fence);
        assert_eq!(fence.total_submits, 5);
    }
    sync.wait_all().unwrap();
}

#[test]
fn test_image_rendered_by_other_slot_is_waited_for() {
    let (device, surface, mut sync) = setup();
    let tracker = device.tracker();
    let mut listener = RecordingListener::default();

    // 3 images, 2 slots: frame 3 gets image 0 back, last used by slot 0
    for _ in 0..3 {
        run_frame(&mut sync, &device, &surface, &mut listener);
    }
    let waits_before = tracker.fence_states()[0].waits;
    let (target, _) = run_frame(&mut sync, &device, &surface, &mut listener);

    assert_eq!(target, FrameTarget { image_index: 0, frame_slot: 1 });
    assert_eq!(tracker.fence_states()[0].waits, waits_before + 1);
    assert_eq!(sync.images_in_flight(), &[Some(1usize), Some(1), Some(0)]);
}

#[test]
fn test_prepare_twice_is_invalid_state() {
    let (device, surface, mut sync) = setup();
    let mut listener = RecordingListener::default();

    sync.prepare_before_pass(&device, &surface, &mut listener).unwrap();
    let result = sync.prepare_before_pass(&device, &surface, &mut listener);
    assert!(matches!(result, Err(Error::InvalidState(_))));
}

#[test]
fn test_submit_without_prepare_is_invalid_state() {
    let (device, surface, mut sync) = setup();
    let mut listener = RecordingListener::default();
    let result = sync.submit_command_buffers(&device, &surface, &mut listener);
    assert!(matches!(result, Err(Error::InvalidState(_))));
}

#[test]
fn test_command_list_available_only_while_recording() {
    let (device, surface, mut sync) = setup();
    let mut listener = RecordingListener::default();
    assert!(sync.command_list().is_err());

    sync.prepare_before_pass(&device, &surface, &mut listener).unwrap();
    assert!(sync.command_list().unwrap().is_recording());

    sync.submit_command_buffers(&device, &surface, &mut listener).unwrap();
    assert!(sync.command_list().is_err());
}

// ============================================================================
// STALE SWAPCHAIN TESTS
// ============================================================================

#[test]
fn test_out_of_date_acquire_recreates_and_skips() {
    let (device, surface, mut sync) = setup();
    let tracker = device.tracker();
    let mut listener = RecordingListener::default();
    run_frame(&mut sync, &device, &surface, &mut listener);

    surface.resize(1024, 768);
    tracker.script_acquire(ScriptedAcquire::OutOfDate);
    let status = sync.prepare_before_pass(&device, &surface, &mut listener).unwrap();

    assert_eq!(status, FrameStatus::Skipped(SkipReason::SwapchainOutOfDate));
    assert_eq!(tracker.recreate_count(), 1);
    assert_eq!(listener.extents, [(1024, 768)]);
    assert_eq!(sync.extent(), Extent2D::new(1024, 768));
    assert_eq!(sync.images_in_flight(), &[None::<usize>; 3]);
    assert_eq!(sync.stats().frames_skipped, 1);

    // The skipped tick kept its slot; the next one records normally
    let (target, status) = run_frame(&mut sync, &device, &surface, &mut listener);
    assert_eq!(target, FrameTarget { image_index: 0, frame_slot: 1 });
    assert_eq!(status, PresentStatus::Presented);
}

#[test]
fn test_suboptimal_acquire_releases_image_with_empty_submission() {
    let (device, surface, mut sync) = setup();
    let tracker = device.tracker();
    let mut listener = RecordingListener::default();

    tracker.script_acquire(ScriptedAcquire::Suboptimal);
    let status = sync.prepare_before_pass(&device, &surface, &mut listener).unwrap();

    assert_eq!(status, FrameStatus::Skipped(SkipReason::SwapchainSuboptimal));
    let submissions = tracker.submissions.lock().unwrap().clone();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].command_list_count, 0);
    assert_eq!(submissions[0].wait_count, 1);
    assert!(submissions[0].fence_id.is_some());
    assert_eq!(sync.stats().null_submissions, 1);
    assert_eq!(tracker.recreate_count(), 1);
    assert_eq!(listener.extents.len(), 1);
    assert_eq!(sync.current_frame(), 1);

    // Both slots are reusable afterwards
    for _ in 0..3 {
        run_frame(&mut sync, &device, &surface, &mut listener);
    }
}

#[test]
fn test_suboptimal_present_counts_frame_and_recreates() {
    let (device, surface, mut sync) = setup();
    let tracker = device.tracker();
    let mut listener = RecordingListener::default();

    tracker.script_present(PresentOutcome::Suboptimal);
    let (_, status) = run_frame(&mut sync, &device, &surface, &mut listener);

    assert_eq!(status, PresentStatus::Recreated);
    assert_eq!(sync.stats().frames_presented, 1);
    assert_eq!(sync.stats().swapchain_recreations, 1);
    assert_eq!(listener.extents.len(), 1);
}

#[test]
fn test_out_of_date_present_is_not_counted() {
    let (device, surface, mut sync) = setup();
    let tracker = device.tracker();
    let mut listener = RecordingListener::default();

    tracker.script_present(PresentOutcome::OutOfDate);
    let (_, status) = run_frame(&mut sync, &device, &surface, &mut listener);

    assert_eq!(status, PresentStatus::Recreated);
    assert_eq!(sync.stats().frames_presented, 0);
    assert_eq!(tracker.recreate_count(), 1);
}

#[test]
fn test_listener_failure_propagates() {
    let (device, surface, mut sync) = setup();
    let tracker = device.tracker();
    let mut listener = RecordingListener { fail: true, ..Default::default() };

    tracker.script_acquire(ScriptedAcquire::OutOfDate);
    let result = sync.prepare_before_pass(&device, &surface, &mut listener);
    assert!(matches!(result, Err(Error::InitializationFailed(_))));
}

// ============================================================================
// RESIZE TESTS
// ============================================================================

#[test]
fn test_minimized_surface_defers_recreation() {
    let (device, surface, mut sync) = setup();
    let tracker = device.tracker();
    let mut listener = RecordingListener::default();
    run_frame(&mut sync, &device, &surface, &mut listener);

    sync.notify_resized();
    surface.resize(0, 0);
    for _ in 0..2 {
        let status = sync.prepare_before_pass(&device, &surface, &mut listener).unwrap();
        assert_eq!(status, FrameStatus::Skipped(SkipReason::SurfaceMinimized));
    }
    assert!(sync.is_resize_pending());
    assert_eq!(tracker.recreate_count(), 0);
    assert_eq!(sync.stats().frames_skipped, 2);

    surface.resize(640, 480);
    let (_, status) = run_frame(&mut sync, &device, &surface, &mut listener);
    assert_eq!(status, PresentStatus::Presented);
    assert!(!sync.is_resize_pending());
    assert_eq!(listener.extents, [(640, 480)]);
    assert_eq!(sync.extent(), Extent2D::new(640, 480));
}

#[test]
fn test_resize_during_frame_recreates_after_present() {
    let (device, surface, mut sync) = setup();
    let mut listener = RecordingListener::default();

    sync.prepare_before_pass(&device, &surface, &mut listener).unwrap();
    surface.resize(1280, 720);
    sync.notify_resized();
    let status = sync.submit_command_buffers(&device, &surface, &mut listener).unwrap();

    assert_eq!(status, PresentStatus::Recreated);
    assert_eq!(sync.stats().frames_presented, 1);
    assert_eq!(sync.extent(), Extent2D::new(1280, 720));
}

#[test]
fn test_wait_all_leaves_every_fence_signaled() {
    let (device, surface, mut sync) = setup();
    let tracker = device.tracker();
    let mut listener = RecordingListener::default();
    run_frame(&mut sync, &device, &surface, &mut listener);
    run_frame(&mut sync, &device, &surface, &mut listener);

    sync.wait_all().unwrap();
    for fence in tracker.fence_states() {
        assert_eq!(fence.status, crate::device::mock_graphics_device::MockFenceStatus::Signaled);
    }
}

// ============================================================================
// SUBMIT FAILURE TESTS
// ============================================================================

#[test]
fn test_failed_submit_propagates_and_wait_all_returns() {
    let (device, surface, mut sync) = setup();
    let tracker = device.tracker();
    let mut listener = RecordingListener::default();
    run_frame(&mut sync, &device, &surface, &mut listener);

    assert!(matches!(
        sync.prepare_before_pass(&device, &surface, &mut listener).unwrap(),
        FrameStatus::Ready(FrameTarget { frame_slot: 1, .. })
    ));
    tracker.fail_submits(1);
    let result = sync.submit_command_buffers(&device, &surface, &mut listener);
    assert!(matches!(result, Err(Error::DeviceLost(_))));

    // Slot 1's fence was reset and nothing will signal it
    assert_eq!(
        tracker.fence_states()[1].status,
        crate::device::mock_graphics_device::MockFenceStatus::Unsignaled
    );
    assert_eq!(tracker.submission_count(), 1);
    assert!(sync.acquired().is_none());
    sync.wait_all().unwrap();
}

#[test]
fn test_failed_null_submission_leaves_slot_waitable() {
    let (device, surface, mut sync) = setup();
    let tracker = device.tracker();
    let mut listener = RecordingListener::default();

    tracker.script_acquire(ScriptedAcquire::Suboptimal);
    tracker.fail_submits(1);
    let result = sync.prepare_before_pass(&device, &surface, &mut listener);

    assert!(matches!(result, Err(Error::DeviceLost(_))));
    assert_eq!(sync.stats().null_submissions, 0);
    sync.wait_all().unwrap();
}
