//! Unit tests for render_system.rs
//!
//! End-to-end ticks against the mock device: frame pacing, stale and
//! minimized surfaces, variants and shutdown.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::config::{Config, PipelineVariant};
use crate::device::mock_graphics_device::{MockGraphicsDevice, MockTracker, ScriptedAcquire};
use crate::device::Extent2D;
use crate::error::{Error, Result};
use crate::frame::SkipReason;
use crate::pass::mock_scene::{scene_resources, MockScene, MockShaderLibrary, MockSurface};
use crate::pass::{GeometryPurpose, ShaderProgram};
use crate::render_graph::GraphState;
use crate::stellar3d::{RenderSystem, TickOutcome};

// ============================================================================
// TEST HELPERS
// ============================================================================

fn build(config: Config, device: MockGraphicsDevice, with_tlas: bool) -> (Result<RenderSystem>, MockTracker, MockSurface) {
    let tracker = device.tracker();
    let surface = MockSurface::new(800, 600);
    let resources = scene_resources(&device, with_tlas);
    let system = RenderSystem::new(
        Box::new(device),
        &surface,
        config,
        Arc::new(MockShaderLibrary::new()),
        resources,
        None,
    );
    (system, tracker, surface)
}

fn ready() -> (RenderSystem, MockTracker, MockSurface) {
    let (system, tracker, surface) = build(Config::default(), MockGraphicsDevice::new(), false);
    (system.unwrap(), tracker, surface)
}

fn presented(outcome: TickOutcome) -> (usize, u32) {
    match outcome {
        TickOutcome::Presented { frame_slot, image_index } => (frame_slot, image_index),
        TickOutcome::Skipped(reason) => panic!("tick skipped: {:?}", reason),
    }
}

// ============================================================================
// STEADY STATE TESTS
// ============================================================================

#[test]
fn test_ticks_alternate_frame_slots() {
    let (mut system, tracker, surface) = ready();
    let scene = MockScene::new();

    let frames: Vec<(usize, u32)> = (0..4).map(|_| presented(system.tick(&surface, &scene).unwrap())).collect();

    assert_eq!(frames, [(0, 0), (1, 1), (0, 2), (1, 0)]);
    assert_eq!(system.frame_number(), 4);
    assert_eq!(system.stats().frames_presented, 4);
    for fence in tracker.fence_states() {
        assert!(fence.max_submits_since_wait <= 1, "{:?}", fence);
    }
}

#[test]
fn test_ten_ticks_cycle_slots_without_fence_stall() {
    let (mut system, tracker, surface) = ready();
    let scene = MockScene::new();

    let frames: Vec<(usize, u32)> = (0..10).map(|_| presented(system.tick(&surface, &scene).unwrap())).collect();

    let slots: Vec<usize> = frames.iter().map(|&(slot, _)| slot).collect();
    assert_eq!(slots, [0, 1, 0, 1, 0, 1, 0, 1, 0, 1]);
    assert_eq!(system.frame_number(), 10);
    assert_eq!(tracker.submission_count(), 10);
    for fence in tracker.fence_states() {
        assert!(fence.max_submits_since_wait <= 1, "{:?}", fence);
        assert_eq!(fence.total_submits, 5);
    }
    system.shutdown().unwrap();
}

#[test]
fn test_first_tick_draws_gbuffer_and_every_cascade() {
    let (mut system, _tracker, surface) = ready();
    let scene = MockScene::new();

    system.tick(&surface, &scene).unwrap();

    assert_eq!(
        scene.take_draws(),
        [
            GeometryPurpose::ShadowCascade(0),
            GeometryPurpose::ShadowCascade(1),
            GeometryPurpose::ShadowCascade(2),
            GeometryPurpose::ShadowCascade(3),
            GeometryPurpose::GBuffer,
        ]
    );

    system.tick(&surface, &scene).unwrap();
    assert_eq!(
        scene.take_draws(),
        [GeometryPurpose::ShadowCascade(0), GeometryPurpose::ShadowCascade(1), GeometryPurpose::GBuffer]
    );
}

#[test]
fn test_each_tick_submits_one_recorded_command_list() {
    let (mut system, tracker, surface) = ready();
    let scene = MockScene::new();

    for _ in 0..3 {
        system.tick(&surface, &scene).unwrap();
    }

    let submissions = tracker.submissions.lock().unwrap().clone();
    assert_eq!(submissions.len(), 3);
    for submission in submissions {
        assert_eq!(submission.command_list_count, 1);
        assert_eq!(submission.wait_count, 1);
        assert_eq!(submission.signal_count, 1);
    }
    assert_eq!(tracker.swapchain.lock().unwrap().presented, [0, 1, 2]);
}

// ============================================================================
// SWAPCHAIN RECREATION TESTS
// ============================================================================

#[test]
fn test_out_of_date_acquire_skips_tick_and_rebuilds_graph() {
    let (mut system, tracker, surface) = ready();
    let scene = MockScene::new();
    system.tick(&surface, &scene).unwrap();

    surface.resize(1024, 768);
    tracker.script_acquire(ScriptedAcquire::OutOfDate);
    let outcome = system.tick(&surface, &scene).unwrap();

    assert_eq!(outcome, TickOutcome::Skipped(SkipReason::SwapchainOutOfDate));
    assert_eq!(system.frame_number(), 1);
    assert_eq!(system.extent(), Extent2D::new(1024, 768));
    assert_eq!(system.graph().extent(), Extent2D::new(1024, 768));
    assert_eq!(system.graph().attachments().generation(), 2);

    tracker.take_commands();
    presented(system.tick(&surface, &scene).unwrap());
    assert_eq!(tracker.count_commands("begin_render_pass 1024x768"), 1);
    assert_eq!(system.frame_number(), 2);
}

#[test]
fn test_out_of_date_on_fifth_tick_recreates_then_sixth_renders() {
    let (mut system, tracker, surface) = ready();
    let scene = MockScene::new();
    for _ in 0..4 {
        presented(system.tick(&surface, &scene).unwrap());
    }
    let live_textures = tracker.live_texture_count();

    tracker.script_acquire(ScriptedAcquire::OutOfDate);
    let fifth = system.tick(&surface, &scene).unwrap();

    assert_eq!(fifth, TickOutcome::Skipped(SkipReason::SwapchainOutOfDate));
    assert_eq!(tracker.submission_count(), 4);
    assert_eq!(tracker.recreate_count(), 1);
    assert_eq!(system.stats().swapchain_recreations, 1);
    assert_eq!(system.graph().attachments().generation(), 2);
    assert_eq!(tracker.live_texture_count(), live_textures);

    tracker.take_commands();
    presented(system.tick(&surface, &scene).unwrap());
    assert_eq!(tracker.submission_count(), 5);
    assert_eq!(tracker.count_commands("begin_render_pass 800x600"), 1);
    assert_eq!(system.frame_number(), 5);
    assert_eq!(system.graph_state(), GraphState::Ready);
}

#[test]
fn test_suboptimal_acquire_skips_tick_then_recovers() {
    let (mut system, tracker, surface) = ready();
    let scene = MockScene::new();

    tracker.script_acquire(ScriptedAcquire::Suboptimal);
    let outcome = system.tick(&surface, &scene).unwrap();
    assert_eq!(outcome, TickOutcome::Skipped(SkipReason::SwapchainSuboptimal));
    assert_eq!(system.stats().null_submissions, 1);

    for _ in 0..4 {
        presented(system.tick(&surface, &scene).unwrap());
    }
    assert_eq!(system.frame_number(), 4);
}

#[test]
fn test_minimized_window_pauses_rendering() {
    let (mut system, tracker, surface) = ready();
    let scene = MockScene::new();
    system.tick(&surface, &scene).unwrap();

    surface.resize(0, 0);
    system.notify_resized();
    for _ in 0..3 {
        let outcome = system.tick(&surface, &scene).unwrap();
        assert_eq!(outcome, TickOutcome::Skipped(SkipReason::SurfaceMinimized));
    }
    assert_eq!(tracker.recreate_count(), 0);
    assert_eq!(system.graph().attachments().generation(), 1);
    assert_eq!(system.frame_number(), 1);

    surface.resize(400, 300);
    presented(system.tick(&surface, &scene).unwrap());
    assert_eq!(system.graph().extent(), Extent2D::new(400, 300));
    assert_eq!(system.graph().attachments().generation(), 2);
}

#[test]
fn test_precompute_reruns_after_resize() {
    let (mut system, tracker, surface) = ready();
    let scene = MockScene::new();
    system.tick(&surface, &scene).unwrap();

    surface.resize(1024, 768);
    tracker.script_acquire(ScriptedAcquire::OutOfDate);
    system.tick(&surface, &scene).unwrap();
    system.tick(&surface, &scene).unwrap();
    assert_eq!(system.graph().lighting_precompute_runs(), 2);

    system.tick(&surface, &scene).unwrap();
    assert_eq!(system.graph().lighting_precompute_runs(), 2);

    system.invalidate_environment();
    system.tick(&surface, &scene).unwrap();
    assert_eq!(system.graph().lighting_precompute_runs(), 3);
}

// ============================================================================
// VARIANT TESTS
// ============================================================================

#[test]
fn test_eight_cascades_min_four_over_sixteen_ticks() {
    let mut config = Config::default();
    config.shadow.cascade_count = 8;
    config.shadow.min_cascade = 4;
    let (system, _tracker, surface) = build(config, MockGraphicsDevice::new(), false);
    let mut system = system.unwrap();
    let scene = MockScene::new();

    for _ in 0..16 {
        presented(system.tick(&surface, &scene).unwrap());
    }

    assert_eq!(system.graph().shadow_refresh_count(7), Some(2));
    assert_eq!(system.graph().shadow_refresh_count(4), Some(8));
    assert_eq!(system.graph().shadow_refresh_count(3), Some(16));
    assert_eq!(system.graph().shadow_refresh_count(8), Some(0));
}

#[test]
fn test_ray_traced_variant_traces_every_tick() {
    let config = Config { pipeline_variant: PipelineVariant::RayTraced, ..Config::default() };
    let (system, tracker, surface) = build(config, MockGraphicsDevice::new().with_ray_tracing(), true);
    let mut system = system.unwrap();
    let scene = MockScene::new();

    for _ in 0..3 {
        presented(system.tick(&surface, &scene).unwrap());
    }
    assert_eq!(tracker.count_commands("trace_rays 800x600"), 3);
    assert!(scene.take_draws().iter().all(|p| *p == GeometryPurpose::GBuffer));
}

#[test]
fn test_ray_traced_variant_without_support_fails_to_build() {
    let config = Config { pipeline_variant: PipelineVariant::RayTraced, ..Config::default() };
    let (system, tracker, _surface) = build(config, MockGraphicsDevice::new(), true);

    assert!(matches!(system, Err(Error::Unsupported(_))));
    assert_eq!(tracker.submission_count(), 0);
}

#[test]
fn test_missing_shader_fails_before_any_submission() {
    let device = MockGraphicsDevice::new();
    let tracker = device.tracker();
    let surface = MockSurface::new(800, 600);
    let resources = scene_resources(&device, false);
    let system = RenderSystem::new(
        Box::new(device),
        &surface,
        Config::default(),
        Arc::new(MockShaderLibrary::without(ShaderProgram::Ssao)),
        resources,
        None,
    );

    assert!(matches!(system, Err(Error::InitializationFailed(_))));
    assert_eq!(tracker.submission_count(), 0);
    assert_eq!(tracker.live_texture_count(), 0);
}

// ============================================================================
// SHUTDOWN TESTS
// ============================================================================

#[test]
fn test_shutdown_is_idempotent_and_releases_resources() {
    let (mut system, tracker, surface) = ready();
    let scene = MockScene::new();
    system.tick(&surface, &scene).unwrap();

    system.shutdown().unwrap();
    system.shutdown().unwrap();

    assert_eq!(system.graph_state(), GraphState::Destroyed);
    assert_eq!(tracker.wait_idle_count.load(Ordering::SeqCst), 1);
    assert_eq!(tracker.live_texture_count(), 0);
    assert!(matches!(system.tick(&surface, &scene), Err(Error::InvalidState(_))));
}

#[test]
fn test_shutdown_after_failed_submit_returns() {
    let (mut system, tracker, surface) = ready();
    let scene = MockScene::new();
    system.tick(&surface, &scene).unwrap();

    tracker.fail_submits(1);
    assert!(matches!(system.tick(&surface, &scene), Err(Error::DeviceLost(_))));

    system.shutdown().unwrap();
    assert_eq!(system.graph_state(), GraphState::Destroyed);
    assert_eq!(tracker.live_texture_count(), 0);
    assert_eq!(tracker.live_descriptor_set_count(), 0);
}

#[test]
fn test_drop_after_failed_submit_releases_resources() {
    let (mut system, tracker, surface) = ready();
    let scene = MockScene::new();

    tracker.fail_submits(1);
    assert!(system.tick(&surface, &scene).is_err());
    drop(system);

    assert_eq!(tracker.wait_idle_count.load(Ordering::SeqCst), 1);
    assert_eq!(tracker.live_texture_count(), 0);
}

#[test]
fn test_drop_shuts_down() {
    let (mut system, tracker, surface) = ready();
    let scene = MockScene::new();
    system.tick(&surface, &scene).unwrap();

    drop(system);

    assert_eq!(tracker.wait_idle_count.load(Ordering::SeqCst), 1);
    assert_eq!(tracker.live_texture_count(), 0);
}
