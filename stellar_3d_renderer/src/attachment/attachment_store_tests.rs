//! Unit tests for attachment_store.rs

use crate::attachment::{AttachmentSlot, AttachmentStore};
use crate::config::PipelineVariant;
use crate::device::mock_graphics_device::MockGraphicsDevice;
use crate::device::{Extent2D, TextureUsage};
use crate::error::Error;

// ============================================================================
// SLOT TESTS
// ============================================================================

#[test]
fn test_required_slots_per_variant() {
    let deferred = AttachmentSlot::required(PipelineVariant::Deferred);
    assert_eq!(deferred.len(), 7);
    assert!(!deferred.contains(&AttachmentSlot::RayTracedShadow));

    let ray_traced = AttachmentSlot::required(PipelineVariant::RayTraced);
    assert_eq!(ray_traced.len(), 8);
    assert!(ray_traced.contains(&AttachmentSlot::RayTracedShadow));
}

#[test]
fn test_slot_formats_and_usages() {
    assert!(AttachmentSlot::Depth.format().is_depth());
    assert!(AttachmentSlot::GBufferNormal.usage().contains(TextureUsage::INPUT_ATTACHMENT));
    assert!(AttachmentSlot::RayTracedShadow.usage().contains(TextureUsage::STORAGE));
    assert!(!AttachmentSlot::RayTracedShadow.usage().is_attachment());
}

// ============================================================================
// REBUILD TESTS
// ============================================================================

#[test]
fn test_rebuild_allocates_every_slot() {
    let device = MockGraphicsDevice::new();
    let mut store = AttachmentStore::new();
    let slots = AttachmentSlot::required(PipelineVariant::RayTraced);

    store.rebuild(&device, Extent2D::new(800, 600), &slots).unwrap();

    assert_eq!(store.len(), slots.len());
    assert_eq!(store.generation(), 1);
    for slot in &slots {
        let attachment = store.get(*slot).unwrap();
        assert_eq!(attachment.extent, Extent2D::new(800, 600));
        assert_eq!(attachment.texture.info().format, slot.format());
    }
    assert!(store.target(AttachmentSlot::Lighting).is_ok());
    assert!(store.get(AttachmentSlot::RayTracedShadow).unwrap().target.is_none());
}

#[test]
fn test_double_rebuild_leaves_one_attachment_per_slot() {
    let device = MockGraphicsDevice::new();
    let tracker = device.tracker();
    let mut store = AttachmentStore::new();
    let slots = AttachmentSlot::required(PipelineVariant::Deferred);

    store.rebuild(&device, Extent2D::new(800, 600), &slots).unwrap();
    store.rebuild(&device, Extent2D::new(1024, 768), &slots).unwrap();
    store.rebuild(&device, Extent2D::new(1280, 720), &slots).unwrap();

    assert_eq!(store.len(), slots.len());
    assert_eq!(tracker.live_texture_count(), slots.len());
    assert_eq!(store.generation(), 3);
    assert!(store.iter().all(|a| a.extent == Extent2D::new(1280, 720) && a.generation == 3));
}

#[test]
fn test_resize_round_trip_restores_dimensions() {
    let device = MockGraphicsDevice::new();
    let mut store = AttachmentStore::new();
    let slots = AttachmentSlot::required(PipelineVariant::Deferred);
    let original = Extent2D::new(800, 600);

    store.rebuild(&device, original, &slots).unwrap();
    for _ in 0..5 {
        store.rebuild(&device, Extent2D::new(1920, 1080), &slots).unwrap();
        store.rebuild(&device, original, &slots).unwrap();
    }

    assert_eq!(store.extent(), original);
    for attachment in store.iter() {
        let info = attachment.texture.info();
        assert_eq!((info.width, info.height), (800, 600));
    }
}

#[test]
fn test_rebuild_rejects_empty_extent() {
    let device = MockGraphicsDevice::new();
    let mut store = AttachmentStore::new();
    let result = store.rebuild(&device, Extent2D::new(0, 600), &[AttachmentSlot::Depth]);
    assert!(matches!(result, Err(Error::InvalidState(_))));
    assert!(store.is_empty());
}

#[test]
fn test_missing_slot_is_a_declaration_error() {
    let device = MockGraphicsDevice::new();
    let mut store = AttachmentStore::new();
    store.rebuild(&device, Extent2D::new(64, 64), &[AttachmentSlot::Depth]).unwrap();

    assert!(matches!(store.texture(AttachmentSlot::Lighting), Err(Error::GraphDeclaration(_))));
    assert!(matches!(store.target(AttachmentSlot::Lighting), Err(Error::GraphDeclaration(_))));
}

#[test]
fn test_clear_releases_textures() {
    let device = MockGraphicsDevice::new();
    let tracker = device.tracker();
    let mut store = AttachmentStore::new();
    store
        .rebuild(&device, Extent2D::new(64, 64), &AttachmentSlot::required(PipelineVariant::Deferred))
        .unwrap();

    store.clear();
    assert!(store.is_empty());
    assert_eq!(tracker.live_texture_count(), 0);
}

#[test]
fn test_keys_change_between_generations() {
    let device = MockGraphicsDevice::new();
    let mut store = AttachmentStore::new();
    store.rebuild(&device, Extent2D::new(64, 64), &[AttachmentSlot::Lighting]).unwrap();
    let first = store.key(AttachmentSlot::Lighting).unwrap();
    store.rebuild(&device, Extent2D::new(32, 32), &[AttachmentSlot::Lighting]).unwrap();

    assert!(store.by_key(first).is_none());
    assert!(store.by_key(store.key(AttachmentSlot::Lighting).unwrap()).is_some());
}
