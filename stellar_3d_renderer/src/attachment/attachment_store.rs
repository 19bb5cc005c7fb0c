//! Attachment store
//!
//! Owns every swapchain-sized image of the render graph in a slotmap arena,
//! indexed by its logical `AttachmentSlot`. Recreation clears the arena
//! (dropping the previous generation's images and views) and repopulates it
//! at the new extent, so a slot never holds more than one live attachment.

use std::sync::Arc;
use rustc_hash::FxHashMap;
use slotmap::{new_key_type, SlotMap};

use crate::config::PipelineVariant;
use crate::device::{Extent2D, GraphicsDevice, RenderTarget, Texture, TextureDesc, TextureFormat, TextureUsage};
use crate::error::{Error, Result};
use crate::engine_debug;

new_key_type! {
    /// Arena key of one attachment generation
    pub struct AttachmentKey;
}

/// Logical attachment of the main render pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AttachmentSlot {
    Depth,
    GBufferNormal,
    GBufferAlbedo,
    GBufferMaterial,
    GBufferPosition,
    AmbientOcclusion,
    Lighting,
    /// Storage image written by the ray tracing pass (not a render pass attachment)
    RayTracedShadow,
}

impl AttachmentSlot {
    pub const ALL: [AttachmentSlot; 8] = [
        AttachmentSlot::Depth,
        AttachmentSlot::GBufferNormal,
        AttachmentSlot::GBufferAlbedo,
        AttachmentSlot::GBufferMaterial,
        AttachmentSlot::GBufferPosition,
        AttachmentSlot::AmbientOcclusion,
        AttachmentSlot::Lighting,
        AttachmentSlot::RayTracedShadow,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            AttachmentSlot::Depth => "depth",
            AttachmentSlot::GBufferNormal => "gbuffer_normal",
            AttachmentSlot::GBufferAlbedo => "gbuffer_albedo",
            AttachmentSlot::GBufferMaterial => "gbuffer_material",
            AttachmentSlot::GBufferPosition => "gbuffer_position",
            AttachmentSlot::AmbientOcclusion => "ambient_occlusion",
            AttachmentSlot::Lighting => "lighting",
            AttachmentSlot::RayTracedShadow => "ray_traced_shadow",
        }
    }

    pub fn format(&self) -> TextureFormat {
        match self {
            AttachmentSlot::Depth => TextureFormat::D32_FLOAT,
            AttachmentSlot::GBufferNormal => TextureFormat::R16G16B16A16_SFLOAT,
            AttachmentSlot::GBufferAlbedo => TextureFormat::R8G8B8A8_SRGB,
            AttachmentSlot::GBufferMaterial => TextureFormat::R8G8B8A8_UNORM,
            AttachmentSlot::GBufferPosition => TextureFormat::R16G16B16A16_SFLOAT,
            AttachmentSlot::AmbientOcclusion => TextureFormat::R8_UNORM,
            AttachmentSlot::Lighting => TextureFormat::R16G16B16A16_SFLOAT,
            AttachmentSlot::RayTracedShadow => TextureFormat::R32_SFLOAT,
        }
    }

    pub fn usage(&self) -> TextureUsage {
        match self {
            AttachmentSlot::Depth => TextureUsage::DEPTH_STENCIL_ATTACHMENT,
            AttachmentSlot::RayTracedShadow => TextureUsage::STORAGE | TextureUsage::SAMPLED,
            _ => TextureUsage::COLOR_ATTACHMENT | TextureUsage::INPUT_ATTACHMENT,
        }
    }

    /// Slots the render graph allocates for `variant`
    pub fn required(variant: PipelineVariant) -> Vec<AttachmentSlot> {
        AttachmentSlot::ALL
            .iter()
            .copied()
            .filter(|slot| *slot != AttachmentSlot::RayTracedShadow || variant == PipelineVariant::RayTraced)
            .collect()
    }
}

/// One swapchain-sized image with its default view and optional attachment view
pub struct Attachment {
    pub slot: AttachmentSlot,
    pub texture: Arc<dyn Texture>,
    /// None for storage-only images
    pub target: Option<Arc<dyn RenderTarget>>,
    pub extent: Extent2D,
    /// Store generation this attachment was created in
    pub generation: u64,
}

/// Arena of the render graph's swapchain-sized attachments
pub struct AttachmentStore {
    arena: SlotMap<AttachmentKey, Attachment>,
    index: FxHashMap<AttachmentSlot, AttachmentKey>,
    extent: Extent2D,
    generation: u64,
}

impl AttachmentStore {
    pub fn new() -> Self {
        Self {
            arena: SlotMap::with_key(),
            index: FxHashMap::default(),
            extent: Extent2D::default(),
            generation: 0,
        }
    }

    /// Drop every attachment and allocate `slots` at `extent`
    pub fn rebuild(&mut self, device: &dyn GraphicsDevice, extent: Extent2D, slots: &[AttachmentSlot]) -> Result<()> {
        if extent.is_empty() {
            return Err(Error::InvalidState(format!(
                "attachments cannot be built at {}x{}",
                extent.width, extent.height
            )));
        }

        self.clear();
        self.generation += 1;

        for &slot in slots {
            let texture = device.create_texture(TextureDesc::new_2d(
                slot.label(),
                extent.width,
                extent.height,
                slot.format(),
                slot.usage(),
            ))?;
            let target = if slot.usage().is_attachment() {
                Some(device.create_render_target(&texture, 0, 0)?)
            } else {
                None
            };
            let key = self.arena.insert(Attachment {
                slot,
                texture,
                target,
                extent,
                generation: self.generation,
            });
            self.index.insert(slot, key);
        }
        self.extent = extent;

        engine_debug!("stellar3d::Attachments", "Generation {}: {} attachments at {}x{}",
            self.generation, self.arena.len(), extent.width, extent.height);
        Ok(())
    }

    /// Drop every attachment
    pub fn clear(&mut self) {
        self.arena.clear();
        self.index.clear();
    }

    pub fn contains(&self, slot: AttachmentSlot) -> bool {
        self.index.contains_key(&slot)
    }

    pub fn key(&self, slot: AttachmentSlot) -> Option<AttachmentKey> {
        self.index.get(&slot).copied()
    }

    pub fn get(&self, slot: AttachmentSlot) -> Option<&Attachment> {
        self.key(slot).and_then(|key| self.arena.get(key))
    }

    pub fn by_key(&self, key: AttachmentKey) -> Option<&Attachment> {
        self.arena.get(key)
    }

    /// Texture of `slot`; a missing slot is a graph declaration bug
    pub fn texture(&self, slot: AttachmentSlot) -> Result<&Arc<dyn Texture>> {
        self.get(slot)
            .map(|attachment| &attachment.texture)
            .ok_or_else(|| Error::GraphDeclaration(format!("attachment {:?} is not allocated", slot)))
    }

    /// Attachment view of `slot`
    pub fn target(&self, slot: AttachmentSlot) -> Result<&Arc<dyn RenderTarget>> {
        self.get(slot)
            .and_then(|attachment| attachment.target.as_ref())
            .ok_or_else(|| Error::GraphDeclaration(format!("attachment {:?} has no render target view", slot)))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attachment> {
        self.arena.values()
    }

    pub fn extent(&self) -> Extent2D {
        self.extent
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }
}

impl Default for AttachmentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "attachment_store_tests.rs"]
mod tests;
