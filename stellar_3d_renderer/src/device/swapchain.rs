/// Swapchain trait - for window presentation

use std::sync::Arc;
use crate::error::Result;
use crate::device::{RenderTarget, Semaphore, TextureFormat};

/// Result of acquiring a presentable image
///
/// Stale-surface conditions are outcomes, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// Image acquired; the semaphore will be signaled
    Acquired(u32),
    /// Image acquired but the swapchain no longer matches the surface exactly
    Suboptimal(u32),
    /// No image acquired; the swapchain must be recreated
    OutOfDate,
}

/// Result of presenting an image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    Suboptimal,
    OutOfDate,
}

/// Swapchain for presenting rendered images to a window
pub trait Swapchain: Send + Sync {
    /// Acquire the next image, signaling `signal` when it is ready
    fn acquire_next_image(&mut self, signal: &dyn Semaphore, timeout_ns: u64) -> Result<AcquireOutcome>;

    /// Queue `image_index` for presentation after `wait` is signaled
    fn present(&mut self, image_index: u32, wait: &dyn Semaphore) -> Result<PresentOutcome>;

    /// Rebuild the image chain for a new surface extent
    ///
    /// The caller guarantees no submitted work still references the old images.
    fn recreate(&mut self, width: u32, height: u32) -> Result<()>;

    fn image_count(&self) -> usize;

    fn width(&self) -> u32;

    fn height(&self) -> u32;

    fn format(&self) -> TextureFormat;

    /// View of swapchain image `index`, attachable to a framebuffer
    fn image_target(&self, index: usize) -> Result<Arc<dyn RenderTarget>>;
}
