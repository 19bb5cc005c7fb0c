/// Framebuffer trait and framebuffer descriptor

use std::sync::Arc;
use crate::device::{RenderPass, RenderTarget};

/// Descriptor for creating a framebuffer
///
/// `attachments` are ordered like the render pass attachments.
pub struct FramebufferDesc<'a> {
    pub render_pass: &'a Arc<dyn RenderPass>,
    pub attachments: Vec<Arc<dyn RenderTarget>>,
    pub width: u32,
    pub height: u32,
    pub layers: u32,
}

/// Framebuffer trait
pub trait Framebuffer: Send + Sync {
    fn width(&self) -> u32;

    fn height(&self) -> u32;
}
