/// Attachment module - swapchain-sized render targets of the main render pass

pub mod attachment_store;

pub use attachment_store::*;
