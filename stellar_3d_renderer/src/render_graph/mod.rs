//! Render graph module
//!
//! The main render pass of the deferred pipeline: its static layout
//! (subpasses, attachments, dependency edges) and `MainCameraPass`, which
//! owns the attachments and sequences the concrete passes every frame.

mod graph_layout;
mod main_camera_pass;

pub use graph_layout::{
    AttachmentBinding, DependencyEdge, EdgeEnd, GraphLayout, MissingDependency, SubpassDeclaration, SubpassId,
};
pub use main_camera_pass::{GraphState, MainCameraPass, SwapchainListener};
