/*!
# Stellar 3D Renderer

Core of the Stellar 3D deferred renderer.

This crate provides the backend-agnostic part of the renderer: the device
traits implemented by GPU backends (Vulkan in `stellar_3d_renderer_vulkan`),
the render-pass graph of the deferred pipeline and the frame synchronizer
driving acquire, submit and present.

## Architecture

- **GraphicsDevice**: Factory trait for GPU resources and queue submission
- **AttachmentStore**: Swapchain-sized images shared by the subpasses
- **Pass**: One rendering stage (G-buffer, shadows, SSAO, lighting, shading, UI)
- **MainCameraPass**: The render graph, one render pass with five subpasses
- **FrameSynchronizer**: Frames in flight, swapchain lifecycle
- **RenderSystem**: Per-tick driver tying the graph and the synchronizer together
*/

// Internal modules
mod error;
mod engine;
pub mod log;
pub mod config;
pub mod device;
pub mod attachment;
pub mod render_graph;
pub mod pass;
pub mod frame;
pub mod render_system;

// Main stellar3d namespace module
pub mod stellar3d {
    // Error types
    pub use crate::error::{Error, Result, Stellar3dError, Stellar3dResult};

    // Engine singleton (global logger)
    pub use crate::engine::Engine;

    // Per-tick driver
    pub use crate::render_system::{RenderSystem, TickOutcome};

    // Logging sub-module (types only, NOT macros)
    pub mod log {
        pub use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger};
    }

    // Device traits, descriptors and configuration
    pub mod render {
        pub use crate::device::*;
        pub use crate::config::*;
    }

    // Attachments and render graph
    pub mod graph {
        pub use crate::attachment::*;
        pub use crate::render_graph::*;
    }

    // Passes and scene-facing interfaces
    pub mod pass {
        pub use crate::pass::*;
    }

    // Frame synchronization
    pub mod frame {
        pub use crate::frame::*;
    }
}

// Re-export math library at crate root
pub use glam;
