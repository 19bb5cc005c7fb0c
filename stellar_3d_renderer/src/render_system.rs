//! Render system
//!
//! Ties the frame synchronizer and the render graph together. One `tick`
//! waits for the current frame slot, acquires a swapchain image, updates
//! the slot's uniforms, records every pass and submits/presents. Skipped
//! ticks (stale or minimized surface) record nothing and do not advance the
//! frame number.

use std::sync::Arc;

use crate::config::Config;
use crate::device::{Extent2D, GraphicsDevice, SurfaceProvider};
use crate::error::{Error, Result};
use crate::frame::{FrameStats, FrameStatus, FrameSynchronizer, PresentStatus, SkipReason};
use crate::pass::{FrameData, PassRecorder, SceneProvider, SceneResources, ShaderLibrary, UiOverlay};
use crate::render_graph::{GraphState, MainCameraPass};
use crate::{engine_debug, engine_info};

/// Result of one `tick`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A frame was recorded, submitted and handed to presentation
    Presented { frame_slot: usize, image_index: u32 },
    Skipped(SkipReason),
}

pub struct RenderSystem {
    // Field order is drop order: GPU objects before the device
    graph: MainCameraPass,
    synchronizer: FrameSynchronizer,
    device: Box<dyn GraphicsDevice>,
    /// Frames drawn so far
    frame_number: u64,
    shut_down: bool,
}

impl RenderSystem {
    /// Create the swapchain, frame slots and the render graph
    ///
    /// Fails with the graph's error (declaration, unsupported feature,
    /// missing shader) before any frame is recorded.
    pub fn new(
        device: Box<dyn GraphicsDevice>,
        surface: &dyn SurfaceProvider,
        config: Config,
        shaders: Arc<dyn ShaderLibrary>,
        resources: SceneResources,
        ui: Option<Box<dyn UiOverlay>>,
    ) -> Result<Self> {
        config.validate()?;
        let synchronizer = FrameSynchronizer::new(device.as_ref(), surface, &config)?;
        let mut graph = MainCameraPass::new(config, shaders, ui);
        graph.initialize(device.as_ref(), synchronizer.swapchain(), resources)?;

        engine_info!("stellar3d::RenderSystem", "Render system ready");
        Ok(Self { graph, synchronizer, device, frame_number: 0, shut_down: false })
    }

    /// Render and present one frame
    pub fn tick(&mut self, surface: &dyn SurfaceProvider, scene: &dyn SceneProvider) -> Result<TickOutcome> {
        if self.shut_down {
            return Err(Error::InvalidState("tick after shutdown".to_string()));
        }
        let target = match self
            .synchronizer
            .prepare_before_pass(self.device.as_ref(), surface, &mut self.graph)?
        {
            FrameStatus::Ready(target) => target,
            FrameStatus::Skipped(reason) => return Ok(TickOutcome::Skipped(reason)),
        };

        let frame = FrameData {
            frame_slot: target.frame_slot,
            frame_number: self.frame_number,
            camera: scene.camera(),
            light: scene.directional_light(),
            extent: self.graph.extent(),
        };
        self.graph.prepare_pass_data(&frame)?;

        let mut rec = PassRecorder {
            cmd: self.synchronizer.command_list()?,
            scene,
            frame_slot: target.frame_slot,
            frame_number: self.frame_number,
            image_index: target.image_index,
            extent: frame.extent,
        };
        self.graph.draw(&mut rec)?;

        let status = self
            .synchronizer
            .submit_command_buffers(self.device.as_ref(), surface, &mut self.graph)?;
        if status != PresentStatus::Presented {
            engine_debug!("stellar3d::RenderSystem", "Frame {} presented with {:?}", self.frame_number, status);
        }
        self.frame_number += 1;

        Ok(TickOutcome::Presented { frame_slot: target.frame_slot, image_index: target.image_index })
    }

    /// The window was resized; the swapchain is recreated on the next tick
    pub fn notify_resized(&mut self) {
        self.synchronizer.notify_resized();
    }

    /// Record the IBL precompute again on the next frame
    pub fn invalidate_environment(&mut self) {
        self.graph.invalidate_precompute();
    }

    /// Wait for the GPU and release every render graph resource
    ///
    /// Idempotent; also run on drop.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.shut_down {
            return Ok(());
        }
        self.shut_down = true;
        self.synchronizer.wait_all()?;
        self.device.wait_idle()?;
        self.graph.clean();
        engine_info!("stellar3d::RenderSystem", "Shut down after {} frames", self.frame_number);
        Ok(())
    }

    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    pub fn stats(&self) -> FrameStats {
        self.synchronizer.stats()
    }

    pub fn extent(&self) -> Extent2D {
        self.synchronizer.extent()
    }

    pub fn graph(&self) -> &MainCameraPass {
        &self.graph
    }

    pub fn graph_state(&self) -> GraphState {
        self.graph.state()
    }

    pub fn synchronizer(&self) -> &FrameSynchronizer {
        &self.synchronizer
    }

    pub fn device(&self) -> &dyn GraphicsDevice {
        self.device.as_ref()
    }
}

impl Drop for RenderSystem {
    fn drop(&mut self) {
        // Errors cannot propagate out of drop; the device is going away anyway
        let _ = self.shutdown();
    }
}

#[cfg(test)]
#[path = "render_system_tests.rs"]
mod tests;
