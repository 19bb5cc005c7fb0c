/// UI overlay drawn over the shaded image (subpass 4)

use crate::error::Result;
use crate::pass::{Pass, PassGraphContext, PassRecorder, UiOverlay};
use crate::render_graph::SubpassId;
use crate::engine_trace;

pub struct UiOverlayPass {
    overlay: Option<Box<dyn UiOverlay>>,
    initialized: bool,
}

impl UiOverlayPass {
    /// Without an overlay the subpass is left empty
    pub fn new(overlay: Option<Box<dyn UiOverlay>>) -> Self {
        Self { overlay, initialized: false }
    }

    pub fn has_overlay(&self) -> bool {
        self.overlay.is_some()
    }
}

impl Pass for UiOverlayPass {
    fn name(&self) -> &'static str {
        "UiOverlay"
    }

    fn subpass(&self) -> Option<SubpassId> {
        Some(SubpassId::UiOverlay)
    }

    fn initialize(&mut self, ctx: &mut PassGraphContext) -> Result<()> {
        if let Some(overlay) = self.overlay.as_mut() {
            overlay.initialize(ctx.device, ctx.render_pass, SubpassId::UiOverlay.index())?;
        }
        self.initialized = true;
        Ok(())
    }

    fn draw(&mut self, rec: &mut PassRecorder) -> Result<()> {
        let Some(overlay) = self.overlay.as_mut() else {
            return Ok(());
        };
        if overlay.record(rec.cmd, SubpassId::UiOverlay.index())? {
            engine_trace!("stellar3d::UiOverlay", "Frame {}: overlay buffers updated", rec.frame_number);
        }
        Ok(())
    }

    fn clean(&mut self) {
        if !self.initialized {
            return;
        }
        if let Some(overlay) = self.overlay.as_mut() {
            overlay.clean();
        }
        self.initialized = false;
    }
}
