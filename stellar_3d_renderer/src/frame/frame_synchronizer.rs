//! Frame synchronizer
//!
//! Paces the CPU against the GPU with `MAX_FRAMES_IN_FLIGHT` frame slots,
//! each owning a command list, an image-available semaphore, a
//! render-finished semaphore and an in-flight fence. Swapchain images are
//! tracked separately: an image acquired while a different slot's
//! submission still renders into it waits for that slot's fence first.
//!
//! Out-of-date and suboptimal swapchains are absorbed here. The swapchain
//! is recreated (after every in-flight frame completed), the registered
//! `SwapchainListener` rebuilds whatever depends on the swapchain images,
//! and the frame is reported as skipped. A minimized surface defers the
//! recreation until it has a non-zero extent again.

use crate::config::{Config, MAX_FRAMES_IN_FLIGHT};
use crate::device::{
    AcquireOutcome, CommandList, Extent2D, Fence, GraphicsDevice, PipelineStages, PresentOutcome,
    Semaphore, SubmitInfo, SurfaceProvider, Swapchain,
};
use crate::error::{Error, Result};
use crate::render_graph::SwapchainListener;
use crate::{engine_debug, engine_info, engine_trace, engine_warn};

/// Synchronization objects of one frame slot
struct FrameSlot {
    command_list: Box<dyn CommandList>,
    /// Signaled by acquire, waited on by the submission
    image_available: Box<dyn Semaphore>,
    /// Signaled by the submission, waited on by present
    render_finished: Box<dyn Semaphore>,
    /// Signaled when the slot's last submission completes
    in_flight: Box<dyn Fence>,
    /// The fence is signaled or a submission will signal it
    ///
    /// Cleared by the reset before a submit and set again only once the
    /// submit succeeded, so a failed submit never leaves a wait on a fence
    /// nothing will signal.
    fence_armed: bool,
}

impl FrameSlot {
    fn wait(&self, timeout_ns: u64) -> Result<()> {
        if !self.fence_armed {
            return Ok(());
        }
        self.in_flight.wait(timeout_ns)
    }
}

/// Image and slot of a frame that is being recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTarget {
    pub image_index: u32,
    pub frame_slot: usize,
}

/// Why no frame was recorded this tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Acquire reported an out-of-date swapchain; it was recreated
    SwapchainOutOfDate,
    /// Acquire succeeded on a suboptimal swapchain; the image was released
    /// with an empty submission and the swapchain recreated
    SwapchainSuboptimal,
    /// The surface has a zero extent; recreation waits for a resize
    SurfaceMinimized,
}

/// Outcome of `prepare_before_pass`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// The slot's command list is recording; draw, then submit
    Ready(FrameTarget),
    Skipped(SkipReason),
}

/// Outcome of `submit_command_buffers`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentStatus {
    Presented,
    /// Presentation reported a stale swapchain, or a resize was pending;
    /// the swapchain was recreated
    Recreated,
    /// Recreation is needed but the surface is minimized
    RecreatePending,
}

/// Counters since creation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub frames_presented: u64,
    pub frames_skipped: u64,
    pub swapchain_recreations: u64,
    /// Empty submissions releasing a suboptimal acquire
    pub null_submissions: u64,
}

pub struct FrameSynchronizer {
    swapchain: Box<dyn Swapchain>,
    slots: Vec<FrameSlot>,
    /// Slot whose submission last rendered into each swapchain image
    images_in_flight: Vec<Option<usize>>,
    current_frame: usize,
    /// Frame between `prepare_before_pass` and `submit_command_buffers`
    acquired: Option<FrameTarget>,
    resize_pending: bool,
    fence_timeout_ns: u64,
    extent: Extent2D,
    stats: FrameStats,
}

impl FrameSynchronizer {
    /// Create the swapchain at the surface's current extent and the frame slots
    pub fn new(device: &dyn GraphicsDevice, surface: &dyn SurfaceProvider, config: &Config) -> Result<Self> {
        let (width, height) = surface.window_size();
        if width == 0 || height == 0 {
            return Err(Error::InitializationFailed(format!(
                "cannot create a swapchain for a {}x{} surface",
                width, height
            )));
        }
        let swapchain = device.create_swapchain(width, height)?;

        let slots = (0..MAX_FRAMES_IN_FLIGHT)
            .map(|_| {
                Ok(FrameSlot {
                    command_list: device.create_command_list()?,
                    image_available: device.create_semaphore()?,
                    render_finished: device.create_semaphore()?,
                    // Signaled so the first wait on each slot returns at once
                    in_flight: device.create_fence(true)?,
                    fence_armed: true,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let extent = Extent2D::new(swapchain.width(), swapchain.height());
        engine_info!("stellar3d::FrameSynchronizer", "Swapchain {}x{} with {} images, {} frames in flight",
            extent.width, extent.height, swapchain.image_count(), MAX_FRAMES_IN_FLIGHT);

        Ok(Self {
            images_in_flight: vec![None; swapchain.image_count()],
            swapchain,
            slots,
            current_frame: 0,
            acquired: None,
            resize_pending: false,
            fence_timeout_ns: config.fence_timeout_ns,
            extent,
            stats: FrameStats::default(),
        })
    }

    /// Wait for the current slot, acquire an image and begin recording
    ///
    /// Returns `Skipped` when the swapchain had to be recreated (or cannot
    /// be, while minimized); nothing is recorded for that tick.
    pub fn prepare_before_pass(
        &mut self,
        device: &dyn GraphicsDevice,
        surface: &dyn SurfaceProvider,
        listener: &mut dyn SwapchainListener,
    ) -> Result<FrameStatus> {
        if self.acquired.is_some() {
            return Err(Error::InvalidState("prepare_before_pass called twice without submit".to_string()));
        }
        let slot_index = self.current_frame;
        self.slots[slot_index].wait(self.fence_timeout_ns)?;

        if self.resize_pending && !self.recreate_swapchain(device, surface, listener)? {
            return Ok(self.skip(SkipReason::SurfaceMinimized));
        }

        let slot = &self.slots[slot_index];
        let outcome = self.swapchain.acquire_next_image(slot.image_available.as_ref(), self.fence_timeout_ns)?;
        match outcome {
            AcquireOutcome::Acquired(image_index) => {
                let slot = &mut self.slots[slot_index];
                slot.command_list.reset()?;
                slot.command_list.begin()?;
                let target = FrameTarget { image_index, frame_slot: slot_index };
                self.acquired = Some(target);
                engine_trace!("stellar3d::FrameSynchronizer", "Slot {} acquired image {}", slot_index, image_index);
                Ok(FrameStatus::Ready(target))
            }
            AcquireOutcome::OutOfDate => {
                engine_debug!("stellar3d::FrameSynchronizer", "Swapchain out of date on acquire");
                if self.recreate_swapchain(device, surface, listener)? {
                    Ok(self.skip(SkipReason::SwapchainOutOfDate))
                } else {
                    Ok(self.skip(SkipReason::SurfaceMinimized))
                }
            }
            AcquireOutcome::Suboptimal(image_index) => {
                engine_debug!("stellar3d::FrameSynchronizer", "Swapchain suboptimal on acquire (image {})", image_index);
                // The acquire semaphore is signaled; consume it before the
                // swapchain goes away so the slot can be reused
                let slot = &mut self.slots[slot_index];
                slot.in_flight.reset()?;
                slot.fence_armed = false;
                device.submit(&SubmitInfo {
                    command_lists: &[],
                    wait_semaphores: &[(slot.image_available.as_ref(), PipelineStages::COLOR_ATTACHMENT_OUTPUT)],
                    signal_semaphores: &[],
                    fence: Some(slot.in_flight.as_ref()),
                })?;
                slot.fence_armed = true;
                self.stats.null_submissions += 1;
                self.current_frame = (self.current_frame + 1) % MAX_FRAMES_IN_FLIGHT;
                if self.recreate_swapchain(device, surface, listener)? {
                    Ok(self.skip(SkipReason::SwapchainSuboptimal))
                } else {
                    Ok(self.skip(SkipReason::SurfaceMinimized))
                }
            }
        }
    }

    /// End recording, submit the current slot and present its image
    pub fn submit_command_buffers(
        &mut self,
        device: &dyn GraphicsDevice,
        surface: &dyn SurfaceProvider,
        listener: &mut dyn SwapchainListener,
    ) -> Result<PresentStatus> {
        let target = self
            .acquired
            .take()
            .ok_or_else(|| Error::InvalidState("submit_command_buffers without an acquired image".to_string()))?;
        let slot_index = target.frame_slot;
        let image = target.image_index as usize;

        self.slots[slot_index].command_list.end()?;

        // Another slot's submission may still render into this image
        if let Some(owner) = self.images_in_flight.get(image).copied().flatten() {
            if owner != slot_index {
                self.slots[owner].wait(self.fence_timeout_ns)?;
            }
        }
        if let Some(entry) = self.images_in_flight.get_mut(image) {
            *entry = Some(slot_index);
        }

        let slot = &mut self.slots[slot_index];
        slot.in_flight.reset()?;
        slot.fence_armed = false;
        device.submit(&SubmitInfo {
            command_lists: &[slot.command_list.as_ref()],
            wait_semaphores: &[(slot.image_available.as_ref(), PipelineStages::COLOR_ATTACHMENT_OUTPUT)],
            signal_semaphores: &[slot.render_finished.as_ref()],
            fence: Some(slot.in_flight.as_ref()),
        })?;
        slot.fence_armed = true;
        let outcome = self.swapchain.present(target.image_index, slot.render_finished.as_ref())?;
        self.current_frame = (self.current_frame + 1) % MAX_FRAMES_IN_FLIGHT;

        if outcome != PresentOutcome::OutOfDate {
            self.stats.frames_presented += 1;
        }
        if outcome == PresentOutcome::Presented && !self.resize_pending {
            return Ok(PresentStatus::Presented);
        }

        engine_debug!("stellar3d::FrameSynchronizer", "Present returned {:?} (resize pending: {})",
            outcome, self.resize_pending);
        if self.recreate_swapchain(device, surface, listener)? {
            Ok(PresentStatus::Recreated)
        } else {
            Ok(PresentStatus::RecreatePending)
        }
    }

    /// Recreate the swapchain at the surface's current extent
    ///
    /// Waits for every frame in flight first. Returns false (and keeps the
    /// resize pending) while the surface has a zero extent.
    pub fn recreate_swapchain(
        &mut self,
        device: &dyn GraphicsDevice,
        surface: &dyn SurfaceProvider,
        listener: &mut dyn SwapchainListener,
    ) -> Result<bool> {
        self.wait_all()?;

        let (width, height) = surface.window_size();
        if width == 0 || height == 0 {
            if !self.resize_pending {
                engine_debug!("stellar3d::FrameSynchronizer", "Surface minimized, swapchain recreation deferred");
            }
            self.resize_pending = true;
            return Ok(false);
        }

        self.swapchain.recreate(width, height)?;
        self.resize_pending = false;
        self.extent = Extent2D::new(self.swapchain.width(), self.swapchain.height());
        self.images_in_flight = vec![None; self.swapchain.image_count()];
        self.stats.swapchain_recreations += 1;

        listener.on_swapchain_recreated(device, self.swapchain.as_ref()).inspect_err(|e| {
            engine_warn!("stellar3d::FrameSynchronizer", "Swapchain listener failed: {}", e);
        })?;
        engine_info!("stellar3d::FrameSynchronizer", "Swapchain recreated at {}x{} ({} images)",
            self.extent.width, self.extent.height, self.swapchain.image_count());
        Ok(true)
    }

    /// Request a swapchain recreation before the next acquire
    pub fn notify_resized(&mut self) {
        self.resize_pending = true;
    }

    /// Block until every frame slot's last submission completed
    ///
    /// A slot whose fence was reset by a failed submit has nothing in
    /// flight and is skipped.
    pub fn wait_all(&self) -> Result<()> {
        for slot in &self.slots {
            slot.wait(self.fence_timeout_ns)?;
        }
        Ok(())
    }

    fn skip(&mut self, reason: SkipReason) -> FrameStatus {
        self.stats.frames_skipped += 1;
        FrameStatus::Skipped(reason)
    }

    /// Command list of the frame being recorded
    pub fn command_list(&mut self) -> Result<&mut dyn CommandList> {
        let target = self
            .acquired
            .ok_or_else(|| Error::InvalidState("no frame is being recorded".to_string()))?;
        Ok(self.slots[target.frame_slot].command_list.as_mut())
    }

    /// Slot the next `prepare_before_pass` will use
    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    pub fn acquired(&self) -> Option<FrameTarget> {
        self.acquired
    }

    pub fn images_in_flight(&self) -> &[Option<usize>] {
        &self.images_in_flight
    }

    pub fn is_resize_pending(&self) -> bool {
        self.resize_pending
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    pub fn swapchain(&self) -> &dyn Swapchain {
        self.swapchain.as_ref()
    }

    pub fn extent(&self) -> Extent2D {
        self.extent
    }
}

#[cfg(test)]
#[path = "frame_synchronizer_tests.rs"]
mod tests;
