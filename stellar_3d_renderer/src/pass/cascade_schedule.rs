/// Staggered refresh schedule of the shadow cascades
///
/// Cascades below `min_cascade` are re-rendered every frame. Cascade `i` at
/// or above it is re-rendered every `2 * (i - min_cascade + 1)` frames, so
/// far cascades (covering more of the scene at lower resolution) trade
/// freshness for GPU time. Frame 0 refreshes every cascade.

use crate::config::MAX_CASCADES;

pub struct CascadeSchedule {
    cascade_count: u32,
    min_cascade: u32,
    last_computed: [Option<u64>; MAX_CASCADES],
}

impl CascadeSchedule {
    pub fn new(cascade_count: u32, min_cascade: u32) -> Self {
        Self {
            cascade_count: cascade_count.min(MAX_CASCADES as u32),
            min_cascade,
            last_computed: [None; MAX_CASCADES],
        }
    }

    /// Refresh period of `cascade`, in frames
    pub fn period(&self, cascade: u32) -> u64 {
        if cascade < self.min_cascade {
            1
        } else {
            2 * (cascade - self.min_cascade + 1) as u64
        }
    }

    pub fn is_due(&self, cascade: u32, frame: u64) -> bool {
        cascade < self.cascade_count && frame % self.period(cascade) == 0
    }

    /// Cascades to re-render at `frame`, in ascending order
    pub fn due_cascades(&self, frame: u64) -> Vec<u32> {
        (0..self.cascade_count).filter(|&c| self.is_due(c, frame)).collect()
    }

    pub fn mark_computed(&mut self, cascade: u32, frame: u64) {
        if let Some(slot) = self.last_computed.get_mut(cascade as usize) {
            *slot = Some(frame);
        }
    }

    /// Frame at which `cascade` was last rendered
    pub fn last_computed(&self, cascade: u32) -> Option<u64> {
        self.last_computed.get(cascade as usize).copied().flatten()
    }

    pub fn cascade_count(&self) -> u32 {
        self.cascade_count
    }

    /// Forget every refresh (the shadow map contents were lost)
    pub fn reset(&mut self) {
        self.last_computed = [None; MAX_CASCADES];
    }
}

#[cfg(test)]
#[path = "cascade_schedule_tests.rs"]
mod tests;
