/// Frame synchronization module - frames in flight and swapchain lifecycle

mod frame_synchronizer;

pub use frame_synchronizer::{
    FrameStats, FrameStatus, FrameSynchronizer, FrameTarget, PresentStatus, SkipReason,
};
