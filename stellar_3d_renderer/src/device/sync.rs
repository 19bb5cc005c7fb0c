/// Fence and Semaphore traits - CPU/GPU and GPU/GPU synchronization

use crate::error::Result;

/// CPU-visible completion signal of one queue submission
pub trait Fence: Send + Sync {
    /// Block until signaled or `timeout_ns` elapses
    ///
    /// Expiry returns `Error::Timeout`.
    fn wait(&self, timeout_ns: u64) -> Result<()>;

    /// Return to the unsignaled state (must not be pending on the GPU)
    fn reset(&self) -> Result<()>;

    fn is_signaled(&self) -> Result<bool>;
}

/// GPU-side ordering between acquire, submit and present
pub trait Semaphore: Send + Sync {}
