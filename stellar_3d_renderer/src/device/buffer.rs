/// Buffer trait and buffer descriptor

use bitflags::bitflags;
use crate::error::Result;

bitflags! {
    /// How a buffer may be used by the GPU
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        const UNIFORM = 1 << 0;
        const STORAGE = 1 << 1;
        const VERTEX = 1 << 2;
        const INDEX = 1 << 3;
        const TRANSFER_SRC = 1 << 4;
        const TRANSFER_DST = 1 << 5;
        /// Buffer address is queried (shader binding tables, acceleration structures)
        const DEVICE_ADDRESS = 1 << 6;
    }
}

/// Descriptor for creating a buffer
///
/// Buffers are host-visible and persistently mapped; `update` writes
/// through the mapping.
#[derive(Debug, Clone)]
pub struct BufferDesc {
    pub label: &'static str,
    /// Size in bytes
    pub size: u64,
    pub usage: BufferUsage,
}

/// Buffer resource trait
pub trait Buffer: Send + Sync {
    /// Size in bytes
    fn size(&self) -> u64;

    /// Write `data` at `offset` bytes into the buffer
    ///
    /// Fails if `offset + data.len()` exceeds the buffer size.
    fn update(&self, offset: u64, data: &[u8]) -> Result<()>;
}
