/// Graphics device module - backend-agnostic GPU traits and descriptors

pub mod graphics_device;
pub mod texture;
pub mod buffer;
pub mod shader;
pub mod pipeline;
pub mod render_pass;
pub mod framebuffer;
pub mod descriptor_set;
pub mod command_list;
pub mod sync;
pub mod swapchain;
pub mod surface;

pub use graphics_device::*;
pub use texture::*;
pub use buffer::*;
pub use shader::*;
pub use pipeline::*;
pub use render_pass::*;
pub use framebuffer::*;
pub use descriptor_set::*;
pub use command_list::*;
pub use sync::*;
pub use swapchain::*;
pub use surface::*;

// Mock graphics device for tests (no GPU required)
#[cfg(test)]
pub mod mock_graphics_device;
