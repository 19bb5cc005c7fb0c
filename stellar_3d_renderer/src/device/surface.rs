/// Window surface provider

use winit::window::Window;

/// Supplies the current drawable extent of the presentation surface
///
/// Queried only when the swapchain is (re)created.
pub trait SurfaceProvider {
    /// Current size in pixels; (0, 0) while minimized
    fn window_size(&self) -> (u32, u32);
}

impl SurfaceProvider for Window {
    fn window_size(&self) -> (u32, u32) {
        let size = self.inner_size();
        (size.width, size.height)
    }
}
