/// GraphicsDevice trait - factory for GPU resources and queue submission

use std::sync::Arc;
use crate::error::Result;
use crate::device::{
    BindingResource, Buffer, BufferDesc, CommandList, DescriptorSet, Fence, Framebuffer,
    FramebufferDesc, GraphicsPipelineDesc, Pipeline, PipelineStages, RayTracingPipelineDesc,
    RenderPass, RenderPassDesc, RenderTarget, Semaphore, Shader, ShaderDesc, Swapchain, Texture,
    TextureDesc,
};

/// Optional features and limits of the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceCapabilities {
    /// Ray tracing pipelines and acceleration structures are available
    pub ray_tracing: bool,
    pub max_image_dimension_2d: u32,
    pub max_push_constants_size: u32,
}

/// One queue submission
///
/// An empty `command_lists` slice is valid: it only threads semaphores and
/// the fence through the queue.
pub struct SubmitInfo<'a> {
    pub command_lists: &'a [&'a dyn CommandList],
    /// Semaphores to wait on, each with the stage that waits
    pub wait_semaphores: &'a [(&'a dyn Semaphore, PipelineStages)],
    pub signal_semaphores: &'a [&'a dyn Semaphore],
    /// Signaled when the submission completes
    pub fence: Option<&'a dyn Fence>,
}

/// Graphics device trait
///
/// Implemented by backend devices (e.g. `VulkanGraphicsDevice`). The device
/// owns the presentation surface it was created for.
pub trait GraphicsDevice: Send + Sync {
    fn capabilities(&self) -> DeviceCapabilities;

    fn create_texture(&self, desc: TextureDesc) -> Result<Arc<dyn Texture>>;

    /// View on one layer and mip of `texture`, usable as framebuffer attachment
    fn create_render_target(
        &self,
        texture: &Arc<dyn Texture>,
        layer: u32,
        mip_level: u32,
    ) -> Result<Arc<dyn RenderTarget>>;

    fn create_buffer(&self, desc: BufferDesc) -> Result<Arc<dyn Buffer>>;

    fn create_shader(&self, desc: ShaderDesc) -> Result<Arc<dyn Shader>>;

    fn create_render_pass(&self, desc: &RenderPassDesc) -> Result<Arc<dyn RenderPass>>;

    fn create_framebuffer(&self, desc: &FramebufferDesc) -> Result<Arc<dyn Framebuffer>>;

    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc) -> Result<Arc<dyn Pipeline>>;

    fn create_ray_tracing_pipeline(&self, desc: &RayTracingPipelineDesc) -> Result<Arc<dyn Pipeline>>;

    /// Allocate and write a descriptor set for `set_index` of `pipeline`'s layout
    ///
    /// `resources[i]` is bound at binding `i`; a count or type mismatch
    /// with the layout is rejected.
    fn create_descriptor_set(
        &self,
        pipeline: &Arc<dyn Pipeline>,
        set_index: u32,
        resources: &[BindingResource],
    ) -> Result<Arc<dyn DescriptorSet>>;

    /// Command list with its own command pool
    fn create_command_list(&self) -> Result<Box<dyn CommandList>>;

    fn create_fence(&self, signaled: bool) -> Result<Box<dyn Fence>>;

    fn create_semaphore(&self) -> Result<Box<dyn Semaphore>>;

    /// Swapchain on the device's surface
    fn create_swapchain(&self, width: u32, height: u32) -> Result<Box<dyn Swapchain>>;

    fn submit(&self, info: &SubmitInfo) -> Result<()>;

    /// Wait for all GPU work to complete
    fn wait_idle(&self) -> Result<()>;
}
