/// Mock graphics device for unit tests (no GPU required)
///
/// Every object validates the usage rules a real driver would enforce
/// (fence reset while pending, semaphore double signal, render pass ended on
/// the wrong subpass, framebuffer extent mismatch, ...) and returns an error
/// instead of silently accepting misuse. `MockTracker` keeps handles on the
/// shared state so tests can inspect it after the device has been moved.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::device::{
    AccelerationStructure, AcquireOutcome, BindingResource, Buffer, BufferDesc, CommandList,
    DescriptorSet, DescriptorSetLayoutDesc, DeviceCapabilities, Fence, Framebuffer,
    FramebufferDesc, GraphicsDevice, GraphicsPipelineDesc, IndexType, Pipeline,
    PipelineBindPoint, PresentOutcome, PushConstantRange, RayTracingPipelineDesc, Rect2D,
    RenderPass, RenderPassDesc, RenderTarget, Semaphore, Shader, ShaderDesc, ShaderStage,
    ShaderStageFlags, SubmitInfo, Swapchain, Texture, TextureBarrier, TextureDesc, TextureFormat,
    TextureInfo, ClearValue, Viewport, validate_bindings, validate_texture_desc,
};
use crate::error::{Error, Result};

// ============================================================================
// Mock Texture / RenderTarget
// ============================================================================

pub struct MockTexture {
    pub info: TextureInfo,
    live: Arc<AtomicUsize>,
}

impl MockTexture {
    fn new(desc: &TextureDesc, live: Arc<AtomicUsize>) -> Self {
        live.fetch_add(1, Ordering::SeqCst);
        Self { info: TextureInfo::from_desc(desc), live }
    }
}

impl Drop for MockTexture {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Texture for MockTexture {
    fn info(&self) -> &TextureInfo {
        &self.info
    }
}

pub struct MockRenderTarget {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    _texture: Option<Arc<dyn Texture>>,
}

impl RenderTarget for MockRenderTarget {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn format(&self) -> TextureFormat {
        self.format
    }
}

// ============================================================================
// Mock Buffer / Shader / AccelerationStructure
// ============================================================================

pub struct MockBuffer {
    data: Mutex<Vec<u8>>,
}

impl MockBuffer {
    pub fn contents(&self) -> Vec<u8> {
        self.data.lock().unwrap().clone()
    }
}

impl Buffer for MockBuffer {
    fn size(&self) -> u64 {
        self.data.lock().unwrap().len() as u64
    }

    fn update(&self, offset: u64, data: &[u8]) -> Result<()> {
        let mut contents = self.data.lock().unwrap();
        let end = offset as usize + data.len();
        if end > contents.len() {
            return Err(Error::InvalidResource(format!(
                "buffer update {}..{} exceeds size {}",
                offset,
                end,
                contents.len()
            )));
        }
        contents[offset as usize..end].copy_from_slice(data);
        Ok(())
    }
}

pub struct MockShader {
    pub stage: ShaderStage,
}

impl Shader for MockShader {
    fn stage(&self) -> ShaderStage {
        self.stage
    }
}

pub struct MockAccelerationStructure {
    pub address: u64,
}

impl AccelerationStructure for MockAccelerationStructure {
    fn device_address(&self) -> u64 {
        self.address
    }
}

// ============================================================================
// Mock RenderPass / Framebuffer / Pipeline / DescriptorSet
// ============================================================================

pub struct MockRenderPass {
    pub desc: RenderPassDesc,
}

impl RenderPass for MockRenderPass {
    fn attachment_count(&self) -> u32 {
        self.desc.attachments.len() as u32
    }

    fn subpass_count(&self) -> u32 {
        self.desc.subpasses.len() as u32
    }
}

pub struct MockFramebuffer {
    pub width: u32,
    pub height: u32,
}

impl Framebuffer for MockFramebuffer {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }
}

pub struct MockPipeline {
    pub label: &'static str,
    pub bind_point: PipelineBindPoint,
    pub set_layouts: Vec<DescriptorSetLayoutDesc>,
    pub push_constant_ranges: Vec<PushConstantRange>,
}

impl Pipeline for MockPipeline {
    fn bind_point(&self) -> PipelineBindPoint {
        self.bind_point
    }

    fn set_layouts(&self) -> &[DescriptorSetLayoutDesc] {
        &self.set_layouts
    }

    fn push_constant_ranges(&self) -> &[PushConstantRange] {
        &self.push_constant_ranges
    }
}

pub struct MockDescriptorSet {
    pub set_index: u32,
    pub binding_count: u32,
    live: Arc<AtomicUsize>,
}

impl Drop for MockDescriptorSet {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

impl DescriptorSet for MockDescriptorSet {
    fn set_index(&self) -> u32 {
        self.set_index
    }

    fn binding_count(&self) -> u32 {
        self.binding_count
    }
}

// ============================================================================
// Mock Fence / Semaphore
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFenceStatus {
    Signaled,
    Unsignaled,
    /// Submitted, GPU work not yet observed complete
    Pending,
}

#[derive(Debug, Clone)]
pub struct MockFenceState {
    pub id: u64,
    pub status: MockFenceStatus,
    /// Submissions since the last wait
    pub submits_since_wait: u32,
    pub max_submits_since_wait: u32,
    pub waits: u32,
    pub total_submits: u32,
}

pub struct MockFence {
    state: Arc<Mutex<MockFenceState>>,
}

impl MockFence {
    fn from_dyn(fence: &dyn Fence) -> &MockFence {
        // SAFETY: the mock device only ever hands out MockFence objects
        unsafe { &*(fence as *const dyn Fence as *const MockFence) }
    }
}

impl Fence for MockFence {
    /// GPU work completes instantly: waiting on a pending fence signals it.
    /// Waiting on a fence nobody will ever signal is reported as a timeout.
    fn wait(&self, _timeout_ns: u64) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        match state.status {
            MockFenceStatus::Unsignaled => {
                return Err(Error::Timeout(format!("fence {} was reset but never submitted", state.id)));
            }
            MockFenceStatus::Pending | MockFenceStatus::Signaled => {
                state.status = MockFenceStatus::Signaled;
            }
        }
        state.submits_since_wait = 0;
        state.waits += 1;
        Ok(())
    }

    fn reset(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.status == MockFenceStatus::Pending {
            return Err(Error::InvalidState(format!("fence {} reset while pending", state.id)));
        }
        state.status = MockFenceStatus::Unsignaled;
        Ok(())
    }

    fn is_signaled(&self) -> Result<bool> {
        Ok(self.state.lock().unwrap().status == MockFenceStatus::Signaled)
    }
}

pub struct MockSemaphore {
    id: u64,
    signaled: Mutex<bool>,
}

impl MockSemaphore {
    fn from_dyn(semaphore: &dyn Semaphore) -> &MockSemaphore {
        // SAFETY: the mock device only ever hands out MockSemaphore objects
        unsafe { &*(semaphore as *const dyn Semaphore as *const MockSemaphore) }
    }

    fn signal(&self) -> Result<()> {
        let mut signaled = self.signaled.lock().unwrap();
        if *signaled {
            return Err(Error::InvalidState(format!("semaphore {} signaled twice", self.id)));
        }
        *signaled = true;
        Ok(())
    }

    fn consume(&self) -> Result<()> {
        let mut signaled = self.signaled.lock().unwrap();
        if !*signaled {
            return Err(Error::InvalidState(format!("wait on unsignaled semaphore {}", self.id)));
        }
        *signaled = false;
        Ok(())
    }
}

impl Semaphore for MockSemaphore {}

// ============================================================================
// Mock Swapchain
// ============================================================================

/// Outcome injected into the next acquire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedAcquire {
    Suboptimal,
    OutOfDate,
}

#[derive(Debug)]
pub struct MockSwapchainState {
    pub width: u32,
    pub height: u32,
    pub image_count: usize,
    next_image: u32,
    pub acquire_script: VecDeque<ScriptedAcquire>,
    pub present_script: VecDeque<PresentOutcome>,
    /// Image count applied on the next recreate
    pub image_count_after_recreate: Option<usize>,
    pub acquire_count: u32,
    pub recreate_count: u32,
    pub presented: Vec<u32>,
}

pub struct MockSwapchain {
    state: Arc<Mutex<MockSwapchainState>>,
}

impl Swapchain for MockSwapchain {
    fn acquire_next_image(&mut self, signal: &dyn Semaphore, _timeout_ns: u64) -> Result<AcquireOutcome> {
        let mut state = self.state.lock().unwrap();
        state.acquire_count += 1;
        let scripted = state.acquire_script.pop_front();
        if scripted == Some(ScriptedAcquire::OutOfDate) {
            return Ok(AcquireOutcome::OutOfDate);
        }
        let index = state.next_image;
        state.next_image = (index + 1) % state.image_count as u32;
        MockSemaphore::from_dyn(signal).signal()?;
        Ok(match scripted {
            Some(ScriptedAcquire::Suboptimal) => AcquireOutcome::Suboptimal(index),
            _ => AcquireOutcome::Acquired(index),
        })
    }

    fn present(&mut self, image_index: u32, wait: &dyn Semaphore) -> Result<PresentOutcome> {
        let mut state = self.state.lock().unwrap();
        if image_index as usize >= state.image_count {
            return Err(Error::InvalidResource(format!("present of image {}", image_index)));
        }
        MockSemaphore::from_dyn(wait).consume()?;
        state.presented.push(image_index);
        Ok(state.present_script.pop_front().unwrap_or(PresentOutcome::Presented))
    }

    fn recreate(&mut self, width: u32, height: u32) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if width == 0 || height == 0 {
            return Err(Error::InvalidState(format!("swapchain recreate at {}x{}", width, height)));
        }
        state.width = width;
        state.height = height;
        if let Some(count) = state.image_count_after_recreate.take() {
            state.image_count = count;
        }
        state.next_image = 0;
        state.recreate_count += 1;
        Ok(())
    }

    fn image_count(&self) -> usize {
        self.state.lock().unwrap().image_count
    }

    fn width(&self) -> u32 {
        self.state.lock().unwrap().width
    }

    fn height(&self) -> u32 {
        self.state.lock().unwrap().height
    }

    fn format(&self) -> TextureFormat {
        TextureFormat::B8G8R8A8_SRGB
    }

    fn image_target(&self, index: usize) -> Result<Arc<dyn RenderTarget>> {
        let state = self.state.lock().unwrap();
        if index >= state.image_count {
            return Err(Error::InvalidResource(format!("swapchain image {} of {}", index, state.image_count)));
        }
        Ok(Arc::new(MockRenderTarget {
            width: state.width,
            height: state.height,
            format: TextureFormat::B8G8R8A8_SRGB,
            _texture: None,
        }))
    }
}

// ============================================================================
// Mock CommandList
// ============================================================================

pub struct MockCommandList {
    log: Arc<Mutex<Vec<String>>>,
    recording: bool,
    in_render_pass: bool,
    subpass: u32,
    subpass_count: u32,
}

impl MockCommandList {
    fn record(&self, command: String) {
        self.log.lock().unwrap().push(command);
    }

    fn require_recording(&self, what: &str) -> Result<()> {
        if !self.recording {
            return Err(Error::InvalidState(format!("{} while not recording", what)));
        }
        Ok(())
    }

    fn require_outside_render_pass(&self, what: &str) -> Result<()> {
        self.require_recording(what)?;
        if self.in_render_pass {
            return Err(Error::InvalidState(format!("{} inside a render pass", what)));
        }
        Ok(())
    }
}

impl CommandList for MockCommandList {
    fn reset(&mut self) -> Result<()> {
        if self.recording {
            return Err(Error::InvalidState("command pool reset while recording".to_string()));
        }
        Ok(())
    }

    fn begin(&mut self) -> Result<()> {
        if self.recording {
            return Err(Error::InvalidState("begin while already recording".to_string()));
        }
        self.recording = true;
        self.record("begin".to_string());
        Ok(())
    }

    fn end(&mut self) -> Result<()> {
        self.require_outside_render_pass("end")?;
        self.recording = false;
        self.record("end".to_string());
        Ok(())
    }

    fn is_recording(&self) -> bool {
        self.recording
    }

    fn begin_render_pass(
        &mut self,
        render_pass: &Arc<dyn RenderPass>,
        framebuffer: &Arc<dyn Framebuffer>,
        clear_values: &[ClearValue],
    ) -> Result<()> {
        self.require_outside_render_pass("begin_render_pass")?;
        if clear_values.len() != render_pass.attachment_count() as usize {
            return Err(Error::InvalidState(format!(
                "{} clear values for {} attachments",
                clear_values.len(),
                render_pass.attachment_count()
            )));
        }
        self.in_render_pass = true;
        self.subpass = 0;
        self.subpass_count = render_pass.subpass_count();
        self.record(format!("begin_render_pass {}x{}", framebuffer.width(), framebuffer.height()));
        Ok(())
    }

    fn next_subpass(&mut self) -> Result<()> {
        if !self.in_render_pass {
            return Err(Error::InvalidState("next_subpass outside a render pass".to_string()));
        }
        if self.subpass + 1 >= self.subpass_count {
            return Err(Error::InvalidState(format!("no subpass after {}", self.subpass)));
        }
        self.subpass += 1;
        self.record(format!("next_subpass {}", self.subpass));
        Ok(())
    }

    fn end_render_pass(&mut self) -> Result<()> {
        if !self.in_render_pass {
            return Err(Error::InvalidState("end_render_pass outside a render pass".to_string()));
        }
        if self.subpass + 1 != self.subpass_count {
            return Err(Error::InvalidState(format!(
                "render pass ended on subpass {} of {}",
                self.subpass, self.subpass_count
            )));
        }
        self.in_render_pass = false;
        self.record("end_render_pass".to_string());
        Ok(())
    }

    fn set_viewport(&mut self, viewport: Viewport) -> Result<()> {
        self.require_recording("set_viewport")?;
        self.record(format!("set_viewport {}x{}", viewport.width, viewport.height));
        Ok(())
    }

    fn set_scissor(&mut self, scissor: Rect2D) -> Result<()> {
        self.require_recording("set_scissor")?;
        self.record(format!("set_scissor {}x{}", scissor.width, scissor.height));
        Ok(())
    }

    fn bind_pipeline(&mut self, pipeline: &Arc<dyn Pipeline>) -> Result<()> {
        self.require_recording("bind_pipeline")?;
        if pipeline.bind_point() == PipelineBindPoint::RayTracing && self.in_render_pass {
            return Err(Error::InvalidState("ray tracing pipeline bound inside a render pass".to_string()));
        }
        self.record("bind_pipeline".to_string());
        Ok(())
    }

    fn bind_descriptor_set(
        &mut self,
        pipeline: &Arc<dyn Pipeline>,
        set_index: u32,
        set: &Arc<dyn DescriptorSet>,
    ) -> Result<()> {
        self.require_recording("bind_descriptor_set")?;
        if set.set_index() != set_index || set_index as usize >= pipeline.set_layouts().len() {
            return Err(Error::InvalidState(format!("descriptor set bound at wrong index {}", set_index)));
        }
        self.record(format!("bind_descriptor_set {}", set_index));
        Ok(())
    }

    fn push_constants(&mut self, stages: ShaderStageFlags, offset: u32, data: &[u8]) -> Result<()> {
        self.require_recording("push_constants")?;
        self.record(format!("push_constants {:?} {}+{}", stages, offset, data.len()));
        Ok(())
    }

    fn bind_vertex_buffer(&mut self, _buffer: &Arc<dyn Buffer>, _offset: u64) -> Result<()> {
        self.require_recording("bind_vertex_buffer")?;
        self.record("bind_vertex_buffer".to_string());
        Ok(())
    }

    fn bind_index_buffer(&mut self, _buffer: &Arc<dyn Buffer>, _offset: u64, _index_type: IndexType) -> Result<()> {
        self.require_recording("bind_index_buffer")?;
        self.record("bind_index_buffer".to_string());
        Ok(())
    }

    fn draw(&mut self, vertex_count: u32, _first_vertex: u32) -> Result<()> {
        self.require_recording("draw")?;
        if !self.in_render_pass {
            return Err(Error::InvalidState("draw outside a render pass".to_string()));
        }
        self.record(format!("draw {}", vertex_count));
        Ok(())
    }

    fn draw_indexed(&mut self, index_count: u32, _first_index: u32, _vertex_offset: i32) -> Result<()> {
        self.require_recording("draw_indexed")?;
        if !self.in_render_pass {
            return Err(Error::InvalidState("draw_indexed outside a render pass".to_string()));
        }
        self.record(format!("draw_indexed {}", index_count));
        Ok(())
    }

    fn trace_rays(&mut self, pipeline: &Arc<dyn Pipeline>, width: u32, height: u32) -> Result<()> {
        self.require_outside_render_pass("trace_rays")?;
        if pipeline.bind_point() != PipelineBindPoint::RayTracing {
            return Err(Error::InvalidState("trace_rays with a graphics pipeline".to_string()));
        }
        self.record(format!("trace_rays {}x{}", width, height));
        Ok(())
    }

    fn texture_barrier(&mut self, texture: &dyn Texture, barrier: TextureBarrier) -> Result<()> {
        self.require_outside_render_pass("texture_barrier")?;
        self.record(format!(
            "texture_barrier {} {:?}->{:?}",
            texture.info().label,
            barrier.old_layout,
            barrier.new_layout
        ));
        Ok(())
    }
}

// ============================================================================
// Mock GraphicsDevice
// ============================================================================

/// One recorded queue submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockSubmission {
    pub command_list_count: usize,
    pub wait_count: usize,
    pub signal_count: usize,
    pub fence_id: Option<u64>,
}

/// Shared views on the mock device state, usable after the device is moved
#[derive(Clone)]
pub struct MockTracker {
    pub live_textures: Arc<AtomicUsize>,
    pub created_textures: Arc<Mutex<Vec<&'static str>>>,
    /// Pipeline labels in creation order
    pub created_pipelines: Arc<Mutex<Vec<&'static str>>>,
    pub commands: Arc<Mutex<Vec<String>>>,
    pub submissions: Arc<Mutex<Vec<MockSubmission>>>,
    pub fences: Arc<Mutex<Vec<Arc<Mutex<MockFenceState>>>>>,
    pub swapchain: Arc<Mutex<MockSwapchainState>>,
    pub framebuffers_created: Arc<AtomicUsize>,
    pub descriptor_sets_created: Arc<AtomicUsize>,
    pub live_descriptor_sets: Arc<AtomicUsize>,
    pub wait_idle_count: Arc<AtomicUsize>,
    /// Submissions still to fail with `DeviceLost`
    pub failing_submits: Arc<AtomicUsize>,
}

impl MockTracker {
    pub fn live_texture_count(&self) -> usize {
        self.live_textures.load(Ordering::SeqCst)
    }

    pub fn live_descriptor_set_count(&self) -> usize {
        self.live_descriptor_sets.load(Ordering::SeqCst)
    }

    pub fn submission_count(&self) -> usize {
        self.submissions.lock().unwrap().len()
    }

    pub fn fence_states(&self) -> Vec<MockFenceState> {
        self.fences.lock().unwrap().iter().map(|f| f.lock().unwrap().clone()).collect()
    }

    pub fn take_commands(&self) -> Vec<String> {
        std::mem::take(&mut *self.commands.lock().unwrap())
    }

    /// Count of recorded commands starting with `prefix`
    pub fn count_commands(&self, prefix: &str) -> usize {
        self.commands.lock().unwrap().iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub fn recreate_count(&self) -> u32 {
        self.swapchain.lock().unwrap().recreate_count
    }

    pub fn script_acquire(&self, outcome: ScriptedAcquire) {
        self.swapchain.lock().unwrap().acquire_script.push_back(outcome);
    }

    /// Make the next `count` queue submissions fail
    pub fn fail_submits(&self, count: usize) {
        self.failing_submits.store(count, Ordering::SeqCst);
    }

    pub fn script_present(&self, outcome: PresentOutcome) {
        self.swapchain.lock().unwrap().present_script.push_back(outcome);
    }
}

/// Mock device tracking created resources and submissions without a GPU
pub struct MockGraphicsDevice {
    pub capabilities: DeviceCapabilities,
    tracker: MockTracker,
    next_id: AtomicU64,
}

impl MockGraphicsDevice {
    /// Device whose swapchain has 3 images of 800x600
    pub fn new() -> Self {
        Self::with_swapchain(3, 800, 600)
    }

    pub fn with_swapchain(image_count: usize, width: u32, height: u32) -> Self {
        Self {
            capabilities: DeviceCapabilities {
                ray_tracing: false,
                max_image_dimension_2d: 16384,
                max_push_constants_size: 128,
            },
            tracker: MockTracker {
                live_textures: Arc::new(AtomicUsize::new(0)),
                created_textures: Arc::new(Mutex::new(Vec::new())),
                created_pipelines: Arc::new(Mutex::new(Vec::new())),
                commands: Arc::new(Mutex::new(Vec::new())),
                submissions: Arc::new(Mutex::new(Vec::new())),
                fences: Arc::new(Mutex::new(Vec::new())),
                swapchain: Arc::new(Mutex::new(MockSwapchainState {
                    width,
                    height,
                    image_count,
                    next_image: 0,
                    acquire_script: VecDeque::new(),
                    present_script: VecDeque::new(),
                    image_count_after_recreate: None,
                    acquire_count: 0,
                    recreate_count: 0,
                    presented: Vec::new(),
                })),
                framebuffers_created: Arc::new(AtomicUsize::new(0)),
                descriptor_sets_created: Arc::new(AtomicUsize::new(0)),
                live_descriptor_sets: Arc::new(AtomicUsize::new(0)),
                wait_idle_count: Arc::new(AtomicUsize::new(0)),
                failing_submits: Arc::new(AtomicUsize::new(0)),
            },
            next_id: AtomicU64::new(1),
        }
    }

    pub fn with_ray_tracing(mut self) -> Self {
        self.capabilities.ray_tracing = true;
        self
    }

    pub fn tracker(&self) -> MockTracker {
        self.tracker.clone()
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

impl GraphicsDevice for MockGraphicsDevice {
    fn capabilities(&self) -> DeviceCapabilities {
        self.capabilities
    }

    fn create_texture(&self, desc: TextureDesc) -> Result<Arc<dyn Texture>> {
        validate_texture_desc(&desc)?;
        self.tracker.created_textures.lock().unwrap().push(desc.label);
        Ok(Arc::new(MockTexture::new(&desc, self.tracker.live_textures.clone())))
    }

    fn create_render_target(
        &self,
        texture: &Arc<dyn Texture>,
        layer: u32,
        mip_level: u32,
    ) -> Result<Arc<dyn RenderTarget>> {
        let info = texture.info();
        if !info.usage.is_attachment() {
            return Err(Error::InvalidResource(format!(
                "texture '{}' has no attachment usage ({:?})",
                info.label, info.usage
            )));
        }
        if layer >= info.array_layers || mip_level >= info.mip_levels {
            return Err(Error::InvalidResource(format!(
                "render target layer {} mip {} out of range for '{}'",
                layer, mip_level, info.label
            )));
        }
        Ok(Arc::new(MockRenderTarget {
            width: (info.width >> mip_level).max(1),
            height: (info.height >> mip_level).max(1),
            format: info.format,
            _texture: Some(texture.clone()),
        }))
    }

    fn create_buffer(&self, desc: BufferDesc) -> Result<Arc<dyn Buffer>> {
        if desc.size == 0 {
            return Err(Error::InvalidResource(format!("buffer '{}' has zero size", desc.label)));
        }
        Ok(Arc::new(MockBuffer { data: Mutex::new(vec![0; desc.size as usize]) }))
    }

    fn create_shader(&self, desc: ShaderDesc) -> Result<Arc<dyn Shader>> {
        if desc.code.is_empty() {
            return Err(Error::InvalidResource(format!("empty {:?} shader", desc.stage)));
        }
        Ok(Arc::new(MockShader { stage: desc.stage }))
    }

    fn create_render_pass(&self, desc: &RenderPassDesc) -> Result<Arc<dyn RenderPass>> {
        if desc.subpasses.is_empty() {
            return Err(Error::InvalidResource("render pass without subpasses".to_string()));
        }
        Ok(Arc::new(MockRenderPass { desc: desc.clone() }))
    }

    fn create_framebuffer(&self, desc: &FramebufferDesc) -> Result<Arc<dyn Framebuffer>> {
        if desc.attachments.len() != desc.render_pass.attachment_count() as usize {
            return Err(Error::InvalidResource(format!(
                "framebuffer has {} attachments, render pass expects {}",
                desc.attachments.len(),
                desc.render_pass.attachment_count()
            )));
        }
        for (index, target) in desc.attachments.iter().enumerate() {
            if target.width() != desc.width || target.height() != desc.height {
                return Err(Error::InvalidResource(format!(
                    "framebuffer attachment {} is {}x{}, framebuffer is {}x{}",
                    index,
                    target.width(),
                    target.height(),
                    desc.width,
                    desc.height
                )));
            }
        }
        self.tracker.framebuffers_created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockFramebuffer { width: desc.width, height: desc.height }))
    }

    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc) -> Result<Arc<dyn Pipeline>> {
        if desc.subpass >= desc.render_pass.subpass_count() {
            return Err(Error::InvalidResource(format!(
                "pipeline '{}' targets subpass {} of {}",
                desc.label,
                desc.subpass,
                desc.render_pass.subpass_count()
            )));
        }
        if desc.vertex_shader.stage() != ShaderStage::Vertex
            || desc.fragment_shader.is_some_and(|s| s.stage() != ShaderStage::Fragment)
        {
            return Err(Error::InvalidResource(format!("pipeline '{}' has mismatched shader stages", desc.label)));
        }
        self.tracker.created_pipelines.lock().unwrap().push(desc.label);
        Ok(Arc::new(MockPipeline {
            label: desc.label,
            bind_point: PipelineBindPoint::Graphics,
            set_layouts: desc.set_layouts.clone(),
            push_constant_ranges: desc.push_constant_ranges.clone(),
        }))
    }

    fn create_ray_tracing_pipeline(&self, desc: &RayTracingPipelineDesc) -> Result<Arc<dyn Pipeline>> {
        if !self.capabilities.ray_tracing {
            return Err(Error::Unsupported("ray tracing pipelines".to_string()));
        }
        self.tracker.created_pipelines.lock().unwrap().push(desc.label);
        Ok(Arc::new(MockPipeline {
            label: desc.label,
            bind_point: PipelineBindPoint::RayTracing,
            set_layouts: desc.set_layouts.clone(),
            push_constant_ranges: desc.push_constant_ranges.clone(),
        }))
    }

    fn create_descriptor_set(
        &self,
        pipeline: &Arc<dyn Pipeline>,
        set_index: u32,
        resources: &[BindingResource],
    ) -> Result<Arc<dyn DescriptorSet>> {
        let layout = pipeline.set_layouts().get(set_index as usize).ok_or_else(|| {
            Error::InvalidResource(format!("pipeline has no descriptor set {}", set_index))
        })?;
        validate_bindings(layout, resources)?;
        self.tracker.descriptor_sets_created.fetch_add(1, Ordering::SeqCst);
        self.tracker.live_descriptor_sets.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockDescriptorSet {
            set_index,
            binding_count: resources.len() as u32,
            live: Arc::clone(&self.tracker.live_descriptor_sets),
        }))
    }

    fn create_command_list(&self) -> Result<Box<dyn CommandList>> {
        Ok(Box::new(MockCommandList {
            log: self.tracker.commands.clone(),
            recording: false,
            in_render_pass: false,
            subpass: 0,
            subpass_count: 0,
        }))
    }

    fn create_fence(&self, signaled: bool) -> Result<Box<dyn Fence>> {
        let state = Arc::new(Mutex::new(MockFenceState {
            id: self.next_id(),
            status: if signaled { MockFenceStatus::Signaled } else { MockFenceStatus::Unsignaled },
            submits_since_wait: 0,
            max_submits_since_wait: 0,
            waits: 0,
            total_submits: 0,
        }));
        self.tracker.fences.lock().unwrap().push(state.clone());
        Ok(Box::new(MockFence { state }))
    }

    fn create_semaphore(&self) -> Result<Box<dyn Semaphore>> {
        Ok(Box::new(MockSemaphore { id: self.next_id(), signaled: Mutex::new(false) }))
    }

    fn create_swapchain(&self, width: u32, height: u32) -> Result<Box<dyn Swapchain>> {
        {
            let mut state = self.tracker.swapchain.lock().unwrap();
            state.width = width;
            state.height = height;
        }
        Ok(Box::new(MockSwapchain { state: self.tracker.swapchain.clone() }))
    }

    fn submit(&self, info: &SubmitInfo) -> Result<()> {
        let failing = &self.tracker.failing_submits;
        if failing.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok() {
            return Err(Error::DeviceLost("queue submission failed".to_string()));
        }
        for list in info.command_lists {
            if list.is_recording() {
                return Err(Error::InvalidState("submitted command list is still recording".to_string()));
            }
        }
        for (semaphore, _) in info.wait_semaphores {
            MockSemaphore::from_dyn(*semaphore).consume()?;
        }
        for semaphore in info.signal_semaphores {
            MockSemaphore::from_dyn(*semaphore).signal()?;
        }
        let fence_id = match info.fence {
            Some(fence) => {
                let mock = MockFence::from_dyn(fence);
                let mut state = mock.state.lock().unwrap();
                if state.status != MockFenceStatus::Unsignaled {
                    return Err(Error::InvalidState(format!(
                        "fence {} submitted in state {:?}",
                        state.id, state.status
                    )));
                }
                state.status = MockFenceStatus::Pending;
                state.submits_since_wait += 1;
                state.total_submits += 1;
                state.max_submits_since_wait = state.max_submits_since_wait.max(state.submits_since_wait);
                Some(state.id)
            }
            None => None,
        };
        self.tracker.submissions.lock().unwrap().push(MockSubmission {
            command_list_count: info.command_lists.len(),
            wait_count: info.wait_semaphores.len(),
            signal_count: info.signal_semaphores.len(),
            fence_id,
        });
        Ok(())
    }

    fn wait_idle(&self) -> Result<()> {
        for fence in self.tracker.fences.lock().unwrap().iter() {
            let mut state = fence.lock().unwrap();
            if state.status == MockFenceStatus::Pending {
                state.status = MockFenceStatus::Signaled;
            }
        }
        self.tracker.wait_idle_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
#[path = "mock_graphics_device_tests.rs"]
mod tests;
