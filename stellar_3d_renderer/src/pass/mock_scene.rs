/// Test doubles for the collaborators outside the renderer: scene, shader
/// library, UI overlay and window surface

use std::cell::{Cell, RefCell};
use std::sync::{Arc, Mutex};
use glam::{Mat4, Vec3};

use crate::device::mock_graphics_device::MockAccelerationStructure;
use crate::device::{
    CommandList, GraphicsDevice, RenderPass, ShaderStage, SurfaceProvider, TextureDesc, TextureFormat,
    TextureType, TextureUsage, VertexAttribute, VertexBinding, VertexInputRate, VertexLayout,
};
use crate::error::{Error, Result};
use crate::pass::{
    CameraData, DirectionalLight, GeometryPurpose, GeometryRequest, SceneProvider, SceneResources,
    ShaderLibrary, ShaderProgram, UiOverlay,
};

/// SPIR-V magic number plus a few filler words
static FAKE_SPIRV: [u32; 5] = [0x0723_0203, 0x0001_0500, 0, 16, 0];

// ============================================================================
// Shader library
// ============================================================================

#[derive(Default)]
pub struct MockShaderLibrary {
    missing: Vec<ShaderProgram>,
}

impl MockShaderLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Library that has no bytecode for `program`
    pub fn without(program: ShaderProgram) -> Self {
        Self { missing: vec![program] }
    }
}

impl ShaderLibrary for MockShaderLibrary {
    fn spirv(&self, program: ShaderProgram, _stage: ShaderStage) -> Option<&[u32]> {
        if self.missing.contains(&program) {
            None
        } else {
            Some(&FAKE_SPIRV)
        }
    }
}

// ============================================================================
// Scene
// ============================================================================

pub fn test_camera() -> CameraData {
    let position = Vec3::new(0.0, 2.0, 5.0);
    CameraData {
        view: Mat4::look_at_rh(position, Vec3::ZERO, Vec3::Y),
        projection: Mat4::perspective_rh(60f32.to_radians(), 4.0 / 3.0, 0.1, 100.0),
        position,
        near: 0.1,
        far: 100.0,
    }
}

/// One mesh of 36 indices, drawn once per geometry request
pub struct MockScene {
    pub camera: CameraData,
    pub light: DirectionalLight,
    pub draws: RefCell<Vec<GeometryPurpose>>,
}

impl MockScene {
    pub fn new() -> Self {
        Self {
            camera: test_camera(),
            light: DirectionalLight::default(),
            draws: RefCell::new(Vec::new()),
        }
    }

    pub fn take_draws(&self) -> Vec<GeometryPurpose> {
        std::mem::take(&mut *self.draws.borrow_mut())
    }
}

impl SceneProvider for MockScene {
    fn camera(&self) -> CameraData {
        self.camera
    }

    fn directional_light(&self) -> DirectionalLight {
        self.light
    }

    fn draw_geometry(&self, cmd: &mut dyn CommandList, request: &GeometryRequest) -> Result<()> {
        cmd.push_constants(request.push_constant_stages, 0, &[0u8; 64])?;
        cmd.draw_indexed(36, 0, 0)?;
        self.draws.borrow_mut().push(request.purpose);
        Ok(())
    }
}

pub fn mesh_vertex_layout() -> VertexLayout {
    VertexLayout {
        bindings: vec![VertexBinding { binding: 0, stride: 32, input_rate: VertexInputRate::Vertex }],
        attributes: vec![
            VertexAttribute { location: 0, binding: 0, format: TextureFormat::R32G32B32_SFLOAT, offset: 0 },
            VertexAttribute { location: 1, binding: 0, format: TextureFormat::R32G32B32_SFLOAT, offset: 12 },
            VertexAttribute { location: 2, binding: 0, format: TextureFormat::R32G32_SFLOAT, offset: 24 },
        ],
    }
}

/// Environment cube (and a TLAS when `with_tlas`) created on `device`
pub fn scene_resources(device: &dyn GraphicsDevice, with_tlas: bool) -> SceneResources {
    let mut desc = TextureDesc::new_2d("environment", 16, 16, TextureFormat::R16G16B16A16_SFLOAT, TextureUsage::SAMPLED);
    desc.texture_type = TextureType::Cube;
    desc.array_layers = 6;
    SceneResources {
        environment_map: device.create_texture(desc).unwrap(),
        vertex_layout: mesh_vertex_layout(),
        acceleration_structure: if with_tlas {
            Some(Arc::new(MockAccelerationStructure { address: 0x1000 }))
        } else {
            None
        },
    }
}

// ============================================================================
// UI overlay
// ============================================================================

#[derive(Debug, Default, Clone)]
pub struct MockUiState {
    pub initialized: u32,
    pub subpass: Option<u32>,
    pub records: u32,
    pub cleaned: u32,
}

/// Overlay drawing one triangle list; `fail_init` makes initialize fail
pub struct MockUiOverlay {
    pub state: Arc<Mutex<MockUiState>>,
    pub fail_init: bool,
}

impl MockUiOverlay {
    pub fn new() -> (Self, Arc<Mutex<MockUiState>>) {
        let state = Arc::new(Mutex::new(MockUiState::default()));
        (Self { state: state.clone(), fail_init: false }, state)
    }
}

impl UiOverlay for MockUiOverlay {
    fn initialize(&mut self, _device: &dyn GraphicsDevice, render_pass: &Arc<dyn RenderPass>, subpass: u32) -> Result<()> {
        if self.fail_init {
            return Err(Error::InitializationFailed("ui overlay".to_string()));
        }
        if subpass >= render_pass.subpass_count() {
            return Err(Error::InvalidResource(format!("ui overlay subpass {}", subpass)));
        }
        let mut state = self.state.lock().unwrap();
        state.initialized += 1;
        state.subpass = Some(subpass);
        Ok(())
    }

    fn record(&mut self, cmd: &mut dyn CommandList, _subpass: u32) -> Result<bool> {
        cmd.draw(6, 0)?;
        let mut state = self.state.lock().unwrap();
        state.records += 1;
        Ok(state.records == 1)
    }

    fn clean(&mut self) {
        self.state.lock().unwrap().cleaned += 1;
    }
}

// ============================================================================
// Surface
// ============================================================================

pub struct MockSurface {
    size: Cell<(u32, u32)>,
}

impl MockSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self { size: Cell::new((width, height)) }
    }

    pub fn resize(&self, width: u32, height: u32) {
        self.size.set((width, height));
    }
}

impl SurfaceProvider for MockSurface {
    fn window_size(&self) -> (u32, u32) {
        self.size.get()
    }
}
