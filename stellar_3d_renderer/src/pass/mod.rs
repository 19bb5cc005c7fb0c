//! Passes of the deferred pipeline
//!
//! Each pass owns its pipelines and descriptor sets and implements `Pass`.
//! Passes that draw in a subpass of the main render pass are sequenced by
//! `MainCameraPass`; shadow passes record their own render passes (or ray
//! dispatches) before it.

#[allow(clippy::module_inception)]
mod pass;
mod scene;
mod uniforms;
mod cascade_schedule;
pub mod cascade_math;
mod gbuffer_pass;
mod cascade_shadow_map_pass;
mod ssao_pass;
mod pbr_ibl_pass;
mod shading_pass;
mod ui_overlay_pass;
mod ray_tracing_pass;

pub use pass::{FrameData, FullscreenPipelineDesc, Pass, PassGraphContext, PassRecorder, SharedPassResources};
pub(crate) use pass::not_initialized;
pub use scene::{
    CameraData, DirectionalLight, GeometryPurpose, GeometryRequest, SceneProvider, SceneResources, ShaderLibrary,
    ShaderProgram, UiOverlay,
};
pub use uniforms::{CascadeUniforms, FrameUniforms, SsaoUniforms};
pub use cascade_schedule::CascadeSchedule;
pub use gbuffer_pass::{GBufferPass, GBUFFER_PUSH_CONSTANT_SIZE};
pub use cascade_shadow_map_pass::CascadeShadowMapPass;
pub use ssao_pass::{halton, ssao_kernel, SsaoPass};
pub use pbr_ibl_pass::PbrIblPass;
pub use shading_pass::ShadingPass;
pub use ui_overlay_pass::UiOverlayPass;
pub use ray_tracing_pass::RayTracingPass;

// Scene, shader library and overlay doubles for tests
#[cfg(test)]
pub mod mock_scene;
