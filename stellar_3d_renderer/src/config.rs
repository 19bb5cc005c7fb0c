//! Renderer configuration
//!
//! Compile-time constants bounding the frame pipeline plus the runtime
//! `Config` consumed by the device backend and the render graph.

use crate::error::{Error, Result};

/// Number of frame slots the CPU may record ahead of the GPU
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// Upper bound on shadow cascades (size of the cascade uniform array)
pub const MAX_CASCADES: usize = 8;

/// Hemisphere samples used by the SSAO pass
pub const SSAO_KERNEL_SIZE: usize = 32;

/// Edge length of each face of the irradiance cube
pub const IRRADIANCE_CUBE_SIZE: u32 = 64;

/// Edge length of the BRDF integration lookup table
pub const BRDF_LUT_SIZE: u32 = 512;

/// Validation layer message severity filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugSeverity {
    ErrorsOnly,
    ErrorsAndWarnings,
    All,
}

/// Where validation messages are written
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebugOutput {
    Console,
    File(String),
    Both(String),
}

/// Validation message categories to display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugMessageFilter {
    pub show_general: bool,
    pub show_validation: bool,
    pub show_performance: bool,
}

impl Default for DebugMessageFilter {
    fn default() -> Self {
        Self {
            show_general: true,
            show_validation: true,
            show_performance: true,
        }
    }
}

/// Validation message counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidationStats {
    pub errors: u32,
    pub warnings: u32,
    pub info: u32,
    pub verbose: u32,
}

impl ValidationStats {
    pub fn total(&self) -> u32 {
        self.errors + self.warnings + self.info + self.verbose
    }
}

/// Mutually exclusive shadowing pipelines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineVariant {
    /// Cascaded shadow maps rendered by rasterization
    #[default]
    Deferred,
    /// Shadow visibility traced against a top-level acceleration structure
    RayTraced,
}

/// Cascaded shadow map parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowConfig {
    /// Number of cascades (1..=MAX_CASCADES)
    pub cascade_count: u32,
    /// Cascades below this index refresh every frame; the rest are staggered
    pub min_cascade: u32,
    /// Blend between logarithmic (1.0) and uniform (0.0) split distribution
    pub split_lambda: f32,
    /// Edge length of each cascade layer, in texels
    pub map_size: u32,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            cascade_count: 4,
            min_cascade: 2,
            split_lambda: 0.95,
            map_size: 2048,
        }
    }
}

/// Screen-space ambient occlusion parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SsaoConfig {
    pub radius: f32,
    pub bias: f32,
    pub intensity: f32,
}

impl Default for SsaoConfig {
    fn default() -> Self {
        Self {
            radius: 0.5,
            bias: 0.025,
            intensity: 1.0,
        }
    }
}

/// Renderer configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Enable Vulkan validation layers
    pub enable_validation: bool,
    pub app_name: String,
    pub app_version: (u32, u32, u32),
    pub debug_severity: DebugSeverity,
    pub debug_output: DebugOutput,
    pub debug_message_filter: DebugMessageFilter,
    /// Abort the process on the first validation error
    pub break_on_validation_error: bool,
    /// Panic on the first validation error
    pub panic_on_error: bool,
    pub enable_validation_stats: bool,

    pub pipeline_variant: PipelineVariant,
    pub shadow: ShadowConfig,
    pub ssao: SsaoConfig,
    /// Clear color of the swapchain image (linear RGBA)
    pub clear_color: [f32; 4],
    pub exposure: f32,
    /// Upper bound on every fence wait, in nanoseconds (u64::MAX waits forever)
    pub fence_timeout_ns: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enable_validation: cfg!(debug_assertions),
            app_name: "Stellar3D Application".to_string(),
            app_version: (1, 0, 0),
            debug_severity: DebugSeverity::ErrorsAndWarnings,
            debug_output: DebugOutput::Console,
            debug_message_filter: DebugMessageFilter::default(),
            break_on_validation_error: false,
            panic_on_error: false,
            enable_validation_stats: false,
            pipeline_variant: PipelineVariant::Deferred,
            shadow: ShadowConfig::default(),
            ssao: SsaoConfig::default(),
            clear_color: [0.0, 0.0, 0.0, 1.0],
            exposure: 1.0,
            fence_timeout_ns: u64::MAX,
        }
    }
}

impl Config {
    /// Reject configurations the render graph cannot be built with
    pub fn validate(&self) -> Result<()> {
        let shadow = &self.shadow;
        if shadow.cascade_count == 0 || shadow.cascade_count as usize > MAX_CASCADES {
            return Err(Error::InitializationFailed(format!(
                "cascade_count {} outside 1..={}",
                shadow.cascade_count, MAX_CASCADES
            )));
        }
        if shadow.min_cascade > shadow.cascade_count {
            return Err(Error::InitializationFailed(format!(
                "min_cascade {} exceeds cascade_count {}",
                shadow.min_cascade, shadow.cascade_count
            )));
        }
        if !(0.0..=1.0).contains(&shadow.split_lambda) {
            return Err(Error::InitializationFailed(format!(
                "split_lambda {} outside [0, 1]",
                shadow.split_lambda
            )));
        }
        if shadow.map_size == 0 {
            return Err(Error::InitializationFailed("shadow map_size is zero".to_string()));
        }
        if self.ssao.radius <= 0.0 {
            return Err(Error::InitializationFailed(format!(
                "ssao radius {} must be positive",
                self.ssao.radius
            )));
        }
        if self.fence_timeout_ns == 0 {
            return Err(Error::InitializationFailed("fence_timeout_ns is zero".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
