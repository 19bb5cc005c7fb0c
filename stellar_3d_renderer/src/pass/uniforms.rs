/// GPU uniform block layouts (std140-compatible, 16-byte aligned members)

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, UVec4, Vec4};

use crate::config::{MAX_CASCADES, SSAO_KERNEL_SIZE};
use crate::device::Extent2D;
use crate::pass::{CameraData, DirectionalLight};

/// Per-frame camera and light data, set 0 of every main-pass pipeline
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct FrameUniforms {
    pub view: Mat4,
    pub projection: Mat4,
    pub view_projection: Mat4,
    pub inverse_view_projection: Mat4,
    /// xyz = eye position
    pub camera_position: Vec4,
    /// width, height, 1/width, 1/height
    pub viewport: Vec4,
    /// xyz = direction, w = 0
    pub light_direction: Vec4,
    /// rgb = color * intensity
    pub light_color: Vec4,
}

impl FrameUniforms {
    pub fn new(camera: &CameraData, light: &DirectionalLight, extent: Extent2D) -> Self {
        let view_projection = camera.projection * camera.view;
        let (width, height) = (extent.width.max(1) as f32, extent.height.max(1) as f32);
        Self {
            view: camera.view,
            projection: camera.projection,
            view_projection,
            inverse_view_projection: view_projection.inverse(),
            camera_position: camera.position.extend(1.0),
            viewport: Vec4::new(width, height, 1.0 / width, 1.0 / height),
            light_direction: light.direction.normalize_or_zero().extend(0.0),
            light_color: (light.color * light.intensity).extend(1.0),
        }
    }
}

/// Cascade matrices and split distances read by the depth and lighting passes
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct CascadeUniforms {
    pub view_projection: [Mat4; MAX_CASCADES],
    /// View-space far distance of each cascade, packed 4 per vector
    pub splits: [Vec4; MAX_CASCADES / 4],
    /// x = cascade count, y = shadow map size
    pub params: UVec4,
}

impl CascadeUniforms {
    pub fn new(matrices: &[Mat4; MAX_CASCADES], splits: &[f32; MAX_CASCADES], cascade_count: u32, map_size: u32) -> Self {
        let mut packed = [Vec4::ZERO; MAX_CASCADES / 4];
        for (i, chunk) in splits.chunks(4).enumerate() {
            packed[i] = Vec4::new(chunk[0], chunk[1], chunk[2], chunk[3]);
        }
        Self {
            view_projection: *matrices,
            splits: packed,
            params: UVec4::new(cascade_count, map_size, 0, 0),
        }
    }
}

/// Hemisphere kernel and parameters of the SSAO pass
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct SsaoUniforms {
    pub samples: [Vec4; SSAO_KERNEL_SIZE],
    /// radius, bias, intensity, sample count
    pub params: Vec4,
}
