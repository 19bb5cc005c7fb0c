//! Cascaded shadow map math
//!
//! - Split distances with the practical split scheme
//! - World-space corners of a camera frustum slice
//! - Texel-snapped orthographic view-projection fitted to a slice

use glam::{Mat4, Vec3};

use crate::config::MAX_CASCADES;
use crate::pass::CameraData;

/// Far distance of each cascade, blending logarithmic (`lambda = 1`) and
/// uniform (`lambda = 0`) distributions; entries past `cascade_count` are 0
pub fn cascade_splits(cascade_count: u32, near: f32, far: f32, lambda: f32) -> [f32; MAX_CASCADES] {
    let mut splits = [0.0f32; MAX_CASCADES];
    let n = (cascade_count as usize).min(MAX_CASCADES);

    for (i, split) in splits.iter_mut().enumerate().take(n) {
        let p = (i + 1) as f32 / n as f32;
        let log_split = near * (far / near).powf(p);
        let uniform_split = near + (far - near) * p;
        *split = lambda * log_split + (1.0 - lambda) * uniform_split;
    }
    if n > 0 {
        splits[n - 1] = far;
    }
    splits
}

/// The 8 world-space corners of the camera frustum between two view depths
///
/// Near face first, counter-clockwise from bottom-left.
pub fn frustum_corners_world(camera: &CameraData, slice_near: f32, slice_far: f32) -> [Vec3; 8] {
    let proj = camera.projection;
    // Y may be flipped for a top-left origin clip space
    let tan_half_fov = 1.0 / proj.y_axis.y.abs();
    let aspect = proj.y_axis.y.abs() / proj.x_axis.x.abs();

    let h_near = tan_half_fov * slice_near;
    let w_near = h_near * aspect;
    let h_far = tan_half_fov * slice_far;
    let w_far = h_far * aspect;

    let corners_view = [
        Vec3::new(-w_near, -h_near, -slice_near),
        Vec3::new(w_near, -h_near, -slice_near),
        Vec3::new(w_near, h_near, -slice_near),
        Vec3::new(-w_near, h_near, -slice_near),
        Vec3::new(-w_far, -h_far, -slice_far),
        Vec3::new(w_far, -h_far, -slice_far),
        Vec3::new(w_far, h_far, -slice_far),
        Vec3::new(-w_far, h_far, -slice_far),
    ];

    let inv_view = camera.view.inverse();
    corners_view.map(|c| inv_view.transform_point3(c))
}

/// Orthographic light view-projection covering `corners`
///
/// The light-space bounds are snapped to whole shadow map texels so the
/// shadow does not shimmer while the camera moves. Depth is extended
/// towards the light to keep casters outside the slice.
pub fn cascade_view_projection(light_direction: Vec3, corners: &[Vec3; 8], map_size: u32) -> Mat4 {
    let dir = if light_direction.length_squared() > 1e-6 {
        light_direction.normalize()
    } else {
        -Vec3::Y
    };

    let center = corners.iter().copied().sum::<Vec3>() / 8.0;
    let up = if dir.y.abs() > 0.99 { Vec3::X } else { Vec3::Y };
    let light_view = Mat4::look_at_rh(center - dir, center, up);

    let mut ls_min = Vec3::splat(f32::MAX);
    let mut ls_max = Vec3::splat(f32::MIN);
    for corner in corners {
        let ls = light_view.transform_point3(*corner);
        ls_min = ls_min.min(ls);
        ls_max = ls_max.max(ls);
    }

    // RH light view: max.z faces the light
    let z_range = (ls_max.z - ls_min.z).max(1.0);
    ls_max.z += z_range;
    ls_min.z -= z_range;

    let texel_x = (ls_max.x - ls_min.x) / map_size as f32;
    let texel_y = (ls_max.y - ls_min.y) / map_size as f32;
    if texel_x > 0.0 {
        ls_min.x = (ls_min.x / texel_x).floor() * texel_x;
        ls_max.x = (ls_max.x / texel_x).ceil() * texel_x;
    }
    if texel_y > 0.0 {
        ls_min.y = (ls_min.y / texel_y).floor() * texel_y;
        ls_max.y = (ls_max.y / texel_y).ceil() * texel_y;
    }

    let proj = Mat4::orthographic_rh(ls_min.x, ls_max.x, ls_min.y, ls_max.y, -ls_max.z, -ls_min.z);
    proj * light_view
}

#[cfg(test)]
#[path = "cascade_math_tests.rs"]
mod tests;
