//! Per-image uniform data for the quad shaders.
//!
//! Must match the vertex shader's `UniformBufferObject` block (std140):
//!
//! - Offset 0: model (64 bytes)
//! - Offset 64: view (64 bytes)
//! - Offset 128: projection (64 bytes)

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

/// Rotation speed of the quad around +Z.
pub const DEGREES_PER_SECOND: f32 = 90.0;

const EYE: Vec3 = Vec3::new(2.0, 2.0, 2.0);
const FOV_Y_DEGREES: f32 = 45.0;
const Z_NEAR: f32 = 0.1;
const Z_FAR: f32 = 100.0;

/// Model, view and projection matrices, column-major.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Matrices {
    pub model: Mat4,
    pub view: Mat4,
    pub projection: Mat4,
}

impl Matrices {
    /// Size of the struct in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Matrices for `elapsed_secs` after start, rendering into a
    /// `width`x`height` target.
    ///
    /// The projection's Y scale is negated because Vulkan clip space points
    /// Y down.
    pub fn compute(elapsed_secs: f32, width: u32, height: u32) -> Self {
        let model = Mat4::from_rotation_z((elapsed_secs * DEGREES_PER_SECOND).to_radians());
        let view = Mat4::look_at_rh(EYE, Vec3::ZERO, Vec3::Z);

        let aspect = width as f32 / height.max(1) as f32;
        let mut projection =
            Mat4::perspective_rh(FOV_Y_DEGREES.to_radians(), aspect, Z_NEAR, Z_FAR);
        projection.y_axis.y *= -1.0;

        Self {
            model,
            view,
            projection,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-5;

    #[test]
    fn test_matrices_layout() {
        assert_eq!(Matrices::SIZE, 192);
        assert_eq!(std::mem::offset_of!(Matrices, view), 64);
        assert_eq!(std::mem::offset_of!(Matrices, projection), 128);
        assert_eq!(Matrices::default().as_bytes().len(), 192);
    }

    #[test]
    fn test_model_rotation() {
        let at_start = Matrices::compute(0.0, 1280, 720);
        assert!(at_start.model.abs_diff_eq(Mat4::IDENTITY, EPS));

        // One second is a quarter turn: +X maps to +Y
        let after_one = Matrices::compute(1.0, 1280, 720);
        let x = after_one.model.transform_vector3(Vec3::X);
        assert!(x.abs_diff_eq(Vec3::Y, EPS));
    }

    #[test]
    fn test_view_looks_at_origin() {
        let m = Matrices::compute(0.0, 1280, 720);

        // The eye lands at the view-space origin
        assert!(m.view.transform_point3(EYE).abs_diff_eq(Vec3::ZERO, 1e-4));

        // The origin is straight ahead (-Z in a right-handed view space)
        let origin = m.view.transform_point3(Vec3::ZERO);
        assert!(origin.x.abs() < EPS && origin.y.abs() < EPS);
        assert!(origin.z < 0.0);
    }

    #[test]
    fn test_projection_y_flip() {
        let m = Matrices::compute(0.0, 1280, 720);
        let unflipped =
            Mat4::perspective_rh(FOV_Y_DEGREES.to_radians(), 1280.0 / 720.0, Z_NEAR, Z_FAR);

        assert!(m.projection.y_axis.y < 0.0);
        assert!((m.projection.y_axis.y + unflipped.y_axis.y).abs() < EPS);
        assert_eq!(m.projection.x_axis, unflipped.x_axis);
        assert_eq!(m.projection.z_axis, unflipped.z_axis);
    }

    #[test]
    fn test_zero_height_does_not_divide_by_zero() {
        let m = Matrices::compute(0.0, 1280, 0);
        assert!(m.projection.is_finite());
    }
}
