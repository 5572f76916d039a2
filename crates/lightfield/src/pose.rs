//! Camera pose at the moment of capture, plus the projection helpers shared
//! by nearest-view selection and coverage tracking.
//!
//! Conventions: right-handed world, cameras look down their local -Z, clip
//! space follows OpenGL (NDC cube `[-1, 1]^3`).

use crate::transform::SimilarityTransform;
use glam::{DMat3, DMat4, DQuat, DVec3, DVec4};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: DVec3,
    pub forward: DVec3,
    pub up: DVec3,
    pub right: DVec3,
    /// Camera orientation, when it was recorded or reconstructed.
    pub rotation: Option<DQuat>,
    pub projection: DMat4,
    /// Explicit world-to-camera matrix. Derived from the basis when absent.
    pub world_to_camera: Option<DMat4>,
}

impl Pose {
    /// Builds a pose from a position and a forward/up pair, completing the
    /// basis with `right = forward x up`.
    pub fn from_basis(position: DVec3, forward: DVec3, up: DVec3, projection: DMat4) -> Self {
        let (forward, up, right) = orthonormal_basis(forward, up);
        Self {
            position,
            forward,
            up,
            right,
            rotation: Some(rotation_from_basis(forward, up, right)),
            projection,
            world_to_camera: None,
        }
    }

    /// A camera at `position` aimed at `target`. `up_hint` only needs to be
    /// roughly upward; it is re-orthogonalized against the view direction.
    pub fn looking_at(position: DVec3, target: DVec3, up_hint: DVec3, projection: DMat4) -> Self {
        let forward = (target - position).normalize_or_zero();
        Self::from_basis(position, forward, up_hint, projection)
    }

    /// World-to-camera (view) matrix.
    pub fn world_to_camera(&self) -> DMat4 {
        self.world_to_camera
            .unwrap_or_else(|| DMat4::look_to_rh(self.position, self.forward, self.up))
    }

    /// `projection * world_to_camera`, the matrix used for frustum tests.
    pub fn view_projection(&self) -> DMat4 {
        self.projection * self.world_to_camera()
    }

    /// Carries the pose through a sphere-to-sphere transform. Directions are
    /// unchanged by a uniform similarity, so only the position moves and any
    /// explicit view matrix is dropped in favor of the derived one.
    pub fn transformed(&self, t: &SimilarityTransform) -> Self {
        Self {
            position: t.apply(self.position),
            forward: t.apply_direction(self.forward),
            up: t.apply_direction(self.up),
            right: t.apply_direction(self.right),
            rotation: self.rotation,
            projection: self.projection,
            world_to_camera: None,
        }
    }
}

/// Orthonormalizes `(forward, up)` and returns `(forward, up, right)`.
///
/// Falls back to world Y (or X when forward is vertical) if `up` is parallel
/// to `forward`.
pub fn orthonormal_basis(forward: DVec3, up: DVec3) -> (DVec3, DVec3, DVec3) {
    let f = forward.normalize_or_zero();
    let mut u = (up - f * up.dot(f)).normalize_or_zero();
    if u == DVec3::ZERO {
        let fallback = if f.dot(DVec3::Y).abs() < 0.999 { DVec3::Y } else { DVec3::X };
        u = (fallback - f * fallback.dot(f)).normalize_or_zero();
    }
    let r = f.cross(u).normalize_or_zero();
    (f, u, r)
}

fn rotation_from_basis(forward: DVec3, up: DVec3, right: DVec3) -> DQuat {
    // Columns are the camera axes expressed in world space: +X right, +Y up, +Z back.
    DQuat::from_mat3(&DMat3::from_cols(right, up, -forward))
}

/// OpenGL-style perspective projection, vertical field of view in degrees.
pub fn perspective(fov_y_deg: f64, aspect: f64, near: f64, far: f64) -> DMat4 {
    DMat4::perspective_rh_gl(fov_y_deg.to_radians(), aspect, near, far)
}

/// Projects a world point to normalized device coordinates.
///
/// Returns `None` when the homogeneous `w` is zero or the result is not finite.
#[inline]
pub fn project_ndc(view_proj: &DMat4, p: DVec3) -> Option<DVec3> {
    let clip: DVec4 = *view_proj * p.extend(1.0);
    if clip.w == 0.0 {
        return None;
    }
    let ndc = clip.truncate() / clip.w;
    ndc.is_finite().then_some(ndc)
}

/// Frustum test: every NDC component lies in `[-1, 1]`.
#[inline]
pub fn ndc_visible(ndc: DVec3) -> bool {
    ndc.abs().max_element() <= 1.0
}

/// Projector matrix for drawing a capture's image onto a surface seen by
/// the viewer: the viewer's projection paired with the capture's view.
pub fn projector_matrix(viewer_projection: &DMat4, capture: &Pose) -> DMat4 {
    *viewer_projection * capture.world_to_camera()
}

/// A screen the coverage texture is displayed on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub view_proj: DMat4,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(view_proj: DMat4, width: u32, height: u32) -> Self {
        Self { view_proj, width, height }
    }

    /// Pixel coordinates with the origin at the bottom-left corner.
    ///
    /// Points outside the frustum still map to (possibly out-of-range) pixels;
    /// only a degenerate projection yields `None`.
    pub fn world_to_pixel(&self, p: DVec3) -> Option<(i32, i32)> {
        let ndc = project_ndc(&self.view_proj, p)?;
        let x = (ndc.x * 0.5 + 0.5) * self.width as f64;
        let y = (ndc.y * 0.5 + 0.5) * self.height as f64;
        Some((x.floor() as i32, y.floor() as i32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proj() -> DMat4 {
        perspective(60.0, 1.0, 0.1, 100.0)
    }

    #[test]
    fn basis_is_right_handed() {
        let pose = Pose::from_basis(DVec3::ZERO, DVec3::NEG_Z, DVec3::Y, proj());
        assert!(pose.right.abs_diff_eq(DVec3::X, 1e-12));
        assert!(pose.up.abs_diff_eq(DVec3::Y, 1e-12));
    }

    #[test]
    fn degenerate_up_falls_back() {
        let (f, u, r) = orthonormal_basis(DVec3::Y, DVec3::Y);
        assert!(f.dot(u).abs() < 1e-12);
        assert!(r.length() > 0.99);
    }

    #[test]
    fn point_in_front_is_visible() {
        let pose = Pose::looking_at(DVec3::new(0.0, 0.0, 5.0), DVec3::ZERO, DVec3::Y, proj());
        let ndc = project_ndc(&pose.view_projection(), DVec3::ZERO).unwrap();
        assert!(ndc_visible(ndc));
        assert!(ndc.x.abs() < 1e-9 && ndc.y.abs() < 1e-9);
    }

    #[test]
    fn point_behind_is_not_visible() {
        let pose = Pose::looking_at(DVec3::new(0.0, 0.0, 5.0), DVec3::ZERO, DVec3::Y, proj());
        let ndc = project_ndc(&pose.view_projection(), DVec3::new(0.0, 0.0, 10.0)).unwrap();
        assert!(!ndc_visible(ndc));
    }

    #[test]
    fn rotation_matches_basis() {
        let pose = Pose::looking_at(DVec3::new(3.0, 2.0, 1.0), DVec3::ZERO, DVec3::Y, proj());
        let q = pose.rotation.unwrap();
        assert!((q * DVec3::NEG_Z).abs_diff_eq(pose.forward, 1e-9));
        assert!((q * DVec3::Y).abs_diff_eq(pose.up, 1e-9));
    }

    #[test]
    fn viewport_center_maps_to_middle_pixel() {
        let pose = Pose::looking_at(DVec3::new(0.0, 0.0, 5.0), DVec3::ZERO, DVec3::Y, proj());
        let vp = Viewport::new(pose.view_projection(), 640, 480);
        assert_eq!(vp.world_to_pixel(DVec3::ZERO), Some((320, 240)));
    }
}
