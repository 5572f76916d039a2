use crate::pose::{Pose, Viewport};
use glam::{DMat4, DVec3};

const MIN_RADIUS: f64 = 1e-3;
const MAX_RADIUS: f64 = 1e6;

/// The main camera: orbits a target in a Y-up world and provides the
/// viewer pose used for nearest-view queries and coverage pixel lookups.
#[derive(Debug, Clone)]
pub struct OrbitCamera {
    // --- Orbital Parameters (Primary State) ---
    /// The world point the camera orbits around.
    pub target: DVec3,
    /// Distance from the camera to the target.
    pub radius: f64,
    /// Azimuth around world +Y, measured from +Z toward +X (radians).
    pub azimuth_rad: f64,
    /// Elevation above the XZ plane (radians).
    pub elevation_rad: f64,

    // --- Derived (updated by `update()`) ---
    position: DVec3,

    pub proj: DMat4,
}

impl OrbitCamera {
    pub fn new(target: DVec3, radius: f64, proj: DMat4) -> Self {
        let mut camera = Self {
            target,
            radius,
            azimuth_rad: 0.0,
            elevation_rad: 30.0f64.to_radians(),
            position: DVec3::ZERO,
            proj,
        };
        camera.update();
        camera
    }

    /// Recomputes the position from the orbital parameters. Call after
    /// changing any of them directly.
    pub fn update(&mut self) {
        let (sin_az, cos_az) = self.azimuth_rad.sin_cos();
        let (sin_el, cos_el) = self.elevation_rad.sin_cos();
        let offset = DVec3::new(
            self.radius * cos_el * sin_az,
            self.radius * sin_el,
            self.radius * cos_el * cos_az,
        );
        self.position = self.target + offset;
    }

    pub fn set_target_and_radius(&mut self, target: DVec3, radius: f64) {
        self.target = target;
        self.radius = radius.clamp(MIN_RADIUS, MAX_RADIUS);
        self.update();
    }

    /// Rotates around the target. Elevation is clamped short of the poles
    /// so the up vector stays defined.
    pub fn orbit(&mut self, d_azimuth_rad: f64, d_elevation_rad: f64) {
        self.azimuth_rad = (self.azimuth_rad + d_azimuth_rad).rem_euclid(std::f64::consts::TAU);
        self.elevation_rad = (self.elevation_rad + d_elevation_rad)
            .clamp((-89.0f64).to_radians(), 89.0f64.to_radians());
        self.update();
    }

    /// Positive `delta` zooms in.
    pub fn zoom(&mut self, delta: f64) {
        self.radius = (self.radius * 1.1f64.powf(-delta)).clamp(MIN_RADIUS, MAX_RADIUS);
        self.update();
    }

    #[inline]
    pub fn position(&self) -> DVec3 {
        self.position
    }

    pub fn pose(&self) -> Pose {
        Pose::looking_at(self.position, self.target, DVec3::Y, self.proj)
    }

    pub fn view_proj(&self) -> DMat4 {
        self.pose().view_projection()
    }

    pub fn viewport(&self, width: u32, height: u32) -> Viewport {
        Viewport::new(self.view_proj(), width, height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::{ndc_visible, perspective, project_ndc};
    use approx::assert_abs_diff_eq;

    fn camera() -> OrbitCamera {
        OrbitCamera::new(DVec3::new(1.0, 2.0, 3.0), 10.0, perspective(60.0, 1.0, 0.1, 100.0))
    }

    #[test]
    fn stays_on_orbit_sphere() {
        let mut cam = camera();
        for _ in 0..20 {
            cam.orbit(0.37, 0.11);
            assert_abs_diff_eq!(cam.position().distance(cam.target), 10.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn elevation_is_clamped() {
        let mut cam = camera();
        cam.orbit(0.0, 10.0);
        assert!(cam.elevation_rad <= 89.0f64.to_radians() + 1e-12);
        assert!(cam.position().y > cam.target.y);
    }

    #[test]
    fn target_is_centered() {
        let cam = camera();
        let ndc = project_ndc(&cam.view_proj(), cam.target).unwrap();
        assert!(ndc_visible(ndc));
        assert_abs_diff_eq!(ndc.x, 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(ndc.y, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn zoom_in_shrinks_radius() {
        let mut cam = camera();
        cam.zoom(1.0);
        assert!(cam.radius < 10.0);
        assert_abs_diff_eq!(cam.position().distance(cam.target), cam.radius, epsilon = 1e-9);
    }
}
