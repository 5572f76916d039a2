//! Similarity transform between two spheres.
//!
//! Maps a "capture" sphere (center, radius) onto a "viewing" sphere so that
//! the centers coincide and every point on the source sphere lands on the
//! destination sphere along the same direction.

use crate::error::TransformError;
use glam::{DMat4, DVec3};

/// A sphere-to-sphere similarity transform.
///
/// Stateless apart from its parameters; rebuild it whenever a parameter
/// changes instead of mutating the matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityTransform {
    pub source_center: DVec3,
    pub source_radius: f64,
    pub dest_center: DVec3,
    pub dest_radius: f64,
    matrix: DMat4,
}

impl SimilarityTransform {
    /// Builds the transform
    /// `Translate(dest) * Scale(dest_r / src_r) * Translate(-dest) * Translate(dest - src)`.
    pub fn build(
        source_radius: f64,
        dest_radius: f64,
        source_center: DVec3,
        dest_center: DVec3,
    ) -> Result<Self, TransformError> {
        if !source_radius.is_finite() || !dest_radius.is_finite() {
            return Err(TransformError::NonFinite("radius"));
        }
        if !source_center.is_finite() || !dest_center.is_finite() {
            return Err(TransformError::NonFinite("center"));
        }
        if source_radius == 0.0 {
            return Err(TransformError::ZeroSourceRadius);
        }
        if source_radius < 0.0 {
            return Err(TransformError::NonPositiveRadius("source", source_radius));
        }
        if dest_radius <= 0.0 {
            return Err(TransformError::NonPositiveRadius("destination", dest_radius));
        }

        let scale = dest_radius / source_radius;
        if !scale.is_finite() {
            return Err(TransformError::NonFinite("scale"));
        }

        // 1. Align the sphere centers.
        let align = DMat4::from_translation(dest_center - source_center);
        // 2. Move the destination center to the origin.
        let to_origin = DMat4::from_translation(-dest_center);
        // 3. Uniform scale between radii.
        let scale_mat = DMat4::from_scale(DVec3::splat(scale));
        // 4. Move back.
        let from_origin = DMat4::from_translation(dest_center);

        Ok(Self {
            source_center,
            source_radius,
            dest_center,
            dest_radius,
            matrix: from_origin * scale_mat * to_origin * align,
        })
    }

    #[inline]
    pub fn matrix(&self) -> DMat4 {
        self.matrix
    }

    /// Ratio `dest_radius / source_radius`.
    #[inline]
    pub fn scale(&self) -> f64 {
        self.dest_radius / self.source_radius
    }

    #[inline]
    pub fn apply(&self, point: DVec3) -> DVec3 {
        transform_point(&self.matrix, point)
    }

    /// Directions are only affected by the uniform scale, so unit vectors
    /// keep their orientation.
    #[inline]
    pub fn apply_direction(&self, dir: DVec3) -> DVec3 {
        self.matrix.transform_vector3(dir).normalize_or_zero()
    }
}

/// Multiplies `(p, 1)` by `m` and drops the homogeneous coordinate.
#[inline]
pub fn transform_point(m: &DMat4, p: DVec3) -> DVec3 {
    (*m * p.extend(1.0)).truncate()
}
