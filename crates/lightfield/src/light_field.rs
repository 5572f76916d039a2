//! Light fields: a loaded session re-registered into a viewing sphere.

use crate::capture::{Capture, CaptureId, CaptureRegistry, Positioned};
use crate::error::{SessionLoadError, TransformError};
use crate::nearest;
use crate::pose::Pose;
use crate::session::{CaptureJson, LightFieldSession, SessionStore};
use crate::transform::SimilarityTransform;
use glam::DVec3;
use image::RgbaImage;

/// What to do with a capture stored exactly on the focal point, where the
/// per-capture source radius is zero and no transform exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DegenerateCapturePolicy {
    /// Fail the whole load.
    #[default]
    Reject,
    /// Drop the capture and keep loading.
    Skip,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LightFieldOptions {
    pub degenerate_policy: DegenerateCapturePolicy,
    /// Re-aim each viewing-space pose at the destination focal point instead
    /// of keeping the stored forward vector.
    pub orient_toward_focal: bool,
}

/// Where one capture sits in viewing space. Built together with its
/// transform so the cached pose can never drift from it.
#[derive(Debug, Clone)]
struct Placement {
    transform: SimilarityTransform,
    viewing_pose: Pose,
}

impl Placement {
    fn compute(
        source: &Pose,
        source_focal: DVec3,
        dest_radius: f64,
        dest_center: DVec3,
        options: &LightFieldOptions,
    ) -> Result<Self, TransformError> {
        // Captures are not assumed to sit on the nominal sphere.
        let source_radius = source_focal.distance(source.position);
        let transform = SimilarityTransform::build(source_radius, dest_radius, source_focal, dest_center)?;

        let viewing_pose = if options.orient_toward_focal {
            Pose::looking_at(
                transform.apply(source.position),
                dest_center,
                source.up,
                source.projection,
            )
        } else {
            source.transformed(&transform)
        };

        Ok(Self { transform, viewing_pose })
    }
}

/// The viewing sphere must be usable even when there are no captures to
/// place on it.
fn validate_destination(dest_radius: f64, dest_center: DVec3) -> Result<(), TransformError> {
    SimilarityTransform::build(1.0, dest_radius, dest_center, dest_center).map(|_| ())
}

/// A capture as seen from viewing space.
#[derive(Debug, Clone, Copy)]
pub struct ViewCapture<'a> {
    pub capture: &'a Capture,
    placement: &'a Placement,
}

impl<'a> ViewCapture<'a> {
    pub fn id(&self) -> &'a CaptureId {
        self.capture.id()
    }

    pub fn viewing_pose(&self) -> &'a Pose {
        &self.placement.viewing_pose
    }

    pub fn viewing_position(&self) -> DVec3 {
        self.placement.viewing_pose.position
    }

    pub fn transform(&self) -> &'a SimilarityTransform {
        &self.placement.transform
    }
}

impl Positioned for ViewCapture<'_> {
    #[inline]
    fn position(&self) -> DVec3 {
        self.viewing_position()
    }
}

#[derive(Debug)]
pub struct LightField {
    session_name: String,
    source_focal_point: DVec3,
    nominal_radius: f64,
    dest_center: DVec3,
    dest_radius: f64,
    options: LightFieldOptions,
    registry: CaptureRegistry,
    /// Parallel to `registry`, same order.
    placements: Vec<Placement>,
}

impl LightField {
    /// Loads `<root>/<session_name>` and registers it onto the viewing sphere.
    pub fn load(
        store: &SessionStore,
        session_name: &str,
        dest_radius: f64,
        dest_center: DVec3,
        options: LightFieldOptions,
    ) -> Result<Self, SessionLoadError> {
        let session = store.read_session(session_name)?;
        Self::from_session(&session, dest_radius, dest_center, options, |c| {
            store.load_image(session_name, &c.image_file_name)
        })
    }

    /// Builds a light field from parsed session data, fetching each image
    /// through `load_image`. Any failure aborts the whole field.
    pub fn from_session<F>(
        session: &LightFieldSession,
        dest_radius: f64,
        dest_center: DVec3,
        options: LightFieldOptions,
        mut load_image: F,
    ) -> Result<Self, SessionLoadError>
    where
        F: FnMut(&CaptureJson) -> Result<RgbaImage, SessionLoadError>,
    {
        validate_destination(dest_radius, dest_center).map_err(SessionLoadError::Destination)?;
        let source_focal_point: DVec3 = session.focal_point.into();
        let mut registry = CaptureRegistry::new();
        let mut placements = Vec::with_capacity(session.captures.len());

        for stored in &session.captures {
            let source_pose = stored.transform.to_pose();
            let placement = match Placement::compute(&source_pose, source_focal_point, dest_radius, dest_center, &options) {
                Ok(p) => p,
                Err(TransformError::ZeroSourceRadius) => match options.degenerate_policy {
                    DegenerateCapturePolicy::Reject => {
                        return Err(SessionLoadError::DegenerateCapture {
                            image_file_name: stored.image_file_name.clone(),
                        })
                    }
                    DegenerateCapturePolicy::Skip => {
                        tracing::warn!(
                            image = %stored.image_file_name,
                            "Skipping capture stored on the focal point"
                        );
                        continue;
                    }
                },
                Err(source) => {
                    return Err(SessionLoadError::Transform {
                        image_file_name: stored.image_file_name.clone(),
                        source,
                    })
                }
            };

            let image = load_image(stored)?;
            let capture = Capture::new(CaptureId::new(stored.image_file_name.clone()), image, source_pose, None);
            registry.insert(capture)?;
            placements.push(placement);
        }

        tracing::info!(
            session = %session.session_name,
            captures = registry.len(),
            dest_radius,
            "Successfully loaded light field"
        );

        Ok(Self {
            session_name: session.session_name.clone(),
            source_focal_point,
            nominal_radius: session.sphere_radius,
            dest_center,
            dest_radius,
            options,
            registry,
            placements,
        })
    }

    /// Moves the viewing sphere. Transforms and cached viewing poses are
    /// rebuilt together; on error nothing changes.
    pub fn retarget(&mut self, dest_radius: f64, dest_center: DVec3) -> Result<(), TransformError> {
        validate_destination(dest_radius, dest_center)?;
        let placements = self
            .registry
            .iter()
            .map(|c| Placement::compute(c.pose(), self.source_focal_point, dest_radius, dest_center, &self.options))
            .collect::<Result<Vec<_>, _>>()?;
        self.placements = placements;
        self.dest_radius = dest_radius;
        self.dest_center = dest_center;
        Ok(())
    }

    pub fn session_name(&self) -> &str {
        &self.session_name
    }

    pub fn source_focal_point(&self) -> DVec3 {
        self.source_focal_point
    }

    /// The session's recorded radius. Informational only.
    pub fn nominal_radius(&self) -> f64 {
        self.nominal_radius
    }

    pub fn dest_center(&self) -> DVec3 {
        self.dest_center
    }

    pub fn dest_radius(&self) -> f64 {
        self.dest_radius
    }

    pub fn registry(&self) -> &CaptureRegistry {
        &self.registry
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<ViewCapture<'_>> {
        Some(ViewCapture {
            capture: self.registry.as_slice().get(index)?,
            placement: self.placements.get(index)?,
        })
    }

    pub fn captures(&self) -> impl Iterator<Item = ViewCapture<'_>> + '_ {
        self.registry
            .iter()
            .zip(&self.placements)
            .map(|(capture, placement)| ViewCapture { capture, placement })
    }

    /// The `k` captures whose viewing-space positions are closest to `position`.
    pub fn find_nearest(&self, k: usize, position: DVec3) -> Vec<ViewCapture<'_>> {
        let views: Vec<ViewCapture<'_>> = self.captures().collect();
        nearest::find_nearest(k, position, &views)
            .into_iter()
            .copied()
            .collect()
    }
}
