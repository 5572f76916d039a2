//! Captures and the registry that owns them.

use crate::error::RegistryError;
use crate::pose::Pose;
use glam::DVec3;
use image::RgbaImage;
use std::collections::HashMap;
use std::fmt;

/// Unique capture identifier: a decimal counter for live captures, the
/// image file name for captures loaded from a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CaptureId(String);

impl CaptureId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CaptureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CaptureId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Extra data recorded in reflectance mode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReflectanceMeta {
    /// World position of the point light when the photo was taken.
    pub light_position: DVec3,
}

/// One photograph plus its pose. Read-only once created.
#[derive(Debug, Clone)]
pub struct Capture {
    id: CaptureId,
    image: RgbaImage,
    pose: Pose,
    reflectance: Option<ReflectanceMeta>,
}

impl Capture {
    pub fn new(id: CaptureId, image: RgbaImage, pose: Pose, reflectance: Option<ReflectanceMeta>) -> Self {
        Self { id, image, pose, reflectance }
    }

    pub fn id(&self) -> &CaptureId {
        &self.id
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn pose(&self) -> &Pose {
        &self.pose
    }

    pub fn reflectance(&self) -> Option<&ReflectanceMeta> {
        self.reflectance.as_ref()
    }

    /// RGBA at `(x, y)`, or `None` outside the image.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        self.image.get_pixel_checked(x, y).map(|p| p.0)
    }

    /// Half-vector/normal angle in degrees for a surface point, computed on
    /// demand from the capture's light position. `None` for light-field
    /// captures, which carry no light.
    pub fn theta_s(&self, surface_point: DVec3, normal: DVec3) -> Option<f64> {
        let light = self.reflectance?.light_position;
        crate::coverage::half_vector_angle_deg(self.pose.position, light, surface_point, normal)
    }
}

/// Anything with a position in the common query space.
pub trait Positioned {
    fn position(&self) -> DVec3;
}

impl Positioned for Capture {
    #[inline]
    fn position(&self) -> DVec3 {
        self.pose.position
    }
}

impl<T: Positioned + ?Sized> Positioned for &T {
    #[inline]
    fn position(&self) -> DVec3 {
        (**self).position()
    }
}

/// Ordered collection of captures with unique IDs.
///
/// Order is capture order; it only matters for persistence and for the
/// tie-break of nearest-view queries.
#[derive(Debug, Default)]
pub struct CaptureRegistry {
    captures: Vec<Capture>,
    by_id: HashMap<CaptureId, usize>,
    next_id: u64,
}

impl CaptureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a capture that already carries an ID.
    pub fn insert(&mut self, capture: Capture) -> Result<&Capture, RegistryError> {
        if self.by_id.contains_key(capture.id()) {
            return Err(RegistryError::DuplicateId(capture.id().to_string()));
        }
        let idx = self.captures.len();
        self.by_id.insert(capture.id().clone(), idx);
        self.captures.push(capture);
        Ok(&self.captures[idx])
    }

    /// Registers a freshly acquired image under the next counter ID.
    pub fn register(
        &mut self,
        image: RgbaImage,
        pose: Pose,
        reflectance: Option<ReflectanceMeta>,
    ) -> Result<CaptureId, RegistryError> {
        let mut id = CaptureId::new(self.next_id.to_string());
        // Loaded captures use file names, so a clash only happens if a caller
        // inserted a bare number; skip past it.
        while self.by_id.contains_key(&id) {
            self.next_id += 1;
            id = CaptureId::new(self.next_id.to_string());
        }
        self.next_id += 1;

        self.insert(Capture::new(id.clone(), image, pose, reflectance))?;
        tracing::info!(capture_id = %id, total = self.captures.len(), "Capture added to registry");
        Ok(id)
    }

    pub fn get(&self, id: &CaptureId) -> Option<&Capture> {
        self.by_id.get(id).map(|&i| &self.captures[i])
    }

    pub fn index_of(&self, id: &CaptureId) -> Option<usize> {
        self.by_id.get(id).copied()
    }

    pub fn as_slice(&self) -> &[Capture] {
        &self.captures
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Capture> {
        self.captures.iter()
    }

    pub fn len(&self) -> usize {
        self.captures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.captures.is_empty()
    }
}

impl<'a> IntoIterator for &'a CaptureRegistry {
    type Item = &'a Capture;
    type IntoIter = std::slice::Iter<'a, Capture>;

    fn into_iter(self) -> Self::IntoIter {
        self.captures.iter()
    }
}
