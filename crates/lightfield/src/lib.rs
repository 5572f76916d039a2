//! Light-field capture registration and reflectance coverage tracking.
//!
//! - Loads photo sessions (`capture.json` + `CaptureImages/`) captured around a
//!   focal point and re-registers them onto a destination sphere with a
//!   per-capture similarity transform.
//! - Answers exact k-nearest-capture queries for a moving viewer.
//! - Tracks, for a planar region of interest, which half-vector angle bands
//!   have been observed by reflectance captures.
//!
//! Conventions: right-handed world, Y up, cameras look down their local -Z,
//! projections map to the OpenGL NDC cube `[-1, 1]^3`.

pub mod acquisition;
pub mod camera;
pub mod capture;
pub mod coverage;
pub mod error;
pub mod light_field;
pub mod nearest;
pub mod pose;
pub mod session;
pub mod transform;

pub use capture::{Capture, CaptureId, CaptureRegistry, Positioned, ReflectanceMeta};
pub use coverage::{Channel, CoverageConfig, CoverageMap, CoverageState, CoverageTexture, RoiCorners};
pub use error::{CameraError, CoverageError, RegistryError, SessionLoadError, SessionSaveError, TransformError};
pub use light_field::{DegenerateCapturePolicy, LightField, LightFieldOptions, ViewCapture};
pub use nearest::{blend_weights, find_nearest, CaptureIndex, ProjectionMode};
pub use pose::{Pose, Viewport};
pub use session::{LightFieldSession, SessionStore};
pub use transform::SimilarityTransform;
