//! Error types, one enum per concern.

use std::path::PathBuf;
use thiserror::Error;

/// Rejected inputs of the similarity transform builder.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransformError {
    #[error("source radius must be non-zero")]
    ZeroSourceRadius,

    #[error("{0} radius must be positive, got {1}")]
    NonPositiveRadius(&'static str, f64),

    #[error("non-finite transform input: {0}")]
    NonFinite(&'static str),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("capture id {0} is already registered")]
    DuplicateId(String),
}

/// Failure to turn a persisted session into an in-memory light field.
///
/// Any variant aborts the whole load; no partial light field is returned.
#[derive(Error, Debug)]
pub enum SessionLoadError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed session JSON at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("cannot decode capture image {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("capture {image_file_name} lies on the focal point (zero source radius)")]
    DegenerateCapture { image_file_name: String },

    #[error("image file name {image_file_name:?} must be a plain file name")]
    InvalidImageName { image_file_name: String },

    #[error("invalid viewing sphere: {0}")]
    Destination(#[source] TransformError),

    #[error("capture {image_file_name} has an invalid transform: {source}")]
    Transform {
        image_file_name: String,
        #[source]
        source: TransformError,
    },

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

#[derive(Error, Debug)]
pub enum SessionSaveError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot serialize session: {0}")]
    Json(#[from] serde_json::Error),

    #[error("cannot encode capture image {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("session has {captures} captures but {images} images")]
    ImageCountMismatch { captures: usize, images: usize },

    #[error("image file name {image_file_name:?} must be a plain file name")]
    InvalidImageName { image_file_name: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoverageError {
    /// Fatal configuration problem; the map must not be used.
    #[error("invalid coverage configuration: {0}")]
    InvalidConfig(String),

    #[error("degenerate region of interest: {0}")]
    DegenerateRoi(String),

    #[error("capture {0} carries no light position")]
    MissingReflectance(String),

    #[error("coverage map is {actual:?}, expected {expected:?}")]
    InvalidState {
        expected: crate::coverage::CoverageState,
        actual: crate::coverage::CoverageState,
    },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CameraError {
    #[error("camera is not connected")]
    NotConnected,

    #[error("camera device error: {0}")]
    Device(String),

    #[error("captured image could not be decoded: {0}")]
    Decode(String),
}
