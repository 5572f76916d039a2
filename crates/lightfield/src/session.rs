//! Persisted light-field sessions.
//!
//! Directory layout under a sessions root:
//!
//! ```text
//! <root>/<sessionName>/capture.json
//! <root>/<sessionName>/CaptureImages/<imageFileName>
//! ```
//!
//! `capture.json` schema (camelCase keys):
//!
//! ```text
//! { sessionName, focalPoint: {x,y,z}, sphereRadius,
//!   captures: [ { imageFileName,
//!                 transform: { forward, up, right, position: {x,y,z},
//!                              projMatrix: 4x4 row-major } } ] }
//! ```
//!
//! `projMatrix` is also accepted as Unity's `{e00 .. e33}` object form.

use crate::capture::Capture;
use crate::error::{SessionLoadError, SessionSaveError};
use crate::pose::Pose;
use glam::{DMat4, DVec3};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Component, Path, PathBuf};

pub const SESSION_FILE_NAME: &str = "capture.json";
pub const IMAGE_DIR_NAME: &str = "CaptureImages";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vec3Json {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl From<DVec3> for Vec3Json {
    fn from(v: DVec3) -> Self {
        Self { x: v.x, y: v.y, z: v.z }
    }
}

impl From<Vec3Json> for DVec3 {
    fn from(v: Vec3Json) -> Self {
        DVec3::new(v.x, v.y, v.z)
    }
}

/// Unity's `Matrix4x4` serialization, `eRC` = row R, column C.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[rustfmt::skip]
pub struct UnityMatrixJson {
    pub e00: f64, pub e01: f64, pub e02: f64, pub e03: f64,
    pub e10: f64, pub e11: f64, pub e12: f64, pub e13: f64,
    pub e20: f64, pub e21: f64, pub e22: f64, pub e23: f64,
    pub e30: f64, pub e31: f64, pub e32: f64, pub e33: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MatrixJson {
    /// Outer index is the row.
    Rows([[f64; 4]; 4]),
    Unity(UnityMatrixJson),
}

impl MatrixJson {
    pub fn to_mat4(&self) -> DMat4 {
        let rows = match *self {
            MatrixJson::Rows(rows) => rows,
            MatrixJson::Unity(m) => [
                [m.e00, m.e01, m.e02, m.e03],
                [m.e10, m.e11, m.e12, m.e13],
                [m.e20, m.e21, m.e22, m.e23],
                [m.e30, m.e31, m.e32, m.e33],
            ],
        };
        // glam stores columns; reading rows as columns gives the transpose.
        DMat4::from_cols_array_2d(&rows).transpose()
    }
}

impl From<DMat4> for MatrixJson {
    fn from(m: DMat4) -> Self {
        MatrixJson::Rows(m.transpose().to_cols_array_2d())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformJson {
    pub forward: Vec3Json,
    pub up: Vec3Json,
    pub right: Vec3Json,
    pub position: Vec3Json,
    pub proj_matrix: MatrixJson,
}

impl TransformJson {
    /// The stored basis is taken as-is; the view matrix is derived from it.
    pub fn to_pose(&self) -> Pose {
        Pose {
            position: self.position.into(),
            forward: self.forward.into(),
            up: self.up.into(),
            right: self.right.into(),
            rotation: None,
            projection: self.proj_matrix.to_mat4(),
            world_to_camera: None,
        }
    }
}

impl From<&Pose> for TransformJson {
    fn from(p: &Pose) -> Self {
        Self {
            forward: p.forward.into(),
            up: p.up.into(),
            right: p.right.into(),
            position: p.position.into(),
            proj_matrix: p.projection.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureJson {
    /// Relative to `<session>/CaptureImages/`.
    pub image_file_name: String,
    pub transform: TransformJson,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LightFieldSession {
    pub session_name: String,
    pub focal_point: Vec3Json,
    /// Nominal only; loaders recompute the radius per capture.
    pub sphere_radius: f64,
    #[serde(default)]
    pub captures: Vec<CaptureJson>,
}

impl LightFieldSession {
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// A directory holding one sub-directory per session.
#[derive(Debug, Clone)]
pub struct SessionStore {
    root: PathBuf,
}

impl SessionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn session_dir(&self, session_name: &str) -> PathBuf {
        self.root.join(session_name)
    }

    pub fn session_file(&self, session_name: &str) -> PathBuf {
        self.session_dir(session_name).join(SESSION_FILE_NAME)
    }

    pub fn image_path(&self, session_name: &str, image_file_name: &str) -> PathBuf {
        self.session_dir(session_name)
            .join(IMAGE_DIR_NAME)
            .join(image_file_name)
    }

    /// Reads and parses `capture.json` without touching the images.
    pub fn read_session(&self, session_name: &str) -> Result<LightFieldSession, SessionLoadError> {
        let path = self.session_file(session_name);
        let text = fs::read_to_string(&path).map_err(|source| SessionLoadError::Io {
            path: path.clone(),
            source,
        })?;
        LightFieldSession::from_json_str(&text).map_err(|source| SessionLoadError::Json { path, source })
    }

    /// Decodes one capture image. A missing or corrupt file is an error;
    /// no placeholder is ever substituted.
    pub fn load_image(&self, session_name: &str, image_file_name: &str) -> Result<RgbaImage, SessionLoadError> {
        if !is_plain_file_name(image_file_name) {
            return Err(SessionLoadError::InvalidImageName {
                image_file_name: image_file_name.to_owned(),
            });
        }
        let path = self.image_path(session_name, image_file_name);
        let bytes = fs::read(&path).map_err(|source| SessionLoadError::Io {
            path: path.clone(),
            source,
        })?;
        let img = image::load_from_memory(&bytes).map_err(|source| SessionLoadError::Image { path, source })?;
        Ok(img.to_rgba8())
    }

    /// Reads a session and all of its images, in capture order. Images are
    /// resolved under the `session_name` directory, whatever name the JSON
    /// records.
    pub fn load(&self, session_name: &str) -> Result<(LightFieldSession, Vec<RgbaImage>), SessionLoadError> {
        let session = self.read_session(session_name)?;
        let images = session
            .captures
            .iter()
            .map(|c| self.load_image(session_name, &c.image_file_name))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((session, images))
    }

    /// Writes `capture.json` and one image file per capture.
    pub fn save(&self, session: &LightFieldSession, images: &[&RgbaImage]) -> Result<(), SessionSaveError> {
        if session.captures.len() != images.len() {
            return Err(SessionSaveError::ImageCountMismatch {
                captures: session.captures.len(),
                images: images.len(),
            });
        }

        if let Some(bad) = session.captures.iter().find(|c| !is_plain_file_name(&c.image_file_name)) {
            return Err(SessionSaveError::InvalidImageName {
                image_file_name: bad.image_file_name.clone(),
            });
        }

        let image_dir = self.session_dir(&session.session_name).join(IMAGE_DIR_NAME);
        fs::create_dir_all(&image_dir).map_err(|source| SessionSaveError::Io {
            path: image_dir.clone(),
            source,
        })?;

        for (capture, img) in session.captures.iter().zip(images) {
            let path = image_dir.join(&capture.image_file_name);
            write_image(&path, img)?;
        }

        let json = session.to_json_string()?;
        let path = self.session_file(&session.session_name);
        fs::write(&path, json).map_err(|source| SessionSaveError::Io { path, source })?;

        tracing::info!(
            session = %session.session_name,
            captures = session.captures.len(),
            "Saved light field session"
        );
        Ok(())
    }

    /// Persists a registry's captures, naming the n-th image `img_<n>.png`.
    pub fn save_captures(
        &self,
        session_name: &str,
        focal_point: DVec3,
        sphere_radius: f64,
        captures: &[Capture],
    ) -> Result<LightFieldSession, SessionSaveError> {
        let session = LightFieldSession {
            session_name: session_name.to_owned(),
            focal_point: focal_point.into(),
            sphere_radius,
            captures: captures
                .iter()
                .enumerate()
                .map(|(i, c)| CaptureJson {
                    image_file_name: format!("img_{i}.png"),
                    transform: TransformJson::from(c.pose()),
                })
                .collect(),
        };
        let images: Vec<&RgbaImage> = captures.iter().map(Capture::image).collect();
        self.save(&session, &images)?;
        Ok(session)
    }
}

/// Exactly one normal path component, so the image stays inside
/// `CaptureImages/`.
fn is_plain_file_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

fn write_image(path: &Path, img: &RgbaImage) -> Result<(), SessionSaveError> {
    let is_jpeg = path
        .extension()
        .and_then(|e| e.to_str())
        .map_or(false, |e| e.eq_ignore_ascii_case("jpg") || e.eq_ignore_ascii_case("jpeg"));

    let result = if is_jpeg {
        // JPEG has no alpha channel.
        image::DynamicImage::ImageRgba8(img.clone()).to_rgb8().save(path)
    } else {
        img.save(path)
    };
    result.map_err(|source| SessionSaveError::Image {
        path: path.to_path_buf(),
        source,
    })
}
