//! Reflectance coverage over a planar region of interest.
//!
//! The ROI is tessellated into a regular grid of samples sitting on cell
//! corners: `(x_samples + 1) * (y_samples + 1)` samples stored row-major,
//! `y = 0` along the upper edge (`ul -> ur`) and `x = 0` along the left edge.
//! Each sample tracks three angular channels of the half-vector/normal angle
//! and remembers the first capture that satisfied each one.

use crate::capture::{Capture, CaptureId};
use crate::error::CoverageError;
use crate::pose::{ndc_visible, project_ndc, Viewport};
use glam::{DMat4, DVec3};
use image::{Rgba, RgbaImage};

const ROI_TOLERANCE: f64 = 1e-6;

/// Angle in degrees between the surface normal and the half-vector of the
/// view and light directions at `surface_point`.
///
/// `None` when either direction or their sum has no usable length.
pub fn half_vector_angle_deg(
    camera_pos: DVec3,
    light_pos: DVec3,
    surface_point: DVec3,
    normal: DVec3,
) -> Option<f64> {
    let view_dir = (camera_pos - surface_point).try_normalize()?;
    let light_dir = (light_pos - surface_point).try_normalize()?;
    let half = (view_dir + light_dir).try_normalize()?;
    let n = normal.try_normalize()?;
    let theta = half.dot(n).clamp(-1.0, 1.0).acos().to_degrees();
    theta.is_finite().then_some(theta)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// `theta <= beta1`
    Blue,
    /// `beta1 < theta < beta2`
    Green,
    /// `theta >= beta2`
    Red,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Blue, Channel::Green, Channel::Red];

    #[inline]
    fn slot(self) -> usize {
        match self {
            Channel::Blue => 0,
            Channel::Green => 1,
            Channel::Red => 2,
        }
    }

    pub fn classify(theta_deg: f64, config: &CoverageConfig) -> Self {
        if theta_deg <= config.beta1_deg {
            Channel::Blue
        } else if theta_deg < config.beta2_deg {
            Channel::Green
        } else {
            Channel::Red
        }
    }

    /// One-hot RGBA used by the coverage texture.
    fn color(self) -> [f32; 4] {
        match self {
            Channel::Blue => [0.0, 0.0, 1.0, 1.0],
            Channel::Green => [0.0, 1.0, 0.0, 1.0],
            Channel::Red => [1.0, 0.0, 0.0, 1.0],
        }
    }
}

/// Which capture satisfied a channel, and where the sample landed on the
/// main camera's screen at that moment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSamplePoint {
    pub capture_id: CaptureId,
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CoverageSample {
    pub position: DVec3,
    observations: [Option<ImageSamplePoint>; 3],
}

impl CoverageSample {
    fn new(position: DVec3) -> Self {
        Self {
            position,
            observations: [None, None, None],
        }
    }

    pub fn observation(&self, channel: Channel) -> Option<&ImageSamplePoint> {
        self.observations[channel.slot()].as_ref()
    }

    pub fn is_satisfied(&self, channel: Channel) -> bool {
        self.observations[channel.slot()].is_some()
    }

    pub fn is_fully_sampled(&self) -> bool {
        self.observations.iter().all(Option::is_some)
    }

    /// First write wins; returns whether the observation was stored.
    fn record(&mut self, channel: Channel, point: ImageSamplePoint) -> bool {
        let slot = &mut self.observations[channel.slot()];
        if slot.is_some() {
            return false;
        }
        *slot = Some(point);
        true
    }

    fn color(&self) -> [f32; 4] {
        let on = |c: Channel| if self.is_satisfied(c) { 1.0 } else { 0.0 };
        [on(Channel::Red), on(Channel::Green), on(Channel::Blue), 1.0]
    }
}

/// Channel thresholds in degrees. Validated by [`CoverageMap::init`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoverageConfig {
    pub beta1_deg: f64,
    pub beta2_deg: f64,
}

impl CoverageConfig {
    pub fn new(beta1_deg: f64, beta2_deg: f64) -> Self {
        Self { beta1_deg, beta2_deg }
    }

    /// Requires `0 < beta1 < beta2 < 90`.
    pub fn validate(&self) -> Result<(), CoverageError> {
        let (b1, b2) = (self.beta1_deg, self.beta2_deg);
        if !b1.is_finite() || !b2.is_finite() {
            return Err(CoverageError::InvalidConfig(format!(
                "thresholds must be finite (beta1={b1}, beta2={b2})"
            )));
        }
        if b1 <= 0.0 || b2 <= 0.0 {
            return Err(CoverageError::InvalidConfig(format!(
                "thresholds must be positive (beta1={b1}, beta2={b2})"
            )));
        }
        if b1 >= b2 {
            return Err(CoverageError::InvalidConfig(format!(
                "beta1 must be below beta2 (beta1={b1}, beta2={b2})"
            )));
        }
        if b2 >= 90.0 {
            return Err(CoverageError::InvalidConfig(format!("beta2 must be below 90 degrees (beta2={b2})")));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverageState {
    Uninitialized,
    Active,
    TornDown,
}

/// The four ROI corners in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoiCorners {
    pub bottom_left: DVec3,
    pub upper_left: DVec3,
    pub bottom_right: DVec3,
    pub upper_right: DVec3,
}

impl RoiCorners {
    pub fn new(bottom_left: DVec3, upper_left: DVec3, bottom_right: DVec3, upper_right: DVec3) -> Self {
        Self {
            bottom_left,
            upper_left,
            bottom_right,
            upper_right,
        }
    }

    /// Rectangle centered on `center`, spanned by the `right` and `up`
    /// directions.
    pub fn rectangle(center: DVec3, right: DVec3, up: DVec3, width: f64, height: f64) -> Self {
        let hx = right.normalize_or_zero() * (width * 0.5);
        let hy = up.normalize_or_zero() * (height * 0.5);
        Self {
            bottom_left: center - hx - hy,
            upper_left: center - hx + hy,
            bottom_right: center + hx - hy,
            upper_right: center + hx + hy,
        }
    }

    /// Bilinear interpolation; `u` runs left to right, `v` top to bottom.
    #[inline]
    fn lerp(&self, u: f64, v: f64) -> DVec3 {
        let top = self.upper_left.lerp(self.upper_right, u);
        let bottom = self.bottom_left.lerp(self.bottom_right, u);
        top.lerp(bottom, v)
    }

    /// Unit normal `cross(right, down)` after checking the corners form a
    /// proper rectangle.
    fn normal(&self) -> Result<DVec3, CoverageError> {
        let corners = [self.bottom_left, self.upper_left, self.bottom_right, self.upper_right];
        if corners.iter().any(|c| !c.is_finite()) {
            return Err(CoverageError::DegenerateRoi("corner is not finite".into()));
        }

        let top = self.upper_right - self.upper_left;
        let left = self.bottom_left - self.upper_left;
        let scale = top.length().max(left.length());
        let right_vec = top
            .try_normalize()
            .ok_or_else(|| CoverageError::DegenerateRoi("upper edge has zero length".into()))?;
        let down_vec = left
            .try_normalize()
            .ok_or_else(|| CoverageError::DegenerateRoi("left edge has zero length".into()))?;

        let bottom = self.bottom_right - self.bottom_left;
        if !bottom.abs_diff_eq(top, ROI_TOLERANCE * scale) {
            return Err(CoverageError::DegenerateRoi(
                "bottom-right corner is off the plane of the other three".into(),
            ));
        }
        if right_vec.dot(down_vec).abs() > ROI_TOLERANCE {
            return Err(CoverageError::DegenerateRoi("edges are not perpendicular".into()));
        }

        right_vec
            .cross(down_vec)
            .try_normalize()
            .ok_or_else(|| CoverageError::DegenerateRoi("edges are collinear".into()))
    }
}

#[derive(Debug, Clone, Copy)]
struct Grid {
    roi: RoiCorners,
    normal: DVec3,
    x_samples: u32,
    y_samples: u32,
}

impl Grid {
    #[inline]
    fn columns(&self) -> usize {
        self.x_samples as usize + 1
    }

    #[inline]
    fn rows(&self) -> usize {
        self.y_samples as usize + 1
    }

    fn position(&self, x: u32, y: u32) -> DVec3 {
        let u = x as f64 / self.x_samples as f64;
        let v = y as f64 / self.y_samples as f64;
        self.roi.lerp(u, v)
    }
}

/// One RGBA texel per coverage sample, same layout as the sample grid.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageTexture {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<[f32; 4]>,
}

impl CoverageTexture {
    pub fn get(&self, x: u32, y: u32) -> Option<[f32; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels.get(y as usize * self.width as usize + x as usize).copied()
    }

    pub fn to_rgba8(&self) -> RgbaImage {
        RgbaImage::from_fn(self.width, self.height, |x, y| {
            let p = self.get(x, y).unwrap_or([0.0, 0.0, 0.0, 1.0]);
            Rgba(p.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8))
        })
    }
}

/// Accumulates which angular channels of each ROI sample have been seen.
#[derive(Debug, Clone)]
pub struct CoverageMap {
    config: CoverageConfig,
    state: CoverageState,
    grid: Option<Grid>,
    samples: Vec<CoverageSample>,
    skipped: u64,
}

impl CoverageMap {
    pub fn new(config: CoverageConfig) -> Self {
        Self {
            config,
            state: CoverageState::Uninitialized,
            grid: None,
            samples: Vec::new(),
            skipped: 0,
        }
    }

    pub fn config(&self) -> &CoverageConfig {
        &self.config
    }

    pub fn state(&self) -> CoverageState {
        self.state
    }

    fn expect_state(&self, expected: CoverageState) -> Result<(), CoverageError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(CoverageError::InvalidState {
                expected,
                actual: self.state,
            })
        }
    }

    fn active_grid(&self) -> Result<&Grid, CoverageError> {
        self.expect_state(CoverageState::Active)?;
        self.grid.as_ref().ok_or(CoverageError::InvalidState {
            expected: CoverageState::Active,
            actual: self.state,
        })
    }

    /// Builds the sample grid. Configuration errors are fatal: nothing is
    /// built and the map stays uninitialized.
    pub fn init(
        &mut self,
        bottom_left: DVec3,
        upper_left: DVec3,
        bottom_right: DVec3,
        upper_right: DVec3,
        x_samples: u32,
        y_samples: u32,
    ) -> Result<(), CoverageError> {
        self.config.validate()?;
        if x_samples == 0 || y_samples == 0 {
            return Err(CoverageError::InvalidConfig(format!(
                "sample grid must be non-empty ({x_samples}x{y_samples})"
            )));
        }
        self.expect_state(CoverageState::Uninitialized)?;

        let roi = RoiCorners::new(bottom_left, upper_left, bottom_right, upper_right);
        let grid = Grid {
            roi,
            normal: roi.normal()?,
            x_samples,
            y_samples,
        };

        let mut samples = Vec::with_capacity(grid.columns() * grid.rows());
        for y in 0..=y_samples {
            for x in 0..=x_samples {
                samples.push(CoverageSample::new(grid.position(x, y)));
            }
        }

        tracing::info!(
            x_samples,
            y_samples,
            samples = samples.len(),
            normal = ?grid.normal,
            beta1 = self.config.beta1_deg,
            beta2 = self.config.beta2_deg,
            "Coverage map initialized"
        );

        self.grid = Some(grid);
        self.samples = samples;
        self.state = CoverageState::Active;
        Ok(())
    }

    pub fn init_roi(&mut self, roi: RoiCorners, x_samples: u32, y_samples: u32) -> Result<(), CoverageError> {
        self.init(
            roi.bottom_left,
            roi.upper_left,
            roi.bottom_right,
            roi.upper_right,
            x_samples,
            y_samples,
        )
    }

    /// Ends the map's life. Samples are dropped; a new map is needed to
    /// start over.
    pub fn teardown(&mut self) -> Result<(), CoverageError> {
        self.expect_state(CoverageState::Active)?;
        self.grid = None;
        self.samples = Vec::new();
        self.state = CoverageState::TornDown;
        tracing::info!(skipped = self.skipped, "Coverage map torn down");
        Ok(())
    }

    pub fn normal(&self) -> Option<DVec3> {
        self.grid.map(|g| g.normal)
    }

    /// Grid dimensions in samples, `(columns, rows)`.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.grid.map(|g| (g.x_samples + 1, g.y_samples + 1))
    }

    pub fn samples(&self) -> &[CoverageSample] {
        &self.samples
    }

    pub fn sample(&self, x: u32, y: u32) -> Option<&CoverageSample> {
        let grid = self.grid.as_ref()?;
        if x > grid.x_samples || y > grid.y_samples {
            return None;
        }
        self.samples.get(y as usize * grid.columns() + x as usize)
    }

    /// Samples left out of an update because their projection or
    /// half-vector was not finite. Cumulative over the map's life.
    pub fn skipped_samples(&self) -> u64 {
        self.skipped
    }

    /// Fraction in `[0, 1]` of samples with all three channels satisfied.
    pub fn percent_fully_sampled(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let full = self.samples.iter().filter(|s| s.is_fully_sampled()).count();
        full as f64 / self.samples.len() as f64
    }

    pub fn texture(&self) -> Result<CoverageTexture, CoverageError> {
        let grid = self.active_grid()?;
        Ok(CoverageTexture {
            width: grid.x_samples + 1,
            height: grid.y_samples + 1,
            pixels: self.samples.iter().map(CoverageSample::color).collect(),
        })
    }

    /// Folds a new reflectance capture into the map.
    ///
    /// Samples outside the capture's frustum are untouched. Pixel
    /// coordinates are taken from `main_view`, the screen the texture is
    /// shown on.
    pub fn on_capture_taken(
        &mut self,
        capture: &Capture,
        main_view: &Viewport,
    ) -> Result<(CoverageTexture, f64), CoverageError> {
        let grid = *self.active_grid()?;
        let light = capture
            .reflectance()
            .ok_or_else(|| CoverageError::MissingReflectance(capture.id().to_string()))?
            .light_position;
        let camera_pos = capture.pose().position;
        let view_proj = capture.pose().view_projection();

        let mut skipped = 0u64;
        let mut recorded = 0usize;
        for sample in self.samples.iter_mut() {
            let Some(ndc) = project_ndc(&view_proj, sample.position) else {
                skipped += 1;
                continue;
            };
            if !ndc_visible(ndc) {
                continue;
            }
            let Some(theta) = half_vector_angle_deg(camera_pos, light, sample.position, grid.normal) else {
                skipped += 1;
                continue;
            };
            let channel = Channel::classify(theta, &self.config);
            if sample.is_satisfied(channel) {
                continue;
            }
            let Some((x, y)) = main_view.world_to_pixel(sample.position) else {
                skipped += 1;
                continue;
            };
            let point = ImageSamplePoint {
                capture_id: capture.id().clone(),
                x,
                y,
            };
            if sample.record(channel, point) {
                recorded += 1;
            }
        }

        if skipped > 0 {
            tracing::warn!(capture_id = %capture.id(), skipped, "Skipped coverage samples");
        }
        self.skipped += skipped;

        let percent = self.percent_fully_sampled();
        tracing::debug!(capture_id = %capture.id(), recorded, percent, "Coverage updated");
        Ok((self.texture()?, percent))
    }

    /// Colors each sample by the channel a capture from `camera_pos` with
    /// the light at `light_pos` would satisfy; black where not visible.
    /// Leaves the map unchanged.
    pub fn preview(
        &self,
        view_proj: &DMat4,
        camera_pos: DVec3,
        light_pos: DVec3,
    ) -> Result<CoverageTexture, CoverageError> {
        let grid = self.active_grid()?;
        let black = [0.0, 0.0, 0.0, 1.0];
        let pixels = self
            .samples
            .iter()
            .map(|s| {
                let visible = project_ndc(view_proj, s.position).is_some_and(ndc_visible);
                if !visible {
                    return black;
                }
                half_vector_angle_deg(camera_pos, light_pos, s.position, grid.normal)
                    .map(|theta| Channel::classify(theta, &self.config).color())
                    .unwrap_or(black)
            })
            .collect();
        Ok(CoverageTexture {
            width: grid.x_samples + 1,
            height: grid.y_samples + 1,
            pixels,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::ReflectanceMeta;
    use crate::pose::{perspective, Pose};
    use approx::assert_abs_diff_eq;

    // Tabletop ROI in the XZ plane, normal +Y.
    fn table() -> RoiCorners {
        RoiCorners::rectangle(DVec3::ZERO, DVec3::X, DVec3::Z, 1.0, 1.0)
    }

    fn active_map(b1: f64, b2: f64, xs: u32, ys: u32) -> CoverageMap {
        let mut map = CoverageMap::new(CoverageConfig::new(b1, b2));
        map.init_roi(table(), xs, ys).unwrap();
        map
    }

    fn shot(id: &str, camera: DVec3, light: DVec3) -> Capture {
        let pose = Pose::looking_at(camera, DVec3::ZERO, DVec3::NEG_Z, perspective(60.0, 1.0, 0.1, 500.0));
        Capture::new(
            CaptureId::from(id),
            RgbaImage::new(4, 4),
            pose,
            Some(ReflectanceMeta { light_position: light }),
        )
    }

    fn main_view() -> Viewport {
        let pose = Pose::looking_at(DVec3::new(0.0, 5.0, 0.0), DVec3::ZERO, DVec3::NEG_Z, perspective(60.0, 1.0, 0.1, 100.0));
        Viewport::new(pose.view_projection(), 256, 256)
    }

    /// Camera and light together at `deg` from the normal, `dist` away.
    fn at_angle(deg: f64, dist: f64) -> DVec3 {
        let r = deg.to_radians();
        DVec3::new(r.sin(), r.cos(), 0.0) * dist
    }

    #[test]
    fn zero_beta1_is_a_config_error() {
        let mut map = CoverageMap::new(CoverageConfig::new(0.0, 30.0));
        let err = map.init_roi(table(), 4, 4).unwrap_err();
        assert!(matches!(err, CoverageError::InvalidConfig(_)));
        assert_eq!(map.state(), CoverageState::Uninitialized);
        assert!(map.samples().is_empty());
    }

    #[test]
    fn rejects_bad_thresholds_and_grid() {
        for (b1, b2) in [(30.0, 30.0), (40.0, 20.0), (10.0, 90.0), (f64::NAN, 20.0)] {
            assert!(CoverageConfig::new(b1, b2).validate().is_err(), "{b1} {b2}");
        }
        let mut map = CoverageMap::new(CoverageConfig::new(10.0, 20.0));
        assert!(matches!(
            map.init_roi(table(), 0, 3),
            Err(CoverageError::InvalidConfig(_))
        ));
    }

    #[test]
    fn rejects_degenerate_roi() {
        let mut map = CoverageMap::new(CoverageConfig::new(10.0, 20.0));
        let p = DVec3::ONE;
        let err = map.init(p, p, p, p, 2, 2).unwrap_err();
        assert!(matches!(err, CoverageError::DegenerateRoi(_)));

        let mut skewed = table();
        skewed.bottom_right.y += 0.3;
        let mut map = CoverageMap::new(CoverageConfig::new(10.0, 20.0));
        assert!(matches!(map.init_roi(skewed, 2, 2), Err(CoverageError::DegenerateRoi(_))));
    }

    #[test]
    fn grid_lies_on_cell_corners() {
        let map = active_map(10.0, 20.0, 4, 2);
        assert_eq!(map.samples().len(), 5 * 3);
        assert_eq!(map.dimensions(), Some((5, 3)));
        let roi = table();
        assert!(map.sample(0, 0).unwrap().position.abs_diff_eq(roi.upper_left, 1e-12));
        assert!(map.sample(4, 0).unwrap().position.abs_diff_eq(roi.upper_right, 1e-12));
        assert!(map.sample(0, 2).unwrap().position.abs_diff_eq(roi.bottom_left, 1e-12));
        assert!(map.sample(4, 2).unwrap().position.abs_diff_eq(roi.bottom_right, 1e-12));
        assert!(map.sample(2, 1).unwrap().position.abs_diff_eq(DVec3::ZERO, 1e-12));
        assert!(map.sample(5, 0).is_none());
        assert!(map.normal().unwrap().abs_diff_eq(DVec3::Y, 1e-12));
    }

    #[test]
    fn channel_thresholds() {
        let c = CoverageConfig::new(10.0, 20.0);
        assert_eq!(Channel::classify(0.0, &c), Channel::Blue);
        assert_eq!(Channel::classify(10.0, &c), Channel::Blue);
        assert_eq!(Channel::classify(10.0001, &c), Channel::Green);
        assert_eq!(Channel::classify(19.999, &c), Channel::Green);
        assert_eq!(Channel::classify(20.0, &c), Channel::Red);
        assert_eq!(Channel::classify(85.0, &c), Channel::Red);
    }

    #[test]
    fn light_along_normal_gives_zero_angle() {
        let theta = half_vector_angle_deg(DVec3::Y * 3.0, DVec3::Y * 7.0, DVec3::ZERO, DVec3::Y).unwrap();
        assert_abs_diff_eq!(theta, 0.0, epsilon = 1e-5);
        let grazing = half_vector_angle_deg(DVec3::X * 3.0, DVec3::X * 3.0, DVec3::ZERO, DVec3::Y).unwrap();
        assert_abs_diff_eq!(grazing, 90.0, epsilon = 1e-5);
    }

    #[test]
    fn first_write_wins() {
        let mut map = active_map(10.0, 20.0, 2, 2);
        let pos = at_angle(0.0, 10.0);
        map.on_capture_taken(&shot("c1", pos, pos), &main_view()).unwrap();
        map.on_capture_taken(&shot("c2", pos, pos), &main_view()).unwrap();

        for s in map.samples() {
            let obs = s.observation(Channel::Blue).unwrap();
            assert_eq!(obs.capture_id.as_str(), "c1");
            assert!(!s.is_satisfied(Channel::Green));
        }
    }

    #[test]
    fn invisible_samples_are_untouched() {
        let mut map = active_map(10.0, 20.0, 2, 2);
        // Camera above the table, looking away from it.
        let pose = Pose::looking_at(DVec3::Y * 5.0, DVec3::Y * 10.0, DVec3::Z, perspective(60.0, 1.0, 0.1, 100.0));
        let away = Capture::new(
            CaptureId::from("away"),
            RgbaImage::new(2, 2),
            pose,
            Some(ReflectanceMeta { light_position: DVec3::Y * 5.0 }),
        );
        let (texture, percent) = map.on_capture_taken(&away, &main_view()).unwrap();
        assert_eq!(percent, 0.0);
        assert!(map.samples().iter().all(|s| Channel::ALL.iter().all(|&c| !s.is_satisfied(c))));
        assert!(texture.pixels.iter().all(|p| *p == [0.0, 0.0, 0.0, 1.0]));
    }

    #[test]
    fn samples_outside_the_side_planes_are_untouched() {
        let mut map = active_map(10.0, 20.0, 4, 4);
        // Narrow view centered on the right edge: half-width 0.375 at the table.
        let eye = DVec3::new(0.5, 10.0, 0.0);
        let fov = (2.0 * (0.375f64 / 10.0).atan()).to_degrees();
        let pose = Pose::looking_at(eye, DVec3::new(0.5, 0.0, 0.0), DVec3::NEG_Z, perspective(fov, 1.0, 0.1, 100.0));
        let capture = Capture::new(
            CaptureId::from("narrow"),
            RgbaImage::new(2, 2),
            pose,
            Some(ReflectanceMeta { light_position: eye }),
        );
        map.on_capture_taken(&capture, &main_view()).unwrap();

        let view_proj = capture.pose().view_projection();
        let mut inside = 0;
        for s in map.samples() {
            let ndc = project_ndc(&view_proj, s.position).unwrap();
            // Depth is in range everywhere; only x/y decide visibility here.
            assert!(ndc.z.abs() <= 1.0);
            let in_frustum = (s.position.x - 0.5).abs() < 0.3 && s.position.z.abs() < 0.3;
            assert_eq!(ndc_visible(ndc), in_frustum, "{:?}", s.position);
            assert_eq!(s.is_satisfied(Channel::Blue), in_frustum, "{:?}", s.position);
            assert!(!s.is_satisfied(Channel::Green) && !s.is_satisfied(Channel::Red));
            inside += usize::from(in_frustum);
        }
        assert_eq!(inside, 6);
    }

    #[test]
    fn three_bands_fill_the_map() {
        let mut map = active_map(10.0, 20.0, 3, 3);
        let view = main_view();

        let blue = at_angle(0.0, 50.0);
        let (_, p1) = map.on_capture_taken(&shot("blue", blue, blue), &view).unwrap();
        assert_eq!(p1, 0.0);

        let green = at_angle(15.0, 50.0);
        map.on_capture_taken(&shot("green", green, green), &view).unwrap();

        let red = at_angle(45.0, 50.0);
        let (texture, p3) = map.on_capture_taken(&shot("red", red, red), &view).unwrap();

        assert_abs_diff_eq!(p3, 1.0, epsilon = 1e-12);
        assert!(texture.pixels.iter().all(|p| *p == [1.0, 1.0, 1.0, 1.0]));
        let s = map.sample(1, 2).unwrap();
        assert_eq!(s.observation(Channel::Green).unwrap().capture_id.as_str(), "green");
        assert_eq!(s.observation(Channel::Red).unwrap().capture_id.as_str(), "red");
    }

    #[test]
    fn pixel_coordinates_come_from_main_view() {
        let mut map = active_map(10.0, 20.0, 2, 2);
        let pos = at_angle(0.0, 20.0);
        map.on_capture_taken(&shot("c", pos, pos), &main_view()).unwrap();
        let center = map.sample(1, 1).unwrap().observation(Channel::Blue).unwrap();
        assert_eq!((center.x, center.y), (128, 128));
    }

    #[test]
    fn opposite_light_counts_a_skip() {
        let mut map = active_map(10.0, 20.0, 2, 2);
        let capture = shot("c", DVec3::Y * 10.0, DVec3::NEG_Y * 10.0);
        map.on_capture_taken(&capture, &main_view()).unwrap();
        assert_eq!(map.skipped_samples(), 1);
        assert!(!map.sample(1, 1).unwrap().is_satisfied(Channel::Red));
        assert!(map.sample(0, 0).unwrap().is_satisfied(Channel::Red));
    }

    #[test]
    fn capture_without_light_is_rejected() {
        let mut map = active_map(10.0, 20.0, 1, 1);
        let pose = Pose::looking_at(DVec3::Y * 5.0, DVec3::ZERO, DVec3::NEG_Z, perspective(60.0, 1.0, 0.1, 100.0));
        let capture = Capture::new(CaptureId::from("lf"), RgbaImage::new(1, 1), pose, None);
        assert!(matches!(
            map.on_capture_taken(&capture, &main_view()),
            Err(CoverageError::MissingReflectance(_))
        ));
    }

    #[test]
    fn preview_does_not_mutate() {
        let map = active_map(10.0, 20.0, 2, 2);
        let green = at_angle(15.0, 50.0);
        let pose = Pose::looking_at(green, DVec3::ZERO, DVec3::NEG_Z, perspective(60.0, 1.0, 0.1, 500.0));
        let texture = map.preview(&pose.view_projection(), green, green).unwrap();
        assert!(texture.pixels.iter().all(|p| *p == [0.0, 1.0, 0.0, 1.0]));
        assert_eq!(map.percent_fully_sampled(), 0.0);
        assert!(map.samples().iter().all(|s| !s.is_satisfied(Channel::Green)));
    }

    #[test]
    fn lifecycle_is_one_way() {
        let mut map = CoverageMap::new(CoverageConfig::new(10.0, 20.0));
        let pos = at_angle(0.0, 10.0);
        assert!(matches!(
            map.on_capture_taken(&shot("c", pos, pos), &main_view()),
            Err(CoverageError::InvalidState { .. })
        ));
        map.init_roi(table(), 1, 1).unwrap();
        assert!(map.init_roi(table(), 1, 1).is_err());
        map.teardown().unwrap();
        assert_eq!(map.state(), CoverageState::TornDown);
        assert_eq!(
            map.init_roi(table(), 1, 1),
            Err(CoverageError::InvalidState {
                expected: CoverageState::Uninitialized,
                actual: CoverageState::TornDown,
            })
        );
        assert!(map.texture().is_err());
    }

    #[test]
    fn texture_exports_to_rgba8() {
        let mut map = active_map(10.0, 20.0, 1, 1);
        let pos = at_angle(0.0, 10.0);
        let (texture, _) = map.on_capture_taken(&shot("c", pos, pos), &main_view()).unwrap();
        let img = texture.to_rgba8();
        assert_eq!(img.dimensions(), (2, 2));
        assert_eq!(img.get_pixel(0, 0).0, [0, 0, 255, 255]);
    }
}
