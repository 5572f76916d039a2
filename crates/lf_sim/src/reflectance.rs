use crate::config::ReflectanceArgs;
use crate::metrics::SimMetrics;
use crate::synthetic::SyntheticCamera;
use anyhow::Context;
use glam::DVec3;
use lightfield::acquisition::{CaptureOutcome, CaptureSession};
use lightfield::camera::OrbitCamera;
use lightfield::pose::perspective;
use lightfield::{
    CaptureIndex, CaptureRegistry, CoverageConfig, CoverageMap, ReflectanceMeta, RoiCorners, SessionStore,
};
use std::time::Duration;

const VIEWPORT: (u32, u32) = (640, 480);
const CAMERA_LATENCY_MS: (u64, u64) = (50, 600);
/// The light is mounted beside the lens.
const LIGHT_OFFSET: DVec3 = DVec3::new(0.05, 0.1, 0.0);

struct Capturing {
    coverage: CoverageMap,
    registry: CaptureRegistry,
    index: CaptureIndex,
}

impl Capturing {
    fn register(
        &mut self,
        outcome: CaptureOutcome,
        camera: &OrbitCamera,
        metrics: &SimMetrics,
    ) -> anyhow::Result<()> {
        let image = match outcome.image {
            Ok(image) => image,
            Err(e) => {
                tracing::warn!(request = outcome.request, error = %e, "Discarding failed capture");
                return Ok(());
            }
        };

        let position = outcome.pose.position;
        let closest_prior = self
            .index
            .nearest(1, position, self.registry.as_slice())
            .first()
            .map(|c| c.pose().position.distance(position));
        metrics.nearest_queries_total.inc();

        let id = self.registry.register(image, outcome.pose, outcome.reflectance)?;
        self.index.insert(position, self.registry.len() - 1);
        metrics.captures_registered_total.inc();

        let capture = self
            .registry
            .get(&id)
            .context("registered capture missing from registry")?;
        let (_, fully) = self
            .coverage
            .on_capture_taken(capture, &camera.viewport(VIEWPORT.0, VIEWPORT.1))?;

        metrics.coverage_fully_sampled_ratio.set(fully);
        SimMetrics::sync_counter(&metrics.coverage_samples_skipped_total, self.coverage.skipped_samples());
        tracing::info!(capture_id = %id, fully_sampled = fully, closest_prior = ?closest_prior, "Coverage updated");
        Ok(())
    }
}

pub async fn run(args: ReflectanceArgs, metrics: &SimMetrics) -> anyhow::Result<()> {
    let mut coverage = CoverageMap::new(CoverageConfig::new(args.beta1, args.beta2));
    // Tabletop ROI at the origin, facing +Y.
    let roi = RoiCorners::rectangle(DVec3::ZERO, DVec3::X, DVec3::Z, args.roi_width, args.roi_height);
    coverage
        .init_roi(roi, args.x_samples, args.y_samples)
        .context("coverage map configuration rejected")?;

    let mut state = Capturing {
        coverage,
        registry: CaptureRegistry::new(),
        index: CaptureIndex::new(),
    };

    let extent = args.roi_width.max(args.roi_height);
    let mut camera = OrbitCamera::new(DVec3::ZERO, extent * 2.5, perspective(50.0, 4.0 / 3.0, 0.01, extent * 50.0));
    camera.orbit(0.0, 40.0f64.to_radians());

    let mut session = CaptureSession::new(SyntheticCamera::new(args.seed, CAMERA_LATENCY_MS));
    session.start().context("failed to start camera")?;

    let mut interval = tokio::time::interval(Duration::from_millis(args.tick_ms));
    let mut tick = 0u64;

    tracing::info!(target_captures = args.captures, "Starting reflectance capture loop...");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown signal received.");
                break;
            },
            _ = interval.tick() => {
                tick += 1;
                // Sweep azimuth while slowly bobbing in elevation.
                let bob = 0.02 * (tick as f64 * 0.3).sin();
                camera.orbit(0.35, bob);
                let light = camera.position() + LIGHT_OFFSET * extent;

                let preview = state
                    .coverage
                    .preview(&camera.view_proj(), camera.position(), light)?;
                let lit = preview.pixels.iter().filter(|p| p[..3] != [0.0, 0.0, 0.0]).count();
                tracing::debug!(tick, visible_samples = lit, "Preview");

                session.trigger(camera.pose(), Some(ReflectanceMeta { light_position: light }))?;
                SimMetrics::sync_counter(&metrics.capture_triggers_dropped_total, session.dropped_triggers());

                for outcome in session.poll() {
                    state.register(outcome, &camera, metrics)?;
                }
                if state.registry.len() >= args.captures {
                    break;
                }
            }
        }
    }

    session.join_in_flight();
    for outcome in session.poll() {
        state.register(outcome, &camera, metrics)?;
    }
    session.stop().context("failed to stop camera")?;

    let texture = state.coverage.texture()?;
    if let Some(path) = &args.coverage_png {
        texture
            .to_rgba8()
            .save(path)
            .with_context(|| format!("failed to write coverage texture to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Wrote coverage texture");
    }

    if let Some(name) = &args.save_session {
        let store = SessionStore::new(&args.sessions_root);
        store
            .save_captures(name, DVec3::ZERO, camera.radius, state.registry.as_slice())
            .with_context(|| format!("failed to save session {name:?}"))?;
    }

    tracing::info!(
        captures = state.registry.len(),
        fully_sampled = state.coverage.percent_fully_sampled(),
        skipped = state.coverage.skipped_samples(),
        dropped_triggers = session.dropped_triggers(),
        "Reflectance session finished"
    );
    state.coverage.teardown()?;
    Ok(())
}
