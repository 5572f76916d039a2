use crate::config::ViewArgs;
use crate::metrics::SimMetrics;
use anyhow::Context;
use lightfield::camera::OrbitCamera;
use lightfield::pose::{ndc_visible, perspective, project_ndc, projector_matrix};
use lightfield::{blend_weights, LightField, LightFieldOptions, SessionStore};
use std::time::Duration;

const ORBIT_STEP_RAD: f64 = 0.05;

pub async fn run(args: ViewArgs, metrics: &SimMetrics) -> anyhow::Result<()> {
    let options = LightFieldOptions {
        degenerate_policy: args.degenerate_policy.into(),
        orient_toward_focal: args.orient_toward_focal,
    };
    let store = SessionStore::new(&args.sessions_root);
    let session = args.session.clone();
    let (radius, center) = (args.dest_radius, args.dest_center);

    // Decoding every image is blocking work.
    let light_field = tokio::task::spawn_blocking(move || LightField::load(&store, &session, radius, center, options))
        .await
        .context("light field loader panicked")?
        .with_context(|| format!("failed to load session {:?} from {}", args.session, args.sessions_root.display()))?;

    if light_field.is_empty() {
        tracing::warn!(session = %args.session, "Session has no captures; nothing to select");
    }

    let mut camera = OrbitCamera::new(center, radius * 1.5, perspective(60.0, 16.0 / 9.0, 0.01, radius * 100.0));
    let mut interval = tokio::time::interval(Duration::from_millis(args.tick_ms));
    let mut ticks = 0u64;

    tracing::info!(captures = light_field.len(), k = args.k, "Starting view loop...");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown signal received.");
                break;
            },
            _ = interval.tick() => {
                camera.orbit(ORBIT_STEP_RAD, 0.0);
                let viewer = camera.position();

                let selected = light_field.find_nearest(args.k, viewer);
                metrics.nearest_queries_total.inc();

                if let Some(front) = selected.first() {
                    let weights = blend_weights(viewer, &selected);
                    let projector = projector_matrix(&camera.proj, front.viewing_pose());
                    let focal_in_view = project_ndc(&projector, center).is_some_and(ndc_visible);
                    let ids: Vec<&str> = selected.iter().map(|v| v.id().as_str()).collect();
                    tracing::debug!(
                        tick = ticks,
                        viewer = ?viewer,
                        selected = ?ids,
                        weights = ?weights,
                        focal_in_view,
                        "Selected captures"
                    );
                }

                ticks += 1;
                if args.ticks > 0 && ticks >= args.ticks {
                    break;
                }
            }
        }
    }

    tracing::info!(ticks, "View loop finished");
    Ok(())
}
