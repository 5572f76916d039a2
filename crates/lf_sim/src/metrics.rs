use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
use prometheus::{Encoder, Gauge, IntCounter, Registry, TextEncoder};

pub struct SimMetrics {
    pub registry: Registry,
    pub captures_registered_total: IntCounter,
    pub capture_triggers_dropped_total: IntCounter,
    pub coverage_samples_skipped_total: IntCounter,
    pub coverage_fully_sampled_ratio: Gauge,
    pub nearest_queries_total: IntCounter,
}

impl SimMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new_custom(Some("lightfield".into()), None)?;

        macro_rules! reg {
            ($m:expr) => {{
                let m = $m;
                registry.register(Box::new(m.clone()))?;
                m
            }};
        }

        Ok(Self {
            captures_registered_total: reg!(IntCounter::new(
                "captures_registered_total",
                "Captures added to the registry"
            )?),
            capture_triggers_dropped_total: reg!(IntCounter::new(
                "capture_triggers_dropped_total",
                "Capture triggers dropped while a capture was in flight"
            )?),
            coverage_samples_skipped_total: reg!(IntCounter::new(
                "coverage_samples_skipped_total",
                "Coverage samples skipped for non-finite geometry"
            )?),
            coverage_fully_sampled_ratio: reg!(Gauge::new(
                "coverage_fully_sampled_ratio",
                "Fraction of ROI samples with all three channels observed"
            )?),
            nearest_queries_total: reg!(IntCounter::new(
                "nearest_queries_total",
                "Nearest-capture queries answered"
            )?),
            registry,
        })
    }

    pub fn router(&self) -> Router {
        let reg = self.registry.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let reg = reg.clone();
                async move {
                    let mf = reg.gather();
                    let mut buf = Vec::new();
                    match TextEncoder::new().encode(&mf, &mut buf) {
                        Ok(()) => String::from_utf8_lossy(&buf).into_owned().into_response(),
                        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
                    }
                }
            }),
        )
    }

    /// Brings a cumulative library counter up to `total`.
    pub fn sync_counter(counter: &IntCounter, total: u64) {
        let current = counter.get();
        if total > current {
            counter.inc_by(total - current);
        }
    }
}
