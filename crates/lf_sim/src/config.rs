use clap::{Args, Parser, Subcommand, ValueEnum};
use glam::DVec3;
use lightfield::DegenerateCapturePolicy;
use std::net::SocketAddr;
use std::path::PathBuf;

/// `lf_sim` - A headless driver for light-field viewing and reflectance capture.
///
/// Runs the capture-registration and coverage library on a fixed tick, with a
/// synthetic orbiting viewer standing in for the interactive main camera.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Listen address for the Prometheus metrics endpoint.
    ///
    /// Metrics are only served when this is set.
    #[arg(long, env = "LF_METRICS_LISTEN_ADDR", global = true)]
    pub metrics_listen_addr: Option<SocketAddr>,

    #[command(subcommand)]
    pub mode: Mode,
}

#[derive(Subcommand, Debug)]
pub enum Mode {
    /// Load a session and run nearest-view selection for an orbiting viewer.
    View(ViewArgs),
    /// Simulate a reflectance capture session over a planar region.
    Reflectance(ReflectanceArgs),
}

#[derive(Args, Debug)]
pub struct ViewArgs {
    /// Directory holding one sub-directory per session.
    #[arg(long, env = "LF_SESSIONS_ROOT")]
    pub sessions_root: PathBuf,

    /// Session to load, i.e. `<sessions-root>/<session>/capture.json`.
    #[arg(long, env = "LF_SESSION")]
    pub session: String,

    /// Radius of the viewing sphere.
    #[arg(long, default_value_t = 1.0)]
    pub dest_radius: f64,

    /// Center of the viewing sphere as `x,y,z`.
    #[arg(long, value_parser = parse_vec3, default_value = "0,0,0")]
    pub dest_center: DVec3,

    /// Captures selected per tick; more than one enables blending.
    #[arg(long, default_value_t = 1)]
    pub k: usize,

    /// Ticks to run before exiting; 0 runs until interrupted.
    #[arg(long, default_value_t = 0)]
    pub ticks: u64,

    /// Tick period in milliseconds.
    #[arg(long, default_value_t = 250, value_parser = clap::value_parser!(u64).range(1..))]
    pub tick_ms: u64,

    /// What to do with captures stored on the focal point.
    #[arg(long, value_enum, default_value_t = PolicyArg::Reject)]
    pub degenerate_policy: PolicyArg,

    /// Aim each registered capture at the viewing sphere's center.
    #[arg(long)]
    pub orient_toward_focal: bool,
}

#[derive(Args, Debug)]
pub struct ReflectanceArgs {
    /// Upper bound of the blue band, in degrees.
    #[arg(long, env = "LF_BETA1")]
    pub beta1: f64,

    /// Lower bound of the red band, in degrees.
    #[arg(long, env = "LF_BETA2")]
    pub beta2: f64,

    #[arg(long, default_value_t = 32)]
    pub x_samples: u32,

    #[arg(long, default_value_t = 32)]
    pub y_samples: u32,

    /// ROI extent along world X.
    #[arg(long, default_value_t = 1.0)]
    pub roi_width: f64,

    /// ROI extent along world Z.
    #[arg(long, default_value_t = 1.0)]
    pub roi_height: f64,

    /// Captures to register before stopping.
    #[arg(long, default_value_t = 24)]
    pub captures: usize,

    /// Tick period in milliseconds.
    #[arg(long, default_value_t = 250, value_parser = clap::value_parser!(u64).range(1..))]
    pub tick_ms: u64,

    /// Save the captures as a session with this name.
    #[arg(long)]
    pub save_session: Option<String>,

    #[arg(long, env = "LF_SESSIONS_ROOT", default_value = "sessions")]
    pub sessions_root: PathBuf,

    /// Write the final coverage texture to this PNG.
    #[arg(long)]
    pub coverage_png: Option<PathBuf>,

    /// Seed for the synthetic camera.
    #[arg(long, default_value_t = 7)]
    pub seed: u64,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyArg {
    Reject,
    Skip,
}

impl From<PolicyArg> for DegenerateCapturePolicy {
    fn from(p: PolicyArg) -> Self {
        match p {
            PolicyArg::Reject => DegenerateCapturePolicy::Reject,
            PolicyArg::Skip => DegenerateCapturePolicy::Skip,
        }
    }
}

fn parse_vec3(s: &str) -> Result<DVec3, String> {
    let parts = s
        .split(',')
        .map(|p| p.trim().parse::<f64>().map_err(|e| format!("{p:?}: {e}")))
        .collect::<Result<Vec<_>, _>>()?;
    match parts.as_slice() {
        [x, y, z] => Ok(DVec3::new(*x, *y, *z)),
        _ => Err(format!("expected x,y,z but got {} components", parts.len())),
    }
}
