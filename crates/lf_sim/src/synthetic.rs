use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use lightfield::acquisition::CameraDevice;
use lightfield::CameraError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::io::Cursor;
use std::time::Duration;

const FRAME_WIDTH: u32 = 64;
const FRAME_HEIGHT: u32 = 48;

/// Stand-in for camera hardware: blocks for a random exposure time and
/// returns a PNG-encoded noise frame.
pub struct SyntheticCamera {
    rng: StdRng,
    latency_ms: (u64, u64),
    connected: bool,
}

impl SyntheticCamera {
    pub fn new(seed: u64, latency_ms: (u64, u64)) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            latency_ms,
            connected: false,
        }
    }
}

impl CameraDevice for SyntheticCamera {
    fn enable(&mut self) -> Result<(), CameraError> {
        tracing::debug!("Synthetic camera enabled");
        Ok(())
    }

    fn connect(&mut self) -> Result<(), CameraError> {
        self.connected = true;
        Ok(())
    }

    fn capture_raw(&mut self) -> Result<Vec<u8>, CameraError> {
        if !self.connected {
            return Err(CameraError::NotConnected);
        }
        let (lo, hi) = self.latency_ms;
        std::thread::sleep(Duration::from_millis(self.rng.gen_range(lo..=hi.max(lo))));

        let base: u8 = self.rng.gen();
        let rng = &mut self.rng;
        let frame = RgbaImage::from_fn(FRAME_WIDTH, FRAME_HEIGHT, |x, y| {
            let n: u8 = rng.gen_range(0..32);
            Rgba([base.wrapping_add(n), (x * 4) as u8, (y * 5) as u8, 255])
        });

        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(frame)
            .write_to(&mut out, ImageFormat::Png)
            .map_err(|e| CameraError::Device(e.to_string()))?;
        Ok(out.into_inner())
    }

    fn disconnect(&mut self) -> Result<(), CameraError> {
        self.connected = false;
        Ok(())
    }

    fn disable(&mut self) -> Result<(), CameraError> {
        tracing::debug!("Synthetic camera disabled");
        Ok(())
    }
}
