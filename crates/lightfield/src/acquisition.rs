//! Single-in-flight image acquisition.
//!
//! A [`CaptureSession`] owns one camera device behind a lock shared with a
//! background worker thread. Each trigger runs the blocking device call on
//! its own thread; a trigger that arrives while the previous capture is still
//! running is dropped and counted. No timeout is applied to the device call.

use crate::capture::ReflectanceMeta;
use crate::error::CameraError;
use crate::pose::Pose;
use image::RgbaImage;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio::sync::mpsc;

/// Blocking camera hardware. Every call is made with the session's camera
/// lock held.
pub trait CameraDevice: Send + 'static {
    fn enable(&mut self) -> Result<(), CameraError>;
    fn connect(&mut self) -> Result<(), CameraError>;
    /// Takes one photo and returns the encoded bytes (PNG or JPEG).
    fn capture_raw(&mut self) -> Result<Vec<u8>, CameraError>;
    fn disconnect(&mut self) -> Result<(), CameraError>;
    fn disable(&mut self) -> Result<(), CameraError>;
}

#[derive(Debug)]
struct CameraSlot<D> {
    device: D,
    enabled: bool,
    connected: bool,
}

/// Result of one triggered capture, tagged with the pose and light recorded
/// at trigger time.
#[derive(Debug)]
pub struct CaptureOutcome {
    pub request: u64,
    pub pose: Pose,
    pub reflectance: Option<ReflectanceMeta>,
    pub image: Result<RgbaImage, CameraError>,
}

pub struct CaptureSession<D: CameraDevice> {
    camera: Arc<Mutex<CameraSlot<D>>>,
    worker: Option<JoinHandle<()>>,
    tx: mpsc::UnboundedSender<CaptureOutcome>,
    rx: mpsc::UnboundedReceiver<CaptureOutcome>,
    next_request: u64,
    dropped: u64,
}

impl<D: CameraDevice> CaptureSession<D> {
    pub fn new(device: D) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            camera: Arc::new(Mutex::new(CameraSlot {
                device,
                enabled: false,
                connected: false,
            })),
            worker: None,
            tx,
            rx,
            next_request: 0,
            dropped: 0,
        }
    }

    /// Enables and connects the camera.
    pub fn start(&mut self) -> Result<(), CameraError> {
        let mut cam = self.camera.lock();
        if !cam.enabled {
            cam.device.enable()?;
            cam.enabled = true;
        }
        if !cam.connected {
            cam.device.connect()?;
            cam.connected = true;
        }
        tracing::info!("Camera session started");
        Ok(())
    }

    /// Waits for an in-flight capture, then disconnects and disables the
    /// camera.
    pub fn stop(&mut self) -> Result<(), CameraError> {
        self.join_in_flight();
        let mut cam = self.camera.lock();
        if !cam.connected && !cam.enabled {
            return Ok(());
        }
        if cam.connected {
            cam.device.disconnect()?;
            cam.connected = false;
        }
        if cam.enabled {
            cam.device.disable()?;
            cam.enabled = false;
        }
        tracing::info!(dropped = self.dropped, "Camera session stopped");
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.camera.lock().connected
    }

    pub fn in_flight(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    /// Triggers requests dropped because a capture was already running.
    pub fn dropped_triggers(&self) -> u64 {
        self.dropped
    }

    /// Starts a capture for `pose`. Returns `Ok(false)` without doing
    /// anything when a capture is already in flight.
    pub fn trigger(&mut self, pose: Pose, reflectance: Option<ReflectanceMeta>) -> Result<bool, CameraError> {
        if self.in_flight() {
            self.dropped += 1;
            tracing::warn!(dropped = self.dropped, "Capture already in flight, trigger dropped");
            return Ok(false);
        }
        if !self.is_connected() {
            return Err(CameraError::NotConnected);
        }
        // Reap the finished worker.
        self.join_in_flight();

        let request = self.next_request;
        self.next_request += 1;

        let camera = Arc::clone(&self.camera);
        let tx = self.tx.clone();
        let handle = thread::Builder::new()
            .name("capture-worker".into())
            .spawn(move || {
                let image = acquire(&camera);
                if let Err(e) = &image {
                    tracing::error!(request, error = %e, "Capture failed");
                }
                // The receiver only goes away with the session.
                let _ = tx.send(CaptureOutcome {
                    request,
                    pose,
                    reflectance,
                    image,
                });
            })
            .map_err(|e| CameraError::Device(format!("cannot spawn capture worker: {e}")))?;

        self.worker = Some(handle);
        tracing::debug!(request, "Capture triggered");
        Ok(true)
    }

    /// Completed captures since the last poll, oldest first.
    pub fn poll(&mut self) -> Vec<CaptureOutcome> {
        let mut out = Vec::new();
        while let Ok(outcome) = self.rx.try_recv() {
            out.push(outcome);
        }
        out
    }

    /// Waits for the next completed capture.
    pub async fn recv(&mut self) -> Option<CaptureOutcome> {
        self.rx.recv().await
    }

    /// Blocks until the current worker, if any, has finished.
    pub fn join_in_flight(&mut self) {
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("Capture worker panicked");
            }
        }
    }
}

fn acquire<D: CameraDevice>(camera: &Mutex<CameraSlot<D>>) -> Result<RgbaImage, CameraError> {
    let bytes = {
        let mut cam = camera.lock();
        if !cam.connected {
            return Err(CameraError::NotConnected);
        }
        cam.device.capture_raw()?
    };
    image::load_from_memory(&bytes)
        .map(|img| img.to_rgba8())
        .map_err(|e| CameraError::Decode(e.to_string()))
}

impl<D: CameraDevice> Drop for CaptureSession<D> {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::warn!(error = %e, "Camera shutdown failed");
        }
    }
}
