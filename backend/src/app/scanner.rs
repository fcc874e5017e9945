//! Camera side of QR check-in. Decoding happens on the device, validity is decided
//! remotely, see [`crate::app::App::validate_qr`].

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("camera access was denied, allow it in the browser or system settings and retry")]
    PermissionDenied,
    #[error("no camera was found, connect one or type the code manually")]
    NotFound,
    #[error("the camera is used by another application, close it and retry")]
    Busy,
    #[error("camera failed: {0}")]
    Other(String),
}

/// Grayscale frame, one byte per pixel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub luma: Vec<u8>,
}

/// Exclusive stream of frames from an acquired camera.
#[async_trait]
pub trait FrameSource: Send {
    /// `None` once the stream has ended.
    async fn next_frame(&mut self) -> Result<Option<Frame>, DeviceError>;

    fn release(&mut self);
}

#[async_trait]
pub trait CameraDevice: Send + Sync {
    async fn acquire(&self) -> Result<Box<dyn FrameSource>, DeviceError>;
}

pub trait QrDecoder: Send + Sync {
    fn decode(&self, frame: &Frame) -> Option<String>;
}

/// Asks the user to type the code when the camera can't be used.
#[async_trait]
pub trait ManualInput: Send + Sync {
    async fn prompt(&self, reason: &str) -> Option<String>;
}

/// Holds the camera for the duration of a scan and releases it when dropped.
pub struct CameraLease {
    source: Box<dyn FrameSource>,
}

impl CameraLease {
    pub async fn acquire(device: &dyn CameraDevice) -> Result<Self, DeviceError> {
        let source = device.acquire().await?;
        debug!("camera acquired");
        Ok(Self { source })
    }

    pub async fn next_frame(&mut self) -> Result<Option<Frame>, DeviceError> {
        self.source.next_frame().await
    }
}

impl Drop for CameraLease {
    fn drop(&mut self) {
        self.source.release();
        debug!("camera released");
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    Decoded(String),
    Cancelled,
    ManualEntry { reason: String },
}

#[derive(Clone)]
pub struct QrScanner {
    camera: Arc<dyn CameraDevice>,
    decoder: Arc<dyn QrDecoder>,
}

impl QrScanner {
    pub fn new(camera: Arc<dyn CameraDevice>, decoder: Arc<dyn QrDecoder>) -> Self {
        Self { camera, decoder }
    }

    /// Reads frames until one decodes, the scan is cancelled, or the camera fails.
    pub async fn scan(&self, cancel: &CancellationToken) -> ScanOutcome {
        let mut lease = match CameraLease::acquire(self.camera.as_ref()).await {
            Ok(lease) => lease,
            Err(err) => {
                warn!("camera unavailable: {err}");
                return ScanOutcome::ManualEntry {
                    reason: err.to_string(),
                };
            }
        };

        loop {
            let frame = tokio::select! {
                _ = cancel.cancelled() => return ScanOutcome::Cancelled,
                frame = lease.next_frame() => frame,
            };
            match frame {
                Ok(Some(frame)) => {
                    if let Some(text) = self.decoder.decode(&frame) {
                        info!("qr code decoded");
                        return ScanOutcome::Decoded(text);
                    }
                }
                Ok(None) => {
                    return ScanOutcome::ManualEntry {
                        reason: "the camera stopped before a code was read".into(),
                    }
                }
                Err(err) => {
                    warn!("camera failed during scan: {err}");
                    return ScanOutcome::ManualEntry {
                        reason: err.to_string(),
                    };
                }
            }
        }
    }

    /// Text to submit for validation: scanned, typed after a fallback, or nothing.
    pub async fn read_code(
        &self,
        cancel: &CancellationToken,
        manual: &dyn ManualInput,
    ) -> Option<String> {
        match self.scan(cancel).await {
            ScanOutcome::Decoded(text) => Some(text),
            ScanOutcome::Cancelled => None,
            ScanOutcome::ManualEntry { reason } => manual
                .prompt(&reason)
                .await
                .filter(|text| !text.trim().is_empty()),
        }
    }
}
