//! Network cameras the capture session reads frames from.
//!
//! Both modes run a background task that keeps only the most recent JPEG in
//! a watch channel; a frame is decoded when the sampler asks for it.

pub mod mjpeg;
pub mod polling;

use std::future::Future;
use std::io::Cursor;
use std::time::Duration;

use bytes::Bytes;
use dni_capture_common::config::{CameraConfig, MAX_POLL_FPS};
use dni_capture_common::frame::FrameBuffer;
use image::ImageReader;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub use mjpeg::MjpegCamera;
pub use polling::PollingCamera;

#[derive(Debug, thiserror::Error)]
pub enum CameraError {
    #[error("failed to build HTTP client: {0}")]
    Client(reqwest::Error),
    #[error("camera connection failed: {0}")]
    Connect(reqwest::Error),
    #[error("camera stream error: {0}")]
    Stream(reqwest::Error),
    #[error("camera answered HTTP {0}")]
    Status(u16),
    #[error("unknown camera mode '{0}', expected 'mjpeg' or 'polling'")]
    UnknownMode(String),
    #[error("polling rate {0} fps is out of range")]
    InvalidFps(f64),
}

pub trait Camera {
    type Stream: VideoStream;

    /// Connect to the device and start receiving frames.
    fn open(&self) -> impl Future<Output = Result<Self::Stream, CameraError>> + Send;
}

/// An open video stream. Only the capture controller starts or stops it.
pub trait VideoStream: Send {
    /// Latest frame at native resolution, or `None` when nothing has arrived yet
    /// or the stream is gone.
    fn current_frame(&mut self) -> Option<FrameBuffer>;

    /// Release the stream. Idempotent.
    fn stop(&mut self);
}

/// Stream fed by a background task that publishes the newest JPEG.
pub struct LiveStream {
    latest: watch::Receiver<Option<Bytes>>,
    feeder: Option<JoinHandle<()>>,
}

impl LiveStream {
    pub(crate) fn new(latest: watch::Receiver<Option<Bytes>>, feeder: JoinHandle<()>) -> Self {
        Self {
            latest,
            feeder: Some(feeder),
        }
    }

    pub fn is_active(&self) -> bool {
        self.feeder.is_some()
    }
}

impl VideoStream for LiveStream {
    fn current_frame(&mut self) -> Option<FrameBuffer> {
        self.feeder.as_ref()?;
        let jpeg = self.latest.borrow_and_update().clone()?;
        decode_frame(&jpeg)
    }

    fn stop(&mut self) {
        if let Some(feeder) = self.feeder.take() {
            feeder.abort();
            info!("camera stream released");
        }
    }
}

impl Drop for LiveStream {
    fn drop(&mut self) {
        self.stop();
    }
}

fn decode_frame(jpeg: &[u8]) -> Option<FrameBuffer> {
    let img = match ImageReader::new(Cursor::new(jpeg))
        .with_guessed_format()
        .map_err(image::ImageError::IoError)
        .and_then(|reader| reader.decode())
    {
        Ok(img) => img.to_rgba8(),
        Err(e) => {
            warn!(error = %e, bytes = jpeg.len(), "failed to decode camera frame");
            return None;
        }
    };
    let (width, height) = img.dimensions();
    match FrameBuffer::new(width, height, img.into_raw()) {
        Ok(frame) => Some(frame),
        Err(e) => {
            warn!(error = %e, "decoded frame has unexpected size");
            None
        }
    }
}

/// Camera selected by `[camera].mode`.
pub enum CameraSource {
    Mjpeg(MjpegCamera),
    Polling(PollingCamera),
}

impl CameraSource {
    pub fn from_config(config: &CameraConfig) -> Result<Self, CameraError> {
        let connect_timeout = Duration::from_secs(config.connect_timeout_secs);
        let source = match config.mode.as_str() {
            "mjpeg" => CameraSource::Mjpeg(MjpegCamera::new(&config.url, connect_timeout)),
            "polling" => CameraSource::Polling(PollingCamera::new(
                &config.url,
                poll_interval(config.fps)?,
                connect_timeout,
            )),
            other => return Err(CameraError::UnknownMode(other.to_string())),
        };
        debug!(mode = config.mode, url = config.url, "camera configured");
        Ok(source)
    }
}

fn poll_interval(fps: f64) -> Result<Duration, CameraError> {
    if !(fps > 0.0 && fps <= MAX_POLL_FPS) {
        return Err(CameraError::InvalidFps(fps));
    }
    Duration::try_from_secs_f64(1.0 / fps).map_err(|_| CameraError::InvalidFps(fps))
}

impl Camera for CameraSource {
    type Stream = LiveStream;

    async fn open(&self) -> Result<LiveStream, CameraError> {
        match self {
            CameraSource::Mjpeg(camera) => camera.open().await,
            CameraSource::Polling(camera) => camera.open().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::encode_jpeg;

    fn camera_config(mode: &str) -> CameraConfig {
        CameraConfig {
            mode: mode.to_string(),
            url: "http://127.0.0.1:9/stream".to_string(),
            fps: 5.0,
            connect_timeout_secs: 1,
        }
    }

    #[test]
    fn source_follows_configured_mode() {
        assert!(matches!(
            CameraSource::from_config(&camera_config("mjpeg")),
            Ok(CameraSource::Mjpeg(_))
        ));
        assert!(matches!(
            CameraSource::from_config(&camera_config("polling")),
            Ok(CameraSource::Polling(_))
        ));
        assert!(matches!(
            CameraSource::from_config(&camera_config("webrtc")),
            Err(CameraError::UnknownMode(mode)) if mode == "webrtc"
        ));
    }

    #[test]
    fn unusable_polling_rate_is_rejected() {
        for fps in [0.0, f64::NAN, f64::INFINITY, 1e9] {
            let config = CameraConfig {
                fps,
                ..camera_config("polling")
            };
            assert!(
                matches!(CameraSource::from_config(&config), Err(CameraError::InvalidFps(_))),
                "fps {fps} accepted"
            );
        }
        assert_eq!(poll_interval(4.0).unwrap(), Duration::from_millis(250));
    }

    #[tokio::test]
    async fn live_stream_decodes_latest_jpeg_until_stopped() {
        let jpeg = encode_jpeg(&FrameBuffer::filled(12, 8, [200, 10, 10]), 90).unwrap();
        let (tx, rx) = watch::channel(None);
        let mut stream = LiveStream::new(rx, tokio::spawn(std::future::pending()));

        assert!(stream.current_frame().is_none(), "nothing published yet");

        tx.send_replace(Some(Bytes::from(jpeg)));
        let frame = stream.current_frame().unwrap();
        assert_eq!((frame.width(), frame.height()), (12, 8));

        stream.stop();
        assert!(!stream.is_active());
        assert!(stream.current_frame().is_none());
        stream.stop();
    }

    #[tokio::test]
    async fn undecodable_jpeg_yields_no_frame() {
        let (_tx, rx) = watch::channel(Some(Bytes::from_static(b"not a jpeg")));
        let mut stream = LiveStream::new(rx, tokio::spawn(std::future::pending()));
        assert!(stream.current_frame().is_none());
    }
}
