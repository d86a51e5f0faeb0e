use std::time::Duration;

use dni_capture_common::config::{DetectionConfig, UploadConfig};
use dni_capture_common::extracted::ExtractedData;
use dni_capture_common::frame::FrameBuffer;
use dni_capture_common::handoff::{stash_extracted, HandoffStore};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::camera::Camera;
use crate::detect::DocumentDetector;
use crate::encoder::encode_jpeg;
use crate::error::{CaptureError, Failure};
use crate::upload::Uploader;

use super::state::{CaptureController, TickOutcome};

#[derive(Debug, Clone, Copy)]
pub struct Timing {
    pub sample_interval: Duration,
    pub settle_delay: Duration,
    pub jpeg_quality: u8,
}

impl Timing {
    pub fn from_config(detection: &DetectionConfig, upload: &UploadConfig) -> Self {
        Self {
            sample_interval: Duration::from_millis(detection.sample_interval_ms),
            settle_delay: Duration::from_millis(detection.settle_ms),
            jpeg_quality: upload.jpeg_quality,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Extracted data is waiting in the hand-off store.
    Completed,
    Failed(Failure),
    /// The user closed the camera before a capture was taken.
    Closed,
}

/// Drives one capture session from activation to a terminal state.
pub struct CaptureRunner<C: Camera, U, D> {
    camera: C,
    uploader: U,
    controller: CaptureController<D, C::Stream>,
    timing: Timing,
}

impl<C, U, D> CaptureRunner<C, U, D>
where
    C: Camera,
    U: Uploader,
    D: DocumentDetector,
{
    pub fn new(camera: C, uploader: U, detector: D, confirm_frames: u32, timing: Timing) -> Self {
        Self {
            camera,
            uploader,
            controller: CaptureController::new(detector, confirm_frames),
            timing,
        }
    }

    pub fn controller(&self) -> &CaptureController<D, C::Stream> {
        &self.controller
    }

    /// Run a session. `close` flipping to `true` is the user closing the
    /// camera; it is honored until the upload starts.
    pub async fn run(
        &mut self,
        store: &dyn HandoffStore,
        mut close: watch::Receiver<bool>,
    ) -> SessionOutcome {
        if !self.controller.can_activate() {
            warn!(state = ?self.controller.state(), "session already running");
            return SessionOutcome::Closed;
        }

        info!("activating camera");
        let stream = tokio::select! {
            opened = self.camera.open() => match opened {
                Ok(stream) => stream,
                Err(e) => return SessionOutcome::Failed(self.controller.fail(&e.into())),
            },
            _ = close_requested(&mut close) => {
                info!("closed before the camera opened");
                return SessionOutcome::Closed;
            }
        };
        if !self.controller.camera_opened(stream) {
            return SessionOutcome::Closed;
        }

        if !self.sample_until_confirmed(&mut close).await {
            self.controller.close();
            return SessionOutcome::Closed;
        }

        debug!(settle = ?self.timing.settle_delay, "waiting for the document to settle");
        tokio::select! {
            _ = tokio::time::sleep(self.timing.settle_delay) => {}
            _ = close_requested(&mut close) => {
                self.controller.close();
                return SessionOutcome::Closed;
            }
        }

        let frame = match self.controller.begin_processing() {
            Ok(frame) => frame,
            Err(failure) => return SessionOutcome::Failed(failure),
        };

        // No cancellation from here on.
        match self.process(&frame, store).await {
            Ok(datos) => {
                self.controller.complete();
                info!(fields = datos.filled_fields(), "capture session completed");
                SessionOutcome::Completed
            }
            Err(e) => SessionOutcome::Failed(self.controller.fail(&e)),
        }
    }

    /// Tick until the document is confirmed (`true`) or the user closes (`false`).
    /// The interval is dropped on return, so no tick can fire after confirmation.
    async fn sample_until_confirmed(&mut self, close: &mut watch::Receiver<bool>) -> bool {
        let mut ticker = tokio::time::interval(self.timing.sample_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.controller.on_tick() {
                        TickOutcome::Confirmed => return true,
                        TickOutcome::Stabilizing { .. } | TickOutcome::Searching { .. } => {
                            debug!(status = self.controller.status(), "tick");
                        }
                        TickOutcome::NotReady | TickOutcome::Ignored => {}
                    }
                }
                _ = close_requested(close) => return false,
            }
        }
    }

    async fn process(
        &self,
        frame: &FrameBuffer,
        store: &dyn HandoffStore,
    ) -> Result<ExtractedData, CaptureError> {
        let jpeg = encode_jpeg(frame, self.timing.jpeg_quality)?;
        let datos = self.uploader.upload(jpeg).await?;
        stash_extracted(store, &datos)?;
        Ok(datos)
    }
}

/// Resolves once `close` reads `true`. Never resolves if the sender is gone.
async fn close_requested(close: &mut watch::Receiver<bool>) {
    if close.wait_for(|closed| *closed).await.is_err() {
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::testing::{CountingDetector, FakeCamera};
    use crate::controller::CaptureState;
    use crate::detect::edge::tests::sparse_dots;
    use crate::detect::EdgeDensityDetector;
    use crate::error::{ErrorKind, MessageCategory};
    use crate::upload::tests::{mock_backend, upload_config};
    use crate::upload::OcrClient;
    use axum::http::StatusCode;
    use dni_capture_common::handoff::{take_extracted, MemoryStore, EXTRACTED_DATA_KEY};
    use serde_json::json;
    use std::sync::atomic::Ordering;

    fn fast() -> Timing {
        Timing {
            sample_interval: Duration::from_millis(1),
            settle_delay: Duration::from_millis(1),
            jpeg_quality: 95,
        }
    }

    /// Sender dropped right away: nobody can ever close this session.
    fn never_closed() -> watch::Receiver<bool> {
        let (_, rx) = watch::channel(false);
        rx
    }

    #[tokio::test]
    async fn successful_capture_hands_off_datos_exactly_once() {
        let config = mock_backend(
            StatusCode::OK,
            json!({ "exito": true, "datos": { "numeroDocumento": "12345678", "prenombres": "ANA" } }),
        )
        .await;
        let camera = FakeCamera::showing(Some(sparse_dots(100, 80)));
        let released = camera.released.clone();
        let mut runner = CaptureRunner::new(
            camera,
            OcrClient::new(&config).unwrap(),
            EdgeDensityDetector::default(),
            10,
            fast(),
        );
        let store = MemoryStore::new();

        let outcome = runner.run(&store, never_closed()).await;
        assert_eq!(outcome, SessionOutcome::Completed);
        assert_eq!(runner.controller().state(), &CaptureState::Done);
        assert!(released.is_released());

        let raw = store.get_item(EXTRACTED_DATA_KEY).unwrap();
        let stashed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(stashed, json!({ "numeroDocumento": "12345678", "prenombres": "ANA" }));

        let datos = take_extracted(&store).unwrap().unwrap();
        assert_eq!(datos.numero_documento.as_deref(), Some("12345678"));
        assert!(store.is_empty());
        assert!(take_extracted(&store).unwrap().is_none());
    }

    #[tokio::test]
    async fn document_not_detected_fails_with_matching_category() {
        let config = mock_backend(
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "error": "DNI_NOT_DETECTED" }),
        )
        .await;
        let mut runner = CaptureRunner::new(
            FakeCamera::showing(Some(sparse_dots(100, 80))),
            OcrClient::new(&config).unwrap(),
            EdgeDensityDetector::default(),
            10,
            fast(),
        );
        let store = MemoryStore::new();

        let SessionOutcome::Failed(failure) = runner.run(&store, never_closed()).await else {
            panic!("session should fail");
        };
        assert_eq!(failure.kind, ErrorKind::BackendRejected);
        assert_eq!(failure.category, MessageCategory::DocumentNotDetected);
        assert!(failure.message.starts_with("No se detectó el DNI"));
        assert!(matches!(runner.controller().state(), CaptureState::Failed(_)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn unreachable_backend_is_a_connectivity_failure() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut runner = CaptureRunner::new(
            FakeCamera::showing(Some(sparse_dots(100, 80))),
            OcrClient::new(&upload_config(format!("http://{addr}"))).unwrap(),
            EdgeDensityDetector::default(),
            10,
            fast(),
        );
        let outcome = runner.run(&MemoryStore::new(), never_closed()).await;
        assert!(matches!(
            outcome,
            SessionOutcome::Failed(Failure { category: MessageCategory::Connectivity, .. })
        ));
    }

    #[tokio::test]
    async fn refused_camera_fails_without_sampling() {
        let (detector, calls) = CountingDetector::new(EdgeDensityDetector::default());
        let mut runner = CaptureRunner::new(
            FakeCamera::refusing(),
            OcrClient::new(&upload_config("http://127.0.0.1:9".into())).unwrap(),
            detector,
            10,
            fast(),
        );
        let failure = match runner.run(&MemoryStore::new(), never_closed()).await {
            SessionOutcome::Failed(failure) => failure,
            other => panic!("expected failure, got {other:?}"),
        };
        assert_eq!(failure.kind, ErrorKind::CameraAccessDenied);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn close_while_searching_releases_camera() {
        let (detector, calls) = CountingDetector::new(EdgeDensityDetector::default());
        let camera = FakeCamera::showing(Some(FrameBuffer::filled(64, 48, [90, 90, 90])));
        let released = camera.released.clone();
        let mut runner = CaptureRunner::new(
            camera,
            OcrClient::new(&upload_config("http://127.0.0.1:9".into())).unwrap(),
            detector,
            10,
            fast(),
        );

        let (tx, rx) = watch::channel(false);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            let _ = tx.send(true);
        });

        let outcome = runner.run(&MemoryStore::new(), rx).await;
        assert_eq!(outcome, SessionOutcome::Closed);
        assert_eq!(runner.controller().state(), &CaptureState::Idle);
        assert_eq!(runner.controller().stable_frames(), 0);
        assert!(released.is_released());
        assert!(calls.load(Ordering::SeqCst) > 0);
    }

    #[tokio::test]
    async fn close_during_settle_skips_upload() {
        let config = mock_backend(StatusCode::OK, json!({ "exito": true, "datos": {} })).await;
        let camera = FakeCamera::showing(Some(sparse_dots(100, 80)));
        let released = camera.released.clone();
        let mut runner = CaptureRunner::new(
            camera,
            OcrClient::new(&config).unwrap(),
            EdgeDensityDetector::default(),
            10,
            Timing {
                settle_delay: Duration::from_secs(30),
                ..fast()
            },
        );
        let store = MemoryStore::new();

        let (tx, rx) = watch::channel(false);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            let _ = tx.send(true);
        });

        let outcome = runner.run(&store, rx).await;
        assert_eq!(outcome, SessionOutcome::Closed);
        assert!(released.is_released());
        assert!(store.is_empty());
    }
}
