use dni_capture_common::frame::FrameBuffer;
use tracing::{debug, error, info, warn};

use crate::camera::VideoStream;
use crate::detect::DocumentDetector;
use crate::error::{CaptureError, Failure};

use super::sampler::FrameSampler;

/// Sub-state while the camera is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Searching,
    Stabilizing,
    /// Sampling stopped, waiting out the settle delay.
    Confirmed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    CameraActive(Phase),
    Processing,
    Done,
    Failed(Failure),
}

/// What a single sampling tick did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// The controller is not sampling; nothing was classified.
    Ignored,
    /// No frame was available this tick.
    NotReady,
    Searching { edge_ratio: f64 },
    Stabilizing { stable_frames: u32, edge_ratio: f64 },
    Confirmed,
}

/// Resources held while the camera is on. Dropping it releases the stream.
struct Session<S: VideoStream> {
    sampler: FrameSampler<S>,
    stable_frames: u32,
}

impl<S: VideoStream> Drop for Session<S> {
    fn drop(&mut self) {
        self.sampler.release();
    }
}

/// Capture state machine, driven by discrete events: camera opened, timer
/// tick, settle elapsed, upload finished, user close.
///
/// Consecutive positive classifications accumulate in the session's
/// stability counter; any negative one resets it. Capture is confirmed the
/// tick the counter reaches `confirm_frames`, and sampling stops right there.
pub struct CaptureController<D, S: VideoStream> {
    detector: D,
    confirm_frames: u32,
    state: CaptureState,
    session: Option<Session<S>>,
}

impl<D: DocumentDetector, S: VideoStream> CaptureController<D, S> {
    pub fn new(detector: D, confirm_frames: u32) -> Self {
        Self {
            detector,
            confirm_frames: confirm_frames.max(1),
            state: CaptureState::Idle,
            session: None,
        }
    }

    pub fn state(&self) -> &CaptureState {
        &self.state
    }

    pub fn can_activate(&self) -> bool {
        matches!(
            self.state,
            CaptureState::Idle | CaptureState::Done | CaptureState::Failed(_)
        )
    }

    pub fn is_sampling(&self) -> bool {
        matches!(
            self.state,
            CaptureState::CameraActive(Phase::Searching | Phase::Stabilizing)
        )
    }

    pub fn stable_frames(&self) -> u32 {
        self.session.as_ref().map_or(0, |s| s.stable_frames)
    }

    /// Start a session on a freshly opened stream. Returns false (and releases
    /// the stream) when a session cannot start from the current state.
    pub fn camera_opened(&mut self, stream: S) -> bool {
        let mut sampler = FrameSampler::new(stream);
        if !self.can_activate() {
            warn!(state = ?self.state, "activation refused, stream released");
            sampler.release();
            return false;
        }
        self.session = Some(Session {
            sampler,
            stable_frames: 0,
        });
        self.state = CaptureState::CameraActive(Phase::Searching);
        info!(
            detector = self.detector.name(),
            confirm_frames = self.confirm_frames,
            "camera active, searching for document"
        );
        true
    }

    /// Sample and classify one frame.
    pub fn on_tick(&mut self) -> TickOutcome {
        if !self.is_sampling() {
            return TickOutcome::Ignored;
        }
        let Some(session) = self.session.as_mut() else {
            return TickOutcome::Ignored;
        };
        let Some(frame) = session.sampler.sample_frame() else {
            return TickOutcome::NotReady;
        };

        let detection = self.detector.detect(&frame);
        debug!(
            edge_ratio = detection.edge_ratio,
            is_document = detection.is_document,
            width = frame.width(),
            height = frame.height(),
            "frame classified"
        );

        if !detection.is_document {
            if session.stable_frames > 0 {
                debug!(
                    stable_frames = session.stable_frames,
                    "STABILIZING→SEARCHING: document lost"
                );
            }
            session.stable_frames = 0;
            self.state = CaptureState::CameraActive(Phase::Searching);
            return TickOutcome::Searching {
                edge_ratio: detection.edge_ratio,
            };
        }

        session.stable_frames += 1;
        if session.stable_frames >= self.confirm_frames {
            info!(
                stable_frames = session.stable_frames,
                "STABILIZING→CONFIRMED: document held steady"
            );
            self.state = CaptureState::CameraActive(Phase::Confirmed);
            return TickOutcome::Confirmed;
        }

        self.state = CaptureState::CameraActive(Phase::Stabilizing);
        TickOutcome::Stabilizing {
            stable_frames: session.stable_frames,
            edge_ratio: detection.edge_ratio,
        }
    }

    /// Settle delay is over: take the full-resolution still, release the
    /// camera and move to `Processing`.
    pub fn begin_processing(&mut self) -> Result<FrameBuffer, Failure> {
        if self.state != CaptureState::CameraActive(Phase::Confirmed) {
            warn!(state = ?self.state, "capture requested without a confirmed document");
            return Err(CaptureError::StreamNotReady.to_failure());
        }
        let captured = match self.session.take() {
            Some(mut session) => session.sampler.capture(),
            None => Err(CaptureError::StreamNotReady),
        };
        self.state = CaptureState::Processing;

        match captured {
            Ok(frame) => {
                info!(
                    width = frame.width(),
                    height = frame.height(),
                    "CONFIRMED→PROCESSING: frame captured, camera released"
                );
                Ok(frame)
            }
            Err(e) => Err(self.fail(&e)),
        }
    }

    pub fn complete(&mut self) {
        if self.state != CaptureState::Processing {
            warn!(state = ?self.state, "completion outside of processing ignored");
            return;
        }
        info!("PROCESSING→DONE");
        self.state = CaptureState::Done;
    }

    /// Terminate the session with a classified failure.
    pub fn fail(&mut self, err: &CaptureError) -> Failure {
        self.session = None;
        let failure = err.to_failure();
        error!(
            error = %err,
            kind = ?failure.kind,
            category = ?failure.category,
            "capture session failed"
        );
        self.state = CaptureState::Failed(failure.clone());
        failure
    }

    /// User closed the camera. Only honored while the camera is active;
    /// an upload in flight runs to completion.
    pub fn close(&mut self) -> bool {
        if !matches!(self.state, CaptureState::CameraActive(_)) {
            debug!(state = ?self.state, "close ignored");
            return false;
        }
        self.session = None;
        self.state = CaptureState::Idle;
        info!("camera closed by user");
        true
    }

    /// On-screen status line.
    pub fn status(&self) -> String {
        match &self.state {
            CaptureState::Idle => "CÁMARA APAGADA".to_string(),
            CaptureState::CameraActive(Phase::Searching) => "BUSCANDO DOCUMENTO".to_string(),
            CaptureState::CameraActive(Phase::Stabilizing) => {
                format!(
                    "ESTABILIZANDO... {}/{}",
                    self.stable_frames(),
                    self.confirm_frames
                )
            }
            CaptureState::CameraActive(Phase::Confirmed) => "DOCUMENTO DETECTADO".to_string(),
            CaptureState::Processing => "PROCESANDO".to_string(),
            CaptureState::Done => "COMPLETADO".to_string(),
            CaptureState::Failed(_) => "ERROR".to_string(),
        }
    }
}
