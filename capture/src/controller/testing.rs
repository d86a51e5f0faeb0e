//! Scripted camera, stream and detector doubles shared by the controller tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use dni_capture_common::frame::FrameBuffer;

use crate::camera::{Camera, CameraError, VideoStream};
use crate::detect::{Detection, DocumentDetector};

#[derive(Clone, Default)]
pub(crate) struct ReleaseFlag(Arc<AtomicBool>);

impl ReleaseFlag {
    pub(crate) fn is_released(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Plays back `script` one frame per read, then keeps returning `idle`.
pub(crate) struct ScriptedStream {
    script: VecDeque<Option<FrameBuffer>>,
    idle: Option<FrameBuffer>,
    released: ReleaseFlag,
}

impl ScriptedStream {
    pub(crate) fn new(
        script: impl IntoIterator<Item = Option<FrameBuffer>>,
        idle: Option<FrameBuffer>,
    ) -> (Self, ReleaseFlag) {
        let released = ReleaseFlag::default();
        let stream = Self {
            script: script.into_iter().collect(),
            idle,
            released: released.clone(),
        };
        (stream, released)
    }
}

impl VideoStream for ScriptedStream {
    fn current_frame(&mut self) -> Option<FrameBuffer> {
        if self.released.is_released() {
            return None;
        }
        self.script
            .pop_front()
            .unwrap_or_else(|| self.idle.clone())
    }

    fn stop(&mut self) {
        self.released.0.store(true, Ordering::SeqCst);
    }
}

/// Camera handing out a [`ScriptedStream`] that repeats `idle` forever.
pub(crate) struct FakeCamera {
    idle: Option<FrameBuffer>,
    refuse: bool,
    pub(crate) released: ReleaseFlag,
}

impl FakeCamera {
    pub(crate) fn showing(idle: Option<FrameBuffer>) -> Self {
        Self {
            idle,
            refuse: false,
            released: ReleaseFlag::default(),
        }
    }

    pub(crate) fn refusing() -> Self {
        Self {
            refuse: true,
            ..Self::showing(None)
        }
    }
}

impl Camera for FakeCamera {
    type Stream = ScriptedStream;

    async fn open(&self) -> Result<ScriptedStream, CameraError> {
        if self.refuse {
            return Err(CameraError::Status(403));
        }
        Ok(ScriptedStream {
            script: VecDeque::new(),
            idle: self.idle.clone(),
            released: self.released.clone(),
        })
    }
}

/// Wraps a detector and counts classification calls.
pub(crate) struct CountingDetector<D> {
    inner: D,
    calls: Arc<AtomicUsize>,
}

impl<D> CountingDetector<D> {
    pub(crate) fn new(inner: D) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                inner,
                calls: calls.clone(),
            },
            calls,
        )
    }
}

impl<D: DocumentDetector> DocumentDetector for CountingDetector<D> {
    fn detect(&self, frame: &FrameBuffer) -> Detection {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.detect(frame)
    }
}
