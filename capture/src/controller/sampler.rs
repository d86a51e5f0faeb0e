use dni_capture_common::frame::FrameBuffer;
use tracing::trace;

use crate::camera::VideoStream;
use crate::error::CaptureError;

/// Pulls frames off the active stream at native resolution.
pub struct FrameSampler<S> {
    stream: S,
}

impl<S: VideoStream> FrameSampler<S> {
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    /// Frame for one detection tick. `None` while the stream has nothing to
    /// show, which is not an error.
    pub fn sample_frame(&mut self) -> Option<FrameBuffer> {
        let frame = self.stream.current_frame().filter(|f| !f.is_empty());
        if frame.is_none() {
            trace!("stream not ready, tick skipped");
        }
        frame
    }

    /// Full-resolution still for upload.
    pub fn capture(&mut self) -> Result<FrameBuffer, CaptureError> {
        self.sample_frame().ok_or(CaptureError::StreamNotReady)
    }

    pub fn release(&mut self) {
        self.stream.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::testing::ScriptedStream;
    use crate::error::ErrorKind;

    #[test]
    fn empty_frames_are_not_samples() {
        let (stream, _) = ScriptedStream::new(
            [
                Some(FrameBuffer::new(0, 0, Vec::new()).unwrap()),
                None,
                Some(FrameBuffer::filled(4, 3, [1, 2, 3])),
            ],
            None,
        );
        let mut sampler = FrameSampler::new(stream);

        assert!(sampler.sample_frame().is_none());
        assert!(sampler.sample_frame().is_none());
        assert_eq!(sampler.sample_frame().unwrap().width(), 4);
    }

    #[test]
    fn capture_without_frame_is_stream_not_ready() {
        let (stream, released) = ScriptedStream::new([], None);
        let mut sampler = FrameSampler::new(stream);
        let err = sampler.capture().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StreamNotReady);

        sampler.release();
        assert!(released.is_released());
    }
}
