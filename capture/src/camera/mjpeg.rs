use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::{Camera, CameraError, LiveStream};

const BOUNDARY: &[u8] = b"--frame\r\n";
const HEADER_END: &[u8] = b"\r\n\r\n";

/// Parse state for the MJPEG multipart stream.
enum ParseState {
    /// Looking for the boundary marker `--frame\r\n`.
    SeekingBoundary,
    /// Found boundary, now looking for end of headers `\r\n\r\n`.
    SeekingHeaderEnd,
    /// Collecting JPEG bytes until the next boundary.
    CollectingJpeg,
}

/// Incremental splitter for a `multipart/x-mixed-replace` body.
pub(crate) struct MultipartJpegParser {
    buffer: BytesMut,
    state: ParseState,
    jpeg_start: usize,
}

impl MultipartJpegParser {
    pub(crate) fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(256 * 1024),
            state: ParseState::SeekingBoundary,
            jpeg_start: 0,
        }
    }

    /// Feed one network chunk, returning every JPEG completed by it in order.
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Vec<Bytes> {
        self.buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();

        loop {
            match self.state {
                ParseState::SeekingBoundary => {
                    if let Some(pos) = find_subsequence(&self.buffer, BOUNDARY) {
                        let _ = self.buffer.split_to(pos + BOUNDARY.len());
                        self.state = ParseState::SeekingHeaderEnd;
                    } else {
                        // Keep a tail in case the boundary spans chunks
                        if self.buffer.len() > BOUNDARY.len() {
                            let _ = self.buffer.split_to(self.buffer.len() - BOUNDARY.len());
                        }
                        break;
                    }
                }
                ParseState::SeekingHeaderEnd => {
                    if let Some(pos) = find_subsequence(&self.buffer, HEADER_END) {
                        let _ = self.buffer.split_to(pos + HEADER_END.len());
                        self.jpeg_start = 0;
                        self.state = ParseState::CollectingJpeg;
                    } else {
                        break;
                    }
                }
                ParseState::CollectingJpeg => {
                    let Some(pos) = find_subsequence(&self.buffer[self.jpeg_start..], BOUNDARY)
                    else {
                        // Don't re-scan what has already been searched
                        self.jpeg_start = self.buffer.len().saturating_sub(BOUNDARY.len());
                        break;
                    };

                    let jpeg_end = self.jpeg_start + pos;
                    let end = if self.buffer[..jpeg_end].ends_with(b"\r\n") {
                        jpeg_end - 2
                    } else {
                        jpeg_end
                    };

                    let part = self.buffer.split_to(jpeg_end + BOUNDARY.len()).freeze();
                    let jpeg = part.slice(..end);
                    if !jpeg.is_empty() {
                        frames.push(jpeg);
                    }
                    self.state = ParseState::SeekingHeaderEnd;
                }
            }
        }

        frames
    }
}

/// Camera serving a long-lived MJPEG stream.
pub struct MjpegCamera {
    url: String,
    connect_timeout: Duration,
}

impl MjpegCamera {
    pub fn new(url: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            url: url.into(),
            connect_timeout,
        }
    }
}

impl Camera for MjpegCamera {
    type Stream = LiveStream;

    async fn open(&self) -> Result<LiveStream, CameraError> {
        info!(url = self.url, "connecting to MJPEG stream");
        let client = reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .build()
            .map_err(CameraError::Client)?;
        let response = client
            .get(&self.url)
            .send()
            .await
            .map_err(CameraError::Connect)?;

        if !response.status().is_success() {
            return Err(CameraError::Status(response.status().as_u16()));
        }
        info!(status = %response.status(), "connected to MJPEG stream");

        let (latest, rx) = watch::channel(None);
        let feeder = tokio::spawn(feed_latest(response, latest));
        Ok(LiveStream::new(rx, feeder))
    }
}

async fn feed_latest(response: reqwest::Response, latest: watch::Sender<Option<Bytes>>) {
    let mut byte_stream = response.bytes_stream();
    let mut parser = MultipartJpegParser::new();
    let mut frames: u64 = 0;

    while let Some(chunk) = byte_stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!(error = %e, "MJPEG stream error");
                break;
            }
        };
        // Only the newest frame matters
        if let Some(jpeg) = parser.push(&chunk).pop() {
            frames += 1;
            debug!(frames, bytes = jpeg.len(), "frame received");
            latest.send_replace(Some(jpeg));
        }
    }

    info!(frames, "MJPEG stream ended");
    latest.send_replace(None);
}

/// Find the position of `needle` in `haystack`.
fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
