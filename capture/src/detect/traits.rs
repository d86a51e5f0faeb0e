use dni_capture_common::frame::FrameBuffer;

/// Outcome of classifying one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    /// Fraction of neighbor pairs that look like an edge.
    pub edge_ratio: f64,
    pub is_document: bool,
}

/// Decides whether a single frame looks like a framed identity card.
///
/// Implementations are stateless across calls: every verdict is derived
/// from the frame passed in, nothing is cached between frames.
pub trait DocumentDetector: Send + Sync {
    fn detect(&self, frame: &FrameBuffer) -> Detection;

    /// Human-readable name for logging.
    fn name(&self) -> &str {
        "unnamed"
    }
}
