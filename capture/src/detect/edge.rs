use dni_capture_common::config::DetectionConfig;
use dni_capture_common::frame::{FrameBuffer, BYTES_PER_PIXEL};

use super::traits::{Detection, DocumentDetector};

/// Edge-density heuristic for "is a document being held up to the camera".
///
/// Every pixel is compared with its right and lower neighbor. A pair counts
/// as an edge when `|dR| + |dG| + |dB|` exceeds `edge_threshold`. The edge
/// ratio is the number of edges divided by the number of pairs compared,
/// `(w-1)*h + w*(h-1)`, so it always lies in `[0, 1]`.
///
/// A card in front of a background gives a moderate ratio (text, borders).
/// A blank scene sits below `min_ratio`; clutter or sensor noise sits above
/// `max_ratio`. Both bounds are exclusive.
pub struct EdgeDensityDetector {
    edge_threshold: u32,
    min_ratio: f64,
    max_ratio: f64,
}

impl EdgeDensityDetector {
    pub fn new(edge_threshold: u32, min_ratio: f64, max_ratio: f64) -> Self {
        Self {
            edge_threshold,
            min_ratio,
            max_ratio,
        }
    }

    pub fn from_config(config: &DetectionConfig) -> Self {
        Self::new(
            config.edge_threshold,
            config.min_edge_ratio,
            config.max_edge_ratio,
        )
    }

    pub fn edge_ratio(&self, frame: &FrameBuffer) -> f64 {
        let w = frame.width() as usize;
        let h = frame.height() as usize;
        let pairs = w.saturating_sub(1) * h + w * h.saturating_sub(1);
        if pairs == 0 {
            return 0.0;
        }

        let mut edges = 0usize;
        for y in 0..frame.height() {
            let row = frame.row(y);
            let below = (y + 1 < frame.height()).then(|| frame.row(y + 1));

            for (x, px) in row.chunks_exact(BYTES_PER_PIXEL).enumerate() {
                if x + 1 < w {
                    let right = &row[(x + 1) * BYTES_PER_PIXEL..];
                    if self.is_edge(px, right) {
                        edges += 1;
                    }
                }
                if let Some(below) = below {
                    if self.is_edge(px, &below[x * BYTES_PER_PIXEL..]) {
                        edges += 1;
                    }
                }
            }
        }

        edges as f64 / pairs as f64
    }

    pub fn classify(&self, edge_ratio: f64) -> bool {
        edge_ratio > self.min_ratio && edge_ratio < self.max_ratio
    }

    fn is_edge(&self, a: &[u8], b: &[u8]) -> bool {
        let diff = u32::from(a[0].abs_diff(b[0]))
            + u32::from(a[1].abs_diff(b[1]))
            + u32::from(a[2].abs_diff(b[2]));
        diff > self.edge_threshold
    }
}

impl Default for EdgeDensityDetector {
    fn default() -> Self {
        Self::from_config(&DetectionConfig::default())
    }
}

impl DocumentDetector for EdgeDensityDetector {
    fn detect(&self, frame: &FrameBuffer) -> Detection {
        let edge_ratio = self.edge_ratio(frame);
        Detection {
            edge_ratio,
            is_document: self.classify(edge_ratio),
        }
    }

    fn name(&self) -> &str {
        "edge-density"
    }
}
