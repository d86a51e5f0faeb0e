pub mod edge;
pub mod traits;

pub use edge::EdgeDensityDetector;
pub use traits::{Detection, DocumentDetector};
