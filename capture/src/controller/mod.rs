pub mod runner;
pub mod sampler;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use runner::{CaptureRunner, SessionOutcome, Timing};
pub use sampler::FrameSampler;
pub use state::{CaptureController, CaptureState, Phase, TickOutcome};
