//! Review form filled from the fields the OCR backend read off an identity card.

pub mod dates;
pub mod review;

pub use review::{Field, FormError, FormSubmission, Mode, ReviewForm};
