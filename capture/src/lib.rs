//! Live identity-card capture: watch a network camera until a document is
//! held steady, take a still, and have the OCR backend read it.

pub mod camera;
pub mod controller;
pub mod detect;
pub mod encoder;
pub mod error;
pub mod upload;
