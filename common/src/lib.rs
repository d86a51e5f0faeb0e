pub mod config;
pub mod extracted;
pub mod frame;
pub mod handoff;
