//! pairbot Library
//!
//! Supervises a review worker process and mirrors its comments into a
//! review panel. The binary drives everything through the headless runner.

pub mod headless;

// Re-export main entry point
pub use headless::runner::run_headless;
