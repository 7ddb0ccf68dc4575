//! Core utilities for the presenter frame loop.
//!
//! This crate provides foundational pieces used across the workspace:
//! - Logging initialization
//! - Frame timing (delta time and FPS sampling)

mod clock;
mod logging;

pub use clock::{FpsSample, FrameClock};
pub use logging::init_logging;
