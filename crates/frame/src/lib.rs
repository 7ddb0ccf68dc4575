//! Frame loop for multi-buffered GPU presentation.
//!
//! This crate orchestrates the per-frame cycle:
//! - Frame slot management (wait-before-reuse)
//! - Command submission with fence bookkeeping
//! - Frame pacing, resize, and shutdown draining

mod error;

pub mod pacer;
pub mod slots;
pub mod submit;

pub use error::{FrameError, FrameResult};
pub use pacer::{FramePacer, PacerConfig};
pub use slots::{FrameSlot, FrameSlots};
pub use submit::SubmissionPipeline;

/// Default number of frames in flight (and surface images).
pub const DEFAULT_FRAMES_IN_FLIGHT: usize = 3;
