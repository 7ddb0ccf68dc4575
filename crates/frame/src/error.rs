//! Frame-loop error types.

use thiserror::Error;

use presenter_rhi::RhiError;

/// Error type for the frame loop.
#[derive(Error, Debug)]
pub enum FrameError {
    /// An error surfaced by the RHI layer.
    #[error(transparent)]
    Rhi(#[from] RhiError),

    /// The pacer configuration is invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl FrameError {
    /// Whether this is a recoverable fence-wait timeout.
    ///
    /// The caller may retry with a longer budget or skip the frame.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Rhi(RhiError::Timeout { .. }))
    }

    /// Whether the device is gone. Fatal to the frame loop; recovery means
    /// full re-initialization above it.
    pub fn is_device_lost(&self) -> bool {
        matches!(self, Self::Rhi(RhiError::DeviceLost(_)))
    }
}

/// Result type alias for frame-loop operations.
pub type FrameResult<T> = std::result::Result<T, FrameError>;
