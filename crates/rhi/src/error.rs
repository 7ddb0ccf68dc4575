//! RHI-specific error types.

use std::time::Duration;

use thiserror::Error;

use crate::command::{RecordState, ResourceState};
use crate::driver::FenceValue;

/// RHI-specific error type.
///
/// Contract violations (`RecordingReset`, `InvalidStateTransition`,
/// `BadRecordState`) are fatal to the frame loop and never retried.
/// `Timeout` is recoverable; the caller decides whether to wait longer or
/// skip the frame. `DeviceLost` is fatal to this layer and must propagate
/// to a full re-initialization above it.
#[derive(Error, Debug)]
pub enum RhiError {
    /// A bounded fence wait exceeded its budget.
    #[error("timed out after {timeout:?} waiting for fence value {value}")]
    Timeout {
        /// The fence value that was waited for.
        value: FenceValue,
        /// The wait budget that elapsed.
        timeout: Duration,
    },

    /// A command buffer was reset while its submission is still in flight.
    #[error("command buffer reset while submission {value} is still in flight")]
    RecordingReset {
        /// The un-waited fence value of the outstanding submission.
        value: FenceValue,
    },

    /// A recorded transition does not match the image's tracked state, or an
    /// image was left in render-target state at the end of recording.
    #[error("invalid state transition for image {image}: expected {expected:?}, found {actual:?}")]
    InvalidStateTransition {
        /// Index of the surface image.
        image: u32,
        /// The state the image was required to be in.
        expected: ResourceState,
        /// The state it actually was in.
        actual: ResourceState,
    },

    /// A recording operation was issued in the wrong buffer state.
    #[error("command buffer is {actual:?}, expected {expected:?}")]
    BadRecordState {
        /// The state the operation requires.
        expected: RecordState,
        /// The buffer's current state.
        actual: RecordState,
    },

    /// The GPU device or presentation layer is gone.
    ///
    /// All in-flight fence values are meaningless after this; no further
    /// fence waits are attempted.
    #[error("device lost: {0}")]
    DeviceLost(String),

    /// A tearing present was requested without the surface reporting support.
    #[error("tearing present requested but the surface reports no tearing support")]
    TearingUnsupported,
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;
