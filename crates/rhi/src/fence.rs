//! Fence tracking for CPU/GPU completion ordering.
//!
//! The [`FenceTracker`] wraps a queue's monotonically increasing completion
//! counter. The CPU side allocates strictly increasing signal values; the GPU
//! side reports the highest value it has reached. Everything the frame loop
//! knows about GPU progress flows through this type.
//!
//! # Usage Pattern
//!
//! ```text
//! 1. Submit a frame's command stream to the queue
//! 2. signal() -> v, remember v against the frame slot and surface image
//! 3. ...N-1 frames later, before reusing the slot...
//! 4. wait_until(v, budget) - no-op if the GPU already passed v
//! ```
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use presenter_rhi::fence::FenceTracker;
//! use presenter_rhi::software::{CompletionMode, SoftwareGpu};
//!
//! # fn example() -> presenter_rhi::RhiResult<()> {
//! let gpu = Arc::new(SoftwareGpu::new(CompletionMode::Immediate));
//! let fence = FenceTracker::new(gpu);
//!
//! let value = fence.signal()?;
//! fence.wait_until(value, None)?;
//! assert!(fence.query_completed() >= value);
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, trace};

use crate::driver::{FenceValue, GpuQueue};
use crate::error::{RhiError, RhiResult};

/// Tracks fence progress for one GPU queue.
///
/// Shared read-mostly across the frame loop's components via `Arc`. The
/// submission side is single-threaded; the completed value is the only state
/// written from another execution context (the GPU), and it is cached here
/// in an atomic so observations are monotonic even if the underlying driver
/// report jitters.
///
/// Once device loss is observed the tracker latches: every further signal or
/// wait fails fast with [`RhiError::DeviceLost`], because in-flight fence
/// values are meaningless on a lost device.
pub struct FenceTracker {
    queue: Arc<dyn GpuQueue>,
    // Last value handed out by signal(); single writer (submission thread).
    next_value: AtomicU64,
    // Highest completed value ever observed from the queue.
    completed: AtomicU64,
    device_lost: AtomicBool,
}

impl FenceTracker {
    /// Creates a tracker over a queue. The counter starts at
    /// [`FenceValue::ZERO`], which counts as already completed.
    pub fn new(queue: Arc<dyn GpuQueue>) -> Self {
        Self {
            queue,
            next_value: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            device_lost: AtomicBool::new(false),
        }
    }

    /// Allocates the next fence value and enqueues a GPU-side signal for it.
    ///
    /// The returned value is reached once all work submitted to the queue
    /// before this call has completed.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::DeviceLost`] if the device is gone.
    pub fn signal(&self) -> RhiResult<FenceValue> {
        self.ensure_live()?;

        let value = FenceValue::new(self.next_value.fetch_add(1, Ordering::Relaxed) + 1);
        match self.queue.signal(value) {
            Ok(()) => {
                trace!(%value, "fence signal enqueued");
                Ok(value)
            }
            Err(err) => Err(self.latch_if_lost(err)),
        }
    }

    /// The last value handed out by [`signal`](Self::signal).
    #[inline]
    pub fn last_signaled(&self) -> FenceValue {
        FenceValue::new(self.next_value.load(Ordering::Relaxed))
    }

    /// Returns the last value the GPU has confirmed reaching.
    ///
    /// Non-blocking, and monotonic: a later call never returns a smaller
    /// value than an earlier call.
    pub fn query_completed(&self) -> FenceValue {
        let seen = self.queue.completed_value().get();
        self.completed.fetch_max(seen, Ordering::AcqRel);
        FenceValue::new(self.completed.load(Ordering::Acquire))
    }

    /// Blocks until the completed value reaches `value`.
    ///
    /// A no-op if the value is already reached. `timeout == None` waits
    /// unboundedly — reserved for resize and shutdown, which are rare and
    /// latency-insensitive; ordinary per-frame waits pass a budget.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::Timeout`] if a bounded wait elapsed (recoverable;
    /// the caller may retry with a longer budget or skip the frame), or
    /// [`RhiError::DeviceLost`] if the device is gone.
    pub fn wait_until(&self, value: FenceValue, timeout: Option<Duration>) -> RhiResult<()> {
        self.ensure_live()?;

        if self.query_completed() >= value {
            return Ok(());
        }

        debug!(%value, ?timeout, "waiting for fence");
        match self.queue.wait_for_value(value, timeout) {
            Ok(true) => {
                self.completed.fetch_max(value.get(), Ordering::AcqRel);
                Ok(())
            }
            Ok(false) => Err(RhiError::Timeout {
                value,
                timeout: timeout.unwrap_or(Duration::MAX),
            }),
            Err(err) => Err(self.latch_if_lost(err)),
        }
    }

    /// Signals and then waits for the signaled value.
    ///
    /// Forces all queued GPU work to complete before returning. Used by
    /// resize and shutdown to guarantee nothing references the resources
    /// about to be torn down.
    pub fn flush(&self, timeout: Option<Duration>) -> RhiResult<FenceValue> {
        let value = self.signal()?;
        self.wait_until(value, timeout)?;
        Ok(value)
    }

    /// Whether device loss has been observed.
    #[inline]
    pub fn is_device_lost(&self) -> bool {
        self.device_lost.load(Ordering::Acquire)
    }

    /// Latches the tracker after device loss was detected elsewhere
    /// (e.g. a failed surface rebuild).
    pub fn mark_device_lost(&self) {
        if !self.device_lost.swap(true, Ordering::AcqRel) {
            error!("device lost; fence tracker disabled");
        }
    }

    fn ensure_live(&self) -> RhiResult<()> {
        if self.is_device_lost() {
            return Err(RhiError::DeviceLost("fence tracker is latched".into()));
        }
        Ok(())
    }

    fn latch_if_lost(&self, err: RhiError) -> RhiError {
        if matches!(err, RhiError::DeviceLost(_)) {
            self.mark_device_lost();
        }
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::software::{CompletionMode, SoftwareGpu};
    use std::time::Instant;

    fn tracker(mode: CompletionMode) -> (Arc<SoftwareGpu>, FenceTracker) {
        let gpu = Arc::new(SoftwareGpu::new(mode));
        let fence = FenceTracker::new(gpu.clone());
        (gpu, fence)
    }

    #[test]
    fn test_signal_values_strictly_increase() {
        let (_gpu, fence) = tracker(CompletionMode::Immediate);
        let a = fence.signal().unwrap();
        let b = fence.signal().unwrap();
        let c = fence.signal().unwrap();
        assert!(a < b && b < c);
        assert_eq!(fence.last_signaled(), c);
    }

    #[test]
    fn test_query_completed_is_monotonic() {
        let (gpu, fence) = tracker(CompletionMode::Manual);
        assert_eq!(fence.query_completed(), FenceValue::ZERO);

        let v = fence.signal().unwrap();
        gpu.complete_through(v);
        let after = fence.query_completed();
        assert_eq!(after, v);
        // Never moves backwards, whatever the driver reports.
        assert!(fence.query_completed() >= after);
    }

    #[test]
    fn test_wait_is_noop_when_already_reached() {
        let (_gpu, fence) = tracker(CompletionMode::Immediate);
        let v = fence.signal().unwrap();
        fence.wait_until(v, Some(Duration::from_millis(1))).unwrap();
        // ZERO is always reached, even before any signal.
        fence.wait_until(FenceValue::ZERO, None).unwrap();
    }

    #[test]
    fn test_bounded_wait_times_out_promptly() {
        let (_gpu, fence) = tracker(CompletionMode::Manual);
        let never = FenceValue::new(99);

        let started = Instant::now();
        let err = fence
            .wait_until(never, Some(Duration::from_millis(10)))
            .unwrap_err();
        let waited = started.elapsed();

        assert!(matches!(err, RhiError::Timeout { value, .. } if value == never));
        assert!(waited >= Duration::from_millis(10));
        assert!(waited < Duration::from_secs(1), "wait should be bounded");
    }

    #[test]
    fn test_flush_reaches_its_own_signal() {
        let (_gpu, fence) = tracker(CompletionMode::Delayed(Duration::from_millis(2)));
        let v = fence.flush(None).unwrap();
        assert!(fence.query_completed() >= v);
    }

    #[test]
    fn test_device_lost_latches() {
        let (gpu, fence) = tracker(CompletionMode::Immediate);
        gpu.set_lost();

        assert!(matches!(fence.signal(), Err(RhiError::DeviceLost(_))));
        assert!(fence.is_device_lost());
        // Latched: waits fail fast without touching the queue.
        assert!(matches!(
            fence.wait_until(FenceValue::new(1), None),
            Err(RhiError::DeviceLost(_))
        ));
    }

    #[test]
    fn test_tracker_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<FenceTracker>();
    }
}
