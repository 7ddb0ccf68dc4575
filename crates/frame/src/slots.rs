//! Frame slot table.
//!
//! A fixed ring of N frame slots, each owning one command recording buffer
//! and the fence value of its last submission. Slots are allocated once at
//! startup and cycled round-robin: the slot for frame `i` is `i mod N`.
//!
//! Reuse discipline is the heart of the frame loop: before a slot's buffer
//! is reset for new recording, the table waits on the fence tracker for the
//! slot's last submitted value. The GPU may still be reading the buffer
//! until then, so skipping the wait would be undefined behavior on a real
//! driver — [`FrameSlot::reset`] treats it as a fatal precondition violation.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use presenter_frame::FrameSlots;
//! use presenter_rhi::fence::FenceTracker;
//! use presenter_rhi::software::{CompletionMode, SoftwareGpu};
//!
//! # fn example() -> presenter_frame::FrameResult<()> {
//! let gpu = Arc::new(SoftwareGpu::new(CompletionMode::Immediate));
//! let fence = Arc::new(FenceTracker::new(gpu));
//! let mut slots = FrameSlots::new(2, fence);
//!
//! // First use of a slot never blocks: there is no prior submission.
//! let slot = slots.acquire(0, None)?;
//! slot.reset()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace};

use presenter_rhi::command::CommandBuffer;
use presenter_rhi::driver::FenceValue;
use presenter_rhi::fence::FenceTracker;
use presenter_rhi::RhiError;

use crate::error::FrameResult;

/// One reusable set of CPU-side recording resources.
#[derive(Debug)]
pub struct FrameSlot {
    buffer: CommandBuffer,
    last_submitted: FenceValue,
    // Set at submission, cleared by the acquire-time wait.
    in_flight: bool,
}

impl FrameSlot {
    fn new() -> Self {
        Self {
            buffer: CommandBuffer::new(),
            last_submitted: FenceValue::ZERO,
            in_flight: false,
        }
    }

    /// The slot's recording buffer.
    #[inline]
    pub fn buffer(&self) -> &CommandBuffer {
        &self.buffer
    }

    /// Mutable access to the recording buffer.
    #[inline]
    pub fn buffer_mut(&mut self) -> &mut CommandBuffer {
        &mut self.buffer
    }

    /// Fence value of this slot's last submission.
    ///
    /// [`FenceValue::ZERO`] until the slot has been submitted once.
    #[inline]
    pub fn last_submitted(&self) -> FenceValue {
        self.last_submitted
    }

    /// Whether the last submission has not yet been waited on.
    #[inline]
    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    /// Clears the recording buffer for a new frame.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::RecordingReset`] if the slot's last submission is
    /// still in flight — the acquire step exists specifically to prevent
    /// this, so hitting it is a caller ordering bug and fatal.
    pub fn reset(&mut self) -> FrameResult<()> {
        if self.in_flight {
            return Err(RhiError::RecordingReset {
                value: self.last_submitted,
            }
            .into());
        }
        self.buffer.reset();
        Ok(())
    }

    /// Records a submission of this slot's buffer.
    pub(crate) fn mark_submitted(&mut self, value: FenceValue) {
        self.last_submitted = value;
        self.in_flight = true;
    }

    pub(crate) fn mark_reclaimed(&mut self) {
        self.in_flight = false;
    }
}

/// Fixed ring of frame slots, addressed by `frame_index mod N`.
pub struct FrameSlots {
    slots: Vec<FrameSlot>,
    fence: Arc<FenceTracker>,
}

impl FrameSlots {
    /// Allocates `count` slots for the lifetime of the frame loop.
    ///
    /// `count` trades input-to-photon latency (smaller) against tolerance to
    /// frame-time variance (larger); 2 or 3 are the usual choices.
    pub fn new(count: usize, fence: Arc<FenceTracker>) -> Self {
        let slots = (0..count).map(|_| FrameSlot::new()).collect();
        debug!(count, "frame slots allocated");
        Self { slots, fence }
    }

    /// Number of slots in the ring.
    #[inline]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Returns the slot for `frame_index`, reclaimed and safe to reuse.
    ///
    /// Waits on the fence tracker for the slot's last submitted value first.
    /// The very first use of a slot is a no-op wait (its value is
    /// [`FenceValue::ZERO`]), so the first N frames never block — at most
    /// N−1 frames of GPU work can be outstanding before a wait is forced.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::Timeout`] if the bounded wait elapsed (the frame
    /// may be retried), or [`RhiError::DeviceLost`] if the device is gone.
    pub fn acquire(
        &mut self,
        frame_index: u64,
        timeout: Option<Duration>,
    ) -> FrameResult<&mut FrameSlot> {
        let index = (frame_index % self.slots.len() as u64) as usize;
        let value = self.slots[index].last_submitted;

        self.fence.wait_until(value, timeout)?;
        trace!(slot = index, %value, "slot reclaimed");

        let slot = &mut self.slots[index];
        slot.mark_reclaimed();
        Ok(slot)
    }

    /// Marks every slot reclaimed after an external full flush.
    pub(crate) fn reclaim_all(&mut self) {
        for slot in &mut self.slots {
            slot.mark_reclaimed();
        }
    }
}
