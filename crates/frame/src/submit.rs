//! Command submission pipeline.
//!
//! One call per frame: record the state transitions around the caller's
//! draw commands, finalize, hand the stream to the GPU queue, and signal the
//! fence. The signaled value is remembered twice — against the frame slot
//! (so the slot is not reused early) and against the target surface image
//! (so the image is not released early).

use std::sync::Arc;

use tracing::trace;

use presenter_rhi::command::{CommandBuffer, ResourceState};
use presenter_rhi::driver::{FenceValue, GpuQueue};
use presenter_rhi::fence::FenceTracker;
use presenter_rhi::surface::SurfaceManager;
use presenter_rhi::RhiResult;

use crate::error::FrameResult;
use crate::slots::FrameSlot;

/// Records, submits, and fences one frame at a time.
pub struct SubmissionPipeline {
    queue: Arc<dyn GpuQueue>,
    fence: Arc<FenceTracker>,
}

impl SubmissionPipeline {
    /// Creates a pipeline over a queue and its fence tracker.
    pub fn new(queue: Arc<dyn GpuQueue>, fence: Arc<FenceTracker>) -> Self {
        Self { queue, fence }
    }

    /// Records and submits one frame targeting the surface's current image.
    ///
    /// The target image is transitioned to render-target state, `draw`
    /// records the frame's commands (opaque to this pipeline), and the image
    /// is transitioned back to presentation-ready state before the stream is
    /// finalized — closing validates the pairing. Submission blocks only on
    /// queue backpressure.
    ///
    /// On success the newly signaled fence value is stored in the slot and
    /// against the target image, and returned.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidStateTransition`] if `draw` left any image
    /// outside presentation-ready state (fatal, never retried), or
    /// propagates queue and fence errors.
    ///
    /// [`RhiError::InvalidStateTransition`]: presenter_rhi::RhiError::InvalidStateTransition
    pub fn submit_frame(
        &self,
        slot: &mut FrameSlot,
        surfaces: &mut SurfaceManager,
        draw: impl FnOnce(&mut CommandBuffer) -> RhiResult<()>,
    ) -> FrameResult<FenceValue> {
        let image = surfaces.current_image_index();

        let buffer = slot.buffer_mut();
        buffer.begin()?;
        buffer.record_transition(image, ResourceState::Present, ResourceState::RenderTarget)?;
        draw(buffer)?;
        buffer.record_transition(image, ResourceState::RenderTarget, ResourceState::Present)?;
        buffer.close()?;

        self.queue.execute(buffer.commands())?;

        let value = self.fence.signal()?;
        slot.mark_submitted(value);
        surfaces.note_image_use(image, value);

        trace!(image, %value, commands = slot.buffer().commands().len(), "frame submitted");
        Ok(value)
    }
}
