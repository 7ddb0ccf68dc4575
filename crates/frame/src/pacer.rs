//! Frame pacing.
//!
//! The [`FramePacer`] ties the frame loop together: it cycles the slot ring,
//! drives the submission pipeline, presents, and blocks only as long as
//! necessary to reclaim the slot it is about to reuse.
//!
//! # Overview
//!
//! One `run_frame` call performs one iteration:
//!
//! ```text
//! 1. acquire the slot for this frame (waits for its previous submission)
//! 2. reset the slot's recording buffer
//! 3. submit: transitions + caller draw commands + fence signal
//! 4. present and adopt the next image index
//! 5. advance the frame index
//! ```
//!
//! On shutdown, [`drain`](FramePacer::drain) flushes the queue so no GPU
//! work is outstanding before any resource is torn down.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use presenter_rhi::command::CommandBuffer;
use presenter_rhi::driver::{FenceValue, GpuQueue, PresentTarget, SyncMode};
use presenter_rhi::fence::FenceTracker;
use presenter_rhi::surface::SurfaceManager;
use presenter_rhi::{RhiError, RhiResult};

use crate::error::{FrameError, FrameResult};
use crate::slots::FrameSlots;
use crate::submit::SubmissionPipeline;
use crate::DEFAULT_FRAMES_IN_FLIGHT;

/// Frame pacer configuration.
#[derive(Debug, Clone)]
pub struct PacerConfig {
    /// Number of frame slots (and surface images).
    ///
    /// Smaller values reduce input-to-photon latency; larger values
    /// tolerate frame-time variance without stalling the CPU. 2 or 3 are
    /// the usual choices.
    pub frames_in_flight: usize,
    /// Sync mode passed to every present.
    pub sync_mode: SyncMode,
    /// Budget for the per-frame slot wait.
    ///
    /// `None` waits unboundedly. The default is one second — long enough
    /// for any real frame, short enough to surface a hung queue as a typed
    /// [`Timeout`](presenter_rhi::RhiError::Timeout) instead of a freeze.
    pub acquire_timeout: Option<Duration>,
}

impl Default for PacerConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: DEFAULT_FRAMES_IN_FLIGHT,
            sync_mode: SyncMode::VsyncOn,
            acquire_timeout: Some(Duration::from_secs(1)),
        }
    }
}

impl PacerConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::InvalidConfig`] if `frames_in_flight` is
    /// outside 1..=4.
    pub fn validate(&self) -> FrameResult<()> {
        if !(1..=4).contains(&self.frames_in_flight) {
            return Err(FrameError::InvalidConfig(format!(
                "frames_in_flight must be within 1..=4, got {}",
                self.frames_in_flight
            )));
        }
        Ok(())
    }
}

/// Drives the frame loop over a queue and a presentation target.
pub struct FramePacer {
    slots: FrameSlots,
    pipeline: SubmissionPipeline,
    surfaces: SurfaceManager,
    fence: Arc<FenceTracker>,
    config: PacerConfig,
    frame_index: u64,
    frames_submitted: u64,
    device_lost: bool,
}

impl FramePacer {
    /// Creates a pacer and builds the initial surface images.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::InvalidConfig`] for a bad configuration or
    /// [`RhiError::DeviceLost`] if the initial image build fails.
    pub fn new(
        queue: Arc<dyn GpuQueue>,
        target: Box<dyn PresentTarget>,
        config: PacerConfig,
        width: u32,
        height: u32,
    ) -> FrameResult<Self> {
        config.validate()?;

        let fence = Arc::new(FenceTracker::new(queue.clone()));
        let surfaces = SurfaceManager::new(
            target,
            fence.clone(),
            width,
            height,
            config.frames_in_flight,
        )?;
        let slots = FrameSlots::new(config.frames_in_flight, fence.clone());
        let pipeline = SubmissionPipeline::new(queue, fence.clone());

        info!(
            frames_in_flight = config.frames_in_flight,
            width, height, "frame pacer created"
        );
        Ok(Self {
            slots,
            pipeline,
            surfaces,
            fence,
            config,
            frame_index: 0,
            frames_submitted: 0,
            device_lost: false,
        })
    }

    /// Runs one frame: acquire, submit the caller's draw commands, present,
    /// advance.
    ///
    /// Returns the fence value signaled for the frame. A
    /// [`Timeout`](RhiError::Timeout) leaves the pacer unchanged — the
    /// caller may retry the same frame or skip it. Contract violations and
    /// device loss are fatal; after device loss every further call fails
    /// fast without touching the fence.
    pub fn run_frame(
        &mut self,
        render_fn: impl FnOnce(&mut CommandBuffer) -> RhiResult<()>,
    ) -> FrameResult<FenceValue> {
        self.ensure_live()?;
        let result = self.run_frame_inner(render_fn);
        self.latch_on_device_loss(&result);
        result
    }

    fn run_frame_inner(
        &mut self,
        render_fn: impl FnOnce(&mut CommandBuffer) -> RhiResult<()>,
    ) -> FrameResult<FenceValue> {
        let slot = self
            .slots
            .acquire(self.frame_index, self.config.acquire_timeout)?;
        slot.reset()?;

        let value = self
            .pipeline
            .submit_frame(slot, &mut self.surfaces, render_fn)?;
        self.surfaces.present(self.config.sync_mode)?;

        self.frame_index += 1;
        self.frames_submitted += 1;
        Ok(value)
    }

    /// Rebuilds the surface images for new dimensions.
    ///
    /// Unchanged dimensions are a no-op. The internal flush makes this a
    /// blocking call; resizes are rare and latency-insensitive.
    pub fn resize(&mut self, width: u32, height: u32) -> FrameResult<()> {
        self.ensure_live()?;
        let result = self.surfaces.resize(width, height).map_err(FrameError::from);
        self.latch_on_device_loss(&result);
        result
    }

    /// Flushes all outstanding GPU work before teardown.
    ///
    /// After a successful drain no submission is in flight and every slot is
    /// reclaimed; the pacer and its components may be dropped safely.
    pub fn drain(&mut self) -> FrameResult<()> {
        self.ensure_live()?;

        let result = self.fence.flush(None).map_err(FrameError::from);
        self.latch_on_device_loss(&result);
        let value = result?;
        self.slots.reclaim_all();

        debug!(%value, frames = self.frames_submitted, "frame loop drained");
        Ok(())
    }

    /// Index of the next frame to submit.
    #[inline]
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Total frames submitted so far.
    #[inline]
    pub fn frames_submitted(&self) -> u64 {
        self.frames_submitted
    }

    /// The surface manager, e.g. for dimension queries.
    #[inline]
    pub fn surfaces(&self) -> &SurfaceManager {
        &self.surfaces
    }

    /// The shared fence tracker.
    #[inline]
    pub fn fence(&self) -> &Arc<FenceTracker> {
        &self.fence
    }

    /// The active configuration.
    #[inline]
    pub fn config(&self) -> &PacerConfig {
        &self.config
    }

    /// Whether the pacer has latched after device loss.
    #[inline]
    pub fn is_device_lost(&self) -> bool {
        self.device_lost
    }

    fn ensure_live(&self) -> FrameResult<()> {
        if self.device_lost {
            return Err(RhiError::DeviceLost("frame pacer is latched".into()).into());
        }
        Ok(())
    }

    fn latch_on_device_loss<T>(&mut self, result: &FrameResult<T>) {
        if let Err(err) = result {
            if err.is_device_lost() && !self.device_lost {
                warn!("device lost; frame pacer disabled");
                self.device_lost = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default_is_valid() {
        let config = PacerConfig::default();
        config.validate().unwrap();
        assert_eq!(config.frames_in_flight, DEFAULT_FRAMES_IN_FLIGHT);
        assert_eq!(config.sync_mode, SyncMode::VsyncOn);
    }

    #[test]
    fn test_config_rejects_bad_slot_counts() {
        for frames_in_flight in [0usize, 5, 64] {
            let config = PacerConfig {
                frames_in_flight,
                ..Default::default()
            };
            assert!(matches!(
                config.validate(),
                Err(FrameError::InvalidConfig(_))
            ));
        }
    }

    #[test]
    fn test_pacer_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<FramePacer>();
    }
}
