//! Surface (swapchain) management.
//!
//! The [`SurfaceManager`] owns the set of presentable surface images. It is
//! the only component allowed to hand them back to the presentation layer,
//! and it never does so while the GPU may still reference them: a resize
//! flushes the fence before any image is released.
//!
//! # Overview
//!
//! - `present` displays the current image and adopts the next index the
//!   presentation layer reports (display engines may reorder)
//! - `resize` rebuilds the image set at new dimensions, preserving the
//!   buffer count
//! - every submission records the signaled fence value against the image it
//!   rendered to, so release safety is checkable
//!
//! # Resize sequence
//!
//! ```text
//! 1. clamp dimensions to >= 1; unchanged dimensions are a no-op
//! 2. flush: fence signal + unbounded wait (nothing references the images)
//! 3. release every image back to the presentation layer
//! 4. rebuild at the new dimensions with the same buffer count
//! 5. repopulate and re-read the current index
//! ```

use std::sync::Arc;

use tracing::{debug, info, trace, warn};

use crate::driver::{FenceValue, PresentTarget, SurfaceImage, SyncMode};
use crate::error::{RhiError, RhiResult};
use crate::fence::FenceTracker;

/// Owns the presentable surface images and the current image index.
pub struct SurfaceManager {
    target: Box<dyn PresentTarget>,
    fence: Arc<FenceTracker>,
    images: Vec<Option<SurfaceImage>>,
    // Last fence value signaled for a submission targeting each image.
    image_fence_values: Vec<FenceValue>,
    current_index: u32,
    width: u32,
    height: u32,
}

impl SurfaceManager {
    /// Builds the initial image set.
    ///
    /// Dimensions are clamped to a minimum of 1 in each dimension.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::DeviceLost`] if the presentation layer cannot
    /// build the images.
    pub fn new(
        target: Box<dyn PresentTarget>,
        fence: Arc<FenceTracker>,
        width: u32,
        height: u32,
        image_count: usize,
    ) -> RhiResult<Self> {
        let width = width.max(1);
        let height = height.max(1);

        let mut manager = Self {
            target,
            fence,
            images: Vec::new(),
            image_fence_values: Vec::new(),
            current_index: 0,
            width,
            height,
        };
        manager.rebuild(width, height, image_count)?;

        info!(width, height, image_count, "surface manager created");
        Ok(manager)
    }

    /// Index of the image the next frame renders to.
    #[inline]
    pub fn current_image_index(&self) -> u32 {
        self.current_index
    }

    /// Number of presentation slots.
    #[inline]
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Number of slots currently holding an image.
    ///
    /// Equals [`image_count`](Self::image_count) outside of a resize.
    pub fn populated_images(&self) -> usize {
        self.images.iter().filter(|slot| slot.is_some()).count()
    }

    /// Current surface width in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Current surface height in pixels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// The image the next frame renders to.
    ///
    /// # Panics
    ///
    /// Panics if called mid-resize; the manager never exposes that state.
    pub fn current_image(&self) -> &SurfaceImage {
        self.images[self.current_index as usize]
            .as_ref()
            .expect("current image is populated outside of resize")
    }

    /// Last fence value recorded against an image's use.
    #[inline]
    pub fn image_fence_value(&self, index: u32) -> FenceValue {
        self.image_fence_values[index as usize]
    }

    /// Records the fence value signaled for a submission targeting `index`.
    ///
    /// Called by the submission pipeline after every frame; release safety
    /// during resize is checked against these values.
    pub fn note_image_use(&mut self, index: u32, value: FenceValue) {
        self.image_fence_values[index as usize] = value;
    }

    /// Presents the current image and advances to the next one.
    ///
    /// The next index is whatever the presentation layer reports, validated
    /// against the populated image set.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::TearingUnsupported`] for a tearing present
    /// without reported capability, or [`RhiError::DeviceLost`] if the
    /// presentation layer fails or reports an index this manager does not
    /// hold an image for.
    pub fn present(&mut self, sync: SyncMode) -> RhiResult<u32> {
        if sync == SyncMode::VsyncOffTearing && !self.target.allows_tearing() {
            warn!("tearing present requested without tearing support");
            return Err(RhiError::TearingUnsupported);
        }

        self.target.present(sync)?;
        let next = self.target.current_index();
        self.ensure_populated(next)?;
        self.current_index = next;
        trace!(index = next, ?sync, "presented");
        Ok(next)
    }

    /// Rebuilds the surface images for new dimensions.
    ///
    /// Width and height are clamped independently to a minimum of 1.
    /// Unchanged (clamped) dimensions are a no-op and issue no fence signal.
    /// The buffer count is preserved across the rebuild.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::DeviceLost`] if the rebuild fails; the fence
    /// tracker is latched and the caller must tear down and re-initialize at
    /// a higher layer.
    pub fn resize(&mut self, new_width: u32, new_height: u32) -> RhiResult<()> {
        let width = new_width.max(1);
        let height = new_height.max(1);
        if width == self.width && height == self.height {
            return Ok(());
        }

        info!(
            from_width = self.width,
            from_height = self.height,
            width,
            height,
            "resizing surface"
        );

        // Nothing may reference the images once this returns.
        let completed = self.fence.flush(None)?;
        debug_assert!(
            self.image_fence_values.iter().all(|v| *v <= completed),
            "flush must cover every image's last use"
        );

        let count = self.images.len();
        for slot in &mut self.images {
            if let Some(image) = slot.take() {
                self.target.release_image(image);
            }
        }

        self.width = width;
        self.height = height;
        self.rebuild(width, height, count)
    }

    fn rebuild(&mut self, width: u32, height: u32, count: usize) -> RhiResult<()> {
        let built = match self.target.build_images(width, height, count) {
            Ok(built) if built.len() == count => built,
            Ok(built) => {
                self.fence.mark_device_lost();
                return Err(RhiError::DeviceLost(format!(
                    "presentation layer built {} images, expected {count}",
                    built.len()
                )));
            }
            Err(RhiError::DeviceLost(reason)) => {
                self.fence.mark_device_lost();
                return Err(RhiError::DeviceLost(reason));
            }
            Err(err) => {
                self.fence.mark_device_lost();
                return Err(RhiError::DeviceLost(err.to_string()));
            }
        };

        self.images = built.into_iter().map(Some).collect();
        self.image_fence_values = vec![FenceValue::ZERO; count];
        let current = self.target.current_index();
        self.ensure_populated(current)?;
        self.current_index = current;

        debug!(width, height, count, "surface images rebuilt");
        Ok(())
    }

    fn ensure_populated(&self, index: u32) -> RhiResult<()> {
        let populated = self
            .images
            .get(index as usize)
            .map(|slot| slot.is_some())
            .unwrap_or(false);
        if !populated {
            return Err(RhiError::DeviceLost(format!(
                "presentation layer reported image index {index}, which is not populated"
            )));
        }
        Ok(())
    }
}

impl Drop for SurfaceManager {
    fn drop(&mut self) {
        // Callers drain the frame loop before dropping; ownership still goes
        // back to the presentation layer here.
        let mut released = 0;
        for slot in &mut self.images {
            if let Some(image) = slot.take() {
                self.target.release_image(image);
                released += 1;
            }
        }
        if released > 0 {
            debug!(released, "surface images returned to presentation layer");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::software::{CompletionMode, SoftwareGpu, SoftwarePresenter};

    fn manager(
        tearing: bool,
        width: u32,
        height: u32,
        count: usize,
    ) -> (Arc<FenceTracker>, SoftwarePresenter, SurfaceManager) {
        let gpu = Arc::new(SoftwareGpu::new(CompletionMode::Immediate));
        let fence = Arc::new(FenceTracker::new(gpu));
        let presenter = SoftwarePresenter::new(tearing);
        let probe = presenter.clone();
        let manager =
            SurfaceManager::new(Box::new(presenter), fence.clone(), width, height, count).unwrap();
        (fence, probe, manager)
    }

    #[test]
    fn test_new_populates_all_slots() {
        let (_fence, probe, manager) = manager(false, 1280, 720, 3);
        assert_eq!(manager.image_count(), 3);
        assert_eq!(manager.populated_images(), 3);
        assert_eq!(manager.current_image_index(), 0);
        assert_eq!(manager.current_image().width(), 1280);
        assert_eq!(probe.outstanding_images(), 3);
    }

    #[test]
    fn test_zero_dimensions_clamp_to_one() {
        let (_fence, _probe, manager) = manager(false, 0, 0, 2);
        assert_eq!(manager.width(), 1);
        assert_eq!(manager.height(), 1);
    }

    #[test]
    fn test_resize_unchanged_is_noop_without_signal() {
        let (fence, _probe, mut manager) = manager(false, 1280, 720, 2);
        let signaled_before = fence.last_signaled();

        manager.resize(1280, 720).unwrap();

        assert_eq!(fence.last_signaled(), signaled_before);
    }

    #[test]
    fn test_resize_compares_clamped_dimensions() {
        let (fence, _probe, mut manager) = manager(false, 1, 1, 2);

        // 0x0 clamps to 1x1, which is unchanged: still a no-op.
        manager.resize(0, 0).unwrap();

        assert_eq!(fence.last_signaled(), FenceValue::ZERO);
    }

    #[test]
    fn test_resize_flushes_releases_and_rebuilds() {
        let (fence, probe, mut manager) = manager(false, 1280, 720, 3);
        manager.note_image_use(0, FenceValue::new(1));

        manager.resize(1920, 1080).unwrap();

        // Exactly one flush signal was issued.
        assert_eq!(fence.last_signaled(), FenceValue::new(1));
        assert_eq!(manager.width(), 1920);
        assert_eq!(manager.height(), 1080);
        assert_eq!(manager.populated_images(), 3);
        assert_eq!(manager.current_image_index(), 0);
        assert_eq!(manager.image_fence_value(0), FenceValue::ZERO);
        // Old images were handed back; only the new set is outstanding.
        assert_eq!(probe.outstanding_images(), 3);
        assert_eq!(manager.current_image().width(), 1920);
    }

    #[test]
    fn test_present_advances_current_index() {
        let (_fence, probe, mut manager) = manager(false, 640, 480, 2);
        assert_eq!(manager.present(SyncMode::VsyncOn).unwrap(), 1);
        assert_eq!(manager.present(SyncMode::VsyncOn).unwrap(), 0);
        assert_eq!(probe.presents(), vec![SyncMode::VsyncOn, SyncMode::VsyncOn]);
    }

    #[test]
    fn test_present_adopts_reordered_index() {
        let (_fence, probe, mut manager) = manager(false, 640, 480, 3);
        probe.force_next_index(2);
        assert_eq!(manager.present(SyncMode::VsyncOn).unwrap(), 2);
        assert_eq!(manager.current_image_index(), 2);
    }

    #[test]
    fn test_present_rejects_unpopulated_index() {
        let (_fence, probe, mut manager) = manager(false, 640, 480, 2);
        probe.force_next_index(9);
        assert!(matches!(
            manager.present(SyncMode::VsyncOn),
            Err(RhiError::DeviceLost(_))
        ));
    }

    #[test]
    fn test_tearing_requires_capability() {
        let (_fence, probe, mut mgr) = manager(false, 640, 480, 2);
        assert!(matches!(
            mgr.present(SyncMode::VsyncOffTearing),
            Err(RhiError::TearingUnsupported)
        ));
        assert!(probe.presents().is_empty());

        let (_fence, _probe, mut tearing) = manager(true, 640, 480, 2);
        tearing.present(SyncMode::VsyncOffTearing).unwrap();
    }

    #[test]
    fn test_failed_rebuild_is_device_lost_and_latches_fence() {
        let (fence, probe, mut manager) = manager(false, 1280, 720, 2);
        probe.set_fail_builds(true);

        assert!(matches!(
            manager.resize(800, 600),
            Err(RhiError::DeviceLost(_))
        ));
        assert!(fence.is_device_lost());
    }
}
