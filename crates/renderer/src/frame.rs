//! Frame outcomes and rebuild bookkeeping.

use tracing::{debug, warn};

use accele_rhi::{PresentStatus, PresentationChain, PresentationDriver, RhiError, RhiResult};

/// What happened to one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// The frame was presented and the chain still matches the surface.
    Presented,
    /// The frame was presented, but the chain no longer matches the surface.
    Stale,
    /// Nothing was rendered: the chain was out of date or is not live.
    Skipped,
}

impl FrameOutcome {
    /// Combines the acquire and present results of a presented frame.
    pub fn from_present(status: PresentStatus, acquired_suboptimal: bool) -> Self {
        match status {
            PresentStatus::Optimal if !acquired_suboptimal => Self::Presented,
            _ => Self::Stale,
        }
    }

    /// Returns true if the chain must be rebuilt before the next frame.
    #[inline]
    pub fn needs_rebuild(self) -> bool {
        !matches!(self, Self::Presented)
    }
}

/// Tracks whether the chain needs rebuilding and for which framebuffer size.
///
/// A rebuild stays pending while the framebuffer has zero area, so a
/// minimised window is rebuilt once it is restored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebuildTracker {
    width: u32,
    height: u32,
    pending: bool,
}

impl RebuildTracker {
    /// Creates a tracker for the current framebuffer size with nothing pending.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pending: false,
        }
    }

    /// Records a resize. Returns true if the size changed.
    pub fn resize(&mut self, width: u32, height: u32) -> bool {
        if (width, height) == (self.width, self.height) {
            return false;
        }

        self.width = width;
        self.height = height;
        self.pending = true;
        true
    }

    /// Marks the chain invalid without a size change.
    pub fn invalidate(&mut self) {
        self.pending = true;
    }

    /// Returns true if a rebuild is pending.
    #[inline]
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Returns true if the framebuffer has zero area.
    #[inline]
    pub fn is_minimized(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Returns the latest framebuffer size.
    #[inline]
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Takes a pending rebuild, returning the size to rebuild for.
    ///
    /// Returns `None` if nothing is pending or the window is minimised; in
    /// the latter case the rebuild stays pending.
    pub fn take(&mut self) -> Option<(u32, u32)> {
        if !self.pending || self.is_minimized() {
            return None;
        }

        self.pending = false;
        Some(self.size())
    }
}

/// Rebuilds `chain` if `tracker` has a rebuild pending.
///
/// Returns true if a new generation was built. A failed rebuild stays pending
/// unless its error is fatal, so the next frame retries it. A surface without
/// area is not an error.
///
/// # Errors
///
/// Returns the rebuild error, except [`RhiError::SurfaceUnavailable`].
pub fn rebuild_if_pending<D: PresentationDriver>(
    chain: &mut PresentationChain<D>,
    tracker: &mut RebuildTracker,
) -> RhiResult<bool> {
    let Some((width, height)) = tracker.take() else {
        return Ok(false);
    };

    chain.set_framebuffer_size(width, height);
    match chain.rebuild() {
        Ok(resources) => {
            debug!(
                "Presentation chain generation {} ready at {}x{}",
                resources.generation().get(),
                resources.width(),
                resources.height()
            );
            Ok(true)
        }
        Err(RhiError::SurfaceUnavailable { width, height }) => {
            debug!(
                "Surface unavailable at {}x{}, retrying on the next frame",
                width, height
            );
            tracker.invalidate();
            Ok(false)
        }
        Err(e) => {
            if !e.is_fatal() {
                warn!("Presentation chain rebuild failed, retrying on the next frame: {}", e);
                tracker.invalidate();
            }
            Err(e)
        }
    }
}

/// Synchronization state of one frame slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Fence signaled, image-available semaphore unsignaled.
    Idle,
    /// An image was acquired but the frame never reached the queue: the
    /// semaphore is left signaled and the fence may be unsignaled.
    Acquired,
    /// Work was submitted and will signal the fence.
    Submitted,
}

impl SlotState {
    /// Returns true if the slot's fence and semaphore must be recreated
    /// before the slot is used again.
    #[inline]
    pub fn needs_sync_reset(self) -> bool {
        self == Self::Acquired
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use ash::prelude::VkResult;
    use ash::vk::{self, Handle};

    use accele_rhi::{ChainConfig, ChainState, SurfaceSupport};

    use super::*;

    /// Driver whose support query fails a set number of times.
    struct FlakyDriver {
        failures_left: Cell<u32>,
        failure: vk::Result,
        current_extent: vk::Extent2D,
        next_handle: Cell<u64>,
    }

    impl FlakyDriver {
        fn new(failures: u32, failure: vk::Result) -> Self {
            Self {
                failures_left: Cell::new(failures),
                failure,
                current_extent: vk::Extent2D {
                    width: u32::MAX,
                    height: u32::MAX,
                },
                next_handle: Cell::new(1),
            }
        }

        fn handle(&self) -> u64 {
            let raw = self.next_handle.get();
            self.next_handle.set(raw + 1);
            raw
        }
    }

    impl PresentationDriver for FlakyDriver {
        fn query_support(&self) -> RhiResult<SurfaceSupport> {
            if self.failures_left.get() > 0 {
                self.failures_left.set(self.failures_left.get() - 1);
                return Err(RhiError::resource("query surface capabilities")(self.failure));
            }

            Ok(SurfaceSupport {
                capabilities: vk::SurfaceCapabilitiesKHR {
                    min_image_count: 2,
                    max_image_count: 4,
                    current_extent: self.current_extent,
                    min_image_extent: vk::Extent2D {
                        width: 0,
                        height: 0,
                    },
                    max_image_extent: vk::Extent2D {
                        width: 4096,
                        height: 4096,
                    },
                    ..Default::default()
                },
                formats: vec![vk::SurfaceFormatKHR {
                    format: vk::Format::B8G8R8A8_SRGB,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                }],
                present_modes: vec![vk::PresentModeKHR::FIFO],
            })
        }

        fn create_swapchain(&self, _config: &ChainConfig) -> RhiResult<vk::SwapchainKHR> {
            Ok(vk::SwapchainKHR::from_raw(self.handle()))
        }

        fn swapchain_images(&self, _swapchain: vk::SwapchainKHR) -> RhiResult<Vec<vk::Image>> {
            Ok((0..3).map(|_| vk::Image::from_raw(self.handle())).collect())
        }

        fn create_image_view(
            &self,
            _image: vk::Image,
            _format: vk::Format,
        ) -> RhiResult<vk::ImageView> {
            Ok(vk::ImageView::from_raw(self.handle()))
        }

        fn destroy_image_view(&self, _view: vk::ImageView) {}

        fn destroy_swapchain(&self, _swapchain: vk::SwapchainKHR) {}

        fn wait_idle(&self) -> RhiResult<()> {
            Ok(())
        }

        fn acquire_next_image(
            &self,
            _swapchain: vk::SwapchainKHR,
            _semaphore: vk::Semaphore,
            _timeout: u64,
        ) -> VkResult<(u32, bool)> {
            Ok((0, false))
        }

        fn queue_present(
            &self,
            _queue: vk::Queue,
            _swapchain: vk::SwapchainKHR,
            _image_index: u32,
            _wait_semaphore: vk::Semaphore,
        ) -> VkResult<bool> {
            Ok(false)
        }
    }

    #[test]
    fn test_optimal_present_needs_no_rebuild() {
        let outcome = FrameOutcome::from_present(PresentStatus::Optimal, false);
        assert_eq!(outcome, FrameOutcome::Presented);
        assert!(!outcome.needs_rebuild());
    }

    #[test]
    fn test_suboptimal_acquire_marks_frame_stale() {
        let outcome = FrameOutcome::from_present(PresentStatus::Optimal, true);
        assert_eq!(outcome, FrameOutcome::Stale);
        assert!(outcome.needs_rebuild());
    }

    #[test]
    fn test_invalid_present_marks_frame_stale() {
        for status in [PresentStatus::Suboptimal, PresentStatus::OutOfDate] {
            assert_eq!(FrameOutcome::from_present(status, false), FrameOutcome::Stale);
        }
    }

    #[test]
    fn test_skipped_needs_rebuild() {
        assert!(FrameOutcome::Skipped.needs_rebuild());
    }

    #[test]
    fn test_tracker_starts_idle() {
        let mut tracker = RebuildTracker::new(1280, 720);
        assert!(!tracker.is_pending());
        assert_eq!(tracker.take(), None);
    }

    #[test]
    fn test_resize_schedules_rebuild_once() {
        let mut tracker = RebuildTracker::new(1280, 720);

        assert!(tracker.resize(1920, 1080));
        assert_eq!(tracker.take(), Some((1920, 1080)));
        assert_eq!(tracker.take(), None);
    }

    #[test]
    fn test_same_size_resize_is_ignored() {
        let mut tracker = RebuildTracker::new(1280, 720);

        assert!(!tracker.resize(1280, 720));
        assert!(!tracker.is_pending());
    }

    #[test]
    fn test_latest_resize_wins() {
        let mut tracker = RebuildTracker::new(1280, 720);
        tracker.resize(800, 600);
        tracker.resize(1024, 768);

        assert_eq!(tracker.take(), Some((1024, 768)));
    }

    #[test]
    fn test_minimized_defers_rebuild() {
        let mut tracker = RebuildTracker::new(1280, 720);

        tracker.resize(0, 0);
        assert!(tracker.is_minimized());
        assert_eq!(tracker.take(), None);
        assert!(tracker.is_pending());

        tracker.resize(1280, 720);
        assert_eq!(tracker.take(), Some((1280, 720)));
    }

    #[test]
    fn test_invalidate_rebuilds_at_current_size() {
        let mut tracker = RebuildTracker::new(640, 480);

        tracker.invalidate();

        assert_eq!(tracker.take(), Some((640, 480)));
    }

    #[test]
    fn test_rebuild_does_nothing_when_idle() {
        let mut chain = PresentationChain::new(FlakyDriver::new(0, vk::Result::SUCCESS), 800, 600);
        let mut tracker = RebuildTracker::new(800, 600);

        assert!(!rebuild_if_pending(&mut chain, &mut tracker).unwrap());
        assert_eq!(chain.state(), ChainState::Uninitialized);
    }

    #[test]
    fn test_rebuild_uses_tracked_size() {
        let mut chain = PresentationChain::new(FlakyDriver::new(0, vk::Result::SUCCESS), 800, 600);
        let mut tracker = RebuildTracker::new(800, 600);
        tracker.resize(1024, 768);

        assert!(rebuild_if_pending(&mut chain, &mut tracker).unwrap());
        assert_eq!(
            chain.live().unwrap().extent(),
            vk::Extent2D {
                width: 1024,
                height: 768
            }
        );
        assert!(!tracker.is_pending());
    }

    #[test]
    fn test_failed_rebuild_is_retried() {
        let driver = FlakyDriver::new(1, vk::Result::ERROR_OUT_OF_HOST_MEMORY);
        let mut chain = PresentationChain::new(driver, 800, 600);
        let mut tracker = RebuildTracker::new(800, 600);
        tracker.invalidate();

        let err = rebuild_if_pending(&mut chain, &mut tracker).unwrap_err();
        assert!(!err.is_fatal());
        assert_eq!(chain.state(), ChainState::TornDown);
        assert!(tracker.is_pending());

        assert!(rebuild_if_pending(&mut chain, &mut tracker).unwrap());
        assert_eq!(chain.state(), ChainState::Live);
        assert!(!tracker.is_pending());
    }

    #[test]
    fn test_fatal_rebuild_error_is_not_retried() {
        let driver = FlakyDriver::new(1, vk::Result::ERROR_DEVICE_LOST);
        let mut chain = PresentationChain::new(driver, 800, 600);
        let mut tracker = RebuildTracker::new(800, 600);
        tracker.invalidate();

        let err = rebuild_if_pending(&mut chain, &mut tracker).unwrap_err();
        assert!(err.is_fatal());
        assert!(!tracker.is_pending());
    }

    #[test]
    fn test_surface_without_area_stays_pending() {
        let mut driver = FlakyDriver::new(0, vk::Result::SUCCESS);
        driver.current_extent = vk::Extent2D {
            width: 0,
            height: 0,
        };
        let mut chain = PresentationChain::new(driver, 800, 600);
        let mut tracker = RebuildTracker::new(800, 600);
        tracker.invalidate();

        assert!(!rebuild_if_pending(&mut chain, &mut tracker).unwrap());
        assert!(tracker.is_pending());
        assert!(!chain.is_live());
    }

    #[test]
    fn test_only_acquired_slot_needs_sync_reset() {
        assert!(!SlotState::Idle.needs_sync_reset());
        assert!(SlotState::Acquired.needs_sync_reset());
        assert!(!SlotState::Submitted.needs_sync_reset());
    }
}
