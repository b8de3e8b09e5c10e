//! Presentation chain lifecycle.
//!
//! [`PresentationChain`] owns the swapchain, its images and one image view per
//! image. It moves through `Uninitialized → Live → TornDown`, and
//! [`rebuild`](PresentationChain::rebuild) replaces a live chain with a fresh
//! generation after a resize or an out-of-date/suboptimal result.
//!
//! # Example
//!
//! ```no_run
//! use ash::vk;
//! use accele_rhi::chain::{Acquire, PresentationChain};
//! use accele_rhi::driver::PresentationDriver;
//! use accele_rhi::RhiResult;
//!
//! # fn example<D: PresentationDriver>(driver: D, queue: vk::Queue, semaphore: vk::Semaphore) -> RhiResult<()> {
//! let mut chain = PresentationChain::new(driver, 1280, 720);
//! chain.build()?;
//!
//! // In the frame loop:
//! match chain.acquire_next_image(semaphore)? {
//!     Acquire::Image { index, .. } => {
//!         // ... render to chain.live()?.image_view(index as usize) ...
//!         if chain.present(queue, index, semaphore)?.needs_rebuild() {
//!             chain.rebuild()?;
//!         }
//!     }
//!     Acquire::OutOfDate => {
//!         chain.rebuild()?;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use std::mem;

use ash::vk;
use tracing::{debug, error, info, warn};

use crate::driver::PresentationDriver;
use crate::error::{RhiError, RhiResult};
use crate::negotiate::{ChainConfig, negotiate};

/// Lifecycle state of a [`PresentationChain`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainState {
    /// Never built.
    Uninitialized,
    /// Swapchain, images and views exist.
    Live,
    /// Torn down, or the last build failed.
    TornDown,
}

/// Identifies one build of a chain. Strictly increases with every build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u64);

impl Generation {
    /// Returns the raw counter value.
    #[inline]
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Result of acquiring an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquire {
    /// An image is ready for rendering.
    Image {
        /// Index into the chain's images and views.
        index: u32,
        /// The surface no longer matches exactly; rebuild after presenting.
        suboptimal: bool,
    },
    /// The chain no longer matches the surface and must be rebuilt first.
    OutOfDate,
}

/// Result of presenting an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentStatus {
    /// Presented and the chain still matches the surface.
    Optimal,
    /// Presented, but the chain should be rebuilt.
    Suboptimal,
    /// The chain no longer matches the surface.
    OutOfDate,
}

impl PresentStatus {
    /// Returns true if the caller must [`rebuild`](PresentationChain::rebuild).
    #[inline]
    pub fn needs_rebuild(self) -> bool {
        !matches!(self, Self::Optimal)
    }
}

/// The resources of one live chain generation.
///
/// This is what the renderer reads: extent and format to size attachments,
/// and one view per image to render into. Everything here stays valid until
/// the next teardown or rebuild.
#[derive(Debug)]
pub struct ChainResources {
    config: ChainConfig,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    generation: Generation,
}

impl ChainResources {
    /// Returns the negotiated configuration.
    #[inline]
    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// Returns the swapchain handle.
    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    /// Returns the generation these resources belong to.
    #[inline]
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Returns the image format.
    #[inline]
    pub fn format(&self) -> vk::Format {
        self.config.format()
    }

    /// Returns the color space.
    #[inline]
    pub fn color_space(&self) -> vk::ColorSpaceKHR {
        self.config.color_space()
    }

    /// Returns the present mode.
    #[inline]
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.config.present_mode
    }

    /// Returns the image extent.
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.config.extent
    }

    /// Returns the image width.
    #[inline]
    pub fn width(&self) -> u32 {
        self.config.extent.width
    }

    /// Returns the image height.
    #[inline]
    pub fn height(&self) -> u32 {
        self.config.extent.height
    }

    /// Returns the number of images the driver actually created.
    #[inline]
    pub fn image_count(&self) -> u32 {
        self.images.len() as u32
    }

    /// Returns the image at the given index.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    #[inline]
    pub fn image(&self, index: usize) -> vk::Image {
        self.images[index]
    }

    /// Returns the image view at the given index.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    #[inline]
    pub fn image_view(&self, index: usize) -> vk::ImageView {
        self.image_views[index]
    }

    /// Returns all images, in driver order.
    #[inline]
    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    /// Returns all image views, parallel to [`images`](Self::images).
    #[inline]
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }
}

enum Slot {
    Uninitialized,
    Live(ChainResources),
    TornDown,
}

/// Owner of the swapchain and everything derived from it.
///
/// # Thread Safety
///
/// Lifecycle methods take `&mut self`, so callers sharing a chain between a
/// render loop and an event handler need a lock around it. The chain never
/// spawns work of its own.
pub struct PresentationChain<D: PresentationDriver> {
    driver: D,
    slot: Slot,
    /// Window framebuffer size, used when the surface leaves the extent open
    framebuffer_size: vk::Extent2D,
    /// Last generation handed out
    generation: u64,
}

impl<D: PresentationDriver> PresentationChain<D> {
    /// Creates an unbuilt chain. Call [`build`](Self::build) to make it live.
    ///
    /// `width` and `height` are the window's framebuffer size.
    pub fn new(driver: D, width: u32, height: u32) -> Self {
        Self {
            driver,
            slot: Slot::Uninitialized,
            framebuffer_size: vk::Extent2D { width, height },
            generation: 0,
        }
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> ChainState {
        match self.slot {
            Slot::Uninitialized => ChainState::Uninitialized,
            Slot::Live(_) => ChainState::Live,
            Slot::TornDown => ChainState::TornDown,
        }
    }

    /// Returns true if the chain is live.
    #[inline]
    pub fn is_live(&self) -> bool {
        matches!(self.slot, Slot::Live(_))
    }

    /// Returns the live resources, if any.
    #[inline]
    pub fn resources(&self) -> Option<&ChainResources> {
        match &self.slot {
            Slot::Live(resources) => Some(resources),
            _ => None,
        }
    }

    /// Returns the live resources.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidState`] if the chain is not live.
    pub fn live(&self) -> RhiResult<&ChainResources> {
        self.resources().ok_or_else(|| {
            RhiError::InvalidState(format!("presentation chain is {:?}", self.state()))
        })
    }

    /// Returns the generation of the most recent successful build, if any.
    pub fn generation(&self) -> Option<Generation> {
        (self.generation > 0).then_some(Generation(self.generation))
    }

    /// Returns the framebuffer size used as the extent fallback.
    #[inline]
    pub fn framebuffer_size(&self) -> vk::Extent2D {
        self.framebuffer_size
    }

    /// Records a new window framebuffer size for the next build.
    ///
    /// This does not rebuild; the owner decides when to call
    /// [`rebuild`](Self::rebuild).
    pub fn set_framebuffer_size(&mut self, width: u32, height: u32) {
        debug!("Framebuffer size set to {}x{}", width, height);
        self.framebuffer_size = vk::Extent2D { width, height };
    }

    /// Returns the driver.
    #[inline]
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Builds a new generation.
    ///
    /// Queries the surface, negotiates a [`ChainConfig`], creates the
    /// swapchain and one view per image. Any failure destroys whatever was
    /// already created and leaves the chain [`ChainState::TornDown`].
    ///
    /// # Errors
    ///
    /// - [`RhiError::InvalidState`] if the chain is already live
    /// - [`RhiError::DriverCapability`] if the surface support is unusable
    /// - [`RhiError::SurfaceUnavailable`] if the extent has zero area
    /// - [`RhiError::DriverResource`] if a driver query or allocation fails
    pub fn build(&mut self) -> RhiResult<&ChainResources> {
        if self.is_live() {
            return Err(RhiError::InvalidState(
                "presentation chain is already live; use rebuild()".to_string(),
            ));
        }

        match self.allocate() {
            Ok(resources) => {
                self.slot = Slot::Live(resources);
                self.live()
            }
            Err(e) => {
                self.slot = Slot::TornDown;
                Err(e)
            }
        }
    }

    fn allocate(&mut self) -> RhiResult<ChainResources> {
        let support = self.driver.query_support()?;
        let config = negotiate(&support, self.framebuffer_size)?;

        if config.extent.width == 0 || config.extent.height == 0 {
            return Err(RhiError::SurfaceUnavailable {
                width: config.extent.width,
                height: config.extent.height,
            });
        }

        info!(
            "Creating presentation chain: {}x{}, format {:?}, color space {:?}, present mode {:?}, {} images",
            config.extent.width,
            config.extent.height,
            config.format(),
            config.color_space(),
            config.present_mode,
            config.image_count
        );

        let mut partial = PartialChain::new(&self.driver);
        partial.swapchain = self.driver.create_swapchain(&config)?;

        let images = self.driver.swapchain_images(partial.swapchain)?;
        if images.is_empty() {
            return Err(RhiError::DriverCapability(
                "swapchain was created without images".to_string(),
            ));
        }

        partial.image_views.reserve(images.len());
        for (i, &image) in images.iter().enumerate() {
            let view = self
                .driver
                .create_image_view(image, config.format())
                .inspect_err(|e| warn!("Image view {} of {} failed: {}", i, images.len(), e))?;
            partial.image_views.push(view);
        }

        let (swapchain, image_views) = partial.commit();
        self.generation += 1;

        info!(
            "Presentation chain generation {} live with {} images",
            self.generation,
            images.len()
        );

        Ok(ChainResources {
            config,
            swapchain,
            images,
            image_views,
            generation: Generation(self.generation),
        })
    }

    /// Destroys the views, then the swapchain.
    ///
    /// Waits for the device to go idle first. Calling this on a chain that is
    /// not live does nothing.
    pub fn teardown(&mut self) {
        let resources = match mem::replace(&mut self.slot, Slot::TornDown) {
            Slot::Live(resources) => resources,
            Slot::Uninitialized | Slot::TornDown => {
                debug!("Teardown skipped: presentation chain is not live");
                return;
            }
        };

        if let Err(e) = self.driver.wait_idle() {
            error!("Failed to wait for device idle before teardown: {}", e);
        }

        let ChainResources {
            config,
            mut swapchain,
            images,
            mut image_views,
            generation,
        } = resources;

        release(&self.driver, &mut image_views, &mut swapchain);

        info!(
            "Presentation chain generation {} destroyed (was {}x{}, {} images)",
            generation.get(),
            config.extent.width,
            config.extent.height,
            images.len()
        );
    }

    /// Tears the chain down and builds a new generation.
    ///
    /// This is the recovery path for resizes and for out-of-date or
    /// suboptimal acquire/present results. No frame may be submitted against
    /// the chain until it returns.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`build`](Self::build), except
    /// [`RhiError::InvalidState`].
    pub fn rebuild(&mut self) -> RhiResult<&ChainResources> {
        info!(
            "Rebuilding presentation chain for {}x{}",
            self.framebuffer_size.width, self.framebuffer_size.height
        );
        self.teardown();
        self.build()
    }

    /// Acquires the next image for rendering.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidState`] if the chain is not live, or
    /// [`RhiError::DriverResource`] for driver failures other than an
    /// out-of-date chain.
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> RhiResult<Acquire> {
        let resources = self.live()?;

        match self
            .driver
            .acquire_next_image(resources.swapchain, semaphore, u64::MAX)
        {
            Ok((index, suboptimal)) => Ok(Acquire::Image { index, suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                debug!("Presentation chain out of date during acquire");
                Ok(Acquire::OutOfDate)
            }
            Err(e) => Err(RhiError::resource("acquire next image")(e)),
        }
    }

    /// Presents an acquired image once `wait_semaphore` is signaled.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidState`] if the chain is not live, or
    /// [`RhiError::DriverResource`] for driver failures other than an
    /// out-of-date or suboptimal chain.
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> RhiResult<PresentStatus> {
        let resources = self.live()?;

        match self.driver.queue_present(
            queue,
            resources.swapchain,
            image_index,
            wait_semaphore,
        ) {
            Ok(false) => Ok(PresentStatus::Optimal),
            Ok(true) | Err(vk::Result::SUBOPTIMAL_KHR) => {
                debug!("Presentation chain suboptimal during present");
                Ok(PresentStatus::Suboptimal)
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                debug!("Presentation chain out of date during present");
                Ok(PresentStatus::OutOfDate)
            }
            Err(e) => Err(RhiError::resource("present")(e)),
        }
    }
}

impl<D: PresentationDriver> Drop for PresentationChain<D> {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Resources of a build in progress, released on drop unless committed.
struct PartialChain<'a, D: PresentationDriver> {
    driver: &'a D,
    swapchain: vk::SwapchainKHR,
    image_views: Vec<vk::ImageView>,
}

impl<'a, D: PresentationDriver> PartialChain<'a, D> {
    fn new(driver: &'a D) -> Self {
        Self {
            driver,
            swapchain: vk::SwapchainKHR::null(),
            image_views: Vec::new(),
        }
    }

    fn commit(mut self) -> (vk::SwapchainKHR, Vec<vk::ImageView>) {
        let swapchain = mem::replace(&mut self.swapchain, vk::SwapchainKHR::null());
        let image_views = mem::take(&mut self.image_views);
        (swapchain, image_views)
    }
}

impl<D: PresentationDriver> Drop for PartialChain<'_, D> {
    fn drop(&mut self) {
        if self.swapchain != vk::SwapchainKHR::null() || !self.image_views.is_empty() {
            warn!(
                "Rolling back partial presentation chain ({} views)",
                self.image_views.len()
            );
        }
        release(self.driver, &mut self.image_views, &mut self.swapchain);
    }
}

/// Destroys `views` before `swapchain`; views must never outlive it.
fn release<D: PresentationDriver>(
    driver: &D,
    views: &mut Vec<vk::ImageView>,
    swapchain: &mut vk::SwapchainKHR,
) {
    for view in views.drain(..) {
        driver.destroy_image_view(view);
    }

    if *swapchain != vk::SwapchainKHR::null() {
        driver.destroy_swapchain(mem::replace(swapchain, vk::SwapchainKHR::null()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_present_status_needs_rebuild() {
        assert!(!PresentStatus::Optimal.needs_rebuild());
        assert!(PresentStatus::Suboptimal.needs_rebuild());
        assert!(PresentStatus::OutOfDate.needs_rebuild());
    }

    #[test]
    fn test_generation_ordering() {
        assert!(Generation(1) < Generation(2));
        assert_eq!(Generation(7).get(), 7);
    }
}
