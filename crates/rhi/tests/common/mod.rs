//! Recording presentation driver for lifecycle tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use accele_rhi::negotiate::{ChainConfig, SurfaceSupport};
use accele_rhi::vk::{self, Handle};
use accele_rhi::{PresentationDriver, RhiError, RhiResult};
use ash::prelude::VkResult;

/// A driver call, in the order the chain made it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    QuerySupport,
    CreateSwapchain(u64),
    CreateView(u64),
    DestroyView(u64),
    DestroySwapchain(u64),
    WaitIdle,
}

#[derive(Default)]
struct State {
    support: SurfaceSupport,
    next_handle: u64,
    calls: Vec<Call>,
    last_config: Option<ChainConfig>,

    live_swapchains: HashSet<u64>,
    /// Live view -> owning swapchain
    live_views: HashMap<u64, u64>,
    /// Image -> owning swapchain
    images: HashMap<u64, u64>,
    /// Images handed out per swapchain
    image_lists: HashMap<u64, Vec<vk::Image>>,

    fail_query: Option<vk::Result>,
    fail_create_swapchain: Option<vk::Result>,
    fail_images: Option<vk::Result>,
    /// Fail the n-th (0-based) view creation after each swapchain creation
    fail_view_at: Option<usize>,
    views_since_swapchain: usize,
    /// Number of images to return instead of the requested image count
    image_count_override: Option<usize>,

    acquire_result: Option<VkResult<(u32, bool)>>,
    present_result: Option<VkResult<bool>>,
}

/// Mock [`PresentationDriver`] that hands out unique handles and records calls.
///
/// Clones share state, so a test can keep one clone while the chain owns another.
#[derive(Clone)]
pub struct MockDriver {
    state: Rc<RefCell<State>>,
}

impl MockDriver {
    pub fn new(support: SurfaceSupport) -> Self {
        Self {
            state: Rc::new(RefCell::new(State {
                support,
                next_handle: 1,
                ..Default::default()
            })),
        }
    }

    pub fn set_support(&self, support: SurfaceSupport) {
        self.state.borrow_mut().support = support;
    }

    pub fn fail_query(&self, result: vk::Result) {
        self.state.borrow_mut().fail_query = Some(result);
    }

    pub fn fail_create_swapchain(&self, result: vk::Result) {
        self.state.borrow_mut().fail_create_swapchain = Some(result);
    }

    pub fn fail_images(&self, result: vk::Result) {
        self.state.borrow_mut().fail_images = Some(result);
    }

    pub fn fail_view_at(&self, index: usize) {
        self.state.borrow_mut().fail_view_at = Some(index);
    }

    pub fn override_image_count(&self, count: usize) {
        self.state.borrow_mut().image_count_override = Some(count);
    }

    /// Clears every injected failure.
    pub fn heal(&self) {
        let mut state = self.state.borrow_mut();
        state.fail_query = None;
        state.fail_create_swapchain = None;
        state.fail_images = None;
        state.fail_view_at = None;
    }

    pub fn set_acquire_result(&self, result: VkResult<(u32, bool)>) {
        self.state.borrow_mut().acquire_result = Some(result);
    }

    pub fn set_present_result(&self, result: VkResult<bool>) {
        self.state.borrow_mut().present_result = Some(result);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.borrow().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.borrow_mut().calls.clear();
    }

    pub fn last_config(&self) -> Option<ChainConfig> {
        self.state.borrow().last_config
    }

    pub fn live_swapchain_count(&self) -> usize {
        self.state.borrow().live_swapchains.len()
    }

    pub fn live_view_count(&self) -> usize {
        self.state.borrow().live_views.len()
    }

    /// Returns true if nothing the driver created is still alive.
    pub fn is_clean(&self) -> bool {
        self.live_swapchain_count() == 0 && self.live_view_count() == 0
    }

    fn next_handle(state: &mut State) -> u64 {
        let handle = state.next_handle;
        state.next_handle += 1;
        handle
    }
}

impl PresentationDriver for MockDriver {
    fn query_support(&self) -> RhiResult<SurfaceSupport> {
        let mut state = self.state.borrow_mut();
        state.calls.push(Call::QuerySupport);
        if let Some(result) = state.fail_query {
            return Err(RhiError::resource("query surface capabilities")(result));
        }
        Ok(state.support.clone())
    }

    fn create_swapchain(&self, config: &ChainConfig) -> RhiResult<vk::SwapchainKHR> {
        let mut state = self.state.borrow_mut();
        if let Some(result) = state.fail_create_swapchain {
            return Err(RhiError::resource("create swapchain")(result));
        }

        let raw = Self::next_handle(&mut state);
        let count = state
            .image_count_override
            .unwrap_or(config.image_count as usize);
        let images: Vec<vk::Image> = (0..count)
            .map(|_| vk::Image::from_raw(Self::next_handle(&mut state)))
            .collect();
        for image in &images {
            state.images.insert(image.as_raw(), raw);
        }

        state.image_lists.insert(raw, images);
        state.live_swapchains.insert(raw);
        state.last_config = Some(*config);
        state.views_since_swapchain = 0;
        state.calls.push(Call::CreateSwapchain(raw));
        Ok(vk::SwapchainKHR::from_raw(raw))
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> RhiResult<Vec<vk::Image>> {
        let state = self.state.borrow();
        if let Some(result) = state.fail_images {
            return Err(RhiError::resource("get swapchain images")(result));
        }
        assert!(
            state.live_swapchains.contains(&swapchain.as_raw()),
            "images requested from a dead swapchain"
        );
        Ok(state.image_lists[&swapchain.as_raw()].clone())
    }

    fn create_image_view(&self, image: vk::Image, _format: vk::Format) -> RhiResult<vk::ImageView> {
        let mut state = self.state.borrow_mut();
        let index = state.views_since_swapchain;
        state.views_since_swapchain += 1;
        if state.fail_view_at == Some(index) {
            return Err(RhiError::resource("create image view")(
                vk::Result::ERROR_OUT_OF_DEVICE_MEMORY,
            ));
        }

        let owner = *state
            .images
            .get(&image.as_raw())
            .expect("view created for an unknown image");
        assert!(
            state.live_swapchains.contains(&owner),
            "view created for an image of a dead swapchain"
        );

        let raw = Self::next_handle(&mut state);
        state.live_views.insert(raw, owner);
        state.calls.push(Call::CreateView(raw));
        Ok(vk::ImageView::from_raw(raw))
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        let mut state = self.state.borrow_mut();
        assert!(
            state.live_views.remove(&view.as_raw()).is_some(),
            "image view {} destroyed twice or never created",
            view.as_raw()
        );
        state.calls.push(Call::DestroyView(view.as_raw()));
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        let mut state = self.state.borrow_mut();
        let raw = swapchain.as_raw();
        assert!(
            state.live_swapchains.remove(&raw),
            "swapchain {} destroyed twice or never created",
            raw
        );
        assert!(
            !state.live_views.values().any(|&owner| owner == raw),
            "swapchain {} destroyed while its views are alive",
            raw
        );
        state.calls.push(Call::DestroySwapchain(raw));
    }

    fn wait_idle(&self) -> RhiResult<()> {
        self.state.borrow_mut().calls.push(Call::WaitIdle);
        Ok(())
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        _semaphore: vk::Semaphore,
        _timeout: u64,
    ) -> VkResult<(u32, bool)> {
        let state = self.state.borrow();
        assert!(state.live_swapchains.contains(&swapchain.as_raw()));
        state.acquire_result.unwrap_or(Ok((0, false)))
    }

    fn queue_present(
        &self,
        _queue: vk::Queue,
        swapchain: vk::SwapchainKHR,
        _image_index: u32,
        _wait_semaphore: vk::Semaphore,
    ) -> VkResult<bool> {
        let state = self.state.borrow();
        assert!(state.live_swapchains.contains(&swapchain.as_raw()));
        state.present_result.unwrap_or(Ok(false))
    }
}

/// A well-behaved surface: undefined current extent, 2..=8 images,
/// the preferred format and both FIFO and MAILBOX.
pub fn standard_support() -> SurfaceSupport {
    SurfaceSupport {
        capabilities: vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 8,
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            max_image_array_layers: 1,
            current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            ..Default::default()
        },
        formats: vec![
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ],
        present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
    }
}
