//! The driver calls the presentation chain depends on.
//!
//! [`PresentationDriver`] is the seam between [`PresentationChain`] and the
//! graphics driver. [`VulkanDriver`] implements it with the `VK_KHR_surface`
//! and `VK_KHR_swapchain` loaders for one device/surface pair.
//!
//! [`PresentationChain`]: crate::chain::PresentationChain

use std::sync::Arc;

use ash::prelude::VkResult;
use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;
use crate::negotiate::{ChainConfig, SurfaceSupport};

/// Driver operations needed to build, tear down and present a chain.
///
/// Raw handles are returned so the chain alone decides when they are
/// destroyed. Implementations must not destroy anything on their own.
pub trait PresentationDriver {
    /// Queries the surface's current capabilities, formats and present modes.
    fn query_support(&self) -> RhiResult<SurfaceSupport>;

    /// Creates a swapchain from a negotiated configuration.
    fn create_swapchain(&self, config: &ChainConfig) -> RhiResult<vk::SwapchainKHR>;

    /// Returns the images owned by `swapchain`, in driver order.
    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> RhiResult<Vec<vk::Image>>;

    /// Creates a 2D color view over one swapchain image.
    fn create_image_view(&self, image: vk::Image, format: vk::Format) -> RhiResult<vk::ImageView>;

    /// Destroys an image view.
    fn destroy_image_view(&self, view: vk::ImageView);

    /// Destroys a swapchain and, with it, its images.
    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR);

    /// Blocks until the GPU no longer uses any chain resource.
    fn wait_idle(&self) -> RhiResult<()>;

    /// Acquires the next image, returning `(index, suboptimal)`.
    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        semaphore: vk::Semaphore,
        timeout: u64,
    ) -> VkResult<(u32, bool)>;

    /// Queues an image for presentation, returning whether it was suboptimal.
    fn queue_present(
        &self,
        queue: vk::Queue,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> VkResult<bool>;
}

/// [`PresentationDriver`] backed by a Vulkan device and surface.
///
/// The surface is borrowed by handle; whoever owns it must keep it alive
/// until every chain built from this driver has been dropped.
pub struct VulkanDriver {
    /// Reference to the logical device
    device: Arc<Device>,
    /// Surface extension loader
    surface_loader: ash::khr::surface::Instance,
    /// Swapchain extension loader
    swapchain_loader: ash::khr::swapchain::Device,
    /// Target surface
    surface: vk::SurfaceKHR,
}

impl VulkanDriver {
    /// Creates a driver for `surface` on `device`.
    pub fn new(instance: &Instance, device: Arc<Device>, surface: vk::SurfaceKHR) -> Self {
        let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
        let swapchain_loader = ash::khr::swapchain::Device::new(instance.handle(), device.handle());

        Self {
            device,
            surface_loader,
            swapchain_loader,
            surface,
        }
    }

    /// Returns the logical device.
    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }
}

impl PresentationDriver for VulkanDriver {
    fn query_support(&self) -> RhiResult<SurfaceSupport> {
        let physical_device = self.device.physical_device();

        let capabilities = unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(physical_device, self.surface)
                .map_err(RhiError::resource("query surface capabilities"))?
        };

        let formats = unsafe {
            self.surface_loader
                .get_physical_device_surface_formats(physical_device, self.surface)
                .map_err(RhiError::resource("query surface formats"))?
        };

        let present_modes = unsafe {
            self.surface_loader
                .get_physical_device_surface_present_modes(physical_device, self.surface)
                .map_err(RhiError::resource("query surface present modes"))?
        };

        debug!(
            "Surface support: {} formats, {} present modes, image count: {}-{}",
            formats.len(),
            present_modes.len(),
            capabilities.min_image_count,
            if capabilities.max_image_count == 0 {
                "unlimited".to_string()
            } else {
                capabilities.max_image_count.to_string()
            }
        );

        Ok(SurfaceSupport {
            capabilities,
            formats,
            present_modes,
        })
    }

    fn create_swapchain(&self, config: &ChainConfig) -> RhiResult<vk::SwapchainKHR> {
        // Graphics and present share one queue family, so images stay EXCLUSIVE
        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.surface)
            .min_image_count(config.image_count)
            .image_format(config.format())
            .image_color_space(config.color_space())
            .image_extent(config.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(config.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(config.present_mode)
            .clipped(true);

        unsafe {
            self.swapchain_loader
                .create_swapchain(&create_info, None)
                .map_err(RhiError::resource("create swapchain"))
        }
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> RhiResult<Vec<vk::Image>> {
        unsafe {
            self.swapchain_loader
                .get_swapchain_images(swapchain)
                .map_err(RhiError::resource("get swapchain images"))
        }
    }

    fn create_image_view(&self, image: vk::Image, format: vk::Format) -> RhiResult<vk::ImageView> {
        let create_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .components(vk::ComponentMapping {
                r: vk::ComponentSwizzle::IDENTITY,
                g: vk::ComponentSwizzle::IDENTITY,
                b: vk::ComponentSwizzle::IDENTITY,
                a: vk::ComponentSwizzle::IDENTITY,
            })
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .base_mip_level(0)
                    .level_count(1)
                    .base_array_layer(0)
                    .layer_count(1),
            );

        unsafe {
            self.device
                .handle()
                .create_image_view(&create_info, None)
                .map_err(RhiError::resource("create image view"))
        }
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        unsafe {
            self.device.handle().destroy_image_view(view, None);
        }
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        unsafe {
            self.swapchain_loader.destroy_swapchain(swapchain, None);
        }
    }

    fn wait_idle(&self) -> RhiResult<()> {
        self.device.wait_idle()
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        semaphore: vk::Semaphore,
        timeout: u64,
    ) -> VkResult<(u32, bool)> {
        unsafe {
            self.swapchain_loader
                .acquire_next_image(swapchain, timeout, semaphore, vk::Fence::null())
        }
    }

    fn queue_present(
        &self,
        queue: vk::Queue,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> VkResult<bool> {
        let swapchains = [swapchain];
        let image_indices = [image_index];
        let wait_semaphores = [wait_semaphore];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        unsafe { self.swapchain_loader.queue_present(queue, &present_info) }
    }
}
