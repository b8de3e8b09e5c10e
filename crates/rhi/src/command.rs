//! Command pool and command buffer management.
//!
//! - [`CommandPool`] owns a VkCommandPool for one queue family
//! - [`CommandBuffer`] wraps a VkCommandBuffer with the recording calls the
//!   frame loop needs: begin/end, dynamic rendering and layout transitions
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use accele_rhi::device::Device;
//! use accele_rhi::command::{CommandPool, CommandBuffer};
//!
//! # fn example(device: Arc<Device>) -> Result<(), accele_rhi::RhiError> {
//! let pool = CommandPool::new(device.clone(), device.queue_family())?;
//! let cmd = CommandBuffer::new(device.clone(), &pool)?;
//!
//! cmd.begin()?;
//! // ... record rendering commands ...
//! cmd.end()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, warn};

use crate::device::Device;
use crate::error::RhiResult;

/// Vulkan command pool wrapper.
///
/// Buffers allocated from the pool can be reset individually.
pub struct CommandPool {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan command pool handle.
    pool: vk::CommandPool,
    /// Queue family index this pool belongs to.
    queue_family_index: u32,
}

impl CommandPool {
    /// Creates a command pool for the given queue family.
    ///
    /// # Errors
    ///
    /// Returns an error if command pool creation fails.
    pub fn new(device: Arc<Device>, queue_family_index: u32) -> RhiResult<Self> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family_index)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

        let pool = unsafe { device.handle().create_command_pool(&create_info, None)? };

        debug!(
            "Command pool created for queue family {}",
            queue_family_index
        );

        Ok(Self {
            device,
            pool,
            queue_family_index,
        })
    }

    /// Returns the raw Vulkan command pool handle.
    #[inline]
    pub fn handle(&self) -> vk::CommandPool {
        self.pool
    }

    /// Allocates a single primary command buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if allocation fails.
    pub fn allocate_command_buffer(&self) -> RhiResult<vk::CommandBuffer> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let buffers = unsafe { self.device.handle().allocate_command_buffers(&alloc_info)? };
        Ok(buffers[0])
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_command_pool(self.pool, None);
        }
        debug!(
            "Command pool destroyed for queue family {}",
            self.queue_family_index
        );
    }
}

/// Vulkan command buffer wrapper.
///
/// The buffer does not own its handle; it is freed with the [`CommandPool`]
/// it was allocated from.
pub struct CommandBuffer {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan command buffer handle.
    buffer: vk::CommandBuffer,
}

impl CommandBuffer {
    /// Allocates a new command buffer from `pool`.
    ///
    /// # Errors
    ///
    /// Returns an error if allocation fails.
    pub fn new(device: Arc<Device>, pool: &CommandPool) -> RhiResult<Self> {
        let buffer = pool.allocate_command_buffer()?;
        Ok(Self { device, buffer })
    }

    /// Returns the raw Vulkan command buffer handle.
    #[inline]
    pub fn handle(&self) -> vk::CommandBuffer {
        self.buffer
    }

    /// Begins recording for a single submission.
    ///
    /// # Errors
    ///
    /// Returns an error if beginning fails (e.g., if already recording).
    pub fn begin(&self) -> RhiResult<()> {
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        unsafe {
            self.device
                .handle()
                .begin_command_buffer(self.buffer, &begin_info)?;
        }

        Ok(())
    }

    /// Ends recording. The buffer is then ready for submission.
    ///
    /// # Errors
    ///
    /// Returns an error if ending fails (e.g., if not recording).
    pub fn end(&self) -> RhiResult<()> {
        unsafe {
            self.device.handle().end_command_buffer(self.buffer)?;
        }

        Ok(())
    }

    /// Resets the buffer so it can be recorded again.
    ///
    /// # Errors
    ///
    /// Returns an error if the reset fails.
    pub fn reset(&self) -> RhiResult<()> {
        unsafe {
            self.device
                .handle()
                .reset_command_buffer(self.buffer, vk::CommandBufferResetFlags::empty())?;
        }

        Ok(())
    }

    /// Begins dynamic rendering.
    pub fn begin_rendering(&self, rendering_info: &vk::RenderingInfo) {
        unsafe {
            self.device
                .handle()
                .cmd_begin_rendering(self.buffer, rendering_info);
        }
    }

    /// Ends dynamic rendering.
    pub fn end_rendering(&self) {
        unsafe {
            self.device.handle().cmd_end_rendering(self.buffer);
        }
    }

    /// Records a layout transition for the single color mip/layer of `image`.
    pub fn transition_image_layout(
        &self,
        image: vk::Image,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
    ) {
        let masks = LayoutTransition::between(old_layout, new_layout);

        let barrier = vk::ImageMemoryBarrier::default()
            .old_layout(old_layout)
            .new_layout(new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .base_mip_level(0)
                    .level_count(1)
                    .base_array_layer(0)
                    .layer_count(1),
            )
            .src_access_mask(masks.src_access)
            .dst_access_mask(masks.dst_access);

        unsafe {
            self.device.handle().cmd_pipeline_barrier(
                self.buffer,
                masks.src_stage,
                masks.dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            );
        }
    }
}

/// Stage and access masks for one image layout transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutTransition {
    pub src_stage: vk::PipelineStageFlags,
    pub src_access: vk::AccessFlags,
    pub dst_stage: vk::PipelineStageFlags,
    pub dst_access: vk::AccessFlags,
}

impl LayoutTransition {
    /// Returns the masks for a transition between two layouts.
    ///
    /// Transitions the frame loop does not use fall back to a full
    /// memory barrier on all commands.
    pub fn between(old_layout: vk::ImageLayout, new_layout: vk::ImageLayout) -> Self {
        match (old_layout, new_layout) {
            (vk::ImageLayout::UNDEFINED, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL) => Self {
                src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
                src_access: vk::AccessFlags::empty(),
                dst_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                dst_access: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            },
            (vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL, vk::ImageLayout::PRESENT_SRC_KHR) => Self {
                src_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                src_access: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
                dst_stage: vk::PipelineStageFlags::BOTTOM_OF_PIPE,
                dst_access: vk::AccessFlags::empty(),
            },
            _ => {
                warn!(
                    "Unhandled layout transition: {:?} -> {:?}",
                    old_layout, new_layout
                );
                Self {
                    src_stage: vk::PipelineStageFlags::ALL_COMMANDS,
                    src_access: vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE,
                    dst_stage: vk::PipelineStageFlags::ALL_COMMANDS,
                    dst_access: vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_to_color_attachment() {
        let t = LayoutTransition::between(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        );
        assert_eq!(t.src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);
        assert_eq!(t.dst_stage, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT);
        assert_eq!(t.dst_access, vk::AccessFlags::COLOR_ATTACHMENT_WRITE);
    }

    #[test]
    fn test_transition_to_present() {
        let t = LayoutTransition::between(
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
        );
        assert_eq!(t.src_access, vk::AccessFlags::COLOR_ATTACHMENT_WRITE);
        assert_eq!(t.dst_stage, vk::PipelineStageFlags::BOTTOM_OF_PIPE);
        assert!(t.dst_access.is_empty());
    }

    #[test]
    fn test_unknown_transition_is_full_barrier() {
        let t = LayoutTransition::between(
            vk::ImageLayout::GENERAL,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        );
        assert_eq!(t.src_stage, vk::PipelineStageFlags::ALL_COMMANDS);
        assert_eq!(t.dst_stage, vk::PipelineStageFlags::ALL_COMMANDS);
    }

    #[test]
    fn test_command_types_are_send() {
        fn assert_send<T: Send>() {}
        assert_send::<CommandPool>();
        assert_send::<CommandBuffer>();
    }
}
