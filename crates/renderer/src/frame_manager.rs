//! Frame loop over a presentation chain.
//!
//! [`FrameLoop`] owns the per-frame resources and runs one frame at a time:
//!
//! ```text
//! 1. Wait on the slot's in-flight fence
//! 2. Acquire an image (signals image_available)
//! 3. Record a clear of the image into the slot's command buffer
//! 4. Reset the fence, then submit: wait image_available, signal the
//!    image's render_finished semaphore and the in-flight fence
//! 5. Present (waits on render_finished)
//! ```
//!
//! A slot whose frame failed between acquire and submit gets a fresh fence
//! and semaphore before it is used again.
//!
//! Render-finished semaphores are kept per chain image and recreated when
//! the chain generation changes, since the image count may change with it.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use accele_rhi::device::Device;
//! use accele_rhi::{PresentationChain, VulkanDriver};
//! use accele_renderer::FrameLoop;
//!
//! # fn example(device: Arc<Device>, chain: &mut PresentationChain<VulkanDriver>) -> Result<(), accele_rhi::RhiError> {
//! let mut frames = FrameLoop::new(device)?;
//!
//! if frames.render_frame(chain)?.needs_rebuild() {
//!     chain.rebuild()?;
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use accele_rhi::command::{CommandBuffer, CommandPool};
use accele_rhi::device::Device;
use accele_rhi::sync::{Fence, Semaphore};
use accele_rhi::{
    Acquire, ChainResources, Generation, PresentationChain, PresentationDriver, RhiError,
    RhiResult,
};

use crate::MAX_FRAMES_IN_FLIGHT;
use crate::frame::{FrameOutcome, SlotState};

/// Color the acquired image is cleared to.
pub const DEFAULT_CLEAR_COLOR: [f32; 4] = [0.1, 0.1, 0.15, 1.0];

/// Resources of one frame slot.
struct FrameData {
    /// Command buffer for this frame, freed with `command_pool`.
    command_buffer: CommandBuffer,
    /// Pool owning `command_buffer`.
    #[allow(dead_code)]
    command_pool: CommandPool,
    /// Signaled when the acquired image is ready to be written.
    image_available: Semaphore,
    /// Signaled when this frame's GPU work completes.
    in_flight: Fence,
    /// How far the last frame in this slot got.
    state: SlotState,
}

impl FrameData {
    fn new(device: &Arc<Device>) -> RhiResult<Self> {
        let command_pool = CommandPool::new(device.clone(), device.queue_family())?;
        let command_buffer = CommandBuffer::new(device.clone(), &command_pool)?;
        let image_available = Semaphore::new(device.clone())?;
        // Signaled so the first wait on the slot returns at once
        let in_flight = Fence::new(device.clone(), true)?;

        Ok(Self {
            command_buffer,
            command_pool,
            image_available,
            in_flight,
            state: SlotState::Idle,
        })
    }

    /// Replaces the fence and semaphore of a slot whose frame never reached
    /// the queue.
    fn recreate_sync(&mut self, device: &Arc<Device>) -> RhiResult<()> {
        // The acquire may still signal the old semaphore
        device.wait_idle()?;
        self.image_available = Semaphore::new(device.clone())?;
        self.in_flight = Fence::new(device.clone(), true)?;
        self.state = SlotState::Idle;
        Ok(())
    }
}

/// Records, submits and presents frames against a [`PresentationChain`].
///
/// The loop never rebuilds the chain itself; it reports invalidation through
/// [`FrameOutcome`] and the owner calls `rebuild()`.
pub struct FrameLoop {
    device: Arc<Device>,
    frames: Vec<FrameData>,
    /// One per chain image, indexed by the acquired image index.
    render_finished: Vec<Semaphore>,
    /// Chain generation `render_finished` was created for.
    synced_generation: Option<Generation>,
    current_frame: usize,
    clear_color: [f32; 4],
}

impl FrameLoop {
    /// Creates [`MAX_FRAMES_IN_FLIGHT`] frame slots.
    ///
    /// # Errors
    ///
    /// Returns an error if any command or synchronization object cannot be
    /// created.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let frames = (0..MAX_FRAMES_IN_FLIGHT)
            .map(|_| FrameData::new(&device))
            .collect::<RhiResult<Vec<_>>>()?;

        info!(
            "Frame loop created with {} frames in flight",
            MAX_FRAMES_IN_FLIGHT
        );

        Ok(Self {
            device,
            frames,
            render_finished: Vec::new(),
            synced_generation: None,
            current_frame: 0,
            clear_color: DEFAULT_CLEAR_COLOR,
        })
    }

    /// Sets the color each frame is cleared to.
    pub fn set_clear_color(&mut self, color: [f32; 4]) {
        self.clear_color = color;
    }

    /// Returns the index of the current frame slot.
    #[inline]
    pub fn current_frame_index(&self) -> usize {
        self.current_frame
    }

    /// Renders and presents one frame.
    ///
    /// Returns [`FrameOutcome::Skipped`] without rendering if the chain is
    /// not live or was out of date at acquire.
    ///
    /// # Errors
    ///
    /// Returns an error if waiting, recording, submitting, acquiring or
    /// presenting fails for any reason other than invalidation.
    pub fn render_frame<D: PresentationDriver>(
        &mut self,
        chain: &PresentationChain<D>,
    ) -> RhiResult<FrameOutcome> {
        let Some(resources) = chain.resources() else {
            debug!("Presentation chain not live, skipping frame");
            return Ok(FrameOutcome::Skipped);
        };
        self.sync_with(resources)?;

        let device = &self.device;
        let frame = &mut self.frames[self.current_frame];
        if frame.state.needs_sync_reset() {
            warn!(
                "Frame slot {} never reached the queue, recreating its sync objects",
                self.current_frame
            );
            frame.recreate_sync(device)?;
        }

        frame.in_flight.wait(u64::MAX)?;

        let (image_index, acquired_suboptimal) =
            match chain.acquire_next_image(frame.image_available.handle())? {
                Acquire::Image { index, suboptimal } => (index, suboptimal),
                Acquire::OutOfDate => return Ok(FrameOutcome::Skipped),
            };
        frame.state = SlotState::Acquired;

        Self::record(frame, resources, image_index, self.clear_color)?;

        let render_finished = self.render_finished[image_index as usize].handle();

        // Reset right before submitting; the submit signals it again
        frame.in_flight.reset()?;
        Self::submit(device, frame, render_finished)?;
        frame.state = SlotState::Submitted;

        let present = chain.present(device.queue(), image_index, render_finished);
        self.current_frame = (self.current_frame + 1) % MAX_FRAMES_IN_FLIGHT;

        match present {
            Ok(status) => Ok(FrameOutcome::from_present(status, acquired_suboptimal)),
            Err(e) => {
                // The render-finished semaphore may stay signaled
                self.synced_generation = None;
                Err(e)
            }
        }
    }

    /// Recreates the per-image semaphores after the chain changed generation.
    fn sync_with(&mut self, resources: &ChainResources) -> RhiResult<()> {
        if self.synced_generation == Some(resources.generation()) {
            return Ok(());
        }

        if !self.render_finished.is_empty() {
            self.device.wait_idle()?;
            self.render_finished.clear();
        }
        self.render_finished = (0..resources.image_count())
            .map(|_| Semaphore::new(self.device.clone()))
            .collect::<RhiResult<Vec<_>>>()?;
        self.synced_generation = Some(resources.generation());

        debug!(
            "Created {} render-finished semaphores for chain generation {}",
            self.render_finished.len(),
            resources.generation().get()
        );
        Ok(())
    }

    fn record(
        frame: &FrameData,
        resources: &ChainResources,
        image_index: u32,
        clear_color: [f32; 4],
    ) -> RhiResult<()> {
        let cmd = &frame.command_buffer;
        let image = resources.image(image_index as usize);

        cmd.reset()?;
        cmd.begin()?;

        cmd.transition_image_layout(
            image,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        );

        let color_attachment = vk::RenderingAttachmentInfo::default()
            .image_view(resources.image_view(image_index as usize))
            .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .clear_value(vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: clear_color,
                },
            });

        let rendering_info = vk::RenderingInfo::default()
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: resources.extent(),
            })
            .layer_count(1)
            .color_attachments(std::slice::from_ref(&color_attachment));

        cmd.begin_rendering(&rendering_info);
        cmd.end_rendering();

        cmd.transition_image_layout(
            image,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
        );

        cmd.end()
    }

    fn submit(
        device: &Device,
        frame: &FrameData,
        render_finished: vk::Semaphore,
    ) -> RhiResult<()> {
        let wait_semaphores = [frame.image_available.handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [render_finished];
        let command_buffers = [frame.command_buffer.handle()];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            device
                .handle()
                .queue_submit(
                    device.queue(),
                    &[submit_info],
                    frame.in_flight.handle(),
                )
                .map_err(RhiError::resource("submit frame"))
        }
    }
}

impl Drop for FrameLoop {
    fn drop(&mut self) {
        // Fences and semaphores may still be in use by the last frames
        if let Err(e) = self.device.wait_idle() {
            tracing::error!("Failed to wait for device idle during frame loop drop: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_frames_in_flight_constant() {
        assert!(MAX_FRAMES_IN_FLIGHT >= 1);
        assert!(MAX_FRAMES_IN_FLIGHT <= 3);
    }

    #[test]
    fn test_frame_loop_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<FrameLoop>();
    }

    #[test]
    fn test_default_clear_color_is_opaque() {
        assert_eq!(DEFAULT_CLEAR_COLOR[3], 1.0);
    }
}
