// Frame driver - render pass, pre-recorded command buffers, per-frame cycle
//
// FRAME CYCLE (single thread, one frame at a time):
//   acquire image  ->  reset fence + submit  ->  wait fence (bounded)  ->  present
//
// Any phase failing skips the frame: a warning is logged and `false` is
// returned. Nothing is torn down; the caller simply tries again next tick.
// A frame skipped after its image was acquired first settles the semaphore
// and fence so the next frame starts from a clean state.

use anyhow::{Context, Result};
use ash::prelude::VkResult;
use ash::vk;
use std::fmt;
use std::sync::Arc;

use super::buffer::VertexBuffer;
use super::ops::{DeviceOps, DrawCommands};
use super::pipeline::Pipeline;
use super::swapchain::Swapchain;
use super::sync::FrameSync;
use super::targets::RenderTargets;
use super::DeviceContext;

/// Image acquisition waits as long as the driver needs; finite timeouts are
/// not reliably implemented by mobile drivers
pub const ACQUIRE_TIMEOUT: u64 = u64::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePhase {
    Acquire,
    Submit,
    FenceWait,
    Present,
}

impl fmt::Display for FramePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FramePhase::Acquire => "vkAcquireNextImageKHR",
            FramePhase::Submit => "vkQueueSubmit",
            FramePhase::FenceWait => "vkWaitForFences",
            FramePhase::Present => "vkQueuePresentKHR",
        };
        f.write_str(name)
    }
}

/// The four driver calls of one frame
pub trait FrameOps {
    fn acquire(&self) -> VkResult<u32>;
    /// Reset the frame fence and submit the buffer recorded for `image_index`
    fn submit(&self, image_index: u32) -> VkResult<()>;
    fn wait(&self) -> VkResult<()>;
    fn present(&self, image_index: u32) -> VkResult<()>;
    /// Called when `phase` failed after an image was acquired
    fn recover(&self, phase: FramePhase);
}

/// Run one frame. `true` only if the image was presented.
pub fn run_frame(ops: &impl FrameOps) -> bool {
    let image_index = match ops.acquire() {
        Ok(index) => index,
        Err(e) => return skip(FramePhase::Acquire, e),
    };

    if let Err(e) = ops.submit(image_index) {
        ops.recover(FramePhase::Submit);
        return skip(FramePhase::Submit, e);
    }
    if let Err(e) = ops.wait() {
        ops.recover(FramePhase::FenceWait);
        return skip(FramePhase::FenceWait, e);
    }
    if let Err(e) = ops.present(image_index) {
        return skip(FramePhase::Present, e);
    }

    true
}

fn skip(phase: FramePhase, error: vk::Result) -> bool {
    log::warn!("{} failed with {}, skipping frame", phase, error);
    false
}

/// Single color attachment, cleared on load, handed to the presentation engine
pub struct RenderPass<D: DeviceOps = DeviceContext> {
    pub render_pass: vk::RenderPass,
    context: Arc<D>,
}

impl<D: DeviceOps> RenderPass<D> {
    pub fn new(context: Arc<D>, format: vk::Format) -> Result<Self> {
        let color_attachment = vk::AttachmentDescription::builder()
            .format(format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)
            .build();

        let color_attachment_ref = vk::AttachmentReference::builder()
            .attachment(0)
            .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .build();

        let color_attachments = [color_attachment_ref];
        let subpass = vk::SubpassDescription::builder()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_attachments)
            .build();

        // The acquire semaphore is waited at color output; order the clear after it
        let dependency = vk::SubpassDependency::builder()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .src_access_mask(vk::AccessFlags::empty())
            .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
            .build();

        let attachments = [color_attachment];
        let subpasses = [subpass];
        let dependencies = [dependency];

        let render_pass_info = vk::RenderPassCreateInfo::builder()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        let render_pass = unsafe { context.create_render_pass(&render_pass_info) }
            .context("vkCreateRenderPass failed")?;

        Ok(Self {
            render_pass,
            context,
        })
    }
}

impl<D: DeviceOps> Drop for RenderPass<D> {
    fn drop(&mut self) {
        unsafe {
            self.context.destroy_render_pass(self.render_pass);
        }
    }
}

pub struct FrameDriver<D: DeviceOps = DeviceContext> {
    pub command_pool: vk::CommandPool,
    /// One primary buffer per swapchain image, recorded once in `init`
    pub command_buffers: Vec<vk::CommandBuffer>,
    sync: Option<FrameSync<D>>,
    fence_timeout: u64,
    context: Arc<D>,
}

impl<D: DeviceOps> FrameDriver<D> {
    pub fn new(context: Arc<D>, image_count: u32, fence_timeout_ns: u64) -> Result<Self> {
        let pool_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(context.queue_family())
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

        let command_pool = unsafe { context.create_command_pool(&pool_info) }
            .context("vkCreateCommandPool failed")?;

        let mut this = Self {
            command_pool,
            command_buffers: Vec::new(),
            sync: None,
            fence_timeout: fence_timeout_ns,
            context,
        };

        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(image_count);

        this.command_buffers = unsafe { this.context.allocate_command_buffers(&alloc_info) }
            .context("vkAllocateCommandBuffers failed")?;

        Ok(this)
    }

    /// Record the draw for every image and create the frame's sync objects
    pub fn init(
        &mut self,
        render_pass: &RenderPass<D>,
        targets: &RenderTargets<D>,
        pipeline: &Pipeline<D>,
        vertices: &VertexBuffer<D>,
        clear_color: [f32; 4],
    ) -> Result<()> {
        if targets.len() != self.command_buffers.len() {
            anyhow::bail!(
                "{} framebuffers for {} command buffers",
                targets.len(),
                self.command_buffers.len()
            );
        }

        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: targets.extent,
        };

        for (&cmd, &framebuffer) in self.command_buffers.iter().zip(&targets.framebuffers) {
            let draw = DrawCommands {
                render_pass: render_pass.render_pass,
                framebuffer,
                render_area,
                clear_color,
                pipeline: pipeline.pipeline,
                vertex_buffer: vertices.buffer,
                vertex_count: vertices.vertex_count,
            };
            unsafe { self.context.record_draw(cmd, &draw) }
                .context("Recording the draw command buffer failed")?;
        }

        if self.sync.is_none() {
            self.sync = Some(FrameSync::new(self.context.clone())?);
        }

        log::info!("Recorded {} command buffers", self.command_buffers.len());
        Ok(())
    }

    /// Acquire, submit, wait, present. `false` means the frame was skipped.
    pub fn draw_frame(&self, swapchain: &Swapchain<D>) -> bool {
        let Some(sync) = self.sync.as_ref() else {
            log::warn!("draw_frame called before init, skipping frame");
            return false;
        };

        run_frame(&DeviceFrame {
            context: self.context.as_ref(),
            swapchain,
            command_buffers: &self.command_buffers,
            sync,
            fence_timeout: self.fence_timeout,
        })
    }
}

impl<D: DeviceOps> Drop for FrameDriver<D> {
    fn drop(&mut self) {
        // Semaphore and fence go first
        self.sync = None;

        unsafe {
            if !self.command_buffers.is_empty() {
                self.context
                    .free_command_buffers(self.command_pool, &self.command_buffers);
                self.command_buffers.clear();
            }
            self.context.destroy_command_pool(self.command_pool);
        }
    }
}

/// Device-backed frame operations
struct DeviceFrame<'a, D: DeviceOps> {
    context: &'a D,
    swapchain: &'a Swapchain<D>,
    command_buffers: &'a [vk::CommandBuffer],
    sync: &'a FrameSync<D>,
    fence_timeout: u64,
}

impl<D: DeviceOps> FrameOps for DeviceFrame<'_, D> {
    fn acquire(&self) -> VkResult<u32> {
        let (index, suboptimal) = self
            .swapchain
            .acquire_next_image(ACQUIRE_TIMEOUT, self.sync.image_available)?;
        if suboptimal {
            log::debug!("Swapchain suboptimal at acquire");
        }
        Ok(index)
    }

    fn submit(&self, image_index: u32) -> VkResult<()> {
        let cmd = *self
            .command_buffers
            .get(image_index as usize)
            .ok_or(vk::Result::ERROR_UNKNOWN)?;

        unsafe {
            self.context.reset_fence(self.sync.frame_done)?;
            self.context
                .queue_submit(&[cmd], self.sync.image_available, self.sync.frame_done)
        }
    }

    fn wait(&self) -> VkResult<()> {
        unsafe {
            self.context
                .wait_for_fence(self.sync.frame_done, self.fence_timeout)
        }
    }

    fn present(&self, image_index: u32) -> VkResult<()> {
        let suboptimal = self.swapchain.present(image_index)?;
        if suboptimal {
            log::debug!("Swapchain suboptimal at present");
        }
        Ok(())
    }

    fn recover(&self, phase: FramePhase) {
        if phase == FramePhase::Submit {
            // The acquire signaled the semaphore but nothing waited on it
            let drained = unsafe {
                self.context
                    .queue_submit(&[], self.sync.image_available, vk::Fence::null())
            };
            if let Err(e) = drained {
                log::warn!("Draining the acquire semaphore failed with {}", e);
            }
        }
        // The fence must not be reset while its submission is pending
        if let Err(e) = self.context.wait_idle() {
            log::warn!("{:#}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::fake::{fail_at_every_call, FakeDevice};
    use std::cell::RefCell;

    /// Records calls and fails the configured phase
    #[derive(Default)]
    struct ScriptedFrame {
        fail: Option<FramePhase>,
        image_index: u32,
        calls: RefCell<Vec<String>>,
    }

    impl ScriptedFrame {
        fn failing(phase: FramePhase) -> Self {
            Self {
                fail: Some(phase),
                ..Default::default()
            }
        }

        fn step(&self, phase: FramePhase, error: vk::Result, call: String) -> VkResult<()> {
            self.calls.borrow_mut().push(call);
            if self.fail == Some(phase) {
                Err(error)
            } else {
                Ok(())
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.borrow().clone()
        }
    }

    impl FrameOps for ScriptedFrame {
        fn acquire(&self) -> VkResult<u32> {
            self.step(
                FramePhase::Acquire,
                vk::Result::ERROR_OUT_OF_DATE_KHR,
                "acquire".to_string(),
            )?;
            Ok(self.image_index)
        }

        fn submit(&self, image_index: u32) -> VkResult<()> {
            self.step(
                FramePhase::Submit,
                vk::Result::ERROR_DEVICE_LOST,
                format!("submit {}", image_index),
            )
        }

        fn wait(&self) -> VkResult<()> {
            self.step(FramePhase::FenceWait, vk::Result::TIMEOUT, "wait".to_string())
        }

        fn recover(&self, phase: FramePhase) {
            self.calls.borrow_mut().push(format!("recover {:?}", phase));
        }

        fn present(&self, image_index: u32) -> VkResult<()> {
            self.step(
                FramePhase::Present,
                vk::Result::ERROR_SURFACE_LOST_KHR,
                format!("present {}", image_index),
            )
        }
    }

    #[test]
    fn successful_frame_runs_all_phases_in_order() {
        let frame = ScriptedFrame {
            image_index: 2,
            ..Default::default()
        };

        assert!(run_frame(&frame));
        assert_eq!(frame.calls(), vec!["acquire", "submit 2", "wait", "present 2"]);
    }

    #[test]
    fn acquire_failure_skips_everything_else() {
        let frame = ScriptedFrame::failing(FramePhase::Acquire);
        assert!(!run_frame(&frame));
        assert_eq!(frame.calls(), vec!["acquire"]);
    }

    #[test]
    fn submit_failure_never_waits_or_presents() {
        let frame = ScriptedFrame::failing(FramePhase::Submit);
        assert!(!run_frame(&frame));
        assert_eq!(frame.calls(), vec!["acquire", "submit 0", "recover Submit"]);
    }

    #[test]
    fn fence_timeout_skips_present() {
        let frame = ScriptedFrame::failing(FramePhase::FenceWait);
        assert!(!run_frame(&frame));
        assert_eq!(
            frame.calls(),
            vec!["acquire", "submit 0", "wait", "recover FenceWait"]
        );
    }

    #[test]
    fn present_failure_reports_no_draw() {
        let frame = ScriptedFrame::failing(FramePhase::Present);
        assert!(!run_frame(&frame));
        // The fence was already waited on; nothing to settle
        assert_eq!(frame.calls(), vec!["acquire", "submit 0", "wait", "present 0"]);
    }

    #[test]
    fn skipped_frame_can_be_retried() {
        let mut frame = ScriptedFrame::failing(FramePhase::Acquire);
        assert!(!run_frame(&frame));

        frame.fail = None;
        assert!(run_frame(&frame));
    }

    #[test]
    fn phases_name_their_driver_call() {
        assert_eq!(FramePhase::Acquire.to_string(), "vkAcquireNextImageKHR");
        assert_eq!(FramePhase::FenceWait.to_string(), "vkWaitForFences");
    }

    #[test]
    fn one_command_buffer_per_image() {
        let device = FakeDevice::default().shared();
        let driver = FrameDriver::new(device.clone(), 3, 1_000).unwrap();

        assert_eq!(driver.command_buffers.len(), 3);
        assert_eq!(device.live_count("command buffer"), 3);
        assert_eq!(device.live_count("command pool"), 1);

        drop(driver);
        device.assert_clean();
    }

    #[test]
    fn partial_frame_driver_is_released() {
        let calls = fail_at_every_call(FakeDevice::default, |device| {
            FrameDriver::new(device, 2, 1_000)
        });
        assert_eq!(calls, 2);
    }

    #[test]
    fn draw_before_init_is_skipped() {
        let device = FakeDevice::default().shared();
        let swapchain = Swapchain::new(device.clone(), vk::Extent2D::default()).unwrap();
        let driver = FrameDriver::new(device.clone(), swapchain.image_count(), 1_000).unwrap();
        let calls = device.calls();

        assert!(!driver.draw_frame(&swapchain));
        assert_eq!(device.calls(), calls, "no driver call before init");
    }
}
