// Synchronization primitives
//
// One semaphore (acquire -> submit) and one fence (submit -> CPU), both
// reused every frame. No frames in flight beyond the current one.

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;

use super::ops::DeviceOps;
use super::DeviceContext;

pub struct FrameSync<D: DeviceOps = DeviceContext> {
    pub image_available: vk::Semaphore,
    pub frame_done: vk::Fence,
    context: Arc<D>,
}

impl<D: DeviceOps> FrameSync<D> {
    pub fn new(context: Arc<D>) -> Result<Self> {
        // Unsignaled: every frame resets before submitting anyway
        let frame_done = unsafe { context.create_fence() }.context("vkCreateFence failed")?;
        let mut this = Self {
            image_available: vk::Semaphore::null(),
            frame_done,
            context,
        };

        this.image_available = unsafe { this.context.create_semaphore() }
            .context("vkCreateSemaphore failed")?;

        Ok(this)
    }
}

impl<D: DeviceOps> Drop for FrameSync<D> {
    fn drop(&mut self) {
        unsafe {
            if self.image_available != vk::Semaphore::null() {
                self.context.destroy_semaphore(self.image_available);
            }
            self.context.destroy_fence(self.frame_done);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::fake::{fail_at_every_call, FakeDevice};

    #[test]
    fn one_fence_and_one_semaphore() {
        let device = FakeDevice::default().shared();
        let sync = FrameSync::new(device.clone()).unwrap();
        assert_eq!(device.live(), vec!["fence", "semaphore"]);

        drop(sync);
        device.assert_clean();
    }

    #[test]
    fn semaphore_failure_releases_the_fence() {
        let calls = fail_at_every_call(FakeDevice::default, |device| FrameSync::new(device));
        assert_eq!(calls, 2);
    }
}
