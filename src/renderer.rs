// Renderer - owns every Vulkan object of the demo
//
// Field order is the teardown order. Rust drops fields top to bottom, which
// is the exact reverse of the order `new` creates them in. A failure inside
// `new` drops the locals created so far in the same reverse order.

use anyhow::Result;
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::sync::Arc;

use crate::assets::AssetSource;
use crate::backend::{
    DeviceContext, DeviceOps, DeviceReport, FrameDriver, Pipeline, RenderPass, RenderTargets,
    Swapchain, VertexBuffer,
};
use crate::config::Config;

pub struct Renderer<D: DeviceOps = DeviceContext> {
    frame: FrameDriver<D>,
    vertices: VertexBuffer<D>,
    pipeline: Pipeline<D>,
    targets: RenderTargets<D>,
    render_pass: RenderPass<D>,
    swapchain: Swapchain<D>,
    context: Arc<D>,
    clear_color: [f32; 4],
}

impl Renderer {
    /// Build every component. `window_extent` is the fallback size when the
    /// surface leaves the swapchain extent up to us.
    pub fn new<W>(
        config: &Config,
        window: &W,
        window_extent: vk::Extent2D,
        assets: &dyn AssetSource,
    ) -> Result<Self>
    where
        W: HasWindowHandle + HasDisplayHandle + ?Sized,
    {
        let context = DeviceContext::new(config, window)?;
        let renderer = Self::from_context(context, config, window_extent, assets)?;
        log::info!("Renderer built on {}", renderer.context.adapter_name());
        Ok(renderer)
    }

    pub fn report(&self) -> Result<DeviceReport> {
        DeviceReport::query(&self.context)
    }
}

impl<D: DeviceOps> Renderer<D> {
    /// Everything past the device context, in creation order
    pub fn from_context(
        context: Arc<D>,
        config: &Config,
        window_extent: vk::Extent2D,
        assets: &dyn AssetSource,
    ) -> Result<Self> {
        let swapchain = Swapchain::new(context.clone(), window_extent)?;
        let render_pass = RenderPass::new(context.clone(), swapchain.format)?;
        let targets = swapchain.create_render_targets(render_pass.render_pass, None)?;
        let pipeline = Pipeline::new(
            context.clone(),
            swapchain.extent,
            render_pass.render_pass,
            assets,
            &config.assets,
        )?;
        let vertices = VertexBuffer::new(context.clone())?;
        let frame = FrameDriver::new(
            context.clone(),
            swapchain.image_count(),
            config.fence_timeout_ns(),
        )?;

        Ok(Self {
            frame,
            vertices,
            pipeline,
            targets,
            render_pass,
            swapchain,
            context,
            clear_color: config.graphics.clear_color,
        })
    }

    /// One-time command recording and sync object creation
    pub fn init(&mut self) -> Result<()> {
        self.frame.init(
            &self.render_pass,
            &self.targets,
            &self.pipeline,
            &self.vertices,
            self.clear_color,
        )
    }

    /// Draw one frame. `false` if the frame was skipped.
    pub fn draw_frame(&self) -> bool {
        self.frame.draw_frame(&self.swapchain)
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent
    }
}

impl<D: DeviceOps> Drop for Renderer<D> {
    fn drop(&mut self) {
        log::info!("Cleaning up Vulkan resources...");
        // Nothing may be destroyed while the GPU still uses it
        if let Err(e) = self.context.wait_idle() {
            log::warn!("{:#}", e);
        }
    }
}
