// Render targets - per swapchain image color view + framebuffer
//
// Handles are pushed as they are created, so a failure partway through
// drops the struct and releases exactly what exists.

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;

use super::ops::DeviceOps;
use super::DeviceContext;

pub struct RenderTargets<D: DeviceOps = DeviceContext> {
    pub views: Vec<vk::ImageView>,
    pub framebuffers: Vec<vk::Framebuffer>,
    pub extent: vk::Extent2D,
    context: Arc<D>,
}

/// Attachments for one framebuffer: color first, then depth when present
pub fn framebuffer_attachments(
    color: vk::ImageView,
    depth: Option<vk::ImageView>,
) -> Vec<vk::ImageView> {
    std::iter::once(color)
        .chain(depth.filter(|view| *view != vk::ImageView::null()))
        .collect()
}

impl<D: DeviceOps> RenderTargets<D> {
    pub fn new(
        context: Arc<D>,
        images: &[vk::Image],
        format: vk::Format,
        extent: vk::Extent2D,
        render_pass: vk::RenderPass,
        depth_view: Option<vk::ImageView>,
    ) -> Result<Self> {
        let mut targets = Self {
            views: Vec::with_capacity(images.len()),
            framebuffers: Vec::with_capacity(images.len()),
            extent,
            context,
        };

        for &image in images {
            let create_info = vk::ImageViewCreateInfo::builder()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(format)
                .components(vk::ComponentMapping {
                    r: vk::ComponentSwizzle::IDENTITY,
                    g: vk::ComponentSwizzle::IDENTITY,
                    b: vk::ComponentSwizzle::IDENTITY,
                    a: vk::ComponentSwizzle::IDENTITY,
                })
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });

            let view = unsafe { targets.context.create_image_view(&create_info) }
                .context("vkCreateImageView failed")?;
            targets.views.push(view);
        }

        for &view in &targets.views {
            let attachments = framebuffer_attachments(view, depth_view);
            let framebuffer_info = vk::FramebufferCreateInfo::builder()
                .render_pass(render_pass)
                .attachments(&attachments)
                .width(extent.width)
                .height(extent.height)
                .layers(1);

            let framebuffer = unsafe { targets.context.create_framebuffer(&framebuffer_info) }
                .context("vkCreateFramebuffer failed")?;
            targets.framebuffers.push(framebuffer);
        }

        log::info!(
            "Created {} image views and {} framebuffers",
            targets.views.len(),
            targets.framebuffers.len()
        );
        Ok(targets)
    }

    pub(crate) fn len(&self) -> usize {
        self.framebuffers.len()
    }
}

impl<D: DeviceOps> Drop for RenderTargets<D> {
    fn drop(&mut self) {
        let device = &self.context;
        // Per image: framebuffer first, then the view it references
        for (i, view) in self.views.drain(..).enumerate() {
            unsafe {
                if let Some(&framebuffer) = self.framebuffers.get(i) {
                    device.destroy_framebuffer(framebuffer);
                }
                device.destroy_image_view(view);
            }
        }
        self.framebuffers.clear();
    }
}
