// Swapchain - presentable images negotiated with the surface
//
// Fixed policy for the demo: R8G8B8A8_UNORM, FIFO, identity transform,
// image count equal to the surface minimum.

use anyhow::{Context, Result};
use ash::prelude::VkResult;
use ash::vk;
use std::sync::Arc;

use super::ops::DeviceOps;
use super::targets::RenderTargets;
use super::DeviceContext;

/// The only pixel layout the pipeline renders to
pub const REQUIRED_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

/// Pick the required format wherever it appears in the list
pub fn select_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Result<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .copied()
        .find(|f| f.format == REQUIRED_FORMAT)
        .with_context(|| {
            format!(
                "Surface does not support {:?} ({} formats offered)",
                REQUIRED_FORMAT,
                formats.len()
            )
        })
}

/// Image count to request: the surface minimum, never below one.
///
/// A reported maximum of zero means "no limit". A maximum below the minimum
/// is a driver inconsistency; the minimum wins because the driver rejects
/// anything less.
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = caps.min_image_count.max(1);
    if caps.max_image_count >= count {
        count.min(caps.max_image_count)
    } else {
        count
    }
}

/// Surface extent, or the window size clamped to the allowed range when the
/// driver leaves the choice to us
pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, window: vk::Extent2D) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        return caps.current_extent;
    }

    vk::Extent2D {
        width: window
            .width
            .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
        height: window
            .height
            .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
    }
}

/// First supported composite alpha mode, opaque preferred
pub fn choose_composite_alpha(supported: vk::CompositeAlphaFlagsKHR) -> vk::CompositeAlphaFlagsKHR {
    [
        vk::CompositeAlphaFlagsKHR::OPAQUE,
        vk::CompositeAlphaFlagsKHR::INHERIT,
        vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
        vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED,
    ]
    .into_iter()
    .find(|&mode| supported.contains(mode))
    .unwrap_or(vk::CompositeAlphaFlagsKHR::OPAQUE)
}

pub struct Swapchain<D: DeviceOps = DeviceContext> {
    pub swapchain: vk::SwapchainKHR,
    pub images: Vec<vk::Image>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    context: Arc<D>,
}

impl<D: DeviceOps> Swapchain<D> {
    /// `window_extent` is only used when the surface does not dictate a size
    pub fn new(context: Arc<D>, window_extent: vk::Extent2D) -> Result<Self> {
        let caps = context.surface_capabilities()?;
        let formats = context.surface_formats()?;
        log::info!("Surface offers {} formats", formats.len());

        // Fails before any swapchain object exists
        let surface_format = select_surface_format(&formats)?;

        let extent = choose_extent(&caps, window_extent);
        let image_count = choose_image_count(&caps);
        let transform = if caps
            .supported_transforms
            .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
        {
            vk::SurfaceTransformFlagsKHR::IDENTITY
        } else {
            log::debug!("Identity transform unsupported, using {:?}", caps.current_transform);
            caps.current_transform
        };

        log::info!(
            "Creating swapchain: {}x{}, {} images, {:?}",
            extent.width,
            extent.height,
            image_count,
            surface_format.format
        );

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(context.surface())
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(transform)
            .composite_alpha(choose_composite_alpha(caps.supported_composite_alpha))
            .present_mode(vk::PresentModeKHR::FIFO)
            .clipped(true)
            .old_swapchain(vk::SwapchainKHR::null());

        let swapchain = unsafe { context.create_swapchain(&create_info) }
            .context("vkCreateSwapchainKHR failed")?;

        // From here on Drop owns the handle
        let mut this = Self {
            swapchain,
            images: Vec::new(),
            format: surface_format.format,
            extent,
            context,
        };

        this.images = unsafe { this.context.swapchain_images(swapchain) }
            .context("vkGetSwapchainImagesKHR failed")?;

        log::info!("Created swapchain with {} images", this.images.len());
        Ok(this)
    }

    pub fn image_count(&self) -> u32 {
        self.images.len() as u32
    }

    /// Build one color view and one framebuffer per swapchain image
    pub fn create_render_targets(
        &self,
        render_pass: vk::RenderPass,
        depth_view: Option<vk::ImageView>,
    ) -> Result<RenderTargets<D>> {
        RenderTargets::new(
            self.context.clone(),
            &self.images,
            self.format,
            self.extent,
            render_pass,
            depth_view,
        )
    }

    /// Index of the next image to draw into; signals `semaphore` when ready
    pub fn acquire_next_image(
        &self,
        timeout: u64,
        semaphore: vk::Semaphore,
    ) -> VkResult<(u32, bool)> {
        unsafe {
            self.context
                .acquire_next_image(self.swapchain, timeout, semaphore)
        }
    }

    /// Queue `image_index` for display. `Ok(true)` means suboptimal.
    pub fn present(&self, image_index: u32) -> VkResult<bool> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::builder()
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        unsafe { self.context.queue_present(&present_info) }
    }
}

impl<D: DeviceOps> Drop for Swapchain<D> {
    fn drop(&mut self) {
        if self.swapchain != vk::SwapchainKHR::null() {
            unsafe {
                self.context.destroy_swapchain(self.swapchain);
            }
            self.swapchain = vk::SwapchainKHR::null();
        }
    }
}
