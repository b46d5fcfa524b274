// Graphics pipeline for the fixed triangle
//
// Empty layout, vertex + fragment stages from bundled SPIR-V, one vec3
// position attribute, full-screen static viewport, no blending, no culling.

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;

use super::ops::DeviceOps;
use super::shader::ShaderModule;
use super::DeviceContext;
use crate::assets::AssetSource;
use crate::config::AssetConfig;

const ENTRY_POINT: &std::ffi::CStr = c"main";

/// One binding of tightly packed vec3 positions at location 0
pub fn vertex_input_info() -> (
    [vk::VertexInputBindingDescription; 1],
    [vk::VertexInputAttributeDescription; 1],
) {
    let binding = vk::VertexInputBindingDescription::builder()
        .binding(0)
        .stride(super::buffer::VERTEX_STRIDE)
        .input_rate(vk::VertexInputRate::VERTEX)
        .build();

    let position_attr = vk::VertexInputAttributeDescription::builder()
        .binding(0)
        .location(0)
        .format(vk::Format::R32G32B32_SFLOAT)
        .offset(0)
        .build();

    ([binding], [position_attr])
}

/// Viewport and scissor covering the whole display
pub fn full_viewport(extent: vk::Extent2D) -> (vk::Viewport, vk::Rect2D) {
    let viewport = vk::Viewport::builder()
        .x(0.0)
        .y(0.0)
        .width(extent.width as f32)
        .height(extent.height as f32)
        .min_depth(0.0)
        .max_depth(1.0)
        .build();

    let scissor = vk::Rect2D::builder()
        .offset(vk::Offset2D { x: 0, y: 0 })
        .extent(extent)
        .build();

    (viewport, scissor)
}

pub struct Pipeline<D: DeviceOps = DeviceContext> {
    pub pipeline: vk::Pipeline,
    pub cache: vk::PipelineCache,
    pub layout: vk::PipelineLayout,
    context: Arc<D>,
}

impl<D: DeviceOps> Pipeline<D> {
    pub fn new(
        context: Arc<D>,
        display_size: vk::Extent2D,
        render_pass: vk::RenderPass,
        assets: &dyn AssetSource,
        shaders: &AssetConfig,
    ) -> Result<Self> {
        // Filled in step by step; Drop releases whatever was created
        let mut this = Self {
            pipeline: vk::Pipeline::null(),
            cache: vk::PipelineCache::null(),
            layout: vk::PipelineLayout::null(),
            context: context.clone(),
        };
        let device = &context;

        // Step 1: empty layout, the triangle needs no descriptors or push constants
        let layout_info = vk::PipelineLayoutCreateInfo::builder();
        this.layout = unsafe { device.create_pipeline_layout(&layout_info) }
            .context("vkCreatePipelineLayout failed")?;

        // Step 2: shader stages; modules are dropped when this function returns
        let vertex_shader = ShaderModule::load(context.clone(), assets, &shaders.vertex_shader)
            .context("Failed to load vertex shader")?;
        let fragment_shader = ShaderModule::load(context.clone(), assets, &shaders.fragment_shader)
            .context("Failed to load fragment shader")?;

        let shader_stages = [
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(vertex_shader.module)
                .name(ENTRY_POINT)
                .build(),
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(fragment_shader.module)
                .name(ENTRY_POINT)
                .build(),
        ];

        // Step 3: fixed-function state
        let (viewport, scissor) = full_viewport(display_size);
        let viewports = [viewport];
        let scissors = [scissor];
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewports(&viewports)
            .scissors(&scissors);

        let sample_mask = [u32::MAX];
        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1)
            .sample_shading_enable(false)
            .sample_mask(&sample_mask);

        let color_blend_attachments = [vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(false)
            .build()];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .logic_op(vk::LogicOp::COPY)
            .attachments(&color_blend_attachments);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .cull_mode(vk::CullModeFlags::NONE)
            .front_face(vk::FrontFace::CLOCKWISE)
            .depth_bias_enable(false)
            .line_width(1.0);

        // Restart is meaningless (and invalid) for list topologies
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        let (bindings, attributes) = vertex_input_info();
        let vertex_input_info = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&attributes);

        // Step 4: cache + pipeline
        let cache_info = vk::PipelineCacheCreateInfo::builder();
        this.cache = unsafe { device.create_pipeline_cache(&cache_info) }
            .context("vkCreatePipelineCache failed")?;

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_info)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .color_blend_state(&color_blending)
            .layout(this.layout)
            .render_pass(render_pass)
            .subpass(0)
            .build();

        this.pipeline = unsafe { device.create_graphics_pipeline(this.cache, &pipeline_info) }
            .context("vkCreateGraphicsPipelines failed")?;

        log::info!("Graphics pipeline created");
        Ok(this)
    }
}

impl<D: DeviceOps> Drop for Pipeline<D> {
    fn drop(&mut self) {
        let device = &self.context;
        unsafe {
            if self.pipeline != vk::Pipeline::null() {
                device.destroy_pipeline(self.pipeline);
            }
            if self.cache != vk::PipelineCache::null() {
                device.destroy_pipeline_cache(self.cache);
            }
            if self.layout != vk::PipelineLayout::null() {
                device.destroy_pipeline_layout(self.layout);
            }
        }
    }
}
