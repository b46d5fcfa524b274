// Recording device for tests
//
// Hands out unique handles, tracks which ones are alive, and can be told to
// fail the Nth fallible call. A build that fails at call N must leave
// nothing alive and release nothing twice.

use anyhow::Result;
use ash::prelude::VkResult;
use ash::vk::{self, Handle};
use std::collections::{HashMap, HashSet};
use std::ffi::c_void;
use std::sync::{Arc, Mutex};

use super::ops::{DeviceOps, DrawCommands};
use crate::assets::MemoryAssets;
use crate::config::AssetConfig;

#[derive(Default)]
struct State {
    calls: usize,
    next_handle: u64,
    live: HashMap<u64, &'static str>,
    created: Vec<&'static str>,
    double_releases: Vec<&'static str>,
    memory: HashMap<u64, Vec<u8>>,
    buffer_sizes: HashMap<u64, vk::DeviceSize>,
    mapped: HashSet<u64>,
    flushes: usize,
    swapchain_images: u32,
    recorded: Vec<(vk::CommandBuffer, DrawCommands)>,
    submits: Vec<usize>,
    presents: usize,
    idle_waits: usize,
}

pub struct FakeDevice {
    caps: vk::SurfaceCapabilitiesKHR,
    formats: Vec<vk::SurfaceFormatKHR>,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    fail_at: Option<usize>,
    state: Mutex<State>,
}

pub fn surface_format(format: vk::Format) -> vk::SurfaceFormatKHR {
    vk::SurfaceFormatKHR {
        format,
        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
    }
}

pub fn capabilities(min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
    vk::SurfaceCapabilitiesKHR {
        min_image_count: min,
        max_image_count: max,
        current_extent: vk::Extent2D {
            width: 1080,
            height: 2340,
        },
        supported_transforms: vk::SurfaceTransformFlagsKHR::IDENTITY,
        current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
        supported_composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
        ..Default::default()
    }
}

/// Smallest blob that decodes as SPIR-V
pub fn spirv_stub() -> Vec<u8> {
    [0x0723_0203u32, 0x0001_0000]
        .iter()
        .flat_map(|word| word.to_le_bytes())
        .collect()
}

/// Both default shader paths backed by `spirv_stub`
pub fn shader_assets() -> MemoryAssets {
    let shaders = AssetConfig::default();
    MemoryAssets::default()
        .with(&shaders.vertex_shader, &spirv_stub())
        .with(&shaders.fragment_shader, &spirv_stub())
}

fn memory_types(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
    let mut props = vk::PhysicalDeviceMemoryProperties {
        memory_type_count: types.len() as u32,
        ..Default::default()
    };
    for (slot, &flags) in props.memory_types.iter_mut().zip(types) {
        slot.property_flags = flags;
    }
    props
}

impl Default for FakeDevice {
    fn default() -> Self {
        Self {
            caps: capabilities(2, 3),
            formats: vec![
                surface_format(vk::Format::B8G8R8A8_UNORM),
                surface_format(vk::Format::R8G8B8A8_UNORM),
            ],
            memory_properties: memory_types(&[
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            ]),
            fail_at: None,
            state: Mutex::new(State::default()),
        }
    }
}

impl FakeDevice {
    pub fn with_caps(mut self, caps: vk::SurfaceCapabilitiesKHR) -> Self {
        self.caps = caps;
        self
    }

    pub fn with_formats(mut self, formats: Vec<vk::SurfaceFormatKHR>) -> Self {
        self.formats = formats;
        self
    }

    pub fn with_memory_types(mut self, types: &[vk::MemoryPropertyFlags]) -> Self {
        self.memory_properties = memory_types(types);
        self
    }

    /// Fail the fallible call with this zero-based index
    pub fn failing_at(mut self, call: usize) -> Self {
        self.fail_at = Some(call);
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Number of fallible calls made so far
    pub fn calls(&self) -> usize {
        self.state().calls
    }

    /// Kinds of every handle still alive, sorted
    pub fn live(&self) -> Vec<&'static str> {
        let mut kinds = self.state().live.values().copied().collect::<Vec<_>>();
        kinds.sort_unstable();
        kinds
    }

    pub fn live_count(&self, kind: &str) -> usize {
        self.state().live.values().filter(|&&k| k == kind).count()
    }

    pub fn created_count(&self, kind: &str) -> usize {
        self.state().created.iter().filter(|&&k| k == kind).count()
    }

    pub fn double_releases(&self) -> Vec<&'static str> {
        self.state().double_releases.clone()
    }

    pub fn mapped_count(&self) -> usize {
        self.state().mapped.len()
    }

    pub fn flushes(&self) -> usize {
        self.state().flushes
    }

    pub fn memory_contents(&self, memory: vk::DeviceMemory) -> Vec<u8> {
        self.state()
            .memory
            .get(&memory.as_raw())
            .cloned()
            .unwrap_or_default()
    }

    pub fn recorded(&self) -> Vec<(vk::CommandBuffer, DrawCommands)> {
        self.state().recorded.clone()
    }

    /// Command buffer count of each submission, in order
    pub fn submits(&self) -> Vec<usize> {
        self.state().submits.clone()
    }

    pub fn presents(&self) -> usize {
        self.state().presents
    }

    pub fn idle_waits(&self) -> usize {
        self.state().idle_waits
    }

    /// Nothing alive, nothing mapped, nothing released twice
    pub fn assert_clean(&self) {
        assert!(self.live().is_empty(), "still alive: {:?}", self.live());
        assert_eq!(self.mapped_count(), 0, "memory left mapped");
        assert!(
            self.double_releases().is_empty(),
            "released twice: {:?}",
            self.double_releases()
        );
    }

    fn step(&self) -> VkResult<()> {
        let mut state = self.state();
        let call = state.calls;
        state.calls += 1;
        if self.fail_at == Some(call) {
            Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY)
        } else {
            Ok(())
        }
    }

    fn insert(&self, kind: &'static str) -> u64 {
        let mut state = self.state();
        state.next_handle += 1;
        let raw = state.next_handle;
        state.live.insert(raw, kind);
        state.created.push(kind);
        raw
    }

    fn create<H: Handle>(&self, kind: &'static str) -> VkResult<H> {
        self.step()?;
        Ok(H::from_raw(self.insert(kind)))
    }

    fn release<H: Handle>(&self, handle: H, kind: &'static str) {
        let raw = handle.as_raw();
        if raw == 0 {
            return;
        }
        let mut state = self.state();
        if state.live.remove(&raw).is_none() {
            state.double_releases.push(kind);
        }
    }
}

impl DeviceOps for FakeDevice {
    fn queue_family(&self) -> u32 {
        0
    }

    fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.memory_properties
    }

    fn surface(&self) -> vk::SurfaceKHR {
        vk::SurfaceKHR::from_raw(0x5eed)
    }

    fn surface_capabilities(&self) -> Result<vk::SurfaceCapabilitiesKHR> {
        self.step()?;
        Ok(self.caps)
    }

    fn surface_formats(&self) -> Result<Vec<vk::SurfaceFormatKHR>> {
        self.step()?;
        Ok(self.formats.clone())
    }

    fn wait_idle(&self) -> Result<()> {
        self.state().idle_waits += 1;
        Ok(())
    }

    unsafe fn create_swapchain(
        &self,
        info: &vk::SwapchainCreateInfoKHR,
    ) -> VkResult<vk::SwapchainKHR> {
        let swapchain = self.create("swapchain")?;
        self.state().swapchain_images = info.min_image_count;
        Ok(swapchain)
    }

    unsafe fn swapchain_images(&self, _swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        self.step()?;
        let count = self.state().swapchain_images as u64;
        // Owned by the swapchain, never released individually
        Ok((0..count).map(|i| vk::Image::from_raw(0x1000 + i)).collect())
    }

    unsafe fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        self.release(swapchain, "swapchain")
    }

    unsafe fn acquire_next_image(
        &self,
        _swapchain: vk::SwapchainKHR,
        _timeout: u64,
        _semaphore: vk::Semaphore,
    ) -> VkResult<(u32, bool)> {
        self.step()?;
        Ok((0, false))
    }

    unsafe fn queue_present(&self, _info: &vk::PresentInfoKHR) -> VkResult<bool> {
        self.step()?;
        self.state().presents += 1;
        Ok(false)
    }

    unsafe fn create_image_view(&self, _info: &vk::ImageViewCreateInfo) -> VkResult<vk::ImageView> {
        self.create("image view")
    }

    unsafe fn destroy_image_view(&self, view: vk::ImageView) {
        self.release(view, "image view")
    }

    unsafe fn create_framebuffer(
        &self,
        _info: &vk::FramebufferCreateInfo,
    ) -> VkResult<vk::Framebuffer> {
        self.create("framebuffer")
    }

    unsafe fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        self.release(framebuffer, "framebuffer")
    }

    unsafe fn create_render_pass(
        &self,
        _info: &vk::RenderPassCreateInfo,
    ) -> VkResult<vk::RenderPass> {
        self.create("render pass")
    }

    unsafe fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        self.release(render_pass, "render pass")
    }

    unsafe fn create_pipeline_layout(
        &self,
        _info: &vk::PipelineLayoutCreateInfo,
    ) -> VkResult<vk::PipelineLayout> {
        self.create("pipeline layout")
    }

    unsafe fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        self.release(layout, "pipeline layout")
    }

    unsafe fn create_shader_module(
        &self,
        _info: &vk::ShaderModuleCreateInfo,
    ) -> VkResult<vk::ShaderModule> {
        self.create("shader module")
    }

    unsafe fn destroy_shader_module(&self, module: vk::ShaderModule) {
        self.release(module, "shader module")
    }

    unsafe fn create_pipeline_cache(
        &self,
        _info: &vk::PipelineCacheCreateInfo,
    ) -> VkResult<vk::PipelineCache> {
        self.create("pipeline cache")
    }

    unsafe fn destroy_pipeline_cache(&self, cache: vk::PipelineCache) {
        self.release(cache, "pipeline cache")
    }

    unsafe fn create_graphics_pipeline(
        &self,
        _cache: vk::PipelineCache,
        _info: &vk::GraphicsPipelineCreateInfo,
    ) -> VkResult<vk::Pipeline> {
        self.create("pipeline")
    }

    unsafe fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        self.release(pipeline, "pipeline")
    }

    unsafe fn create_buffer(&self, info: &vk::BufferCreateInfo) -> VkResult<vk::Buffer> {
        let buffer: vk::Buffer = self.create("buffer")?;
        self.state().buffer_sizes.insert(buffer.as_raw(), info.size);
        Ok(buffer)
    }

    unsafe fn destroy_buffer(&self, buffer: vk::Buffer) {
        self.release(buffer, "buffer")
    }

    unsafe fn buffer_memory_requirements(&self, buffer: vk::Buffer) -> vk::MemoryRequirements {
        let size = self
            .state()
            .buffer_sizes
            .get(&buffer.as_raw())
            .copied()
            .unwrap_or(0);
        vk::MemoryRequirements {
            size,
            alignment: 4,
            memory_type_bits: u32::MAX,
        }
    }

    unsafe fn allocate_memory(&self, info: &vk::MemoryAllocateInfo) -> VkResult<vk::DeviceMemory> {
        let memory: vk::DeviceMemory = self.create("memory")?;
        self.state()
            .memory
            .insert(memory.as_raw(), vec![0; info.allocation_size as usize]);
        Ok(memory)
    }

    unsafe fn free_memory(&self, memory: vk::DeviceMemory) {
        self.release(memory, "memory")
    }

    unsafe fn map_memory(
        &self,
        memory: vk::DeviceMemory,
        size: vk::DeviceSize,
    ) -> VkResult<*mut c_void> {
        self.step()?;
        let mut state = self.state();
        state.mapped.insert(memory.as_raw());
        let bytes = state
            .memory
            .get_mut(&memory.as_raw())
            .ok_or(vk::Result::ERROR_MEMORY_MAP_FAILED)?;
        assert!(size as usize <= bytes.len(), "mapping past the allocation");
        // The Vec's heap block does not move while the map entry lives
        Ok(bytes.as_mut_ptr().cast())
    }

    unsafe fn unmap_memory(&self, memory: vk::DeviceMemory) {
        self.state().mapped.remove(&memory.as_raw());
    }

    unsafe fn flush_memory(&self, _memory: vk::DeviceMemory) -> VkResult<()> {
        self.step()?;
        self.state().flushes += 1;
        Ok(())
    }

    unsafe fn bind_buffer_memory(
        &self,
        _buffer: vk::Buffer,
        _memory: vk::DeviceMemory,
    ) -> VkResult<()> {
        self.step()
    }

    unsafe fn create_command_pool(
        &self,
        _info: &vk::CommandPoolCreateInfo,
    ) -> VkResult<vk::CommandPool> {
        self.create("command pool")
    }

    unsafe fn destroy_command_pool(&self, pool: vk::CommandPool) {
        self.release(pool, "command pool")
    }

    unsafe fn allocate_command_buffers(
        &self,
        info: &vk::CommandBufferAllocateInfo,
    ) -> VkResult<Vec<vk::CommandBuffer>> {
        self.step()?;
        Ok((0..info.command_buffer_count)
            .map(|_| vk::CommandBuffer::from_raw(self.insert("command buffer")))
            .collect())
    }

    unsafe fn free_command_buffers(&self, _pool: vk::CommandPool, buffers: &[vk::CommandBuffer]) {
        for &buffer in buffers {
            self.release(buffer, "command buffer");
        }
    }

    unsafe fn record_draw(&self, cmd: vk::CommandBuffer, draw: &DrawCommands) -> VkResult<()> {
        self.step()?;
        self.state().recorded.push((cmd, *draw));
        Ok(())
    }

    unsafe fn create_semaphore(&self) -> VkResult<vk::Semaphore> {
        self.create("semaphore")
    }

    unsafe fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        self.release(semaphore, "semaphore")
    }

    unsafe fn create_fence(&self) -> VkResult<vk::Fence> {
        self.create("fence")
    }

    unsafe fn destroy_fence(&self, fence: vk::Fence) {
        self.release(fence, "fence")
    }

    unsafe fn reset_fence(&self, _fence: vk::Fence) -> VkResult<()> {
        self.step()
    }

    unsafe fn wait_for_fence(&self, _fence: vk::Fence, _timeout: u64) -> VkResult<()> {
        self.step()
    }

    unsafe fn queue_submit(
        &self,
        command_buffers: &[vk::CommandBuffer],
        _wait: vk::Semaphore,
        _fence: vk::Fence,
    ) -> VkResult<()> {
        self.step()?;
        self.state().submits.push(command_buffers.len());
        Ok(())
    }
}

/// Build with a failure injected at every fallible call in turn.
///
/// `build` must make exactly the same calls on each run. Returns the number
/// of calls a successful build makes.
pub fn fail_at_every_call<T>(
    device: impl Fn() -> FakeDevice,
    build: impl Fn(Arc<FakeDevice>) -> Result<T>,
) -> usize {
    let clean = device().shared();
    let built = build(clean.clone()).expect("build without injected failure");
    drop(built);
    clean.assert_clean();
    let total = clean.calls();

    for call in 0..total {
        let fake = device().failing_at(call).shared();
        assert!(build(fake.clone()).is_err(), "call {} failed but build succeeded", call);
        fake.assert_clean();
    }
    total
}
