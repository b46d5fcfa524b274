// Vertex storage - three vertices in host-visible memory
//
// Buffer and memory are owned together and released together.

use anyhow::{Context, Result};
use ash::vk;
use glam::Vec3;
use std::sync::Arc;

use super::ops::DeviceOps;
use super::DeviceContext;

/// The triangle, in clip space
pub const TRIANGLE: [Vec3; 3] = [
    Vec3::new(-1.0, -1.0, 0.0),
    Vec3::new(1.0, -1.0, 0.0),
    Vec3::new(0.0, 1.0, 0.0),
];

/// Bytes per vertex: three f32 components
pub const VERTEX_STRIDE: u32 = std::mem::size_of::<Vec3>() as u32;

/// Find a memory type allowed by `type_filter` that has all of `properties`
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> Option<u32> {
    (0..memory_properties.memory_type_count).find(|&i| {
        let has_type = (type_filter & (1 << i)) != 0;
        let has_properties = memory_properties.memory_types[i as usize]
            .property_flags
            .contains(properties);
        has_type && has_properties
    })
}

/// Host-visible memory type, preferring coherent memory.
///
/// Returns the index and whether writes need an explicit flush.
pub fn find_host_visible_memory(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
) -> Option<(u32, bool)> {
    let coherent = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
    find_memory_type(memory_properties, type_filter, coherent)
        .map(|index| (index, false))
        .or_else(|| {
            find_memory_type(memory_properties, type_filter, vk::MemoryPropertyFlags::HOST_VISIBLE)
                .map(|index| (index, true))
        })
}

/// Copy vertices into mapped memory. A short copy is an error.
pub fn write_vertices(dst: &mut [u8], vertices: &[Vec3]) -> Result<usize> {
    let src: &[u8] = bytemuck::cast_slice(vertices);
    if dst.len() < src.len() {
        anyhow::bail!(
            "Vertex copy mismatch: {} bytes mapped, {} bytes of vertex data",
            dst.len(),
            src.len()
        );
    }
    dst[..src.len()].copy_from_slice(src);
    Ok(src.len() / std::mem::size_of::<f32>())
}

pub struct VertexBuffer<D: DeviceOps = DeviceContext> {
    pub buffer: vk::Buffer,
    pub memory: vk::DeviceMemory,
    pub vertex_count: u32,
    context: Arc<D>,
}

impl<D: DeviceOps> VertexBuffer<D> {
    pub fn new(context: Arc<D>) -> Result<Self> {
        Self::with_vertices(context, &TRIANGLE)
    }

    pub fn with_vertices(context: Arc<D>, vertices: &[Vec3]) -> Result<Self> {
        let size = std::mem::size_of_val(vertices) as vk::DeviceSize;

        let mut this = Self {
            buffer: vk::Buffer::null(),
            memory: vk::DeviceMemory::null(),
            vertex_count: vertices.len() as u32,
            context: context.clone(),
        };
        let device = &context;

        // Phase 1: buffer object
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(vk::BufferUsageFlags::VERTEX_BUFFER)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        this.buffer = unsafe { device.create_buffer(&buffer_info) }
            .context("vkCreateBuffer failed")?;

        // Phase 2: memory type matching the buffer's requirements
        let requirements = unsafe { device.buffer_memory_requirements(this.buffer) };
        let (memory_type_index, needs_flush) =
            find_host_visible_memory(device.memory_properties(), requirements.memory_type_bits)
                .context("No host-visible memory type for the vertex buffer")?;

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);

        this.memory = unsafe { device.allocate_memory(&alloc_info) }
            .context("vkAllocateMemory failed")?;

        // Phase 3: map, copy, unmap
        unsafe {
            let ptr = device
                .map_memory(this.memory, size)
                .context("vkMapMemory failed")?;
            let mapped = std::slice::from_raw_parts_mut(ptr.cast::<u8>(), size as usize);
            let copied = write_vertices(mapped, vertices);

            if copied.is_ok() && needs_flush {
                if let Err(e) = device.flush_memory(this.memory) {
                    device.unmap_memory(this.memory);
                    return Err(e).context("vkFlushMappedMemoryRanges failed");
                }
            }
            device.unmap_memory(this.memory);
            let floats = copied?;
            log::debug!("Copied {} floats into the vertex buffer", floats);
        }

        // Phase 4: bind
        unsafe { device.bind_buffer_memory(this.buffer, this.memory) }
            .context("vkBindBufferMemory failed")?;

        log::info!("Vertex buffer ready: {} vertices, {} bytes", this.vertex_count, size);
        Ok(this)
    }
}

impl<D: DeviceOps> Drop for VertexBuffer<D> {
    fn drop(&mut self) {
        let device = &self.context;
        unsafe {
            if self.buffer != vk::Buffer::null() {
                device.destroy_buffer(self.buffer);
            }
            if self.memory != vk::DeviceMemory::null() {
                device.free_memory(self.memory);
            }
        }
    }
}
