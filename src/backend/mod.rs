// Backend module - Vulkan objects for the triangle demo
//
// Each component owns its driver handles and releases them on Drop.
// Components past the Device Context reach the driver through `DeviceOps`.
// Dependency chain (create top to bottom, destroy bottom to top):
//   DeviceContext -> Swapchain -> RenderPass -> RenderTargets
//   -> Pipeline -> VertexBuffer -> FrameDriver

pub mod buffer;
pub mod cleanup;
pub mod device;
#[cfg(test)]
pub mod fake;
pub mod frame;
pub mod ops;
pub mod pipeline;
pub mod report;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;
pub mod targets;

pub use buffer::VertexBuffer;
pub use device::DeviceContext;
pub use frame::{FrameDriver, RenderPass};
pub use ops::DeviceOps;
pub use pipeline::Pipeline;
pub use report::DeviceReport;
pub use swapchain::Swapchain;
pub use targets::RenderTargets;
