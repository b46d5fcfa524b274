// Shader module loading
//
// Vulkan consumes SPIR-V words. Blobs come from the asset loader, so the
// byte buffer has no alignment guarantee; read_spv copies into u32s.

use anyhow::{Context, Result};
use ash::vk;
use std::io::Cursor;
use std::sync::Arc;

use super::ops::DeviceOps;
use super::DeviceContext;
use crate::assets::AssetSource;

/// Decode a SPIR-V blob into words (checks size and magic number)
pub fn decode_spirv(bytes: &[u8]) -> Result<Vec<u32>> {
    ash::util::read_spv(&mut Cursor::new(bytes)).context("Invalid SPIR-V")
}

/// Transient shader module, destroyed when dropped
pub struct ShaderModule<D: DeviceOps = DeviceContext> {
    pub module: vk::ShaderModule,
    context: Arc<D>,
}

impl<D: DeviceOps> ShaderModule<D> {
    pub fn from_spirv(context: Arc<D>, bytes: &[u8]) -> Result<Self> {
        let code = decode_spirv(bytes)?;
        let create_info = vk::ShaderModuleCreateInfo::builder().code(&code);

        let module = unsafe { context.create_shader_module(&create_info) }
            .context("vkCreateShaderModule failed")?;

        Ok(Self { module, context })
    }

    /// Load a compiled shader by logical asset path, e.g. "shaders/tri-vert.spv"
    pub fn load(context: Arc<D>, assets: &dyn AssetSource, path: &str) -> Result<Self> {
        let bytes = assets.read(path)?;
        Self::from_spirv(context, &bytes).with_context(|| format!("shader {}", path))
    }
}

impl<D: DeviceOps> Drop for ShaderModule<D> {
    fn drop(&mut self) {
        unsafe {
            self.context.destroy_shader_module(self.module);
        }
    }
}
