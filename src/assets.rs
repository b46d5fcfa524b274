// Asset loading
//
// Shaders and config.toml are addressed by logical paths such as
// "shaders/tri-vert.spv". On Android they live in the APK's assets/
// directory, on desktop in a plain directory on disk.

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Read-only source of named byte blobs
pub trait AssetSource {
    fn read(&self, path: &str) -> Result<Vec<u8>>;

    fn exists(&self, path: &str) -> bool {
        self.read(path).is_ok()
    }
}

/// Assets rooted in a directory on disk
#[derive(Debug, Clone)]
pub struct DirAssets {
    root: PathBuf,
}

impl DirAssets {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl AssetSource for DirAssets {
    fn read(&self, path: &str) -> Result<Vec<u8>> {
        let full = self.root.join(path);
        std::fs::read(&full)
            .with_context(|| format!("asset {} not found (looked in {:?})", path, full))
    }

    fn exists(&self, path: &str) -> bool {
        self.root.join(path).is_file()
    }
}

/// Assets packaged into the APK
#[cfg(target_os = "android")]
pub struct AndroidAssets {
    app: winit::platform::android::activity::AndroidApp,
}

#[cfg(target_os = "android")]
impl AndroidAssets {
    pub fn new(app: winit::platform::android::activity::AndroidApp) -> Self {
        Self { app }
    }
}

#[cfg(target_os = "android")]
fn asset_name(path: &str) -> Result<std::ffi::CString> {
    std::ffi::CString::new(path)
        .with_context(|| format!("asset path {:?} contains a NUL byte", path))
}

#[cfg(target_os = "android")]
impl AssetSource for AndroidAssets {
    fn read(&self, path: &str) -> Result<Vec<u8>> {
        use std::io::Read;

        let name = asset_name(path)?;
        let mut asset = self
            .app
            .asset_manager()
            .open(&name)
            .with_context(|| format!("asset {} not found", path))?;
        let mut bytes = Vec::new();
        asset
            .read_to_end(&mut bytes)
            .with_context(|| format!("failed to read asset {}", path))?;
        Ok(bytes)
    }

    fn exists(&self, path: &str) -> bool {
        asset_name(path)
            .map(|name| self.app.asset_manager().open(&name).is_some())
            .unwrap_or(false)
    }
}

/// In-memory assets for tests
#[cfg(test)]
#[derive(Debug, Default, Clone)]
pub struct MemoryAssets {
    files: std::collections::HashMap<String, Vec<u8>>,
}

#[cfg(test)]
impl MemoryAssets {
    pub fn with(mut self, path: &str, bytes: &[u8]) -> Self {
        self.files.insert(path.to_string(), bytes.to_vec());
        self
    }
}

#[cfg(test)]
impl AssetSource for MemoryAssets {
    fn read(&self, path: &str) -> Result<Vec<u8>> {
        self.files
            .get(path)
            .cloned()
            .with_context(|| format!("asset {} not found", path))
    }
}
