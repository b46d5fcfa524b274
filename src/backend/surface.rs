// Surface - binding between the Vulkan instance and a native window
//
// Android is the primary target (ANativeWindow). Win32 is kept for desktop
// bring-up; other window systems are rejected.

use anyhow::{Context, Result};
use ash::{vk, Entry};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawWindowHandle};
use std::ffi::CStr;

/// Instance extensions needed to create a surface on this platform
pub fn required_extensions() -> Vec<&'static CStr> {
    let mut extensions = vec![ash::extensions::khr::Surface::name()];

    #[cfg(target_os = "android")]
    extensions.push(ash::extensions::khr::AndroidSurface::name());

    #[cfg(target_os = "windows")]
    extensions.push(ash::extensions::khr::Win32Surface::name());

    extensions
}

/// Create a surface for `window`
///
/// # Safety
/// The native window must outlive the returned surface.
pub unsafe fn create_surface<W>(
    entry: &Entry,
    instance: &ash::Instance,
    window: &W,
) -> Result<vk::SurfaceKHR>
where
    W: HasWindowHandle + HasDisplayHandle + ?Sized,
{
    let window_handle = window
        .window_handle()
        .context("Failed to get window handle")?
        .as_raw();
    // Validates that the display is still alive
    let _display_handle = window
        .display_handle()
        .context("Failed to get display handle")?
        .as_raw();

    match window_handle {
        #[cfg(target_os = "android")]
        RawWindowHandle::AndroidNdk(handle) => {
            let create_info = vk::AndroidSurfaceCreateInfoKHR::builder()
                .window(handle.a_native_window.as_ptr() as *mut vk::ANativeWindow);
            let loader = ash::extensions::khr::AndroidSurface::new(entry, instance);
            loader
                .create_android_surface(&create_info, None)
                .context("vkCreateAndroidSurfaceKHR failed")
        }

        #[cfg(target_os = "windows")]
        RawWindowHandle::Win32(handle) => {
            let hinstance =
                handle.hinstance.map(|h| h.get()).unwrap_or(0) as *const std::ffi::c_void;
            let hwnd = handle.hwnd.get() as *const std::ffi::c_void;
            let create_info = vk::Win32SurfaceCreateInfoKHR::builder()
                .hinstance(hinstance)
                .hwnd(hwnd);
            let loader = ash::extensions::khr::Win32Surface::new(entry, instance);
            loader
                .create_win32_surface(&create_info, None)
                .context("vkCreateWin32SurfaceKHR failed")
        }

        other => {
            let _ = (entry, instance);
            anyhow::bail!("Unsupported window handle: {:?}", other)
        }
    }
}
