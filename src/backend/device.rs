// Device Context - instance, surface, adapter list, logical device, queue
//
// Creation order: instance -> debug messenger -> surface -> device.
// Destruction runs in exactly the reverse order, both on Drop and when a
// step fails halfway through `new`.

use anyhow::{Context, Result};
use ash::{vk, Entry};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::ffi::{c_char, CStr, CString};
use std::sync::Arc;

use super::cleanup::CleanupStack;
use super::ops::DeviceOps;
use super::surface;
use crate::config::{Config, DebugConfig};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";
const ENGINE_NAME: &CStr = c"vkdraw";

/// Extensions and layers to enable on the instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstancePlan {
    pub extensions: Vec<&'static CStr>,
    pub layers: Vec<&'static CStr>,
    pub debug_messenger: bool,
}

/// Decide what to enable given what the loader reports as available.
///
/// Surface extensions are always requested (creation fails loudly if they
/// are missing). Debug extras are requested only when configured AND present.
pub fn plan_instance(
    available_extensions: &[String],
    available_layers: &[String],
    debug: &DebugConfig,
) -> InstancePlan {
    let mut extensions = surface::required_extensions();
    let mut layers = Vec::new();
    let mut debug_messenger = false;

    let has = |list: &[String], name: &CStr| list.iter().any(|s| s.as_bytes() == name.to_bytes());

    if debug.debug_messenger {
        let name = ash::extensions::ext::DebugUtils::name();
        if has(available_extensions, name) {
            extensions.push(name);
            debug_messenger = true;
        } else {
            log::warn!("Debug messenger requested but {:?} is not available", name);
        }
    }

    if debug.validation_layers {
        if has(available_layers, VALIDATION_LAYER) {
            layers.push(VALIDATION_LAYER);
        } else {
            log::warn!("Validation requested but {:?} is not packaged", VALIDATION_LAYER);
        }
    }

    InstancePlan {
        extensions,
        layers,
        debug_messenger,
    }
}

/// First queue family with graphics support that can present to the surface
pub fn pick_queue_family(
    families: &[vk::QueueFamilyProperties],
    mut supports_present: impl FnMut(u32) -> bool,
) -> Option<u32> {
    families
        .iter()
        .enumerate()
        .filter(|(_, props)| props.queue_count > 0)
        .filter(|(_, props)| props.queue_flags.contains(vk::QueueFlags::GRAPHICS))
        .map(|(i, _)| i as u32)
        .find(|&i| supports_present(i))
}

/// Vulkan device context with automatic cleanup
pub struct DeviceContext {
    pub device: ash::Device,
    pub queue: vk::Queue,
    pub queue_family: u32,

    pub physical_device: vk::PhysicalDevice,
    pub physical_devices: Vec<vk::PhysicalDevice>,
    pub properties: vk::PhysicalDeviceProperties,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,

    pub surface: vk::SurfaceKHR,
    pub surface_loader: ash::extensions::khr::Surface,
    pub swapchain_loader: ash::extensions::khr::Swapchain,

    debug_utils: Option<(ash::extensions::ext::DebugUtils, vk::DebugUtilsMessengerEXT)>,
    pub instance: ash::Instance,
    _entry: Entry,
}

impl DeviceContext {
    /// Create the device context for `window`
    ///
    /// Any failing step releases what was created before it; no partial
    /// context is ever returned.
    pub fn new<W>(config: &Config, window: &W) -> Result<Arc<Self>>
    where
        W: HasWindowHandle + HasDisplayHandle + ?Sized,
    {
        log::info!("Creating Vulkan device context: {}", config.app.name);

        let entry = unsafe { Entry::load() }
            .context("Failed to load Vulkan library. Is a Vulkan driver installed?")?;

        let available_extensions = entry
            .enumerate_instance_extension_properties(None)
            .context("vkEnumerateInstanceExtensionProperties failed")?
            .iter()
            .map(|ext| c_name(&ext.extension_name))
            .collect::<Vec<_>>();
        let available_layers = entry
            .enumerate_instance_layer_properties()
            .context("vkEnumerateInstanceLayerProperties failed")?
            .iter()
            .map(|layer| c_name(&layer.layer_name))
            .collect::<Vec<_>>();
        log::info!("Instance extensions: {:?}", available_extensions);
        log::debug!("Instance layers: {:?}", available_layers);

        let plan = plan_instance(&available_extensions, &available_layers, &config.debug);
        let mut cleanup = CleanupStack::new();

        // Step 1: instance
        let instance = Self::create_instance(&entry, config, &plan)?;
        {
            let instance = instance.clone();
            cleanup.push("instance", move || unsafe { instance.destroy_instance(None) });
        }

        // Step 2: optional debug messenger, never fatal
        let debug_utils = if plan.debug_messenger {
            match Self::setup_debug_messenger(&entry, &instance) {
                Ok((utils, messenger)) => {
                    let loader = utils.clone();
                    cleanup.push("debug messenger", move || unsafe {
                        loader.destroy_debug_utils_messenger(messenger, None)
                    });
                    Some((utils, messenger))
                }
                Err(e) => {
                    log::warn!("{:#}", e);
                    None
                }
            }
        } else {
            None
        };

        // Step 3: surface on the native window
        let surface_loader = ash::extensions::khr::Surface::new(&entry, &instance);
        let surface = unsafe { surface::create_surface(&entry, &instance, window) }?;
        {
            let loader = surface_loader.clone();
            cleanup.push("surface", move || unsafe { loader.destroy_surface(surface, None) });
        }

        // Step 4: adapters
        let physical_devices = unsafe { instance.enumerate_physical_devices() }
            .context("vkEnumeratePhysicalDevices failed")?;
        if physical_devices.is_empty() {
            anyhow::bail!("No GPUs found on the system");
        }
        let physical_device = *physical_devices
            .get(config.graphics.adapter_index)
            .with_context(|| {
                format!(
                    "Adapter #{} requested but only {} found",
                    config.graphics.adapter_index,
                    physical_devices.len()
                )
            })?;

        match unsafe { instance.enumerate_device_extension_properties(physical_device) } {
            Ok(extensions) => log::info!(
                "Device extensions: {:?}",
                extensions
                    .iter()
                    .map(|ext| c_name(&ext.extension_name))
                    .collect::<Vec<_>>()
            ),
            Err(e) => log::warn!("vkEnumerateDeviceExtensionProperties failed: {}", e),
        }

        let families =
            unsafe { instance.get_physical_device_queue_family_properties(physical_device) };
        let queue_family = pick_queue_family(&families, |index| unsafe {
            surface_loader
                .get_physical_device_surface_support(physical_device, index, surface)
                .unwrap_or(false)
        })
        .context("No queue family supports both graphics and presentation")?;

        // Step 5: logical device with a single queue
        let device = Self::create_logical_device(&instance, physical_device, queue_family)?;
        {
            let device = device.clone();
            cleanup.push("device", move || unsafe { device.destroy_device(None) });
        }
        let queue = unsafe { device.get_device_queue(queue_family, 0) };
        let swapchain_loader = ash::extensions::khr::Swapchain::new(&instance, &device);

        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let memory_properties =
            unsafe { instance.get_physical_device_memory_properties(physical_device) };

        log::info!(
            "Selected GPU #{}: {}",
            config.graphics.adapter_index,
            c_name(&properties.device_name)
        );

        cleanup.disarm();

        Ok(Arc::new(Self {
            device,
            queue,
            queue_family,
            physical_device,
            physical_devices,
            properties,
            memory_properties,
            surface,
            surface_loader,
            swapchain_loader,
            debug_utils,
            instance,
            _entry: entry,
        }))
    }

    fn create_instance(
        entry: &Entry,
        config: &Config,
        plan: &InstancePlan,
    ) -> Result<ash::Instance> {
        let app_name = CString::new(config.app.name.as_str())
            .context("Application name contains a NUL byte")?;
        let [major, minor, patch] = config.app.version;

        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, major, minor, patch))
            .engine_name(ENGINE_NAME)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_0);

        let extensions = plan.extensions.iter().map(|e| e.as_ptr()).collect::<Vec<_>>();
        let layers = plan.layers.iter().map(|l| l.as_ptr()).collect::<Vec<_>>();

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);

        unsafe { entry.create_instance(&create_info, None) }.context("vkCreateInstance failed")
    }

    fn setup_debug_messenger(
        entry: &Entry,
        instance: &ash::Instance,
    ) -> Result<(ash::extensions::ext::DebugUtils, vk::DebugUtilsMessengerEXT)> {
        let debug_utils = ash::extensions::ext::DebugUtils::new(entry, instance);

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }
            .context("vkCreateDebugUtilsMessengerEXT failed")?;

        Ok((debug_utils, messenger))
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        queue_family: u32,
    ) -> Result<ash::Device> {
        let queue_priorities = [1.0];
        let queue_create_info = vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(queue_family)
            .queue_priorities(&queue_priorities)
            .build();

        let extensions = [ash::extensions::khr::Swapchain::name().as_ptr()];

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(std::slice::from_ref(&queue_create_info))
            .enabled_extension_names(&extensions);

        unsafe { instance.create_device(physical_device, &create_info, None) }
            .context("vkCreateDevice failed")
    }

    pub fn adapter_name(&self) -> String {
        c_name(&self.properties.device_name)
    }

}

impl Drop for DeviceContext {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan device context...");

        if let Err(e) = self.wait_idle() {
            log::warn!("{:#}", e);
        }

        unsafe {
            self.device.destroy_device(None);
            self.surface_loader.destroy_surface(self.surface, None);
            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// Fixed-size, NUL-terminated driver string to an owned String
pub(crate) fn c_name(raw: &[c_char]) -> String {
    let bytes = raw
        .iter()
        .take_while(|&&c| c != 0)
        .map(|&c| c as u8)
        .collect::<Vec<_>>();
    String::from_utf8_lossy(&bytes).into_owned()
}

// Forwards driver messages into the log facade
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() || (*p_callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*p_callback_data).p_message);

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[Vulkan] {}", message.to_string_lossy());
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[Vulkan] {}", message.to_string_lossy());
        }
        _ => {
            log::debug!("[Vulkan] {}", message.to_string_lossy());
        }
    }

    vk::FALSE
}
