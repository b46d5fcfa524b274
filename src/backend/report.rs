// Human-readable adapter and surface report
//
// Presentation only: nothing in the render path depends on these values.

use anyhow::Result;
use ash::vk;
use std::fmt;

use super::device::c_name;
use super::ops::DeviceOps;
use super::DeviceContext;

pub fn device_type_name(device_type: vk::PhysicalDeviceType) -> &'static str {
    match device_type {
        vk::PhysicalDeviceType::INTEGRATED_GPU => "Integrated GPU",
        vk::PhysicalDeviceType::DISCRETE_GPU => "Discrete GPU",
        vk::PhysicalDeviceType::VIRTUAL_GPU => "Virtual GPU",
        vk::PhysicalDeviceType::CPU => "CPU",
        vk::PhysicalDeviceType::OTHER => "Other",
        _ => "Unknown",
    }
}

/// "major.minor.patch" from a packed Vulkan version
pub fn format_version(version: u32) -> String {
    format!(
        "{}.{}.{}",
        vk::api_version_major(version),
        vk::api_version_minor(version),
        vk::api_version_patch(version)
    )
}

#[derive(Debug, Clone)]
pub struct DeviceReport {
    pub device_name: String,
    pub vendor_id: u32,
    pub device_type: vk::PhysicalDeviceType,
    pub adapter_count: usize,
    pub api_version: u32,
    pub driver_version: u32,
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub format_count: usize,
}

impl DeviceReport {
    pub fn query(context: &DeviceContext) -> Result<Self> {
        let properties = &context.properties;
        Ok(Self {
            device_name: c_name(&properties.device_name),
            vendor_id: properties.vendor_id,
            device_type: properties.device_type,
            adapter_count: context.physical_devices.len(),
            api_version: properties.api_version,
            driver_version: properties.driver_version,
            capabilities: context.surface_capabilities()?,
            format_count: context.surface_formats()?.len(),
        })
    }

    fn rows(&self) -> Vec<Option<(&'static str, String)>> {
        let caps = &self.capabilities;
        let mut rows = vec![
            Some(("Physical Device Name", self.device_name.clone())),
            Some(("Physical Device Vendor", format!("{:x}", self.vendor_id))),
        ];
        if self.device_type != vk::PhysicalDeviceType::OTHER {
            rows.push(Some((
                "Physical Device Type",
                device_type_name(self.device_type).to_string(),
            )));
        }
        rows.extend([
            Some(("Physical GPUs", self.adapter_count.to_string())),
            Some(("API Version", format_version(self.api_version))),
            Some(("Driver Version", format_version(self.driver_version))),
            None,
            Some((
                "Image count",
                format!("{} - {}", caps.min_image_count, caps.max_image_count),
            )),
            Some(("Array layers", caps.max_image_array_layers.to_string())),
            Some((
                "Image size (current)",
                format!("{}x{}", caps.current_extent.width, caps.current_extent.height),
            )),
            Some((
                "Image size (extent)",
                format!(
                    "{}x{} - {}x{}",
                    caps.min_image_extent.width,
                    caps.min_image_extent.height,
                    caps.max_image_extent.width,
                    caps.max_image_extent.height
                ),
            )),
            Some(("Usage flags", format!("{:02x}", caps.supported_usage_flags.as_raw()))),
            Some(("Current transform", format!("{:02x}", caps.current_transform.as_raw()))),
            Some(("Allowed transforms", format!("{:02x}", caps.supported_transforms.as_raw()))),
            None,
            Some(("Surface formats", self.format_count.to_string())),
        ]);
        rows
    }
}

impl fmt::Display for DeviceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const TITLE: &str = "VULKAN PROPERTIES AND SURFACE CAPABILITIES";

        let rows = self.rows();
        let key_width = rows.iter().flatten().map(|(k, _)| k.len()).max().unwrap_or(0);
        let value_width = rows.iter().flatten().map(|(_, v)| v.chars().count()).max().unwrap_or(0);
        // "│ key │ value │"
        let inner = (key_width + value_width + 3).max(TITLE.len());
        let value_width = inner - key_width - 3;

        writeln!(f, "┌{}┐", "─".repeat(inner + 2))?;
        writeln!(f, "│ {:^inner$} │", TITLE)?;
        writeln!(f, "├{}┬{}┤", "─".repeat(key_width + 2), "─".repeat(value_width + 2))?;
        for row in &rows {
            match row {
                Some((key, value)) => {
                    writeln!(f, "│ {:<key_width$} │ {:<value_width$} │", key, value)?
                }
                None => writeln!(
                    f,
                    "├{}┼{}┤",
                    "─".repeat(key_width + 2),
                    "─".repeat(value_width + 2)
                )?,
            }
        }
        write!(f, "└{}┴{}┘", "─".repeat(key_width + 2), "─".repeat(value_width + 2))
    }
}
