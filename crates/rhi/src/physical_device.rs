//! Physical device (GPU) selection.
//!
//! The selection process:
//! 1. Enumerate all available GPUs
//! 2. Keep those with a graphics queue, a present queue and the swapchain extension
//! 3. Rank the survivors, preferring discrete GPUs
//!
//! No devices at all is [`RhiError::NoSuitablePhysicalDevice`]; devices that
//! all lack a usable queue family is [`RhiError::NoSuitableQueueFamily`].

use std::ffi::CStr;

use ash::vk;
use tracing::{debug, info, warn};

use crate::error::{RhiError, RhiResult};

/// Sample counts in descending order.
const SAMPLE_COUNTS: [vk::SampleCountFlags; 7] = [
    vk::SampleCountFlags::TYPE_64,
    vk::SampleCountFlags::TYPE_32,
    vk::SampleCountFlags::TYPE_16,
    vk::SampleCountFlags::TYPE_8,
    vk::SampleCountFlags::TYPE_4,
    vk::SampleCountFlags::TYPE_2,
    vk::SampleCountFlags::TYPE_1,
];

/// Queue family indices for the device.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics_family: Option<u32>,
    pub present_family: Option<u32>,
}

impl QueueFamilyIndices {
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.graphics_family.is_some() && self.present_family.is_some()
    }

    /// Returns the distinct family indices, graphics first.
    pub fn unique_families(&self) -> Vec<u32> {
        let mut families = Vec::with_capacity(2);
        if let Some(graphics) = self.graphics_family {
            families.push(graphics);
        }
        if let Some(present) = self.present_family
            && !families.contains(&present)
        {
            families.push(present);
        }
        families
    }
}

/// A physical device that passed selection, with everything queried about it.
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    pub device: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub features: vk::PhysicalDeviceFeatures,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub queue_families: QueueFamilyIndices,
}

impl PhysicalDeviceInfo {
    pub fn device_name(&self) -> &str {
        unsafe {
            CStr::from_ptr(self.properties.device_name.as_ptr())
                .to_str()
                .unwrap_or("Unknown Device")
        }
    }

    pub fn device_type_name(&self) -> &'static str {
        match self.properties.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => "Discrete GPU",
            vk::PhysicalDeviceType::INTEGRATED_GPU => "Integrated GPU",
            vk::PhysicalDeviceType::VIRTUAL_GPU => "Virtual GPU",
            vk::PhysicalDeviceType::CPU => "CPU",
            _ => "Other",
        }
    }

    pub fn api_version(&self) -> (u32, u32, u32) {
        let version = self.properties.api_version;
        (
            vk::api_version_major(version),
            vk::api_version_minor(version),
            vk::api_version_patch(version),
        )
    }

    pub fn device_local_memory(&self) -> u64 {
        self.memory_properties
            .memory_heaps
            .iter()
            .take(self.memory_properties.memory_heap_count as usize)
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size)
            .sum()
    }

    /// Sample counts usable for a framebuffer with both a color and a depth
    /// attachment.
    pub fn framebuffer_sample_counts(&self) -> vk::SampleCountFlags {
        let limits = &self.properties.limits;
        limits.framebuffer_color_sample_counts & limits.framebuffer_depth_sample_counts
    }

    /// Logs the device identity and its supported sample counts.
    pub fn log_diagnostics(&self) {
        let (major, minor, patch) = self.api_version();
        let limits = &self.properties.limits;
        info!(
            "GPU '{}' ({}), Vulkan {}.{}.{}, {} MiB device-local",
            self.device_name(),
            self.device_type_name(),
            major,
            minor,
            patch,
            self.device_local_memory() / (1024 * 1024)
        );
        info!(
            "Framebuffer sample counts: color {:?}, depth {:?}",
            sample_count_list(limits.framebuffer_color_sample_counts),
            sample_count_list(limits.framebuffer_depth_sample_counts)
        );
    }
}

impl std::fmt::Debug for PhysicalDeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (major, minor, patch) = self.api_version();
        f.debug_struct("PhysicalDeviceInfo")
            .field("name", &self.device_name())
            .field("type", &self.device_type_name())
            .field("api_version", &format!("{major}.{minor}.{patch}"))
            .field("queue_families", &self.queue_families)
            .finish()
    }
}

/// Converts a numeric sample count into its flag. Non-power-of-two values
/// round down; zero becomes a single sample.
pub fn sample_count_flags(samples: u32) -> vk::SampleCountFlags {
    match samples {
        0 | 1 => vk::SampleCountFlags::TYPE_1,
        2..=3 => vk::SampleCountFlags::TYPE_2,
        4..=7 => vk::SampleCountFlags::TYPE_4,
        8..=15 => vk::SampleCountFlags::TYPE_8,
        16..=31 => vk::SampleCountFlags::TYPE_16,
        32..=63 => vk::SampleCountFlags::TYPE_32,
        _ => vk::SampleCountFlags::TYPE_64,
    }
}

/// Numeric value of a single sample-count flag.
pub fn sample_count_value(flags: vk::SampleCountFlags) -> u32 {
    flags.as_raw().max(1)
}

/// Picks the highest supported count not above `requested`.
pub fn clamp_sample_count(requested: u32, supported: vk::SampleCountFlags) -> vk::SampleCountFlags {
    let requested = sample_count_flags(requested);
    SAMPLE_COUNTS
        .iter()
        .copied()
        .filter(|count| count.as_raw() <= requested.as_raw())
        .find(|count| supported.contains(*count))
        .unwrap_or(vk::SampleCountFlags::TYPE_1)
}

fn sample_count_list(flags: vk::SampleCountFlags) -> Vec<u32> {
    SAMPLE_COUNTS
        .iter()
        .rev()
        .filter(|count| flags.contains(**count))
        .map(|count| count.as_raw())
        .collect()
}

/// Selects the best physical device that can render to `surface`.
pub fn select_physical_device(
    instance: &ash::Instance,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> RhiResult<PhysicalDeviceInfo> {
    let devices = unsafe { instance.enumerate_physical_devices() }
        .map_err(|e| RhiError::DeviceCreationFailed(format!("device enumeration: {e}")))?;

    if devices.is_empty() {
        warn!("No Vulkan-capable GPUs found");
        return Err(RhiError::NoSuitablePhysicalDevice);
    }

    info!("Found {} GPU(s)", devices.len());

    let mut candidates: Vec<(PhysicalDeviceInfo, u32)> = devices
        .into_iter()
        .filter_map(|device| check_device_suitability(instance, device, surface, surface_loader))
        .map(|info| {
            let score = rate_device(&info);
            debug!(
                "GPU '{}' ({}) - Score: {}",
                info.device_name(),
                info.device_type_name(),
                score
            );
            (info, score)
        })
        .collect();

    if candidates.is_empty() {
        warn!("No GPU exposes a graphics and a present queue");
        return Err(RhiError::NoSuitableQueueFamily);
    }

    candidates.sort_by(|a, b| b.1.cmp(&a.1));
    let (selected, score) = candidates.swap_remove(0);
    info!(
        "Selected GPU: '{}' ({}) - Score: {}",
        selected.device_name(),
        selected.device_type_name(),
        score
    );

    Ok(selected)
}

fn check_device_suitability(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> Option<PhysicalDeviceInfo> {
    let properties = unsafe { instance.get_physical_device_properties(device) };
    let features = unsafe { instance.get_physical_device_features(device) };
    let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };

    let device_name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }
        .to_str()
        .unwrap_or("Unknown");

    let queue_families = find_queue_families(instance, device, surface, surface_loader);
    if !queue_families.is_complete() {
        debug!(
            "GPU '{}' skipped: missing queue families (graphics={}, present={})",
            device_name,
            queue_families.graphics_family.is_some(),
            queue_families.present_family.is_some()
        );
        return None;
    }

    if !supports_swapchain(instance, device) {
        debug!("GPU '{}' skipped: VK_KHR_swapchain not supported", device_name);
        return None;
    }

    Some(PhysicalDeviceInfo {
        device,
        properties,
        features,
        memory_properties,
        queue_families,
    })
}

fn supports_swapchain(instance: &ash::Instance, device: vk::PhysicalDevice) -> bool {
    let Ok(extensions) = (unsafe { instance.enumerate_device_extension_properties(device) }) else {
        return false;
    };
    extensions.iter().any(|ext| {
        let name = unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) };
        name == ash::khr::swapchain::NAME
    })
}

fn find_queue_families(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> QueueFamilyIndices {
    let families = unsafe { instance.get_physical_device_queue_family_properties(device) };
    let present_support: Vec<bool> = (0..families.len() as u32)
        .map(|index| unsafe {
            surface_loader
                .get_physical_device_surface_support(device, index, surface)
                .unwrap_or(false)
        })
        .collect();

    pick_queue_families(&families, &present_support)
}

/// Prefers one family doing both graphics and present; otherwise takes the
/// first of each.
fn pick_queue_families(
    families: &[vk::QueueFamilyProperties],
    present_support: &[bool],
) -> QueueFamilyIndices {
    let usable = |index: usize| families[index].queue_count > 0;
    let graphics = |index: usize| {
        usable(index) && families[index].queue_flags.contains(vk::QueueFlags::GRAPHICS)
    };
    let present = |index: usize| usable(index) && present_support.get(index).copied().unwrap_or(false);

    if let Some(both) = (0..families.len()).find(|&i| graphics(i) && present(i)) {
        return QueueFamilyIndices {
            graphics_family: Some(both as u32),
            present_family: Some(both as u32),
        };
    }

    QueueFamilyIndices {
        graphics_family: (0..families.len()).find(|&i| graphics(i)).map(|i| i as u32),
        present_family: (0..families.len()).find(|&i| present(i)).map(|i| i as u32),
    }
}

fn rate_device(info: &PhysicalDeviceInfo) -> u32 {
    let mut score = match info.properties.device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 10000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 1000,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 100,
        vk::PhysicalDeviceType::CPU => 10,
        _ => 1,
    };

    score += info.properties.limits.max_image_dimension2_d;

    let vram_mb = (info.device_local_memory() / (1024 * 1024)) as u32;
    score += vram_mb.min(16000);

    // A shared graphics/present family avoids concurrent sharing on the swapchain.
    if info.queue_families.graphics_family == info.queue_families.present_family {
        score += 100;
    }

    score
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags, count: u32) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: count,
            ..Default::default()
        }
    }

    #[test]
    fn test_queue_family_indices_default() {
        let indices = QueueFamilyIndices::default();
        assert!(indices.graphics_family.is_none());
        assert!(indices.present_family.is_none());
        assert!(!indices.is_complete());
    }

    #[test]
    fn test_unique_families() {
        let shared = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(0),
        };
        assert_eq!(shared.unique_families(), vec![0]);

        let split = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(2),
        };
        assert_eq!(split.unique_families(), vec![0, 2]);
    }

    #[test]
    fn test_pick_prefers_shared_family() {
        let families = [
            family(vk::QueueFlags::GRAPHICS, 1),
            family(vk::QueueFlags::TRANSFER, 1),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE, 1),
        ];
        let indices = pick_queue_families(&families, &[false, true, true]);
        assert_eq!(indices.graphics_family, Some(2));
        assert_eq!(indices.present_family, Some(2));
    }

    #[test]
    fn test_pick_split_families() {
        let families = [
            family(vk::QueueFlags::GRAPHICS, 1),
            family(vk::QueueFlags::TRANSFER, 1),
        ];
        let indices = pick_queue_families(&families, &[false, true]);
        assert_eq!(indices.graphics_family, Some(0));
        assert_eq!(indices.present_family, Some(1));
    }

    #[test]
    fn test_pick_skips_empty_families() {
        let families = [family(vk::QueueFlags::GRAPHICS, 0)];
        let indices = pick_queue_families(&families, &[true]);
        assert!(!indices.is_complete());
    }

    #[test]
    fn test_sample_count_flags() {
        assert_eq!(sample_count_flags(0), vk::SampleCountFlags::TYPE_1);
        assert_eq!(sample_count_flags(4), vk::SampleCountFlags::TYPE_4);
        assert_eq!(sample_count_flags(6), vk::SampleCountFlags::TYPE_4);
        assert_eq!(sample_count_value(vk::SampleCountFlags::TYPE_8), 8);
    }

    #[test]
    fn test_clamp_sample_count_to_supported() {
        let supported = vk::SampleCountFlags::TYPE_1
            | vk::SampleCountFlags::TYPE_2
            | vk::SampleCountFlags::TYPE_4;
        assert_eq!(clamp_sample_count(8, supported), vk::SampleCountFlags::TYPE_4);
        assert_eq!(clamp_sample_count(2, supported), vk::SampleCountFlags::TYPE_2);
        assert_eq!(
            clamp_sample_count(4, vk::SampleCountFlags::empty()),
            vk::SampleCountFlags::TYPE_1
        );
    }

    #[test]
    fn test_sample_count_list_ascending() {
        let flags = vk::SampleCountFlags::TYPE_8 | vk::SampleCountFlags::TYPE_1;
        assert_eq!(sample_count_list(flags), vec![1, 8]);
    }
}
