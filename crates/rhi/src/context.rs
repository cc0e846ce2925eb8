//! Graphics context setup.
//!
//! Instance creation, physical device selection and logical device creation
//! are plain functions over explicit parameters. [`GraphicsContext`] bundles
//! the result of the last two for a given surface.

use std::ffi::{CStr, c_char};
use std::sync::Arc;

use ash::vk;
use tracing::info;

use crate::device::Device;
use crate::error::RhiResult;
use crate::instance::Instance;
use crate::physical_device::{self, PhysicalDeviceInfo};

/// Parameters for [`create_instance`].
#[derive(Debug, Clone, Copy)]
pub struct InstanceDesc<'a> {
    pub app_name: &'a CStr,
    pub enable_validation: bool,
    /// Surface extensions required by the windowing system.
    pub window_extensions: &'a [*const c_char],
}

/// Creates the Vulkan instance.
pub fn create_instance(desc: &InstanceDesc<'_>) -> RhiResult<Instance> {
    Instance::new(desc.app_name, desc.enable_validation, desc.window_extensions)
}

/// Picks the GPU that will render to `surface`.
pub fn select_physical_device(
    instance: &Instance,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> RhiResult<PhysicalDeviceInfo> {
    physical_device::select_physical_device(instance.handle(), surface, surface_loader)
}

/// Creates the logical device and its allocator.
///
/// # Errors
///
/// [`crate::RhiError::DeviceCreationFailed`] if the device or the allocator cannot
/// be created.
pub fn create_device(instance: &Instance, info: &PhysicalDeviceInfo) -> RhiResult<Arc<Device>> {
    Device::new(instance, info)
}

/// The selected GPU and the logical device created on it.
pub struct GraphicsContext {
    device: Arc<Device>,
    physical: PhysicalDeviceInfo,
}

impl GraphicsContext {
    /// Selects a GPU for `surface`, logs its capabilities and creates the
    /// logical device.
    pub fn new(
        instance: &Instance,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> RhiResult<Self> {
        let physical = select_physical_device(instance, surface, surface_loader)?;
        physical.log_diagnostics();
        let device = create_device(instance, &physical)?;
        info!("Graphics context ready on '{}'", physical.device_name());
        Ok(Self { device, physical })
    }

    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    #[inline]
    pub fn physical(&self) -> &PhysicalDeviceInfo {
        &self.physical
    }
}
