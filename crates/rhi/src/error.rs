//! RHI-specific error types.

use std::fmt;

use ash::vk;
use thiserror::Error;

/// Kind of GPU object whose creation failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Buffer,
    Image,
    ImageView,
    Sampler,
    Memory,
    ShaderModule,
    PipelineLayout,
    Pipeline,
    RenderPass,
    Framebuffer,
    DescriptorSetLayout,
    DescriptorPool,
    DescriptorSet,
    CommandPool,
    CommandBuffer,
    Fence,
    Semaphore,
    Swapchain,
    Surface,
}

impl ResourceKind {
    pub fn name(self) -> &'static str {
        match self {
            ResourceKind::Buffer => "buffer",
            ResourceKind::Image => "image",
            ResourceKind::ImageView => "image view",
            ResourceKind::Sampler => "sampler",
            ResourceKind::Memory => "device memory",
            ResourceKind::ShaderModule => "shader module",
            ResourceKind::PipelineLayout => "pipeline layout",
            ResourceKind::Pipeline => "pipeline",
            ResourceKind::RenderPass => "render pass",
            ResourceKind::Framebuffer => "framebuffer",
            ResourceKind::DescriptorSetLayout => "descriptor set layout",
            ResourceKind::DescriptorPool => "descriptor pool",
            ResourceKind::DescriptorSet => "descriptor set",
            ResourceKind::CommandPool => "command pool",
            ResourceKind::CommandBuffer => "command buffer",
            ResourceKind::Fence => "fence",
            ResourceKind::Semaphore => "semaphore",
            ResourceKind::Swapchain => "swapchain",
            ResourceKind::Surface => "surface",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// RHI-specific error type.
#[derive(Error, Debug)]
pub enum RhiError {
    /// vkCreateInstance (or loading the Vulkan library) failed
    #[error("Instance creation failed: {0}")]
    InstanceCreationFailed(String),

    /// vkCreateDevice or allocator setup failed
    #[error("Device creation failed: {0}")]
    DeviceCreationFailed(String),

    /// No memory type matches the requirement mask and property flags
    #[error(
        "No compatible memory type (type bits {type_bits:#034b}, required flags {required:?})"
    )]
    NoCompatibleMemoryType {
        type_bits: u32,
        required: vk::MemoryPropertyFlags,
    },

    /// No physical device is available at all
    #[error("No suitable physical device found")]
    NoSuitablePhysicalDevice,

    /// Devices exist but none exposes a graphics + present queue family
    #[error("No queue family supports both graphics and presentation")]
    NoSuitableQueueFamily,

    /// Creating a GPU object failed
    #[error("Failed to create {kind}: {result}")]
    ResourceCreationFailed {
        kind: ResourceKind,
        result: vk::Result,
    },

    /// The presentation surface is gone
    #[error("Surface lost")]
    SurfaceLost,

    /// The swapchain no longer matches the surface
    #[error("Swapchain out of date")]
    SwapchainOutOfDate,

    /// A bounded wait expired
    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),

    /// Any other Vulkan API error
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),

    /// GPU allocator error
    #[error("Allocator error: {0}")]
    Allocator(gpu_allocator::AllocationError),

    /// Shader loading or reflection error
    #[error("Shader error: {0}")]
    Shader(String),

    /// A shader declares a push-constant block larger than the CPU schema
    #[error(
        "Push constant block of {stage} shader is {shader_size} bytes, schema '{schema}' provides {schema_size}"
    )]
    PushConstantMismatch {
        stage: &'static str,
        schema: &'static str,
        shader_size: u32,
        schema_size: u32,
    },

    /// An object was used before it was ready (or after it was consumed)
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl RhiError {
    /// Wraps a failed creation call.
    #[inline]
    pub fn creation(kind: ResourceKind) -> impl FnOnce(vk::Result) -> RhiError {
        move |result| RhiError::ResourceCreationFailed { kind, result }
    }

    /// Translates a result returned on the per-frame path (acquire, wait,
    /// submit, present).
    pub fn from_frame_result(result: vk::Result, waiting_for: &'static str) -> RhiError {
        match result {
            vk::Result::ERROR_SURFACE_LOST_KHR => RhiError::SurfaceLost,
            vk::Result::ERROR_OUT_OF_DATE_KHR => RhiError::SwapchainOutOfDate,
            vk::Result::TIMEOUT | vk::Result::NOT_READY => RhiError::Timeout(waiting_for),
            other => RhiError::Vulkan(other),
        }
    }

    /// Whether the frame loop must stop instead of skipping the frame.
    pub fn is_fatal_per_frame(&self) -> bool {
        matches!(
            self,
            RhiError::SurfaceLost | RhiError::Vulkan(vk::Result::ERROR_DEVICE_LOST)
        )
    }
}

impl From<gpu_allocator::AllocationError> for RhiError {
    fn from(error: gpu_allocator::AllocationError) -> Self {
        match error {
            gpu_allocator::AllocationError::NoCompatibleMemoryTypeFound => {
                RhiError::NoCompatibleMemoryType {
                    type_bits: 0,
                    required: vk::MemoryPropertyFlags::empty(),
                }
            }
            other => RhiError::Allocator(other),
        }
    }
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_result_classification() {
        assert!(matches!(
            RhiError::from_frame_result(vk::Result::ERROR_SURFACE_LOST_KHR, "acquire"),
            RhiError::SurfaceLost
        ));
        assert!(matches!(
            RhiError::from_frame_result(vk::Result::ERROR_OUT_OF_DATE_KHR, "acquire"),
            RhiError::SwapchainOutOfDate
        ));
        assert!(matches!(
            RhiError::from_frame_result(vk::Result::TIMEOUT, "fence"),
            RhiError::Timeout("fence")
        ));
        assert!(matches!(
            RhiError::from_frame_result(vk::Result::NOT_READY, "acquire"),
            RhiError::Timeout("acquire")
        ));
        assert!(matches!(
            RhiError::from_frame_result(vk::Result::ERROR_OUT_OF_HOST_MEMORY, "submit"),
            RhiError::Vulkan(vk::Result::ERROR_OUT_OF_HOST_MEMORY)
        ));
    }

    #[test]
    fn test_only_surface_and_device_loss_are_fatal() {
        assert!(RhiError::SurfaceLost.is_fatal_per_frame());
        assert!(RhiError::Vulkan(vk::Result::ERROR_DEVICE_LOST).is_fatal_per_frame());
        assert!(!RhiError::SwapchainOutOfDate.is_fatal_per_frame());
        assert!(!RhiError::Timeout("fence").is_fatal_per_frame());
        assert!(!RhiError::Vulkan(vk::Result::ERROR_OUT_OF_HOST_MEMORY).is_fatal_per_frame());
    }

    #[test]
    fn test_creation_helper_carries_kind() {
        let error = RhiError::creation(ResourceKind::Framebuffer)(
            vk::Result::ERROR_OUT_OF_DEVICE_MEMORY,
        );
        match error {
            RhiError::ResourceCreationFailed { kind, result } => {
                assert_eq!(kind, ResourceKind::Framebuffer);
                assert_eq!(result, vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(
            RhiError::creation(ResourceKind::RenderPass)(vk::Result::ERROR_UNKNOWN)
                .to_string()
                .starts_with("Failed to create render pass")
        );
    }

    #[test]
    fn test_allocator_no_memory_type_maps_to_typed_error() {
        let error: RhiError = gpu_allocator::AllocationError::NoCompatibleMemoryTypeFound.into();
        assert!(matches!(error, RhiError::NoCompatibleMemoryType { .. }));
    }
}
