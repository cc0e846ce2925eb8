//! Synchronization primitives for Vulkan.
//!
//! - [`Semaphore`] orders queue operations on the GPU (submit before present)
//! - [`Fence`] lets the CPU wait for the GPU, with a bounded timeout
//! - [`FrameSync`] is the single fence + semaphore pair reused every frame
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use multipass_rhi::device::Device;
//! use multipass_rhi::sync::Fence;
//!
//! # fn example(device: Arc<Device>) -> Result<(), multipass_rhi::RhiError> {
//! let fence = Fence::new(device, true)?;
//! fence.wait(Duration::from_secs(1))?;
//! fence.reset()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use ash::vk;
use tracing::debug;

use crate::device::{Device, timeout_ns};
use crate::error::{ResourceKind, RhiError, RhiResult};

/// GPU-GPU synchronization primitive.
///
/// The renderer signals one when the frame's commands finish and the
/// present waits on it.
pub struct Semaphore {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan semaphore handle.
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Creates a new semaphore in the unsignaled state.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    ///
    /// # Errors
    ///
    /// [`RhiError::ResourceCreationFailed`] if `vkCreateSemaphore` fails.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use std::sync::Arc;
    /// use multipass_rhi::device::Device;
    /// use multipass_rhi::sync::Semaphore;
    ///
    /// # fn example(device: Arc<Device>) -> Result<(), multipass_rhi::RhiError> {
    /// let semaphore = Semaphore::new(device)?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::default();

        let semaphore = unsafe { device.handle().create_semaphore(&create_info, None) }
            .map_err(RhiError::creation(ResourceKind::Semaphore))?;

        debug!("Created semaphore");

        Ok(Self { device, semaphore })
    }

    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_semaphore(self.semaphore, None);
        }
        debug!("Destroyed semaphore");
    }
}

/// GPU-CPU synchronization primitive.
pub struct Fence {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan fence handle.
    fence: vk::Fence,
}

impl Fence {
    /// Creates a new fence.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `signaled` - If true, creates the fence in the signaled state, so
    ///   the first wait returns at once.
    ///
    /// # Errors
    ///
    /// [`RhiError::ResourceCreationFailed`] if `vkCreateFence` fails.
    pub fn new(device: Arc<Device>, signaled: bool) -> RhiResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::default().flags(flags);

        let fence = unsafe { device.handle().create_fence(&create_info, None) }
            .map_err(RhiError::creation(ResourceKind::Fence))?;

        debug!(
            "Created fence ({})",
            if signaled { "signaled" } else { "unsignaled" }
        );

        Ok(Self { device, fence })
    }

    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Blocks until the fence is signaled or `timeout` elapses.
    ///
    /// # Errors
    ///
    /// [`RhiError::Timeout`] when the bound is exceeded.
    pub fn wait(&self, timeout: Duration) -> RhiResult<()> {
        let fences = [self.fence];
        unsafe {
            self.device
                .handle()
                .wait_for_fences(&fences, true, timeout_ns(timeout))
        }
        .map_err(|result| RhiError::from_frame_result(result, "fence"))
    }

    /// Returns the fence to the unsignaled state.
    ///
    /// # Errors
    ///
    /// Returns an error if `vkResetFences` fails.
    pub fn reset(&self) -> RhiResult<()> {
        let fences = [self.fence];
        unsafe { self.device.handle().reset_fences(&fences)? };
        Ok(())
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_fence(self.fence, None);
        }
        debug!("Destroyed fence");
    }
}

/// The fence gating command recording and the semaphore gating
/// presentation. One frame is in flight at a time, so one pair suffices.
pub struct FrameSync {
    fence: Fence,
    render_finished: Semaphore,
}

impl FrameSync {
    /// Creates the pair. The fence starts signaled.
    ///
    /// # Errors
    ///
    /// [`RhiError::ResourceCreationFailed`] if either object cannot be
    /// created.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        Ok(Self {
            fence: Fence::new(device.clone(), true)?,
            render_finished: Semaphore::new(device)?,
        })
    }

    #[inline]
    pub fn fence(&self) -> &Fence {
        &self.fence
    }

    #[inline]
    pub fn render_finished(&self) -> &Semaphore {
        &self.render_finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_objects_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Semaphore>();
        assert_send_sync::<Fence>();
        assert_send_sync::<FrameSync>();
    }

    #[test]
    fn test_fence_timeout_is_classified() {
        assert!(matches!(
            RhiError::from_frame_result(vk::Result::TIMEOUT, "fence"),
            RhiError::Timeout("fence")
        ));
    }
}
