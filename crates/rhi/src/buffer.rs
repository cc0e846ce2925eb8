//! GPU buffer management.
//!
//! Every [`Buffer`] lives in host-visible memory that `gpu-allocator` keeps
//! persistently mapped, so [`Buffer::update`] is a plain copy into the
//! mapping. Memory is bound once at creation and never rebound.
//!
//! Writes are not synchronized with the GPU. Callers must not update a
//! buffer that an in-flight command buffer still reads; the frame loop
//! guarantees this by waiting for the device after every frame.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use multipass_rhi::device::Device;
//! use multipass_rhi::buffer::{Buffer, BufferUsage};
//!
//! # fn example(device: Arc<Device>) -> Result<(), multipass_rhi::RhiError> {
//! let indices: [u32; 3] = [0, 1, 2];
//! let index_buffer = Buffer::new_with_data(
//!     device,
//!     BufferUsage::Index,
//!     bytemuck::cast_slice(&indices),
//! )?;
//! assert_eq!(index_buffer.size(), 12);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::Allocation;
use tracing::debug;

use crate::device::Device;
use crate::error::{ResourceKind, RhiError, RhiResult};
use crate::release::BufferHandles;

/// How a buffer is used.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferUsage {
    Vertex,
    Index,
    Uniform,
    /// Source of a buffer-to-image copy.
    Staging,
}

impl BufferUsage {
    pub fn to_vk_usage(self) -> vk::BufferUsageFlags {
        match self {
            BufferUsage::Vertex => vk::BufferUsageFlags::VERTEX_BUFFER,
            BufferUsage::Index => vk::BufferUsageFlags::INDEX_BUFFER,
            BufferUsage::Uniform => vk::BufferUsageFlags::UNIFORM_BUFFER,
            BufferUsage::Staging => vk::BufferUsageFlags::TRANSFER_SRC,
        }
    }

    /// All buffers are written from the CPU.
    #[inline]
    pub fn memory_location(self) -> MemoryLocation {
        MemoryLocation::CpuToGpu
    }

    pub fn name(self) -> &'static str {
        match self {
            BufferUsage::Vertex => "vertex",
            BufferUsage::Index => "index",
            BufferUsage::Uniform => "uniform",
            BufferUsage::Staging => "staging",
        }
    }
}

/// Checks that `len` bytes at `offset` fit in a buffer of `size` bytes.
fn check_range(offset: vk::DeviceSize, len: usize, size: vk::DeviceSize) -> RhiResult<()> {
    let end = offset
        .checked_add(len as vk::DeviceSize)
        .ok_or_else(|| RhiError::InvalidState("buffer range overflows".to_string()))?;
    if end > size {
        return Err(RhiError::InvalidState(format!(
            "write of {len} bytes at offset {offset} exceeds buffer size {size}"
        )));
    }
    Ok(())
}

/// Host-visible GPU buffer.
pub struct Buffer {
    device: Arc<Device>,
    handles: Option<BufferHandles<Allocation>>,
    size: vk::DeviceSize,
    usage: BufferUsage,
}

impl Buffer {
    /// Creates a buffer of `size` bytes and binds its memory.
    ///
    /// # Errors
    ///
    /// [`RhiError::NoCompatibleMemoryType`] when no host-visible memory type
    /// can back the buffer, [`RhiError::ResourceCreationFailed`] when
    /// `vkCreateBuffer` or the memory bind fails.
    pub fn new(device: Arc<Device>, usage: BufferUsage, size: vk::DeviceSize) -> RhiResult<Self> {
        if size == 0 {
            return Err(RhiError::InvalidState(
                "buffer size must be greater than 0".to_string(),
            ));
        }

        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage.to_vk_usage())
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.handle().create_buffer(&buffer_info, None) }
            .map_err(RhiError::creation(ResourceKind::Buffer))?;

        let requirements = unsafe { device.handle().get_buffer_memory_requirements(buffer) };

        let allocation =
            match device.allocate(usage.name(), requirements, usage.memory_location(), true) {
                Ok(allocation) => allocation,
                Err(e) => {
                    unsafe { device.handle().destroy_buffer(buffer, None) };
                    return Err(e);
                }
            };

        let handles = BufferHandles {
            buffer,
            memory: allocation,
        };

        let bound = unsafe {
            device.handle().bind_buffer_memory(
                buffer,
                handles.memory.memory(),
                handles.memory.offset(),
            )
        };
        if let Err(result) = bound {
            handles.release(device.as_ref());
            return Err(RhiError::ResourceCreationFailed {
                kind: ResourceKind::Memory,
                result,
            });
        }

        device.set_debug_name(buffer, usage.name());
        debug!("Created {} buffer: {} bytes", usage.name(), size);

        Ok(Self {
            device,
            handles: Some(handles),
            size,
            usage,
        })
    }

    /// Creates a buffer sized to `data` and fills it.
    pub fn new_with_data(device: Arc<Device>, usage: BufferUsage, data: &[u8]) -> RhiResult<Self> {
        let buffer = Self::new(device, usage, data.len() as vk::DeviceSize)?;
        buffer.update(data)?;
        Ok(buffer)
    }

    /// Writes `data` at the start of the buffer.
    ///
    /// The buffer must not be in use by the GPU.
    ///
    /// # Errors
    ///
    /// [`RhiError::InvalidState`] when `data` is larger than the buffer.
    pub fn update(&self, data: &[u8]) -> RhiResult<()> {
        self.write(0, data)
    }

    /// Writes `data` at `offset`.
    pub fn write(&self, offset: vk::DeviceSize, data: &[u8]) -> RhiResult<()> {
        if data.is_empty() {
            return Ok(());
        }
        check_range(offset, data.len(), self.size)?;

        let mapped = self.mapped_ptr()?;
        // SAFETY: the range was checked against the allocation size above and
        // the mapping stays valid for the allocation's lifetime.
        unsafe {
            let dst = mapped.add(offset as usize);
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len());
        }
        Ok(())
    }

    /// Copies the whole buffer back to the CPU.
    pub fn read_back(&self) -> RhiResult<Vec<u8>> {
        let mapped = self.mapped_ptr()?;
        let mut bytes = vec![0u8; self.size as usize];
        // SAFETY: the mapping covers at least `size` bytes.
        unsafe {
            std::ptr::copy_nonoverlapping(mapped.cast_const(), bytes.as_mut_ptr(), bytes.len());
        }
        Ok(bytes)
    }

    fn mapped_ptr(&self) -> RhiResult<*mut u8> {
        let handles = self
            .handles
            .as_ref()
            .ok_or_else(|| RhiError::InvalidState("buffer already destroyed".to_string()))?;
        handles
            .memory
            .mapped_ptr()
            .map(|ptr| ptr.as_ptr().cast::<u8>())
            .ok_or_else(|| RhiError::InvalidState("buffer memory is not mapped".to_string()))
    }

    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.handles
            .as_ref()
            .map_or(vk::Buffer::null(), |handles| handles.buffer)
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    #[inline]
    pub fn usage(&self) -> BufferUsage {
        self.usage
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if let Some(handles) = self.handles.take() {
            handles.release(self.device.as_ref());
            debug!("Destroyed {} buffer", self.usage.name());
        }
    }
}
