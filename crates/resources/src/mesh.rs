//! Geometry uploaded to the GPU.

use std::sync::Arc;

use multipass_rhi::buffer::{Buffer, BufferUsage};
use multipass_rhi::command::CommandBuffer;
use multipass_rhi::device::Device;
use multipass_rhi::vk;
use tracing::debug;

use crate::error::ResourceResult;
use crate::geometry::MeshData;

/// A vertex buffer and an optional index buffer, written once at upload and
/// never touched again.
pub struct GpuMesh {
    name: String,
    vertex_buffer: Buffer,
    index_buffer: Option<Buffer>,
    vertex_count: u32,
    index_count: u32,
}

impl GpuMesh {
    /// Validates `mesh` and copies it into host-visible buffers.
    pub fn upload(device: Arc<Device>, name: &str, mesh: &MeshData) -> ResourceResult<Self> {
        mesh.validate()?;

        let vertex_buffer = Buffer::new_with_data(
            device.clone(),
            BufferUsage::Vertex,
            bytemuck::cast_slice(&mesh.vertices),
        )?;
        let index_buffer = if mesh.is_indexed() {
            Some(Buffer::new_with_data(
                device,
                BufferUsage::Index,
                bytemuck::cast_slice(&mesh.indices),
            )?)
        } else {
            None
        };

        debug!(
            "Uploaded mesh '{}': {} vertices, {} indices",
            name,
            mesh.vertices.len(),
            mesh.indices.len()
        );

        Ok(Self {
            name: name.to_string(),
            vertex_buffer,
            index_buffer,
            vertex_count: mesh.vertices.len() as u32,
            index_count: mesh.indices.len() as u32,
        })
    }

    /// Binds the buffers and issues one draw. Must be called inside a render
    /// pass with a pipeline bound.
    pub fn draw(&self, cmd: &CommandBuffer) {
        cmd.bind_vertex_buffer(self.vertex_buffer.handle());
        match &self.index_buffer {
            Some(index_buffer) => {
                cmd.bind_index_buffer(index_buffer.handle(), vk::IndexType::UINT32);
                cmd.draw_indexed(self.index_count, 1);
            }
            None => cmd.draw(self.vertex_count, 1),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    #[inline]
    pub fn index_count(&self) -> u32 {
        self.index_count
    }
}
