//! Vertex layouts and their input descriptions.
//!
//! [`Vertex`] carries position, UV and normal (32 bytes) and is used by the
//! shadow and color passes. It is `#[repr(C)]` and `Pod` so vertex slices
//! can be uploaded with `bytemuck::cast_slice`. The field order is the binary contract with the
//! vertex shaders.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

/// Interleaved vertex for lit geometry.
///
/// | offset | field | location |
/// |--------|-------|----------|
/// | 0  | position (vec3) | 0 |
/// | 12 | uv (vec2)       | 1 |
/// | 20 | normal (vec3)   | 2 |
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub uv: Vec2,
    pub normal: Vec3,
}

impl Vertex {
    #[inline]
    pub const fn new(position: Vec3, uv: Vec2, normal: Vec3) -> Self {
        Self {
            position,
            uv,
            normal,
        }
    }

    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: std::mem::size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 3] {
        [
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: 0,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 1,
                format: vk::Format::R32G32_SFLOAT,
                offset: 12,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 2,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: 20,
            },
        ]
    }
}
