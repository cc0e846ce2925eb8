//! Procedural geometry.
//!
//! [`grid`] builds a subdivided plane, [`cube`] a unit cube. Both produce
//! [`MeshData`] in the interleaved position/UV/normal layout, with
//! counter-clockwise triangles.

use glam::{Vec2, Vec3};
use multipass_rhi::vertex::Vertex;

use crate::error::{ResourceError, ResourceResult};

/// CPU-side vertex and index lists.
///
/// An empty index list means the vertices are drawn in order as a plain
/// triangle list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    #[inline]
    pub fn is_indexed(&self) -> bool {
        !self.indices.is_empty()
    }

    pub fn triangle_count(&self) -> usize {
        if self.is_indexed() {
            self.indices.len() / 3
        } else {
            self.vertices.len() / 3
        }
    }

    /// Checks that the index list is a whole number of triangles, each with
    /// three distinct in-range indices.
    pub fn validate(&self) -> ResourceResult<()> {
        if self.vertices.is_empty() {
            return Err(ResourceError::InvalidGeometry("no vertices".to_string()));
        }
        if !self.is_indexed() {
            if self.vertices.len() % 3 != 0 {
                return Err(ResourceError::InvalidGeometry(format!(
                    "{} vertices do not form whole triangles",
                    self.vertices.len()
                )));
            }
            return Ok(());
        }
        if self.indices.len() % 3 != 0 {
            return Err(ResourceError::InvalidGeometry(format!(
                "{} indices do not form whole triangles",
                self.indices.len()
            )));
        }

        let vertex_count = self.vertices.len() as u32;
        for (triangle, corners) in self.indices.chunks_exact(3).enumerate() {
            if let Some(index) = corners.iter().find(|index| **index >= vertex_count) {
                return Err(ResourceError::InvalidGeometry(format!(
                    "triangle {triangle} uses index {index}, only {vertex_count} vertices"
                )));
            }
            if corners[0] == corners[1] || corners[1] == corners[2] || corners[0] == corners[2] {
                return Err(ResourceError::InvalidGeometry(format!(
                    "triangle {triangle} is degenerate: {corners:?}"
                )));
            }
        }
        Ok(())
    }
}

/// Largest split count [`grid`] accepts. At this size the grid has about
/// 16.8 million vertices, so every index still fits a `u32`.
pub const MAX_GRID_SPLITS: u32 = 4096;

/// A `width` x `height` plane in the XY plane, centered on the origin and
/// split into `splits` x `splits` cells.
///
/// Produces `(splits + 1)²` vertices and `6 · splits²` indices. UVs run
/// from 0 to 1 across the plane and every normal is `-Z`.
///
/// # Errors
///
/// [`ResourceError::InvalidGeometry`] when `splits` is 0 or above
/// [`MAX_GRID_SPLITS`].
pub fn grid(width: f32, height: f32, splits: u32) -> ResourceResult<MeshData> {
    if !(1..=MAX_GRID_SPLITS).contains(&splits) {
        return Err(ResourceError::InvalidGeometry(format!(
            "grid split count must be in 1..={MAX_GRID_SPLITS}, got {splits}"
        )));
    }
    let half_width = width / 2.0;
    let half_height = height / 2.0;
    let step = splits as f32;

    let columns = splits as usize + 1;
    let mut vertices = Vec::with_capacity(columns * columns);
    for y in 0..=splits {
        for x in 0..=splits {
            let u = x as f32 / step;
            let v = y as f32 / step;
            vertices.push(Vertex::new(
                Vec3::new(u * width - half_width, v * height - half_height, 0.0),
                Vec2::new(u, v),
                Vec3::NEG_Z,
            ));
        }
    }

    let mut indices = Vec::with_capacity(6 * splits as usize * splits as usize);
    for y in 0..splits {
        let row = y * (splits + 1);
        let next_row = (y + 1) * (splits + 1);
        for x in 0..splits {
            indices.extend_from_slice(&[
                row + x,
                row + x + 1,
                next_row + x + 1,
                row + x,
                next_row + x + 1,
                next_row + x,
            ]);
        }
    }

    Ok(MeshData { vertices, indices })
}

/// Unit cube centered on the origin: 36 vertices, no index list.
pub fn cube() -> MeshData {
    // (normal, tangent u, tangent v) per face; u x v == normal keeps the
    // winding counter-clockwise seen from outside.
    const FACES: [(Vec3, Vec3, Vec3); 6] = [
        (Vec3::X, Vec3::NEG_Z, Vec3::Y),
        (Vec3::NEG_X, Vec3::Z, Vec3::Y),
        (Vec3::Y, Vec3::X, Vec3::NEG_Z),
        (Vec3::NEG_Y, Vec3::X, Vec3::Z),
        (Vec3::Z, Vec3::X, Vec3::Y),
        (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
    ];
    const CORNERS: [(f32, f32); 6] = [
        (0.0, 0.0),
        (1.0, 0.0),
        (1.0, 1.0),
        (0.0, 0.0),
        (1.0, 1.0),
        (0.0, 1.0),
    ];

    let vertices = FACES
        .iter()
        .flat_map(|&(normal, u_axis, v_axis)| {
            CORNERS.iter().map(move |&(u, v)| {
                let position = normal * 0.5 + u_axis * (u - 0.5) + v_axis * (v - 0.5);
                Vertex::new(position, Vec2::new(u, 1.0 - v), normal)
            })
        })
        .collect();

    MeshData {
        vertices,
        indices: Vec::new(),
    }
}
