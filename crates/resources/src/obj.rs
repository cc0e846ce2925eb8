//! Wavefront OBJ loading.
//!
//! Every model in the file is merged into one [`MeshData`]. Faces are
//! triangulated and each position/UV/normal combination becomes one vertex.
//! Missing UVs default to zero; missing normals are rebuilt from the faces.

use std::path::Path;

use glam::{Vec2, Vec3};
use multipass_rhi::vertex::Vertex;
use tracing::{debug, info};

use crate::error::{ResourceError, ResourceResult};
use crate::geometry::MeshData;

/// Loads and merges all models of an OBJ file.
///
/// # Errors
///
/// [`ResourceError::FileNotFound`] for a missing path,
/// [`ResourceError::ObjLoad`] when the file does not parse,
/// [`ResourceError::NoGeometry`] when it holds no faces.
pub fn load_obj(path: &Path) -> ResourceResult<MeshData> {
    if !path.exists() {
        return Err(ResourceError::FileNotFound(path.to_path_buf()));
    }

    let options = tobj::LoadOptions {
        triangulate: true,
        single_index: true,
        ..Default::default()
    };
    let (models, _materials) =
        tobj::load_obj(path, &options).map_err(|source| ResourceError::ObjLoad {
            path: path.to_path_buf(),
            source,
        })?;

    let mut mesh = MeshData::default();
    for model in &models {
        append_model(&mut mesh, &model.mesh);
        debug!(
            "OBJ model '{}': {} vertices, {} indices",
            model.name,
            model.mesh.positions.len() / 3,
            model.mesh.indices.len()
        );
    }

    if mesh.indices.is_empty() {
        return Err(ResourceError::NoGeometry(path.to_path_buf()));
    }
    mesh.validate()?;

    info!(
        "Loaded {:?}: {} vertices, {} triangles",
        path,
        mesh.vertices.len(),
        mesh.triangle_count()
    );
    Ok(mesh)
}

fn append_model(mesh: &mut MeshData, source: &tobj::Mesh) {
    let base = mesh.vertices.len() as u32;
    let vertex_count = source.positions.len() / 3;
    let has_normals = source.normals.len() == source.positions.len();
    let has_uvs = source.texcoords.len() / 2 == vertex_count;

    mesh.vertices.extend((0..vertex_count).map(|i| {
        let position = Vec3::from_slice(&source.positions[i * 3..i * 3 + 3]);
        let uv = if has_uvs {
            // OBJ puts the UV origin bottom-left.
            Vec2::new(source.texcoords[i * 2], 1.0 - source.texcoords[i * 2 + 1])
        } else {
            Vec2::ZERO
        };
        let normal = if has_normals {
            Vec3::from_slice(&source.normals[i * 3..i * 3 + 3])
        } else {
            Vec3::ZERO
        };
        Vertex::new(position, uv, normal)
    }));
    mesh.indices
        .extend(source.indices.iter().map(|index| base + index));

    if !has_normals {
        rebuild_normals(&mut mesh.vertices[base as usize..], &source.indices);
    }
}

/// Area-weighted vertex normals from the triangle list.
fn rebuild_normals(vertices: &mut [Vertex], indices: &[u32]) {
    for triangle in indices.chunks_exact(3) {
        let [a, b, c] = [triangle[0], triangle[1], triangle[2]].map(|i| i as usize);
        if a >= vertices.len() || b >= vertices.len() || c >= vertices.len() {
            continue;
        }
        let face = (vertices[b].position - vertices[a].position)
            .cross(vertices[c].position - vertices[a].position);
        for index in [a, b, c] {
            vertices[index].normal += face;
        }
    }
    for vertex in vertices {
        vertex.normal = vertex.normal.normalize_or_zero();
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_obj(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".obj")
            .tempfile()
            .unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_quad_is_triangulated() {
        let file = write_obj(
            "o quad\n\
             v 0 0 0\n\
             v 1 0 0\n\
             v 1 1 0\n\
             v 0 1 0\n\
             f 1 2 3 4\n",
        );

        let mesh = load_obj(file.path()).unwrap();
        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.indices.len(), 6);
        assert_eq!(mesh.triangle_count(), 2);
        // Normals are rebuilt from the counter-clockwise faces.
        for vertex in &mesh.vertices {
            assert!((vertex.normal - Vec3::Z).length() < 1e-6);
            assert_eq!(vertex.uv, Vec2::ZERO);
        }
    }

    #[test]
    fn test_load_with_uvs_and_normals() {
        let file = write_obj(
            "v 0 0 0\n\
             v 1 0 0\n\
             v 0 1 0\n\
             vt 0 0\n\
             vt 1 0\n\
             vt 0 1\n\
             vn 0 0 1\n\
             f 1/1/1 2/2/1 3/3/1\n",
        );

        let mesh = load_obj(file.path()).unwrap();
        assert_eq!(mesh.vertices.len(), 3);
        assert_eq!(mesh.vertices[0].uv, Vec2::new(0.0, 1.0));
        assert_eq!(mesh.vertices[2].uv, Vec2::new(0.0, 0.0));
        assert!(mesh.vertices.iter().all(|v| v.normal == Vec3::Z));
    }

    #[test]
    fn test_models_are_merged() {
        let file = write_obj(
            "o first\n\
             v 0 0 0\n\
             v 1 0 0\n\
             v 0 1 0\n\
             f 1 2 3\n\
             o second\n\
             v 0 0 1\n\
             v 1 0 1\n\
             v 0 1 1\n\
             f 4 5 6\n",
        );

        let mesh = load_obj(file.path()).unwrap();
        assert_eq!(mesh.triangle_count(), 2);
        assert!(mesh.validate().is_ok());
        assert_eq!(*mesh.indices.iter().max().unwrap(), 5);
    }

    #[test]
    fn test_missing_file() {
        let result = load_obj(Path::new("does/not/exist.obj"));
        assert!(matches!(result, Err(ResourceError::FileNotFound(_))));
    }

    #[test]
    fn test_file_without_faces() {
        let file = write_obj("v 0 0 0\nv 1 0 0\n");
        assert!(load_obj(file.path()).is_err());
    }
}
