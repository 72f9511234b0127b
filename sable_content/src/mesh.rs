//! Mesh cooking.
//!
//! Two source formats (Wavefront OBJ and glTF 2.0) are parsed by their own
//! front ends into the same [`MeshBuild`] intermediate: an interleaved
//! vertex buffer, an index buffer and the attribute/sub-mesh tables. A
//! single layout routine then turns the intermediate into the final blob,
//! so the two formats cannot drift apart in their binary output.
//!
//! Vertex layout is fixed: Position (12 bytes), then Normal (12 bytes) when
//! present, then UV0 (8 bytes) when present. Indices are 16-bit when the
//! largest index fits, 32-bit otherwise.

mod gltf;
mod obj;

use std::{fs, path::PathBuf};

use sable_shared::{
    byteorder::{LittleEndian, WriteBytesExt},
    log::trace,
    thiserror,
};

use crate::{
    blob::{
        BlobHeader, MeshBlobDesc, MeshSubMesh, MeshVertexAttribute, MESH_INDEX_TYPE_U16,
        MESH_INDEX_TYPE_U32, MESH_SEMANTIC_NORMAL, MESH_SEMANTIC_POSITION, MESH_SEMANTIC_TEXCOORD,
        MESH_VERTEX_FORMAT_R32G32B32_FLOAT, MESH_VERTEX_FORMAT_R32G32_FLOAT,
        MESH_VERTEX_MASK_NORMAL, MESH_VERTEX_MASK_POSITION, MESH_VERTEX_MASK_TEXCOORD0,
    },
    common::{extract_extension_from_path, AssetType},
    registry::MeshDesc,
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Failed to load mesh '{path}': {reason}")]
    FailedLoading { path: PathBuf, reason: String },
    #[error("Unsupported mesh source format: {0}")]
    UnsupportedFormat(String),
    #[error("Mesh has no vertex positions")]
    NoVertexPositions,
    #[error("Mesh has no indices")]
    NoIndices,
    #[error("Malformed face: {0}")]
    MalformedFace(String),
    #[error("Vertex attribute counts do not match the position count")]
    AttributeCountMismatch,
    #[error("Index {0} is out of range")]
    IndexOutOfRange(u32),
    #[error("Only triangle-list primitives are supported (mode {0})")]
    UnsupportedTopology(u32),
    #[error("Malformed glTF container: {0}")]
    MalformedContainer(String),
    #[error("Malformed glTF document: {0}")]
    MalformedDocument(String),
    #[error("Malformed accessor {0}")]
    MalformedAccessor(u32),
    #[error("Unsupported glTF buffer: {0}")]
    UnsupportedBuffer(String),
}

impl From<Error> for crate::Error {
    fn from(value: Error) -> Self {
        crate::Error::Other(Box::new(value))
    }
}

/// Format-independent intermediate produced by the OBJ and glTF front ends.
#[derive(Debug, Clone, Default)]
pub struct MeshBuild {
    pub vertex_data: Vec<u8>,
    pub index_data: Vec<u8>,
    pub attributes: Vec<MeshVertexAttribute>,
    pub sub_meshes: Vec<MeshSubMesh>,
    pub vertex_count: u32,
    pub index_count: u32,
    pub vertex_stride: u32,
    pub index_type: u32,
    pub vertex_format_mask: u32,
    pub bounds_min: [f32; 3],
    pub bounds_max: [f32; 3],
}

/// Cooked mesh blob plus the summary descriptor for the registry.
#[derive(Debug, Clone)]
pub struct CookedMesh {
    pub blob: Vec<u8>,
    pub desc: MeshDesc,
}

/// Cooks a mesh source file into a blob. The format is chosen by file
/// extension: `.obj`, `.gltf` or `.glb`.
pub fn cook_mesh(path: impl Into<PathBuf>) -> crate::Result<CookedMesh> {
    let path = path.into();
    let extension = extract_extension_from_path(&path)?;
    trace!("Cooking mesh '{}' as '{extension}'", path.display());

    let build = match extension.as_str() {
        "obj" => {
            let text = fs::read_to_string(&path)
                .map_err(|_| crate::Error::InvalidAssetData(path.clone()))?;
            obj::import(&text)?
        }
        "gltf" | "glb" => gltf::import(&path)?,
        other => return Err(Error::UnsupportedFormat(other.to_owned()).into()),
    };

    build_mesh_blob(&build)
}

/// Interleaves the attribute streams into a [`MeshBuild`].
///
/// `normals` and `uvs` are either empty (attribute absent) or exactly as
/// long as `positions`. Bounds are accumulated over all vertices and the
/// index width is chosen from the largest index.
pub(crate) fn finalize(
    positions: &[[f32; 3]],
    normals: &[[f32; 3]],
    uvs: &[[f32; 2]],
    indices: &[u32],
) -> Result<MeshBuild, Error> {
    if positions.is_empty() {
        return Err(Error::NoVertexPositions);
    }
    if indices.is_empty() {
        return Err(Error::NoIndices);
    }
    if (!normals.is_empty() && normals.len() != positions.len())
        || (!uvs.is_empty() && uvs.len() != positions.len())
    {
        return Err(Error::AttributeCountMismatch);
    }

    let include_normals = !normals.is_empty();
    let include_uvs = !uvs.is_empty();

    let mut build = MeshBuild::default();
    let mut offset = 0u32;

    build.attributes.push(MeshVertexAttribute {
        semantic: MESH_SEMANTIC_POSITION,
        format: MESH_VERTEX_FORMAT_R32G32B32_FLOAT,
        aligned_offset: offset,
        ..MeshVertexAttribute::default()
    });
    offset += 12;
    build.vertex_format_mask |= MESH_VERTEX_MASK_POSITION;

    if include_normals {
        build.attributes.push(MeshVertexAttribute {
            semantic: MESH_SEMANTIC_NORMAL,
            format: MESH_VERTEX_FORMAT_R32G32B32_FLOAT,
            aligned_offset: offset,
            ..MeshVertexAttribute::default()
        });
        offset += 12;
        build.vertex_format_mask |= MESH_VERTEX_MASK_NORMAL;
    }
    if include_uvs {
        build.attributes.push(MeshVertexAttribute {
            semantic: MESH_SEMANTIC_TEXCOORD,
            semantic_index: 0,
            format: MESH_VERTEX_FORMAT_R32G32_FLOAT,
            aligned_offset: offset,
            ..MeshVertexAttribute::default()
        });
        offset += 8;
        build.vertex_format_mask |= MESH_VERTEX_MASK_TEXCOORD0;
    }

    build.vertex_stride = offset;
    build.vertex_count = positions.len() as u32;

    build.vertex_data = Vec::with_capacity(build.vertex_stride as usize * positions.len());
    for (index, position) in positions.iter().enumerate() {
        for value in position {
            build
                .vertex_data
                .write_f32::<LittleEndian>(*value)
                .expect("writing to a Vec cannot fail");
        }
        if include_normals {
            for value in &normals[index] {
                build
                    .vertex_data
                    .write_f32::<LittleEndian>(*value)
                    .expect("writing to a Vec cannot fail");
            }
        }
        if include_uvs {
            for value in &uvs[index] {
                build
                    .vertex_data
                    .write_f32::<LittleEndian>(*value)
                    .expect("writing to a Vec cannot fail");
            }
        }

        if index == 0 {
            build.bounds_min = *position;
            build.bounds_max = *position;
        } else {
            for axis in 0..3 {
                build.bounds_min[axis] = build.bounds_min[axis].min(position[axis]);
                build.bounds_max[axis] = build.bounds_max[axis].max(position[axis]);
            }
        }
    }

    let max_index = indices.iter().copied().max().unwrap_or(0);
    if max_index >= build.vertex_count {
        return Err(Error::IndexOutOfRange(max_index));
    }

    build.index_type = if max_index <= 0xFFFF { MESH_INDEX_TYPE_U16 } else { MESH_INDEX_TYPE_U32 };
    build.index_count = indices.len() as u32;

    if build.index_type == MESH_INDEX_TYPE_U16 {
        build.index_data = Vec::with_capacity(indices.len() * 2);
        for index in indices {
            build
                .index_data
                .write_u16::<LittleEndian>(*index as u16)
                .expect("writing to a Vec cannot fail");
        }
    } else {
        build.index_data = Vec::with_capacity(indices.len() * 4);
        for index in indices {
            build
                .index_data
                .write_u32::<LittleEndian>(*index)
                .expect("writing to a Vec cannot fail");
        }
    }

    build.sub_meshes = vec![MeshSubMesh {
        index_start: 0,
        index_count: build.index_count,
        base_vertex: 0,
        material_slot: 0,
    }];

    Ok(build)
}

/// Serializes header + desc + attribute table + sub-mesh table + vertex
/// bytes + index bytes into one contiguous buffer. The section offsets are
/// computed in that fixed order and stored inside the desc.
fn build_mesh_blob(build: &MeshBuild) -> crate::Result<CookedMesh> {
    if build.vertex_count == 0 || build.index_count == 0 || build.vertex_stride == 0 {
        return Err(Error::NoVertexPositions.into());
    }

    let attribute_bytes = build.attributes.len() as u32 * MeshVertexAttribute::SIZE as u32;
    let sub_mesh_bytes = build.sub_meshes.len() as u32 * MeshSubMesh::SIZE as u32;

    let mut desc = MeshBlobDesc {
        vertex_count: build.vertex_count,
        index_count: build.index_count,
        vertex_stride: build.vertex_stride,
        index_type: build.index_type,
        attribute_count: build.attributes.len() as u32,
        sub_mesh_count: build.sub_meshes.len() as u32,
        vertex_data_size: build.vertex_data.len() as u32,
        index_data_size: build.index_data.len() as u32,
        bounds_min: build.bounds_min,
        bounds_max: build.bounds_max,
        flags: 1,
        ..MeshBlobDesc::default()
    };
    desc.attributes_offset = 0;
    desc.sub_meshes_offset = desc.attributes_offset + attribute_bytes;
    desc.vertex_data_offset = desc.sub_meshes_offset + sub_mesh_bytes;
    desc.index_data_offset = desc.vertex_data_offset + desc.vertex_data_size;

    let data_size = desc.index_data_offset + desc.index_data_size;
    let header = BlobHeader::new(AssetType::Mesh, 0, MeshBlobDesc::SIZE as u32, data_size);

    let mut blob =
        Vec::with_capacity(BlobHeader::SIZE + MeshBlobDesc::SIZE + data_size as usize);
    header.write(&mut blob)?;
    desc.write(&mut blob)?;
    for attribute in &build.attributes {
        attribute.write(&mut blob)?;
    }
    for sub_mesh in &build.sub_meshes {
        sub_mesh.write(&mut blob)?;
    }
    blob.extend_from_slice(&build.vertex_data);
    blob.extend_from_slice(&build.index_data);

    Ok(CookedMesh {
        blob,
        desc: MeshDesc {
            vertex_format: build.vertex_format_mask,
            index_format: build.index_type,
            sub_mesh_count: build.sub_meshes.len() as u32,
        },
    })
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use sable_shared::indoc::indoc;
    use tempdir::TempDir;

    use super::*;

    fn flat_positions(count: usize) -> Vec<[f32; 3]> {
        (0..count).map(|i| [i as f32, 0.0, 0.0]).collect()
    }

    #[test]
    fn finalize_positions_only_layout() {
        // Given a triangle with no normals or UVs.
        let positions = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];

        // When
        let build = finalize(&positions, &[], &[], &[0, 1, 2]).unwrap();

        // Then only the position attribute is emitted.
        assert_eq!(build.vertex_stride, 12);
        assert_eq!(build.attributes.len(), 1);
        assert_eq!(build.vertex_format_mask, MESH_VERTEX_MASK_POSITION);
        assert_eq!(build.vertex_data.len(), 36);
        assert_eq!(build.index_type, MESH_INDEX_TYPE_U16);
        assert_eq!(build.index_data.len(), 6);
        assert_eq!(build.bounds_min, [0.0, 0.0, 0.0]);
        assert_eq!(build.bounds_max, [1.0, 1.0, 0.0]);
    }

    #[test]
    fn finalize_full_layout_offsets() {
        let positions = flat_positions(3);
        let normals = vec![[0.0, 0.0, 1.0]; 3];
        let uvs = vec![[0.5, 0.5]; 3];
        let build = finalize(&positions, &normals, &uvs, &[0, 1, 2]).unwrap();
        assert_eq!(build.vertex_stride, 32);
        assert_eq!(build.attributes[0].aligned_offset, 0);
        assert_eq!(build.attributes[1].aligned_offset, 12);
        assert_eq!(build.attributes[2].aligned_offset, 24);
        assert_eq!(
            build.vertex_format_mask,
            MESH_VERTEX_MASK_POSITION | MESH_VERTEX_MASK_NORMAL | MESH_VERTEX_MASK_TEXCOORD0
        );
    }

    #[test]
    fn finalize_index_width_boundary() {
        // 65535 is the largest index that still fits in 16 bits.
        let indices: Vec<u32> = (0..65535).collect();
        let build = finalize(&flat_positions(65535), &[], &[], &indices).unwrap();
        assert_eq!(build.index_type, MESH_INDEX_TYPE_U16);

        // One vertex more and the largest index is 65536.
        let indices: Vec<u32> = (0..65536).collect();
        let build = finalize(&flat_positions(65536), &[], &[], &indices).unwrap();
        assert_eq!(build.index_type, MESH_INDEX_TYPE_U32);
    }

    #[test]
    fn finalize_rejects_empty_inputs() {
        assert!(matches!(
            finalize(&[], &[], &[], &[0]),
            Err(Error::NoVertexPositions)
        ));
        assert!(matches!(
            finalize(&flat_positions(3), &[], &[], &[]),
            Err(Error::NoIndices)
        ));
    }

    #[test]
    fn finalize_rejects_attribute_count_mismatch() {
        let normals = vec![[0.0, 0.0, 1.0]; 2];
        assert!(matches!(
            finalize(&flat_positions(3), &normals, &[], &[0, 1, 2]),
            Err(Error::AttributeCountMismatch)
        ));
    }

    #[test]
    fn finalize_rejects_out_of_range_index() {
        assert!(matches!(
            finalize(&flat_positions(3), &[], &[], &[0, 1, 3]),
            Err(Error::IndexOutOfRange(3))
        ));
    }

    #[test]
    fn blob_sections_are_self_describing() {
        // Given
        let positions = flat_positions(4);
        let uvs = vec![[0.0, 0.0]; 4];
        let build = finalize(&positions, &[], &uvs, &[0, 1, 2, 0, 2, 3]).unwrap();

        // When
        let cooked = build_mesh_blob(&build).unwrap();

        // Then the header and desc locate every section.
        let mut cursor = Cursor::new(cooked.blob.as_slice());
        let header = BlobHeader::read(&mut cursor).unwrap();
        header.check().unwrap();
        assert_eq!(header.ty, AssetType::Mesh.to_u8());
        assert_eq!(header.desc_size as usize, MeshBlobDesc::SIZE);

        let desc = MeshBlobDesc::read(&mut cursor).unwrap();
        assert_eq!(desc.vertex_count, 4);
        assert_eq!(desc.index_count, 6);
        assert_eq!(desc.vertex_stride, 20);
        assert_eq!(desc.attribute_count, 2);
        assert_eq!(desc.sub_mesh_count, 1);
        assert_eq!(desc.attributes_offset, 0);
        assert_eq!(desc.sub_meshes_offset, 2 * MeshVertexAttribute::SIZE as u32);
        assert_eq!(desc.vertex_data_offset, desc.sub_meshes_offset + MeshSubMesh::SIZE as u32);
        assert_eq!(desc.index_data_offset, desc.vertex_data_offset + desc.vertex_data_size);
        assert_eq!(
            header.data_size,
            desc.index_data_offset + desc.index_data_size
        );
        assert_eq!(
            cooked.blob.len(),
            BlobHeader::SIZE + MeshBlobDesc::SIZE + header.data_size as usize
        );

        // The summary desc matches the blob.
        assert_eq!(cooked.desc.sub_mesh_count, 1);
        assert_eq!(cooked.desc.index_format, MESH_INDEX_TYPE_U16);
        assert_eq!(
            cooked.desc.vertex_format,
            MESH_VERTEX_MASK_POSITION | MESH_VERTEX_MASK_TEXCOORD0
        );
    }

    #[test]
    fn recooking_an_unchanged_source_is_byte_identical() {
        // Given an OBJ file on disk.
        let root = TempDir::new("mesh").unwrap();
        let obj_path = root.path().join("quad.obj");
        fs::write(
            &obj_path,
            indoc! {"
                v 0 0 0
                v 1 0 0
                v 1 1 0
                v 0 1 0
                vt 0 0
                vt 1 1
                f 1/1 2/2 3/2 4/1
            "},
        )
        .unwrap();

        // When cooking it twice.
        let first = cook_mesh(&obj_path).unwrap();
        let second = cook_mesh(&obj_path).unwrap();

        // Then the blobs are byte-identical.
        assert_eq!(first.blob, second.blob);
        assert_eq!(first.desc, second.desc);
    }

    #[test]
    fn unknown_extension_fails() {
        assert!(cook_mesh("mesh.fbx").is_err());
    }

    #[test]
    fn cooking_is_deterministic() {
        let positions = flat_positions(16);
        let indices: Vec<u32> = (0..14).flat_map(|i| [0, i + 1, i + 2]).collect();
        let first = build_mesh_blob(&finalize(&positions, &[], &[], &indices).unwrap()).unwrap();
        let second = build_mesh_blob(&finalize(&positions, &[], &[], &indices).unwrap()).unwrap();
        assert_eq!(first.blob, second.blob);
    }
}
