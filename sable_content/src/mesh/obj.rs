//! Wavefront OBJ front end.
//!
//! Only the geometry statements are interpreted: `v`, `vn`, `vt` and `f`.
//! Faces reference the pools with 1-based indices (negative meaning "from
//! the end") in `v[/vt][/vn]` form. Faces with more than three vertices are
//! fan-triangulated around the first vertex. Distinct (v, vt, vn) triples
//! are welded into one output vertex via a hash map.

use sable_shared::ahash::AHashMap;

use super::{finalize, Error, MeshBuild};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ObjIndex {
    v: i32,
    vt: i32,
    vn: i32,
}

/// Converts a 1-based, possibly negative OBJ index into a 0-based index.
/// Zero (absent) and out-of-range negatives map to -1.
fn fix_obj_index(index: i32, count: usize) -> i32 {
    if index > 0 {
        return index - 1;
    }
    if index < 0 {
        let fixed = count as i32 + index;
        return if fixed >= 0 { fixed } else { -1 };
    }
    -1
}

fn parse_obj_index_token(
    token: &str,
    v_count: usize,
    vt_count: usize,
    vn_count: usize,
) -> Result<ObjIndex, Error> {
    if token.is_empty() {
        return Err(Error::MalformedFace(token.to_owned()));
    }

    let mut parts = token.split('/');
    let v_text = parts.next().unwrap_or("");
    let vt_text = parts.next().unwrap_or("");
    let vn_text = parts.next().unwrap_or("");

    let v: i32 = v_text.parse().map_err(|_| Error::MalformedFace(token.to_owned()))?;
    let vt: i32 = if vt_text.is_empty() {
        0
    } else {
        vt_text.parse().map_err(|_| Error::MalformedFace(token.to_owned()))?
    };
    let vn: i32 = if vn_text.is_empty() {
        0
    } else {
        vn_text.parse().map_err(|_| Error::MalformedFace(token.to_owned()))?
    };

    let index = ObjIndex {
        v: fix_obj_index(v, v_count),
        vt: fix_obj_index(vt, vt_count),
        vn: fix_obj_index(vn, vn_count),
    };
    if index.v < 0 {
        return Err(Error::MalformedFace(token.to_owned()));
    }
    Ok(index)
}

fn parse_f32_components<const N: usize>(mut tokens: std::str::SplitWhitespace) -> [f32; N] {
    let mut values = [0.0f32; N];
    for value in &mut values {
        *value = tokens.next().and_then(|token| token.parse().ok()).unwrap_or(0.0);
    }
    values
}

struct Welder<'a> {
    positions: &'a [[f32; 3]],
    normals: &'a [[f32; 3]],
    texcoords: &'a [[f32; 2]],
    out_positions: Vec<[f32; 3]>,
    out_normals: Vec<[f32; 3]>,
    out_texcoords: Vec<[f32; 2]>,
    index_map: AHashMap<ObjIndex, u32>,
}

impl<'a> Welder<'a> {
    fn emit_vertex(&mut self, index: ObjIndex) -> Result<u32, Error> {
        if let Some(existing) = self.index_map.get(&index) {
            return Ok(*existing);
        }

        let position = self
            .positions
            .get(index.v as usize)
            .copied()
            .ok_or_else(|| Error::MalformedFace(format!("vertex index {}", index.v + 1)))?;
        let normal = if index.vn >= 0 {
            self.normals.get(index.vn as usize).copied().unwrap_or_default()
        } else {
            [0.0; 3]
        };
        let texcoord = if index.vt >= 0 {
            self.texcoords.get(index.vt as usize).copied().unwrap_or_default()
        } else {
            [0.0; 2]
        };

        self.out_positions.push(position);
        self.out_normals.push(normal);
        self.out_texcoords.push(texcoord);

        let new_index = (self.out_positions.len() - 1) as u32;
        self.index_map.insert(index, new_index);
        Ok(new_index)
    }
}

pub(crate) fn import(text: &str) -> Result<MeshBuild, Error> {
    let mut positions: Vec<[f32; 3]> = Vec::new();
    let mut normals: Vec<[f32; 3]> = Vec::new();
    let mut texcoords: Vec<[f32; 2]> = Vec::new();

    // Indices must be resolved while scanning because negative indices count
    // from the current end of the pools.
    let mut faces: Vec<Vec<ObjIndex>> = Vec::new();
    let mut has_normal = false;
    let mut has_texcoord = false;

    for line in text.lines() {
        if line.is_empty() {
            continue;
        }
        let mut tokens = line.split_whitespace();
        let Some(tag) = tokens.next() else {
            continue;
        };
        match tag {
            "v" => positions.push(parse_f32_components::<3>(tokens)),
            "vn" => normals.push(parse_f32_components::<3>(tokens)),
            "vt" => texcoords.push(parse_f32_components::<2>(tokens)),
            "f" => {
                let mut face = Vec::new();
                for token in tokens {
                    let index = parse_obj_index_token(
                        token,
                        positions.len(),
                        texcoords.len(),
                        normals.len(),
                    )?;
                    if index.vt >= 0 {
                        has_texcoord = true;
                    }
                    if index.vn >= 0 {
                        has_normal = true;
                    }
                    face.push(index);
                }

                if face.len() < 3 {
                    continue;
                }
                faces.push(face);
            }
            _ => {}
        }
    }

    let mut welder = Welder {
        positions: &positions,
        normals: &normals,
        texcoords: &texcoords,
        out_positions: Vec::new(),
        out_normals: Vec::new(),
        out_texcoords: Vec::new(),
        index_map: AHashMap::new(),
    };

    let mut indices: Vec<u32> = Vec::new();
    for face in &faces {
        let first = face[0];
        for i in 1..face.len() - 1 {
            let i0 = welder.emit_vertex(first)?;
            let i1 = welder.emit_vertex(face[i])?;
            let i2 = welder.emit_vertex(face[i + 1])?;
            indices.push(i0);
            indices.push(i1);
            indices.push(i2);
        }
    }

    if welder.out_positions.is_empty() {
        return Err(Error::NoVertexPositions);
    }
    if indices.is_empty() {
        return Err(Error::NoIndices);
    }

    let out_normals = if has_normal { welder.out_normals } else { Vec::new() };
    let out_texcoords = if has_texcoord { welder.out_texcoords } else { Vec::new() };

    finalize(&welder.out_positions, &out_normals, &out_texcoords, &indices)
}

#[cfg(test)]
mod tests {
    use sable_shared::indoc::indoc;

    use super::*;
    use crate::blob::{
        MESH_INDEX_TYPE_U16, MESH_VERTEX_MASK_NORMAL, MESH_VERTEX_MASK_POSITION,
        MESH_VERTEX_MASK_TEXCOORD0,
    };

    fn read_indices_u16(build: &MeshBuild) -> Vec<u16> {
        build
            .index_data
            .chunks_exact(2)
            .map(|chunk| u16::from_le_bytes([chunk[0], chunk[1]]))
            .collect()
    }

    #[test]
    fn quad_is_fan_triangulated() {
        sable_test::setup_logger();

        // Given a quad over four positions.
        let text = indoc! {"
            v 0 0 0
            v 1 0 0
            v 1 1 0
            v 0 1 0
            f 1 2 3 4
        "};

        // When
        let build = import(text).unwrap();

        // Then two triangles fan around the first vertex.
        assert_eq!(build.vertex_count, 4);
        assert_eq!(build.index_count, 6);
        assert_eq!(read_indices_u16(&build), vec![0, 1, 2, 0, 2, 3]);
        assert_eq!(build.sub_meshes.len(), 1);
        assert_eq!(build.sub_meshes[0].index_start, 0);
        assert_eq!(build.sub_meshes[0].index_count, 6);
        assert_eq!(build.index_type, MESH_INDEX_TYPE_U16);
    }

    #[test]
    fn shared_corners_are_welded() {
        let text = indoc! {"
            v 0 0 0
            v 1 0 0
            v 1 1 0
            v 0 1 0
            f 1 2 3
            f 1 3 4
        "};
        let build = import(text).unwrap();
        assert_eq!(build.vertex_count, 4);
        assert_eq!(build.index_count, 6);
        assert_eq!(read_indices_u16(&build), vec![0, 1, 2, 0, 2, 3]);
    }

    #[test]
    fn distinct_triples_are_not_welded() {
        // The same position with two different texcoords yields two output
        // vertices.
        let text = indoc! {"
            v 0 0 0
            v 1 0 0
            v 1 1 0
            vt 0 0
            vt 1 1
            f 1/1 2/1 3/2
            f 1/2 2/1 3/2
        "};
        let build = import(text).unwrap();
        assert_eq!(build.vertex_count, 4);
    }

    #[test]
    fn negative_indices_count_from_the_end() {
        let text = indoc! {"
            v 0 0 0
            v 1 0 0
            v 1 1 0
            f -3 -2 -1
        "};
        let build = import(text).unwrap();
        assert_eq!(build.vertex_count, 3);
        assert_eq!(read_indices_u16(&build), vec![0, 1, 2]);
    }

    #[test]
    fn normals_and_texcoords_are_detected_from_faces() {
        let text = indoc! {"
            v 0 0 0
            v 1 0 0
            v 1 1 0
            vn 0 0 1
            vt 0.5 0.5
            f 1/1/1 2/1/1 3/1/1
        "};
        let build = import(text).unwrap();
        assert_eq!(
            build.vertex_format_mask,
            MESH_VERTEX_MASK_POSITION | MESH_VERTEX_MASK_NORMAL | MESH_VERTEX_MASK_TEXCOORD0
        );
        assert_eq!(build.vertex_stride, 32);
    }

    #[test]
    fn positions_only_when_faces_reference_none() {
        let text = indoc! {"
            v 0 0 0
            v 1 0 0
            v 1 1 0
            vn 0 0 1
            f 1 2 3
        "};
        let build = import(text).unwrap();
        assert_eq!(build.vertex_format_mask, MESH_VERTEX_MASK_POSITION);
        assert_eq!(build.vertex_stride, 12);
    }

    #[test]
    fn face_without_texcoord_in_triple_form() {
        // `1//2` skips the texcoord but keeps the normal.
        let text = indoc! {"
            v 0 0 0
            v 1 0 0
            v 1 1 0
            vn 0 0 1
            f 1//1 2//1 3//1
        "};
        let build = import(text).unwrap();
        assert_eq!(
            build.vertex_format_mask,
            MESH_VERTEX_MASK_POSITION | MESH_VERTEX_MASK_NORMAL
        );
    }

    #[test]
    fn degenerate_faces_are_skipped() {
        let text = indoc! {"
            v 0 0 0
            v 1 0 0
            v 1 1 0
            f 1 2
            f 1 2 3
        "};
        let build = import(text).unwrap();
        assert_eq!(build.index_count, 3);
    }

    #[test]
    fn unparsable_face_index_fails_the_import() {
        let text = indoc! {"
            v 0 0 0
            v 1 0 0
            v 1 1 0
            f 1 2 banana
        "};
        assert!(matches!(import(text), Err(Error::MalformedFace(_))));
    }

    #[test]
    fn face_index_out_of_pool_fails_the_import() {
        let text = indoc! {"
            v 0 0 0
            v 1 0 0
            f 1 2 9
        "};
        assert!(import(text).is_err());
    }

    #[test]
    fn empty_obj_fails() {
        assert!(matches!(import("# nothing\n"), Err(Error::NoVertexPositions)));
    }

    #[test]
    fn bounds_cover_referenced_positions() {
        let text = indoc! {"
            v -1 -2 -3
            v 4 5 6
            v 0 0 0
            f 1 2 3
        "};
        let build = import(text).unwrap();
        assert_eq!(build.bounds_min, [-1.0, -2.0, -3.0]);
        assert_eq!(build.bounds_max, [4.0, 5.0, 6.0]);
    }
}
