//! glTF 2.0 front end.
//!
//! Both containers are supported: `.gltf` (JSON document, buffers loaded
//! from relative-file `uri`s; embedded `data:` URIs fail closed) and `.glb`
//! (binary container with a JSON chunk and an optional BIN chunk). The
//! document's buffers → bufferViews → accessors indirection is walked with
//! every range validated against the backing buffer before anything is
//! read. Only the first primitive of the first mesh is cooked and it must
//! be a triangle list.

use std::{fs, path::Path};

use sable_shared::{
    byteorder::{ByteOrder, LittleEndian},
    log::trace,
    serde_json::{self, Value},
};

use super::{finalize, Error, MeshBuild};
use crate::json::{find_ci, get_str, get_u32};

const GLB_MAGIC: u32 = 0x4654_6C67; // "glTF"
const GLB_CHUNK_JSON: u32 = 0x4E4F_534A; // "JSON"
const GLB_CHUNK_BIN: u32 = 0x004E_4942; // "BIN\0"

const COMPONENT_F32: u32 = 5126;
const COMPONENT_U16: u32 = 5123;
const COMPONENT_U32: u32 = 5125;

#[derive(Debug, Clone, Copy, Default)]
struct BufferView {
    buffer: u32,
    byte_offset: u32,
    byte_length: u32,
    byte_stride: u32,
}

#[derive(Debug, Clone, Default)]
struct Accessor {
    buffer_view: u32,
    byte_offset: u32,
    count: u32,
    component_type: u32,
    ty: String,
}

/// Splits a `.glb` container into its JSON text and BIN chunk, or reads a
/// `.gltf` file as JSON text with no BIN chunk.
fn load_gltf_json(path: &Path) -> Result<(String, Vec<u8>), Error> {
    let is_glb = path
        .extension()
        .and_then(|extension| extension.to_str())
        .map(|extension| extension.eq_ignore_ascii_case("glb"))
        .unwrap_or(false);

    if !is_glb {
        let text = fs::read_to_string(path).map_err(|err| Error::FailedLoading {
            path: path.to_owned(),
            reason: err.to_string(),
        })?;
        return Ok((text, Vec::new()));
    }

    let bytes = fs::read(path).map_err(|err| Error::FailedLoading {
        path: path.to_owned(),
        reason: err.to_string(),
    })?;
    if bytes.len() < 12 {
        return Err(Error::MalformedContainer("file shorter than the GLB header".to_owned()));
    }
    if LittleEndian::read_u32(&bytes[0..4]) != GLB_MAGIC {
        return Err(Error::MalformedContainer("missing glTF magic".to_owned()));
    }
    if LittleEndian::read_u32(&bytes[4..8]) != 2 {
        return Err(Error::MalformedContainer("unsupported container version".to_owned()));
    }

    let mut json_text = String::new();
    let mut bin_chunk = Vec::new();
    let mut offset = 12usize;
    while offset + 8 <= bytes.len() {
        let chunk_length = LittleEndian::read_u32(&bytes[offset..offset + 4]) as usize;
        let chunk_type = LittleEndian::read_u32(&bytes[offset + 4..offset + 8]);
        offset += 8;
        if offset + chunk_length > bytes.len() {
            return Err(Error::MalformedContainer("chunk exceeds the file".to_owned()));
        }
        let chunk = &bytes[offset..offset + chunk_length];
        match chunk_type {
            GLB_CHUNK_JSON => {
                json_text = String::from_utf8(chunk.to_vec()).map_err(|_| {
                    Error::MalformedContainer("JSON chunk is not valid UTF-8".to_owned())
                })?;
            }
            GLB_CHUNK_BIN => bin_chunk = chunk.to_vec(),
            _ => {}
        }
        offset += chunk_length;
    }

    if json_text.is_empty() {
        return Err(Error::MalformedContainer("missing JSON chunk".to_owned()));
    }
    Ok((json_text, bin_chunk))
}

fn get_array<'a>(root: &'a Value, key: &str) -> Result<&'a Vec<Value>, Error> {
    find_ci(root, key)
        .and_then(Value::as_array)
        .ok_or_else(|| Error::MalformedDocument(format!("missing '{key}' array")))
}

fn load_buffers(
    root: &Value,
    base_path: &Path,
    bin_chunk: Vec<u8>,
) -> Result<Vec<Vec<u8>>, Error> {
    let buffer_values = get_array(root, "buffers")?;
    let mut buffers = Vec::with_capacity(buffer_values.len());
    for (index, buffer_value) in buffer_values.iter().enumerate() {
        if !buffer_value.is_object() {
            return Err(Error::MalformedDocument(format!("buffer {index} is not an object")));
        }

        if let Some(uri) = get_str(find_ci(buffer_value, "uri")) {
            if uri.starts_with("data:") {
                return Err(Error::UnsupportedBuffer(
                    "embedded data: URIs are not supported".to_owned(),
                ));
            }
            let buffer_path = base_path.join(uri);
            let bytes = fs::read(&buffer_path).map_err(|err| Error::FailedLoading {
                path: buffer_path,
                reason: err.to_string(),
            })?;
            buffers.push(bytes);
        } else {
            // Only the first buffer may be the GLB-embedded one.
            if index != 0 || bin_chunk.is_empty() {
                return Err(Error::UnsupportedBuffer(format!(
                    "buffer {index} has no uri and no BIN chunk backs it"
                )));
            }
            buffers.push(bin_chunk.clone());
        }
    }
    Ok(buffers)
}

fn load_buffer_views(root: &Value) -> Result<Vec<BufferView>, Error> {
    let view_values = get_array(root, "bufferViews")?;
    let mut views = Vec::with_capacity(view_values.len());
    for (index, view_value) in view_values.iter().enumerate() {
        let buffer = get_u32(find_ci(view_value, "buffer"));
        let byte_length = get_u32(find_ci(view_value, "byteLength"));
        let (Some(buffer), Some(byte_length)) = (buffer, byte_length) else {
            return Err(Error::MalformedDocument(format!("bufferView {index} is incomplete")));
        };
        views.push(BufferView {
            buffer,
            byte_offset: get_u32(find_ci(view_value, "byteOffset")).unwrap_or(0),
            byte_length,
            byte_stride: get_u32(find_ci(view_value, "byteStride")).unwrap_or(0),
        });
    }
    Ok(views)
}

fn load_accessors(root: &Value) -> Result<Vec<Accessor>, Error> {
    let accessor_values = get_array(root, "accessors")?;
    let mut accessors = Vec::with_capacity(accessor_values.len());
    for (index, accessor_value) in accessor_values.iter().enumerate() {
        let buffer_view = get_u32(find_ci(accessor_value, "bufferView"));
        let component_type = get_u32(find_ci(accessor_value, "componentType"));
        let count = get_u32(find_ci(accessor_value, "count"));
        let ty = get_str(find_ci(accessor_value, "type"));
        let (Some(buffer_view), Some(component_type), Some(count), Some(ty)) =
            (buffer_view, component_type, count, ty)
        else {
            return Err(Error::MalformedDocument(format!("accessor {index} is incomplete")));
        };
        accessors.push(Accessor {
            buffer_view,
            byte_offset: get_u32(find_ci(accessor_value, "byteOffset")).unwrap_or(0),
            count,
            component_type,
            ty: ty.to_owned(),
        });
    }
    Ok(accessors)
}

fn component_count(ty: &str) -> u32 {
    match ty {
        "SCALAR" => 1,
        "VEC2" => 2,
        "VEC3" => 3,
        "VEC4" => 4,
        _ => 0,
    }
}

/// Reads a float accessor as a flat array, honoring the view's byte stride.
fn read_accessor_floats(
    buffers: &[Vec<u8>],
    views: &[BufferView],
    accessors: &[Accessor],
    accessor_index: u32,
    expected_components: u32,
) -> Result<Vec<f32>, Error> {
    let accessor = accessors
        .get(accessor_index as usize)
        .ok_or(Error::MalformedAccessor(accessor_index))?;
    if accessor.component_type != COMPONENT_F32 || accessor.count == 0 {
        return Err(Error::MalformedAccessor(accessor_index));
    }
    let view = views
        .get(accessor.buffer_view as usize)
        .ok_or(Error::MalformedAccessor(accessor_index))?;
    let buffer = buffers
        .get(view.buffer as usize)
        .ok_or(Error::MalformedAccessor(accessor_index))?;

    let components = component_count(&accessor.ty);
    if components != expected_components {
        return Err(Error::MalformedAccessor(accessor_index));
    }

    let component_size = 4u64;
    let element_size = u64::from(components) * component_size;
    let stride = if view.byte_stride != 0 { u64::from(view.byte_stride) } else { element_size };
    let base_offset = u64::from(view.byte_offset) + u64::from(accessor.byte_offset);
    let required = stride * u64::from(accessor.count - 1) + element_size;
    if base_offset + required > buffer.len() as u64 {
        return Err(Error::MalformedAccessor(accessor_index));
    }

    let mut values = Vec::with_capacity(accessor.count as usize * components as usize);
    for element in 0..u64::from(accessor.count) {
        let offset = (base_offset + element * stride) as usize;
        for component in 0..components as usize {
            let at = offset + component * 4;
            values.push(LittleEndian::read_f32(&buffer[at..at + 4]));
        }
    }
    Ok(values)
}

/// Reads an index accessor (u16 or u32 components) widened to u32.
fn read_accessor_indices(
    buffers: &[Vec<u8>],
    views: &[BufferView],
    accessors: &[Accessor],
    accessor_index: u32,
) -> Result<Vec<u32>, Error> {
    let accessor = accessors
        .get(accessor_index as usize)
        .ok_or(Error::MalformedAccessor(accessor_index))?;
    if accessor.count == 0 {
        return Err(Error::MalformedAccessor(accessor_index));
    }
    let view = views
        .get(accessor.buffer_view as usize)
        .ok_or(Error::MalformedAccessor(accessor_index))?;
    let buffer = buffers
        .get(view.buffer as usize)
        .ok_or(Error::MalformedAccessor(accessor_index))?;

    let component_size: u64 = match accessor.component_type {
        COMPONENT_U16 => 2,
        COMPONENT_U32 => 4,
        _ => return Err(Error::MalformedAccessor(accessor_index)),
    };

    let stride = if view.byte_stride != 0 { u64::from(view.byte_stride) } else { component_size };
    let base_offset = u64::from(view.byte_offset) + u64::from(accessor.byte_offset);
    let required = stride * u64::from(accessor.count - 1) + component_size;
    if base_offset + required > buffer.len() as u64 {
        return Err(Error::MalformedAccessor(accessor_index));
    }

    let mut indices = Vec::with_capacity(accessor.count as usize);
    for element in 0..u64::from(accessor.count) {
        let offset = (base_offset + element * stride) as usize;
        let value = if component_size == 2 {
            u32::from(LittleEndian::read_u16(&buffer[offset..offset + 2]))
        } else {
            LittleEndian::read_u32(&buffer[offset..offset + 4])
        };
        indices.push(value);
    }
    Ok(indices)
}

pub(crate) fn import(path: &Path) -> Result<MeshBuild, Error> {
    let (json_text, bin_chunk) = load_gltf_json(path)?;

    let root: Value = serde_json::from_str(&json_text)
        .map_err(|err| Error::MalformedDocument(err.to_string()))?;
    if !root.is_object() {
        return Err(Error::MalformedDocument("root is not an object".to_owned()));
    }

    let base_path = path.parent().unwrap_or_else(|| Path::new("."));
    let buffers = load_buffers(&root, base_path, bin_chunk)?;
    let views = load_buffer_views(&root)?;
    let accessors = load_accessors(&root)?;

    let meshes = get_array(&root, "meshes")?;
    let mesh = meshes
        .first()
        .filter(|mesh| mesh.is_object())
        .ok_or_else(|| Error::MalformedDocument("no meshes".to_owned()))?;
    let primitives = get_array(mesh, "primitives")?;
    let primitive = primitives
        .first()
        .filter(|primitive| primitive.is_object())
        .ok_or_else(|| Error::MalformedDocument("no primitives".to_owned()))?;
    trace!(
        "glTF '{}': {} buffer(s), {} accessor(s), cooking the first primitive",
        path.display(),
        buffers.len(),
        accessors.len()
    );

    let mode = get_u32(find_ci(primitive, "mode")).unwrap_or(4);
    if mode != 4 {
        return Err(Error::UnsupportedTopology(mode));
    }

    let attributes = find_ci(primitive, "attributes")
        .filter(|value| value.is_object())
        .ok_or_else(|| Error::MalformedDocument("primitive has no attributes".to_owned()))?;

    let position_accessor = get_u32(find_ci(attributes, "POSITION"))
        .ok_or_else(|| Error::MalformedDocument("POSITION attribute missing".to_owned()))?;
    let normal_accessor = get_u32(find_ci(attributes, "NORMAL"));
    let uv_accessor = get_u32(find_ci(attributes, "TEXCOORD_0"));

    let positions = read_accessor_floats(&buffers, &views, &accessors, position_accessor, 3)?;
    let normals = match normal_accessor {
        Some(accessor) => read_accessor_floats(&buffers, &views, &accessors, accessor, 3)?,
        None => Vec::new(),
    };
    let uvs = match uv_accessor {
        Some(accessor) => read_accessor_floats(&buffers, &views, &accessors, accessor, 2)?,
        None => Vec::new(),
    };

    let vertex_count = positions.len() / 3;
    if vertex_count == 0 {
        return Err(Error::NoVertexPositions);
    }
    if (!normals.is_empty() && normals.len() / 3 != vertex_count)
        || (!uvs.is_empty() && uvs.len() / 2 != vertex_count)
    {
        return Err(Error::AttributeCountMismatch);
    }

    let indices = match get_u32(find_ci(primitive, "indices")) {
        Some(accessor) => read_accessor_indices(&buffers, &views, &accessors, accessor)?,
        None => {
            // Non-indexed geometry: implicit sequential triangle indices.
            if vertex_count % 3 != 0 {
                return Err(Error::MalformedDocument(
                    "non-indexed vertex count is not a multiple of 3".to_owned(),
                ));
            }
            (0..vertex_count as u32).collect()
        }
    };
    if indices.is_empty() || indices.len() % 3 != 0 {
        return Err(Error::NoIndices);
    }

    let positions: Vec<[f32; 3]> =
        positions.chunks_exact(3).map(|chunk| [chunk[0], chunk[1], chunk[2]]).collect();
    let normals: Vec<[f32; 3]> =
        normals.chunks_exact(3).map(|chunk| [chunk[0], chunk[1], chunk[2]]).collect();
    let uvs: Vec<[f32; 2]> = uvs.chunks_exact(2).map(|chunk| [chunk[0], chunk[1]]).collect();

    finalize(&positions, &normals, &uvs, &indices)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use sable_shared::{
        byteorder::WriteBytesExt,
        serde_json::{json, Value},
    };
    use tempdir::TempDir;

    use super::*;
    use crate::blob::{MESH_INDEX_TYPE_U16, MESH_VERTEX_MASK_POSITION, MESH_VERTEX_MASK_TEXCOORD0};

    /// Little-endian float triangle: three positions, indices 0 1 2 as u16.
    fn triangle_bin() -> Vec<u8> {
        let mut bin = Vec::new();
        for value in
            [0.0f32, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0]
        {
            bin.write_f32::<LittleEndian>(value).unwrap();
        }
        for index in [0u16, 1, 2] {
            bin.write_u16::<LittleEndian>(index).unwrap();
        }
        bin
    }

    fn triangle_document(buffer_byte_length: usize, with_uri: Option<&str>) -> Value {
        let mut buffer = json!({ "byteLength": buffer_byte_length });
        if let Some(uri) = with_uri {
            buffer["uri"] = json!(uri);
        }
        json!({
            "asset": { "version": "2.0" },
            "buffers": [buffer],
            "bufferViews": [
                { "buffer": 0, "byteOffset": 0, "byteLength": 36 },
                { "buffer": 0, "byteOffset": 36, "byteLength": 6 }
            ],
            "accessors": [
                { "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3" },
                { "bufferView": 1, "componentType": 5123, "count": 3, "type": "SCALAR" }
            ],
            "meshes": [
                { "primitives": [ { "attributes": { "POSITION": 0 }, "indices": 1 } ] }
            ]
        })
    }

    fn write_glb(path: &Path, document: &Value, bin: &[u8]) {
        let json_text = document.to_string();
        let mut file_bytes = Vec::new();
        file_bytes.write_u32::<LittleEndian>(GLB_MAGIC).unwrap();
        file_bytes.write_u32::<LittleEndian>(2).unwrap();
        file_bytes.write_u32::<LittleEndian>(0).unwrap(); // total length, unchecked
        file_bytes.write_u32::<LittleEndian>(json_text.len() as u32).unwrap();
        file_bytes.write_u32::<LittleEndian>(GLB_CHUNK_JSON).unwrap();
        file_bytes.write_all(json_text.as_bytes()).unwrap();
        file_bytes.write_u32::<LittleEndian>(bin.len() as u32).unwrap();
        file_bytes.write_u32::<LittleEndian>(GLB_CHUNK_BIN).unwrap();
        file_bytes.write_all(bin).unwrap();
        fs::write(path, file_bytes).unwrap();
    }

    #[test]
    fn glb_triangle_imports() {
        sable_test::setup_logger();

        // Given a minimal GLB with one triangle.
        let root = TempDir::new("gltf").unwrap();
        let glb_path = root.path().join("triangle.glb");
        let bin = triangle_bin();
        write_glb(&glb_path, &triangle_document(bin.len(), None), &bin);

        // When
        let build = import(&glb_path).unwrap();

        // Then
        assert_eq!(build.vertex_count, 3);
        assert_eq!(build.index_count, 3);
        assert_eq!(build.vertex_stride, 12);
        assert_eq!(build.index_type, MESH_INDEX_TYPE_U16);
        assert_eq!(build.vertex_format_mask, MESH_VERTEX_MASK_POSITION);
        assert_eq!(build.bounds_max, [1.0, 1.0, 0.0]);
    }

    #[test]
    fn gltf_with_external_buffer_imports() {
        let root = TempDir::new("gltf").unwrap();
        let bin = triangle_bin();
        fs::write(root.path().join("triangle.bin"), &bin).unwrap();
        let gltf_path = root.path().join("triangle.gltf");
        fs::write(
            &gltf_path,
            triangle_document(bin.len(), Some("triangle.bin")).to_string(),
        )
        .unwrap();

        let build = import(&gltf_path).unwrap();
        assert_eq!(build.vertex_count, 3);
    }

    #[test]
    fn data_uri_fails_closed() {
        let root = TempDir::new("gltf").unwrap();
        let gltf_path = root.path().join("triangle.gltf");
        fs::write(
            &gltf_path,
            triangle_document(42, Some("data:application/octet-stream;base64,AAAA")).to_string(),
        )
        .unwrap();

        assert!(matches!(import(&gltf_path), Err(Error::UnsupportedBuffer(_))));
    }

    #[test]
    fn non_triangle_mode_fails() {
        let root = TempDir::new("gltf").unwrap();
        let bin = triangle_bin();
        let mut document = triangle_document(bin.len(), None);
        document["meshes"][0]["primitives"][0]["mode"] = json!(1);
        let glb_path = root.path().join("lines.glb");
        write_glb(&glb_path, &document, &bin);

        assert!(matches!(import(&glb_path), Err(Error::UnsupportedTopology(1))));
    }

    #[test]
    fn missing_position_fails() {
        let root = TempDir::new("gltf").unwrap();
        let bin = triangle_bin();
        let mut document = triangle_document(bin.len(), None);
        document["meshes"][0]["primitives"][0]["attributes"] = json!({});
        let glb_path = root.path().join("nopos.glb");
        write_glb(&glb_path, &document, &bin);

        assert!(import(&glb_path).is_err());
    }

    #[test]
    fn missing_indices_implies_sequential_triangles() {
        let root = TempDir::new("gltf").unwrap();
        let bin = triangle_bin();
        let mut document = triangle_document(bin.len(), None);
        document["meshes"][0]["primitives"][0].as_object_mut().unwrap().remove("indices");
        let glb_path = root.path().join("implicit.glb");
        write_glb(&glb_path, &document, &bin);

        let build = import(&glb_path).unwrap();
        assert_eq!(build.index_count, 3);
    }

    #[test]
    fn implicit_indices_require_multiple_of_three() {
        let root = TempDir::new("gltf").unwrap();
        let mut bin = Vec::new();
        for value in [0.0f32, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0] {
            bin.write_f32::<LittleEndian>(value).unwrap();
        }
        let document = json!({
            "buffers": [ { "byteLength": bin.len() } ],
            "bufferViews": [ { "buffer": 0, "byteOffset": 0, "byteLength": 48 } ],
            "accessors": [
                { "bufferView": 0, "componentType": 5126, "count": 4, "type": "VEC3" }
            ],
            "meshes": [ { "primitives": [ { "attributes": { "POSITION": 0 } } ] } ]
        });
        let glb_path = root.path().join("four.glb");
        write_glb(&glb_path, &document, &bin);

        assert!(import(&glb_path).is_err());
    }

    #[test]
    fn accessor_range_is_validated() {
        let root = TempDir::new("gltf").unwrap();
        let bin = triangle_bin();
        let mut document = triangle_document(bin.len(), None);
        // Claim more elements than the buffer holds.
        document["accessors"][0]["count"] = json!(400);
        let glb_path = root.path().join("overrun.glb");
        write_glb(&glb_path, &document, &bin);

        assert!(matches!(import(&glb_path), Err(Error::MalformedAccessor(0))));
    }

    #[test]
    fn strided_positions_with_uvs() {
        // One interleaved view: position (12 B) + uv (8 B), stride 20.
        let root = TempDir::new("gltf").unwrap();
        let mut bin = Vec::new();
        for vertex in 0..3 {
            for value in [vertex as f32, 0.0, 0.0] {
                bin.write_f32::<LittleEndian>(value).unwrap();
            }
            for value in [0.25f32, 0.75] {
                bin.write_f32::<LittleEndian>(value).unwrap();
            }
        }
        let document = json!({
            "buffers": [ { "byteLength": bin.len() } ],
            "bufferViews": [
                { "buffer": 0, "byteOffset": 0, "byteLength": 60, "byteStride": 20 }
            ],
            "accessors": [
                { "bufferView": 0, "byteOffset": 0, "componentType": 5126, "count": 3, "type": "VEC3" },
                { "bufferView": 0, "byteOffset": 12, "componentType": 5126, "count": 3, "type": "VEC2" }
            ],
            "meshes": [ { "primitives": [ {
                "attributes": { "POSITION": 0, "TEXCOORD_0": 1 }
            } ] } ]
        });
        let glb_path = root.path().join("strided.glb");
        write_glb(&glb_path, &document, &bin);

        let build = import(&glb_path).unwrap();
        assert_eq!(build.vertex_count, 3);
        assert_eq!(
            build.vertex_format_mask,
            MESH_VERTEX_MASK_POSITION | MESH_VERTEX_MASK_TEXCOORD0
        );
        assert_eq!(build.vertex_stride, 20);
        assert_eq!(build.bounds_max, [2.0, 0.0, 0.0]);
    }

    #[test]
    fn glb_with_bad_magic_fails() {
        let root = TempDir::new("gltf").unwrap();
        let glb_path = root.path().join("bad.glb");
        fs::write(&glb_path, b"not a glb file at all").unwrap();
        assert!(matches!(import(&glb_path), Err(Error::MalformedContainer(_))));
    }
}
