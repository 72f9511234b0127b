//! Cooked assets are written as a single self-describing binary blob.
//!
//! ## Overview
//!
//! Every blob starts with a fixed 16-byte header, followed by exactly
//! `desc_size` bytes of a type-specific description struct, followed by
//! `data_size` bytes of packed payload. All integers are little-endian.
//!
//! Header:
//!
//! | Field     | Type | Size (bytes) | Description                        |
//! |-----------|------|--------------|------------------------------------|
//! | Magic     | u32  | 4            | 0x31534141, "AAS1"                 |
//! | Version   | u16  | 2            | 1                                  |
//! | Type      | u8   | 1            | [`AssetType`] discriminant         |
//! | Flags     | u8   | 1            | bit 0 = SRGB (textures only)       |
//! | DescSize  | u32  | 4            | byte size of the desc that follows |
//! | DataSize  | u32  | 4            | byte size of the payload           |
//!
//! The payload's internal sections (attribute table, sub-mesh table, vertex
//! bytes, index bytes, audio chunk table, ...) are located by byte offsets
//! stored inside the desc, relative to the start of the payload. A reader
//! needs only the blob bytes to find every section.

use std::io::{self, Read, Write};

use sable_shared::byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::common::AssetType;

pub const ASSET_BLOB_MAGIC: u32 = 0x3153_4141; // "AAS1"
pub const ASSET_BLOB_VERSION: u16 = 1;

pub const BLOB_FLAG_SRGB: u8 = 1 << 0;

pub const TEXTURE_FORMAT_UNKNOWN: u32 = 0;
pub const TEXTURE_FORMAT_R8: u32 = 1;
pub const TEXTURE_FORMAT_RGB8: u32 = 2;
pub const TEXTURE_FORMAT_RGBA8: u32 = 3;

pub const MESH_SEMANTIC_POSITION: u32 = 0;
pub const MESH_SEMANTIC_NORMAL: u32 = 1;
pub const MESH_SEMANTIC_TANGENT: u32 = 2;
pub const MESH_SEMANTIC_TEXCOORD: u32 = 3;
pub const MESH_SEMANTIC_COLOR: u32 = 4;

pub const MESH_VERTEX_MASK_POSITION: u32 = 1 << 0;
pub const MESH_VERTEX_MASK_NORMAL: u32 = 1 << 1;
pub const MESH_VERTEX_MASK_TEXCOORD0: u32 = 1 << 2;

pub const MESH_VERTEX_FORMAT_UNKNOWN: u32 = 0;
pub const MESH_VERTEX_FORMAT_R32_FLOAT: u32 = 1;
pub const MESH_VERTEX_FORMAT_R32G32_FLOAT: u32 = 2;
pub const MESH_VERTEX_FORMAT_R32G32B32_FLOAT: u32 = 3;
pub const MESH_VERTEX_FORMAT_R32G32B32A32_FLOAT: u32 = 4;

pub const MESH_INDEX_TYPE_U16: u32 = 0;
pub const MESH_INDEX_TYPE_U32: u32 = 1;

pub const AUDIO_CODEC_UNKNOWN: u32 = 0;
pub const AUDIO_CODEC_PCM: u32 = 1;
pub const AUDIO_CODEC_OGG_VORBIS: u32 = 2;

pub const AUDIO_SAMPLE_FORMAT_UNKNOWN: u32 = 0;
pub const AUDIO_SAMPLE_FORMAT_PCM16: u32 = 1;
pub const AUDIO_SAMPLE_FORMAT_PCM32F: u32 = 2;

pub fn texture_bytes_per_pixel(format: u32) -> u32 {
    match format {
        TEXTURE_FORMAT_R8 => 1,
        TEXTURE_FORMAT_RGB8 => 3,
        TEXTURE_FORMAT_RGBA8 => 4,
        _ => 0,
    }
}

pub fn mesh_index_stride(index_type: u32) -> u32 {
    match index_type {
        MESH_INDEX_TYPE_U16 => 2,
        MESH_INDEX_TYPE_U32 => 4,
        _ => 0,
    }
}

pub fn audio_bytes_per_sample(sample_format: u32) -> u32 {
    match sample_format {
        AUDIO_SAMPLE_FORMAT_PCM16 => 2,
        AUDIO_SAMPLE_FORMAT_PCM32F => 4,
        _ => 0,
    }
}

/// Fixed header at the start of every blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlobHeader {
    pub magic: u32,
    pub version: u16,
    pub ty: u8,
    pub flags: u8,
    pub desc_size: u32,
    pub data_size: u32,
}

impl BlobHeader {
    pub const SIZE: usize = 16;

    pub fn new(ty: AssetType, flags: u8, desc_size: u32, data_size: u32) -> Self {
        Self {
            magic: ASSET_BLOB_MAGIC,
            version: ASSET_BLOB_VERSION,
            ty: ty.to_u8(),
            flags,
            desc_size,
            data_size,
        }
    }

    pub fn read<R: Read>(mut reader: R) -> io::Result<Self> {
        Ok(Self {
            magic: reader.read_u32::<LittleEndian>()?,
            version: reader.read_u16::<LittleEndian>()?,
            ty: reader.read_u8()?,
            flags: reader.read_u8()?,
            desc_size: reader.read_u32::<LittleEndian>()?,
            data_size: reader.read_u32::<LittleEndian>()?,
        })
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_u32::<LittleEndian>(self.magic)?;
        writer.write_u16::<LittleEndian>(self.version)?;
        writer.write_u8(self.ty)?;
        writer.write_u8(self.flags)?;
        writer.write_u32::<LittleEndian>(self.desc_size)?;
        writer.write_u32::<LittleEndian>(self.data_size)?;
        Ok(())
    }

    /// Checks magic and version.
    pub fn check(&self) -> io::Result<()> {
        if self.magic != ASSET_BLOB_MAGIC {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "Invalid magic number"));
        }
        if self.version != ASSET_BLOB_VERSION {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "Invalid version number"));
        }
        Ok(())
    }

    pub fn has_flag(&self, flag: u8) -> bool {
        (self.flags & flag) != 0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Texture2DBlobDesc {
    pub width: u32,
    pub height: u32,
    pub format: u32,
    pub mip_count: u32,
    pub row_pitch: u32,
}

impl Texture2DBlobDesc {
    pub const SIZE: usize = 20;

    pub fn read<R: Read>(mut reader: R) -> io::Result<Self> {
        Ok(Self {
            width: reader.read_u32::<LittleEndian>()?,
            height: reader.read_u32::<LittleEndian>()?,
            format: reader.read_u32::<LittleEndian>()?,
            mip_count: reader.read_u32::<LittleEndian>()?,
            row_pitch: reader.read_u32::<LittleEndian>()?,
        })
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_u32::<LittleEndian>(self.width)?;
        writer.write_u32::<LittleEndian>(self.height)?;
        writer.write_u32::<LittleEndian>(self.format)?;
        writer.write_u32::<LittleEndian>(self.mip_count)?;
        writer.write_u32::<LittleEndian>(self.row_pitch)?;
        Ok(())
    }
}

/// Description of a cooked mesh. The four `*_offset` fields locate the
/// attribute table, the sub-mesh table, the vertex bytes and the index bytes
/// inside the payload, in that fixed order.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MeshBlobDesc {
    pub vertex_count: u32,
    pub index_count: u32,
    pub vertex_stride: u32,
    pub index_type: u32,
    pub attribute_count: u32,
    pub sub_mesh_count: u32,
    pub attributes_offset: u32,
    pub sub_meshes_offset: u32,
    pub vertex_data_offset: u32,
    pub index_data_offset: u32,
    pub vertex_data_size: u32,
    pub index_data_size: u32,
    pub bounds_min: [f32; 3],
    pub bounds_max: [f32; 3],
    pub flags: u32,
}

impl MeshBlobDesc {
    pub const SIZE: usize = 76;

    pub fn read<R: Read>(mut reader: R) -> io::Result<Self> {
        let mut desc = Self {
            vertex_count: reader.read_u32::<LittleEndian>()?,
            index_count: reader.read_u32::<LittleEndian>()?,
            vertex_stride: reader.read_u32::<LittleEndian>()?,
            index_type: reader.read_u32::<LittleEndian>()?,
            attribute_count: reader.read_u32::<LittleEndian>()?,
            sub_mesh_count: reader.read_u32::<LittleEndian>()?,
            attributes_offset: reader.read_u32::<LittleEndian>()?,
            sub_meshes_offset: reader.read_u32::<LittleEndian>()?,
            vertex_data_offset: reader.read_u32::<LittleEndian>()?,
            index_data_offset: reader.read_u32::<LittleEndian>()?,
            vertex_data_size: reader.read_u32::<LittleEndian>()?,
            index_data_size: reader.read_u32::<LittleEndian>()?,
            ..Self::default()
        };
        for value in &mut desc.bounds_min {
            *value = reader.read_f32::<LittleEndian>()?;
        }
        for value in &mut desc.bounds_max {
            *value = reader.read_f32::<LittleEndian>()?;
        }
        desc.flags = reader.read_u32::<LittleEndian>()?;
        Ok(desc)
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_u32::<LittleEndian>(self.vertex_count)?;
        writer.write_u32::<LittleEndian>(self.index_count)?;
        writer.write_u32::<LittleEndian>(self.vertex_stride)?;
        writer.write_u32::<LittleEndian>(self.index_type)?;
        writer.write_u32::<LittleEndian>(self.attribute_count)?;
        writer.write_u32::<LittleEndian>(self.sub_mesh_count)?;
        writer.write_u32::<LittleEndian>(self.attributes_offset)?;
        writer.write_u32::<LittleEndian>(self.sub_meshes_offset)?;
        writer.write_u32::<LittleEndian>(self.vertex_data_offset)?;
        writer.write_u32::<LittleEndian>(self.index_data_offset)?;
        writer.write_u32::<LittleEndian>(self.vertex_data_size)?;
        writer.write_u32::<LittleEndian>(self.index_data_size)?;
        for value in self.bounds_min {
            writer.write_f32::<LittleEndian>(value)?;
        }
        for value in self.bounds_max {
            writer.write_f32::<LittleEndian>(value)?;
        }
        writer.write_u32::<LittleEndian>(self.flags)?;
        Ok(())
    }
}

/// One entry of the vertex attribute table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MeshVertexAttribute {
    pub semantic: u32,
    pub semantic_index: u32,
    pub format: u32,
    pub input_slot: u32,
    pub aligned_offset: u32,
    pub per_instance: u32,
    pub instance_step_rate: u32,
}

impl MeshVertexAttribute {
    pub const SIZE: usize = 28;

    pub fn read<R: Read>(mut reader: R) -> io::Result<Self> {
        Ok(Self {
            semantic: reader.read_u32::<LittleEndian>()?,
            semantic_index: reader.read_u32::<LittleEndian>()?,
            format: reader.read_u32::<LittleEndian>()?,
            input_slot: reader.read_u32::<LittleEndian>()?,
            aligned_offset: reader.read_u32::<LittleEndian>()?,
            per_instance: reader.read_u32::<LittleEndian>()?,
            instance_step_rate: reader.read_u32::<LittleEndian>()?,
        })
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_u32::<LittleEndian>(self.semantic)?;
        writer.write_u32::<LittleEndian>(self.semantic_index)?;
        writer.write_u32::<LittleEndian>(self.format)?;
        writer.write_u32::<LittleEndian>(self.input_slot)?;
        writer.write_u32::<LittleEndian>(self.aligned_offset)?;
        writer.write_u32::<LittleEndian>(self.per_instance)?;
        writer.write_u32::<LittleEndian>(self.instance_step_rate)?;
        Ok(())
    }
}

/// One entry of the sub-mesh table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MeshSubMesh {
    pub index_start: u32,
    pub index_count: u32,
    pub base_vertex: i32,
    pub material_slot: u32,
}

impl MeshSubMesh {
    pub const SIZE: usize = 16;

    pub fn read<R: Read>(mut reader: R) -> io::Result<Self> {
        Ok(Self {
            index_start: reader.read_u32::<LittleEndian>()?,
            index_count: reader.read_u32::<LittleEndian>()?,
            base_vertex: reader.read_i32::<LittleEndian>()?,
            material_slot: reader.read_u32::<LittleEndian>()?,
        })
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_u32::<LittleEndian>(self.index_start)?;
        writer.write_u32::<LittleEndian>(self.index_count)?;
        writer.write_i32::<LittleEndian>(self.base_vertex)?;
        writer.write_u32::<LittleEndian>(self.material_slot)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AudioBlobDesc {
    pub codec: u32,
    pub sample_format: u32,
    pub channels: u32,
    pub sample_rate: u32,
    pub frame_count: u32,
    pub chunk_count: u32,
    pub frames_per_chunk: u32,
    pub chunk_table_offset: u32,
    pub data_offset: u32,
    pub data_size: u32,
}

impl AudioBlobDesc {
    pub const SIZE: usize = 40;

    pub fn read<R: Read>(mut reader: R) -> io::Result<Self> {
        Ok(Self {
            codec: reader.read_u32::<LittleEndian>()?,
            sample_format: reader.read_u32::<LittleEndian>()?,
            channels: reader.read_u32::<LittleEndian>()?,
            sample_rate: reader.read_u32::<LittleEndian>()?,
            frame_count: reader.read_u32::<LittleEndian>()?,
            chunk_count: reader.read_u32::<LittleEndian>()?,
            frames_per_chunk: reader.read_u32::<LittleEndian>()?,
            chunk_table_offset: reader.read_u32::<LittleEndian>()?,
            data_offset: reader.read_u32::<LittleEndian>()?,
            data_size: reader.read_u32::<LittleEndian>()?,
        })
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_u32::<LittleEndian>(self.codec)?;
        writer.write_u32::<LittleEndian>(self.sample_format)?;
        writer.write_u32::<LittleEndian>(self.channels)?;
        writer.write_u32::<LittleEndian>(self.sample_rate)?;
        writer.write_u32::<LittleEndian>(self.frame_count)?;
        writer.write_u32::<LittleEndian>(self.chunk_count)?;
        writer.write_u32::<LittleEndian>(self.frames_per_chunk)?;
        writer.write_u32::<LittleEndian>(self.chunk_table_offset)?;
        writer.write_u32::<LittleEndian>(self.data_offset)?;
        writer.write_u32::<LittleEndian>(self.data_size)?;
        Ok(())
    }
}

/// One entry of the audio chunk table. Offsets are payload-relative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AudioChunk {
    pub offset: u32,
    pub size: u32,
}

impl AudioChunk {
    pub const SIZE: usize = 8;

    pub fn read<R: Read>(mut reader: R) -> io::Result<Self> {
        Ok(Self {
            offset: reader.read_u32::<LittleEndian>()?,
            size: reader.read_u32::<LittleEndian>()?,
        })
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_u32::<LittleEndian>(self.offset)?;
        writer.write_u32::<LittleEndian>(self.size)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModelBlobDesc {
    pub node_count: u32,
    pub mesh_ref_count: u32,
    pub material_slot_count: u32,
    pub nodes_offset: u32,
    pub mesh_refs_offset: u32,
    pub material_slots_offset: u32,
}

impl ModelBlobDesc {
    pub const SIZE: usize = 24;

    /// Byte size of one node entry: parent index, mesh ref index,
    /// translation, rotation quaternion, scale.
    pub const NODE_SIZE: usize = 48;
    /// Byte size of one mesh ref entry: handle (uuid + type), material slot
    /// offset and count.
    pub const MESH_REF_SIZE: usize = 28;
    /// Byte size of one material slot entry: a bare handle.
    pub const MATERIAL_SLOT_SIZE: usize = 20;

    pub fn read<R: Read>(mut reader: R) -> io::Result<Self> {
        Ok(Self {
            node_count: reader.read_u32::<LittleEndian>()?,
            mesh_ref_count: reader.read_u32::<LittleEndian>()?,
            material_slot_count: reader.read_u32::<LittleEndian>()?,
            nodes_offset: reader.read_u32::<LittleEndian>()?,
            mesh_refs_offset: reader.read_u32::<LittleEndian>()?,
            material_slots_offset: reader.read_u32::<LittleEndian>()?,
        })
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_u32::<LittleEndian>(self.node_count)?;
        writer.write_u32::<LittleEndian>(self.mesh_ref_count)?;
        writer.write_u32::<LittleEndian>(self.material_slot_count)?;
        writer.write_u32::<LittleEndian>(self.nodes_offset)?;
        writer.write_u32::<LittleEndian>(self.mesh_refs_offset)?;
        writer.write_u32::<LittleEndian>(self.material_slots_offset)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn header_roundtrip() {
        // Given
        let header = BlobHeader::new(AssetType::Texture2D, BLOB_FLAG_SRGB, 20, 16);

        // When
        let mut buf = Vec::new();
        header.write(&mut buf).unwrap();
        let read_back = BlobHeader::read(Cursor::new(&buf)).unwrap();

        // Then
        assert_eq!(buf.len(), BlobHeader::SIZE);
        assert_eq!(read_back, header);
        assert!(read_back.check().is_ok());
        assert!(read_back.has_flag(BLOB_FLAG_SRGB));
    }

    #[test]
    fn header_check_rejects_wrong_magic() {
        let mut header = BlobHeader::new(AssetType::Mesh, 0, 0, 0);
        header.magic = 0xDEAD_BEEF;
        assert!(header.check().is_err());
    }

    #[test]
    fn header_check_rejects_wrong_version() {
        let mut header = BlobHeader::new(AssetType::Mesh, 0, 0, 0);
        header.version = 2;
        assert!(header.check().is_err());
    }

    #[test]
    fn texture_desc_roundtrip() {
        let desc = Texture2DBlobDesc {
            width: 2,
            height: 2,
            format: TEXTURE_FORMAT_RGBA8,
            mip_count: 1,
            row_pitch: 8,
        };
        let mut buf = Vec::new();
        desc.write(&mut buf).unwrap();
        assert_eq!(buf.len(), Texture2DBlobDesc::SIZE);
        assert_eq!(Texture2DBlobDesc::read(Cursor::new(&buf)).unwrap(), desc);
    }

    #[test]
    fn mesh_desc_roundtrip() {
        let desc = MeshBlobDesc {
            vertex_count: 4,
            index_count: 6,
            vertex_stride: 32,
            index_type: MESH_INDEX_TYPE_U16,
            attribute_count: 3,
            sub_mesh_count: 1,
            attributes_offset: 0,
            sub_meshes_offset: 84,
            vertex_data_offset: 100,
            index_data_offset: 228,
            vertex_data_size: 128,
            index_data_size: 12,
            bounds_min: [-1.0, -1.0, 0.0],
            bounds_max: [1.0, 1.0, 0.0],
            flags: 1,
        };
        let mut buf = Vec::new();
        desc.write(&mut buf).unwrap();
        assert_eq!(buf.len(), MeshBlobDesc::SIZE);
        assert_eq!(MeshBlobDesc::read(Cursor::new(&buf)).unwrap(), desc);
    }

    #[test]
    fn table_entry_sizes() {
        let mut buf = Vec::new();
        MeshVertexAttribute::default().write(&mut buf).unwrap();
        assert_eq!(buf.len(), MeshVertexAttribute::SIZE);

        buf.clear();
        MeshSubMesh::default().write(&mut buf).unwrap();
        assert_eq!(buf.len(), MeshSubMesh::SIZE);

        buf.clear();
        AudioChunk::default().write(&mut buf).unwrap();
        assert_eq!(buf.len(), AudioChunk::SIZE);

        buf.clear();
        AudioBlobDesc::default().write(&mut buf).unwrap();
        assert_eq!(buf.len(), AudioBlobDesc::SIZE);

        buf.clear();
        ModelBlobDesc::default().write(&mut buf).unwrap();
        assert_eq!(buf.len(), ModelBlobDesc::SIZE);
    }

    #[test]
    fn strides_and_pixel_sizes() {
        assert_eq!(texture_bytes_per_pixel(TEXTURE_FORMAT_R8), 1);
        assert_eq!(texture_bytes_per_pixel(TEXTURE_FORMAT_RGB8), 3);
        assert_eq!(texture_bytes_per_pixel(TEXTURE_FORMAT_RGBA8), 4);
        assert_eq!(texture_bytes_per_pixel(TEXTURE_FORMAT_UNKNOWN), 0);
        assert_eq!(mesh_index_stride(MESH_INDEX_TYPE_U16), 2);
        assert_eq!(mesh_index_stride(MESH_INDEX_TYPE_U32), 4);
        assert_eq!(audio_bytes_per_sample(AUDIO_SAMPLE_FORMAT_PCM16), 2);
        assert_eq!(audio_bytes_per_sample(AUDIO_SAMPLE_FORMAT_PCM32F), 4);
    }
}
