//! Model blob validation.
//!
//! Model sources arrive already cooked (the scene exporter writes the blob
//! format directly); cooking only has to prove the blob is internally
//! consistent before passing it through: header magic/version/type, desc
//! size, and every section range checked against the payload size with
//! overflow-safe arithmetic.

use std::io::Cursor;

use sable_shared::thiserror;

use crate::{
    blob::{BlobHeader, ModelBlobDesc},
    common::AssetType,
    registry::ModelDesc,
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Model blob is truncated")]
    Truncated,
    #[error("Model blob header is invalid")]
    InvalidHeader,
    #[error("Model blob section range is invalid")]
    InvalidRange,
}

impl From<Error> for crate::Error {
    fn from(value: Error) -> Self {
        crate::Error::Other(Box::new(value))
    }
}

/// Validated model blob plus the summary descriptor for the registry.
#[derive(Debug, Clone)]
pub struct CookedModel {
    pub blob: Vec<u8>,
    pub desc: ModelDesc,
}

fn section_bytes(count: u64, stride: u64) -> Result<u64, Error> {
    if count == 0 {
        return Ok(0);
    }
    count.checked_mul(stride).ok_or(Error::InvalidRange)
}

fn range_within(offset: u64, size: u64, data_size: u64) -> bool {
    offset <= data_size && size <= data_size - offset
}

/// Validates an already-cooked model blob and passes it through unchanged.
pub fn cook_model(source_bytes: &[u8]) -> crate::Result<CookedModel> {
    if source_bytes.len() < BlobHeader::SIZE + ModelBlobDesc::SIZE {
        return Err(Error::Truncated.into());
    }

    let mut cursor = Cursor::new(source_bytes);
    let header = BlobHeader::read(&mut cursor).map_err(|_| Error::Truncated)?;
    if header.check().is_err()
        || header.ty != AssetType::Model.to_u8()
        || header.desc_size as usize != ModelBlobDesc::SIZE
    {
        return Err(Error::InvalidHeader.into());
    }

    let desc = ModelBlobDesc::read(&mut cursor).map_err(|_| Error::Truncated)?;

    let nodes_bytes = section_bytes(u64::from(desc.node_count), ModelBlobDesc::NODE_SIZE as u64)?;
    let mesh_ref_bytes =
        section_bytes(u64::from(desc.mesh_ref_count), ModelBlobDesc::MESH_REF_SIZE as u64)?;
    let material_bytes = section_bytes(
        u64::from(desc.material_slot_count),
        ModelBlobDesc::MATERIAL_SLOT_SIZE as u64,
    )?;

    let data_size = u64::from(header.data_size);
    if !range_within(u64::from(desc.nodes_offset), nodes_bytes, data_size)
        || !range_within(u64::from(desc.mesh_refs_offset), mesh_ref_bytes, data_size)
        || !range_within(u64::from(desc.material_slots_offset), material_bytes, data_size)
    {
        return Err(Error::InvalidRange.into());
    }

    let total_size = BlobHeader::SIZE as u64 + ModelBlobDesc::SIZE as u64 + data_size;
    if (source_bytes.len() as u64) < total_size {
        return Err(Error::Truncated.into());
    }

    Ok(CookedModel {
        blob: source_bytes.to_vec(),
        desc: ModelDesc {
            node_count: desc.node_count,
            mesh_ref_count: desc.mesh_ref_count,
            material_slot_count: desc.material_slot_count,
        },
    })
}
