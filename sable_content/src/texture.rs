//! Texture cooking: decodes a PNG or JPEG source into a fixed-format pixel
//! blob. The pixel layout is one of R8, RGB8 or RGBA8; decoded layouts
//! outside those three are converted to RGBA8. Whether the pixels are SRGB
//! is the caller's statement, carried in the header flag bit, not derived
//! from the data.

use image::DynamicImage;
use sable_shared::thiserror;

use crate::{
    blob::{
        texture_bytes_per_pixel, BlobHeader, Texture2DBlobDesc, BLOB_FLAG_SRGB, TEXTURE_FORMAT_R8,
        TEXTURE_FORMAT_RGB8, TEXTURE_FORMAT_RGBA8,
    },
    common::AssetType,
    registry::Texture2DDesc,
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Failed to decode the image: {0}")]
    Decode(image::ImageError),
    #[error("Image has no pixels")]
    Empty,
    #[error("Row pitch {row_pitch} is smaller than {minimum}")]
    RowPitchTooSmall { row_pitch: u32, minimum: u32 },
    #[error("Decoded byte count {actual} does not match the expected {expected}")]
    SizeMismatch { actual: usize, expected: usize },
}

impl From<Error> for crate::Error {
    fn from(value: Error) -> Self {
        crate::Error::Other(Box::new(value))
    }
}

/// Cooked texture blob plus the summary descriptor for the registry.
#[derive(Debug, Clone)]
pub struct CookedTexture {
    pub blob: Vec<u8>,
    pub desc: Texture2DDesc,
}

/// Decodes `source_bytes` and cooks a single-mip pixel blob.
pub fn cook_texture(source_bytes: &[u8], srgb: bool) -> crate::Result<CookedTexture> {
    if source_bytes.is_empty() {
        return Err(Error::Empty.into());
    }

    let image = image::load_from_memory(source_bytes).map_err(Error::Decode)?;
    let width = image.width();
    let height = image.height();
    if width == 0 || height == 0 {
        return Err(Error::Empty.into());
    }

    let (format, pixels): (u32, Vec<u8>) = match image {
        DynamicImage::ImageLuma8(image) => (TEXTURE_FORMAT_R8, image.into_raw()),
        DynamicImage::ImageRgb8(image) => (TEXTURE_FORMAT_RGB8, image.into_raw()),
        DynamicImage::ImageRgba8(image) => (TEXTURE_FORMAT_RGBA8, image.into_raw()),
        other => (TEXTURE_FORMAT_RGBA8, other.to_rgba8().into_raw()),
    };

    let bytes_per_pixel = texture_bytes_per_pixel(format);
    let minimum = width * bytes_per_pixel;
    let row_pitch = (pixels.len() / height as usize) as u32;
    if row_pitch < minimum {
        return Err(Error::RowPitchTooSmall { row_pitch, minimum }.into());
    }

    let expected = row_pitch as usize * height as usize;
    if pixels.len() != expected {
        return Err(Error::SizeMismatch { actual: pixels.len(), expected }.into());
    }

    let desc = Texture2DBlobDesc { width, height, format, mip_count: 1, row_pitch };
    let flags = if srgb { BLOB_FLAG_SRGB } else { 0 };
    let header = BlobHeader::new(
        AssetType::Texture2D,
        flags,
        Texture2DBlobDesc::SIZE as u32,
        expected as u32,
    );

    let mut blob = Vec::with_capacity(BlobHeader::SIZE + Texture2DBlobDesc::SIZE + pixels.len());
    header.write(&mut blob)?;
    desc.write(&mut blob)?;
    blob.extend_from_slice(&pixels);

    Ok(CookedTexture {
        blob,
        desc: Texture2DDesc { width, height, mip_count: 1, format, srgb },
    })
}
