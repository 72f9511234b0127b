//! Source asset sidecars.
//!
//! Every source file can carry a `.meta` YAML sidecar next to it holding
//! the asset's stable UUID, its type and its virtual path, so re-cooking a
//! source keeps its identity. The cook driver creates missing sidecars with
//! fresh UUIDs and reads existing ones back before cooking.

use std::{fs, path::Path};

use sable_shared::{serde_yaml, uuid::Uuid};
use serde::{Deserialize, Serialize};

use crate::common::{AssetType, Error, Result};

/// Extension of the sidecar, appended to the full source file name
/// (`grass.png` -> `grass.png.meta`).
pub const META_EXTENSION: &str = "meta";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceMeta {
    pub uuid: Uuid,
    #[serde(rename = "type")]
    pub ty: AssetType,
    pub virtual_path: String,
    /// Textures only: whether the pixels are SRGB-encoded. Absent means
    /// SRGB.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub srgb: Option<bool>,
}

impl SourceMeta {
    pub fn new(ty: AssetType, virtual_path: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            ty,
            virtual_path: virtual_path.into(),
            srgb: None,
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<SourceMeta> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|_| Error::InvalidMeta(path.to_owned()))?;
        serde_yaml::from_str(&text).map_err(|_| Error::InvalidMeta(path.to_owned()))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let text =
            serde_yaml::to_string(self).map_err(|_| Error::InvalidMeta(path.to_owned()))?;
        fs::write(path, text)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempdir::TempDir;

    use super::*;

    #[test]
    fn save_and_load_roundtrip() {
        let root = TempDir::new("meta").unwrap();
        let path = root.path().join("grass.png.meta");

        let mut meta = SourceMeta::new(AssetType::Texture2D, "textures/grass.png");
        meta.srgb = Some(false);
        meta.save(&path).unwrap();

        let loaded = SourceMeta::load(&path).unwrap();
        assert_eq!(loaded, meta);
    }

    #[test]
    fn new_sidecars_get_distinct_uuids() {
        let a = SourceMeta::new(AssetType::Mesh, "a.obj");
        let b = SourceMeta::new(AssetType::Mesh, "a.obj");
        assert_ne!(a.uuid, b.uuid);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(SourceMeta::load("does/not/exist.meta").is_err());
    }

    #[test]
    fn malformed_yaml_is_an_error() {
        let root = TempDir::new("meta").unwrap();
        let path = root.path().join("broken.meta");
        std::fs::write(&path, "uuid: [not a uuid").unwrap();
        assert!(SourceMeta::load(&path).is_err());
    }
}
