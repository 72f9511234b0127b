use std::{
    fmt::{self, Formatter},
    io,
    path::{Path, PathBuf},
    result,
};

use sable_shared::{serde_json, thiserror, uuid::Uuid};
use serde::{Deserialize, Serialize};

pub type Result<T> = result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid path: {0}")]
    InvalidPath(PathBuf),
    #[error("Invalid extension '{0}' in path {1}")]
    InvalidExtension(String, PathBuf),
    #[error("IoError: {0}")]
    IoError(#[from] io::Error),
    #[error("JsonError: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Registry error: {0}")]
    Registry(String),
    #[error("Unresolved reference: {0}")]
    UnresolvedReference(String),
    #[error("Include cycle detected at: {0}")]
    IncludeCycle(PathBuf),
    #[error("Include not found: {0}")]
    IncludeNotFound(String),
    #[error("Failed to read the asset: {0}")]
    InvalidAssetData(PathBuf),
    #[error("Invalid meta file: {0}")]
    InvalidMeta(PathBuf),
    #[error("Other: {0}")]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

/// Kind of an asset as stored in the registry and in cooked blob headers.
///
/// The numeric discriminants are part of the blob format and must not be
/// reordered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetType {
    #[default]
    Unknown = 0,
    Texture2D = 1,
    Mesh = 2,
    MaterialTemplate = 3,
    Audio = 4,
    Script = 5,
    Redirector = 6,
    MaterialInstance = 7,
    Shader = 8,
    Model = 9,
}

impl AssetType {
    /// Parses the JSON text form of an asset type. Matching is
    /// case-insensitive and unknown spellings map to [`AssetType::Unknown`].
    ///
    /// # Example
    ///
    /// ```
    /// use sable_content::AssetType;
    /// assert_eq!(AssetType::parse("TEXTURE2D"), AssetType::Texture2D);
    /// assert_eq!(AssetType::parse("material"), AssetType::MaterialTemplate);
    /// assert_eq!(AssetType::parse("gizmo"), AssetType::Unknown);
    /// ```
    pub fn parse(text: &str) -> AssetType {
        if text.eq_ignore_ascii_case("texture2d") {
            AssetType::Texture2D
        } else if text.eq_ignore_ascii_case("mesh") {
            AssetType::Mesh
        } else if text.eq_ignore_ascii_case("material") || text.eq_ignore_ascii_case("materialtemplate") {
            AssetType::MaterialTemplate
        } else if text.eq_ignore_ascii_case("materialinstance") {
            AssetType::MaterialInstance
        } else if text.eq_ignore_ascii_case("shader") {
            AssetType::Shader
        } else if text.eq_ignore_ascii_case("audio") {
            AssetType::Audio
        } else if text.eq_ignore_ascii_case("script") {
            AssetType::Script
        } else if text.eq_ignore_ascii_case("redirector") {
            AssetType::Redirector
        } else if text.eq_ignore_ascii_case("model") {
            AssetType::Model
        } else {
            AssetType::Unknown
        }
    }

    /// Canonical text form used when serializing registries and cooked JSON.
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetType::Unknown => "Unknown",
            AssetType::Texture2D => "Texture2D",
            AssetType::Mesh => "Mesh",
            AssetType::MaterialTemplate => "MaterialTemplate",
            AssetType::Audio => "Audio",
            AssetType::Script => "Script",
            AssetType::Redirector => "Redirector",
            AssetType::MaterialInstance => "MaterialInstance",
            AssetType::Shader => "Shader",
            AssetType::Model => "Model",
        }
    }

    /// Single-byte form stored in blob headers.
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> AssetType {
        match value {
            1 => AssetType::Texture2D,
            2 => AssetType::Mesh,
            3 => AssetType::MaterialTemplate,
            4 => AssetType::Audio,
            5 => AssetType::Script,
            6 => AssetType::Redirector,
            7 => AssetType::MaterialInstance,
            8 => AssetType::Shader,
            9 => AssetType::Model,
            _ => AssetType::Unknown,
        }
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Identity of an asset. Two handles refer to the same asset iff their UUIDs
/// are equal; the type is advisory and only validated where a lookup asks
/// for a specific kind.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssetHandle {
    pub uuid: Uuid,
    pub ty: AssetType,
}

impl AssetHandle {
    pub fn new(uuid: Uuid, ty: AssetType) -> Self {
        Self { uuid, ty }
    }

    /// Handle that refers to no asset.
    pub fn invalid() -> Self {
        Self::default()
    }

    /// A handle is valid iff its UUID is non-nil.
    ///
    /// # Example
    ///
    /// ```
    /// use sable_content::{AssetHandle, AssetType};
    /// use sable_shared::uuid::Uuid;
    /// assert!(!AssetHandle::invalid().is_valid());
    /// assert!(AssetHandle::new(Uuid::from_u128(1), AssetType::Unknown).is_valid());
    /// ```
    pub fn is_valid(&self) -> bool {
        !self.uuid.is_nil()
    }
}

impl PartialEq for AssetHandle {
    fn eq(&self, other: &Self) -> bool {
        self.uuid == other.uuid
    }
}

impl Eq for AssetHandle {}

impl std::hash::Hash for AssetHandle {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.uuid.hash(state);
    }
}

impl fmt::Display for AssetHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.uuid, self.ty)
    }
}

pub(crate) fn extract_extension_from_path(path: &Path) -> Result<String> {
    Ok(path
        .extension()
        .and_then(|extension| extension.to_str())
        .map(|extension| extension.to_lowercase())
        .ok_or(Error::InvalidPath(path.to_owned()))?
        .to_owned())
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    #[test]
    fn asset_type_parse_is_case_insensitive() {
        assert_eq!(AssetType::parse("Texture2D"), AssetType::Texture2D);
        assert_eq!(AssetType::parse("MESH"), AssetType::Mesh);
        assert_eq!(AssetType::parse("MaterialTemplate"), AssetType::MaterialTemplate);
        assert_eq!(AssetType::parse("shader"), AssetType::Shader);
        assert_eq!(AssetType::parse("nonsense"), AssetType::Unknown);
    }

    #[test]
    fn asset_type_u8_roundtrip() {
        for ty in [
            AssetType::Unknown,
            AssetType::Texture2D,
            AssetType::Mesh,
            AssetType::MaterialTemplate,
            AssetType::Audio,
            AssetType::Script,
            AssetType::Redirector,
            AssetType::MaterialInstance,
            AssetType::Shader,
            AssetType::Model,
        ] {
            assert_eq!(AssetType::from_u8(ty.to_u8()), ty);
        }
    }

    #[test]
    fn handle_equality_ignores_type() {
        let uuid = Uuid::from_u128(42);
        let a = AssetHandle::new(uuid, AssetType::Mesh);
        let b = AssetHandle::new(uuid, AssetType::Unknown);
        assert_eq!(a, b);
    }

    #[test]
    fn handle_validity_depends_only_on_uuid() {
        assert!(AssetHandle::new(Uuid::from_u128(1), AssetType::Unknown).is_valid());
        assert!(!AssetHandle::new(Uuid::nil(), AssetType::Mesh).is_valid());
    }

    #[test]
    fn extension_is_lowercased() {
        let extension = extract_extension_from_path(Path::new("a/b/Model.OBJ")).unwrap();
        assert_eq!(extension, "obj");
    }

    #[test]
    fn extension_missing_is_an_error() {
        assert!(extract_extension_from_path(Path::new("a/b/noext")).is_err());
    }
}
