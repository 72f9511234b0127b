//! In-memory table of asset descriptors and redirectors.
//!
//! The registry is built once (from JSON or by explicit insertion) before a
//! cook session starts and is then queried as an immutable snapshot; all
//! lookup methods take `&self` and the borrow checker enforces the
//! single-writer phase. Loading is atomic: a failed load leaves the previous
//! contents untouched.

use std::{fs, path::Path};

use sable_shared::{
    fold_virtual_path,
    serde_json::{self, json, Map, Value},
    uuid::Uuid,
};

use crate::{
    common::{AssetHandle, AssetType, Error, Result},
    json::{find_ci, get_bool, get_f64, get_str, get_u32},
};

pub const SHADER_LANGUAGE_HLSL: u32 = 0;
pub const SHADER_LANGUAGE_SLANG: u32 = 1;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Texture2DDesc {
    pub width: u32,
    pub height: u32,
    pub mip_count: u32,
    pub format: u32,
    pub srgb: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MeshDesc {
    pub vertex_format: u32,
    pub index_format: u32,
    pub sub_mesh_count: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaterialDesc {
    pub pass_count: u32,
    pub shader_count: u32,
    pub variant_count: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelDesc {
    pub node_count: u32,
    pub mesh_ref_count: u32,
    pub material_slot_count: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShaderDesc {
    pub language: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AudioDesc {
    pub codec: u32,
    pub channels: u32,
    pub sample_rate: u32,
    pub duration_seconds: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptDesc {
    pub assembly_path: String,
    pub type_name: String,
}

/// Type-specific description payload of an [`AssetDesc`]. Exactly the
/// variant matching the handle's type is populated; types without payload
/// fields carry [`TypedDesc::None`].
#[derive(Debug, Clone, Default, PartialEq)]
pub enum TypedDesc {
    #[default]
    None,
    Texture2D(Texture2DDesc),
    Mesh(MeshDesc),
    MaterialTemplate(MaterialDesc),
    Model(ModelDesc),
    Shader(ShaderDesc),
    Audio(AudioDesc),
    Script(ScriptDesc),
}

/// One entry of the registry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssetDesc {
    pub handle: AssetHandle,
    /// Case-folded, forward-slash logical path. See
    /// [`sable_shared::fold_virtual_path`].
    pub virtual_path: String,
    /// Location of the cooked artifact, when known.
    pub cooked_path: Option<String>,
    /// Ordered list of assets this asset depends on.
    pub dependencies: Vec<AssetHandle>,
    pub desc: TypedDesc,
}

/// Record of a renamed or replaced asset. Carries no type; resolution picks
/// the type up from the live target where possible.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssetRedirector {
    pub old_uuid: Uuid,
    pub new_uuid: Uuid,
    pub old_virtual_path: String,
}

#[derive(Debug, Default)]
pub struct AssetRegistry {
    assets: Vec<AssetDesc>,
    redirectors: Vec<AssetRedirector>,
}

impl AssetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.assets.clear();
        self.redirectors.clear();
    }

    pub fn assets(&self) -> &[AssetDesc] {
        &self.assets
    }

    pub fn redirectors(&self) -> &[AssetRedirector] {
        &self.redirectors
    }

    /// Adds an asset descriptor. The virtual path is folded on the way in.
    /// If a descriptor with the same UUID already exists it is replaced
    /// (last wins).
    pub fn add_asset(&mut self, mut desc: AssetDesc) {
        desc.virtual_path = fold_virtual_path(&desc.virtual_path);
        insert_asset(&mut self.assets, desc);
    }

    /// Adds a redirector. The old virtual path is folded on the way in.
    pub fn add_redirector(&mut self, mut redirector: AssetRedirector) {
        redirector.old_virtual_path = fold_virtual_path(&redirector.old_virtual_path);
        self.redirectors.push(redirector);
    }

    /// Loads the registry from a JSON file. See [`Self::load_from_json_text`].
    pub fn load_from_json_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let text = fs::read_to_string(path.as_ref())
            .map_err(|_| Error::Registry("Failed to read registry JSON.".to_owned()))?;
        self.load_from_json_text(&text)
    }

    /// Parses a registry document and replaces the current contents.
    ///
    /// The document must carry a numeric `SchemaVersion` and an `Assets`
    /// array; every asset entry requires `Uuid`, `Type` and `VirtualPath`.
    /// `CookedPath`, `Dependencies` and the type-specific `Desc` object are
    /// optional. A `Redirectors` array may follow. Key lookup is
    /// case-insensitive throughout. Any structural violation fails the whole
    /// load and leaves the registry unchanged.
    pub fn load_from_json_text(&mut self, text: &str) -> Result<()> {
        let root: Value = serde_json::from_str(text)
            .map_err(|err| Error::Registry(format!("Registry JSON parse failed: {err}")))?;

        validate_schema(&root)?;

        let mut assets = Vec::new();
        let mut redirectors = Vec::new();
        parse_assets(&root, &mut assets, &mut redirectors)?;

        self.assets = assets;
        self.redirectors = redirectors;
        Ok(())
    }

    /// Serializes the registry back into the schema accepted by
    /// [`Self::load_from_json_text`], so that load → serialize → load
    /// round-trips the (uuid, type, virtual path, dependencies) set.
    pub fn to_json_text(&self) -> String {
        let mut root = Map::new();
        root.insert("SchemaVersion".to_owned(), json!(1));
        root.insert(
            "Assets".to_owned(),
            Value::Array(self.assets.iter().map(asset_to_json).collect()),
        );
        if !self.redirectors.is_empty() {
            let redirectors = self
                .redirectors
                .iter()
                .map(|redirector| {
                    json!({
                        "OldUuid": redirector.old_uuid.to_string(),
                        "NewUuid": redirector.new_uuid.to_string(),
                        "OldVirtualPath": redirector.old_virtual_path,
                    })
                })
                .collect();
            root.insert("Redirectors".to_owned(), Value::Array(redirectors));
        }
        serde_json::to_string_pretty(&Value::Object(root)).expect("registry serialization cannot fail")
    }

    /// Case-insensitive exact match against asset virtual paths, then
    /// against redirector old paths (following the redirector to its
    /// target). Returns an invalid handle if nothing matches.
    pub fn find_by_path(&self, path: &str) -> AssetHandle {
        let folded = fold_virtual_path(path);
        for asset in &self.assets {
            if asset.virtual_path == folded {
                return asset.handle;
            }
        }

        for redirector in &self.redirectors {
            if redirector.old_virtual_path == folded {
                return self.find_by_uuid(&redirector.new_uuid);
            }
        }

        AssetHandle::invalid()
    }

    /// Linear scan by UUID; the nil UUID short-circuits to an invalid
    /// handle.
    pub fn find_by_uuid(&self, uuid: &Uuid) -> AssetHandle {
        if uuid.is_nil() {
            return AssetHandle::invalid();
        }

        for asset in &self.assets {
            if asset.handle.uuid == *uuid {
                return asset.handle;
            }
        }

        AssetHandle::invalid()
    }

    /// Descriptor lookup. The UUID must match; the type is checked only when
    /// the queried handle's type is not [`AssetType::Unknown`], which acts
    /// as a wildcard.
    pub fn desc(&self, handle: &AssetHandle) -> Option<&AssetDesc> {
        if !handle.is_valid() {
            return None;
        }

        self.assets.iter().find(|asset| {
            asset.handle.uuid == handle.uuid
                && (handle.ty == AssetType::Unknown || asset.handle.ty == handle.ty)
        })
    }

    /// Thin wrapper over [`Self::desc`].
    pub fn dependencies(&self, handle: &AssetHandle) -> Option<&[AssetHandle]> {
        self.desc(handle).map(|desc| desc.dependencies.as_slice())
    }

    /// Resolves a handle through the redirector table, one hop at most.
    ///
    /// If a redirector matches the handle's UUID and its new target is a
    /// live asset, the target's current handle (with its real type) is
    /// returned. If the target is absent, a synthetic handle carrying the
    /// new UUID and the *caller's* type is returned, so the caller always
    /// receives some usable handle. Without a matching redirector the input
    /// handle is returned unchanged.
    pub fn resolve_redirector(&self, handle: &AssetHandle) -> AssetHandle {
        if !handle.is_valid() {
            return *handle;
        }

        for redirector in &self.redirectors {
            if redirector.old_uuid == handle.uuid {
                let resolved = self.find_by_uuid(&redirector.new_uuid);
                if resolved.is_valid() {
                    return resolved;
                }

                return AssetHandle::new(redirector.new_uuid, handle.ty);
            }
        }

        *handle
    }
}

/// Last wins: a descriptor replaces any earlier one with the same UUID.
fn insert_asset(assets: &mut Vec<AssetDesc>, desc: AssetDesc) {
    if let Some(existing) = assets.iter_mut().find(|asset| asset.handle.uuid == desc.handle.uuid) {
        *existing = desc;
    } else {
        assets.push(desc);
    }
}

fn validate_schema(root: &Value) -> Result<()> {
    if !root.is_object() {
        return Err(Error::Registry("Root must be a JSON object.".to_owned()));
    }

    if get_f64(find_ci(root, "SchemaVersion")).is_none() {
        return Err(Error::Registry("SchemaVersion is missing or not a number.".to_owned()));
    }

    match find_ci(root, "Assets") {
        Some(assets) if assets.is_array() => Ok(()),
        _ => Err(Error::Registry("Assets array is missing.".to_owned())),
    }
}

fn parse_assets(
    root: &Value,
    out_assets: &mut Vec<AssetDesc>,
    out_redirectors: &mut Vec<AssetRedirector>,
) -> Result<()> {
    let assets_value = find_ci(root, "Assets")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::Registry("Assets array missing.".to_owned()))?;

    for asset_value in assets_value {
        if !asset_value.is_object() {
            return Err(Error::Registry("Asset entry must be an object.".to_owned()));
        }

        let uuid_text = get_str(find_ci(asset_value, "Uuid"))
            .ok_or_else(|| Error::Registry("Asset missing Uuid.".to_owned()))?;
        let type_text = get_str(find_ci(asset_value, "Type"))
            .ok_or_else(|| Error::Registry("Asset missing Type.".to_owned()))?;
        let virtual_path = get_str(find_ci(asset_value, "VirtualPath"))
            .ok_or_else(|| Error::Registry("Asset missing VirtualPath.".to_owned()))?;

        let uuid = Uuid::parse_str(uuid_text)
            .map_err(|_| Error::Registry("Asset Uuid invalid.".to_owned()))?;

        let ty = AssetType::parse(type_text);
        if ty == AssetType::Unknown {
            return Err(Error::Registry("Asset Type invalid.".to_owned()));
        }

        let mut desc = AssetDesc {
            handle: AssetHandle::new(uuid, ty),
            virtual_path: fold_virtual_path(virtual_path),
            cooked_path: get_str(find_ci(asset_value, "CookedPath")).map(str::to_owned),
            ..AssetDesc::default()
        };

        parse_dependencies(asset_value, &mut desc.dependencies)?;

        if let Some(desc_value) = find_ci(asset_value, "Desc").filter(|value| value.is_object()) {
            desc.desc = read_desc_fields(desc_value, ty);
        } else {
            desc.desc = TypedDesc::default_for(ty);
        }

        insert_asset(out_assets, desc);
    }

    if let Some(redirectors_value) = find_ci(root, "Redirectors") {
        let entries = redirectors_value
            .as_array()
            .ok_or_else(|| Error::Registry("Redirectors must be an array.".to_owned()))?;

        for entry in entries {
            if !entry.is_object() {
                return Err(Error::Registry("Redirector entry must be an object.".to_owned()));
            }

            let old_uuid_text = get_str(find_ci(entry, "OldUuid"));
            let new_uuid_text = get_str(find_ci(entry, "NewUuid"));
            let old_path_text = get_str(find_ci(entry, "OldVirtualPath"));
            let (Some(old_uuid_text), Some(new_uuid_text), Some(old_path_text)) =
                (old_uuid_text, new_uuid_text, old_path_text)
            else {
                return Err(Error::Registry("Redirector missing required fields.".to_owned()));
            };

            let (Ok(old_uuid), Ok(new_uuid)) =
                (Uuid::parse_str(old_uuid_text), Uuid::parse_str(new_uuid_text))
            else {
                return Err(Error::Registry("Redirector UUID invalid.".to_owned()));
            };

            out_redirectors.push(AssetRedirector {
                old_uuid,
                new_uuid,
                old_virtual_path: fold_virtual_path(old_path_text),
            });
        }
    }

    Ok(())
}

/// Dependencies are UUID strings or `{Uuid, Type}` objects; entries that do
/// not parse are skipped, a non-array `Dependencies` member fails the load.
fn parse_dependencies(asset_value: &Value, out: &mut Vec<AssetHandle>) -> Result<()> {
    let Some(deps) = find_ci(asset_value, "Dependencies") else {
        return Ok(());
    };
    let entries = deps
        .as_array()
        .ok_or_else(|| Error::Registry("Asset Dependencies invalid.".to_owned()))?;

    for entry in entries {
        match entry {
            Value::String(text) => {
                if let Ok(uuid) = Uuid::parse_str(text) {
                    out.push(AssetHandle::new(uuid, AssetType::Unknown));
                }
            }
            Value::Object(_) => {
                let Some(uuid_text) = get_str(find_ci(entry, "Uuid")) else {
                    continue;
                };
                let Ok(uuid) = Uuid::parse_str(uuid_text) else {
                    continue;
                };
                let ty = get_str(find_ci(entry, "Type"))
                    .map(AssetType::parse)
                    .unwrap_or(AssetType::Unknown);
                out.push(AssetHandle::new(uuid, ty));
            }
            _ => {}
        }
    }

    Ok(())
}

impl TypedDesc {
    pub fn default_for(ty: AssetType) -> TypedDesc {
        match ty {
            AssetType::Texture2D => TypedDesc::Texture2D(Texture2DDesc::default()),
            AssetType::Mesh => TypedDesc::Mesh(MeshDesc::default()),
            AssetType::MaterialTemplate => TypedDesc::MaterialTemplate(MaterialDesc::default()),
            AssetType::Model => TypedDesc::Model(ModelDesc::default()),
            AssetType::Shader => TypedDesc::Shader(ShaderDesc::default()),
            AssetType::Audio => TypedDesc::Audio(AudioDesc::default()),
            AssetType::Script => TypedDesc::Script(ScriptDesc::default()),
            _ => TypedDesc::None,
        }
    }
}

/// Per-type `Desc` fields. Each field is individually optional; absent or
/// mistyped fields keep their default.
fn read_desc_fields(desc_value: &Value, ty: AssetType) -> TypedDesc {
    match ty {
        AssetType::Texture2D => TypedDesc::Texture2D(Texture2DDesc {
            width: get_u32(find_ci(desc_value, "Width")).unwrap_or(0),
            height: get_u32(find_ci(desc_value, "Height")).unwrap_or(0),
            mip_count: get_u32(find_ci(desc_value, "MipCount")).unwrap_or(0),
            format: get_u32(find_ci(desc_value, "Format")).unwrap_or(0),
            srgb: get_bool(find_ci(desc_value, "SRGB")).unwrap_or(true),
        }),
        AssetType::Mesh => TypedDesc::Mesh(MeshDesc {
            vertex_format: get_u32(find_ci(desc_value, "VertexFormat")).unwrap_or(0),
            index_format: get_u32(find_ci(desc_value, "IndexFormat")).unwrap_or(0),
            sub_mesh_count: get_u32(find_ci(desc_value, "SubMeshCount")).unwrap_or(0),
        }),
        AssetType::MaterialTemplate => TypedDesc::MaterialTemplate(MaterialDesc {
            pass_count: get_u32(find_ci(desc_value, "PassCount")).unwrap_or(0),
            shader_count: get_u32(find_ci(desc_value, "ShaderCount")).unwrap_or(0),
            variant_count: get_u32(find_ci(desc_value, "VariantCount")).unwrap_or(0),
        }),
        AssetType::Model => TypedDesc::Model(ModelDesc {
            node_count: get_u32(find_ci(desc_value, "NodeCount")).unwrap_or(0),
            mesh_ref_count: get_u32(find_ci(desc_value, "MeshRefCount")).unwrap_or(0),
            material_slot_count: get_u32(find_ci(desc_value, "MaterialSlotCount")).unwrap_or(0),
        }),
        AssetType::Shader => TypedDesc::Shader(ShaderDesc {
            language: get_u32(find_ci(desc_value, "Language")).unwrap_or(0),
        }),
        AssetType::Audio => TypedDesc::Audio(AudioDesc {
            codec: get_u32(find_ci(desc_value, "Codec")).unwrap_or(0),
            channels: get_u32(find_ci(desc_value, "Channels")).unwrap_or(0),
            sample_rate: get_u32(find_ci(desc_value, "SampleRate")).unwrap_or(0),
            duration_seconds: get_f64(find_ci(desc_value, "Duration")).unwrap_or(0.0) as f32,
        }),
        AssetType::Script => TypedDesc::Script(ScriptDesc {
            assembly_path: get_str(find_ci(desc_value, "AssemblyPath"))
                .unwrap_or_default()
                .to_owned(),
            type_name: get_str(find_ci(desc_value, "TypeName")).unwrap_or_default().to_owned(),
        }),
        _ => TypedDesc::None,
    }
}

fn asset_to_json(asset: &AssetDesc) -> Value {
    let mut entry = Map::new();
    entry.insert("Uuid".to_owned(), json!(asset.handle.uuid.to_string()));
    entry.insert("Type".to_owned(), json!(asset.handle.ty.as_str()));
    entry.insert("VirtualPath".to_owned(), json!(asset.virtual_path));
    if let Some(cooked_path) = &asset.cooked_path {
        entry.insert("CookedPath".to_owned(), json!(cooked_path));
    }
    if !asset.dependencies.is_empty() {
        let dependencies = asset
            .dependencies
            .iter()
            .map(|handle| {
                json!({
                    "Uuid": handle.uuid.to_string(),
                    "Type": handle.ty.as_str(),
                })
            })
            .collect();
        entry.insert("Dependencies".to_owned(), Value::Array(dependencies));
    }
    if let Some(desc) = desc_to_json(&asset.desc) {
        entry.insert("Desc".to_owned(), desc);
    }
    Value::Object(entry)
}

fn desc_to_json(desc: &TypedDesc) -> Option<Value> {
    match desc {
        TypedDesc::None => None,
        TypedDesc::Texture2D(texture) => Some(json!({
            "Width": texture.width,
            "Height": texture.height,
            "MipCount": texture.mip_count,
            "Format": texture.format,
            "SRGB": texture.srgb,
        })),
        TypedDesc::Mesh(mesh) => Some(json!({
            "VertexFormat": mesh.vertex_format,
            "IndexFormat": mesh.index_format,
            "SubMeshCount": mesh.sub_mesh_count,
        })),
        TypedDesc::MaterialTemplate(material) => Some(json!({
            "PassCount": material.pass_count,
            "ShaderCount": material.shader_count,
            "VariantCount": material.variant_count,
        })),
        TypedDesc::Model(model) => Some(json!({
            "NodeCount": model.node_count,
            "MeshRefCount": model.mesh_ref_count,
            "MaterialSlotCount": model.material_slot_count,
        })),
        TypedDesc::Shader(shader) => Some(json!({
            "Language": shader.language,
        })),
        TypedDesc::Audio(audio) => Some(json!({
            "Codec": audio.codec,
            "Channels": audio.channels,
            "SampleRate": audio.sample_rate,
            "Duration": audio.duration_seconds,
        })),
        TypedDesc::Script(script) => Some(json!({
            "AssemblyPath": script.assembly_path,
            "TypeName": script.type_name,
        })),
    }
}
