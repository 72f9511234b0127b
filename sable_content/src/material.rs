//! Material template cooking.
//!
//! A material template is a JSON object naming render passes; each pass
//! references its shader stages (vertex, pixel, compute) and may override
//! shader parameters. Cooking resolves every path-form shader reference
//! against a caller-supplied virtual-path map, collects the deduplicated
//! dependency list and re-emits the template as cooked JSON with resolved
//! UUIDs, preserving the pass/override/variant structure.
//!
//! Override parameter names are hashed with FNV-1a (32-bit) to the stable
//! ids the runtime binds by.

use sable_shared::{
    ahash::AHashMap,
    fold_virtual_path,
    serde_json::{self, json, Map, Number, Value},
    thiserror,
    uuid::Uuid,
};

use crate::{
    common::{AssetHandle, AssetType},
    json::{find_ci, get_str},
    registry::MaterialDesc,
};

const FNV_OFFSET_32: u32 = 2_166_136_261;
const FNV_PRIME_32: u32 = 16_777_619;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Material source is empty")]
    EmptySource,
    #[error("Material JSON parse failed: {0}")]
    ParseFailed(String),
    #[error("Material JSON root invalid")]
    InvalidRoot,
    #[error("Material Passes missing")]
    PassesMissing,
    #[error("Material pass '{0}' has no shaders")]
    ShadersMissing(String),
    #[error("Material pass '{0}' requires at least a vertex or a compute stage")]
    NoEntryStage(String),
    #[error("Material has no passes")]
    NoPasses,
    #[error("Material shader asset not found: {0}")]
    ShaderNotFound(String),
    #[error("Material shader asset is not a shader: {0}")]
    ShaderWrongType(String),
}

impl From<Error> for crate::Error {
    fn from(value: Error) -> Self {
        crate::Error::Other(Box::new(value))
    }
}

/// Stable 32-bit parameter id of an override name (FNV-1a). The empty name
/// hashes to 0, which no real parameter uses.
pub fn hash_param_name(name: &str) -> u32 {
    if name.is_empty() {
        return 0;
    }
    let mut hash = FNV_OFFSET_32;
    for byte in name.bytes() {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME_32);
    }
    hash
}

/// Reference to a shader stage: either a virtual path still to be resolved
/// or an already resolved handle.
#[derive(Debug, Clone, PartialEq)]
pub enum StageReference {
    VirtualPath(String),
    Handle(AssetHandle),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShaderStage {
    pub reference: StageReference,
    pub entry: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OverrideValue {
    Scalar(f64),
    Array(Vec<f64>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OverrideParam {
    pub name: String,
    /// FNV-1a id of `name`; see [`hash_param_name`].
    pub param_id: u32,
    pub type_name: String,
    pub value: OverrideValue,
}

#[derive(Debug, Clone, Default)]
pub struct MaterialPass {
    pub name: String,
    pub vertex: Option<ShaderStage>,
    pub pixel: Option<ShaderStage>,
    pub compute: Option<ShaderStage>,
    pub overrides: Vec<OverrideParam>,
}

#[derive(Debug, Clone, Default)]
pub struct MaterialTemplate {
    pub name: Option<String>,
    pub passes: Vec<MaterialPass>,
    pub variants: Vec<Vec<String>>,
}

/// Record a material's shader references are resolved against; keyed by
/// folded virtual path in [`cook_material`]'s map argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssetRecord {
    pub uuid: Uuid,
    pub ty: AssetType,
}

/// Cooked material JSON plus the dependency list and summary descriptor.
#[derive(Debug, Clone)]
pub struct CookedMaterial {
    pub cooked_json: String,
    pub dependencies: Vec<AssetHandle>,
    pub desc: MaterialDesc,
}

fn is_scalar_type(type_name: &str) -> bool {
    type_name.eq_ignore_ascii_case("float") || type_name.eq_ignore_ascii_case("scalar")
}

fn is_vector_type(type_name: &str) -> bool {
    type_name.eq_ignore_ascii_case("float2")
        || type_name.eq_ignore_ascii_case("float3")
        || type_name.eq_ignore_ascii_case("float4")
        || type_name.eq_ignore_ascii_case("vector")
}

fn is_matrix_type(type_name: &str) -> bool {
    type_name.eq_ignore_ascii_case("float4x4") || type_name.eq_ignore_ascii_case("matrix")
}

/// A stage reference is `{Asset, Entry}` (path form) or `{Uuid, Type?,
/// Entry}` (resolved form). Returns `None` when neither form parses.
fn parse_shader_stage(value: &Value) -> Option<ShaderStage> {
    if !value.is_object() {
        return None;
    }

    let entry = get_str(find_ci(value, "Entry"))?.to_owned();
    if entry.is_empty() {
        return None;
    }

    if let Some(asset_path) = get_str(find_ci(value, "Asset")) {
        let folded = fold_virtual_path(asset_path);
        if folded.is_empty() {
            return None;
        }
        return Some(ShaderStage { reference: StageReference::VirtualPath(folded), entry });
    }

    let uuid_text = get_str(find_ci(value, "Uuid"))?;
    let uuid = Uuid::parse_str(uuid_text).ok()?;
    let ty = get_str(find_ci(value, "Type")).map(AssetType::parse).unwrap_or(AssetType::Shader);
    Some(ShaderStage { reference: StageReference::Handle(AssetHandle::new(uuid, ty)), entry })
}

/// Override entries are `name: {Type, Value}`. Entries with an unknown
/// type, a non-numeric value or the wrong matrix arity are skipped.
fn parse_override(name: &str, value: &Value) -> Option<OverrideParam> {
    if !value.is_object() || name.is_empty() {
        return None;
    }

    let type_name = get_str(find_ci(value, "Type"))?.to_owned();
    let value_node = find_ci(value, "Value")?;

    let parsed = match value_node {
        Value::Number(number) => OverrideValue::Scalar(number.as_f64()?),
        Value::Array(entries) => {
            let mut values = Vec::with_capacity(entries.len());
            for entry in entries {
                values.push(entry.as_f64()?);
            }
            OverrideValue::Array(values)
        }
        _ => return None,
    };

    if is_scalar_type(&type_name) {
        if !matches!(parsed, OverrideValue::Scalar(_)) {
            return None;
        }
    } else if is_vector_type(&type_name) {
        if !matches!(&parsed, OverrideValue::Array(values) if !values.is_empty()) {
            return None;
        }
    } else if is_matrix_type(&type_name) {
        if !matches!(&parsed, OverrideValue::Array(values) if values.len() == 16) {
            return None;
        }
    } else {
        return None;
    }

    Some(OverrideParam {
        name: name.to_owned(),
        param_id: hash_param_name(name),
        type_name,
        value: parsed,
    })
}

/// Parses a material template without resolving anything.
pub fn parse_material_template(text: &str) -> Result<MaterialTemplate, Error> {
    if text.trim().is_empty() {
        return Err(Error::EmptySource);
    }

    let root: Value =
        serde_json::from_str(text).map_err(|err| Error::ParseFailed(err.to_string()))?;
    if !root.is_object() {
        return Err(Error::InvalidRoot);
    }

    let mut template = MaterialTemplate {
        name: get_str(find_ci(&root, "Name")).map(str::to_owned),
        ..MaterialTemplate::default()
    };

    let passes_value = find_ci(&root, "Passes")
        .and_then(Value::as_object)
        .ok_or(Error::PassesMissing)?;

    for (pass_name, pass_value) in passes_value {
        if !pass_value.is_object() || pass_name.is_empty() {
            continue;
        }

        let mut pass = MaterialPass { name: pass_name.clone(), ..MaterialPass::default() };

        let shaders_value = find_ci(pass_value, "Shaders")
            .filter(|value| value.is_object())
            .ok_or_else(|| Error::ShadersMissing(pass_name.clone()))?;

        pass.vertex = find_ci(shaders_value, "vs").and_then(parse_shader_stage);
        pass.pixel = find_ci(shaders_value, "ps").and_then(parse_shader_stage);
        pass.compute = find_ci(shaders_value, "cs").and_then(parse_shader_stage);

        if pass.vertex.is_none() && pass.compute.is_none() {
            return Err(Error::NoEntryStage(pass_name.clone()));
        }

        if let Some(overrides_value) = find_ci(pass_value, "Overrides").and_then(Value::as_object) {
            for (override_name, override_value) in overrides_value {
                if let Some(parsed) = parse_override(override_name, override_value) {
                    pass.overrides.push(parsed);
                }
            }
        }

        template.passes.push(pass);
    }

    if let Some(variants_value) = find_ci(&root, "Precompile_Variants").and_then(Value::as_array) {
        for variant_value in variants_value {
            let Some(entries) = variant_value.as_array() else {
                continue;
            };
            let variant: Vec<String> = entries
                .iter()
                .filter_map(Value::as_str)
                .filter(|name| !name.is_empty())
                .map(str::to_owned)
                .collect();
            template.variants.push(variant);
        }
    }

    if template.passes.is_empty() {
        return Err(Error::NoPasses);
    }
    Ok(template)
}

/// Parses a template, resolves every shader stage against `assets_by_path`
/// (keyed by folded virtual path), and emits the cooked JSON, dependency
/// list and summary descriptor.
///
/// Every path-form reference must resolve to a record whose type is exactly
/// [`AssetType::Shader`]. Dependencies are collected deduplicated by UUID
/// in first-seen order.
pub fn cook_material(
    text: &str,
    assets_by_path: &AHashMap<String, AssetRecord>,
) -> crate::Result<CookedMaterial> {
    let mut template = parse_material_template(text)?;

    let mut dependencies: Vec<AssetHandle> = Vec::new();
    let mut seen: Vec<Uuid> = Vec::new();
    let mut shader_count = 0u32;

    for pass in &mut template.passes {
        for stage in [&mut pass.vertex, &mut pass.pixel, &mut pass.compute]
            .into_iter()
            .flatten()
        {
            let handle = match &stage.reference {
                StageReference::VirtualPath(path) => {
                    let record = assets_by_path
                        .get(path)
                        .ok_or_else(|| Error::ShaderNotFound(path.clone()))?;
                    if record.ty != AssetType::Shader {
                        return Err(Error::ShaderWrongType(path.clone()).into());
                    }
                    AssetHandle::new(record.uuid, record.ty)
                }
                StageReference::Handle(handle) => *handle,
            };

            stage.reference = StageReference::Handle(handle);
            shader_count += 1;
            if !seen.contains(&handle.uuid) {
                seen.push(handle.uuid);
                dependencies.push(handle);
            }
        }
    }

    let desc = MaterialDesc {
        pass_count: template.passes.len() as u32,
        shader_count,
        variant_count: template.variants.len() as u32,
    };

    let cooked_json = write_cooked_json(&template)?;
    Ok(CookedMaterial { cooked_json, dependencies, desc })
}

fn number(value: f64) -> Value {
    Number::from_f64(value).map(Value::Number).unwrap_or_else(|| json!(0.0))
}

fn stage_to_json(stage: &ShaderStage) -> Value {
    match &stage.reference {
        StageReference::Handle(handle) => json!({
            "Uuid": handle.uuid.to_string(),
            "Type": handle.ty.as_str(),
            "Entry": stage.entry,
        }),
        // Unresolved references only appear when emitting a parse-only
        // template; the cooked path always resolves first.
        StageReference::VirtualPath(path) => json!({
            "Asset": path,
            "Entry": stage.entry,
        }),
    }
}

fn write_cooked_json(template: &MaterialTemplate) -> crate::Result<String> {
    let mut root = Map::new();
    if let Some(name) = &template.name {
        if !name.is_empty() {
            root.insert("Name".to_owned(), json!(name));
        }
    }

    let mut passes = Map::new();
    for pass in &template.passes {
        let mut shaders = Map::new();
        if let Some(stage) = &pass.vertex {
            shaders.insert("vs".to_owned(), stage_to_json(stage));
        }
        if let Some(stage) = &pass.pixel {
            shaders.insert("ps".to_owned(), stage_to_json(stage));
        }
        if let Some(stage) = &pass.compute {
            shaders.insert("cs".to_owned(), stage_to_json(stage));
        }

        let mut pass_object = Map::new();
        pass_object.insert("Shaders".to_owned(), Value::Object(shaders));

        if !pass.overrides.is_empty() {
            let mut overrides = Map::new();
            for param in &pass.overrides {
                let value = match &param.value {
                    OverrideValue::Scalar(scalar) => number(*scalar),
                    OverrideValue::Array(values) => {
                        Value::Array(values.iter().map(|value| number(*value)).collect())
                    }
                };
                overrides.insert(
                    param.name.clone(),
                    json!({ "Type": param.type_name, "Value": value }),
                );
            }
            pass_object.insert("Overrides".to_owned(), Value::Object(overrides));
        }

        passes.insert(pass.name.clone(), Value::Object(pass_object));
    }
    root.insert("Passes".to_owned(), Value::Object(passes));

    let variants: Vec<Value> = template
        .variants
        .iter()
        .map(|variant| Value::Array(variant.iter().map(|name| json!(name)).collect()))
        .collect();
    root.insert("Precompile_Variants".to_owned(), Value::Array(variants));

    Ok(serde_json::to_string_pretty(&Value::Object(root))?)
}

/// Builds the path map from registry-shaped records, for callers that hold
/// `(virtual path, uuid, type)` triples.
pub fn build_path_map<'a>(
    records: impl IntoIterator<Item = (&'a str, Uuid, AssetType)>,
) -> AHashMap<String, AssetRecord> {
    records
        .into_iter()
        .map(|(path, uuid, ty)| (fold_virtual_path(path), AssetRecord { uuid, ty }))
        .collect()
}
