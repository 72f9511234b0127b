use std::{
    fs, io,
    path::{Path, PathBuf},
};

use clap::Parser;
use color_eyre as ey;
use ey::eyre::{eyre, Context};
use sable_content::{
    audio::cook_audio,
    material::{build_path_map, cook_material, AssetRecord},
    mesh::cook_mesh,
    meta::SourceMeta,
    model::cook_model,
    registry::{AssetDesc, AssetRegistry, TypedDesc},
    shader::cook_shader,
    texture::cook_texture,
    AssetHandle, AssetType,
};
use sable_shared::{
    ahash::AHashMap,
    fold_virtual_path,
    log::{self, error, info, warn},
    walkdir::WalkDir,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
enum CommandLineArguments {
    Cook(Cook),
}

#[derive(Parser, Debug)]
struct Cook {
    /// Directory containing the source assets
    #[arg(short, long)]
    source_dir: PathBuf,

    /// Directory receiving the cooked assets and the registry JSON
    #[arg(short, long)]
    output_dir: PathBuf,

    /// Additional shader include directories, searched in order
    #[arg(short, long)]
    include_dir: Vec<PathBuf>,
}

/// One source file with its sidecar, ready to cook.
struct SourceAsset {
    source_path: PathBuf,
    meta: SourceMeta,
}

fn asset_type_for_extension(extension: &str) -> AssetType {
    match extension {
        "obj" | "gltf" | "glb" => AssetType::Mesh,
        "png" | "jpg" | "jpeg" => AssetType::Texture2D,
        "hlsl" | "slang" => AssetType::Shader,
        "mat" => AssetType::MaterialTemplate,
        "wav" | "ogg" => AssetType::Audio,
        "model" => AssetType::Model,
        _ => AssetType::Unknown,
    }
}

/// Walks the source tree and pairs every recognized file with its sidecar,
/// creating missing sidecars with fresh UUIDs.
fn collect_sources(source_dir: &Path) -> ey::Result<Vec<SourceAsset>> {
    let mut sources = Vec::new();

    for entry in WalkDir::new(source_dir) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!("Failed to read a directory entry: {err}");
                continue;
            }
        };
        if !entry.path().is_file() {
            continue;
        }

        let Some(extension) = entry.path().extension().and_then(|e| e.to_str()) else {
            continue;
        };
        let extension = extension.to_lowercase();
        if extension == "meta" {
            continue;
        }
        let ty = asset_type_for_extension(&extension);
        if ty == AssetType::Unknown {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(source_dir)
            .wrap_err("source file is not below the source directory")?;
        let virtual_path = fold_virtual_path(&relative.to_string_lossy());

        let meta_path = sidecar_path(entry.path());
        let meta = if meta_path.exists() {
            SourceMeta::load(&meta_path)?
        } else {
            let meta = SourceMeta::new(ty, virtual_path.clone());
            meta.save(&meta_path)?;
            info!("Created sidecar for '{virtual_path}'");
            meta
        };

        sources.push(SourceAsset { source_path: entry.path().to_owned(), meta });
    }

    Ok(sources)
}

fn sidecar_path(source_path: &Path) -> PathBuf {
    let mut file_name = source_path.file_name().unwrap_or_default().to_owned();
    file_name.push(".meta");
    source_path.with_file_name(file_name)
}

/// Cooks one source asset and registers the result. Returns the cooked
/// file name.
fn cook_one(
    source: &SourceAsset,
    include_dirs: &[PathBuf],
    path_map: &AHashMap<String, AssetRecord>,
    output_dir: &Path,
    registry: &mut AssetRegistry,
) -> sable_content::Result<String> {
    let uuid = source.meta.uuid;
    let mut desc = AssetDesc {
        handle: AssetHandle::new(uuid, source.meta.ty),
        virtual_path: source.meta.virtual_path.clone(),
        ..AssetDesc::default()
    };

    let cooked_name = match source.meta.ty {
        AssetType::Mesh => {
            let cooked = cook_mesh(&source.source_path)?;
            let name = format!("{uuid}.blob");
            fs::write(output_dir.join(&name), &cooked.blob)?;
            desc.desc = TypedDesc::Mesh(cooked.desc);
            name
        }
        AssetType::Texture2D => {
            let bytes = fs::read(&source.source_path)?;
            let cooked = cook_texture(&bytes, source.meta.srgb.unwrap_or(true))?;
            let name = format!("{uuid}.blob");
            fs::write(output_dir.join(&name), &cooked.blob)?;
            desc.desc = TypedDesc::Texture2D(cooked.desc);
            name
        }
        AssetType::Shader => {
            let cooked = cook_shader(&source.source_path, include_dirs)?;
            let extension = source
                .source_path
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("hlsl")
                .to_lowercase();
            let name = format!("{uuid}.{extension}");
            fs::write(output_dir.join(&name), cooked.text.as_bytes())?;
            desc.desc = TypedDesc::Shader(cooked.desc);
            name
        }
        AssetType::MaterialTemplate => {
            let text = fs::read_to_string(&source.source_path)?;
            let cooked = cook_material(&text, path_map)?;
            let name = format!("{uuid}.json");
            fs::write(output_dir.join(&name), cooked.cooked_json.as_bytes())?;
            desc.desc = TypedDesc::MaterialTemplate(cooked.desc);
            desc.dependencies = cooked.dependencies;
            name
        }
        AssetType::Audio => {
            let bytes = fs::read(&source.source_path)?;
            let cooked = cook_audio(&source.source_path, &bytes)?;
            let name = format!("{uuid}.blob");
            fs::write(output_dir.join(&name), &cooked.blob)?;
            desc.desc = TypedDesc::Audio(cooked.desc);
            name
        }
        AssetType::Model => {
            let bytes = fs::read(&source.source_path)?;
            let cooked = cook_model(&bytes)?;
            let name = format!("{uuid}.blob");
            fs::write(output_dir.join(&name), &cooked.blob)?;
            desc.desc = TypedDesc::Model(cooked.desc);
            name
        }
        other => {
            return Err(sable_content::Error::InvalidExtension(
                other.to_string(),
                source.source_path.clone(),
            ));
        }
    };

    desc.cooked_path = Some(cooked_name.clone());
    registry.add_asset(desc);
    Ok(cooked_name)
}

fn run_cook(cook: &Cook) -> ey::Result<()> {
    fs::create_dir_all(&cook.output_dir).wrap_err("failed to create the output directory")?;

    let sources = collect_sources(&cook.source_dir)?;
    if sources.is_empty() {
        return Err(eyre!("no cookable assets under {:?}", cook.source_dir));
    }
    info!("Found {} source asset(s)", sources.len());

    // Material shader references resolve by virtual path, so the map must
    // cover every collected source before any material cooks.
    let path_map = build_path_map(
        sources
            .iter()
            .map(|source| (source.meta.virtual_path.as_str(), source.meta.uuid, source.meta.ty)),
    );

    let mut registry = AssetRegistry::new();
    let mut failures = 0usize;
    for source in &sources {
        match cook_one(source, &cook.include_dir, &path_map, &cook.output_dir, &mut registry) {
            Ok(cooked_name) => {
                info!("Cooked '{}' -> '{cooked_name}'", source.meta.virtual_path);
            }
            Err(err) => {
                // One failed asset must not stop the others.
                error!("Failed to cook '{}': {err}", source.meta.virtual_path);
                failures += 1;
            }
        }
    }

    let registry_path = cook.output_dir.join("registry.json");
    fs::write(&registry_path, registry.to_json_text())
        .wrap_err("failed to write the registry JSON")?;
    info!(
        "Wrote {:?}: {} asset(s), {failures} failure(s)",
        registry_path,
        registry.assets().len()
    );

    if failures > 0 {
        return Err(eyre!("{failures} asset(s) failed to cook"));
    }
    Ok(())
}

fn main() -> ey::Result<()> {
    // Setup logging
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}[{}][{}] {}",
                sable_shared::chrono::Local::now().format("[%Y-%m-%d][%H:%M:%S]"),
                record.target(),
                record.level(),
                message
            ))
        })
        .level(log::LevelFilter::Info)
        .chain(io::stdout())
        .apply()
        .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;

    let command_line_arguments = CommandLineArguments::parse();
    match &command_line_arguments {
        CommandLineArguments::Cook(cook) => run_cook(cook),
    }
}
