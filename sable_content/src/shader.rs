//! Shader cooking: recursive `#include` inlining.
//!
//! Includes are expanded pre-order: an included file is fully expanded
//! before the lines after the directive are processed. Each `#include
//! "path"` or `#include <path>` is resolved first against the including
//! file's directory, then against the ordered fallback include directories.
//! Cycles are detected with an explicit stack of normalized absolute paths;
//! an include whose target is already being expanded fails the cook instead
//! of recursing forever.

use std::{
    fs,
    path::{Path, PathBuf},
};

use sable_shared::{log::trace, normalize_path};

use crate::{
    common::{extract_extension_from_path, Error, Result},
    registry::{ShaderDesc, SHADER_LANGUAGE_HLSL, SHADER_LANGUAGE_SLANG},
};

/// Cooked shader text plus the language tag for the registry.
#[derive(Debug, Clone)]
pub struct CookedShader {
    pub text: String,
    pub desc: ShaderDesc,
}

/// Reads `source_path`, expands every include and tags the language from
/// the file extension (`.slang` is Slang, everything else HLSL).
pub fn cook_shader(source_path: &Path, include_dirs: &[PathBuf]) -> Result<CookedShader> {
    let text = fs::read_to_string(source_path)
        .map_err(|_| Error::InvalidAssetData(source_path.to_owned()))?;

    let current_dir = source_path.parent().unwrap_or_else(|| Path::new("."));
    let mut include_stack = vec![normalize_path(source_path)];
    let mut output = String::new();
    preprocess(&text, current_dir, include_dirs, &mut include_stack, &mut output)?;

    let language = match extract_extension_from_path(source_path) {
        Ok(extension) if extension == "slang" => SHADER_LANGUAGE_SLANG,
        _ => SHADER_LANGUAGE_HLSL,
    };

    Ok(CookedShader { text: output, desc: ShaderDesc { language } })
}

fn preprocess(
    text: &str,
    current_dir: &Path,
    include_dirs: &[PathBuf],
    include_stack: &mut Vec<PathBuf>,
    output: &mut String,
) -> Result<()> {
    for line in text.lines() {
        let Some(include_path) = extract_include_path(line) else {
            output.push_str(line);
            output.push('\n');
            continue;
        };

        let resolved = resolve_include(&include_path, current_dir, include_dirs)
            .ok_or_else(|| Error::IncludeNotFound(include_path.clone()))?;

        let resolved = normalize_path(&resolved);
        if include_stack.contains(&resolved) {
            return Err(Error::IncludeCycle(resolved));
        }

        trace!("Inlining '{}'", resolved.display());
        let include_text =
            fs::read_to_string(&resolved).map_err(|_| Error::InvalidAssetData(resolved.clone()))?;

        let include_dir = resolved.parent().unwrap_or_else(|| Path::new(".")).to_owned();
        include_stack.push(resolved);
        preprocess(&include_text, &include_dir, include_dirs, include_stack, output)?;
        include_stack.pop();
        // Keep line-based diagnostics roughly aligned with the source.
        output.push('\n');
    }
    Ok(())
}

/// Extracts the target of an `#include` directive, quoted or bracketed.
/// Returns `None` for every other line.
fn extract_include_path(line: &str) -> Option<String> {
    let trimmed = line.trim_start();
    let rest = trimmed.strip_prefix("#include")?;

    let open = rest.find(|c| c == '"' || c == '<')?;
    let close_char = if rest.as_bytes()[open] == b'<' { '>' } else { '"' };
    let rest = &rest[open + 1..];
    let close = rest.find(close_char)?;
    if close == 0 {
        return None;
    }
    Some(rest[..close].to_owned())
}

fn resolve_include(
    include_path: &str,
    current_dir: &Path,
    include_dirs: &[PathBuf],
) -> Option<PathBuf> {
    let candidate = current_dir.join(include_path);
    if candidate.exists() {
        return Some(candidate);
    }
    for dir in include_dirs {
        let candidate = dir.join(include_path);
        if candidate.exists() {
            return Some(candidate);
        }
    }
    None
}
