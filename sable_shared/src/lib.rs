use std::path::{Component, Path, PathBuf};

pub use ahash;
pub use byteorder;
pub use chrono;
pub use indoc;
pub use log;
pub use serde;
pub use serde_json;
pub use serde_yaml;
pub use thiserror;
pub use uuid;
pub use walkdir;

/// Name of the function this macro is called in
#[macro_export]
macro_rules! function_name {
    () => {{
        fn f() {}
        fn type_name_of<T>(_: T) -> &'static str {
            std::any::type_name::<T>()
        }
        let name = type_name_of(f);
        &name[..name.len() - 3]
    }};
}

/// Folds a virtual path into its canonical stored form: backslashes become
/// forward slashes, ASCII characters are lowercased and a leading `./` is
/// stripped. Lookups against virtual paths are case-insensitive, so every
/// path is folded once on the way into a registry.
///
/// # Example
///
/// ```
/// use sable_shared::fold_virtual_path;
/// assert_eq!(fold_virtual_path("Textures\\Grass.PNG"), "textures/grass.png");
/// assert_eq!(fold_virtual_path("./models/tree.obj"), "models/tree.obj");
/// ```
pub fn fold_virtual_path(path: &str) -> String {
    let mut folded = path.replace('\\', "/").to_ascii_lowercase();
    if let Some(stripped) = folded.strip_prefix("./") {
        folded = stripped.to_owned();
    }
    folded
}

/// Removes `.` components and resolves `..` components lexically, without
/// touching the filesystem. Used to compare paths for identity where two
/// spellings of the same file must collapse to one key.
///
/// # Example
///
/// ```
/// use std::path::Path;
/// use sable_shared::normalize_path;
/// let normalized = normalize_path(Path::new("/shaders/common/../lit.hlsl"));
/// assert_eq!(normalized, Path::new("/shaders/lit.hlsl").to_path_buf());
/// ```
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push(Component::ParentDir);
                }
            }
            other => normalized.push(other),
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    #[test]
    fn fold_replaces_backslashes_and_case() {
        assert_eq!(fold_virtual_path("A\\B\\C.Png"), "a/b/c.png");
    }

    #[test]
    fn fold_strips_leading_dot_slash() {
        assert_eq!(fold_virtual_path("./a/b"), "a/b");
        assert_eq!(fold_virtual_path(".\\a\\b"), "a/b");
    }

    #[test]
    fn normalize_resolves_parent_components() {
        let path = Path::new("a/b/../c/./d");
        assert_eq!(normalize_path(path), Path::new("a/c/d"));
    }

    #[test]
    fn normalize_keeps_leading_parents() {
        let path = Path::new("../a");
        assert_eq!(normalize_path(path), Path::new("../a"));
    }
}
