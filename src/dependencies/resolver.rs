//! Relative import resolution

use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

/// Suffixes tried after the direct path, in order
pub const RESOLVE_EXTENSIONS: &[&str] = &[".js", ".jsx", ".mjs", ".cjs", ".ts", ".tsx"];

/// Normalize `.` and `..` components without touching the filesystem
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn with_suffix(base: &Path, suffix: &str) -> PathBuf {
    let mut s: OsString = base.as_os_str().to_owned();
    s.push(suffix);
    PathBuf::from(s)
}

/// Candidate paths for a specifier, in resolution order
pub fn candidates(from_file: &Path, specifier: &str) -> Vec<PathBuf> {
    let dir = from_file.parent().unwrap_or_else(|| Path::new(""));
    let base = normalize(&dir.join(specifier));

    let mut out = vec![base.clone()];
    out.extend(RESOLVE_EXTENSIONS.iter().map(|ext| with_suffix(&base, ext)));

    // `./x.js` may name a TypeScript source compiled to JS
    if let Some(stem) = specifier.strip_suffix(".js") {
        let stem_path = normalize(&dir.join(stem));
        out.push(with_suffix(&stem_path, ".ts"));
        out.push(with_suffix(&stem_path, ".tsx"));
    }

    out.extend(
        RESOLVE_EXTENSIONS
            .iter()
            .map(|ext| base.join(format!("index{}", ext))),
    );
    out
}

/// Resolve a relative specifier against the run's file set, then the filesystem
pub fn resolve(from_file: &Path, specifier: &str, known: &HashSet<PathBuf>) -> Option<PathBuf> {
    let candidates = candidates(from_file, specifier);
    if let Some(hit) = candidates.iter().find(|c| known.contains(*c)) {
        return Some(hit.clone());
    }
    candidates.into_iter().find(|c| c.is_file())
}
