//! Library name to file path resolution.
//!
//! The locator is pure path computation plus filesystem existence checks: it
//! never loads anything and an unresolvable name is not an error, just
//! `None`. Callers decide whether "not found" is fatal.

use std::path::{Path, PathBuf};

/// Candidate shared-library extensions, in platform preference order.
#[cfg(target_os = "macos")]
const EXTENSIONS: &[&str] = &["so", "dylib"];
#[cfg(target_os = "windows")]
const EXTENSIONS: &[&str] = &["dll"];
#[cfg(not(any(target_os = "macos", target_os = "windows")))]
const EXTENSIONS: &[&str] = &["so"];

/// Conventional library filename prefix on Unix-like platforms.
#[cfg(not(target_os = "windows"))]
const LIB_PREFIX: &str = "lib";
#[cfg(target_os = "windows")]
const LIB_PREFIX: &str = "";

/// Search configuration for the locator.
///
/// Resolution searches each resource *category* (a subdirectory name such as
/// `"modules"` or `"lib"`) in priority order, and within each category every
/// root directory in priority order.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    roots: Vec<PathBuf>,
    categories: Vec<String>,
}

impl SearchConfig {
    /// Create a search configuration over the given root directories.
    ///
    /// The default categories are `"modules"` (plugin modules) followed by
    /// `"lib"` (plain libraries).
    pub fn new(roots: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        Self {
            roots: roots.into_iter().map(Into::into).collect(),
            categories: vec!["modules".to_string(), "lib".to_string()],
        }
    }

    /// Append a root directory with lowest priority.
    pub fn add_root(&mut self, root: impl Into<PathBuf>) {
        self.roots.push(root.into());
    }

    /// Replace the resource-category precedence.
    pub fn set_categories(&mut self, categories: impl IntoIterator<Item = impl Into<String>>) {
        self.categories = categories.into_iter().map(Into::into).collect();
    }

    /// The configured root directories, highest priority first.
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// The configured resource categories, highest priority first.
    pub fn categories(&self) -> &[String] {
        &self.categories
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self::new([
            PathBuf::from("/usr/lib/platen"),
            PathBuf::from("/usr/local/lib/platen"),
            PathBuf::from("."),
        ])
    }
}

/// Resolve a logical library name to a concrete file path.
///
/// Absolute names are returned unchanged. Otherwise each candidate file name
/// (the name itself if it already has an extension, or the name with each
/// platform extension appended) is tried in every category/root combination,
/// category-major. If nothing matches and the name does not already carry the
/// conventional `lib` prefix, the search is retried once with the prefix
/// applied.
///
/// Returns the first matching path, or `None` if the name does not resolve.
pub fn resolve_library_path(name: &str, config: &SearchConfig) -> Option<PathBuf> {
    let as_path = Path::new(name);
    if as_path.is_absolute() {
        return Some(as_path.to_path_buf());
    }

    if let Some(found) = search(name, config) {
        return Some(found);
    }

    // Prefix-normalization retry: "cups" may be installed as "libcups.so".
    if !LIB_PREFIX.is_empty() && !name.starts_with(LIB_PREFIX) {
        let prefixed = format!("{LIB_PREFIX}{name}");
        return search(&prefixed, config);
    }

    None
}

/// One pass over every category/root/extension combination.
fn search(name: &str, config: &SearchConfig) -> Option<PathBuf> {
    let candidates = candidate_names(name);

    for category in config.categories() {
        for root in config.roots() {
            let dir = root.join(category);
            for candidate in &candidates {
                let path = dir.join(candidate);
                if path.exists() {
                    return Some(path);
                }
            }
        }
    }

    None
}

/// Candidate file names for a logical name.
///
/// A name that already has an extension is tried as-is; otherwise each
/// platform extension is appended in preference order.
fn candidate_names(name: &str) -> Vec<String> {
    if Path::new(name).extension().is_some() {
        vec![name.to_string()]
    } else {
        EXTENSIONS.iter().map(|ext| format!("{name}.{ext}")).collect()
    }
}
