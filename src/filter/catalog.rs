//! Lazily scanned catalog of filter descriptors.

use super::descriptor::{FilterDescriptor, Requirement};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Default timeout for TCP-service requirement probes.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(500);

type DescriptorMap = BTreeMap<String, Arc<FilterDescriptor>>;

/// The set of known filters, loaded lazily from descriptor directories.
///
/// The first access scans every configured directory for `*.filter` files;
/// the parsed records are cached until [`invalidate`](Self::invalidate) is
/// called. Malformed descriptors are logged and skipped, never aborting the
/// scan. Ids are kept sorted (BTreeMap) so every iteration order exposed by
/// the catalog is deterministic.
pub struct FilterCatalog {
    dirs: Vec<PathBuf>,
    connect_timeout: Duration,
    cache: Mutex<Option<Arc<DescriptorMap>>>,
}

impl FilterCatalog {
    /// Create a catalog over the given descriptor directories, highest
    /// priority first. Nothing is scanned until first use.
    pub fn new(dirs: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        Self {
            dirs: dirs.into_iter().map(Into::into).collect(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            cache: Mutex::new(None),
        }
    }

    /// Build an in-memory catalog from already-constructed descriptors.
    ///
    /// Used by embedders that manage descriptors themselves and by tests.
    /// Duplicate ids keep the earlier descriptor.
    pub fn from_descriptors(descriptors: impl IntoIterator<Item = FilterDescriptor>) -> Self {
        let mut map = DescriptorMap::new();
        for desc in descriptors {
            map.entry(desc.id.clone()).or_insert_with(|| Arc::new(desc));
        }
        Self {
            dirs: Vec::new(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            cache: Mutex::new(Some(Arc::new(map))),
        }
    }

    /// Set the timeout applied to TCP-service requirement probes.
    pub fn set_connect_timeout(&mut self, timeout: Duration) {
        self.connect_timeout = timeout;
    }

    /// List (id, description) summaries for every known filter, sorted by
    /// id.
    pub fn list(&self) -> Vec<(String, String)> {
        self.scan()
            .values()
            .map(|d| (d.id.clone(), d.description.clone()))
            .collect()
    }

    /// Look up one filter by id.
    pub fn get(&self, id: &str) -> Option<Arc<FilterDescriptor>> {
        self.scan().get(id).cloned()
    }

    /// Every descriptor, sorted by id.
    pub fn descriptors(&self) -> Vec<Arc<FilterDescriptor>> {
        self.scan().values().cloned().collect()
    }

    /// Number of known filters.
    pub fn len(&self) -> usize {
        self.scan().len()
    }

    /// Whether the catalog knows no filters.
    pub fn is_empty(&self) -> bool {
        self.scan().is_empty()
    }

    /// Drop the cached scan; the next access rescans the directories.
    ///
    /// Called after external edits to the descriptor files.
    pub fn invalidate(&self) {
        let mut cache = self.cache.lock().unwrap();
        *cache = None;
    }

    /// Evaluate all of a descriptor's requirement expressions.
    ///
    /// Returns true only if every expression parses and is satisfied;
    /// unparsable expressions fail closed. TCP-service probes are bounded
    /// by the catalog's connect timeout.
    pub fn requirements_satisfied(&self, descriptor: &FilterDescriptor) -> bool {
        descriptor.requirements.iter().all(|expr| {
            match Requirement::parse(expr) {
                Some(req) => {
                    let ok = req.satisfied(self.connect_timeout);
                    if !ok {
                        tracing::debug!(
                            filter = %descriptor.id,
                            requirement = %req,
                            "requirement not satisfied"
                        );
                    }
                    ok
                }
                None => {
                    tracing::warn!(
                        filter = %descriptor.id,
                        expr,
                        "unparsable requirement expression"
                    );
                    false
                }
            }
        })
    }

    /// Return the cached scan, performing it on first use.
    fn scan(&self) -> Arc<DescriptorMap> {
        let mut cache = self.cache.lock().unwrap();
        if let Some(map) = cache.as_ref() {
            return Arc::clone(map);
        }

        let mut map = DescriptorMap::new();
        for dir in &self.dirs {
            let entries = match std::fs::read_dir(dir) {
                Ok(entries) => entries,
                Err(err) => {
                    tracing::debug!(dir = %dir.display(), %err, "skipping descriptor directory");
                    continue;
                }
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("filter") {
                    continue;
                }
                match FilterDescriptor::from_file(&path) {
                    Ok(desc) => {
                        if map.contains_key(&desc.id) {
                            // Earlier directories have priority.
                            tracing::debug!(
                                id = %desc.id,
                                path = %path.display(),
                                "descriptor shadowed by higher-priority directory"
                            );
                        } else {
                            map.insert(desc.id.clone(), Arc::new(desc));
                        }
                    }
                    Err(err) => {
                        tracing::warn!(path = %path.display(), %err, "skipping malformed descriptor");
                    }
                }
            }
        }

        let map = Arc::new(map);
        *cache = Some(Arc::clone(&map));
        map
    }
}

impl std::fmt::Debug for FilterCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cache = self.cache.lock().unwrap();
        f.debug_struct("FilterCatalog")
            .field("dirs", &self.dirs)
            .field("scanned", &cache.is_some())
            .field(
                "filters",
                &cache.as_ref().map(|m| m.len()).unwrap_or_default(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_filter(dir: &std::path::Path, id: &str, body: &str) {
        fs::write(dir.join(format!("{id}.filter")), body).unwrap();
    }

    #[test]
    fn test_scan_and_list() {
        let dir = tempfile::tempdir().unwrap();
        write_filter(
            dir.path(),
            "enscript",
            "Comment=Text converter\nMimeTypeIn=text/plain\nMimeTypeOut=application/postscript\n",
        );
        write_filter(
            dir.path(),
            "ps2pdf",
            "Comment=PS to PDF\nMimeTypeIn=application/postscript\nMimeTypeOut=application/pdf\n",
        );

        let catalog = FilterCatalog::new([dir.path()]);
        let list = catalog.list();
        assert_eq!(
            list,
            vec![
                ("enscript".to_string(), "Text converter".to_string()),
                ("ps2pdf".to_string(), "PS to PDF".to_string()),
            ]
        );
    }

    #[test]
    fn test_malformed_descriptor_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write_filter(dir.path(), "good", "MimeTypeIn=a\nMimeTypeOut=b\n");
        write_filter(dir.path(), "bad", "not a descriptor at all\n");
        // Missing mandatory fields is also malformed.
        write_filter(dir.path(), "incomplete", "Name=x\n");

        let catalog = FilterCatalog::new([dir.path()]);
        assert_eq!(catalog.len(), 1);
        assert!(catalog.get("good").is_some());
        assert!(catalog.get("bad").is_none());
    }

    #[test]
    fn test_non_filter_files_ignored() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("README"), "docs").unwrap();
        write_filter(dir.path(), "only", "MimeTypeIn=a\nMimeTypeOut=b\n");

        let catalog = FilterCatalog::new([dir.path()]);
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_directory_priority_on_duplicate_ids() {
        let high = tempfile::tempdir().unwrap();
        let low = tempfile::tempdir().unwrap();
        write_filter(high.path(), "dup", "Comment=high\nMimeTypeIn=a\nMimeTypeOut=b\n");
        write_filter(low.path(), "dup", "Comment=low\nMimeTypeIn=a\nMimeTypeOut=b\n");

        let catalog = FilterCatalog::new([high.path(), low.path()]);
        assert_eq!(catalog.get("dup").unwrap().description, "high");
    }

    #[test]
    fn test_scan_is_cached_until_invalidated() {
        let dir = tempfile::tempdir().unwrap();
        write_filter(dir.path(), "one", "MimeTypeIn=a\nMimeTypeOut=b\n");

        let catalog = FilterCatalog::new([dir.path()]);
        assert_eq!(catalog.len(), 1);

        write_filter(dir.path(), "two", "MimeTypeIn=b\nMimeTypeOut=c\n");
        // Still the cached view.
        assert_eq!(catalog.len(), 1);

        catalog.invalidate();
        assert_eq!(catalog.len(), 2);
    }

    #[test]
    fn test_missing_directory_is_not_fatal() {
        let catalog = FilterCatalog::new(["/nonexistent/platen/filters"]);
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_from_descriptors() {
        let catalog = FilterCatalog::from_descriptors([
            FilterDescriptor::new("b", ["x"], "y"),
            FilterDescriptor::new("a", ["x"], "y"),
        ]);
        let ids: Vec<String> = catalog.list().into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_requirements_satisfied() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("present");
        fs::write(&present, "").unwrap();

        let mut ok = FilterDescriptor::new("ok", ["a"], "b");
        ok.requirements = vec![format!("file:{}", present.display())];

        let mut missing = FilterDescriptor::new("missing", ["a"], "b");
        missing.requirements = vec![format!("file:{}", dir.path().join("absent").display())];

        let mut garbled = FilterDescriptor::new("garbled", ["a"], "b");
        garbled.requirements = vec!["frob:/thing".to_string()];

        let none = FilterDescriptor::new("none", ["a"], "b");

        let catalog = FilterCatalog::from_descriptors(std::iter::empty());
        assert!(catalog.requirements_satisfied(&ok));
        assert!(!catalog.requirements_satisfied(&missing));
        assert!(!catalog.requirements_satisfied(&garbled));
        assert!(catalog.requirements_satisfied(&none));
    }
}
