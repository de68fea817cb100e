//! Shared-object loading with an at-most-once handle cache.
//!
//! The loader owns every [`LibraryHandle`] in the process: repeated load
//! requests for names resolving to the same path return the same handle and
//! run the native load exactly once. Handles are immutable after
//! construction and always in a terminal state (`Loaded` or `Failed`), so
//! the cache needs no per-handle locking.
//!
//! The actual `dlopen` sits behind [`LibraryBackend`]; production code uses
//! [`DlopenBackend`] (libloading), tests substitute a stub so the cache and
//! version-gate invariants are checked without real shared objects.

use super::descriptor::{
    FACTORY_SYMBOL, FactoryEntryFn, LEGACY_PREFIX, PLATEN_ABI_MAJOR, PLUGIN_VERSION_SYMBOL,
    VERSION_SYMBOL, VersionDescriptor, VersionInfo, factory_from_raw,
};
use super::factory::{PluginFactory, PluginObject};
use super::locator::{SearchConfig, resolve_library_path};
use libloading::{Library, Symbol};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors that can occur when loading plugins.
#[derive(Debug, Clone, Error)]
pub enum LoadError {
    /// The name did not resolve to any file.
    #[error("library not found: {name}")]
    NotFound {
        /// The logical name that failed to resolve.
        name: String,
    },

    /// OS-level dynamic-load failure (missing symbols, ABI mismatch,
    /// permissions). Surfaced verbatim.
    #[error("failed to load {path}: {message}")]
    NativeLoadFailed {
        /// Resolved path of the library.
        path: PathBuf,
        /// The loader's error message.
        message: String,
    },

    /// The plugin's embedded version descriptor falls outside the required
    /// major window. Never silently ignored.
    #[error("incompatible plugin version in {path}: found {found}, required {required}")]
    VersionIncompatible {
        /// Resolved path of the library.
        path: PathBuf,
        /// Version the plugin reports.
        found: String,
        /// Version window the loader requires.
        required: String,
    },

    /// The library loaded but exports no factory entry point under either
    /// convention.
    #[error("no factory entry point exported by {path}")]
    NoFactoryExported {
        /// Resolved path of the library.
        path: PathBuf,
    },

    /// An entry point exists but did not produce a usable factory.
    #[error("factory entry point in {path} returned an unusable factory")]
    FactoryWrongType {
        /// Resolved path of the library.
        path: PathBuf,
    },
}

/// Outcome of resolving one factory entry-point symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolError {
    /// The symbol is not exported at all.
    Missing,
    /// The symbol exists but its value is unusable (e.g. a null factory).
    WrongType,
}

/// Load state of a [`LibraryHandle`].
///
/// `Unloaded` and `Loading` are transient states inside the loader; every
/// published handle is terminal (`Loaded` or `Failed`) and never re-enters
/// an earlier state. A fresh attempt for a re-resolved path requires
/// evicting the old handle first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    /// No load has been attempted.
    Unloaded,
    /// A load is in flight.
    Loading,
    /// Terminal success: the native handle is open.
    Loaded,
    /// Terminal failure: the stored error describes why.
    Failed,
}

/// Access to one opened shared object.
///
/// Implementations resolve the well-known Platen symbols. [`DlopenBackend`]
/// provides the real implementation; tests provide stubs.
pub trait NativeHandle: Send + Sync {
    /// The embedded version descriptor, if the plugin exports one.
    fn version_info(&self) -> Option<VersionInfo>;

    /// The plugin-version integer, if the plugin exports one.
    fn plugin_version(&self) -> Option<u32>;

    /// Invoke the factory entry point exported under `symbol`.
    fn factory(&self, symbol: &str) -> Result<Box<dyn PluginFactory>, SymbolError>;
}

/// The native dynamic-load call behind the loader.
pub trait LibraryBackend: Send + Sync {
    /// Open the shared object at `path`.
    fn open(&self, path: &Path) -> Result<Box<dyn NativeHandle>, String>;
}

/// Production backend using `libloading`.
#[derive(Debug, Default)]
pub struct DlopenBackend;

struct DlopenHandle {
    library: Library,
}

impl NativeHandle for DlopenHandle {
    fn version_info(&self) -> Option<VersionInfo> {
        // SAFETY: The symbol, when present, is the plugin's exported static
        // VersionDescriptor; the library stays alive for the read.
        unsafe {
            let sym: Symbol<*const VersionDescriptor> =
                self.library.get(VERSION_SYMBOL).ok()?;
            let ptr: *const VersionDescriptor = *sym;
            if ptr.is_null() {
                return None;
            }
            Some(VersionInfo::from_descriptor(&*ptr))
        }
    }

    fn plugin_version(&self) -> Option<u32> {
        // SAFETY: The symbol, when present, is an exported u32 static.
        unsafe {
            let sym: Symbol<*const u32> = self.library.get(PLUGIN_VERSION_SYMBOL).ok()?;
            let ptr: *const u32 = *sym;
            if ptr.is_null() {
                return None;
            }
            Some(*ptr)
        }
    }

    fn factory(&self, symbol: &str) -> Result<Box<dyn PluginFactory>, SymbolError> {
        let name = format!("{symbol}\0");
        // SAFETY: The entry point has the FactoryEntryFn signature by the
        // plugin ABI contract; the library stays alive for the call.
        unsafe {
            let entry: Symbol<FactoryEntryFn> = self
                .library
                .get(name.as_bytes())
                .map_err(|_| SymbolError::Missing)?;
            let ptr = entry();
            if ptr.is_null() {
                return Err(SymbolError::WrongType);
            }
            Ok(factory_from_raw(ptr))
        }
    }
}

impl LibraryBackend for DlopenBackend {
    fn open(&self, path: &Path) -> Result<Box<dyn NativeHandle>, String> {
        // SAFETY: Loading a dynamic library executes its initializers.
        // Plugins reaching this point came from the configured search roots,
        // which the embedder is expected to trust.
        let library = unsafe { Library::new(path).map_err(|e| e.to_string())? };
        Ok(Box::new(DlopenHandle { library }))
    }
}

/// One loaded (or failed-to-load) shared object.
///
/// Immutable after construction; owned by the [`PluginLoader`] cache and
/// shared out as `Arc<LibraryHandle>`.
pub struct LibraryHandle {
    path: PathBuf,
    state: LoadState,
    version: Option<VersionInfo>,
    plugin_version: Option<u32>,
    error: Option<LoadError>,
    native: Option<Box<dyn NativeHandle>>,
}

impl LibraryHandle {
    fn failed(path: PathBuf, error: LoadError) -> Self {
        Self {
            path,
            state: LoadState::Failed,
            version: None,
            plugin_version: None,
            error: Some(error),
            native: None,
        }
    }

    /// The resolved file path this handle represents.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Terminal load state of this handle.
    pub fn state(&self) -> LoadState {
        self.state
    }

    /// Whether the native handle is open.
    pub fn is_loaded(&self) -> bool {
        self.state == LoadState::Loaded
    }

    /// The plugin's embedded version descriptor, if it exports one.
    pub fn version_info(&self) -> Option<&VersionInfo> {
        self.version.as_ref()
    }

    /// The plugin-version integer, if the plugin exports one.
    pub fn plugin_version(&self) -> Option<u32> {
        self.plugin_version
    }

    /// The error that put this handle into `Failed`, if any.
    pub fn last_error(&self) -> Option<&LoadError> {
        self.error.as_ref()
    }
}

impl std::fmt::Debug for LibraryHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibraryHandle")
            .field("path", &self.path)
            .field("state", &self.state)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

/// Modern factory convention: the fixed no-argument entry point.
fn modern_factory(native: &dyn NativeHandle) -> Result<Box<dyn PluginFactory>, SymbolError> {
    native.factory(FACTORY_SYMBOL)
}

/// Legacy factory convention: `init_<stem>`, where the stem comes from an
/// explicit hint or the library filename.
fn legacy_factory(
    native: &dyn NativeHandle,
    stem: &str,
) -> Result<Box<dyn PluginFactory>, SymbolError> {
    native.factory(&format!("{LEGACY_PREFIX}{stem}"))
}

/// Loader and process-wide handle cache for native plugins.
///
/// Explicitly constructed and passed by reference; there is no ambient
/// global instance. All caches are mutex-guarded, so concurrent callers
/// still observe "at most one native load per resolved path".
pub struct PluginLoader {
    search: SearchConfig,
    backend: Arc<dyn LibraryBackend>,
    handles: Mutex<HashMap<PathBuf, Arc<LibraryHandle>>>,
    legacy_factories: Mutex<HashMap<(PathBuf, String), Arc<dyn PluginFactory>>>,
}

impl PluginLoader {
    /// Create a loader with the default search configuration and the
    /// `dlopen` backend.
    pub fn new() -> Self {
        Self::with_backend(SearchConfig::default(), Arc::new(DlopenBackend))
    }

    /// Create a loader with a custom search configuration.
    pub fn with_search(search: SearchConfig) -> Self {
        Self::with_backend(search, Arc::new(DlopenBackend))
    }

    /// Create a loader with a custom search configuration and backend.
    pub fn with_backend(search: SearchConfig, backend: Arc<dyn LibraryBackend>) -> Self {
        Self {
            search,
            backend,
            handles: Mutex::new(HashMap::new()),
            legacy_factories: Mutex::new(HashMap::new()),
        }
    }

    /// The loader's search configuration.
    pub fn search_config(&self) -> &SearchConfig {
        &self.search
    }

    /// Load a plugin by logical name.
    ///
    /// The name is resolved through the locator; an unresolvable name is
    /// [`LoadError::NotFound`]. Names resolving to an already-attempted path
    /// return that path's terminal outcome without re-running the native
    /// load.
    pub fn load(&self, name: &str) -> Result<Arc<LibraryHandle>, LoadError> {
        let path = resolve_library_path(name, &self.search).ok_or_else(|| {
            LoadError::NotFound {
                name: name.to_string(),
            }
        })?;
        self.load_path(&path)
    }

    /// Load a plugin from an already-resolved path.
    pub fn load_path(&self, path: &Path) -> Result<Arc<LibraryHandle>, LoadError> {
        // The cache lock is held across the native open: a second caller
        // for the same path blocks here and then observes the first call's
        // terminal handle instead of re-executing the load.
        let mut handles = self.handles.lock().unwrap();

        if let Some(handle) = handles.get(path) {
            return Self::terminal_result(handle);
        }

        let handle = Arc::new(self.open_fresh(path));
        handles.insert(path.to_path_buf(), Arc::clone(&handle));
        Self::terminal_result(&handle)
    }

    /// Map a cached terminal handle to the caller-facing result.
    fn terminal_result(handle: &Arc<LibraryHandle>) -> Result<Arc<LibraryHandle>, LoadError> {
        match handle.state {
            LoadState::Loaded => Ok(Arc::clone(handle)),
            _ => Err(handle.error.clone().unwrap_or(LoadError::NativeLoadFailed {
                path: handle.path.clone(),
                message: "load failed".to_string(),
            })),
        }
    }

    /// Perform the native open and version gate for an uncached path.
    fn open_fresh(&self, path: &Path) -> LibraryHandle {
        let native = match self.backend.open(path) {
            Ok(native) => native,
            Err(message) => {
                return LibraryHandle::failed(
                    path.to_path_buf(),
                    LoadError::NativeLoadFailed {
                        path: path.to_path_buf(),
                        message,
                    },
                );
            }
        };

        let version = native.version_info();
        if let Some(info) = &version {
            if !info.is_compatible() {
                let found = info.to_string();
                tracing::warn!(
                    path = %path.display(),
                    found = %found,
                    required_major = PLATEN_ABI_MAJOR,
                    "rejecting plugin with incompatible ABI version"
                );
                // Semantic failure, not an OS failure: the native handle
                // must be released before the error is reported.
                drop(native);
                return LibraryHandle::failed(
                    path.to_path_buf(),
                    LoadError::VersionIncompatible {
                        path: path.to_path_buf(),
                        found,
                        required: format!("abi {PLATEN_ABI_MAJOR}.x"),
                    },
                );
            }
        }

        let plugin_version = native.plugin_version();
        LibraryHandle {
            path: path.to_path_buf(),
            state: LoadState::Loaded,
            version,
            plugin_version,
            error: None,
            native: Some(native),
        }
    }

    /// Resolve a factory from a loaded handle.
    ///
    /// The modern convention (`platen_factory`) is tried first and produces
    /// a fresh factory per call. If that symbol is absent, the legacy
    /// convention (`init_<stem>`, stem from `hint` or the filename) is
    /// tried; legacy factories are cached per (path, symbol) because their
    /// entry points may have first-use side effects.
    pub fn factory(
        &self,
        handle: &LibraryHandle,
        hint: Option<&str>,
    ) -> Result<Arc<dyn PluginFactory>, LoadError> {
        let Some(native) = handle.native.as_deref() else {
            return Err(handle.error.clone().unwrap_or(LoadError::NoFactoryExported {
                path: handle.path.clone(),
            }));
        };

        match modern_factory(native) {
            Ok(factory) => return Ok(Arc::from(factory)),
            Err(SymbolError::WrongType) => {
                return Err(LoadError::FactoryWrongType {
                    path: handle.path.clone(),
                });
            }
            Err(SymbolError::Missing) => {}
        }

        let stem = match hint {
            Some(hint) => hint.to_string(),
            None => handle
                .path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
        };
        let symbol = format!("{LEGACY_PREFIX}{stem}");

        let key = (handle.path.clone(), symbol.clone());
        let mut cache = self.legacy_factories.lock().unwrap();
        if let Some(factory) = cache.get(&key) {
            return Ok(Arc::clone(factory));
        }

        match legacy_factory(native, &stem) {
            Ok(factory) => {
                let factory: Arc<dyn PluginFactory> = Arc::from(factory);
                cache.insert(key, Arc::clone(&factory));
                Ok(factory)
            }
            Err(SymbolError::Missing) => Err(LoadError::NoFactoryExported {
                path: handle.path.clone(),
            }),
            Err(SymbolError::WrongType) => Err(LoadError::FactoryWrongType {
                path: handle.path.clone(),
            }),
        }
    }

    /// Resolve a factory and instantiate a capability through it.
    pub fn instantiate(
        &self,
        handle: &LibraryHandle,
        capability: &str,
        keyword: &str,
        args: &[String],
    ) -> Result<PluginObject, crate::Error> {
        let factory = self.factory(handle, None)?;
        Ok(factory.create(capability, keyword, args)?)
    }

    /// Paths with a cached terminal handle, sorted.
    pub fn loaded_paths(&self) -> Vec<PathBuf> {
        let handles = self.handles.lock().unwrap();
        let mut paths: Vec<PathBuf> = handles.keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Discard the handle (and any cached legacy factories) for a path.
    ///
    /// Dropping the last `Arc` releases the underlying native handle. After
    /// eviction a new load request performs a fresh native load.
    ///
    /// Returns true if a handle was cached for the path.
    pub fn unload(&self, path: &Path) -> bool {
        let removed = {
            let mut handles = self.handles.lock().unwrap();
            handles.remove(path).is_some()
        };
        if removed {
            let mut cache = self.legacy_factories.lock().unwrap();
            cache.retain(|(cached_path, _), _| cached_path != path);
        }
        removed
    }
}

impl Default for PluginLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PluginLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handles = self.handles.lock().unwrap();
        f.debug_struct("PluginLoader")
            .field("handles", &handles.len())
            .field("search", &self.search)
            .finish_non_exhaustive()
    }
}
