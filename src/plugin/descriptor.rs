//! Embedded plugin metadata for the C-compatible ABI.
//!
//! Every Platen plugin exports a [`VersionDescriptor`] under the symbol
//! `platen_version_info`. The loader checks its major version against
//! [`PLATEN_ABI_MAJOR`] before handing out any factory: running mismatched
//! plugin code risks memory corruption, so a mismatch is always surfaced and
//! the native handle is released.
//!
//! Factory entry points come in two conventions, tried in fixed order:
//!
//! - modern: a no-argument export with the fixed name `platen_factory`,
//!   returning a boxed [`PluginFactory`](super::PluginFactory);
//! - legacy: an export named `init_<stem>` where `<stem>` is an explicit
//!   hint or the library filename stem.

use super::factory::PluginFactory;
use std::ffi::{CStr, c_char, c_void};

/// Current ABI major version. Plugins whose descriptor reports a different
/// major are rejected at load time.
pub const PLATEN_ABI_MAJOR: u32 = 2;

/// Current ABI minor version. Informational only; not part of the gate.
pub const PLATEN_ABI_MINOR: u32 = 0;

/// Symbol name of the version descriptor export.
pub(crate) const VERSION_SYMBOL: &[u8] = b"platen_version_info\0";

/// Symbol name of the optional plugin-version integer export.
pub(crate) const PLUGIN_VERSION_SYMBOL: &[u8] = b"platen_plugin_version\0";

/// Symbol name of the modern factory entry point.
pub(crate) const FACTORY_SYMBOL: &str = "platen_factory";

/// Symbol-name prefix of the legacy factory entry point convention.
pub(crate) const LEGACY_PREFIX: &str = "init_";

/// Function pointer type for factory entry points (both conventions).
///
/// # Safety
///
/// The returned pointer must have been produced by [`factory_to_raw`] (a
/// `Box<Box<dyn PluginFactory>>` turned into a raw pointer), or be null to
/// signal failure.
pub type FactoryEntryFn = unsafe extern "C" fn() -> *mut c_void;

/// Version-compatibility descriptor embedded in a plugin.
///
/// This struct is `#[repr(C)]` for C ABI compatibility.
#[repr(C)]
pub struct VersionDescriptor {
    /// ABI major version; must equal [`PLATEN_ABI_MAJOR`] to load.
    pub abi_major: u32,
    /// ABI minor version, informational.
    pub abi_minor: u32,
    /// Null-terminated human-readable version string (e.g. "2.0.3").
    pub version: *const c_char,
}

// SAFETY: VersionDescriptor contains only plain integers and a raw pointer
// to static data, which are inherently Send + Sync.
unsafe impl Send for VersionDescriptor {}
unsafe impl Sync for VersionDescriptor {}

impl VersionDescriptor {
    /// Get the version string.
    ///
    /// # Safety
    ///
    /// The `version` pointer must be null or valid and null-terminated.
    pub unsafe fn version_str(&self) -> &str {
        if self.version.is_null() {
            return "";
        }
        // SAFETY: Caller guarantees `version` is valid and null-terminated.
        unsafe { CStr::from_ptr(self.version).to_str().unwrap_or("") }
    }
}

/// Safe Rust mirror of a plugin's version descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionInfo {
    /// ABI major version the plugin was built against.
    pub abi_major: u32,
    /// ABI minor version.
    pub abi_minor: u32,
    /// Human-readable version string.
    pub version: String,
}

impl VersionInfo {
    /// Create VersionInfo from a raw descriptor.
    ///
    /// # Safety
    ///
    /// The descriptor and its `version` pointer must be valid.
    pub unsafe fn from_descriptor(desc: &VersionDescriptor) -> Self {
        Self {
            abi_major: desc.abi_major,
            abi_minor: desc.abi_minor,
            // SAFETY: Caller guarantees the descriptor is valid.
            version: unsafe { desc.version_str() }.to_string(),
        }
    }

    /// Whether this plugin falls inside the required major-version window.
    pub fn is_compatible(&self) -> bool {
        self.abi_major == PLATEN_ABI_MAJOR
    }
}

impl std::fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.version.is_empty() {
            write!(f, "abi {}.{}", self.abi_major, self.abi_minor)
        } else {
            write!(f, "{} (abi {}.{})", self.version, self.abi_major, self.abi_minor)
        }
    }
}

/// Convert a PluginFactory box to a raw pointer for the C ABI.
///
/// This is used by plugins to return factories from their entry points.
pub fn factory_to_raw(factory: Box<dyn PluginFactory>) -> *mut c_void {
    // Double-box so the fat trait-object pointer travels through a thin one.
    let boxed: Box<Box<dyn PluginFactory>> = Box::new(factory);
    Box::into_raw(boxed) as *mut c_void
}

/// Convert a raw pointer back to a PluginFactory box.
///
/// # Safety
///
/// The pointer must have been created by [`factory_to_raw`].
pub unsafe fn factory_from_raw(ptr: *mut c_void) -> Box<dyn PluginFactory> {
    // SAFETY: Caller guarantees ptr was created by factory_to_raw.
    let boxed: Box<Box<dyn PluginFactory>> =
        unsafe { Box::from_raw(ptr as *mut Box<dyn PluginFactory>) };
    *boxed
}

/// Declare the exports that make a Rust crate a Platen plugin.
///
/// Emits the `platen_version_info` descriptor, the `platen_plugin_version`
/// integer, and the modern `platen_factory` entry point wrapping the given
/// factory expression. The symbol names are fixed, so one plugin crate can
/// invoke this exactly once.
///
/// # Example
///
/// ```ignore
/// use platen::declare_plugin;
///
/// declare_plugin! {
///     version: "2.0.3",
///     plugin_version: 3,
///     factory: || Box::new(CupsBackendFactory::new()),
/// }
/// ```
#[macro_export]
macro_rules! declare_plugin {
    (
        version: $version:literal,
        plugin_version: $plugin_version:expr,
        factory: $factory:expr $(,)?
    ) => {
        static PLATEN_VERSION_STRING: &[u8] = concat!($version, "\0").as_bytes();

        /// Version descriptor export checked by the loader.
        #[unsafe(no_mangle)]
        #[allow(non_upper_case_globals)]
        pub static platen_version_info: $crate::plugin::VersionDescriptor =
            $crate::plugin::VersionDescriptor {
                abi_major: $crate::plugin::PLATEN_ABI_MAJOR,
                abi_minor: $crate::plugin::PLATEN_ABI_MINOR,
                version: PLATEN_VERSION_STRING.as_ptr() as *const std::ffi::c_char,
            };

        /// Plugin-version integer export.
        #[unsafe(no_mangle)]
        #[allow(non_upper_case_globals)]
        pub static platen_plugin_version: u32 = $plugin_version;

        /// Modern factory entry point.
        #[unsafe(no_mangle)]
        pub extern "C" fn platen_factory() -> *mut std::ffi::c_void {
            let make: fn() -> Box<dyn $crate::plugin::PluginFactory> = $factory;
            $crate::plugin::factory_to_raw(make())
        }
    };
}
