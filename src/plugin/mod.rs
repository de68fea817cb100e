//! Native plugin loading.
//!
//! This module turns a logical library name into a running factory object in
//! three layers, each usable on its own:
//!
//! 1. The **locator** ([`resolve_library_path`]) maps a name to a concrete
//!    file path by searching a prioritized set of roots and resource
//!    categories with platform-specific extensions.
//! 2. The **loader** ([`PluginLoader`]) opens the shared object at most once
//!    per resolved path, verifies the embedded ABI version descriptor, and
//!    resolves a factory entry point (modern fixed-name convention first,
//!    then the legacy filename-derived convention).
//! 3. The **factory registry** ([`FactoryRegistry`]) inside a loaded plugin
//!    maps (capability tag, keyword) pairs to constructors and detects
//!    ambiguous registrations up front.
//!
//! # Plugin Structure
//!
//! A plugin is a shared library that exports a version descriptor and an
//! entry point:
//!
//! ```c
//! const VersionDescriptor platen_version_info;
//! void* platen_factory(void);   // returns a boxed PluginFactory
//! ```
//!
//! Rust plugins use [`declare_plugin!`](crate::declare_plugin) to emit both.
//!
//! The loader is an explicitly constructed context object, not process-global
//! state: embedders create one [`PluginLoader`] and share it, which keeps the
//! "one native load per path" invariant testable (a [`LibraryBackend`] stub
//! stands in for `dlopen` in tests).

mod descriptor;
mod factory;
mod loader;
mod locator;

pub use descriptor::{
    FactoryEntryFn, PLATEN_ABI_MAJOR, PLATEN_ABI_MINOR, VersionDescriptor, VersionInfo,
    factory_from_raw, factory_to_raw,
};
pub use factory::{
    ConstructHook, Constructor, FactoryError, FactoryRegistry, PluginFactory, PluginObject,
};
pub use loader::{
    DlopenBackend, LibraryBackend, LibraryHandle, LoadError, LoadState, NativeHandle,
    PluginLoader, SymbolError,
};
pub use locator::{SearchConfig, resolve_library_path};
