//! # Platen
//!
//! The loading and conversion core of a print pipeline: native plugin
//! loading with factory registries, and MIME-type filter-chain resolution.
//!
//! Platen has two independent halves:
//!
//! - **Plugin loading** ([`plugin`]): resolve a logical library name to a
//!   shared object, load it exactly once per path, gate it on an embedded
//!   ABI version descriptor, and instantiate implementations through a
//!   capability-tag factory registry.
//! - **Filter chains** ([`filter`]): a catalog of conversion filter
//!   descriptors (declared input/output MIME types, external requirements,
//!   command templates) and a resolver that finds the shortest valid filter
//!   sequence converting one MIME type into another.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use platen::prelude::*;
//!
//! // Filter half: resolve a conversion pipeline.
//! let catalog = FilterCatalog::new(["/usr/share/platen/filters"]);
//! let chain = auto_chain(&catalog, "text/plain", "application/pdf");
//!
//! // Plugin half: load a backend and instantiate a capability.
//! let loader = PluginLoader::new();
//! let handle = loader.load("platen_cups")?;
//! let backend = loader.instantiate(&handle, "print-backend", "", &[])?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod error;
pub mod filter;
pub mod plugin;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::filter::{
        FilterCatalog, FilterDescriptor, Requirement, auto_chain, insert_filter,
    };
    pub use crate::plugin::{
        FactoryRegistry, LibraryHandle, LoadError, PluginFactory, PluginLoader, SearchConfig,
    };
}

pub use error::{Error, Result};
