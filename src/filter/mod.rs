//! Filter catalog and chain resolution.
//!
//! A *filter* is an external conversion program described by a flat
//! key/value descriptor file: the MIME types it accepts, the single MIME
//! type it produces, the external requirements it needs (an executable on
//! PATH, a config file, a reachable TCP service), and a command-line
//! template. The [`FilterCatalog`] lazily scans descriptor directories and
//! caches the parsed records for the process lifetime.
//!
//! On top of the catalog, the chain resolver answers the two questions the
//! surrounding print system asks:
//!
//! - [`auto_chain`]: what is the shortest sequence of filters converting
//!   MIME type A into MIME type B? (Empty answer: no conversion possible.)
//! - [`insert_filter`]: where in an existing ordered filter list can this
//!   named filter go without breaking adjacent MIME compatibility?
//!
//! Catalog iteration is sorted by filter id, so resolution is reproducible
//! across runs.

mod catalog;
mod chain;
mod descriptor;
mod parser;

pub use catalog::FilterCatalog;
pub use chain::{auto_chain, chain_command, insert_filter};
pub use descriptor::{DescriptorError, FilterDescriptor, Requirement};
