//! Error types for Platen.

use thiserror::Error;

/// Result type alias using Platen's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Platen operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Plugin loading failed.
    #[error(transparent)]
    Load(#[from] crate::plugin::LoadError),

    /// Factory registration or instantiation failed.
    #[error(transparent)]
    Factory(#[from] crate::plugin::FactoryError),

    /// A filter descriptor could not be parsed.
    #[error(transparent)]
    Descriptor(#[from] crate::filter::DescriptorError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
