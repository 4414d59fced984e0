//! # Common: Attribute Descriptors & Index Configuration
//!
//! **Role**: Shared vocabulary of the weaving pipeline. Every other crate
//! resolves attribute references through the types defined here.
//!
//! **Core Types**:
//! - `AttributeDescriptor`: one configured aspect (`name`, `order`, `wrapper`).
//! - `AttributeTable`: exact lookup table from written attribute names to descriptors,
//!   built once when the index is loaded.
//! - `ConfigError`: everything that can go wrong while locating or reading the index.
//!
//! **Design**:
//! - Attribute references are reduced to their trailing segment before lookup, so
//!   `Aspects.Cache`, `Cache` and `CacheAttribute` all resolve to the `Cache` descriptor.
//! - The index file (`loom.index.json`) is discovered by walking parent directories.

pub mod attributes;
pub mod index;
pub mod runtime;

pub use attributes::{
    attribute_needle, is_obsolete_attribute, renamed_identifier, trailing_segment,
    AttributeDescriptor, AttributeTable,
};
pub use index::{find_index, load_index, read_index, IndexFile, INDEX_FILE_NAME};

use std::path::PathBuf;

/// Errors raised while locating, reading or validating the attribute index.
///
/// A `ConfigError` halts the whole run: no file is processed with a partial table.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("No {INDEX_FILE_NAME} found in {0} or any of its parent directories")]
    IndexNotFound(PathBuf),
    #[error("Index search must start from a directory: {0}")]
    NotADirectory(PathBuf),
    #[error("Failed to read index {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse index {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Attribute descriptor #{0} has an empty name")]
    EmptyName(usize),
    #[error("Attribute \"{0}\" is configured more than once")]
    DuplicateAttribute(String),
    #[error("Attribute \"{attribute}\" names an unknown wrapper kind \"{kind}\"")]
    UnknownWrapperKind { attribute: String, kind: String },
}
