//! Discovery and parsing of the attribute index file.
//!
//! ```json
//! { "attributes": [ { "name": "Cache", "order": 1, "wrapper": "Base" } ] }
//! ```

use crate::attributes::{AttributeDescriptor, AttributeTable};
use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// File name searched for in the start directory and its ancestors.
pub const INDEX_FILE_NAME: &str = "loom.index.json";

/// On-disk shape of the index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexFile {
    #[serde(default)]
    pub attributes: Vec<AttributeDescriptor>,
}

/// Walks from `start` up to the filesystem root and returns the first index file found.
pub fn find_index(start: &Path) -> Result<PathBuf, ConfigError> {
    let start = dunce::canonicalize(start).map_err(|source| ConfigError::Read {
        path: start.to_path_buf(),
        source,
    })?;
    if !start.is_dir() {
        return Err(ConfigError::NotADirectory(start));
    }

    for dir in start.ancestors() {
        let candidate = dir.join(INDEX_FILE_NAME);
        debug!(candidate = %candidate.display(), "probing for attribute index");
        if candidate.is_file() {
            return Ok(candidate);
        }
    }

    Err(ConfigError::IndexNotFound(start))
}

/// Reads and parses an index file.
pub fn read_index(path: &Path) -> Result<IndexFile, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Finds the index above `start`, parses it and builds the lookup table.
///
/// Returns the path that was loaded alongside the table.
pub fn load_index(start: &Path) -> Result<(PathBuf, AttributeTable), ConfigError> {
    let path = find_index(start)?;
    let index = read_index(&path)?;
    let table = AttributeTable::new(index.attributes)?;
    debug!(path = %path.display(), attributes = table.len(), "attribute index loaded");
    Ok((path, table))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const SAMPLE: &str = r#"{
        "attributes": [
            { "name": "Cache", "order": 1, "wrapper": "Base" },
            { "name": "Logger", "order": 2, "wrapperKind": "MustReturnValue" }
        ]
    }"#;

    #[test]
    fn test_find_index_walks_parents() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("src").join("deep");
        fs::create_dir_all(&nested).unwrap();
        fs::write(tmp.path().join(INDEX_FILE_NAME), SAMPLE).unwrap();

        let found = find_index(&nested).unwrap();
        assert_eq!(found, dunce::canonicalize(tmp.path()).unwrap().join(INDEX_FILE_NAME));
    }

    #[test]
    fn test_nearest_index_wins() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("project");
        fs::create_dir_all(&nested).unwrap();
        fs::write(tmp.path().join(INDEX_FILE_NAME), SAMPLE).unwrap();
        fs::write(nested.join(INDEX_FILE_NAME), r#"{"attributes": []}"#).unwrap();

        let (path, table) = load_index(&nested).unwrap();
        assert!(path.starts_with(dunce::canonicalize(&nested).unwrap()));
        assert!(table.is_empty());
    }

    #[test]
    fn test_read_index_accepts_both_wrapper_keys() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(INDEX_FILE_NAME);
        fs::write(&path, SAMPLE).unwrap();

        let index = read_index(&path).unwrap();
        assert_eq!(index.attributes.len(), 2);
        assert_eq!(index.attributes[0].wrapper, "Base");
        assert_eq!(index.attributes[1].wrapper, "MustReturnValue");
    }

    #[test]
    fn test_malformed_index_is_parse_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(INDEX_FILE_NAME);
        fs::write(&path, "{ attributes: [").unwrap();

        assert!(matches!(read_index(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_start_must_be_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("Program.cs");
        fs::write(&file, "class P {}").unwrap();

        assert!(matches!(find_index(&file), Err(ConfigError::NotADirectory(_))));
    }
}
