//! Document loading.

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::error::{SpecError, SpecResult};
use crate::value::ValueTree;

/// Reader for YAML documents.
pub struct DocumentReader;

impl DocumentReader {
    /// Read a YAML document into a value tree. No semantics are attached.
    pub fn read(path: impl AsRef<Path>) -> SpecResult<ValueTree> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(SpecError::NotFound(path.to_path_buf()));
        }
        debug!("Reading document from {:?}", path);

        let content = fs::read_to_string(path)?;
        Self::parse(&content, path)
    }

    /// Read a document that must decode to a mapping.
    pub fn read_mapping(path: impl AsRef<Path>) -> SpecResult<ValueTree> {
        let path = path.as_ref();
        let tree = Self::read(path)?;
        match tree {
            ValueTree::Mapping(_) => Ok(tree),
            _ => Err(SpecError::NotAMapping(path.to_path_buf())),
        }
    }

    /// Parse YAML text; `origin` is only used in error messages.
    pub fn parse(content: &str, origin: &Path) -> SpecResult<ValueTree> {
        if content.trim().is_empty() {
            return Ok(ValueTree::Null);
        }
        let raw: serde_yaml::Value =
            serde_yaml::from_str(content).map_err(|e| SpecError::InvalidFormat {
                path: origin.to_path_buf(),
                message: e.to_string(),
            })?;
        ValueTree::from_yaml(raw).map_err(|message| SpecError::InvalidFormat {
            path: origin.to_path_buf(),
            message,
        })
    }
}
