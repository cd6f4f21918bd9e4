//! Document writing utilities.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::SpecResult;
use crate::value::ValueTree;

/// Writer for YAML documents.
pub struct DocumentWriter;

impl DocumentWriter {
    /// Serialize a tree to YAML text.
    pub fn to_yaml_string(tree: &ValueTree) -> SpecResult<String> {
        Ok(serde_yaml::to_string(tree)?)
    }

    /// Replace `path` with `tree` atomically.
    ///
    /// The content goes to a temporary file in the destination directory which
    /// is then renamed over the target, so readers never observe a partial file.
    pub fn write_atomic(path: impl AsRef<Path>, tree: &ValueTree) -> SpecResult<()> {
        Self::stage(path, tree)?.commit()
    }

    /// Write `tree` to a temporary file next to `path` without touching
    /// `path` itself. [`StagedDocument::commit`] renames it into place;
    /// dropping the staged document discards it.
    pub fn stage(path: impl AsRef<Path>, tree: &ValueTree) -> SpecResult<StagedDocument> {
        let path = path.as_ref();
        let content = Self::to_yaml_string(tree)?;
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;
        debug!("Staging document for {:?}", path);

        let mut file = tempfile::NamedTempFile::new_in(dir)?;
        file.write_all(content.as_bytes())?;
        file.as_file().sync_all()?;
        Ok(StagedDocument {
            file,
            path: path.to_path_buf(),
        })
    }
}

/// A fully written document waiting to replace its target.
#[derive(Debug)]
pub struct StagedDocument {
    file: tempfile::NamedTempFile,
    path: PathBuf,
}

impl StagedDocument {
    /// The file this document replaces on commit.
    pub fn target(&self) -> &Path {
        &self.path
    }

    /// Rename the staged file over the target.
    pub fn commit(self) -> SpecResult<()> {
        debug!("Writing document to {:?}", self.path);
        self.file.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::DocumentReader;
    use tempfile::tempdir;

    #[test]
    fn test_write_atomic_replaces_file() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("nested").join("record.yaml");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "old: true\n").unwrap();

        let tree: ValueTree = serde_yaml::from_str("new: 1\n").unwrap();
        DocumentWriter::write_atomic(&path, &tree).unwrap();

        let reloaded = DocumentReader::read(&path).unwrap();
        assert_eq!(reloaded, tree);
        assert_eq!(fs::read_dir(path.parent().unwrap()).unwrap().count(), 1);
    }

    #[test]
    fn test_dropped_stage_leaves_target_alone() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("record.yaml");
        fs::write(&path, "old: true\n").unwrap();

        let tree: ValueTree = serde_yaml::from_str("new: 1\n").unwrap();
        let staged = DocumentWriter::stage(&path, &tree).unwrap();
        assert_eq!(staged.target(), path.as_path());
        drop(staged);

        assert_eq!(fs::read_to_string(&path).unwrap(), "old: true\n");
        assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_stage_fails_when_parent_is_a_file() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("state"), "").unwrap();

        let tree: ValueTree = serde_yaml::from_str("new: 1\n").unwrap();
        assert!(DocumentWriter::stage(temp.path().join("state").join("record.yaml"), &tree).is_err());
    }
}
