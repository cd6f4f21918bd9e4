//! Import resolution.
//!
//! The resolver handles:
//! - Loading the root document and every document it imports, recursively
//! - Template parameter substitution for imports that carry `data`
//! - Merging resolved imports in order, with the importing document last
//! - Import cycle detection

use std::path::{Path, PathBuf};

use rampart_spec::{DocumentReader, Mapping, MergeOptions, Merger, SpecError, ValueTree};
use tracing::{debug, info};

use crate::error::{TemplateError, TemplateResult};
use crate::renderer::TemplateRenderer;

/// Key holding the import list in a document.
pub const IMPORTS_KEY: &str = "imports";

/// A single `imports` entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportDirective {
    /// Path as written, relative to the importing document.
    pub path: PathBuf,
    /// Template parameters. `None` means plain inclusion.
    pub data: Option<Mapping>,
}

impl ImportDirective {
    pub fn plain(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            data: None,
        }
    }

    pub fn template(path: impl Into<PathBuf>, data: Mapping) -> Self {
        Self {
            path: path.into(),
            data: Some(data),
        }
    }

    /// Parse an entry, either a bare path string or `{path, data}`.
    pub fn from_tree(entry: &ValueTree, origin: &Path) -> TemplateResult<Self> {
        let invalid = |message: String| TemplateError::InvalidImport {
            path: origin.to_path_buf(),
            message,
        };

        match entry {
            ValueTree::String(path) => Ok(Self::plain(path)),
            ValueTree::Mapping(map) => {
                let path = map
                    .get("path")
                    .and_then(ValueTree::as_str)
                    .ok_or_else(|| invalid("import entry is missing 'path'".to_string()))?;

                if let Some(key) = map.keys().find(|k| *k != "path" && *k != "data") {
                    return Err(invalid(format!("unexpected key '{}' in import entry", key)));
                }

                let data = match map.get("data") {
                    None => None,
                    Some(ValueTree::Mapping(data)) => Some(data.clone()),
                    Some(other) => {
                        return Err(invalid(format!(
                            "'data' for {} must be a mapping, found {}",
                            path,
                            other.kind()
                        )))
                    }
                };

                Ok(Self {
                    path: PathBuf::from(path),
                    data,
                })
            }
            other => Err(invalid(format!(
                "import entry must be a path or a mapping, found {}",
                other.kind()
            ))),
        }
    }
}

/// Expands `imports` directives into a single resolved tree.
pub struct ImportResolver {
    merger: Merger,
    renderer: TemplateRenderer,
}

impl Default for ImportResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ImportResolver {
    /// Create a resolver with default merge options.
    pub fn new() -> Self {
        Self {
            merger: Merger::new(),
            renderer: TemplateRenderer::new(),
        }
    }

    /// Create a resolver with custom merge options.
    pub fn with_merge_options(options: MergeOptions) -> Self {
        Self {
            merger: Merger::with_options(options),
            renderer: TemplateRenderer::new(),
        }
    }

    /// Resolve the document at `root` and everything it imports.
    pub fn resolve(&self, root: impl AsRef<Path>) -> TemplateResult<ValueTree> {
        let root = root.as_ref();
        info!("Resolving imports from {:?}", root);

        let mut stack = Vec::new();
        self.resolve_document(root, None, &mut stack)
    }

    fn resolve_document(
        &self,
        path: &Path,
        data: Option<&Mapping>,
        stack: &mut Vec<PathBuf>,
    ) -> TemplateResult<ValueTree> {
        if !path.is_file() {
            return Err(SpecError::NotFound(path.to_path_buf()).into());
        }
        let canonical = path.canonicalize()?;

        if stack.contains(&canonical) {
            let chain = stack
                .iter()
                .chain(std::iter::once(&canonical))
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(" -> ");
            return Err(TemplateError::ImportCycle { chain });
        }

        stack.push(canonical);
        let result = self.expand(path, data, stack);
        stack.pop();
        result
    }

    fn expand(
        &self,
        path: &Path,
        data: Option<&Mapping>,
        stack: &mut Vec<PathBuf>,
    ) -> TemplateResult<ValueTree> {
        let mut document = DocumentReader::read_mapping(path)?;
        if let Some(data) = data {
            document = self.renderer.render(&document, data, path)?;
        }

        let directives = match document.get(IMPORTS_KEY) {
            None | Some(ValueTree::Null) => Vec::new(),
            Some(ValueTree::Sequence(entries)) => entries
                .iter()
                .map(|entry| ImportDirective::from_tree(entry, path))
                .collect::<TemplateResult<Vec<_>>>()?,
            Some(other) => {
                return Err(TemplateError::InvalidImport {
                    path: path.to_path_buf(),
                    message: format!("'imports' must be a list, found {}", other.kind()),
                })
            }
        };

        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut resolved = Vec::with_capacity(directives.len());
        for directive in &directives {
            let target = base_dir.join(&directive.path);
            debug!("Importing {:?} from {:?}", target, path);
            resolved.push(self.resolve_document(&target, directive.data.as_ref(), stack)?);
        }

        let own = document.without_key(IMPORTS_KEY);
        let imported = self.merger.merge_all(resolved.iter());
        Ok(self.merger.merge(&imported, &own))
    }
}
