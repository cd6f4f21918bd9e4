//! Template parameter substitution.

use std::collections::BTreeSet;
use std::path::Path;

use rampart_spec::{Mapping, ValueTree};
use regex::{Captures, Regex};
use tracing::debug;

use crate::error::{TemplateError, TemplateResult};

/// Substitutes `{{KEY}}` placeholders in a value tree.
///
/// A string that consists of a single placeholder takes the parameter's value
/// as is, keeping its type. Placeholders embedded in longer strings are
/// replaced by the scalar's text.
pub struct TemplateRenderer {
    placeholder_pattern: Regex,
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateRenderer {
    /// Create a new template renderer.
    pub fn new() -> Self {
        Self {
            // Match {{KEY}}, {{ KEY }} and {{.KEY}}
            placeholder_pattern: Regex::new(r"\{\{\s*\.?([A-Za-z_][A-Za-z0-9_]*)\s*\}\}")
                .expect("placeholder pattern is valid"),
        }
    }

    /// Placeholder names used anywhere in the tree, keys included.
    pub fn placeholders(&self, tree: &ValueTree) -> BTreeSet<String> {
        let mut found = BTreeSet::new();
        self.collect(tree, &mut found);
        found
    }

    fn collect(&self, tree: &ValueTree, found: &mut BTreeSet<String>) {
        match tree {
            ValueTree::String(text) => self.collect_str(text, found),
            ValueTree::Sequence(items) => items.iter().for_each(|item| self.collect(item, found)),
            ValueTree::Mapping(map) => {
                for (key, value) in map {
                    self.collect_str(key, found);
                    self.collect(value, found);
                }
            }
            _ => {}
        }
    }

    fn collect_str(&self, text: &str, found: &mut BTreeSet<String>) {
        for caps in self.placeholder_pattern.captures_iter(text) {
            found.insert(caps[1].to_string());
        }
    }

    /// Render `tree` with `data`.
    ///
    /// Every placeholder must have a matching key and every key must be used
    /// by at least one placeholder. `origin` names the template in errors.
    pub fn render(
        &self,
        tree: &ValueTree,
        data: &Mapping,
        origin: &Path,
    ) -> TemplateResult<ValueTree> {
        let mut used = BTreeSet::new();
        let rendered = self.render_value(tree, data, origin, &mut used)?;

        if let Some(unused) = data.keys().find(|key| !used.contains(*key)) {
            return Err(TemplateError::UnusedParameter {
                key: unused.clone(),
                path: origin.to_path_buf(),
            });
        }

        debug!("Rendered {:?} with {} parameter(s)", origin, used.len());
        Ok(rendered)
    }

    fn render_value(
        &self,
        tree: &ValueTree,
        data: &Mapping,
        origin: &Path,
        used: &mut BTreeSet<String>,
    ) -> TemplateResult<ValueTree> {
        match tree {
            ValueTree::String(text) => self.render_str(text, data, origin, used),
            ValueTree::Sequence(items) => items
                .iter()
                .map(|item| self.render_value(item, data, origin, used))
                .collect::<TemplateResult<Vec<_>>>()
                .map(ValueTree::Sequence),
            ValueTree::Mapping(map) => {
                let mut out = Mapping::with_capacity(map.len());
                for (key, value) in map {
                    let key = match self.render_str(key, data, origin, used)? {
                        ValueTree::String(s) => s,
                        other => match other.scalar_text() {
                            Some(text) => text,
                            None => {
                                return Err(TemplateError::NonScalarEmbedding {
                                    token: key.clone(),
                                    path: origin.to_path_buf(),
                                    kind: other.kind().to_string(),
                                })
                            }
                        },
                    };
                    out.insert(key, self.render_value(value, data, origin, used)?);
                }
                Ok(ValueTree::Mapping(out))
            }
            other => Ok(other.clone()),
        }
    }

    /// Render a single string.
    pub fn render_str(
        &self,
        text: &str,
        data: &Mapping,
        origin: &Path,
        used: &mut BTreeSet<String>,
    ) -> TemplateResult<ValueTree> {
        let lookup = |name: &str, used: &mut BTreeSet<String>| -> TemplateResult<ValueTree> {
            match data.get(name) {
                Some(value) => {
                    used.insert(name.to_string());
                    Ok(value.clone())
                }
                None => Err(TemplateError::UnresolvedPlaceholder {
                    token: name.to_string(),
                    path: origin.to_path_buf(),
                }),
            }
        };

        // Whole-string placeholders keep the parameter's type.
        if let Some(caps) = self.placeholder_pattern.captures(text) {
            if caps.get(0).map(|m| m.as_str().len()) == Some(text.len()) {
                return lookup(&caps[1], used);
            }
        } else {
            return Ok(ValueTree::String(text.to_string()));
        }

        let mut failure = None;
        let rendered = self
            .placeholder_pattern
            .replace_all(text, |caps: &Captures| {
                if failure.is_some() {
                    return String::new();
                }
                match lookup(&caps[1], used) {
                    Ok(value) => match value.scalar_text() {
                        Some(text) => text,
                        None => {
                            failure = Some(TemplateError::NonScalarEmbedding {
                                token: caps[1].to_string(),
                                path: origin.to_path_buf(),
                                kind: value.kind().to_string(),
                            });
                            String::new()
                        }
                    },
                    Err(e) => {
                        failure = Some(e);
                        String::new()
                    }
                }
            })
            .to_string();

        match failure {
            Some(e) => Err(e),
            None => Ok(ValueTree::String(rendered)),
        }
    }
}
