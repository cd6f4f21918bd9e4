//! Deep merge of value trees.
//!
//! Merge rules, applied recursively:
//!
//! - mapping over mapping: union of keys, shared keys merge recursively,
//!   insertion order of the base is kept and new keys are appended;
//! - a null overlay value deletes the base key (tombstone); when the base has
//!   no such key the null passes through;
//! - sequence over sequence: the overlay replaces the base, unless the path is
//!   listed in [`MergeOptions::additive_fields`], in which case the sequences
//!   concatenate;
//! - any other combination: the overlay wins. The strict variant instead fails
//!   with [`MergeError::TypeConflict`] when a value would be replaced by one
//!   of another kind (a number by a string, a mapping by a sequence).
//!
//! An empty mapping overlay is the identity, so `merge(t, {}) == t` and
//! `merge({}, t) == t` hold for every tree.

use std::collections::BTreeSet;

use crate::error::MergeError;
use crate::value::ValueTree;

/// Options controlling sequence handling.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOptions {
    /// Dotted paths whose sequences are concatenated instead of replaced.
    pub additive_fields: BTreeSet<String>,
}

impl MergeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_additive_field(mut self, path: impl Into<String>) -> Self {
        self.additive_fields.insert(path.into());
        self
    }

    pub fn with_additive_fields<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.additive_fields.extend(paths.into_iter().map(Into::into));
        self
    }
}

/// Stateless deep-merge engine.
#[derive(Debug, Clone, Default)]
pub struct Merger {
    options: MergeOptions,
}

impl Merger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: MergeOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &MergeOptions {
        &self.options
    }

    /// Merge `overlay` over `base`, the overlay winning every conflict.
    pub fn merge(&self, base: &ValueTree, overlay: &ValueTree) -> ValueTree {
        let mut path = Vec::new();
        match self.merge_at(base, overlay, &mut path, false) {
            Ok(tree) => tree,
            // Lenient mode never reports conflicts.
            Err(_) => overlay.clone(),
        }
    }

    /// Merge an ordered list of trees left to right.
    pub fn merge_all<'a, I>(&self, trees: I) -> ValueTree
    where
        I: IntoIterator<Item = &'a ValueTree>,
    {
        trees
            .into_iter()
            .fold(ValueTree::mapping(), |acc, tree| self.merge(&acc, tree))
    }

    /// Merge that refuses to replace a typed base value with a value of a
    /// different shape.
    pub fn merge_strict(
        &self,
        base: &ValueTree,
        overlay: &ValueTree,
    ) -> Result<ValueTree, MergeError> {
        let mut path = Vec::new();
        self.merge_at(base, overlay, &mut path, true)
    }

    fn merge_at(
        &self,
        base: &ValueTree,
        overlay: &ValueTree,
        path: &mut Vec<String>,
        strict: bool,
    ) -> Result<ValueTree, MergeError> {
        if path.is_empty() && is_empty_mapping(overlay) {
            return Ok(base.clone());
        }

        match (base, overlay) {
            (ValueTree::Mapping(base_map), ValueTree::Mapping(overlay_map)) => {
                let mut merged = base_map.clone();
                for (key, value) in overlay_map {
                    if value.is_null() && merged.contains_key(key) {
                        merged.shift_remove(key);
                        continue;
                    }
                    let next = match merged.get(key) {
                        Some(existing) => {
                            path.push(key.clone());
                            let result = self.merge_at(existing, value, path, strict);
                            path.pop();
                            result?
                        }
                        None => value.clone(),
                    };
                    merged.insert(key.clone(), next);
                }
                Ok(ValueTree::Mapping(merged))
            }
            (ValueTree::Sequence(base_items), ValueTree::Sequence(overlay_items)) => {
                if self.options.additive_fields.contains(&path.join(".")) {
                    let mut items = base_items.clone();
                    items.extend(overlay_items.iter().cloned());
                    Ok(ValueTree::Sequence(items))
                } else {
                    Ok(overlay.clone())
                }
            }
            (ValueTree::Null, _) | (_, ValueTree::Null) => Ok(overlay.clone()),
            _ => {
                if strict && base.kind() != overlay.kind() {
                    return Err(MergeError::TypeConflict {
                        path: path.join("."),
                        base: base.kind().to_string(),
                        overlay: overlay.kind().to_string(),
                    });
                }
                Ok(overlay.clone())
            }
        }
    }
}

/// Merge with default options.
pub fn merge(base: &ValueTree, overlay: &ValueTree) -> ValueTree {
    Merger::default().merge(base, overlay)
}

fn is_empty_mapping(overlay: &ValueTree) -> bool {
    matches!(overlay, ValueTree::Mapping(m) if m.is_empty())
}
