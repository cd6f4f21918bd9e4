//! Schema validation for resolved documents.
//!
//! Validation only inspects the tree and collects every error it finds.
//! Filling in declared defaults is a separate pass ([`SchemaValidator::apply_defaults`])
//! that returns a new tree.

use thiserror::Error;

use crate::schema::{FieldSpec, FieldType, Schema};
use crate::value::ValueTree;

/// A single schema violation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationErrorKind {
    #[error("UnknownField: '{key}' is not an allowed property")]
    UnknownField { key: String },

    #[error("MissingRequiredField: '{key}' is required")]
    MissingRequiredField { key: String },

    #[error("TypeMismatch: '{key}' must be {expected}, found {actual}")]
    TypeMismatch {
        key: String,
        expected: String,
        actual: String,
    },

    #[error("PatternMismatch: '{key}' does not match {pattern}")]
    PatternMismatch { key: String, pattern: String },
}

/// A schema violation located at a dotted path inside the document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{path}: {kind}")]
pub struct ValidationError {
    pub path: String,
    pub kind: ValidationErrorKind,
}

/// A tree that passed validation against a schema.
#[derive(Debug, Clone, Copy)]
pub struct ValidatedTree<'a> {
    tree: &'a ValueTree,
    schema: &'a Schema,
}

impl<'a> ValidatedTree<'a> {
    pub fn tree(&self) -> &'a ValueTree {
        self.tree
    }

    pub fn schema(&self) -> &'a Schema {
        self.schema
    }

    /// A copy of the tree with declared defaults filled in.
    pub fn with_defaults(&self) -> ValueTree {
        SchemaValidator::apply_defaults(self.tree, self.schema)
    }
}

/// Validator for value trees.
pub struct SchemaValidator;

impl SchemaValidator {
    /// Validate `tree` against `schema`, returning every violation on failure.
    pub fn validate<'a>(
        tree: &'a ValueTree,
        schema: &'a Schema,
    ) -> Result<ValidatedTree<'a>, Vec<ValidationError>> {
        let errors = Self::collect_errors(tree, schema);
        if errors.is_empty() {
            Ok(ValidatedTree { tree, schema })
        } else {
            Err(errors)
        }
    }

    /// Collect all violations without failing.
    pub fn collect_errors(tree: &ValueTree, schema: &Schema) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        Self::validate_object(tree, schema, "", &mut errors);
        errors
    }

    fn validate_object(
        tree: &ValueTree,
        schema: &Schema,
        path: &str,
        errors: &mut Vec<ValidationError>,
    ) {
        let Some(map) = tree.as_mapping() else {
            errors.push(ValidationError {
                path: display_path(path),
                kind: ValidationErrorKind::TypeMismatch {
                    key: last_segment(path),
                    expected: FieldType::Object.to_string(),
                    actual: tree.kind().to_string(),
                },
            });
            return;
        };

        if !schema.additional_properties {
            for key in map.keys() {
                if !schema.properties.contains_key(key) {
                    errors.push(ValidationError {
                        path: join(path, key),
                        kind: ValidationErrorKind::UnknownField { key: key.clone() },
                    });
                }
            }
        }

        for key in &schema.required {
            if map.get(key).map_or(true, ValueTree::is_null) {
                errors.push(ValidationError {
                    path: join(path, key),
                    kind: ValidationErrorKind::MissingRequiredField { key: key.clone() },
                });
            }
        }

        for (key, value) in map {
            if value.is_null() {
                continue;
            }
            if let Some(spec) = schema.properties.get(key) {
                Self::validate_field(value, spec, key, &join(path, key), errors);
            }
        }
    }

    fn validate_field(
        value: &ValueTree,
        spec: &FieldSpec,
        key: &str,
        path: &str,
        errors: &mut Vec<ValidationError>,
    ) {
        // Interpolations are resolved by the downstream tool.
        if value.is_reference() {
            return;
        }

        if !spec.field_type.accepts(value) {
            errors.push(ValidationError {
                path: path.to_string(),
                kind: ValidationErrorKind::TypeMismatch {
                    key: key.to_string(),
                    expected: spec.field_type.to_string(),
                    actual: value.kind().to_string(),
                },
            });
            return;
        }

        if !spec.enum_values.is_empty() && !spec.enum_values.contains(value) {
            let allowed: Vec<String> = spec
                .enum_values
                .iter()
                .map(|v| v.scalar_text().unwrap_or_else(|| v.kind().to_string()))
                .collect();
            errors.push(ValidationError {
                path: path.to_string(),
                kind: ValidationErrorKind::PatternMismatch {
                    key: key.to_string(),
                    pattern: format!("one of [{}]", allowed.join(", ")),
                },
            });
        }

        if let (Some(text), Some(Ok(regex))) = (value.as_str(), spec.compiled_pattern()) {
            if !regex.is_match(text) {
                errors.push(ValidationError {
                    path: path.to_string(),
                    kind: ValidationErrorKind::PatternMismatch {
                        key: key.to_string(),
                        pattern: spec.pattern.clone().unwrap_or_default(),
                    },
                });
            }
        }

        match value {
            ValueTree::Mapping(_) => {
                if let Some(nested) = &spec.schema {
                    Self::validate_object(value, nested, path, errors);
                }
            }
            ValueTree::Sequence(items) => {
                if let Some(item_spec) = &spec.items {
                    for (index, item) in items.iter().enumerate() {
                        let item_path = format!("{}[{}]", path, index);
                        if item.is_null() {
                            continue;
                        }
                        Self::validate_field(item, item_spec, key, &item_path, errors);
                    }
                }
            }
            _ => {}
        }
    }

    /// Return a new tree with defaults applied to absent optional fields.
    pub fn apply_defaults(tree: &ValueTree, schema: &Schema) -> ValueTree {
        let ValueTree::Mapping(map) = tree else {
            return tree.clone();
        };

        let mut out = map.clone();
        for (key, spec) in &schema.properties {
            match out.get(key) {
                None => {
                    if let Some(default) = &spec.default {
                        out.insert(key.clone(), default.clone());
                    }
                }
                Some(present) => {
                    let filled = Self::apply_field_defaults(present, spec);
                    out.insert(key.clone(), filled);
                }
            }
        }
        ValueTree::Mapping(out)
    }

    fn apply_field_defaults(value: &ValueTree, spec: &FieldSpec) -> ValueTree {
        match value {
            ValueTree::Mapping(_) => match &spec.schema {
                Some(nested) => Self::apply_defaults(value, nested),
                None => value.clone(),
            },
            ValueTree::Sequence(items) => match &spec.items {
                Some(item_spec) => ValueTree::Sequence(
                    items
                        .iter()
                        .map(|item| Self::apply_field_defaults(item, item_spec))
                        .collect(),
                ),
                None => value.clone(),
            },
            _ => value.clone(),
        }
    }
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", path, key)
    }
}

fn display_path(path: &str) -> String {
    if path.is_empty() {
        "<root>".to_string()
    } else {
        path.to_string()
    }
}

fn last_segment(path: &str) -> String {
    display_path(path.rsplit('.').next().unwrap_or_default())
}
