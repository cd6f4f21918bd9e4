//! Resource schema model.
//!
//! Schemas are authored as YAML documents:
//!
//! ```yaml
//! info:
//!   title: Network
//!   description: A VPC network.
//! imports:
//!   - path: network.py
//! additionalProperties: false
//! required:
//!   - name
//! properties:
//!   name:
//!     type: string
//!     pattern: "[a-z]([-a-z0-9]*[a-z0-9])?"
//!   autoCreateSubnetworks:
//!     type: boolean
//!     default: false
//! outputs:
//!   properties:
//!     - name:
//!         type: string
//! ```

use std::fmt;
use std::path::Path;

use indexmap::IndexMap;
use regex::Regex;

use crate::error::{SpecError, SpecResult};
use crate::reader::DocumentReader;
use crate::value::ValueTree;

/// Declared type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldType {
    String,
    Boolean,
    Number,
    Integer,
    Array,
    Object,
    /// No `type` declared; any value is accepted.
    #[default]
    Any,
}

impl FieldType {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "string" => Some(FieldType::String),
            "boolean" => Some(FieldType::Boolean),
            "number" => Some(FieldType::Number),
            "integer" => Some(FieldType::Integer),
            "array" => Some(FieldType::Array),
            "object" => Some(FieldType::Object),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Boolean => "boolean",
            FieldType::Number => "number",
            FieldType::Integer => "integer",
            FieldType::Array => "array",
            FieldType::Object => "object",
            FieldType::Any => "any",
        }
    }

    /// Whether `value` has this type. Null never matches a concrete type.
    pub fn accepts(&self, value: &ValueTree) -> bool {
        match (self, value) {
            (FieldType::Any, _) => true,
            (FieldType::String, ValueTree::String(_)) => true,
            (FieldType::Boolean, ValueTree::Bool(_)) => true,
            (FieldType::Number, ValueTree::Number(_)) => true,
            (FieldType::Integer, ValueTree::Number(n)) => n.is_i64() || n.is_u64(),
            (FieldType::Array, ValueTree::Sequence(_)) => true,
            (FieldType::Object, ValueTree::Mapping(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared shape of a single field.
#[derive(Debug, Clone, Default)]
pub struct FieldSpec {
    pub field_type: FieldType,
    pub description: Option<String>,
    pub default: Option<ValueTree>,
    /// Regular expression the whole string value must match.
    pub pattern: Option<String>,
    /// Allowed values; empty means unrestricted.
    pub enum_values: Vec<ValueTree>,
    /// Nested schema for `object` fields.
    pub schema: Option<Box<Schema>>,
    /// Item spec for `array` fields.
    pub items: Option<Box<FieldSpec>>,
}

impl FieldSpec {
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            ..Default::default()
        }
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn with_default(mut self, default: impl Into<ValueTree>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = Some(Box::new(schema));
        self
    }

    pub fn with_items(mut self, items: FieldSpec) -> Self {
        self.items = Some(Box::new(items));
        self
    }

    /// Compile the declared pattern, anchored to the whole value.
    pub fn compiled_pattern(&self) -> Option<Result<Regex, regex::Error>> {
        self.pattern
            .as_ref()
            .map(|pattern| Regex::new(&format!("^(?:{})$", pattern)))
    }

    fn from_tree(schema_name: &str, field: &str, tree: &ValueTree) -> SpecResult<Self> {
        let invalid = |message: String| SpecError::InvalidSchema {
            name: schema_name.to_string(),
            message: format!("field '{}': {}", field, message),
        };

        let ValueTree::Mapping(map) = tree else {
            return Err(invalid(format!("expected a mapping, found {}", tree.kind())));
        };

        let field_type = match map.get("type") {
            None => FieldType::Any,
            Some(ValueTree::String(name)) => FieldType::parse(name)
                .ok_or_else(|| invalid(format!("unknown type '{}'", name)))?,
            Some(other) => return Err(invalid(format!("type must be a string, found {}", other.kind()))),
        };

        let mut spec = FieldSpec::new(field_type);
        spec.description = map.get("description").and_then(ValueTree::scalar_text);
        spec.default = map.get("default").cloned();

        if let Some(pattern) = map.get("pattern") {
            let pattern = pattern
                .as_str()
                .ok_or_else(|| invalid("pattern must be a string".to_string()))?;
            spec.pattern = Some(pattern.to_string());
            if let Some(Err(e)) = spec.compiled_pattern() {
                return Err(invalid(format!("invalid pattern: {}", e)));
            }
        }

        if let Some(values) = map.get("enum") {
            spec.enum_values = values
                .as_sequence()
                .ok_or_else(|| invalid("enum must be a list".to_string()))?
                .to_vec();
        }

        if field_type == FieldType::Object && map.contains_key("properties") {
            let nested_name = format!("{}.{}", schema_name, field);
            spec.schema = Some(Box::new(Schema::from_tree(&nested_name, tree)?));
        }

        if let Some(items) = map.get("items") {
            let item_field = format!("{}[]", field);
            spec.items = Some(Box::new(FieldSpec::from_tree(schema_name, &item_field, items)?));
        }

        Ok(spec)
    }
}

/// A resource schema.
#[derive(Debug, Clone)]
pub struct Schema {
    pub name: String,
    pub title: Option<String>,
    pub description: Option<String>,
    /// Implementation files the schema belongs to; informational only.
    pub imports: Vec<String>,
    pub properties: IndexMap<String, FieldSpec>,
    pub additional_properties: bool,
    pub required: Vec<String>,
    pub outputs: IndexMap<String, FieldSpec>,
}

impl Schema {
    /// An empty schema that accepts any mapping.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            title: None,
            description: None,
            imports: Vec::new(),
            properties: IndexMap::new(),
            additional_properties: true,
            required: Vec::new(),
            outputs: IndexMap::new(),
        }
    }

    pub fn closed(mut self) -> Self {
        self.additional_properties = false;
        self
    }

    pub fn property(mut self, name: impl Into<String>, spec: FieldSpec) -> Self {
        self.properties.insert(name.into(), spec);
        self
    }

    pub fn require(mut self, name: impl Into<String>) -> Self {
        self.required.push(name.into());
        self
    }

    /// Load a schema document from disk.
    pub fn load(path: impl AsRef<Path>) -> SpecResult<Self> {
        let path = path.as_ref();
        let tree = DocumentReader::read_mapping(path)?;
        let name = schema_name_for(path);
        Self::from_tree(&name, &tree)
    }

    /// Parse YAML text into a schema.
    pub fn from_yaml_str(name: &str, content: &str) -> SpecResult<Self> {
        let tree = DocumentReader::parse(content, Path::new(name))?;
        Self::from_tree(name, &tree)
    }

    /// Build a schema from a decoded schema document.
    pub fn from_tree(name: &str, tree: &ValueTree) -> SpecResult<Self> {
        let invalid = |message: String| SpecError::InvalidSchema {
            name: name.to_string(),
            message,
        };

        let ValueTree::Mapping(map) = tree else {
            return Err(invalid(format!("expected a mapping, found {}", tree.kind())));
        };

        let mut schema = Schema::new(name);
        schema.title = tree.get_path("info.title").and_then(ValueTree::scalar_text);
        schema.description = tree.get_path("info.description").and_then(ValueTree::scalar_text);

        if let Some(imports) = map.get("imports").and_then(ValueTree::as_sequence) {
            for entry in imports {
                let path = entry
                    .as_str()
                    .or_else(|| entry.str_at("path"))
                    .ok_or_else(|| invalid("imports entries need a path".to_string()))?;
                schema.imports.push(path.to_string());
            }
        }

        match map.get("additionalProperties") {
            None => {}
            Some(ValueTree::Bool(allowed)) => schema.additional_properties = *allowed,
            Some(other) => {
                return Err(invalid(format!(
                    "additionalProperties must be a boolean, found {}",
                    other.kind()
                )))
            }
        }

        if let Some(required) = map.get("required") {
            let items = required
                .as_sequence()
                .ok_or_else(|| invalid("required must be a list".to_string()))?;
            for item in items {
                let key = item
                    .as_str()
                    .ok_or_else(|| invalid("required entries must be strings".to_string()))?;
                schema.required.push(key.to_string());
            }
        }

        if let Some(properties) = map.get("properties") {
            let properties = properties
                .as_mapping()
                .ok_or_else(|| invalid("properties must be a mapping".to_string()))?;
            for (field, spec) in properties {
                schema
                    .properties
                    .insert(field.clone(), FieldSpec::from_tree(name, field, spec)?);
            }
        }

        if let Some(outputs) = map.get("outputs") {
            schema.outputs = parse_outputs(name, outputs)?;
        }

        Ok(schema)
    }
}

/// `outputs.properties` comes either as a list of single-key mappings or as a
/// plain mapping.
fn parse_outputs(name: &str, outputs: &ValueTree) -> SpecResult<IndexMap<String, FieldSpec>> {
    let mut parsed = IndexMap::new();
    match outputs.get("properties") {
        None | Some(ValueTree::Null) => {}
        Some(ValueTree::Sequence(entries)) => {
            for entry in entries {
                let Some(map) = entry.as_mapping() else {
                    return Err(SpecError::InvalidSchema {
                        name: name.to_string(),
                        message: "outputs.properties entries must be mappings".to_string(),
                    });
                };
                for (field, spec) in map {
                    parsed.insert(field.clone(), FieldSpec::from_tree(name, field, spec)?);
                }
            }
        }
        Some(ValueTree::Mapping(map)) => {
            for (field, spec) in map {
                parsed.insert(field.clone(), FieldSpec::from_tree(name, field, spec)?);
            }
        }
        Some(other) => {
            return Err(SpecError::InvalidSchema {
                name: name.to_string(),
                message: format!("outputs.properties must be a list or mapping, found {}", other.kind()),
            })
        }
    }
    Ok(parsed)
}

/// Resource type name for a schema file: `network.py.schema` and
/// `network.schema.yaml` both name `network`.
pub fn schema_name_for(path: &Path) -> String {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    file_name
        .split('.')
        .next()
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const NETWORK: &str = r#"
info:
  title: Network
imports:
  - path: network.py
additionalProperties: false
required: [name]
properties:
  name:
    type: string
  subnets:
    type: array
    items:
      type: object
      properties:
        region:
          type: string
outputs:
  properties:
    - selfLink:
        type: string
"#;

    #[test]
    fn test_parse_schema_document() {
        let schema = Schema::from_yaml_str("network", NETWORK).unwrap();

        assert_eq!(schema.title.as_deref(), Some("Network"));
        assert_eq!(schema.imports, vec!["network.py"]);
        assert!(!schema.additional_properties);
        assert_eq!(schema.required, vec!["name"]);
        assert_eq!(schema.properties["name"].field_type, FieldType::String);

        let items = schema.properties["subnets"].items.as_ref().unwrap();
        assert_eq!(items.field_type, FieldType::Object);
        assert!(items.schema.as_ref().unwrap().properties.contains_key("region"));
        assert!(schema.outputs.contains_key("selfLink"));
    }

    #[test]
    fn test_unknown_type_rejected() {
        let err = Schema::from_yaml_str("bad", "properties:\n  a:\n    type: text\n").unwrap_err();
        assert!(err.to_string().contains("unknown type 'text'"));
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let err =
            Schema::from_yaml_str("bad", "properties:\n  a:\n    type: string\n    pattern: '('\n")
                .unwrap_err();
        assert!(matches!(err, SpecError::InvalidSchema { .. }));
    }

    #[test]
    fn test_schema_name_for() {
        assert_eq!(schema_name_for(Path::new("x/network.py.schema")), "network");
        assert_eq!(schema_name_for(Path::new("gcs_bucket.schema.yaml")), "gcs_bucket");
    }
}
