//! Generic value tree decoded from YAML documents.
//!
//! Every document is decoded into a [`ValueTree`] before any semantic
//! interpretation. Mapping keys are always strings and keep their insertion
//! order, so emission is deterministic.

use std::fmt;

use indexmap::IndexMap;
use serde::de;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Ordered string-keyed mapping.
pub type Mapping = IndexMap<String, ValueTree>;

/// A recursive, loosely typed document value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ValueTree {
    #[default]
    Null,
    Bool(bool),
    Number(serde_yaml::Number),
    String(String),
    Sequence(Vec<ValueTree>),
    Mapping(Mapping),
}

/// The kind of a value, as reported in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Null,
    Boolean,
    Number,
    String,
    Array,
    Object,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Null => "null",
            ValueKind::Boolean => "boolean",
            ValueKind::Number => "number",
            ValueKind::String => "string",
            ValueKind::Array => "array",
            ValueKind::Object => "object",
        };
        f.write_str(name)
    }
}

impl ValueTree {
    /// An empty mapping.
    pub fn mapping() -> Self {
        ValueTree::Mapping(Mapping::new())
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            ValueTree::Null => ValueKind::Null,
            ValueTree::Bool(_) => ValueKind::Boolean,
            ValueTree::Number(_) => ValueKind::Number,
            ValueTree::String(_) => ValueKind::String,
            ValueTree::Sequence(_) => ValueKind::Array,
            ValueTree::Mapping(_) => ValueKind::Object,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ValueTree::Null)
    }

    /// True for strings, numbers and booleans.
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            ValueTree::Bool(_) | ValueTree::Number(_) | ValueTree::String(_)
        )
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ValueTree::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ValueTree::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&Mapping> {
        match self {
            ValueTree::Mapping(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[ValueTree]> {
        match self {
            ValueTree::Sequence(items) => Some(items),
            _ => None,
        }
    }

    /// Look up a key of a mapping. Returns `None` for non-mappings.
    pub fn get(&self, key: &str) -> Option<&ValueTree> {
        self.as_mapping().and_then(|m| m.get(key))
    }

    /// Look up a dotted path such as `audit.logs_bigquery_dataset.dataset_id`.
    pub fn get_path(&self, path: &str) -> Option<&ValueTree> {
        path.split('.')
            .filter(|segment| !segment.is_empty())
            .try_fold(self, |node, segment| node.get(segment))
    }

    /// Look up a dotted path and return it as a string slice.
    pub fn str_at(&self, path: &str) -> Option<&str> {
        self.get_path(path).and_then(ValueTree::as_str)
    }

    /// True when the value carries no content: null, an empty string or an
    /// empty collection.
    pub fn is_empty_section(&self) -> bool {
        match self {
            ValueTree::Null => true,
            ValueTree::String(s) => s.trim().is_empty(),
            ValueTree::Sequence(items) => items.is_empty(),
            ValueTree::Mapping(m) => m.is_empty(),
            _ => false,
        }
    }

    /// Return a copy of this mapping without `key`. Non-mappings are cloned as is.
    pub fn without_key(&self, key: &str) -> ValueTree {
        match self {
            ValueTree::Mapping(m) => {
                let mut copy = m.clone();
                copy.shift_remove(key);
                ValueTree::Mapping(copy)
            }
            other => other.clone(),
        }
    }

    /// True for strings that are whole interpolation expressions, such as
    /// `${google_compute_router.forseti-router.name}` or `$(ref.net.selfLink)`.
    /// These are passed through untouched for the downstream tool to resolve.
    pub fn is_reference(&self) -> bool {
        match self {
            ValueTree::String(s) => {
                let s = s.trim();
                (s.starts_with("${") && s.ends_with('}'))
                    || (s.starts_with("$(") && s.ends_with(')'))
            }
            _ => false,
        }
    }

    /// Render a scalar as text. Collections and null return `None`.
    pub fn scalar_text(&self) -> Option<String> {
        match self {
            ValueTree::Bool(b) => Some(b.to_string()),
            ValueTree::Number(n) => Some(n.to_string()),
            ValueTree::String(s) => Some(s.clone()),
            _ => None,
        }
    }

    /// Decode a YAML value. Scalar keys are stringified; collection keys are
    /// rejected. YAML tags are dropped.
    pub fn from_yaml(value: serde_yaml::Value) -> Result<Self, String> {
        Ok(match value {
            serde_yaml::Value::Null => ValueTree::Null,
            serde_yaml::Value::Bool(b) => ValueTree::Bool(b),
            serde_yaml::Value::Number(n) => ValueTree::Number(n),
            serde_yaml::Value::String(s) => ValueTree::String(s),
            serde_yaml::Value::Sequence(items) => ValueTree::Sequence(
                items
                    .into_iter()
                    .map(ValueTree::from_yaml)
                    .collect::<Result<_, _>>()?,
            ),
            serde_yaml::Value::Mapping(m) => {
                let mut out = Mapping::with_capacity(m.len());
                for (key, value) in m {
                    let key = match key {
                        serde_yaml::Value::String(s) => s,
                        serde_yaml::Value::Number(n) => n.to_string(),
                        serde_yaml::Value::Bool(b) => b.to_string(),
                        serde_yaml::Value::Null => "null".to_string(),
                        other => {
                            return Err(format!("unsupported mapping key: {:?}", other));
                        }
                    };
                    out.insert(key, ValueTree::from_yaml(value)?);
                }
                ValueTree::Mapping(out)
            }
            serde_yaml::Value::Tagged(tagged) => ValueTree::from_yaml(tagged.value)?,
        })
    }
}

impl Serialize for ValueTree {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ValueTree::Null => serializer.serialize_unit(),
            ValueTree::Bool(b) => serializer.serialize_bool(*b),
            ValueTree::Number(n) => n.serialize(serializer),
            ValueTree::String(s) => serializer.serialize_str(s),
            ValueTree::Sequence(items) => items.serialize(serializer),
            ValueTree::Mapping(m) => m.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for ValueTree {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = serde_yaml::Value::deserialize(deserializer)?;
        ValueTree::from_yaml(raw).map_err(de::Error::custom)
    }
}

impl From<&str> for ValueTree {
    fn from(value: &str) -> Self {
        ValueTree::String(value.to_string())
    }
}

impl From<String> for ValueTree {
    fn from(value: String) -> Self {
        ValueTree::String(value)
    }
}

impl From<bool> for ValueTree {
    fn from(value: bool) -> Self {
        ValueTree::Bool(value)
    }
}

impl From<i64> for ValueTree {
    fn from(value: i64) -> Self {
        ValueTree::Number(value.into())
    }
}

impl From<Mapping> for ValueTree {
    fn from(value: Mapping) -> Self {
        ValueTree::Mapping(value)
    }
}

impl From<Vec<ValueTree>> for ValueTree {
    fn from(value: Vec<ValueTree>) -> Self {
        ValueTree::Sequence(value)
    }
}
