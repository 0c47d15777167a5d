//! Declarative query definitions as supplied by callers.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::engine::config::{read_file, ConfigError};
use crate::query::path::split_property_path;

/// Type a property value is coerced to during extraction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    /// Keep whatever scalar type the payload carries.
    #[default]
    Any,
    /// JSON string.
    String,
    /// JSON boolean.
    Boolean,
    /// Any JSON number, widened to `f64`.
    Double,
    /// Integral JSON number.
    Int64,
    /// RFC 3339 timestamp string.
    DateTimeOffset,
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PropertyType::Any => "any",
            PropertyType::String => "string",
            PropertyType::Boolean => "boolean",
            PropertyType::Double => "double",
            PropertyType::Int64 => "int64",
            PropertyType::DateTimeOffset => "date_time_offset",
        })
    }
}

/// One property to extract from each matched node.
///
/// Deserializes either from a bare string (`"Status.Health"`) or from a table
/// with `property`, optional `name` and optional `type`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "PropertySpecRepr")]
pub struct PropertySpec {
    /// Dotted property path; `\.` escapes a literal dot.
    pub property: String,
    /// Key of the extracted value in the output record.
    pub name: String,
    /// Expected value type.
    #[serde(rename = "type")]
    pub kind: PropertyType,
}

impl PropertySpec {
    /// Untyped spec whose output key is the property path itself.
    pub fn new(property: impl Into<String>) -> Self {
        let property = property.into();
        Self {
            name: property.clone(),
            property,
            kind: PropertyType::Any,
        }
    }

    /// Overrides the output key.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the expected type.
    pub fn typed(mut self, kind: PropertyType) -> Self {
        self.kind = kind;
        self
    }

    /// Property path segments. A path that cannot be split is looked up as a
    /// single key.
    pub fn segments(&self) -> Vec<String> {
        split_property_path(&self.property).unwrap_or_else(|| vec![self.property.clone()])
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PropertySpecRepr {
    Bare(String),
    Full {
        property: String,
        #[serde(default)]
        name: Option<String>,
        #[serde(default, rename = "type", alias = "kind")]
        kind: PropertyType,
    },
}

impl From<PropertySpecRepr> for PropertySpec {
    fn from(repr: PropertySpecRepr) -> Self {
        match repr {
            PropertySpecRepr::Bare(property) => PropertySpec::new(property),
            PropertySpecRepr::Full {
                property,
                name,
                kind,
            } => {
                let spec = PropertySpec::new(property).typed(kind);
                match name {
                    Some(name) => spec.named(name),
                    None => spec,
                }
            }
        }
    }
}

/// One path expression plus what to extract from the nodes it matches.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubqueryDefinition {
    /// Identifier, unique within its query.
    #[serde(alias = "subquery_id")]
    pub id: String,
    /// Path expression.
    #[serde(alias = "redpath")]
    pub path: String,
    /// Properties to extract.
    #[serde(default)]
    pub properties: Vec<PropertySpec>,
    /// Subqueries evaluated from each node this one matches.
    #[serde(default)]
    pub children: Vec<String>,
}

impl SubqueryDefinition {
    /// Subquery with no properties and no children.
    pub fn new(id: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            properties: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Adds a property spec.
    pub fn with_property(mut self, spec: PropertySpec) -> Self {
        self.properties.push(spec);
        self
    }

    /// Adds untyped properties by path.
    pub fn with_properties<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.properties
            .extend(names.into_iter().map(PropertySpec::new));
        self
    }

    /// Links a child subquery.
    pub fn with_child(mut self, child: impl Into<String>) -> Self {
        self.children.push(child.into());
        self
    }
}

/// Named, ordered set of subqueries.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryDefinition {
    /// Query identifier.
    #[serde(alias = "query_id")]
    pub id: String,
    /// Subqueries in declaration order.
    #[serde(default, alias = "subquery")]
    pub subqueries: Vec<SubqueryDefinition>,
}

impl QueryDefinition {
    /// Query with no subqueries.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            subqueries: Vec::new(),
        }
    }

    /// Appends a subquery.
    pub fn with_subquery(mut self, subquery: SubqueryDefinition) -> Self {
        self.subqueries.push(subquery);
        self
    }

    /// Parses a JSON document.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|source| ConfigError::Json {
            path: PathBuf::new(),
            source,
        })
    }

    /// Parses a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Toml {
            path: PathBuf::new(),
            source,
        })
    }

    /// Reads a `.json` or `.toml` query file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("json") => {
                let contents = read_file(path)?;
                serde_json::from_str(&contents).map_err(|source| ConfigError::Json {
                    path: path.to_path_buf(),
                    source,
                })
            }
            Some("toml") => {
                let contents = read_file(path)?;
                toml::from_str(&contents).map_err(|source| ConfigError::Toml {
                    path: path.to_path_buf(),
                    source,
                })
            }
            _ => Err(ConfigError::UnsupportedFormat {
                path: path.to_path_buf(),
            }),
        }
    }
}
