//! Domain Types - Resource identities, objects and search payloads
//!
//! Objects are kept as untyped JSON documents; only the handful of fields
//! the client routes on (`metadata.name`, `metadata.resourceVersion` and
//! `status.conversion`) get typed accessors.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

// =============================================================================
// Resource Type
// =============================================================================

/// A resource kind served under one API version
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceType {
    /// API group (e.g. dashboard.grafana.app)
    pub group: String,
    /// API version (e.g. v1beta1)
    pub version: String,
    /// Kind (e.g. Dashboard)
    pub kind: String,
    /// Plural resource name (e.g. dashboards)
    pub plural: String,
}

impl ResourceType {
    pub fn new(
        group: impl Into<String>,
        version: impl Into<String>,
        kind: impl Into<String>,
        plural: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
            plural: plural.into(),
        }
    }

    /// Same resource kind, served under another version
    pub fn with_version(&self, version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            ..self.clone()
        }
    }

    /// The `apiVersion` string objects of this type carry
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}/{}", self.plural, self.group, self.version)
    }
}

/// Fully-qualified address of one stored object
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceIdentity {
    pub resource: ResourceType,
    pub namespace: String,
    pub name: String,
}

impl std::fmt::Display for ResourceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.resource, self.namespace, self.name)
    }
}

// =============================================================================
// Resource Object
// =============================================================================

/// A dynamically typed stored object
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceObject(Map<String, Value>);

impl ResourceObject {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Build an object from a JSON value, which must be a JSON object
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(Error::InvalidObject(format!(
                "expected a JSON object, got {}",
                json_type_name(&other)
            ))),
        }
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Look up a nested field; any non-object hop yields `None`
    pub fn field(&self, path: &[&str]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        let mut current = self.0.get(*first)?;
        for key in rest {
            current = current.as_object()?.get(*key)?;
        }
        Some(current)
    }

    /// Set a nested field, creating intermediate objects as needed.
    /// Non-object intermediates are replaced.
    pub fn set_field(&mut self, path: &[&str], value: Value) {
        let Some((last, parents)) = path.split_last() else {
            return;
        };
        let mut current = &mut self.0;
        for key in parents {
            let entry = current
                .entry(key.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            current = match entry {
                Value::Object(map) => map,
                _ => return,
            };
        }
        current.insert(last.to_string(), value);
    }

    /// Remove a top-level field
    pub fn remove_field(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn name(&self) -> Option<&str> {
        self.field(&["metadata", "name"]).and_then(Value::as_str)
    }

    pub fn resource_version(&self) -> Option<&str> {
        self.field(&["metadata", "resourceVersion"])
            .and_then(Value::as_str)
    }

    pub fn api_version(&self) -> Option<&str> {
        self.field(&["apiVersion"]).and_then(Value::as_str)
    }

    pub fn labels(&self) -> BTreeMap<String, String> {
        self.field(&["metadata", "labels"])
            .and_then(Value::as_object)
            .map(|labels| {
                labels
                    .iter()
                    .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The object's name, or an error when it has none
    pub fn require_name(&self) -> Result<&str> {
        self.name()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| Error::InvalidObject("metadata.name is required".into()))
    }

    /// Decode `status.conversion`, if present and well-formed
    pub fn conversion_status(&self) -> Option<ConversionStatus> {
        ConversionStatus::decode(self.field(&["status", "conversion"])?)
    }
}

impl From<Map<String, Value>> for ResourceObject {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

impl TryFrom<Value> for ResourceObject {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        Self::from_value(value)
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// =============================================================================
// Conversion Status
// =============================================================================

/// Server-side marker stamped on objects that could not be converted to
/// the version they were requested under
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionStatus {
    pub failed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stored_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConversionStatus {
    /// Decode field by field. A wrongly typed field makes the whole marker
    /// unreadable, which callers treat the same as "no marker".
    pub fn decode(value: &Value) -> Option<Self> {
        let fields = value.as_object()?;

        let failed = match fields.get("failed") {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(_) => return None,
        };
        let stored_version = optional_string(fields.get("storedVersion"))?;
        let error = optional_string(fields.get("error"))?;

        Some(Self {
            failed,
            stored_version,
            error,
        })
    }

    /// Version to re-read from, when the marker reports a failure
    pub fn fallback_version(&self) -> Option<&str> {
        if !self.failed {
            return None;
        }
        self.stored_version.as_deref().filter(|v| !v.is_empty())
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// `Some(None)` when absent, `Some(Some(_))` for a string, `None` otherwise
fn optional_string(value: Option<&Value>) -> Option<Option<String>> {
    match value {
        None | Some(Value::Null) => Some(None),
        Some(Value::String(s)) => Some(Some(s.clone())),
        Some(_) => None,
    }
}

// =============================================================================
// Request Options
// =============================================================================

/// Options for reading a single object
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetOptions {
    /// Read at a specific resourceVersion, when the store supports it
    pub resource_version: Option<String>,
}

/// Options for listing objects
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    /// Equality label selector (`key=value`)
    pub label_selector: Option<String>,
    /// Page size
    pub limit: Option<u32>,
    /// Continue token from a previous page
    pub continue_token: Option<String>,
}

/// Options for deleting an object
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteOptions {
    /// Only delete if the stored resourceVersion matches
    pub resource_version: Option<String>,
}

/// One page of a list call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceList {
    pub items: Vec<ResourceObject>,
    pub continue_token: Option<String>,
}

// =============================================================================
// Search
// =============================================================================

/// Search field holding the object name
pub const SEARCH_FIELD_NAME: &str = "name";

/// Search field holding the indexed resourceVersion
pub const SEARCH_FIELD_RESOURCE_VERSION: &str = "resource_version";

/// Comparison operator for a search requirement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchOperator {
    Equals,
    NotEquals,
    In,
    NotIn,
}

impl std::fmt::Display for SearchOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchOperator::Equals => write!(f, "="),
            SearchOperator::NotEquals => write!(f, "!="),
            SearchOperator::In => write!(f, "in"),
            SearchOperator::NotIn => write!(f, "notin"),
        }
    }
}

/// A single field predicate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRequirement {
    pub key: String,
    pub operator: SearchOperator,
    pub values: Vec<String>,
}

impl FieldRequirement {
    pub fn equals(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            operator: SearchOperator::Equals,
            values: vec![value.into()],
        }
    }

    /// Evaluate against an indexed field value
    pub fn matches(&self, actual: Option<&str>) -> bool {
        let hit = actual.is_some_and(|a| self.values.iter().any(|v| v == a));
        match self.operator {
            SearchOperator::Equals | SearchOperator::In => hit,
            SearchOperator::NotEquals | SearchOperator::NotIn => !hit,
        }
    }
}

/// Predicate over indexed fields, all requirements ANDed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub fields: Vec<FieldRequirement>,
    pub limit: i64,
}

impl SearchQuery {
    /// Single-requirement equality query
    pub fn field_equals(key: impl Into<String>, value: impl Into<String>, limit: i64) -> Self {
        Self {
            fields: vec![FieldRequirement::equals(key, value)],
            limit,
        }
    }
}

/// One indexed document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub name: String,
    pub namespace: String,
    pub resource_version: String,
    pub fields: BTreeMap<String, String>,
}

/// Search response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub total_hits: i64,
    pub hits: Vec<SearchHit>,
}

/// Object counts for a namespace
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceStats {
    pub counts: Vec<ResourceCount>,
}

impl ResourceStats {
    /// Count for a resource, zero when not reported
    pub fn count_for(&self, group: &str, plural: &str) -> i64 {
        self.counts
            .iter()
            .find(|c| c.group == group && c.resource == plural)
            .map(|c| c.count)
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceCount {
    pub group: String,
    pub resource: String,
    pub count: i64,
}

// =============================================================================
// Users
// =============================================================================

/// A user known to the identity service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: i64,
    pub uid: String,
    pub login: String,
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub is_service_account: bool,
}
