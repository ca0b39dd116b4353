//! Flattened drift records.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use kubedrift_store::{Key, KeyError};
use serde::{Deserialize, Serialize};

/// Flat string-to-string map; drift records carry no nested values.
pub type FieldMap = BTreeMap<String, String>;

/// Segment used for cluster-scoped resources in place of a namespace.
pub const NO_NAMESPACE: &str = "none";

/// The closed set of resource kinds kubedrift records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Pod,
    Node,
    Event,
    Deployment,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 4] = [Self::Pod, Self::Node, Self::Event, Self::Deployment];

    /// Lowercase name, used as the leading key segment.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pod => "pod",
            Self::Node => "node",
            Self::Event => "event",
            Self::Deployment => "deployment",
        }
    }

    /// The API server's spelling, as found in an object's `kind` field.
    pub fn api_name(self) -> &'static str {
        match self {
            Self::Pod => "Pod",
            Self::Node => "Node",
            Self::Event => "Event",
            Self::Deployment => "Deployment",
        }
    }

    /// The kind whose drift subtree starts with `segment`, if any.
    ///
    /// Exact match only; metric keys must never lead with one of these.
    pub fn from_segment(segment: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == segment)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown resource kind {0:?}")]
pub struct UnknownKind(pub String);

impl FromStr for ResourceKind {
    type Err = UnknownKind;

    /// Accepts the key spelling (`pod`) and the API spelling (`Pod`), plus
    /// the plural used in URLs (`pods`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        let singular = lower.strip_suffix('s').unwrap_or(&lower);
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == singular)
            .ok_or_else(|| UnknownKind(s.to_string()))
    }
}

/// Snapshot of one resource at observation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftRecord {
    pub key: Key,
    pub kind: ResourceKind,
    /// Identity and status fields.
    pub fields: FieldMap,
    #[serde(default)]
    pub labels: FieldMap,
    #[serde(default)]
    pub annotations: FieldMap,
    #[serde(default)]
    pub conditions: FieldMap,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub containers: Vec<FieldMap>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resource_requests: Vec<FieldMap>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resource_limits: Vec<FieldMap>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<FieldMap>,
    #[serde(default, skip_serializing_if = "FieldMap::is_empty")]
    pub involved_object: FieldMap,
}

impl DriftRecord {
    pub fn new(key: Key, kind: ResourceKind) -> Self {
        Self {
            key,
            kind,
            fields: FieldMap::new(),
            labels: FieldMap::new(),
            annotations: FieldMap::new(),
            conditions: FieldMap::new(),
            containers: Vec::new(),
            resource_requests: Vec::new(),
            resource_limits: Vec::new(),
            volumes: Vec::new(),
            involved_object: FieldMap::new(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// `/{kind}/{namespace}/{name}/{uid}`. An empty namespace becomes
/// [`NO_NAMESPACE`]; an empty name or uid is an error.
pub fn record_key(kind: ResourceKind, namespace: &str, name: &str, uid: &str) -> Result<Key, KeyError> {
    let namespace = if namespace.is_empty() { NO_NAMESPACE } else { namespace };
    Key::build([kind.as_str(), namespace, name, uid])
}

/// Scan prefix for records of `kind`, narrowed by namespace then name.
pub fn drift_subtree(kind: ResourceKind, rest: &[&str]) -> Result<Key, KeyError> {
    Key::subtree(std::iter::once(kind.as_str()).chain(rest.iter().copied()))
}
