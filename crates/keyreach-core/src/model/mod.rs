pub mod graph;

pub use graph::{ResourceDraft, ResourceGraph, ResourceId, SharedResources};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Sentinel permission meaning "everything this resource supports".
pub const FULL_ACCESS: &str = "full_access";

/// Free-form vendor attributes attached to a resource or a result.
pub type Metadata = BTreeMap<String, Value>;

/// A discoverable entity a credential can access.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub name: String,
    pub fully_qualified_name: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: Metadata,
    /// Owning resource, copied from the arena at materialization time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<Box<Resource>>,
}

impl Resource {
    pub fn new(
        name: impl Into<String>,
        fully_qualified_name: impl Into<String>,
        resource_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            fully_qualified_name: fully_qualified_name.into(),
            resource_type: resource_type.into(),
            metadata: Metadata::new(),
            parent: None,
        }
    }

    /// Walk the parent chain, nearest ancestor first.
    pub fn ancestors(&self) -> impl Iterator<Item = &Resource> {
        std::iter::successors(self.parent.as_deref(), |r| r.parent.as_deref())
    }

    /// Number of ancestors above this resource.
    pub fn depth(&self) -> usize {
        self.ancestors().count()
    }

    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }
}

/// A single grant, optionally inherited from a broader permission.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Permission {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<Box<Permission>>,
}

impl Permission {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            parent: None,
        }
    }

    pub fn inherited_from(value: impl Into<String>, parent: Permission) -> Self {
        Self {
            value: value.into(),
            parent: Some(Box::new(parent)),
        }
    }
}

/// "This permission is granted on this resource."
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Binding {
    pub resource: Resource,
    pub permission: Permission,
}

/// A resource known to be reachable with no attributable permission.
pub type UnboundedResource = Resource;

/// The closed set of analyzers this crate ships.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalyzerKind {
    Figma,
    LaunchDarkly,
    Mysql,
}

impl AnalyzerKind {
    pub const ALL: [AnalyzerKind; 3] = [
        AnalyzerKind::Figma,
        AnalyzerKind::LaunchDarkly,
        AnalyzerKind::Mysql,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnalyzerKind::Figma => "figma",
            AnalyzerKind::LaunchDarkly => "launchdarkly",
            AnalyzerKind::Mysql => "mysql",
        }
    }
}

impl fmt::Display for AnalyzerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalyzerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AnalyzerKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown analyzer '{}'", s))
    }
}

/// The normalized output of every analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerResult {
    pub analyzer_type: AnalyzerKind,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub bindings: Vec<Binding>,
    #[serde(default)]
    pub unbounded_resources: Vec<UnboundedResource>,
}

impl AnalyzerResult {
    pub fn new(analyzer_type: AnalyzerKind) -> Self {
        Self {
            analyzer_type,
            metadata: Metadata::new(),
            bindings: Vec::new(),
            unbounded_resources: Vec::new(),
        }
    }

    /// Distinct bound resources, in binding order.
    pub fn bound_resources(&self) -> Vec<&Resource> {
        let mut seen = std::collections::HashSet::new();
        self.bindings
            .iter()
            .map(|b| &b.resource)
            .filter(|r| seen.insert(r.fully_qualified_name.as_str()))
            .collect()
    }

    /// Permission values bound to the resource with this name.
    pub fn permissions_for(&self, fully_qualified_name: &str) -> Vec<&str> {
        self.bindings
            .iter()
            .filter(|b| b.resource.fully_qualified_name == fully_qualified_name)
            .map(|b| b.permission.value.as_str())
            .collect()
    }

    pub fn resource_count(&self) -> usize {
        self.bound_resources().len() + self.unbounded_resources.len()
    }
}
