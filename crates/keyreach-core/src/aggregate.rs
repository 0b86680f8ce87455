use crate::model::{AnalyzerKind, AnalyzerResult, Binding, Metadata, ResourceGraph, ResourceId};
use crate::permissions::{PermissionSet, PermissionTable};
use std::collections::HashMap;

/// Permissions held by the credential, optionally refined per resource.
#[derive(Debug, Clone, Default)]
pub struct Grants {
    pub credential: PermissionSet,
    pub per_resource: HashMap<ResourceId, PermissionSet>,
}

impl Grants {
    pub fn credential_wide(credential: PermissionSet) -> Self {
        Self {
            credential,
            per_resource: HashMap::new(),
        }
    }

    /// Attach a resource-specific set; it replaces the credential-wide set for that resource.
    pub fn with_resource(mut self, id: ResourceId, held: PermissionSet) -> Self {
        self.per_resource.insert(id, held);
        self
    }

    pub fn for_resource(&self, id: ResourceId) -> &PermissionSet {
        self.per_resource.get(&id).unwrap_or(&self.credential)
    }
}

/// Every resource lands exactly once: as bindings when at least one
/// applicable permission is held, otherwise as an unbounded resource.
pub fn aggregate(
    kind: AnalyzerKind,
    graph: &ResourceGraph,
    table: &PermissionTable,
    grants: &Grants,
    metadata: Metadata,
) -> AnalyzerResult {
    let mut result = AnalyzerResult::new(kind);
    result.metadata = metadata;

    let mut resources: Vec<_> = graph
        .ids()
        .into_iter()
        .filter_map(|id| graph.resource(id).map(|r| (id, r)))
        .collect();
    resources.sort_by(|a, b| a.1.fully_qualified_name.cmp(&b.1.fully_qualified_name));

    for (id, resource) in resources {
        let permissions = table.resolve(&resource.resource_type, grants.for_resource(id));
        if permissions.is_empty() {
            result.unbounded_resources.push(resource);
            continue;
        }
        for permission in permissions {
            result.bindings.push(Binding {
                resource: resource.clone(),
                permission,
            });
        }
    }

    result
}
