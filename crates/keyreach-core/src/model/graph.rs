use super::{Metadata, Resource};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Handle to a resource stored in a [`ResourceGraph`].
pub type ResourceId = NodeIndex;

/// A resource as extracted from a response, before it is placed in the graph.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceDraft {
    pub name: String,
    pub fully_qualified_name: String,
    pub resource_type: String,
    pub metadata: Metadata,
}

impl ResourceDraft {
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
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Edge from an owning resource to the resource it contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Contains;

/// Arena of every resource discovered in one analysis run.
///
/// Nodes are never removed and a child can only be added under a parent that
/// is already present, so every ancestor chain is finite and acyclic. Fully
/// qualified names are unique: adding a name twice returns the first id.
#[derive(Debug, Clone, Default)]
pub struct ResourceGraph {
    graph: DiGraph<ResourceDraft, Contains>,
    fqn_map: HashMap<String, NodeIndex>,
}

impl ResourceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a top-level resource, returning its id.
    pub fn add_root(&mut self, draft: ResourceDraft) -> ResourceId {
        self.insert(None, draft).0
    }

    /// Add a resource owned by `parent`. Returns `None` if `parent` is not in this graph.
    pub fn add_child(&mut self, parent: ResourceId, draft: ResourceDraft) -> Option<ResourceId> {
        self.graph.node_weight(parent)?;
        Some(self.insert(Some(parent), draft).0)
    }

    /// The id for `draft`, and whether this call created it.
    fn insert(&mut self, parent: Option<ResourceId>, draft: ResourceDraft) -> (ResourceId, bool) {
        if let Some(&idx) = self.fqn_map.get(&draft.fully_qualified_name) {
            return (idx, false);
        }
        let fqn = draft.fully_qualified_name.clone();
        let idx = self.graph.add_node(draft);
        if let Some(parent) = parent {
            self.graph.add_edge(parent, idx, Contains);
        }
        self.fqn_map.insert(fqn, idx);
        (idx, true)
    }

    pub fn get(&self, id: ResourceId) -> Option<&ResourceDraft> {
        self.graph.node_weight(id)
    }

    pub fn id_of(&self, fully_qualified_name: &str) -> Option<ResourceId> {
        self.fqn_map.get(fully_qualified_name).copied()
    }

    pub fn parent_of(&self, id: ResourceId) -> Option<ResourceId> {
        self.graph
            .neighbors_directed(id, Direction::Incoming)
            .next()
    }

    pub fn children_of(&self, id: ResourceId) -> Vec<ResourceId> {
        let mut children: Vec<ResourceId> = self
            .graph
            .neighbors_directed(id, Direction::Outgoing)
            .collect();
        children.sort();
        children
    }

    /// Ancestor ids, nearest first.
    pub fn ancestors(&self, id: ResourceId) -> Vec<ResourceId> {
        std::iter::successors(self.parent_of(id), |&p| self.parent_of(p)).collect()
    }

    pub fn depth(&self, id: ResourceId) -> usize {
        self.ancestors(id).len()
    }

    /// Resources with no owner.
    pub fn roots(&self) -> Vec<ResourceId> {
        self.graph
            .node_indices()
            .filter(|&idx| self.parent_of(idx).is_none())
            .collect()
    }

    /// All ids in insertion order.
    pub fn ids(&self) -> Vec<ResourceId> {
        self.graph.node_indices().collect()
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Materialize a resource together with a copy of its ancestor chain.
    pub fn resource(&self, id: ResourceId) -> Option<Resource> {
        let draft = self.get(id)?;
        let parent = self
            .parent_of(id)
            .and_then(|p| self.resource(p))
            .map(Box::new);
        Some(Resource {
            name: draft.name.clone(),
            fully_qualified_name: draft.fully_qualified_name.clone(),
            resource_type: draft.resource_type.clone(),
            metadata: draft.metadata.clone(),
            parent,
        })
    }

    /// Copies of every resource of the given type.
    pub fn of_type(&self, resource_type: &str) -> Vec<(ResourceId, Resource)> {
        self.graph
            .node_indices()
            .filter(|&idx| self.graph[idx].resource_type == resource_type)
            .filter_map(|idx| self.resource(idx).map(|r| (idx, r)))
            .collect()
    }
}

/// A [`ResourceGraph`] shared between concurrent walk branches.
///
/// Writers append under the write lock; readers get copies under the read lock.
#[derive(Debug, Clone, Default)]
pub struct SharedResources {
    inner: Arc<RwLock<ResourceGraph>>,
}

impl SharedResources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Like [`ResourceGraph::add_root`], also reporting whether the node is new.
    pub async fn add_root(&self, draft: ResourceDraft) -> (ResourceId, bool) {
        self.inner.write().await.insert(None, draft)
    }

    /// Like [`ResourceGraph::add_child`], also reporting whether the node is new.
    pub async fn add_child(&self, parent: ResourceId, draft: ResourceDraft) -> Option<(ResourceId, bool)> {
        let mut graph = self.inner.write().await;
        graph.get(parent)?;
        Some(graph.insert(Some(parent), draft))
    }

    pub async fn resource(&self, id: ResourceId) -> Option<Resource> {
        self.inner.read().await.resource(id)
    }

    pub async fn of_type(&self, resource_type: &str) -> Vec<(ResourceId, Resource)> {
        self.inner.read().await.of_type(resource_type)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Take the graph back, copying only if another handle is still alive.
    pub async fn into_inner(self) -> ResourceGraph {
        match Arc::try_unwrap(self.inner) {
            Ok(lock) => lock.into_inner(),
            Err(shared) => shared.read().await.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project(key: &str) -> ResourceDraft {
        ResourceDraft::new(key, format!("project/{}", key), "project")
            .with_metadata("key", key)
    }

    #[test]
    fn test_duplicate_name_returns_existing_id() {
        let mut graph = ResourceGraph::new();
        let first = graph.add_root(project("web"));
        let second = graph.add_root(project("web"));
        assert_eq!(first, second);
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_child_requires_known_parent() {
        let mut graph = ResourceGraph::new();
        let bogus = NodeIndex::new(7);
        assert!(graph
            .add_child(bogus, ResourceDraft::new("prod", "env/prod", "environment"))
            .is_none());
        assert!(graph.is_empty());
    }

    #[test]
    fn test_materialized_parent_chain() {
        let mut graph = ResourceGraph::new();
        let p = graph.add_root(project("web"));
        let e = graph
            .add_child(p, ResourceDraft::new("prod", "project/web/env/prod", "environment"))
            .unwrap();
        let x = graph
            .add_child(
                e,
                ResourceDraft::new("exp", "project/web/env/prod/experiment/exp", "experiment"),
            )
            .unwrap();

        assert_eq!(graph.depth(x), 2);
        assert_eq!(graph.ancestors(x), vec![e, p]);
        assert_eq!(graph.roots(), vec![p]);
        assert_eq!(graph.children_of(p), vec![e]);

        let exp = graph.resource(x).unwrap();
        let parent = exp.parent.as_ref().unwrap();
        assert_eq!(parent.fully_qualified_name, "project/web/env/prod");
        assert_eq!(
            parent.parent.as_ref().unwrap().metadata_str("key"),
            Some("web")
        );
        assert_eq!(exp.depth(), 2);
    }

    #[test]
    fn test_of_type_returns_copies() {
        let mut graph = ResourceGraph::new();
        graph.add_root(project("web"));
        graph.add_root(project("api"));
        graph.add_root(ResourceDraft::new("alice", "member/alice", "member"));

        let mut projects: Vec<String> = graph
            .of_type("project")
            .into_iter()
            .map(|(_, r)| r.name)
            .collect();
        projects.sort();
        assert_eq!(projects, vec!["api", "web"]);
    }

    #[tokio::test]
    async fn test_shared_resources_concurrent_appends() {
        let shared = SharedResources::new();
        let mut handles = Vec::new();
        for i in 0..16 {
            let shared = shared.clone();
            handles.push(tokio::spawn(async move {
                shared.add_root(project(&format!("p{}", i))).await
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(shared.len().await, 16);
        assert_eq!(shared.of_type("project").await.len(), 16);
        let graph = shared.into_inner().await;
        assert_eq!(graph.len(), 16);
    }

    #[tokio::test]
    async fn test_shared_add_reports_new_nodes() {
        let shared = SharedResources::new();
        let (web, created) = shared.add_root(project("web")).await;
        assert!(created);
        assert_eq!(shared.add_root(project("web")).await, (web, false));

        let prod = ResourceDraft::new("prod", "project/web/env/prod", "environment");
        let (env, created) = shared.add_child(web, prod.clone()).await.unwrap();
        assert!(created);
        assert_eq!(shared.add_child(web, prod.clone()).await, Some((env, false)));
        assert!(shared.add_child(NodeIndex::new(9), prod).await.is_none());
        assert_eq!(shared.len().await, 2);
    }
}
