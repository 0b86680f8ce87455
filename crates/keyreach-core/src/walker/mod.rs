pub mod collection;

pub use collection::JsonCollection;

use crate::config::AnalyzerConfig;
use crate::error::{BranchError, BranchFailure, WalkError};
use crate::model::{Resource, ResourceDraft, ResourceGraph, ResourceId, SharedResources};
use crate::permissions::PermissionSet;
use crate::transport::{HttpRequest, HttpTransport};
use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, warn};

/// One level of a vendor's resource hierarchy.
pub trait ResourceCollection: Send + Sync {
    /// Short name used in logs and branch errors (e.g. `environments`).
    fn label(&self) -> &str;

    /// The branch is skipped unless the credential holds this permission.
    fn required_permission(&self) -> Option<&str> {
        None
    }

    /// The call listing this collection, given the owning resource.
    fn request(&self, parent: Option<&Resource>) -> Result<HttpRequest, String>;

    /// Turn a successful response body into resources.
    fn extract(&self, body: &str, parent: Option<&Resource>) -> Result<Vec<ResourceDraft>, String>;

    /// Collections fetched once per resource this collection yields.
    fn children(&self) -> &[Arc<dyn ResourceCollection>] {
        &[]
    }
}

/// Maximum depth of a collection tree, counting the top level as 1.
pub fn schema_depth(collections: &[Arc<dyn ResourceCollection>]) -> usize {
    collections
        .iter()
        .map(|c| 1 + schema_depth(c.children()))
        .max()
        .unwrap_or(0)
}

/// Resources gathered by a walk, plus the joined branch failures if any.
#[derive(Debug)]
pub struct WalkOutcome {
    pub resources: ResourceGraph,
    pub error: Option<WalkError>,
}

impl WalkOutcome {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

struct WalkContext {
    transport: Arc<dyn HttpTransport>,
    resources: SharedResources,
    permissions: PermissionSet,
    deadline: Instant,
    rate_limit_backoff: Duration,
}

type BranchFuture = Pin<Box<dyn Future<Output = Vec<BranchError>> + Send>>;

/// Walks collection trees against one transport. Failed branches are joined
/// into one error; resources from the other branches are always kept.
pub struct ResourceWalker {
    transport: Arc<dyn HttpTransport>,
    timeout: Duration,
    rate_limit_backoff: Duration,
}

impl ResourceWalker {
    pub fn new(transport: Arc<dyn HttpTransport>, config: &AnalyzerConfig) -> Self {
        Self {
            transport,
            timeout: config.timeout(),
            rate_limit_backoff: config.rate_limit_backoff(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_rate_limit_backoff(mut self, backoff: Duration) -> Self {
        self.rate_limit_backoff = backoff;
        self
    }

    /// Discover everything reachable from `roots` with `permissions`.
    pub async fn walk(
        &self,
        roots: &[Arc<dyn ResourceCollection>],
        permissions: &PermissionSet,
    ) -> WalkOutcome {
        let resources = SharedResources::new();
        let ctx = Arc::new(WalkContext {
            transport: Arc::clone(&self.transport),
            resources: resources.clone(),
            permissions: permissions.clone(),
            deadline: deadline_after(self.timeout),
            rate_limit_backoff: self.rate_limit_backoff,
        });

        let errors = walk_level(ctx, roots.to_vec(), None).await;
        let resources = resources.into_inner().await;

        if !errors.is_empty() {
            warn!(
                failed = errors.len(),
                discovered = resources.len(),
                "resource walk finished with failed branches"
            );
        }

        WalkOutcome {
            resources,
            error: WalkError::join(errors),
        }
    }
}

/// `now + wait`, with the wait capped at roughly thirty years.
fn deadline_after(wait: Duration) -> Instant {
    Instant::now() + wait.min(Duration::from_secs(FAR_FUTURE_SECS))
}

const FAR_FUTURE_SECS: u64 = 86_400 * 365 * 30;

/// Fetch every collection under one parent concurrently.
fn walk_level(
    ctx: Arc<WalkContext>,
    collections: Vec<Arc<dyn ResourceCollection>>,
    parent: Option<(ResourceId, Resource)>,
) -> BranchFuture {
    Box::pin(async move {
        let mut tasks = JoinSet::new();
        for collection in collections {
            if let Some(required) = collection.required_permission() {
                if !ctx.permissions.contains(required) && !ctx.permissions.has_full_access() {
                    debug!(
                        collection = collection.label(),
                        required, "skipping branch, permission not held"
                    );
                    continue;
                }
            }
            tasks.spawn(walk_collection(Arc::clone(&ctx), collection, parent.clone()));
        }
        join_branches(tasks).await
    })
}

async fn walk_collection(
    ctx: Arc<WalkContext>,
    collection: Arc<dyn ResourceCollection>,
    parent: Option<(ResourceId, Resource)>,
) -> Vec<BranchError> {
    let parent_resource = parent.as_ref().map(|(_, r)| r);
    let fail = |failure: BranchFailure| {
        warn!(
            collection = collection.label(),
            parent = parent_resource.map(|r| r.fully_qualified_name.as_str()),
            %failure,
            "branch failed"
        );
        vec![BranchError {
            collection: collection.label().to_string(),
            parent: parent_resource.map(|r| r.fully_qualified_name.clone()),
            failure,
        }]
    };

    let request = match collection.request(parent_resource) {
        Ok(request) => request,
        Err(message) => return fail(BranchFailure::Decode(message)),
    };
    let path = request.path.clone();

    let response =
        match tokio::time::timeout_at(ctx.deadline, ctx.transport.send(request)).await {
            Err(_) => return fail(BranchFailure::Timeout),
            Ok(Err(e)) => return fail(BranchFailure::Transport(e)),
            Ok(Ok(response)) => response,
        };

    let drafts = match response.status {
        200..=299 => match collection.extract(&response.body, parent_resource) {
            Ok(drafts) => drafts,
            Err(message) => return fail(BranchFailure::Decode(message)),
        },
        401 | 403 | 404 => {
            debug!(collection = collection.label(), path = %path, status = response.status, "branch not accessible");
            return Vec::new();
        }
        429 => {
            warn!(collection = collection.label(), path = %path, "rate limited, treating branch as empty");
            let wake = deadline_after(ctx.rate_limit_backoff).min(ctx.deadline);
            tokio::time::sleep_until(wake).await;
            return Vec::new();
        }
        status => return fail(BranchFailure::UnexpectedStatus(status)),
    };

    debug!(collection = collection.label(), found = drafts.len(), "collection fetched");

    // Only nodes this branch created are walked further; a sibling that
    // yielded the same name already owns its children.
    let mut inserted = BTreeSet::new();
    for draft in drafts {
        let added = match &parent {
            Some((parent_id, _)) => ctx.resources.add_child(*parent_id, draft).await,
            None => Some(ctx.resources.add_root(draft).await),
        };
        if let Some((id, true)) = added {
            inserted.insert(id);
        }
    }

    let children = collection.children();
    if children.is_empty() || inserted.is_empty() {
        return Vec::new();
    }

    let mut tasks = JoinSet::new();
    for id in inserted {
        if let Some(resource) = ctx.resources.resource(id).await {
            tasks.spawn(walk_level(
                Arc::clone(&ctx),
                children.to_vec(),
                Some((id, resource)),
            ));
        }
    }
    join_branches(tasks).await
}

async fn join_branches(mut tasks: JoinSet<Vec<BranchError>>) -> Vec<BranchError> {
    let mut errors = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(branch_errors) => errors.extend(branch_errors),
            Err(e) => errors.push(BranchError {
                collection: "walk task".to_string(),
                parent: None,
                failure: BranchFailure::Panicked(e.to_string()),
            }),
        }
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::testing::ScriptedTransport;
    use serde_json::json;

    fn projects() -> Arc<dyn ResourceCollection> {
        let experiments: Arc<dyn ResourceCollection> = Arc::new(
            JsonCollection::new(
                "experiments",
                "experiment",
                "/projects/{parent.parent.key}/environments/{parent.key}/experiments",
            )
            .items_at("/items")
            .id_at("/key"),
        );
        let environments: Arc<dyn ResourceCollection> = Arc::new(
            JsonCollection::new("environments", "environment", "/projects/{parent.key}/environments")
                .items_at("/items")
                .id_at("/key")
                .metadata("key", "/key")
                .child(experiments),
        );
        Arc::new(
            JsonCollection::new("projects", "project", "/projects")
                .items_at("/items")
                .id_at("/key")
                .metadata("key", "/key")
                .child(environments),
        )
    }

    fn flat(label: &str, path: &str) -> Arc<dyn ResourceCollection> {
        Arc::new(
            JsonCollection::new(label, label, path)
                .items_at("/items")
                .id_at("/id"),
        )
    }

    fn walker(transport: ScriptedTransport) -> ResourceWalker {
        ResourceWalker::new(Arc::new(transport), &AnalyzerConfig::default())
            .with_rate_limit_backoff(Duration::from_millis(5))
    }

    fn sorted_names(graph: &ResourceGraph) -> Vec<String> {
        let mut names: Vec<String> = graph
            .ids()
            .into_iter()
            .filter_map(|id| graph.get(id).map(|d| d.fully_qualified_name.clone()))
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_hierarchy_walk_links_parents() {
        let transport = ScriptedTransport::new()
            .on_json("GET", "/projects", 200, json!({"items": [{"key": "web"}, {"key": "api"}]}))
            .on_json("GET", "/projects/web/environments", 200, json!({"items": [{"key": "prod"}]}))
            .on_json("GET", "/projects/api/environments", 200, json!({"items": []}))
            .on_json(
                "GET",
                "/projects/web/environments/prod/experiments",
                200,
                json!({"items": [{"key": "checkout"}]}),
            );

        let outcome = walker(transport).walk(&[projects()], &PermissionSet::new()).await;

        assert!(outcome.is_complete());
        assert_eq!(
            sorted_names(&outcome.resources),
            vec![
                "project/api",
                "project/web",
                "project/web/environment/prod",
                "project/web/environment/prod/experiment/checkout",
            ]
        );

        let graph = &outcome.resources;
        let exp = graph
            .id_of("project/web/environment/prod/experiment/checkout")
            .unwrap();
        assert_eq!(graph.depth(exp), 2);
        let resource = graph.resource(exp).unwrap();
        assert_eq!(resource.parent.unwrap().resource_type, "environment");
    }

    #[tokio::test]
    async fn test_partial_success_keeps_other_branches() {
        let transport = ScriptedTransport::new()
            .on_json("GET", "/one", 200, json!({"items": [{"id": "a"}]}))
            .on("GET", "/two", 500, "boom")
            .on_json("GET", "/three", 200, json!({"items": [{"id": "c"}]}));
        let roots = vec![flat("one", "/one"), flat("two", "/two"), flat("three", "/three")];

        let outcome = walker(transport).walk(&roots, &PermissionSet::new()).await;

        assert_eq!(sorted_names(&outcome.resources), vec!["one/a", "three/c"]);
        let error = outcome.error.unwrap();
        assert_eq!(error.len(), 1);
        assert_eq!(error.branches[0].collection, "two");
        assert_eq!(error.branches[0].failure, BranchFailure::UnexpectedStatus(500));
        assert!(error.to_string().contains("two: unexpected status 500"));
    }

    #[tokio::test]
    async fn test_denied_and_rate_limited_branches_are_empty() {
        let transport = ScriptedTransport::new()
            .on("GET", "/members", 403, "")
            .on("GET", "/teams", 401, "")
            .on("GET", "/apps", 429, "")
            .on_json("GET", "/repos", 200, json!({"items": [{"id": "r1"}]}));
        let roots = vec![
            flat("members", "/members"),
            flat("teams", "/teams"),
            flat("apps", "/apps"),
            flat("repos", "/repos"),
            flat("missing", "/missing"),
        ];

        let outcome = walker(transport).walk(&roots, &PermissionSet::new()).await;

        assert!(outcome.is_complete());
        assert_eq!(sorted_names(&outcome.resources), vec!["repos/r1"]);
    }

    #[tokio::test]
    async fn test_transport_error_fails_only_its_branch() {
        let transport = ScriptedTransport::new()
            .on_json("GET", "/projects", 200, json!({"items": [{"key": "web"}, {"key": "api"}]}))
            .failing("GET", "/projects/web/environments")
            .on_json("GET", "/projects/api/environments", 200, json!({"items": [{"key": "dev"}]}))
            .on_json(
                "GET",
                "/projects/api/environments/dev/experiments",
                200,
                json!({"items": []}),
            );

        let outcome = walker(transport).walk(&[projects()], &PermissionSet::new()).await;

        assert!(outcome.resources.id_of("project/api/environment/dev").is_some());
        let error = outcome.error.unwrap();
        assert_eq!(error.len(), 1);
        assert_eq!(error.branches[0].parent.as_deref(), Some("project/web"));
        assert!(matches!(
            error.branches[0].failure,
            BranchFailure::Transport(TransportError::Request { .. })
        ));
    }

    #[tokio::test]
    async fn test_deadline_is_a_branch_error() {
        let transport = ScriptedTransport::new()
            .delayed("GET", "/slow", Duration::from_secs(5), 200)
            .on_json("GET", "/fast", 200, json!({"items": [{"id": "f"}]}));
        let roots = vec![flat("slow", "/slow"), flat("fast", "/fast")];

        let outcome = walker(transport)
            .with_timeout(Duration::from_millis(100))
            .walk(&roots, &PermissionSet::new())
            .await;

        assert_eq!(sorted_names(&outcome.resources), vec!["fast/f"]);
        let error = outcome.error.unwrap();
        assert_eq!(error.branches[0].failure, BranchFailure::Timeout);
    }

    #[tokio::test]
    async fn test_required_permission_guards_branch() {
        let transport = ScriptedTransport::new()
            .on_json("GET", "/secrets", 200, json!({"items": [{"id": "s"}]}));
        let guarded: Arc<dyn ResourceCollection> = Arc::new(
            JsonCollection::new("secrets", "secret", "/secrets")
                .items_at("/items")
                .id_at("/id")
                .requires("secrets:read"),
        );
        let transport = Arc::new(transport);
        let walker = ResourceWalker::new(transport.clone(), &AnalyzerConfig::default());

        let outcome = walker.walk(&[guarded.clone()], &PermissionSet::new()).await;
        assert!(outcome.resources.is_empty());
        assert_eq!(transport.call_count(), 0);

        let held: PermissionSet = ["secrets:read"].into_iter().collect();
        let outcome = walker.walk(&[guarded], &held).await;
        assert_eq!(outcome.resources.len(), 1);
    }

    #[tokio::test]
    async fn test_parent_chains_bounded_by_schema_depth() {
        let transport = ScriptedTransport::new()
            .on_json("GET", "/projects", 200, json!({"items": [{"key": "p1"}, {"key": "p2"}]}))
            .on_json("GET", "/projects/p1/environments", 200, json!({"items": [{"key": "e1"}, {"key": "e2"}]}))
            .on_json("GET", "/projects/p2/environments", 200, json!({"items": [{"key": "e1"}]}))
            .on_json("GET", "/projects/p1/environments/e1/experiments", 200, json!({"items": [{"key": "x"}]}))
            .on_json("GET", "/projects/p1/environments/e2/experiments", 200, json!({"items": [{"key": "x"}]}))
            .on_json("GET", "/projects/p2/environments/e1/experiments", 200, json!({"items": [{"key": "x"}]}));
        let roots = vec![projects()];
        let max_depth = schema_depth(&roots);

        let outcome = walker(transport).walk(&roots, &PermissionSet::new()).await;

        assert!(outcome.is_complete());
        assert_eq!(outcome.resources.len(), 2 + 3 + 3);
        for id in outcome.resources.ids() {
            let resource = outcome.resources.resource(id).unwrap();
            assert!(resource.depth() < max_depth);
        }
        let mut fqns = sorted_names(&outcome.resources);
        let total = fqns.len();
        fqns.dedup();
        assert_eq!(fqns.len(), total);
    }

    #[tokio::test]
    async fn test_shared_name_is_walked_once() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .on_json("GET", "/a", 200, json!({"items": [{"key": "web"}]}))
                .on_json("GET", "/b", 200, json!({"items": [{"key": "web"}]}))
                .on_json("GET", "/p/web/envs", 200, json!({"items": [{"key": "prod"}]})),
        );
        let envs: Arc<dyn ResourceCollection> = Arc::new(
            JsonCollection::new("environments", "environment", "/p/{parent.key}/envs")
                .items_at("/items")
                .id_at("/key"),
        );
        let root = |label: &str, path: &str| -> Arc<dyn ResourceCollection> {
            Arc::new(
                JsonCollection::new(label, "project", path)
                    .items_at("/items")
                    .id_at("/key")
                    .metadata("key", "/key")
                    .child(Arc::clone(&envs)),
            )
        };
        let walker = ResourceWalker::new(transport.clone(), &AnalyzerConfig::default());

        let outcome = walker
            .walk(&[root("a", "/a"), root("b", "/b")], &PermissionSet::new())
            .await;

        assert!(outcome.is_complete());
        assert_eq!(
            sorted_names(&outcome.resources),
            vec!["project/web", "project/web/environment/prod"]
        );
        assert_eq!(transport.call_count(), 3);
    }

    #[tokio::test]
    async fn test_huge_timeout_and_backoff_do_not_overflow() {
        let transport = ScriptedTransport::new()
            .on("GET", "/apps", 429, "")
            .on_json("GET", "/repos", 200, json!({"items": [{"id": "r1"}]}));
        let config = AnalyzerConfig {
            timeout_secs: u64::MAX,
            ..AnalyzerConfig::default()
        };
        let walker = ResourceWalker::new(Arc::new(transport), &config)
            .with_rate_limit_backoff(Duration::MAX);

        let empty = walker.walk(&[], &PermissionSet::new()).await;
        assert!(empty.resources.is_empty());
        assert!(deadline_after(Duration::MAX) > Instant::now());

        let walker = walker.with_timeout(Duration::from_millis(200));
        let outcome = walker
            .walk(&[flat("apps", "/apps"), flat("repos", "/repos")], &PermissionSet::new())
            .await;
        assert!(outcome.is_complete());
        assert_eq!(sorted_names(&outcome.resources), vec!["repos/r1"]);
    }

    #[test]
    fn test_schema_depth() {
        assert_eq!(schema_depth(&[projects()]), 3);
        assert_eq!(schema_depth(&[flat("a", "/a")]), 1);
        assert_eq!(schema_depth(&[]), 0);
    }
}
