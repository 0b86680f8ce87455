use super::{http_transport, Analysis, Credential, TOKEN};
use crate::aggregate::{aggregate, Grants};
use crate::config::AnalyzerConfig;
use crate::error::AnalyzerError;
use crate::model::{AnalyzerKind, Metadata};
use crate::permissions::{PermissionSet, PermissionTable};
use crate::transport::{Auth, HttpRequest, HttpTransport};
use crate::walker::{JsonCollection, ResourceCollection, ResourceWalker};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "https://app.launchdarkly.com";

/// Resource type and its read / write permission pair.
const RESOURCE_TYPES: &[(&str, &str, &str)] = &[
    ("member", "member:read", "member:write"),
    ("application", "application:read", "application:write"),
    ("code_reference_repository", "code_reference:read", "code_reference:write"),
    ("project", "project:read", "project:write"),
    ("environment", "environment:read", "environment:write"),
    ("experiment", "experiment:read", "experiment:write"),
    ("holdout", "holdout:read", "holdout:write"),
];

/// Write implies read on every resource type.
pub fn permission_table() -> PermissionTable {
    RESOURCE_TYPES
        .iter()
        .fold(PermissionTable::new(), |table, (ty, read, write)| {
            table
                .with_type(ty, &[*read, *write])
                .with_implication(read, write)
        })
}

/// Permissions carried by a built-in token role.
pub fn role_permissions(role: &str) -> PermissionSet {
    match role {
        "admin" | "owner" => PermissionSet::full_access(),
        "writer" => RESOURCE_TYPES
            .iter()
            .flat_map(|(_, read, write)| [*read, *write])
            .collect(),
        "reader" => RESOURCE_TYPES.iter().map(|(_, read, _)| *read).collect(),
        "no_access" => PermissionSet::new(),
        other => {
            warn!(role = %other, "unknown token role, assuming read-only");
            RESOURCE_TYPES.iter().map(|(_, read, _)| *read).collect()
        }
    }
}

/// The collection tree walked for every token.
pub fn collections() -> Vec<Arc<dyn ResourceCollection>> {
    let experiments = JsonCollection::new(
        "experiments",
        "experiment",
        "/api/v2/projects/{parent.parent.key}/environments/{parent.key}/experiments",
    )
    .items_at("/items")
    .id_at("/key")
    .name_at("/name")
    .metadata("key", "/key")
    .requires("experiment:read");

    let holdouts = JsonCollection::new(
        "holdouts",
        "holdout",
        "/api/v2/projects/{parent.parent.key}/environments/{parent.key}/holdouts",
    )
    .items_at("/items")
    .id_at("/key")
    .name_at("/name")
    .metadata("key", "/key")
    .requires("holdout:read");

    let environments = JsonCollection::new(
        "environments",
        "environment",
        "/api/v2/projects/{parent.key}/environments",
    )
    .items_at("/items")
    .id_at("/key")
    .name_at("/name")
    .metadata("key", "/key")
    .metadata("id", "/_id")
    .metadata("critical", "/critical")
    .requires("environment:read")
    .child(Arc::new(experiments))
    .child(Arc::new(holdouts));

    let projects = JsonCollection::new("projects", "project", "/api/v2/projects")
        .items_at("/items")
        .id_at("/key")
        .name_at("/name")
        .metadata("key", "/key")
        .metadata("id", "/_id")
        .requires("project:read")
        .child(Arc::new(environments));

    let members = JsonCollection::new("members", "member", "/api/v2/members")
        .items_at("/items")
        .id_at("/_id")
        .name_at("/email")
        .metadata("role", "/role")
        .requires("member:read");

    let applications = JsonCollection::new("applications", "application", "/api/v2/applications")
        .items_at("/items")
        .id_at("/key")
        .name_at("/name")
        .metadata("kind", "/kind")
        .requires("application:read");

    let repositories = JsonCollection::new(
        "code reference repositories",
        "code_reference_repository",
        "/api/v2/code-refs/repositories",
    )
    .items_at("/items")
    .id_at("/name")
    .metadata("type", "/type")
    .metadata("default_branch", "/defaultBranch")
    .requires("code_reference:read");

    vec![
        Arc::new(members),
        Arc::new(applications),
        Arc::new(repositories),
        Arc::new(projects),
    ]
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CallerIdentity {
    #[serde(default)]
    account_id: Option<String>,
    #[serde(default)]
    token_id: Option<String>,
    #[serde(default)]
    token_name: Option<String>,
    #[serde(default)]
    member_id: Option<String>,
    #[serde(default)]
    service_token: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Token {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    custom_role_ids: Vec<String>,
}

pub struct LaunchDarklyAnalyzer {
    config: AnalyzerConfig,
    transport: Option<Arc<dyn HttpTransport>>,
}

impl LaunchDarklyAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self {
            config,
            transport: None,
        }
    }

    pub fn with_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub async fn analyze(&self, credential: &Credential) -> Result<Analysis, AnalyzerError> {
        let token = credential.require(TOKEN)?;
        let base_url = self
            .config
            .endpoints
            .launchdarkly
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL);
        let transport = http_transport(
            self.transport.as_ref(),
            base_url,
            Auth::Header {
                name: "Authorization".to_string(),
                value: token.to_string(),
            },
            &self.config,
        )?;

        let identity: CallerIdentity = fetch(transport.as_ref(), "/api/v2/caller-identity").await?;
        let token_details = match &identity.token_id {
            Some(id) => Some(fetch::<Token>(transport.as_ref(), &format!("/api/v2/tokens/{}", id)).await?),
            None => None,
        };
        let role = token_details
            .as_ref()
            .and_then(|t| t.role.clone())
            .unwrap_or_else(|| "reader".to_string());
        let permissions = role_permissions(&role);
        debug!(role = %role, permissions = permissions.len(), "resolved token role");

        let mut metadata = Metadata::new();
        metadata.insert("role".to_string(), json!(role));
        metadata.insert("service_token".to_string(), json!(identity.service_token));
        for (key, value) in [
            ("account_id", &identity.account_id),
            ("token_id", &identity.token_id),
            ("token_name", &identity.token_name),
            ("member_id", &identity.member_id),
        ] {
            if let Some(value) = value {
                metadata.insert(key.to_string(), json!(value));
            }
        }
        if let Some(t) = token_details.as_ref().filter(|t| !t.custom_role_ids.is_empty()) {
            metadata.insert("custom_role_ids".to_string(), json!(t.custom_role_ids));
        }

        let outcome = ResourceWalker::new(transport, &self.config)
            .walk(&collections(), &permissions)
            .await;

        let result = aggregate(
            AnalyzerKind::LaunchDarkly,
            &outcome.resources,
            &permission_table(),
            &Grants::credential_wide(permissions),
            metadata,
        );
        Ok(Analysis {
            result,
            partial_error: outcome.error,
        })
    }
}

async fn fetch<T: serde::de::DeserializeOwned>(
    transport: &dyn HttpTransport,
    path: &str,
) -> Result<T, AnalyzerError> {
    let response = transport.send(HttpRequest::get(path)).await?;
    if response.status == 401 {
        return Err(AnalyzerError::InvalidCredential(
            "LaunchDarkly rejected the token".to_string(),
        ));
    }
    if !response.is_success() {
        return Err(AnalyzerError::UnexpectedStatus {
            endpoint: path.to_string(),
            status: response.status,
        });
    }
    response.json(path)
}
