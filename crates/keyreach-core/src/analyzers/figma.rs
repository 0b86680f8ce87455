use super::{http_transport, Analysis, Credential, TOKEN};
use crate::aggregate::{aggregate, Grants};
use crate::config::AnalyzerConfig;
use crate::error::AnalyzerError;
use crate::model::{AnalyzerKind, AnalyzerResult, Metadata, ResourceDraft, ResourceGraph};
use crate::permissions::PermissionTable;
use crate::probe::{Expected, ProbeReport, ProbeStatus, ScopeProbe, ScopeProber};
use crate::transport::{Auth, HttpRequest, HttpTransport};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

pub const DEFAULT_BASE_URL: &str = "https://api.figma.com";
const TOKEN_HEADER: &str = "X-Figma-Token";
const PROBE_FILE_KEY: &str = "0";

pub const SCOPES: &[&str] = &[
    "files:read",
    "file_variables:read",
    "file_variables:write",
    "file_comments:write",
    "file_dev_resources:read",
    "file_dev_resources:write",
    "library_analytics:read",
    "webhooks:write",
];

/// Probes in the order they are tried. `/v1/me` goes first since it also
/// identifies the token owner.
pub fn probes() -> Vec<ScopeProbe> {
    let file = |suffix: &str| format!("/v1/files/{}{}", PROBE_FILE_KEY, suffix);
    let candidates = vec![
        ScopeProbe::new("files:read", HttpRequest::get("/v1/me")).revealing_identity(),
        ScopeProbe::new("file_variables:read", HttpRequest::get(file("/variables/local")))
            .granted_on(Expected::status(404)),
        ScopeProbe::new(
            "file_variables:write",
            HttpRequest::post(file("/variables"), json!({})),
        )
        .granted_on(Expected::status(400)),
        ScopeProbe::new(
            "file_comments:write",
            HttpRequest::post(file("/comments"), json!({ "message": "" })),
        )
        .granted_on(Expected::status(400)),
        ScopeProbe::new("file_dev_resources:read", HttpRequest::get(file("/dev_resources")))
            .granted_on(Expected::status(404)),
        ScopeProbe::new(
            "file_dev_resources:write",
            HttpRequest::post("/v1/dev_resources", json!({ "dev_resources": [] })),
        )
        .granted_on(Expected::status(400)),
        ScopeProbe::new(
            "library_analytics:read",
            HttpRequest::get(format!(
                "/v1/analytics/libraries/{}/component/actions?group_by=component",
                PROBE_FILE_KEY
            )),
        )
        .granted_on(Expected::status(404)),
        ScopeProbe::new("webhooks:write", HttpRequest::post("/v2/webhooks", json!({})))
            .granted_on(Expected::status(400)),
    ];
    candidates
        .into_iter()
        .map(|p| p.denied_on(Expected::with_message(403, "Invalid scope")))
        .collect()
}

pub fn permission_table() -> PermissionTable {
    PermissionTable::new()
        .with_type("user", SCOPES)
        .with_type("token", SCOPES)
}

#[derive(Debug, Deserialize)]
struct Me {
    id: String,
    handle: String,
    #[serde(default)]
    email: Option<String>,
}

pub struct FigmaAnalyzer {
    config: AnalyzerConfig,
    transport: Option<Arc<dyn HttpTransport>>,
}

impl FigmaAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self {
            config,
            transport: None,
        }
    }

    /// Use this transport instead of building one from the token.
    pub fn with_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub async fn analyze(&self, credential: &Credential) -> Result<Analysis, AnalyzerError> {
        let token = credential.require(TOKEN)?;
        let base_url = self
            .config
            .endpoints
            .figma
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL);
        let transport = http_transport(
            self.transport.as_ref(),
            base_url,
            Auth::Header {
                name: TOKEN_HEADER.to_string(),
                value: token.to_string(),
            },
            &self.config,
        )?;

        let report = ScopeProber::run(transport.as_ref(), &probes()).await?;
        Ok(Analysis::complete(build_result(&report)?))
    }
}

fn build_result(report: &ProbeReport) -> Result<AnalyzerResult, AnalyzerError> {
    let mut graph = ResourceGraph::new();
    let mut metadata = Metadata::new();

    let owner = match &report.identity {
        Some(identity) => {
            let me: Me = serde_json::from_value(identity.clone()).map_err(|source| {
                AnalyzerError::Decode {
                    endpoint: "/v1/me".to_string(),
                    source,
                }
            })?;
            metadata.insert("handle".to_string(), json!(me.handle));
            let mut draft = ResourceDraft::new(&me.handle, format!("user/{}", me.id), "user")
                .with_metadata("id", me.id.as_str());
            if let Some(email) = &me.email {
                metadata.insert("email".to_string(), json!(email));
                draft = draft.with_metadata("email", email.as_str());
            }
            draft
        }
        None => ResourceDraft::new("personal access token", "token", "token"),
    };
    graph.add_root(owner);

    let unverified = report.with_status(ProbeStatus::Unverified);
    if !unverified.is_empty() {
        metadata.insert("unverified_scopes".to_string(), json!(unverified));
    }
    if let Some(revealed) = &report.revealed_scopes {
        metadata.insert("revealed_scopes".to_string(), json!(revealed));
    }
    metadata.insert("requests_issued".to_string(), json!(report.requests_issued));

    Ok(aggregate(
        AnalyzerKind::Figma,
        &graph,
        &permission_table(),
        &Grants::credential_wide(report.granted()),
        metadata,
    ))
}
