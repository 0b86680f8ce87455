pub mod figma;
pub mod launchdarkly;
pub mod mysql;

pub use figma::FigmaAnalyzer;
pub use launchdarkly::LaunchDarklyAnalyzer;
pub use mysql::MysqlAnalyzer;

use crate::config::AnalyzerConfig;
use crate::error::{AnalyzerError, WalkError};
use crate::model::{AnalyzerKind, AnalyzerResult};
use crate::transport::{Auth, HttpTransport, ReqwestTransport};
use chrono::Utc;
use serde_json::json;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// Credential field holding an API token.
pub const TOKEN: &str = "token";
/// Credential field holding a `mysql://` connection string.
pub const CONNECTION_STRING: &str = "connection_string";

/// Named secret fields as found by a scanner.
#[derive(Clone, Default)]
pub struct Credential {
    fields: BTreeMap<String, String>,
}

impl Credential {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token(token: impl Into<String>) -> Self {
        Self::new().with(TOKEN, token)
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// The named field, or [`AnalyzerError::MissingCredential`] when it is absent or blank.
    pub fn require(&self, name: &str) -> Result<&str, AnalyzerError> {
        self.get(name)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| AnalyzerError::MissingCredential(name.to_string()))
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// A result plus the walk failures that made it partial, if any.
#[derive(Debug)]
pub struct Analysis {
    pub result: AnalyzerResult,
    pub partial_error: Option<WalkError>,
}

impl Analysis {
    pub fn complete(result: AnalyzerResult) -> Self {
        Self {
            result,
            partial_error: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.partial_error.is_none()
    }
}

pub enum Analyzer {
    Figma(FigmaAnalyzer),
    LaunchDarkly(LaunchDarklyAnalyzer),
    Mysql(MysqlAnalyzer),
}

impl Analyzer {
    pub fn kind(&self) -> AnalyzerKind {
        match self {
            Analyzer::Figma(_) => AnalyzerKind::Figma,
            Analyzer::LaunchDarkly(_) => AnalyzerKind::LaunchDarkly,
            Analyzer::Mysql(_) => AnalyzerKind::Mysql,
        }
    }

    pub async fn analyze(&self, credential: &Credential) -> Result<Analysis, AnalyzerError> {
        let kind = self.kind();
        info!(analyzer = %kind, "starting analysis");

        let mut analysis = match self {
            Analyzer::Figma(a) => a.analyze(credential).await,
            Analyzer::LaunchDarkly(a) => a.analyze(credential).await,
            Analyzer::Mysql(a) => a.analyze(credential).await,
        }?;

        analysis
            .result
            .metadata
            .insert("analyzed_at".to_string(), json!(Utc::now().to_rfc3339()));

        match &analysis.partial_error {
            Some(e) => warn!(analyzer = %kind, failed = e.len(), "analysis is partial"),
            None => info!(
                analyzer = %kind,
                bindings = analysis.result.bindings.len(),
                unbounded = analysis.result.unbounded_resources.len(),
                "analysis complete"
            ),
        }
        Ok(analysis)
    }
}

/// The injected transport, or a reqwest one for `base_url` carrying `auth`.
pub(crate) fn http_transport(
    injected: Option<&Arc<dyn HttpTransport>>,
    base_url: &str,
    auth: Auth,
    config: &AnalyzerConfig,
) -> Result<Arc<dyn HttpTransport>, AnalyzerError> {
    match injected {
        Some(transport) => Ok(Arc::clone(transport)),
        None => {
            reqwest::Url::parse(base_url).map_err(|e| {
                AnalyzerError::Config(format!("invalid base URL '{}': {}", base_url, e))
            })?;
            Ok(Arc::new(ReqwestTransport::new(base_url, auth, config)?))
        }
    }
}
