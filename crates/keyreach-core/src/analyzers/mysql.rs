use super::{Analysis, Credential, CONNECTION_STRING};
use crate::error::AnalyzerError;
use crate::model::Metadata;
use crate::mysql::{process_grants, Dsn, GrantSource, UserPrivileges};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

/// MySQL connection strings, analyzed from the user's `SHOW GRANTS` output.
pub struct MysqlAnalyzer {
    source: Arc<dyn GrantSource>,
}

impl MysqlAnalyzer {
    pub fn new(source: Arc<dyn GrantSource>) -> Self {
        Self { source }
    }

    pub async fn analyze(&self, credential: &Credential) -> Result<Analysis, AnalyzerError> {
        let dsn = Dsn::parse(credential.require(CONNECTION_STRING)?)?;
        let snapshot = self.source.snapshot(&dsn).await?;
        debug!(
            %dsn,
            databases = snapshot.databases.len(),
            grants = snapshot.grants.len(),
            "loaded grant snapshot"
        );

        let mut privileges = UserPrivileges::from_snapshot(&snapshot);
        let errors = process_grants(&snapshot.grants, &mut privileges);
        if !errors.is_empty() {
            warn!(failed = errors.len(), "some grant statements were skipped");
        }

        let mut metadata = Metadata::new();
        metadata.insert("user".to_string(), json!(dsn.user));
        metadata.insert("host".to_string(), json!(dsn.address()));
        if let Some(database) = &dsn.database {
            metadata.insert("database".to_string(), json!(database));
        }
        metadata.insert(
            "grant_errors".to_string(),
            json!(errors.iter().map(ToString::to_string).collect::<Vec<_>>()),
        );

        Ok(Analysis::complete(privileges.to_result(&dsn, metadata)))
    }
}
