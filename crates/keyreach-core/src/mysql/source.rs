use super::{Dsn, MysqlSnapshot};
use crate::error::AnalyzerError;
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::debug;

/// Supplies the schema and `SHOW GRANTS` output for the user of a DSN.
#[async_trait]
pub trait GrantSource: Send + Sync {
    async fn snapshot(&self, dsn: &Dsn) -> Result<MysqlSnapshot, AnalyzerError>;
}

/// A snapshot exported to a JSON file.
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl GrantSource for SnapshotFile {
    async fn snapshot(&self, dsn: &Dsn) -> Result<MysqlSnapshot, AnalyzerError> {
        debug!(path = %self.path.display(), %dsn, "reading grant snapshot");
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            AnalyzerError::Source(format!("failed to read {}: {}", self.path.display(), e))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            AnalyzerError::Source(format!("failed to parse {}: {}", self.path.display(), e))
        })
    }
}

/// An in-memory snapshot is its own source.
#[async_trait]
impl GrantSource for MysqlSnapshot {
    async fn snapshot(&self, _dsn: &Dsn) -> Result<MysqlSnapshot, AnalyzerError> {
        Ok(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn dsn() -> Dsn {
        Dsn::parse("mysql://app@localhost").unwrap()
    }

    #[tokio::test]
    async fn test_snapshot_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"databases": [{{"name": "shop", "tables": [{{"name": "orders"}}]}}], "grants": ["GRANT SELECT ON `shop`.* TO `app`@`%`"]}}"#
        )
        .unwrap();

        let snapshot = SnapshotFile::new(file.path()).snapshot(&dsn()).await.unwrap();
        assert_eq!(snapshot.databases[0].name, "shop");
        assert_eq!(snapshot.databases[0].tables[0].bytes, None);
        assert_eq!(snapshot.grants.len(), 1);
    }

    #[tokio::test]
    async fn test_snapshot_file_errors() {
        let missing = SnapshotFile::new("/nonexistent/snapshot.json");
        assert!(matches!(
            missing.snapshot(&dsn()).await,
            Err(AnalyzerError::Source(_))
        ));

        let mut file = NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let err = SnapshotFile::new(file.path()).snapshot(&dsn()).await.unwrap_err();
        assert!(err.to_string().contains("failed to parse"));
    }
}
