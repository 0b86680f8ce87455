use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Analyzer configuration loaded from `keyreach.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Deadline for one whole analysis, in seconds
    pub timeout_secs: u64,

    /// Timeout for a single HTTP request, in seconds
    pub request_timeout_secs: u64,

    /// How long to sleep after an HTTP 429 before treating the call as empty
    pub rate_limit_backoff_ms: u64,

    pub user_agent: String,

    /// Base URL overrides for self-hosted or mocked vendor APIs
    pub endpoints: EndpointOverrides,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndpointOverrides {
    pub figma: Option<String>,
    pub launchdarkly: Option<String>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            request_timeout_secs: 15,
            rate_limit_backoff_ms: 1000,
            user_agent: format!("keyreach/{}", env!("CARGO_PKG_VERSION")),
            endpoints: EndpointOverrides::default(),
        }
    }
}

impl AnalyzerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn rate_limit_backoff(&self) -> Duration {
        Duration::from_millis(self.rate_limit_backoff_ms)
    }
}

/// Load analyzer configuration from a TOML file.
pub fn load_config(path: &Path) -> anyhow::Result<AnalyzerConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e))?;
    let config: AnalyzerConfig = toml::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Failed to parse config file '{}': {}", path.display(), e))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AnalyzerConfig::default();
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.rate_limit_backoff(), Duration::from_millis(1000));
        assert!(config.user_agent.starts_with("keyreach/"));
        assert!(config.endpoints.figma.is_none());
    }

    #[test]
    fn test_load_partial_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
timeout_secs = 5
rate_limit_backoff_ms = 10

[endpoints]
launchdarkly = "http://localhost:8080"
"#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.timeout_secs, 5);
        assert_eq!(config.rate_limit_backoff_ms, 10);
        assert_eq!(config.request_timeout_secs, 15);
        assert_eq!(
            config.endpoints.launchdarkly.as_deref(),
            Some("http://localhost:8080")
        );
    }

    #[test]
    fn test_load_invalid_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "timeout_secs = \"soon\"").unwrap();

        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_config(Path::new("/nonexistent/keyreach.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
