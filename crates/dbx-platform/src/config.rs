//! Workspace connection settings

use std::time::Duration;

use url::Url;
use zeroize::Zeroizing;

use crate::PlatformError;

/// Default per-request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings for one Databricks workspace
#[derive(Clone)]
pub struct DatabricksConfig {
    /// Workspace base URL, always ending in `/`
    pub host: Url,
    /// Personal access token sent as a bearer token
    pub token: Zeroizing<String>,
    /// Timeout applied to every request
    pub request_timeout: Duration,
}

impl DatabricksConfig {
    /// Build and validate settings from a host URL and token
    pub fn new(host: &str, token: impl Into<String>) -> Result<Self, PlatformError> {
        let token = Zeroizing::new(token.into());
        if token.trim().is_empty() {
            return Err(PlatformError::Config("token must not be empty".to_string()));
        }

        let mut host = Url::parse(host.trim())
            .map_err(|e| PlatformError::Config(format!("invalid host {host:?}: {e}")))?;
        if !matches!(host.scheme(), "http" | "https") {
            return Err(PlatformError::Config(format!(
                "host must use http or https, got {}",
                host.scheme()
            )));
        }
        if !host.path().ends_with('/') {
            let path = format!("{}/", host.path());
            host.set_path(&path);
        }

        Ok(Self {
            host,
            token,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    /// Override the per-request timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

impl std::fmt::Debug for DatabricksConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabricksConfig")
            .field("host", &self.host.as_str())
            .field("token", &"<redacted>")
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_trailing_slash() {
        let config = DatabricksConfig::new("https://adb-1.azuredatabricks.net", "dapi123").unwrap();
        assert_eq!(config.host.as_str(), "https://adb-1.azuredatabricks.net/");
        assert_eq!(config.request_timeout, DEFAULT_REQUEST_TIMEOUT);
    }

    #[test]
    fn keeps_path_prefix() {
        let config = DatabricksConfig::new("http://proxy.local/dbx", "t").unwrap();
        assert_eq!(config.host.as_str(), "http://proxy.local/dbx/");
    }

    #[test]
    fn rejects_empty_token_and_bad_host() {
        assert!(matches!(
            DatabricksConfig::new("https://x", "  "),
            Err(PlatformError::Config(_))
        ));
        assert!(matches!(
            DatabricksConfig::new("not a url", "t"),
            Err(PlatformError::Config(_))
        ));
        assert!(matches!(
            DatabricksConfig::new("ftp://x", "t"),
            Err(PlatformError::Config(_))
        ));
    }

    #[test]
    fn debug_redacts_token() {
        let config = DatabricksConfig::new("https://x", "dapi-secret").unwrap();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("dapi-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
