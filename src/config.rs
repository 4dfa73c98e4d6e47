use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Upstream Are.na API settings.
#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Legacy v2 host, used only for the search fallback.
    #[serde(default = "default_v2_base_url")]
    pub v2_base_url: String,
    /// Personal access token. Falls back to `ARENA_API_TOKEN` when unset.
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,
    #[serde(default = "default_page_size")]
    pub default_page_size: u32,
    /// When true, a 403 from v3 search retries against the legacy v2 endpoint.
    #[serde(default = "default_true")]
    pub enable_v2_fallback: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            v2_base_url: default_v2_base_url(),
            access_token: None,
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            max_concurrent_requests: default_max_concurrent_requests(),
            default_page_size: default_page_size(),
            enable_v2_fallback: true,
        }
    }
}

fn default_base_url() -> String {
    "https://api.are.na/v3".to_string()
}
fn default_v2_base_url() -> String {
    "https://api.are.na/v2".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}
fn default_backoff_base_ms() -> u64 {
    500
}
fn default_max_concurrent_requests() -> usize {
    5
}
fn default_page_size() -> u32 {
    24
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Optional bearer key required on every HTTP request when set.
    #[serde(default)]
    pub auth_key: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            auth_key: None,
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7431".to_string()
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// The token actually sent upstream, from config or environment.
    pub fn token(&self) -> Option<String> {
        self.access_token
            .clone()
            .or_else(|| std::env::var("ARENA_API_TOKEN").ok())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.api.timeout_secs == 0 {
        anyhow::bail!("api.timeout_secs must be > 0");
    }

    if config.api.backoff_base_ms == 0 {
        anyhow::bail!("api.backoff_base_ms must be > 0");
    }

    if config.api.max_concurrent_requests == 0 {
        anyhow::bail!("api.max_concurrent_requests must be >= 1");
    }

    // Upstream rejects page sizes outside this window; clamp rather than fail.
    config.api.default_page_size = config.api.default_page_size.clamp(1, 100);

    if config.api.base_url.ends_with('/') {
        config.api.base_url.truncate(config.api.base_url.len() - 1);
    }
    if config.api.v2_base_url.ends_with('/') {
        let len = config.api.v2_base_url.len() - 1;
        config.api.v2_base_url.truncate(len);
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn defaults_apply_for_empty_config() {
        let f = write_config("");
        let config = load_config(f.path()).unwrap();
        assert_eq!(config.api.base_url, "https://api.are.na/v3");
        assert_eq!(config.api.max_concurrent_requests, 5);
        assert_eq!(config.api.default_page_size, 24);
        assert!(config.api.enable_v2_fallback);
        assert_eq!(config.server.bind, "127.0.0.1:7431");
    }

    #[test]
    fn page_size_is_clamped() {
        let f = write_config("[api]\ndefault_page_size = 500\n");
        let config = load_config(f.path()).unwrap();
        assert_eq!(config.api.default_page_size, 100);

        let f = write_config("[api]\ndefault_page_size = 0\n");
        let config = load_config(f.path()).unwrap();
        assert_eq!(config.api.default_page_size, 1);
    }

    #[test]
    fn trailing_slash_stripped_from_base_urls() {
        let f = write_config("[api]\nbase_url = \"https://api.example.com/v3/\"\n");
        let config = load_config(f.path()).unwrap();
        assert_eq!(config.api.base_url, "https://api.example.com/v3");
    }

    #[test]
    fn zero_concurrency_rejected() {
        let f = write_config("[api]\nmax_concurrent_requests = 0\n");
        assert!(load_config(f.path()).is_err());
    }
}
