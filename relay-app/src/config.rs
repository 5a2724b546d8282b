//! Prompt relay configuration loader.
//!
//! Order: TOML file (optional) -> environment overrides -> validation.

use anyhow::Result;
use relay_llm::{
    ANTHROPIC_MESSAGES_URL, ANTHROPIC_VERSION, AnthropicSettings, DEFAULT_MAX_TOKENS,
    DEFAULT_MODEL,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "prompt-relay.toml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Path the relay handler is mounted on, in addition to the serverless-style alias.
    #[serde(default = "default_relay_path")]
    pub relay_path: String,
    /// Larger relay bodies get a JSON 413.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8888".to_string()
}

fn default_relay_path() -> String {
    "/api/analyze".to_string()
}

fn default_max_body_bytes() -> usize {
    2 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            relay_path: default_relay_path(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

#[derive(Clone, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_messages_url")]
    pub messages_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_anthropic_version")]
    pub anthropic_version: String,
    /// Unset means no client-side timeout on the upstream call.
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    /// Prefer `ANTHROPIC_API_KEY`; this is only a fallback for local setups.
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_messages_url() -> String {
    ANTHROPIC_MESSAGES_URL.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

fn default_anthropic_version() -> String {
    ANTHROPIC_VERSION.to_string()
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            messages_url: default_messages_url(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            anthropic_version: default_anthropic_version(),
            timeout_seconds: None,
            api_key: None,
        }
    }
}

// Hand-written so the credential never reaches a log line.
impl std::fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("messages_url", &self.messages_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("anthropic_version", &self.anthropic_version)
            .field("timeout_seconds", &self.timeout_seconds)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl RelayConfig {
    /// Loads config from `path`, or from `./prompt-relay.toml` when present.
    ///
    /// An explicit path must exist; a missing default file falls back to built-in defaults.
    pub async fn load_with_path(path: Option<PathBuf>) -> Result<(Self, Option<PathBuf>)> {
        let (mut cfg, loaded_from) = match path {
            Some(path) => (Self::read_file(&path).await?, Some(path)),
            None => {
                let path = default_config_path();
                if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                    (Self::read_file(&path).await?, Some(path))
                } else {
                    (Self::default(), None)
                }
            }
        };

        cfg.apply_env_overrides_from(|key| std::env::var(key).ok());
        cfg.validate()?;
        Ok((cfg, loaded_from))
    }

    async fn read_file(path: &Path) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| anyhow::anyhow!("read config {}: {e}", path.display()))?;
        toml::from_str(&contents).map_err(|e| anyhow::anyhow!("parse config {}: {e}", path.display()))
    }

    pub fn apply_env_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = non_empty("ANTHROPIC_API_KEY") {
            self.upstream.api_key = Some(v);
        }
        if let Some(v) = non_empty("PROMPT_RELAY_BIND_ADDR") {
            self.server.bind_addr = v;
        }
        if let Some(v) = non_empty("PROMPT_RELAY_MODEL") {
            self.upstream.model = v;
        }
        if let Some(v) = non_empty("PROMPT_RELAY_UPSTREAM_URL") {
            self.upstream.messages_url = v;
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.bind_addr()?;
        if !self.server.relay_path.starts_with('/') {
            return Err(anyhow::anyhow!(
                "server.relay_path must start with '/': {:?}",
                self.server.relay_path
            ));
        }
        if self.server.relay_path == "/healthz" {
            return Err(anyhow::anyhow!("server.relay_path must not shadow /healthz"));
        }
        if self.server.max_body_bytes == 0 {
            return Err(anyhow::anyhow!("server.max_body_bytes must be > 0"));
        }
        if self.upstream.model.trim().is_empty() {
            return Err(anyhow::anyhow!("upstream.model is required"));
        }
        if self.upstream.max_tokens == 0 {
            return Err(anyhow::anyhow!("upstream.max_tokens must be > 0"));
        }
        if self.upstream.anthropic_version.trim().is_empty() {
            return Err(anyhow::anyhow!("upstream.anthropic_version is required"));
        }
        let url = self.upstream.messages_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(anyhow::anyhow!(
                "upstream.messages_url must be an http(s) url: {url:?}"
            ));
        }
        if self.upstream.timeout_seconds == Some(0) {
            return Err(anyhow::anyhow!("upstream.timeout_seconds must be > 0 when set"));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.server
            .bind_addr
            .trim()
            .parse::<SocketAddr>()
            .map_err(|e| anyhow::anyhow!("invalid server.bind_addr {:?}: {e}", self.server.bind_addr))
    }

    /// The credential, if one is configured. Blank values count as missing.
    pub fn api_key(&self) -> Option<String> {
        self.upstream
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
    }

    pub fn upstream_timeout(&self) -> Option<Duration> {
        self.upstream.timeout_seconds.map(Duration::from_secs)
    }

    pub fn anthropic_settings(&self) -> AnthropicSettings {
        AnthropicSettings {
            messages_url: self.upstream.messages_url.trim().to_string(),
            model: self.upstream.model.trim().to_string(),
            max_tokens: self.upstream.max_tokens,
            anthropic_version: self.upstream.anthropic_version.trim().to_string(),
        }
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from(DEFAULT_CONFIG_FILE)
}

#[cfg(test)]
mod tests {
    use super::RelayConfig;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn defaults_match_upstream_contract() {
        let cfg = RelayConfig::default();
        cfg.validate().expect("defaults validate");
        assert_eq!(cfg.server.relay_path, "/api/analyze");
        assert_eq!(cfg.server.max_body_bytes, 2 * 1024 * 1024);
        assert_eq!(cfg.upstream.messages_url, "https://api.anthropic.com/v1/messages");
        assert_eq!(cfg.upstream.model, "claude-sonnet-4-20250514");
        assert_eq!(cfg.upstream.max_tokens, 2000);
        assert_eq!(cfg.upstream.anthropic_version, "2023-06-01");
        assert!(cfg.upstream_timeout().is_none());
        assert!(cfg.api_key().is_none());
    }

    #[test]
    fn partial_toml_keeps_defaults_for_missing_fields() {
        let cfg: RelayConfig = toml::from_str(
            r#"
            [server]
            bind_addr = "127.0.0.1:9000"

            [upstream]
            timeout_seconds = 30
            "#,
        )
        .expect("parse");
        cfg.validate().expect("validate");
        assert_eq!(cfg.bind_addr().expect("addr").port(), 9000);
        assert_eq!(cfg.server.relay_path, "/api/analyze");
        assert_eq!(cfg.upstream.model, "claude-sonnet-4-20250514");
        assert_eq!(cfg.upstream_timeout().map(|d| d.as_secs()), Some(30));
    }

    #[test]
    fn env_overrides_win_and_blank_values_are_ignored() {
        let mut cfg: RelayConfig = toml::from_str(
            r#"
            [upstream]
            api_key = "from-file"
            model = "claude-file-model"
            "#,
        )
        .expect("parse");
        cfg.apply_env_overrides_from(lookup(&[
            ("ANTHROPIC_API_KEY", "from-env"),
            ("PROMPT_RELAY_MODEL", "   "),
            ("PROMPT_RELAY_UPSTREAM_URL", "http://127.0.0.1:4000/v1/messages"),
        ]));
        assert_eq!(cfg.api_key().as_deref(), Some("from-env"));
        assert_eq!(cfg.upstream.model, "claude-file-model");
        assert_eq!(
            cfg.anthropic_settings().messages_url,
            "http://127.0.0.1:4000/v1/messages"
        );
    }

    #[test]
    fn blank_api_key_counts_as_missing() {
        let mut cfg = RelayConfig::default();
        cfg.upstream.api_key = Some("  ".to_string());
        assert!(cfg.api_key().is_none());
    }

    #[test]
    fn debug_output_redacts_api_key() {
        let mut cfg = RelayConfig::default();
        cfg.upstream.api_key = Some("sk-ant-secret".to_string());
        let rendered = format!("{cfg:?}");
        assert!(!rendered.contains("sk-ant-secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut cfg = RelayConfig::default();
        cfg.server.relay_path = "api/analyze".to_string();
        assert!(cfg.validate().is_err());

        let mut cfg = RelayConfig::default();
        cfg.upstream.max_tokens = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = RelayConfig::default();
        cfg.server.max_body_bytes = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = RelayConfig::default();
        cfg.upstream.messages_url = "ftp://api.example.com".to_string();
        assert!(cfg.validate().is_err());

        let mut cfg = RelayConfig::default();
        cfg.server.bind_addr = "not-an-addr".to_string();
        assert!(cfg.validate().is_err());

        let mut cfg = RelayConfig::default();
        cfg.upstream.timeout_seconds = Some(0);
        assert!(cfg.validate().is_err());
    }

    #[tokio::test]
    async fn explicit_missing_config_file_is_an_error() {
        let path = std::env::temp_dir().join("prompt-relay-does-not-exist.toml");
        let err = RelayConfig::load_with_path(Some(path))
            .await
            .expect_err("missing explicit file must fail");
        assert!(err.to_string().contains("read config"));
    }
}
