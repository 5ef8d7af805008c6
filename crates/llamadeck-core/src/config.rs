use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{LlamaDeckError, Result};

pub const OLLAMA_HOST_VAR: &str = "OLLAMA_HOST";
pub const STREAM_IDLE_TIMEOUT_VAR: &str = "LLAMADECK_STREAM_IDLE_TIMEOUT_SECS";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlamaDeckConfig {
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub defaults: DefaultsConfig,
}

impl LlamaDeckConfig {
    /// Defaults overlaid with `OLLAMA_HOST` and `LLAMADECK_STREAM_IDLE_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(host) = std::env::var(OLLAMA_HOST_VAR) {
            config.ollama.host = normalize_host(&host);
        }

        if let Ok(raw) = std::env::var(STREAM_IDLE_TIMEOUT_VAR) {
            config.ollama.stream_idle_timeout_secs = parse_idle_timeout(&raw)?;
        }

        Ok(config)
    }

    pub fn with_host(mut self, host: &str) -> Self {
        self.ollama.host = normalize_host(host);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    pub host: String,
    pub api_path: String,
    pub connect_timeout_secs: u64,
    /// Bounds the non-streaming calls (tags, delete).
    pub request_timeout_secs: u64,
    /// Maximum silence between two body reads of a streaming call.
    pub stream_idle_timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost:11434".to_string(),
            api_path: "/api".to_string(),
            connect_timeout_secs: 5,
            request_timeout_secs: 30,
            stream_idle_timeout_secs: 300,
        }
    }
}

impl OllamaConfig {
    pub fn base_url(&self) -> String {
        let host = self.host.trim_end_matches('/');
        let path = self.api_path.trim_matches('/');
        match path.is_empty() {
            true => host.to_string(),
            false => format!("{}/{}", host, path),
        }
    }

    pub fn url(&self, endpoint: Endpoint) -> String {
        format!("{}{}", self.base_url(), endpoint.path())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn stream_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_idle_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    /// Capacity of the channel behind every streaming operation.
    pub stream_buffer: usize,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self { stream_buffer: 32 }
    }
}

/// Inference server endpoints, relative to the api base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Pull,
    Delete,
    Create,
    Generate,
    Tags,
}

impl Endpoint {
    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::Pull => "/pull",
            Endpoint::Delete => "/delete",
            Endpoint::Create => "/create",
            Endpoint::Generate => "/generate",
            Endpoint::Tags => "/tags",
        }
    }

    pub fn method(&self) -> &'static str {
        match self {
            Endpoint::Pull | Endpoint::Create | Endpoint::Generate => "POST",
            Endpoint::Delete => "DELETE",
            Endpoint::Tags => "GET",
        }
    }
}

fn parse_idle_timeout(raw: &str) -> Result<u64> {
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(secs),
        _ => Err(LlamaDeckError::Config(format!(
            "{} must be a positive number of seconds, got '{}'",
            STREAM_IDLE_TIMEOUT_VAR, raw
        ))),
    }
}

/// `OLLAMA_HOST` is often given as `host:port` without a scheme.
fn normalize_host(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        return trimmed.to_string();
    }
    format!("http://{}", trimmed)
}
