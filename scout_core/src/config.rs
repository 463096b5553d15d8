//! File-backed configuration with environment overrides.
//!
//! The config lives at `~/.config/scout/config.toml` (Unix) or
//! `%APPDATA%/scout/config.toml` (Windows). A missing file means defaults;
//! every field is optional in the TOML.

use crate::error::ConfigurationError;
use crate::federated::{ExecutionOptions, RetryPolicy, DEFAULT_SIMILARITY_THRESHOLD};
use crate::llm::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use crate::quality::QualityConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}
fn default_initial_delay_ms() -> u64 {
    1000
}
fn default_backoff_factor() -> f64 {
    2.0
}
fn default_max_delay_ms() -> u64 {
    10_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            backoff_factor: default_backoff_factor(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(cfg: &RetryConfig) -> Self {
        RetryPolicy {
            max_retries: cfg.max_retries,
            initial_delay: Duration::from_millis(cfg.initial_delay_ms),
            backoff_factor: cfg.backoff_factor,
            max_delay: Duration::from_millis(cfg.max_delay_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DedupConfig {
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
}

fn default_similarity_threshold() -> f64 {
    DEFAULT_SIMILARITY_THRESHOLD
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
        }
    }
}

/// API keys. Never printed unredacted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tavily_api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brave_api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google_api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google_cx: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub newsapi_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_scholar_api_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

fn default_llm_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}
fn default_llm_model() -> String {
    DEFAULT_MODEL.to_string()
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            api_key: None,
        }
    }
}

impl LlmConfig {
    /// A key is set, or the base URL points somewhere other than the
    /// hosted default (e.g. a local server that needs no key).
    pub fn is_configured(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
            || self.base_url.trim_end_matches('/') != DEFAULT_BASE_URL
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoutConfig {
    #[serde(default = "default_max_results_per_query")]
    pub max_results_per_query: usize,
    #[serde(default = "default_days_back")]
    pub default_days_back: u32,
    #[serde(default = "default_max_days_back")]
    pub max_days_back: u32,
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_batch_deadline_secs")]
    pub batch_deadline_secs: u64,
    /// Backends to register; empty means every compiled-in backend
    #[serde(default)]
    pub enabled_backends: Vec<String>,
    #[serde(default)]
    pub rss_feeds: Vec<String>,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub dedup: DedupConfig,
    #[serde(default)]
    pub quality: QualityConfig,
    #[serde(default)]
    pub credentials: Credentials,
    #[serde(default)]
    pub llm: LlmConfig,
}

fn default_max_results_per_query() -> usize {
    5
}
fn default_days_back() -> u32 {
    7
}
fn default_max_days_back() -> u32 {
    365
}
fn default_max_workers() -> usize {
    6
}
fn default_max_iterations() -> u32 {
    5
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_batch_deadline_secs() -> u64 {
    120
}

impl Default for ScoutConfig {
    fn default() -> Self {
        Self {
            max_results_per_query: default_max_results_per_query(),
            default_days_back: default_days_back(),
            max_days_back: default_max_days_back(),
            max_workers: default_max_workers(),
            max_iterations: default_max_iterations(),
            request_timeout_secs: default_request_timeout_secs(),
            batch_deadline_secs: default_batch_deadline_secs(),
            enabled_backends: Vec::new(),
            rss_feeds: Vec::new(),
            retry: RetryConfig::default(),
            dedup: DedupConfig::default(),
            quality: QualityConfig::default(),
            credentials: Credentials::default(),
            llm: LlmConfig::default(),
        }
    }
}

const REDACTED: &str = "********";

impl ScoutConfig {
    /// `~/.config/scout/config.toml`, falling back to `~/.config` and then
    /// the working directory when the platform has no config dir.
    pub fn default_path() -> PathBuf {
        let base = dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|p| p.join(".config")))
            .unwrap_or_else(|| PathBuf::from("."));
        base.join("scout").join("config.toml")
    }

    /// Load from `path` (or the default location), apply environment
    /// overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigurationError> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(Self::default_path);
        let mut config = Self::load_from(&path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Read a TOML file without overrides. A missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigurationError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_toml_str(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no config file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigurationError> {
        toml::from_str(content).map_err(|e| ConfigurationError::Parse(e.to_string()))
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigurationError> {
        toml::to_string_pretty(self).map_err(|e| ConfigurationError::Serialize(e.to_string()))
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigurationError> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(path, self.to_toml_string()?)?;

        // Set restrictive permissions on Unix (owner read/write only)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup. Empty values are ignored, as
    /// are numeric values that fail to parse.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let creds = &mut self.credentials;

        if let Some(v) = get("TAVILY_API_KEY") {
            creds.tavily_api_key = Some(v);
        }
        if let Some(v) = get("BRAVE_SEARCH_API_KEY") {
            creds.brave_api_key = Some(v);
        }
        if let Some(v) = get("GOOGLE_SEARCH_API_KEY") {
            creds.google_api_key = Some(v);
        }
        if let Some(v) = get("GOOGLE_SEARCH_CX") {
            creds.google_cx = Some(v);
        }
        if let Some(v) = get("NEWSAPI_KEY") {
            creds.newsapi_key = Some(v);
        }
        if let Some(v) = get("SEMANTIC_SCHOLAR_API_KEY") {
            creds.semantic_scholar_api_key = Some(v);
        }
        if let Some(v) = get("OPENAI_API_KEY") {
            self.llm.api_key = Some(v);
        }
        if let Some(n) = get("SEARCH_MAX_RESULTS_PER_QUERY").and_then(|v| v.trim().parse().ok()) {
            self.max_results_per_query = n;
        }
        if let Some(n) = get("SEARCH_MAX_WORKERS").and_then(|v| v.trim().parse().ok()) {
            self.max_workers = n;
        }
        if let Some(n) = get("SEARCH_REQUEST_TIMEOUT").and_then(|v| v.trim().parse().ok()) {
            self.request_timeout_secs = n;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let invalid = |msg: String| Err(ConfigurationError::Invalid(msg));
        for (name, value) in [
            ("max_results_per_query", self.max_results_per_query as u64),
            ("default_days_back", self.default_days_back as u64),
            ("max_days_back", self.max_days_back as u64),
            ("max_workers", self.max_workers as u64),
            ("max_iterations", self.max_iterations as u64),
            ("request_timeout_secs", self.request_timeout_secs),
            ("batch_deadline_secs", self.batch_deadline_secs),
        ] {
            if value == 0 {
                return invalid(format!("{} must be greater than 0", name));
            }
        }
        if self.default_days_back > self.max_days_back {
            return invalid(format!(
                "default_days_back ({}) exceeds max_days_back ({})",
                self.default_days_back, self.max_days_back
            ));
        }
        if !(1.0..=10.0).contains(&self.retry.backoff_factor) {
            return invalid("retry.backoff_factor must be within [1, 10]".into());
        }
        if !(0.0..=1.0).contains(&self.dedup.similarity_threshold) {
            return invalid("dedup.similarity_threshold must be within [0, 1]".into());
        }
        self.quality.validate().map_err(ConfigurationError::Invalid)
    }

    /// Copy with every secret masked, for display.
    pub fn redacted(&self) -> Self {
        let mask = |v: &Option<String>| v.as_ref().map(|_| REDACTED.to_string());
        let mut out = self.clone();
        let c = &self.credentials;
        out.credentials = Credentials {
            tavily_api_key: mask(&c.tavily_api_key),
            brave_api_key: mask(&c.brave_api_key),
            google_api_key: mask(&c.google_api_key),
            google_cx: c.google_cx.clone(),
            newsapi_key: mask(&c.newsapi_key),
            semantic_scholar_api_key: mask(&c.semantic_scholar_api_key),
        };
        out.llm.api_key = mask(&self.llm.api_key);
        out
    }

    pub fn execution_options(&self) -> ExecutionOptions {
        ExecutionOptions {
            task_timeout: Duration::from_secs(self.request_timeout_secs),
            batch_deadline: Some(Duration::from_secs(self.batch_deadline_secs)),
            retry: RetryPolicy::from(&self.retry),
        }
    }

    /// Clamp a requested window to `[1, max_days_back]`.
    pub fn clamp_days(&self, days_back: u32) -> u32 {
        days_back.clamp(1, self.max_days_back.max(1))
    }
}
