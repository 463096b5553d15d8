// src/lib.rs
pub mod collaborators;
pub mod config;
pub mod connectors;
pub mod error;
pub mod federated;
pub mod llm;
pub mod quality;
pub mod refinement;
pub mod service;
pub mod utils;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use crate::config::ScoutConfig;
use crate::error::{BackendError, ConfigurationError};
pub use crate::federated::{Document, DocumentSet, SourceType, TopicCategory};
pub use crate::service::{SearchRequest, SearchResult, SearchService};

/// One provider item exactly as the backend returned it.
pub type RawResult = serde_json::Value;

#[async_trait]
pub trait BackendAdapter: Send + Sync {
    /// Unique backend name, also the registry key.
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    fn category(&self) -> SourceType;

    fn requires_api_key(&self) -> bool {
        false
    }

    /// Whether the backend can be called at all (e.g. credentials present).
    /// Fixed for the lifetime of the adapter.
    fn is_available(&self) -> bool;

    /// One outbound call. Never returns more than `max_results` items.
    async fn fetch(
        &self,
        query: &str,
        max_results: usize,
        days_back: u32,
    ) -> Result<Vec<RawResult>, BackendError>;

    /// Map a raw item onto a [`Document`]. The shared field mapping covers
    /// every bundled backend; override for exotic reply shapes.
    fn normalize(&self, raw: &RawResult) -> Option<Document> {
        connectors::normalize_document(self.name(), self.category(), raw)
    }

    fn info(&self) -> CollectorInfo {
        CollectorInfo {
            name: self.name().to_string(),
            category: self.category(),
            is_available: self.is_available(),
            api_key_required: self.requires_api_key(),
            has_api_key: self.requires_api_key() && self.is_available(),
            description: self.description().to_string(),
        }
    }
}

/// Read-only metadata about a registered backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectorInfo {
    pub name: String,
    pub category: SourceType,
    pub is_available: bool,
    pub api_key_required: bool,
    pub has_api_key: bool,
    pub description: String,
}

/// Why a requested backend was left out of a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Registered but missing credentials or otherwise not callable
    NotConfigured,
    /// No backend of that name is registered
    UnknownBackend,
    /// Registered, but not of the requested source type
    SourceTypeMismatch,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::NotConfigured => "not configured",
            SkipReason::UnknownBackend => "unknown backend",
            SkipReason::SourceTypeMismatch => "source type mismatch",
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A backend that was not called, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedBackend {
    pub backend: String,
    pub reason: SkipReason,
}

impl SkippedBackend {
    pub fn new(backend: impl Into<String>, reason: SkipReason) -> Self {
        Self {
            backend: backend.into(),
            reason,
        }
    }
}

impl std::fmt::Display for SkippedBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.backend, self.reason)
    }
}

/// Outcome of [`BackendRegistry::select`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendSelection {
    pub usable: Vec<String>,
    pub skipped: Vec<SkippedBackend>,
}

impl BackendSelection {
    pub fn skipped_names(&self) -> Vec<&str> {
        self.skipped.iter().map(|s| s.backend.as_str()).collect()
    }
}

/// The set of configured backends, in priority order.
///
/// Built once at startup and passed by reference; never mutated while a
/// search is running.
#[derive(Default, Clone)]
pub struct BackendRegistry {
    adapters: Vec<Arc<dyn BackendAdapter>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter. A second adapter with the same name replaces
    /// the first but keeps its priority slot.
    pub fn register(&mut self, adapter: Arc<dyn BackendAdapter>) {
        match self
            .adapters
            .iter()
            .position(|a| a.name() == adapter.name())
        {
            Some(idx) => self.adapters[idx] = adapter,
            None => self.adapters.push(adapter),
        }
    }

    /// Look up a backend. `semantic_scholar` and `semantic-scholar` are the
    /// same name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn BackendAdapter>> {
        let wanted = canonical_name(name);
        self.adapters
            .iter()
            .find(|a| canonical_name(a.name()) == wanted)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.adapters.iter().map(|a| a.name().to_string()).collect()
    }

    pub fn adapters(&self) -> impl Iterator<Item = &Arc<dyn BackendAdapter>> {
        self.adapters.iter()
    }

    /// Names of backends that can be called right now.
    pub fn available(&self) -> Vec<String> {
        self.adapters
            .iter()
            .filter(|a| a.is_available())
            .map(|a| a.name().to_string())
            .collect()
    }

    /// Available backends of one category, in priority order.
    pub fn by_category(&self, category: SourceType) -> Vec<String> {
        self.adapters
            .iter()
            .filter(|a| a.category() == category && a.is_available())
            .map(|a| a.name().to_string())
            .collect()
    }

    pub fn grouped_by_category(&self) -> BTreeMap<SourceType, Vec<String>> {
        SourceType::ALL
            .iter()
            .map(|cat| (*cat, self.by_category(*cat)))
            .collect()
    }

    /// Split a request into backends that will be called and ones that
    /// are skipped (unknown, unconfigured or of another source type).
    ///
    /// With no explicit list every registered backend is considered and
    /// type mismatches are dropped silently. Usable names keep registry
    /// priority order.
    pub fn select(
        &self,
        requested: Option<&[String]>,
        source_type: Option<SourceType>,
    ) -> BackendSelection {
        let type_ok = |a: &Arc<dyn BackendAdapter>| source_type.map_or(true, |t| a.category() == t);
        let mut selection = BackendSelection::default();

        match requested.filter(|r| !r.is_empty()) {
            None => {
                for adapter in &self.adapters {
                    if !type_ok(adapter) {
                        continue;
                    }
                    if adapter.is_available() {
                        selection.usable.push(adapter.name().to_string());
                    } else {
                        selection
                            .skipped
                            .push(SkippedBackend::new(adapter.name(), SkipReason::NotConfigured));
                    }
                }
            }
            Some(names) => {
                let mut wanted = Vec::new();
                let mut considered = Vec::new();
                for name in names {
                    let key = canonical_name(name);
                    if considered.contains(&key) {
                        continue;
                    }
                    considered.push(key.clone());
                    let reason = match self.get(name) {
                        None => SkipReason::UnknownBackend,
                        Some(a) if !a.is_available() => SkipReason::NotConfigured,
                        Some(a) if !type_ok(a) => SkipReason::SourceTypeMismatch,
                        Some(_) => {
                            wanted.push(key);
                            continue;
                        }
                    };
                    selection.skipped.push(SkippedBackend::new(name.trim(), reason));
                }
                selection.usable = self
                    .adapters
                    .iter()
                    .filter(|a| wanted.contains(&canonical_name(a.name())))
                    .map(|a| a.name().to_string())
                    .collect();
            }
        }
        selection
    }

    pub fn collector_info(&self) -> Vec<CollectorInfo> {
        self.adapters.iter().map(|a| a.info()).collect()
    }

    /// Register every backend compiled into this build, honouring the
    /// config's `enabled_backends` filter and credentials.
    pub fn from_config(config: &ScoutConfig) -> Result<Self, ConfigurationError> {
        #[allow(unused_mut)]
        let mut registry = BackendRegistry::new();
        #[allow(unused_variables)]
        let client = connectors::http_client()?;

        #[cfg(feature = "tavily")]
        registry.register(Arc::new(connectors::tavily_search::TavilySearchBackend::new(
            client.clone(),
            config.credentials.tavily_api_key.clone(),
        )));

        #[cfg(feature = "brave")]
        registry.register(Arc::new(connectors::brave_search::BraveSearchBackend::new(
            client.clone(),
            config.credentials.brave_api_key.clone(),
        )));

        #[cfg(feature = "google")]
        registry.register(Arc::new(connectors::google_search::GoogleSearchBackend::new(
            client.clone(),
            config.credentials.google_api_key.clone(),
            config.credentials.google_cx.clone(),
        )));

        #[cfg(feature = "arxiv")]
        registry.register(Arc::new(connectors::arxiv::ArxivBackend::new(
            client.clone(),
        )));

        #[cfg(feature = "semantic-scholar")]
        registry.register(Arc::new(
            connectors::semantic_scholar::SemanticScholarBackend::new(
                client.clone(),
                config.credentials.semantic_scholar_api_key.clone(),
            ),
        ));

        #[cfg(feature = "newsapi")]
        registry.register(Arc::new(connectors::newsapi::NewsApiBackend::new(
            client.clone(),
            config.credentials.newsapi_key.clone(),
        )));

        #[cfg(feature = "rss")]
        registry.register(Arc::new(connectors::rss::RssBackend::new(
            client.clone(),
            config.rss_feeds.clone(),
        )));

        if !config.enabled_backends.is_empty() {
            for name in &config.enabled_backends {
                if !registry.contains(name) {
                    return Err(ConfigurationError::UnknownBackend(name.clone()));
                }
            }
            registry.adapters.retain(|a| {
                config
                    .enabled_backends
                    .iter()
                    .any(|n| canonical_name(n) == canonical_name(a.name()))
            });
        }

        Ok(registry)
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("backends", &self.names())
            .finish()
    }
}

fn canonical_name(name: &str) -> String {
    name.trim().to_lowercase().replace('_', "-")
}
