//! The public search surface: one-shot federated search and iterative
//! research, both configured from a [`ScoutConfig`].

use crate::collaborators::{ContentQualityRater, QueryGenerator};
use crate::config::ScoutConfig;
use crate::error::ConfigurationError;
use crate::federated::{
    Aggregator, BackendFailure, DocumentSet, ExecutionEngine, FailureKind, SearchTask, TaskResult,
};
use crate::llm::ChatCompletionsClient;
use crate::quality::QualityEvaluator;
use crate::refinement::{requested_label, RefinementController, RefinementOptions, RefinementOutcome};
use crate::utils::query_key;
use crate::{BackendRegistry, CollectorInfo, Document, SkippedBackend, SourceType};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

pub const DEFAULT_MAX_RESULTS_PER_QUERY: usize = 5;
pub const DEFAULT_DAYS_BACK: u32 = 7;
pub const DEFAULT_MAX_WORKERS: usize = 6;

fn default_max_results_per_query() -> usize {
    DEFAULT_MAX_RESULTS_PER_QUERY
}
fn default_days_back() -> u32 {
    DEFAULT_DAYS_BACK
}
fn default_max_workers() -> usize {
    DEFAULT_MAX_WORKERS
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub queries: Vec<String>,
    /// Backend names; `None` means every available backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<String>>,
    #[serde(default = "default_max_results_per_query")]
    pub max_results_per_query: usize,
    #[serde(default = "default_days_back")]
    pub days_back: u32,
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_type: Option<SourceType>,
}

impl SearchRequest {
    pub fn new<I, S>(queries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            queries: queries.into_iter().map(Into::into).collect(),
            sources: None,
            max_results_per_query: DEFAULT_MAX_RESULTS_PER_QUERY,
            days_back: DEFAULT_DAYS_BACK,
            max_workers: DEFAULT_MAX_WORKERS,
            source_type: None,
        }
    }

    pub fn with_sources<I, S>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sources = Some(sources.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_max_results(mut self, max_results_per_query: usize) -> Self {
        self.max_results_per_query = max_results_per_query;
        self
    }

    pub fn with_days_back(mut self, days_back: u32) -> Self {
        self.days_back = days_back;
        self
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    pub fn with_source_type(mut self, source_type: SourceType) -> Self {
        self.source_type = Some(source_type);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.distinct_queries().is_empty() {
            return Err(ConfigurationError::InvalidRequest(
                "at least one non-empty query is required".into(),
            ));
        }
        if self.max_results_per_query == 0 {
            return Err(ConfigurationError::InvalidRequest(
                "max_results_per_query must be greater than 0".into(),
            ));
        }
        if self.days_back == 0 {
            return Err(ConfigurationError::InvalidRequest(
                "days_back must be greater than 0".into(),
            ));
        }
        if self.max_workers == 0 {
            return Err(ConfigurationError::InvalidRequest(
                "max_workers must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Trimmed, non-empty queries in order. Repeats that differ only in
    /// case are dropped; the first spelling is kept.
    pub fn distinct_queries(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.queries
            .iter()
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty() && seen.insert(query_key(q)))
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchMetrics {
    pub total_tasks: usize,
    pub successful_tasks: usize,
    pub failed_tasks: usize,
    pub success_rate: f64,
    /// Documents returned by backends before de-duplication
    pub raw_results: usize,
    pub duplicates_removed: usize,
    pub average_task_ms: f64,
}

impl SearchMetrics {
    fn from_results(results: &[TaskResult], kept: usize) -> Self {
        let total_tasks = results.len();
        let successful_tasks = results.iter().filter(|r| r.is_success()).count();
        let raw_results: usize = results
            .iter()
            .filter(|r| r.is_success())
            .map(|r| r.documents.len())
            .sum();
        let total_ms: u64 = results.iter().map(|r| r.duration_ms).sum();
        Self {
            total_tasks,
            successful_tasks,
            failed_tasks: total_tasks - successful_tasks,
            success_rate: ratio(successful_tasks, total_tasks),
            raw_results,
            duplicates_removed: raw_results.saturating_sub(kept),
            average_task_ms: if total_tasks == 0 {
                0.0
            } else {
                total_ms as f64 / total_tasks as f64
            },
        }
    }

    fn combine(&self, other: &SearchMetrics, kept: usize) -> Self {
        let total_tasks = self.total_tasks + other.total_tasks;
        let successful_tasks = self.successful_tasks + other.successful_tasks;
        let raw_results = self.raw_results + other.raw_results;
        let total_ms = self.average_task_ms * self.total_tasks as f64
            + other.average_task_ms * other.total_tasks as f64;
        Self {
            total_tasks,
            successful_tasks,
            failed_tasks: self.failed_tasks + other.failed_tasks,
            success_rate: ratio(successful_tasks, total_tasks),
            raw_results,
            duplicates_removed: raw_results.saturating_sub(kept),
            average_task_ms: if total_tasks == 0 {
                0.0
            } else {
                total_ms / total_tasks as f64
            },
        }
    }
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchMetadata {
    pub failed_backends: Vec<BackendFailure>,
    /// Backends that were not called, with the reason
    pub skipped_backends: Vec<SkippedBackend>,
    pub metrics: SearchMetrics,
    pub deadline_expired: bool,
    #[serde(default)]
    pub fallback_used: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub documents: Vec<Document>,
    pub total_count: usize,
    pub execution_time_ms: u64,
    pub sources_used: Vec<String>,
    pub query_count: usize,
    pub metadata: SearchMetadata,
}

impl SearchResult {
    fn from_set(set: DocumentSet, metadata: SearchMetadata) -> Self {
        let sources_used = set.sources_used().iter().cloned().collect();
        let query_count = set.query_count();
        let execution_time_ms = set.execution_time_ms();
        let documents = set.into_documents();
        Self {
            total_count: documents.len(),
            documents,
            execution_time_ms,
            sources_used,
            query_count,
            metadata,
        }
    }
}

/// One-shot search and iterative research over a backend registry.
pub struct SearchService {
    registry: BackendRegistry,
    config: ScoutConfig,
    generator: Option<Arc<dyn QueryGenerator>>,
    rater: Option<Arc<dyn ContentQualityRater>>,
}

impl SearchService {
    pub fn new(registry: BackendRegistry, config: ScoutConfig) -> Self {
        Self {
            registry,
            config,
            generator: None,
            rater: None,
        }
    }

    /// Registry from the compiled-in backends plus, when the config names
    /// an LLM endpoint, a chat-completions query generator and rater.
    pub fn from_config(config: ScoutConfig) -> Result<Self, ConfigurationError> {
        let registry = BackendRegistry::from_config(&config)?;
        let mut service = Self::new(registry, config);
        if service.config.llm.is_configured() {
            let client = Arc::new(ChatCompletionsClient::from_config(&service.config.llm)?);
            service = service
                .with_query_generator(client.clone())
                .with_rater(client);
        }
        Ok(service)
    }

    pub fn with_query_generator(mut self, generator: Arc<dyn QueryGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn with_rater(mut self, rater: Arc<dyn ContentQualityRater>) -> Self {
        self.rater = Some(rater);
        self
    }

    /// Drop any configured collaborators; research then runs on
    /// templates and the volume heuristic.
    pub fn without_collaborators(mut self) -> Self {
        self.generator = None;
        self.rater = None;
        self
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    pub fn config(&self) -> &ScoutConfig {
        &self.config
    }

    pub fn has_collaborators(&self) -> bool {
        self.generator.is_some() || self.rater.is_some()
    }

    /// A request pre-filled with the configured defaults.
    pub fn request<I, S>(&self, queries: I) -> SearchRequest
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SearchRequest::new(queries)
            .with_max_results(self.config.max_results_per_query)
            .with_days_back(self.config.default_days_back)
            .with_max_workers(self.config.max_workers)
    }

    /// Fan every query out over every usable backend and merge the results.
    ///
    /// Backend failures are reported in the metadata; only a request that
    /// is invalid or leaves no usable backend is an error.
    pub async fn search(&self, request: SearchRequest) -> Result<SearchResult, ConfigurationError> {
        let (set, metadata) = self.run(&request).await?;
        Ok(SearchResult::from_set(set, metadata))
    }

    /// Search only backends of one source type.
    pub async fn search_by_category(
        &self,
        queries: Vec<String>,
        source_type: SourceType,
        max_results_per_query: usize,
        days_back: u32,
    ) -> Result<SearchResult, ConfigurationError> {
        let request = self
            .request(queries)
            .with_source_type(source_type)
            .with_max_results(max_results_per_query)
            .with_days_back(days_back);
        self.search(request).await
    }

    /// Search `preferred` first and add `fallback` when fewer than
    /// `queries × max_results / 2` documents come back.
    pub async fn search_with_fallback(
        &self,
        request: SearchRequest,
        preferred: Vec<String>,
        fallback: Vec<String>,
    ) -> Result<SearchResult, ConfigurationError> {
        request.validate()?;
        let started = Instant::now();
        let target = request.distinct_queries().len() * request.max_results_per_query / 2;

        let primary = SearchRequest {
            sources: Some(preferred),
            ..request.clone()
        };
        let secondary = SearchRequest {
            sources: Some(fallback),
            ..request
        };

        let (first_set, first_meta) = match self.run(&primary).await {
            Ok(outcome) => outcome,
            Err(ConfigurationError::NoBackendsAvailable { .. }) => {
                debug!("no preferred backend usable, going straight to fallback");
                let (set, mut meta) = self.run(&secondary).await?;
                meta.fallback_used = true;
                return Ok(SearchResult::from_set(set, meta));
            }
            Err(e) => return Err(e),
        };

        if first_set.len() >= target {
            return Ok(SearchResult::from_set(first_set, first_meta));
        }
        info!(
            found = first_set.len(),
            target, "preferred backends came up short, trying fallback"
        );

        let (second_set, second_meta) = match self.run(&secondary).await {
            Ok(outcome) => outcome,
            Err(ConfigurationError::NoBackendsAvailable { .. }) => {
                return Ok(SearchResult::from_set(first_set, first_meta));
            }
            Err(e) => return Err(e),
        };

        let aggregator = Aggregator::new(self.config.dedup.similarity_threshold);
        let combined = aggregator
            .union(&first_set, &second_set)
            .with_execution_time_ms(started.elapsed().as_millis() as u64);

        let mut failed_backends = first_meta.failed_backends;
        failed_backends.extend(second_meta.failed_backends);
        let mut skipped_backends = first_meta.skipped_backends;
        for skipped in second_meta.skipped_backends {
            if !skipped_backends.contains(&skipped) {
                skipped_backends.push(skipped);
            }
        }
        let metadata = SearchMetadata {
            failed_backends,
            skipped_backends,
            metrics: first_meta.metrics.combine(&second_meta.metrics, combined.len()),
            deadline_expired: first_meta.deadline_expired || second_meta.deadline_expired,
            fallback_used: true,
        };
        Ok(SearchResult::from_set(combined, metadata))
    }

    pub fn collector_info(&self) -> Vec<CollectorInfo> {
        self.registry.collector_info()
    }

    /// Available backend names grouped by source type.
    pub fn available_sources(&self) -> BTreeMap<SourceType, Vec<String>> {
        self.registry.grouped_by_category()
    }

    /// Research options seeded from the config.
    pub fn research_options(&self) -> RefinementOptions {
        RefinementOptions {
            max_iterations: self.config.max_iterations,
            max_results_per_query: self.config.max_results_per_query,
            days_back: self.config.default_days_back,
            max_workers: self.config.max_workers,
            ..RefinementOptions::default()
        }
    }

    pub fn refinement_controller(&self, options: RefinementOptions) -> RefinementController<'_> {
        let mut evaluator = QualityEvaluator::new(self.config.quality.clone());
        if let Some(rater) = &self.rater {
            evaluator = evaluator.with_rater(Arc::clone(rater));
        }
        let options = RefinementOptions {
            days_back: self.config.clamp_days(options.days_back),
            ..options
        };
        let mut controller = RefinementController::new(&self.registry, evaluator)
            .with_aggregator(Aggregator::new(self.config.dedup.similarity_threshold))
            .with_execution_options(self.config.execution_options())
            .with_options(options);
        if let Some(generator) = &self.generator {
            controller = controller.with_generator(Arc::clone(generator));
        }
        controller
    }

    /// Iteratively search `topic` until the quality gate passes.
    pub async fn research(
        &self,
        topic: &str,
        options: RefinementOptions,
    ) -> Result<RefinementOutcome, ConfigurationError> {
        self.refinement_controller(options).run(topic).await
    }

    async fn run(
        &self,
        request: &SearchRequest,
    ) -> Result<(DocumentSet, SearchMetadata), ConfigurationError> {
        request.validate()?;
        let started = Instant::now();

        let selection = self
            .registry
            .select(request.sources.as_deref(), request.source_type);
        if selection.usable.is_empty() {
            return Err(ConfigurationError::NoBackendsAvailable {
                requested: requested_label(request.sources.as_deref()),
            });
        }

        let days_back = self.config.clamp_days(request.days_back);
        let queries = request.distinct_queries();
        let tasks: Vec<SearchTask> = queries
            .iter()
            .flat_map(|query| {
                selection.usable.iter().map(move |backend| {
                    SearchTask::new(
                        query.clone(),
                        backend.clone(),
                        request.max_results_per_query,
                        days_back,
                    )
                })
            })
            .collect();
        debug!(
            queries = queries.len(),
            backends = selection.usable.len(),
            tasks = tasks.len(),
            "starting search batch"
        );

        let engine = ExecutionEngine::new(&self.registry, self.config.execution_options());
        let results = engine.run_batch(tasks, request.max_workers).await;

        let aggregator = Aggregator::new(self.config.dedup.similarity_threshold);
        let set = aggregator
            .merge(&DocumentSet::empty(), &results)
            .with_execution_time_ms(started.elapsed().as_millis() as u64);

        let failed_backends: Vec<BackendFailure> =
            results.iter().filter_map(|r| r.error.clone()).collect();
        let deadline_expired = failed_backends
            .iter()
            .any(|f| f.kind == FailureKind::Cancelled);
        let metadata = SearchMetadata {
            metrics: SearchMetrics::from_results(&results, set.len()),
            failed_backends,
            skipped_backends: selection.skipped,
            deadline_expired,
            fallback_used: false,
        };
        info!(
            documents = set.len(),
            sources = set.sources_used().len(),
            failed = metadata.metrics.failed_tasks,
            elapsed_ms = set.execution_time_ms(),
            "search finished"
        );
        Ok((set, metadata))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_validation() {
        assert!(SearchRequest::new(["ev"]).validate().is_ok());
        assert!(SearchRequest::new(["  ", ""]).validate().is_err());
        assert!(SearchRequest::new(Vec::<String>::new()).validate().is_err());
        assert!(SearchRequest::new(["ev"]).with_max_results(0).validate().is_err());
        assert!(SearchRequest::new(["ev"]).with_days_back(0).validate().is_err());
        let err = SearchRequest::new(["ev"])
            .with_max_workers(0)
            .validate()
            .unwrap_err();
        assert_eq!(err.code_str(), "invalid_request");
    }

    #[test]
    fn test_request_defaults_from_json() {
        let req: SearchRequest = serde_json::from_str(r#"{"queries": ["ev", "ev", " battery "]}"#).unwrap();
        assert_eq!(req.max_results_per_query, 5);
        assert_eq!(req.days_back, 7);
        assert_eq!(req.max_workers, 6);
        assert_eq!(req.distinct_queries(), vec!["ev", "battery"]);

        let mixed = SearchRequest::new(["EV charging", "ev charging ", "Ev Charging"]);
        assert_eq!(mixed.distinct_queries(), vec!["EV charging"]);
    }

    #[test]
    fn test_metrics_combine() {
        let a = SearchMetrics {
            total_tasks: 2,
            successful_tasks: 2,
            failed_tasks: 0,
            success_rate: 1.0,
            raw_results: 6,
            duplicates_removed: 1,
            average_task_ms: 10.0,
        };
        let b = SearchMetrics {
            total_tasks: 2,
            successful_tasks: 0,
            failed_tasks: 2,
            success_rate: 0.0,
            raw_results: 0,
            duplicates_removed: 0,
            average_task_ms: 30.0,
        };
        let c = a.combine(&b, 5);
        assert_eq!(c.total_tasks, 4);
        assert_eq!(c.success_rate, 0.5);
        assert_eq!(c.duplicates_removed, 1);
        assert_eq!(c.average_task_ms, 20.0);
    }

    #[tokio::test]
    async fn test_no_backends_is_an_error() {
        let service = SearchService::new(BackendRegistry::new(), ScoutConfig::default());
        let err = service
            .search(SearchRequest::new(["ev"]).with_sources(["brave"]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::NoBackendsAvailable { ref requested } if requested == "brave"
        ));
    }

    #[test]
    fn test_research_options_from_config() {
        let mut config = ScoutConfig::default();
        config.max_iterations = 2;
        config.default_days_back = 30;
        let service = SearchService::new(BackendRegistry::new(), config);
        let opts = service.research_options();
        assert_eq!(opts.max_iterations, 2);
        assert_eq!(opts.days_back, 30);
        assert_eq!(opts.max_refinement_queries, 8);
    }
}
