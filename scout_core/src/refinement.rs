//! Iterative, quality-gated research over a topic.
//!
//! The controller runs a small state machine:
//!
//! ```text
//! INIT -> SEARCHING -> EVALUATING -> (REFINING -> SEARCHING)* -> DONE
//! ```
//!
//! Each SEARCHING pass fans the pending queries out over every usable
//! backend and merges the results into the accumulated set. EVALUATING
//! scores the set; REFINING turns the reported gaps into new queries.
//! Collaborator failures degrade to templates and never abort a run.

use crate::collaborators::{QueryContext, QueryGenerator};
use crate::error::ConfigurationError;
use crate::federated::{
    Aggregator, BackendFailure, DocumentSet, ExecutionEngine, ExecutionOptions, SearchTask,
    TopicCategory,
};
use crate::quality::{GapKind, QualityEvaluator, QualityReport};
use crate::BackendRegistry;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

pub const DEFAULT_MAX_ITERATIONS: u32 = 5;
pub const DEFAULT_MAX_REFINEMENT_QUERIES: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerState {
    Init,
    Searching,
    Evaluating,
    Refining,
    Done,
}

/// Why the controller reached DONE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Sufficient,
    MaxIterations,
    NoNewQueries,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StopReason::Sufficient => "quality target reached",
            StopReason::MaxIterations => "iteration limit reached",
            StopReason::NoNewQueries => "no new queries to try",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinementOptions {
    pub max_iterations: u32,
    pub max_refinement_queries: usize,
    pub max_results_per_query: usize,
    pub days_back: u32,
    pub max_workers: usize,
    /// Restrict to these backends; `None` uses every available one
    pub sources: Option<Vec<String>>,
}

impl Default for RefinementOptions {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_refinement_queries: DEFAULT_MAX_REFINEMENT_QUERIES,
            max_results_per_query: 5,
            days_back: 7,
            max_workers: 6,
            sources: None,
        }
    }
}

/// What happened in one SEARCHING + EVALUATING pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub iteration: u32,
    pub queries: Vec<String>,
    pub tasks: usize,
    pub failed_tasks: usize,
    pub documents_added: usize,
    pub total_documents: usize,
    pub composite: f64,
    pub sufficient: bool,
    pub gaps: Vec<String>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinementOutcome {
    pub topic: String,
    pub documents: DocumentSet,
    pub report: QualityReport,
    pub iterations: u32,
    pub stop_reason: StopReason,
    pub history: Vec<IterationRecord>,
    pub failures: Vec<BackendFailure>,
}

/// A query plus the category it targets.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PlannedQuery {
    text: String,
    category: Option<TopicCategory>,
}

impl PlannedQuery {
    fn new(text: String, category: Option<TopicCategory>) -> Self {
        Self { text, category }
    }
}

fn category_templates(category: TopicCategory) -> [&'static str; 2] {
    match category {
        TopicCategory::Breaking => ["latest news", "breaking announcement"],
        TopicCategory::Innovation => ["technology innovation", "new product launch"],
        TopicCategory::Investment => ["investment funding", "valuation deal"],
        TopicCategory::Policy => ["policy regulation", "law government"],
        TopicCategory::Trend => ["trend analysis", "future development"],
        TopicCategory::Perspective => ["controversy criticism", "risks challenges"],
    }
}

fn gap_templates(kind: &GapKind) -> [&'static str; 2] {
    match kind {
        GapKind::Quantity => ["news", "overview"],
        GapKind::Timeliness => ["this week", "recent updates"],
        GapKind::Authority => ["official report", "expert analysis"],
        GapKind::ContentQuality => ["in-depth analysis", "comprehensive review"],
        GapKind::General | GapKind::Coverage { .. } => ["latest developments", "key updates"],
    }
}

/// Topic alone plus the first template of every required category.
fn initial_templates(topic: &str) -> Vec<PlannedQuery> {
    let mut queries = vec![PlannedQuery::new(topic.to_string(), None)];
    for cat in TopicCategory::REQUIRED {
        queries.push(PlannedQuery::new(
            format!("{} {}", topic, category_templates(cat)[0]),
            Some(cat),
        ));
    }
    queries
}

/// Template queries for a round of gaps. The template tried first
/// alternates with `round`, so consecutive rounds lead with different
/// phrasings. Coverage gaps yield one unsent query per missing category.
fn gap_queries(
    topic: &str,
    report: &QualityReport,
    round: u32,
    ledger: &QueryLedger,
) -> Vec<PlannedQuery> {
    let first = (round % 2) as usize;
    let order = [first, 1 - first];
    let mut queries = Vec::new();
    for gap in &report.gaps {
        match &gap.kind {
            GapKind::Coverage { missing } => {
                for cat in missing {
                    let templates = category_templates(*cat);
                    let unsent = order
                        .iter()
                        .map(|idx| format!("{} {}", topic, templates[*idx]))
                        .find(|q| ledger.is_new(q));
                    if let Some(text) = unsent {
                        queries.push(PlannedQuery::new(text, Some(*cat)));
                    }
                }
            }
            kind => {
                let templates = gap_templates(kind);
                for idx in order {
                    queries.push(PlannedQuery::new(
                        format!("{} {}", topic, templates[idx]),
                        None,
                    ));
                }
            }
        }
    }
    queries
}

/// Keeps track of every query sent so far, case-insensitively.
#[derive(Debug, Default)]
struct QueryLedger {
    seen: HashSet<String>,
    issued: Vec<String>,
}

impl QueryLedger {
    fn is_new(&self, query: &str) -> bool {
        !self.seen.contains(&query.trim().to_lowercase())
    }

    fn record(&mut self, query: &str) {
        if self.seen.insert(query.trim().to_lowercase()) {
            self.issued.push(query.trim().to_string());
        }
    }

    /// New queries only, de-duplicated within the batch and capped.
    fn fresh(&self, candidates: Vec<PlannedQuery>, limit: usize) -> Vec<PlannedQuery> {
        let mut batch_seen = HashSet::new();
        let mut out = Vec::new();
        for q in candidates {
            let key = q.text.trim().to_lowercase();
            if key.is_empty() || !self.is_new(&key) || !batch_seen.insert(key) {
                continue;
            }
            out.push(q);
            if out.len() >= limit {
                break;
            }
        }
        out
    }
}

pub struct RefinementController<'a> {
    registry: &'a BackendRegistry,
    evaluator: QualityEvaluator,
    aggregator: Aggregator,
    execution: ExecutionOptions,
    generator: Option<Arc<dyn QueryGenerator>>,
    options: RefinementOptions,
}

impl<'a> RefinementController<'a> {
    pub fn new(registry: &'a BackendRegistry, evaluator: QualityEvaluator) -> Self {
        Self {
            registry,
            evaluator,
            aggregator: Aggregator::default(),
            execution: ExecutionOptions::default(),
            generator: None,
            options: RefinementOptions::default(),
        }
    }

    pub fn with_generator(mut self, generator: Arc<dyn QueryGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn with_aggregator(mut self, aggregator: Aggregator) -> Self {
        self.aggregator = aggregator;
        self
    }

    pub fn with_execution_options(mut self, execution: ExecutionOptions) -> Self {
        self.execution = execution;
        self
    }

    pub fn with_options(mut self, options: RefinementOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &RefinementOptions {
        &self.options
    }

    /// Research `topic` until the set is good enough, the iteration limit
    /// is hit, or no new queries remain.
    ///
    /// Only fails when no backend can be used at all.
    pub async fn run(&self, topic: &str) -> Result<RefinementOutcome, ConfigurationError> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(ConfigurationError::InvalidRequest(
                "topic must not be empty".into(),
            ));
        }
        let selection = self
            .registry
            .select(self.options.sources.as_deref(), None);
        if selection.usable.is_empty() {
            return Err(ConfigurationError::NoBackendsAvailable {
                requested: requested_label(self.options.sources.as_deref()),
            });
        }

        let started = Instant::now();
        let engine = ExecutionEngine::new(self.registry, self.execution.clone());
        let max_iterations = self.options.max_iterations.max(1);
        let days_back = self.options.days_back.max(1);

        let mut state = ControllerState::Init;
        let mut ledger = QueryLedger::default();
        let mut pending: Vec<PlannedQuery> = Vec::new();
        let mut documents = DocumentSet::empty();
        let mut report: Option<QualityReport> = None;
        let mut history: Vec<IterationRecord> = Vec::new();
        let mut failures: Vec<BackendFailure> = Vec::new();
        let mut iteration = 0u32;
        let mut stop_reason = StopReason::MaxIterations;
        let mut round_started = Instant::now();
        let mut round_stats = (0usize, 0usize, 0usize);

        loop {
            state = match state {
                ControllerState::Init => {
                    pending = self.initial_queries(topic).await;
                    ControllerState::Searching
                }
                ControllerState::Searching => {
                    iteration += 1;
                    round_started = Instant::now();
                    let tasks: Vec<SearchTask> = pending
                        .iter()
                        .flat_map(|q| {
                            selection.usable.iter().map(move |backend| {
                                SearchTask::new(
                                    q.text.clone(),
                                    backend.clone(),
                                    self.options.max_results_per_query,
                                    days_back,
                                )
                                .with_category(q.category)
                            })
                        })
                        .collect();
                    for q in &pending {
                        ledger.record(&q.text);
                    }

                    let results = engine.run_batch(tasks, self.options.max_workers).await;
                    let before = documents.len();
                    documents = self.aggregator.merge(&documents, &results);
                    let failed: Vec<BackendFailure> =
                        results.iter().filter_map(|r| r.error.clone()).collect();
                    round_stats = (results.len(), failed.len(), documents.len() - before);
                    failures.extend(failed);
                    ControllerState::Evaluating
                }
                ControllerState::Evaluating => {
                    let current = self.evaluator.evaluate(&documents, topic, days_back).await;
                    let (tasks, failed_tasks, documents_added) = round_stats;
                    let record = IterationRecord {
                        iteration,
                        queries: pending.iter().map(|q| q.text.clone()).collect(),
                        tasks,
                        failed_tasks,
                        documents_added,
                        total_documents: documents.len(),
                        composite: current.composite,
                        sufficient: current.sufficient,
                        gaps: current.gap_descriptions(),
                        duration_ms: round_started.elapsed().as_millis() as u64,
                    };
                    info!(
                        topic,
                        iteration,
                        queries = record.queries.len(),
                        added = documents_added,
                        total = documents.len(),
                        composite = current.composite,
                        sufficient = current.sufficient,
                        "refinement iteration finished"
                    );
                    history.push(record);

                    let next = if current.sufficient {
                        stop_reason = StopReason::Sufficient;
                        ControllerState::Done
                    } else if iteration >= max_iterations {
                        stop_reason = StopReason::MaxIterations;
                        ControllerState::Done
                    } else {
                        ControllerState::Refining
                    };
                    report = Some(current);
                    next
                }
                ControllerState::Refining => {
                    pending = match &report {
                        Some(current) => {
                            self.refinement_queries(topic, current, &ledger, iteration)
                                .await
                        }
                        None => Vec::new(),
                    };
                    if pending.is_empty() {
                        stop_reason = StopReason::NoNewQueries;
                        ControllerState::Done
                    } else {
                        ControllerState::Searching
                    }
                }
                ControllerState::Done => break,
            };
        }

        let report = match report {
            Some(report) => report,
            None => self.evaluator.evaluate(&documents, topic, days_back).await,
        };
        info!(
            topic,
            iterations = iteration,
            documents = documents.len(),
            composite = report.composite,
            reason = %stop_reason,
            "refinement finished"
        );

        Ok(RefinementOutcome {
            topic: topic.to_string(),
            documents: documents.with_execution_time_ms(started.elapsed().as_millis() as u64),
            report,
            iterations: iteration,
            stop_reason,
            history,
            failures,
        })
    }

    async fn initial_queries(&self, topic: &str) -> Vec<PlannedQuery> {
        let limit = TopicCategory::REQUIRED.len() + 1 + self.options.max_refinement_queries;
        if let Some(generator) = &self.generator {
            match generator.generate_queries(topic, None).await {
                Ok(queries) if !queries.is_empty() => {
                    let planned = QueryLedger::default().fresh(classified(queries), limit);
                    if !planned.is_empty() {
                        return planned;
                    }
                }
                Ok(_) => warn!(topic, "query generator returned nothing, using templates"),
                Err(e) => warn!(topic, error = %e, "query generation failed, using templates"),
            }
        }
        initial_templates(topic)
    }

    async fn refinement_queries(
        &self,
        topic: &str,
        report: &QualityReport,
        ledger: &QueryLedger,
        round: u32,
    ) -> Vec<PlannedQuery> {
        let limit = self.options.max_refinement_queries.max(1);
        if let Some(generator) = &self.generator {
            let context = QueryContext {
                gaps: report.gap_descriptions(),
                prior_queries: ledger.issued.clone(),
            };
            match generator.generate_queries(topic, Some(&context)).await {
                Ok(queries) => {
                    let planned = ledger.fresh(classified(queries), limit);
                    if !planned.is_empty() {
                        return planned;
                    }
                }
                Err(e) => warn!(topic, error = %e, "refinement query generation failed"),
            }
        }
        ledger.fresh(gap_queries(topic, report, round, ledger), limit)
    }
}

/// Generated queries carry no category of their own; infer one.
fn classified(queries: Vec<String>) -> Vec<PlannedQuery> {
    queries
        .into_iter()
        .map(|q| {
            let category = TopicCategory::detect(&q);
            PlannedQuery::new(q, category)
        })
        .collect()
}

pub(crate) fn requested_label(sources: Option<&[String]>) -> String {
    match sources {
        Some(s) if !s.is_empty() => s.join(", "),
        _ => "all".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quality::{DimensionScores, Gap};
    use std::collections::BTreeMap;

    fn report_with(gaps: Vec<GapKind>) -> QualityReport {
        QualityReport {
            scores: DimensionScores::default(),
            composite: 3.0,
            sufficient: false,
            gaps: gaps.into_iter().map(|kind| Gap { kind, score: 3.0 }).collect(),
            document_count: 0,
            category_counts: BTreeMap::new(),
            in_window_count: 0,
            domain_count: 0,
            rater_fallback: true,
        }
    }

    #[test]
    fn test_initial_templates() {
        let queries = initial_templates("solid state batteries");
        assert_eq!(queries.len(), 6);
        assert_eq!(queries[0].text, "solid state batteries");
        assert_eq!(queries[0].category, None);
        assert_eq!(queries[4].text, "solid state batteries policy regulation");
        assert_eq!(queries[4].category, Some(TopicCategory::Policy));
    }

    #[test]
    fn test_gap_queries_rotate_by_round() {
        let report = report_with(vec![GapKind::Timeliness]);
        let ledger = QueryLedger::default();
        let odd = gap_queries("ev", &report, 1, &ledger);
        let even = gap_queries("ev", &report, 2, &ledger);
        assert_eq!(odd[0].text, "ev recent updates");
        assert_eq!(even[0].text, "ev this week");
    }

    #[test]
    fn test_fresh_drops_issued_and_caps() {
        let mut ledger = QueryLedger::default();
        ledger.record("EV latest news");
        let report = report_with(vec![
            GapKind::Coverage {
                missing: vec![TopicCategory::Breaking, TopicCategory::Policy],
            },
            GapKind::Authority,
        ]);
        let planned = ledger.fresh(gap_queries("ev", &report, 2, &ledger), 8);
        let texts: Vec<&str> = planned.iter().map(|q| q.text.as_str()).collect();
        assert_eq!(
            texts,
            vec![
                "ev breaking announcement",
                "ev policy regulation",
                "ev official report",
                "ev expert analysis",
            ]
        );

        let capped = ledger.fresh(gap_queries("ev", &report, 2, &ledger), 2);
        assert_eq!(capped.len(), 2);
    }

    #[test]
    fn test_classified_queries() {
        let planned = classified(vec!["ev battery funding round".into(), "ev".into()]);
        assert_eq!(planned[0].category, Some(TopicCategory::Investment));
        assert_eq!(planned[1].category, None);
    }

    #[test]
    fn test_requested_label() {
        assert_eq!(requested_label(None), "all");
        assert_eq!(
            requested_label(Some(&["brave".to_string(), "rss".to_string()])),
            "brave, rss"
        );
    }
}
