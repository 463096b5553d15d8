mod common;

use async_trait::async_trait;
use common::MockBackend;
use scout_core::collaborators::{ContentQualityRater, QualityRating, QueryContext, QueryGenerator};
use scout_core::error::{ConfigurationError, EvaluationError, QueryGenerationError};
use scout_core::federated::{ExecutionOptions, RetryPolicy};
use scout_core::quality::QualityEvaluator;
use scout_core::refinement::{RefinementController, RefinementOptions, StopReason};
use scout_core::{BackendRegistry, Document, SourceType};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn execution() -> ExecutionOptions {
    ExecutionOptions {
        task_timeout: Duration::from_secs(2),
        batch_deadline: Some(Duration::from_secs(10)),
        retry: RetryPolicy::none(),
    }
}

fn options(max_iterations: u32) -> RefinementOptions {
    RefinementOptions {
        max_iterations,
        ..RefinementOptions::default()
    }
}

fn registry_of(backends: Vec<Arc<MockBackend>>) -> BackendRegistry {
    let mut registry = BackendRegistry::new();
    for b in backends {
        registry.register(b);
    }
    registry
}

struct ScriptedGenerator {
    initial: Vec<String>,
    refined: Vec<String>,
    contexts: Mutex<Vec<QueryContext>>,
}

#[async_trait]
impl QueryGenerator for ScriptedGenerator {
    async fn generate_queries(
        &self,
        _topic: &str,
        context: Option<&QueryContext>,
    ) -> Result<Vec<String>, QueryGenerationError> {
        match context {
            None => Ok(self.initial.clone()),
            Some(ctx) => {
                if let Ok(mut seen) = self.contexts.lock() {
                    seen.push(ctx.clone());
                }
                Ok(self.refined.clone())
            }
        }
    }
}

struct BrokenGenerator;

#[async_trait]
impl QueryGenerator for BrokenGenerator {
    async fn generate_queries(
        &self,
        _topic: &str,
        _context: Option<&QueryContext>,
    ) -> Result<Vec<String>, QueryGenerationError> {
        Err(QueryGenerationError::Unavailable("model offline".into()))
    }
}

struct BrokenRater;

#[async_trait]
impl ContentQualityRater for BrokenRater {
    async fn rate_relevance(
        &self,
        _sample: &[Document],
        _topic: &str,
    ) -> Result<QualityRating, EvaluationError> {
        Err(EvaluationError::InvalidResponse("garbled".into()))
    }
}

#[tokio::test]
async fn test_rich_first_round_stops_immediately() {
    let registry = registry_of(vec![
        Arc::new(MockBackend::new("tavily", SourceType::Web)),
        Arc::new(MockBackend::new("arxiv", SourceType::Academic)),
        Arc::new(MockBackend::new("rss", SourceType::News)),
    ]);
    let controller = RefinementController::new(&registry, QualityEvaluator::default())
        .with_execution_options(execution())
        .with_options(options(5));

    let outcome = controller.run("electric vehicles").await.unwrap();

    assert_eq!(outcome.stop_reason, StopReason::Sufficient);
    assert_eq!(outcome.iterations, 1);
    assert_eq!(outcome.history.len(), 1);
    assert!(outcome.report.sufficient);
    assert!(outcome.report.gaps.is_empty());
    assert_eq!(outcome.history[0].queries[0], "electric vehicles");
    assert_eq!(outcome.history[0].tasks, 18);
    assert_eq!(outcome.documents.len(), 90);
}

#[tokio::test]
async fn test_empty_results_stop_at_iteration_limit() {
    let silent = Arc::new(MockBackend::new("brave", SourceType::Web).returning_nothing());
    let registry = registry_of(vec![silent.clone()]);
    let controller = RefinementController::new(&registry, QualityEvaluator::default())
        .with_execution_options(execution())
        .with_options(options(3));

    let outcome = controller.run("electric vehicles").await.unwrap();

    assert_eq!(outcome.stop_reason, StopReason::MaxIterations);
    assert_eq!(outcome.iterations, 3);
    assert_eq!(outcome.history.len(), 3);
    assert_eq!(outcome.report.composite, 0.0);
    assert!(!outcome.report.gaps.is_empty());
    assert!(outcome.documents.is_empty());

    // every round sent only queries never sent before
    let sent = silent.seen_queries();
    let distinct: HashSet<String> = sent.iter().map(|q| q.to_lowercase()).collect();
    assert_eq!(sent.len(), distinct.len());
    for record in &outcome.history[1..] {
        assert!(!record.queries.is_empty());
        assert!(record.queries.len() <= 8);
    }
}

#[tokio::test]
async fn test_templates_run_out() {
    let silent = Arc::new(MockBackend::new("brave", SourceType::Web).returning_nothing());
    let registry = registry_of(vec![silent.clone()]);
    let controller = RefinementController::new(&registry, QualityEvaluator::default())
        .with_execution_options(execution())
        .with_options(options(50));

    let outcome = controller.run("ev").await.unwrap();

    assert_eq!(outcome.stop_reason, StopReason::NoNewQueries);
    assert!(outcome.iterations < 50);
    assert_eq!(outcome.iterations as usize, outcome.history.len());
    assert_eq!(silent.call_count(), silent.seen_queries().len());
}

#[tokio::test]
async fn test_document_set_never_shrinks() {
    let registry = registry_of(vec![Arc::new(
        MockBackend::new("tavily", SourceType::Web).failing_transiently(3),
    )]);
    let controller = RefinementController::new(&registry, QualityEvaluator::default())
        .with_execution_options(execution())
        .with_options(RefinementOptions {
            max_iterations: 4,
            max_results_per_query: 1,
            ..RefinementOptions::default()
        });

    let outcome = controller.run("grid storage").await.unwrap();

    let mut previous = 0;
    for record in &outcome.history {
        assert!(record.total_documents >= previous);
        previous = record.total_documents;
    }
    assert_eq!(outcome.failures.len(), 3);
    assert_eq!(outcome.documents.len(), previous);
}

#[tokio::test]
async fn test_generator_queries_and_context() {
    let backend = Arc::new(MockBackend::new("brave", SourceType::Web).returning_nothing());
    let registry = registry_of(vec![backend.clone()]);
    let generator = Arc::new(ScriptedGenerator {
        initial: vec![
            "sodium ion battery startups".into(),
            "sodium ion battery regulation".into(),
        ],
        refined: vec![
            "sodium ion battery startups".into(),
            "sodium ion grid deployments 2024".into(),
        ],
        contexts: Mutex::new(Vec::new()),
    });
    let controller = RefinementController::new(&registry, QualityEvaluator::default())
        .with_generator(generator.clone())
        .with_execution_options(execution())
        .with_options(options(2));

    let outcome = controller.run("sodium ion batteries").await.unwrap();

    assert_eq!(
        outcome.history[0].queries,
        vec!["sodium ion battery startups", "sodium ion battery regulation"]
    );
    // the repeated query is dropped
    assert_eq!(
        outcome.history[1].queries,
        vec!["sodium ion grid deployments 2024"]
    );

    let contexts = generator.contexts.lock().unwrap();
    assert_eq!(contexts.len(), 1);
    assert_eq!(contexts[0].prior_queries.len(), 2);
    assert!(!contexts[0].gaps.is_empty());
}

#[tokio::test]
async fn test_collaborator_failures_fall_back() {
    let backend = Arc::new(MockBackend::new("brave", SourceType::Web));
    let registry = registry_of(vec![backend]);
    let controller = RefinementController::new(
        &registry,
        QualityEvaluator::default().with_rater(Arc::new(BrokenRater)),
    )
    .with_generator(Arc::new(BrokenGenerator))
    .with_execution_options(execution())
    .with_options(options(2));

    let outcome = controller.run("heat pumps").await.unwrap();

    assert_eq!(outcome.history[0].queries.len(), 6);
    assert_eq!(outcome.history[0].queries[0], "heat pumps");
    assert!(outcome.report.rater_fallback);
}

#[tokio::test]
async fn test_no_backends_is_an_error() {
    let registry = registry_of(vec![Arc::new(
        MockBackend::new("brave", SourceType::Web).unavailable(),
    )]);
    let controller = RefinementController::new(&registry, QualityEvaluator::default());
    let err = controller.run("ev").await.unwrap_err();
    assert!(matches!(err, ConfigurationError::NoBackendsAvailable { .. }));
}
