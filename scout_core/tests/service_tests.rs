mod common;

use common::MockBackend;
use scout_core::error::ConfigurationError;
use scout_core::federated::FailureKind;
use scout_core::{
    BackendRegistry, ScoutConfig, SearchRequest, SearchService, SkipReason, SkippedBackend,
    SourceType,
};
use std::sync::Arc;

fn config() -> ScoutConfig {
    let mut config = ScoutConfig::default();
    config.retry.max_retries = 0;
    config.request_timeout_secs = 5;
    config
}

fn ev_registry() -> BackendRegistry {
    let mut registry = BackendRegistry::new();
    registry.register(Arc::new(MockBackend::new("tavily", SourceType::Web)));
    registry.register(Arc::new(MockBackend::new("arxiv", SourceType::Academic)));
    registry.register(Arc::new(
        MockBackend::new("newsapi", SourceType::News)
            .failing_permanently("newsapi request failed: connection refused"),
    ));
    registry
}

#[tokio::test]
async fn test_one_offline_backend_is_reported() {
    let service = SearchService::new(ev_registry(), config());
    let request = SearchRequest::new(["electric vehicles"]).with_days_back(7);
    let result = service.search(request).await.unwrap();

    assert_eq!(result.sources_used, vec!["arxiv", "tavily"]);
    assert_eq!(result.total_count, 10);
    assert_eq!(result.documents.len(), result.total_count);
    assert_eq!(result.query_count, 1);

    let failures = &result.metadata.failed_backends;
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].backend, "newsapi");
    assert_eq!(failures[0].kind, FailureKind::Permanent);
    assert!(!result.metadata.deadline_expired);

    let metrics = &result.metadata.metrics;
    assert_eq!(metrics.total_tasks, 3);
    assert_eq!(metrics.successful_tasks, 2);
    assert_eq!(metrics.failed_tasks, 1);
    assert!((metrics.success_rate - 2.0 / 3.0).abs() < 1e-9);
    assert_eq!(metrics.raw_results, 10);
    assert_eq!(metrics.duplicates_removed, 0);
}

#[tokio::test]
async fn test_requested_sources_and_skips() {
    let service = SearchService::new(ev_registry(), config());
    let request = SearchRequest::new(["ev", "ev battery"])
        .with_sources(["arxiv", "bing"])
        .with_max_results(2);
    let result = service.search(request).await.unwrap();

    assert_eq!(result.sources_used, vec!["arxiv"]);
    assert_eq!(result.total_count, 4);
    assert_eq!(
        result.metadata.skipped_backends,
        vec![SkippedBackend::new("bing", SkipReason::UnknownBackend)]
    );
    assert!(result.documents.iter().all(|d| d.source_type == SourceType::Academic));
}

#[tokio::test]
async fn test_search_by_category() {
    let service = SearchService::new(ev_registry(), config());
    let result = service
        .search_by_category(vec!["ev".into()], SourceType::Web, 3, 30)
        .await
        .unwrap();
    assert_eq!(result.sources_used, vec!["tavily"]);
    assert_eq!(result.total_count, 3);
}

#[tokio::test]
async fn test_no_usable_backend_fails_before_searching() {
    let offline = Arc::new(MockBackend::new("brave", SourceType::Web).unavailable());
    let mut registry = BackendRegistry::new();
    registry.register(offline.clone());
    let service = SearchService::new(registry, config());

    let err = service.search(SearchRequest::new(["ev"])).await.unwrap_err();
    assert!(matches!(err, ConfigurationError::NoBackendsAvailable { .. }));
    assert_eq!(offline.call_count(), 0);
}

#[tokio::test]
async fn test_invalid_request_rejected() {
    let service = SearchService::new(ev_registry(), config());
    let err = service
        .search(SearchRequest::new(["ev"]).with_max_workers(0))
        .await
        .unwrap_err();
    assert_eq!(err.code_str(), "invalid_request");
}

#[tokio::test]
async fn test_fallback_runs_when_preferred_is_thin() {
    let mut registry = BackendRegistry::new();
    registry.register(Arc::new(
        MockBackend::new("newsapi", SourceType::News).returning_nothing(),
    ));
    registry.register(Arc::new(MockBackend::new("rss", SourceType::News)));
    let service = SearchService::new(registry, config());

    let result = service
        .search_with_fallback(
            SearchRequest::new(["ev charging"]).with_max_results(4),
            vec!["newsapi".into()],
            vec!["rss".into()],
        )
        .await
        .unwrap();

    assert!(result.metadata.fallback_used);
    assert_eq!(result.total_count, 4);
    assert_eq!(result.sources_used, vec!["newsapi", "rss"]);
    assert_eq!(result.metadata.metrics.total_tasks, 2);
    // the same query ran on both legs but was issued once
    assert_eq!(result.query_count, 1);
}

#[tokio::test]
async fn test_query_count_ignores_case_and_padding() {
    let tavily = Arc::new(MockBackend::new("tavily", SourceType::Web));
    let mut registry = BackendRegistry::new();
    registry.register(tavily.clone());
    let service = SearchService::new(registry, config());

    let result = service
        .search(SearchRequest::new(["EV charging", "ev charging", " Ev Charging "]).with_max_results(2))
        .await
        .unwrap();

    assert_eq!(result.query_count, 1);
    assert_eq!(tavily.call_count(), 1);
    assert_eq!(tavily.seen_queries(), vec!["EV charging"]);
    assert_eq!(result.metadata.metrics.total_tasks, 1);
}

#[tokio::test]
async fn test_skipped_backends_carry_a_reason() {
    let mut registry = BackendRegistry::new();
    registry.register(Arc::new(MockBackend::new("tavily", SourceType::Web)));
    registry.register(Arc::new(MockBackend::new("brave", SourceType::Web).unavailable()));
    registry.register(Arc::new(MockBackend::new("arxiv", SourceType::Academic)));
    let service = SearchService::new(registry, config());

    let request = SearchRequest::new(["ev"])
        .with_sources(["tavily", "brave", "arxiv", "bing"])
        .with_source_type(SourceType::Web);
    let result = service.search(request).await.unwrap();

    assert_eq!(result.sources_used, vec!["tavily"]);
    assert_eq!(
        result.metadata.skipped_backends,
        vec![
            SkippedBackend::new("brave", SkipReason::NotConfigured),
            SkippedBackend::new("arxiv", SkipReason::SourceTypeMismatch),
            SkippedBackend::new("bing", SkipReason::UnknownBackend),
        ]
    );

    let value = serde_json::to_value(&result.metadata).unwrap();
    assert_eq!(value["skipped_backends"][0]["reason"], "not_configured");
}

#[tokio::test]
async fn test_fallback_skipped_when_preferred_is_enough() {
    let fallback = Arc::new(MockBackend::new("rss", SourceType::News));
    let mut registry = BackendRegistry::new();
    registry.register(Arc::new(MockBackend::new("tavily", SourceType::Web)));
    registry.register(fallback.clone());
    let service = SearchService::new(registry, config());

    let result = service
        .search_with_fallback(
            SearchRequest::new(["ev charging"]).with_max_results(4),
            vec!["tavily".into()],
            vec!["rss".into()],
        )
        .await
        .unwrap();

    assert!(!result.metadata.fallback_used);
    assert_eq!(fallback.call_count(), 0);
}

#[tokio::test]
async fn test_result_serializes_snake_case() {
    let service = SearchService::new(ev_registry(), config());
    let result = service
        .search(SearchRequest::new(["ev"]).with_max_results(1))
        .await
        .unwrap();
    let value = serde_json::to_value(&result).unwrap();
    assert!(value.get("total_count").is_some());
    assert!(value.get("execution_time_ms").is_some());
    assert!(value["metadata"].get("failed_backends").is_some());
    assert!(value["metadata"]["metrics"].get("success_rate").is_some());
    assert_eq!(value["documents"][0]["source_type"], "web");
}

#[test]
fn test_available_sources_grouped() {
    let service = SearchService::new(ev_registry(), config());
    let grouped = service.available_sources();
    assert_eq!(grouped[&SourceType::Web], vec!["tavily"]);
    assert_eq!(grouped[&SourceType::Academic], vec!["arxiv"]);
    assert_eq!(service.collector_info().len(), 3);
}
