#![allow(dead_code)]

use async_trait::async_trait;
use scout_core::error::BackendError;
use scout_core::{BackendAdapter, RawResult, SourceType};
use serde_json::json;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// In-memory backend with scripted behaviour.
///
/// By default every call returns `max_results` synthetic items dated
/// today, each on its own host so the set has plenty of distinct domains.
pub struct MockBackend {
    name: String,
    category: SourceType,
    available: bool,
    delay: Duration,
    transient_failures: AtomicU32,
    permanent_error: Option<String>,
    fixed: Option<Vec<RawResult>>,
    empty: bool,
    pub calls: AtomicUsize,
    pub queries: Mutex<Vec<String>>,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl MockBackend {
    pub fn new(name: &str, category: SourceType) -> Self {
        Self {
            name: name.to_string(),
            category,
            available: true,
            delay: Duration::ZERO,
            transient_failures: AtomicU32::new(0),
            permanent_error: None,
            fixed: None,
            empty: false,
            calls: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fail with a transient error this many times before succeeding.
    pub fn failing_transiently(self, times: u32) -> Self {
        self.transient_failures.store(times, Ordering::SeqCst);
        self
    }

    pub fn failing_permanently(mut self, message: &str) -> Self {
        self.permanent_error = Some(message.to_string());
        self
    }

    pub fn with_results(mut self, results: Vec<RawResult>) -> Self {
        self.fixed = Some(results);
        self
    }

    pub fn returning_nothing(mut self) -> Self {
        self.empty = true;
        self
    }

    /// Share in-flight accounting with other mocks to observe the pool
    /// bound across backends.
    pub fn with_counters(mut self, in_flight: Arc<AtomicUsize>, peak: Arc<AtomicUsize>) -> Self {
        self.in_flight = in_flight;
        self.peak = peak;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn seen_queries(&self) -> Vec<String> {
        self.queries.lock().map(|q| q.clone()).unwrap_or_default()
    }

    fn synthetic(&self, query: &str, max_results: usize) -> Vec<RawResult> {
        let slug: String = query
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        let today = chrono::Utc::now().date_naive();
        (0..max_results)
            .map(|i| {
                json!({
                    "title": format!("{} item {} {}", self.name, i, slug),
                    "url": format!("https://{}{}.example/{}/{}", self.name, i, slug, i),
                    "content": format!("Coverage of {} from {}", query, self.name),
                    "published_date": today.to_string(),
                })
            })
            .collect()
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl BackendAdapter for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn category(&self) -> SourceType {
        self.category
    }

    fn is_available(&self) -> bool {
        self.available
    }

    async fn fetch(
        &self,
        query: &str,
        max_results: usize,
        _days_back: u32,
    ) -> Result<Vec<RawResult>, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut q) = self.queries.lock() {
            q.push(query.to_string());
        }
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(message) = &self.permanent_error {
            return Err(BackendError::permanent(message.clone()));
        }
        let remaining = self.transient_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.transient_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(BackendError::from_status(&self.name, 503, "try again"));
        }
        if self.empty {
            return Ok(Vec::new());
        }
        if let Some(fixed) = &self.fixed {
            return Ok(fixed.iter().take(max_results).cloned().collect());
        }
        Ok(self.synthetic(query, max_results))
    }
}
