//! Batch execution engine.
//!
//! Runs independent (query, backend) tasks with bounded parallelism, a
//! per-attempt timeout, retries for transient failures and a soft batch
//! deadline. One task failing never affects the others.

use super::{SearchTask, TopicCategory};
use crate::error::BackendError;
use crate::{BackendAdapter, BackendRegistry, Document};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::time::{sleep, timeout, timeout_at};
use tracing::{debug, warn};

pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_BATCH_DEADLINE: Duration = Duration::from_secs(120);

/// Why a task produced no documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Transient,
    Permanent,
    Timeout,
    Unavailable,
    Cancelled,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Transient => "transient",
            FailureKind::Permanent => "permanent",
            FailureKind::Timeout => "timeout",
            FailureKind::Unavailable => "unavailable",
            FailureKind::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A captured backend failure, reported to callers instead of raised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendFailure {
    pub backend: String,
    pub query: String,
    pub kind: FailureKind,
    pub message: String,
    pub attempts: u32,
}

impl fmt::Display for BackendFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}, {} attempt(s)): {}",
            self.backend, self.kind, self.attempts, self.message
        )
    }
}

/// Outcome of one task. Exactly one of `documents`/`error` is meaningful.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    /// Position of the task in the submitted batch
    pub index: usize,
    pub task: SearchTask,
    pub documents: Vec<Document>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<BackendFailure>,
    pub attempts: u32,
    pub duration_ms: u64,
}

impl TaskResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    fn failed(
        index: usize,
        task: SearchTask,
        kind: FailureKind,
        message: String,
        attempts: u32,
        started: Instant,
    ) -> Self {
        let error = BackendFailure {
            backend: task.backend.clone(),
            query: task.query.clone(),
            kind,
            message,
            attempts,
        };
        Self {
            index,
            task,
            documents: Vec::new(),
            error: Some(error),
            attempts,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }
}

/// Exponential backoff for transient failures.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub backoff_factor: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (1-based), capped at `max_delay`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        let capped = secs.min(self.max_delay.as_secs_f64()).max(0.0);
        Duration::from_secs_f64(capped)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOptions {
    /// Limit for a single attempt
    pub task_timeout: Duration,
    /// Soft limit for the whole batch; unfinished tasks are abandoned
    pub batch_deadline: Option<Duration>,
    pub retry: RetryPolicy,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            task_timeout: DEFAULT_TASK_TIMEOUT,
            batch_deadline: Some(DEFAULT_BATCH_DEADLINE),
            retry: RetryPolicy::default(),
        }
    }
}

/// Runs search tasks against the adapters of a registry.
pub struct ExecutionEngine<'a> {
    registry: &'a BackendRegistry,
    options: ExecutionOptions,
}

impl<'a> ExecutionEngine<'a> {
    pub fn new(registry: &'a BackendRegistry, options: ExecutionOptions) -> Self {
        Self { registry, options }
    }

    pub fn options(&self) -> &ExecutionOptions {
        &self.options
    }

    /// Run every task with at most `concurrency` backend calls in flight.
    ///
    /// Never fails: each task resolves to documents or a captured error.
    /// Results come back in completion order. Tasks still running when the
    /// batch deadline passes are reported as cancelled.
    pub async fn run_batch(&self, tasks: Vec<SearchTask>, concurrency: usize) -> Vec<TaskResult> {
        if tasks.is_empty() {
            return Vec::new();
        }
        let started = Instant::now();
        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));

        let mut pending: FuturesUnordered<_> = tasks
            .iter()
            .cloned()
            .enumerate()
            .map(|(index, task)| {
                let sem = Arc::clone(&semaphore);
                async move {
                    let _permit = match sem.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => {
                            return TaskResult::failed(
                                index,
                                task,
                                FailureKind::Cancelled,
                                "worker pool closed".to_string(),
                                0,
                                Instant::now(),
                            )
                        }
                    };
                    self.execute_task(index, task).await
                }
            })
            .collect();

        let deadline = self
            .options
            .batch_deadline
            .map(|d| tokio::time::Instant::now() + d);
        let mut results = Vec::with_capacity(tasks.len());
        let mut expired = false;

        loop {
            let next = match deadline {
                Some(at) => match timeout_at(at, pending.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        expired = true;
                        break;
                    }
                },
                None => pending.next().await,
            };
            match next {
                Some(result) => results.push(result),
                None => break,
            }
        }
        // abandon whatever is still in flight
        drop(pending);

        if expired {
            let done: HashSet<usize> = results.iter().map(|r| r.index).collect();
            let limit = self.options.batch_deadline.unwrap_or_default();
            for (index, task) in tasks.into_iter().enumerate() {
                if done.contains(&index) {
                    continue;
                }
                warn!(backend = %task.backend, query = %task.query, "abandoned at batch deadline");
                results.push(TaskResult::failed(
                    index,
                    task,
                    FailureKind::Cancelled,
                    format!("batch deadline of {}ms expired", limit.as_millis()),
                    0,
                    started,
                ));
            }
        }

        results
    }

    async fn execute_task(&self, index: usize, task: SearchTask) -> TaskResult {
        let started = Instant::now();

        let Some(adapter) = self.registry.get(&task.backend).cloned() else {
            let message = format!("backend '{}' is not registered", task.backend);
            return self.report_failure(index, task, FailureKind::Unavailable, message, 0, started);
        };
        if !adapter.is_available() {
            let message = format!("backend '{}' is not configured", task.backend);
            return self.report_failure(index, task, FailureKind::Unavailable, message, 0, started);
        }

        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let (outcome, timed_out) = match timeout(
                self.options.task_timeout,
                adapter.fetch(&task.query, task.max_results, task.days_back),
            )
            .await
            {
                Ok(outcome) => (outcome, false),
                Err(_) => (Err(BackendError::timeout(self.options.task_timeout)), true),
            };

            match outcome {
                Ok(raw) => {
                    let documents =
                        normalize_all(adapter.as_ref(), &raw, task.max_results, task.category);
                    let duration_ms = started.elapsed().as_millis() as u64;
                    debug!(
                        backend = %task.backend,
                        query = %task.query,
                        documents = documents.len(),
                        attempts,
                        duration_ms,
                        "search task completed"
                    );
                    return TaskResult {
                        index,
                        task,
                        documents,
                        error: None,
                        attempts,
                        duration_ms,
                    };
                }
                Err(err) if err.is_transient() && attempts <= self.options.retry.max_retries => {
                    let delay = self.options.retry.delay_for(attempts);
                    debug!(
                        backend = %task.backend,
                        error = %err,
                        retry_in_ms = delay.as_millis() as u64,
                        "transient failure, retrying"
                    );
                    sleep(delay).await;
                }
                Err(err) => {
                    let kind = if timed_out {
                        FailureKind::Timeout
                    } else if err.is_transient() {
                        FailureKind::Transient
                    } else {
                        FailureKind::Permanent
                    };
                    let message = err.message().to_string();
                    return self.report_failure(index, task, kind, message, attempts, started);
                }
            }
        }
    }

    fn report_failure(
        &self,
        index: usize,
        task: SearchTask,
        kind: FailureKind,
        message: String,
        attempts: u32,
        started: Instant,
    ) -> TaskResult {
        warn!(
            backend = %task.backend,
            query = %task.query,
            error = %message,
            kind = kind.as_str(),
            "search task failed"
        );
        TaskResult::failed(index, task, kind, message, attempts, started)
    }
}

fn normalize_all(
    adapter: &dyn BackendAdapter,
    raw: &[crate::RawResult],
    max_results: usize,
    category: Option<TopicCategory>,
) -> Vec<Document> {
    raw.iter()
        .take(max_results)
        .filter_map(|item| adapter.normalize(item))
        .map(|doc| doc.with_category(category))
        .collect()
}
