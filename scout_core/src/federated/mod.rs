//! Federated search across multiple backends.
//!
//! This module provides:
//! - `Document` / `DocumentSet`: the normalized result model
//! - `ExecutionEngine`: bounded, fault-isolated parallel execution of tasks
//! - `Aggregator`: merge, de-duplication and ranking of task output
//!
//! # Example
//!
//! ```ignore
//! use scout_core::federated::{Aggregator, ExecutionEngine, ExecutionOptions, SearchTask};
//!
//! let engine = ExecutionEngine::new(&registry, ExecutionOptions::default());
//! let results = engine
//!     .run_batch(vec![SearchTask::new("solid state batteries", "arxiv", 5, 30)], 4)
//!     .await;
//! let set = Aggregator::default().merge(&DocumentSet::empty(), &results);
//! ```

mod aggregator;
mod engine;
mod types;

pub use aggregator::{Aggregator, DEFAULT_SIMILARITY_THRESHOLD};
pub use engine::{
    BackendFailure, ExecutionEngine, ExecutionOptions, FailureKind, RetryPolicy, TaskResult,
    DEFAULT_BATCH_DEADLINE, DEFAULT_TASK_TIMEOUT,
};
pub use types::{Document, DocumentSet, SearchTask, SourceType, TopicCategory};
