//! Pluggable collaborators used by the quality evaluator and the
//! refinement controller.
//!
//! Both are optional. Without a [`QueryGenerator`] the controller uses
//! query templates; without a [`ContentQualityRater`] the evaluator falls
//! back to a volume heuristic.

use crate::error::{EvaluationError, QueryGenerationError};
use crate::Document;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What the generator knows about earlier rounds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryContext {
    /// Human-readable gap descriptions from the last evaluation
    pub gaps: Vec<String>,
    pub prior_queries: Vec<String>,
}

#[async_trait]
pub trait QueryGenerator: Send + Sync {
    async fn generate_queries(
        &self,
        topic: &str,
        context: Option<&QueryContext>,
    ) -> Result<Vec<String>, QueryGenerationError>;
}

/// Dimension scores reported by a rater, each in `[0, 10]`.
///
/// Keys are lower-case dimension names such as `relevance` or `depth`;
/// `overall` is the aggregate when the rater gives one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityRating {
    pub scores: BTreeMap<String, f64>,
}

impl QualityRating {
    pub const OVERALL: &'static str = "overall";

    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a score, clamped to `[0, 10]`. Non-finite values are ignored.
    pub fn with_score(mut self, dimension: impl Into<String>, score: f64) -> Self {
        self.insert(dimension, score);
        self
    }

    pub fn insert(&mut self, dimension: impl Into<String>, score: f64) {
        if score.is_finite() {
            self.scores
                .insert(dimension.into().to_lowercase(), score.clamp(0.0, 10.0));
        }
    }

    pub fn get(&self, dimension: &str) -> Option<f64> {
        self.scores.get(&dimension.to_lowercase()).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// `overall` when reported, else the mean of the other dimensions.
    pub fn aggregate(&self) -> Option<f64> {
        if let Some(overall) = self.get(Self::OVERALL) {
            return Some(overall);
        }
        if self.scores.is_empty() {
            return None;
        }
        Some(self.scores.values().sum::<f64>() / self.scores.len() as f64)
    }
}

#[async_trait]
pub trait ContentQualityRater: Send + Sync {
    async fn rate_relevance(
        &self,
        sample: &[Document],
        topic: &str,
    ) -> Result<QualityRating, EvaluationError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_prefers_overall() {
        let rating = QualityRating::new()
            .with_score("relevance", 9.0)
            .with_score("Overall", 6.5);
        assert_eq!(rating.aggregate(), Some(6.5));
    }

    #[test]
    fn test_aggregate_mean_and_clamp() {
        let rating = QualityRating::new()
            .with_score("relevance", 14.0)
            .with_score("depth", 6.0)
            .with_score("accuracy", f64::NAN);
        assert_eq!(rating.get("relevance"), Some(10.0));
        assert_eq!(rating.aggregate(), Some(8.0));
        assert_eq!(QualityRating::new().aggregate(), None);
    }
}
