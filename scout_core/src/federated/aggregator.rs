//! Merging task output into a de-duplicated, ranked document set.

use super::{Document, DocumentSet, TaskResult};
use crate::utils::{jaccard, query_key, title_tokens};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet};

/// Default title similarity at or above which two documents are duplicates.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aggregator {
    similarity_threshold: f64,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new(DEFAULT_SIMILARITY_THRESHOLD)
    }
}

impl Aggregator {
    pub fn new(similarity_threshold: f64) -> Self {
        Self {
            similarity_threshold: similarity_threshold.clamp(0.0, 1.0),
        }
    }

    pub fn similarity_threshold(&self) -> f64 {
        self.similarity_threshold
    }

    /// Fold a batch of task results into `existing`, returning a new set.
    ///
    /// Existing documents keep precedence over incoming ones; incoming ones
    /// are taken in batch order, so earlier tasks win ties. Failed tasks
    /// contribute nothing.
    pub fn merge(&self, existing: &DocumentSet, incoming: &[TaskResult]) -> DocumentSet {
        let mut ordered: Vec<&TaskResult> = incoming.iter().collect();
        ordered.sort_by_key(|r| r.index);

        let mut sources_used = existing.sources_used.clone();
        let mut queries = existing.queries.clone();
        for result in &ordered {
            queries.insert(query_key(&result.task.query));
            if result.is_success() {
                sources_used.insert(result.task.backend.clone());
            }
        }

        let candidates = existing.documents.iter().cloned().chain(
            ordered
                .iter()
                .filter(|r| r.is_success())
                .flat_map(|r| r.documents.iter().cloned()),
        );

        DocumentSet {
            documents: self.dedup_and_sort(candidates),
            sources_used,
            queries,
            execution_time_ms: existing.execution_time_ms,
        }
    }

    /// Combine two sets under the same rules; `a` takes precedence.
    pub fn union(&self, a: &DocumentSet, b: &DocumentSet) -> DocumentSet {
        let candidates = a.documents.iter().chain(b.documents.iter()).cloned();
        DocumentSet {
            documents: self.dedup_and_sort(candidates),
            sources_used: a.sources_used.union(&b.sources_used).cloned().collect(),
            queries: a.queries.union(&b.queries).cloned().collect(),
            execution_time_ms: a.execution_time_ms + b.execution_time_ms,
        }
    }

    /// Build a set from a plain list of documents.
    pub fn collect(&self, documents: Vec<Document>) -> DocumentSet {
        let sources_used: BTreeSet<String> = documents.iter().map(|d| d.source.clone()).collect();
        DocumentSet {
            documents: self.dedup_and_sort(documents.into_iter()),
            sources_used,
            queries: BTreeSet::new(),
            execution_time_ms: 0,
        }
    }

    /// Whether two titles are close enough to be the same story.
    pub fn is_near_duplicate(&self, a: &Document, b: &Document) -> bool {
        let (ta, tb) = (title_tokens(&a.title), title_tokens(&b.title));
        !ta.is_empty() && !tb.is_empty() && jaccard(&ta, &tb) >= self.similarity_threshold
    }

    fn dedup_and_sort(&self, candidates: impl Iterator<Item = Document>) -> Vec<Document> {
        let mut seen_keys = HashSet::new();
        let mut kept: Vec<Document> = Vec::new();
        let mut kept_tokens: Vec<HashSet<String>> = Vec::new();

        for doc in candidates {
            if !doc.is_identifiable() {
                continue;
            }
            if !seen_keys.insert(doc.dedup_key()) {
                continue;
            }
            let tokens = title_tokens(&doc.title);
            let near_duplicate = !tokens.is_empty()
                && kept_tokens
                    .iter()
                    .any(|t| !t.is_empty() && jaccard(t, &tokens) >= self.similarity_threshold);
            if near_duplicate {
                continue;
            }
            kept_tokens.push(tokens);
            kept.push(doc);
        }

        kept.sort_by(rank_order);
        kept
    }
}

/// Relevance descending, then newest first. Missing score counts as 0 and
/// a missing date sorts last.
fn rank_order(a: &Document, b: &Document) -> Ordering {
    let sa = a.relevance_score.unwrap_or(0.0);
    let sb = b.relevance_score.unwrap_or(0.0);
    sb.partial_cmp(&sa)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.publish_date.cmp(&a.publish_date))
}
