//! Multi-dimensional quality scoring of a document set.
//!
//! Five dimensions are scored on `[0, 10]` and combined into a weighted
//! composite. Content quality is delegated to an optional
//! [`ContentQualityRater`]; when none is configured, or it fails, a volume
//! heuristic stands in and the report is flagged with `rater_fallback`.

use crate::collaborators::ContentQualityRater;
use crate::federated::{Document, DocumentSet, TopicCategory};
use crate::utils;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityWeights {
    #[serde(default = "default_quantity_weight")]
    pub quantity: f64,
    #[serde(default = "default_content_weight")]
    pub content_quality: f64,
    #[serde(default = "default_coverage_weight")]
    pub coverage: f64,
    #[serde(default = "default_timeliness_weight")]
    pub timeliness: f64,
    #[serde(default = "default_authority_weight")]
    pub authority: f64,
}

fn default_quantity_weight() -> f64 {
    0.15
}
fn default_content_weight() -> f64 {
    0.30
}
fn default_coverage_weight() -> f64 {
    0.25
}
fn default_timeliness_weight() -> f64 {
    0.20
}
fn default_authority_weight() -> f64 {
    0.10
}

impl Default for QualityWeights {
    fn default() -> Self {
        Self {
            quantity: default_quantity_weight(),
            content_quality: default_content_weight(),
            coverage: default_coverage_weight(),
            timeliness: default_timeliness_weight(),
            authority: default_authority_weight(),
        }
    }
}

impl QualityWeights {
    pub fn sum(&self) -> f64 {
        self.quantity + self.content_quality + self.coverage + self.timeliness + self.authority
    }
}

/// Gates for sufficiency and for gap reporting, all on the `[0, 10]` scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityThresholds {
    #[serde(default = "default_composite_threshold")]
    pub composite: f64,
    #[serde(default = "default_dimension_threshold")]
    pub content_quality: f64,
    #[serde(default = "default_dimension_threshold")]
    pub coverage: f64,
    /// Any dimension below this produces a gap
    #[serde(default = "default_dimension_threshold")]
    pub gap: f64,
}

fn default_composite_threshold() -> f64 {
    7.0
}
fn default_dimension_threshold() -> f64 {
    6.0
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            composite: default_composite_threshold(),
            content_quality: default_dimension_threshold(),
            coverage: default_dimension_threshold(),
            gap: default_dimension_threshold(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityConfig {
    #[serde(default)]
    pub weights: QualityWeights,
    #[serde(default)]
    pub thresholds: QualityThresholds,
    /// Documents handed to the rater
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,
}

fn default_sample_size() -> usize {
    15
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            weights: QualityWeights::default(),
            thresholds: QualityThresholds::default(),
            sample_size: default_sample_size(),
        }
    }
}

impl QualityConfig {
    pub fn validate(&self) -> Result<(), String> {
        let w = &self.weights;
        let weights = [
            w.quantity,
            w.content_quality,
            w.coverage,
            w.timeliness,
            w.authority,
        ];
        if weights.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err("quality weights must be non-negative".into());
        }
        if (w.sum() - 1.0).abs() > 1e-6 {
            return Err(format!("quality weights must sum to 1.0 (got {:.3})", w.sum()));
        }
        let t = &self.thresholds;
        for (name, value) in [
            ("composite", t.composite),
            ("content_quality", t.content_quality),
            ("coverage", t.coverage),
            ("gap", t.gap),
        ] {
            if !(0.0..=10.0).contains(&value) {
                return Err(format!(
                    "quality threshold '{}' must be within [0, 10] (got {})",
                    name, value
                ));
            }
        }
        if self.sample_size == 0 {
            return Err("quality sample_size must be greater than 0".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DimensionScores {
    pub quantity: f64,
    pub content_quality: f64,
    pub coverage: f64,
    pub timeliness: f64,
    pub authority: f64,
}

impl DimensionScores {
    pub fn composite(&self, weights: &QualityWeights) -> f64 {
        round2(
            self.quantity * weights.quantity
                + self.content_quality * weights.content_quality
                + self.coverage * weights.coverage
                + self.timeliness * weights.timeliness
                + self.authority * weights.authority,
        )
    }

    /// (name, score) pairs in reporting order.
    pub fn named(&self) -> [(&'static str, f64); 5] {
        [
            ("quantity", self.quantity),
            ("content_quality", self.content_quality),
            ("coverage", self.coverage),
            ("timeliness", self.timeliness),
            ("authority", self.authority),
        ]
    }
}

/// A weakness the next refinement round should address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GapKind {
    Quantity,
    ContentQuality,
    Coverage { missing: Vec<TopicCategory> },
    Timeliness,
    Authority,
    General,
}

impl GapKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GapKind::Quantity => "quantity",
            GapKind::ContentQuality => "content_quality",
            GapKind::Coverage { .. } => "coverage",
            GapKind::Timeliness => "timeliness",
            GapKind::Authority => "authority",
            GapKind::General => "general",
        }
    }
}

impl fmt::Display for GapKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GapKind::Quantity => f.write_str("not enough documents overall"),
            GapKind::ContentQuality => f.write_str("content lacks depth or relevance"),
            GapKind::Coverage { missing } => {
                let names: Vec<&str> = missing.iter().map(|c| c.as_str()).collect();
                write!(f, "weak coverage of: {}", names.join(", "))
            }
            GapKind::Timeliness => f.write_str("too few recent documents"),
            GapKind::Authority => f.write_str("too few distinct authoritative sources"),
            GapKind::General => f.write_str("overall quality below target"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gap {
    #[serde(flatten)]
    pub kind: GapKind,
    /// Score of the weak dimension, or the composite for a general gap
    pub score: f64,
}

impl fmt::Display for Gap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (score {:.1})", self.kind, self.score)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub scores: DimensionScores,
    pub composite: f64,
    pub sufficient: bool,
    pub gaps: Vec<Gap>,
    pub document_count: usize,
    pub category_counts: BTreeMap<TopicCategory, usize>,
    pub in_window_count: usize,
    pub domain_count: usize,
    /// Content quality came from the volume heuristic, not the rater
    pub rater_fallback: bool,
}

impl QualityReport {
    pub fn gap_descriptions(&self) -> Vec<String> {
        self.gaps.iter().map(|g| g.to_string()).collect()
    }
}

pub struct QualityEvaluator {
    config: QualityConfig,
    rater: Option<Arc<dyn ContentQualityRater>>,
}

impl Default for QualityEvaluator {
    fn default() -> Self {
        Self::new(QualityConfig::default())
    }
}

impl QualityEvaluator {
    pub fn new(config: QualityConfig) -> Self {
        Self {
            config,
            rater: None,
        }
    }

    pub fn with_rater(mut self, rater: Arc<dyn ContentQualityRater>) -> Self {
        self.rater = Some(rater);
        self
    }

    pub fn config(&self) -> &QualityConfig {
        &self.config
    }

    pub fn has_rater(&self) -> bool {
        self.rater.is_some()
    }

    pub async fn evaluate(&self, docs: &DocumentSet, topic: &str, days_back: u32) -> QualityReport {
        self.evaluate_at(docs, topic, days_back, utils::today()).await
    }

    /// Same as [`evaluate`](Self::evaluate) with an explicit reference date
    /// for the timeliness window.
    pub async fn evaluate_at(
        &self,
        docs: &DocumentSet,
        topic: &str,
        days_back: u32,
        today: NaiveDate,
    ) -> QualityReport {
        let n = docs.len();
        let category_counts = docs.count_by_category();
        let since = utils::window_start(today, days_back);
        let in_window_count = docs
            .documents()
            .iter()
            .filter(|d| d.publish_date.map_or(true, |date| date >= since))
            .count();
        let domain_count = docs.distinct_domains().len();

        let (content_quality, rater_fallback) = if n == 0 {
            (0.0, false)
        } else {
            self.content_score(docs, topic).await
        };

        let scores = DimensionScores {
            quantity: round2(quantity_score(n, &category_counts, days_back)),
            content_quality: round2(content_quality),
            coverage: round2(coverage_score(&category_counts)),
            timeliness: timeliness_score(in_window_count),
            authority: authority_score(domain_count),
        };
        let composite = scores.composite(&self.config.weights);
        let t = &self.config.thresholds;
        let sufficient = composite >= t.composite
            && scores.content_quality >= t.content_quality
            && scores.coverage >= t.coverage;
        let gaps = if sufficient {
            Vec::new()
        } else {
            identify_gaps(&scores, composite, &category_counts, t.gap)
        };

        debug!(
            documents = n,
            composite,
            sufficient,
            gaps = gaps.len(),
            "quality evaluated"
        );

        QualityReport {
            scores,
            composite,
            sufficient,
            gaps,
            document_count: n,
            category_counts,
            in_window_count,
            domain_count,
            rater_fallback,
        }
    }

    async fn content_score(&self, docs: &DocumentSet, topic: &str) -> (f64, bool) {
        let n = docs.len();
        let Some(rater) = &self.rater else {
            return (fallback_content_score(n), true);
        };
        let sample = sample_documents(docs, self.config.sample_size);
        match rater.rate_relevance(&sample, topic).await {
            Ok(rating) => match rating.aggregate() {
                Some(score) => (score.clamp(0.0, 10.0), false),
                None => {
                    warn!(topic, "rater returned no scores, using volume heuristic");
                    (fallback_content_score(n), true)
                }
            },
            Err(e) => {
                warn!(topic, error = %e, "content rating failed, using volume heuristic");
                (fallback_content_score(n), true)
            }
        }
    }
}

fn round2(value: f64) -> f64 {
    ((value * 100.0).round() / 100.0).clamp(0.0, 10.0)
}

/// Blend of overall volume and per-category volume. The per-category part
/// averages over the five required categories only; company news is not a
/// bucket of its own here.
fn quantity_score(n: usize, counts: &BTreeMap<TopicCategory, usize>, days_back: u32) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let min_total = (days_back.saturating_mul(3)).max(20) as f64;
    let min_per_cat = (days_back / 3).max(3) as f64;

    let total = (n as f64 / min_total * 10.0).min(10.0);
    let per_cat = TopicCategory::REQUIRED
        .iter()
        .map(|cat| {
            let c = counts.get(cat).copied().unwrap_or(0) as f64;
            (c / min_per_cat * 10.0).min(10.0)
        })
        .sum::<f64>()
        / TopicCategory::REQUIRED.len() as f64;

    total * 0.6 + per_cat * 0.4
}

fn fallback_content_score(n: usize) -> f64 {
    match n {
        0 => 0.0,
        1..=9 => 4.0,
        10..=14 => 5.5,
        15..=19 => 6.5,
        _ => 7.5,
    }
}

fn coverage_score(counts: &BTreeMap<TopicCategory, usize>) -> f64 {
    TopicCategory::REQUIRED
        .iter()
        .map(|cat| match counts.get(cat).copied().unwrap_or(0) {
            0 => 0.0,
            1 => 4.0,
            2 => 7.0,
            _ => 10.0,
        })
        .sum::<f64>()
        / TopicCategory::REQUIRED.len() as f64
}

fn timeliness_score(in_window: usize) -> f64 {
    match in_window {
        0 => 0.0,
        1..=9 => 5.0,
        10..=14 => 7.0,
        _ => 8.5,
    }
}

fn authority_score(domains: usize) -> f64 {
    match domains {
        0 => 0.0,
        1..=2 => 4.0,
        3..=5 => 6.0,
        6..=9 => 7.5,
        _ => 9.0,
    }
}

fn identify_gaps(
    scores: &DimensionScores,
    composite: f64,
    counts: &BTreeMap<TopicCategory, usize>,
    threshold: f64,
) -> Vec<Gap> {
    let mut gaps = Vec::new();
    for (name, score) in scores.named() {
        if score >= threshold {
            continue;
        }
        let kind = match name {
            "quantity" => GapKind::Quantity,
            "content_quality" => GapKind::ContentQuality,
            "coverage" => GapKind::Coverage {
                missing: TopicCategory::REQUIRED
                    .iter()
                    .copied()
                    .filter(|cat| counts.get(cat).copied().unwrap_or(0) < 2)
                    .collect(),
            },
            "timeliness" => GapKind::Timeliness,
            _ => GapKind::Authority,
        };
        gaps.push(Gap { kind, score });
    }
    if gaps.is_empty() {
        gaps.push(Gap {
            kind: GapKind::General,
            score: composite,
        });
    }
    gaps
}

/// Up to `size` documents taken round-robin across the required
/// categories, then from everything else, preserving set order.
pub fn sample_documents(docs: &DocumentSet, size: usize) -> Vec<Document> {
    let mut buckets: Vec<Vec<&Document>> = vec![Vec::new(); TopicCategory::REQUIRED.len()];
    let mut rest: Vec<&Document> = Vec::new();
    for doc in docs.documents() {
        match doc
            .effective_category()
            .and_then(|c| TopicCategory::REQUIRED.iter().position(|r| *r == c))
        {
            Some(slot) => buckets[slot].push(doc),
            None => rest.push(doc),
        }
    }

    let mut sample = Vec::with_capacity(size.min(docs.len()));
    let mut round = 0;
    while sample.len() < size && buckets.iter().any(|b| round < b.len()) {
        for bucket in &buckets {
            if sample.len() >= size {
                break;
            }
            if let Some(doc) = bucket.get(round) {
                sample.push((*doc).clone());
            }
        }
        round += 1;
    }
    for doc in rest {
        if sample.len() >= size {
            break;
        }
        sample.push(doc.clone());
    }
    sample
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::QualityRating;
    use crate::error::EvaluationError;
    use crate::federated::{Aggregator, SourceType};
    use async_trait::async_trait;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 10).unwrap()
    }

    /// `per_category` documents in every required category, spread over
    /// `domains` hosts, all published today.
    fn rich_set(per_category: usize, domains: usize) -> DocumentSet {
        let mut docs = Vec::new();
        let mut i = 0;
        for cat in TopicCategory::REQUIRED {
            for _ in 0..per_category {
                docs.push(
                    Document::new(
                        format!("story {} {}", cat, i),
                        format!("https://site{}.com/{}", i % domains, i),
                        "stub",
                        SourceType::Web,
                    )
                    .with_publish_date(today())
                    .with_category(Some(cat)),
                );
                i += 1;
            }
        }
        Aggregator::new(1.0).collect(docs)
    }

    struct FixedRater(f64);

    #[async_trait]
    impl ContentQualityRater for FixedRater {
        async fn rate_relevance(
            &self,
            sample: &[Document],
            _topic: &str,
        ) -> Result<QualityRating, EvaluationError> {
            assert!(sample.len() <= 15);
            Ok(QualityRating::new().with_score("overall", self.0))
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
            Err(EvaluationError::Unavailable("offline".into()))
        }
    }

    #[tokio::test]
    async fn test_empty_set_scores_zero() {
        let evaluator = QualityEvaluator::default().with_rater(Arc::new(FixedRater(9.0)));
        let report = evaluator
            .evaluate_at(&DocumentSet::empty(), "ev", 7, today())
            .await;
        assert_eq!(report.scores, DimensionScores::default());
        assert_eq!(report.composite, 0.0);
        assert!(!report.sufficient);
        assert!(!report.rater_fallback);
        assert_eq!(report.gaps.len(), 5);
    }

    #[tokio::test]
    async fn test_rich_set_is_sufficient() {
        let report = QualityEvaluator::default()
            .evaluate_at(&rich_set(8, 12), "ev", 7, today())
            .await;
        assert_eq!(report.scores.quantity, 10.0);
        assert_eq!(report.scores.content_quality, 7.5);
        assert_eq!(report.scores.coverage, 10.0);
        assert_eq!(report.scores.timeliness, 8.5);
        assert_eq!(report.scores.authority, 9.0);
        assert_eq!(report.composite, 8.85);
        assert!(report.sufficient);
        assert!(report.gaps.is_empty());
        assert!(report.rater_fallback);
    }

    #[tokio::test]
    async fn test_sparse_set_gaps() {
        let docs: Vec<Document> = (0..5)
            .map(|i| {
                Document::new(
                    format!("headline {}", i),
                    format!("https://one.com/{}", i),
                    "stub",
                    SourceType::News,
                )
                .with_category(Some(TopicCategory::Breaking))
            })
            .collect();
        let set = Aggregator::new(1.0).collect(docs);
        let report = QualityEvaluator::default()
            .evaluate_at(&set, "ev", 7, today())
            .await;

        assert_eq!(report.scores.coverage, 2.0);
        assert_eq!(report.scores.content_quality, 4.0);
        assert_eq!(report.scores.timeliness, 5.0);
        assert_eq!(report.scores.authority, 4.0);
        assert!(!report.sufficient);

        let kinds: Vec<&str> = report.gaps.iter().map(|g| g.kind.as_str()).collect();
        assert_eq!(
            kinds,
            vec!["quantity", "content_quality", "coverage", "timeliness", "authority"]
        );
        assert_eq!(
            report.gaps[2].kind,
            GapKind::Coverage {
                missing: vec![
                    TopicCategory::Innovation,
                    TopicCategory::Investment,
                    TopicCategory::Policy,
                    TopicCategory::Trend,
                ]
            }
        );
        assert!(report.gaps[2]
            .to_string()
            .starts_with("weak coverage of: innovation, investment"));
    }

    #[tokio::test]
    async fn test_content_gate_blocks_sufficiency() {
        let evaluator = QualityEvaluator::default().with_rater(Arc::new(FixedRater(5.0)));
        let report = evaluator
            .evaluate_at(&rich_set(8, 12), "ev", 7, today())
            .await;
        assert_eq!(report.scores.content_quality, 5.0);
        assert!(report.composite >= 7.0);
        assert!(!report.sufficient);
        assert_eq!(report.gaps.len(), 1);
        assert_eq!(report.gaps[0].kind, GapKind::ContentQuality);
    }

    #[tokio::test]
    async fn test_general_gap_when_only_composite_low() {
        let config = QualityConfig {
            thresholds: QualityThresholds {
                composite: 9.5,
                ..QualityThresholds::default()
            },
            ..QualityConfig::default()
        };
        let report = QualityEvaluator::new(config)
            .evaluate_at(&rich_set(8, 12), "ev", 7, today())
            .await;
        assert!(!report.sufficient);
        assert_eq!(report.gaps.len(), 1);
        assert_eq!(report.gaps[0].kind, GapKind::General);
    }

    #[tokio::test]
    async fn test_rater_failure_degrades() {
        let evaluator = QualityEvaluator::default().with_rater(Arc::new(BrokenRater));
        let report = evaluator
            .evaluate_at(&rich_set(3, 4), "ev", 7, today())
            .await;
        // 15 documents
        assert_eq!(report.scores.content_quality, 6.5);
        assert!(report.rater_fallback);
    }

    #[tokio::test]
    async fn test_deterministic() {
        let set = rich_set(2, 3);
        let evaluator = QualityEvaluator::default().with_rater(Arc::new(FixedRater(6.2)));
        let a = evaluator.evaluate_at(&set, "ev", 30, today()).await;
        let b = evaluator.evaluate_at(&set, "ev", 30, today()).await;
        assert_eq!(a, b);
        for (_, score) in a.scores.named() {
            assert!((0.0..=10.0).contains(&score));
        }
    }

    #[tokio::test]
    async fn test_timeliness_window_excludes_old() {
        let old = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let set = Aggregator::new(1.0).collect(vec![
            Document::new("a", "https://a.com/1", "x", SourceType::Web).with_publish_date(old),
            Document::new("b", "https://a.com/2", "x", SourceType::Web),
        ]);
        let report = QualityEvaluator::default()
            .evaluate_at(&set, "ev", 7, today())
            .await;
        assert_eq!(report.in_window_count, 1);
    }

    #[test]
    fn test_sample_spreads_categories() {
        let sample = sample_documents(&rich_set(6, 6), 7);
        assert_eq!(sample.len(), 7);
        let first_five: Vec<Option<TopicCategory>> =
            sample.iter().take(5).map(|d| d.category).collect();
        let expected: Vec<Option<TopicCategory>> =
            TopicCategory::REQUIRED.iter().copied().map(Some).collect();
        assert_eq!(first_five, expected);
    }

    #[test]
    fn test_config_validation() {
        assert!(QualityConfig::default().validate().is_ok());
        let mut bad = QualityConfig::default();
        bad.weights.authority = 0.5;
        assert!(bad.validate().is_err());
        let mut bad = QualityConfig::default();
        bad.thresholds.coverage = 11.0;
        assert!(bad.validate().is_err());
    }
}
