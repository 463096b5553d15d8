//! Core types shared by every stage of a search: documents, the
//! de-duplicated document set, and the category enums.

use crate::utils;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::str::FromStr;

/// Broad kind of backend a document came from.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    #[default]
    Web,
    Academic,
    News,
}

impl SourceType {
    pub const ALL: [SourceType; 3] = [SourceType::Web, SourceType::Academic, SourceType::News];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Web => "web",
            SourceType::Academic => "academic",
            SourceType::News => "news",
        }
    }

    /// Best guess for a backend name the registry does not know.
    pub fn for_backend_name(name: &str) -> Self {
        let name = name.to_lowercase();
        if name.contains("arxiv") || name.contains("academic") || name.starts_with("semantic") {
            SourceType::Academic
        } else if name.contains("news") || name.contains("rss") {
            SourceType::News
        } else {
            SourceType::Web
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "web" => Ok(SourceType::Web),
            "academic" => Ok(SourceType::Academic),
            "news" => Ok(SourceType::News),
            other => Err(format!(
                "unknown source type '{}' (expected web, academic or news)",
                other
            )),
        }
    }
}

/// Topical category a query (and the documents it found) targets.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TopicCategory {
    Breaking,
    Innovation,
    Investment,
    Policy,
    Trend,
    Perspective,
}

/// Keyword table checked in order; the first hit decides.
const CATEGORY_KEYWORDS: &[(TopicCategory, &[&str])] = &[
    (
        TopicCategory::Perspective,
        &["controversy", "criticism", "challenge", "risk", "alternative"],
    ),
    (
        TopicCategory::Investment,
        &["investment", "funding", "valuation"],
    ),
    (TopicCategory::Policy, &["policy", "regulation", "law"]),
    (
        TopicCategory::Innovation,
        &["technology", "innovation", "product"],
    ),
    (TopicCategory::Trend, &["trend", "development", "future"]),
];

impl TopicCategory {
    /// Categories a document set must cover to be considered complete.
    pub const REQUIRED: [TopicCategory; 5] = [
        TopicCategory::Breaking,
        TopicCategory::Innovation,
        TopicCategory::Investment,
        TopicCategory::Policy,
        TopicCategory::Trend,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TopicCategory::Breaking => "breaking",
            TopicCategory::Innovation => "innovation",
            TopicCategory::Investment => "investment",
            TopicCategory::Policy => "policy",
            TopicCategory::Trend => "trend",
            TopicCategory::Perspective => "perspective",
        }
    }

    /// Keyword match against free text, `None` when nothing matches.
    pub fn detect(text: &str) -> Option<Self> {
        let text = text.to_lowercase();
        CATEGORY_KEYWORDS
            .iter()
            .find(|(_, words)| words.iter().any(|w| text.contains(w)))
            .map(|(cat, _)| *cat)
    }

    /// Category of a free-form query; anything unmatched is breaking news.
    pub fn classify(query: &str) -> Self {
        Self::detect(query).unwrap_or(TopicCategory::Breaking)
    }
}

impl fmt::Display for TopicCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized search hit.
///
/// Everything except the relevance score is fixed when the adapter builds
/// the document; pipeline stages pass documents along by value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub title: String,

    /// Body, abstract or snippet with markup stripped
    #[serde(default)]
    pub content: String,

    #[serde(default)]
    pub url: String,

    /// Backend name
    pub source: String,

    pub source_type: SourceType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish_date: Option<NaiveDate>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,

    /// Journal, conference or publishing site
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevance_score: Option<f32>,

    /// Category targeted by the query that found this document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<TopicCategory>,
}

impl Document {
    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        source: impl Into<String>,
        source_type: SourceType,
    ) -> Self {
        Self {
            title: title.into(),
            content: String::new(),
            url: url.into(),
            source: source.into(),
            source_type,
            publish_date: None,
            authors: Vec::new(),
            venue: None,
            relevance_score: None,
            category: None,
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn with_publish_date(mut self, date: NaiveDate) -> Self {
        self.publish_date = Some(date);
        self
    }

    pub fn with_authors(mut self, authors: Vec<String>) -> Self {
        self.authors = authors;
        self
    }

    pub fn with_venue(mut self, venue: impl Into<String>) -> Self {
        self.venue = Some(venue.into());
        self
    }

    pub fn with_relevance_score(mut self, score: f32) -> Self {
        self.relevance_score = Some(score);
        self
    }

    pub fn with_category(mut self, category: Option<TopicCategory>) -> Self {
        if category.is_some() {
            self.category = category;
        }
        self
    }

    /// Key for exact de-duplication: the normalized URL, or the lower-cased
    /// title when the document has no URL.
    pub fn dedup_key(&self) -> String {
        if self.url.trim().is_empty() {
            format!("title:{}", self.title.trim().to_lowercase())
        } else {
            utils::normalize_url(&self.url)
        }
    }

    pub fn domain(&self) -> Option<String> {
        utils::domain_of(&self.url)
    }

    /// Category recorded by the query, else one detected from the title.
    pub fn effective_category(&self) -> Option<TopicCategory> {
        self.category
            .or_else(|| TopicCategory::detect(&self.title))
    }

    pub(crate) fn is_identifiable(&self) -> bool {
        !self.url.trim().is_empty() || !self.title.trim().is_empty()
    }
}

/// One (query, backend) unit of work for the execution engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchTask {
    pub query: String,
    pub backend: String,
    pub max_results: usize,
    pub days_back: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<TopicCategory>,
}

impl SearchTask {
    pub fn new(
        query: impl Into<String>,
        backend: impl Into<String>,
        max_results: usize,
        days_back: u32,
    ) -> Self {
        Self {
            query: query.into(),
            backend: backend.into(),
            max_results,
            days_back,
            category: None,
        }
    }

    pub fn with_category(mut self, category: Option<TopicCategory>) -> Self {
        self.category = category;
        self
    }
}

/// An ordered, de-duplicated collection of documents plus provenance.
///
/// Sets are never edited in place; every merge builds a new one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentSet {
    pub(crate) documents: Vec<Document>,
    pub(crate) sources_used: BTreeSet<String>,
    /// Distinct queries issued, as [`utils::query_key`]s
    pub(crate) queries: BTreeSet<String>,
    pub(crate) execution_time_ms: u64,
}

impl DocumentSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn into_documents(self) -> Vec<Document> {
        self.documents
    }

    pub fn sources_used(&self) -> &BTreeSet<String> {
        &self.sources_used
    }

    pub fn query_count(&self) -> usize {
        self.queries.len()
    }

    pub fn queries(&self) -> &BTreeSet<String> {
        &self.queries
    }

    pub fn execution_time_ms(&self) -> u64 {
        self.execution_time_ms
    }

    pub fn with_execution_time_ms(mut self, ms: u64) -> Self {
        self.execution_time_ms = ms;
        self
    }

    pub fn dedup_keys(&self) -> HashSet<String> {
        self.documents.iter().map(Document::dedup_key).collect()
    }

    /// Documents per effective category. Uncategorized documents are omitted.
    pub fn count_by_category(&self) -> BTreeMap<TopicCategory, usize> {
        let mut counts = BTreeMap::new();
        for doc in &self.documents {
            if let Some(cat) = doc.effective_category() {
                *counts.entry(cat).or_insert(0) += 1;
            }
        }
        counts
    }

    pub fn count_by_source_type(&self) -> BTreeMap<SourceType, usize> {
        let mut counts = BTreeMap::new();
        for doc in &self.documents {
            *counts.entry(doc.source_type).or_insert(0) += 1;
        }
        counts
    }

    pub fn count_by_source(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for doc in &self.documents {
            *counts.entry(doc.source.clone()).or_insert(0) += 1;
        }
        counts
    }

    pub fn distinct_domains(&self) -> BTreeSet<String> {
        self.documents.iter().filter_map(Document::domain).collect()
    }

    /// A new set holding only documents of one source type, order kept.
    pub fn filter_by_source_type(&self, source_type: SourceType) -> DocumentSet {
        let documents: Vec<Document> = self
            .documents
            .iter()
            .filter(|d| d.source_type == source_type)
            .cloned()
            .collect();
        let sources_used = documents.iter().map(|d| d.source.clone()).collect();
        DocumentSet {
            documents,
            sources_used,
            queries: self.queries.clone(),
            execution_time_ms: self.execution_time_ms,
        }
    }

    /// One-line human summary, e.g. `12 documents from 3 sources (web: 8, news: 4)`.
    pub fn summary(&self) -> String {
        let by_type = self
            .count_by_source_type()
            .iter()
            .map(|(t, n)| format!("{}: {}", t, n))
            .collect::<Vec<_>>()
            .join(", ");
        if by_type.is_empty() {
            format!("0 documents from {} sources", self.sources_used.len())
        } else {
            format!(
                "{} documents from {} sources ({})",
                self.len(),
                self.sources_used.len(),
                by_type
            )
        }
    }
}
