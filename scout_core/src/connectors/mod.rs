//! Concrete search backends and the field mapping they share.
//!
//! Each backend lives in its own module behind a cargo feature. Adapters
//! return provider items as raw JSON; [`normalize_document`] maps the
//! common field spellings onto [`Document`].

#[cfg(feature = "arxiv")]
pub mod arxiv;
#[cfg(feature = "brave")]
pub mod brave_search;
#[cfg(feature = "google")]
pub mod google_search;
#[cfg(feature = "newsapi")]
pub mod newsapi;
#[cfg(feature = "rss")]
pub mod rss;
#[cfg(feature = "semantic-scholar")]
pub mod semantic_scholar;
#[cfg(feature = "tavily")]
pub mod tavily_search;

use crate::error::BackendError;
use crate::federated::{Document, SourceType};
use crate::utils::{self, MAX_CONTENT_CHARS};
use chrono::NaiveDate;
use serde_json::Value;

pub const USER_AGENT: &str = concat!("scout/", env!("CARGO_PKG_VERSION"));

const TITLE_KEYS: &[&str] = &["title", "name", "headline"];
const URL_KEYS: &[&str] = &["url", "link", "html_url", "pdf_url"];
const CONTENT_KEYS: &[&str] = &[
    "content",
    "summary",
    "abstract",
    "description",
    "snippet",
    "text",
];
const DATE_KEYS: &[&str] = &[
    "publish_date",
    "published_date",
    "published",
    "publishedAt",
    "publication_date",
    "date",
    "page_age",
    "year",
];
const VENUE_KEYS: &[&str] = &["venue", "journal", "source"];
const SCORE_KEYS: &[&str] = &["score", "relevance_score"];

/// Map one raw provider item onto a [`Document`].
///
/// Returns `None` when the item has neither a usable URL nor a title.
pub fn normalize_document(source: &str, source_type: SourceType, raw: &Value) -> Option<Document> {
    let title = first_str(raw, TITLE_KEYS)
        .map(|t| utils::strip_html(&t))
        .filter(|t| !t.is_empty());
    let url = first_str(raw, URL_KEYS)
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty() && u != "#")
        .unwrap_or_default();

    if title.is_none() && url.is_empty() {
        return None;
    }

    let mut doc = Document::new(
        title.unwrap_or_else(|| "Untitled".to_string()),
        url,
        source,
        source_type,
    );

    if let Some(content) = first_str(raw, CONTENT_KEYS) {
        let cleaned = utils::strip_html(&content);
        doc = doc.with_content(utils::truncate_chars(&cleaned, MAX_CONTENT_CHARS));
    }
    if let Some(date) = extract_date(raw) {
        doc = doc.with_publish_date(date);
    }
    let authors = extract_authors(raw);
    if !authors.is_empty() {
        doc = doc.with_authors(authors);
    }
    if let Some(venue) = extract_venue(raw) {
        doc = doc.with_venue(venue);
    }
    if let Some(score) = SCORE_KEYS
        .iter()
        .find_map(|k| raw.get(*k).and_then(|v| v.as_f64()))
    {
        doc = doc.with_relevance_score(score as f32);
    }
    Some(doc)
}

fn first_str(raw: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| {
        raw.get(*k)
            .and_then(|v| v.as_str())
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
    })
}

fn extract_date(raw: &Value) -> Option<NaiveDate> {
    DATE_KEYS.iter().find_map(|k| match raw.get(*k)? {
        Value::String(s) => utils::parse_date(s),
        Value::Number(n) => n.as_i64().and_then(|y| utils::year_start(y as i32)),
        _ => None,
    })
}

fn extract_authors(raw: &Value) -> Vec<String> {
    match raw.get("authors").or_else(|| raw.get("author")) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|a| match a {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Object(_) => a.get("name").and_then(|n| n.as_str()).map(|s| s.trim().to_string()),
                _ => None,
            })
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}

fn extract_venue(raw: &Value) -> Option<String> {
    VENUE_KEYS.iter().find_map(|k| match raw.get(*k)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        v @ Value::Object(_) => v
            .get("name")
            .and_then(|n| n.as_str())
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.trim().to_string()),
        _ => None,
    })
}

/// Build the HTTP client adapters share. Per-call timeouts are enforced by
/// the execution engine, so none is set here.
pub fn http_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder().user_agent(USER_AGENT).build()
}

/// Read a JSON reply, classifying non-success statuses.
pub(crate) async fn read_json(
    backend: &str,
    response: reqwest::Response,
) -> Result<Value, BackendError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(BackendError::from_status(backend, status.as_u16(), &body));
    }
    let text = response.text().await?;
    Ok(serde_json::from_str(&text)?)
}

/// Items of the first array found under one of `keys`.
pub(crate) fn take_array(value: &Value, keys: &[&str], max: usize) -> Vec<Value> {
    keys.iter()
        .find_map(|k| value.get(*k).and_then(|v| v.as_array()))
        .map(|arr| arr.iter().take(max).cloned().collect())
        .unwrap_or_default()
}

pub(crate) fn missing_key(backend: &str, env_var: &str) -> BackendError {
    BackendError::permanent(format!(
        "{} is not configured: set {} or add it to the config file",
        backend, env_var
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_web_result() {
        let raw = json!({
            "title": "EV sales <b>surge</b>",
            "url": "https://example.com/ev",
            "content": "<p>Sales rose 20% &amp; more.</p>",
            "score": 0.82,
            "published_date": "2024-05-01T08:00:00Z"
        });
        let doc = normalize_document("tavily", SourceType::Web, &raw).unwrap();
        assert_eq!(doc.title, "EV sales surge");
        assert_eq!(doc.content, "Sales rose 20% & more.");
        assert_eq!(doc.relevance_score, Some(0.82));
        assert_eq!(doc.publish_date, NaiveDate::from_ymd_opt(2024, 5, 1));
        assert_eq!(doc.source, "tavily");
    }

    #[test]
    fn test_normalize_academic_result() {
        let raw = json!({
            "name": "Attention Is All You Need",
            "link": "#",
            "abstract": "We propose the Transformer.",
            "authors": [{"name": "A. Vaswani"}, {"name": "N. Shazeer"}],
            "venue": {"name": "NeurIPS"},
            "year": 2017
        });
        let doc = normalize_document("semantic-scholar", SourceType::Academic, &raw).unwrap();
        assert_eq!(doc.url, "");
        assert_eq!(doc.authors, vec!["A. Vaswani", "N. Shazeer"]);
        assert_eq!(doc.venue.as_deref(), Some("NeurIPS"));
        assert_eq!(doc.publish_date, NaiveDate::from_ymd_opt(2017, 1, 1));
    }

    #[test]
    fn test_normalize_defaults_and_rejects() {
        let untitled = normalize_document(
            "brave",
            SourceType::Web,
            &json!({"link": "https://a.com", "author": "Jane Doe"}),
        )
        .unwrap();
        assert_eq!(untitled.title, "Untitled");
        assert_eq!(untitled.authors, vec!["Jane Doe"]);

        assert!(normalize_document("brave", SourceType::Web, &json!({"snippet": "x"})).is_none());
    }

    #[test]
    fn test_content_is_capped() {
        let long = "a".repeat(MAX_CONTENT_CHARS + 100);
        let doc = normalize_document(
            "brave",
            SourceType::Web,
            &json!({"title": "t", "description": long}),
        )
        .unwrap();
        assert_eq!(doc.content.chars().count(), MAX_CONTENT_CHARS);
    }

    #[test]
    fn test_take_array() {
        let v = json!({"articles": [1, 2, 3]});
        assert_eq!(take_array(&v, &["results", "articles"], 2).len(), 2);
        assert!(take_array(&v, &["results"], 5).is_empty());
    }
}
