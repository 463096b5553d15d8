use crate::connectors::read_json;
use crate::error::BackendError;
use crate::federated::SourceType;
use crate::utils;
use crate::{BackendAdapter, RawResult};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde_json::{json, Value};

const ENDPOINT: &str = "https://api.semanticscholar.org/graph/v1/paper/search";
const FIELDS: &str = "paperId,title,abstract,url,venue,year,publicationDate,authors,citationCount,externalIds";
const MAX_LIMIT_PER_REQUEST: usize = 100;

pub struct SemanticScholarBackend {
    client: Client,
    api_key: Option<String>,
}

impl SemanticScholarBackend {
    pub fn new(client: Client, api_key: Option<String>) -> Self {
        Self {
            client,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        }
    }

    fn build_search_url(query: &str, limit: usize, since: NaiveDate) -> String {
        format!(
            "{}?query={}&limit={}&fields={}&publicationDateOrYear={}:",
            ENDPOINT,
            urlencoding::encode(query),
            limit.clamp(1, MAX_LIMIT_PER_REQUEST),
            FIELDS,
            utils::ymd_string(since)
        )
    }
}

/// Flatten a Graph API paper into the shared field names.
fn paper_to_raw(paper: &Value) -> RawResult {
    let url = paper
        .get("url")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .or_else(|| {
            paper
                .get("externalIds")
                .and_then(|ids| ids.get("DOI"))
                .and_then(|v| v.as_str())
                .map(|doi| format!("https://doi.org/{}", doi))
        });
    json!({
        "paperId": paper.get("paperId"),
        "title": paper.get("title"),
        "abstract": paper.get("abstract"),
        "url": url,
        "venue": paper.get("venue"),
        "publication_date": paper.get("publicationDate"),
        "year": paper.get("year"),
        "authors": paper.get("authors"),
        "citationCount": paper.get("citationCount"),
    })
}

fn parse_papers(value: &Value, max_results: usize) -> Vec<RawResult> {
    value
        .get("data")
        .and_then(|d| d.as_array())
        .map(|arr| arr.iter().take(max_results).map(paper_to_raw).collect())
        .unwrap_or_default()
}

#[async_trait]
impl BackendAdapter for SemanticScholarBackend {
    fn name(&self) -> &str {
        "semantic-scholar"
    }

    fn description(&self) -> &str {
        "Semantic Scholar academic graph (API key optional, raises rate limits)"
    }

    fn category(&self) -> SourceType {
        SourceType::Academic
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn fetch(
        &self,
        query: &str,
        max_results: usize,
        days_back: u32,
    ) -> Result<Vec<RawResult>, BackendError> {
        let since = utils::window_start(utils::today(), days_back);
        let url = Self::build_search_url(query, max_results, since);
        let mut request = self.client.get(&url);
        if let Some(api_key) = &self.api_key {
            request = request.header("x-api-key", api_key);
        }

        let response = request.send().await?;
        let value = read_json(self.name(), response).await?;
        Ok(parse_papers(&value, max_results))
    }
}
