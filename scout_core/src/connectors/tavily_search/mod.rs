use crate::connectors::{missing_key, read_json, take_array};
use crate::error::BackendError;
use crate::federated::SourceType;
use crate::{BackendAdapter, RawResult};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

const ENDPOINT: &str = "https://api.tavily.com/search";

pub struct TavilySearchBackend {
    client: Client,
    api_key: Option<String>,
}

impl TavilySearchBackend {
    pub fn new(client: Client, api_key: Option<String>) -> Self {
        Self {
            client,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        }
    }

    fn request_body(key: &str, query: &str, max_results: usize, days_back: u32) -> Value {
        json!({
            "api_key": key,
            "query": query,
            "topic": "general",
            "search_depth": "basic",
            "max_results": max_results,
            "days": days_back,
            "include_answer": false,
            "include_images": false
        })
    }
}

#[async_trait]
impl BackendAdapter for TavilySearchBackend {
    fn name(&self) -> &str {
        "tavily"
    }

    fn description(&self) -> &str {
        "Tavily Search API: blended web search with extracted page content"
    }

    fn category(&self) -> SourceType {
        SourceType::Web
    }

    fn requires_api_key(&self) -> bool {
        true
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn fetch(
        &self,
        query: &str,
        max_results: usize,
        days_back: u32,
    ) -> Result<Vec<RawResult>, BackendError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| missing_key(self.name(), "TAVILY_API_KEY"))?;

        let resp = self
            .client
            .post(ENDPOINT)
            .json(&Self::request_body(key, query, max_results, days_back))
            .send()
            .await?;
        let value = read_json(self.name(), resp).await?;
        Ok(take_array(&value, &["results"], max_results))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::normalize_document;

    #[test]
    fn test_unavailable_without_key() {
        let backend = TavilySearchBackend::new(Client::new(), Some("  ".into()));
        assert!(!backend.is_available());
        assert!(backend.info().api_key_required);
    }

    #[test]
    fn test_request_body() {
        let body = TavilySearchBackend::request_body("k", "ev batteries", 5, 7);
        assert_eq!(body["max_results"], 5);
        assert_eq!(body["days"], 7);
        assert_eq!(body["query"], "ev batteries");
    }

    #[test]
    fn test_parse_reply() {
        let reply = json!({
            "answer": null,
            "results": [
                {"title": "EV news", "url": "https://a.com/1", "content": "x", "score": 0.9},
                {"title": "More EV news", "url": "https://b.com/2", "content": "y", "score": 0.5},
                {"title": "Extra", "url": "https://c.com/3", "content": "z", "score": 0.1}
            ]
        });
        let items = take_array(&reply, &["results"], 2);
        assert_eq!(items.len(), 2);
        let doc = normalize_document("tavily", SourceType::Web, &items[0]).unwrap();
        assert_eq!(doc.relevance_score, Some(0.9));
    }
}
