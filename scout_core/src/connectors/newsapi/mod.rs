use crate::connectors::{missing_key, read_json};
use crate::error::BackendError;
use crate::federated::SourceType;
use crate::utils;
use crate::{BackendAdapter, RawResult};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

const ENDPOINT: &str = "https://newsapi.org/v2/everything";

pub struct NewsApiBackend {
    client: Client,
    api_key: Option<String>,
}

impl NewsApiBackend {
    pub fn new(client: Client, api_key: Option<String>) -> Self {
        Self {
            client,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        }
    }
}

/// NewsAPI reports some failures as `200 {"status": "error"}`.
fn parse_articles(value: &Value, max_results: usize) -> Result<Vec<RawResult>, BackendError> {
    if value.get("status").and_then(|s| s.as_str()) == Some("error") {
        let code = value.get("code").and_then(|c| c.as_str()).unwrap_or("error");
        let message = value
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown error");
        let msg = format!("newsapi {}: {}", code, message);
        return Err(if code == "rateLimited" {
            BackendError::Transient(msg)
        } else {
            BackendError::Permanent(msg)
        });
    }
    Ok(value
        .get("articles")
        .and_then(|a| a.as_array())
        .map(|arr| {
            arr.iter()
                // removed articles keep their slot with placeholder text
                .filter(|a| a.get("title").and_then(|t| t.as_str()) != Some("[Removed]"))
                .take(max_results)
                .cloned()
                .collect()
        })
        .unwrap_or_default())
}

#[async_trait]
impl BackendAdapter for NewsApiBackend {
    fn name(&self) -> &str {
        "newsapi"
    }

    fn description(&self) -> &str {
        "NewsAPI.org: articles from news outlets and blogs, newest first"
    }

    fn category(&self) -> SourceType {
        SourceType::News
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
            .ok_or_else(|| missing_key(self.name(), "NEWSAPI_KEY"))?;

        let from = utils::ymd_string(utils::window_start(utils::today(), days_back));
        let page_size = max_results.clamp(1, 100).to_string();
        let resp = self
            .client
            .get(ENDPOINT)
            .header("X-Api-Key", key)
            .query(&[
                ("q", query),
                ("from", from.as_str()),
                ("sortBy", "publishedAt"),
                ("language", "en"),
                ("pageSize", page_size.as_str()),
            ])
            .send()
            .await?;
        let value = read_json(self.name(), resp).await?;
        parse_articles(&value, max_results)
    }
}
