use crate::connectors::{missing_key, read_json};
use crate::error::BackendError;
use crate::federated::SourceType;
use crate::{BackendAdapter, RawResult};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

const ENDPOINT: &str = "https://api.search.brave.com/res/v1/web/search";

pub struct BraveSearchBackend {
    client: Client,
    api_key: Option<String>,
}

impl BraveSearchBackend {
    pub fn new(client: Client, api_key: Option<String>) -> Self {
        Self {
            client,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        }
    }
}

/// Brave only knows day, week, month and year windows.
fn freshness(days_back: u32) -> &'static str {
    match days_back {
        0..=1 => "pd",
        2..=7 => "pw",
        8..=31 => "pm",
        _ => "py",
    }
}

fn parse_results(value: &Value, max_results: usize) -> Vec<RawResult> {
    value
        .get("web")
        .and_then(|w| w.get("results"))
        .and_then(|r| r.as_array())
        .map(|arr| arr.iter().take(max_results).cloned().collect())
        .unwrap_or_default()
}

#[async_trait]
impl BackendAdapter for BraveSearchBackend {
    fn name(&self) -> &str {
        "brave"
    }

    fn description(&self) -> &str {
        "Brave Search API: independent web index"
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
            .ok_or_else(|| missing_key(self.name(), "BRAVE_SEARCH_API_KEY"))?;

        let count = max_results.clamp(1, 20).to_string();
        let resp = self
            .client
            .get(ENDPOINT)
            .header("Accept", "application/json")
            .header("X-Subscription-Token", key)
            .query(&[
                ("q", query),
                ("count", count.as_str()),
                ("freshness", freshness(days_back)),
            ])
            .send()
            .await?;
        let value = read_json(self.name(), resp).await?;
        Ok(parse_results(&value, max_results))
    }
}
