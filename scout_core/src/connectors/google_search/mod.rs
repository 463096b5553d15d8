use crate::connectors::{missing_key, read_json, take_array};
use crate::error::BackendError;
use crate::federated::SourceType;
use crate::{BackendAdapter, RawResult};
use async_trait::async_trait;
use reqwest::Client;

const ENDPOINT: &str = "https://www.googleapis.com/customsearch/v1";

/// The Custom Search API refuses `num` above 10.
const MAX_PER_CALL: usize = 10;

pub struct GoogleSearchBackend {
    client: Client,
    api_key: Option<String>,
    cx: Option<String>,
}

impl GoogleSearchBackend {
    pub fn new(client: Client, api_key: Option<String>, cx: Option<String>) -> Self {
        Self {
            client,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            cx: cx.filter(|k| !k.trim().is_empty()),
        }
    }

    fn build_url(key: &str, cx: &str, query: &str, num: usize, days_back: u32) -> String {
        format!(
            "{}?key={}&cx={}&q={}&num={}&dateRestrict=d{}",
            ENDPOINT,
            urlencoding::encode(key),
            urlencoding::encode(cx),
            urlencoding::encode(query),
            num,
            days_back.max(1)
        )
    }
}

#[async_trait]
impl BackendAdapter for GoogleSearchBackend {
    fn name(&self) -> &str {
        "google"
    }

    fn description(&self) -> &str {
        "Google Custom Search JSON API (needs an API key and a search engine id)"
    }

    fn category(&self) -> SourceType {
        SourceType::Web
    }

    fn requires_api_key(&self) -> bool {
        true
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some() && self.cx.is_some()
    }

    async fn fetch(
        &self,
        query: &str,
        max_results: usize,
        days_back: u32,
    ) -> Result<Vec<RawResult>, BackendError> {
        let (Some(key), Some(cx)) = (self.api_key.as_deref(), self.cx.as_deref()) else {
            return Err(missing_key(
                self.name(),
                "GOOGLE_SEARCH_API_KEY and GOOGLE_SEARCH_CX",
            ));
        };

        let num = max_results.clamp(1, MAX_PER_CALL);
        let url = Self::build_url(key, cx, query, num, days_back);
        let resp = self.client.get(&url).send().await?;
        let value = read_json(self.name(), resp).await?;
        Ok(take_array(&value, &["items"], max_results.min(MAX_PER_CALL)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::normalize_document;
    use serde_json::json;

    #[test]
    fn test_needs_both_credentials() {
        let only_key = GoogleSearchBackend::new(Client::new(), Some("k".into()), None);
        assert!(!only_key.is_available());
        let both = GoogleSearchBackend::new(Client::new(), Some("k".into()), Some("cx".into()));
        assert!(both.is_available());
    }

    #[test]
    fn test_build_url() {
        let url = GoogleSearchBackend::build_url("k", "c x", "ev & charging", 10, 7);
        assert!(url.contains("q=ev%20%26%20charging"));
        assert!(url.contains("cx=c%20x"));
        assert!(url.ends_with("&num=10&dateRestrict=d7"));
    }

    #[test]
    fn test_parse_items() {
        let reply = json!({
            "items": [
                {"title": "Charging networks expand", "link": "https://news.example.org/c", "snippet": "More chargers."}
            ]
        });
        let items = take_array(&reply, &["items"], 10);
        let doc = normalize_document("google", SourceType::Web, &items[0]).unwrap();
        assert_eq!(doc.url, "https://news.example.org/c");
        assert_eq!(doc.content, "More chargers.");
    }
}
