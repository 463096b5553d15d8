use crate::error::BackendError;
use crate::federated::SourceType;
use crate::utils;
use crate::{BackendAdapter, RawResult};
use async_trait::async_trait;
use chrono::NaiveDate;
use feed_rs::parser;
use futures::future::join_all;
use reqwest::Client;
use serde_json::json;
use std::io::Cursor;
use tracing::debug;

/// Feeds used when the config lists none.
pub const DEFAULT_FEEDS: &[&str] = &[
    "https://feeds.bbci.co.uk/news/technology/rss.xml",
    "https://www.theverge.com/rss/index.xml",
    "https://techcrunch.com/feed/",
    "https://feeds.arstechnica.com/arstechnica/index",
];

pub struct RssBackend {
    client: Client,
    feeds: Vec<String>,
}

impl RssBackend {
    pub fn new(client: Client, feeds: Vec<String>) -> Self {
        let feeds = if feeds.is_empty() {
            DEFAULT_FEEDS.iter().map(|s| s.to_string()).collect()
        } else {
            feeds
        };
        Self { client, feeds }
    }

    async fn fetch_and_parse(&self, url: &str) -> Result<feed_rs::model::Feed, BackendError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::from_status(
                &format!("rss {}", url),
                status.as_u16(),
                "",
            ));
        }
        let bytes = response.bytes().await?;
        parser::parse(Cursor::new(bytes))
            .map_err(|e| BackendError::permanent(format!("Failed to parse feed {}: {}", url, e)))
    }
}

/// Entries whose title or summary contains every query token, inside the
/// date window. Undated entries are kept.
pub fn matching_entries(
    feed: &feed_rs::model::Feed,
    query: &str,
    since: NaiveDate,
) -> Vec<RawResult> {
    let tokens: Vec<String> = query
        .split_whitespace()
        .map(|t| t.to_lowercase())
        .collect();
    let feed_title = feed.title.as_ref().map(|t| t.content.clone());

    feed.entries
        .iter()
        .filter_map(|entry| {
            let title = entry.title.as_ref().map(|t| t.content.clone())?;
            let summary = entry
                .summary
                .as_ref()
                .map(|s| s.content.clone())
                .or_else(|| entry.content.as_ref().and_then(|c| c.body.clone()))
                .unwrap_or_default();

            let haystack = format!("{} {}", title, summary).to_lowercase();
            if !tokens.iter().all(|t| haystack.contains(t.as_str())) {
                return None;
            }
            let published = entry.published.or(entry.updated);
            if let Some(ts) = published {
                if ts.date_naive() < since {
                    return None;
                }
            }
            let link = entry.links.first().map(|l| l.href.clone());
            let authors: Vec<String> = entry.authors.iter().map(|p| p.name.clone()).collect();
            Some(json!({
                "title": title,
                "link": link,
                "summary": summary,
                "published": published.map(|ts| ts.to_rfc3339()),
                "authors": authors,
                "source": feed_title,
            }))
        })
        .collect()
}

#[async_trait]
impl BackendAdapter for RssBackend {
    fn name(&self) -> &str {
        "rss"
    }

    fn description(&self) -> &str {
        "Configured RSS/Atom news feeds filtered by query keywords"
    }

    fn category(&self) -> SourceType {
        SourceType::News
    }

    fn is_available(&self) -> bool {
        !self.feeds.is_empty()
    }

    async fn fetch(
        &self,
        query: &str,
        max_results: usize,
        days_back: u32,
    ) -> Result<Vec<RawResult>, BackendError> {
        let since = utils::window_start(utils::today(), days_back);
        let fetches = self.feeds.iter().map(|url| self.fetch_and_parse(url));
        let outcomes = join_all(fetches).await;

        let mut results = Vec::new();
        let mut last_error = None;
        let mut succeeded = 0usize;
        for (url, outcome) in self.feeds.iter().zip(outcomes) {
            match outcome {
                Ok(feed) => {
                    succeeded += 1;
                    results.extend(matching_entries(&feed, query, since));
                }
                Err(e) => {
                    debug!(feed = %url, error = %e, "feed fetch failed");
                    last_error = Some(e);
                }
            }
        }

        if succeeded == 0 {
            let detail = last_error
                .map(|e| e.message().to_string())
                .unwrap_or_else(|| "no feeds configured".to_string());
            return Err(BackendError::transient(format!(
                "all {} feeds failed: {}",
                self.feeds.len(),
                detail
            )));
        }

        results.truncate(max_results);
        Ok(results)
    }
}
