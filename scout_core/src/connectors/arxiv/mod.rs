use crate::error::BackendError;
use crate::federated::SourceType;
use crate::utils;
use crate::{BackendAdapter, RawResult};
use async_trait::async_trait;
use chrono::NaiveDate;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use url::Url;

const ENDPOINT: &str = "http://export.arxiv.org/api/query";

#[derive(Debug, Default, Deserialize, Serialize, Clone, PartialEq)]
pub struct ArxivEntry {
    pub id: String,
    pub title: String,
    pub summary: String,
    pub authors: Vec<String>,
    pub published: String,
    pub categories: Vec<String>,
    pub abs_url: Option<String>,
    pub pdf_url: Option<String>,
    pub journal_ref: Option<String>,
}

impl ArxivEntry {
    fn published_date(&self) -> Option<NaiveDate> {
        utils::parse_date(&self.published)
    }

    fn into_raw(self) -> RawResult {
        let url = self
            .abs_url
            .clone()
            .unwrap_or_else(|| format!("https://arxiv.org/abs/{}", self.id));
        json!({
            "id": self.id,
            "title": self.title,
            "summary": self.summary,
            "url": url,
            "pdf_url": self.pdf_url,
            "authors": self.authors,
            "published": self.published,
            "categories": self.categories,
            "journal": self.journal_ref.unwrap_or_else(|| "arXiv".to_string()),
        })
    }
}

pub struct ArxivBackend {
    client: Client,
}

impl ArxivBackend {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn build_url(query: &str, max_results: usize) -> Result<Url, BackendError> {
        let mut url = Url::parse(ENDPOINT)
            .map_err(|e| BackendError::permanent(format!("Failed to parse URL: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("search_query", &format!("all:{}", query))
            .append_pair("start", "0")
            // over-fetch: entries outside the date window are dropped afterwards
            .append_pair("max_results", &(max_results * 3).to_string())
            .append_pair("sortBy", "submittedDate")
            .append_pair("sortOrder", "descending");
        Ok(url)
    }
}

/// Parse an arXiv Atom reply into entries.
pub fn parse_feed(xml_content: &str) -> Result<Vec<ArxivEntry>, BackendError> {
    let mut reader = Reader::from_str(xml_content);
    reader.trim_text(true);

    let mut entries = Vec::new();
    let mut current: Option<ArxivEntry> = None;
    let mut current_tag: Option<String> = None;
    let mut buffer = Vec::new();

    loop {
        match reader.read_event_into(&mut buffer) {
            Ok(Event::Start(ref e)) => {
                let tag_name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                match tag_name.as_str() {
                    "entry" => current = Some(ArxivEntry::default()),
                    "id" | "title" | "summary" | "published" | "name" | "arxiv:journal_ref"
                        if current.is_some() =>
                    {
                        current_tag = Some(tag_name);
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(ref e)) => {
                if let (Some(tag), Some(entry)) = (current_tag.as_deref(), current.as_mut()) {
                    let text = e
                        .unescape()
                        .map_err(|err| BackendError::permanent(format!("arXiv XML: {}", err)))?
                        .to_string();
                    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
                    match tag {
                        "id" => {
                            entry.id = text
                                .trim_start_matches("http://arxiv.org/abs/")
                                .trim_start_matches("https://arxiv.org/abs/")
                                .to_string()
                        }
                        "title" => entry.title = text,
                        "summary" => entry.summary = text,
                        "published" => entry.published = text,
                        "name" => entry.authors.push(text),
                        "arxiv:journal_ref" => entry.journal_ref = Some(text),
                        _ => {}
                    }
                }
            }
            Ok(Event::Empty(ref e)) => {
                let tag_name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                let Some(entry) = current.as_mut() else {
                    buffer.clear();
                    continue;
                };
                let attr = |key: &str| {
                    e.attributes()
                        .filter_map(Result::ok)
                        .find(|a| a.key.as_ref() == key.as_bytes())
                        .map(|a| String::from_utf8_lossy(&a.value).to_string())
                };
                if tag_name == "link" {
                    let href = attr("href").unwrap_or_default();
                    match (attr("rel").as_deref(), attr("title").as_deref()) {
                        (_, Some("pdf")) => entry.pdf_url = Some(href),
                        (Some("alternate"), _) => entry.abs_url = Some(href),
                        _ => {}
                    }
                } else if tag_name == "category" {
                    if let Some(term) = attr("term") {
                        entry.categories.push(term);
                    }
                }
            }
            Ok(Event::End(ref e)) => {
                let tag_name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if tag_name == "entry" {
                    if let Some(entry) = current.take() {
                        entries.push(entry);
                    }
                } else if current_tag.as_deref() == Some(tag_name.as_str()) {
                    current_tag = None;
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(BackendError::permanent(format!("arXiv XML: {}", e))),
            _ => {}
        }
        buffer.clear();
    }

    Ok(entries)
}

/// Keep entries published on or after `since` (undated entries stay).
fn select_entries(entries: Vec<ArxivEntry>, since: NaiveDate, max_results: usize) -> Vec<RawResult> {
    entries
        .into_iter()
        .filter(|e| e.published_date().map_or(true, |d| d >= since))
        .take(max_results)
        .map(ArxivEntry::into_raw)
        .collect()
}

#[async_trait]
impl BackendAdapter for ArxivBackend {
    fn name(&self) -> &str {
        "arxiv"
    }

    fn description(&self) -> &str {
        "arXiv preprints, newest submissions first"
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
        let url = Self::build_url(query, max_results)?;
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::from_status(self.name(), status.as_u16(), &body));
        }

        let content = response.text().await?;
        let entries = parse_feed(&content)?;
        let since = utils::window_start(utils::today(), days_back);
        Ok(select_entries(entries, since, max_results))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::normalize_document;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom" xmlns:arxiv="http://arxiv.org/schemas/atom">
  <title>ArXiv Query</title>
  <id>http://arxiv.org/api/abc</id>
  <entry>
    <id>http://arxiv.org/abs/2405.00001v1</id>
    <published>2024-05-01T17:59:59Z</published>
    <title>Fast Charging of
      Solid-State Batteries</title>
    <summary>We study &amp; model charging.</summary>
    <author><name>Ada Lovelace</name></author>
    <author><name>Alan Turing</name></author>
    <arxiv:journal_ref>J. Power Sources 1 (2024)</arxiv:journal_ref>
    <link href="http://arxiv.org/abs/2405.00001v1" rel="alternate" type="text/html"/>
    <link title="pdf" href="http://arxiv.org/pdf/2405.00001v1" rel="related" type="application/pdf"/>
    <category term="physics.app-ph" scheme="http://arxiv.org/schemas/atom"/>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/2301.00002v2</id>
    <published>2023-01-02T00:00:00Z</published>
    <title>Old Paper</title>
    <summary>Old.</summary>
    <author><name>Grace Hopper</name></author>
  </entry>
</feed>"#;

    #[test]
    fn test_parse_feed() {
        let entries = parse_feed(FEED).unwrap();
        assert_eq!(entries.len(), 2);
        let first = &entries[0];
        assert_eq!(first.id, "2405.00001v1");
        assert_eq!(first.title, "Fast Charging of Solid-State Batteries");
        assert_eq!(first.summary, "We study & model charging.");
        assert_eq!(first.authors, vec!["Ada Lovelace", "Alan Turing"]);
        assert_eq!(
            first.pdf_url.as_deref(),
            Some("http://arxiv.org/pdf/2405.00001v1")
        );
        assert_eq!(first.categories, vec!["physics.app-ph"]);
        // the feed-level <id> must not leak into an entry
        assert_eq!(entries[1].id, "2301.00002v2");
    }

    #[test]
    fn test_select_entries_applies_window() {
        let entries = parse_feed(FEED).unwrap();
        let since = NaiveDate::from_ymd_opt(2024, 4, 24).unwrap();
        let raw = select_entries(entries, since, 5);
        assert_eq!(raw.len(), 1);

        let doc = normalize_document("arxiv", SourceType::Academic, &raw[0]).unwrap();
        assert_eq!(doc.url, "http://arxiv.org/abs/2405.00001v1");
        assert_eq!(doc.venue.as_deref(), Some("J. Power Sources 1 (2024)"));
        assert_eq!(doc.publish_date, NaiveDate::from_ymd_opt(2024, 5, 1));
        assert_eq!(doc.authors.len(), 2);
    }

    #[test]
    fn test_build_url() {
        let url = ArxivBackend::build_url("solid state battery", 5).unwrap();
        let s = url.to_string();
        assert!(s.contains("search_query=all%3Asolid+state+battery"));
        assert!(s.contains("max_results=15"));
        assert!(s.contains("sortBy=submittedDate"));
    }
}
