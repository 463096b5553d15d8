//! OpenAI-compatible `/chat/completions` client used as both the query
//! generator and the content-quality rater.

use crate::collaborators::{ContentQualityRater, QualityRating, QueryContext, QueryGenerator};
use crate::config::LlmConfig;
use crate::connectors::USER_AGENT;
use crate::error::{ConfigurationError, EvaluationError, QueryGenerationError};
use crate::utils::truncate_chars;
use crate::Document;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

const MIN_QUERY_CHARS: usize = 10;
const MAX_QUERY_CHARS: usize = 120;
const RATING_DIMENSIONS: &[&str] = &["relevance", "depth", "accuracy", "completeness", "value"];

static LIST_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:[-*•]+|\d+\s*[.)]|\(\d+\))\s*").expect("valid list marker regex")
});

static RATING_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^[\s*\-]*\**\s*(overall|relevance|depth|accuracy|completeness|value)\s*\**\s*[:：]\s*\**\s*(\d+(?:\.\d+)?)",
    )
    .expect("valid rating regex")
});

/// Failure of a single completion call, mapped onto the collaborator
/// error types.
#[derive(Debug)]
enum CallError {
    Http(reqwest::Error),
    Status(u16, String),
    Empty,
}

impl From<CallError> for EvaluationError {
    fn from(err: CallError) -> Self {
        match err {
            CallError::Http(e) => EvaluationError::Http(e),
            CallError::Status(code, body) => {
                EvaluationError::Unavailable(format!("chat completions returned {}: {}", code, body))
            }
            CallError::Empty => EvaluationError::InvalidResponse("empty completion".into()),
        }
    }
}

impl From<CallError> for QueryGenerationError {
    fn from(err: CallError) -> Self {
        match err {
            CallError::Http(e) => QueryGenerationError::Http(e),
            CallError::Status(code, body) => QueryGenerationError::Unavailable(format!(
                "chat completions returned {}: {}",
                code, body
            )),
            CallError::Empty => QueryGenerationError::InvalidResponse("empty completion".into()),
        }
    }
}

pub struct ChatCompletionsClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl ChatCompletionsClient {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            model: model.into(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, ConfigurationError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self::new(
            client,
            config.base_url.clone(),
            config.model.clone(),
            config.api_key.clone(),
        ))
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Resolve the chat completions endpoint from the base URL.
    pub fn endpoint(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if base.ends_with("/chat/completions") {
            base.to_string()
        } else if base.ends_with("/v1") {
            format!("{}/chat/completions", base)
        } else {
            format!("{}/v1/chat/completions", base)
        }
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String, CallError> {
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
            "temperature": 0.3,
            "max_tokens": 1024,
        });

        let mut req = self.client.post(self.endpoint()).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let resp = req.send().await.map_err(CallError::Http)?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(CallError::Status(status.as_u16(), truncate_chars(&text, 200)));
        }
        let value: Value = resp.json().await.map_err(CallError::Http)?;
        let content = value
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|arr| arr.first())
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|t| t.as_str())
            .unwrap_or("")
            .trim()
            .to_string();
        if content.is_empty() {
            return Err(CallError::Empty);
        }
        debug!(model = %self.model, chars = content.len(), "chat completion received");
        Ok(content)
    }
}

fn query_prompt(topic: &str, context: Option<&QueryContext>) -> String {
    let mut prompt = format!(
        "Write 5 to 8 web search queries for researching \"{}\". \
         Cover breaking news, technology and products, investment and funding, \
         policy and regulation, and future trends.\n",
        topic
    );
    if let Some(ctx) = context {
        if !ctx.gaps.is_empty() {
            prompt.push_str("\nThe material collected so far has these gaps:\n");
            for gap in &ctx.gaps {
                prompt.push_str(&format!("- {}\n", gap));
            }
            prompt.push_str("Target the gaps.\n");
        }
        if !ctx.prior_queries.is_empty() {
            prompt.push_str("\nDo not repeat any of these queries:\n");
            for q in &ctx.prior_queries {
                prompt.push_str(&format!("- {}\n", q));
            }
        }
    }
    prompt.push_str("\nReply with one query per line and nothing else.");
    prompt
}

fn rating_prompt(sample: &[Document], topic: &str) -> String {
    let mut prompt = format!(
        "Rate how well these documents support a report on \"{}\".\n\n",
        topic
    );
    for (i, doc) in sample.iter().enumerate() {
        let date = doc
            .publish_date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "undated".to_string());
        prompt.push_str(&format!(
            "{}. {} [{} | {}]\n   {}\n",
            i + 1,
            truncate_chars(&doc.title, 100),
            doc.source,
            date,
            truncate_chars(&doc.content, 200)
        ));
    }
    prompt.push_str(
        "\nScore each dimension from 0 to 10, one per line, exactly in this form:\n\
         Relevance: x\nDepth: x\nAccuracy: x\nCompleteness: x\nValue: x\nOverall: x",
    );
    prompt
}

/// One query per line; list markers and quotes stripped, lead-in lines
/// ending in `:` and lengths outside 10..=120 characters dropped,
/// case-insensitive duplicates removed.
pub fn parse_queries(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    text.lines()
        .map(|line| {
            LIST_MARKER
                .replace(line, "")
                .trim()
                .trim_matches(|c| c == '"' || c == '\'' || c == '`')
                .trim()
                .to_string()
        })
        .filter(|q| !q.ends_with(':'))
        .filter(|q| (MIN_QUERY_CHARS..=MAX_QUERY_CHARS).contains(&q.chars().count()))
        .filter(|q| seen.insert(q.to_lowercase()))
        .collect()
}

/// Parse `Overall: x` / `<Dimension>: x` lines into a rating.
pub fn parse_rating(text: &str) -> Result<QualityRating, EvaluationError> {
    let mut rating = QualityRating::new();
    for line in text.lines() {
        let Some(caps) = RATING_LINE.captures(line) else {
            continue;
        };
        let dimension = caps[1].to_lowercase();
        if dimension != QualityRating::OVERALL && !RATING_DIMENSIONS.contains(&dimension.as_str())
        {
            continue;
        }
        if let Ok(score) = caps[2].parse::<f64>() {
            rating.insert(dimension, score);
        }
    }
    if rating.is_empty() {
        return Err(EvaluationError::InvalidResponse(format!(
            "no scores found in: {}",
            truncate_chars(text, 120)
        )));
    }
    Ok(rating)
}

#[async_trait]
impl QueryGenerator for ChatCompletionsClient {
    async fn generate_queries(
        &self,
        topic: &str,
        context: Option<&QueryContext>,
    ) -> Result<Vec<String>, QueryGenerationError> {
        let reply = self
            .complete(
                "You are a research assistant who writes precise search engine queries.",
                &query_prompt(topic, context),
            )
            .await?;
        let queries = parse_queries(&reply);
        if queries.is_empty() {
            return Err(QueryGenerationError::InvalidResponse(
                "no usable queries in reply".into(),
            ));
        }
        Ok(queries)
    }
}

#[async_trait]
impl ContentQualityRater for ChatCompletionsClient {
    async fn rate_relevance(
        &self,
        sample: &[Document],
        topic: &str,
    ) -> Result<QualityRating, EvaluationError> {
        if sample.is_empty() {
            return Err(EvaluationError::InvalidResponse("empty sample".into()));
        }
        let reply = self
            .complete(
                "You are a strict research editor grading source material.",
                &rating_prompt(sample, topic),
            )
            .await?;
        parse_rating(&reply)
    }
}
