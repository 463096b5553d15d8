use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

/// Maximum characters kept from a document body.
pub const MAX_CONTENT_CHARS: usize = 4000;

/// Query parameters that only carry click tracking and never change the page.
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "ref", "mc_cid", "mc_eid"];

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid tag regex"));
static WS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

pub fn clean_html_entities(text: &str) -> String {
    let mut cleaned = text.to_string();
    // Try decoding multiple times in case of double-encoding
    for _ in 0..2 {
        let decoded = html_escape::decode_html_entities(&cleaned).into_owned();
        if decoded == cleaned {
            break;
        }
        cleaned = decoded;
    }
    cleaned
}

/// Strip markup, decode entities and collapse whitespace.
pub fn strip_html(text: &str) -> String {
    let without_tags = TAG_RE.replace_all(text, " ");
    let decoded = clean_html_entities(&without_tags);
    WS_RE.replace_all(decoded.trim(), " ").into_owned()
}

/// Truncate to at most `max_chars` characters without splitting a code point.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Parse the date formats providers put in their replies.
///
/// Accepts RFC 3339, RFC 2822, anything starting with `YYYY-MM-DD`
/// (e.g. `2024-05-01T12:00:00` without an offset) and a bare year.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc).date_naive());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc).date_naive());
    }
    if let Some(prefix) = s.get(..10) {
        if let Ok(d) = NaiveDate::parse_from_str(prefix, "%Y-%m-%d") {
            return Some(d);
        }
    }
    if s.len() == 4 {
        if let Ok(year) = s.parse::<i32>() {
            return year_start(year);
        }
    }
    None
}

pub fn year_start(year: i32) -> Option<NaiveDate> {
    if (1000..=9999).contains(&year) {
        NaiveDate::from_ymd_opt(year, 1, 1)
    } else {
        None
    }
}

/// First day of the search window ending today.
pub fn window_start(today: NaiveDate, days_back: u32) -> NaiveDate {
    today - Duration::days(i64::from(days_back))
}

pub fn ymd_string(date: NaiveDate) -> String {
    format!("{:04}-{:02}-{:02}", date.year(), date.month(), date.day())
}

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Canonical form of a URL used as the exact de-duplication key.
///
/// Scheme and host are lower-cased, the fragment and default port dropped,
/// tracking parameters removed, remaining parameters sorted and a trailing
/// slash trimmed. Unparseable input is only trimmed and lower-cased.
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let Ok(url) = Url::parse(trimmed) else {
        return trimmed.trim_end_matches('/').to_lowercase();
    };
    let Some(host) = url.host_str() else {
        return trimmed.trim_end_matches('/').to_lowercase();
    };

    let mut key = format!("{}://{}", url.scheme(), host.to_lowercase());
    // Url::port() is None for the scheme's default port
    if let Some(port) = url.port() {
        key.push_str(&format!(":{}", port));
    }
    key.push_str(url.path().trim_end_matches('/'));

    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| {
            let k = k.to_lowercase();
            !k.starts_with("utm_") && !TRACKING_PARAMS.contains(&k.as_str())
        })
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if !params.is_empty() {
        params.sort();
        let query = params
            .iter()
            .map(|(k, v)| {
                if v.is_empty() {
                    k.clone()
                } else {
                    format!("{}={}", k, v)
                }
            })
            .collect::<Vec<_>>()
            .join("&");
        key.push('?');
        key.push_str(&query);
    }
    key
}

/// Host of a URL without a leading `www.`.
pub fn domain_of(raw: &str) -> Option<String> {
    let url = Url::parse(raw.trim()).ok()?;
    let host = url.host_str()?.to_lowercase();
    Some(host.strip_prefix("www.").unwrap_or(&host).to_string())
}

/// Key two queries share when they ask the same thing: trimmed, lower-cased.
pub fn query_key(query: &str) -> String {
    query.trim().to_lowercase()
}

/// Lower-cased alphanumeric tokens of a title.
pub fn title_tokens(title: &str) -> std::collections::HashSet<String> {
    title
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Token-set Jaccard similarity. Two empty sets are not similar.
pub fn jaccard(
    a: &std::collections::HashSet<String>,
    b: &std::collections::HashSet<String>,
) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    intersection as f64 / union as f64
}
