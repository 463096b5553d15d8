//! Pretty formatter for terminal output.
//!
//! Results render as numbered cards: bold title, clickable link, a short
//! dimmed snippet and one line of metadata. Summaries go last so the eye
//! settles on them.

use super::{terminal_width, truncate_text};
use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, ContentArrangement, Table};
use owo_colors::OwoColorize;
use scout_core::refinement::RefinementOutcome;
use scout_core::{Document, SearchResult};

/// Indent for card content (after number)
const CARD_INDENT: usize = 6;

/// Cards shown after a research run; the rest is in `--output json`.
const RESEARCH_CARDS: usize = 15;

// ============================================================================
// Public API
// ============================================================================

pub fn format_search_result(result: &SearchResult) -> String {
    let width = terminal_width();
    let mut output = String::new();

    output.push_str(&format_section_header(
        "results",
        Some(result.total_count),
        width,
    ));
    output.push('\n');
    if result.documents.is_empty() {
        output.push_str(&format!("      {}\n", "No documents found.".yellow()));
    }
    output.push_str(&format_cards(&result.documents, width));
    output.push('\n');

    output.push_str(&format!(
        "{} {} from {} in {} ms ({} queries)\n",
        "Found".bold(),
        result.total_count.to_string().green().bold(),
        join_or_dash(&result.sources_used).cyan(),
        result.execution_time_ms,
        result.query_count
    ));

    let meta = &result.metadata;
    if meta.fallback_used {
        output.push_str(&format!("{}\n", "Fallback backends were used".dimmed()));
    }
    if !meta.skipped_backends.is_empty() {
        output.push_str(&format!(
            "{} {}\n",
            "Skipped:".yellow(),
            meta.skipped_backends
                .iter()
                .map(|s| s.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ));
    }
    for failure in &meta.failed_backends {
        output.push_str(&format!("{} {}\n", "Failed:".red(), failure));
    }
    if meta.deadline_expired {
        output.push_str(&format!(
            "{}\n",
            "Batch deadline expired; unfinished searches were abandoned".yellow()
        ));
    }
    output
}

pub fn format_research_outcome(outcome: &RefinementOutcome) -> String {
    let width = terminal_width();
    let mut output = String::new();
    let report = &outcome.report;

    output.push_str(&format_section_header(&outcome.topic, None, width));
    output.push_str("\n\n");

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(width as u16)
        .set_header(vec!["Round", "Queries", "Failed", "New", "Total", "Score"]);
    for record in &outcome.history {
        table.add_row(vec![
            Cell::new(record.iteration),
            Cell::new(record.queries.len()),
            Cell::new(record.failed_tasks),
            Cell::new(record.documents_added),
            Cell::new(record.total_documents),
            Cell::new(format!("{:.2}", record.composite)),
        ]);
    }
    output.push_str(&format!("{}\n\n", table));

    output.push_str(&format!("{}\n", "Quality".bold().cyan()));
    for (name, score) in report.scores.named() {
        output.push_str(&format!(
            "  {:<16} {}\n",
            name.dimmed(),
            format_score(score, 6.0)
        ));
    }
    output.push_str(&format!(
        "  {:<16} {}\n",
        "composite".bold(),
        format_score(report.composite, 7.0)
    ));
    if report.rater_fallback {
        output.push_str(&format!(
            "  {}\n",
            "content quality estimated from volume".dimmed()
        ));
    }

    if !report.gaps.is_empty() {
        output.push_str(&format!("\n{}\n", "Remaining gaps".bold().yellow()));
        for gap in &report.gaps {
            output.push_str(&format!("  {} {}\n", "•".dimmed(), gap));
        }
    }
    output.push('\n');

    let shown = outcome.documents.len().min(RESEARCH_CARDS);
    output.push_str(&format_section_header(
        "top documents",
        Some(outcome.documents.len()),
        width,
    ));
    output.push('\n');
    output.push_str(&format_cards(
        &outcome.documents.documents()[..shown],
        width,
    ));
    if outcome.documents.len() > shown {
        output.push_str(&format!(
            "      {}\n",
            format!(
                "... {} more (use --output json for all)",
                outcome.documents.len() - shown
            )
            .dimmed()
        ));
    }
    output.push('\n');

    if !outcome.failures.is_empty() {
        output.push_str(&format!(
            "{} {} backend call(s) failed\n",
            "Note:".yellow(),
            outcome.failures.len()
        ));
    }
    let verdict = if report.sufficient {
        "sufficient".green().bold().to_string()
    } else {
        "not sufficient".yellow().bold().to_string()
    };
    output.push_str(&format!(
        "Stopped after {} round(s): {}. Collection is {}.\n",
        outcome.iterations, outcome.stop_reason, verdict
    ));
    output
}

// ============================================================================
// Card Formatting
// ============================================================================

fn format_cards(documents: &[Document], width: usize) -> String {
    let mut output = String::new();
    for (i, doc) in documents.iter().enumerate() {
        output.push_str(&format_card(doc, i + 1, width));
        if i + 1 < documents.len() {
            output.push('\n');
        }
    }
    output
}

fn format_card(doc: &Document, index: usize, width: usize) -> String {
    let mut output = String::new();
    let indent = " ".repeat(CARD_INDENT);
    let content_width = width.saturating_sub(CARD_INDENT + 2).max(20);

    let index_str = format!(" {:>3}. ", index).cyan().bold().to_string();
    output.push_str(&format!("{}{}\n", index_str, doc.title.bold()));

    if !doc.url.is_empty() {
        let hyperlink = format_hyperlink(&doc.url, &doc.url);
        output.push_str(&format!("{}{}\n", indent, hyperlink.blue()));
    }

    let snippet = clean_snippet(&doc.content);
    if !snippet.is_empty() {
        output.push_str(&format!(
            "{}{}\n",
            indent,
            truncate_text(&snippet, content_width * 2).dimmed()
        ));
    }

    let meta = meta_line(doc);
    if !meta.is_empty() {
        output.push_str(&format!("{}{}\n", indent, meta.dimmed()));
    }
    output
}

fn meta_line(doc: &Document) -> String {
    let mut parts = vec![format!("{} ({})", doc.source, doc.source_type)];
    if let Some(date) = doc.publish_date {
        parts.push(date.to_string());
    }
    match doc.authors.len() {
        0 => {}
        1..=3 => parts.push(doc.authors.join(", ")),
        n => parts.push(format!("{} et al. ({} authors)", doc.authors[0], n)),
    }
    if let Some(venue) = &doc.venue {
        parts.push(venue.clone());
    }
    if let Some(category) = doc.category {
        parts.push(category.to_string());
    }
    if let Some(score) = doc.relevance_score {
        parts.push(format!("score {:.2}", score));
    }
    parts.join(" · ")
}

fn format_score(score: f64, threshold: f64) -> String {
    let text = format!("{:>5.2}", score);
    if score >= threshold {
        text.green().to_string()
    } else {
        text.yellow().to_string()
    }
}

fn join_or_dash(items: &[String]) -> String {
    if items.is_empty() {
        "-".to_string()
    } else {
        items.join(", ")
    }
}

fn clean_snippet(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ============================================================================
// Section Headers
// ============================================================================

fn format_section_header(label: &str, count: Option<usize>, width: usize) -> String {
    let count_str = match count {
        Some(n) => format!(" ({} results)", n),
        None => String::new(),
    };

    let header_text = format!("{}{}", label, count_str);
    let line_len = (width.saturating_sub(header_text.chars().count() + 4)).min(60);
    let line = "─".repeat(line_len);

    format!(
        "{} {} {}",
        "──".cyan(),
        header_text.green().bold(),
        line.cyan()
    )
}

/// Format a URL as a clickable hyperlink using OSC 8 escape sequences.
fn format_hyperlink(url: &str, display_text: &str) -> String {
    format!("\x1b]8;;{}\x07{}\x1b]8;;\x07", url, display_text)
}
