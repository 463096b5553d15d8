use crate::cli::OutputFormat;
use crate::commands::Result;
use scout_core::refinement::RefinementOutcome;
use scout_core::{CollectorInfo, ScoutConfig, SearchResult};
use serde::Serialize;

pub mod pretty;

/// Terminal width for formatting (default fallback)
const DEFAULT_WIDTH: usize = 80;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum OutputData {
    SearchResult(SearchResult),
    Research(RefinementOutcome),
    Backends(Vec<CollectorInfo>),
    Config(ScoutConfig),
}

/// Machine-readable output. Pretty output is rendered by each command.
pub fn format_output(data: &OutputData, format: &OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(data)?);
        }
        OutputFormat::Yaml => {
            println!("{}", serde_yaml::to_string(data)?);
        }
        OutputFormat::Pretty => {
            // commands print their own pretty view; this is the generic dump
            println!("{}", serde_yaml::to_string(data)?);
        }
    }
    Ok(())
}

pub fn terminal_width() -> usize {
    terminal_size::terminal_size()
        .map(|(w, _)| w.0 as usize)
        .unwrap_or(DEFAULT_WIDTH)
}

/// Truncate to `max_width` characters, adding "..." if truncated.
pub fn truncate_text(text: &str, max_width: usize) -> String {
    if text.chars().count() <= max_width {
        text.to_string()
    } else if max_width > 3 {
        let head: String = text.chars().take(max_width - 3).collect();
        format!("{}...", head)
    } else {
        text.chars().take(max_width).collect()
    }
}
