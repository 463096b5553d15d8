use crate::cli::{Cli, OutputFormat, SourceTypeArg};
use crate::commands::{create_service, CommandError, Result};
use crate::output::{format_output, pretty, OutputData};
use indicatif::{ProgressBar, ProgressStyle};
use scout_core::SourceType;
use std::time::Duration;

/// Flags of `scout search` after clap parsing.
pub struct SearchArgs<'a> {
    pub queries: &'a [String],
    pub sources: &'a [String],
    pub max_results: Option<usize>,
    pub days_back: Option<u32>,
    pub workers: Option<usize>,
    pub source_type: Option<SourceTypeArg>,
    pub fallback: &'a [String],
}

pub async fn run(cli: &Cli, args: SearchArgs<'_>) -> Result<()> {
    if !args.fallback.is_empty() && args.sources.is_empty() {
        return Err(CommandError::InvalidInput(
            "--fallback needs the primary backends given with -s/--sources".to_string(),
        ));
    }

    let service = create_service(cli)?;

    let mut request = service.request(args.queries.iter().cloned());
    if let Some(n) = args.max_results {
        request = request.with_max_results(n);
    }
    if let Some(d) = args.days_back {
        request = request.with_days_back(d);
    }
    if let Some(w) = args.workers {
        request = request.with_max_workers(w);
    }
    if let Some(t) = args.source_type {
        request = request.with_source_type(SourceType::from(t));
    }

    let spinner = spinner(cli, args.queries);

    let result = if args.fallback.is_empty() {
        if !args.sources.is_empty() {
            request = request.with_sources(args.sources.iter().cloned());
        }
        service.search(request).await
    } else {
        service
            .search_with_fallback(request, args.sources.to_vec(), args.fallback.to_vec())
            .await
    };
    if let Some(s) = spinner {
        s.finish_and_clear();
    }
    let result = result?;

    match cli.output {
        OutputFormat::Pretty => print!("{}", pretty::format_search_result(&result)),
        _ => format_output(&OutputData::SearchResult(result), &cli.output)?,
    }

    Ok(())
}

/// Spinner on stderr for pretty output only, so piped JSON stays clean.
pub(crate) fn spinner(cli: &Cli, queries: &[String]) -> Option<ProgressBar> {
    if cli.output != OutputFormat::Pretty {
        return None;
    }
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        spinner.set_style(style);
    }
    let label = match queries {
        [one] => format!("'{}'", one),
        many => format!("{} queries", many.len()),
    };
    spinner.set_message(format!("Searching for {}...", label));
    spinner.enable_steady_tick(Duration::from_millis(100));
    Some(spinner)
}
