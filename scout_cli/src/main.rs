use clap::Parser;
use owo_colors::OwoColorize;
use std::process;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod cli;
mod commands;
mod output;

use cli::{Cli, Commands};
use commands::*;

const DEFAULT_FILTER: &str = "scout_cli=info,scout_core=warn";

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(&cli);

    let result = match &cli.command {
        None => show_overview(&cli),
        Some(Commands::Search {
            query,
            sources,
            max_results,
            days_back,
            workers,
            source_type,
            fallback,
        }) => {
            search::run(
                &cli,
                search::SearchArgs {
                    queries: query,
                    sources,
                    max_results: *max_results,
                    days_back: *days_back,
                    workers: *workers,
                    source_type: *source_type,
                    fallback,
                },
            )
            .await
        }
        Some(Commands::Research {
            topic,
            days_back,
            max_iterations,
            sources,
            no_llm,
        }) => research::run(&cli, topic, *days_back, *max_iterations, sources, *no_llm).await,
        Some(Commands::Backends) => backends::run(&cli).await,
        Some(Commands::Config { action }) => config::run(&cli, action.clone()).await,
    };

    if let Err(e) = result {
        eprintln!("{}: {}", "Error".red().bold(), e);
        process::exit(1);
    }
}

/// `SEARCH_LOG_LEVEL` (an `EnvFilter` directive) wins over `-v`; logs go to
/// stderr so structured output on stdout stays parseable.
fn init_logging(cli: &Cli) {
    let filter = match std::env::var("SEARCH_LOG_LEVEL") {
        Ok(directive) if !directive.trim().is_empty() => EnvFilter::try_new(directive.trim())
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
        _ => EnvFilter::new(verbosity_filter(cli.verbose)),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(!cli.no_color),
        )
        .init();
}

fn verbosity_filter(verbose: u8) -> &'static str {
    match verbose {
        0 => DEFAULT_FILTER,
        1 => "scout_cli=debug,scout_core=debug",
        _ => "scout_cli=trace,scout_core=trace",
    }
}

fn show_overview(cli: &Cli) -> commands::Result<()> {
    println!();
    println!(
        "{}  {}",
        "Scout".bold().cyan(),
        "- multi-source search and iterative research".dimmed()
    );
    println!();

    let service = create_service(cli)?;
    let info = service.collector_info();
    let ready = info.iter().filter(|b| b.is_available).count();
    println!(
        "  {} backends compiled in ({} ready, {} need an API key)",
        info.len().to_string().green().bold(),
        ready.to_string().green(),
        (info.len() - ready).to_string().yellow()
    );
    for (source_type, names) in service.available_sources() {
        if !names.is_empty() {
            println!("  {:<9} {}", source_type.to_string().dimmed(), names.join(", ").cyan());
        }
    }
    if service.has_collaborators() {
        println!(
            "  model: {}",
            service.config().llm.model.cyan()
        );
    }
    println!();

    println!("{}", "Quick Start:".bold().cyan());
    println!(
        "  {}{}",
        "scout search \"query\"".cyan(),
        "       Search every ready backend".dimmed()
    );
    println!(
        "  {}{}",
        "scout research \"topic\"".cyan(),
        "     Search, score and refine".dimmed()
    );
    println!(
        "  {}{}",
        "scout backends".cyan(),
        "             Show backend status".dimmed()
    );
    println!();
    println!(
        "{} Use {} for full help",
        "Tip:".dimmed(),
        "scout --help".cyan()
    );
    println!();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_filter() {
        assert_eq!(verbosity_filter(0), DEFAULT_FILTER);
        assert!(verbosity_filter(1).contains("scout_core=debug"));
        assert!(verbosity_filter(5).contains("trace"));
    }
}
