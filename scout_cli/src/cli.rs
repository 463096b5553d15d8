use clap::{Parser, Subcommand, ValueEnum};
use scout_core::SourceType;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "scout")]
#[command(about = "Scout - multi-source search aggregation and iterative research")]
#[command(version)]
#[command(after_help = "\x1b[1;36mQuick Start:\x1b[0m
  scout backends                          Show backends and whether they are configured
  scout search \"solid state batteries\"    Search every configured backend
  scout research \"electric vehicles\"      Search until the collection is good enough

\x1b[1;36mConfiguration:\x1b[0m
  scout config init                       Write a default config file
  scout config show                       View the effective configuration
  TAVILY_API_KEY=... scout search ...     Keys can also come from the environment")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Output format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Pretty)]
    pub output: OutputFormat,

    /// Config file (defaults to the platform config dir)
    #[arg(long, global = true, env = "SCOUT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Verbose output (-v debug for scout, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Search one or more queries across every usable backend
    ///
    /// Each query is sent to each selected backend concurrently. Results are
    /// normalized, de-duplicated and ranked; failing backends are reported
    /// but never abort the search.
    #[command(after_help = "\x1b[1;33mExamples:\x1b[0m
  scout search \"ev charging\" \"ev battery recycling\"
  scout search \"crispr\" -s arxiv,semantic-scholar -n 10 -d 90
  scout search \"rate cuts\" --type news
  scout search \"heat pumps\" -s newsapi --fallback rss")]
    Search {
        /// One or more queries
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,

        /// Comma-separated backends to use (default: all configured)
        #[arg(short = 's', long = "sources", value_delimiter = ',')]
        sources: Vec<String>,

        /// Maximum results per query per backend
        #[arg(short = 'n', long = "max-results")]
        max_results: Option<usize>,

        /// Only keep results from the last N days
        #[arg(short = 'd', long = "days")]
        days_back: Option<u32>,

        /// Concurrent backend calls
        #[arg(short = 'w', long = "workers")]
        workers: Option<usize>,

        /// Restrict to one kind of backend
        #[arg(long = "type", value_enum)]
        source_type: Option<SourceTypeArg>,

        /// Backends to try when the primary sources return too little
        #[arg(long, value_delimiter = ',')]
        fallback: Vec<String>,
    },

    /// Research a topic: search, score the collection, refine, repeat
    #[command(after_help = "\x1b[1;33mExamples:\x1b[0m
  scout research \"electric vehicles\"
  scout research \"sodium ion batteries\" -d 30 --max-iterations 3
  scout research \"grid storage\" --no-llm --output json")]
    Research {
        /// Topic to research
        topic: String,

        /// Only keep results from the last N days
        #[arg(short = 'd', long = "days")]
        days_back: Option<u32>,

        /// Upper bound on search rounds
        #[arg(long)]
        max_iterations: Option<u32>,

        /// Comma-separated backends to use (default: all configured)
        #[arg(short = 's', long = "sources", value_delimiter = ',')]
        sources: Vec<String>,

        /// Use templates and heuristics even when a model is configured
        #[arg(long)]
        no_llm: bool,
    },

    /// List compiled-in backends and whether they can be called
    #[command(alias = "ls")]
    Backends,

    /// Inspect or create the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigAction {
    /// Show the effective configuration with secrets masked
    Show,
    /// Print the config file location
    Path,
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable formatted output
    Pretty,
    /// JSON output
    Json,
    /// YAML output
    Yaml,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum SourceTypeArg {
    Web,
    Academic,
    News,
}

impl From<SourceTypeArg> for SourceType {
    fn from(arg: SourceTypeArg) -> Self {
        match arg {
            SourceTypeArg::Web => SourceType::Web,
            SourceTypeArg::Academic => SourceType::Academic,
            SourceTypeArg::News => SourceType::News,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_args() {
        let cli = Cli::try_parse_from([
            "scout", "search", "ev", "ev battery", "-s", "arxiv,tavily", "-n", "3", "--type",
            "academic",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Search {
                query,
                sources,
                max_results,
                source_type,
                fallback,
                ..
            }) => {
                assert_eq!(query, vec!["ev", "ev battery"]);
                assert_eq!(sources, vec!["arxiv", "tavily"]);
                assert_eq!(max_results, Some(3));
                assert!(source_type == Some(SourceTypeArg::Academic));
                assert!(fallback.is_empty());
            }
            _ => panic!("expected search"),
        }
    }

    #[test]
    fn test_search_needs_a_query() {
        assert!(Cli::try_parse_from(["scout", "search"]).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["scout", "backends", "--output", "json", "-vv"]).unwrap();
        assert!(cli.output == OutputFormat::Json);
        assert_eq!(cli.verbose, 2);
    }
}
