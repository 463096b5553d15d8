use crate::cli::{Cli, ConfigAction, OutputFormat};
use crate::commands::{load_config, CommandError, Result};
use crate::output::{format_output, OutputData};
use owo_colors::OwoColorize;
use scout_core::ScoutConfig;
use std::path::PathBuf;

pub async fn run(cli: &Cli, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => show_config(cli),
        ConfigAction::Path => {
            println!("{}", config_path(cli).display());
            Ok(())
        }
        ConfigAction::Init { force } => init_config(cli, force),
    }
}

fn config_path(cli: &Cli) -> PathBuf {
    cli.config.clone().unwrap_or_else(ScoutConfig::default_path)
}

fn show_config(cli: &Cli) -> Result<()> {
    let config = load_config(cli)?.redacted();
    let path = config_path(cli);

    match cli.output {
        OutputFormat::Pretty => {
            println!();
            println!("{}", "Effective Configuration".bold().cyan());
            println!("{}", "=======================".cyan());
            println!();
            let state = if path.exists() {
                "".to_string()
            } else {
                " (not created yet, showing defaults)".dimmed().to_string()
            };
            println!("Config file: {}{}", path.display().dimmed(), state);
            println!();
            println!("{}", config.to_toml_string()?);
        }
        _ => format_output(&OutputData::Config(config), &cli.output)?,
    }
    Ok(())
}

fn init_config(cli: &Cli, force: bool) -> Result<()> {
    let path = config_path(cli);
    if path.exists() && !force {
        return Err(CommandError::InvalidInput(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )));
    }

    ScoutConfig::default().save(&path)?;
    println!("{} Wrote {}", "✓".green().bold(), path.display());
    println!(
        "Add API keys under {} or export them, e.g. {}",
        "[credentials]".cyan(),
        "TAVILY_API_KEY".cyan()
    );
    Ok(())
}
