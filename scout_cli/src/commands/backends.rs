use crate::cli::{Cli, OutputFormat};
use crate::commands::{create_service, Result};
use crate::output::{format_output, terminal_width, truncate_text, OutputData};
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, ContentArrangement, Table};
use owo_colors::OwoColorize;

pub async fn run(cli: &Cli) -> Result<()> {
    let service = create_service(cli)?;
    let backends = service.collector_info();

    if backends.is_empty() {
        println!("{}", "No backends compiled into this build".yellow());
        return Ok(());
    }

    match cli.output {
        OutputFormat::Pretty => {
            let term_width = terminal_width();
            let desc_width = term_width.saturating_sub(50);

            println!("{}", "Search Backends".bold().cyan());
            println!();

            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .apply_modifier(UTF8_ROUND_CORNERS)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_width(term_width as u16)
                .set_header(vec!["Name", "Type", "Status", "Description"]);

            for info in &backends {
                let status = match (info.is_available, info.api_key_required) {
                    (true, true) => "ready (key set)",
                    (true, false) => "ready",
                    (false, true) => "needs API key",
                    (false, false) => "unavailable",
                };
                table.add_row(vec![
                    info.name.clone(),
                    info.category.to_string(),
                    status.to_string(),
                    truncate_text(&info.description, desc_width.max(30)),
                ]);
            }

            println!("{}", table);
            println!();
            let ready = backends.iter().filter(|b| b.is_available).count();
            println!(
                "{} {} of {} backends ready. Keys go in {} or the environment.",
                "Tip:".green().bold(),
                ready,
                backends.len(),
                "scout config path".cyan()
            );
        }
        _ => format_output(&OutputData::Backends(backends), &cli.output)?,
    }

    Ok(())
}
