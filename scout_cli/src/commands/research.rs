use crate::cli::{Cli, OutputFormat};
use crate::commands::{create_service, Result};
use crate::output::{format_output, pretty, OutputData};

pub async fn run(
    cli: &Cli,
    topic: &str,
    days_back: Option<u32>,
    max_iterations: Option<u32>,
    sources: &[String],
    no_llm: bool,
) -> Result<()> {
    let mut service = create_service(cli)?;
    if no_llm {
        service = service.without_collaborators();
    }
    tracing::debug!(
        topic,
        collaborators = service.has_collaborators(),
        "starting research"
    );

    let mut options = service.research_options();
    if let Some(d) = days_back {
        options.days_back = service.config().clamp_days(d);
    }
    if let Some(n) = max_iterations {
        options.max_iterations = n;
    }
    if !sources.is_empty() {
        options.sources = Some(sources.to_vec());
    }

    let spinner = super::search::spinner(cli, &[topic.to_string()]);
    let outcome = service.research(topic, options).await;
    if let Some(s) = spinner {
        s.finish_and_clear();
    }
    let outcome = outcome?;

    match cli.output {
        OutputFormat::Pretty => print!("{}", pretty::format_research_outcome(&outcome)),
        _ => format_output(&OutputData::Research(outcome), &cli.output)?,
    }

    Ok(())
}
