use scout_core::{ScoutConfig, SearchService};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let topic = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "electric vehicles".to_string());

    // Keys come from the config file or the usual environment variables
    let config = ScoutConfig::load(None)?;
    let service = SearchService::from_config(config)?;

    println!("Backends:");
    for info in service.collector_info() {
        let state = if info.is_available { "ready" } else { "not configured" };
        println!("  - {} [{}]: {}", info.name, info.category, state);
    }

    println!("\nResearching '{}'...", topic);
    let mut options = service.research_options();
    options.max_iterations = 3;
    let outcome = service.research(&topic, options).await?;

    println!(
        "\nStopped after {} iteration(s): {}",
        outcome.iterations, outcome.stop_reason
    );
    println!(
        "Composite quality {:.2} ({})",
        outcome.report.composite,
        outcome.documents.summary()
    );
    for gap in &outcome.report.gaps {
        println!("  gap: {}", gap);
    }

    for (i, doc) in outcome.documents.documents().iter().take(10).enumerate() {
        println!("{}. {} [{}]", i + 1, doc.title, doc.source);
        println!("   {}", doc.url);
    }

    Ok(())
}
