use scout_core::connectors::arxiv::ArxivBackend;
use scout_core::connectors::http_client;
use scout_core::BackendAdapter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // arXiv needs no API key
    let backend = ArxivBackend::new(http_client()?);
    println!("Initialized backend: {} ({})", backend.name(), backend.category());

    println!("\nSearching for papers about 'quantum error correction' (last 90 days)...");
    let raw = backend.fetch("quantum error correction", 5, 90).await?;

    let papers: Vec<_> = raw.iter().filter_map(|r| backend.normalize(r)).collect();
    println!("\nFound {} papers:", papers.len());
    for (i, paper) in papers.iter().enumerate() {
        println!("{}. {}", i + 1, paper.title);
        println!("   URL: {}", paper.url);
        if let Some(date) = paper.publish_date {
            println!("   Published: {}", date);
        }
        if !paper.authors.is_empty() {
            println!("   Authors: {}", paper.authors.join(", "));
        }
    }

    Ok(())
}
