use data_loader::DataIndex;
use std::path::PathBuf;
use std::time::Instant;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let data_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("data/catalog"));

    println!("Loading storage exports from {}...\n", data_dir.display());

    let start = Instant::now();
    let index = DataIndex::load_from_files(&data_dir)?;
    let elapsed = start.elapsed();

    let (movies, users, ratings, edges) = index.counts();

    println!("\n=== Load Complete ===");
    println!("Time taken: {:?}", elapsed);
    println!("Movies: {}", movies);
    println!("Users: {}", users);
    println!("Ratings: {}", ratings);
    println!("Similarity edges: {}", edges);
    println!(
        "\nPerformance: {:.0} ratings/second",
        ratings as f64 / elapsed.as_secs_f64()
    );
    Ok(())
}
