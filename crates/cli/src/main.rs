use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use colored::Colorize;
use data_loader::{DataIndex, MovieId, UserId};
use factorization::{
    BatchSizePolicy, FactorizationConfig, InitMethod, MatrixFactorization, RatingMatrix,
    SparseRatingEncoder,
};
use pipeline::LabeledGroup;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::SeedableRng;
use server::{EngineConfig, RecommendationEngine, SharedEngine};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::info;

/// movie-reco - latent-factor movie recommender with genre-labeled results
#[derive(Parser)]
#[command(name = "movie-reco")]
#[command(about = "Movie recommendations from matrix factorization and content clustering", long_about = None)]
struct Cli {
    /// Directory holding movies.dat, ratings.dat, similarities.dat and features.dat
    #[arg(short, long, default_value = "data/catalog")]
    data_dir: PathBuf,

    /// Model snapshot to read (and, for `train`, to write)
    #[arg(short, long, default_value = "models/latent.json")]
    model: PathBuf,

    /// Engine configuration file (JSON); defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train the latent-factor model on ratings.dat and save a snapshot
    Train {
        #[arg(long, default_value = "20")]
        epochs: usize,

        /// Latent dimension
        #[arg(long, default_value = "8")]
        k: usize,

        /// Factor initialization: "svd" or "random"
        #[arg(long, default_value = "random")]
        init: String,

        /// Batch size: "full", "auto" or a number of users
        #[arg(long, default_value = "50", value_parser = parse_batch_size)]
        batch_size: BatchSizePolicy,

        #[arg(long, default_value = "0.1")]
        alpha: f64,

        #[arg(long, default_value = "0.01")]
        lambda: f64,

        /// Train without user and item biases
        #[arg(long)]
        no_biases: bool,

        #[arg(long, default_value = "42")]
        seed: u64,

        /// Continue from the existing snapshot at --model
        #[arg(long)]
        resume: bool,

        /// Save only what inference needs
        #[arg(long)]
        compact: bool,
    },

    /// Recommend for a stored user or for an ad-hoc list of ratings
    Recommend {
        /// Stored user to recommend for
        #[arg(long, conflicts_with = "rate")]
        user_id: Option<UserId>,

        /// Ad-hoc rating as MOVIE_ID:SCORE (repeatable)
        #[arg(long, value_parser = parse_rating)]
        rate: Vec<(MovieId, f32)>,

        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Show the precomputed neighbors of a movie
    Similar {
        #[arg(long)]
        movie_id: MovieId,

        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// Sample popular, well-rated movies for a user to rate
    Evaluate {
        #[arg(long)]
        user_id: UserId,

        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// Run benchmark to test performance
    Benchmark {
        /// Number of requests to make
        #[arg(long, default_value = "100")]
        requests: usize,

        /// Number of concurrent requests
        #[arg(long, default_value = "10")]
        concurrent: usize,

        #[arg(long, default_value = "20")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Train {
            epochs,
            k,
            init,
            batch_size,
            alpha,
            lambda,
            no_biases,
            seed,
            resume,
            compact,
        } => {
            let init_method: InitMethod = init.parse()?;
            let config = FactorizationConfig::default()
                .with_k(k)
                .with_init_method(init_method)
                .with_batch_size(batch_size)
                .with_alpha(alpha)
                .with_lambda(lambda)
                .with_biases(!no_biases);
            let options = TrainOptions {
                epochs,
                seed,
                resume,
                compact,
            };
            handle_train(&cli.data_dir, &cli.model, config, options)?
        }
        Commands::Recommend {
            user_id,
            rate,
            limit,
        } => {
            let engine = load_engine(&cli.data_dir, &cli.model, cli.config.as_deref())?;
            handle_recommend(&engine, user_id, &rate, limit)?
        }
        Commands::Similar { movie_id, limit } => {
            let engine = load_engine(&cli.data_dir, &cli.model, cli.config.as_deref())?;
            handle_similar(&engine, movie_id, limit)
        }
        Commands::Evaluate { user_id, limit } => {
            let engine = load_engine(&cli.data_dir, &cli.model, cli.config.as_deref())?;
            handle_evaluate(&engine, user_id, limit)?
        }
        Commands::Benchmark {
            requests,
            concurrent,
            limit,
        } => {
            let engine = load_engine(&cli.data_dir, &cli.model, cli.config.as_deref())?;
            handle_benchmark(engine, requests, concurrent, limit).await?
        }
    }

    Ok(())
}

fn parse_rating(s: &str) -> std::result::Result<(MovieId, f32), String> {
    let (id, score) = s
        .split_once(':')
        .ok_or_else(|| format!("expected MOVIE_ID:SCORE, got '{}'", s))?;
    let id: MovieId = id
        .trim()
        .parse()
        .map_err(|_| format!("invalid movie id '{}'", id))?;
    let score: f32 = score
        .trim()
        .parse()
        .map_err(|_| format!("invalid score '{}'", score))?;
    if !data_loader::is_valid_score(score) {
        return Err(format!("score must be one of 0.5, 1.0, ..., 5.0, got {}", score));
    }
    Ok((id, score))
}

fn parse_batch_size(s: &str) -> std::result::Result<BatchSizePolicy, String> {
    match s.to_ascii_lowercase().as_str() {
        "full" => Ok(BatchSizePolicy::Full),
        "auto" => Ok(BatchSizePolicy::Auto),
        other => other
            .parse::<usize>()
            .map(BatchSizePolicy::Fixed)
            .map_err(|_| format!("expected 'full', 'auto' or a number, got '{}'", s)),
    }
}

fn load_engine(data_dir: &Path, model: &Path, config: Option<&Path>) -> Result<RecommendationEngine> {
    let config = match config {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("Failed to load engine config from {}", path.display()))?,
        None => EngineConfig::default(),
    };

    println!("Loading catalog from {}...", data_dir.display());
    let start = Instant::now();
    let engine = RecommendationEngine::from_paths(data_dir, model, config)
        .context("Failed to build recommendation engine")?;
    println!("{} Engine ready in {:?}", "✓".green(), start.elapsed());
    Ok(engine)
}

struct TrainOptions {
    epochs: usize,
    seed: u64,
    resume: bool,
    compact: bool,
}

/// Offline training job: ratings.dat -> users x items matrix -> snapshot
fn handle_train(
    data_dir: &Path,
    output: &Path,
    config: FactorizationConfig,
    options: TrainOptions,
) -> Result<()> {
    let index = DataIndex::load_from_files(data_dir).context("Failed to load dataset")?;

    // Users are rows in ascending id order
    let user_ids = index.get_all_user_ids();
    let n_items = index.max_movie_id() as usize;
    let observations: Vec<(usize, MovieId, f32)> = user_ids
        .iter()
        .enumerate()
        .flat_map(|(row, &user_id)| {
            index
                .get_user_ratings(user_id)
                .iter()
                .map(move |r| (row, r.movie_id, r.score))
        })
        .collect();
    let x = SparseRatingEncoder::new(n_items)
        .encode_matrix(observations, user_ids.len())
        .context("Failed to encode rating matrix")?;
    info!(users = x.rows(), items = x.cols(), observed = x.nnz(), "Built rating matrix");

    let mut mf = MatrixFactorization::new(config)?;
    if options.resume {
        mf.restore(output)
            .with_context(|| format!("Failed to resume from {}", output.display()))?;
        info!(epochs = mf.epochs(), "Resuming training");
    }

    let mut rng = StdRng::seed_from_u64(options.seed);
    let start = Instant::now();
    mf.train(&x, options.epochs, &mut rng)?;
    println!(
        "{} Trained {} epochs ({} total) in {:?}",
        "✓".green(),
        options.epochs,
        mf.epochs(),
        start.elapsed()
    );

    let rmse = training_rmse(&mf, &x)?;
    println!("Training RMSE: {:.4}", rmse);

    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    if options.compact {
        mf.save_compact(output)?;
    } else {
        mf.save(output)?;
    }
    println!("{} Saved snapshot to {}", "✓".green(), output.display());
    Ok(())
}

/// Root mean squared error of clipped predictions over observed entries
fn training_rmse(mf: &MatrixFactorization, x: &RatingMatrix) -> Result<f64> {
    let mut squared = 0.0;
    let mut count = 0usize;
    for (row, observed) in x.outer_iterator().enumerate() {
        if observed.nnz() == 0 {
            continue;
        }
        let predicted = mf.model().predict_user(row, true)?;
        for (col, &score) in observed.iter() {
            let err = predicted[col] - score;
            squared += err * err;
            count += 1;
        }
    }
    if count == 0 {
        bail!("Rating matrix has no observations");
    }
    Ok((squared / count as f64).sqrt())
}

fn handle_recommend(
    engine: &RecommendationEngine,
    user_id: Option<UserId>,
    ratings: &[(MovieId, f32)],
    limit: usize,
) -> Result<()> {
    let groups = match user_id {
        Some(user_id) => engine.recommend_for_user(user_id, limit)?,
        None => {
            if ratings.is_empty() {
                bail!("Pass --user-id or at least one --rate MOVIE_ID:SCORE");
            }
            engine.recommend(ratings, limit)?
        }
    };
    print_groups(engine.data_index(), &groups);
    Ok(())
}

fn handle_similar(engine: &RecommendationEngine, movie_id: MovieId, limit: usize) {
    let index = engine.data_index();
    let title = index
        .get_movie(movie_id)
        .map(|m| m.title.as_str())
        .unwrap_or("unknown movie");
    println!("{}", format!("Movies similar to {} ({}):", title, movie_id).bold().blue());

    let similar = engine.similar_items(movie_id, limit);
    if similar.is_empty() {
        println!("  (no precomputed neighbors)");
    }
    for (rank, id) in similar.iter().enumerate() {
        println!("{}. {}", (rank + 1).to_string().green(), describe(index, *id));
    }
}

fn handle_evaluate(engine: &RecommendationEngine, user_id: UserId, limit: usize) -> Result<()> {
    let sample = engine.evaluation_candidates_for_user(user_id, limit)?;
    println!("{}", format!("Rate these {} movies:", sample.len()).bold().blue());
    for id in sample {
        println!("{} {}", "•".cyan(), describe(engine.data_index(), id));
    }
    Ok(())
}

/// Concurrent recommend requests for random stored users
async fn handle_benchmark(
    engine: RecommendationEngine,
    requests: usize,
    concurrent: usize,
    limit: usize,
) -> Result<()> {
    if requests == 0 || concurrent == 0 {
        bail!("--requests and --concurrent must be positive");
    }
    let user_ids = engine.data_index().get_all_user_ids();
    if user_ids.is_empty() {
        bail!("Dataset has no users to benchmark with");
    }

    let shared = SharedEngine::new(engine);
    let mut rng = StdRng::from_os_rng();
    let semaphore = Arc::new(Semaphore::new(concurrent));

    let wall = Instant::now();
    let mut handles = Vec::with_capacity(requests);
    for _ in 0..requests {
        let Some(&user_id) = user_ids.choose(&mut rng) else {
            bail!("Dataset has no users to benchmark with");
        };
        let shared = shared.clone();
        let semaphore = semaphore.clone();
        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await?;
            let start = Instant::now();
            shared.recommend_for_user(user_id, limit).await?;
            Ok::<_, anyhow::Error>(start.elapsed())
        }));
    }

    let mut timings: Vec<Duration> = Vec::with_capacity(requests);
    for handle in handles {
        timings.push(handle.await??);
    }
    let wall_time = wall.elapsed();

    timings.sort();
    let total: Duration = timings.iter().sum();
    let avg_latency = total / timings.len() as u32;
    let throughput = requests as f64 / wall_time.as_secs_f64();

    println!("{}", "Benchmark results:".bold().blue());
    println!("Requests: {} ({} concurrent)", requests, concurrent);
    println!("Total time: {:?}", wall_time);
    println!("Average latency: {:?}", avg_latency);
    println!("P50 latency: {:?}", percentile(&timings, 0.50));
    println!("P95 latency: {:?}", percentile(&timings, 0.95));
    println!("P99 latency: {:?}", percentile(&timings, 0.99));
    println!("Throughput: {:.2} requests/second", throughput);

    Ok(())
}

/// Nearest-rank percentile of sorted, non-empty timings
fn percentile(sorted: &[Duration], p: f64) -> Duration {
    let rank = (sorted.len() as f64 * p).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

fn describe(index: &DataIndex, movie_id: MovieId) -> String {
    match index.get_movie(movie_id) {
        Some(movie) => {
            let genres: Vec<&str> = movie.genres.iter().map(|g| g.name()).collect();
            format!("{} [{}]", movie.title, genres.join(", "))
        }
        None => format!("movie {}", movie_id),
    }
}

fn print_groups(index: &DataIndex, groups: &[LabeledGroup]) {
    print!("{}", "Movie Recommendations:\n".bold().blue());
    for group in groups {
        if group.movie_ids.is_empty() {
            continue;
        }
        println!("{} ({})", group.label.to_string().bold(), group.movie_ids.len());
        for id in &group.movie_ids {
            println!("  {} {}", "•".green(), describe(index, *id));
        }
    }
}
