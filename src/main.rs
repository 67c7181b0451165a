use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};

use review_benchmark::data::{read_reviews_file, RawRecord};
use review_benchmark::metrics::{write_snapshot, MongoMetricsFetcher, PostgresMetricsFetcher};
use review_benchmark::{
    ConnectionPolicy, DatabaseConfig, MongoSimulator, PostgresSimulator, Simulator,
};

/// Benchmark PostgreSQL against MongoDB on a movie review workload.
///
/// Phases selected by flags run in a fixed order: setup, insertion, update,
/// deletion, concurrent, transaction, metrics.
#[derive(Parser)]
#[command(name = "review_benchmark", version)]
struct Cli {
    #[arg(long, default_value = "config/postgres_config.json")]
    postgres_config: PathBuf,

    #[arg(long, default_value = "config/mongo_config.json")]
    mongo_config: PathBuf,

    #[arg(long, value_enum, default_value_t = Backend::Both)]
    backend: Backend,

    #[arg(long, default_value = "data/movies.txt")]
    data_file: PathBuf,

    /// Cap on the number of records read from the data file.
    #[arg(long, default_value_t = 1000)]
    total_rows: usize,

    /// Batch size for the bulk scenarios; -1 runs the whole set in one batch.
    #[arg(long, default_value_t = -1, allow_hyphen_values = true)]
    bulk_size: i64,

    #[arg(long, value_enum, default_value_t = ConnectionMode::Ephemeral)]
    connection: ConnectionMode,

    #[arg(long, default_value_t = 8)]
    pool_size: usize,

    /// Drop and recreate both databases. Destructive.
    #[arg(long)]
    setup: bool,

    #[arg(long)]
    insertion: bool,

    #[arg(long)]
    update: bool,

    #[arg(long)]
    deletion: bool,

    /// Use the single-record scenario variants instead of the bulk ones.
    #[arg(long)]
    one: bool,

    /// Compare query timings before and after index creation.
    #[arg(long)]
    index: bool,

    #[arg(long, default_value = "product_id")]
    index_field: String,

    #[arg(long)]
    concurrent: bool,

    #[arg(long, default_value_t = 10)]
    concurrency: usize,

    #[arg(long, default_value_t = 100)]
    operations: usize,

    #[arg(long)]
    transaction: bool,

    /// Raise a synthetic mid-transaction error to exercise rollback.
    #[arg(long)]
    simulate_error: bool,

    /// Poll backend statistics and write snapshot JSON files.
    #[arg(long)]
    metrics: bool,

    #[arg(long, default_value = ".")]
    metrics_dir: PathBuf,

    #[arg(long, default_value_t = 2)]
    metrics_interval_secs: u64,

    #[arg(long, default_value_t = 1)]
    metrics_cycles: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    Postgres,
    Mongo,
    Both,
}

impl Backend {
    fn includes_postgres(self) -> bool {
        matches!(self, Backend::Postgres | Backend::Both)
    }

    fn includes_mongo(self) -> bool {
        matches!(self, Backend::Mongo | Backend::Both)
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ConnectionMode {
    Persistent,
    Pooled,
    Ephemeral,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let policy = match cli.connection {
        ConnectionMode::Persistent => ConnectionPolicy::Persistent,
        ConnectionMode::Pooled => ConnectionPolicy::Pooled {
            size: cli.pool_size,
        },
        ConnectionMode::Ephemeral => ConnectionPolicy::Ephemeral,
    };

    let needs_records = cli.insertion || cli.transaction;
    let records: Vec<RawRecord> = if needs_records {
        let records = read_reviews_file(&cli.data_file, cli.total_rows)
            .with_context(|| format!("reading data file {}", cli.data_file.display()))?;
        println!("{} records are used for the simulation", records.len());
        records
    } else {
        Vec::new()
    };
    let total_records = records.len() as u64;

    let mut simulators: Vec<Box<dyn Simulator>> = Vec::new();
    if cli.backend.includes_postgres() {
        let config = DatabaseConfig::load(&cli.postgres_config)
            .with_context(|| format!("loading {}", cli.postgres_config.display()))?;
        simulators.push(Box::new(PostgresSimulator::new(config, policy, total_records)));
    }
    if cli.backend.includes_mongo() {
        let config = DatabaseConfig::load(&cli.mongo_config)
            .with_context(|| format!("loading {}", cli.mongo_config.display()))?;
        simulators.push(Box::new(MongoSimulator::new(config, policy, total_records)));
    }

    if cli.setup {
        for sim in simulators.iter_mut() {
            sim.setup().await?;
        }
    }

    if cli.insertion {
        let mut timings = Vec::new();
        for sim in simulators.iter_mut() {
            let result = if cli.one {
                sim.test_insertion(&records).await?
            } else {
                sim.test_insertion_many(&records, cli.bulk_size).await?
            };
            println!(
                "{}: inserted {} records in {:.2}s",
                sim.name(),
                sim.state().inserted,
                result.secs()
            );
            timings.push((sim.name(), result.secs()));
        }
        print_comparison("Insertion", &timings);
    }

    if cli.update {
        let mut timings = Vec::new();
        for sim in simulators.iter_mut() {
            let result = if cli.one {
                sim.test_update_one().await?
            } else {
                sim.test_update_many(cli.bulk_size).await?
            };
            println!(
                "{}: modified {} records in {:.2}s",
                sim.name(),
                sim.state().modified,
                result.secs()
            );
            timings.push((sim.name(), result.secs()));
        }
        print_comparison("Update", &timings);
    }

    if cli.deletion {
        let mut timings = Vec::new();
        for sim in simulators.iter_mut() {
            let result = if cli.one {
                sim.test_delete_one().await?
            } else {
                sim.test_delete_many(cli.bulk_size).await?
            };
            println!(
                "{}: deleted {} records in {:.2}s",
                sim.name(),
                sim.state().deleted,
                result.secs()
            );
            timings.push((sim.name(), result.secs()));
        }
        print_comparison("Deletion", &timings);
    }

    if cli.index {
        for sim in simulators.iter_mut() {
            let (without, with) = sim.test_index_performance(&cli.index_field).await?;
            println!(
                "{}: query on '{}' without index {:.2}s, with index {:.2}s",
                sim.name(),
                cli.index_field,
                without.as_secs_f64(),
                with.as_secs_f64()
            );
        }
    }

    if cli.concurrent {
        let mut timings = Vec::new();
        for sim in simulators.iter_mut() {
            let elapsed = sim
                .test_concurrent_operations(cli.concurrency, cli.operations)
                .await?;
            println!(
                "{}: {} concurrent operations in {:.2}s",
                sim.name(),
                cli.operations,
                elapsed.as_secs_f64()
            );
            timings.push((sim.name(), elapsed.as_secs_f64()));
        }
        print_comparison("Concurrent", &timings);
    }

    if cli.transaction {
        let mut timings = Vec::new();
        for sim in simulators.iter_mut() {
            let elapsed = sim
                .test_transaction_operations(&records, cli.simulate_error)
                .await?;
            println!(
                "{}: transaction scenario in {:.2}s",
                sim.name(),
                elapsed.as_secs_f64()
            );
            timings.push((sim.name(), elapsed.as_secs_f64()));
        }
        print_comparison("Transaction", &timings);
    }

    if cli.metrics {
        run_metrics(&cli).await?;
    }

    Ok(())
}

fn print_comparison(label: &str, timings: &[(&str, f64)]) {
    if timings.len() < 2 {
        return;
    }
    let rendered: Vec<String> = timings
        .iter()
        .map(|(name, secs)| format!("{name}: {secs:.2}s"))
        .collect();
    println!("{label} comparison: {}", rendered.join(", "));
}

async fn run_metrics(cli: &Cli) -> anyhow::Result<()> {
    let mut postgres = if cli.backend.includes_postgres() {
        let config = DatabaseConfig::load(&cli.postgres_config)
            .with_context(|| format!("loading {}", cli.postgres_config.display()))?;
        Some(PostgresMetricsFetcher::new(config))
    } else {
        None
    };
    let mongo = if cli.backend.includes_mongo() {
        let config = DatabaseConfig::load(&cli.mongo_config)
            .with_context(|| format!("loading {}", cli.mongo_config.display()))?;
        Some(MongoMetricsFetcher::new(config))
    } else {
        None
    };

    for cycle in 0..cli.metrics_cycles {
        if let Some(fetcher) = postgres.as_mut() {
            match fetcher.fetch().await {
                Ok(snapshot) => {
                    write_snapshot(&cli.metrics_dir.join("postgres_metrics.json"), &snapshot)?
                }
                Err(e) => log::warn!("postgres metrics fetch failed: {e}"),
            }
        }
        if let Some(fetcher) = mongo.as_ref() {
            match fetcher.fetch().await {
                Ok(snapshot) => {
                    write_snapshot(&cli.metrics_dir.join("mongo_metrics.json"), &snapshot)?
                }
                Err(e) => log::warn!("mongo metrics fetch failed: {e}"),
            }
        }
        if cycle + 1 < cli.metrics_cycles {
            tokio::time::sleep(Duration::from_secs(cli.metrics_interval_secs)).await;
        }
    }
    Ok(())
}
