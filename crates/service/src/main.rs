//! Proofgen - Chainpoint proof generation service
//!
//! This binary provides:
//! - The event consumer that assembles and stores proofs
//! - Periodic expiry of stored proofs
//! - Maintenance commands (database init, status, manual prune, enqueue)

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use proofgen_core::BatchType;
use proofgen_service::cache::{InMemoryStateCache, StateCache};
use proofgen_service::config::Config;
use proofgen_service::proof_store::ProofStore;
use proofgen_service::pruner::ProofPruner;
use proofgen_service::queue::{SqliteWorkQueue, WorkQueue};
use proofgen_service::repository::StateRepository;
use proofgen_service::storage::Storage;
use proofgen_service::supervisor::{ConnectionSlot, Supervisor};
use proofgen_service::PipelineConsumer;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "proofgen")]
#[command(version, about = "Chainpoint proof generation service", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "proofgen.toml")]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the service (consumer + pruner)
    Run,

    /// Delete expired proofs once and exit
    Prune,

    /// Show row counts and queue depth
    Status,

    /// Initialize the database
    InitDb,

    /// Publish a proof-ready event to the work queue
    Enqueue {
        /// Event type: cal_batch, btc_batch or eth
        #[arg(long = "type")]
        batch_type: BatchType,

        /// hash_ids carried by the event
        #[arg(long = "hash-id", required = true)]
        hash_ids: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::from_file(&cli.config).context("Failed to load configuration")?;

    init_logging(&config.logging.level, &config.logging.format, cli.debug)?;

    info!("Proofgen starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_service(config).await?,
        Commands::Prune => prune_once(&config).await?,
        Commands::Status => show_status(&config).await?,
        Commands::InitDb => init_database(&config).await?,
        Commands::Enqueue {
            batch_type,
            hash_ids,
        } => enqueue_event(&config, batch_type, &hash_ids).await?,
    }

    Ok(())
}

/// Initialize tracing subscriber for logging.
///
/// `RUST_LOG` overrides the configured level; `--debug` overrides both.
fn init_logging(level: &str, format: &str, debug: bool) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let env_filter = if debug {
        EnvFilter::new("proofgen_service=debug,proofgen_assembler=debug,sqlx=info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("proofgen_service={level},proofgen_assembler={level}"))
        })
    };

    let registry = tracing_subscriber::registry().with(env_filter);
    if format == "json" {
        registry
            .with(fmt::layer().json().with_target(true))
            .try_init()
            .context("Failed to initialize logging")?;
    } else {
        registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .try_init()
            .context("Failed to initialize logging")?;
    }

    Ok(())
}

async fn open_storage(config: &Config) -> Result<Storage> {
    let storage = Storage::new(
        &config.database.url,
        config.database.max_connections,
        config.database.min_connections,
    )
    .await
    .context("Failed to connect to database")?;

    storage
        .run_migrations()
        .await
        .context("Failed to run migrations")?;

    Ok(storage)
}

/// Main service - consumes events and prunes expired proofs
async fn run_service(config: Config) -> Result<()> {
    info!("Configuration loaded successfully");
    info!("  Network: {}", config.network.mode);
    info!("  Database: {}", config.database.url);
    info!("  Queue: {} (prefetch {})", config.queue.name, config.queue.prefetch);
    info!("  Cache: {}", if config.cache.enabled { "enabled" } else { "disabled" });

    let reconnect_delay = config.queue.reconnect_delay();

    // Database: connect once up front so a bad URL fails fast
    let database: ConnectionSlot<Storage> = ConnectionSlot::empty("database");
    database.install(Arc::new(open_storage(&config).await?));
    info!("Database initialized");

    let database_supervisor = tokio::spawn({
        let supervisor = Supervisor::new(database.clone(), reconnect_delay);
        let config = config.clone();
        async move {
            supervisor
                .run(|| {
                    let config = config.clone();
                    async move { open_storage(&config).await.map(Arc::new) }
                })
                .await
        }
    });

    // Work queue: opened on whichever database handle is current
    let queue: ConnectionSlot<dyn WorkQueue> = ConnectionSlot::empty("queue");
    let queue_supervisor = tokio::spawn({
        let supervisor = Supervisor::new(queue.clone(), reconnect_delay);
        let database = database.clone();
        let name = config.queue.name.clone();
        let poll_interval = config.queue.poll_interval();
        async move {
            supervisor
                .run(|| {
                    let database = database.clone();
                    let name = name.clone();
                    async move {
                        let storage = database.wait().await;
                        let queue =
                            SqliteWorkQueue::connect(storage.as_ref().clone(), &name, poll_interval)
                                .await?;
                        Ok::<_, anyhow::Error>(Arc::new(queue) as Arc<dyn WorkQueue>)
                    }
                })
                .await
        }
    });

    let cache = config.cache.enabled.then(|| {
        let cache: Arc<dyn StateCache> = Arc::new(InMemoryStateCache::new(
            std::time::Duration::from_secs(config.cache.ttl_secs),
            config.cache.max_entries,
        ));
        ConnectionSlot::with("cache", cache)
    });

    let store = ProofStore::new(database.clone(), config.pruning.retention());
    let consumer = PipelineConsumer::new(
        queue,
        StateRepository::new(database.clone(), cache),
        store.clone(),
        config.network.mode,
        config.queue.prefetch,
    )?;
    let consumer_handle = tokio::spawn(async move { consumer.run().await });

    let pruner = ProofPruner::new(store, config.pruning.interval());
    let pruner_handle = tokio::spawn(async move { pruner.run().await });

    info!(
        "Pruner started (interval: {} min, retention: {} min)",
        config.pruning.interval_minutes, config.pruning.proof_expire_minutes
    );
    info!("Proofgen is running. Press Ctrl+C to stop.");

    let result = tokio::select! {
        result = consumer_handle => {
            match result {
                Ok(Ok(())) => {
                    warn!("Consumer exited unexpectedly");
                    Ok(())
                }
                Ok(Err(e)) => Err(e).context("Consumer failed"),
                Err(e) => Err(anyhow::anyhow!("Consumer task panicked: {}", e)),
            }
        }
        result = pruner_handle => {
            match result {
                Ok(Ok(())) => {
                    warn!("Pruner exited unexpectedly");
                    Ok(())
                }
                Ok(Err(e)) => Err(e).context("Pruner failed"),
                Err(e) => Err(anyhow::anyhow!("Pruner task panicked: {}", e)),
            }
        }
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl+C")?;
            info!("Received shutdown signal, gracefully shutting down...");
            Ok(())
        }
    };

    database_supervisor.abort();
    queue_supervisor.abort();
    if let Some(storage) = database.current() {
        storage.close().await;
    }

    result
}

/// Delete expired proofs once
async fn prune_once(config: &Config) -> Result<()> {
    let storage = Arc::new(open_storage(config).await?);
    let store = ProofStore::new(
        ConnectionSlot::with("database", Arc::clone(&storage)),
        config.pruning.retention(),
    );

    let deleted = ProofPruner::new(store, config.pruning.interval())
        .prune_now()
        .await?;
    info!("Prune complete: {} expired proof(s) deleted", deleted);

    storage.close().await;
    Ok(())
}

/// Show row counts and queue depth
async fn show_status(config: &Config) -> Result<()> {
    let storage = open_storage(config).await?;
    let stats = storage.stats().await?;
    let depth = storage.queue_depth(&config.queue.name).await?;

    println!("\n=== Proofgen Status ===\n");
    println!("Network: {}", config.network.mode);
    println!("\nState Fragments:");
    println!("  agg_states: {}", stats.agg_state_count);
    println!("  cal_states: {}", stats.cal_state_count);
    println!("  anchor_btc_agg_states: {}", stats.anchor_btc_agg_state_count);
    println!("  btctx_states: {}", stats.btctx_state_count);
    println!("  btchead_states: {}", stats.btchead_state_count);
    println!("\nProofs:");
    println!("  Stored: {}", stats.proof_count);
    println!("  Retention: {} min", config.pruning.proof_expire_minutes);
    println!("\nWork Queue ({}):", config.queue.name);
    println!("  Pending: {}", depth);
    println!("  All queues: {}", stats.queued_count);
    println!();

    storage.close().await;
    Ok(())
}

/// Initialize the database
async fn init_database(config: &Config) -> Result<()> {
    info!("Initializing database: {}", config.database.url);

    let storage = open_storage(config).await?;
    storage
        .health_check()
        .await
        .context("Database health check failed")?;

    let stats = storage.stats().await?;
    info!("Database initialized successfully!");
    info!("  Proofs: {}", stats.proof_count);
    info!("  Queued messages: {}", stats.queued_count);

    storage.close().await;
    Ok(())
}

/// Publish a proof-ready event
///
/// Writes straight to the queue table; opening a [`SqliteWorkQueue`] here
/// would release the claims of a running consumer.
async fn enqueue_event(config: &Config, batch_type: BatchType, hash_ids: &[String]) -> Result<()> {
    let storage = open_storage(config).await?;

    let body = serde_json::to_string(&serde_json::json!({ "hash_ids": hash_ids }))?;
    let id = storage
        .enqueue_message(&config.queue.name, batch_type.as_str(), &body)
        .await?;
    info!(
        "Enqueued {} event {} with {} hash_id(s) on {}",
        batch_type,
        id,
        hash_ids.len(),
        config.queue.name
    );

    storage.close().await;
    Ok(())
}
