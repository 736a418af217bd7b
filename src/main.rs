//! pooldb-bench - concurrent workload benchmark.
//!
//! Initializes a pool against the configured database, creates the schema if
//! needed, then runs the user-write, product-write, product-read and mixed
//! workloads and prints one report per workload.

use clap::Parser;
use pooldb::config::BenchConfig;
use pooldb::harness::{self, WorkloadReport};
use pooldb::{ConnectionConfig, DbError, PoolManager, ProductRepository, UserRepository};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &BenchConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .init();
    }
}

async fn run(config: &BenchConfig, manager: &PoolManager) -> Result<(), Box<dyn std::error::Error>> {
    manager.initialize_schema().await?;

    let existing_users = manager
        .run_in_transaction(|session| Box::pin(UserRepository::count(session)))
        .await?;
    let first_index = usize::try_from(existing_users).unwrap_or(0);

    let reports: Vec<WorkloadReport> = vec![
        harness::concurrent_user_writes(manager, config.writers, config.users_per_writer, first_index)
            .await?,
        harness::concurrent_product_writes(manager, config.operations).await?,
        harness::concurrent_product_reads(manager, config.operations).await?,
        harness::mixed_product_workload(manager, config.operations, config.read_ratio).await?,
    ];

    let (products, inventory_value) = manager
        .run_in_transaction(|session| {
            Box::pin(async move {
                let count = ProductRepository::count(session).await?;
                let value = ProductRepository::total_inventory_value(session).await?;
                Ok::<_, DbError>((count, value))
            })
        })
        .await?;
    let pool = manager.status().await?;

    if config.json {
        let output = serde_json::json!({
            "reports": reports,
            "products": products,
            "inventory_value": inventory_value,
            "pool": pool,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        for report in &reports {
            println!("{report}");
        }
        println!("products: {products}, total inventory value: {inventory_value:.2}");
        println!(
            "pool: {} open, {} idle, {} max",
            pool.size, pool.idle, pool.max_connections
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse configuration from command line and environment
    let config = BenchConfig::parse();

    init_tracing(&config);

    if let Err(e) = config.validate() {
        eprintln!("Error: {e}");
        std::process::exit(2);
    }

    let connection = ConnectionConfig::parse(&config.database)?;
    info!(
        target = %connection.masked_connection_string(),
        db_type = %connection.db_type,
        "Starting pooldb-bench v{}",
        env!("CARGO_PKG_VERSION")
    );

    let manager = PoolManager::new();
    manager.init(connection).await?;

    let result = run(&config, &manager).await;
    if let Err(e) = &result {
        error!(error = %e, "Benchmark failed");
    }

    manager.close().await?;
    info!("Shutdown complete");
    result
}
