//! Concurrent workload drivers.
//!
//! Each driver fans out many small units of work, one tokio task per unit,
//! against a shared [`PoolManager`] and reports wall-clock time and
//! throughput. They exist to load the pool the way a busy service would:
//! many short sessions competing for a bounded set of connections.

use crate::db::PoolManager;
use crate::error::{DbError, DbResult};
use crate::models::{NewProduct, NewUser};
use crate::repository::{ProductRepository, UserRepository};
use serde::Serialize;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpKind {
    Read,
    Write,
}

#[derive(Debug, Default)]
struct Tally {
    reads: usize,
    writes: usize,
    failures: usize,
}

impl Tally {
    fn record(&mut self, kind: OpKind, result: DbResult<()>) {
        match kind {
            OpKind::Read => self.reads += 1,
            OpKind::Write => self.writes += 1,
        }
        if let Err(e) = result {
            warn!(error = %e, kind = ?kind, "Workload operation failed");
            self.failures += 1;
        }
    }

    async fn drain(&mut self, tasks: &mut JoinSet<(OpKind, DbResult<()>)>) {
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((kind, result)) => self.record(kind, result),
                Err(e) => {
                    warn!(error = %e, "Workload task did not complete");
                    self.failures += 1;
                }
            }
        }
    }
}

/// Outcome of one workload run.
#[derive(Debug, Clone, Serialize)]
pub struct WorkloadReport {
    pub label: String,
    pub operations: usize,
    pub reads: usize,
    pub writes: usize,
    pub failures: usize,
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
    pub ops_per_second: f64,
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64() * 1000.0)
}

impl WorkloadReport {
    fn new(label: &str, tally: Tally, elapsed: Duration) -> Self {
        let operations = tally.reads + tally.writes;
        let secs = elapsed.as_secs_f64();
        let ops_per_second = if secs > 0.0 {
            operations as f64 / secs
        } else {
            0.0
        };
        let report = Self {
            label: label.to_string(),
            operations,
            reads: tally.reads,
            writes: tally.writes,
            failures: tally.failures,
            elapsed,
            ops_per_second,
        };
        info!(
            label = %report.label,
            operations = report.operations,
            failures = report.failures,
            elapsed_ms = elapsed.as_millis() as u64,
            ops_per_second = report.ops_per_second,
            "Workload finished"
        );
        report
    }

    pub fn succeeded(&self) -> usize {
        self.operations - self.failures.min(self.operations)
    }
}

impl std::fmt::Display for WorkloadReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} ops ({} reads, {} writes, {} failed) in {:.3}s, {:.1} ops/s",
            self.label,
            self.operations,
            self.reads,
            self.writes,
            self.failures,
            self.elapsed.as_secs_f64(),
            self.ops_per_second
        )
    }
}

fn user_fields(index: usize) -> NewUser {
    NewUser::new(format!("User {index}"), format!("user{index}@example.com"))
}

fn product_fields(index: usize) -> NewProduct {
    NewProduct::new(
        format!("Product {index}"),
        1.0 + (index % 100) as f64,
        format!("SKU-{}", uuid::Uuid::new_v4().simple()),
    )
    .with_inventory((index % 50) as i64)
}

async fn create_product(manager: PoolManager, index: usize) -> DbResult<()> {
    manager
        .run_in_transaction(move |session| {
            Box::pin(async move {
                ProductRepository::create(session, product_fields(index))
                    .await
                    .map(|_| ())
            })
        })
        .await
}

async fn read_product(manager: PoolManager, id: i64) -> DbResult<()> {
    manager
        .run_in_transaction(move |session| {
            Box::pin(async move { ProductRepository::get_by_id(session, id).await.map(|_| ()) })
        })
        .await
}

async fn restock_product(manager: PoolManager, id: i64, inventory: i64) -> DbResult<()> {
    manager
        .run_in_transaction(move |session| {
            Box::pin(async move {
                ProductRepository::update_inventory(session, id, inventory)
                    .await
                    .map(|_| ())
            })
        })
        .await
}

async fn product_ids(manager: &PoolManager) -> DbResult<Vec<i64>> {
    manager
        .run_in_transaction(|session| {
            Box::pin(async move {
                let products = ProductRepository::list_all(session).await?;
                Ok::<_, DbError>(products.into_iter().map(|p| p.id).collect())
            })
        })
        .await
}

/// `writers` tasks each insert `users_per_writer` users, one unit of work
/// per user. Emails are numbered from `first_index` so repeated runs
/// against one database stay unique.
pub async fn concurrent_user_writes(
    manager: &PoolManager,
    writers: usize,
    users_per_writer: usize,
    first_index: usize,
) -> DbResult<WorkloadReport> {
    let started = Instant::now();
    let mut tasks = JoinSet::new();
    for writer in 0..writers {
        let manager = manager.clone();
        let base = first_index + writer * users_per_writer;
        tasks.spawn(async move {
            let mut outcomes = Vec::with_capacity(users_per_writer);
            for offset in 0..users_per_writer {
                let user = user_fields(base + offset);
                let result = manager
                    .run_in_transaction(move |session| {
                        Box::pin(async move {
                            UserRepository::create(session, user).await.map(|_| ())
                        })
                    })
                    .await;
                outcomes.push(result);
            }
            outcomes
        });
    }

    let mut tally = Tally::default();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(outcomes) => {
                for result in outcomes {
                    tally.record(OpKind::Write, result);
                }
            }
            Err(e) => {
                warn!(error = %e, "Writer task did not complete");
                tally.writes += users_per_writer;
                tally.failures += users_per_writer;
            }
        }
    }
    Ok(WorkloadReport::new("user writes", tally, started.elapsed()))
}

/// `count` concurrent product inserts.
pub async fn concurrent_product_writes(
    manager: &PoolManager,
    count: usize,
) -> DbResult<WorkloadReport> {
    let started = Instant::now();
    let mut tasks = JoinSet::new();
    for index in 0..count {
        let manager = manager.clone();
        tasks.spawn(async move { (OpKind::Write, create_product(manager, index).await) });
    }
    let mut tally = Tally::default();
    tally.drain(&mut tasks).await;
    Ok(WorkloadReport::new("product writes", tally, started.elapsed()))
}

/// `count` concurrent product lookups by id, cycling over existing products.
pub async fn concurrent_product_reads(
    manager: &PoolManager,
    count: usize,
) -> DbResult<WorkloadReport> {
    let ids = product_ids(manager).await?;
    let started = Instant::now();
    let mut tasks = JoinSet::new();
    for index in 0..count {
        let manager = manager.clone();
        // Missing products still cost a round trip
        let id = ids.get(index % ids.len().max(1)).copied().unwrap_or(0);
        tasks.spawn(async move { (OpKind::Read, read_product(manager, id).await) });
    }
    let mut tally = Tally::default();
    tally.drain(&mut tasks).await;
    Ok(WorkloadReport::new("product reads", tally, started.elapsed()))
}

/// Whether operation `index` of `operations` is a read, spreading `reads`
/// reads evenly through the run.
fn is_read(index: usize, operations: usize, reads: usize) -> bool {
    (index + 1) * reads / operations > index * reads / operations
}

/// `operations` concurrent units of work, `read_ratio` of them reads by id.
/// Writes alternate between inventory updates and new products.
pub async fn mixed_product_workload(
    manager: &PoolManager,
    operations: usize,
    read_ratio: f64,
) -> DbResult<WorkloadReport> {
    let ids = product_ids(manager).await?;
    let reads = (operations as f64 * read_ratio.clamp(0.0, 1.0)).round() as usize;
    let started = Instant::now();
    let mut tasks = JoinSet::new();
    let mut writes = 0usize;
    for index in 0..operations {
        let manager = manager.clone();
        let id = ids.get(index % ids.len().max(1)).copied();
        if is_read(index, operations, reads) {
            let id = id.unwrap_or(0);
            tasks.spawn(async move { (OpKind::Read, read_product(manager, id).await) });
        } else {
            writes += 1;
            let inventory = (index % 100) as i64;
            match id {
                Some(id) if writes % 2 == 0 => {
                    tasks.spawn(async move {
                        (OpKind::Write, restock_product(manager, id, inventory).await)
                    });
                }
                _ => {
                    tasks.spawn(async move {
                        (OpKind::Write, create_product(manager, index).await)
                    });
                }
            }
        }
    }
    let mut tally = Tally::default();
    tally.drain(&mut tasks).await;
    Ok(WorkloadReport::new("mixed", tally, started.elapsed()))
}
