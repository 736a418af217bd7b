//! Concurrency tests: many tasks sharing one pool.
//!
//! Tests verify that:
//! - Concurrent writers never lose or duplicate rows
//! - Each unit of work sees a connection of its own
//! - Every connection is back in the pool when the workload ends
//! - Units of work that read before writing wait for the write lock
//!   instead of failing with "database is locked"

use pooldb::config::PoolOptions;
use pooldb::harness;
use pooldb::models::{NewPolicy, NewProduct, NewRole, PolicyAction};
use pooldb::{
    ConnectionConfig, DbError, PolicyRepository, PoolManager, ProductRepository, RoleRepository,
    UserRepository,
};
use rand::seq::SliceRandom;
use std::collections::HashSet;
use tempfile::TempDir;
use tokio::task::JoinSet;

async fn setup(pool_options: PoolOptions) -> (PoolManager, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite:{}", dir.path().join("concurrency.db").display());
    let config = ConnectionConfig::new(url, pool_options).unwrap();

    let manager = PoolManager::new();
    manager.init(config).await.unwrap();
    manager.initialize_schema().await.unwrap();
    (manager, dir)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fifty_writers_insert_every_user_exactly_once() {
    let (manager, _dir) = setup(PoolOptions {
        pool_size: Some(20),
        max_overflow: Some(30),
        ..PoolOptions::default()
    })
    .await;

    let report = harness::concurrent_user_writes(&manager, 50, 10, 0)
        .await
        .unwrap();
    assert_eq!(report.operations, 500);
    assert_eq!(report.writes, 500);
    assert_eq!(report.failures, 0, "{report}");

    let users = manager
        .run_in_transaction(|session| Box::pin(UserRepository::list_all(session)))
        .await
        .unwrap();
    assert_eq!(users.len(), 500);
    let emails: HashSet<&str> = users.iter().map(|u| u.email.as_str()).collect();
    assert_eq!(emails.len(), 500);
    assert!(emails.contains("user0@example.com"));
    assert!(emails.contains("user499@example.com"));

    let status = manager.status().await.unwrap();
    assert_eq!(status.active_sessions, 0);
    assert!(status.size <= 50);
    manager.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_mixed_workload_completes_without_failures() {
    let (manager, _dir) = setup(PoolOptions::default()).await;

    let writes = harness::concurrent_product_writes(&manager, 100).await.unwrap();
    assert_eq!(writes.failures, 0, "{writes}");

    let reads = harness::concurrent_product_reads(&manager, 200).await.unwrap();
    assert_eq!(reads.reads, 200);
    assert_eq!(reads.failures, 0, "{reads}");

    let mixed = harness::mixed_product_workload(&manager, 300, 0.8)
        .await
        .unwrap();
    assert_eq!(mixed.operations, 300);
    assert_eq!(mixed.reads, 240);
    assert_eq!(mixed.writes, 60);
    assert_eq!(mixed.failures, 0, "{mixed}");
    assert!(mixed.ops_per_second > 0.0);

    // Half of the writes created products, the other half restocked
    let products = manager
        .run_in_transaction(|session| Box::pin(ProductRepository::count(session)))
        .await
        .unwrap();
    assert_eq!(products, 130);
    assert_eq!(manager.status().await.unwrap().active_sessions, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_shuffled_restocks_reach_a_deterministic_total() {
    let (manager, _dir) = setup(PoolOptions {
        pool_size: Some(5),
        max_overflow: Some(5),
        ..PoolOptions::default()
    })
    .await;

    let ids: Vec<i64> = manager
        .run_in_transaction(|session| {
            Box::pin(async move {
                let mut ids = Vec::new();
                for i in 0..40 {
                    let product = ProductRepository::create(
                        session,
                        NewProduct::new(format!("Part {i}"), 2.5, format!("PART-{i}")),
                    )
                    .await?;
                    ids.push(product.id);
                }
                Ok::<_, DbError>(ids)
            })
        })
        .await
        .unwrap();

    // One restock per product, issued in random order from more tasks
    // than there are connections
    let mut plan: Vec<(i64, i64)> = ids.iter().map(|&id| (id, id % 7 + 1)).collect();
    plan.shuffle(&mut rand::thread_rng());
    let expected: i64 = plan.iter().map(|&(_, inventory)| inventory).sum();

    let mut tasks = JoinSet::new();
    for (id, inventory) in plan {
        let manager = manager.clone();
        tasks.spawn(async move {
            manager
                .run_in_transaction(move |session| {
                    Box::pin(ProductRepository::update_inventory(session, id, inventory))
                })
                .await
        });
    }
    while let Some(joined) = tasks.join_next().await {
        let updated = joined.unwrap().unwrap();
        assert!(updated.is_some());
    }

    let total = manager
        .run_in_transaction(|session| Box::pin(ProductRepository::total_inventory_value(session)))
        .await
        .unwrap();
    assert!((total - 2.5 * expected as f64).abs() < 1e-6, "total was {total}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_policy_attachments_all_succeed() {
    let (manager, _dir) = setup(PoolOptions::default()).await;

    let (policy_id, role_ids) = manager
        .run_in_transaction(|session| {
            Box::pin(async move {
                let policy =
                    PolicyRepository::create(session, NewPolicy::new("workflow", PolicyAction::Read))
                        .await?;
                let mut role_ids = Vec::new();
                for i in 0..50 {
                    let role = RoleRepository::create(session, NewRole::new(format!("role-{i}")))
                        .await?;
                    role_ids.push(role.id);
                }
                Ok::<_, DbError>((policy.id, role_ids))
            })
        })
        .await
        .unwrap();

    // attach_policy checks both sides exist before inserting the link
    let mut tasks = JoinSet::new();
    for role_id in role_ids {
        let manager = manager.clone();
        tasks.spawn(async move {
            manager
                .run_in_transaction(move |session| {
                    Box::pin(RoleRepository::attach_policy(session, role_id, policy_id))
                })
                .await
        });
    }
    let mut failures = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined.unwrap() {
            failures.push(e.to_string());
        }
    }
    assert!(failures.is_empty(), "failed attachments: {failures:?}");

    let holders = manager
        .run_in_transaction(move |session| {
            Box::pin(RoleRepository::list_by_policy(session, policy_id))
        })
        .await
        .unwrap();
    assert_eq!(holders.len(), 50);
    assert!(holders.iter().all(|r| r.policies().len() == 1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_lookup_then_update_units_of_work_do_not_conflict() {
    let (manager, _dir) = setup(PoolOptions::default()).await;

    manager
        .run_in_transaction(|session| {
            Box::pin(async move {
                for i in 0..30 {
                    ProductRepository::create(
                        session,
                        NewProduct::new(format!("Item {i}"), 1.0, format!("ITEM-{i}")),
                    )
                    .await?;
                }
                Ok::<_, DbError>(())
            })
        })
        .await
        .unwrap();

    let mut tasks = JoinSet::new();
    for i in 0..30 {
        let manager = manager.clone();
        tasks.spawn(async move {
            manager
                .run_in_transaction(move |session| {
                    Box::pin(async move {
                        let sku = format!("ITEM-{i}");
                        let product = ProductRepository::get_by_sku(session, &sku)
                            .await?
                            .ok_or_else(|| DbError::not_found("product", sku))?;
                        ProductRepository::update_inventory(session, product.id, 2).await
                    })
                })
                .await
        });
    }
    while let Some(joined) = tasks.join_next().await {
        let updated = joined.unwrap().unwrap();
        assert_eq!(updated.map(|p| p.inventory), Some(2));
    }

    let total = manager
        .run_in_transaction(|session| Box::pin(ProductRepository::total_inventory_value(session)))
        .await
        .unwrap();
    assert!((total - 60.0).abs() < 1e-9, "total was {total}");
}
