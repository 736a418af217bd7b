//! Integration tests for the session state machine on SQLite.
//!
//! Tests verify that:
//! - Sessions move Idle -> Active -> Committed/RolledBack -> Closed
//! - A failed operation leaves the transaction rollback-only
//! - Rolled back, dropped and cancelled units of work leave no rows behind
//! - Connections return to the pool on every exit path

use pooldb::config::PoolOptions;
use pooldb::models::NewUser;
use pooldb::{
    ConnectionConfig, DbError, PoolManager, Session, SessionState, UserRepository,
};
use std::time::Duration;
use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};

/// Create an initialized manager over a fresh SQLite file.
async fn setup(pool_options: PoolOptions) -> (PoolManager, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite:{}", dir.path().join("session.db").display());
    let config = ConnectionConfig::new(url, pool_options).unwrap();

    let manager = PoolManager::new();
    manager.init(config).await.unwrap();
    manager.initialize_schema().await.unwrap();
    (manager, dir)
}

fn single_connection() -> PoolOptions {
    PoolOptions {
        pool_size: Some(1),
        max_overflow: Some(0),
        ..PoolOptions::default()
    }
}

async fn user_count(manager: &PoolManager) -> i64 {
    manager
        .run_in_transaction(|session| Box::pin(UserRepository::count(session)))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_session_state_machine() {
    let (manager, _dir) = setup(PoolOptions::default()).await;
    let mut session = manager.new_session().await.unwrap();
    assert_eq!(session.state(), SessionState::Idle);
    assert!(session.id().starts_with("ses_"));
    assert!(!session.holds_connection());

    // Nothing to operate on before begin
    assert!(matches!(
        UserRepository::count(&mut session).await,
        Err(DbError::NoActiveTransaction { .. })
    ));
    assert!(matches!(
        session.commit().await,
        Err(DbError::NoActiveTransaction { .. })
    ));
    assert_ok!(session.rollback().await);

    assert_ok!(session.begin().await);
    assert_eq!(session.state(), SessionState::Active);
    assert!(session.holds_connection());
    assert!(matches!(
        session.begin().await,
        Err(DbError::SessionAlreadyActive { .. })
    ));

    let user = UserRepository::create(&mut session, NewUser::new("Ann", "ann@example.com"))
        .await
        .unwrap();
    assert!(user.id > 0);

    assert_ok!(session.commit().await);
    assert_eq!(session.state(), SessionState::Committed);
    assert!(!session.holds_connection());

    // One transaction per session
    assert!(matches!(
        session.begin().await,
        Err(DbError::SessionAlreadyActive { .. })
    ));
    assert!(matches!(
        session.commit().await,
        Err(DbError::NoActiveTransaction { .. })
    ));
    assert_ok!(session.rollback().await);

    assert_ok!(session.close().await);
    assert_eq!(session.state(), SessionState::Closed);
    assert!(matches!(
        session.close().await,
        Err(DbError::SessionClosed { .. })
    ));
    assert!(matches!(
        session.begin().await,
        Err(DbError::SessionClosed { .. })
    ));
    assert!(matches!(
        UserRepository::count(&mut session).await,
        Err(DbError::SessionClosed { .. })
    ));
    assert!(matches!(
        session.rollback().await,
        Err(DbError::SessionClosed { .. })
    ));

    assert_eq!(user_count(&manager).await, 1);
}

#[tokio::test]
async fn test_rollback_discards_changes() {
    let (manager, _dir) = setup(PoolOptions::default()).await;
    let mut session = manager.new_session().await.unwrap();
    session.begin().await.unwrap();
    UserRepository::create(&mut session, NewUser::new("Bob", "bob@example.com"))
        .await
        .unwrap();
    assert_eq!(UserRepository::count(&mut session).await.unwrap(), 1);

    assert_ok!(session.rollback().await);
    assert_eq!(session.state(), SessionState::RolledBack);
    // Safe to repeat
    assert_ok!(session.rollback().await);
    assert_ok!(session.close().await);

    assert_eq!(user_count(&manager).await, 0);
}

#[tokio::test]
async fn test_failed_operation_makes_transaction_rollback_only() {
    let (manager, _dir) = setup(PoolOptions::default()).await;
    let mut session = manager.new_session().await.unwrap();
    session.begin().await.unwrap();

    UserRepository::create(&mut session, NewUser::new("Cy", "cy@example.com"))
        .await
        .unwrap();
    let err = UserRepository::create(&mut session, NewUser::new("Cy 2", "cy@example.com"))
        .await
        .unwrap_err();
    assert!(err.is_unique_violation(), "unexpected error: {err}");

    assert!(matches!(
        UserRepository::count(&mut session).await,
        Err(DbError::TransactionAborted { .. })
    ));
    assert!(matches!(
        session.commit().await,
        Err(DbError::TransactionAborted { .. })
    ));
    assert_eq!(session.state(), SessionState::RolledBack);
    assert_ok!(session.rollback().await);
    assert_ok!(session.close().await);

    // The insert that succeeded before the failure is gone too
    assert_eq!(user_count(&manager).await, 0);
}

#[tokio::test]
async fn test_validation_errors_do_not_touch_the_transaction() {
    let (manager, _dir) = setup(PoolOptions::default()).await;
    let mut session = manager.new_session().await.unwrap();
    session.begin().await.unwrap();

    let result = UserRepository::create(&mut session, NewUser::new("", "nobody@example.com")).await;
    assert!(matches!(result, Err(DbError::InvalidInput { .. })));

    UserRepository::create(&mut session, NewUser::new("Dee", "dee@example.com"))
        .await
        .unwrap();
    assert_ok!(session.commit().await);
    assert_eq!(user_count(&manager).await, 1);
}

#[tokio::test]
async fn test_run_in_transaction_commits_on_ok_and_rolls_back_on_err() {
    let (manager, _dir) = setup(PoolOptions::default()).await;

    let user = manager
        .run_in_transaction(|session| {
            Box::pin(UserRepository::create(
                session,
                NewUser::new("Eve", "eve@example.com"),
            ))
        })
        .await
        .unwrap();
    assert_eq!(user.email, "eve@example.com");

    let result: Result<(), DbError> = manager
        .run_in_transaction(|session| {
            Box::pin(async move {
                UserRepository::create(session, NewUser::new("Fay", "fay@example.com")).await?;
                Err::<(), _>(DbError::invalid_input("abandon this unit of work"))
            })
        })
        .await;
    assert_err!(result);

    assert_eq!(user_count(&manager).await, 1);
    assert_eq!(manager.status().await.unwrap().active_sessions, 0);
}

#[tokio::test]
async fn test_dropped_session_returns_connection_without_committing() {
    let (manager, _dir) = setup(single_connection()).await;
    {
        let mut session = manager.new_session().await.unwrap();
        session.begin().await.unwrap();
        UserRepository::create(&mut session, NewUser::new("Gus", "gus@example.com"))
            .await
            .unwrap();
        // Dropped while active
    }

    let mut session = manager
        .new_session_with_timeout(Duration::from_secs(5))
        .await
        .unwrap();
    assert_ok!(session.begin().await);
    assert_eq!(UserRepository::count(&mut session).await.unwrap(), 0);
    assert_ok!(session.commit().await);
    assert_ok!(session.close().await);
}

#[tokio::test]
async fn test_cancelled_unit_of_work_rolls_back() {
    let (manager, _dir) = setup(single_connection()).await;
    let (created_tx, created_rx) = tokio::sync::oneshot::channel();

    let worker = manager.clone();
    let handle = tokio::spawn(async move {
        worker
            .run_in_transaction(move |session| {
                Box::pin(async move {
                    UserRepository::create(session, NewUser::new("Hal", "hal@example.com"))
                        .await?;
                    let _ = created_tx.send(());
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok::<_, DbError>(())
                })
            })
            .await
    });

    created_rx.await.unwrap();
    handle.abort();
    assert!(handle.await.unwrap_err().is_cancelled());

    // The only connection comes back once the rollback has been flushed
    let mut session = manager
        .new_session_with_timeout(Duration::from_secs(5))
        .await
        .unwrap();
    assert_ok!(session.begin().await);
    assert_eq!(UserRepository::count(&mut session).await.unwrap(), 0);
    assert_ok!(session.close().await);
}

#[tokio::test]
async fn test_status_tracks_sessions_holding_connections() {
    let (manager, _dir) = setup(PoolOptions::default()).await;
    assert_eq!(manager.status().await.unwrap().active_sessions, 0);

    let mut first: Session = manager.new_session().await.unwrap();
    let mut second = manager.new_session().await.unwrap();
    // Lazy acquisition: opening a session leases nothing
    assert_eq!(manager.status().await.unwrap().active_sessions, 0);

    first.begin().await.unwrap();
    second.begin().await.unwrap();
    let status = manager.status().await.unwrap();
    assert_eq!(status.active_sessions, 2);
    assert_eq!(status.max_connections, 50);

    first.commit().await.unwrap();
    assert_eq!(manager.status().await.unwrap().active_sessions, 1);
    second.close().await.unwrap();
    assert_eq!(manager.status().await.unwrap().active_sessions, 0);
}
