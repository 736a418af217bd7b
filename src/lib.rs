//! pooldb library
//!
//! A pooled, session-scoped data-access layer over SQLite and PostgreSQL:
//! a [`PoolManager`] owns the connection pool, [`Session`]s run one
//! transaction each, and the repositories read and write the entity set
//! (users, products, roles and policies) inside a session.
//!
//! ```ignore
//! let manager = PoolManager::new();
//! manager.init(ConnectionConfig::parse("sqlite:app.db?pool_size=5")?).await?;
//! manager.initialize_schema().await?;
//!
//! let user = manager
//!     .run_in_transaction(|session| {
//!         Box::pin(UserRepository::create(session, NewUser::new("Ann", "ann@example.com")))
//!     })
//!     .await?;
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod harness;
pub mod models;
pub mod repository;

pub use config::PoolOptions;
pub use db::{PoolManager, PoolStatus, Session, SessionState};
pub use error::{ConstraintKind, DbError, DbResult};
pub use models::ConnectionConfig;
pub use repository::{PolicyRepository, ProductRepository, RoleRepository, UserRepository};
