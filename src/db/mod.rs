//! Database abstraction layer.
//!
//! This module provides database access functionality:
//! - Connection pool management and the pool manager
//! - Sessions (one transaction per unit of work)
//! - Schema definitions rendered per backend
//! - Database dispatch macros for reducing code duplication

pub(crate) mod macros;
pub mod pool;
pub mod schema;
pub mod session;

pub use pool::{DbPool, PoolManager, PoolStatus};
pub use session::{DbTransaction, Session, SessionState};
