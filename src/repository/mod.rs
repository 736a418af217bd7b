//! Repository operations per entity.
//!
//! Every operation runs inside the caller's [`Session`](crate::db::Session)
//! and its open transaction; nothing here commits. Lookups by id or unique
//! key return `Ok(None)` when nothing matches so callers can tell "not
//! found" apart from a failure. Inputs are validated before any storage
//! access and rejected with `InvalidInput`.
//!
//! Statements use `$N` placeholders, which both the PostgreSQL and SQLite
//! drivers accept, so one SQL text serves both backends.

pub mod policy;
pub mod product;
pub mod role;
pub mod user;

pub use policy::PolicyRepository;
pub use product::ProductRepository;
pub use role::RoleRepository;
pub use user::UserRepository;
