//! Ringline Entity Store
//!
//! Storage for call requests, sessions, reports, notifications and
//! commission overrides. It includes:
//!
//! - Connection pool management and schema bootstrap with sqlx
//! - PostgreSQL repositories whose call request mutations are single-row
//!   conditional updates (`... WHERE status = 'ringing'`)
//! - An in-memory store with the same semantics, used by tests and by
//!   deployments that run without a database

pub mod memory;
pub mod pool;
pub mod repositories;

pub use memory::MemoryStore;
pub use pool::{create_pool, ensure_schema};
pub use repositories::*;

// Re-export commonly used types
pub use ringline_core::{AppError, AppResult};
pub use sqlx::PgPool;
