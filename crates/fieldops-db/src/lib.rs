//! FieldOps Database Layer
//!
//! This crate provides PostgreSQL database access and repository implementations
//! for the FieldOps system. It includes:
//!
//! - Connection pool management with sqlx
//! - Repository implementations for all domain entities
//! - JSONB-backed pause-history and note ledgers with schema validation at
//!   the read/write boundary
//! - Transaction support for atomic service + material-line deletion

pub mod pool;
pub mod repositories;

pub use pool::create_pool;
pub use repositories::*;

// Re-export commonly used types
pub use fieldops_core::{AppError, AppResult};
pub use sqlx::{PgPool, Postgres, Transaction};
