//! Yeastar Connector Database Layer
//!
//! This crate provides PostgreSQL database access and repository implementations
//! for the Yeastar connector. It includes:
//!
//! - Connection pool management with sqlx
//! - Embedded schema migrations
//! - Repository implementations for call logs, parties, and agents
//! - In-memory repositories with the same semantics, for tests and local runs

pub mod memory;
pub mod pool;
pub mod repositories;

pub use pool::{create_pool, run_migrations};
pub use repositories::*;

// Re-export commonly used types
pub use sqlx::PgPool;
pub use yeastar_core::{AppError, AppResult};
