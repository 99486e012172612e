//! Database module for the PostgreSQL store.
//!
//! This module provides the connection pool, domain models and queries
//! using SQLx.

pub mod models;
pub mod pool;
pub mod queries;

pub use pool::{create_pool, run_migrations, DbPool};
