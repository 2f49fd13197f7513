//! Managed database endpoints.
//!
//! Wraps sqlx pools with connection lifecycle management, named-parameter
//! statement translation, transactions with commit/rollback discipline and
//! reconnection on failure.

pub mod config;
pub mod db;
pub mod error;
pub mod models;

pub use config::{Config, StorageConfig};
pub use db::{DatabaseEndpoint, EndpointRegistry, EndpointTransaction, SqlxConnector};
pub use error::{DbError, DbResult, FailurePolicy};
