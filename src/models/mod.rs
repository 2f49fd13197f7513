//! Data models for managed database endpoints.
//!
//! This module re-exports all model types used throughout the crate.

pub mod endpoint;
pub mod query;
pub mod transaction;

// Re-export commonly used types
pub use endpoint::{EndpointSettings, EndpointSummary, EngineKind};
pub use query::{ExecOutcome, Params, QueryParam, Row, SelectQuery, SortOrder};
pub use transaction::IsolationLevel;
