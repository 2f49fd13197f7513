//! Database layer.
//!
//! - Connection strings and statement classification
//! - Named-parameter translation and SQL building
//! - The driver seam and its sqlx implementation
//! - Endpoints, transactions, retry and the endpoint registry

pub mod connection_string;
pub mod ddl;
pub mod endpoint;
pub mod executor;
pub(crate) mod facade;
pub mod handle;
#[macro_use]
pub mod macros;
pub mod params;
pub mod pool;
pub mod registry;
pub mod retry;
pub mod sql_builder;
pub mod transaction;
pub mod translator;
pub mod tx;
pub mod types;

pub use connection_string::{ConnectionParts, build_connection_string};
pub use ddl::is_ddl;
pub use endpoint::DatabaseEndpoint;
pub use handle::{CannotConnectHook, Connector, DatabaseHandle, TransactionHandle};
pub use pool::{DbPool, SqlxConnector, SqlxHandle};
pub use registry::EndpointRegistry;
pub use retry::RetryPolicy;
pub use transaction::EndpointTransaction;
pub use translator::{Translation, translate};
