//! Error types for managed database endpoints.
//!
//! Every variant carries enough context (endpoint name, table or statement)
//! to diagnose a failure from the error value alone.

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Configuration missing: endpoint '{endpoint}' has no usable '{field}' value")]
    ConfigurationMissing { endpoint: String, field: String },

    #[error("Unsupported database engine '{engine}' for endpoint '{endpoint}'")]
    UnsupportedEngine { endpoint: String, engine: String },

    #[error("Invalid address '{address}' for endpoint '{endpoint}': expected host:port")]
    AddressFormat { endpoint: String, address: String },

    #[error("Invalid port '{port}' for endpoint '{endpoint}': expected a number")]
    PortFormat { endpoint: String, port: String },

    #[error("Cannot open database '{endpoint}' ({target}): {message}")]
    ConnectionOpen {
        endpoint: String,
        /// Non-sensitive connection string
        target: String,
        message: String,
    },

    #[error("Ping to database '{endpoint}' ({target}) failed: {message}")]
    PingFailure {
        endpoint: String,
        target: String,
        message: String,
    },

    #[error("Unresolved placeholder ':{placeholder}' in statement: {statement}")]
    Translation {
        statement: String,
        placeholder: String,
    },

    #[error("Cannot begin transaction on '{endpoint}': {message}")]
    TransactionBegin { endpoint: String, message: String },

    #[error("Commit failed on '{endpoint}' (transaction: {transaction_id}): {message}")]
    TransactionCommit {
        endpoint: String,
        transaction_id: String,
        message: String,
    },

    #[error("Rollback failed on '{endpoint}' (transaction: {transaction_id}): {message}")]
    TransactionRollback {
        endpoint: String,
        transaction_id: String,
        message: String,
    },

    #[error("{operation} failed after {attempts} attempts: {source}")]
    RetryExhausted {
        operation: String,
        attempts: u32,
        #[source]
        source: Box<DbError>,
    },

    #[error("Database endpoint '{endpoint}' is not configured")]
    NotConfigured { endpoint: String },

    #[error("Database endpoint '{endpoint}' is not connected")]
    NotConnected { endpoint: String },

    #[error("Database endpoint '{endpoint}' is not registered")]
    EndpointNotFound { endpoint: String },

    #[error("No row found in '{table}'")]
    RowNotFound { table: String },

    #[error("Expected exactly one row in '{table}', found {count}")]
    MultipleRows { table: String, count: usize },

    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Database error: {message}")]
    Database {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
        suggestion: String,
    },

    #[error("Timeout: {operation} exceeded {elapsed_ms}ms")]
    Timeout { operation: String, elapsed_ms: u64 },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Script '{path}' failed: {message}")]
    Script { path: String, message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("Fatal failure on endpoint '{endpoint}': {source}")]
    Fatal {
        endpoint: String,
        #[source]
        source: Box<DbError>,
    },
}

impl DbError {
    /// Create a configuration-missing error.
    pub fn configuration_missing(endpoint: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ConfigurationMissing {
            endpoint: endpoint.into(),
            field: field.into(),
        }
    }

    /// Create an unsupported engine error.
    pub fn unsupported_engine(endpoint: impl Into<String>, engine: impl Into<String>) -> Self {
        Self::UnsupportedEngine {
            endpoint: endpoint.into(),
            engine: engine.into(),
        }
    }

    pub fn address_format(endpoint: impl Into<String>, address: impl Into<String>) -> Self {
        Self::AddressFormat {
            endpoint: endpoint.into(),
            address: address.into(),
        }
    }

    pub fn port_format(endpoint: impl Into<String>, port: impl Into<String>) -> Self {
        Self::PortFormat {
            endpoint: endpoint.into(),
            port: port.into(),
        }
    }

    /// Create a connection-open error.
    pub fn connection_open(
        endpoint: impl Into<String>,
        target: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::ConnectionOpen {
            endpoint: endpoint.into(),
            target: target.into(),
            message: message.into(),
        }
    }

    /// Create a ping failure error.
    pub fn ping_failure(
        endpoint: impl Into<String>,
        target: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::PingFailure {
            endpoint: endpoint.into(),
            target: target.into(),
            message: message.into(),
        }
    }

    /// Create a translation error for an unresolved placeholder.
    pub fn translation(statement: impl Into<String>, placeholder: impl Into<String>) -> Self {
        Self::Translation {
            statement: statement.into(),
            placeholder: placeholder.into(),
        }
    }

    pub fn transaction_begin(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TransactionBegin {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    pub fn transaction_commit(
        endpoint: impl Into<String>,
        transaction_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::TransactionCommit {
            endpoint: endpoint.into(),
            transaction_id: transaction_id.into(),
            message: message.into(),
        }
    }

    pub fn transaction_rollback(
        endpoint: impl Into<String>,
        transaction_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::TransactionRollback {
            endpoint: endpoint.into(),
            transaction_id: transaction_id.into(),
            message: message.into(),
        }
    }

    /// Wrap the final error of a retry loop.
    pub fn retry_exhausted(operation: impl Into<String>, attempts: u32, last: DbError) -> Self {
        Self::RetryExhausted {
            operation: operation.into(),
            attempts,
            source: Box::new(last),
        }
    }

    pub fn not_configured(endpoint: impl Into<String>) -> Self {
        Self::NotConfigured {
            endpoint: endpoint.into(),
        }
    }

    pub fn not_connected(endpoint: impl Into<String>) -> Self {
        Self::NotConnected {
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint_not_found(endpoint: impl Into<String>) -> Self {
        Self::EndpointNotFound {
            endpoint: endpoint.into(),
        }
    }

    pub fn row_not_found(table: impl Into<String>) -> Self {
        Self::RowNotFound {
            table: table.into(),
        }
    }

    pub fn multiple_rows(table: impl Into<String>, count: usize) -> Self {
        Self::MultipleRows {
            table: table.into(),
            count,
        }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a database error with optional SQL state.
    pub fn database(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Database {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, elapsed: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn script(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Script {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Mark an error as fatal for its endpoint. Already-fatal errors are returned as-is.
    pub fn fatal(endpoint: impl Into<String>, source: DbError) -> Self {
        match source {
            fatal @ Self::Fatal { .. } => fatal,
            source => Self::Fatal {
                endpoint: endpoint.into(),
                source: Box::new(source),
            },
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Database { suggestion, .. } => Some(suggestion),
            _ => None,
        }
    }

    /// True if the endpoint was configured with `must_connected` and the caller
    /// should not continue with it.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal { .. })
    }

    /// Strip a `Fatal` wrapper, returning the underlying error kind.
    pub fn into_inner(self) -> DbError {
        match self {
            Self::Fatal { source, .. } => *source,
            other => other,
        }
    }

    /// Check if repeating the operation after a reconnect may succeed.
    ///
    /// Deterministic failures (bad input, missing configuration, wrong row
    /// counts) are never retried.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::ConfigurationMissing { .. }
                | Self::UnsupportedEngine { .. }
                | Self::AddressFormat { .. }
                | Self::PortFormat { .. }
                | Self::Translation { .. }
                | Self::NotConfigured { .. }
                | Self::EndpointNotFound { .. }
                | Self::RowNotFound { .. }
                | Self::MultipleRows { .. }
                | Self::InvalidInput { .. }
                | Self::Script { .. }
                | Self::Fatal { .. }
        )
    }
}

/// How configuration and connection failures of one endpoint are surfaced.
///
/// The library never terminates the process: a `Fatal` policy wraps the
/// error in [`DbError::Fatal`] and the composition root decides what to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    Fatal,
    #[default]
    Recoverable,
}

impl FailurePolicy {
    pub fn from_must_connect(must_connect: bool) -> Self {
        if must_connect {
            Self::Fatal
        } else {
            Self::Recoverable
        }
    }

    pub fn apply(self, endpoint: &str, err: DbError) -> DbError {
        match self {
            Self::Fatal => DbError::fatal(endpoint, err),
            Self::Recoverable => err,
        }
    }
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::connection(
                msg.to_string(),
                "Check the connection options and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DbError::database(
                    db_err.message(),
                    code,
                    "Check the SQL syntax and referenced objects",
                )
            }
            sqlx::Error::RowNotFound => DbError::database(
                "No rows returned",
                None,
                "Verify the query conditions match existing data",
            ),
            sqlx::Error::PoolTimedOut => {
                DbError::connection("Timed out acquiring a pooled connection", "Reconnect the endpoint")
            }
            sqlx::Error::PoolClosed => {
                DbError::connection("Connection pool is closed", "Reconnect the endpoint")
            }
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::ColumnNotFound(col) => {
                DbError::invalid_input(format!("Column not found: {}", col))
            }
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::internal(format!("Decode error: {}", source)),
            sqlx::Error::WorkerCrashed => {
                DbError::connection("Database worker crashed", "Reconnect the endpoint")
            }
            _ => DbError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;
