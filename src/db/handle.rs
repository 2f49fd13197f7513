//! Driver seam.
//!
//! An endpoint talks to its database only through these traits. The sqlx
//! implementation lives in [`crate::db::pool`]; tests substitute scripted
//! fakes.

use crate::error::{DbError, DbResult};
use crate::models::{EngineKind, ExecOutcome, IsolationLevel, QueryParam, Row};
use async_trait::async_trait;
use std::sync::Arc;

/// Opens live handles from connection strings.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a handle. Implementations may defer the first network round
    /// trip to [`DatabaseHandle::ping`].
    async fn open(
        &self,
        engine: EngineKind,
        connection_string: &str,
    ) -> DbResult<Arc<dyn DatabaseHandle>>;
}

/// A live, shareable connection pool for one endpoint.
#[async_trait]
pub trait DatabaseHandle: Send + Sync {
    fn engine(&self) -> EngineKind;

    /// Acquire a connection, ping it and release it.
    async fn ping(&self) -> DbResult<()>;

    async fn close(&self) -> DbResult<()>;

    /// Execute a statement. With no arguments the text is sent unprepared,
    /// so it may hold several statements.
    async fn execute(&self, sql: &str, args: &[QueryParam]) -> DbResult<ExecOutcome>;

    async fn fetch_all(&self, sql: &str, args: &[QueryParam]) -> DbResult<Vec<Row>>;

    /// Open a transaction on a dedicated connection.
    async fn begin(&self, isolation: IsolationLevel) -> DbResult<Box<dyn TransactionHandle>>;
}

/// One open transaction.
///
/// A failed `commit` leaves the handle usable for `rollback`. Dropping a
/// handle that was neither committed nor rolled back discards its
/// connection, which makes the server roll back.
#[async_trait]
pub trait TransactionHandle: Send {
    async fn execute(&mut self, sql: &str, args: &[QueryParam]) -> DbResult<ExecOutcome>;

    async fn fetch_all(&mut self, sql: &str, args: &[QueryParam]) -> DbResult<Vec<Row>>;

    async fn commit(&mut self) -> DbResult<()>;

    async fn rollback(&mut self) -> DbResult<()>;
}

/// Notified whenever an endpoint fails to open or ping its database.
pub trait CannotConnectHook: Send + Sync {
    fn on_cannot_connect(&self, endpoint: &str, error: &DbError);
}

impl<F> CannotConnectHook for F
where
    F: Fn(&str, &DbError) + Send + Sync,
{
    fn on_cannot_connect(&self, endpoint: &str, error: &DbError) {
        self(endpoint, error)
    }
}

/// Statement execution shared by endpoints and transactions.
#[async_trait]
pub(crate) trait StatementRunner: Send {
    async fn run_execute(&mut self, sql: &str, args: &[QueryParam]) -> DbResult<ExecOutcome>;
    async fn run_fetch(&mut self, sql: &str, args: &[QueryParam]) -> DbResult<Vec<Row>>;
}

/// Runs statements on a pooled handle.
pub(crate) struct HandleRunner<'a>(pub &'a dyn DatabaseHandle);

#[async_trait]
impl StatementRunner for HandleRunner<'_> {
    async fn run_execute(&mut self, sql: &str, args: &[QueryParam]) -> DbResult<ExecOutcome> {
        self.0.execute(sql, args).await
    }

    async fn run_fetch(&mut self, sql: &str, args: &[QueryParam]) -> DbResult<Vec<Row>> {
        self.0.fetch_all(sql, args).await
    }
}

#[async_trait]
impl StatementRunner for Box<dyn TransactionHandle> {
    async fn run_execute(&mut self, sql: &str, args: &[QueryParam]) -> DbResult<ExecOutcome> {
        (**self).execute(sql, args).await
    }

    async fn run_fetch(&mut self, sql: &str, args: &[QueryParam]) -> DbResult<Vec<Row>> {
        (**self).fetch_all(sql, args).await
    }
}
