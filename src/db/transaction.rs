//! One unit of work on a dedicated connection.

use crate::db::facade;
use crate::db::handle::TransactionHandle;
use crate::error::{DbError, DbResult};
use crate::models::{EngineKind, ExecOutcome, IsolationLevel, Params, Row, SelectQuery};
use tracing::{Span, debug, error, info_span, warn};
use uuid::Uuid;

/// An open transaction. `commit` and `rollback` consume it; dropping it
/// unfinished discards its connection, which rolls the work back.
pub struct EndpointTransaction {
    handle: Box<dyn TransactionHandle>,
    engine: EngineKind,
    endpoint: String,
    id: String,
    isolation: IsolationLevel,
    span: Span,
    finished: bool,
}

impl std::fmt::Debug for EndpointTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointTransaction")
            .field("endpoint", &self.endpoint)
            .field("id", &self.id)
            .field("engine", &self.engine)
            .field("isolation", &self.isolation)
            .finish_non_exhaustive()
    }
}

impl EndpointTransaction {
    pub(crate) fn new(
        handle: Box<dyn TransactionHandle>,
        engine: EngineKind,
        endpoint: impl Into<String>,
        isolation: IsolationLevel,
    ) -> Self {
        let endpoint = endpoint.into();
        let id = format!("tx_{}", Uuid::new_v4().simple());
        let span = info_span!(
            "transaction",
            endpoint = %endpoint,
            transaction_id = %id,
            isolation = %isolation
        );
        debug!(parent: &span, "Transaction started");
        Self {
            handle,
            engine,
            endpoint,
            id,
            isolation,
            span,
            finished: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    pub fn engine(&self) -> EngineKind {
        self.engine
    }

    /// Span every statement of this transaction is logged under.
    pub fn span(&self) -> &Span {
        &self.span
    }

    pub async fn insert(&mut self, table: &str, id_column: &str, values: &Params) -> DbResult<i64> {
        debug!(parent: &self.span, table = %table, "insert");
        facade::insert(&mut self.handle, self.engine, table, id_column, values).await
    }

    pub async fn update(
        &mut self,
        table: &str,
        set_values: &Params,
        where_values: &Params,
    ) -> DbResult<u64> {
        debug!(parent: &self.span, table = %table, "update");
        facade::update(&mut self.handle, self.engine, table, set_values, where_values).await
    }

    pub async fn select(&mut self, query: &SelectQuery) -> DbResult<Vec<Row>> {
        facade::select(&mut self.handle, self.engine, query).await
    }

    /// First matching row. Not retried: a reconnect cannot resume a
    /// transaction.
    pub async fn select_one(&mut self, query: &SelectQuery) -> DbResult<Option<Row>> {
        facade::select_one(&mut self.handle, self.engine, query).await
    }

    pub async fn must_select_one(&mut self, query: &SelectQuery) -> DbResult<Row> {
        facade::must_select_one(&mut self.handle, self.engine, query).await
    }

    pub async fn execute(&mut self, statement: &str, params: &Params) -> DbResult<ExecOutcome> {
        debug!(parent: &self.span, "execute");
        facade::execute(&mut self.handle, self.engine, statement, params).await
    }

    pub async fn property_value(&mut self, key: &str) -> DbResult<String> {
        facade::property_value(&mut self.handle, self.engine, key).await
    }

    /// Commit. On failure a rollback is attempted and the commit error is
    /// returned.
    pub async fn commit(mut self) -> DbResult<()> {
        self.finished = true;
        match self.handle.commit().await {
            Ok(()) => {
                debug!(parent: &self.span, "Transaction committed");
                Ok(())
            }
            Err(e) => {
                warn!(parent: &self.span, error = %e, "Commit failed; rolling back");
                if let Err(rollback_err) = self.handle.rollback().await {
                    error!(
                        parent: &self.span,
                        error = %rollback_err,
                        "Rollback after failed commit failed"
                    );
                }
                Err(DbError::transaction_commit(
                    &self.endpoint,
                    &self.id,
                    e.to_string(),
                ))
            }
        }
    }

    pub async fn rollback(mut self) -> DbResult<()> {
        self.finished = true;
        self.handle
            .rollback()
            .await
            .map_err(|e| DbError::transaction_rollback(&self.endpoint, &self.id, e.to_string()))?;
        debug!(parent: &self.span, "Transaction rolled back");
        Ok(())
    }
}

impl Drop for EndpointTransaction {
    fn drop(&mut self) {
        if !self.finished {
            warn!(parent: &self.span, "Transaction dropped without commit or rollback");
        }
    }
}
