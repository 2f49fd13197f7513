//! Statement execution against sqlx executors.
//!
//! # Architecture
//!
//! One submodule per backend (`mysql`, `postgres`, `sqlite`), each with the
//! same two functions generic over the sqlx `Executor`, so a pool and a
//! transaction's dedicated connection share the code. The modules are
//! deliberately parallel to keep backend differences visible.
//!
//! Statements without arguments are sent unprepared so that scripts with
//! several statements, and DDL some servers refuse to prepare, still run.

use crate::db::params::{bind_mysql, bind_postgres, bind_sqlite};
use crate::db::types::RowToJson;
use crate::error::{DbError, DbResult};
use crate::models::{ExecOutcome, QueryParam, Row};
use futures_util::StreamExt;
use std::time::Duration;
use tokio::time::timeout;

fn collect_rows<R: RowToJson>(results: Vec<Result<R, sqlx::Error>>) -> DbResult<Vec<Row>> {
    let mut rows = Vec::with_capacity(results.len());
    for result in results {
        rows.push(result.map_err(DbError::from)?.to_json_map());
    }
    Ok(rows)
}

fn timeout_error(operation: &str, elapsed: Duration) -> DbError {
    DbError::timeout(operation, elapsed)
}

pub(crate) mod mysql {
    use super::*;
    use sqlx::{Executor, MySql};

    pub async fn execute<'c, E>(
        executor: E,
        sql: &str,
        params: &[QueryParam],
        query_timeout: Duration,
    ) -> DbResult<ExecOutcome>
    where
        E: Executor<'c, Database = MySql>,
    {
        let result = if params.is_empty() {
            timeout(query_timeout, executor.execute(sql)).await
        } else {
            let query = bind_mysql(sql, params);
            timeout(query_timeout, query.execute(executor)).await
        };

        match result {
            Ok(Ok(r)) => Ok(ExecOutcome {
                rows_affected: r.rows_affected(),
                last_insert_id: i64::try_from(r.last_insert_id()).ok().filter(|id| *id != 0),
            }),
            Ok(Err(e)) => Err(DbError::from(e)),
            Err(_) => Err(timeout_error("statement execution", query_timeout)),
        }
    }

    pub async fn fetch_all<'c, E>(
        executor: E,
        sql: &str,
        params: &[QueryParam],
        query_timeout: Duration,
    ) -> DbResult<Vec<Row>>
    where
        E: Executor<'c, Database = MySql>,
    {
        let rows_future = if params.is_empty() {
            executor.fetch(sql).collect::<Vec<_>>()
        } else {
            let query = bind_mysql(sql, params);
            query.fetch(executor).collect::<Vec<_>>()
        };

        match timeout(query_timeout, rows_future).await {
            Ok(results) => collect_rows(results),
            Err(_) => Err(timeout_error("query execution", query_timeout)),
        }
    }
}

pub(crate) mod postgres {
    use super::*;
    use sqlx::{Executor, Postgres};

    pub async fn execute<'c, E>(
        executor: E,
        sql: &str,
        params: &[QueryParam],
        query_timeout: Duration,
    ) -> DbResult<ExecOutcome>
    where
        E: Executor<'c, Database = Postgres>,
    {
        let result = if params.is_empty() {
            timeout(query_timeout, executor.execute(sql)).await
        } else {
            let query = bind_postgres(sql, params);
            timeout(query_timeout, query.execute(executor)).await
        };

        // PostgreSQL has no last-insert-id; INSERT ... RETURNING is used instead
        match result {
            Ok(Ok(r)) => Ok(ExecOutcome {
                rows_affected: r.rows_affected(),
                last_insert_id: None,
            }),
            Ok(Err(e)) => Err(DbError::from(e)),
            Err(_) => Err(timeout_error("statement execution", query_timeout)),
        }
    }

    pub async fn fetch_all<'c, E>(
        executor: E,
        sql: &str,
        params: &[QueryParam],
        query_timeout: Duration,
    ) -> DbResult<Vec<Row>>
    where
        E: Executor<'c, Database = Postgres>,
    {
        let rows_future = if params.is_empty() {
            executor.fetch(sql).collect::<Vec<_>>()
        } else {
            let query = bind_postgres(sql, params);
            query.fetch(executor).collect::<Vec<_>>()
        };

        match timeout(query_timeout, rows_future).await {
            Ok(results) => collect_rows(results),
            Err(_) => Err(timeout_error("query execution", query_timeout)),
        }
    }
}

pub(crate) mod sqlite {
    use super::*;
    use sqlx::{Executor, Sqlite};

    pub async fn execute<'c, E>(
        executor: E,
        sql: &str,
        params: &[QueryParam],
        query_timeout: Duration,
    ) -> DbResult<ExecOutcome>
    where
        E: Executor<'c, Database = Sqlite>,
    {
        let result = if params.is_empty() {
            timeout(query_timeout, executor.execute(sql)).await
        } else {
            let query = bind_sqlite(sql, params);
            timeout(query_timeout, query.execute(executor)).await
        };

        match result {
            Ok(Ok(r)) => Ok(ExecOutcome {
                rows_affected: r.rows_affected(),
                last_insert_id: Some(r.last_insert_rowid()).filter(|id| *id != 0),
            }),
            Ok(Err(e)) => Err(DbError::from(e)),
            Err(_) => Err(timeout_error("statement execution", query_timeout)),
        }
    }

    pub async fn fetch_all<'c, E>(
        executor: E,
        sql: &str,
        params: &[QueryParam],
        query_timeout: Duration,
    ) -> DbResult<Vec<Row>>
    where
        E: Executor<'c, Database = Sqlite>,
    {
        let rows_future = if params.is_empty() {
            executor.fetch(sql).collect::<Vec<_>>()
        } else {
            let query = bind_sqlite(sql, params);
            query.fetch(executor).collect::<Vec<_>>()
        };

        match timeout(query_timeout, rows_future).await {
            Ok(results) => collect_rows(results),
            Err(_) => Err(timeout_error("query execution", query_timeout)),
        }
    }
}
