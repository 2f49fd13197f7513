//! sqlx transactions on a dedicated pooled connection.
//!
//! The transaction is opened with explicit statements rather than
//! `Pool::begin` so the isolation level can be set per engine. The
//! connection only returns to its pool after a successful COMMIT or
//! ROLLBACK; in every other case it is detached and dropped, which ends
//! the session and makes the server discard the open transaction.

use crate::db::executor::{mysql, postgres, sqlite};
use crate::db::handle::TransactionHandle;
use crate::db::pool::DbPool;
use crate::db::sql_builder::begin_statements;
use crate::error::{DbError, DbResult};
use crate::models::{EngineKind, ExecOutcome, IsolationLevel, QueryParam, Row};
use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::{MySql, Postgres, Sqlite};
use std::time::Duration;
use tracing::{debug, warn};

/// Connection dedicated to one open transaction.
pub enum TxConnection {
    MySql(PoolConnection<MySql>),
    Postgres(PoolConnection<Postgres>),
    SQLite(PoolConnection<Sqlite>),
}

impl TxConnection {
    async fn acquire(pool: &DbPool) -> DbResult<Self> {
        Ok(match pool {
            DbPool::MySql(p) => TxConnection::MySql(p.acquire().await?),
            DbPool::Postgres(p) => TxConnection::Postgres(p.acquire().await?),
            DbPool::SQLite(p) => TxConnection::SQLite(p.acquire().await?),
        })
    }

    async fn execute(
        &mut self,
        sql: &str,
        args: &[QueryParam],
        query_timeout: Duration,
    ) -> DbResult<ExecOutcome> {
        impl_tx_dispatch!(self, {
            MySql(c) => mysql::execute(&mut **c, sql, args, query_timeout).await,
            Postgres(c) => postgres::execute(&mut **c, sql, args, query_timeout).await,
            SQLite(c) => sqlite::execute(&mut **c, sql, args, query_timeout).await,
        })
    }

    async fn fetch_all(
        &mut self,
        sql: &str,
        args: &[QueryParam],
        query_timeout: Duration,
    ) -> DbResult<Vec<Row>> {
        impl_tx_dispatch!(self, {
            MySql(c) => mysql::fetch_all(&mut **c, sql, args, query_timeout).await,
            Postgres(c) => postgres::fetch_all(&mut **c, sql, args, query_timeout).await,
            SQLite(c) => sqlite::fetch_all(&mut **c, sql, args, query_timeout).await,
        })
    }

    /// Drop the connection without returning it to the pool.
    fn discard(self) {
        impl_tx_dispatch!(self, {
            MySql(c) => drop(c.detach()),
            Postgres(c) => drop(c.detach()),
            SQLite(c) => drop(c.detach()),
        })
    }
}

/// An open sqlx transaction.
pub struct SqlxTransaction {
    conn: Option<TxConnection>,
    engine: EngineKind,
    query_timeout: Duration,
}

impl SqlxTransaction {
    pub async fn begin(
        pool: &DbPool,
        isolation: IsolationLevel,
        query_timeout: Duration,
    ) -> DbResult<Self> {
        let engine = pool.engine();
        let statements = begin_statements(engine, isolation).ok_or_else(|| {
            DbError::invalid_input(format!(
                "Isolation level '{}' is not supported by {}",
                isolation, engine
            ))
        })?;

        let mut conn = TxConnection::acquire(pool).await?;
        for statement in &statements {
            if let Err(e) = conn.execute(statement, &[], query_timeout).await {
                conn.discard();
                return Err(e);
            }
        }

        debug!(engine = %engine, isolation = %isolation, "Transaction opened");
        Ok(Self {
            conn: Some(conn),
            engine,
            query_timeout,
        })
    }

    pub fn engine(&self) -> EngineKind {
        self.engine
    }

    fn conn(&mut self) -> DbResult<&mut TxConnection> {
        self.conn
            .as_mut()
            .ok_or_else(|| DbError::invalid_input("Transaction is no longer active"))
    }
}

#[async_trait]
impl TransactionHandle for SqlxTransaction {
    async fn execute(&mut self, sql: &str, args: &[QueryParam]) -> DbResult<ExecOutcome> {
        let query_timeout = self.query_timeout;
        self.conn()?.execute(sql, args, query_timeout).await
    }

    async fn fetch_all(&mut self, sql: &str, args: &[QueryParam]) -> DbResult<Vec<Row>> {
        let query_timeout = self.query_timeout;
        self.conn()?.fetch_all(sql, args, query_timeout).await
    }

    async fn commit(&mut self) -> DbResult<()> {
        let query_timeout = self.query_timeout;
        // On failure the connection stays, so the caller can still roll back
        self.conn()?.execute("COMMIT", &[], query_timeout).await?;
        self.conn = None;
        Ok(())
    }

    async fn rollback(&mut self) -> DbResult<()> {
        let query_timeout = self.query_timeout;
        let result = self.conn()?.execute("ROLLBACK", &[], query_timeout).await;
        if let Some(conn) = self.conn.take() {
            if result.is_err() {
                conn.discard();
            }
        }
        result.map(|_| ())
    }
}

impl Drop for SqlxTransaction {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            warn!(engine = %self.engine, "Open transaction dropped; discarding its connection");
            conn.discard();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolOptions;

    async fn file_pool(dir: &tempfile::TempDir) -> DbPool {
        let path = dir.path().join("tx.db");
        let url = format!("sqlite:{}?mode=rwc", path.display());
        let opts = PoolOptions {
            max_connections: Some(2),
            ..Default::default()
        };
        let pool = DbPool::connect_lazy(EngineKind::SQLite, &url, &opts).unwrap();
        if let DbPool::SQLite(p) = &pool {
            sqlx::query("CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT)")
                .execute(p)
                .await
                .unwrap();
        }
        pool
    }

    async fn count(pool: &DbPool) -> i64 {
        match pool {
            DbPool::SQLite(p) => sqlx::query_scalar("SELECT COUNT(*) FROM items")
                .fetch_one(p)
                .await
                .unwrap(),
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_commit_persists_and_releases() {
        let dir = tempfile::tempdir().unwrap();
        let pool = file_pool(&dir).await;
        let timeout = Duration::from_secs(5);

        let mut tx = SqlxTransaction::begin(&pool, IsolationLevel::Default, timeout)
            .await
            .unwrap();
        tx.execute(
            "INSERT INTO items (name) VALUES (?)",
            &[QueryParam::from("a")],
        )
        .await
        .unwrap();
        let rows = tx.fetch_all("SELECT name FROM items", &[]).await.unwrap();
        assert_eq!(rows.len(), 1);
        tx.commit().await.unwrap();
        assert!(tx.conn.is_none());

        assert_eq!(count(&pool).await, 1);
    }

    #[tokio::test]
    async fn test_rollback_discards_changes() {
        let dir = tempfile::tempdir().unwrap();
        let pool = file_pool(&dir).await;
        let timeout = Duration::from_secs(5);

        let mut tx = SqlxTransaction::begin(&pool, IsolationLevel::Serializable, timeout)
            .await
            .unwrap();
        tx.execute("INSERT INTO items (name) VALUES ('b')", &[])
            .await
            .unwrap();
        tx.rollback().await.unwrap();

        assert_eq!(count(&pool).await, 0);
        assert!(tx.execute("SELECT 1", &[]).await.is_err());
    }

    #[tokio::test]
    async fn test_unsupported_isolation_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let pool = file_pool(&dir).await;
        let result =
            SqlxTransaction::begin(&pool, IsolationLevel::ReadCommitted, Duration::from_secs(5))
                .await;
        assert!(matches!(result, Err(DbError::InvalidInput { .. })));
    }

    #[tokio::test]
    async fn test_dropped_transaction_is_rolled_back() {
        let dir = tempfile::tempdir().unwrap();
        let pool = file_pool(&dir).await;
        {
            let mut tx =
                SqlxTransaction::begin(&pool, IsolationLevel::Default, Duration::from_secs(5))
                    .await
                    .unwrap();
            tx.execute("INSERT INTO items (name) VALUES ('c')", &[])
                .await
                .unwrap();
        }
        assert_eq!(count(&pool).await, 0);
    }
}
