//! Scripted fake driver shared by the integration tests.
//!
//! Every counter is observable from the test, and failures are armed by
//! setting a flag or a countdown before the call under test.

#![allow(dead_code)]

use async_trait::async_trait;
use managed_db::config::StorageConfig;
use managed_db::db::{Connector, DatabaseEndpoint, DatabaseHandle, TransactionHandle};
use managed_db::error::{DbError, DbResult};
use managed_db::models::{EngineKind, ExecOutcome, IsolationLevel, QueryParam, Row};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
pub struct FakeState {
    pub opens: AtomicU32,
    pub pings: AtomicU32,
    pub closes: AtomicU32,
    pub fetches: AtomicU32,
    pub begins: AtomicU32,
    pub commits: AtomicU32,
    pub rollbacks: AtomicU32,

    pub fail_open: AtomicBool,
    /// Fail this many upcoming pings
    pub ping_failures: AtomicU32,
    /// Never answer pings
    pub hang_ping: AtomicBool,
    /// Fail this many upcoming fetches; each one also breaks the next ping
    pub fetch_failures: AtomicU32,
    pub fail_close: AtomicBool,
    pub fail_begin: AtomicBool,
    pub fail_commit: AtomicBool,
    pub fail_rollback: AtomicBool,

    pub rows: Mutex<Vec<Row>>,
    pub statements: Mutex<Vec<(String, Vec<QueryParam>)>>,
}

impl FakeState {
    pub fn count(counter: &AtomicU32) -> u32 {
        counter.load(Ordering::SeqCst)
    }

    pub fn set_rows(&self, rows: Vec<Row>) {
        *self.rows.lock().unwrap() = rows;
    }

    pub fn statements(&self) -> Vec<String> {
        self.statements
            .lock()
            .unwrap()
            .iter()
            .map(|(sql, _)| sql.clone())
            .collect()
    }

    fn record(&self, sql: &str, args: &[QueryParam]) {
        self.statements
            .lock()
            .unwrap()
            .push((sql.to_string(), args.to_vec()));
    }

    fn take_one(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

pub struct FakeConnector {
    pub state: Arc<FakeState>,
}

#[async_trait]
impl Connector for FakeConnector {
    async fn open(
        &self,
        engine: EngineKind,
        _connection_string: &str,
    ) -> DbResult<Arc<dyn DatabaseHandle>> {
        self.state.opens.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_open.load(Ordering::SeqCst) {
            return Err(DbError::connection("connection refused", "start the server"));
        }
        Ok(Arc::new(FakeHandle {
            engine,
            state: self.state.clone(),
        }))
    }
}

pub struct FakeHandle {
    engine: EngineKind,
    state: Arc<FakeState>,
}

#[async_trait]
impl DatabaseHandle for FakeHandle {
    fn engine(&self) -> EngineKind {
        self.engine
    }

    async fn ping(&self) -> DbResult<()> {
        self.state.pings.fetch_add(1, Ordering::SeqCst);
        if self.state.hang_ping.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if FakeState::take_one(&self.state.ping_failures) {
            return Err(DbError::connection("broken pipe", "reconnect"));
        }
        Ok(())
    }

    async fn close(&self) -> DbResult<()> {
        self.state.closes.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_close.load(Ordering::SeqCst) {
            return Err(DbError::connection("close failed", "retry"));
        }
        Ok(())
    }

    async fn execute(&self, sql: &str, args: &[QueryParam]) -> DbResult<ExecOutcome> {
        self.state.record(sql, args);
        Ok(ExecOutcome {
            rows_affected: 1,
            last_insert_id: Some(1),
        })
    }

    async fn fetch_all(&self, sql: &str, args: &[QueryParam]) -> DbResult<Vec<Row>> {
        self.state.fetches.fetch_add(1, Ordering::SeqCst);
        self.state.record(sql, args);
        if FakeState::take_one(&self.state.fetch_failures) {
            self.state.ping_failures.fetch_add(1, Ordering::SeqCst);
            return Err(DbError::connection("connection reset by peer", "reconnect"));
        }
        Ok(self.state.rows.lock().unwrap().clone())
    }

    async fn begin(&self, _isolation: IsolationLevel) -> DbResult<Box<dyn TransactionHandle>> {
        self.state.begins.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_begin.load(Ordering::SeqCst) {
            return Err(DbError::connection("pool timed out", "retry"));
        }
        Ok(Box::new(FakeTransaction {
            state: self.state.clone(),
        }))
    }
}

pub struct FakeTransaction {
    state: Arc<FakeState>,
}

#[async_trait]
impl TransactionHandle for FakeTransaction {
    async fn execute(&mut self, sql: &str, args: &[QueryParam]) -> DbResult<ExecOutcome> {
        self.state.record(sql, args);
        Ok(ExecOutcome {
            rows_affected: 1,
            last_insert_id: Some(1),
        })
    }

    async fn fetch_all(&mut self, sql: &str, args: &[QueryParam]) -> DbResult<Vec<Row>> {
        self.state.record(sql, args);
        Ok(self.state.rows.lock().unwrap().clone())
    }

    async fn commit(&mut self) -> DbResult<()> {
        if self.state.fail_commit.load(Ordering::SeqCst) {
            return Err(DbError::database("serialization failure", Some("40001".into()), ""));
        }
        self.state.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(&mut self) -> DbResult<()> {
        self.state.rollbacks.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_rollback.load(Ordering::SeqCst) {
            return Err(DbError::connection("connection lost", "reconnect"));
        }
        Ok(())
    }
}

/// Storage section for a PostgreSQL endpoint named `name`.
pub fn postgres_storage(name: &str, must_connect: bool) -> StorageConfig {
    StorageConfig::from_json_str(&format!(
        r#"{{"{name}": {{
            "database_type": "postgresql",
            "address": "db.internal:5432",
            "user_name": "app",
            "user_password": "secret",
            "database_name": "orders",
            "must_connected": {must_connect},
            "is_connect_at_start": true
        }}}}"#
    ))
    .unwrap()
}

/// A configured PostgreSQL endpoint backed by the fake driver.
pub fn fake_endpoint(name: &str) -> (DatabaseEndpoint, Arc<FakeState>) {
    let state = Arc::new(FakeState::default());
    let endpoint = DatabaseEndpoint::new(
        name,
        Arc::new(FakeConnector {
            state: state.clone(),
        }),
    );
    endpoint
        .apply_configuration(&postgres_storage(name, false))
        .unwrap();
    (endpoint, state)
}

pub fn row(value: serde_json::Value) -> Row {
    value.as_object().cloned().unwrap()
}
