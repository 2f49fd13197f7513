//! Managed database endpoint.
//!
//! # Architecture
//!
//! A `DatabaseEndpoint` moves through `Unconfigured -> Configured ->
//! {Connected, Disconnected}`:
//! - configuration is applied once and never replaced
//! - connect/disconnect/health transitions are serialized by an async mutex
//! - readers take the link lock only long enough to clone the handle `Arc`
//!
//! The endpoint holds a live handle exactly while it is connected. A failed
//! health check closes the handle; only `connect` (directly or through
//! `check_connection_and_reconnect`) opens a new one.

use crate::config::{DEFAULT_PING_TIMEOUT, DEFAULT_RECONNECT_BACKOFF, EndpointSection, StorageConfig};
use crate::db::connection_string::{
    ConnectionParts, build_connection_string, non_sensitive_connection_string,
};
use crate::db::facade;
use crate::db::handle::{CannotConnectHook, Connector, DatabaseHandle, HandleRunner};
use crate::db::retry::RetryPolicy;
use crate::db::transaction::EndpointTransaction;
use crate::error::{DbError, DbResult, FailurePolicy};
use crate::models::{
    EndpointSettings, EndpointSummary, EngineKind, ExecOutcome, IsolationLevel, Params, Row,
    SelectQuery,
};
use futures_util::future::BoxFuture;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::timeout;
use tracing::{Instrument, debug, error, info, warn};

/// One configured logical database.
pub struct DatabaseEndpoint {
    /// Name the endpoint was created with; its configuration section key
    registered_name: String,
    connector: Arc<dyn Connector>,
    hook: Option<Arc<dyn CannotConnectHook>>,
    settings: OnceLock<EndpointSettings>,
    link: RwLock<Option<Arc<dyn DatabaseHandle>>>,
    transition: Mutex<()>,
    ping_timeout: Duration,
    reconnect_backoff: Duration,
    retry: RetryPolicy,
    /// Used until configuration says otherwise
    must_connect_default: bool,
}

impl std::fmt::Debug for DatabaseEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseEndpoint")
            .field("name", &self.name())
            .field("settings", &self.settings.get())
            .field("ping_timeout", &self.ping_timeout)
            .field("reconnect_backoff", &self.reconnect_backoff)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl DatabaseEndpoint {
    pub fn new(name: impl Into<String>, connector: Arc<dyn Connector>) -> Self {
        Self {
            registered_name: name.into(),
            connector,
            hook: None,
            settings: OnceLock::new(),
            link: RwLock::new(None),
            transition: Mutex::new(()),
            ping_timeout: DEFAULT_PING_TIMEOUT,
            reconnect_backoff: DEFAULT_RECONNECT_BACKOFF,
            retry: RetryPolicy::default(),
            must_connect_default: false,
        }
    }

    pub fn with_cannot_connect_hook(mut self, hook: Arc<dyn CannotConnectHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn with_ping_timeout(mut self, ping_timeout: Duration) -> Self {
        self.ping_timeout = ping_timeout;
        self
    }

    pub fn with_reconnect_backoff(mut self, backoff: Duration) -> Self {
        self.reconnect_backoff = backoff;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Failure policy before configuration is applied, or when the section
    /// does not set `must_connected`.
    pub fn with_must_connect(mut self, must_connect: bool) -> Self {
        self.must_connect_default = must_connect;
        self
    }

    /// Effective name: the configured `nameid` once configured.
    pub fn name(&self) -> &str {
        self.settings
            .get()
            .map(|s| s.name_id.as_str())
            .unwrap_or(&self.registered_name)
    }

    pub fn registered_name(&self) -> &str {
        &self.registered_name
    }

    pub fn is_configured(&self) -> bool {
        self.settings.get().is_some()
    }

    pub fn settings(&self) -> Option<&EndpointSettings> {
        self.settings.get()
    }

    pub async fn is_connected(&self) -> bool {
        self.link.read().await.is_some()
    }

    pub async fn summary(&self) -> EndpointSummary {
        let settings = self.settings.get();
        EndpointSummary {
            name_id: self.name().to_string(),
            engine: settings.map(|s| s.engine),
            target: settings.map(|s| s.non_sensitive_connection_string.clone()),
            configured: settings.is_some(),
            connected: self.is_connected().await,
            must_connect: settings
                .map(|s| s.must_connect)
                .unwrap_or(self.must_connect_default),
        }
    }

    // ---- Configuration ----

    /// Resolve this endpoint's section of `config`. A no-op once configured.
    pub fn apply_configuration(&self, config: &StorageConfig) -> DbResult<()> {
        if self.is_configured() {
            return Ok(());
        }
        info!(endpoint = %self.registered_name, "Applying endpoint configuration");

        let section = config.endpoint(&self.registered_name);
        let policy = FailurePolicy::from_must_connect(
            section
                .and_then(|s| s.must_connected)
                .unwrap_or(self.must_connect_default),
        );
        let settings = self
            .resolve_settings(section)
            .map_err(|e| policy.apply(&self.registered_name, e))?;

        info!(
            endpoint = %settings.name_id,
            engine = %settings.engine,
            target = %settings.non_sensitive_connection_string,
            "Endpoint configured"
        );
        // A concurrent call may have won; either value came from the same section
        let _ = self.settings.set(settings);
        Ok(())
    }

    fn resolve_settings(&self, section: Option<&EndpointSection>) -> DbResult<EndpointSettings> {
        let endpoint = self.registered_name.as_str();
        let section =
            section.ok_or_else(|| DbError::configuration_missing(endpoint, "section"))?;

        let engine_value = required(endpoint, "database_type", &section.database_type)?;
        let engine = EngineKind::from_config_value(engine_value);
        if engine == EngineKind::Unknown {
            return Err(DbError::unsupported_engine(endpoint, engine_value));
        }

        let database_name = required(endpoint, "database_name", &section.database_name)?;
        // An embedded SQLite file needs no server or credentials
        let (address, user_name, user_password) = if engine == EngineKind::SQLite {
            (
                section.address.as_deref().unwrap_or_default(),
                section.user_name.as_deref().unwrap_or_default(),
                section.user_password.as_deref().unwrap_or_default(),
            )
        } else {
            (
                required(endpoint, "address", &section.address)?,
                required(endpoint, "user_name", &section.user_name)?,
                required(endpoint, "user_password", &section.user_password)?,
            )
        };
        let connection_options = section.connection_options.as_deref().unwrap_or_default();

        let connection_string = build_connection_string(&ConnectionParts {
            endpoint,
            engine,
            address,
            user_name,
            user_password,
            database_name,
            connection_options,
        })?;

        Ok(EndpointSettings {
            name_id: section
                .nameid
                .clone()
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| endpoint.to_string()),
            engine,
            address: address.to_string(),
            user_name: user_name.to_string(),
            user_password: user_password.to_string(),
            database_name: database_name.to_string(),
            connection_options: connection_options.to_string(),
            must_connect: section.must_connected.unwrap_or(self.must_connect_default),
            connect_at_start: section.is_connect_at_start.unwrap_or(false),
            create_script_files: section.create_script_files.clone(),
            connection_string,
            non_sensitive_connection_string: non_sensitive_connection_string(
                engine,
                address,
                database_name,
            ),
        })
    }

    fn configured_settings(&self) -> DbResult<&EndpointSettings> {
        self.settings
            .get()
            .ok_or_else(|| DbError::not_configured(&self.registered_name))
    }

    // ---- Connection lifecycle ----

    /// Open and ping the database. Succeeds without dialing when connected.
    pub async fn connect(&self) -> DbResult<()> {
        let settings = self.configured_settings()?;
        let _transition = self.transition.lock().await;
        if self.link.read().await.is_some() {
            debug!(endpoint = %settings.name_id, "Already connected");
            return Ok(());
        }

        info!(
            endpoint = %settings.name_id,
            target = %settings.non_sensitive_connection_string,
            "Connecting to database"
        );
        match self.open_and_ping(settings).await {
            Ok(handle) => {
                *self.link.write().await = Some(handle);
                info!(endpoint = %settings.name_id, "Connected");
                Ok(())
            }
            Err(e) => {
                warn!(endpoint = %settings.name_id, error = %e, "Cannot connect to database");
                if let Some(hook) = &self.hook {
                    hook.on_cannot_connect(&settings.name_id, &e);
                }
                Err(FailurePolicy::from_must_connect(settings.must_connect)
                    .apply(&settings.name_id, e))
            }
        }
    }

    async fn open_and_ping(
        &self,
        settings: &EndpointSettings,
    ) -> DbResult<Arc<dyn DatabaseHandle>> {
        let target = &settings.non_sensitive_connection_string;
        let handle = self
            .connector
            .open(settings.engine, &settings.connection_string)
            .await
            .map_err(|e| DbError::connection_open(&settings.name_id, target, e.to_string()))?;

        if let Err(e) = ping_within(handle.as_ref(), self.ping_timeout).await {
            if let Err(close_err) = handle.close().await {
                debug!(endpoint = %settings.name_id, error = %close_err, "Closing half-open handle failed");
            }
            return Err(DbError::ping_failure(&settings.name_id, target, e.to_string()));
        }
        Ok(handle)
    }

    /// Close the live handle. A no-op when not connected; on a close error
    /// the endpoint stays connected.
    pub async fn disconnect(&self) -> DbResult<()> {
        let _transition = self.transition.lock().await;
        let current = self.link.read().await.clone();
        let Some(handle) = current else {
            return Ok(());
        };

        handle.close().await?;
        *self.link.write().await = None;
        info!(endpoint = %self.name(), "Disconnected");
        Ok(())
    }

    /// Ping the live handle; a failed ping closes it and marks the endpoint
    /// disconnected.
    pub async fn check_connection(&self) -> DbResult<()> {
        let settings = self.configured_settings()?;
        let _transition = self.transition.lock().await;
        let current = self.link.read().await.clone();
        let handle = current.ok_or_else(|| DbError::not_connected(&settings.name_id))?;

        match ping_within(handle.as_ref(), self.ping_timeout).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(endpoint = %settings.name_id, error = %e, "Connection check failed");
                *self.link.write().await = None;
                if let Err(close_err) = handle.close().await {
                    debug!(endpoint = %settings.name_id, error = %close_err, "Closing failed handle failed");
                }
                Err(DbError::ping_failure(
                    &settings.name_id,
                    &settings.non_sensitive_connection_string,
                    e.to_string(),
                ))
            }
        }
    }

    /// Verify the connection and reconnect after the backoff when it is gone.
    pub async fn check_connection_and_reconnect(&self) -> DbResult<()> {
        self.configured_settings()?;
        if self.is_connected().await {
            if self.check_connection().await.is_ok() {
                return Ok(());
            }
        } else {
            debug!(endpoint = %self.name(), "Endpoint disconnected");
        }

        tokio::time::sleep(self.reconnect_backoff).await;
        info!(endpoint = %self.name(), "Reconnecting");
        self.connect().await
    }

    async fn live_handle(&self) -> DbResult<(&EndpointSettings, Arc<dyn DatabaseHandle>)> {
        let settings = self.configured_settings()?;
        let handle = self
            .link
            .read()
            .await
            .clone()
            .ok_or_else(|| DbError::not_connected(&settings.name_id))?;
        Ok((settings, handle))
    }

    // ---- Statements ----

    /// Insert a row and return its generated `id_column` value.
    pub async fn insert(&self, table: &str, id_column: &str, values: &Params) -> DbResult<i64> {
        let (settings, handle) = self.live_handle().await?;
        let mut runner = HandleRunner(handle.as_ref());
        facade::insert(&mut runner, settings.engine, table, id_column, values).await
    }

    pub async fn update(
        &self,
        table: &str,
        set_values: &Params,
        where_values: &Params,
    ) -> DbResult<u64> {
        let (settings, handle) = self.live_handle().await?;
        let mut runner = HandleRunner(handle.as_ref());
        facade::update(&mut runner, settings.engine, table, set_values, where_values).await
    }

    pub async fn select(&self, query: &SelectQuery) -> DbResult<Vec<Row>> {
        let (settings, handle) = self.live_handle().await?;
        let mut runner = HandleRunner(handle.as_ref());
        facade::select(&mut runner, settings.engine, query).await
    }

    /// First matching row. Transient failures are retried after a
    /// reconnect, up to the endpoint's retry policy.
    pub async fn select_one(&self, query: &SelectQuery) -> DbResult<Option<Row>> {
        self.retry
            .run(
                "select_one",
                || self.select_one_once(query),
                || self.check_connection_and_reconnect(),
            )
            .await
    }

    async fn select_one_once(&self, query: &SelectQuery) -> DbResult<Option<Row>> {
        let (settings, handle) = self.live_handle().await?;
        let mut runner = HandleRunner(handle.as_ref());
        facade::select_one(&mut runner, settings.engine, query).await
    }

    pub async fn must_select_one(&self, query: &SelectQuery) -> DbResult<Row> {
        let (settings, handle) = self.live_handle().await?;
        let mut runner = HandleRunner(handle.as_ref());
        facade::must_select_one(&mut runner, settings.engine, query).await
    }

    /// Execute a named-parameter statement. DDL gets literal substitution.
    pub async fn execute(&self, statement: &str, params: &Params) -> DbResult<ExecOutcome> {
        let (settings, handle) = self.live_handle().await?;
        let mut runner = HandleRunner(handle.as_ref());
        facade::execute(&mut runner, settings.engine, statement, params).await
    }

    /// Value of `key` in the `properties` table.
    pub async fn property_value(&self, key: &str) -> DbResult<String> {
        let (settings, handle) = self.live_handle().await?;
        let mut runner = HandleRunner(handle.as_ref());
        facade::property_value(&mut runner, settings.engine, key).await
    }

    // ---- Scripts ----

    /// Execute a script file verbatim as one batch.
    pub async fn execute_script_file(&self, path: impl AsRef<Path>) -> DbResult<()> {
        let path = path.as_ref();
        let (settings, handle) = self.live_handle().await?;
        let script = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| DbError::script(path.display().to_string(), e.to_string()))?;

        info!(endpoint = %settings.name_id, script = %path.display(), "Executing script");
        handle.execute(&script, &[]).await?;
        Ok(())
    }

    /// Execute the configured create scripts in order, connecting first when
    /// needed. The first failing script stops the run.
    pub async fn execute_create_scripts(&self) -> DbResult<()> {
        let settings = self.configured_settings()?;
        if !self.is_connected().await {
            self.connect().await?;
        }
        for path in &settings.create_script_files {
            self.execute_script_file(path).await?;
        }
        Ok(())
    }

    /// True if `err` says this endpoint's database does not exist on the
    /// server.
    pub fn is_database_missing(&self, err: &DbError) -> bool {
        let Some(settings) = self.settings.get() else {
            return false;
        };
        if settings.engine != EngineKind::PostgreSQL {
            return false;
        }
        if let DbError::Database {
            sql_state: Some(code),
            ..
        } = err
        {
            if code == "3D000" {
                return true;
            }
        }
        let needle = format!("database \"{}\" does not exist", settings.database_name);
        err.to_string().contains(&needle)
    }

    // ---- Transactions ----

    /// Open a transaction; the caller commits or rolls it back.
    pub async fn begin_transaction(
        &self,
        isolation: IsolationLevel,
    ) -> DbResult<EndpointTransaction> {
        let (settings, handle) = self.live_handle().await?;
        let tx = handle
            .begin(isolation)
            .await
            .map_err(|e| DbError::transaction_begin(&settings.name_id, e.to_string()))?;
        Ok(EndpointTransaction::new(
            tx,
            settings.engine,
            &settings.name_id,
            isolation,
        ))
    }

    /// Run `unit_of_work` in a transaction: commit on success, roll back on
    /// error and return the unit of work's error.
    ///
    /// ```ignore
    /// let id = endpoint
    ///     .run_transaction(IsolationLevel::Default, |tx| {
    ///         Box::pin(async move { tx.insert("users", "id", &params! { "name" => "ann" }).await })
    ///     })
    ///     .await?;
    /// ```
    pub async fn run_transaction<T, F>(
        &self,
        isolation: IsolationLevel,
        unit_of_work: F,
    ) -> DbResult<T>
    where
        F: for<'t> FnOnce(&'t mut EndpointTransaction) -> BoxFuture<'t, DbResult<T>>,
    {
        let mut tx = self.begin_transaction(isolation).await?;
        let span = tx.span().clone();

        async move {
            match unit_of_work(&mut tx).await {
                Ok(value) => {
                    tx.commit().await?;
                    Ok(value)
                }
                Err(err) => {
                    let endpoint = tx.endpoint().to_string();
                    let transaction_id = tx.id().to_string();
                    if let Err(rollback_err) = tx.rollback().await {
                        error!(
                            endpoint = %endpoint,
                            transaction_id = %transaction_id,
                            error = %rollback_err,
                            "Rollback after failed unit of work failed"
                        );
                    }
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }
}

/// Fetch `field` from a section, treating blank values as missing.
fn required<'a>(endpoint: &str, field: &str, value: &'a Option<String>) -> DbResult<&'a str> {
    value
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| DbError::configuration_missing(endpoint, field))
}

async fn ping_within(handle: &dyn DatabaseHandle, limit: Duration) -> DbResult<()> {
    match timeout(limit, handle.ping()).await {
        Ok(result) => result,
        Err(_) => Err(DbError::timeout("ping", limit)),
    }
}
