//! Registry of the endpoints of one process.
//!
//! Explicitly constructed and passed around; there is no process-wide map.

use crate::config::StorageConfig;
use crate::db::endpoint::DatabaseEndpoint;
use crate::db::handle::{CannotConnectHook, Connector};
use crate::db::retry::RetryPolicy;
use crate::error::{DbError, DbResult};
use crate::models::EndpointSummary;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Endpoints keyed by registered name.
#[derive(Clone)]
pub struct EndpointRegistry {
    endpoints: Arc<RwLock<HashMap<String, Arc<DatabaseEndpoint>>>>,
    connector: Arc<dyn Connector>,
    hook: Option<Arc<dyn CannotConnectHook>>,
    ping_timeout: Option<Duration>,
    reconnect_backoff: Option<Duration>,
    retry: Option<RetryPolicy>,
}

impl EndpointRegistry {
    /// Endpoints created by this registry open their handles through `connector`.
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            endpoints: Arc::new(RwLock::new(HashMap::new())),
            connector,
            hook: None,
            ping_timeout: None,
            reconnect_backoff: None,
            retry: None,
        }
    }

    pub fn with_cannot_connect_hook(mut self, hook: Arc<dyn CannotConnectHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn with_ping_timeout(mut self, ping_timeout: Duration) -> Self {
        self.ping_timeout = Some(ping_timeout);
        self
    }

    pub fn with_reconnect_backoff(mut self, backoff: Duration) -> Self {
        self.reconnect_backoff = Some(backoff);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Add an endpoint built elsewhere. Names must be unique.
    pub async fn register(&self, endpoint: DatabaseEndpoint) -> DbResult<Arc<DatabaseEndpoint>> {
        let name = endpoint.registered_name().to_string();
        let mut endpoints = self.endpoints.write().await;
        if endpoints.contains_key(&name) {
            return Err(DbError::invalid_input(format!(
                "Endpoint '{}' is already registered",
                name
            )));
        }
        let endpoint = Arc::new(endpoint);
        endpoints.insert(name, endpoint.clone());
        Ok(endpoint)
    }

    /// Create and register an endpoint with the registry's connector and hook.
    pub async fn new_endpoint(&self, name: &str) -> DbResult<Arc<DatabaseEndpoint>> {
        let mut endpoint = DatabaseEndpoint::new(name, self.connector.clone());
        if let Some(hook) = &self.hook {
            endpoint = endpoint.with_cannot_connect_hook(hook.clone());
        }
        if let Some(ping_timeout) = self.ping_timeout {
            endpoint = endpoint.with_ping_timeout(ping_timeout);
        }
        if let Some(backoff) = self.reconnect_backoff {
            endpoint = endpoint.with_reconnect_backoff(backoff);
        }
        if let Some(retry) = self.retry {
            endpoint = endpoint.with_retry_policy(retry);
        }
        self.register(endpoint).await
    }

    /// Look an endpoint up by its registered name, or by the `nameid` its
    /// configuration gave it.
    pub async fn get(&self, name: &str) -> DbResult<Arc<DatabaseEndpoint>> {
        let endpoints = self.endpoints.read().await;
        endpoints
            .get(name)
            .or_else(|| endpoints.values().find(|endpoint| endpoint.name() == name))
            .cloned()
            .ok_or_else(|| DbError::endpoint_not_found(name))
    }

    /// Registered names, sorted.
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.endpoints.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn len(&self) -> usize {
        self.endpoints.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.endpoints.read().await.is_empty()
    }

    /// Snapshot in name order, so no lock is held while endpoints do I/O.
    async fn snapshot(&self) -> Vec<Arc<DatabaseEndpoint>> {
        let endpoints = self.endpoints.read().await;
        let mut list: Vec<_> = endpoints.values().cloned().collect();
        list.sort_by(|a, b| a.registered_name().cmp(b.registered_name()));
        list
    }

    pub async fn summaries(&self) -> Vec<EndpointSummary> {
        let mut summaries = Vec::new();
        for endpoint in self.snapshot().await {
            summaries.push(endpoint.summary().await);
        }
        summaries
    }

    /// Create an endpoint for every section of `config` not yet registered,
    /// then apply the configuration to all endpoints.
    ///
    /// A fatal error stops the load and is returned. Recoverable errors are
    /// collected and returned so the caller can report them.
    pub async fn load_from_configuration(&self, config: &StorageConfig) -> DbResult<Vec<DbError>> {
        for name in config.endpoint_names() {
            let registered = self.endpoints.read().await.contains_key(name);
            if !registered {
                self.new_endpoint(name).await?;
            }
        }

        let mut errors = Vec::new();
        for endpoint in self.snapshot().await {
            if let Err(e) = endpoint.apply_configuration(config) {
                if e.is_fatal() {
                    return Err(e);
                }
                warn!(endpoint = %endpoint.registered_name(), error = %e, "Endpoint left unconfigured");
                errors.push(e);
            }
        }
        info!(endpoints = self.len().await, "Configuration loaded");
        Ok(errors)
    }

    /// Connect every endpoint configured with `is_connect_at_start`.
    pub async fn connect_at_start(&self) -> DbResult<Vec<DbError>> {
        let mut errors = Vec::new();
        for endpoint in self.snapshot().await {
            let wanted = endpoint
                .settings()
                .map(|s| s.connect_at_start)
                .unwrap_or(false);
            if !wanted {
                continue;
            }
            if let Err(e) = endpoint.connect().await {
                if e.is_fatal() {
                    return Err(e);
                }
                errors.push(e);
            }
        }
        Ok(errors)
    }

    /// Run the create scripts of every configured endpoint that has any.
    pub async fn execute_create_scripts(&self) -> DbResult<Vec<DbError>> {
        let mut errors = Vec::new();
        for endpoint in self.snapshot().await {
            let has_scripts = endpoint
                .settings()
                .map(|s| !s.create_script_files.is_empty())
                .unwrap_or(false);
            if !has_scripts {
                continue;
            }
            if let Err(e) = endpoint.execute_create_scripts().await {
                if e.is_fatal() {
                    return Err(e);
                }
                warn!(endpoint = %endpoint.name(), error = %e, "Create scripts failed");
                errors.push(e);
            }
        }
        Ok(errors)
    }

    /// Health pass: check and, where needed, reconnect every endpoint that
    /// is connected or was meant to be.
    pub async fn check_all_and_reconnect(&self) -> DbResult<Vec<DbError>> {
        let mut errors = Vec::new();
        for endpoint in self.snapshot().await {
            let Some(settings) = endpoint.settings() else {
                continue;
            };
            if !settings.connect_at_start && !endpoint.is_connected().await {
                continue;
            }
            if let Err(e) = endpoint.check_connection_and_reconnect().await {
                if e.is_fatal() {
                    return Err(e);
                }
                errors.push(e);
            }
        }
        Ok(errors)
    }

    /// Disconnect everything, returning the close errors.
    pub async fn disconnect_all(&self) -> Vec<DbError> {
        let mut errors = Vec::new();
        for endpoint in self.snapshot().await {
            if let Err(e) = endpoint.disconnect().await {
                warn!(endpoint = %endpoint.name(), error = %e, "Disconnect failed");
                errors.push(e);
            }
        }
        errors
    }
}
