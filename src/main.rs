//! managed-db - connect configured database endpoints and watch their health.

use managed_db::config::{Config, StorageConfig};
use managed_db::db::{EndpointRegistry, SqlxConnector};
use managed_db::error::DbError;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .init();
    }
}

/// A `must_connected` endpoint failed; nothing sensible can run without it.
fn exit_fatal(err: &DbError) -> ! {
    error!(error = %err, "Fatal endpoint failure, exiting");
    std::process::exit(1);
}

fn report(stage: &str, errors: &[DbError]) {
    for err in errors {
        warn!(stage = stage, error = %err, "Endpoint error");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse configuration from command line and environment
    let config = Config::parse_args();

    // Initialize logging
    init_tracing(&config);

    info!(
        storage_config = %config.storage_config.display(),
        "Starting managed-db v{}",
        env!("CARGO_PKG_VERSION")
    );

    let storage = StorageConfig::from_file(&config.storage_config).await?;
    if storage.is_empty() {
        warn!("Storage configuration defines no endpoints");
    }

    let connector = Arc::new(SqlxConnector::new(config.query_timeout_duration()));
    let registry = EndpointRegistry::new(connector).with_cannot_connect_hook(Arc::new(
        |endpoint: &str, err: &DbError| {
            warn!(endpoint = %endpoint, error = %err, "Cannot connect");
        },
    ));

    match registry.load_from_configuration(&storage).await {
        Ok(errors) => report("configuration", &errors),
        Err(e) => exit_fatal(&e),
    }
    match registry.connect_at_start().await {
        Ok(errors) => report("connect", &errors),
        Err(e) => exit_fatal(&e),
    }
    if config.run_create_scripts {
        match registry.execute_create_scripts().await {
            Ok(errors) => report("create_scripts", &errors),
            Err(e) => exit_fatal(&e),
        }
    }

    for summary in registry.summaries().await {
        info!(
            endpoint = %summary.name_id,
            configured = summary.configured,
            connected = summary.connected,
            target = summary.target.as_deref().unwrap_or("-"),
            "Endpoint ready"
        );
    }

    let mut interval = tokio::time::interval(config.health_interval_duration());
    // The first tick completes immediately
    interval.tick().await;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                break;
            }
            _ = interval.tick() => {
                match registry.check_all_and_reconnect().await {
                    Ok(errors) => report("health", &errors),
                    Err(e) => exit_fatal(&e),
                }
            }
        }
    }

    report("disconnect", &registry.disconnect_all().await);
    info!("Shutdown complete");
    Ok(())
}
