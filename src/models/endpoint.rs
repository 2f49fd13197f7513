//! Endpoint-related data models.
//!
//! This module defines the database engines an endpoint can target, the
//! settings resolved from configuration, and the health summary exposed to
//! monitors.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Supported database engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    PostgreSQL,
    SQLServer,
    Oracle,
    /// Includes MariaDB
    MySQL,
    SQLite,
    Unknown,
}

impl EngineKind {
    /// Parse the `database_type` value of an endpoint section.
    ///
    /// Matching is case-insensitive; anything unrecognised is `Unknown`.
    pub fn from_config_value(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "postgresql" | "postgres" => Self::PostgreSQL,
            "sqlserver" | "mssql" => Self::SQLServer,
            "oracle" => Self::Oracle,
            "mysql" | "mariadb" => Self::MySQL,
            "sqlite" | "sqlite3" => Self::SQLite,
            _ => Self::Unknown,
        }
    }

    /// Scheme used in the non-sensitive connection string.
    pub fn scheme(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "postgresql",
            Self::SQLServer => "sqlserver",
            Self::Oracle => "oracle",
            Self::MySQL => "mysql",
            Self::SQLite => "sqlite",
            Self::Unknown => "unknown",
        }
    }

    /// Get the display name for this engine.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "PostgreSQL",
            Self::SQLServer => "SQL Server",
            Self::Oracle => "Oracle",
            Self::MySQL => "MySQL",
            Self::SQLite => "SQLite",
            Self::Unknown => "Unknown",
        }
    }

    /// True if INSERT can hand back the generated key in its result set.
    pub fn supports_returning(&self) -> bool {
        matches!(self, Self::PostgreSQL | Self::SQLite | Self::SQLServer)
    }
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Settings of one endpoint, resolved from its configuration section.
#[derive(Clone, Serialize)]
pub struct EndpointSettings {
    pub name_id: String,
    pub engine: EngineKind,
    pub address: String,
    pub user_name: String,
    /// Contains sensitive data - never log
    #[serde(skip_serializing)]
    pub user_password: String,
    pub database_name: String,
    pub connection_options: String,
    pub must_connect: bool,
    pub connect_at_start: bool,
    /// Executed in order by `execute_create_scripts`
    pub create_script_files: Vec<PathBuf>,
    /// Contains sensitive data - never log
    #[serde(skip_serializing)]
    pub connection_string: String,
    /// `engine://address/database_name`
    pub non_sensitive_connection_string: String,
}

impl std::fmt::Debug for EndpointSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointSettings")
            .field("name_id", &self.name_id)
            .field("engine", &self.engine)
            .field("address", &self.address)
            .field("user_name", &self.user_name)
            .field("database_name", &self.database_name)
            .field("must_connect", &self.must_connect)
            .field("connect_at_start", &self.connect_at_start)
            .field("create_script_files", &self.create_script_files)
            .field("target", &self.non_sensitive_connection_string)
            .finish_non_exhaustive()
    }
}

/// Health information about an endpoint. Contains no credentials.
#[derive(Debug, Clone, Serialize)]
pub struct EndpointSummary {
    pub name_id: String,
    pub engine: Option<EngineKind>,
    /// Non-sensitive connection string, once configured
    pub target: Option<String>,
    pub configured: bool,
    pub connected: bool,
    pub must_connect: bool,
}
