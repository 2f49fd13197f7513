//! Transaction-related data models.

use serde::{Deserialize, Serialize};

/// Isolation level requested when a transaction begins.
///
/// Support is engine dependent: beginning a transaction at a level the
/// engine cannot provide fails with a `TransactionBegin` error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    /// Whatever the server or session is configured with
    #[default]
    Default,
    ReadUncommitted,
    ReadCommitted,
    WriteCommitted,
    RepeatableRead,
    Snapshot,
    Serializable,
    Linearizable,
}

impl IsolationLevel {
    /// SQL spelling of the level, if any SQL engine understands it.
    pub fn sql_keyword(&self) -> Option<&'static str> {
        match self {
            Self::ReadUncommitted => Some("READ UNCOMMITTED"),
            Self::ReadCommitted => Some("READ COMMITTED"),
            Self::RepeatableRead => Some("REPEATABLE READ"),
            Self::Snapshot => Some("SNAPSHOT"),
            Self::Serializable => Some("SERIALIZABLE"),
            Self::Default | Self::WriteCommitted | Self::Linearizable => None,
        }
    }
}

impl std::fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Default => "default",
            Self::ReadUncommitted => "read_uncommitted",
            Self::ReadCommitted => "read_committed",
            Self::WriteCommitted => "write_committed",
            Self::RepeatableRead => "repeatable_read",
            Self::Snapshot => "snapshot",
            Self::Serializable => "serializable",
            Self::Linearizable => "linearizable",
        };
        f.write_str(name)
    }
}
