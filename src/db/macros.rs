//! Backend dispatch macros.
//!
//! The sqlx layer keeps one concrete type per backend. These macros expand
//! the three-way match so each call site reads as one line per backend.

/// Match over `DbPool` variants.
///
/// # Example
///
/// ```ignore
/// impl_db_dispatch!(pool, {
///     MySql(p) => do_mysql(p),
///     Postgres(p) => do_postgres(p),
///     SQLite(p) => do_sqlite(p),
/// });
/// ```
#[macro_export]
macro_rules! impl_db_dispatch {
    ($pool:expr, { $($variant:ident($p:ident) => $body:expr),+ $(,)? }) => {
        match $pool {
            $(
                $crate::db::pool::DbPool::$variant($p) => $body,
            )+
        }
    };
}

/// Match over the dedicated connection of a transaction.
#[macro_export]
macro_rules! impl_tx_dispatch {
    ($conn:expr, { $($variant:ident($c:ident) => $body:expr),+ $(,)? }) => {
        match $conn {
            $(
                $crate::db::tx::TxConnection::$variant($c) => $body,
            )+
        }
    };
}

pub use impl_db_dispatch;
pub use impl_tx_dispatch;

#[cfg(test)]
mod tests {
    use crate::models::EngineKind;

    #[derive(Debug)]
    enum Sample {
        MySql(u8),
        Postgres(u8),
        SQLite(u8),
    }

    macro_rules! sample_dispatch {
        ($v:expr, { $($variant:ident($p:ident) => $body:expr),+ $(,)? }) => {
            match $v {
                $( Sample::$variant($p) => $body, )+
            }
        };
    }

    fn engine_of(sample: &Sample) -> (EngineKind, u8) {
        sample_dispatch!(sample, {
            MySql(n) => (EngineKind::MySQL, *n),
            Postgres(n) => (EngineKind::PostgreSQL, *n),
            SQLite(n) => (EngineKind::SQLite, *n),
        })
    }

    #[test]
    fn test_dispatch_arm_shape_routes_each_variant() {
        assert_eq!(engine_of(&Sample::MySql(1)), (EngineKind::MySQL, 1));
        assert_eq!(engine_of(&Sample::Postgres(2)), (EngineKind::PostgreSQL, 2));
        assert_eq!(engine_of(&Sample::SQLite(3)), (EngineKind::SQLite, 3));
    }
}
