//! Binding of translated positional arguments onto sqlx queries.
//!
//! The translator yields arguments in placeholder order; each function here
//! binds the whole list so pools and transaction connections share it.

use crate::models::QueryParam;
use sqlx::mysql::MySqlArguments;
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::sqlite::SqliteArguments;
use sqlx::types::Json;
use sqlx::{MySql, Postgres, Sqlite};

macro_rules! bind_args {
    ($query:expr, $args:expr, json => $json:expr) => {{
        let mut query = $query;
        for arg in $args {
            query = match arg {
                // Untyped NULL; every engine accepts a NULL text value
                QueryParam::Null => query.bind(None::<String>),
                QueryParam::Bool(v) => query.bind(*v),
                QueryParam::Int(v) => query.bind(*v),
                QueryParam::Float(v) => query.bind(*v),
                QueryParam::String(v) => query.bind(v.as_str()),
                QueryParam::Bytes(v) => query.bind(v.as_slice()),
                QueryParam::Json(v) => query.bind($json(v)),
            };
        }
        query
    }};
}

pub(crate) fn bind_mysql<'q>(
    sql: &'q str,
    args: &'q [QueryParam],
) -> Query<'q, MySql, MySqlArguments> {
    bind_args!(sqlx::query(sql), args, json => Json)
}

pub(crate) fn bind_postgres<'q>(
    sql: &'q str,
    args: &'q [QueryParam],
) -> Query<'q, Postgres, PgArguments> {
    bind_args!(sqlx::query(sql), args, json => Json)
}

/// SQLite has no JSON column type; documents are bound as text.
pub(crate) fn bind_sqlite<'q>(
    sql: &'q str,
    args: &'q [QueryParam],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    bind_args!(sqlx::query(sql), args, json => |v: &serde_json::Value| v.to_string())
}
