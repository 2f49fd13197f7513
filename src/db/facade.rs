//! Insert/update/select helpers shared by endpoints and transactions.
//!
//! Each helper builds a named-parameter statement, translates it for the
//! engine and runs it on whatever [`StatementRunner`] it is given.

use crate::db::handle::StatementRunner;
use crate::db::sql_builder;
use crate::db::translator::{bind_named, translate};
use crate::error::{DbError, DbResult};
use crate::models::{EngineKind, ExecOutcome, Params, Row, SelectQuery};
use serde_json::Value as JsonValue;

pub(crate) async fn insert<R>(
    runner: &mut R,
    engine: EngineKind,
    table: &str,
    id_column: &str,
    values: &Params,
) -> DbResult<i64>
where
    R: StatementRunner + ?Sized,
{
    let built = sql_builder::insert(engine, table, id_column, values)?;
    let translation = bind_named(engine, &built.statement.sql, &built.statement.params)?;

    if built.returns_id {
        let rows = runner.run_fetch(translation.sql(), translation.args()).await?;
        let row = rows.first().ok_or_else(|| DbError::row_not_found(table))?;
        let value = row.get(id_column).or_else(|| row.values().next());
        return value.and_then(id_from_json).ok_or_else(|| {
            DbError::internal(format!(
                "INSERT into '{}' returned no usable '{}' value",
                table, id_column
            ))
        });
    }

    let outcome = runner
        .run_execute(translation.sql(), translation.args())
        .await?;
    outcome.last_insert_id.ok_or_else(|| {
        DbError::internal(format!(
            "INSERT into '{}' reported no generated id",
            table
        ))
    })
}

fn id_from_json(value: &JsonValue) -> Option<i64> {
    match value {
        JsonValue::Number(n) => n.as_i64(),
        JsonValue::String(s) => s.parse().ok(),
        _ => None,
    }
}

pub(crate) async fn update<R>(
    runner: &mut R,
    engine: EngineKind,
    table: &str,
    set_values: &Params,
    where_values: &Params,
) -> DbResult<u64>
where
    R: StatementRunner + ?Sized,
{
    let statement = sql_builder::update(engine, table, set_values, where_values)?;
    let translation = bind_named(engine, &statement.sql, &statement.params)?;
    let outcome = runner
        .run_execute(translation.sql(), translation.args())
        .await?;
    Ok(outcome.rows_affected)
}

pub(crate) async fn select<R>(
    runner: &mut R,
    engine: EngineKind,
    query: &SelectQuery,
) -> DbResult<Vec<Row>>
where
    R: StatementRunner + ?Sized,
{
    let statement = sql_builder::select(engine, query)?;
    let translation = bind_named(engine, &statement.sql, &statement.params)?;
    runner.run_fetch(translation.sql(), translation.args()).await
}

/// First row of `query`, limited to one row.
pub(crate) async fn select_one<R>(
    runner: &mut R,
    engine: EngineKind,
    query: &SelectQuery,
) -> DbResult<Option<Row>>
where
    R: StatementRunner + ?Sized,
{
    let mut limited = query.clone();
    limited.limit = Some(1);
    Ok(select(runner, engine, &limited).await?.into_iter().next())
}

/// Exactly one row of `query`.
pub(crate) async fn must_select_one<R>(
    runner: &mut R,
    engine: EngineKind,
    query: &SelectQuery,
) -> DbResult<Row>
where
    R: StatementRunner + ?Sized,
{
    // Two rows are enough to tell "one" from "many"
    let mut limited = query.clone();
    limited.limit = Some(2);
    let mut rows = select(runner, engine, &limited).await?;
    match rows.len() {
        0 => Err(DbError::row_not_found(&query.table)),
        1 => Ok(rows.remove(0)),
        count => Err(DbError::multiple_rows(&query.table, count)),
    }
}

pub(crate) async fn execute<R>(
    runner: &mut R,
    engine: EngineKind,
    statement: &str,
    params: &Params,
) -> DbResult<ExecOutcome>
where
    R: StatementRunner + ?Sized,
{
    let translation = translate(engine, statement, params)?;
    runner
        .run_execute(translation.sql(), translation.args())
        .await
}

/// `value` column of the `properties` row with `key`.
pub(crate) async fn property_value<R>(
    runner: &mut R,
    engine: EngineKind,
    key: &str,
) -> DbResult<String>
where
    R: StatementRunner + ?Sized,
{
    let row = must_select_one(runner, engine, &sql_builder::property_query(key)).await?;
    match row.get("value") {
        Some(JsonValue::String(s)) => Ok(s.clone()),
        Some(JsonValue::Null) | None => Err(DbError::invalid_input(format!(
            "Property '{}' has no value",
            key
        ))),
        Some(other) => Ok(other.to_string()),
    }
}
