//! Named-parameter statements for the facade helpers.
//!
//! Builders emit `:name` statements per engine dialect; the translator turns
//! them into driver statements. Table and column names are validated here
//! since they are interpolated, never bound.

use crate::error::{DbError, DbResult};
use crate::models::{EngineKind, IsolationLevel, Params, QueryParam, SelectQuery};

/// A built statement and the parameters it references.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedStatement {
    pub sql: String,
    pub params: Params,
}

/// An INSERT statement and how its generated key comes back.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    pub statement: NamedStatement,
    /// The key is the first column of the result set rather than the
    /// driver's last-insert-id
    pub returns_id: bool,
}

/// Check a table or column name: `name` or `schema.name`.
pub fn validate_identifier(identifier: &str) -> DbResult<()> {
    let valid = !identifier.is_empty()
        && identifier.split('.').all(|part| {
            let mut chars = part.chars();
            chars
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        });
    if valid {
        Ok(())
    } else {
        Err(DbError::invalid_input(format!(
            "Invalid identifier '{}': expected letters, digits and underscores",
            identifier
        )))
    }
}

/// Quote one validated identifier part for `engine`.
///
/// PostgreSQL and Oracle fold unquoted names, so the folded spelling is
/// quoted and resolves to the same object an unquoted name would.
fn quote_part(engine: EngineKind, part: &str) -> String {
    match engine {
        EngineKind::MySQL => format!("`{part}`"),
        EngineKind::SQLServer => format!("[{part}]"),
        EngineKind::PostgreSQL => format!("\"{}\"", part.to_lowercase()),
        EngineKind::Oracle => format!("\"{}\"", part.to_uppercase()),
        EngineKind::SQLite | EngineKind::Unknown => format!("\"{part}\""),
    }
}

/// Validate and quote `name` or `schema.name`, so reserved words such as
/// `key` can be used as table and column names.
pub fn quote_identifier(engine: EngineKind, identifier: &str) -> DbResult<String> {
    validate_identifier(identifier)?;
    Ok(identifier
        .split('.')
        .map(|part| quote_part(engine, part))
        .collect::<Vec<_>>()
        .join("."))
}

fn quote_column_list(engine: EngineKind, column: &str) -> DbResult<String> {
    if column == "*" {
        return Ok(column.to_string());
    }
    match column.strip_suffix(".*") {
        Some(table) => Ok(format!("{}.*", quote_identifier(engine, table)?)),
        None => quote_identifier(engine, column),
    }
}

/// Parameter name for the `index`th term of a clause. The index keeps
/// `a.b` and `a_b` apart.
fn param_key(prefix: &str, index: usize, column: &str) -> String {
    format!("{prefix}_{index}_{}", column.replace('.', "_"))
}

/// `col = :where_0_col AND ...`; NULL values render `col IS NULL`.
fn where_clause(engine: EngineKind, filter: &Params, params: &mut Params) -> DbResult<String> {
    let mut terms = Vec::with_capacity(filter.len());
    for (index, (column, value)) in filter.iter().enumerate() {
        let quoted = quote_identifier(engine, column)?;
        if value.is_null() {
            terms.push(format!("{quoted} IS NULL"));
        } else {
            let key = param_key("where", index, column);
            terms.push(format!("{quoted} = :{key}"));
            params.insert(key, value.clone());
        }
    }
    Ok(terms.join(" AND "))
}

/// Placeholder for a written value. NULL is spelled out rather than bound,
/// since a bound NULL carries a type the column may not accept.
fn value_placeholder(
    prefix: &str,
    index: usize,
    column: &str,
    value: &QueryParam,
    params: &mut Params,
) -> String {
    if value.is_null() {
        return "NULL".to_string();
    }
    let key = param_key(prefix, index, column);
    params.insert(key.clone(), value.clone());
    format!(":{key}")
}

/// Build an INSERT returning the generated `id_column` value.
pub fn insert(
    engine: EngineKind,
    table: &str,
    id_column: &str,
    values: &Params,
) -> DbResult<InsertStatement> {
    let table = quote_identifier(engine, table)?;
    let id_column = quote_identifier(engine, id_column)?;

    let mut params = Params::new();
    let mut columns = Vec::with_capacity(values.len());
    let mut placeholders = Vec::with_capacity(values.len());
    for (index, (column, value)) in values.iter().enumerate() {
        columns.push(quote_identifier(engine, column)?);
        placeholders.push(value_placeholder("v", index, column, value, &mut params));
    }

    let (column_list, values_list) = if values.is_empty() {
        (String::new(), None)
    } else {
        (
            format!(" ({})", columns.join(", ")),
            Some(format!("VALUES ({})", placeholders.join(", "))),
        )
    };

    let sql = match (engine, values_list) {
        (EngineKind::SQLServer, Some(vals)) => {
            format!("INSERT INTO {table}{column_list} OUTPUT INSERTED.{id_column} {vals}")
        }
        (EngineKind::SQLServer, None) => {
            format!("INSERT INTO {table} OUTPUT INSERTED.{id_column} DEFAULT VALUES")
        }
        (EngineKind::PostgreSQL | EngineKind::SQLite, Some(vals)) => {
            format!("INSERT INTO {table}{column_list} {vals} RETURNING {id_column}")
        }
        (EngineKind::PostgreSQL | EngineKind::SQLite, None) => {
            format!("INSERT INTO {table} DEFAULT VALUES RETURNING {id_column}")
        }
        (_, Some(vals)) => format!("INSERT INTO {table}{column_list} {vals}"),
        (_, None) => format!("INSERT INTO {table} () VALUES ()"),
    };

    Ok(InsertStatement {
        statement: NamedStatement { sql, params },
        returns_id: engine.supports_returning(),
    })
}

/// Build `UPDATE table SET ... WHERE ...`.
pub fn update(
    engine: EngineKind,
    table: &str,
    set_values: &Params,
    where_values: &Params,
) -> DbResult<NamedStatement> {
    if set_values.is_empty() {
        return Err(DbError::invalid_input(format!(
            "UPDATE of '{}' needs at least one column to set",
            table
        )));
    }
    let quoted_table = quote_identifier(engine, table)?;

    let mut params = Params::new();
    let mut assignments = Vec::with_capacity(set_values.len());
    for (index, (column, value)) in set_values.iter().enumerate() {
        let quoted = quote_identifier(engine, column)?;
        let placeholder = value_placeholder("set", index, column, value, &mut params);
        assignments.push(format!("{quoted} = {placeholder}"));
    }

    let mut sql = format!("UPDATE {quoted_table} SET {}", assignments.join(", "));
    let filter = where_clause(engine, where_values, &mut params)?;
    if !filter.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&filter);
    }
    Ok(NamedStatement { sql, params })
}

/// Build a SELECT for `query` in the engine's dialect.
///
/// Row limiting uses `TOP` on SQL Server, `FETCH FIRST` on Oracle and
/// `LIMIT` elsewhere. `FOR UPDATE` is emitted only where the engine has it.
pub fn select(engine: EngineKind, query: &SelectQuery) -> DbResult<NamedStatement> {
    let table = quote_identifier(engine, &query.table)?;
    let columns = if query.columns.is_empty() {
        "*".to_string()
    } else {
        query
            .columns
            .iter()
            .map(|column| quote_column_list(engine, column))
            .collect::<DbResult<Vec<_>>>()?
            .join(", ")
    };

    let mut sql = String::from("SELECT ");
    if let (EngineKind::SQLServer, Some(limit)) = (engine, query.limit) {
        sql.push_str(&format!("TOP {limit} "));
    }
    sql.push_str(&format!("{columns} FROM {table}"));

    if let Some(join) = query.join.as_deref().filter(|j| !j.trim().is_empty()) {
        sql.push(' ');
        sql.push_str(join.trim());
    }

    let mut params = Params::new();
    let filter = where_clause(engine, &query.filter, &mut params)?;
    if !filter.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&filter);
    }

    if !query.order_by.is_empty() {
        let mut terms = Vec::with_capacity(query.order_by.len());
        for (column, order) in &query.order_by {
            terms.push(format!("{} {}", quote_identifier(engine, column)?, order.as_sql()));
        }
        sql.push_str(" ORDER BY ");
        sql.push_str(&terms.join(", "));
    }

    match (engine, query.limit) {
        (EngineKind::SQLServer, _) | (_, None) => {}
        (EngineKind::Oracle, Some(limit)) => {
            sql.push_str(&format!(" FETCH FIRST {limit} ROWS ONLY"));
        }
        (_, Some(limit)) => sql.push_str(&format!(" LIMIT {limit}")),
    }

    if query.for_update
        && matches!(
            engine,
            EngineKind::PostgreSQL | EngineKind::MySQL | EngineKind::Oracle
        )
    {
        sql.push_str(" FOR UPDATE");
    }

    Ok(NamedStatement { sql, params })
}

/// Statements that open a transaction at `isolation`, in order.
///
/// Returns `None` when the engine cannot provide the level.
pub fn begin_statements(engine: EngineKind, isolation: IsolationLevel) -> Option<Vec<String>> {
    match (engine, isolation) {
        (EngineKind::SQLite, IsolationLevel::Default | IsolationLevel::Serializable) => {
            Some(vec!["BEGIN".to_string()])
        }
        (EngineKind::SQLite, _) => None,
        (EngineKind::PostgreSQL, IsolationLevel::Default) => Some(vec!["BEGIN".to_string()]),
        (EngineKind::PostgreSQL, IsolationLevel::Snapshot) => None,
        (EngineKind::PostgreSQL, level) => level
            .sql_keyword()
            .map(|kw| vec![format!("BEGIN ISOLATION LEVEL {kw}")]),
        (EngineKind::MySQL, IsolationLevel::Default) => {
            Some(vec!["START TRANSACTION".to_string()])
        }
        (EngineKind::MySQL, IsolationLevel::Snapshot) => None,
        (EngineKind::MySQL, level) => level.sql_keyword().map(|kw| {
            vec![
                format!("SET TRANSACTION ISOLATION LEVEL {kw}"),
                "START TRANSACTION".to_string(),
            ]
        }),
        (EngineKind::SQLServer | EngineKind::Oracle | EngineKind::Unknown, _) => None,
    }
}

/// Parameters of `property_value`.
pub fn property_query(key: &str) -> SelectQuery {
    SelectQuery::new("properties")
        .with_columns(["value"])
        .filter("key", QueryParam::String(key.to_string()))
        .with_limit(2)
}
