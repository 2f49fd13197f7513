//! Statement classification.
//!
//! Decides whether a statement is DDL, which selects the literal
//! substitution path of the translator instead of driver-side binding.
//! Uses [sqlparser](https://docs.rs/sqlparser/) when the text parses and
//! falls back to the leading keyword when it does not (named placeholders
//! in positions the grammar rejects, vendor-specific syntax).

use crate::models::EngineKind;
use sqlparser::ast::Statement;
use sqlparser::dialect::{
    Dialect, GenericDialect, MsSqlDialect, MySqlDialect, PostgreSqlDialect, SQLiteDialect,
};
use sqlparser::parser::Parser;

/// Leading keywords treated as DDL when the statement does not parse.
const DDL_KEYWORDS: &[&str] = &["CREATE", "ALTER", "DROP", "TRUNCATE", "RENAME", "COMMENT"];

fn get_dialect(engine: EngineKind) -> Box<dyn Dialect> {
    match engine {
        EngineKind::PostgreSQL => Box::new(PostgreSqlDialect {}),
        EngineKind::MySQL => Box::new(MySqlDialect {}),
        EngineKind::SQLite => Box::new(SQLiteDialect {}),
        EngineKind::SQLServer => Box::new(MsSqlDialect {}),
        EngineKind::Oracle | EngineKind::Unknown => Box::new(GenericDialect {}),
    }
}

/// True if `sql` contains a data-definition statement.
///
/// # Examples
///
/// ```
/// use managed_db::db::ddl::is_ddl;
/// use managed_db::models::EngineKind;
///
/// assert!(is_ddl("CREATE TABLE t (id INT DEFAULT :id)", EngineKind::PostgreSQL));
/// assert!(!is_ddl("SELECT * FROM t WHERE id = :id", EngineKind::PostgreSQL));
/// ```
pub fn is_ddl(sql: &str, engine: EngineKind) -> bool {
    let dialect = get_dialect(engine);
    match Parser::parse_sql(dialect.as_ref(), sql) {
        Ok(statements) if !statements.is_empty() => statements
            .iter()
            .any(is_ddl_statement),
        _ => leading_keyword(sql)
            .is_some_and(|kw| DDL_KEYWORDS.iter().any(|d| kw.eq_ignore_ascii_case(d))),
    }
}

/// First word of the statement, skipping whitespace and comments.
fn leading_keyword(sql: &str) -> Option<&str> {
    let mut rest = sql;
    loop {
        rest = rest.trim_start();
        if let Some(after) = rest.strip_prefix("--") {
            rest = after.split_once('\n').map_or("", |(_, tail)| tail);
        } else if let Some(after) = rest.strip_prefix("/*") {
            rest = after.split_once("*/").map_or("", |(_, tail)| tail);
        } else {
            break;
        }
    }
    let end = rest
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(rest.len());
    (end > 0).then(|| &rest[..end])
}

/// Schema-changing statements: CREATE, ALTER, DROP, TRUNCATE, COMMENT.
fn is_ddl_statement(stmt: &Statement) -> bool {
    matches!(
        stmt,
        Statement::CreateTable { .. }
            | Statement::CreateView { .. }
            | Statement::CreateIndex(_)
            | Statement::CreateSchema { .. }
            | Statement::CreateDatabase { .. }
            | Statement::CreateSequence { .. }
            | Statement::CreateType { .. }
            | Statement::CreateFunction { .. }
            | Statement::CreateProcedure { .. }
            | Statement::CreateTrigger { .. }
            | Statement::CreateRole { .. }
            | Statement::CreateVirtualTable { .. }
            | Statement::CreateExtension { .. }
            | Statement::AlterTable { .. }
            | Statement::AlterView { .. }
            | Statement::AlterIndex { .. }
            | Statement::AlterRole { .. }
            | Statement::AlterType { .. }
            | Statement::Drop { .. }
            | Statement::DropFunction { .. }
            | Statement::DropProcedure { .. }
            | Statement::DropTrigger { .. }
            | Statement::Truncate { .. }
            | Statement::Comment { .. }
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ddl_detected() {
        for sql in [
            "CREATE TABLE users (id INTEGER PRIMARY KEY)",
            "create index idx_name on users (name)",
            "ALTER TABLE users ADD COLUMN email TEXT",
            "DROP TABLE users",
            "TRUNCATE TABLE users",
        ] {
            assert!(is_ddl(sql, EngineKind::PostgreSQL), "{sql}");
        }
    }

    #[test]
    fn test_dml_not_ddl() {
        for sql in [
            "SELECT * FROM users WHERE id = :id",
            "INSERT INTO users (name) VALUES (:name)",
            "UPDATE users SET name = :name WHERE id = :id",
            "DELETE FROM users WHERE id = :id",
        ] {
            assert!(!is_ddl(sql, EngineKind::PostgreSQL), "{sql}");
            assert!(!is_ddl(sql, EngineKind::MySQL), "{sql}");
        }
    }

    #[test]
    fn test_ddl_with_named_placeholder() {
        assert!(is_ddl("CREATE TABLE t (id INT DEFAULT :id)", EngineKind::PostgreSQL));
        assert!(is_ddl("CREATE TABLE t (id INT DEFAULT :id)", EngineKind::SQLite));
    }

    #[test]
    fn test_unparseable_falls_back_to_keyword() {
        assert!(is_ddl(
            "-- schema\n/* v2 */ CREATE SOMETHING VENDOR SPECIFIC :x ::",
            EngineKind::Oracle
        ));
        assert!(!is_ddl("FROBNICATE :x", EngineKind::Oracle));
        assert!(!is_ddl("", EngineKind::PostgreSQL));
    }

    #[test]
    fn test_transaction_and_admin_statements_are_not_ddl() {
        for sql in ["COMMIT", "BEGIN", "GRANT SELECT ON t TO app", "SET search_path TO app"] {
            assert!(!is_ddl(sql, EngineKind::PostgreSQL), "{sql}");
        }
        assert!(is_ddl("SELECT 1; DROP TABLE t", EngineKind::MySQL));
    }

    #[test]
    fn test_leading_keyword() {
        assert_eq!(leading_keyword("  select 1"), Some("select"));
        assert_eq!(leading_keyword("-- c\nDROP x"), Some("DROP"));
        assert_eq!(leading_keyword("/* only a comment"), None);
        assert_eq!(leading_keyword("(SELECT 1)"), None);
    }
}
