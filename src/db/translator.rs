//! Named-parameter statement translation.
//!
//! Statements use `:name` placeholders. DML is rewritten to the engine's
//! positional placeholders with an ordered argument list; DDL cannot bind
//! parameters on most engines, so values are substituted as literals.

use crate::db::ddl::is_ddl;
use crate::error::{DbError, DbResult};
use crate::models::{EngineKind, Params, QueryParam};

/// A statement ready for the driver.
#[derive(Debug, Clone, PartialEq)]
pub enum Translation {
    /// Positional statement plus one argument per placeholder occurrence
    Bound { sql: String, args: Vec<QueryParam> },
    /// Literal-substituted statement, executed without driver binding
    Literal { sql: String },
}

impl Translation {
    pub fn sql(&self) -> &str {
        match self {
            Self::Bound { sql, .. } | Self::Literal { sql } => sql,
        }
    }

    pub fn args(&self) -> &[QueryParam] {
        match self {
            Self::Bound { args, .. } => args,
            Self::Literal { .. } => &[],
        }
    }
}

/// Translate a named-parameter statement, choosing the path by statement kind.
pub fn translate(engine: EngineKind, statement: &str, params: &Params) -> DbResult<Translation> {
    if is_ddl(statement, engine) {
        Ok(Translation::Literal {
            sql: substitute_literals(statement, params),
        })
    } else {
        bind_named(engine, statement, params)
    }
}

/// Rewrite `:name` placeholders to the engine's positional placeholders.
///
/// Each occurrence gets its own argument, so a name used twice is bound
/// twice. Quoted strings, quoted identifiers, comments and `::` casts are
/// copied untouched.
pub fn bind_named(engine: EngineKind, statement: &str, params: &Params) -> DbResult<Translation> {
    let mut sql = String::with_capacity(statement.len() + 8);
    let mut args = Vec::new();
    let mut chars = statement.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        match c {
            '\'' | '"' | '`' => {
                let escapes = backslash_escapes(engine, c, &sql);
                sql.push(c);
                let mut escaped = false;
                for (_, inner) in chars.by_ref() {
                    sql.push(inner);
                    if escaped {
                        escaped = false;
                    } else if escapes && inner == '\\' {
                        escaped = true;
                    } else if inner == c {
                        break;
                    }
                }
            }
            '-' if chars.peek().is_some_and(|&(_, next)| next == '-') => {
                sql.push(c);
                for (_, inner) in chars.by_ref() {
                    sql.push(inner);
                    if inner == '\n' {
                        break;
                    }
                }
            }
            '/' if chars.peek().is_some_and(|&(_, next)| next == '*') => {
                sql.push(c);
                let mut prev = '\0';
                for (_, inner) in chars.by_ref() {
                    sql.push(inner);
                    if prev == '*' && inner == '/' {
                        break;
                    }
                    prev = inner;
                }
            }
            ':' if chars.peek().is_some_and(|&(_, next)| next == ':') => {
                sql.push_str("::");
                chars.next();
            }
            ':' if chars
                .peek()
                .is_some_and(|&(_, next)| next.is_ascii_alphabetic() || next == '_') =>
            {
                let name_start = start + 1;
                let mut name_end = name_start;
                while let Some(&(idx, next)) = chars.peek() {
                    if next.is_ascii_alphanumeric() || next == '_' {
                        name_end = idx + next.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                let name = &statement[name_start..name_end];
                let value = params
                    .get(name)
                    .ok_or_else(|| DbError::translation(statement, name))?;
                args.push(value.clone());
                push_placeholder(&mut sql, engine, args.len());
            }
            _ => sql.push(c),
        }
    }

    Ok(Translation::Bound { sql, args })
}

/// Whether a quoted section opened by `quote` treats `\` as an escape:
/// MySQL strings by default, PostgreSQL only in `E'...'` strings.
fn backslash_escapes(engine: EngineKind, quote: char, preceding: &str) -> bool {
    match engine {
        EngineKind::MySQL => quote != '`',
        EngineKind::PostgreSQL if quote == '\'' => {
            let mut tail = preceding.chars().rev();
            matches!(tail.next(), Some('E' | 'e'))
                && !tail
                    .next()
                    .is_some_and(|prev| prev.is_ascii_alphanumeric() || prev == '_')
        }
        _ => false,
    }
}

fn push_placeholder(sql: &mut String, engine: EngineKind, position: usize) {
    match engine {
        EngineKind::PostgreSQL => sql.push_str(&format!("${position}")),
        EngineKind::SQLServer => sql.push_str(&format!("@p{position}")),
        EngineKind::Oracle => sql.push_str(&format!(":{position}")),
        EngineKind::MySQL | EngineKind::SQLite | EngineKind::Unknown => sql.push('?'),
    }
}

/// Substitute parameter values into a DDL statement as literals.
///
/// Keys are applied longest first, so `:id` never rewrites the prefix of
/// `:identity`.
pub fn substitute_literals(statement: &str, params: &Params) -> String {
    let mut keys: Vec<&String> = params.keys().collect();
    keys.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

    let mut sql = statement.to_string();
    for key in keys {
        let literal = params.get(key).map(ddl_literal).unwrap_or_default();
        sql = sql.replace(&format!(":{key}"), &literal);
    }
    sql
}

/// Literal form of a value inside DDL.
///
/// Strings are double-quoted, integers decimal, floats fixed with six
/// decimals. Every other type renders as an empty literal.
pub fn ddl_literal(value: &QueryParam) -> String {
    match value {
        QueryParam::String(s) => format!("\"{s}\""),
        QueryParam::Int(i) => i.to_string(),
        QueryParam::Float(f) => format!("{f:.6}"),
        QueryParam::Null | QueryParam::Bool(_) | QueryParam::Bytes(_) | QueryParam::Json(_) => {
            String::new()
        }
    }
}
