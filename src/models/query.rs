//! Query-related data models.
//!
//! This module defines parameter values, row and outcome types, and the
//! structured select request used by the facade helpers.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// A parameter value for named-parameter statements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryParam {
    /// NULL value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value
    String(String),
    /// Binary data (base64 encoded in JSON)
    #[serde(with = "base64_bytes")]
    Bytes(Vec<u8>),
    /// Arbitrary JSON document
    Json(JsonValue),
}

impl QueryParam {
    /// Check if this parameter is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

macro_rules! query_param_from {
    ($variant:ident: $($ty:ty),+) => {
        $(
            impl From<$ty> for QueryParam {
                fn from(value: $ty) -> Self {
                    Self::$variant(value.into())
                }
            }
        )+
    };
}

query_param_from!(Bool: bool);
query_param_from!(Int: i8, i16, i32, i64, u8, u16, u32);
query_param_from!(Float: f32, f64);
query_param_from!(String: String, &str);
query_param_from!(Bytes: Vec<u8>);
query_param_from!(Json: JsonValue);

impl<T: Into<QueryParam>> From<Option<T>> for QueryParam {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Custom serialization for binary data as base64.
mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        STANDARD.encode(bytes).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

/// Named parameters, keyed without the leading colon.
pub type Params = BTreeMap<String, QueryParam>;

/// One result row: column name to JSON value.
pub type Row = serde_json::Map<String, JsonValue>;

/// Result of a statement that does not return rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExecOutcome {
    pub rows_affected: u64,
    /// Reported by MySQL and SQLite
    pub last_insert_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// A structured SELECT request.
///
/// `filter` entries are ANDed as equality tests; a `Null` value matches
/// `IS NULL`. `join` is appended verbatim after the table name, so it must
/// never carry caller-supplied values.
#[derive(Debug, Clone, Default)]
pub struct SelectQuery {
    pub table: String,
    /// Empty means `*`
    pub columns: Vec<String>,
    pub filter: Params,
    pub join: Option<String>,
    pub order_by: Vec<(String, SortOrder)>,
    pub limit: Option<u64>,
    pub for_update: bool,
}

impl SelectQuery {
    /// Create a select over every column of `table`.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Default::default()
        }
    }

    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Add an equality filter.
    pub fn filter(mut self, column: impl Into<String>, value: impl Into<QueryParam>) -> Self {
        self.filter.insert(column.into(), value.into());
        self
    }

    pub fn with_join(mut self, join: impl Into<String>) -> Self {
        self.join = Some(join.into());
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, order: SortOrder) -> Self {
        self.order_by.push((column.into(), order));
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Lock the selected rows until the enclosing transaction ends.
    pub fn for_update(mut self) -> Self {
        self.for_update = true;
        self
    }
}

/// Build a [`Params`] map from `name => value` pairs.
///
/// ```
/// use managed_db::params;
///
/// let params = params! { "id" => 5, "name" => "widget", "deleted_at" => None::<i64> };
/// assert_eq!(params.len(), 3);
/// ```
#[macro_export]
macro_rules! params {
    () => {
        $crate::models::Params::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut params = $crate::models::Params::new();
        $(
            params.insert(
                ::std::string::String::from($key),
                $crate::models::QueryParam::from($value),
            );
        )+
        params
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_param_types() {
        assert!(QueryParam::Null.is_null());
        assert!(!QueryParam::Bool(true).is_null());
        assert!(QueryParam::from(None::<i64>).is_null());
        assert_eq!(QueryParam::from(Some("x")), QueryParam::String("x".to_string()));
    }

    #[test]
    fn test_query_param_conversions() {
        assert_eq!(QueryParam::from(7u32), QueryParam::Int(7));
        assert_eq!(QueryParam::from("x"), QueryParam::String("x".to_string()));
        assert_eq!(QueryParam::from(None::<i64>), QueryParam::Null);
        assert_eq!(QueryParam::from(Some(1.5)), QueryParam::Float(1.5));
    }

    #[test]
    fn test_query_param_deserialize_untagged() {
        let params: Vec<QueryParam> =
            serde_json::from_str(r#"[null, true, 3, 2.5, "s", {"k": [1]}]"#).unwrap();
        assert_eq!(params[0], QueryParam::Null);
        assert_eq!(params[1], QueryParam::Bool(true));
        assert_eq!(params[2], QueryParam::Int(3));
        assert_eq!(params[3], QueryParam::Float(2.5));
        assert_eq!(params[4], QueryParam::String("s".to_string()));
        assert!(matches!(params[5], QueryParam::Json(_)));
    }

    #[test]
    fn test_params_macro() {
        let params = crate::params! { "id" => 5, "name" => "widget" };
        assert_eq!(params.get("id"), Some(&QueryParam::Int(5)));
        assert_eq!(
            params.get("name"),
            Some(&QueryParam::String("widget".to_string()))
        );
        assert!(crate::params! {}.is_empty());
    }

    #[test]
    fn test_select_query_builder() {
        let query = SelectQuery::new("orders")
            .with_columns(["id", "total"])
            .filter("customer_id", 9)
            .order_by("id", SortOrder::Desc)
            .with_limit(10)
            .for_update();

        assert_eq!(query.table, "orders");
        assert_eq!(query.columns, vec!["id", "total"]);
        assert_eq!(query.filter.len(), 1);
        assert_eq!(query.order_by, vec![("id".to_string(), SortOrder::Desc)]);
        assert_eq!(query.limit, Some(10));
        assert!(query.for_update);
    }
}
