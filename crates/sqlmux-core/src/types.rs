//! Core types for sqlmux

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A database value that can represent any SQL type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// NULL value
    Null,
    /// Boolean
    Bool(bool),
    /// 16-bit signed integer
    Int16(i16),
    /// 32-bit signed integer
    Int32(i32),
    /// 64-bit signed integer
    Int64(i64),
    /// 32-bit floating point
    Float32(f32),
    /// 64-bit floating point
    Float64(f64),
    /// Decimal/Numeric (stored as string for precision)
    Decimal(String),
    /// UTF-8 string
    String(String),
    /// Binary data
    Bytes(Vec<u8>),
    /// UUID
    Uuid(Uuid),
    /// Date (year, month, day)
    Date(NaiveDate),
    /// Time (hour, minute, second, nanosecond)
    Time(NaiveTime),
    /// DateTime without timezone
    DateTime(NaiveDateTime),
    /// DateTime with timezone (UTC)
    DateTimeUtc(DateTime<Utc>),
    /// JSON value
    Json(serde_json::Value),
    /// Array of values
    Array(Vec<Value>),
}

impl Value {
    /// Check if the value is NULL
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Try to get as a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as i64
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int16(v) => Some(*v as i64),
            Value::Int32(v) => Some(*v as i64),
            Value::Int64(v) => Some(*v),
            _ => None,
        }
    }

    /// Try to get as f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float32(v) => Some(*v as f64),
            Value::Float64(v) => Some(*v),
            _ => None,
        }
    }

    /// Try to get as bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Equality that tolerates numeric width coercion.
    ///
    /// `Int32(5)` and `Int64(5)` compare equal, as do `Float32(1.5)` and
    /// `Float64(1.5)`. Integers never compare equal to floats; everything
    /// else falls back to strict equality.
    pub fn loosely_equals(&self, other: &Value) -> bool {
        if let (Some(a), Some(b)) = (self.as_i64(), other.as_i64()) {
            return a == b;
        }
        if let (Some(a), Some(b)) = (self.as_f64(), other.as_f64()) {
            return a == b;
        }
        self == other
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Int16(v) => write!(f, "{}", v),
            Value::Int32(v) => write!(f, "{}", v),
            Value::Int64(v) => write!(f, "{}", v),
            Value::Float32(v) => write!(f, "{}", v),
            Value::Float64(v) => write!(f, "{}", v),
            Value::Decimal(v) => write!(f, "{}", v),
            Value::String(v) => write!(f, "{}", v),
            Value::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            Value::Uuid(v) => write!(f, "{}", v),
            Value::Date(v) => write!(f, "{}", v),
            Value::Time(v) => write!(f, "{}", v),
            Value::DateTime(v) => write!(f, "{}", v),
            Value::DateTimeUtc(v) => write!(f, "{}", v),
            Value::Json(v) => write!(f, "{}", v),
            Value::Array(v) => write!(f, "[{} items]", v.len()),
        }
    }
}

macro_rules! impl_value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Value::$variant(v)
            }
        })*
    };
}

impl_value_from! {
    bool => Bool,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    f32 => Float32,
    f64 => Float64,
    String => String,
    Vec<u8> => Bytes,
    Uuid => Uuid,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Provider type metadata carried alongside a parameter value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ParameterMeta {
    /// Declared size (for string/binary types)
    pub size: Option<i32>,
    /// Numeric precision
    pub precision: Option<u8>,
    /// Numeric scale
    pub scale: Option<u8>,
}

/// A named parameter ready to be sent to the database
#[derive(Debug, Clone, PartialEq)]
pub struct QueryParameter {
    /// Parameter name without any prefix character
    pub name: String,
    /// Parameter value
    pub value: Value,
    /// Optional provider type metadata
    pub meta: Option<ParameterMeta>,
}

impl QueryParameter {
    /// Create a new parameter without type metadata
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            meta: None,
        }
    }

    /// Attach provider type metadata
    pub fn with_meta(mut self, meta: ParameterMeta) -> Self {
        self.meta = Some(meta);
        self
    }
}

/// A row from a query result
#[derive(Debug, Clone)]
pub struct Row {
    /// Column values
    pub values: Vec<Value>,
    /// Column names
    columns: Vec<String>,
}

impl Row {
    /// Create a new row
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        Self { values, columns }
    }

    /// Get a value by column index
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Get a value by column name
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == name)
            .and_then(|idx| self.values.get(idx))
    }

    /// Get column names
    pub fn columns(&self) -> &[String] {
        &self.columns
    }
}

/// Column metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ColumnMeta {
    /// Column name
    #[serde(default)]
    pub name: String,
    /// Data type (database-specific string)
    #[serde(default)]
    pub data_type: String,
    /// Whether the column can be NULL
    #[serde(default)]
    pub nullable: bool,
    /// Column ordinal position (0-based)
    #[serde(default)]
    pub ordinal: usize,
}

/// One fully buffered result set
#[derive(Debug, Clone)]
pub struct QueryResult {
    /// Unique result ID
    pub id: Uuid,
    /// Column metadata
    pub columns: Vec<ColumnMeta>,
    /// Result rows
    pub rows: Vec<Row>,
    /// Rows affected (for DML statements)
    pub affected_rows: u64,
    /// Warnings from the database
    pub warnings: Vec<String>,
}

impl QueryResult {
    /// Create a new empty query result
    pub fn empty() -> Self {
        Self {
            id: Uuid::new_v4(),
            columns: Vec::new(),
            rows: Vec::new(),
            affected_rows: 0,
            warnings: Vec::new(),
        }
    }

    /// Number of rows in the result set
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the result set has no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_value_loosely_equals_integer_widths() {
        assert!(Value::Int32(5).loosely_equals(&Value::Int64(5)));
        assert!(Value::Int16(5).loosely_equals(&Value::Int32(5)));
        assert!(!Value::Int32(5).loosely_equals(&Value::Int64(6)));
    }

    #[test]
    fn test_value_loosely_equals_float_widths() {
        assert!(Value::Float32(1.5).loosely_equals(&Value::Float64(1.5)));
        assert!(!Value::Float32(1.5).loosely_equals(&Value::Float64(2.5)));
    }

    #[test]
    fn test_value_loosely_equals_no_int_float_crossover() {
        assert!(!Value::Int64(1).loosely_equals(&Value::Float64(1.0)));
    }

    #[test]
    fn test_value_loosely_equals_strict_fallback() {
        assert!(Value::String("a".into()).loosely_equals(&Value::String("a".into())));
        assert!(!Value::String("a".into()).loosely_equals(&Value::String("b".into())));
        assert!(Value::Null.loosely_equals(&Value::Null));
    }

    #[test]
    fn test_row_access() {
        let row = Row::new(
            vec!["id".to_string(), "name".to_string()],
            vec![Value::Int64(1), Value::String("Alice".to_string())],
        );

        assert_eq!(row.get(0), Some(&Value::Int64(1)));
        assert_eq!(row.get_by_name("name"), Some(&Value::String("Alice".to_string())));
        assert_eq!(row.get_by_name("missing"), None);
        assert_eq!(row.get(2), None);
    }

    #[test]
    fn test_query_result_empty() {
        let result = QueryResult::empty();

        assert!(result.is_empty());
        assert_eq!(result.len(), 0);
        assert_eq!(result.affected_rows, 0);
    }

    #[test]
    fn test_value_from_option() {
        assert_eq!(Value::from(Some(3i64)), Value::Int64(3));
        assert_eq!(Value::from(None::<i64>), Value::Null);
    }
}
