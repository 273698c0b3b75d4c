//! SQL value types and the record model shared by reader and loader.

use std::sync::Arc;

/// Type hint for NULL values.
///
/// Carried so the loader and adapter always know what a NULL "is", and so
/// a NULL is never silently replaced with a sentinel like `''` or `0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlNullType {
    Bool,
    I16,
    I32,
    I64,
    F32,
    F64,
    String,
    Bytes,
    Uuid,
    Decimal,
    DateTime,
    DateTimeOffset,
    Date,
    Time,
}

/// SQL value enum for type-safe row handling.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// NULL with a type hint.
    Null(SqlNullType),
    Bool(bool),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    String(String),
    Bytes(Vec<u8>),
    Uuid(uuid::Uuid),
    Decimal(rust_decimal::Decimal),
    /// Timestamp without timezone (the canonical warehouse representation).
    DateTime(chrono::NaiveDateTime),
    /// Timestamp with timezone offset, as read from the source. The adapter
    /// converts these to timezone-naive UTC before they reach the loader.
    DateTimeOffset(chrono::DateTime<chrono::FixedOffset>),
    Date(chrono::NaiveDate),
    Time(chrono::NaiveTime),
}

impl SqlValue {
    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null(_))
    }

    /// The null-type hint for this value.
    #[must_use]
    pub fn null_type(&self) -> SqlNullType {
        match self {
            SqlValue::Null(t) => *t,
            SqlValue::Bool(_) => SqlNullType::Bool,
            SqlValue::I16(_) => SqlNullType::I16,
            SqlValue::I32(_) => SqlNullType::I32,
            SqlValue::I64(_) => SqlNullType::I64,
            SqlValue::F32(_) => SqlNullType::F32,
            SqlValue::F64(_) => SqlNullType::F64,
            SqlValue::String(_) => SqlNullType::String,
            SqlValue::Bytes(_) => SqlNullType::Bytes,
            SqlValue::Uuid(_) => SqlNullType::Uuid,
            SqlValue::Decimal(_) => SqlNullType::Decimal,
            SqlValue::DateTime(_) => SqlNullType::DateTime,
            SqlValue::DateTimeOffset(_) => SqlNullType::DateTimeOffset,
            SqlValue::Date(_) => SqlNullType::Date,
            SqlValue::Time(_) => SqlNullType::Time,
        }
    }
}

/// A single row adapted to the target schema.
///
/// Column names are the *target* column names, in mapping order, shared
/// across all records of a table via `Arc`. Immutable once produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    columns: Arc<[String]>,
    values: Vec<SqlValue>,
}

impl Record {
    /// Create a record. The value count must match the column count.
    pub fn new(columns: Arc<[String]>, values: Vec<SqlValue>) -> Self {
        assert_eq!(
            columns.len(),
            values.len(),
            "record arity mismatch: {} columns, {} values",
            columns.len(),
            values.len()
        );
        Self { columns, values }
    }

    /// Target column names in mapping order.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Values in column order.
    #[must_use]
    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    /// Look up a value by target column name.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|idx| &self.values[idx])
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(names: &[&str]) -> Arc<[String]> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_record_get_by_column() {
        let record = Record::new(
            cols(&["ID", "NAME"]),
            vec![SqlValue::I32(7), SqlValue::String("seven".into())],
        );
        assert_eq!(record.get("ID"), Some(&SqlValue::I32(7)));
        assert_eq!(record.get("NAME"), Some(&SqlValue::String("seven".into())));
        assert_eq!(record.get("MISSING"), None);
    }

    #[test]
    #[should_panic(expected = "record arity mismatch")]
    fn test_record_arity_checked() {
        let _ = Record::new(cols(&["ID", "NAME"]), vec![SqlValue::I32(1)]);
    }

    #[test]
    fn test_null_type_tracking() {
        assert!(SqlValue::Null(SqlNullType::DateTime).is_null());
        assert_eq!(
            SqlValue::String("x".into()).null_type(),
            SqlNullType::String
        );
        assert_eq!(SqlValue::Null(SqlNullType::I64).null_type(), SqlNullType::I64);
    }
}
