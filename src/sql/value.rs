//! SQL dialects, column types and parameter values

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::record::BinaryStream;

/// SQL dialect the generated statements are rendered for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlDialect {
    /// PostgreSQL: `$n` placeholders, `RETURNING` for generated keys
    #[default]
    Postgres,
    /// Plain ANSI SQL: `?` placeholders, generated keys reported by the runner
    Ansi,
}

impl SqlDialect {
    /// Placeholder for the parameter at 1-based position `index`
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            SqlDialect::Postgres => format!("${}", index),
            SqlDialect::Ansi => "?".to_string(),
        }
    }

    /// Whether an INSERT can report its generated key through `RETURNING`
    pub fn supports_returning(&self) -> bool {
        matches!(self, SqlDialect::Postgres)
    }

    /// Column definition of a generated 64-bit primary key
    pub fn identity_column(&self, column: &str) -> String {
        match self {
            SqlDialect::Postgres => format!("{} BIGSERIAL PRIMARY KEY", column),
            SqlDialect::Ansi => format!(
                "{} BIGINT GENERATED BY DEFAULT AS IDENTITY PRIMARY KEY",
                column
            ),
        }
    }
}

/// Storage type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlType {
    BigInt,
    Double,
    Numeric { precision: u8, scale: u8 },
    /// Character data with an optional maximum length
    Varchar(Option<u32>),
    Boolean,
    Timestamp,
    Blob,
}

impl SqlType {
    /// Type name used in DDL for the given dialect
    pub fn sql_name(&self, dialect: SqlDialect) -> String {
        match (self, dialect) {
            (SqlType::BigInt, _) => "BIGINT".to_string(),
            (SqlType::Double, _) => "DOUBLE PRECISION".to_string(),
            (SqlType::Numeric { precision, scale }, _) => {
                format!("NUMERIC({},{})", precision, scale)
            }
            (SqlType::Varchar(Some(length)), _) => format!("VARCHAR({})", length),
            (SqlType::Varchar(None), SqlDialect::Postgres) => "TEXT".to_string(),
            (SqlType::Varchar(None), SqlDialect::Ansi) => "VARCHAR(4000)".to_string(),
            (SqlType::Boolean, _) => "BOOLEAN".to_string(),
            (SqlType::Timestamp, _) => "TIMESTAMP WITH TIME ZONE".to_string(),
            (SqlType::Blob, SqlDialect::Postgres) => "BYTEA".to_string(),
            (SqlType::Blob, SqlDialect::Ansi) => "BLOB".to_string(),
        }
    }
}

/// A bound statement parameter or a decoded result value
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// Typed NULL, the type is needed for drivers that bind nulls by type
    Null(SqlType),
    BigInt(i64),
    Double(f64),
    Numeric(Decimal),
    Text(String),
    Boolean(bool),
    Timestamp(DateTime<Utc>),
    Bytes(Vec<u8>),
    /// Binary content the runner may stream instead of binding in one piece
    Stream(BinaryStream),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null(_))
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::BigInt(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Replace a streaming parameter by its in-memory bytes
    pub fn into_bound_bytes(self) -> SqlValue {
        match self {
            SqlValue::Stream(stream) => SqlValue::Bytes(stream.to_vec()),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders() {
        assert_eq!(SqlDialect::Postgres.placeholder(3), "$3");
        assert_eq!(SqlDialect::Ansi.placeholder(3), "?");
    }

    #[test]
    fn test_type_names_per_dialect() {
        assert_eq!(SqlType::Blob.sql_name(SqlDialect::Postgres), "BYTEA");
        assert_eq!(SqlType::Blob.sql_name(SqlDialect::Ansi), "BLOB");
        assert_eq!(SqlType::Varchar(None).sql_name(SqlDialect::Postgres), "TEXT");
        assert_eq!(
            SqlType::Varchar(Some(64)).sql_name(SqlDialect::Ansi),
            "VARCHAR(64)"
        );
        assert_eq!(
            SqlType::Numeric {
                precision: 10,
                scale: 2
            }
            .sql_name(SqlDialect::Postgres),
            "NUMERIC(10,2)"
        );
    }

    #[test]
    fn test_stream_falls_back_to_bytes() {
        let value = SqlValue::Stream(BinaryStream::from(vec![1u8, 2, 3]));
        assert_eq!(value.into_bound_bytes(), SqlValue::Bytes(vec![1, 2, 3]));
    }
}
