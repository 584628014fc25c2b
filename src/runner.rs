//! Statement execution
//!
//! The engine never talks to a database directly. Rendered statements are
//! handed to a [`QueryRunner`], which owns the connection and the transaction
//! scope. [`PgQueryRunner`] is the sqlx-backed implementation for PostgreSQL.

use std::future::Future;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::{PgPool, Postgres, Row};
use tracing::debug;

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::query::SelectItem;
use crate::sql::{SqlType, SqlValue, Statement};

/// Name and type of a result column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultColumn {
    pub name: String,
    pub sql_type: SqlType,
}

impl ResultColumn {
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            name: name.into(),
            sql_type,
        }
    }
}

impl From<&SelectItem> for ResultColumn {
    fn from(item: &SelectItem) -> Self {
        Self::new(item.alias.clone(), item.sql_type)
    }
}

/// One decoded result row, columns addressed by name
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SqlRow {
    columns: Vec<String>,
    values: Vec<SqlValue>,
}

impl SqlRow {
    pub fn new(columns: Vec<String>, values: Vec<SqlValue>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.values.get(i))
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }
}

/// Executes rendered statements
///
/// Statements issued between [`begin`](Self::begin) and
/// [`commit`](Self::commit)/[`rollback`](Self::rollback) share one database
/// transaction; outside of it every statement runs on its own.
pub trait QueryRunner: Send {
    fn begin(&mut self) -> impl Future<Output = Result<()>> + Send;

    fn commit(&mut self) -> impl Future<Output = Result<()>> + Send;

    fn rollback(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Execute a statement, returning the number of affected rows
    fn run(&mut self, statement: &Statement) -> impl Future<Output = Result<u64>> + Send;

    /// Execute an insert and return the key generated for it
    fn number(&mut self, statement: &Statement) -> impl Future<Output = Result<i64>> + Send;

    /// Execute a select, decoding `columns` of every row
    fn query(
        &mut self,
        statement: &Statement,
        columns: &[ResultColumn],
    ) -> impl Future<Output = Result<Vec<SqlRow>>> + Send;

    /// Whether [`SqlValue::Stream`] parameters can be bound as-is
    fn supports_streaming(&self) -> bool {
        false
    }
}

/// PostgreSQL runner over an sqlx pool
pub struct PgQueryRunner {
    pool: PgPool,
    transaction: Option<sqlx::Transaction<'static, Postgres>>,
}

impl PgQueryRunner {
    /// Connect a new pool
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await.map_err(|e| {
            EngineError::Connection(format!("Database connection failed: {}", e))
        })?;
        Ok(Self::from_pool(pool))
    }

    /// Connect to the database named by [`EngineConfig::database_url`]
    pub async fn from_config(config: &EngineConfig) -> Result<Self> {
        if config.database_url.is_empty() {
            return Err(EngineError::configuration("No database URL configured"));
        }
        Self::connect(&config.database_url).await
    }

    /// Share an existing pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            transaction: None,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn in_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    fn prepare(statement: &Statement) -> sqlx::query::Query<'_, Postgres, PgArguments> {
        statement
            .params
            .iter()
            .fold(sqlx::query(&statement.sql), bind_value)
    }

    fn decode_row(row: &PgRow, columns: &[ResultColumn]) -> Result<SqlRow> {
        let mut names = Vec::with_capacity(columns.len());
        let mut values = Vec::with_capacity(columns.len());
        for column in columns {
            names.push(column.name.clone());
            values.push(extract_column_value(row, column)?);
        }
        Ok(SqlRow::new(names, values))
    }
}

impl QueryRunner for PgQueryRunner {
    async fn begin(&mut self) -> Result<()> {
        if self.transaction.is_some() {
            return Err(EngineError::invariant("Transaction already started"));
        }
        self.transaction = Some(self.pool.begin().await?);
        debug!("Transaction started");
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        let transaction = self
            .transaction
            .take()
            .ok_or_else(|| EngineError::invariant("Commit without transaction"))?;
        transaction.commit().await?;
        debug!("Transaction committed");
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        if let Some(transaction) = self.transaction.take() {
            transaction.rollback().await?;
            debug!("Transaction rolled back");
        }
        Ok(())
    }

    async fn run(&mut self, statement: &Statement) -> Result<u64> {
        let query = Self::prepare(statement);
        let result = match self.transaction.as_mut() {
            Some(transaction) => query.execute(&mut **transaction).await?,
            None => query.execute(&self.pool).await?,
        };
        Ok(result.rows_affected())
    }

    async fn number(&mut self, statement: &Statement) -> Result<i64> {
        let query = Self::prepare(statement);
        let row = match self.transaction.as_mut() {
            Some(transaction) => query.fetch_one(&mut **transaction).await?,
            None => query.fetch_one(&self.pool).await?,
        };
        Ok(row.try_get::<i64, _>(0)?)
    }

    async fn query(&mut self, statement: &Statement, columns: &[ResultColumn]) -> Result<Vec<SqlRow>> {
        let query = Self::prepare(statement);
        let rows = match self.transaction.as_mut() {
            Some(transaction) => query.fetch_all(&mut **transaction).await?,
            None => query.fetch_all(&self.pool).await?,
        };
        rows.iter()
            .map(|row| Self::decode_row(row, columns))
            .collect()
    }
}

fn bind_value<'q>(
    query: sqlx::query::Query<'q, Postgres, PgArguments>,
    value: &'q SqlValue,
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    match value {
        SqlValue::Null(sql_type) => match sql_type {
            SqlType::BigInt => query.bind(None::<i64>),
            SqlType::Double => query.bind(None::<f64>),
            SqlType::Numeric { .. } => query.bind(None::<Decimal>),
            SqlType::Varchar(_) => query.bind(None::<String>),
            SqlType::Boolean => query.bind(None::<bool>),
            SqlType::Timestamp => query.bind(None::<DateTime<Utc>>),
            SqlType::Blob => query.bind(None::<Vec<u8>>),
        },
        SqlValue::BigInt(v) => query.bind(*v),
        SqlValue::Double(v) => query.bind(*v),
        SqlValue::Numeric(v) => query.bind(*v),
        SqlValue::Text(v) => query.bind(v.as_str()),
        SqlValue::Boolean(v) => query.bind(*v),
        SqlValue::Timestamp(v) => query.bind(*v),
        SqlValue::Bytes(v) => query.bind(v.as_slice()),
        SqlValue::Stream(stream) => query.bind(stream.to_vec()),
    }
}

fn extract_column_value(row: &PgRow, column: &ResultColumn) -> Result<SqlValue> {
    let name = column.name.as_str();
    let value = match column.sql_type {
        SqlType::BigInt => row.try_get::<Option<i64>, _>(name)?.map(SqlValue::BigInt),
        SqlType::Double => row.try_get::<Option<f64>, _>(name)?.map(SqlValue::Double),
        SqlType::Numeric { .. } => row
            .try_get::<Option<Decimal>, _>(name)?
            .map(SqlValue::Numeric),
        SqlType::Varchar(_) => row.try_get::<Option<String>, _>(name)?.map(SqlValue::Text),
        SqlType::Boolean => row.try_get::<Option<bool>, _>(name)?.map(SqlValue::Boolean),
        SqlType::Timestamp => row
            .try_get::<Option<DateTime<Utc>>, _>(name)?
            .map(SqlValue::Timestamp),
        SqlType::Blob => row.try_get::<Option<Vec<u8>>, _>(name)?.map(SqlValue::Bytes),
    };
    Ok(value.unwrap_or(SqlValue::Null(column.sql_type)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_lookup_by_name() {
        let row = SqlRow::new(
            vec!["ID".to_string(), "NAME".to_string()],
            vec![SqlValue::BigInt(4), SqlValue::Text("Ada".to_string())],
        );
        assert_eq!(row.get("NAME"), Some(&SqlValue::Text("Ada".to_string())));
        assert_eq!(row.get("ID").and_then(SqlValue::as_i64), Some(4));
        assert_eq!(row.get("MISSING"), None);
    }

    #[test]
    fn test_result_column_from_select_item() {
        let item = SelectItem::column("t", "NAME", SqlType::Varchar(Some(20)));
        let column = ResultColumn::from(&item);
        assert_eq!(column.name, "NAME");
        assert_eq!(column.sql_type, SqlType::Varchar(Some(20)));
    }
}
