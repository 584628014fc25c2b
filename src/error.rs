//! Error types for engine operations

use thiserror::Error;

/// Errors that can occur while parsing, building or executing queries
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed nquery text
    #[error("Query parsing error: {0}")]
    QueryParsing(String),

    /// Schema lookups that failed at runtime (unknown holder, unknown attribute, ...)
    #[error("Schema error: {0}")]
    Schema(String),

    /// Fatal misconfiguration detected while building the engine
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal structure was left in a state that indicates a bug or a malformed schema
    #[error("Internal invariant violated: {0}")]
    Invariant(String),

    /// A value could not be converted for the attribute it was handed to
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Record not found: {0}")]
    RecordNotFound(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    pub fn query_parsing(msg: impl Into<String>) -> Self {
        Self::QueryParsing(msg.into())
    }

    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::Invariant(msg.into())
    }

    pub fn invalid_value(msg: impl Into<String>) -> Self {
        Self::InvalidValue(msg.into())
    }

    pub fn crypto(msg: impl Into<String>) -> Self {
        Self::Crypto(msg.into())
    }

    pub fn record_not_found(msg: impl Into<String>) -> Self {
        Self::RecordNotFound(msg.into())
    }

    /// Whether this error reports malformed nquery text
    pub fn is_query_parsing(&self) -> bool {
        matches!(self, Self::QueryParsing(_))
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
