//! Configuration for the Engine
//!
//! Provides a builder pattern for configuring the engine.

use crate::sql::SqlDialect;

/// How binary attribute values are handed out and bound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BinaryRepresentation {
    /// Values are `AttributeValue::Binary` byte vectors
    #[default]
    ByteArray,
    /// Values are `AttributeValue::Stream` and bound as streaming parameters
    Stream,
}

/// Configuration for the engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Database URL used by the bundled PostgreSQL runner
    pub database_url: String,
    /// SQL dialect statements are rendered for (default: Postgres)
    pub dialect: SqlDialect,
    /// Binary attribute representation (default: byte array)
    pub binary_representation: BinaryRepresentation,
    /// Prefix prepended to every generated table name (default: none)
    pub table_prefix: String,
    /// Name of the generated primary key column (default: "ID")
    pub id_column: String,
}

impl EngineConfig {
    /// Create a new configuration builder
    pub fn builder(database_url: impl Into<String>) -> EngineConfigBuilder {
        EngineConfigBuilder::new(database_url)
    }

    /// Table name for a SQL base name, with the configured prefix applied
    pub fn table_name(&self, base: &str) -> String {
        format!("{}{}", self.table_prefix, base)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfigBuilder::new("").build()
    }
}

/// Builder for EngineConfig
#[derive(Debug)]
pub struct EngineConfigBuilder {
    database_url: String,
    dialect: SqlDialect,
    binary_representation: BinaryRepresentation,
    table_prefix: String,
    id_column: String,
}

impl EngineConfigBuilder {
    /// Create a new builder with the database URL
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            dialect: SqlDialect::default(),
            binary_representation: BinaryRepresentation::default(),
            table_prefix: String::new(),
            id_column: "ID".to_string(),
        }
    }

    /// Set the SQL dialect (default: Postgres)
    pub fn dialect(mut self, dialect: SqlDialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Set the binary representation (default: byte array)
    pub fn binary_representation(mut self, representation: BinaryRepresentation) -> Self {
        self.binary_representation = representation;
        self
    }

    /// Hand out binary attributes as streams
    pub fn streaming_binaries(mut self) -> Self {
        self.binary_representation = BinaryRepresentation::Stream;
        self
    }

    /// Set the table name prefix (default: none)
    pub fn table_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.table_prefix = prefix.into();
        self
    }

    /// Set the primary key column name (default: "ID")
    pub fn id_column(mut self, name: impl Into<String>) -> Self {
        self.id_column = name.into();
        self
    }

    /// Build the configuration
    pub fn build(self) -> EngineConfig {
        EngineConfig {
            database_url: self.database_url,
            dialect: self.dialect,
            binary_representation: self.binary_representation,
            table_prefix: self.table_prefix,
            id_column: self.id_column,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // EngineConfig Default Tests
    // =========================================================================

    #[test]
    fn test_default_config() {
        let config = EngineConfig::builder("postgres://localhost/test").build();

        assert_eq!(config.database_url, "postgres://localhost/test");
        assert_eq!(config.dialect, SqlDialect::Postgres);
        assert_eq!(
            config.binary_representation,
            BinaryRepresentation::ByteArray
        );
        assert_eq!(config.table_prefix, "");
        assert_eq!(config.id_column, "ID");
    }

    #[test]
    fn test_default_trait_matches_builder() {
        let config = EngineConfig::default();
        assert_eq!(config.database_url, "");
        assert_eq!(config.id_column, "ID");
    }

    #[test]
    fn test_builder_accepts_string() {
        let config = EngineConfig::builder(String::from("postgres://localhost/db")).build();
        assert_eq!(config.database_url, "postgres://localhost/db");
    }

    // =========================================================================
    // Option Tests
    // =========================================================================

    #[test]
    fn test_ansi_dialect() {
        let config = EngineConfig::builder("postgres://localhost/test")
            .dialect(SqlDialect::Ansi)
            .build();
        assert_eq!(config.dialect, SqlDialect::Ansi);
    }

    #[test]
    fn test_streaming_binaries() {
        let config = EngineConfig::builder("postgres://localhost/test")
            .streaming_binaries()
            .build();
        assert_eq!(config.binary_representation, BinaryRepresentation::Stream);
    }

    #[test]
    fn test_table_prefix_applied() {
        let config = EngineConfig::builder("postgres://localhost/test")
            .table_prefix("T1_")
            .build();
        assert_eq!(config.table_name("CUSTOMER"), "T1_CUSTOMER");
    }

    #[test]
    fn test_custom_id_column() {
        let config = EngineConfig::builder("postgres://localhost/test")
            .id_column("OID")
            .build();
        assert_eq!(config.id_column, "OID");
    }

    // =========================================================================
    // Chained Builder Tests
    // =========================================================================

    #[test]
    fn test_builder_order_independence() {
        let config1 = EngineConfig::builder("postgres://localhost/test")
            .table_prefix("X_")
            .dialect(SqlDialect::Ansi)
            .build();

        let config2 = EngineConfig::builder("postgres://localhost/test")
            .dialect(SqlDialect::Ansi)
            .table_prefix("X_")
            .build();

        assert_eq!(config1.table_prefix, config2.table_prefix);
        assert_eq!(config1.dialect, config2.dialect);
    }

    #[test]
    fn test_builder_debug() {
        let builder = EngineConfig::builder("postgres://localhost/test");
        let debug_str = format!("{:?}", builder);
        assert!(debug_str.contains("EngineConfigBuilder"));
    }
}
