//! DDL Generation for schema tables
//!
//! Generates CREATE/DROP statements for type, join and unique-constraint
//! tables. Executing them is left to the caller.

use crate::config::EngineConfig;
use crate::sql::sanitize::quote_identifier;
use crate::table::{
    Column, JoinTable, TableRegistry, TypeTable, UniqueConstraintTable, concrete_id_column,
};

/// DDL Generator for schema tables
pub struct DdlGenerator<'a> {
    config: &'a EngineConfig,
}

impl<'a> DdlGenerator<'a> {
    /// Create a new DDL generator with the given configuration
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    fn id_column(&self) -> String {
        self.config
            .dialect
            .identity_column(&quote_identifier(&self.config.id_column))
    }

    /// Generate CREATE TABLE statement for a type table
    ///
    /// Creates a table with the generated id column followed by one column per
    /// column-backed attribute.
    pub fn generate_create_type_table(&self, table: &TypeTable) -> String {
        let mut column_defs = vec![self.id_column()];
        for column in &table.columns {
            column_defs.push(Self::format_column_definition(column));
        }
        format!(
            "CREATE TABLE {} ({})",
            quote_identifier(&table.name),
            column_defs.join(", ")
        )
    }

    /// Generate CREATE TABLE statement for a join table
    ///
    /// Every member type gets a unique `<TYPE>_ID` column; a row has exactly one
    /// of them set.
    pub fn generate_create_join_table(&self, table: &JoinTable) -> String {
        let mut column_defs = vec![self.id_column()];
        for member in &table.members {
            column_defs.push(format!(
                "{} BIGINT UNIQUE",
                quote_identifier(&concrete_id_column(member))
            ));
        }
        format!(
            "CREATE TABLE {} ({})",
            quote_identifier(&table.name),
            column_defs.join(", ")
        )
    }

    /// Generate CREATE TABLE statement for a unique-constraint table
    pub fn generate_create_unique_table(&self, table: &UniqueConstraintTable) -> String {
        let mut column_defs = vec![self.id_column()];
        for column in &table.columns {
            column_defs.push(Self::format_column_definition(column));
        }
        for member in &table.members {
            column_defs.push(format!(
                "{} BIGINT UNIQUE",
                quote_identifier(&concrete_id_column(member))
            ));
        }
        let unique_columns: Vec<String> = table
            .columns
            .iter()
            .map(|c| quote_identifier(&c.name))
            .collect();
        column_defs.push(format!("UNIQUE ({})", unique_columns.join(", ")));
        format!(
            "CREATE TABLE {} ({})",
            quote_identifier(&table.name),
            column_defs.join(", ")
        )
    }

    /// Generate DROP TABLE statement
    pub fn generate_drop_table(&self, table_name: &str) -> String {
        format!("DROP TABLE IF EXISTS {}", quote_identifier(table_name))
    }

    /// CREATE TABLE statements for every table of the registry
    pub fn generate_schema(&self, tables: &TableRegistry) -> Vec<String> {
        let mut statements: Vec<String> = tables
            .type_tables()
            .map(|t| self.generate_create_type_table(t))
            .collect();
        statements.extend(tables.join_tables().map(|t| self.generate_create_join_table(t)));
        statements.extend(
            tables
                .unique_tables()
                .map(|t| self.generate_create_unique_table(t)),
        );
        statements
    }

    /// DROP TABLE statements for every table of the registry
    pub fn generate_drop_schema(&self, tables: &TableRegistry) -> Vec<String> {
        let mut names: Vec<&str> = tables.unique_tables().map(|t| t.name.as_str()).collect();
        names.extend(tables.join_tables().map(|t| t.name.as_str()));
        names.extend(tables.type_tables().map(|t| t.name.as_str()));
        names
            .into_iter()
            .map(|name| self.generate_drop_table(name))
            .collect()
    }

    /// Format a single column definition for CREATE TABLE
    pub fn format_column_definition(column: &Column) -> String {
        let mut parts = vec![quote_identifier(&column.name), column.ddl_type.clone()];

        // NOT NULL constraint
        if column.mandatory {
            parts.push("NOT NULL".to_string());
        }

        parts.join(" ")
    }
}
