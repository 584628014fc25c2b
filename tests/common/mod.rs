//! Shared fixtures for the integration tests
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Once;

use nquery_engine::error::{EngineError, Result};
use nquery_engine::runner::{QueryRunner, ResultColumn, SqlRow};
use nquery_engine::sql::{SqlValue, Statement};
use nquery_engine::types::{Attribute, NamedAttributeHolder, UniqueConstraint};
use nquery_engine::{Engine, EngineConfig, Schema, SchemaDefinition};

static TRACING: Once = Once::new();

/// Install a test subscriber honouring `RUST_LOG`
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Runner that records every statement instead of executing it
///
/// Inserts return increasing keys starting at 1; selects return queued
/// result sets in order, or no rows once the queue is empty.
#[derive(Debug, Default)]
pub struct RecordingRunner {
    pub statements: Vec<Statement>,
    pub events: Vec<&'static str>,
    next_key: i64,
    results: VecDeque<Vec<SqlRow>>,
    fail_at: Option<usize>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start generated keys after `key`
    pub fn with_keys_after(mut self, key: i64) -> Self {
        self.next_key = key;
        self
    }

    /// Queue the rows of the next select
    pub fn push_result(&mut self, rows: Vec<SqlRow>) {
        self.results.push_back(rows);
    }

    /// Fail the statement with the given zero-based index
    pub fn fail_at(mut self, index: usize) -> Self {
        self.fail_at = Some(index);
        self
    }

    pub fn sql(&self) -> Vec<&str> {
        self.statements.iter().map(|s| s.sql.as_str()).collect()
    }

    /// Statements other than selects
    pub fn writes(&self) -> Vec<&str> {
        self.sql()
            .into_iter()
            .filter(|sql| !sql.starts_with("SELECT"))
            .collect()
    }

    fn record(&mut self, statement: &Statement) -> Result<()> {
        if self.fail_at == Some(self.statements.len()) {
            self.statements.push(statement.clone());
            return Err(EngineError::Connection(format!(
                "Simulated failure executing: {}",
                statement.sql
            )));
        }
        self.statements.push(statement.clone());
        Ok(())
    }
}

impl QueryRunner for RecordingRunner {
    async fn begin(&mut self) -> Result<()> {
        self.events.push("BEGIN");
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.events.push("COMMIT");
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.events.push("ROLLBACK");
        Ok(())
    }

    async fn run(&mut self, statement: &Statement) -> Result<u64> {
        self.record(statement)?;
        Ok(1)
    }

    async fn number(&mut self, statement: &Statement) -> Result<i64> {
        self.record(statement)?;
        self.next_key += 1;
        Ok(self.next_key)
    }

    async fn query(&mut self, statement: &Statement, _columns: &[ResultColumn]) -> Result<Vec<SqlRow>> {
        self.record(statement)?;
        Ok(self.results.pop_front().unwrap_or_default())
    }
}

/// Result row from column/value pairs
pub fn row(values: &[(&str, SqlValue)]) -> SqlRow {
    SqlRow::new(
        values.iter().map(|(c, _)| c.to_string()).collect(),
        values.iter().map(|(_, v)| v.clone()).collect(),
    )
}

/// Shop schema used across the tests
///
/// - `Party` is abstract with concrete `Customer` and `Supplier`
/// - `Order` refers to a `Party` and owns `Line`s through an inverse list
/// - `Person` and `Passport` refer to each other
/// - `Vehicle` owns a `Registration` whose `vehicle` is filled in on save
pub fn shop_schema() -> Schema {
    SchemaDefinition::new("shop")
        .with_holder(
            NamedAttributeHolder::new_type("Party")
                .as_abstract()
                .with_attribute(Attribute::string("email"))
                .with_unique_constraint(UniqueConstraint::new(["email"])),
        )
        .with_holder(
            NamedAttributeHolder::new_type("Customer")
                .with_parent("Party")
                .with_attribute(Attribute::string("name"))
                .with_attribute(Attribute::boolean("active")),
        )
        .with_holder(
            NamedAttributeHolder::new_type("Supplier")
                .with_parent("Party")
                .with_attribute(Attribute::boolean("preferred")),
        )
        .with_holder(
            NamedAttributeHolder::new_type("Order")
                .with_attribute(Attribute::decimal("total", Some(10), Some(2)))
                .with_attribute(Attribute::reference("party", "Party"))
                .with_attribute(Attribute::inverse("lines", "Line", "order")),
        )
        .with_holder(
            NamedAttributeHolder::new_type("Line")
                .with_attribute(Attribute::string("sku"))
                .with_attribute(Attribute::decimal("quantity", None, None))
                .with_attribute(Attribute::reference("order", "Order")),
        )
        .with_holder(
            NamedAttributeHolder::new_type("Person")
                .with_attribute(Attribute::string("name"))
                .with_attribute(Attribute::reference("passport", "Passport")),
        )
        .with_holder(
            NamedAttributeHolder::new_type("Passport")
                .with_attribute(Attribute::string("number"))
                .with_attribute(Attribute::reference("holder", "Person")),
        )
        .with_holder(
            NamedAttributeHolder::new_type("Vehicle")
                .with_attribute(Attribute::string("plate"))
                .with_attribute(
                    Attribute::reference("registration", "Registration").to_one("vehicle"),
                ),
        )
        .with_holder(
            NamedAttributeHolder::new_type("Registration")
                .with_attribute(Attribute::string("code"))
                .with_attribute(Attribute::reference("vehicle", "Vehicle")),
        )
        .build()
        .expect("shop schema is valid")
}

pub fn shop_engine() -> Engine {
    init_tracing();
    Engine::new(shop_schema(), EngineConfig::default()).expect("engine builds")
}
