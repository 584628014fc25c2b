//! # nquery-engine
//!
//! An embeddable, schema-driven record persistence engine.
//!
//! A schema of named attribute holders (concrete types, abstract types and
//! mixins) is turned into relational tables. Records are dynamic bags of
//! attribute values kept in a [`RecordContext`]; the engine inserts, updates,
//! deletes and reads them, and answers queries written in the small nquery
//! language.
//!
//! ## Features
//!
//! - **Schema Model**: Types with single inheritance, mixins, abstract types and unique constraints
//! - **Attribute Mediators**: One pluggable translator per attribute kind (string, decimal, boolean, date, binary, crypto, json, references, inverse lists)
//! - **Polymorphic References**: References to abstract types and mixins go through join tables
//! - **Cascaded Persistence**: Dependency-ordered inserts, reference cycles broken by deferred updates, orphan removal
//! - **nquery**: `PICK`/`COUNT` queries with `IF`, `ORDERBY`, `LIMIT` and `OFFSET`
//! - **ActiveRecord Façade**: Schema-aware getters and setters over records
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use nquery_engine::nquery::Argument;
//! use nquery_engine::runner::PgQueryRunner;
//! use nquery_engine::types::{Attribute, NamedAttributeHolder};
//! use nquery_engine::{Engine, EngineConfig, RecordContext, SchemaDefinition};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let schema = SchemaDefinition::new("shop")
//!         .with_holder(
//!             NamedAttributeHolder::new_type("Product")
//!                 .with_attribute(Attribute::string("name").mandatory())
//!                 .with_attribute(Attribute::decimal("price", Some(10), Some(2))),
//!         )
//!         .build()?;
//!     let config = EngineConfig::builder("postgres://localhost/shop").build();
//!     let mut runner = PgQueryRunner::from_config(&config).await?;
//!     let engine = Engine::new(schema, config)?;
//!     for statement in engine.create_statements() {
//!         sqlx::query(&statement).execute(runner.pool()).await?;
//!     }
//!
//!     let mut ctx = RecordContext::new();
//!     let product = ctx.create("Product");
//!     ctx.set_attribute(product, "name", "Widget")?;
//!     ctx.set_attribute(product, "price", rust_decimal::Decimal::new(2999, 2))?;
//!
//!     let mut accessor = engine.accessor(&mut runner);
//!     accessor.insert(&mut ctx, product).await?;
//!
//!     let cheap = accessor
//!         .query(&mut ctx, "PICK Product p IF p.price < ? ORDERBY p.name", &[Argument::from(50)])
//!         .await?;
//!     println!("{} cheap products", cheap.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! ```rust
//! use nquery_engine::config::BinaryRepresentation;
//! use nquery_engine::EngineConfig;
//!
//! let config = EngineConfig::builder("postgres://localhost/shop")
//!     .table_prefix("app_")           // Prepended to every table name
//!     .id_column("ID")                // Primary key column (default)
//!     .streaming_binaries()           // Binary attributes as streams
//!     .build();
//! assert_eq!(config.table_name("PRODUCT"), "app_PRODUCT");
//! assert_eq!(config.binary_representation, BinaryRepresentation::Stream);
//! ```

pub mod bean;
pub mod config;
pub mod engine;
pub mod error;
pub mod mediator;
pub mod nquery;
pub mod persistence;
pub mod query;
pub mod record;
pub mod runner;
pub mod schema;
pub mod sql;
pub mod table;
pub mod transaction;
pub mod types;

// Re-export main types for convenience
pub use bean::{ActiveRecord, BeanValue, EclipsingRecord, SchemaBean, SchemaBeanFactory};
pub use config::{EngineConfig, EngineConfigBuilder};
pub use engine::{Accessor, Engine};
pub use error::{EngineError, Result};
pub use nquery::Argument;
pub use record::{AttributeValue, RecordContext, RecordHandle, RecordList};
pub use runner::{PgQueryRunner, QueryRunner};
pub use schema::{Schema, SchemaDefinition};
pub use types::{Attribute, AttributeKind, NamedAttributeHolder};

// Re-export SQL utilities for advanced users
pub use sql::ddl::DdlGenerator;
pub use sql::sanitize::quote_identifier;
