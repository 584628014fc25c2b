//! SQL layer
//!
//! Provides dialects, the SQL value model, statement rendering, DDL generation
//! and identifier sanitization.

pub mod ddl;
pub mod render;
pub mod sanitize;
pub mod value;

pub use ddl::DdlGenerator;
pub use render::{Renderer, Statement};
pub use sanitize::{quote_identifier, to_sql_name, validate_attribute_name, validate_holder_name};
pub use value::{SqlDialect, SqlType, SqlValue};
