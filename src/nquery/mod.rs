//! The nquery language
//!
//! ```text
//! PICK Customer c IF c.name = ? AND (c.age >= ? OR c.vip = ?) ORDERBY c.name DESC LIMIT ? OFFSET 20
//! COUNT Order IF total >< ?
//! ```
//!
//! Keywords are upper case. `?` placeholders are bound left to right from the
//! argument list, across the IF, LIMIT and OFFSET clauses. The in-range
//! operator `><` takes a single [`Argument::Range`].
//!
//! # Example
//!
//! ```
//! use nquery_engine::nquery::{self, Argument, Query};
//!
//! let query = nquery::parse("PICK Foo IF a=? AND b=?", &[Argument::from(1), Argument::from("x")]).unwrap();
//! let Query::Pick(pick) = query else { panic!("expected PICK") };
//! assert_eq!(pick.holder, "Foo");
//! assert_eq!(pick.criteria.expressions().count(), 2);
//! ```

mod handler;
mod parser;
mod read_ahead;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

pub use handler::{ArgumentCursor, DefaultExpressionHandler, ExpressionStatementHandler};
pub use read_ahead::{EndOfInput, ReservedWordReadAhead, STOP_WORDS, StopWordMatch};

use crate::error::Result;
use crate::query::BooleanStatement;
use crate::record::{AttributeValue, RecordHandle};

/// Value bound to a `?` placeholder
#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    Value(AttributeValue),
    /// Inclusive bounds for the in-range operator
    Range(AttributeValue, AttributeValue),
}

impl Argument {
    pub fn range(low: impl Into<AttributeValue>, high: impl Into<AttributeValue>) -> Self {
        Argument::Range(low.into(), high.into())
    }
}

impl From<AttributeValue> for Argument {
    fn from(value: AttributeValue) -> Self {
        Argument::Value(value)
    }
}

macro_rules! argument_from {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Argument {
                fn from(value: $ty) -> Self {
                    Argument::Value(value.into())
                }
            }
        )*
    };
}

argument_from!(&str, String, i64, i32, Decimal, bool, DateTime<Utc>, RecordHandle);

/// Operand of a parsed expression
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Attribute path, optionally prefixed by the query alias
    Path(String),
    Argument(Argument),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub path: String,
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Pick {
    pub holder: String,
    pub alias: Option<String>,
    pub criteria: BooleanStatement<Operand>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Count {
    pub holder: String,
    pub alias: Option<String>,
    pub criteria: BooleanStatement<Operand>,
}

/// A parsed nquery statement
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    Pick(Pick),
    Count(Count),
}

impl Query {
    pub fn holder(&self) -> &str {
        match self {
            Query::Pick(p) => &p.holder,
            Query::Count(c) => &c.holder,
        }
    }

    pub fn alias(&self) -> Option<&str> {
        match self {
            Query::Pick(p) => p.alias.as_deref(),
            Query::Count(c) => c.alias.as_deref(),
        }
    }

    pub fn criteria(&self) -> &BooleanStatement<Operand> {
        match self {
            Query::Pick(p) => &p.criteria,
            Query::Count(c) => &c.criteria,
        }
    }
}

/// Parse nquery text with the default expression handler
pub fn parse(text: &str, arguments: &[Argument]) -> Result<Query> {
    parse_with(text, arguments, &DefaultExpressionHandler)
}

/// Parse nquery text, building expressions with `handler`
pub fn parse_with(
    text: &str,
    arguments: &[Argument],
    handler: &dyn ExpressionStatementHandler,
) -> Result<Query> {
    parser::Parser::new(handler, arguments).parse(text)
}
