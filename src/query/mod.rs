//! Vendor-neutral query model
//!
//! Statements are built as data (insert, update, delete, select) and rendered
//! to SQL text later by [`crate::sql::Renderer`]. Values that depend on other
//! records (ids assigned during the same transaction) are expressed as
//! [`ValueProvider`]s and resolved at render time.

pub mod statement;

pub use statement::{
    BooleanOperator, BooleanStatement, ComparisonOperator, Expression, NodeId, NodeKind,
    StatementNode,
};

use crate::record::RecordHandle;
use crate::sql::{SqlType, SqlValue};

/// Alias of the main table in generated selects
pub const MAIN_ALIAS: &str = "t";

/// Name of the discriminator column of union selects
pub const TYPE_DISCRIMINATOR: &str = "_TYPE";

/// Column, optionally qualified by a table alias
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    pub table: Option<String>,
    pub name: String,
}

impl ColumnRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            table: None,
            name: name.into(),
        }
    }

    pub fn qualified(table: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            table: Some(table.into()),
            name: name.into(),
        }
    }
}

/// Source of a bound parameter
#[derive(Debug, Clone, PartialEq)]
pub enum ValueProvider {
    Value(SqlValue),
    /// Id of a record; rendering fails when the record has no id
    RecordId(RecordHandle),
    /// Id of a referenced record, or NULL while it has none
    ReferenceId(RecordHandle),
    /// Scalar sub-select
    SubSelect(Box<Select>),
}

/// Operand of a SQL-level expression
#[derive(Debug, Clone, PartialEq)]
pub enum SqlOperand {
    Column(ColumnRef),
    Value(ValueProvider),
    /// Inclusive bounds, the right operand of `InRange`
    Range(ValueProvider, ValueProvider),
}

pub type Criteria = BooleanStatement<SqlOperand>;

/// `column = value` criteria
pub fn equals(column: ColumnRef, value: ValueProvider) -> Criteria {
    BooleanStatement::from_expression(Expression::new(
        SqlOperand::Column(column),
        ComparisonOperator::Equal,
        SqlOperand::Value(value),
    ))
}

/// Asks the runner to report the generated key of an insert and assign it
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedKey {
    pub record: RecordHandle,
    pub column: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Insert {
    pub table: String,
    pub values: Vec<(String, ValueProvider)>,
    pub generated_key: Option<GeneratedKey>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub table: String,
    pub values: Vec<(String, ValueProvider)>,
    pub criteria: Criteria,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Delete {
    pub table: String,
    pub criteria: Criteria,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectExpr {
    Column(ColumnRef),
    /// Inline string literal
    Text(String),
    CountAll,
    SubSelect(Box<Select>),
}

/// Result column of a select
#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    pub expr: SelectExpr,
    pub alias: String,
    pub sql_type: SqlType,
}

impl SelectItem {
    pub fn new(expr: SelectExpr, alias: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            expr,
            alias: alias.into(),
            sql_type,
        }
    }

    pub fn column(table: &str, name: &str, sql_type: SqlType) -> Self {
        Self::new(
            SelectExpr::Column(ColumnRef::qualified(table, name)),
            name,
            sql_type,
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    Table { name: String, alias: String },
    /// `UNION ALL` of several selects as a derived table
    Union { parts: Vec<Select>, alias: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderItem {
    pub column: ColumnRef,
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub items: Vec<SelectItem>,
    pub source: Source,
    pub criteria: Option<Criteria>,
    pub order_by: Vec<OrderItem>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl Select {
    pub fn from_table(name: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            items: Vec::new(),
            source: Source::Table {
                name: name.into(),
                alias: alias.into(),
            },
            criteria: None,
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    pub fn with_item(mut self, item: SelectItem) -> Self {
        self.items.push(item);
        self
    }

    pub fn with_criteria(mut self, criteria: Criteria) -> Self {
        self.criteria = Some(criteria);
        self
    }

    /// Alias of the source, used to qualify columns
    pub fn source_alias(&self) -> &str {
        match &self.source {
            Source::Table { alias, .. } | Source::Union { alias, .. } => alias,
        }
    }
}

/// A statement of the query model
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    Insert(Insert),
    Update(Update),
    Delete(Delete),
    Select(Select),
}

impl Query {
    pub fn table(&self) -> Option<&str> {
        match self {
            Query::Insert(i) => Some(&i.table),
            Query::Update(u) => Some(&u.table),
            Query::Delete(d) => Some(&d.table),
            Query::Select(s) => match &s.source {
                Source::Table { name, .. } => Some(name),
                Source::Union { .. } => None,
            },
        }
    }
}
