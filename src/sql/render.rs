//! Statement rendering
//!
//! Converts the query model into SQL text with positional parameters.
//! Value providers are resolved against the record context at render time,
//! so ids assigned by earlier statements of a transaction are visible.

use crate::error::{EngineError, Result};
use crate::query::{
    BooleanStatement, ColumnRef, ComparisonOperator, Delete, Expression, Insert, NodeId,
    NodeKind, Query, Select, SelectExpr, Source, SqlOperand, Update, ValueProvider,
};
use crate::record::RecordContext;
use crate::sql::sanitize::quote_identifier;
use crate::sql::value::{SqlDialect, SqlType, SqlValue};

/// Rendered SQL with its parameters in placeholder order
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl Statement {
    /// Bind streaming parameters as in-memory bytes
    pub fn without_streams(mut self) -> Self {
        self.params = self
            .params
            .into_iter()
            .map(SqlValue::into_bound_bytes)
            .collect();
        self
    }
}

/// Renders query model statements for one dialect
#[derive(Debug, Clone, Copy)]
pub struct Renderer {
    dialect: SqlDialect,
}

impl Renderer {
    pub fn new(dialect: SqlDialect) -> Self {
        Self { dialect }
    }

    pub fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    /// Render a statement, resolving record ids from `ctx`
    pub fn render(&self, query: &Query, ctx: &RecordContext) -> Result<Statement> {
        let mut state = RenderState {
            dialect: self.dialect,
            ctx,
            params: Vec::new(),
        };
        let sql = match query {
            Query::Insert(insert) => state.insert(insert)?,
            Query::Update(update) => state.update(update)?,
            Query::Delete(delete) => state.delete(delete)?,
            Query::Select(select) => state.select(select)?,
        };
        Ok(Statement {
            sql,
            params: state.params,
        })
    }
}

struct RenderState<'a> {
    dialect: SqlDialect,
    ctx: &'a RecordContext,
    params: Vec<SqlValue>,
}

impl RenderState<'_> {
    fn bind(&mut self, value: SqlValue) -> String {
        self.params.push(value);
        self.dialect.placeholder(self.params.len())
    }

    fn insert(&mut self, insert: &Insert) -> Result<String> {
        let table = quote_identifier(&insert.table);
        let mut sql = if insert.values.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", table)
        } else {
            let mut columns = Vec::with_capacity(insert.values.len());
            let mut values = Vec::with_capacity(insert.values.len());
            for (column, provider) in &insert.values {
                columns.push(quote_identifier(column));
                values.push(self.provider(provider)?);
            }
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                table,
                columns.join(", "),
                values.join(", ")
            )
        };
        if let Some(key) = &insert.generated_key {
            if self.dialect.supports_returning() {
                sql.push_str(&format!(" RETURNING {}", quote_identifier(&key.column)));
            }
        }
        Ok(sql)
    }

    fn update(&mut self, update: &Update) -> Result<String> {
        if update.values.is_empty() {
            return Err(EngineError::invariant(format!(
                "UPDATE of '{}' without columns",
                update.table
            )));
        }
        let mut assignments = Vec::with_capacity(update.values.len());
        for (column, provider) in &update.values {
            let value = self.provider(provider)?;
            assignments.push(format!("{} = {}", quote_identifier(column), value));
        }
        let criteria = self.criteria(&update.criteria)?;
        Ok(format!(
            "UPDATE {} SET {} WHERE {}",
            quote_identifier(&update.table),
            assignments.join(", "),
            criteria
        ))
    }

    fn delete(&mut self, delete: &Delete) -> Result<String> {
        let criteria = self.criteria(&delete.criteria)?;
        Ok(format!(
            "DELETE FROM {} WHERE {}",
            quote_identifier(&delete.table),
            criteria
        ))
    }

    fn select(&mut self, select: &Select) -> Result<String> {
        if select.items.is_empty() {
            return Err(EngineError::invariant("SELECT without result columns"));
        }
        let mut items = Vec::with_capacity(select.items.len());
        for item in &select.items {
            let expr = match &item.expr {
                SelectExpr::Column(column) => column_ref(column),
                SelectExpr::Text(text) => format!("'{}'", text.replace('\'', "''")),
                SelectExpr::CountAll => "COUNT(*)".to_string(),
                SelectExpr::SubSelect(sub) => format!("({})", self.select(sub)?),
            };
            items.push(format!("{} AS {}", expr, quote_identifier(&item.alias)));
        }

        let source = match &select.source {
            Source::Table { name, alias } => {
                format!("{} {}", quote_identifier(name), quote_identifier(alias))
            }
            Source::Union { parts, alias } => {
                if parts.is_empty() {
                    return Err(EngineError::invariant("UNION without members"));
                }
                let mut rendered = Vec::with_capacity(parts.len());
                for part in parts {
                    rendered.push(self.select(part)?);
                }
                format!("({}) {}", rendered.join(" UNION ALL "), quote_identifier(alias))
            }
        };

        let mut sql = format!("SELECT {} FROM {}", items.join(", "), source);

        if let Some(criteria) = &select.criteria {
            if !criteria.is_empty() {
                sql.push_str(" WHERE ");
                sql.push_str(&self.criteria(criteria)?);
            }
        }

        if !select.order_by.is_empty() {
            let order: Vec<String> = select
                .order_by
                .iter()
                .map(|o| {
                    format!(
                        "{} {}",
                        column_ref(&o.column),
                        if o.descending { "DESC" } else { "ASC" }
                    )
                })
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&order.join(", "));
        }

        match self.dialect {
            SqlDialect::Postgres => {
                if let Some(limit) = select.limit {
                    sql.push_str(&format!(" LIMIT {}", limit));
                }
                if let Some(offset) = select.offset {
                    sql.push_str(&format!(" OFFSET {}", offset));
                }
            }
            SqlDialect::Ansi => {
                if select.offset.is_some() || select.limit.is_some() {
                    sql.push_str(&format!(" OFFSET {} ROWS", select.offset.unwrap_or(0)));
                }
                if let Some(limit) = select.limit {
                    sql.push_str(&format!(" FETCH FIRST {} ROWS ONLY", limit));
                }
            }
        }

        Ok(sql)
    }

    fn criteria(&mut self, statement: &BooleanStatement<SqlOperand>) -> Result<String> {
        if statement.is_empty() {
            return Err(EngineError::invariant("Empty criteria"));
        }
        self.chain(statement, statement.root())
    }

    fn chain(
        &mut self,
        statement: &BooleanStatement<SqlOperand>,
        start: Option<NodeId>,
    ) -> Result<String> {
        let mut sql = String::new();
        for id in statement.chain(start) {
            let node = statement.node(id);
            match &node.kind {
                NodeKind::Expression(expression) => sql.push_str(&self.expression(expression)?),
                NodeKind::Wrapper { wrapped, .. } => {
                    if wrapped.is_none() {
                        return Err(EngineError::invariant("Empty group in criteria"));
                    }
                    sql.push('(');
                    sql.push_str(&self.chain(statement, *wrapped)?);
                    sql.push(')');
                }
            }
            if node.next.is_some() {
                let operator = node
                    .next_operator
                    .ok_or_else(|| EngineError::invariant("Criteria nodes linked without operator"))?;
                sql.push(' ');
                sql.push_str(operator.keyword());
                sql.push(' ');
            }
        }
        Ok(sql)
    }

    fn expression(&mut self, expression: &Expression<SqlOperand>) -> Result<String> {
        let left = self.operand(&expression.left)?;
        match (&expression.operator, &expression.right) {
            (ComparisonOperator::InRange, SqlOperand::Range(low, high)) => {
                let low = self.provider(low)?;
                let high = self.provider(high)?;
                Ok(format!("{} BETWEEN {} AND {}", left, low, high))
            }
            (ComparisonOperator::InRange, _) => Err(EngineError::invariant(
                "In-range comparison requires a range operand",
            )),
            (ComparisonOperator::Equal, SqlOperand::Value(ValueProvider::Value(v)))
                if v.is_null() =>
            {
                Ok(format!("{} IS NULL", left))
            }
            (operator, right) => {
                let right = self.operand(right)?;
                Ok(format!("{} {} {}", left, operator.symbol(), right))
            }
        }
    }

    fn operand(&mut self, operand: &SqlOperand) -> Result<String> {
        match operand {
            SqlOperand::Column(column) => Ok(column_ref(column)),
            SqlOperand::Value(provider) => self.provider(provider),
            SqlOperand::Range(..) => Err(EngineError::invariant(
                "Range operand outside of an in-range comparison",
            )),
        }
    }

    fn provider(&mut self, provider: &ValueProvider) -> Result<String> {
        match provider {
            ValueProvider::Value(value) => Ok(self.bind(value.clone())),
            ValueProvider::RecordId(handle) => {
                let record = self.ctx.require(*handle)?;
                let id = record.id().ok_or_else(|| {
                    EngineError::invariant(format!(
                        "Record of type '{}' has no id yet",
                        record.type_name()
                    ))
                })?;
                Ok(self.bind(SqlValue::BigInt(id)))
            }
            ValueProvider::ReferenceId(handle) => {
                let value = match self.ctx.id_of(*handle) {
                    Some(id) => SqlValue::BigInt(id),
                    None => SqlValue::Null(SqlType::BigInt),
                };
                Ok(self.bind(value))
            }
            ValueProvider::SubSelect(select) => Ok(format!("({})", self.select(select)?)),
        }
    }
}

fn column_ref(column: &ColumnRef) -> String {
    match &column.table {
        Some(table) => format!("{}.{}", quote_identifier(table), quote_identifier(&column.name)),
        None => quote_identifier(&column.name),
    }
}
