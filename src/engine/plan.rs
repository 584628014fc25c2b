//! Translation of parsed nquery statements into selects
//!
//! A holder with a single concrete type is read from that type's table. Any
//! other holder (a type with subtypes, a mixin) is read from a `UNION ALL` of
//! its concrete type tables, each part tagging its rows with the concrete
//! type name in a `_TYPE` column.

use rust_decimal::prelude::ToPrimitive;

use crate::error::{EngineError, Result};
use crate::mediator::{MediatorEnv, MediatorRegistry};
use crate::nquery::{Argument, Count, Operand, OrderBy, Pick};
use crate::persistence::ChildKey;
use crate::query::{
    BooleanStatement, ColumnRef, ComparisonOperator, Criteria, Expression, MAIN_ALIAS,
    OrderItem, Select, SelectExpr, SelectItem, Source, SqlOperand, TYPE_DISCRIMINATOR,
    ValueProvider, equals,
};
use crate::record::{AttributeValue, RecordContext, RecordHandle};
use crate::runner::{ResultColumn, SqlRow};
use crate::sql::{SqlType, SqlValue};
use crate::table::{TableRegistry, column_name};
use crate::types::Attribute;

/// Alias of the derived table of union selects
pub const UNION_ALIAS: &str = "u";

/// Result column of count selects
pub const COUNT_ALIAS: &str = "COUNT";

/// What the outer select hands back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Projection {
    Records,
    Keys,
    Count,
}

/// A select together with what is needed to read its rows
#[derive(Debug, Clone)]
pub struct QueryPlan {
    pub select: Select,
    /// Holder the statement was written against
    pub holder: String,
    /// Concrete type of every row; `None` when rows carry a `_TYPE` column
    pub concrete: Option<String>,
}

impl QueryPlan {
    pub fn columns(&self) -> Vec<ResultColumn> {
        self.select.items.iter().map(ResultColumn::from).collect()
    }
}

/// Operand target of an attribute path
#[derive(Debug, Clone, Copy)]
enum PathTarget<'s> {
    Id,
    Attribute(&'s Attribute),
}

#[derive(Debug, Clone, Copy)]
pub struct QueryPlanner<'e> {
    env: MediatorEnv<'e>,
    mediators: &'e MediatorRegistry,
    tables: &'e TableRegistry,
}

impl<'e> QueryPlanner<'e> {
    pub fn new(
        env: MediatorEnv<'e>,
        mediators: &'e MediatorRegistry,
        tables: &'e TableRegistry,
    ) -> Self {
        Self {
            env,
            mediators,
            tables,
        }
    }

    pub fn pick(&self, ctx: &RecordContext, pick: Pick) -> Result<QueryPlan> {
        let mut plan = self.base(&pick.holder, Projection::Records)?;
        let alias = pick.alias.as_deref();
        plan.select.criteria = self.criteria(ctx, &plan, alias, pick.criteria)?;
        if let Some(OrderBy { path, descending }) = pick.order_by {
            let column = match self.resolve(&plan.holder, alias, &path)? {
                PathTarget::Id => self.env.config.id_column.clone(),
                PathTarget::Attribute(attribute) => column_name(&attribute.name),
            };
            plan.select.order_by.push(OrderItem {
                column: ColumnRef::qualified(plan.select.source_alias(), column),
                descending,
            });
        }
        plan.select.limit = pick.limit;
        plan.select.offset = pick.offset;
        Ok(plan)
    }

    pub fn count(&self, ctx: &RecordContext, count: Count) -> Result<QueryPlan> {
        let mut plan = self.base(&count.holder, Projection::Count)?;
        plan.select.criteria = self.criteria(ctx, &plan, count.alias.as_deref(), count.criteria)?;
        Ok(plan)
    }

    /// Full row of one stored record
    pub fn by_id(&self, type_name: &str, id: i64) -> Result<QueryPlan> {
        let holder = self.env.schema.require_holder(type_name)?;
        if !holder.is_concrete() {
            return Err(EngineError::invalid_value(format!(
                "'{}' is not a concrete type",
                type_name
            )));
        }
        let mut plan = self.base(type_name, Projection::Records)?;
        plan.select.criteria = Some(equals(
            ColumnRef::qualified(MAIN_ALIAS, self.env.config.id_column.clone()),
            ValueProvider::Value(SqlValue::BigInt(id)),
        ));
        Ok(plan)
    }

    /// Keys of the records of `holder` whose `referenced_attribute` points at `owner`
    pub fn children(
        &self,
        ctx: &RecordContext,
        holder: &str,
        referenced_attribute: &str,
        owner: RecordHandle,
    ) -> Result<QueryPlan> {
        let mut plan = self.base(holder, Projection::Keys)?;
        let criteria = BooleanStatement::from_expression(Expression::new(
            Operand::Path(referenced_attribute.to_string()),
            ComparisonOperator::Equal,
            Operand::Argument(Argument::Value(AttributeValue::Record(owner))),
        ));
        plan.select.criteria = self.criteria(ctx, &plan, None, criteria)?;
        Ok(plan)
    }

    /// Attributes of `holder` stored in columns
    fn column_attributes(&self, holder: &str) -> Result<Vec<&'e Attribute>> {
        let mut attributes = Vec::new();
        for attribute in self.env.schema.all_attributes(holder) {
            if self.mediators.for_attribute(attribute)?.requires_column_mapping() {
                attributes.push(attribute);
            }
        }
        Ok(attributes)
    }

    fn record_items(&self, alias: &str, attributes: &[&Attribute]) -> Result<Vec<SelectItem>> {
        let mut items = vec![SelectItem::column(alias, &self.env.config.id_column, SqlType::BigInt)];
        for attribute in attributes {
            let mediator = self.mediators.for_attribute(attribute)?;
            items.extend(mediator.select_items(&self.env, attribute, alias)?);
        }
        Ok(items)
    }

    fn count_item() -> SelectItem {
        SelectItem::new(SelectExpr::CountAll, COUNT_ALIAS, SqlType::BigInt)
    }

    fn base(&self, holder: &str, projection: Projection) -> Result<QueryPlan> {
        let schema = self.env.schema;
        schema.require_holder(holder)?;
        let attributes = self.column_attributes(holder)?;
        let id_column = &self.env.config.id_column;
        let concrete = schema.concrete_types_of(holder);

        if let [single] = concrete.as_slice() {
            let table = self.tables.type_table(single)?;
            let mut select = Select::from_table(table.name.clone(), MAIN_ALIAS);
            select.items = match projection {
                Projection::Records => self.record_items(MAIN_ALIAS, &attributes)?,
                Projection::Keys => {
                    vec![SelectItem::column(MAIN_ALIAS, id_column, SqlType::BigInt)]
                }
                Projection::Count => vec![Self::count_item()],
            };
            return Ok(QueryPlan {
                select,
                holder: holder.to_string(),
                concrete: Some(single.clone()),
            });
        }
        if concrete.is_empty() {
            return Err(EngineError::schema(format!(
                "'{}' has no concrete type to query",
                holder
            )));
        }

        let mut parts = Vec::with_capacity(concrete.len());
        for type_name in &concrete {
            let table = self.tables.type_table(type_name)?;
            let mut part = Select::from_table(table.name.clone(), MAIN_ALIAS);
            part.items = self.record_items(MAIN_ALIAS, &attributes)?;
            part.items.insert(
                1,
                SelectItem::new(
                    SelectExpr::Text(type_name.clone()),
                    TYPE_DISCRIMINATOR,
                    SqlType::Varchar(None),
                ),
            );
            parts.push(part);
        }
        let outer = |item: &SelectItem| SelectItem::column(UNION_ALIAS, &item.alias, item.sql_type);
        let items = match projection {
            Projection::Records => parts[0].items.iter().map(outer).collect(),
            Projection::Keys => parts[0].items[..2].iter().map(outer).collect(),
            Projection::Count => vec![Self::count_item()],
        };
        Ok(QueryPlan {
            select: Select {
                items,
                source: Source::Union {
                    parts,
                    alias: UNION_ALIAS.to_string(),
                },
                criteria: None,
                order_by: Vec::new(),
                limit: None,
                offset: None,
            },
            holder: holder.to_string(),
            concrete: None,
        })
    }

    fn criteria(
        &self,
        ctx: &RecordContext,
        plan: &QueryPlan,
        alias: Option<&str>,
        statement: BooleanStatement<Operand>,
    ) -> Result<Option<Criteria>> {
        if statement.is_empty() {
            return Ok(None);
        }
        let table_alias = plan.select.source_alias().to_string();
        let criteria = statement
            .try_map(|e| self.expression(ctx, &plan.holder, alias, &table_alias, e))?;
        Ok(Some(criteria))
    }

    fn expression(
        &self,
        ctx: &RecordContext,
        holder: &str,
        alias: Option<&str>,
        table_alias: &str,
        expression: Expression<Operand>,
    ) -> Result<Expression<SqlOperand>> {
        let Expression {
            left,
            operator,
            right,
        } = expression;
        // Keep the attribute on the left
        let (left, operator, right) = match (left, right) {
            (Operand::Argument(argument), Operand::Path(path)) => {
                (Operand::Path(path), operator.mirrored(), Operand::Argument(argument))
            }
            (left, right) => (left, operator, right),
        };

        match (left, right) {
            (Operand::Path(left), Operand::Path(right)) => {
                if operator == ComparisonOperator::InRange {
                    return Err(EngineError::query_parsing(format!(
                        "In-range comparison of '{}' needs a range argument",
                        left
                    )));
                }
                let left = self.resolve(holder, alias, &left)?;
                let right = self.resolve(holder, alias, &right)?;
                Ok(Expression::new(
                    SqlOperand::Column(self.column(left, table_alias)),
                    operator,
                    SqlOperand::Column(self.column(right, table_alias)),
                ))
            }
            (Operand::Path(path), Operand::Argument(argument)) => {
                let target = self.resolve(holder, alias, &path)?;
                let right = match argument {
                    Argument::Value(value) => SqlOperand::Value(self.bind(ctx, target, &value)?),
                    Argument::Range(low, high) => SqlOperand::Range(
                        self.bind(ctx, target, &low)?,
                        self.bind(ctx, target, &high)?,
                    ),
                };
                Ok(Expression::new(
                    SqlOperand::Column(self.column(target, table_alias)),
                    operator,
                    right,
                ))
            }
            _ => Err(EngineError::query_parsing(
                "Expression compares two arguments",
            )),
        }
    }

    fn resolve(&self, holder: &str, alias: Option<&str>, path: &str) -> Result<PathTarget<'e>> {
        // Without a declared alias a single leading segment names the holder implicitly
        let name = match alias {
            Some(alias) => path
                .strip_prefix(alias)
                .and_then(|rest| rest.strip_prefix('.'))
                .unwrap_or(path),
            None => path.split_once('.').map_or(path, |(_, rest)| rest),
        };
        if name.contains('.') {
            return Err(EngineError::query_parsing(format!(
                "Attribute path '{}' does not name an attribute of '{}'",
                path, holder
            )));
        }
        if name == "id" {
            return Ok(PathTarget::Id);
        }
        let attribute = self.env.schema.attribute(holder, name).ok_or_else(|| {
            EngineError::query_parsing(format!("Unknown attribute '{}' on '{}'", name, holder))
        })?;
        if !self.mediators.for_attribute(attribute)?.requires_column_mapping() {
            return Err(EngineError::query_parsing(format!(
                "Attribute '{}' is not stored in a column and cannot be queried",
                name
            )));
        }
        Ok(PathTarget::Attribute(attribute))
    }

    fn column(&self, target: PathTarget<'_>, table_alias: &str) -> ColumnRef {
        match target {
            PathTarget::Id => ColumnRef::qualified(table_alias, self.env.config.id_column.clone()),
            PathTarget::Attribute(attribute) => {
                ColumnRef::qualified(table_alias, column_name(&attribute.name))
            }
        }
    }

    fn bind(
        &self,
        ctx: &RecordContext,
        target: PathTarget<'_>,
        value: &AttributeValue,
    ) -> Result<ValueProvider> {
        match target {
            PathTarget::Attribute(attribute) => {
                let mediator = self.mediators.for_attribute(attribute)?;
                mediator.validate_value(&self.env, attribute, value)?;
                mediator.bind_value(&self.env, ctx, attribute, value)
            }
            PathTarget::Id => match value {
                AttributeValue::Id(id) => Ok(ValueProvider::Value(SqlValue::BigInt(*id))),
                AttributeValue::Decimal(d) if d.fract().is_zero() => d
                    .to_i64()
                    .map(|id| ValueProvider::Value(SqlValue::BigInt(id)))
                    .ok_or_else(|| EngineError::invalid_value(format!("Id {} out of range", d))),
                AttributeValue::Record(handle) => Ok(ValueProvider::RecordId(*handle)),
                AttributeValue::Null => Ok(ValueProvider::Value(SqlValue::Null(SqlType::BigInt))),
                other => Err(EngineError::invalid_value(format!(
                    "Ids cannot be compared with a {} value",
                    other.type_name()
                ))),
            },
        }
    }

    /// Type and id of the record a row belongs to
    pub fn row_key(&self, plan: &QueryPlan, row: &SqlRow) -> Result<ChildKey> {
        let id_column = &self.env.config.id_column;
        let id = row.get(id_column).and_then(SqlValue::as_i64).ok_or_else(|| {
            EngineError::invariant(format!("Result row lacks the '{}' column", id_column))
        })?;
        let type_name = match &plan.concrete {
            Some(type_name) => type_name.clone(),
            None => row
                .get(TYPE_DISCRIMINATOR)
                .and_then(SqlValue::as_str)
                .map(str::to_string)
                .ok_or_else(|| {
                    EngineError::invariant(format!(
                        "Result row lacks the '{}' column",
                        TYPE_DISCRIMINATOR
                    ))
                })?,
        };
        Ok((type_name, id))
    }

    /// Turn result rows into records of `ctx`
    ///
    /// With `overwrite` unset, attributes already present on a record are kept.
    pub fn materialize(
        &self,
        ctx: &mut RecordContext,
        plan: &QueryPlan,
        rows: &[SqlRow],
        overwrite: bool,
    ) -> Result<Vec<RecordHandle>> {
        let attributes = self.column_attributes(&plan.holder)?;
        let mut handles = Vec::with_capacity(rows.len());
        for row in rows {
            let (type_name, id) = self.row_key(plan, row)?;
            let handle = ctx.loaded(&type_name, id);
            for attribute in &attributes {
                if !overwrite && ctx.is_present(handle, &attribute.name) {
                    continue;
                }
                let mediator = self.mediators.for_attribute(attribute)?;
                let value = mediator.extract_from_row(&self.env, ctx, row, attribute)?;
                ctx.set_loaded_attribute(handle, &attribute.name, value)?;
            }
            handles.push(handle);
        }
        Ok(handles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::mediator::DefaultMediatorFactory;
    use crate::nquery::{self, Query};
    use crate::query::Query as SqlQuery;
    use crate::schema::{Schema, SchemaDefinition};
    use crate::sql::{Renderer, SqlDialect, Statement};
    use crate::types::NamedAttributeHolder;

    struct Fixture {
        schema: Schema,
        config: EngineConfig,
        mediators: MediatorRegistry,
        tables: TableRegistry,
    }

    impl Fixture {
        fn new() -> Self {
            let schema = SchemaDefinition::new("shop")
                .with_holder(
                    NamedAttributeHolder::new_type("Party")
                        .as_abstract()
                        .with_attribute(Attribute::string("name")),
                )
                .with_holder(NamedAttributeHolder::new_type("Customer").with_parent("Party"))
                .with_holder(NamedAttributeHolder::new_type("Supplier").with_parent("Party"))
                .with_holder(
                    NamedAttributeHolder::new_type("Order")
                        .with_attribute(Attribute::decimal("total", Some(10), Some(2)))
                        .with_attribute(Attribute::reference("customer", "Customer"))
                        .with_attribute(Attribute::inverse("lines", "Line", "order")),
                )
                .with_holder(
                    NamedAttributeHolder::new_type("Line")
                        .with_attribute(Attribute::reference("order", "Order")),
                )
                .build()
                .unwrap();
            let config = EngineConfig::default();
            let mediators =
                MediatorRegistry::build(&schema, &DefaultMediatorFactory::new()).unwrap();
            let tables = TableRegistry::build(&schema, &mediators, &config).unwrap();
            Self {
                schema,
                config,
                mediators,
                tables,
            }
        }

        fn planner(&self) -> QueryPlanner<'_> {
            QueryPlanner::new(
                MediatorEnv {
                    schema: &self.schema,
                    config: &self.config,
                },
                &self.mediators,
                &self.tables,
            )
        }

        fn pick(&self, ctx: &RecordContext, text: &str, arguments: &[Argument]) -> Result<QueryPlan> {
            match nquery::parse(text, arguments)? {
                Query::Pick(pick) => self.planner().pick(ctx, pick),
                Query::Count(count) => self.planner().count(ctx, count),
            }
        }
    }

    fn render(plan: &QueryPlan, ctx: &RecordContext) -> Statement {
        Renderer::new(SqlDialect::Postgres)
            .render(&SqlQuery::Select(plan.select.clone()), ctx)
            .unwrap()
    }

    // =========================================================================
    // Single Table Tests
    // =========================================================================

    #[test]
    fn test_pick_on_concrete_type() {
        let fixture = Fixture::new();
        let ctx = RecordContext::new();
        let plan = fixture
            .pick(
                &ctx,
                "PICK Order o IF o.total >= ? ORDERBY o.total DESC LIMIT 10",
                &[Argument::from(5)],
            )
            .unwrap();
        assert_eq!(plan.concrete.as_deref(), Some("Order"));

        let statement = render(&plan, &ctx);
        assert_eq!(
            statement.sql,
            "SELECT \"t\".\"ID\" AS \"ID\", \"t\".\"TOTAL\" AS \"TOTAL\", \"t\".\"CUSTOMER\" AS \"CUSTOMER\" \
             FROM \"ORDER\" \"t\" WHERE \"t\".\"TOTAL\" >= $1 ORDER BY \"t\".\"TOTAL\" DESC LIMIT 10"
        );
        assert_eq!(statement.params.len(), 1);
    }

    #[test]
    fn test_argument_on_left_is_mirrored() {
        let fixture = Fixture::new();
        let ctx = RecordContext::new();
        let plan = fixture
            .pick(&ctx, "PICK Order IF ? < total", &[Argument::from(5)])
            .unwrap();
        assert!(render(&plan, &ctx).sql.ends_with("WHERE \"t\".\"TOTAL\" > $1"));
    }

    #[test]
    fn test_id_path_and_range() {
        let fixture = Fixture::new();
        let ctx = RecordContext::new();
        let plan = fixture
            .pick(&ctx, "PICK Order IF id >< ?", &[Argument::range(1, 9)])
            .unwrap();
        let statement = render(&plan, &ctx);
        assert!(statement.sql.ends_with("WHERE \"t\".\"ID\" BETWEEN $1 AND $2"));
        assert_eq!(statement.params, vec![SqlValue::BigInt(1), SqlValue::BigInt(9)]);
    }

    #[test]
    fn test_record_argument_binds_reference_id() {
        let fixture = Fixture::new();
        let mut ctx = RecordContext::new();
        let customer = ctx.loaded("Customer", 42);
        let plan = fixture
            .pick(&ctx, "PICK Order IF customer = ?", &[Argument::from(customer)])
            .unwrap();
        let statement = render(&plan, &ctx);
        assert_eq!(statement.params, vec![SqlValue::BigInt(42)]);
    }

    #[test]
    fn test_prefix_without_declared_alias() {
        let fixture = Fixture::new();
        let ctx = RecordContext::new();
        let plan = fixture
            .pick(&ctx, "COUNT Order IF o.total=?", &[Argument::from(5)])
            .unwrap();
        assert!(render(&plan, &ctx).sql.ends_with("WHERE \"t\".\"TOTAL\" = $1"));
    }

    #[test]
    fn test_count_projection() {
        let fixture = Fixture::new();
        let ctx = RecordContext::new();
        let plan = fixture.pick(&ctx, "COUNT Order", &[]).unwrap();
        assert_eq!(
            render(&plan, &ctx).sql,
            "SELECT COUNT(*) AS \"COUNT\" FROM \"ORDER\" \"t\""
        );
    }

    // =========================================================================
    // Union Tests
    // =========================================================================

    #[test]
    fn test_pick_on_abstract_type_unions_concrete_tables() {
        let fixture = Fixture::new();
        let ctx = RecordContext::new();
        let plan = fixture
            .pick(&ctx, "PICK Party p IF p.name = ?", &[Argument::from("Ann")])
            .unwrap();
        assert_eq!(plan.concrete, None);

        let statement = render(&plan, &ctx);
        assert_eq!(
            statement.sql,
            "SELECT \"u\".\"ID\" AS \"ID\", \"u\".\"_TYPE\" AS \"_TYPE\", \"u\".\"NAME\" AS \"NAME\" FROM (\
             SELECT \"t\".\"ID\" AS \"ID\", 'Customer' AS \"_TYPE\", \"t\".\"NAME\" AS \"NAME\" FROM \"CUSTOMER\" \"t\" \
             UNION ALL \
             SELECT \"t\".\"ID\" AS \"ID\", 'Supplier' AS \"_TYPE\", \"t\".\"NAME\" AS \"NAME\" FROM \"SUPPLIER\" \"t\"\
             ) \"u\" WHERE \"u\".\"NAME\" = $1"
        );
    }

    #[test]
    fn test_materialize_union_rows() {
        let fixture = Fixture::new();
        let mut ctx = RecordContext::new();
        let plan = fixture.pick(&ctx, "PICK Party", &[]).unwrap();
        let rows = vec![
            SqlRow::new(
                vec!["ID".into(), "_TYPE".into(), "NAME".into()],
                vec![SqlValue::BigInt(1), SqlValue::Text("Supplier".into()), SqlValue::Text("Acme".into())],
            ),
            SqlRow::new(
                vec!["ID".into(), "_TYPE".into(), "NAME".into()],
                vec![SqlValue::BigInt(1), SqlValue::Text("Customer".into()), SqlValue::Null(SqlType::Varchar(None))],
            ),
        ];
        let handles = fixture
            .planner()
            .materialize(&mut ctx, &plan, &rows, true)
            .unwrap();
        assert_eq!(ctx.type_of(handles[0]), Some("Supplier"));
        assert_eq!(ctx.type_of(handles[1]), Some("Customer"));
        assert_eq!(
            ctx.value(handles[0], "name"),
            Some(&AttributeValue::String("Acme".into()))
        );
        assert_eq!(ctx.value(handles[1], "name"), Some(&AttributeValue::Null));
        assert!(!ctx.get(handles[0]).unwrap().is_dirty());
    }

    #[test]
    fn test_materialize_keeps_present_values_unless_overwriting() {
        let fixture = Fixture::new();
        let mut ctx = RecordContext::new();
        let order = ctx.loaded("Order", 3);
        ctx.set_attribute(order, "total", rust_decimal::Decimal::new(1999, 2))
            .unwrap();
        let plan = fixture.planner().by_id("Order", 3).unwrap();
        let rows = vec![SqlRow::new(
            vec!["ID".into(), "TOTAL".into(), "CUSTOMER".into()],
            vec![
                SqlValue::BigInt(3),
                SqlValue::Numeric(rust_decimal::Decimal::new(500, 2)),
                SqlValue::Null(SqlType::BigInt),
            ],
        )];
        fixture
            .planner()
            .materialize(&mut ctx, &plan, &rows, false)
            .unwrap();
        assert_eq!(
            ctx.value(order, "total"),
            Some(&AttributeValue::Decimal(rust_decimal::Decimal::new(1999, 2)))
        );
        assert_eq!(ctx.value(order, "customer"), Some(&AttributeValue::Null));
    }

    // =========================================================================
    // Error Tests
    // =========================================================================

    #[test]
    fn test_path_errors() {
        let fixture = Fixture::new();
        let ctx = RecordContext::new();
        for text in [
            "PICK Order IF missing = ?",
            "PICK Order IF lines = ?",
            "PICK Order IF customer.name = ?",
            "PICK Order o IF x.total = ?",
            "PICK Order IF a.b.total = ?",
        ] {
            let err = fixture.pick(&ctx, text, &[Argument::from(1)]).unwrap_err();
            assert!(err.is_query_parsing(), "{}: {:?}", text, err);
        }
        assert!(fixture.pick(&ctx, "PICK Nothing", &[]).is_err());
    }

    #[test]
    fn test_by_id_requires_concrete_type() {
        let fixture = Fixture::new();
        assert!(matches!(
            fixture.planner().by_id("Party", 1).unwrap_err(),
            EngineError::InvalidValue(_)
        ));
    }
}
