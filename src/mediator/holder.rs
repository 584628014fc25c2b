use tracing::trace;

use super::{AttributeMediator, MediatorEnv, column_mismatch, mismatch};
use crate::error::{EngineError, Result};
use crate::query::{
    BooleanStatement, ColumnRef, ComparisonOperator, Expression, Select, SelectExpr, SelectItem,
    SqlOperand, ValueProvider, equals,
};
use crate::record::{AttributeValue, RecordContext};
use crate::runner::SqlRow;
use crate::sql::{SqlType, SqlValue, to_sql_name};
use crate::table::{column_name, concrete_id_column, join_table_name};
use crate::types::{Attribute, AttributeKind, AttributeKindTag};

const JOIN_ALIAS: &str = "j";

/// To-one references stored as a BIGINT id
///
/// References declared against a holder with subtypes, or against a mixin,
/// live in the id space of that holder's join table. Binding such a reference
/// converts the record's own id with a sub-select on the join table, and
/// reading it selects one correlated column per concrete type so the concrete
/// type of the target is known.
#[derive(Debug, Clone, Copy, Default)]
pub struct HolderMediator;

impl HolderMediator {
    fn declared(attribute: &Attribute) -> Result<&str> {
        match &attribute.kind {
            AttributeKind::NamedAttributeHolder { holder, .. } => Ok(holder),
            _ => Err(EngineError::invariant(format!(
                "Attribute '{}' is not a to-one reference",
                attribute.name
            ))),
        }
    }

    /// Alias of the column carrying the id of concrete type `concrete`
    pub fn concrete_alias(attribute: &Attribute, concrete: &str) -> String {
        format!("{}__{}", column_name(&attribute.name), to_sql_name(concrete))
    }
}

impl AttributeMediator for HolderMediator {
    fn kind(&self) -> AttributeKindTag {
        AttributeKindTag::NamedAttributeHolder
    }

    fn column_type(&self, _env: &MediatorEnv<'_>, _attribute: &Attribute) -> Result<SqlType> {
        Ok(SqlType::BigInt)
    }

    fn validate_value(
        &self,
        _env: &MediatorEnv<'_>,
        attribute: &Attribute,
        value: &AttributeValue,
    ) -> Result<()> {
        match value {
            AttributeValue::Null | AttributeValue::Record(_) | AttributeValue::Id(_) => Ok(()),
            other => Err(mismatch(attribute, other)),
        }
    }

    fn bind_raw_value(
        &self,
        env: &MediatorEnv<'_>,
        attribute: &Attribute,
        value: &AttributeValue,
    ) -> Result<SqlValue> {
        self.validate_value(env, attribute, value)?;
        match value {
            AttributeValue::Id(id) => Ok(SqlValue::BigInt(*id)),
            AttributeValue::Record(_) => Err(EngineError::invariant(format!(
                "Record value of '{}' needs its record context to be bound",
                attribute.name
            ))),
            _ => Ok(SqlValue::Null(SqlType::BigInt)),
        }
    }

    fn bind_value(
        &self,
        env: &MediatorEnv<'_>,
        ctx: &RecordContext,
        attribute: &Attribute,
        value: &AttributeValue,
    ) -> Result<ValueProvider> {
        let AttributeValue::Record(handle) = value else {
            return Ok(ValueProvider::Value(self.bind_raw_value(env, attribute, value)?));
        };
        let declared = Self::declared(attribute)?;
        let concrete = ctx.require(*handle)?.type_name();
        if !env.schema.is_assignable(concrete, declared) {
            return Err(EngineError::invalid_value(format!(
                "Attribute '{}' expects a '{}' record, got '{}'",
                attribute.name, declared, concrete
            )));
        }
        // A record typed as an abstract holder or mixin can only come from a join-table id
        if concrete == declared
            && (!env.schema.requires_join_table(declared)
                || !env.schema.concrete_types_of(declared).iter().any(|c| c == declared))
        {
            return Ok(ValueProvider::ReferenceId(*handle));
        }

        trace!(attribute = %attribute.name, declared, concrete, "Converting reference id through join table");
        let lookup = Select::from_table(join_table_name(env.config, declared), JOIN_ALIAS)
            .with_item(SelectItem::column(
                JOIN_ALIAS,
                &env.config.id_column,
                SqlType::BigInt,
            ))
            .with_criteria(equals(
                ColumnRef::qualified(JOIN_ALIAS, concrete_id_column(concrete)),
                ValueProvider::ReferenceId(*handle),
            ));
        Ok(ValueProvider::SubSelect(Box::new(lookup)))
    }

    fn select_items(
        &self,
        env: &MediatorEnv<'_>,
        attribute: &Attribute,
        table_alias: &str,
    ) -> Result<Vec<SelectItem>> {
        let declared = Self::declared(attribute)?;
        let column = column_name(&attribute.name);
        let mut items = vec![SelectItem::column(table_alias, &column, SqlType::BigInt)];
        if env.schema.requires_join_table(declared) {
            for concrete in env.schema.concrete_types_of(declared) {
                let lookup = Select::from_table(join_table_name(env.config, declared), JOIN_ALIAS)
                    .with_item(SelectItem::column(
                        JOIN_ALIAS,
                        &concrete_id_column(&concrete),
                        SqlType::BigInt,
                    ))
                    .with_criteria(BooleanStatement::from_expression(Expression::new(
                        SqlOperand::Column(ColumnRef::qualified(
                            JOIN_ALIAS,
                            env.config.id_column.clone(),
                        )),
                        ComparisonOperator::Equal,
                        SqlOperand::Column(ColumnRef::qualified(table_alias, column.clone())),
                    )));
                items.push(SelectItem::new(
                    SelectExpr::SubSelect(Box::new(lookup)),
                    Self::concrete_alias(attribute, &concrete),
                    SqlType::BigInt,
                ));
            }
        }
        Ok(items)
    }

    fn extract_from_row(
        &self,
        env: &MediatorEnv<'_>,
        ctx: &mut RecordContext,
        row: &SqlRow,
        attribute: &Attribute,
    ) -> Result<AttributeValue> {
        let declared = Self::declared(attribute)?;
        let column = column_name(&attribute.name);
        let raw = match row.get(&column) {
            Some(SqlValue::Null(_)) => return Ok(AttributeValue::Null),
            Some(SqlValue::BigInt(id)) => *id,
            Some(other) => return Err(column_mismatch(attribute, other)),
            None => {
                return Err(EngineError::invariant(format!(
                    "Result row lacks column '{}'",
                    column
                )));
            }
        };
        if !env.schema.requires_join_table(declared) {
            return Ok(AttributeValue::Record(ctx.reference(declared, raw)));
        }
        for concrete in env.schema.concrete_types_of(declared) {
            if let Some(SqlValue::BigInt(id)) = row.get(&Self::concrete_alias(attribute, &concrete)) {
                return Ok(AttributeValue::Record(ctx.reference(&concrete, *id)));
            }
        }
        // Join row vanished; keep the raw id in the declared holder's id space
        Ok(AttributeValue::Id(raw))
    }
}
