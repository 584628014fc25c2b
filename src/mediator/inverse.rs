use super::{AttributeMediator, MediatorEnv, mismatch};
use crate::error::{EngineError, Result};
use crate::query::SelectItem;
use crate::record::{AttributeValue, RecordContext};
use crate::runner::SqlRow;
use crate::sql::{SqlType, SqlValue};
use crate::types::{Attribute, AttributeKindTag};

/// To-many relations computed from the children's reference column
///
/// Nothing is stored on the owning record; column operations are errors.
#[derive(Debug, Clone, Copy, Default)]
pub struct InverseMediator;

fn not_column_backed(attribute: &Attribute) -> EngineError {
    EngineError::invariant(format!(
        "Inverse attribute '{}' is not column-backed",
        attribute.name
    ))
}

impl AttributeMediator for InverseMediator {
    fn kind(&self) -> AttributeKindTag {
        AttributeKindTag::Inverse
    }

    fn requires_column_mapping(&self) -> bool {
        false
    }

    fn column_type(&self, _env: &MediatorEnv<'_>, attribute: &Attribute) -> Result<SqlType> {
        Err(not_column_backed(attribute))
    }

    fn validate_value(
        &self,
        _env: &MediatorEnv<'_>,
        attribute: &Attribute,
        value: &AttributeValue,
    ) -> Result<()> {
        match value {
            AttributeValue::Null | AttributeValue::RecordList(_) => Ok(()),
            other => Err(mismatch(attribute, other)),
        }
    }

    fn bind_raw_value(
        &self,
        _env: &MediatorEnv<'_>,
        attribute: &Attribute,
        _value: &AttributeValue,
    ) -> Result<SqlValue> {
        Err(not_column_backed(attribute))
    }

    fn select_items(
        &self,
        _env: &MediatorEnv<'_>,
        attribute: &Attribute,
        _table_alias: &str,
    ) -> Result<Vec<SelectItem>> {
        Err(not_column_backed(attribute))
    }

    fn extract_from_row(
        &self,
        _env: &MediatorEnv<'_>,
        _ctx: &mut RecordContext,
        _row: &SqlRow,
        attribute: &Attribute,
    ) -> Result<AttributeValue> {
        Err(not_column_backed(attribute))
    }
}
