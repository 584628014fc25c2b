//! Mediators for attributes stored 1:1 in a scalar column

use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};

use super::{AttributeMediator, MediatorEnv, column_mismatch, mismatch, row_value};
use crate::error::{EngineError, Result};
use crate::record::{AttributeValue, RecordContext};
use crate::runner::SqlRow;
use crate::sql::{SqlType, SqlValue};
use crate::types::{Attribute, AttributeKind, AttributeKindTag};

// ============================================================================
// String
// ============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct StringMediator;

impl StringMediator {
    fn max_length(attribute: &Attribute) -> Option<u32> {
        match attribute.kind {
            AttributeKind::String { length } => length,
            _ => None,
        }
    }
}

impl AttributeMediator for StringMediator {
    fn kind(&self) -> AttributeKindTag {
        AttributeKindTag::String
    }

    fn column_type(&self, _env: &MediatorEnv<'_>, attribute: &Attribute) -> Result<SqlType> {
        Ok(SqlType::Varchar(Self::max_length(attribute)))
    }

    fn validate_value(
        &self,
        _env: &MediatorEnv<'_>,
        attribute: &Attribute,
        value: &AttributeValue,
    ) -> Result<()> {
        match value {
            AttributeValue::Null => Ok(()),
            AttributeValue::String(s) => match Self::max_length(attribute) {
                Some(max) if s.chars().count() > max as usize => {
                    Err(EngineError::invalid_value(format!(
                        "Value of '{}' exceeds {} characters",
                        attribute.name, max
                    )))
                }
                _ => Ok(()),
            },
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
        Ok(match value {
            AttributeValue::String(s) => SqlValue::Text(s.clone()),
            _ => SqlValue::Null(self.column_type(env, attribute)?),
        })
    }

    fn extract_from_row(
        &self,
        _env: &MediatorEnv<'_>,
        _ctx: &mut RecordContext,
        row: &SqlRow,
        attribute: &Attribute,
    ) -> Result<AttributeValue> {
        match row_value(row, attribute)? {
            SqlValue::Null(_) => Ok(AttributeValue::Null),
            SqlValue::Text(s) => Ok(AttributeValue::String(s.clone())),
            other => Err(column_mismatch(attribute, other)),
        }
    }
}

// ============================================================================
// Decimal
// ============================================================================

/// Numeric attributes
///
/// Without a length the value is stored as BIGINT when it has no decimal
/// places and as DOUBLE PRECISION otherwise. With a length it is stored as
/// NUMERIC(length, decimal places) and read back with exactly that scale.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecimalMediator;

impl DecimalMediator {
    pub fn storage_type(attribute: &Attribute) -> Result<SqlType> {
        match attribute.kind {
            AttributeKind::Decimal {
                length,
                decimal_places,
            } => Ok(match (length, decimal_places.unwrap_or(0)) {
                (None, 0) => SqlType::BigInt,
                (None, _) => SqlType::Double,
                (Some(precision), scale) => SqlType::Numeric { precision, scale },
            }),
            _ => Err(EngineError::invariant(format!(
                "Attribute '{}' is not a decimal attribute",
                attribute.name
            ))),
        }
    }
}

impl AttributeMediator for DecimalMediator {
    fn kind(&self) -> AttributeKindTag {
        AttributeKindTag::Decimal
    }

    fn column_type(&self, _env: &MediatorEnv<'_>, attribute: &Attribute) -> Result<SqlType> {
        Self::storage_type(attribute)
    }

    fn validate_value(
        &self,
        _env: &MediatorEnv<'_>,
        attribute: &Attribute,
        value: &AttributeValue,
    ) -> Result<()> {
        match (value, Self::storage_type(attribute)?) {
            (AttributeValue::Null, _) => Ok(()),
            (AttributeValue::Decimal(d), SqlType::BigInt) if !d.fract().is_zero() => {
                Err(EngineError::invalid_value(format!(
                    "Attribute '{}' only stores integral values, got {}",
                    attribute.name, d
                )))
            }
            (AttributeValue::Decimal(_), _) => Ok(()),
            (other, _) => Err(mismatch(attribute, other)),
        }
    }

    fn bind_raw_value(
        &self,
        env: &MediatorEnv<'_>,
        attribute: &Attribute,
        value: &AttributeValue,
    ) -> Result<SqlValue> {
        self.validate_value(env, attribute, value)?;
        let storage = Self::storage_type(attribute)?;
        let AttributeValue::Decimal(d) = value else {
            return Ok(SqlValue::Null(storage));
        };
        let out_of_range = || {
            EngineError::invalid_value(format!(
                "Value {} of '{}' is out of range",
                d, attribute.name
            ))
        };
        Ok(match storage {
            SqlType::BigInt => SqlValue::BigInt(d.to_i64().ok_or_else(out_of_range)?),
            SqlType::Double => SqlValue::Double(d.to_f64().ok_or_else(out_of_range)?),
            SqlType::Numeric { scale, .. } => {
                let mut scaled = d.round_dp(scale as u32);
                scaled.rescale(scale as u32);
                SqlValue::Numeric(scaled)
            }
            other => {
                return Err(EngineError::invariant(format!(
                    "Unexpected decimal storage {:?}",
                    other
                )));
            }
        })
    }

    fn extract_from_row(
        &self,
        _env: &MediatorEnv<'_>,
        _ctx: &mut RecordContext,
        row: &SqlRow,
        attribute: &Attribute,
    ) -> Result<AttributeValue> {
        let storage = Self::storage_type(attribute)?;
        match (row_value(row, attribute)?, storage) {
            (SqlValue::Null(_), _) => Ok(AttributeValue::Null),
            (SqlValue::BigInt(i), _) => Ok(AttributeValue::Decimal(Decimal::from(*i))),
            (SqlValue::Double(f), _) => Decimal::from_f64(*f)
                .map(AttributeValue::Decimal)
                .ok_or_else(|| column_mismatch(attribute, &SqlValue::Double(*f))),
            (SqlValue::Numeric(d), SqlType::Numeric { scale, .. }) => {
                let mut scaled = *d;
                scaled.rescale(scale as u32);
                Ok(AttributeValue::Decimal(scaled))
            }
            (SqlValue::Numeric(d), _) => Ok(AttributeValue::Decimal(*d)),
            (other, _) => Err(column_mismatch(attribute, other)),
        }
    }
}

// ============================================================================
// Boolean
// ============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct BooleanMediator;

impl AttributeMediator for BooleanMediator {
    fn kind(&self) -> AttributeKindTag {
        AttributeKindTag::Boolean
    }

    fn column_type(&self, _env: &MediatorEnv<'_>, _attribute: &Attribute) -> Result<SqlType> {
        Ok(SqlType::Boolean)
    }

    fn validate_value(
        &self,
        _env: &MediatorEnv<'_>,
        attribute: &Attribute,
        value: &AttributeValue,
    ) -> Result<()> {
        match value {
            AttributeValue::Null | AttributeValue::Boolean(_) => Ok(()),
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
        Ok(match value {
            AttributeValue::Boolean(b) => SqlValue::Boolean(*b),
            _ => SqlValue::Null(SqlType::Boolean),
        })
    }

    fn extract_from_row(
        &self,
        _env: &MediatorEnv<'_>,
        _ctx: &mut RecordContext,
        row: &SqlRow,
        attribute: &Attribute,
    ) -> Result<AttributeValue> {
        match row_value(row, attribute)? {
            SqlValue::Null(_) => Ok(AttributeValue::Null),
            SqlValue::Boolean(b) => Ok(AttributeValue::Boolean(*b)),
            other => Err(column_mismatch(attribute, other)),
        }
    }
}

// ============================================================================
// Date
// ============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct DateMediator;

impl AttributeMediator for DateMediator {
    fn kind(&self) -> AttributeKindTag {
        AttributeKindTag::Date
    }

    fn column_type(&self, _env: &MediatorEnv<'_>, _attribute: &Attribute) -> Result<SqlType> {
        Ok(SqlType::Timestamp)
    }

    fn validate_value(
        &self,
        _env: &MediatorEnv<'_>,
        attribute: &Attribute,
        value: &AttributeValue,
    ) -> Result<()> {
        match value {
            AttributeValue::Null | AttributeValue::Date(_) => Ok(()),
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
        Ok(match value {
            AttributeValue::Date(d) => SqlValue::Timestamp(*d),
            _ => SqlValue::Null(SqlType::Timestamp),
        })
    }

    fn extract_from_row(
        &self,
        _env: &MediatorEnv<'_>,
        _ctx: &mut RecordContext,
        row: &SqlRow,
        attribute: &Attribute,
    ) -> Result<AttributeValue> {
        match row_value(row, attribute)? {
            SqlValue::Null(_) => Ok(AttributeValue::Null),
            SqlValue::Timestamp(d) => Ok(AttributeValue::Date(*d)),
            other => Err(column_mismatch(attribute, other)),
        }
    }
}
