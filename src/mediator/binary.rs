use super::{AttributeMediator, MediatorEnv, column_mismatch, mismatch, row_value};
use crate::config::BinaryRepresentation;
use crate::error::Result;
use crate::record::{AttributeValue, BinaryStream, RecordContext, RecordHandle};
use crate::runner::SqlRow;
use crate::sql::{SqlType, SqlValue};
use crate::types::{Attribute, AttributeKindTag};

/// Binary content in a BLOB column
///
/// Values are handed out as byte vectors or as streams, depending on the
/// configured [`BinaryRepresentation`]. Either representation is accepted on
/// write.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryMediator;

impl BinaryMediator {
    pub(crate) fn represent(env: &MediatorEnv<'_>, bytes: Vec<u8>) -> AttributeValue {
        match env.config.binary_representation {
            BinaryRepresentation::ByteArray => AttributeValue::Binary(bytes),
            BinaryRepresentation::Stream => AttributeValue::Stream(BinaryStream::from(bytes)),
        }
    }
}

impl AttributeMediator for BinaryMediator {
    fn kind(&self) -> AttributeKindTag {
        AttributeKindTag::Binary
    }

    fn column_type(&self, _env: &MediatorEnv<'_>, _attribute: &Attribute) -> Result<SqlType> {
        Ok(SqlType::Blob)
    }

    fn validate_value(
        &self,
        _env: &MediatorEnv<'_>,
        attribute: &Attribute,
        value: &AttributeValue,
    ) -> Result<()> {
        match value {
            AttributeValue::Null | AttributeValue::Binary(_) | AttributeValue::Stream(_) => Ok(()),
            other => Err(mismatch(attribute, other)),
        }
    }

    fn attribute_value(
        &self,
        env: &MediatorEnv<'_>,
        ctx: &RecordContext,
        handle: RecordHandle,
        attribute: &Attribute,
    ) -> Result<AttributeValue> {
        Ok(match ctx.value(handle, &attribute.name) {
            Some(AttributeValue::Binary(b)) => Self::represent(env, b.clone()),
            Some(AttributeValue::Stream(s)) => Self::represent(env, s.to_vec()),
            Some(other) => other.clone(),
            None => AttributeValue::Null,
        })
    }

    fn bind_raw_value(
        &self,
        env: &MediatorEnv<'_>,
        attribute: &Attribute,
        value: &AttributeValue,
    ) -> Result<SqlValue> {
        self.validate_value(env, attribute, value)?;
        Ok(match value {
            AttributeValue::Binary(b) => SqlValue::Bytes(b.clone()),
            AttributeValue::Stream(s) => SqlValue::Stream(s.clone()),
            _ => SqlValue::Null(SqlType::Blob),
        })
    }

    fn extract_from_row(
        &self,
        env: &MediatorEnv<'_>,
        _ctx: &mut RecordContext,
        row: &SqlRow,
        attribute: &Attribute,
    ) -> Result<AttributeValue> {
        match row_value(row, attribute)? {
            SqlValue::Null(_) => Ok(AttributeValue::Null),
            SqlValue::Bytes(b) => Ok(Self::represent(env, b.clone())),
            SqlValue::Stream(s) => Ok(Self::represent(env, s.to_vec())),
            other => Err(column_mismatch(attribute, other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::schema::SchemaDefinition;

    #[test]
    fn test_representation_follows_config() {
        let schema = SchemaDefinition::new("s").build().unwrap();
        let config = EngineConfig::builder("").streaming_binaries().build();
        let env = MediatorEnv {
            schema: &schema,
            config: &config,
        };
        let attribute = Attribute::binary("data");
        let mut ctx = RecordContext::new();
        let row = SqlRow::new(vec!["DATA".to_string()], vec![SqlValue::Bytes(vec![7, 8])]);

        let value = BinaryMediator
            .extract_from_row(&env, &mut ctx, &row, &attribute)
            .unwrap();
        assert!(matches!(value, AttributeValue::Stream(ref s) if s.to_vec() == vec![7, 8]));

        let h = ctx.create("Blob");
        ctx.set_attribute(h, "data", vec![1u8, 2]).unwrap();
        let handed_out = BinaryMediator
            .attribute_value(&env, &ctx, h, &attribute)
            .unwrap();
        assert!(matches!(handed_out, AttributeValue::Stream(_)));
    }

    #[test]
    fn test_stream_binds_as_stream() {
        let schema = SchemaDefinition::new("s").build().unwrap();
        let config = EngineConfig::default();
        let env = MediatorEnv {
            schema: &schema,
            config: &config,
        };
        let stream = BinaryStream::from(vec![1u8]);
        let bound = BinaryMediator
            .bind_raw_value(&env, &Attribute::binary("data"), &AttributeValue::Stream(stream.clone()))
            .unwrap();
        assert_eq!(bound, SqlValue::Stream(stream));
    }
}
