use std::fmt;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use super::binary::BinaryMediator;
use super::{AttributeMediator, MediatorEnv, column_mismatch, mismatch, row_value};
use crate::error::{EngineError, Result};
use crate::record::{AttributeValue, RecordContext};
use crate::runner::SqlRow;
use crate::sql::{SqlType, SqlValue};
use crate::types::{Attribute, AttributeKind, AttributeKindTag};

/// Encryption primitives used for crypto attributes
pub trait CryptoProvider: Send + Sync + fmt::Debug {
    fn encrypt(&self, plain: &[u8]) -> Result<Vec<u8>>;
    fn decrypt(&self, cipher: &[u8]) -> Result<Vec<u8>>;
}

/// Encrypted binary content
///
/// - plain-string attributes take string values, encrypted as UTF-8
/// - attributes that are not auto-decrypted exchange the ciphertext itself,
///   base64 encoded, and never touch the provider
#[derive(Debug, Clone)]
pub struct CryptoMediator {
    provider: Arc<dyn CryptoProvider>,
}

#[derive(Clone, Copy)]
struct Mode {
    plain_string: bool,
    auto_decrypted: bool,
}

impl CryptoMediator {
    pub fn new(provider: Arc<dyn CryptoProvider>) -> Self {
        Self { provider }
    }

    fn mode(attribute: &Attribute) -> Result<Mode> {
        match attribute.kind {
            AttributeKind::Crypto {
                plain_string,
                auto_decrypted,
            } => Ok(Mode {
                plain_string,
                auto_decrypted,
            }),
            _ => Err(EngineError::invariant(format!(
                "Attribute '{}' is not a crypto attribute",
                attribute.name
            ))),
        }
    }
}

impl AttributeMediator for CryptoMediator {
    fn kind(&self) -> AttributeKindTag {
        AttributeKindTag::Crypto
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
        let mode = Self::mode(attribute)?;
        match value {
            AttributeValue::Null => Ok(()),
            AttributeValue::String(_) if mode.plain_string || !mode.auto_decrypted => Ok(()),
            AttributeValue::Binary(_) | AttributeValue::Stream(_)
                if !mode.plain_string && mode.auto_decrypted =>
            {
                Ok(())
            }
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
        let mode = Self::mode(attribute)?;
        let cipher = match value {
            AttributeValue::Null => return Ok(SqlValue::Null(SqlType::Blob)),
            AttributeValue::String(s) if !mode.auto_decrypted => STANDARD
                .decode(s)
                .map_err(|e| EngineError::crypto(format!("Invalid ciphertext for '{}': {}", attribute.name, e)))?,
            AttributeValue::String(s) => self.provider.encrypt(s.as_bytes())?,
            other => {
                let plain = other.to_bytes().ok_or_else(|| mismatch(attribute, other))?;
                self.provider.encrypt(&plain)?
            }
        };
        Ok(SqlValue::Bytes(cipher))
    }

    fn extract_from_row(
        &self,
        env: &MediatorEnv<'_>,
        _ctx: &mut RecordContext,
        row: &SqlRow,
        attribute: &Attribute,
    ) -> Result<AttributeValue> {
        let mode = Self::mode(attribute)?;
        let cipher = match row_value(row, attribute)? {
            SqlValue::Null(_) => return Ok(AttributeValue::Null),
            SqlValue::Bytes(b) => b.clone(),
            SqlValue::Stream(s) => s.to_vec(),
            other => return Err(column_mismatch(attribute, other)),
        };
        if !mode.auto_decrypted {
            return Ok(AttributeValue::String(STANDARD.encode(cipher)));
        }
        let plain = self.provider.decrypt(&cipher)?;
        if mode.plain_string {
            String::from_utf8(plain)
                .map(AttributeValue::String)
                .map_err(|e| EngineError::crypto(format!("Decrypted '{}' is not UTF-8: {}", attribute.name, e)))
        } else {
            Ok(BinaryMediator::represent(env, plain))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::schema::SchemaDefinition;

    /// XORs every byte, enough to tell ciphertext from plaintext
    #[derive(Debug)]
    struct XorProvider;

    impl CryptoProvider for XorProvider {
        fn encrypt(&self, plain: &[u8]) -> Result<Vec<u8>> {
            Ok(plain.iter().map(|b| b ^ 0x5a).collect())
        }

        fn decrypt(&self, cipher: &[u8]) -> Result<Vec<u8>> {
            self.encrypt(cipher)
        }
    }

    fn round_trip(attribute: &Attribute, value: AttributeValue) -> (SqlValue, AttributeValue) {
        let schema = SchemaDefinition::new("s").build().unwrap();
        let config = EngineConfig::default();
        let env = MediatorEnv {
            schema: &schema,
            config: &config,
        };
        let mediator = CryptoMediator::new(Arc::new(XorProvider));
        let bound = mediator.bind_raw_value(&env, attribute, &value).unwrap();
        let column = crate::table::column_name(&attribute.name);
        let row = SqlRow::new(vec![column], vec![bound.clone()]);
        let mut ctx = RecordContext::new();
        let read = mediator
            .extract_from_row(&env, &mut ctx, &row, attribute)
            .unwrap();
        (bound, read)
    }

    #[test]
    fn test_plain_string_round_trip() {
        let attribute = Attribute::crypto("pin").plain_string();
        let (bound, read) = round_trip(&attribute, "1234".into());
        assert_ne!(bound, SqlValue::Bytes(b"1234".to_vec()));
        assert_eq!(read, AttributeValue::String("1234".to_string()));
    }

    #[test]
    fn test_binary_round_trip() {
        let attribute = Attribute::crypto("blob");
        let (_, read) = round_trip(&attribute, AttributeValue::Binary(vec![1, 2, 3]));
        assert_eq!(read, AttributeValue::Binary(vec![1, 2, 3]));
    }

    #[test]
    fn test_not_auto_decrypted_exchanges_ciphertext() {
        let attribute = Attribute::crypto("token").not_auto_decrypted();
        let cipher = STANDARD.encode([9u8, 9, 9]);
        let (bound, read) = round_trip(&attribute, AttributeValue::String(cipher.clone()));
        assert_eq!(bound, SqlValue::Bytes(vec![9, 9, 9]));
        assert_eq!(read, AttributeValue::String(cipher));
    }

    #[test]
    fn test_plain_string_rejects_binary() {
        let schema = SchemaDefinition::new("s").build().unwrap();
        let config = EngineConfig::default();
        let env = MediatorEnv {
            schema: &schema,
            config: &config,
        };
        let mediator = CryptoMediator::new(Arc::new(XorProvider));
        let attribute = Attribute::crypto("pin").plain_string();
        assert!(mediator
            .validate_value(&env, &attribute, &AttributeValue::Binary(vec![1]))
            .is_err());
    }
}
