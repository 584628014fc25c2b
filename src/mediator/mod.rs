//! Attribute mediators
//!
//! One strategy per attribute kind translates record attribute values to and
//! from SQL. Mediators are stateless apart from their collaborators (crypto
//! provider, JSON converter) and are shared through `Arc`.
//!
//! The [`MediatorRegistry`] is resolved once per engine for exactly the kinds
//! the schema uses; a kind without a mediator is a configuration error.

mod binary;
mod crypto;
mod holder;
mod inverse;
mod json;
mod simple;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

pub use binary::BinaryMediator;
pub use crypto::{CryptoMediator, CryptoProvider};
pub use holder::HolderMediator;
pub use inverse::InverseMediator;
pub use json::{DefaultJsonConverter, JsonMediator, RecordJsonConverter};
pub use simple::{BooleanMediator, DateMediator, DecimalMediator, StringMediator};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::query::{SelectItem, ValueProvider};
use crate::record::{AttributeValue, RecordContext, RecordHandle};
use crate::runner::SqlRow;
use crate::schema::Schema;
use crate::sql::{SqlType, SqlValue};
use crate::table::column_name;
use crate::types::{Attribute, AttributeKindTag};

/// Read-only context handed to mediators
#[derive(Debug, Clone, Copy)]
pub struct MediatorEnv<'a> {
    pub schema: &'a Schema,
    pub config: &'a EngineConfig,
}

/// Translation of one attribute kind between records and SQL
pub trait AttributeMediator: Send + Sync + fmt::Debug {
    fn kind(&self) -> AttributeKindTag;

    /// Whether the attribute is stored in a column of the type table
    fn requires_column_mapping(&self) -> bool {
        true
    }

    /// Storage type of the attribute's column
    fn column_type(&self, env: &MediatorEnv<'_>, attribute: &Attribute) -> Result<SqlType>;

    /// DDL type name of the attribute's column
    fn column_sql_type(&self, env: &MediatorEnv<'_>, attribute: &Attribute) -> Result<String> {
        Ok(self.column_type(env, attribute)?.sql_name(env.config.dialect))
    }

    fn is_attribute_present(
        &self,
        ctx: &RecordContext,
        handle: RecordHandle,
        attribute: &Attribute,
    ) -> bool {
        ctx.is_present(handle, &attribute.name)
    }

    /// Check that a value fits the attribute
    fn validate_value(
        &self,
        env: &MediatorEnv<'_>,
        attribute: &Attribute,
        value: &AttributeValue,
    ) -> Result<()>;

    /// Value of the attribute as handed out to callers, `Null` when absent
    fn attribute_value(
        &self,
        _env: &MediatorEnv<'_>,
        ctx: &RecordContext,
        handle: RecordHandle,
        attribute: &Attribute,
    ) -> Result<AttributeValue> {
        Ok(ctx
            .value(handle, &attribute.name)
            .cloned()
            .unwrap_or(AttributeValue::Null))
    }

    /// Column value of a value that does not depend on other records
    fn bind_raw_value(
        &self,
        env: &MediatorEnv<'_>,
        attribute: &Attribute,
        value: &AttributeValue,
    ) -> Result<SqlValue>;

    /// Parameter for a value, resolving record references through `ctx`
    fn bind_value(
        &self,
        env: &MediatorEnv<'_>,
        _ctx: &RecordContext,
        attribute: &Attribute,
        value: &AttributeValue,
    ) -> Result<ValueProvider> {
        Ok(ValueProvider::Value(self.bind_raw_value(env, attribute, value)?))
    }

    /// Parameter for the attribute's current value on a record
    fn create_value_provider(
        &self,
        env: &MediatorEnv<'_>,
        ctx: &RecordContext,
        handle: RecordHandle,
        attribute: &Attribute,
    ) -> Result<ValueProvider> {
        let value = ctx
            .value(handle, &attribute.name)
            .cloned()
            .unwrap_or(AttributeValue::Null);
        self.bind_value(env, ctx, attribute, &value)
    }

    /// Result columns needed to read the attribute from `table_alias`
    fn select_items(
        &self,
        env: &MediatorEnv<'_>,
        attribute: &Attribute,
        table_alias: &str,
    ) -> Result<Vec<SelectItem>> {
        Ok(vec![SelectItem::column(
            table_alias,
            &column_name(&attribute.name),
            self.column_type(env, attribute)?,
        )])
    }

    /// Read the attribute from a result row produced by [`Self::select_items`]
    fn extract_from_row(
        &self,
        env: &MediatorEnv<'_>,
        ctx: &mut RecordContext,
        row: &SqlRow,
        attribute: &Attribute,
    ) -> Result<AttributeValue>;
}

/// Fetch the attribute's column from a row
pub(crate) fn row_value<'r>(row: &'r SqlRow, attribute: &Attribute) -> Result<&'r SqlValue> {
    let column = column_name(&attribute.name);
    row.get(&column).ok_or_else(|| {
        EngineError::invariant(format!(
            "Result row lacks column '{}' for attribute '{}'",
            column, attribute.name
        ))
    })
}

pub(crate) fn mismatch(attribute: &Attribute, value: &AttributeValue) -> EngineError {
    EngineError::invalid_value(format!(
        "Attribute '{}' does not accept a {} value",
        attribute.name,
        value.type_name()
    ))
}

pub(crate) fn column_mismatch(attribute: &Attribute, value: &SqlValue) -> EngineError {
    EngineError::invariant(format!(
        "Unexpected column value {:?} for attribute '{}'",
        value, attribute.name
    ))
}

/// Creates the mediator of an attribute kind
pub trait AttributeMediatorFactory: Send + Sync {
    fn create(&self, kind: AttributeKindTag) -> Option<Arc<dyn AttributeMediator>>;
}

/// Factory providing the built-in mediators
///
/// Crypto attributes need a [`CryptoProvider`]; without one the factory has no
/// crypto mediator and schemas using crypto attributes are rejected.
#[derive(Debug, Clone)]
pub struct DefaultMediatorFactory {
    crypto: Option<Arc<dyn CryptoProvider>>,
    json: Arc<dyn RecordJsonConverter>,
}

impl Default for DefaultMediatorFactory {
    fn default() -> Self {
        Self {
            crypto: None,
            json: Arc::new(DefaultJsonConverter),
        }
    }
}

impl DefaultMediatorFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_crypto_provider(mut self, provider: Arc<dyn CryptoProvider>) -> Self {
        self.crypto = Some(provider);
        self
    }

    pub fn with_json_converter(mut self, converter: Arc<dyn RecordJsonConverter>) -> Self {
        self.json = converter;
        self
    }
}

impl AttributeMediatorFactory for DefaultMediatorFactory {
    fn create(&self, kind: AttributeKindTag) -> Option<Arc<dyn AttributeMediator>> {
        let mediator: Arc<dyn AttributeMediator> = match kind {
            AttributeKindTag::String => Arc::new(StringMediator),
            AttributeKindTag::Decimal => Arc::new(DecimalMediator),
            AttributeKindTag::Boolean => Arc::new(BooleanMediator),
            AttributeKindTag::Date => Arc::new(DateMediator),
            AttributeKindTag::Binary => Arc::new(BinaryMediator),
            AttributeKindTag::Crypto => Arc::new(CryptoMediator::new(self.crypto.clone()?)),
            AttributeKindTag::Json => Arc::new(JsonMediator::new(self.json.clone())),
            AttributeKindTag::NamedAttributeHolder => Arc::new(HolderMediator),
            AttributeKindTag::Inverse => Arc::new(InverseMediator),
        };
        Some(mediator)
    }
}

/// Mediators for every attribute kind used by a schema
#[derive(Debug, Clone)]
pub struct MediatorRegistry {
    mediators: BTreeMap<AttributeKindTag, Arc<dyn AttributeMediator>>,
}

impl MediatorRegistry {
    pub fn build(schema: &Schema, factory: &dyn AttributeMediatorFactory) -> Result<Self> {
        let mut mediators = BTreeMap::new();
        for holder in schema.holders() {
            for attribute in &holder.attributes {
                let kind = attribute.tag();
                if mediators.contains_key(&kind) {
                    continue;
                }
                let mediator = factory.create(kind).ok_or_else(|| {
                    EngineError::configuration(format!(
                        "No mediator available for {:?} attribute '{}.{}'",
                        kind, holder.name, attribute.name
                    ))
                })?;
                if mediator.kind() != kind {
                    return Err(EngineError::configuration(format!(
                        "Factory returned a {:?} mediator for {:?} attributes",
                        mediator.kind(),
                        kind
                    )));
                }
                mediators.insert(kind, mediator);
            }
        }
        debug!(kinds = ?mediators.keys().collect::<Vec<_>>(), "Resolved attribute mediators");
        Ok(Self { mediators })
    }

    pub fn get(&self, kind: AttributeKindTag) -> Result<&dyn AttributeMediator> {
        self.mediators
            .get(&kind)
            .map(|m| m.as_ref())
            .ok_or_else(|| EngineError::configuration(format!("No mediator for {:?}", kind)))
    }

    pub fn for_attribute(&self, attribute: &Attribute) -> Result<&dyn AttributeMediator> {
        self.get(attribute.tag())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaDefinition;
    use crate::types::NamedAttributeHolder;

    fn schema_with(attribute: Attribute) -> Schema {
        SchemaDefinition::new("s")
            .with_holder(NamedAttributeHolder::new_type("Item").with_attribute(attribute))
            .build()
            .unwrap()
    }

    #[test]
    fn test_registry_resolves_used_kinds_only() {
        let schema = schema_with(Attribute::string("name"));
        let registry = MediatorRegistry::build(&schema, &DefaultMediatorFactory::new()).unwrap();
        assert!(registry.get(AttributeKindTag::String).is_ok());
        assert!(registry.get(AttributeKindTag::Boolean).is_err());
    }

    #[test]
    fn test_crypto_without_provider_is_configuration_error() {
        let schema = schema_with(Attribute::crypto("secret"));
        let err = MediatorRegistry::build(&schema, &DefaultMediatorFactory::new()).unwrap_err();
        assert!(matches!(err, EngineError::Configuration(_)));
    }

    #[derive(Debug)]
    struct Lying;

    impl AttributeMediatorFactory for Lying {
        fn create(&self, _kind: AttributeKindTag) -> Option<Arc<dyn AttributeMediator>> {
            Some(Arc::new(BooleanMediator))
        }
    }

    #[test]
    fn test_factory_kind_mismatch_rejected() {
        let schema = schema_with(Attribute::string("name"));
        assert!(MediatorRegistry::build(&schema, &Lying).is_err());
    }
}
