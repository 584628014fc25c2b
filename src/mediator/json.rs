use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::{Map, Value};

use super::{AttributeMediator, MediatorEnv, column_mismatch, mismatch, row_value};
use crate::error::{EngineError, Result};
use crate::query::ValueProvider;
use crate::record::{AttributeValue, RecordContext, RecordHandle, RecordList};
use crate::runner::SqlRow;
use crate::schema::Schema;
use crate::sql::{SqlType, SqlValue};
use crate::types::{Attribute, AttributeKind, AttributeKindTag};

const TYPE_KEY: &str = "_type";
const ID_KEY: &str = "_id";

/// Converts records to and from JSON documents
pub trait RecordJsonConverter: Send + Sync + fmt::Debug {
    fn to_json(&self, schema: &Schema, ctx: &RecordContext, handle: RecordHandle) -> Result<Value>;

    /// Materialize a document as a record of `holder` (or one of its subtypes)
    fn from_json(
        &self,
        schema: &Schema,
        ctx: &mut RecordContext,
        holder: &str,
        json: &Value,
    ) -> Result<RecordHandle>;
}

/// Converter writing `{"_type": .., "_id": .., <attribute>: ..}` objects
///
/// Records already being written further up the graph are emitted as
/// `_type`/`_id` stubs, so cyclic graphs terminate.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultJsonConverter;

impl DefaultJsonConverter {
    fn write(
        &self,
        ctx: &RecordContext,
        handle: RecordHandle,
        path: &mut Vec<RecordHandle>,
    ) -> Result<Value> {
        let record = ctx.require(handle)?;
        let mut object = Map::new();
        object.insert(TYPE_KEY.to_string(), Value::String(record.type_name().to_string()));
        if let Some(id) = record.id() {
            object.insert(ID_KEY.to_string(), Value::from(id));
        }
        if path.contains(&handle) {
            return Ok(Value::Object(object));
        }
        path.push(handle);
        for (name, value) in record.values() {
            let json = match value {
                AttributeValue::Null => Value::Null,
                AttributeValue::String(s) => Value::String(s.clone()),
                AttributeValue::Decimal(d) => Value::String(d.to_string()),
                AttributeValue::Boolean(b) => Value::Bool(*b),
                AttributeValue::Date(d) => Value::String(d.to_rfc3339()),
                AttributeValue::Binary(b) => Value::String(STANDARD.encode(b)),
                AttributeValue::Stream(s) => Value::String(STANDARD.encode(s.to_vec())),
                AttributeValue::Json(v) => v.clone(),
                AttributeValue::Record(h) => self.write(ctx, *h, path)?,
                AttributeValue::Id(id) => Value::from(*id),
                AttributeValue::RecordList(list) => Value::Array(
                    list.iter()
                        .map(|h| self.write(ctx, h, path))
                        .collect::<Result<Vec<_>>>()?,
                ),
            };
            object.insert(name.to_string(), json);
        }
        path.pop();
        Ok(Value::Object(object))
    }

    fn read_value(
        &self,
        schema: &Schema,
        ctx: &mut RecordContext,
        attribute: &Attribute,
        json: &Value,
    ) -> Result<AttributeValue> {
        if json.is_null() {
            return Ok(AttributeValue::Null);
        }
        let invalid = || {
            EngineError::invalid_value(format!(
                "JSON value {} does not fit attribute '{}'",
                json, attribute.name
            ))
        };
        Ok(match &attribute.kind {
            AttributeKind::String { .. } => {
                AttributeValue::String(json.as_str().ok_or_else(invalid)?.to_string())
            }
            AttributeKind::Decimal { .. } => {
                let text = match json {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    _ => return Err(invalid()),
                };
                AttributeValue::Decimal(Decimal::from_str(&text).map_err(|_| invalid())?)
            }
            AttributeKind::Boolean => AttributeValue::Boolean(json.as_bool().ok_or_else(invalid)?),
            AttributeKind::Date => {
                let text = json.as_str().ok_or_else(invalid)?;
                let parsed = DateTime::parse_from_rfc3339(text).map_err(|_| invalid())?;
                AttributeValue::Date(parsed.with_timezone(&Utc))
            }
            AttributeKind::Binary | AttributeKind::Crypto { .. } => {
                let text = json.as_str().ok_or_else(invalid)?;
                AttributeValue::Binary(STANDARD.decode(text).map_err(|_| invalid())?)
            }
            AttributeKind::Json { holder: Some(holder) } => {
                AttributeValue::Record(self.from_json(schema, ctx, holder, json)?)
            }
            AttributeKind::Json { holder: None } => AttributeValue::Json(json.clone()),
            AttributeKind::NamedAttributeHolder { holder, .. } => match json {
                Value::Number(n) => AttributeValue::Id(n.as_i64().ok_or_else(invalid)?),
                _ => AttributeValue::Record(self.from_json(schema, ctx, holder, json)?),
            },
            AttributeKind::Inverse { holder, .. } => {
                let items = json.as_array().ok_or_else(invalid)?;
                let mut list = RecordList::new();
                for item in items {
                    list.push(self.from_json(schema, ctx, holder, item)?);
                }
                AttributeValue::RecordList(list)
            }
        })
    }
}

impl RecordJsonConverter for DefaultJsonConverter {
    fn to_json(&self, _schema: &Schema, ctx: &RecordContext, handle: RecordHandle) -> Result<Value> {
        self.write(ctx, handle, &mut Vec::new())
    }

    fn from_json(
        &self,
        schema: &Schema,
        ctx: &mut RecordContext,
        holder: &str,
        json: &Value,
    ) -> Result<RecordHandle> {
        let object = json.as_object().ok_or_else(|| {
            EngineError::invalid_value(format!("Expected a JSON object for '{}'", holder))
        })?;
        let type_name = object
            .get(TYPE_KEY)
            .and_then(Value::as_str)
            .unwrap_or(holder)
            .to_string();
        if !schema.is_assignable(&type_name, holder) {
            return Err(EngineError::invalid_value(format!(
                "JSON document of type '{}' cannot be read as '{}'",
                type_name, holder
            )));
        }
        let id = object.get(ID_KEY).and_then(Value::as_i64);
        let handle = match id.and_then(|id| ctx.find(&type_name, id)) {
            Some(existing) => existing,
            None => {
                let created = ctx.create(type_name.clone());
                if let Some(id) = id {
                    ctx.assign_id(created, id)?;
                }
                created
            }
        };
        for (key, value) in object {
            if key.starts_with('_') {
                continue;
            }
            let attribute = schema.require_attribute(&type_name, key)?.clone();
            let value = self.read_value(schema, ctx, &attribute, value)?;
            ctx.set_loaded_attribute(handle, key, value)?;
        }
        ctx.mark_clean(handle);
        Ok(handle)
    }
}

/// JSON documents stored as UTF-8 bytes in a BLOB column
///
/// Attributes declaring a holder carry a record; the others carry a free JSON
/// value.
#[derive(Debug, Clone)]
pub struct JsonMediator {
    converter: Arc<dyn RecordJsonConverter>,
}

impl JsonMediator {
    pub fn new(converter: Arc<dyn RecordJsonConverter>) -> Self {
        Self { converter }
    }

    fn holder(attribute: &Attribute) -> Option<&str> {
        match &attribute.kind {
            AttributeKind::Json { holder } => holder.as_deref(),
            _ => None,
        }
    }
}

impl AttributeMediator for JsonMediator {
    fn kind(&self) -> AttributeKindTag {
        AttributeKindTag::Json
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
        match (value, Self::holder(attribute)) {
            (AttributeValue::Null, _) => Ok(()),
            (AttributeValue::Record(_), Some(_)) => Ok(()),
            (AttributeValue::Json(_), None) => Ok(()),
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
        match value {
            AttributeValue::Json(v) => Ok(SqlValue::Bytes(serde_json::to_vec(v)?)),
            AttributeValue::Record(_) => Err(EngineError::invariant(format!(
                "Record value of '{}' needs its record context to be bound",
                attribute.name
            ))),
            _ => Ok(SqlValue::Null(SqlType::Blob)),
        }
    }

    fn bind_value(
        &self,
        env: &MediatorEnv<'_>,
        ctx: &RecordContext,
        attribute: &Attribute,
        value: &AttributeValue,
    ) -> Result<ValueProvider> {
        if let AttributeValue::Record(handle) = value {
            self.validate_value(env, attribute, value)?;
            let json = self.converter.to_json(env.schema, ctx, *handle)?;
            return Ok(ValueProvider::Value(SqlValue::Bytes(serde_json::to_vec(&json)?)));
        }
        Ok(ValueProvider::Value(self.bind_raw_value(env, attribute, value)?))
    }

    fn extract_from_row(
        &self,
        env: &MediatorEnv<'_>,
        ctx: &mut RecordContext,
        row: &SqlRow,
        attribute: &Attribute,
    ) -> Result<AttributeValue> {
        let bytes = match row_value(row, attribute)? {
            SqlValue::Null(_) => return Ok(AttributeValue::Null),
            SqlValue::Bytes(b) => b.clone(),
            SqlValue::Stream(s) => s.to_vec(),
            other => return Err(column_mismatch(attribute, other)),
        };
        let json: Value = serde_json::from_slice(&bytes)?;
        match Self::holder(attribute) {
            Some(holder) => Ok(AttributeValue::Record(
                self.converter.from_json(env.schema, ctx, holder, &json)?,
            )),
            None => Ok(AttributeValue::Json(json)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaDefinition;
    use crate::types::NamedAttributeHolder;
    use serde_json::json;

    fn schema() -> Schema {
        SchemaDefinition::new("s")
            .with_holder(
                NamedAttributeHolder::new_type("Address")
                    .with_attribute(Attribute::string("street"))
                    .with_attribute(Attribute::decimal("zip", None, None))
                    .with_attribute(Attribute::reference("resident", "Person")),
            )
            .with_holder(
                NamedAttributeHolder::new_type("Person")
                    .with_attribute(Attribute::string("name"))
                    .with_attribute(Attribute::json("home", Some("Address"))),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_cyclic_graph_writes_stub() {
        let schema = schema();
        let mut ctx = RecordContext::new();
        let person = ctx.create("Person");
        let address = ctx.create("Address");
        ctx.assign_id(person, 4).unwrap();
        ctx.set_attribute(person, "name", "Ann").unwrap();
        ctx.set_attribute(person, "home", address).unwrap();
        ctx.set_attribute(address, "street", "Main").unwrap();
        ctx.set_attribute(address, "resident", person).unwrap();

        let json = DefaultJsonConverter.to_json(&schema, &ctx, person).unwrap();
        assert_eq!(
            json,
            json!({
                "_type": "Person",
                "_id": 4,
                "name": "Ann",
                "home": {
                    "_type": "Address",
                    "street": "Main",
                    "resident": {"_type": "Person", "_id": 4}
                }
            })
        );
    }

    #[test]
    fn test_from_json_reuses_identity() {
        let schema = schema();
        let mut ctx = RecordContext::new();
        let doc = json!({
            "_type": "Address",
            "street": "Elm",
            "zip": "12345",
            "resident": {"_type": "Person", "_id": 8, "name": "Bo"}
        });
        let address = DefaultJsonConverter
            .from_json(&schema, &mut ctx, "Address", &doc)
            .unwrap();
        assert_eq!(ctx.value(address, "street"), Some(&AttributeValue::String("Elm".into())));
        assert_eq!(
            ctx.value(address, "zip"),
            Some(&AttributeValue::Decimal(Decimal::from(12345)))
        );
        let resident = ctx.value(address, "resident").and_then(AttributeValue::as_record).unwrap();
        assert_eq!(ctx.find("Person", 8), Some(resident));
        assert!(!ctx.get(address).unwrap().is_dirty());
    }

    #[test]
    fn test_from_json_rejects_foreign_type() {
        let schema = schema();
        let mut ctx = RecordContext::new();
        let doc = json!({"_type": "Person"});
        assert!(DefaultJsonConverter
            .from_json(&schema, &mut ctx, "Address", &doc)
            .is_err());
    }

    #[test]
    fn test_free_json_round_trip() {
        let schema = schema();
        let config = crate::config::EngineConfig::default();
        let env = MediatorEnv {
            schema: &schema,
            config: &config,
        };
        let mediator = JsonMediator::new(Arc::new(DefaultJsonConverter));
        let attribute = Attribute::json("settings", None);
        let value = AttributeValue::Json(json!({"theme": "dark", "size": 3}));

        let bound = mediator.bind_raw_value(&env, &attribute, &value).unwrap();
        let row = SqlRow::new(vec!["SETTINGS".to_string()], vec![bound]);
        let mut ctx = RecordContext::new();
        let read = mediator
            .extract_from_row(&env, &mut ctx, &row, &attribute)
            .unwrap();
        assert_eq!(read, value);
    }
}
