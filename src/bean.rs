//! ActiveRecord façade
//!
//! [`SchemaBeanFactory`] resolves once, for every holder and attribute of the
//! schema, how the attribute is read and written. [`ActiveRecord`] wraps a
//! record handle and dispatches getters and setters through that table:
//! plain values pass through the attribute's mediator, references come back
//! as further `ActiveRecord`s and inverse lists as vectors of them.
//!
//! ```
//! use nquery_engine::bean::{BeanValue, SchemaBeanFactory};
//! use nquery_engine::record::RecordContext;
//! use nquery_engine::schema::SchemaDefinition;
//! use nquery_engine::types::{Attribute, NamedAttributeHolder};
//! use nquery_engine::{Engine, EngineConfig};
//!
//! let schema = SchemaDefinition::new("crm")
//!     .with_holder(NamedAttributeHolder::new_type("Person").with_attribute(Attribute::string("name")))
//!     .build()
//!     .unwrap();
//! let engine = Engine::new(schema, EngineConfig::default()).unwrap();
//! let beans = SchemaBeanFactory::new(&engine);
//!
//! let mut ctx = RecordContext::new();
//! let person = beans.create(&mut ctx, "Person").unwrap();
//! person.set(&mut ctx, "name", "Ada").unwrap();
//! assert_eq!(person.get(&mut ctx, "name").unwrap(), BeanValue::from("Ada"));
//! ```

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::debug;

use crate::engine::{Accessor, Engine};
use crate::error::{EngineError, Result};
use crate::record::{AttributeValue, RecordContext, RecordHandle, RecordList};
use crate::runner::QueryRunner;
use crate::types::{Attribute, AttributeKind};

/// How an attribute is accessed through a bean
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Value passed through the attribute's mediator
    Value,
    /// To-one reference, exposed as a bean
    Reference,
    /// Inverse list, exposed as beans
    Inverse,
}

/// Precomputed getter/setter of one attribute of one holder
#[derive(Debug, Clone)]
pub struct Invoker {
    attribute: Attribute,
    access: Access,
}

impl Invoker {
    fn new(attribute: &Attribute) -> Self {
        let access = match attribute.kind {
            AttributeKind::NamedAttributeHolder { .. } => Access::Reference,
            AttributeKind::Inverse { .. } => Access::Inverse,
            _ => Access::Value,
        };
        Self {
            attribute: attribute.clone(),
            access,
        }
    }

    pub fn attribute(&self) -> &Attribute {
        &self.attribute
    }

    pub fn access(&self) -> Access {
        self.access
    }

    /// Holder the related records must be assignable to
    fn related_holder(&self) -> Option<&str> {
        match &self.attribute.kind {
            AttributeKind::NamedAttributeHolder { holder, .. } => Some(holder),
            AttributeKind::Inverse { holder, .. } => Some(holder),
            _ => None,
        }
    }
}

/// Value read from or written to a bean
#[derive(Debug, Clone, PartialEq)]
pub enum BeanValue<'f> {
    Value(AttributeValue),
    Record(ActiveRecord<'f>),
    Records(Vec<ActiveRecord<'f>>),
}

impl BeanValue<'_> {
    pub fn is_null(&self) -> bool {
        matches!(self, BeanValue::Value(AttributeValue::Null))
    }

    pub fn as_value(&self) -> Option<&AttributeValue> {
        match self {
            BeanValue::Value(value) => Some(value),
            _ => None,
        }
    }
}

impl<'f> BeanValue<'f> {
    pub fn as_record(&self) -> Option<ActiveRecord<'f>> {
        match self {
            BeanValue::Record(record) => Some(*record),
            _ => None,
        }
    }

    pub fn as_records(&self) -> Option<&[ActiveRecord<'f>]> {
        match self {
            BeanValue::Records(records) => Some(records),
            _ => None,
        }
    }
}

impl<'f> From<ActiveRecord<'f>> for BeanValue<'f> {
    fn from(record: ActiveRecord<'f>) -> Self {
        BeanValue::Record(record)
    }
}

impl<'f> From<Vec<ActiveRecord<'f>>> for BeanValue<'f> {
    fn from(records: Vec<ActiveRecord<'f>>) -> Self {
        BeanValue::Records(records)
    }
}

impl From<AttributeValue> for BeanValue<'_> {
    fn from(value: AttributeValue) -> Self {
        BeanValue::Value(value)
    }
}

macro_rules! bean_value_from {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for BeanValue<'_> {
                fn from(value: $ty) -> Self {
                    BeanValue::Value(value.into())
                }
            }
        )*
    };
}

bean_value_from!(&str, String, i64, i32, Decimal, bool, DateTime<Utc>, Vec<u8>);

/// Builds beans over the records of one engine
pub struct SchemaBeanFactory<'e> {
    engine: &'e Engine,
    invokers: HashMap<(String, String), Invoker>,
}

impl<'e> SchemaBeanFactory<'e> {
    pub fn new(engine: &'e Engine) -> Self {
        let schema = engine.schema();
        let mut invokers = HashMap::new();
        for holder in schema.holders() {
            for attribute in schema.all_attributes(&holder.name) {
                invokers.insert(
                    (holder.name.clone(), attribute.name.clone()),
                    Invoker::new(attribute),
                );
            }
        }
        debug!(invokers = invokers.len(), "Bean invokers resolved");
        Self { engine, invokers }
    }

    pub fn engine(&self) -> &'e Engine {
        self.engine
    }

    pub fn invoker(&self, holder: &str, attribute: &str) -> Option<&Invoker> {
        self.invokers
            .get(&(holder.to_string(), attribute.to_string()))
    }

    fn require_invoker(&self, holder: &str, attribute: &str) -> Result<&Invoker> {
        self.invoker(holder, attribute).ok_or_else(|| {
            EngineError::schema(format!("Unknown attribute '{}' on '{}'", attribute, holder))
        })
    }

    /// New unsaved record of a concrete type
    pub fn create(&self, ctx: &mut RecordContext, type_name: &str) -> Result<ActiveRecord<'_>> {
        let holder = self.engine.schema().require_holder(type_name)?;
        if !holder.is_concrete() {
            return Err(EngineError::invalid_value(format!(
                "Cannot create a record of non-concrete '{}'",
                type_name
            )));
        }
        Ok(ActiveRecord {
            factory: self,
            handle: ctx.create(type_name),
        })
    }

    /// Bean over an existing record
    pub fn bean(&self, ctx: &RecordContext, handle: RecordHandle) -> Result<ActiveRecord<'_>> {
        let type_name = ctx.require(handle)?.type_name();
        self.engine.schema().require_holder(type_name)?;
        Ok(ActiveRecord {
            factory: self,
            handle,
        })
    }

    /// New record wrapped in a typed bean
    pub fn create_bean<'f, B: SchemaBean<'f>>(&'f self, ctx: &mut RecordContext) -> Result<B> {
        Ok(B::from_record(self.create(ctx, B::TYPE_NAME)?))
    }

    /// Typed bean over an existing record of `B::TYPE_NAME` or one of its subtypes
    pub fn typed<'f, B: SchemaBean<'f>>(&'f self, ctx: &RecordContext, handle: RecordHandle) -> Result<B> {
        let type_name = ctx.require(handle)?.type_name();
        if !self.engine.schema().is_assignable(type_name, B::TYPE_NAME) {
            return Err(EngineError::invalid_value(format!(
                "'{}' record is not a '{}'",
                type_name,
                B::TYPE_NAME
            )));
        }
        Ok(B::from_record(self.bean(ctx, handle)?))
    }
}

impl std::fmt::Debug for SchemaBeanFactory<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaBeanFactory")
            .field("invokers", &self.invokers.len())
            .finish()
    }
}

/// A typed façade over an [`ActiveRecord`]
///
/// ```
/// use nquery_engine::bean::{ActiveRecord, SchemaBean};
/// use nquery_engine::error::Result;
/// use nquery_engine::record::RecordContext;
///
/// struct Person<'f>(ActiveRecord<'f>);
///
/// impl<'f> SchemaBean<'f> for Person<'f> {
///     const TYPE_NAME: &'static str = "Person";
///
///     fn from_record(record: ActiveRecord<'f>) -> Self {
///         Person(record)
///     }
///
///     fn record(&self) -> ActiveRecord<'f> {
///         self.0
///     }
/// }
///
/// impl Person<'_> {
///     fn set_name(&self, ctx: &mut RecordContext, name: &str) -> Result<()> {
///         self.0.set(ctx, "name", name)
///     }
/// }
/// ```
pub trait SchemaBean<'f>: Sized {
    const TYPE_NAME: &'static str;

    fn from_record(record: ActiveRecord<'f>) -> Self;

    fn record(&self) -> ActiveRecord<'f>;
}

/// A record handle with schema-aware accessors
#[derive(Clone, Copy)]
pub struct ActiveRecord<'f> {
    factory: &'f SchemaBeanFactory<'f>,
    handle: RecordHandle,
}

impl PartialEq for ActiveRecord<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.factory, other.factory) && self.handle == other.handle
    }
}

impl std::fmt::Debug for ActiveRecord<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ActiveRecord").field(&self.handle).finish()
    }
}

impl<'f> ActiveRecord<'f> {
    pub fn handle(&self) -> RecordHandle {
        self.handle
    }

    pub fn type_name<'c>(&self, ctx: &'c RecordContext) -> Result<&'c str> {
        Ok(ctx.require(self.handle)?.type_name())
    }

    pub fn id(&self, ctx: &RecordContext) -> Option<i64> {
        ctx.id_of(self.handle)
    }

    fn invoker(&self, ctx: &RecordContext, attribute: &str) -> Result<&'f Invoker> {
        let type_name = ctx.require(self.handle)?.type_name();
        self.factory.require_invoker(type_name, attribute)
    }

    fn wrap(&self, handle: RecordHandle) -> ActiveRecord<'f> {
        ActiveRecord {
            factory: self.factory,
            handle,
        }
    }

    pub fn is_present(&self, ctx: &RecordContext, attribute: &str) -> bool {
        ctx.is_present(self.handle, attribute)
    }

    /// Current value of an attribute
    ///
    /// Absent values read as `Null`, absent inverse lists as an empty list.
    pub fn get(&self, ctx: &mut RecordContext, attribute: &str) -> Result<BeanValue<'f>> {
        let invoker = self.invoker(ctx, attribute)?;
        let definition = &invoker.attribute;
        match invoker.access {
            Access::Value => {
                let engine = self.factory.engine;
                let mediator = engine.mediators().for_attribute(definition)?;
                let value = mediator.attribute_value(&engine.env(), ctx, self.handle, definition)?;
                Ok(BeanValue::Value(value))
            }
            Access::Reference => match ctx.value(self.handle, attribute).cloned() {
                Some(AttributeValue::Record(target)) => Ok(BeanValue::Record(self.wrap(target))),
                Some(AttributeValue::Id(id)) => {
                    let holder = invoker.related_holder().unwrap_or_default();
                    let schema = self.factory.engine.schema();
                    // A join-table id of a concrete holder does not tell which table it names
                    if schema.requires_join_table(holder)
                        && schema.concrete_types_of(holder).iter().any(|c| c == holder)
                    {
                        return Ok(BeanValue::Value(AttributeValue::Id(id)));
                    }
                    Ok(BeanValue::Record(self.wrap(ctx.reference(holder, id))))
                }
                _ => Ok(BeanValue::Value(AttributeValue::Null)),
            },
            Access::Inverse => match ctx.value(self.handle, attribute) {
                Some(AttributeValue::RecordList(list)) => Ok(BeanValue::Records(
                    list.iter().map(|h| self.wrap(h)).collect(),
                )),
                _ => Ok(BeanValue::Records(Vec::new())),
            },
        }
    }

    /// Set an attribute, checking the value against the attribute's definition
    pub fn set(
        &self,
        ctx: &mut RecordContext,
        attribute: &str,
        value: impl Into<BeanValue<'f>>,
    ) -> Result<()> {
        let invoker = self.invoker(ctx, attribute)?;
        let schema = self.factory.engine.schema();
        let value = value.into();
        let assignable = |ctx: &RecordContext, target: RecordHandle| -> Result<()> {
            let holder = invoker.related_holder().unwrap_or_default();
            let type_name = ctx.require(target)?.type_name();
            if schema.is_assignable(type_name, holder) {
                Ok(())
            } else {
                Err(EngineError::invalid_value(format!(
                    "'{}' expects a '{}' record, got '{}'",
                    attribute, holder, type_name
                )))
            }
        };

        let stored = match (invoker.access, value) {
            (Access::Value, BeanValue::Value(value)) => {
                let engine = self.factory.engine;
                let mediator = engine.mediators().for_attribute(&invoker.attribute)?;
                mediator.validate_value(&engine.env(), &invoker.attribute, &value)?;
                value
            }
            (Access::Reference, BeanValue::Record(target)) => {
                assignable(ctx, target.handle)?;
                AttributeValue::Record(target.handle)
            }
            (Access::Reference, BeanValue::Value(value @ (AttributeValue::Null | AttributeValue::Id(_)))) => {
                value
            }
            (Access::Reference, BeanValue::Value(AttributeValue::Record(target))) => {
                assignable(ctx, target)?;
                AttributeValue::Record(target)
            }
            (Access::Inverse, BeanValue::Records(records)) => {
                let mut list = RecordList::new();
                for record in records {
                    assignable(ctx, record.handle)?;
                    list.push(record.handle);
                }
                AttributeValue::RecordList(list)
            }
            (access, value) => {
                return Err(EngineError::invalid_value(format!(
                    "Attribute '{}' ({:?}) cannot be set to {:?}",
                    attribute, access, value
                )));
            }
        };
        ctx.set_attribute(self.handle, attribute, stored)
    }

    /// Like [`get`](Self::get), loading the attribute first when it is absent
    /// and the record is stored
    pub async fn get_loaded<R: QueryRunner>(
        &self,
        accessor: &mut Accessor<'_, R>,
        ctx: &mut RecordContext,
        attribute: &str,
    ) -> Result<BeanValue<'f>> {
        let invoker = self.invoker(ctx, attribute)?;
        if !ctx.is_present(self.handle, attribute) && ctx.id_of(self.handle).is_some() {
            match invoker.access {
                Access::Inverse => {
                    accessor.load_inverse(ctx, self.handle, attribute).await?;
                }
                Access::Value | Access::Reference => {
                    accessor.load_missing(ctx, self.handle).await?;
                }
            }
        }
        self.get(ctx, attribute)
    }

    /// Insert the record, or update it when it is stored already
    pub async fn persist<R: QueryRunner>(
        &self,
        accessor: &mut Accessor<'_, R>,
        ctx: &mut RecordContext,
    ) -> Result<()> {
        match ctx.id_of(self.handle) {
            Some(_) => accessor.update(ctx, self.handle).await,
            None => accessor.insert(ctx, self.handle).await,
        }
    }

    pub async fn persist_cascaded<R: QueryRunner>(
        &self,
        accessor: &mut Accessor<'_, R>,
        ctx: &mut RecordContext,
    ) -> Result<()> {
        accessor.persist_cascaded(ctx, self.handle).await
    }

    pub async fn update<R: QueryRunner>(
        &self,
        accessor: &mut Accessor<'_, R>,
        ctx: &mut RecordContext,
    ) -> Result<()> {
        accessor.update(ctx, self.handle).await
    }

    pub async fn update_cascaded<R: QueryRunner>(
        &self,
        accessor: &mut Accessor<'_, R>,
        ctx: &mut RecordContext,
    ) -> Result<()> {
        accessor.update_cascaded(ctx, self.handle).await
    }

    pub async fn delete<R: QueryRunner>(
        &self,
        accessor: &mut Accessor<'_, R>,
        ctx: &mut RecordContext,
    ) -> Result<()> {
        accessor.delete(ctx, self.handle).await
    }

    pub async fn reload<R: QueryRunner>(
        &self,
        accessor: &mut Accessor<'_, R>,
        ctx: &mut RecordContext,
    ) -> Result<()> {
        accessor.reload(ctx, self.handle).await
    }
}

/// Several records read as one
///
/// A getter returns the value of the first record that has the attribute
/// present, optionally passing over records where it is `Null`.
#[derive(Debug, Clone)]
pub struct EclipsingRecord<'f> {
    records: Vec<ActiveRecord<'f>>,
    skip_nulls: bool,
}

impl<'f> EclipsingRecord<'f> {
    pub fn new(records: Vec<ActiveRecord<'f>>) -> Self {
        Self {
            records,
            skip_nulls: false,
        }
    }

    pub fn skipping_nulls(mut self) -> Self {
        self.skip_nulls = true;
        self
    }

    pub fn records(&self) -> &[ActiveRecord<'f>] {
        &self.records
    }

    pub fn get(&self, ctx: &mut RecordContext, attribute: &str) -> Result<BeanValue<'f>> {
        for record in &self.records {
            let type_name = record.type_name(ctx)?;
            if record.factory.invoker(type_name, attribute).is_none()
                || !record.is_present(ctx, attribute)
            {
                continue;
            }
            let value = record.get(ctx, attribute)?;
            if self.skip_nulls && value.is_null() {
                continue;
            }
            return Ok(value);
        }
        Ok(BeanValue::Value(AttributeValue::Null))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::schema::SchemaDefinition;
    use crate::types::NamedAttributeHolder;

    fn engine() -> Engine {
        let schema = SchemaDefinition::new("library")
            .with_holder(
                NamedAttributeHolder::new_type("Publication")
                    .as_abstract()
                    .with_attribute(Attribute::string("title")),
            )
            .with_holder(
                NamedAttributeHolder::new_type("Book")
                    .with_parent("Publication")
                    .with_attribute(Attribute::reference("author", "Author")),
            )
            .with_holder(
                NamedAttributeHolder::new_type("Author")
                    .with_attribute(Attribute::string("name"))
                    .with_attribute(Attribute::boolean("active"))
                    .with_attribute(Attribute::inverse("books", "Book", "author")),
            )
            .build()
            .unwrap();
        Engine::new(schema, EngineConfig::default()).unwrap()
    }

    // =========================================================================
    // Invoker Table Tests
    // =========================================================================

    #[test]
    fn test_invokers_include_inherited_attributes() {
        let engine = engine();
        let beans = SchemaBeanFactory::new(&engine);
        assert_eq!(beans.invoker("Book", "title").unwrap().access(), Access::Value);
        assert_eq!(
            beans.invoker("Book", "author").unwrap().access(),
            Access::Reference
        );
        assert_eq!(
            beans.invoker("Author", "books").unwrap().access(),
            Access::Inverse
        );
        assert!(beans.invoker("Author", "title").is_none());
    }

    #[test]
    fn test_create_rejects_abstract_type() {
        let engine = engine();
        let beans = SchemaBeanFactory::new(&engine);
        let mut ctx = RecordContext::new();
        assert!(beans.create(&mut ctx, "Publication").is_err());
    }

    // =========================================================================
    // Getter / Setter Tests
    // =========================================================================

    #[test]
    fn test_simple_values_are_validated() {
        let engine = engine();
        let beans = SchemaBeanFactory::new(&engine);
        let mut ctx = RecordContext::new();
        let author = beans.create(&mut ctx, "Author").unwrap();

        author.set(&mut ctx, "active", true).unwrap();
        assert_eq!(author.get(&mut ctx, "active").unwrap(), BeanValue::from(true));
        assert!(author.set(&mut ctx, "active", "yes").is_err());
        assert!(author.get(&mut ctx, "name").unwrap().is_null());
        assert!(author.set(&mut ctx, "missing", 1).is_err());
    }

    #[test]
    fn test_references_wrap_and_unwrap_beans() {
        let engine = engine();
        let beans = SchemaBeanFactory::new(&engine);
        let mut ctx = RecordContext::new();
        let author = beans.create(&mut ctx, "Author").unwrap();
        let book = beans.create(&mut ctx, "Book").unwrap();

        book.set(&mut ctx, "author", author).unwrap();
        assert_eq!(
            ctx.value(book.handle(), "author"),
            Some(&AttributeValue::Record(author.handle()))
        );
        assert_eq!(book.get(&mut ctx, "author").unwrap().as_record(), Some(author));

        let other_book = beans.create(&mut ctx, "Book").unwrap();
        assert!(book.set(&mut ctx, "author", other_book).is_err());
    }

    #[test]
    fn test_raw_id_reads_as_reference_record() {
        let engine = engine();
        let beans = SchemaBeanFactory::new(&engine);
        let mut ctx = RecordContext::new();
        let book = beans.create(&mut ctx, "Book").unwrap();
        book.set(&mut ctx, "author", AttributeValue::Id(7)).unwrap();

        let author = book.get(&mut ctx, "author").unwrap().as_record().unwrap();
        assert_eq!(author.id(&ctx), Some(7));
        assert!(ctx.get(author.handle()).unwrap().is_reference());
    }

    #[test]
    fn test_raw_join_id_of_concrete_holder_stays_an_id() {
        let schema = SchemaDefinition::new("fleet")
            .with_holder(NamedAttributeHolder::new_type("Vehicle"))
            .with_holder(NamedAttributeHolder::new_type("Truck").with_parent("Vehicle"))
            .with_holder(
                NamedAttributeHolder::new_type("Garage")
                    .with_attribute(Attribute::reference("vehicle", "Vehicle")),
            )
            .build()
            .unwrap();
        let engine = Engine::new(schema, EngineConfig::default()).unwrap();
        let beans = SchemaBeanFactory::new(&engine);
        let mut ctx = RecordContext::new();
        let garage = beans.create(&mut ctx, "Garage").unwrap();
        garage.set(&mut ctx, "vehicle", AttributeValue::Id(4)).unwrap();

        assert_eq!(
            garage.get(&mut ctx, "vehicle").unwrap(),
            BeanValue::Value(AttributeValue::Id(4))
        );
    }

    #[test]
    fn test_inverse_lists() {
        let engine = engine();
        let beans = SchemaBeanFactory::new(&engine);
        let mut ctx = RecordContext::new();
        let author = beans.create(&mut ctx, "Author").unwrap();
        assert_eq!(author.get(&mut ctx, "books").unwrap(), BeanValue::Records(Vec::new()));

        let first = beans.create(&mut ctx, "Book").unwrap();
        let second = beans.create(&mut ctx, "Book").unwrap();
        author.set(&mut ctx, "books", vec![first, second]).unwrap();
        assert_eq!(
            author.get(&mut ctx, "books").unwrap().as_records(),
            Some(&[first, second][..])
        );
        assert!(author.set(&mut ctx, "books", vec![author]).is_err());
    }

    // =========================================================================
    // Typed Bean Tests
    // =========================================================================

    struct Book<'f>(ActiveRecord<'f>);

    impl<'f> SchemaBean<'f> for Book<'f> {
        const TYPE_NAME: &'static str = "Book";

        fn from_record(record: ActiveRecord<'f>) -> Self {
            Book(record)
        }

        fn record(&self) -> ActiveRecord<'f> {
            self.0
        }
    }

    #[test]
    fn test_typed_beans_check_type() {
        let engine = engine();
        let beans = SchemaBeanFactory::new(&engine);
        let mut ctx = RecordContext::new();
        let book: Book<'_> = beans.create_bean(&mut ctx).unwrap();
        assert_eq!(book.record().type_name(&ctx).unwrap(), "Book");

        let author = ctx.create("Author");
        assert!(beans.typed::<Book<'_>>(&ctx, author).is_err());
        assert!(beans.typed::<Book<'_>>(&ctx, book.record().handle()).is_ok());
    }

    // =========================================================================
    // EclipsingRecord Tests
    // =========================================================================

    #[test]
    fn test_eclipsing_falls_through_absent_values() {
        let engine = engine();
        let beans = SchemaBeanFactory::new(&engine);
        let mut ctx = RecordContext::new();
        let draft = beans.create(&mut ctx, "Author").unwrap();
        let stored = beans.create(&mut ctx, "Author").unwrap();
        stored.set(&mut ctx, "name", "Ursula").unwrap();
        stored.set(&mut ctx, "active", true).unwrap();
        draft.set(&mut ctx, "active", AttributeValue::Null).unwrap();

        let eclipsing = EclipsingRecord::new(vec![draft, stored]);
        assert_eq!(eclipsing.get(&mut ctx, "name").unwrap(), BeanValue::from("Ursula"));
        assert!(eclipsing.get(&mut ctx, "active").unwrap().is_null());

        let eclipsing = eclipsing.skipping_nulls();
        assert_eq!(eclipsing.get(&mut ctx, "active").unwrap(), BeanValue::from(true));
        assert!(eclipsing.get(&mut ctx, "books").unwrap().is_null());
    }
}
