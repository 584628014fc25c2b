//! Record model
//!
//! Records are partially populated, typed snapshots of entities. They live in a
//! [`RecordContext`] arena and reference each other through [`RecordHandle`]s,
//! so cyclic graphs need no shared ownership. The context also keeps an
//! identity cache keyed by `(type, id)`.

use std::collections::{BTreeMap, HashMap};
use std::io::Cursor;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::error::{EngineError, Result};

/// Shared, immutable binary content that can be read incrementally
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryStream(Arc<[u8]>);

impl BinaryStream {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    /// A reader over the content, starting at the first byte
    pub fn reader(&self) -> Cursor<Arc<[u8]>> {
        Cursor::new(Arc::clone(&self.0))
    }
}

impl From<Vec<u8>> for BinaryStream {
    fn from(bytes: Vec<u8>) -> Self {
        Self(Arc::from(bytes))
    }
}

impl From<&[u8]> for BinaryStream {
    fn from(bytes: &[u8]) -> Self {
        Self(Arc::from(bytes))
    }
}

/// Stable address of a record inside its [`RecordContext`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordHandle(usize);

impl RecordHandle {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Ordered collection of records, the value of an inverse attribute
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordList(Vec<RecordHandle>);

impl RecordList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, handle: RecordHandle) {
        self.0.push(handle);
    }

    pub fn iter(&self) -> impl Iterator<Item = RecordHandle> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, handle: RecordHandle) -> bool {
        self.0.contains(&handle)
    }

    pub fn as_slice(&self) -> &[RecordHandle] {
        &self.0
    }
}

impl FromIterator<RecordHandle> for RecordList {
    fn from_iter<I: IntoIterator<Item = RecordHandle>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<Vec<RecordHandle>> for RecordList {
    fn from(handles: Vec<RecordHandle>) -> Self {
        Self(handles)
    }
}

/// Value of a single record attribute
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Null,
    String(String),
    Decimal(Decimal),
    Boolean(bool),
    Date(DateTime<Utc>),
    Binary(Vec<u8>),
    Stream(BinaryStream),
    Json(serde_json::Value),
    /// To-one reference to a record in the same context
    Record(RecordHandle),
    /// To-one reference given by raw id only
    Id(i64),
    RecordList(RecordList),
}

impl AttributeValue {
    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            AttributeValue::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttributeValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<RecordHandle> {
        match self {
            AttributeValue::Record(h) => Some(*h),
            _ => None,
        }
    }

    pub fn as_record_list(&self) -> Option<&RecordList> {
        match self {
            AttributeValue::RecordList(list) => Some(list),
            _ => None,
        }
    }

    /// Binary content regardless of representation
    pub fn to_bytes(&self) -> Option<Vec<u8>> {
        match self {
            AttributeValue::Binary(b) => Some(b.clone()),
            AttributeValue::Stream(s) => Some(s.to_vec()),
            _ => None,
        }
    }

    /// Short name of the variant, for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            AttributeValue::Null => "null",
            AttributeValue::String(_) => "string",
            AttributeValue::Decimal(_) => "decimal",
            AttributeValue::Boolean(_) => "boolean",
            AttributeValue::Date(_) => "date",
            AttributeValue::Binary(_) => "binary",
            AttributeValue::Stream(_) => "stream",
            AttributeValue::Json(_) => "json",
            AttributeValue::Record(_) => "record",
            AttributeValue::Id(_) => "id",
            AttributeValue::RecordList(_) => "record list",
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        AttributeValue::String(v.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(v: String) -> Self {
        AttributeValue::String(v)
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        AttributeValue::Decimal(Decimal::from(v))
    }
}

impl From<i32> for AttributeValue {
    fn from(v: i32) -> Self {
        AttributeValue::Decimal(Decimal::from(v))
    }
}

impl From<Decimal> for AttributeValue {
    fn from(v: Decimal) -> Self {
        AttributeValue::Decimal(v)
    }
}

impl From<bool> for AttributeValue {
    fn from(v: bool) -> Self {
        AttributeValue::Boolean(v)
    }
}

impl From<DateTime<Utc>> for AttributeValue {
    fn from(v: DateTime<Utc>) -> Self {
        AttributeValue::Date(v)
    }
}

impl From<Vec<u8>> for AttributeValue {
    fn from(v: Vec<u8>) -> Self {
        AttributeValue::Binary(v)
    }
}

impl From<RecordHandle> for AttributeValue {
    fn from(v: RecordHandle) -> Self {
        AttributeValue::Record(v)
    }
}

impl From<RecordList> for AttributeValue {
    fn from(v: RecordList) -> Self {
        AttributeValue::RecordList(v)
    }
}

/// Typed, partially populated record snapshot
///
/// An attribute missing from the value map is "not present", which is
/// different from being present with [`AttributeValue::Null`].
#[derive(Debug, Clone)]
pub struct Record {
    type_name: String,
    id: Option<i64>,
    values: BTreeMap<String, AttributeValue>,
    is_reference: bool,
    is_dirty: bool,
}

impl Record {
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn id(&self) -> Option<i64> {
        self.id
    }

    pub fn value(&self, attribute: &str) -> Option<&AttributeValue> {
        self.values.get(attribute)
    }

    pub fn values(&self) -> impl Iterator<Item = (&str, &AttributeValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_present(&self, attribute: &str) -> bool {
        self.values.contains_key(attribute)
    }

    /// Reference records stand in for stored rows and are never cascaded
    pub fn is_reference(&self) -> bool {
        self.is_reference
    }

    /// Whether attributes changed since the record was created, loaded or persisted
    pub fn is_dirty(&self) -> bool {
        self.is_dirty
    }
}

/// Arena of records plus an identity cache keyed by `(type, id)`
#[derive(Debug, Clone, Default)]
pub struct RecordContext {
    records: Vec<Record>,
    identities: HashMap<(String, i64), RecordHandle>,
}

impl RecordContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn push(&mut self, record: Record) -> RecordHandle {
        let handle = RecordHandle(self.records.len());
        if let Some(id) = record.id {
            self.identities
                .insert((record.type_name.clone(), id), handle);
        }
        self.records.push(record);
        handle
    }

    /// Create a new, unsaved record of `type_name`
    pub fn create(&mut self, type_name: impl Into<String>) -> RecordHandle {
        self.push(Record {
            type_name: type_name.into(),
            id: None,
            values: BTreeMap::new(),
            is_reference: false,
            is_dirty: true,
        })
    }

    /// A reference record standing in for the stored row `(type_name, id)`
    ///
    /// Returns the cached record when the identity is already known.
    pub fn reference(&mut self, type_name: &str, id: i64) -> RecordHandle {
        if let Some(handle) = self.find(type_name, id) {
            return handle;
        }
        self.push(Record {
            type_name: type_name.to_string(),
            id: Some(id),
            values: BTreeMap::new(),
            is_reference: true,
            is_dirty: false,
        })
    }

    /// The record for a row read from the database
    ///
    /// A cached reference record is promoted to a regular record.
    pub fn loaded(&mut self, type_name: &str, id: i64) -> RecordHandle {
        let handle = self.reference(type_name, id);
        self.records[handle.0].is_reference = false;
        handle
    }

    pub fn find(&self, type_name: &str, id: i64) -> Option<RecordHandle> {
        self.identities.get(&(type_name.to_string(), id)).copied()
    }

    pub fn get(&self, handle: RecordHandle) -> Option<&Record> {
        self.records.get(handle.0)
    }

    pub fn require(&self, handle: RecordHandle) -> Result<&Record> {
        self.records.get(handle.0).ok_or_else(|| {
            EngineError::invariant(format!("Record handle {} is not part of this context", handle.0))
        })
    }

    fn require_mut(&mut self, handle: RecordHandle) -> Result<&mut Record> {
        self.records.get_mut(handle.0).ok_or_else(|| {
            EngineError::invariant(format!("Record handle {} is not part of this context", handle.0))
        })
    }

    pub fn handles(&self) -> impl Iterator<Item = RecordHandle> {
        (0..self.records.len()).map(RecordHandle)
    }

    pub fn type_of(&self, handle: RecordHandle) -> Option<&str> {
        self.get(handle).map(Record::type_name)
    }

    pub fn id_of(&self, handle: RecordHandle) -> Option<i64> {
        self.get(handle).and_then(Record::id)
    }

    pub fn value(&self, handle: RecordHandle, attribute: &str) -> Option<&AttributeValue> {
        self.get(handle).and_then(|r| r.value(attribute))
    }

    pub fn is_present(&self, handle: RecordHandle, attribute: &str) -> bool {
        self.get(handle).is_some_and(|r| r.is_present(attribute))
    }

    /// Set an attribute and mark the record dirty
    pub fn set_attribute(
        &mut self,
        handle: RecordHandle,
        attribute: &str,
        value: impl Into<AttributeValue>,
    ) -> Result<()> {
        let record = self.require_mut(handle)?;
        record.values.insert(attribute.to_string(), value.into());
        record.is_dirty = true;
        Ok(())
    }

    /// Set an attribute read from storage, leaving the dirty flag untouched
    pub fn set_loaded_attribute(
        &mut self,
        handle: RecordHandle,
        attribute: &str,
        value: AttributeValue,
    ) -> Result<()> {
        let record = self.require_mut(handle)?;
        record.values.insert(attribute.to_string(), value);
        Ok(())
    }

    /// Make an attribute "not present" again
    pub fn unset_attribute(&mut self, handle: RecordHandle, attribute: &str) -> Result<()> {
        self.require_mut(handle)?.values.remove(attribute);
        Ok(())
    }

    /// Record the generated id of a freshly inserted record
    pub fn assign_id(&mut self, handle: RecordHandle, id: i64) -> Result<()> {
        let record = self.require_mut(handle)?;
        if let Some(existing) = record.id {
            if existing != id {
                return Err(EngineError::invariant(format!(
                    "Record {}#{} cannot be reassigned id {}",
                    record.type_name, existing, id
                )));
            }
        }
        record.id = Some(id);
        let key = (record.type_name.clone(), id);
        self.identities.insert(key, handle);
        Ok(())
    }

    /// Forget the id of a record, e.g. after the inserting transaction rolled back
    pub fn clear_id(&mut self, handle: RecordHandle) {
        if let Some(record) = self.records.get_mut(handle.0) {
            if let Some(id) = record.id.take() {
                self.identities.remove(&(record.type_name.clone(), id));
            }
        }
    }

    pub fn set_reference(&mut self, handle: RecordHandle, is_reference: bool) -> Result<()> {
        self.require_mut(handle)?.is_reference = is_reference;
        Ok(())
    }

    pub fn mark_clean(&mut self, handle: RecordHandle) {
        if let Some(record) = self.records.get_mut(handle.0) {
            record.is_dirty = false;
        }
    }
}
