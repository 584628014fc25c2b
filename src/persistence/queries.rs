//! Statements that write records
//!
//! A record occupies one row of its type table, one row per join table of the
//! holders it belongs to and one row per unique-constraint table covering its
//! type. The factory emits the statements keeping all of them in step.

use crate::error::Result;
use crate::mediator::{MediatorEnv, MediatorRegistry};
use crate::query::{
    ColumnRef, Delete, GeneratedKey, Insert, Query, Update, ValueProvider, equals,
};
use crate::record::{RecordContext, RecordHandle};
use crate::sql::SqlValue;
use crate::table::{Column, TableRegistry, concrete_id_column};
use crate::types::AttributeKind;

/// Builds insert, update and delete statements for records
#[derive(Debug, Clone, Copy)]
pub struct QueryFactory<'e> {
    env: MediatorEnv<'e>,
    mediators: &'e MediatorRegistry,
    tables: &'e TableRegistry,
}

impl<'e> QueryFactory<'e> {
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

    /// Value of a column on a record, `None` when the attribute is not present
    fn present_value(
        &self,
        ctx: &RecordContext,
        handle: RecordHandle,
        type_name: &str,
        column: &Column,
    ) -> Result<Option<ValueProvider>> {
        let attribute = self.env.schema.require_attribute(type_name, &column.attribute)?;
        let mediator = self.mediators.for_attribute(attribute)?;
        if !mediator.is_attribute_present(ctx, handle, attribute) {
            return Ok(None);
        }
        let value = mediator.attribute_value(&self.env, ctx, handle, attribute)?;
        mediator.validate_value(&self.env, attribute, &value)?;
        Ok(Some(mediator.bind_value(&self.env, ctx, attribute, &value)?))
    }

    /// Insert of the type row followed by join-table and unique-constraint rows
    ///
    /// Only present attributes are written; the type row reports its
    /// generated key so later statements can refer to the record's id.
    pub fn insert_for(&self, ctx: &RecordContext, handle: RecordHandle) -> Result<Vec<Query>> {
        let type_name = ctx.require(handle)?.type_name().to_string();
        let table = self.tables.type_table(&type_name)?;

        let mut values = Vec::new();
        for column in &table.columns {
            if let Some(provider) = self.present_value(ctx, handle, &type_name, column)? {
                values.push((column.name.clone(), provider));
            }
        }
        let mut queries = vec![Query::Insert(Insert {
            table: table.name.clone(),
            values,
            generated_key: Some(GeneratedKey {
                record: handle,
                column: self.env.config.id_column.clone(),
            }),
        })];

        let own_id = concrete_id_column(&type_name);
        for join in self.tables.join_tables_of(&type_name) {
            queries.push(Query::Insert(Insert {
                table: join.name.clone(),
                values: vec![(own_id.clone(), ValueProvider::RecordId(handle))],
                generated_key: None,
            }));
        }

        for unique in self.tables.unique_tables_of(&type_name) {
            let mut values = Vec::with_capacity(unique.columns.len() + 1);
            for column in &unique.columns {
                let provider = match self.present_value(ctx, handle, &type_name, column)? {
                    Some(provider) => provider,
                    None => ValueProvider::Value(SqlValue::Null(column.sql_type)),
                };
                values.push((column.name.clone(), provider));
            }
            values.push((own_id.clone(), ValueProvider::RecordId(handle)));
            queries.push(Query::Insert(Insert {
                table: unique.name.clone(),
                values,
                generated_key: None,
            }));
        }

        Ok(queries)
    }

    /// Update of all present column-backed attributes
    ///
    /// Returns no statements when nothing column-backed is present.
    pub fn update_for(&self, ctx: &RecordContext, handle: RecordHandle) -> Result<Vec<Query>> {
        self.update_columns(ctx, handle, |_| true)
    }

    /// Update completing references that were written as NULL to break a cycle
    pub fn reference_update_for(
        &self,
        ctx: &RecordContext,
        handle: RecordHandle,
    ) -> Result<Vec<Query>> {
        let type_name = ctx.require(handle)?.type_name().to_string();
        let schema = self.env.schema;
        self.update_columns(ctx, handle, |column| {
            schema
                .attribute(&type_name, &column.attribute)
                .is_some_and(|a| matches!(a.kind, AttributeKind::NamedAttributeHolder { .. }))
        })
    }

    fn update_columns(
        &self,
        ctx: &RecordContext,
        handle: RecordHandle,
        include: impl Fn(&Column) -> bool,
    ) -> Result<Vec<Query>> {
        let type_name = ctx.require(handle)?.type_name().to_string();
        let table = self.tables.type_table(&type_name)?;

        let mut values = Vec::new();
        let mut updated = Vec::new();
        for column in table.columns.iter().filter(|c| include(c)) {
            if let Some(provider) = self.present_value(ctx, handle, &type_name, column)? {
                updated.push(column.attribute.as_str());
                values.push((column.name.clone(), provider));
            }
        }
        if values.is_empty() {
            return Ok(Vec::new());
        }

        let mut queries = vec![Query::Update(Update {
            table: table.name.clone(),
            values,
            criteria: equals(
                ColumnRef::new(self.env.config.id_column.clone()),
                ValueProvider::RecordId(handle),
            ),
        })];

        let own_id = concrete_id_column(&type_name);
        for unique in self.tables.unique_tables_of(&type_name) {
            let mut values = Vec::new();
            for column in unique.columns.iter().filter(|c| updated.contains(&c.attribute.as_str())) {
                if let Some(provider) = self.present_value(ctx, handle, &type_name, column)? {
                    values.push((column.name.clone(), provider));
                }
            }
            if values.is_empty() {
                continue;
            }
            queries.push(Query::Update(Update {
                table: unique.name.clone(),
                values,
                criteria: equals(ColumnRef::new(own_id.clone()), ValueProvider::RecordId(handle)),
            }));
        }

        Ok(queries)
    }

    /// Delete of a record held in the context
    pub fn delete_for(&self, ctx: &RecordContext, handle: RecordHandle) -> Result<Vec<Query>> {
        let type_name = ctx.require(handle)?.type_name().to_string();
        self.delete_rows(&type_name, ValueProvider::RecordId(handle))
    }

    /// Delete of a stored record known only by type and id
    pub fn delete_by_id(&self, type_name: &str, id: i64) -> Result<Vec<Query>> {
        self.delete_rows(type_name, ValueProvider::Value(SqlValue::BigInt(id)))
    }

    /// Unique-constraint rows first, then join rows, then the type row
    fn delete_rows(&self, type_name: &str, id: ValueProvider) -> Result<Vec<Query>> {
        let table = self.tables.type_table(type_name)?;
        let own_id = concrete_id_column(type_name);

        let mut queries = Vec::new();
        for unique in self.tables.unique_tables_of(type_name) {
            queries.push(Query::Delete(Delete {
                table: unique.name.clone(),
                criteria: equals(ColumnRef::new(own_id.clone()), id.clone()),
            }));
        }
        for join in self.tables.join_tables_of(type_name) {
            queries.push(Query::Delete(Delete {
                table: join.name.clone(),
                criteria: equals(ColumnRef::new(own_id.clone()), id.clone()),
            }));
        }
        queries.push(Query::Delete(Delete {
            table: table.name.clone(),
            criteria: equals(ColumnRef::new(self.env.config.id_column.clone()), id),
        }));
        Ok(queries)
    }
}
