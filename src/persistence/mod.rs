//! Cascading persistence of record graphs
//!
//! The [`PersistenceManager`] walks a record graph depth first and appends the
//! statements needed to store it to a [`Transaction`]:
//!
//! 1. reference records are skipped, they stand in for rows stored elsewhere
//! 2. a record already on the current path is a cycle and is not entered again
//! 3. to-one references are persisted before the record referring to them; a
//!    reference into the current path cannot be written yet, it is written as
//!    NULL and completed by a deferred update once all inserts ran
//! 4. the record itself is inserted (no id yet) or updated (id present)
//! 5. inverse lists are reconciled: desired children get their back-reference
//!    and are persisted, stored children no longer listed are deleted
//!
//! The manager performs no I/O. Stored children of inverse lists come from a
//! [`ChildLoader`], filled ahead of time by the caller.

mod children;
mod queries;

use std::collections::{HashMap, HashSet};

use tracing::{debug, info, trace};

pub use children::{ChildKey, ChildLoader, ExistingChildren};
pub use queries::QueryFactory;

use crate::error::{EngineError, Result};
use crate::mediator::{MediatorEnv, MediatorRegistry};
use crate::record::{AttributeValue, RecordContext, RecordHandle, RecordList};
use crate::schema::Schema;
use crate::table::TableRegistry;
use crate::transaction::Transaction;
use crate::types::AttributeKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visit {
    /// On the current path, its own statements not emitted yet
    InProgress,
    Done,
}

/// Operation-scoped builder of a persistence transaction
pub struct PersistenceManager<'e> {
    schema: &'e Schema,
    queries: QueryFactory<'e>,
    children: &'e dyn ChildLoader,
    /// Stored children, kept apart from the caller's records
    existing: RecordContext,
    roots: HashSet<RecordHandle>,
    visits: HashMap<RecordHandle, Visit>,
    /// Records whose references need completing, in first-encountered order
    deferred: Vec<RecordHandle>,
    persisted: Vec<RecordHandle>,
    deleted: Vec<RecordHandle>,
    transaction: Transaction,
}

impl<'e> PersistenceManager<'e> {
    pub fn new(
        env: MediatorEnv<'e>,
        mediators: &'e MediatorRegistry,
        tables: &'e TableRegistry,
        children: &'e dyn ChildLoader,
    ) -> Self {
        Self {
            schema: env.schema,
            queries: QueryFactory::new(env, mediators, tables),
            children,
            existing: RecordContext::new(),
            roots: HashSet::new(),
            visits: HashMap::new(),
            deferred: Vec::new(),
            persisted: Vec::new(),
            deleted: Vec::new(),
            transaction: Transaction::new(env.config.dialect),
        }
    }

    /// Schedule persistence of the graph rooted at `root`
    ///
    /// Appending the same root again does nothing.
    pub fn append(&mut self, ctx: &mut RecordContext, root: RecordHandle) -> Result<()> {
        ctx.require(root)?;
        if !self.roots.insert(root) {
            trace!(record = root.index(), "Root already appended");
            return Ok(());
        }
        self.persist(ctx, root)?;
        Ok(())
    }

    /// Schedule deletion of a stored record
    pub fn append_delete(&mut self, ctx: &RecordContext, handle: RecordHandle) -> Result<()> {
        let record = ctx.require(handle)?;
        if record.id().is_none() {
            return Err(EngineError::invariant(format!(
                "Cannot delete unsaved '{}' record",
                record.type_name()
            )));
        }
        self.transaction.extend(self.queries.delete_for(ctx, handle)?);
        self.deleted.push(handle);
        Ok(())
    }

    /// Run the deferred reference updates and hand out the transaction
    ///
    /// Persisted records are marked clean and deleted records lose their id
    /// once the transaction commits.
    pub fn finalize_transaction(mut self, ctx: &RecordContext) -> Result<Transaction> {
        for handle in std::mem::take(&mut self.deferred) {
            let updates = self.queries.reference_update_for(ctx, handle)?;
            debug!(
                record = handle.index(),
                statements = updates.len(),
                "Completing deferred references"
            );
            self.transaction.extend(updates);
        }

        let persisted = self.persisted;
        let deleted = self.deleted;
        self.transaction.after_commit(move |ctx| {
            for handle in persisted {
                ctx.mark_clean(handle);
            }
            for handle in deleted {
                ctx.clear_id(handle);
            }
        });
        Ok(self.transaction)
    }

    fn persist(&mut self, ctx: &mut RecordContext, handle: RecordHandle) -> Result<Visit> {
        let record = ctx.require(handle)?;
        if record.is_reference() {
            return Ok(Visit::Done);
        }
        match self.visits.get(&handle) {
            Some(Visit::InProgress) => {
                debug!(record = handle.index(), record_type = record.type_name(), "Reference cycle detected");
                return Ok(Visit::InProgress);
            }
            Some(Visit::Done) => return Ok(Visit::Done),
            None => {}
        }
        let type_name = record.type_name().to_string();

        self.visits.insert(handle, Visit::InProgress);
        self.persist_references(ctx, handle, &type_name)?;
        self.write(ctx, handle)?;
        self.visits.insert(handle, Visit::Done);
        self.persist_inverses(ctx, handle, &type_name)?;
        Ok(Visit::Done)
    }

    fn persist_references(
        &mut self,
        ctx: &mut RecordContext,
        handle: RecordHandle,
        type_name: &str,
    ) -> Result<()> {
        let schema = self.schema;
        for attribute in schema.all_attributes(type_name) {
            let AttributeKind::NamedAttributeHolder {
                to_one_attribute, ..
            } = &attribute.kind
            else {
                continue;
            };
            let Some(&AttributeValue::Record(child)) = ctx.value(handle, &attribute.name) else {
                continue;
            };
            if ctx.require(child)?.is_reference() {
                continue;
            }
            if let Some(back) = to_one_attribute {
                if ctx.value(child, back) != Some(&AttributeValue::Record(handle)) {
                    ctx.set_attribute(child, back, handle)?;
                }
            }
            if self.persist(ctx, child)? == Visit::InProgress && ctx.id_of(child).is_none() {
                self.defer(handle);
            }
        }
        Ok(())
    }

    fn defer(&mut self, handle: RecordHandle) {
        if !self.deferred.contains(&handle) {
            debug!(record = handle.index(), "Deferring reference update");
            self.deferred.push(handle);
        }
    }

    fn write(&mut self, ctx: &RecordContext, handle: RecordHandle) -> Result<()> {
        let record = ctx.require(handle)?;
        let statements = if record.id().is_none() {
            self.queries.insert_for(ctx, handle)?
        } else {
            self.queries.update_for(ctx, handle)?
        };
        self.transaction.extend(statements);
        self.persisted.push(handle);
        Ok(())
    }

    fn persist_inverses(
        &mut self,
        ctx: &mut RecordContext,
        handle: RecordHandle,
        type_name: &str,
    ) -> Result<()> {
        let schema = self.schema;
        for attribute in schema.all_attributes(type_name) {
            let AttributeKind::Inverse {
                holder,
                referenced_attribute,
            } = &attribute.kind
            else {
                continue;
            };
            let Some(AttributeValue::RecordList(desired)) = ctx.value(handle, &attribute.name).cloned()
            else {
                continue;
            };

            let mut leftovers = Vec::new();
            if let Some(id) = ctx.id_of(handle) {
                for (child_type, child_id) in
                    self.children.existing_children(type_name, id, &attribute.name)?
                {
                    let existing = self.existing.reference(&child_type, child_id);
                    if !leftovers.contains(&existing) {
                        leftovers.push(existing);
                    }
                }
            }

            // The owner must not be entered again from its children
            let was_reference = ctx.require(handle)?.is_reference();
            ctx.set_reference(handle, true)?;
            let result = self.persist_children(
                ctx,
                handle,
                &desired,
                holder,
                referenced_attribute,
                &mut leftovers,
            );
            ctx.set_reference(handle, was_reference)?;
            result?;

            for orphan in leftovers {
                let record = self.existing.require(orphan)?;
                let (orphan_type, orphan_id) = match record.id() {
                    Some(id) => (record.type_name().to_string(), id),
                    None => continue,
                };
                info!(
                    owner = type_name,
                    attribute = %attribute.name,
                    record_type = %orphan_type,
                    id = orphan_id,
                    "Removing orphaned child"
                );
                self.transaction
                    .extend(self.queries.delete_by_id(&orphan_type, orphan_id)?);
            }
        }
        Ok(())
    }

    fn persist_children(
        &mut self,
        ctx: &mut RecordContext,
        owner: RecordHandle,
        desired: &RecordList,
        holder: &str,
        referenced_attribute: &str,
        leftovers: &mut Vec<RecordHandle>,
    ) -> Result<()> {
        for child in desired.iter() {
            let record = ctx.require(child)?;
            if !self.schema.is_assignable(record.type_name(), holder) {
                return Err(EngineError::invalid_value(format!(
                    "'{}' record cannot be a child of inverse relation over '{}'",
                    record.type_name(),
                    holder
                )));
            }
            if !record.is_reference()
                && ctx.value(child, referenced_attribute) != Some(&AttributeValue::Record(owner))
            {
                ctx.set_attribute(child, referenced_attribute, owner)?;
            }
            self.persist(ctx, child)?;

            let record = ctx.require(child)?;
            if let Some(id) = record.id() {
                if let Some(existing) = self.existing.find(record.type_name(), id) {
                    leftovers.retain(|h| *h != existing);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::mediator::DefaultMediatorFactory;
    use crate::query::Query;
    use crate::schema::SchemaDefinition;
    use crate::types::{Attribute, NamedAttributeHolder};

    struct Fixture {
        schema: Schema,
        config: EngineConfig,
        mediators: MediatorRegistry,
        tables: TableRegistry,
    }

    impl Fixture {
        fn new() -> Self {
            let schema = SchemaDefinition::new("library")
                .with_holder(
                    NamedAttributeHolder::new_type("Author")
                        .with_attribute(Attribute::string("name"))
                        .with_attribute(Attribute::inverse("books", "Book", "author")),
                )
                .with_holder(
                    NamedAttributeHolder::new_type("Book")
                        .with_attribute(Attribute::string("title"))
                        .with_attribute(Attribute::reference("author", "Author")),
                )
                .build()
                .unwrap();
            let config = EngineConfig::default();
            let mediators =
                MediatorRegistry::build(&schema, &DefaultMediatorFactory::new()).unwrap();
            let tables = TableRegistry::build(&schema, &mediators, &config).unwrap();
            Self {
                schema,
                config,
                mediators,
                tables,
            }
        }

        fn manager<'a>(&'a self, children: &'a dyn ChildLoader) -> PersistenceManager<'a> {
            PersistenceManager::new(
                MediatorEnv {
                    schema: &self.schema,
                    config: &self.config,
                },
                &self.mediators,
                &self.tables,
                children,
            )
        }
    }

    fn kinds(transaction: &Transaction) -> Vec<String> {
        transaction
            .steps()
            .iter()
            .map(|q| {
                let verb = match q {
                    Query::Insert(_) => "INSERT",
                    Query::Update(_) => "UPDATE",
                    Query::Delete(_) => "DELETE",
                    Query::Select(_) => "SELECT",
                };
                format!("{} {}", verb, q.table().unwrap_or("?"))
            })
            .collect()
    }

    // =========================================================================
    // Traversal Tests
    // =========================================================================

    #[test]
    fn test_reference_records_are_skipped() {
        let fixture = Fixture::new();
        let children = ExistingChildren::new();
        let mut ctx = RecordContext::new();
        let author = ctx.reference("Author", 5);

        let mut manager = fixture.manager(&children);
        manager.append(&mut ctx, author).unwrap();
        assert!(manager.finalize_transaction(&ctx).unwrap().is_empty());
    }

    #[test]
    fn test_append_twice_is_noop() {
        let fixture = Fixture::new();
        let children = ExistingChildren::new();
        let mut ctx = RecordContext::new();
        let book = ctx.create("Book");
        ctx.set_attribute(book, "title", "Dune").unwrap();

        let mut manager = fixture.manager(&children);
        manager.append(&mut ctx, book).unwrap();
        manager.append(&mut ctx, book).unwrap();
        let transaction = manager.finalize_transaction(&ctx).unwrap();
        assert_eq!(kinds(&transaction), vec!["INSERT BOOK"]);
    }

    #[test]
    fn test_referenced_record_inserted_first() {
        let fixture = Fixture::new();
        let children = ExistingChildren::new();
        let mut ctx = RecordContext::new();
        let author = ctx.create("Author");
        let book = ctx.create("Book");
        ctx.set_attribute(book, "author", author).unwrap();

        let mut manager = fixture.manager(&children);
        manager.append(&mut ctx, book).unwrap();
        let transaction = manager.finalize_transaction(&ctx).unwrap();
        assert_eq!(kinds(&transaction), vec!["INSERT AUTHOR", "INSERT BOOK"]);
    }

    #[test]
    fn test_stored_record_is_updated_even_when_clean() {
        let fixture = Fixture::new();
        let children = ExistingChildren::new();
        let mut ctx = RecordContext::new();
        let book = ctx.loaded("Book", 2);
        ctx.set_loaded_attribute(book, "title", "Emma".into()).unwrap();
        assert!(!ctx.get(book).unwrap().is_dirty());

        let mut manager = fixture.manager(&children);
        manager.append(&mut ctx, book).unwrap();
        let transaction = manager.finalize_transaction(&ctx).unwrap();
        assert_eq!(kinds(&transaction), vec!["UPDATE BOOK"]);
    }

    #[test]
    fn test_stored_record_without_present_columns_emits_nothing() {
        let fixture = Fixture::new();
        let children = ExistingChildren::new();
        let mut ctx = RecordContext::new();
        let book = ctx.loaded("Book", 2);

        let mut manager = fixture.manager(&children);
        manager.append(&mut ctx, book).unwrap();
        assert!(manager.finalize_transaction(&ctx).unwrap().is_empty());
    }

    // =========================================================================
    // Inverse Tests
    // =========================================================================

    #[test]
    fn test_inverse_children_get_back_reference() {
        let fixture = Fixture::new();
        let children = ExistingChildren::new();
        let mut ctx = RecordContext::new();
        let author = ctx.create("Author");
        let book = ctx.create("Book");
        ctx.set_attribute(author, "books", RecordList::from(vec![book]))
            .unwrap();

        let mut manager = fixture.manager(&children);
        manager.append(&mut ctx, author).unwrap();
        let transaction = manager.finalize_transaction(&ctx).unwrap();

        assert_eq!(kinds(&transaction), vec!["INSERT AUTHOR", "INSERT BOOK"]);
        assert_eq!(ctx.value(book, "author"), Some(&AttributeValue::Record(author)));
        assert!(!ctx.get(author).unwrap().is_reference());
    }

    #[test]
    fn test_foreign_child_type_rejected() {
        let fixture = Fixture::new();
        let children = ExistingChildren::new();
        let mut ctx = RecordContext::new();
        let author = ctx.create("Author");
        let other = ctx.create("Author");
        ctx.set_attribute(author, "books", RecordList::from(vec![other]))
            .unwrap();

        let mut manager = fixture.manager(&children);
        let err = manager.append(&mut ctx, author).unwrap_err();
        assert!(matches!(err, EngineError::InvalidValue(_)));
        assert!(!ctx.get(author).unwrap().is_reference());
    }

    #[test]
    fn test_delete_requires_id() {
        let fixture = Fixture::new();
        let children = ExistingChildren::new();
        let mut ctx = RecordContext::new();
        let book = ctx.create("Book");

        let mut manager = fixture.manager(&children);
        assert!(manager.append_delete(&ctx, book).is_err());

        let stored = ctx.loaded("Book", 8);
        manager.append_delete(&ctx, stored).unwrap();
        let transaction = manager.finalize_transaction(&ctx).unwrap();
        assert_eq!(kinds(&transaction), vec!["DELETE BOOK"]);
    }
}
