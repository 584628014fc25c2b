//! Engine - Main entry point for schema-driven record persistence
//!
//! The [`Engine`] owns a schema together with everything derived from it once
//! (mediators, tables). An [`Accessor`] pairs the engine with a
//! [`QueryRunner`] to read and write records.

mod plan;

use std::collections::HashSet;

use tracing::{debug, info};

pub use plan::{COUNT_ALIAS, QueryPlan, QueryPlanner, UNION_ALIAS};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::mediator::{
    AttributeMediatorFactory, DefaultMediatorFactory, MediatorEnv, MediatorRegistry,
};
use crate::nquery::{
    self, Argument, Count, DefaultExpressionHandler, ExpressionStatementHandler, Pick,
};
use crate::persistence::{ChildKey, ChildLoader, ExistingChildren, PersistenceManager, QueryFactory};
use crate::query::Query;
use crate::record::{AttributeValue, RecordContext, RecordHandle, RecordList};
use crate::runner::{QueryRunner, SqlRow};
use crate::schema::Schema;
use crate::sql::{DdlGenerator, Renderer, SqlValue};
use crate::table::TableRegistry;
use crate::transaction::Transaction;
use crate::types::AttributeKind;

/// Schema-driven record persistence engine
///
/// Immutable after construction and safe to share between tasks.
pub struct Engine {
    schema: Schema,
    config: EngineConfig,
    mediators: MediatorRegistry,
    tables: TableRegistry,
    handler: Box<dyn ExpressionStatementHandler + Send + Sync>,
}

impl Engine {
    /// Create an engine using the built-in mediators
    pub fn new(schema: Schema, config: EngineConfig) -> Result<Self> {
        Self::with_factory(schema, config, &DefaultMediatorFactory::new())
    }

    /// Create an engine resolving mediators through `factory`
    ///
    /// Fails when the factory has no mediator for an attribute kind the
    /// schema uses.
    pub fn with_factory(
        schema: Schema,
        config: EngineConfig,
        factory: &dyn AttributeMediatorFactory,
    ) -> Result<Self> {
        let mediators = MediatorRegistry::build(&schema, factory)?;
        let tables = TableRegistry::build(&schema, &mediators, &config)?;
        info!(
            schema = schema.name(),
            holders = schema.holders().count(),
            tables = tables.type_tables().count(),
            "Engine initialized"
        );
        Ok(Self {
            schema,
            config,
            mediators,
            tables,
            handler: Box::new(DefaultExpressionHandler),
        })
    }

    /// Replace the handler turning expression text into expressions
    pub fn with_expression_handler(
        mut self,
        handler: impl ExpressionStatementHandler + Send + Sync + 'static,
    ) -> Self {
        self.handler = Box::new(handler);
        self
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn mediators(&self) -> &MediatorRegistry {
        &self.mediators
    }

    pub fn tables(&self) -> &TableRegistry {
        &self.tables
    }

    pub fn env(&self) -> MediatorEnv<'_> {
        MediatorEnv {
            schema: &self.schema,
            config: &self.config,
        }
    }

    pub fn query_factory(&self) -> QueryFactory<'_> {
        QueryFactory::new(self.env(), &self.mediators, &self.tables)
    }

    pub fn planner(&self) -> QueryPlanner<'_> {
        QueryPlanner::new(self.env(), &self.mediators, &self.tables)
    }

    /// Parse nquery text with the engine's expression handler
    pub fn parse(&self, text: &str, arguments: &[Argument]) -> Result<nquery::Query> {
        nquery::parse_with(text, arguments, self.handler.as_ref())
    }

    pub fn ddl(&self) -> DdlGenerator<'_> {
        DdlGenerator::new(&self.config)
    }

    /// CREATE TABLE statements for every table of the schema
    pub fn create_statements(&self) -> Vec<String> {
        self.ddl().generate_schema(&self.tables)
    }

    /// DROP TABLE statements, dependent tables first
    pub fn drop_statements(&self) -> Vec<String> {
        self.ddl().generate_drop_schema(&self.tables)
    }

    /// A persistence manager serving stored inverse children from `children`
    pub fn persistence_manager<'e>(&'e self, children: &'e dyn ChildLoader) -> PersistenceManager<'e> {
        PersistenceManager::new(self.env(), &self.mediators, &self.tables, children)
    }

    pub fn accessor<'a, R: QueryRunner>(&'a self, runner: &'a mut R) -> Accessor<'a, R> {
        Accessor {
            engine: self,
            runner,
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("schema", &self.schema.name())
            .field("config", &self.config)
            .finish()
    }
}

/// Reads and writes records through a runner
pub struct Accessor<'a, R> {
    engine: &'a Engine,
    runner: &'a mut R,
}

impl<'a, R: QueryRunner> Accessor<'a, R> {
    pub fn engine(&self) -> &'a Engine {
        self.engine
    }

    pub fn runner(&mut self) -> &mut R {
        &mut *self.runner
    }

    fn transaction(&self) -> Transaction {
        Transaction::new(self.engine.config.dialect)
    }

    // =========================================================================
    // Write Operations
    // =========================================================================

    /// Insert a single record
    ///
    /// Records it refers to must be stored already; use
    /// [`persist_cascaded`](Self::persist_cascaded) for graphs.
    pub async fn insert(&mut self, ctx: &mut RecordContext, handle: RecordHandle) -> Result<()> {
        let record = ctx.require(handle)?;
        if record.is_reference() || record.id().is_some() {
            return Err(EngineError::invariant(format!(
                "'{}' record is already stored",
                record.type_name()
            )));
        }
        self.require_stored_references(ctx, handle)?;

        let mut transaction = self.transaction();
        transaction.extend(self.engine.query_factory().insert_for(ctx, handle)?);
        transaction.after_commit(move |ctx| ctx.mark_clean(handle));
        transaction.commit(&mut *self.runner, ctx).await
    }

    /// Update the present attributes of a single stored record
    pub async fn update(&mut self, ctx: &mut RecordContext, handle: RecordHandle) -> Result<()> {
        self.require_stored(ctx, handle)?;
        self.require_stored_references(ctx, handle)?;

        let statements = self.engine.query_factory().update_for(ctx, handle)?;
        if statements.is_empty() {
            debug!(record = handle.index(), "Nothing to update");
            return Ok(());
        }
        let mut transaction = self.transaction();
        transaction.extend(statements);
        transaction.after_commit(move |ctx| ctx.mark_clean(handle));
        transaction.commit(&mut *self.runner, ctx).await
    }

    /// Delete a stored record; its id is cleared once the delete commits
    pub async fn delete(&mut self, ctx: &mut RecordContext, handle: RecordHandle) -> Result<()> {
        self.require_stored(ctx, handle)?;
        let mut transaction = self.transaction();
        transaction.extend(self.engine.query_factory().delete_for(ctx, handle)?);
        transaction.after_commit(move |ctx| ctx.clear_id(handle));
        transaction.commit(&mut *self.runner, ctx).await
    }

    /// Insert or update the graph rooted at `root`
    ///
    /// Referenced records and inverse children are persisted along with the
    /// root; stored children missing from an inverse list are deleted.
    pub async fn persist_cascaded(
        &mut self,
        ctx: &mut RecordContext,
        root: RecordHandle,
    ) -> Result<()> {
        let children = self.prefetch_children(ctx, root).await?;
        debug!(
            record = root.index(),
            inverse_lists = children.len(),
            "Prefetched stored children"
        );

        let engine = self.engine;
        let mut manager = engine.persistence_manager(&children);
        manager.append(ctx, root)?;
        let transaction = manager.finalize_transaction(ctx)?;
        transaction.commit(&mut *self.runner, ctx).await
    }

    /// [`persist_cascaded`](Self::persist_cascaded) for a root that must be stored already
    pub async fn update_cascaded(
        &mut self,
        ctx: &mut RecordContext,
        root: RecordHandle,
    ) -> Result<()> {
        self.require_stored(ctx, root)?;
        self.persist_cascaded(ctx, root).await
    }

    fn require_stored(&self, ctx: &RecordContext, handle: RecordHandle) -> Result<()> {
        let record = ctx.require(handle)?;
        if record.id().is_none() {
            return Err(EngineError::invariant(format!(
                "'{}' record has not been stored",
                record.type_name()
            )));
        }
        if record.is_reference() {
            return Err(EngineError::invariant(format!(
                "'{}' record #{} is a reference and cannot be written",
                record.type_name(),
                record.id().unwrap_or_default()
            )));
        }
        Ok(())
    }

    fn require_stored_references(&self, ctx: &RecordContext, handle: RecordHandle) -> Result<()> {
        let record = ctx.require(handle)?;
        for attribute in self.engine.schema.all_attributes(record.type_name()) {
            if !matches!(attribute.kind, AttributeKind::NamedAttributeHolder { .. }) {
                continue;
            }
            if let Some(AttributeValue::Record(target)) = record.value(&attribute.name) {
                if ctx.id_of(*target).is_none() {
                    return Err(EngineError::invariant(format!(
                        "'{}.{}' refers to an unsaved record",
                        record.type_name(),
                        attribute.name
                    )));
                }
            }
        }
        Ok(())
    }

    /// Stored children of every inverse list reachable from `root`
    async fn prefetch_children(
        &mut self,
        ctx: &RecordContext,
        root: RecordHandle,
    ) -> Result<ExistingChildren> {
        let engine = self.engine;
        let schema = &engine.schema;
        let mut existing = ExistingChildren::new();
        let mut pending = vec![root];
        let mut seen = HashSet::new();

        while let Some(handle) = pending.pop() {
            if !seen.insert(handle) {
                continue;
            }
            let record = ctx.require(handle)?;
            if record.is_reference() {
                continue;
            }
            for attribute in schema.all_attributes(record.type_name()) {
                match (&attribute.kind, record.value(&attribute.name)) {
                    (
                        AttributeKind::NamedAttributeHolder { .. },
                        Some(AttributeValue::Record(target)),
                    ) => pending.push(*target),
                    (
                        AttributeKind::Inverse {
                            holder,
                            referenced_attribute,
                        },
                        Some(AttributeValue::RecordList(list)),
                    ) => {
                        pending.extend(list.iter());
                        let Some(id) = record.id() else {
                            continue;
                        };
                        if existing.contains(record.type_name(), id, &attribute.name) {
                            continue;
                        }
                        let keys = self
                            .child_keys(ctx, handle, holder, referenced_attribute)
                            .await?;
                        existing.insert(record.type_name(), id, attribute.name.clone(), keys);
                    }
                    _ => {}
                }
            }
        }
        Ok(existing)
    }

    async fn child_keys(
        &mut self,
        ctx: &RecordContext,
        owner: RecordHandle,
        holder: &str,
        referenced_attribute: &str,
    ) -> Result<Vec<ChildKey>> {
        let engine = self.engine;
        let planner = engine.planner();
        let plan = planner.children(ctx, holder, referenced_attribute, owner)?;
        let rows = self.fetch(ctx, &plan).await?;
        rows.iter().map(|row| planner.row_key(&plan, row)).collect()
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    async fn fetch(&mut self, ctx: &RecordContext, plan: &QueryPlan) -> Result<Vec<SqlRow>> {
        let renderer = Renderer::new(self.engine.config.dialect);
        let mut statement = renderer.render(&Query::Select(plan.select.clone()), ctx)?;
        if !self.runner.supports_streaming() {
            statement = statement.without_streams();
        }
        debug!(sql = %statement.sql, "Executing select");
        self.runner.query(&statement, &plan.columns()).await
    }

    /// Run a `PICK` statement, returning the matching records
    ///
    /// Rows become records of `ctx`; a record already in the context is
    /// refreshed in place.
    pub async fn query(
        &mut self,
        ctx: &mut RecordContext,
        text: &str,
        arguments: &[Argument],
    ) -> Result<Vec<RecordHandle>> {
        match self.engine.parse(text, arguments)? {
            nquery::Query::Pick(pick) => self.pick(ctx, pick).await,
            nquery::Query::Count(_) => Err(EngineError::query_parsing(
                "COUNT statements return a number, use count()",
            )),
        }
    }

    /// Run a `PICK` statement, returning the first matching record
    pub async fn query_first(
        &mut self,
        ctx: &mut RecordContext,
        text: &str,
        arguments: &[Argument],
    ) -> Result<Option<RecordHandle>> {
        Ok(self.query(ctx, text, arguments).await?.into_iter().next())
    }

    /// Run an already parsed `PICK`
    pub async fn pick(&mut self, ctx: &mut RecordContext, pick: Pick) -> Result<Vec<RecordHandle>> {
        let engine = self.engine;
        let planner = engine.planner();
        let plan = planner.pick(ctx, pick)?;
        let rows = self.fetch(ctx, &plan).await?;
        debug!(holder = %plan.holder, rows = rows.len(), "Query returned");
        planner.materialize(ctx, &plan, &rows, true)
    }

    /// Run a `COUNT` statement
    pub async fn count(
        &mut self,
        ctx: &RecordContext,
        text: &str,
        arguments: &[Argument],
    ) -> Result<u64> {
        match self.engine.parse(text, arguments)? {
            nquery::Query::Count(count) => self.count_parsed(ctx, count).await,
            nquery::Query::Pick(_) => Err(EngineError::query_parsing(
                "PICK statements return records, use query()",
            )),
        }
    }

    /// Run an already parsed `COUNT`
    pub async fn count_parsed(&mut self, ctx: &RecordContext, count: Count) -> Result<u64> {
        let plan = self.engine.planner().count(ctx, count)?;
        let rows = self.fetch(ctx, &plan).await?;
        match rows.first().and_then(|row| row.get(COUNT_ALIAS)) {
            Some(SqlValue::BigInt(n)) => u64::try_from(*n)
                .map_err(|_| EngineError::invariant(format!("Negative count {}", n))),
            other => Err(EngineError::invariant(format!(
                "Unexpected count result {:?}",
                other
            ))),
        }
    }

    /// Read a stored record of a concrete type
    pub async fn read_by_id(
        &mut self,
        ctx: &mut RecordContext,
        type_name: &str,
        id: i64,
    ) -> Result<Option<RecordHandle>> {
        let engine = self.engine;
        let planner = engine.planner();
        let plan = planner.by_id(type_name, id)?;
        let rows = self.fetch(ctx, &plan).await?;
        Ok(planner
            .materialize(ctx, &plan, &rows, true)?
            .into_iter()
            .next())
    }

    /// Replace every stored attribute of a record with the stored values
    pub async fn reload(&mut self, ctx: &mut RecordContext, handle: RecordHandle) -> Result<()> {
        self.load(ctx, handle, true).await?;
        ctx.mark_clean(handle);
        Ok(())
    }

    /// Fill in stored attributes that are not present on a record
    pub async fn load_missing(&mut self, ctx: &mut RecordContext, handle: RecordHandle) -> Result<()> {
        self.load(ctx, handle, false).await
    }

    async fn load(&mut self, ctx: &mut RecordContext, handle: RecordHandle, overwrite: bool) -> Result<()> {
        let record = ctx.require(handle)?;
        let type_name = record.type_name().to_string();
        let id = record.id().ok_or_else(|| {
            EngineError::invariant(format!("'{}' record has not been stored", type_name))
        })?;

        let engine = self.engine;
        let planner = engine.planner();
        let plan = planner.by_id(&type_name, id)?;
        let rows = self.fetch(ctx, &plan).await?;
        if rows.is_empty() {
            return Err(EngineError::record_not_found(format!("{}#{}", type_name, id)));
        }
        planner.materialize(ctx, &plan, &rows, overwrite)?;
        Ok(())
    }

    /// Read the children of an inverse attribute and store them on the record
    pub async fn load_inverse(
        &mut self,
        ctx: &mut RecordContext,
        handle: RecordHandle,
        attribute: &str,
    ) -> Result<RecordList> {
        let record = ctx.require(handle)?;
        let type_name = record.type_name().to_string();
        let engine = self.engine;
        let definition = engine.schema.require_attribute(&type_name, attribute)?;
        let AttributeKind::Inverse {
            holder,
            referenced_attribute,
        } = &definition.kind
        else {
            return Err(EngineError::invalid_value(format!(
                "'{}.{}' is not an inverse attribute",
                type_name, attribute
            )));
        };
        if record.id().is_none() {
            ctx.set_loaded_attribute(handle, attribute, RecordList::new().into())?;
            return Ok(RecordList::new());
        }

        let planner = engine.planner();
        let plan = planner.children(ctx, holder, referenced_attribute, handle)?;
        let rows = self.fetch(ctx, &plan).await?;
        let mut children = RecordList::new();
        for row in &rows {
            let (child_type, child_id) = planner.row_key(&plan, row)?;
            children.push(ctx.reference(&child_type, child_id));
        }
        ctx.set_loaded_attribute(handle, attribute, children.clone().into())?;
        Ok(children)
    }
}
