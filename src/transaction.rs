//! Ordered statement batches with commit hooks

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::query::{Insert, Query};
use crate::record::{RecordContext, RecordHandle};
use crate::runner::QueryRunner;
use crate::sql::{Renderer, SqlDialect, Statement};

/// Callback run against the record context around a commit
pub type TransactionHook = Box<dyn FnOnce(&mut RecordContext) + Send>;

/// An ordered list of statements executed atomically
///
/// Statements are rendered one by one while the transaction runs, so an id
/// generated by an earlier insert is visible to every later statement.
pub struct Transaction {
    renderer: Renderer,
    steps: Vec<Query>,
    before_commit: Vec<TransactionHook>,
    after_commit: Vec<TransactionHook>,
    after_rollback: Vec<TransactionHook>,
    /// Records that received a generated id during the current attempt
    assigned: Vec<RecordHandle>,
}

impl Transaction {
    pub fn new(dialect: SqlDialect) -> Self {
        Self {
            renderer: Renderer::new(dialect),
            steps: Vec::new(),
            before_commit: Vec::new(),
            after_commit: Vec::new(),
            after_rollback: Vec::new(),
            assigned: Vec::new(),
        }
    }

    pub fn push(&mut self, step: Query) {
        self.steps.push(step);
    }

    pub fn extend(&mut self, steps: impl IntoIterator<Item = Query>) {
        self.steps.extend(steps);
    }

    pub fn steps(&self) -> &[Query] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn before_commit(&mut self, hook: impl FnOnce(&mut RecordContext) + Send + 'static) {
        self.before_commit.push(Box::new(hook));
    }

    pub fn after_commit(&mut self, hook: impl FnOnce(&mut RecordContext) + Send + 'static) {
        self.after_commit.push(Box::new(hook));
    }

    pub fn after_rollback(&mut self, hook: impl FnOnce(&mut RecordContext) + Send + 'static) {
        self.after_rollback.push(Box::new(hook));
    }

    /// Render every step without executing, e.g. for logging or inspection
    ///
    /// Ids not yet generated render as in [`Renderer::render`].
    pub fn render_all(&self, ctx: &RecordContext) -> Result<Vec<Statement>> {
        self.steps
            .iter()
            .map(|step| self.renderer.render(step, ctx))
            .collect()
    }

    /// Execute all steps inside one database transaction
    ///
    /// Before-commit hooks run first. Generated keys are assigned to their
    /// records as the inserts execute. On success the after-commit hooks run;
    /// on failure the runner is rolled back, ids assigned during this attempt
    /// are cleared again and the after-rollback hooks run in registration order.
    pub async fn commit<R: QueryRunner>(
        mut self,
        runner: &mut R,
        ctx: &mut RecordContext,
    ) -> Result<()> {
        for hook in self.before_commit.drain(..) {
            hook(ctx);
        }

        let result = match runner.begin().await {
            Ok(()) => match self.execute(runner, ctx).await {
                Ok(()) => runner.commit().await,
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                info!(steps = self.steps.len(), "Transaction committed");
                for hook in self.after_commit {
                    hook(ctx);
                }
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Transaction failed, rolling back");
                if let Err(rollback_error) = runner.rollback().await {
                    warn!(error = %rollback_error, "Rollback failed");
                }
                for record in self.assigned.drain(..) {
                    ctx.clear_id(record);
                }
                for hook in self.after_rollback {
                    hook(ctx);
                }
                Err(e)
            }
        }
    }

    async fn execute<R: QueryRunner>(&mut self, runner: &mut R, ctx: &mut RecordContext) -> Result<()> {
        let streaming = runner.supports_streaming();
        for (index, step) in self.steps.iter().enumerate() {
            let mut statement = self.renderer.render(step, ctx)?;
            if !streaming {
                statement = statement.without_streams();
            }
            debug!(step = index, sql = %statement.sql, "Executing statement");

            match step {
                Query::Insert(Insert {
                    generated_key: Some(key),
                    ..
                }) => {
                    let id = runner.number(&statement).await?;
                    ctx.assign_id(key.record, id)?;
                    self.assigned.push(key.record);
                }
                _ => {
                    runner.run(&statement).await?;
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("steps", &self.steps)
            .field("before_commit", &self.before_commit.len())
            .field("after_commit", &self.after_commit.len())
            .field("after_rollback", &self.after_rollback.len())
            .finish()
    }
}
