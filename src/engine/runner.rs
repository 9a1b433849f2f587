//! The retry/commit/rollback state machine.
//!
//! A runner invocation drives a batch of statements to a single durable
//! outcome: `ATTEMPTING -> {COMMITTED | RETRY -> ATTEMPTING | FAILED_FATAL |
//! FAILED_EXHAUSTED}`. Every attempt re-executes the entire batch from the
//! start on a freshly borrowed connection, so callers must supply
//! retry-safe statements. Generated-key callbacks fire only with the keys
//! captured during the attempt that actually committed.

use crate::conn::{ConnectionProvider, ConnectionScope, TransactionContext};
use crate::engine::executor::StatementExecutor;
use crate::engine::retry::{ErrorClass, RetryState, classify_error};
use crate::engine::statement::Statement;
use crate::error::{DbError, DbResult};
use std::sync::Arc;
use tracing::{debug, error};

/// Terminal state of a runner invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Committed,
    FailedFatal,
    FailedExhausted,
}

/// Diagnostics for a completed invocation.
#[derive(Debug, Clone, Copy)]
pub struct RunReport {
    pub outcome: Outcome,
    /// Full-batch attempts made, including the successful one.
    pub attempts: u32,
    /// Retry budget left over after completion.
    pub budget_remaining: u32,
}

/// Generated keys captured during one attempt, by statement index.
type CapturedKeys = Vec<(usize, Vec<i64>)>;

/// Drives statement batches to a terminal outcome.
#[derive(Clone)]
pub struct TransactionRunner {
    provider: Arc<dyn ConnectionProvider>,
    executor: StatementExecutor,
    budget: u32,
}

impl TransactionRunner {
    pub fn new(provider: Arc<dyn ConnectionProvider>, executor: StatementExecutor, budget: u32) -> Self {
        Self {
            provider,
            executor,
            budget,
        }
    }

    /// Execute `batch` against `dbms` to a terminal outcome.
    ///
    /// Inside an ambient transaction the batch runs exactly once with no
    /// commit/rollback control; durability belongs to the ambient owner, and
    /// key callbacks fire as soon as local execution succeeds (the runner
    /// cannot observe the ambient commit point).
    pub async fn run(
        &self,
        tx_context: &dyn TransactionContext,
        dbms: &str,
        batch: &[Statement],
    ) -> DbResult<RunReport> {
        let scope =
            ConnectionScope::acquire(Arc::clone(&self.provider), tx_context, dbms).await?;
        if scope.is_ambient() {
            self.run_ambient(scope, batch).await
        } else {
            self.run_owned(scope, dbms, batch).await
        }
    }

    async fn run_owned(
        &self,
        mut scope: ConnectionScope,
        dbms: &str,
        batch: &[Statement],
    ) -> DbResult<RunReport> {
        let batch_id = format!("batch_{}", uuid::Uuid::new_v4().simple());
        let mut retry = RetryState::new(self.budget);
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            match self.attempt(&mut scope, batch, &mut retry).await {
                Ok(captured) => {
                    scope.release().await;
                    // Keys from this attempt only; discarded attempts never
                    // reach the callbacks.
                    deliver_generated_keys(batch, &captured);
                    debug!(
                        batch_id = %batch_id,
                        dbms = %dbms,
                        attempts = attempts,
                        outcome = ?Outcome::Committed,
                        "Batch committed"
                    );
                    return Ok(RunReport {
                        outcome: Outcome::Committed,
                        attempts,
                        budget_remaining: retry.budget(),
                    });
                }
                Err(err) => {
                    let class = classify_error(&err);
                    let rollback_result = match scope.connection().await {
                        Ok(mut conn) => conn.rollback().await,
                        Err(e) => Err(e),
                    };

                    if attempts > 1 {
                        error!(
                            target: "dbexec::retry",
                            batch_id = %batch_id,
                            batch = ?batch,
                            last_statement = ?retry.last_statement(),
                            error = %err,
                            "Batch attempt failed"
                        );
                    }

                    match class {
                        ErrorClass::Fatal => {
                            if let Err(rb) = rollback_result {
                                error!(batch_id = %batch_id, error = %rb, "Rollback error after fatal failure");
                            }
                            scope.release().await;
                            debug!(
                                batch_id = %batch_id,
                                dbms = %dbms,
                                outcome = ?Outcome::FailedFatal,
                                "Batch failed"
                            );
                            return Err(err);
                        }
                        ErrorClass::Transient => {
                            if let Err(rb) = rollback_result {
                                // A failed rollback after a transient error is
                                // serious: stop retrying and surface it instead
                                // of the original error.
                                error!(batch_id = %batch_id, error = %rb, "Rollback error, aborting retries");
                                retry.exhaust();
                                scope.release().await;
                                return Err(as_rollback_failure(rb));
                            }
                            retry.consume();
                            scope.release().await;
                            if retry.is_exhausted() {
                                error!(
                                    target: "dbexec::retry",
                                    batch_id = %batch_id,
                                    dbms = %dbms,
                                    attempts = attempts,
                                    outcome = ?Outcome::FailedExhausted,
                                    "Retry budget exhausted"
                                );
                                return Err(err);
                            }
                            scope = ConnectionScope::acquire_owned(
                                Arc::clone(&self.provider),
                                dbms,
                            )
                            .await?;
                        }
                    }
                }
            }
        }
    }

    /// One full-batch attempt: disable auto-commit, execute every statement
    /// in caller order, commit. Captured keys belong to this attempt alone.
    async fn attempt(
        &self,
        scope: &mut ConnectionScope,
        batch: &[Statement],
        retry: &mut RetryState,
    ) -> DbResult<CapturedKeys> {
        let mut conn = scope.connection().await?;
        conn.set_auto_commit(false).await?;

        let mut captured = CapturedKeys::new();
        for (index, statement) in batch.iter().enumerate() {
            retry.note_statement(statement.sql());
            let keys = self.executor.execute(&mut *conn, statement).await?;
            if matches!(statement, Statement::Insert { .. }) {
                captured.push((index, keys));
            }
        }
        conn.commit().await?;
        Ok(captured)
    }

    async fn run_ambient(
        &self,
        mut scope: ConnectionScope,
        batch: &[Statement],
    ) -> DbResult<RunReport> {
        let mut retry = RetryState::new(self.budget);
        let result = self.execute_batch(&mut scope, batch, &mut retry).await;
        scope.release().await;
        let captured = result?;
        deliver_generated_keys(batch, &captured);
        Ok(RunReport {
            outcome: Outcome::Committed,
            attempts: 1,
            budget_remaining: retry.budget(),
        })
    }

    /// Execute every statement in order without touching the commit boundary.
    async fn execute_batch(
        &self,
        scope: &mut ConnectionScope,
        batch: &[Statement],
        retry: &mut RetryState,
    ) -> DbResult<CapturedKeys> {
        let mut conn = scope.connection().await?;
        let mut captured = CapturedKeys::new();
        for (index, statement) in batch.iter().enumerate() {
            retry.note_statement(statement.sql());
            let keys = self.executor.execute(&mut *conn, statement).await?;
            if matches!(statement, Statement::Insert { .. }) {
                captured.push((index, keys));
            }
        }
        Ok(captured)
    }
}

/// Invoke each insert's completion callback, in original statement order.
fn deliver_generated_keys(batch: &[Statement], captured: &CapturedKeys) {
    for (index, statement) in batch.iter().enumerate() {
        if let Statement::Insert { on_keys, .. } = statement {
            let keys = captured
                .iter()
                .find(|(i, _)| *i == index)
                .map(|(_, keys)| keys.as_slice())
                .unwrap_or(&[]);
            on_keys(keys);
        }
    }
}

fn as_rollback_failure(err: DbError) -> DbError {
    match err {
        DbError::Database {
            message, sql_state, ..
        } => DbError::rollback(message, sql_state),
        other => other,
    }
}
