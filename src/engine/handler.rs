//! The public operation surface.
//!
//! `OperationHandler` ties the pieces together: writes go through the
//! transaction runner, reads through the streaming query executor. One
//! atomic `closed` flag guards every operation; once `close()` has been
//! called, calls fail fast without touching the pool or the network.

use crate::config::EngineConfig;
use crate::conn::{ConnectionProvider, TransactionContext};
use crate::engine::executor::{GeneratedKeysHandler, StatementExecutor};
use crate::engine::runner::TransactionRunner;
use crate::engine::statement::Statement;
use crate::engine::stream::{ParallelStrategy, RowStream, StreamingQueryExecutor};
use crate::error::{DbError, DbResult};
use crate::value::{ParamValue, Row};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

/// Thread-safe entry point for statement execution against named datastores.
pub struct OperationHandler {
    tx_context: Arc<dyn TransactionContext>,
    runner: TransactionRunner,
    queries: StreamingQueryExecutor,
    closed: AtomicBool,
}

impl OperationHandler {
    /// Build a handler with default settings and the driver-native
    /// generated-keys strategy.
    pub fn new(
        provider: Arc<dyn ConnectionProvider>,
        tx_context: Arc<dyn TransactionContext>,
    ) -> Self {
        Self::with_config(provider, tx_context, EngineConfig::default())
    }

    pub fn with_config(
        provider: Arc<dyn ConnectionProvider>,
        tx_context: Arc<dyn TransactionContext>,
        config: EngineConfig,
    ) -> Self {
        Self::build(provider, tx_context, config, StatementExecutor::new())
    }

    /// Substitute a custom generated-key extraction strategy.
    pub fn with_keys_handler(
        provider: Arc<dyn ConnectionProvider>,
        tx_context: Arc<dyn TransactionContext>,
        config: EngineConfig,
        keys_handler: Arc<dyn GeneratedKeysHandler>,
    ) -> Self {
        Self::build(
            provider,
            tx_context,
            config,
            StatementExecutor::with_keys_handler(keys_handler),
        )
    }

    fn build(
        provider: Arc<dyn ConnectionProvider>,
        tx_context: Arc<dyn TransactionContext>,
        config: EngineConfig,
        executor: StatementExecutor,
    ) -> Self {
        let budget = config.retry_budget_or_default();
        Self {
            tx_context,
            runner: TransactionRunner::new(Arc::clone(&provider), executor, budget),
            queries: StreamingQueryExecutor::new(provider),
            closed: AtomicBool::new(false),
        }
    }

    /// Execute a read query as a lazy row stream.
    pub async fn run_query<T, F>(
        &self,
        dbms: &str,
        sql: &str,
        params: Vec<ParamValue>,
        mapper: F,
    ) -> DbResult<RowStream<T>>
    where
        F: Fn(&Row) -> DbResult<T> + Send + Sync + 'static,
    {
        self.run_query_with_strategy(dbms, sql, params, mapper, ParallelStrategy::Sequential)
            .await
    }

    /// Execute a read query, attaching a parallel-split hint for consumers.
    pub async fn run_query_with_strategy<T, F>(
        &self,
        dbms: &str,
        sql: &str,
        params: Vec<ParamValue>,
        mapper: F,
        strategy: ParallelStrategy,
    ) -> DbResult<RowStream<T>>
    where
        F: Fn(&Row) -> DbResult<T> + Send + Sync + 'static,
    {
        self.assert_open()?;
        self.queries
            .run_query(&*self.tx_context, dbms, sql, params, mapper, strategy)
            .await
    }

    /// Execute an insert; `on_keys` fires with the generated keys after the
    /// owning commit has succeeded.
    pub async fn run_insert(
        &self,
        dbms: &str,
        sql: &str,
        params: Vec<ParamValue>,
        key_columns: Vec<String>,
        on_keys: impl Fn(&[i64]) + Send + Sync + 'static,
    ) -> DbResult<()> {
        self.assert_open()?;
        let statement = Statement::insert(sql, params, key_columns, on_keys);
        self.runner
            .run(&*self.tx_context, dbms, &[statement])
            .await?;
        Ok(())
    }

    /// Execute an update under commit/rollback/retry discipline.
    pub async fn run_update(
        &self,
        dbms: &str,
        sql: &str,
        params: Vec<ParamValue>,
    ) -> DbResult<()> {
        self.assert_open()?;
        let statement = Statement::update(sql, params);
        self.runner
            .run(&*self.tx_context, dbms, &[statement])
            .await?;
        Ok(())
    }

    /// Execute a delete under commit/rollback/retry discipline.
    pub async fn run_delete(
        &self,
        dbms: &str,
        sql: &str,
        params: Vec<ParamValue>,
    ) -> DbResult<()> {
        self.assert_open()?;
        let statement = Statement::delete(sql, params);
        self.runner
            .run(&*self.tx_context, dbms, &[statement])
            .await?;
        Ok(())
    }

    /// Execute a caller-assembled batch to a single durable outcome.
    pub async fn run_batch(&self, dbms: &str, batch: &[Statement]) -> DbResult<()> {
        self.assert_open()?;
        self.runner.run(&*self.tx_context, dbms, batch).await?;
        Ok(())
    }

    /// Shut the handler down. Idempotent; subsequent operations fail fast
    /// with [`DbError::Closed`].
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            info!("Operation handler closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn assert_open(&self) -> DbResult<()> {
        if self.is_closed() {
            return Err(DbError::Closed);
        }
        Ok(())
    }
}
