//! Streaming read queries.
//!
//! A query runs on a forward-only, read-only cursor and comes back as a
//! [`RowStream`]: a lazy, finite, non-restartable sequence that pulls one
//! row at a time and applies the caller's row mapper in result-set order.
//! Closing the stream - by full consumption, explicit `close()`, or a mapper
//! failure - releases the cursor and the connection exactly once. Outside an
//! ambient transaction the read runs in its own no-op transaction, committed
//! when the cursor is done.

use crate::conn::{ConnectionProvider, ConnectionScope, RowCursor, TransactionContext};
use crate::error::{DbError, DbResult};
use crate::value::{ParamValue, Row};
use std::sync::Arc;
use tracing::{debug, warn};

/// Advice on how a consumer may partition a row stream across workers.
///
/// The executor itself never parallelizes fetching from a single cursor;
/// this is a hint carried on the stream handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParallelStrategy {
    /// Consume on the calling task.
    #[default]
    Sequential,
    /// Hand off chunks of this many rows to parallel workers.
    Chunked(usize),
}

type Mapper<T> = Box<dyn Fn(&Row) -> DbResult<T> + Send + Sync>;

/// Lazy, ordered sequence of mapped rows.
pub struct RowStream<T> {
    cursor: Option<Box<dyn RowCursor>>,
    scope: Option<ConnectionScope>,
    mapper: Mapper<T>,
    strategy: ParallelStrategy,
    /// Rows yielded so far, for mapper-failure diagnostics.
    position: u64,
    finished: bool,
}

impl<T> std::fmt::Debug for RowStream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowStream")
            .field("strategy", &self.strategy)
            .field("position", &self.position)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl<T> RowStream<T> {
    fn new(
        cursor: Box<dyn RowCursor>,
        scope: ConnectionScope,
        mapper: Mapper<T>,
        strategy: ParallelStrategy,
    ) -> Self {
        Self {
            cursor: Some(cursor),
            scope: Some(scope),
            mapper,
            strategy,
            position: 0,
            finished: false,
        }
    }

    /// The split hint this stream was opened with.
    pub fn strategy(&self) -> ParallelStrategy {
        self.strategy
    }

    /// Pull the next mapped row.
    ///
    /// Returns `None` once the result set is exhausted; the cursor and
    /// connection are released before `None` is returned. Any error also
    /// tears the stream down, so at most one `Some(Err(_))` is yielded.
    pub async fn next(&mut self) -> Option<DbResult<T>> {
        if self.finished {
            return None;
        }
        let cursor = self.cursor.as_mut()?;
        match cursor.next_row().await {
            Ok(Some(row)) => match (self.mapper)(&row) {
                Ok(value) => {
                    self.position += 1;
                    Some(Ok(value))
                }
                Err(err) => {
                    let index = self.position;
                    self.close().await;
                    Some(Err(DbError::row_mapping(index, err.to_string())))
                }
            },
            Ok(None) => {
                self.close().await;
                None
            }
            Err(err) => {
                self.close().await;
                Some(Err(err))
            }
        }
    }

    /// Consume the remaining rows into a vector.
    pub async fn collect(mut self) -> DbResult<Vec<T>> {
        let mut out = Vec::new();
        while let Some(row) = self.next().await {
            out.push(row?);
        }
        Ok(out)
    }

    /// Release the cursor and the connection. Idempotent; called
    /// automatically on exhaustion and on stream errors.
    pub async fn close(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;

        if let Some(mut cursor) = self.cursor.take() {
            if let Err(err) = cursor.close().await {
                warn!(error = %err, "Failed to close row cursor");
            }
        }
        if let Some(mut scope) = self.scope.take() {
            if !scope.is_ambient() {
                // End the no-op read transaction opened at query time.
                match scope.connection().await {
                    Ok(mut conn) => {
                        if let Err(err) = conn.commit().await {
                            warn!(error = %err, "Failed to commit read transaction");
                        }
                    }
                    Err(err) => warn!(error = %err, "Failed to reach connection on close"),
                }
            }
            scope.release().await;
        }
    }
}

/// Executes read queries and exposes results as lazy row streams.
#[derive(Clone)]
pub struct StreamingQueryExecutor {
    provider: Arc<dyn ConnectionProvider>,
}

impl StreamingQueryExecutor {
    pub fn new(provider: Arc<dyn ConnectionProvider>) -> Self {
        Self { provider }
    }

    /// Open a cursor for `sql` and return the mapped row stream.
    pub async fn run_query<T, F>(
        &self,
        tx_context: &dyn TransactionContext,
        dbms: &str,
        sql: &str,
        params: Vec<ParamValue>,
        mapper: F,
        strategy: ParallelStrategy,
    ) -> DbResult<RowStream<T>>
    where
        F: Fn(&Row) -> DbResult<T> + Send + Sync + 'static,
    {
        let mut scope =
            ConnectionScope::acquire(Arc::clone(&self.provider), tx_context, dbms).await?;
        let ambient = scope.is_ambient();

        debug!(
            dbms = %dbms,
            sql = %sql,
            params = params.len(),
            ambient = ambient,
            "Executing query"
        );

        let opened = self.open_cursor(&mut scope, ambient, sql, &params).await;
        match opened {
            Ok(cursor) => Ok(RowStream::new(
                cursor,
                scope,
                Box::new(mapper),
                strategy,
            )),
            Err(err) => {
                // Cursor never opened; end the read transaction if we
                // started one and give the connection back.
                if !ambient {
                    if let Ok(mut conn) = scope.connection().await {
                        if let Err(commit_err) = conn.commit().await {
                            warn!(error = %commit_err, "Failed to commit after query error");
                        }
                    }
                }
                scope.release().await;
                Err(err.with_statement(sql))
            }
        }
    }

    async fn open_cursor(
        &self,
        scope: &mut ConnectionScope,
        ambient: bool,
        sql: &str,
        params: &[ParamValue],
    ) -> DbResult<Box<dyn RowCursor>> {
        let mut conn = scope.connection().await?;
        if !ambient {
            conn.set_auto_commit(false).await?;
        }
        conn.query(sql, params).await
    }
}
