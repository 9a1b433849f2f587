//! Single-statement execution.
//!
//! The executor binds parameters positionally and executes exactly one
//! statement against an open connection. Inserts capture driver-reported
//! generated keys through a pluggable [`GeneratedKeysHandler`]; the captured
//! keys are returned to the caller (the runner), never delivered here.

use crate::conn::{Connection, ExecResult, KeyReturn};
use crate::engine::statement::Statement;
use crate::error::DbResult;
use std::sync::Arc;
use tracing::debug;

/// Strategy for extracting generated keys from an execution result.
///
/// The default walks the driver-reported keys in result order; callers with
/// unusual key schemes (composite keys decoded from returned rows, say) can
/// substitute their own.
pub trait GeneratedKeysHandler: Send + Sync {
    fn extract(&self, result: &ExecResult, sink: &mut dyn FnMut(i64));
}

/// Default handler: every driver-reported key, in result order.
#[derive(Debug, Clone, Copy, Default)]
pub struct DriverKeysHandler;

impl GeneratedKeysHandler for DriverKeysHandler {
    fn extract(&self, result: &ExecResult, sink: &mut dyn FnMut(i64)) {
        for key in &result.generated_keys {
            sink(*key);
        }
    }
}

/// Binds and executes one statement at a time.
#[derive(Clone)]
pub struct StatementExecutor {
    keys_handler: Arc<dyn GeneratedKeysHandler>,
}

impl StatementExecutor {
    pub fn new() -> Self {
        Self {
            keys_handler: Arc::new(DriverKeysHandler),
        }
    }

    /// Use a custom generated-key extraction strategy.
    pub fn with_keys_handler(keys_handler: Arc<dyn GeneratedKeysHandler>) -> Self {
        Self { keys_handler }
    }

    /// Execute one statement; returns the generated keys captured for an
    /// insert (empty for update/delete).
    ///
    /// Failures carry the native error code and the failing statement text.
    pub async fn execute(
        &self,
        conn: &mut dyn Connection,
        statement: &Statement,
    ) -> DbResult<Vec<i64>> {
        match statement {
            Statement::Insert { sql, params, .. } => {
                debug!(
                    target: "dbexec::persist",
                    sql = %sql,
                    params = params.len(),
                    "Executing insert"
                );
                let result = conn
                    .execute(sql, params, KeyReturn::Generated)
                    .await
                    .map_err(|e| e.with_statement(sql))?;

                let mut keys = Vec::new();
                self.keys_handler.extract(&result, &mut |key| keys.push(key));
                Ok(keys)
            }
            Statement::Update { sql, params } => {
                debug!(
                    target: "dbexec::update",
                    sql = %sql,
                    params = params.len(),
                    "Executing update"
                );
                // Affected-row count is discarded
                conn.execute(sql, params, KeyReturn::None)
                    .await
                    .map_err(|e| e.with_statement(sql))?;
                Ok(Vec::new())
            }
            Statement::Delete { sql, params } => {
                debug!(
                    target: "dbexec::remove",
                    sql = %sql,
                    params = params.len(),
                    "Executing delete"
                );
                conn.execute(sql, params, KeyReturn::None)
                    .await
                    .map_err(|e| e.with_statement(sql))?;
                Ok(Vec::new())
            }
        }
    }
}

impl Default for StatementExecutor {
    fn default() -> Self {
        Self::new()
    }
}
