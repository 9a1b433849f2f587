//! Connection abstraction layer.
//!
//! The engine talks to the datastore only through the traits in this
//! module. `ConnectionProvider` lends pooled physical connections per
//! datastore identity; `TransactionContext` answers whether the calling
//! logical unit already owns an ambient transaction and, if so, supplies its
//! shared connection. `ConnectionScope` resolves, for one call, which of the
//! two applies and guarantees the connection is released on every exit path.

pub mod scope;

pub use scope::{ConnectionGuard, ConnectionScope};

use crate::error::DbResult;
use crate::value::{ParamValue, Row};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Whether a statement execution should surface driver-generated keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyReturn {
    /// No generated keys requested (update/delete).
    None,
    /// Return the keys the driver reports for inserted rows, in result order.
    Generated,
}

/// Result of executing one mutating statement.
#[derive(Debug, Clone, Default)]
pub struct ExecResult {
    pub rows_affected: u64,
    /// Driver-reported generated keys, in result order. Empty unless
    /// [`KeyReturn::Generated`] was requested.
    pub generated_keys: Vec<i64>,
}

/// One physical database connection.
///
/// Auto-commit control follows the driver convention: `set_auto_commit(false)`
/// opens an explicit transaction on the connection, and `commit`/`rollback`
/// end it.
#[async_trait]
pub trait Connection: Send {
    async fn set_auto_commit(&mut self, enabled: bool) -> DbResult<()>;

    async fn commit(&mut self) -> DbResult<()>;

    async fn rollback(&mut self) -> DbResult<()>;

    /// Bind `params` positionally (in list order) and execute one mutating
    /// statement.
    async fn execute(
        &mut self,
        sql: &str,
        params: &[ParamValue],
        keys: KeyReturn,
    ) -> DbResult<ExecResult>;

    /// Bind `params` positionally and execute a read query on a
    /// forward-only, read-only cursor.
    async fn query(&mut self, sql: &str, params: &[ParamValue]) -> DbResult<Box<dyn RowCursor>>;
}

/// Forward-only cursor over a result set.
#[async_trait]
pub trait RowCursor: Send {
    /// Pull the next row, or `None` when the result set is exhausted.
    async fn next_row(&mut self) -> DbResult<Option<Row>>;

    /// Release the cursor. Idempotent.
    async fn close(&mut self) -> DbResult<()>;
}

/// A connection shared with an ambient transaction owner.
pub type SharedConnection = Arc<Mutex<Box<dyn Connection>>>;

/// Lends and reclaims pooled physical connections per datastore identity.
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    /// Borrow a connection for the named datastore.
    async fn lend(&self, dbms: &str) -> DbResult<Box<dyn Connection>>;

    /// Return a previously lent connection to the pool.
    async fn reclaim(&self, dbms: &str, conn: Box<dyn Connection>);
}

/// Answers whether the calling logical unit already owns an ambient
/// transaction for a datastore, and if so supplies its shared connection.
#[async_trait]
pub trait TransactionContext: Send + Sync {
    async fn is_ambient_active(&self, dbms: &str) -> bool;

    async fn ambient_connection(&self, dbms: &str) -> DbResult<SharedConnection>;
}

/// A `TransactionContext` with no ambient transactions, ever.
///
/// The right choice when callers do not span transactions across engine
/// calls.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAmbient;

#[async_trait]
impl TransactionContext for NoAmbient {
    async fn is_ambient_active(&self, _dbms: &str) -> bool {
        false
    }

    async fn ambient_connection(&self, dbms: &str) -> DbResult<SharedConnection> {
        Err(crate::error::DbError::internal(format!(
            "no ambient transaction exists for '{}'",
            dbms
        )))
    }
}
