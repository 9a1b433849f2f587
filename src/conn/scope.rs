//! Per-call connection ownership.
//!
//! A `ConnectionScope` resolves, for exactly one engine call, whether to
//! operate inside an ambient transaction or to own a borrowed connection
//! outright, and it guarantees the borrow is returned exactly once on every
//! exit path. Ambient connections are never returned here; their commit
//! boundary and release belong to the ambient owner.

use crate::conn::{Connection, ConnectionProvider, SharedConnection, TransactionContext};
use crate::error::{DbError, DbResult};
use std::sync::Arc;
use tracing::warn;

enum ScopeConn {
    /// Borrowed from the provider for this call. `None` once released.
    Owned(Option<Box<dyn Connection>>),
    /// Shared with an enclosing transaction owner.
    Ambient(SharedConnection),
}

/// Exclusive holder of one leased connection for the duration of a call.
pub struct ConnectionScope {
    dbms: String,
    conn: ScopeConn,
    provider: Arc<dyn ConnectionProvider>,
    released: bool,
}

impl ConnectionScope {
    /// Resolve ambient-or-owned for one call against `dbms`.
    ///
    /// If the transaction context reports an active ambient transaction the
    /// scope wraps its shared connection and never alters its commit
    /// boundary; otherwise a fresh connection is borrowed from the provider.
    pub async fn acquire(
        provider: Arc<dyn ConnectionProvider>,
        tx_context: &dyn TransactionContext,
        dbms: &str,
    ) -> DbResult<Self> {
        let conn = if tx_context.is_ambient_active(dbms).await {
            ScopeConn::Ambient(tx_context.ambient_connection(dbms).await?)
        } else {
            ScopeConn::Owned(Some(provider.lend(dbms).await?))
        };
        Ok(Self {
            dbms: dbms.to_string(),
            conn,
            provider,
            released: false,
        })
    }

    /// Borrow a fresh owned connection, bypassing ambient resolution.
    ///
    /// Used for retry attempts, which always run on their own connection.
    pub async fn acquire_owned(
        provider: Arc<dyn ConnectionProvider>,
        dbms: &str,
    ) -> DbResult<Self> {
        let conn = provider.lend(dbms).await?;
        Ok(Self {
            dbms: dbms.to_string(),
            conn: ScopeConn::Owned(Some(conn)),
            provider,
            released: false,
        })
    }

    /// True if an enclosing transaction owns the underlying connection.
    pub fn is_ambient(&self) -> bool {
        matches!(self.conn, ScopeConn::Ambient(_))
    }

    /// Datastore identity this scope was acquired against.
    pub fn dbms(&self) -> &str {
        &self.dbms
    }

    /// Exclusive access to the underlying connection.
    ///
    /// For ambient scopes this waits for the shared connection's lock.
    pub async fn connection(&mut self) -> DbResult<ConnectionGuard<'_>> {
        match &mut self.conn {
            ScopeConn::Owned(conn) => match conn {
                Some(c) => Ok(ConnectionGuard(GuardInner::Owned(c.as_mut()))),
                None => Err(DbError::internal("connection scope already released")),
            },
            ScopeConn::Ambient(shared) => {
                Ok(ConnectionGuard(GuardInner::Ambient(shared.lock().await)))
            }
        }
    }

    /// Release the scope. Owned connections go back to the provider;
    /// ambient connections are left untouched. Idempotent.
    pub async fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let ScopeConn::Owned(conn) = &mut self.conn {
            if let Some(conn) = conn.take() {
                self.provider.reclaim(&self.dbms, conn).await;
            }
        }
    }
}

impl Drop for ConnectionScope {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        // Backstop for panic or early-return paths that skipped release().
        // The reclaim is async, so hand it to the runtime. A scope dropped
        // after runtime shutdown has no runtime to hand it to; the borrow is
        // then dropped in place rather than panicking in Drop.
        if let ScopeConn::Owned(conn) = &mut self.conn {
            if let Some(conn) = conn.take() {
                let dbms = self.dbms.clone();
                match tokio::runtime::Handle::try_current() {
                    Ok(handle) => {
                        let provider = Arc::clone(&self.provider);
                        handle.spawn(async move {
                            provider.reclaim(&dbms, conn).await;
                            warn!(
                                dbms = %dbms,
                                "Connection released via Drop - consider using explicit release()"
                            );
                        });
                    }
                    Err(_) => {
                        drop(conn);
                        warn!(
                            dbms = %dbms,
                            "Connection scope dropped outside a runtime, borrow not reclaimed"
                        );
                    }
                }
            }
        }
    }
}

enum GuardInner<'a> {
    Owned(&'a mut (dyn Connection + 'static)),
    Ambient(tokio::sync::MutexGuard<'a, Box<dyn Connection>>),
}

/// Exclusive borrow of a scope's connection.
pub struct ConnectionGuard<'a>(GuardInner<'a>);

impl std::ops::Deref for ConnectionGuard<'_> {
    type Target = dyn Connection;

    fn deref(&self) -> &Self::Target {
        match &self.0 {
            GuardInner::Owned(c) => &**c,
            GuardInner::Ambient(g) => &***g,
        }
    }
}

impl std::ops::DerefMut for ConnectionGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match &mut self.0 {
            GuardInner::Owned(c) => &mut **c,
            GuardInner::Ambient(g) => &mut ***g,
        }
    }
}
