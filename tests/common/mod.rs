//! Scripted in-memory connection stack for exercising the engine without a
//! database. Failures are queued ahead of time and consumed in order, and
//! every pool/transaction interaction is counted.

#![allow(dead_code)]

use async_trait::async_trait;
use dbexec::conn::{
    Connection, ConnectionProvider, ExecResult, KeyReturn, RowCursor, SharedConnection,
    TransactionContext,
};
use dbexec::error::{DbError, DbResult};
use dbexec::value::{ParamValue, Row};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Shared observable state for one mock pool.
pub struct MockState {
    pub borrows: AtomicUsize,
    pub returns: AtomicUsize,
    pub commits: AtomicUsize,
    pub rollbacks: AtomicUsize,
    pub executes: AtomicUsize,
    pub cursor_closes: AtomicUsize,
    execute_failures: Mutex<VecDeque<Option<DbError>>>,
    rollback_failures: Mutex<VecDeque<DbError>>,
    next_key: AtomicI64,
    /// SQL of statements whose transaction has committed.
    pub committed: Mutex<Vec<String>>,
    query_rows: Mutex<Vec<Row>>,
}

impl MockState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            borrows: AtomicUsize::new(0),
            returns: AtomicUsize::new(0),
            commits: AtomicUsize::new(0),
            rollbacks: AtomicUsize::new(0),
            executes: AtomicUsize::new(0),
            cursor_closes: AtomicUsize::new(0),
            execute_failures: Mutex::new(VecDeque::new()),
            rollback_failures: Mutex::new(VecDeque::new()),
            next_key: AtomicI64::new(1),
            committed: Mutex::new(Vec::new()),
            query_rows: Mutex::new(Vec::new()),
        })
    }

    /// Queue an error for an upcoming execute call. The queue is consumed
    /// first-in first-out, one entry per call; an exhausted queue means
    /// success.
    pub fn fail_execute(&self, err: DbError) {
        self.execute_failures.lock().unwrap().push_back(Some(err));
    }

    /// Queue one successful execute call ahead of any queued failure.
    pub fn pass_execute(&self) {
        self.execute_failures.lock().unwrap().push_back(None);
    }

    /// Queue an error for an upcoming rollback call.
    pub fn fail_rollback(&self, err: DbError) {
        self.rollback_failures.lock().unwrap().push_back(err);
    }

    /// Preset the rows every query returns.
    pub fn set_query_rows(&self, rows: Vec<Row>) {
        *self.query_rows.lock().unwrap() = rows;
    }

    pub fn borrows(&self) -> usize {
        self.borrows.load(Ordering::SeqCst)
    }

    pub fn returns(&self) -> usize {
        self.returns.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> usize {
        self.rollbacks.load(Ordering::SeqCst)
    }

    pub fn executes(&self) -> usize {
        self.executes.load(Ordering::SeqCst)
    }

    pub fn cursor_closes(&self) -> usize {
        self.cursor_closes.load(Ordering::SeqCst)
    }

    pub fn committed_sql(&self) -> Vec<String> {
        self.committed.lock().unwrap().clone()
    }
}

/// Connection that stages writes until commit and replays queued failures.
pub struct MockConnection {
    state: Arc<MockState>,
    staged: Vec<String>,
}

impl MockConnection {
    pub fn new(state: Arc<MockState>) -> Self {
        Self {
            state,
            staged: Vec::new(),
        }
    }
}

#[async_trait]
impl Connection for MockConnection {
    async fn set_auto_commit(&mut self, _enabled: bool) -> DbResult<()> {
        Ok(())
    }

    async fn commit(&mut self) -> DbResult<()> {
        self.state.commits.fetch_add(1, Ordering::SeqCst);
        self.state
            .committed
            .lock()
            .unwrap()
            .append(&mut self.staged);
        Ok(())
    }

    async fn rollback(&mut self) -> DbResult<()> {
        self.state.rollbacks.fetch_add(1, Ordering::SeqCst);
        self.staged.clear();
        if let Some(err) = self.state.rollback_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        Ok(())
    }

    async fn execute(
        &mut self,
        sql: &str,
        _params: &[ParamValue],
        keys: KeyReturn,
    ) -> DbResult<ExecResult> {
        self.state.executes.fetch_add(1, Ordering::SeqCst);
        if let Some(Some(err)) = self.state.execute_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        self.staged.push(sql.to_string());
        let generated_keys = match keys {
            KeyReturn::Generated => {
                vec![self.state.next_key.fetch_add(1, Ordering::SeqCst)]
            }
            KeyReturn::None => Vec::new(),
        };
        Ok(ExecResult {
            rows_affected: 1,
            generated_keys,
        })
    }

    async fn query(&mut self, _sql: &str, _params: &[ParamValue]) -> DbResult<Box<dyn RowCursor>> {
        if let Some(Some(err)) = self.state.execute_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        let rows = self.state.query_rows.lock().unwrap().clone();
        Ok(Box::new(MockCursor {
            state: Arc::clone(&self.state),
            rows: rows.into(),
            closed: false,
        }))
    }
}

pub struct MockCursor {
    state: Arc<MockState>,
    rows: VecDeque<Row>,
    closed: bool,
}

#[async_trait]
impl RowCursor for MockCursor {
    async fn next_row(&mut self) -> DbResult<Option<Row>> {
        if self.closed {
            return Ok(None);
        }
        Ok(self.rows.pop_front())
    }

    async fn close(&mut self) -> DbResult<()> {
        if !self.closed {
            self.closed = true;
            self.state.cursor_closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Provider lending fresh mock connections over one shared state.
pub struct MockProvider {
    pub state: Arc<MockState>,
}

impl MockProvider {
    pub fn new(state: Arc<MockState>) -> Self {
        Self { state }
    }
}

#[async_trait]
impl ConnectionProvider for MockProvider {
    async fn lend(&self, _dbms: &str) -> DbResult<Box<dyn Connection>> {
        self.state.borrows.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockConnection::new(Arc::clone(&self.state))))
    }

    async fn reclaim(&self, _dbms: &str, _conn: Box<dyn Connection>) {
        self.state.returns.fetch_add(1, Ordering::SeqCst);
    }
}

/// Transaction context reporting one ambient transaction for one datastore.
pub struct AmbientContext {
    dbms: String,
    conn: SharedConnection,
}

impl AmbientContext {
    pub fn new(dbms: impl Into<String>, conn: SharedConnection) -> Self {
        Self {
            dbms: dbms.into(),
            conn,
        }
    }
}

#[async_trait]
impl TransactionContext for AmbientContext {
    async fn is_ambient_active(&self, dbms: &str) -> bool {
        self.dbms == dbms
    }

    async fn ambient_connection(&self, dbms: &str) -> DbResult<SharedConnection> {
        if self.dbms != dbms {
            return Err(DbError::internal(format!(
                "no ambient transaction exists for '{}'",
                dbms
            )));
        }
        Ok(Arc::clone(&self.conn))
    }
}

/// Wrap a mock connection for ambient sharing.
pub fn shared_connection(state: &Arc<MockState>) -> SharedConnection {
    let conn: Box<dyn Connection> = Box::new(MockConnection::new(Arc::clone(state)));
    Arc::new(tokio::sync::Mutex::new(conn))
}

pub fn transient_reset() -> DbError {
    DbError::database("connection reset by peer", Some("08S01".to_string()))
}

pub fn transient_deadlock() -> DbError {
    DbError::database("deadlock victim", Some("40001".to_string()))
}

pub fn fatal_duplicate() -> DbError {
    DbError::database("duplicate key value", Some("23505".to_string()))
}

/// Build a one-column row.
pub fn id_row(id: i64) -> Row {
    Row::new(vec!["id".to_string()].into(), vec![json!(id)])
}
