//! sqlx-backed implementation of the connection traits.
//!
//! Uses database-specific pools (MySqlPool, PgPool, SqlitePool) to ensure
//! full type support. Each lent connection tracks its own transaction state
//! so auto-commit toggling maps onto explicit BEGIN/COMMIT/ROLLBACK.

mod decode;
mod params;

pub use decode::{TypeCategory, categorize_type, decode_binary_value};

use crate::config::PoolSettings;
use crate::conn::{Connection, ConnectionProvider, ExecResult, KeyReturn, RowCursor};
use crate::error::{DbError, DbResult};
use crate::value::{ParamValue, Row};
use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::{
    Executor, MySql, MySqlPool, PgPool, Postgres, Sqlite, SqlitePool,
    mysql::MySqlConnectOptions, mysql::MySqlPoolOptions, postgres::PgPoolOptions,
    sqlite::SqliteConnectOptions, sqlite::SqlitePoolOptions,
};
use std::collections::{HashMap, VecDeque};
use std::str::FromStr;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Supported database engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseKind {
    MySql,
    Postgres,
    SQLite,
}

impl std::fmt::Display for DatabaseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatabaseKind::MySql => write!(f, "mysql"),
            DatabaseKind::Postgres => write!(f, "postgresql"),
            DatabaseKind::SQLite => write!(f, "sqlite"),
        }
    }
}

/// Database-specific connection pool (avoids AnyPool limitations).
#[derive(Debug, Clone)]
pub enum SqlxPool {
    MySql(MySqlPool),
    Postgres(PgPool),
    SQLite(SqlitePool),
}

impl SqlxPool {
    /// Connect a pool for the given database kind.
    pub async fn connect(kind: DatabaseKind, url: &str, settings: &PoolSettings) -> DbResult<Self> {
        let is_sqlite = kind == DatabaseKind::SQLite;
        let acquire_timeout = settings.acquire_timeout_or_default();
        let idle_timeout = Some(settings.idle_timeout_or_default());

        match kind {
            DatabaseKind::MySql => {
                let options = MySqlConnectOptions::from_str(url)
                    .map_err(|e| {
                        DbError::connection(format!("invalid MySQL connection string: {}", e))
                    })?
                    .charset("utf8mb4");

                let pool = MySqlPoolOptions::new()
                    .min_connections(settings.min_connections_or_default())
                    .max_connections(settings.max_connections_or_default(is_sqlite))
                    .acquire_timeout(acquire_timeout)
                    .idle_timeout(idle_timeout)
                    .connect_with(options)
                    .await
                    .map_err(|e| DbError::connection(format!("failed to connect: {}", e)))?;
                Ok(SqlxPool::MySql(pool))
            }
            DatabaseKind::Postgres => {
                let pool = PgPoolOptions::new()
                    .min_connections(settings.min_connections_or_default())
                    .max_connections(settings.max_connections_or_default(is_sqlite))
                    .acquire_timeout(acquire_timeout)
                    .idle_timeout(idle_timeout)
                    .connect(url)
                    .await
                    .map_err(|e| DbError::connection(format!("failed to connect: {}", e)))?;
                Ok(SqlxPool::Postgres(pool))
            }
            DatabaseKind::SQLite => {
                let options = SqliteConnectOptions::from_str(url)
                    .map_err(|e| {
                        DbError::connection(format!("invalid SQLite connection string: {}", e))
                    })?
                    .create_if_missing(true);

                let pool = SqlitePoolOptions::new()
                    .min_connections(settings.min_connections_or_default())
                    .max_connections(settings.max_connections_or_default(is_sqlite))
                    .acquire_timeout(acquire_timeout)
                    .idle_timeout(idle_timeout)
                    .connect_with(options)
                    .await
                    .map_err(|e| DbError::connection(format!("failed to connect: {}", e)))?;
                Ok(SqlxPool::SQLite(pool))
            }
        }
    }

    /// Get the database kind for this pool.
    pub fn kind(&self) -> DatabaseKind {
        match self {
            SqlxPool::MySql(_) => DatabaseKind::MySql,
            SqlxPool::Postgres(_) => DatabaseKind::Postgres,
            SqlxPool::SQLite(_) => DatabaseKind::SQLite,
        }
    }

    /// Close the connection pool.
    pub async fn close(&self) {
        match self {
            SqlxPool::MySql(pool) => pool.close().await,
            SqlxPool::Postgres(pool) => pool.close().await,
            SqlxPool::SQLite(pool) => pool.close().await,
        }
    }

    async fn acquire(&self) -> DbResult<SqlxConn> {
        match self {
            SqlxPool::MySql(pool) => Ok(SqlxConn::MySql(pool.acquire().await?)),
            SqlxPool::Postgres(pool) => Ok(SqlxConn::Postgres(pool.acquire().await?)),
            SqlxPool::SQLite(pool) => Ok(SqlxConn::SQLite(pool.acquire().await?)),
        }
    }
}

enum SqlxConn {
    MySql(PoolConnection<MySql>),
    Postgres(PoolConnection<Postgres>),
    SQLite(PoolConnection<Sqlite>),
}

/// One pooled connection with explicit transaction tracking.
///
/// `set_auto_commit(false)` issues BEGIN; `commit`/`rollback` end the
/// transaction and reset the flag. Transaction control statements run
/// unprepared since not every engine accepts them as prepared statements.
pub struct SqlxConnection {
    inner: SqlxConn,
    in_txn: bool,
}

impl SqlxConnection {
    async fn raw(&mut self, sql: &str) -> DbResult<()> {
        match &mut self.inner {
            SqlxConn::MySql(c) => {
                (&mut **c).execute(sql).await?;
            }
            SqlxConn::Postgres(c) => {
                (&mut **c).execute(sql).await?;
            }
            SqlxConn::SQLite(c) => {
                (&mut **c).execute(sql).await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Connection for SqlxConnection {
    async fn set_auto_commit(&mut self, enabled: bool) -> DbResult<()> {
        if enabled {
            // Returning to auto-commit commits any open transaction,
            // matching driver semantics.
            self.commit().await
        } else {
            if !self.in_txn {
                self.raw("BEGIN").await?;
                self.in_txn = true;
            }
            Ok(())
        }
    }

    async fn commit(&mut self) -> DbResult<()> {
        if self.in_txn {
            self.raw("COMMIT").await?;
            self.in_txn = false;
        }
        Ok(())
    }

    async fn rollback(&mut self) -> DbResult<()> {
        if self.in_txn {
            self.raw("ROLLBACK").await?;
            self.in_txn = false;
        }
        Ok(())
    }

    async fn execute(
        &mut self,
        sql: &str,
        params: &[ParamValue],
        keys: KeyReturn,
    ) -> DbResult<ExecResult> {
        match &mut self.inner {
            SqlxConn::MySql(c) => {
                let mut query = sqlx::query(sql);
                for param in params {
                    query = params::bind_mysql_param(query, param);
                }
                let result = query.execute(&mut **c).await?;
                let mut generated_keys = Vec::new();
                if keys == KeyReturn::Generated {
                    let id = result.last_insert_id();
                    if id > 0 {
                        generated_keys.push(id as i64);
                    }
                }
                Ok(ExecResult {
                    rows_affected: result.rows_affected(),
                    generated_keys,
                })
            }
            SqlxConn::Postgres(c) => {
                let mut query = sqlx::query(sql);
                for param in params {
                    query = params::bind_postgres_param(query, param);
                }
                // Postgres reports generated keys through RETURNING rows.
                if keys == KeyReturn::Generated && has_returning(sql) {
                    let rows = query.fetch_all(&mut **c).await?;
                    let generated_keys = rows
                        .iter()
                        .filter_map(|row| {
                            use sqlx::Row as _;
                            row.try_get::<i64, _>(0)
                                .or_else(|_| row.try_get::<i32, _>(0).map(i64::from))
                                .ok()
                        })
                        .collect::<Vec<_>>();
                    Ok(ExecResult {
                        rows_affected: rows.len() as u64,
                        generated_keys,
                    })
                } else {
                    let result = query.execute(&mut **c).await?;
                    Ok(ExecResult {
                        rows_affected: result.rows_affected(),
                        generated_keys: Vec::new(),
                    })
                }
            }
            SqlxConn::SQLite(c) => {
                let mut query = sqlx::query(sql);
                for param in params {
                    query = params::bind_sqlite_param(query, param);
                }
                let result = query.execute(&mut **c).await?;
                let mut generated_keys = Vec::new();
                if keys == KeyReturn::Generated {
                    let id = result.last_insert_rowid();
                    if id > 0 {
                        generated_keys.push(id);
                    }
                }
                Ok(ExecResult {
                    rows_affected: result.rows_affected(),
                    generated_keys,
                })
            }
        }
    }

    async fn query(&mut self, sql: &str, params: &[ParamValue]) -> DbResult<Box<dyn RowCursor>> {
        use futures_util::TryStreamExt;

        let rows = match &mut self.inner {
            SqlxConn::MySql(c) => {
                let mut query = sqlx::query(sql);
                for param in params {
                    query = params::bind_mysql_param(query, param);
                }
                query
                    .fetch(&mut **c)
                    .map_ok(|row| decode::mysql_row(&row))
                    .try_collect::<VecDeque<_>>()
                    .await?
            }
            SqlxConn::Postgres(c) => {
                let mut query = sqlx::query(sql);
                for param in params {
                    query = params::bind_postgres_param(query, param);
                }
                query
                    .fetch(&mut **c)
                    .map_ok(|row| decode::postgres_row(&row))
                    .try_collect::<VecDeque<_>>()
                    .await?
            }
            SqlxConn::SQLite(c) => {
                let mut query = sqlx::query(sql);
                for param in params {
                    query = params::bind_sqlite_param(query, param);
                }
                query
                    .fetch(&mut **c)
                    .map_ok(|row| decode::sqlite_row(&row))
                    .try_collect::<VecDeque<_>>()
                    .await?
            }
        };
        debug!(rows = rows.len(), "query buffered");
        Ok(Box::new(BufferedCursor {
            rows,
            closed: false,
        }))
    }
}

/// Whether the statement carries a RETURNING clause. Matches the keyword as
/// its own token, so identifiers like `returning_flag` do not count.
fn has_returning(sql: &str) -> bool {
    let lower = sql.to_lowercase();
    let is_ident = |c: char| c.is_alphanumeric() || c == '_';
    let mut offset = 0;
    while let Some(pos) = lower[offset..].find("returning") {
        let start = offset + pos;
        let end = start + "returning".len();
        let bounded_left = !lower[..start].chars().next_back().is_some_and(is_ident);
        let bounded_right = !lower[end..].chars().next().is_some_and(is_ident);
        if bounded_left && bounded_right {
            return true;
        }
        offset = start + 1;
    }
    false
}

/// Cursor over rows buffered from the driver.
struct BufferedCursor {
    rows: VecDeque<Row>,
    closed: bool,
}

#[async_trait]
impl RowCursor for BufferedCursor {
    async fn next_row(&mut self) -> DbResult<Option<Row>> {
        if self.closed {
            return Ok(None);
        }
        Ok(self.rows.pop_front())
    }

    async fn close(&mut self) -> DbResult<()> {
        self.closed = true;
        self.rows.clear();
        Ok(())
    }
}

/// Connection provider backed by sqlx pools, keyed by datastore name.
#[derive(Default)]
pub struct SqlxConnectionProvider {
    pools: RwLock<HashMap<String, SqlxPool>>,
}

impl SqlxConnectionProvider {
    pub fn new() -> Self {
        Self {
            pools: RwLock::new(HashMap::new()),
        }
    }

    /// Connect a pool and register it under the given datastore name.
    pub async fn register(
        &self,
        dbms: &str,
        kind: DatabaseKind,
        url: &str,
        settings: &PoolSettings,
    ) -> DbResult<()> {
        settings
            .validate()
            .map_err(DbError::invalid_input)?;
        {
            let pools = self.pools.read().await;
            if pools.contains_key(dbms) {
                return Err(DbError::invalid_input(format!(
                    "datastore '{}' is already registered",
                    dbms
                )));
            }
        }

        info!(dbms = %dbms, kind = %kind, "connecting datastore pool");
        let pool = SqlxPool::connect(kind, url, settings).await?;

        // Re-check after async work to prevent a racing duplicate register.
        let duplicate = {
            let mut pools = self.pools.write().await;
            if pools.contains_key(dbms) {
                Some(pool)
            } else {
                pools.insert(dbms.to_string(), pool);
                None
            }
        };
        if let Some(pool) = duplicate {
            pool.close().await;
            return Err(DbError::invalid_input(format!(
                "datastore '{}' is already registered",
                dbms
            )));
        }
        Ok(())
    }

    /// Close every registered pool.
    pub async fn close_all(&self) {
        let pools = {
            let mut pools = self.pools.write().await;
            std::mem::take(&mut *pools)
        };
        for (dbms, pool) in pools {
            debug!(dbms = %dbms, "closing datastore pool");
            pool.close().await;
        }
    }
}

#[async_trait]
impl ConnectionProvider for SqlxConnectionProvider {
    async fn lend(&self, dbms: &str) -> DbResult<Box<dyn Connection>> {
        let pool = {
            let pools = self.pools.read().await;
            pools
                .get(dbms)
                .cloned()
                .ok_or_else(|| {
                    DbError::connection(format!("no datastore registered as '{}'", dbms))
                })?
        };
        let inner = pool.acquire().await?;
        Ok(Box::new(SqlxConnection {
            inner,
            in_txn: false,
        }))
    }

    async fn reclaim(&self, dbms: &str, mut conn: Box<dyn Connection>) {
        // A connection returned mid-transaction must not leak its state to
        // the next borrower.
        if let Err(e) = conn.rollback().await {
            warn!(dbms = %dbms, error = %e, "rollback on reclaim failed");
        }
        // Dropping the pooled connection hands it back to sqlx.
    }
}
