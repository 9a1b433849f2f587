//! dbexec - transactional statement execution for SQL databases.
//!
//! This library sits between application code and a relational datastore.
//! Batches of mutating statements (insert/update/delete) run under
//! commit/rollback/retry discipline; read queries come back as lazily
//! consumed row streams. Connection pooling and ambient-transaction
//! ownership live behind the [`conn::ConnectionProvider`] and
//! [`conn::TransactionContext`] traits, so the engine itself never assumes
//! a particular driver. A ready-made sqlx implementation of both is
//! provided in [`sqlx_backend`].

pub mod config;
pub mod conn;
pub mod engine;
pub mod error;
pub mod sqlx_backend;
pub mod value;

pub use config::EngineConfig;
pub use conn::{
    Connection, ConnectionProvider, ConnectionScope, ExecResult, KeyReturn, NoAmbient, RowCursor,
    SharedConnection, TransactionContext,
};
pub use engine::OperationHandler;
pub use engine::statement::Statement;
pub use engine::stream::{ParallelStrategy, RowStream};
pub use error::{DbError, DbResult};
pub use sqlx_backend::{DatabaseKind, SqlxConnectionProvider};
pub use value::{ParamValue, Row};
