//! The statement-execution engine.
//!
//! Control flow: caller -> [`handler::OperationHandler`] ->
//! [`runner::TransactionRunner`] or [`stream::StreamingQueryExecutor`] ->
//! [`executor::StatementExecutor`] -> connection provider.
//!
//! Operation logging goes to fixed tracing targets, one per channel:
//! `dbexec::persist`, `dbexec::update`, `dbexec::remove` for the three
//! statement kinds and `dbexec::retry` for retry diagnostics. Subscribers
//! are installed by the embedding application.

pub mod executor;
pub mod handler;
pub mod retry;
pub mod runner;
pub mod statement;
pub mod stream;

pub use executor::{DriverKeysHandler, GeneratedKeysHandler, StatementExecutor};
pub use handler::OperationHandler;
pub use retry::{ErrorClass, RetryState, classify};
pub use runner::{Outcome, RunReport, TransactionRunner};
pub use statement::{KeyConsumer, Statement, StatementKind};
pub use stream::{ParallelStrategy, RowStream, StreamingQueryExecutor};
