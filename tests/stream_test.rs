//! Row stream lifecycle tests: ordering, teardown, and mapper failures.

mod common;

use common::{AmbientContext, MockProvider, MockState, id_row, shared_connection};
use dbexec::conn::NoAmbient;
use dbexec::engine::{ParallelStrategy, StreamingQueryExecutor};
use dbexec::error::{DbError, DbResult};
use dbexec::value::Row;
use std::sync::Arc;

fn executor(state: &Arc<MockState>) -> StreamingQueryExecutor {
    StreamingQueryExecutor::new(Arc::new(MockProvider::new(Arc::clone(state))))
}

fn map_id(row: &Row) -> DbResult<i64> {
    row.get_i64(0)
}

#[tokio::test]
async fn rows_arrive_in_result_set_order() {
    let state = MockState::new();
    state.set_query_rows(vec![id_row(3), id_row(1), id_row(2)]);

    let stream = executor(&state)
        .run_query(
            &NoAmbient,
            "primary",
            "SELECT id FROM person",
            vec![],
            map_id,
            ParallelStrategy::Sequential,
        )
        .await
        .unwrap();

    let ids = stream.collect().await.unwrap();
    assert_eq!(ids, vec![3, 1, 2]);
    // Exhaustion releases cursor and connection exactly once
    assert_eq!(state.cursor_closes(), 1);
    assert_eq!(state.returns(), 1);
    assert_eq!(state.commits(), 1);
}

#[tokio::test]
async fn early_close_releases_connection() {
    let state = MockState::new();
    state.set_query_rows(vec![id_row(1), id_row(2), id_row(3)]);

    let mut stream = executor(&state)
        .run_query(
            &NoAmbient,
            "primary",
            "SELECT id FROM person",
            vec![],
            map_id,
            ParallelStrategy::Sequential,
        )
        .await
        .unwrap();

    assert_eq!(stream.next().await.unwrap().unwrap(), 1);
    stream.close().await;

    assert_eq!(state.cursor_closes(), 1);
    assert_eq!(state.returns(), 1);

    // Closed stream yields nothing and releases nothing twice
    assert!(stream.next().await.is_none());
    stream.close().await;
    assert_eq!(state.cursor_closes(), 1);
    assert_eq!(state.returns(), 1);
}

#[tokio::test]
async fn mapper_failure_tears_down_and_reports_position() {
    let state = MockState::new();
    state.set_query_rows(vec![id_row(1), id_row(2), id_row(3)]);

    let mut stream = executor(&state)
        .run_query(
            &NoAmbient,
            "primary",
            "SELECT id FROM person",
            vec![],
            |row: &Row| {
                let id = row.get_i64(0)?;
                if id == 2 {
                    return Err(DbError::invalid_input("id 2 is unmappable"));
                }
                Ok(id)
            },
            ParallelStrategy::Sequential,
        )
        .await
        .unwrap();

    assert_eq!(stream.next().await.unwrap().unwrap(), 1);
    let err = stream.next().await.unwrap().unwrap_err();
    match err {
        DbError::RowMapping { index, .. } => assert_eq!(index, 1),
        other => panic!("expected RowMapping, got {:?}", other),
    }

    // The failure released everything; the stream is spent
    assert!(stream.next().await.is_none());
    assert_eq!(state.cursor_closes(), 1);
    assert_eq!(state.returns(), 1);
}

#[tokio::test]
async fn open_failure_releases_connection_and_names_statement() {
    let state = MockState::new();
    state.fail_execute(DbError::database(
        "relation does not exist",
        Some("42P01".to_string()),
    ));

    let err = executor(&state)
        .run_query(
            &NoAmbient,
            "primary",
            "SELECT id FROM missing",
            vec![],
            map_id,
            ParallelStrategy::Sequential,
        )
        .await
        .unwrap_err();

    assert_eq!(err.statement(), Some("SELECT id FROM missing"));
    assert_eq!(state.returns(), 1);
}

#[tokio::test]
async fn strategy_hint_is_carried_not_consumed() {
    let state = MockState::new();
    state.set_query_rows(vec![id_row(1), id_row(2)]);

    let stream = executor(&state)
        .run_query(
            &NoAmbient,
            "primary",
            "SELECT id FROM person",
            vec![],
            map_id,
            ParallelStrategy::Chunked(128),
        )
        .await
        .unwrap();

    assert_eq!(stream.strategy(), ParallelStrategy::Chunked(128));
    // The hint never changes fetch order
    assert_eq!(stream.collect().await.unwrap(), vec![1, 2]);
}

#[tokio::test]
async fn ambient_query_leaves_transaction_untouched() {
    let state = MockState::new();
    state.set_query_rows(vec![id_row(7)]);
    let ctx = AmbientContext::new("primary", shared_connection(&state));

    let stream = executor(&state)
        .run_query(
            &ctx,
            "primary",
            "SELECT id FROM person",
            vec![],
            map_id,
            ParallelStrategy::Sequential,
        )
        .await
        .unwrap();

    assert_eq!(stream.collect().await.unwrap(), vec![7]);
    // No commit boundary touched, no pool interaction
    assert_eq!(state.commits(), 0);
    assert_eq!(state.borrows(), 0);
    assert_eq!(state.returns(), 0);
}
