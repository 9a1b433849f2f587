//! Operation handler surface tests over the scripted connection stack.

mod common;

use common::{MockProvider, MockState, id_row};
use dbexec::conn::NoAmbient;
use dbexec::error::DbError;
use dbexec::value::{ParamValue, Row};
use dbexec::{EngineConfig, OperationHandler, Statement};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn handler(state: &Arc<MockState>) -> OperationHandler {
    OperationHandler::new(
        Arc::new(MockProvider::new(Arc::clone(state))),
        Arc::new(NoAmbient),
    )
}

#[tokio::test]
async fn insert_commits_and_fires_callback() {
    let state = MockState::new();
    let keys_seen: Arc<Mutex<Vec<i64>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&keys_seen);

    handler(&state)
        .run_insert(
            "primary",
            "INSERT INTO person(name) VALUES (?)",
            vec![ParamValue::from("alice")],
            vec!["id".to_string()],
            move |keys| sink.lock().unwrap().extend_from_slice(keys),
        )
        .await
        .unwrap();

    assert_eq!(state.commits(), 1);
    assert_eq!(*keys_seen.lock().unwrap(), vec![1]);
    assert_eq!(
        state.committed_sql(),
        vec!["INSERT INTO person(name) VALUES (?)".to_string()]
    );
}

#[tokio::test]
async fn update_and_delete_commit() {
    let state = MockState::new();
    let h = handler(&state);

    h.run_update("primary", "UPDATE person SET age = ?", vec![ParamValue::Int(30)])
        .await
        .unwrap();
    h.run_delete("primary", "DELETE FROM person WHERE age > ?", vec![ParamValue::Int(90)])
        .await
        .unwrap();

    assert_eq!(state.commits(), 2);
    assert_eq!(
        state.committed_sql(),
        vec![
            "UPDATE person SET age = ?".to_string(),
            "DELETE FROM person WHERE age > ?".to_string(),
        ]
    );
}

#[tokio::test]
async fn batch_commits_as_one_transaction() {
    let state = MockState::new();
    let batch = vec![
        Statement::update("UPDATE person SET age = age + 1", vec![]),
        Statement::delete("DELETE FROM audit", vec![]),
    ];

    handler(&state).run_batch("primary", &batch).await.unwrap();

    assert_eq!(state.commits(), 1);
    assert_eq!(state.borrows(), 1);
    assert_eq!(state.committed_sql().len(), 2);
}

#[tokio::test]
async fn query_streams_rows() {
    let state = MockState::new();
    state.set_query_rows(vec![id_row(1), id_row(2)]);

    let stream = handler(&state)
        .run_query("primary", "SELECT id FROM person", vec![], |row: &Row| {
            row.get_i64(0)
        })
        .await
        .unwrap();

    assert_eq!(stream.collect().await.unwrap(), vec![1, 2]);
}

#[tokio::test]
async fn retry_budget_comes_from_config() {
    let state = MockState::new();
    state.fail_execute(common::transient_deadlock());
    state.fail_execute(common::transient_deadlock());

    let handler = OperationHandler::with_config(
        Arc::new(MockProvider::new(Arc::clone(&state))),
        Arc::new(NoAmbient),
        EngineConfig {
            retry_budget: Some(2),
        },
    );

    let err = handler
        .run_update("primary", "UPDATE t SET x = 1", vec![])
        .await
        .unwrap_err();

    assert_eq!(err.sql_state(), Some("40001"));
    assert_eq!(state.executes(), 2);
    assert_eq!(state.commits(), 0);
}

#[tokio::test]
async fn operations_after_close_fail_fast() {
    let state = MockState::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let count = Arc::clone(&calls);

    let h = handler(&state);
    h.close();
    assert!(h.is_closed());

    let err = h
        .run_insert(
            "primary",
            "INSERT INTO person(name) VALUES (?)",
            vec![],
            vec![],
            move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Closed));

    let err = h.run_batch("primary", &[]).await.unwrap_err();
    assert!(matches!(err, DbError::Closed));

    let err = h
        .run_query("primary", "SELECT 1", vec![], |row: &Row| row.get_i64(0))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Closed));

    // Nothing reached the pool, no callback fired
    assert_eq!(state.borrows(), 0);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}
