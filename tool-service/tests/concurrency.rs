//! Cross-connection concurrency: many clients racing unit borrows against one
//! shared inventory.

use tokio::sync::mpsc;
use tool_service::ws_handlers::process_message;
use tool_service::AppState;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_unit_borrows_admit_exactly_capacity() {
    let state = AppState::with_defaults();
    let clients = 15;
    let capacity = 10;

    let mut receivers = Vec::new();
    let mut tasks = Vec::new();
    for _ in 0..clients {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = state.registry.add(tx).await;
        receivers.push(rx);
        let state = state.clone();
        tasks.push(tokio::spawn(async move {
            process_message(&state, id, r#"{"action":"borrow_tool","quantity":1}"#).await;
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let mut successes = 0;
    let mut failures = 0;
    for rx in receivers.iter_mut() {
        let mut notifications = 0;
        while let Ok(raw) = rx.try_recv() {
            let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
            match value["type"].as_str().unwrap() {
                "tool" => {
                    if value["success"] == true {
                        successes += 1;
                    } else {
                        assert_eq!(value["message"], "insufficient stock, 0 remaining");
                        failures += 1;
                    }
                }
                "notification" => notifications += 1,
                other => panic!("unexpected message type {other}"),
            }
        }
        // Every committed mutation was broadcast to every connection.
        assert_eq!(notifications, capacity);
    }

    assert_eq!(successes, capacity);
    assert_eq!(failures, clients - capacity);
    let snap = state.store.snapshot().await.unwrap();
    assert_eq!(snap.current_quantity, 0);
}
