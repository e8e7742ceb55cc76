//! Executor Module Tests
//!
//! This module contains unit tests for the per-tenant API execution system.
//!
//! ## Test Scopes
//! - **Protocol**: Envelope validation and payload typing.
//! - **Operations**: noop/list/write/read/delete semantics against real directories.
//! - **Ordering & Termination**: FIFO execution, cancellation of queued requests.
//! - **Events**: Lifecycle events, error events, slow-subscriber policy.
//! - **Registry**: One executor per storage path.

#[cfg(test)]
mod tests {
    use crate::executor::error::ApiError;
    use crate::executor::events::EventKind;
    use crate::executor::executor::ApiExecutor;
    use crate::executor::protocol::{parse_envelope, parse_request};
    use crate::executor::registry::ExecutorRegistry;
    use crate::executor::types::{ApiRequest, ExecutorConfig, ExecutorState, Operation};
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn executor(dir: &std::path::Path) -> Arc<ApiExecutor> {
        ApiExecutor::spawn("docs", dir, &ExecutorConfig::default())
    }

    fn write_req(pairs: &[(&str, &str)]) -> ApiRequest {
        let items: BTreeMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ApiRequest::new(Operation::Write(items))
    }

    fn keys(list: &[&str]) -> Vec<String> {
        list.iter().map(|k| k.to_string()).collect()
    }

    // ============================================================
    // TEST 1: Envelope protocol
    // ============================================================

    #[test]
    fn test_parse_valid_envelopes() {
        let request = parse_envelope(json!({
            "version": "1",
            "api": "WRITE",
            "name": "notes",
            "items": {"a": "1", "b": "2"}
        }))
        .unwrap();

        assert_eq!(request.namespace.as_deref(), Some("notes"));
        match request.operation {
            Operation::Write(items) => {
                assert_eq!(items.get("a").map(String::as_str), Some("1"));
                assert_eq!(items.len(), 2);
            }
            other => panic!("Wrong operation: {:?}", other),
        }

        let read = parse_envelope(json!({"version": "1", "api": "read", "items": ["a"]})).unwrap();
        assert_eq!(read.operation, Operation::Read(keys(&["a"])));
        assert_eq!(read.namespace, None);

        let noop = parse_envelope(json!({"version": "1", "api": "Noop"})).unwrap();
        assert_eq!(noop.operation, Operation::Noop);
    }

    #[test]
    fn test_parse_rejects_malformed_envelopes() {
        let cases = [
            json!(["not", "an", "object"]),
            json!({"api": "list"}),
            json!({"version": 1, "api": "list"}),
            json!({"version": "2", "api": "list"}),
            json!({"version": "1"}),
            json!({"version": "1", "api": 7}),
            json!({"version": "1", "api": "list", "name": 3}),
        ];

        for case in cases {
            let result = parse_envelope(case.clone());
            assert!(
                matches!(result, Err(ApiError::Protocol(_))),
                "Expected protocol error for {}",
                case
            );
        }

        assert!(matches!(parse_request("{not json"), Err(ApiError::Protocol(_))));
    }

    #[test]
    fn test_parse_rejects_bad_payloads() {
        let cases = [
            json!({"version": "1", "api": "write", "items": ["a"]}),
            json!({"version": "1", "api": "write", "items": {"a": 1}}),
            json!({"version": "1", "api": "write", "items": {"a": "1", "b": null}}),
            json!({"version": "1", "api": "read", "items": {"a": "1"}}),
            json!({"version": "1", "api": "read", "items": ["a", 2]}),
            json!({"version": "1", "api": "delete"}),
        ];

        for case in cases {
            let result = parse_envelope(case.clone());
            assert!(
                matches!(result, Err(ApiError::Validation(_))),
                "Expected validation error for {}",
                case
            );
        }
    }

    #[test]
    fn test_parse_rejects_unknown_operation() {
        let result = parse_envelope(json!({"version": "1", "api": "truncate"}));

        match result {
            Err(ApiError::UnknownOperation(name)) => assert_eq!(name, "truncate"),
            other => panic!("Expected unknown operation, got {:?}", other),
        }
    }

    // ============================================================
    // TEST 2: Operations
    // ============================================================

    #[tokio::test]
    async fn test_write_list_read_scenario() {
        // ARRANGE
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(dir.path());

        // ACT
        let written = exec
            .execute(r#"{"version":"1","api":"write","items":{"a":"1","b":"2"}}"#)
            .await
            .unwrap();
        let listed = exec.execute(r#"{"version":"1","api":"list"}"#).await.unwrap();
        let read = exec
            .execute(r#"{"version":"1","api":"read","items":["a","b","c"]}"#)
            .await
            .unwrap();

        // ASSERT
        assert_eq!(written, json!(["a", "b"]));
        assert_eq!(listed, json!(["a", "b"]));
        assert_eq!(read, json!({"a": "1", "b": "2", "c": ""}));
    }

    #[tokio::test]
    async fn test_delete_reports_only_removed_keys() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(dir.path());
        exec.submit(write_req(&[("a", "1"), ("b", "2")])).await.unwrap();

        let removed = exec
            .submit(ApiRequest::new(Operation::Delete(keys(&["a"]))))
            .await
            .unwrap();
        let listed = exec.submit(ApiRequest::new(Operation::List)).await.unwrap();
        let missing = exec
            .submit(ApiRequest::new(Operation::Delete(keys(&["missing"]))))
            .await
            .unwrap();

        assert_eq!(removed, json!(["a"]));
        assert_eq!(listed, json!(["b"]));
        assert_eq!(missing, json!([]));
    }

    #[tokio::test]
    async fn test_overlong_keys_are_absent_not_errors() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(dir.path());
        let long_key = "k".repeat(200);
        exec.submit(write_req(&[("a", "1")])).await.unwrap();

        let read = exec
            .submit(ApiRequest::new(Operation::Read(vec!["a".to_string(), long_key.clone()])))
            .await
            .unwrap();
        let removed = exec
            .submit(ApiRequest::new(Operation::Delete(vec![long_key.clone()])))
            .await
            .unwrap();

        assert_eq!(read["a"], "1");
        assert_eq!(read[long_key.as_str()], "");
        assert_eq!(removed, json!([]));
    }

    #[tokio::test]
    async fn test_non_string_write_is_rejected_wholesale() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(dir.path());

        let result = exec
            .execute(r#"{"version":"1","api":"write","items":{"ok":"1","a":1}}"#)
            .await;
        let listed = exec.execute(r#"{"version":"1","api":"list"}"#).await.unwrap();

        assert!(matches!(result, Err(ApiError::Validation(_))));
        assert_eq!(listed, json!([]), "No key of the rejected batch may appear");
    }

    #[tokio::test]
    async fn test_rejected_envelopes_do_not_touch_storage() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("tenant");
        let exec = executor(&root);

        assert!(exec.execute("[]").await.is_err());
        assert!(exec.execute(r#"{"version":"2","api":"list"}"#).await.is_err());
        assert!(exec.execute(r#"{"version":"1","api":"drop"}"#).await.is_err());

        assert!(!root.exists(), "Storage root must not be created by rejected requests");
    }

    #[tokio::test]
    async fn test_noop_returns_null_without_storage_access() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("tenant");
        let exec = executor(&root);

        let result = exec.submit(ApiRequest::new(Operation::Noop)).await.unwrap();

        assert_eq!(result, serde_json::Value::Null);
        assert!(!root.exists());
    }

    #[tokio::test]
    async fn test_namespaces_are_private() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(dir.path());

        exec.submit(write_req(&[("k", "root")])).await.unwrap();
        exec.submit(write_req(&[("k", "ns")]).with_namespace("notes"))
            .await
            .unwrap();

        let root_value = exec
            .submit(ApiRequest::new(Operation::Read(keys(&["k"]))))
            .await
            .unwrap();
        let ns_value = exec
            .submit(ApiRequest::new(Operation::Read(keys(&["k"]))).with_namespace("notes"))
            .await
            .unwrap();
        let other_ns = exec
            .submit(ApiRequest::new(Operation::List).with_namespace("other"))
            .await
            .unwrap();

        assert_eq!(root_value, json!({"k": "root"}));
        assert_eq!(ns_value, json!({"k": "ns"}));
        assert_eq!(other_ns, json!([]));
    }

    #[tokio::test]
    async fn test_tenants_are_independent() {
        let dir = tempfile::tempdir().unwrap();
        let first = ApiExecutor::spawn("one", &dir.path().join("one"), &ExecutorConfig::default());
        let second = ApiExecutor::spawn("two", &dir.path().join("two"), &ExecutorConfig::default());

        let (a, b) = tokio::join!(
            first.submit(write_req(&[("shared", "from-one")])),
            second.submit(write_req(&[("shared", "from-two")])),
        );
        a.unwrap();
        b.unwrap();

        let read = ApiRequest::new(Operation::Read(keys(&["shared"])));
        assert_eq!(first.submit(read.clone()).await.unwrap(), json!({"shared": "from-one"}));
        assert_eq!(second.submit(read).await.unwrap(), json!({"shared": "from-two"}));
    }

    #[tokio::test]
    async fn test_storage_error_does_not_stop_the_worker() {
        // ARRANGE: the storage root is a regular file, so every storage access fails
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("occupied");
        std::fs::write(&root, "not a directory").unwrap();
        let exec = executor(&root);

        // ACT
        let failed = exec.submit(write_req(&[("a", "1")])).await;
        let listed = exec.submit(ApiRequest::new(Operation::List)).await;
        let noop = exec.submit(ApiRequest::new(Operation::Noop)).await;

        // ASSERT
        assert!(matches!(failed, Err(ApiError::Storage(_))));
        assert!(matches!(listed, Err(ApiError::Storage(_))));
        assert!(noop.is_ok(), "Worker keeps draining after a storage error");
    }

    // ============================================================
    // TEST 3: Ordering
    // ============================================================

    #[tokio::test]
    async fn test_requests_run_in_submission_order() {
        // ARRANGE
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(dir.path());
        let mut events = exec.attach();
        let requests: Vec<ApiRequest> = (1..=4)
            .map(|i| write_req(&[("counter", &i.to_string())]))
            .collect();
        let expected_ids: Vec<_> = requests.iter().map(|r| r.id.clone()).collect();
        let mut requests = requests.into_iter();

        // ACT: all four are enqueued during the same poll, in this order
        let (r1, r2, r3, r4) = tokio::join!(
            exec.submit(requests.next().unwrap()),
            exec.submit(requests.next().unwrap()),
            exec.submit(requests.next().unwrap()),
            exec.submit(requests.next().unwrap()),
        );

        // ASSERT
        for result in [r1, r2, r3, r4] {
            result.unwrap();
        }
        let value = exec
            .submit(ApiRequest::new(Operation::Read(keys(&["counter"]))))
            .await
            .unwrap();
        assert_eq!(value, json!({"counter": "4"}), "Last submitted write wins");

        let mut started = Vec::new();
        while let Some(event) = events.try_next() {
            if event.kind == EventKind::Start {
                started.push(event.request_id);
            }
        }
        assert_eq!(&started[..4], &expected_ids[..]);
    }

    // ============================================================
    // TEST 4: Termination
    // ============================================================

    #[tokio::test]
    async fn test_submit_after_terminate_is_canceled() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("tenant");
        let exec = executor(&root);

        exec.terminate();
        exec.terminate();
        let result = exec.submit(write_req(&[("a", "1")])).await;

        assert_eq!(exec.state(), ExecutorState::Terminated);
        assert!(matches!(result, Err(ApiError::Canceled)));
        assert!(!root.exists(), "Canceled requests never reach storage");
    }

    #[tokio::test]
    async fn test_queued_requests_are_canceled_on_terminate() {
        // ARRANGE
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("tenant");
        let exec = executor(&root);
        let mut events = exec.attach();

        // ACT: enqueue three requests, then terminate before the worker gets to run
        let (a, b, c, _) = tokio::join!(
            exec.submit(write_req(&[("a", "1")])),
            exec.submit(write_req(&[("b", "2")])),
            exec.submit(ApiRequest::new(Operation::List)),
            async { exec.terminate() },
        );

        // ASSERT
        assert!(matches!(a, Err(ApiError::Canceled)));
        assert!(matches!(b, Err(ApiError::Canceled)));
        assert!(matches!(c, Err(ApiError::Canceled)));
        assert!(!root.exists());

        let mut canceled = 0;
        while let Some(event) = events.try_next() {
            assert_ne!(event.kind, EventKind::Start, "Nothing may start after terminate");
            if event.kind == EventKind::Canceled {
                canceled += 1;
            }
        }
        assert_eq!(canceled, 3);
    }

    #[tokio::test]
    async fn test_running_request_finishes_after_terminate() {
        // ARRANGE
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(dir.path());
        let mut events = exec.attach();
        let first = write_req(&[("first", "1")]);
        let first_id = first.id.clone();

        // ACT: terminate as soon as the first request has started
        let (first_result, second_result, _) = tokio::join!(
            exec.submit(first),
            exec.submit(write_req(&[("second", "2")])),
            async {
                while let Some(event) = events.next().await {
                    if event.kind == EventKind::Start && event.request_id == first_id {
                        exec.terminate();
                        break;
                    }
                }
            },
        );

        // ASSERT: the started request always completes; the queued one may only be canceled
        assert_eq!(first_result.unwrap(), json!(["first"]));
        let store = crate::storage::KeyValueStore::new(dir.path());
        match second_result {
            Ok(_) => assert_eq!(store.read("second").unwrap(), "2"),
            Err(ApiError::Canceled) => assert_eq!(store.read("second").unwrap(), ""),
            Err(other) => panic!("Unexpected error: {:?}", other),
        }
        assert_eq!(store.read("first").unwrap(), "1");
    }

    // ============================================================
    // TEST 5: Events
    // ============================================================

    #[tokio::test]
    async fn test_events_describe_request_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(dir.path());
        let mut events = exec.attach();
        let request = write_req(&[("a", "1")]);
        let id = request.id.clone();

        exec.submit(request).await.unwrap();

        let start = events.try_next().unwrap();
        let done = events.try_next().unwrap();
        assert_eq!(start.kind, EventKind::Start);
        assert_eq!(start.data, json!("write"));
        assert_eq!(done.kind, EventKind::Write);
        assert_eq!(done.data, json!(["a"]));
        assert_eq!(start.request_id, id);
        assert_eq!(done.request_id, id);
        assert!(events.try_next().is_none());
    }

    #[tokio::test]
    async fn test_every_subscriber_sees_every_event() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(dir.path());
        let mut first = exec.attach();
        let mut second = exec.attach();

        exec.submit(ApiRequest::new(Operation::List)).await.unwrap();

        for subscriber in [&mut first, &mut second] {
            assert_eq!(subscriber.try_next().unwrap().kind, EventKind::Start);
            assert_eq!(subscriber.try_next().unwrap().kind, EventKind::List);
        }
    }

    #[tokio::test]
    async fn test_errors_are_emitted_as_events() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(dir.path());
        let mut events = exec.attach();

        let result = exec.execute(r#"{"version":"1","api":"explode"}"#).await;

        assert!(matches!(result, Err(ApiError::UnknownOperation(_))));
        let event = events.try_next().unwrap();
        assert_eq!(event.kind, EventKind::Error);
        assert_eq!(event.param, json!({"version": "1", "api": "explode"}));
        assert!(event.data.as_str().unwrap().contains("explode"));
    }

    #[tokio::test]
    async fn test_slow_subscriber_loses_oldest_events_without_stalling() {
        // ARRANGE: room for two events per subscriber
        let dir = tempfile::tempdir().unwrap();
        let exec = ApiExecutor::spawn("docs", dir.path(), &ExecutorConfig { event_capacity: 2 });
        let mut lazy = exec.attach();

        // ACT: each request emits two events; nobody reads in between
        for i in 0..3 {
            exec.submit(write_req(&[("k", &i.to_string())])).await.unwrap();
        }

        // ASSERT
        let mut received = Vec::new();
        while let Some(event) = lazy.try_next() {
            received.push(event);
        }
        assert_eq!(received.len(), 2);
        assert_eq!(lazy.missed(), 4);
        assert_eq!(received[1].kind, EventKind::Write);
        assert_eq!(received[1].data, json!(["k"]));
    }

    #[tokio::test]
    async fn test_panicked_request_emits_error_event() {
        let hub = crate::executor::events::EventHub::new(8);
        let mut events = hub.subscribe();
        let request = ApiRequest::new(Operation::Noop);
        let join_err = tokio::task::spawn_blocking(|| panic!("disk exploded"))
            .await
            .unwrap_err();

        let err = crate::executor::executor::panicked(
            "docs",
            &hub,
            request.id.clone(),
            json!({"api": "noop"}),
            join_err,
        );

        assert!(matches!(err, ApiError::Internal(_)));
        let event = events.try_next().unwrap();
        assert_eq!(event.kind, EventKind::Error);
        assert_eq!(event.request_id, request.id);
        assert_eq!(event.param, json!({"api": "noop"}));
    }

    #[test]
    fn test_event_serialization_shape() {
        let request = ApiRequest::new(Operation::List);
        let event = crate::executor::events::ExecutorEvent::completed(&request, json!(["a"]));

        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["kind"], "list");
        assert_eq!(value["data"], json!(["a"]));
        assert_eq!(value["request_id"], json!(request.id.0));
    }

    // ============================================================
    // TEST 6: Registry
    // ============================================================

    #[tokio::test]
    async fn test_registry_reuses_executor_per_storage_path() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ExecutorRegistry::new(ExecutorConfig::default());

        let a = registry.get_or_create("docs", &dir.path().join("docs"));
        let b = registry.get_or_create("docs", &dir.path().join("docs"));
        let c = registry.get_or_create("specs", &dir.path().join("specs"));

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(registry.len(), 2);
        assert!(registry.get(&dir.path().join("docs")).is_some());
        assert!(registry.get(&dir.path().join("nobody")).is_none());
    }

    #[tokio::test]
    async fn test_registry_treats_path_spellings_as_one_directory() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ExecutorRegistry::new(ExecutorConfig::default());

        let plain = registry.get_or_create("docs", &dir.path().join("docs"));
        let dotted = registry.get_or_create("docs", &dir.path().join(".").join("docs"));

        assert!(Arc::ptr_eq(&plain, &dotted));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_registry_terminate_all() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ExecutorRegistry::new(ExecutorConfig::default());
        let a = registry.get_or_create("docs", &dir.path().join("docs"));
        let b = registry.get_or_create("specs", &dir.path().join("specs"));

        registry.terminate_all();

        assert!(a.is_terminated());
        assert!(b.is_terminated());
        assert!(matches!(
            a.submit(ApiRequest::new(Operation::Noop)).await,
            Err(ApiError::Canceled)
        ));
        assert!(Arc::ptr_eq(&a, &registry.get_or_create("docs", &dir.path().join("docs"))));
    }
}
