//! Retry, conflict and timeout tests

use crate::common::*;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};

/// Applies every request but loses the reply to the first commit
struct LostCommitReply {
    server: Arc<MemoryServer>,
    dropped: AtomicBool,
}

#[async_trait]
impl Transport for LostCommitReply {
    async fn send(&self, request: Request) -> Result<Response> {
        let is_commit = matches!(request, Request::TxnCommit { .. });
        let response = self.server.handle(request)?;
        if is_commit && !self.dropped.swap(true, Ordering::SeqCst) {
            return Err(Error::transport(
                TransportErrorKind::Timeout,
                "reply lost",
            ));
        }
        Ok(response)
    }
}

#[test]
fn foreign_token_retries_exactly_once() {
    let cluster = TestCluster::new();
    let collection = &cluster.collection;
    collection.upsert("doc", json!({"v": 1})).unwrap();

    let stale = cluster
        .transactions()
        .run(|ctx| ctx.get(collection, "doc"))
        .unwrap()
        .value;

    let mut calls = 0;
    let result = cluster
        .transactions()
        .run(|ctx| {
            calls += 1;
            let token = if calls == 1 {
                stale.clone()
            } else {
                ctx.get(collection, "doc")?
            };
            ctx.replace(&token, json!({"v": 2}))?;
            Ok(())
        })
        .unwrap();

    assert_eq!(calls, 2);
    assert_eq!(result.outcome.attempt_count(), 2);
    let first = &result.outcome.attempts[0];
    assert_eq!(first.status, AttemptStatus::RolledBack);
    assert!(first.error.as_deref().unwrap_or("").contains("conflict"));
    assert_eq!(
        collection.get("doc").unwrap().content.into_inner(),
        json!({"v": 2})
    );
}

#[test]
fn concurrent_write_forces_retry() {
    let cluster = TestCluster::new();
    let collection = &cluster.collection;
    collection.upsert("counter", json!({"n": 0})).unwrap();

    let mut calls = 0;
    let result = cluster
        .transactions()
        .run(|ctx| {
            calls += 1;
            let doc = ctx.get(collection, "counter")?;
            let n = doc.content()["n"].as_i64().unwrap_or(0);
            if calls == 1 {
                collection.upsert("counter", json!({"n": 10}))?;
            }
            ctx.replace(&doc, json!({"n": n + 1}))?;
            Ok(())
        })
        .unwrap();

    assert_eq!(result.outcome.attempt_count(), 2);
    assert_eq!(result.outcome.attempts[0].status, AttemptStatus::Failed);
    assert_eq!(
        collection.get("counter").unwrap().content.into_inner(),
        json!({"n": 11})
    );
}

#[test]
fn transient_fault_is_retried() {
    let cluster = TestCluster::new();
    let collection = &cluster.collection;
    collection.upsert("doc", json!({})).unwrap();
    cluster.server.inject_failures(
        2,
        Error::transport(TransportErrorKind::TemporaryFailure, "rebalancing"),
    );

    let result = cluster
        .transactions()
        .run(|ctx| {
            let doc = ctx.get(collection, "doc")?;
            ctx.replace(&doc, json!({"done": true}))?;
            Ok(())
        })
        .unwrap();
    assert_eq!(result.outcome.attempt_count(), 3);
    assert!(result.outcome.is_committed());
}

#[test]
fn disconnect_is_normalized_and_terminal() {
    let cluster = TestCluster::new();
    let collection = &cluster.collection;
    cluster.server.inject_failure(Error::transport(
        TransportErrorKind::Disconnected,
        "socket closed",
    ));

    let failed = cluster
        .transactions()
        .run(|ctx| ctx.get(collection, "doc").map(|_| ()))
        .unwrap_err();
    match &failed.error {
        Error::TransactionOperationFailed {
            operation, message, ..
        } => {
            assert_eq!(operation, "get");
            assert!(message.contains("socket closed"));
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(failed.outcome.attempt_count(), 1);
}

#[test]
fn attempt_ceiling() {
    let cluster = TestCluster::new();
    let collection = &cluster.collection;
    cluster.server.inject_failures(
        100,
        Error::transport(TransportErrorKind::ServiceUnavailable, "down"),
    );

    let transactions = cluster.transactions_with(fast_txn_config().with_max_attempts(4));
    let failed = transactions
        .run(|ctx| ctx.get(collection, "doc").map(|_| ()))
        .unwrap_err();
    assert!(matches!(
        failed.error,
        Error::RetriesExhausted { attempts: 4, .. }
    ));
    assert_eq!(failed.outcome.attempt_count(), 4);
    assert_eq!(cluster.requests(), 4);
    assert_eq!(transactions.metrics().failed, 1);
}

#[test]
fn overall_timeout() {
    let cluster = TestCluster::new();
    let collection = &cluster.collection;
    collection.upsert("doc", json!({})).unwrap();

    let transactions =
        cluster.transactions_with(fast_txn_config().with_timeout(Duration::from_millis(20)));
    let failed = transactions
        .run(|ctx| {
            std::thread::sleep(Duration::from_millis(30));
            ctx.get(collection, "doc").map(|_| ())
        })
        .unwrap_err();
    assert!(matches!(failed.error, Error::TransactionExpired { .. }));
}

#[test]
fn commit_durability_checked() {
    let cluster = TestCluster::with_config(MemoryConfig::default().with_topology(1, 2));
    let collection = &cluster.collection;

    let transactions = cluster
        .transactions_with(fast_txn_config().with_durability(DurabilityLevel::Majority));
    let failed = transactions
        .run(|ctx| ctx.insert(collection, "doc", json!({})).map(|_| ()))
        .unwrap_err();
    assert!(matches!(failed.error, Error::DurabilityImpossible { .. }));
    assert_eq!(failed.outcome.status, AttemptStatus::Failed);
    assert!(!collection.exists("doc").unwrap().exists);
}

#[test]
fn lost_commit_reply_is_not_reapplied() {
    let server = Arc::new(MemoryServer::new());
    let transport = Arc::new(LostCommitReply {
        server: server.clone(),
        dropped: AtomicBool::new(false),
    });
    let connection = Connection::connect(transport, Credentials::new("tester", "secret")).unwrap();
    let collection = connection
        .open_collection(BUCKET, "_default", "_default")
        .unwrap();
    collection.upsert("counter", json!({"n": 0})).unwrap();

    let transactions = Transactions::with_config(&connection, fast_txn_config());
    let failed = transactions
        .run(|ctx| {
            let doc = ctx.get(&collection, "counter")?;
            let n = doc.content()["n"].as_i64().unwrap_or(0);
            ctx.replace(&doc, json!({"n": n + 1}))?;
            Ok(())
        })
        .unwrap_err();

    assert!(matches!(
        failed.error,
        Error::TransactionCommitAmbiguous { .. }
    ));
    assert_eq!(failed.outcome.attempt_count(), 1);
    assert_eq!(failed.outcome.status, AttemptStatus::Failed);
    assert_eq!(server.commit_count(), 1);
    assert_eq!(
        collection.get("counter").unwrap().content.into_inner(),
        json!({"n": 1})
    );
}

#[test]
fn expired_body_rolls_back_instead_of_committing() {
    let cluster = TestCluster::new();
    let collection = &cluster.collection;

    let transactions =
        cluster.transactions_with(fast_txn_config().with_timeout(Duration::from_millis(50)));
    let failed = transactions
        .run(|ctx| {
            ctx.insert(collection, "late", json!({}))?;
            std::thread::sleep(Duration::from_millis(80));
            Ok(())
        })
        .unwrap_err();

    assert!(matches!(failed.error, Error::TransactionExpired { .. }));
    assert_eq!(failed.outcome.status, AttemptStatus::RolledBack);
    assert_eq!(failed.outcome.attempts[0].status, AttemptStatus::RolledBack);
    assert_eq!(cluster.server.commit_count(), 0);
    assert!(!collection.exists("late").unwrap().exists);
}
