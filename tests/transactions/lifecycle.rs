//! Commit and rollback lifecycle tests

use crate::common::*;

#[test]
fn commit_applies_all_writes() {
    let cluster = TestCluster::new();
    let collection = &cluster.collection;
    collection.upsert("alice", json!({"balance": 100})).unwrap();
    collection.upsert("bob", json!({"balance": 0})).unwrap();
    collection.upsert("tmp", json!({})).unwrap();

    let result = cluster
        .transactions()
        .run(|ctx| {
            let alice = ctx.get(collection, "alice")?;
            let bob = ctx.get(collection, "bob")?;
            let a: i64 = alice.content()["balance"].as_i64().unwrap_or(0);
            let b: i64 = bob.content()["balance"].as_i64().unwrap_or(0);
            ctx.replace(&alice, json!({"balance": a - 30}))?;
            ctx.replace(&bob, json!({"balance": b + 30}))?;
            ctx.insert(collection, "audit", json!({"moved": 30}))?;
            let tmp = ctx.get(collection, "tmp")?;
            ctx.remove(&tmp)?;
            Ok(())
        })
        .unwrap();

    assert!(result.outcome.is_committed());
    assert!(result.outcome.unstaging_complete);
    assert_eq!(cluster.server.commit_count(), 1);
    assert_eq!(
        collection.get("alice").unwrap().content.into_inner(),
        json!({"balance": 70})
    );
    assert_eq!(
        collection.get("bob").unwrap().content.into_inner(),
        json!({"balance": 30})
    );
    assert!(collection.exists("audit").unwrap().exists);
    assert!(!collection.exists("tmp").unwrap().exists);
}

#[test]
fn body_error_rolls_back_staged_insert() {
    let cluster = TestCluster::new();
    let collection = &cluster.collection;

    let failed = cluster
        .transactions()
        .run(|ctx| -> Result<()> {
            ctx.insert(collection, "ghost", json!({"v": 1}))?;
            Err(Error::application("changed my mind"))
        })
        .unwrap_err();

    assert_eq!(failed.outcome.status, AttemptStatus::RolledBack);
    assert_eq!(failed.outcome.attempt_count(), 1);
    assert_eq!(
        collection.get("ghost").unwrap_err(),
        Error::DocumentNotFound {
            key: "ghost".into()
        }
    );
    assert_eq!(cluster.server.commit_count(), 0);
}

#[test]
fn staged_writes_invisible_until_commit() {
    let cluster = TestCluster::new();
    let collection = &cluster.collection;

    cluster
        .transactions()
        .run(|ctx| {
            ctx.insert(collection, "pending", json!({"v": 1}))?;
            assert!(!collection.exists("pending")?.exists);
            let seen = ctx.get(collection, "pending")?;
            assert_eq!(seen.content().as_inner(), &json!({"v": 1}));
            Ok(())
        })
        .unwrap();
    assert!(collection.exists("pending").unwrap().exists);
}

#[test]
fn explicit_rollback_is_not_a_failure() {
    let cluster = TestCluster::new();
    let collection = &cluster.collection;
    collection.upsert("doc", json!({"v": 1})).unwrap();
    let transactions = cluster.transactions();

    let result = transactions
        .run(|ctx| {
            let doc = ctx.get(collection, "doc")?;
            ctx.replace(&doc, json!({"v": 2}))?;
            ctx.rollback()?;
            Ok(doc.cas())
        })
        .unwrap();
    assert!(result.outcome.is_rolled_back());
    assert_eq!(
        collection.get("doc").unwrap().content.into_inner(),
        json!({"v": 1})
    );
    assert_eq!(transactions.metrics().rolled_back, 1);
    assert_eq!(transactions.metrics().failed, 0);
}

#[test]
fn domain_errors_pass_through() {
    let cluster = TestCluster::new();
    let collection = &cluster.collection;
    collection.upsert("taken", json!({})).unwrap();

    let failed = cluster
        .transactions()
        .run(|ctx| ctx.get(collection, "absent").map(|_| ()))
        .unwrap_err();
    assert_eq!(
        failed.error,
        Error::DocumentNotFound {
            key: "absent".into()
        }
    );

    let failed = cluster
        .transactions()
        .run(|ctx| ctx.insert(collection, "taken", json!({})).map(|_| ()))
        .unwrap_err();
    assert_eq!(
        failed.error,
        Error::DocumentExists {
            key: "taken".into()
        }
    );
}

#[test]
fn failure_converts_into_client_error() {
    fn transfer(cluster: &TestCluster) -> Result<()> {
        cluster
            .transactions()
            .run(|ctx| ctx.get(&cluster.collection, "nobody").map(|_| ()))?;
        Ok(())
    }
    let cluster = TestCluster::new();
    assert!(matches!(
        transfer(&cluster),
        Err(Error::DocumentNotFound { .. })
    ));
}
