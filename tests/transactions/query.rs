//! Statements executed inside a transaction

use crate::common::*;

/// Handler understanding two statements:
/// - `SELECT COUNT` counts documents in the default collection
/// - `UPDATE <key>` sets `touched` on one document (named parameter `$value`)
fn install_handler(cluster: &TestCluster) {
    let keyspace = cluster.collection.keyspace().clone();
    cluster
        .server
        .set_query_handler(move |statement, options, view| {
            if statement == "SELECT COUNT" {
                let count = view.documents(&keyspace).len();
                return Ok(QueryOutput::rows(vec![json!({"count": count}).into()]));
            }
            if let Some(key) = statement.strip_prefix("UPDATE ") {
                let id = keyspace.doc(key);
                let mut body = view
                    .get(&id)
                    .ok_or_else(|| Error::DocumentNotFound { key: key.to_string() })?;
                let value = options
                    .named_parameters
                    .get("value")
                    .cloned()
                    .unwrap_or(serde_json::Value::Bool(true));
                body["touched"] = value;
                return Ok(QueryOutput {
                    rows: Vec::new(),
                    staged: vec![StagedMutation::Replace {
                        cas: view.committed_cas(&id),
                        id,
                        value: body.into(),
                    }],
                });
            }
            Err(Error::invalid_argument(format!("unknown statement: {}", statement)))
        });
}

#[test]
fn query_sees_staged_writes() {
    let cluster = TestCluster::new();
    install_handler(&cluster);
    let collection = &cluster.collection;
    collection.upsert("a", json!({})).unwrap();

    let result = cluster
        .transactions()
        .run(|ctx| {
            ctx.insert(collection, "b", json!({}))?;
            let rows = ctx.query("SELECT COUNT", QueryOptions::default())?;
            Ok(rows.rows()[0]["count"].as_u64().unwrap_or(0))
        })
        .unwrap();
    assert_eq!(result.value, 2);
}

#[test]
fn query_writes_join_the_attempt() {
    let cluster = TestCluster::new();
    install_handler(&cluster);
    let collection = &cluster.collection;
    collection.upsert("a", json!({"v": 1})).unwrap();

    cluster
        .transactions()
        .run(|ctx| {
            ctx.query(
                "UPDATE a",
                QueryOptions::default().named("value", json!("yes")),
            )?;
            let seen = ctx.get(collection, "a")?;
            assert_eq!(seen.content().as_inner(), &json!({"v": 1, "touched": "yes"}));
            assert!(collection.get("a")?.content.as_inner().get("touched").is_none());
            Ok(())
        })
        .unwrap();
    assert_eq!(
        collection.get("a").unwrap().content.into_inner(),
        json!({"v": 1, "touched": "yes"})
    );
}

#[test]
fn read_only_statement_cannot_write() {
    let cluster = TestCluster::new();
    install_handler(&cluster);
    let collection = &cluster.collection;
    collection.upsert("a", json!({})).unwrap();

    let failed = cluster
        .transactions()
        .run(|ctx| ctx.query("UPDATE a", QueryOptions::default().read_only(true)).map(|_| ()))
        .unwrap_err();
    assert!(failed.error.is_validation());
}

#[test]
fn query_without_service_is_normalized() {
    let cluster = TestCluster::new();
    let failed = cluster
        .transactions()
        .run(|ctx| ctx.query("SELECT 1", QueryOptions::default()).map(|_| ()))
        .unwrap_err();
    assert!(matches!(
        failed.error,
        Error::TransactionOperationFailed { .. }
    ));
}
