//! Mutation batch tests

use crate::common::*;

fn body(cluster: &TestCluster, key: &str) -> serde_json::Value {
    cluster.collection.get(key).unwrap().content.into_inner()
}

#[test]
fn append_to_root_array() {
    let cluster = TestCluster::new();
    cluster.collection.upsert("list", json!([1, 2, 3, 4])).unwrap();

    cluster
        .collection
        .mutate_in(
            "list",
            vec![spec::array_append("", [5], SpecFlags::NONE).unwrap()],
            MutateInOptions::default(),
        )
        .unwrap();
    assert_eq!(body(&cluster, "list"), json!([1, 2, 3, 4, 5]));
}

#[test]
fn counter_increment_then_decrement() {
    let cluster = TestCluster::new();
    cluster.collection.upsert("stats", json!({})).unwrap();

    let result = cluster
        .collection
        .mutate_in(
            "stats",
            vec![spec::increment("counter", 50, SpecFlags::CREATE_PARENTS).unwrap()],
            MutateInOptions::default(),
        )
        .unwrap();
    assert_eq!(result.content_as::<i64>(0).unwrap(), 50);

    let result = cluster
        .collection
        .mutate_in(
            "stats",
            vec![spec::decrement("counter", 20, SpecFlags::NONE).unwrap()],
            MutateInOptions::default(),
        )
        .unwrap();
    assert_eq!(result.content_as::<i64>(0).unwrap(), 30);
    assert_eq!(body(&cluster, "stats"), json!({"counter": 30}));
}

#[test]
fn increment_missing_counter_without_create_parents() {
    let cluster = TestCluster::new();
    cluster.collection.upsert("stats", json!({})).unwrap();
    let err = cluster
        .collection
        .mutate_in(
            "stats",
            vec![spec::increment("counter", 1, SpecFlags::NONE).unwrap()],
            MutateInOptions::default(),
        )
        .unwrap_err();
    assert!(matches!(err, Error::PathNotFound { index: 0, .. }));
}

#[test]
fn array_edits_in_one_batch() {
    let cluster = TestCluster::new();
    cluster
        .collection
        .upsert("doc", json!({"tags": ["b", "c"]}))
        .unwrap();

    cluster
        .collection
        .mutate_in(
            "doc",
            vec![
                spec::array_prepend("tags", ["a"], SpecFlags::NONE).unwrap(),
                spec::array_insert("tags[1]", ["x", "y"], SpecFlags::NONE).unwrap(),
                spec::array_append("tags[-1]", ["z"], SpecFlags::NONE).unwrap(),
                spec::array_add_unique("tags", "q", SpecFlags::NONE).unwrap(),
                spec::array_append("new.list", [1, 2], SpecFlags::CREATE_PARENTS).unwrap(),
            ],
            MutateInOptions::default(),
        )
        .unwrap();
    assert_eq!(
        body(&cluster, "doc"),
        json!({
            "tags": ["a", "x", "y", "b", "c", "z", "q"],
            "new": {"list": [1, 2]}
        })
    );
}

#[test]
fn add_unique_duplicate_leaves_document_untouched() {
    let cluster = TestCluster::new();
    let stored = cluster
        .collection
        .upsert("doc", json!({"tags": ["a", "b"]}))
        .unwrap();

    let err = cluster
        .collection
        .mutate_in(
            "doc",
            vec![spec::array_add_unique("tags", "a", SpecFlags::NONE).unwrap()],
            MutateInOptions::default(),
        )
        .unwrap_err();
    assert_eq!(
        err,
        Error::PathExists {
            index: 0,
            path: "tags".into()
        }
    );
    let after = cluster.collection.get("doc").unwrap();
    assert_eq!(after.cas, stored.cas);
    assert_eq!(after.content.into_inner(), json!({"tags": ["a", "b"]}));
}

#[test]
fn failing_spec_aborts_whole_batch() {
    let cluster = TestCluster::new();
    cluster.collection.upsert("doc", json!({"a": 1})).unwrap();

    let err = cluster
        .collection
        .mutate_in(
            "doc",
            vec![
                spec::upsert("b", 2, SpecFlags::NONE).unwrap(),
                spec::replace("missing", 3, SpecFlags::NONE).unwrap(),
            ],
            MutateInOptions::default(),
        )
        .unwrap_err();
    assert_eq!(err.spec_index(), Some(1));
    assert_eq!(body(&cluster, "doc"), json!({"a": 1}));
}

#[test]
fn field_edits() {
    let cluster = TestCluster::new();
    cluster
        .collection
        .upsert("doc", json!({"name": "old", "drop": true}))
        .unwrap();

    let result = cluster
        .collection
        .mutate_in(
            "doc",
            vec![
                spec::replace("name", "new", SpecFlags::NONE).unwrap(),
                spec::remove("drop", SpecFlags::NONE).unwrap(),
                spec::insert("geo.alt", 14, SpecFlags::CREATE_PARENTS).unwrap(),
                spec::upsert("`a.b`", "dotted", SpecFlags::NONE).unwrap(),
            ],
            MutateInOptions::default(),
        )
        .unwrap();
    assert!(result.seqno().is_some());
    assert!(matches!(
        result.content(0),
        Err(Error::InvalidArgument { .. })
    ));

    let doc = body(&cluster, "doc");
    assert_eq!(doc["name"], json!("new"));
    assert!(doc.get("drop").is_none());
    assert_eq!(doc["geo"]["alt"], json!(14));
    assert_eq!(doc["a.b"], json!("dotted"));
}

#[test]
fn macros_expand_to_new_version() {
    let cluster = TestCluster::new();
    cluster.collection.upsert("doc", json!({"v": 1})).unwrap();

    let result = cluster
        .collection
        .mutate_in(
            "doc",
            vec![
                spec::upsert_macro("txn.cas", MutationMacro::Cas, SpecFlags::XATTR.with_create_parents(true))
                    .unwrap(),
                spec::upsert("v", 2, SpecFlags::NONE).unwrap(),
            ],
            MutateInOptions::default(),
        )
        .unwrap();

    let lookup = cluster
        .collection
        .lookup_in(
            "doc",
            vec![spec::get("txn.cas", SpecFlags::XATTR).unwrap()],
            LookupInOptions::default(),
        )
        .unwrap();
    assert_eq!(
        lookup.content_as::<String>(0).unwrap(),
        format!("0x{:016x}", result.cas().as_u64())
    );
}

#[test]
fn virtual_attributes_are_read_only() {
    let err = spec::upsert("$document.exptime", 1, SpecFlags::XATTR).unwrap_err();
    assert!(err.is_validation());
}
