//! Lookup batch tests

use crate::common::*;

fn airport(cluster: &TestCluster) {
    cluster
        .collection
        .upsert(
            "airport_1",
            json!({"geo": {"alt": 14, "lat": 51.5}, "count": [1, 2, 3, 4, 5], "name": "Heathrow"}),
        )
        .unwrap();
}

#[test]
fn count_get_and_missing_path() {
    let cluster = TestCluster::new();
    airport(&cluster);

    let result = cluster
        .collection
        .lookup_in(
            "airport_1",
            vec![
                spec::count("count", SpecFlags::NONE).unwrap(),
                spec::get("geo.alt", SpecFlags::NONE).unwrap(),
                spec::exists("missing", SpecFlags::NONE).unwrap(),
                spec::get("missing", SpecFlags::NONE).unwrap(),
            ],
            LookupInOptions::default(),
        )
        .unwrap();

    assert_eq!(result.len(), 4);
    assert_eq!(result.content_as::<usize>(0).unwrap(), 5);
    assert_eq!(result.content_as::<i64>(1).unwrap(), 14);
    assert!(!result.exists(2).unwrap());
    assert_eq!(
        result.content(3).unwrap_err(),
        Error::PathNotFound {
            index: 3,
            path: "missing".into()
        }
    );
}

#[test]
fn failed_spec_does_not_hide_others() {
    let cluster = TestCluster::new();
    airport(&cluster);

    let result = cluster
        .collection
        .lookup_in(
            "airport_1",
            vec![
                spec::count("name", SpecFlags::NONE).unwrap(),
                spec::get("count[-1]", SpecFlags::NONE).unwrap(),
            ],
            LookupInOptions::default(),
        )
        .unwrap();
    assert!(matches!(
        result.content(0),
        Err(Error::PathMismatch { index: 0, .. })
    ));
    assert_eq!(result.content_as::<i64>(1).unwrap(), 5);
}

#[test]
fn missing_document() {
    let cluster = TestCluster::new();
    let err = cluster
        .collection
        .lookup_in(
            "nope",
            vec![spec::get("a", SpecFlags::NONE).unwrap()],
            LookupInOptions::default(),
        )
        .unwrap_err();
    assert_eq!(err, Error::DocumentNotFound { key: "nope".into() });
}

#[test]
fn virtual_document_attributes() {
    let cluster = TestCluster::new();
    airport(&cluster);
    let stored = cluster.collection.get("airport_1").unwrap();

    let result = cluster
        .collection
        .lookup_in(
            "airport_1",
            vec![
                spec::get("$document.CAS", SpecFlags::XATTR).unwrap(),
                spec::get("$document.exptime", SpecFlags::XATTR).unwrap(),
                spec::get("$document.deleted", SpecFlags::XATTR).unwrap(),
            ],
            LookupInOptions::default(),
        )
        .unwrap();
    assert_eq!(
        result.content_as::<String>(0).unwrap(),
        format!("0x{:016x}", stored.cas.as_u64())
    );
    assert_eq!(result.content_as::<i64>(1).unwrap(), 0);
    assert!(!result.content_as::<bool>(2).unwrap());
}

#[test]
fn user_xattrs_are_separate_from_body() {
    let cluster = TestCluster::new();
    airport(&cluster);
    cluster
        .collection
        .mutate_in(
            "airport_1",
            vec![spec::upsert(
                "meta.owner",
                "ops",
                SpecFlags::XATTR.with_create_parents(true),
            )
            .unwrap()],
            MutateInOptions::default(),
        )
        .unwrap();

    let result = cluster
        .collection
        .lookup_in(
            "airport_1",
            vec![
                spec::get("meta.owner", SpecFlags::XATTR).unwrap(),
                spec::exists("meta", SpecFlags::NONE).unwrap(),
            ],
            LookupInOptions::default(),
        )
        .unwrap();
    assert_eq!(result.content_as::<String>(0).unwrap(), "ops");
    assert!(!result.exists(1).unwrap());
}

#[test]
fn lookup_on_async_collection() {
    let cluster = TestCluster::new();
    airport(&cluster);
    let collection = cluster.collection.as_async().clone();
    let result = cluster
        .collection
        .channel()
        .block_on(async move {
            collection
                .lookup_in(
                    "airport_1",
                    vec![spec::get("name", SpecFlags::NONE).unwrap()],
                    LookupInOptions::default(),
                )
                .await
        })
        .unwrap();
    assert_eq!(result.content_as::<String>(0).unwrap(), "Heathrow");
}
