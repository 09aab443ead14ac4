//! Batch options and pre-flight validation tests

use crate::common::*;

fn one_upsert() -> Vec<CommandSpec> {
    vec![spec::upsert("a", 1, SpecFlags::NONE).unwrap()]
}

#[test]
fn conflicting_store_flags_never_reach_server() {
    let cluster = TestCluster::new();
    let err = MutateInOptions::from_store_flags(true, true, false).unwrap_err();
    assert!(err.is_validation());
    assert_eq!(cluster.requests(), 0);
}

#[test]
fn invalid_option_combinations_fail_locally() {
    let cluster = TestCluster::new();
    let cases = vec![
        MutateInOptions::new()
            .store_semantics(StoreSemantics::Insert)
            .preserve_expiry(true),
        MutateInOptions::new()
            .preserve_expiry(true)
            .expiry(Duration::from_secs(60)),
        MutateInOptions::new()
            .store_semantics(StoreSemantics::Insert)
            .cas(Cas(1)),
    ];
    for options in cases {
        let err = cluster
            .collection
            .mutate_in("doc", one_upsert(), options)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }), "{:?}", err);
    }
    assert_eq!(cluster.requests(), 0);
}

#[test]
fn malformed_batches_fail_locally() {
    let cluster = TestCluster::new();

    let empty = cluster
        .collection
        .mutate_in("doc", Vec::new(), MutateInOptions::default())
        .unwrap_err();
    assert!(empty.is_validation());

    let too_many: Vec<CommandSpec> = (0..17)
        .map(|i| spec::upsert(format!("f{}", i), i, SpecFlags::NONE).unwrap())
        .collect();
    let err = cluster
        .collection
        .mutate_in("doc", too_many, MutateInOptions::default())
        .unwrap_err();
    assert!(err.is_validation());

    let mixed = CommandBatch::mutation(
        vec![
            spec::upsert("a", 1, SpecFlags::NONE).unwrap(),
            spec::get("a", SpecFlags::NONE).unwrap(),
        ],
        MutateInOptions::default(),
    );
    assert!(cluster.collection.execute("doc", mixed).unwrap_err().is_validation());

    let long_key = "k".repeat(251);
    assert!(cluster
        .collection
        .mutate_in(&long_key, one_upsert(), MutateInOptions::default())
        .unwrap_err()
        .is_validation());

    assert_eq!(cluster.requests(), 0);
}

#[test]
fn path_syntax_errors_fail_locally() {
    assert!(matches!(
        spec::get("a..b", SpecFlags::NONE),
        Err(Error::PathSyntax(_))
    ));
    assert!(matches!(
        spec::get("a[x]", SpecFlags::NONE),
        Err(Error::PathSyntax(_))
    ));
    assert!(spec::increment("n", 0, SpecFlags::NONE).is_err());
    assert!(spec::get("a", SpecFlags::CREATE_PARENTS).is_err());
}

#[test]
fn store_semantics() {
    let cluster = TestCluster::new();

    let err = cluster
        .collection
        .mutate_in("doc", one_upsert(), MutateInOptions::default())
        .unwrap_err();
    assert_eq!(err, Error::DocumentNotFound { key: "doc".into() });

    cluster
        .collection
        .mutate_in(
            "doc",
            one_upsert(),
            MutateInOptions::new().store_semantics(StoreSemantics::Upsert),
        )
        .unwrap();
    assert_eq!(
        cluster.collection.get("doc").unwrap().content.into_inner(),
        json!({"a": 1})
    );

    let err = cluster
        .collection
        .mutate_in(
            "doc",
            one_upsert(),
            MutateInOptions::from_store_flags(true, false, false).unwrap(),
        )
        .unwrap_err();
    assert_eq!(err, Error::DocumentExists { key: "doc".into() });
}

#[test]
fn preserve_expiry_keeps_prior_expiry() {
    let cluster = TestCluster::new();
    cluster
        .collection
        .store(
            "doc",
            json!({}),
            StoreSemantics::Upsert,
            WriteOptions {
                expiry: Some(Duration::from_secs(3600)),
                ..Default::default()
            },
        )
        .unwrap();
    let original = cluster.collection.get_with_expiry("doc").unwrap().expiry;
    assert!(original.is_some());

    let result = cluster
        .collection
        .mutate_in(
            "doc",
            one_upsert(),
            MutateInOptions::new().preserve_expiry(true),
        )
        .unwrap();
    assert_eq!(result.expiry(), original);

    let result = cluster
        .collection
        .mutate_in("doc", one_upsert(), MutateInOptions::default())
        .unwrap();
    assert_eq!(result.expiry(), None);
}

#[test]
fn out_of_range_expiry_fails_locally() {
    let cluster = TestCluster::new();
    let huge = Duration::from_secs(10_000_000_000_000);

    let err = cluster
        .collection
        .mutate_in(
            "doc",
            one_upsert(),
            MutateInOptions::new()
                .store_semantics(StoreSemantics::Upsert)
                .expiry(huge),
        )
        .unwrap_err();
    assert!(err.is_validation());

    let err = cluster
        .collection
        .store(
            "doc",
            json!({}),
            StoreSemantics::Upsert,
            WriteOptions {
                expiry: Some(huge),
                ..Default::default()
            },
        )
        .unwrap_err();
    assert!(err.is_validation());
    assert_eq!(cluster.requests(), 0);
}

#[test]
fn server_rejects_unrepresentable_expiry() {
    let cluster = TestCluster::new();
    let id = cluster.collection.doc_id("doc").unwrap();
    let err = cluster
        .server
        .handle(Request::MutateIn {
            id: id.clone(),
            specs: one_upsert(),
            options: MutateInRequestOptions {
                store_semantics: StoreSemantics::Upsert,
                write: WriteOptions {
                    expiry: Some(Duration::from_secs(10_000_000_000_000)),
                    ..Default::default()
                },
            },
        })
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument { .. }), "{:?}", err);

    // the server is still usable afterwards
    assert!(!cluster.collection.exists("doc").unwrap().exists);
    cluster.collection.upsert("doc", json!({})).unwrap();
}

#[test]
fn expired_documents_disappear() {
    let cluster = TestCluster::new();
    cluster
        .collection
        .mutate_in(
            "doc",
            one_upsert(),
            MutateInOptions::new()
                .store_semantics(StoreSemantics::Upsert)
                .expiry(Duration::from_secs(10)),
        )
        .unwrap();
    assert!(cluster.collection.exists("doc").unwrap().exists);
    cluster.server.advance_clock(Duration::from_secs(11));
    assert!(!cluster.collection.exists("doc").unwrap().exists);
}

#[test]
fn durability_impossible_on_small_cluster() {
    let cluster = TestCluster::with_config(MemoryConfig::default().with_topology(1, 2));
    cluster.collection.upsert("doc", json!({})).unwrap();
    let err = cluster
        .collection
        .mutate_in(
            "doc",
            one_upsert(),
            MutateInOptions::new().durability(DurabilityLevel::Majority),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        Error::DurabilityImpossible {
            level: DurabilityLevel::Majority,
            ..
        }
    ));
}

#[test]
fn cas_precondition() {
    let cluster = TestCluster::new();
    let first = cluster.collection.upsert("doc", json!({})).unwrap();
    cluster.collection.upsert("doc", json!({"v": 2})).unwrap();

    let err = cluster
        .collection
        .mutate_in("doc", one_upsert(), MutateInOptions::new().cas(first.cas))
        .unwrap_err();
    assert!(matches!(err, Error::CasMismatch { .. }));

    let current = cluster.collection.get("doc").unwrap().cas;
    let result = cluster
        .collection
        .mutate_in("doc", one_upsert(), MutateInOptions::new().cas(current))
        .unwrap();
    assert!(result.cas() > current);
}

#[test]
fn transient_failures_surface_to_caller() {
    let cluster = TestCluster::new();
    cluster.collection.upsert("doc", json!({})).unwrap();
    cluster.server.inject_failure(Error::transport(
        TransportErrorKind::Timeout,
        "slow node",
    ));
    let err = cluster
        .collection
        .mutate_in("doc", one_upsert(), MutateInOptions::default())
        .unwrap_err();
    assert!(err.is_retryable());
    assert!(cluster
        .collection
        .mutate_in("doc", one_upsert(), MutateInOptions::default())
        .is_ok());
}
