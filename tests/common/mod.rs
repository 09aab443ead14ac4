//! Shared test utilities for all integration test suites.
//!
//! Import via `#[path = "../common/mod.rs"] mod common;` from a suite's main.rs.

#![allow(dead_code)]
#![allow(unused_imports)]

pub use serde_json::json;
pub use std::sync::Arc;
pub use std::time::Duration;
pub use tessera::*;

/// Default bucket for test documents
pub const BUCKET: &str = "travel-sample";

// ============================================================================
// Tracing
// ============================================================================

/// Install a subscriber honouring `RUST_LOG` (no-op after the first call)
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ============================================================================
// TestCluster - server + connection + default collection
// ============================================================================

/// In-process server with a connection and an open default collection
pub struct TestCluster {
    pub server: Arc<MemoryServer>,
    pub connection: Connection,
    pub collection: Collection,
}

impl TestCluster {
    /// One node, no replicas
    pub fn new() -> Self {
        Self::with_config(MemoryConfig::default())
    }

    /// Explicit server topology
    pub fn with_config(config: MemoryConfig) -> Self {
        init_tracing();
        let server = Arc::new(MemoryServer::with_config(config));
        let connection = Connection::connect(server.clone(), Credentials::new("tester", "secret"))
            .expect("connect to memory server");
        let collection = connection
            .open_collection(BUCKET, "_default", "_default")
            .expect("open default collection");
        TestCluster {
            server,
            connection,
            collection,
        }
    }

    /// Open another collection on the same connection
    pub fn collection(&self, scope: &str, name: &str) -> Collection {
        self.connection
            .open_collection(BUCKET, scope, name)
            .expect("open collection")
    }

    /// Orchestrator with short backoff
    pub fn transactions(&self) -> Transactions {
        Transactions::with_config(&self.connection, fast_txn_config())
    }

    /// Orchestrator with an explicit configuration
    pub fn transactions_with(&self, config: TransactionConfig) -> Transactions {
        Transactions::with_config(&self.connection, config)
    }

    /// Requests the server has seen since the last reset
    pub fn requests(&self) -> u64 {
        self.server.request_count()
    }
}

/// Transaction config with 1ms deterministic backoff
pub fn fast_txn_config() -> TransactionConfig {
    TransactionConfig::new()
        .with_base_delay_ms(1)
        .with_max_delay_ms(5)
        .with_jitter(false)
}
