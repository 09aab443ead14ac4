//! Tessera - sub-document and transaction client for a distributed JSON document store
//!
//! Tessera gives callers two things on top of a request/response transport:
//! batched sub-document commands addressed by path, and multi-document
//! transactions with optimistic concurrency and automatic retry.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use tessera::spec::{self, SpecFlags};
//! use tessera::{Connection, Credentials, LookupInOptions, MemoryServer};
//!
//! let connection = Connection::connect(Arc::new(MemoryServer::new()), Credentials::new("app", "secret"))?;
//! let collection = connection.open_collection("travel", "_default", "_default")?;
//! collection.upsert("airport_1", serde_json::json!({"geo": {"alt": 14}}))?;
//!
//! let result = collection.lookup_in(
//!     "airport_1",
//!     vec![spec::get("geo.alt", SpecFlags::NONE)?],
//!     LookupInOptions::default(),
//! )?;
//! assert_eq!(result.content_as::<i64>(0)?, 14);
//! ```
//!
//! # Architecture
//!
//! - `tessera-core`: paths, command specs, shared types, errors
//! - `tessera-client`: transport seam, connection, collections, batches
//! - `tessera-transactions`: attempt context and retrying orchestrator
//! - `tessera-memory`: in-process reference server

pub use tessera_core::*;

pub use tessera_client::{
    AsyncCollection, BatchKind, BatchResult, Channel, ClientConfig, Collection, CommandBatch,
    Connection, Credentials, ExistsResult, GetResult, LookupInOptions, LookupInResult,
    MutateInOptions, MutateInResult, MutationResult, Transport, CONFIG_FILE_NAME,
};

pub use tessera_transactions::{
    AttemptContext, AttemptRecord, AttemptStatus, TransactionConfig, TransactionFailed,
    TransactionGetResult, TransactionMetrics, TransactionOutcome, TransactionQueryResult,
    TransactionResult, Transactions,
};

pub use tessera_memory::{MemoryConfig, MemoryServer, QueryOutput, StagedView};
