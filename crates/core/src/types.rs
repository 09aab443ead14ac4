//! Shared types
//!
//! This module defines the identifiers and option enums used across crates:
//! - Keyspace / DocId: document identity (bucket.scope.collection + key)
//! - Cas: document version token
//! - StoreSemantics: whole-document existence precondition for mutations
//! - DurabilityLevel: replication/persistence requirement for a write
//! - QueryOptions / ScanConsistency: options for transactional queries
//! - MutationMacro: server-expanded placeholders for xattr mutations
//! - TransactionId / AttemptId: UUID v4 identifiers

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Name of the default scope and collection
pub const DEFAULT_NAME: &str = "_default";

/// Bucket, scope and collection a document lives in
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Keyspace {
    /// Bucket name
    pub bucket: String,
    /// Scope name
    pub scope: String,
    /// Collection name
    pub collection: String,
}

impl Keyspace {
    /// Create a keyspace
    pub fn new(
        bucket: impl Into<String>,
        scope: impl Into<String>,
        collection: impl Into<String>,
    ) -> Self {
        Keyspace {
            bucket: bucket.into(),
            scope: scope.into(),
            collection: collection.into(),
        }
    }

    /// The default scope and collection of a bucket
    pub fn default_collection(bucket: impl Into<String>) -> Self {
        Self::new(bucket, DEFAULT_NAME, DEFAULT_NAME)
    }

    /// Identity of a document in this keyspace
    pub fn doc(&self, key: impl Into<String>) -> DocId {
        DocId {
            keyspace: self.clone(),
            key: key.into(),
        }
    }
}

impl fmt::Display for Keyspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.bucket, self.scope, self.collection)
    }
}

/// Document identity: keyspace plus key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocId {
    /// Keyspace the document lives in
    pub keyspace: Keyspace,
    /// Document key
    pub key: String,
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.keyspace, self.key)
    }
}

/// Document version token
///
/// Changes on every mutation of the document. Zero means "no token".
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct Cas(pub u64);

impl Cas {
    /// Get the raw value
    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Check if this is the empty token
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Cas {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whole-document existence precondition for a mutation batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreSemantics {
    /// Document must exist
    #[default]
    Replace,
    /// Create the document if missing
    Upsert,
    /// Document must not exist
    Insert,
}

impl StoreSemantics {
    /// Resolve flag-style options into a single store semantics
    ///
    /// At most one flag may be set; none selects `Replace`.
    pub fn from_flags(insert: bool, upsert: bool, replace: bool) -> Result<Self> {
        match (insert, upsert, replace) {
            (false, false, false) | (false, false, true) => Ok(StoreSemantics::Replace),
            (true, false, false) => Ok(StoreSemantics::Insert),
            (false, true, false) => Ok(StoreSemantics::Upsert),
            _ => Err(Error::invalid_argument(
                "only one of insert, upsert or replace may be requested",
            )),
        }
    }
}

impl fmt::Display for StoreSemantics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StoreSemantics::Replace => "replace",
            StoreSemantics::Upsert => "upsert",
            StoreSemantics::Insert => "insert",
        };
        f.write_str(name)
    }
}

/// Replication/persistence requirement for a write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DurabilityLevel {
    /// Acknowledged once in memory on the active node
    #[default]
    None,
    /// Replicated to a majority of nodes
    Majority,
    /// Majority replication plus persisted on the active node
    MajorityAndPersistToActive,
    /// Persisted on a majority of nodes
    PersistToMajority,
}

impl DurabilityLevel {
    /// Check if the level needs any replica acknowledgement
    pub fn requires_majority(&self) -> bool {
        !matches!(self, DurabilityLevel::None)
    }

    /// Check if the level needs persistence somewhere
    pub fn requires_persistence(&self) -> bool {
        matches!(
            self,
            DurabilityLevel::MajorityAndPersistToActive | DurabilityLevel::PersistToMajority
        )
    }
}

impl fmt::Display for DurabilityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DurabilityLevel::None => "none",
            DurabilityLevel::Majority => "majority",
            DurabilityLevel::MajorityAndPersistToActive => "majority_and_persist_to_active",
            DurabilityLevel::PersistToMajority => "persist_to_majority",
        };
        f.write_str(name)
    }
}

impl FromStr for DurabilityLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(DurabilityLevel::None),
            "majority" => Ok(DurabilityLevel::Majority),
            "majority_and_persist_to_active" => Ok(DurabilityLevel::MajorityAndPersistToActive),
            "persist_to_majority" => Ok(DurabilityLevel::PersistToMajority),
            other => Err(Error::invalid_argument(format!(
                "unknown durability level: {}",
                other
            ))),
        }
    }
}

/// Consistency requirement for a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanConsistency {
    /// Serve from whatever the index has
    #[default]
    NotBounded,
    /// Wait for all mutations up to the request to be indexed
    RequestPlus,
}

/// Options for a query statement
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QueryOptions {
    /// Positional parameters (`$1`, `$2`, ...)
    pub positional_parameters: Vec<serde_json::Value>,
    /// Named parameters (`$name`)
    pub named_parameters: BTreeMap<String, serde_json::Value>,
    /// Reject statements that mutate
    pub read_only: bool,
    /// Scan consistency
    pub scan_consistency: ScanConsistency,
    /// Per-statement timeout
    pub timeout: Option<Duration>,
}

impl QueryOptions {
    /// Create default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a positional parameter
    pub fn positional(mut self, value: impl Into<serde_json::Value>) -> Self {
        self.positional_parameters.push(value.into());
        self
    }

    /// Add a named parameter
    pub fn named(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.named_parameters.insert(name.into(), value.into());
        self
    }

    /// Mark the statement read-only
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Set scan consistency
    pub fn scan_consistency(mut self, consistency: ScanConsistency) -> Self {
        self.scan_consistency = consistency;
        self
    }

    /// Set a statement timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Placeholder expanded by the server when a mutation is applied
///
/// Only valid on xattr specs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MutationMacro {
    /// New document CAS, as a hex string
    Cas,
    /// New sequence number, as a hex string
    SequenceNumber,
    /// CRC32C of the document body, as a hex string
    ValueCrc32c,
}

impl MutationMacro {
    /// Macro text as sent on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationMacro::Cas => "${Mutation.CAS}",
            MutationMacro::SequenceNumber => "${Mutation.seqno}",
            MutationMacro::ValueCrc32c => "${Mutation.value_crc32c}",
        }
    }

    /// Recognize a macro string
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "${Mutation.CAS}" => Some(MutationMacro::Cas),
            "${Mutation.seqno}" => Some(MutationMacro::SequenceNumber),
            "${Mutation.value_crc32c}" => Some(MutationMacro::ValueCrc32c),
            _ => None,
        }
    }
}

/// Identifier of a transaction (stable across attempts)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(Uuid);

impl TransactionId {
    /// Create a new random id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of one attempt of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttemptId(Uuid);

impl AttemptId {
    /// Create a new random id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AttemptId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
