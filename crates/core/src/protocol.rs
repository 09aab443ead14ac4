//! Requests and responses exchanged with the server
//!
//! These are structured messages; encoding them for a particular wire is the
//! transport's concern.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::json::JsonValue;
use crate::spec::CommandSpec;
use crate::types::{AttemptId, Cas, DocId, DurabilityLevel, QueryOptions, StoreSemantics, TransactionId};

/// Document-level options for whole-document writes
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WriteOptions {
    /// Time to live; `None` clears any existing expiry unless preserved
    pub expiry: Option<Duration>,
    /// Keep the current expiry
    pub preserve_expiry: bool,
    /// Durability requirement
    pub durability: DurabilityLevel,
    /// Version precondition
    pub cas: Option<Cas>,
}

/// Document-level options for a mutate-in batch
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MutateInRequestOptions {
    /// Existence precondition
    pub store_semantics: StoreSemantics,
    /// Expiry, CAS and durability
    pub write: WriteOptions,
}

/// A write staged by a transaction attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StagedMutation {
    /// Create a document that must not exist
    Insert {
        /// Target document
        id: DocId,
        /// Staged body
        value: JsonValue,
    },
    /// Overwrite a document read at `cas`
    Replace {
        /// Target document
        id: DocId,
        /// Version the write expects
        cas: Cas,
        /// Staged body
        value: JsonValue,
    },
    /// Delete a document read at `cas`
    Remove {
        /// Target document
        id: DocId,
        /// Version the write expects
        cas: Cas,
    },
}

impl StagedMutation {
    /// Document this write targets
    pub fn id(&self) -> &DocId {
        match self {
            StagedMutation::Insert { id, .. }
            | StagedMutation::Replace { id, .. }
            | StagedMutation::Remove { id, .. } => id,
        }
    }

    /// Value after the write (None for removes)
    pub fn value(&self) -> Option<&JsonValue> {
        match self {
            StagedMutation::Insert { value, .. } | StagedMutation::Replace { value, .. } => {
                Some(value)
            }
            StagedMutation::Remove { .. } => None,
        }
    }

    /// Kind name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            StagedMutation::Insert { .. } => "insert",
            StagedMutation::Replace { .. } => "replace",
            StagedMutation::Remove { .. } => "remove",
        }
    }
}

/// Request sent through a transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Request {
    /// Fetch a whole document
    Get {
        /// Target document
        id: DocId,
    },
    /// Check document existence
    Exists {
        /// Target document
        id: DocId,
    },
    /// Write a whole document
    Store {
        /// Target document
        id: DocId,
        /// Document body
        value: JsonValue,
        /// Existence precondition
        semantics: StoreSemantics,
        /// Write options
        options: WriteOptions,
    },
    /// Delete a whole document
    Remove {
        /// Target document
        id: DocId,
        /// Write options
        options: WriteOptions,
    },
    /// Read fragments of a document
    LookupIn {
        /// Target document
        id: DocId,
        /// Command specs in execution order
        specs: Vec<CommandSpec>,
    },
    /// Edit fragments of a document atomically
    MutateIn {
        /// Target document
        id: DocId,
        /// Command specs in execution order
        specs: Vec<CommandSpec>,
        /// Write options
        options: MutateInRequestOptions,
    },
    /// Run a statement against a transaction's staged view
    TxnQuery {
        /// Calling attempt
        attempt_id: AttemptId,
        /// Statement text
        statement: String,
        /// Query options
        options: QueryOptions,
        /// Writes staged so far
        staged: Vec<StagedMutation>,
    },
    /// Validate reads and apply staged writes atomically
    TxnCommit {
        /// Owning transaction
        transaction_id: TransactionId,
        /// Calling attempt
        attempt_id: AttemptId,
        /// Documents read and the CAS they were read at
        reads: Vec<(DocId, Cas)>,
        /// Writes to apply
        mutations: Vec<StagedMutation>,
        /// Durability for the applied writes
        durability: DurabilityLevel,
    },
}

impl Request {
    /// Request name for logging
    pub fn name(&self) -> &'static str {
        match self {
            Request::Get { .. } => "get",
            Request::Exists { .. } => "exists",
            Request::Store { .. } => "store",
            Request::Remove { .. } => "remove",
            Request::LookupIn { .. } => "lookup_in",
            Request::MutateIn { .. } => "mutate_in",
            Request::TxnQuery { .. } => "txn_query",
            Request::TxnCommit { .. } => "txn_commit",
        }
    }

    /// Document addressed by single-document requests
    pub fn doc_id(&self) -> Option<&DocId> {
        match self {
            Request::Get { id }
            | Request::Exists { id }
            | Request::Store { id, .. }
            | Request::Remove { id, .. }
            | Request::LookupIn { id, .. }
            | Request::MutateIn { id, .. } => Some(id),
            Request::TxnQuery { .. } | Request::TxnCommit { .. } => None,
        }
    }
}

/// Outcome of one spec in a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldStatus {
    /// Spec succeeded
    Success,
    /// Path does not exist
    PathNotFound,
    /// Path already exists
    PathExists,
    /// Wrong container kind along the path
    PathMismatch,
    /// Value incompatible with the operation
    InvalidValue,
}

/// Per-spec result in a batch response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldResult {
    /// Outcome
    pub status: FieldStatus,
    /// Value for get/exists/count and counters
    pub value: Option<JsonValue>,
}

impl FieldResult {
    /// Successful result with an optional value
    pub fn success(value: Option<JsonValue>) -> Self {
        FieldResult {
            status: FieldStatus::Success,
            value,
        }
    }

    /// Failed result
    pub fn failure(status: FieldStatus) -> Self {
        FieldResult {
            status,
            value: None,
        }
    }
}

/// Response returned through a transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Response {
    /// Whole document
    Document {
        /// Current document version
        cas: Cas,
        /// Document body
        value: JsonValue,
        /// Absolute expiry
        expiry: Option<DateTime<Utc>>,
    },
    /// Existence check
    Exists {
        /// Whether the document exists
        exists: bool,
        /// Current document version
        cas: Cas,
    },
    /// Whole-document write applied
    Mutation {
        /// New document version
        cas: Cas,
        /// Sequence number of the write
        seqno: u64,
    },
    /// Lookup batch
    LookupIn {
        /// Current document version
        cas: Cas,
        /// Per-spec results in input order
        fields: Vec<FieldResult>,
    },
    /// Mutate batch applied
    MutateIn {
        /// New document version
        cas: Cas,
        /// Sequence number of the write
        seqno: u64,
        /// Absolute expiry
        expiry: Option<DateTime<Utc>>,
        /// Per-spec results in input order
        fields: Vec<FieldResult>,
    },
    /// Query rows, plus any writes the statement staged
    Query {
        /// Result rows
        rows: Vec<JsonValue>,
        /// Writes the statement staged
        staged: Vec<StagedMutation>,
    },
    /// Commit applied; new CAS per written document
    Committed {
        /// New CAS per written document
        cas: Vec<(DocId, Cas)>,
    },
}

impl Response {
    /// Response name for logging and protocol errors
    pub fn name(&self) -> &'static str {
        match self {
            Response::Document { .. } => "document",
            Response::Exists { .. } => "exists",
            Response::Mutation { .. } => "mutation",
            Response::LookupIn { .. } => "lookup_in",
            Response::MutateIn { .. } => "mutate_in",
            Response::Query { .. } => "query",
            Response::Committed { .. } => "committed",
        }
    }
}
