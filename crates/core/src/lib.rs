//! Core types for Tessera
//!
//! This crate defines what the client, transaction and server crates share:
//! - Path: parsed path expressions into a JSON document
//! - CommandSpec: validated sub-document operations
//! - JsonValue: value wrapper plus path navigation helpers
//! - Keyspace / DocId / Cas: document identity and version tokens
//! - Request / Response: structured messages carried by a transport
//! - Error: the error taxonomy every crate reports through
//! - Limits: request limits checked before sending

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod json;
pub mod limits;
pub mod path;
pub mod protocol;
pub mod spec;
pub mod types;

pub use error::{Error, Result, TransportErrorKind};
pub use json::{JsonPathError, JsonValue};
pub use limits::{Limits, MAX_EXPIRY, MAX_PATH_DEPTH, MAX_SPECS_PER_BATCH};
pub use path::{Path, PathSegment, PathSyntaxError};
pub use protocol::{
    FieldResult, FieldStatus, MutateInRequestOptions, Request, Response, StagedMutation,
    WriteOptions,
};
pub use spec::{CommandSpec, IntoPath, Operation, SpecFlags};
pub use types::{
    AttemptId, Cas, DocId, DurabilityLevel, Keyspace, MutationMacro, QueryOptions,
    ScanConsistency, StoreSemantics, TransactionId,
};
