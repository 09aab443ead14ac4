//! In-process reference server for Tessera
//!
//! [`MemoryServer`] implements the client [`Transport`](tessera_client::Transport)
//! over a versioned in-memory document store. It evaluates sub-document
//! batches atomically, validates transaction commits and hosts a pluggable
//! query handler. Tests drive it through the normal client API.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod query;
pub mod server;
pub mod store;
pub mod subdoc;
pub mod validation;

pub use query::{QueryHandler, QueryOutput, StagedView};
pub use server::{MemoryConfig, MemoryServer};
pub use store::{DocumentStore, StoredDocument};
pub use validation::{
    validate_commit, validate_read_set, validate_write_set, ConflictType, ValidationResult,
};
