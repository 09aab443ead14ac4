//! Client side of Tessera
//!
//! - [`Transport`]: the request/response seam to a server
//! - [`Connection`]: credentials + configuration bound to a transport
//! - [`Collection`] / [`AsyncCollection`]: whole-document and sub-document
//!   operations against one keyspace
//! - [`CommandBatch`] / [`BatchResult`]: sub-document batches and results
//! - [`ClientConfig`]: `tessera.toml` configuration

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod batch;
pub mod collection;
pub mod config;
pub mod connection;
pub mod transport;

pub use batch::{
    BatchKind, BatchResult, CommandBatch, LookupInOptions, LookupInResult, MutateInOptions,
    MutateInResult,
};
pub use collection::{AsyncCollection, Collection, ExistsResult, GetResult, MutationResult};
pub use config::{ClientConfig, CONFIG_FILE_NAME};
pub use connection::{Connection, Credentials};
pub use transport::{Channel, Transport};
