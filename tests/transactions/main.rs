//! Transaction Tests
//!
//! Multi-document transactions against the in-process server:
//! - lifecycle: commit, rollback, read-your-writes, isolation
//! - retry: conflicts, transient faults, ceilings, timeouts
//! - query: statements over the staged view

#[path = "../common/mod.rs"]
mod common;

mod lifecycle;
mod query;
mod retry;
