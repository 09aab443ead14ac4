//! Sub-document Tests
//!
//! Batches sent through the client against the in-process server:
//! - lookups: get/exists/count, virtual and user xattrs
//! - mutations: field, array and counter edits, macros, atomicity
//! - options: pre-flight validation, store semantics, expiry, durability, CAS

#[path = "../common/mod.rs"]
mod common;

mod lookups;
mod mutations;
mod options;
