//! Sub-document command specs
//!
//! One constructor per operation. Each parses the path, checks the
//! operation's value and flag rules, and returns an immutable
//! [`CommandSpec`] or `Error::InvalidArgument`.
//!
//! ```
//! use tessera_core::spec::{self, SpecFlags};
//!
//! let count = spec::count("count", SpecFlags::NONE).unwrap();
//! let bump = spec::increment("stats.hits", 1, SpecFlags::CREATE_PARENTS).unwrap();
//! assert!(!count.op().is_mutation());
//! assert!(bump.op().is_mutation());
//!
//! // Deltas must be positive; decrement carries the sign.
//! assert!(spec::increment("n", 0, SpecFlags::NONE).is_err());
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};
use crate::json::JsonValue;
use crate::path::{Path, PathSegment, PathSyntaxError};
use crate::types::MutationMacro;

/// Sub-document operation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Read the value at a path
    Get,
    /// Check whether a path exists
    Exists,
    /// Count elements of an array or object
    Count,
    /// Add a field that must not exist
    Insert,
    /// Add or overwrite a field
    Upsert,
    /// Overwrite a value that must exist
    Replace,
    /// Delete a value
    Remove,
    /// Add values at the end of an array
    ArrayAppend,
    /// Add values at the start of an array
    ArrayPrepend,
    /// Add values at an array position
    ArrayInsert,
    /// Add a scalar to an array unless already present
    ArrayAddUnique,
    /// Add to a numeric value
    Increment,
    /// Subtract from a numeric value
    Decrement,
}

impl Operation {
    /// Check if the operation modifies the document
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Operation::Get | Operation::Exists | Operation::Count)
    }

    /// Check if the operation is a counter
    pub fn is_counter(&self) -> bool {
        matches!(self, Operation::Increment | Operation::Decrement)
    }

    /// Operation name
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Get => "get",
            Operation::Exists => "exists",
            Operation::Count => "count",
            Operation::Insert => "insert",
            Operation::Upsert => "upsert",
            Operation::Replace => "replace",
            Operation::Remove => "remove",
            Operation::ArrayAppend => "array_append",
            Operation::ArrayPrepend => "array_prepend",
            Operation::ArrayInsert => "array_insert",
            Operation::ArrayAddUnique => "array_add_unique",
            Operation::Increment => "increment",
            Operation::Decrement => "decrement",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-spec flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SpecFlags {
    /// Create missing intermediate objects along the path (mutations only)
    pub create_parents: bool,
    /// The path addresses an extended attribute
    pub xattr: bool,
}

impl SpecFlags {
    /// No flags
    pub const NONE: SpecFlags = SpecFlags {
        create_parents: false,
        xattr: false,
    };

    /// Only `create_parents`
    pub const CREATE_PARENTS: SpecFlags = SpecFlags {
        create_parents: true,
        xattr: false,
    };

    /// Only `xattr`
    pub const XATTR: SpecFlags = SpecFlags {
        create_parents: false,
        xattr: true,
    };

    /// Set `create_parents`
    pub fn with_create_parents(mut self, create_parents: bool) -> Self {
        self.create_parents = create_parents;
        self
    }

    /// Set `xattr`
    pub fn with_xattr(mut self, xattr: bool) -> Self {
        self.xattr = xattr;
        self
    }
}

/// Anything a spec constructor accepts as a path
pub trait IntoPath {
    /// Convert into a parsed path
    fn into_path(self) -> std::result::Result<Path, PathSyntaxError>;
}

impl IntoPath for &str {
    fn into_path(self) -> std::result::Result<Path, PathSyntaxError> {
        self.parse()
    }
}

impl IntoPath for String {
    fn into_path(self) -> std::result::Result<Path, PathSyntaxError> {
        self.parse()
    }
}

impl IntoPath for &String {
    fn into_path(self) -> std::result::Result<Path, PathSyntaxError> {
        self.parse()
    }
}

impl IntoPath for Path {
    fn into_path(self) -> std::result::Result<Path, PathSyntaxError> {
        Ok(self)
    }
}

impl IntoPath for &Path {
    fn into_path(self) -> std::result::Result<Path, PathSyntaxError> {
        Ok(self.clone())
    }
}

/// A validated sub-document command
///
/// Built only through the constructor functions in this module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandSpec {
    op: Operation,
    path: Path,
    values: Vec<JsonValue>,
    create_parents: bool,
    xattr: bool,
    expand_macro: bool,
}

impl CommandSpec {
    /// Operation kind
    pub fn op(&self) -> Operation {
        self.op
    }

    /// Target path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Values in caller order (empty for lookups and remove)
    pub fn values(&self) -> &[JsonValue] {
        &self.values
    }

    /// First value, for single-value operations
    pub fn value(&self) -> Option<&JsonValue> {
        self.values.first()
    }

    /// Signed counter delta, for increment/decrement
    pub fn delta(&self) -> Option<i64> {
        if self.op.is_counter() {
            self.value().and_then(|v| v.as_i64())
        } else {
            None
        }
    }

    /// Whether missing parents are created
    pub fn create_parents(&self) -> bool {
        self.create_parents
    }

    /// Whether the path addresses an xattr
    pub fn is_xattr(&self) -> bool {
        self.xattr
    }

    /// Whether the value is a macro the server expands
    pub fn expand_macro(&self) -> bool {
        self.expand_macro
    }

    /// Macro carried by this spec, if any
    pub fn mutation_macro(&self) -> Option<MutationMacro> {
        if !self.expand_macro {
            return None;
        }
        self.value()
            .and_then(|v| v.as_str())
            .and_then(MutationMacro::parse)
    }
}

// =============================================================================
// Validation helpers
// =============================================================================

fn build(
    op: Operation,
    path: impl IntoPath,
    values: Vec<JsonValue>,
    flags: SpecFlags,
) -> Result<CommandSpec> {
    let path = path.into_path()?;

    if !op.is_mutation() && flags.create_parents {
        return Err(Error::invalid_argument(format!(
            "{} does not accept create_parents",
            op
        )));
    }
    if path.is_virtual() && !flags.xattr {
        return Err(Error::invalid_argument(format!(
            "path '{}' names an extended attribute; set the xattr flag",
            path
        )));
    }
    if flags.xattr {
        match path.segments().first() {
            Some(PathSegment::Field(_)) => {}
            _ => {
                return Err(Error::invalid_argument(
                    "xattr paths must start with an attribute name",
                ))
            }
        }
        if op.is_mutation() && path.is_virtual() {
            return Err(Error::invalid_argument(format!(
                "virtual attribute '{}' is read-only",
                path
            )));
        }
    }

    Ok(CommandSpec {
        op,
        path,
        values,
        create_parents: flags.create_parents,
        xattr: flags.xattr,
        expand_macro: false,
    })
}

fn require_field_leaf(spec: &CommandSpec) -> Result<()> {
    match spec.path.last_segment() {
        Some(PathSegment::Field(_)) => Ok(()),
        _ => Err(Error::invalid_argument(format!(
            "{} requires a path ending in a field name, got '{}'",
            spec.op, spec.path
        ))),
    }
}

fn require_non_root(spec: &CommandSpec) -> Result<()> {
    if spec.path.is_root() {
        return Err(Error::invalid_argument(format!(
            "{} cannot target the document root",
            spec.op
        )));
    }
    Ok(())
}

fn reject_append_marker(spec: &CommandSpec) -> Result<()> {
    if spec.path.last_segment() == Some(&PathSegment::AppendMarker) {
        return Err(Error::invalid_argument(format!(
            "{} does not accept an append marker",
            spec.op
        )));
    }
    Ok(())
}

fn collect_values<I>(values: I) -> Vec<JsonValue>
where
    I: IntoIterator,
    I::Item: Into<JsonValue>,
{
    values.into_iter().map(Into::into).collect()
}

fn require_values(op: Operation, values: &[JsonValue]) -> Result<()> {
    if values.is_empty() {
        return Err(Error::invalid_argument(format!(
            "{} needs at least one value",
            op
        )));
    }
    Ok(())
}

// =============================================================================
// Lookups
// =============================================================================

/// Read the value at `path` (the root reads the whole document)
pub fn get(path: impl IntoPath, flags: SpecFlags) -> Result<CommandSpec> {
    build(Operation::Get, path, Vec::new(), flags)
}

/// Check whether `path` exists
pub fn exists(path: impl IntoPath, flags: SpecFlags) -> Result<CommandSpec> {
    build(Operation::Exists, path, Vec::new(), flags)
}

/// Count the elements of the array or object at `path`
pub fn count(path: impl IntoPath, flags: SpecFlags) -> Result<CommandSpec> {
    build(Operation::Count, path, Vec::new(), flags)
}

// =============================================================================
// Field mutations
// =============================================================================

/// Add a field that must not already exist
pub fn insert(
    path: impl IntoPath,
    value: impl Into<JsonValue>,
    flags: SpecFlags,
) -> Result<CommandSpec> {
    let spec = build(Operation::Insert, path, vec![value.into()], flags)?;
    require_field_leaf(&spec)?;
    Ok(spec)
}

/// Add or overwrite a field
pub fn upsert(
    path: impl IntoPath,
    value: impl Into<JsonValue>,
    flags: SpecFlags,
) -> Result<CommandSpec> {
    let spec = build(Operation::Upsert, path, vec![value.into()], flags)?;
    require_field_leaf(&spec)?;
    Ok(spec)
}

/// Overwrite an existing value (the root replaces the whole body)
pub fn replace(
    path: impl IntoPath,
    value: impl Into<JsonValue>,
    flags: SpecFlags,
) -> Result<CommandSpec> {
    let spec = build(Operation::Replace, path, vec![value.into()], flags)?;
    reject_append_marker(&spec)?;
    Ok(spec)
}

/// Delete the value at `path`
pub fn remove(path: impl IntoPath, flags: SpecFlags) -> Result<CommandSpec> {
    let spec = build(Operation::Remove, path, Vec::new(), flags)?;
    require_non_root(&spec)?;
    Ok(spec)
}

/// Upsert a server-expanded macro into an xattr
pub fn upsert_macro(
    path: impl IntoPath,
    mutation_macro: MutationMacro,
    flags: SpecFlags,
) -> Result<CommandSpec> {
    macro_spec(Operation::Upsert, path, mutation_macro, flags)
}

/// Insert a server-expanded macro into an xattr
pub fn insert_macro(
    path: impl IntoPath,
    mutation_macro: MutationMacro,
    flags: SpecFlags,
) -> Result<CommandSpec> {
    macro_spec(Operation::Insert, path, mutation_macro, flags)
}

fn macro_spec(
    op: Operation,
    path: impl IntoPath,
    mutation_macro: MutationMacro,
    flags: SpecFlags,
) -> Result<CommandSpec> {
    if !flags.xattr {
        return Err(Error::invalid_argument(
            "mutation macros are only valid on xattr paths",
        ));
    }
    let mut spec = build(
        op,
        path,
        vec![JsonValue::from(mutation_macro.as_str())],
        flags,
    )?;
    require_field_leaf(&spec)?;
    spec.expand_macro = true;
    Ok(spec)
}

// =============================================================================
// Array mutations
// =============================================================================

/// Append values, in order, after the last element of the array at `path`
///
/// A trailing `[-1]` on the path is accepted and names the same array.
pub fn array_append<I>(path: impl IntoPath, values: I, flags: SpecFlags) -> Result<CommandSpec>
where
    I: IntoIterator,
    I::Item: Into<JsonValue>,
{
    let values = collect_values(values);
    require_values(Operation::ArrayAppend, &values)?;
    let mut spec = build(Operation::ArrayAppend, path, values, flags)?;
    if spec.path.last_segment() == Some(&PathSegment::AppendMarker) {
        spec.path = spec.path.parent().unwrap_or_default();
    }
    Ok(spec)
}

/// Prepend values, in order, before the first element of the array at `path`
pub fn array_prepend<I>(path: impl IntoPath, values: I, flags: SpecFlags) -> Result<CommandSpec>
where
    I: IntoIterator,
    I::Item: Into<JsonValue>,
{
    let values = collect_values(values);
    require_values(Operation::ArrayPrepend, &values)?;
    let spec = build(Operation::ArrayPrepend, path, values, flags)?;
    reject_append_marker(&spec)?;
    Ok(spec)
}

/// Insert values starting at the index named by the last path segment
///
/// Later elements shift right. `[-1]` inserts at the end.
pub fn array_insert<I>(path: impl IntoPath, values: I, flags: SpecFlags) -> Result<CommandSpec>
where
    I: IntoIterator,
    I::Item: Into<JsonValue>,
{
    let values = collect_values(values);
    require_values(Operation::ArrayInsert, &values)?;
    let spec = build(Operation::ArrayInsert, path, values, flags)?;
    match spec.path.last_segment() {
        Some(segment) if segment.is_array_position() => Ok(spec),
        _ => Err(Error::invalid_argument(format!(
            "array_insert requires a path ending in an array index, got '{}'",
            spec.path
        ))),
    }
}

/// Add a scalar to the array at `path` unless an equal value is present
///
/// Container values are rejected by the server with `InvalidValue`.
pub fn array_add_unique(
    path: impl IntoPath,
    value: impl Into<JsonValue>,
    flags: SpecFlags,
) -> Result<CommandSpec> {
    let spec = build(Operation::ArrayAddUnique, path, vec![value.into()], flags)?;
    reject_append_marker(&spec)?;
    Ok(spec)
}

// =============================================================================
// Counters
// =============================================================================

/// Add `delta` (> 0) to the number at `path`
///
/// With `create_parents`, a missing leaf starts at 0.
pub fn increment(path: impl IntoPath, delta: i64, flags: SpecFlags) -> Result<CommandSpec> {
    counter(Operation::Increment, path, delta, flags)
}

/// Subtract `delta` (> 0) from the number at `path`
///
/// Carried as a negative signed delta.
pub fn decrement(path: impl IntoPath, delta: i64, flags: SpecFlags) -> Result<CommandSpec> {
    counter(Operation::Decrement, path, delta, flags)
}

fn counter(op: Operation, path: impl IntoPath, delta: i64, flags: SpecFlags) -> Result<CommandSpec> {
    if delta <= 0 {
        return Err(Error::invalid_argument(format!(
            "{} delta must be positive, got {}",
            op, delta
        )));
    }
    let signed = if op == Operation::Decrement {
        -delta
    } else {
        delta
    };
    let spec = build(op, path, vec![JsonValue::from(signed)], flags)?;
    require_non_root(&spec)?;
    reject_append_marker(&spec)?;
    Ok(spec)
}
