//! JSON value wrapper and path navigation
//!
//! [`JsonValue`] is the value type carried by command specs and returned in
//! results. The navigation helpers below resolve a [`Path`] against a
//! `serde_json::Value` and are the building blocks of sub-document
//! evaluation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::str::FromStr;
use thiserror::Error;

use crate::path::{Path, PathSegment};

// =============================================================================
// JsonValue
// =============================================================================

/// JSON value wrapper
///
/// Newtype over `serde_json::Value` with convenience constructors.
/// Dereferences to the inner value.
///
/// # Examples
///
/// ```
/// use tessera_core::JsonValue;
///
/// let obj = JsonValue::object();
/// let n = JsonValue::from(42i64);
/// assert!(obj.is_object());
/// assert_eq!(n.as_i64(), Some(42));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct JsonValue(serde_json::Value);

impl JsonValue {
    /// Create a null JSON value
    pub fn null() -> Self {
        JsonValue(serde_json::Value::Null)
    }

    /// Create an empty JSON object
    pub fn object() -> Self {
        JsonValue(serde_json::Value::Object(serde_json::Map::new()))
    }

    /// Create an empty JSON array
    pub fn array() -> Self {
        JsonValue(serde_json::Value::Array(Vec::new()))
    }

    /// Serialize any value into a JsonValue
    pub fn serialize_from<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_value(value).map(JsonValue)
    }

    /// Deserialize into a typed value
    pub fn deserialize_into<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.0)
    }

    /// Unwrap into the inner value
    pub fn into_inner(self) -> serde_json::Value {
        self.0
    }

    /// Get the inner value
    pub fn as_inner(&self) -> &serde_json::Value {
        &self.0
    }

    /// Check if this is an array or object
    pub fn is_container(&self) -> bool {
        self.0.is_array() || self.0.is_object()
    }

    /// Encoded size in bytes
    pub fn size_bytes(&self) -> usize {
        serde_json::to_vec(&self.0).map(|v| v.len()).unwrap_or(0)
    }
}

impl FromStr for JsonValue {
    type Err = serde_json::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_str(s).map(JsonValue)
    }
}

impl Deref for JsonValue {
    type Target = serde_json::Value;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for JsonValue {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl fmt::Display for JsonValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<serde_json::Value> for JsonValue {
    fn from(v: serde_json::Value) -> Self {
        JsonValue(v)
    }
}

impl From<JsonValue> for serde_json::Value {
    fn from(v: JsonValue) -> Self {
        v.0
    }
}

impl From<bool> for JsonValue {
    fn from(v: bool) -> Self {
        JsonValue(v.into())
    }
}

impl From<i64> for JsonValue {
    fn from(v: i64) -> Self {
        JsonValue(v.into())
    }
}

impl From<i32> for JsonValue {
    fn from(v: i32) -> Self {
        JsonValue(v.into())
    }
}

impl From<u64> for JsonValue {
    fn from(v: u64) -> Self {
        JsonValue(v.into())
    }
}

impl From<f64> for JsonValue {
    fn from(v: f64) -> Self {
        serde_json::Number::from_f64(v)
            .map(|n| JsonValue(serde_json::Value::Number(n)))
            .unwrap_or_else(JsonValue::null)
    }
}

impl From<&str> for JsonValue {
    fn from(v: &str) -> Self {
        JsonValue(v.into())
    }
}

impl From<String> for JsonValue {
    fn from(v: String) -> Self {
        JsonValue(v.into())
    }
}

impl<T: Into<JsonValue>> From<Vec<T>> for JsonValue {
    fn from(v: Vec<T>) -> Self {
        JsonValue(serde_json::Value::Array(
            v.into_iter().map(|x| x.into().0).collect(),
        ))
    }
}

// =============================================================================
// Path navigation
// =============================================================================

/// Failure while resolving a path against a value
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JsonPathError {
    /// A segment does not exist
    #[error("path not found")]
    NotFound,
    /// A segment addressed the wrong kind of container
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// Container kind the segment needs
        expected: &'static str,
        /// Kind actually present
        found: &'static str,
    },
}

/// Type name for error messages
pub fn value_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

fn step<'a>(
    current: &'a serde_json::Value,
    segment: &PathSegment,
) -> Result<&'a serde_json::Value, JsonPathError> {
    match (segment, current) {
        (PathSegment::Field(name), serde_json::Value::Object(obj)) => {
            obj.get(name).ok_or(JsonPathError::NotFound)
        }
        (PathSegment::Index(idx), serde_json::Value::Array(arr)) => {
            arr.get(*idx).ok_or(JsonPathError::NotFound)
        }
        (PathSegment::AppendMarker, serde_json::Value::Array(arr)) => {
            arr.last().ok_or(JsonPathError::NotFound)
        }
        (PathSegment::Field(_), other) => Err(JsonPathError::TypeMismatch {
            expected: "object",
            found: value_type_name(other),
        }),
        (_, other) => Err(JsonPathError::TypeMismatch {
            expected: "array",
            found: value_type_name(other),
        }),
    }
}

fn step_mut<'a>(
    current: &'a mut serde_json::Value,
    segment: &PathSegment,
    create_parents: bool,
) -> Result<&'a mut serde_json::Value, JsonPathError> {
    match (segment, current) {
        (PathSegment::Field(name), serde_json::Value::Object(obj)) => {
            if create_parents {
                Ok(obj
                    .entry(name.clone())
                    .or_insert_with(|| serde_json::Value::Object(serde_json::Map::new())))
            } else {
                obj.get_mut(name).ok_or(JsonPathError::NotFound)
            }
        }
        (PathSegment::Index(idx), serde_json::Value::Array(arr)) => {
            arr.get_mut(*idx).ok_or(JsonPathError::NotFound)
        }
        (PathSegment::AppendMarker, serde_json::Value::Array(arr)) => {
            arr.last_mut().ok_or(JsonPathError::NotFound)
        }
        (PathSegment::Field(_), other) => Err(JsonPathError::TypeMismatch {
            expected: "object",
            found: value_type_name(other),
        }),
        (_, other) => Err(JsonPathError::TypeMismatch {
            expected: "array",
            found: value_type_name(other),
        }),
    }
}

/// Get the value at a path
///
/// The root path returns the whole value. An append marker (`[-1]`) reads
/// the last element of an array.
///
/// # Examples
///
/// ```
/// use tessera_core::json::get_at_path;
/// use serde_json::json;
///
/// let doc = json!({"geo": {"alt": 14}, "count": [1, 2, 3]});
/// assert_eq!(get_at_path(&doc, &"geo.alt".parse().unwrap()), Ok(&json!(14)));
/// assert_eq!(get_at_path(&doc, &"count[-1]".parse().unwrap()), Ok(&json!(3)));
/// ```
pub fn get_at_path<'a>(
    root: &'a serde_json::Value,
    path: &Path,
) -> Result<&'a serde_json::Value, JsonPathError> {
    let mut current = root;
    for segment in path.segments() {
        current = step(current, segment)?;
    }
    Ok(current)
}

/// Get a mutable reference to the value at a path
pub fn get_at_path_mut<'a>(
    root: &'a mut serde_json::Value,
    path: &Path,
) -> Result<&'a mut serde_json::Value, JsonPathError> {
    let mut current = root;
    for segment in path.segments() {
        current = step_mut(current, segment, false)?;
    }
    Ok(current)
}

/// Get a mutable reference to the container holding the last segment
///
/// With `create_parents`, missing intermediate fields are created as empty
/// objects. Missing array elements are never created. Fails with `NotFound`
/// for the root path, which has no parent.
pub fn parent_mut<'a>(
    root: &'a mut serde_json::Value,
    path: &Path,
    create_parents: bool,
) -> Result<&'a mut serde_json::Value, JsonPathError> {
    let segments = path.segments();
    if segments.is_empty() {
        return Err(JsonPathError::NotFound);
    }
    let mut current = root;
    for segment in &segments[..segments.len() - 1] {
        current = step_mut(current, segment, create_parents)?;
    }
    Ok(current)
}

/// Remove the value at a path, returning it
///
/// Array elements after a removed index shift left.
pub fn delete_at_path(
    root: &mut serde_json::Value,
    path: &Path,
) -> Result<serde_json::Value, JsonPathError> {
    let last = path.last_segment().ok_or(JsonPathError::NotFound)?;
    let parent = parent_mut(root, path, false)?;
    match (last, parent) {
        (PathSegment::Field(name), serde_json::Value::Object(obj)) => {
            obj.remove(name).ok_or(JsonPathError::NotFound)
        }
        (PathSegment::Index(idx), serde_json::Value::Array(arr)) => {
            if *idx < arr.len() {
                Ok(arr.remove(*idx))
            } else {
                Err(JsonPathError::NotFound)
            }
        }
        (PathSegment::AppendMarker, serde_json::Value::Array(arr)) => {
            arr.pop().ok_or(JsonPathError::NotFound)
        }
        (PathSegment::Field(_), other) => Err(JsonPathError::TypeMismatch {
            expected: "object",
            found: value_type_name(other),
        }),
        (_, other) => Err(JsonPathError::TypeMismatch {
            expected: "array",
            found: value_type_name(other),
        }),
    }
}
