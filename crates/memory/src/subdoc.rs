//! Sub-document evaluation
//!
//! Lookups evaluate every spec independently against one snapshot.
//! Mutations are applied in order to a working copy; the first failing spec
//! aborts the batch and the caller discards the copy.

use serde_json::Value;
use tessera_core::json::{delete_at_path, get_at_path, get_at_path_mut, parent_mut, value_type_name};
use tessera_core::{
    Cas, CommandSpec, FieldResult, FieldStatus, JsonPathError, JsonValue, MutationMacro,
    Operation, Path, PathSegment,
};

use crate::store::StoredDocument;

/// Why a spec failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    /// Per-spec status
    pub status: FieldStatus,
    /// Detail for error messages
    pub reason: String,
}

fn failure(status: FieldStatus, reason: impl Into<String>) -> Failure {
    Failure {
        status,
        reason: reason.into(),
    }
}

impl From<JsonPathError> for Failure {
    fn from(e: JsonPathError) -> Self {
        let status = match e {
            JsonPathError::NotFound => FieldStatus::PathNotFound,
            JsonPathError::TypeMismatch { .. } => FieldStatus::PathMismatch,
        };
        failure(status, e.to_string())
    }
}

/// A failed spec within a mutation batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecFailure {
    /// Position of the spec in the batch
    pub index: usize,
    /// What went wrong
    pub failure: Failure,
}

/// Version a mutation batch will be stored under, for macro expansion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewVersion {
    /// CAS of the result
    pub cas: Cas,
    /// Sequence number of the result
    pub seqno: u64,
}

// =============================================================================
// Lookups
// =============================================================================

/// Evaluate lookup specs against a document
pub fn lookup(doc: &StoredDocument, specs: &[CommandSpec]) -> Vec<FieldResult> {
    specs
        .iter()
        .map(|spec| match lookup_one(doc, spec) {
            Ok(value) => FieldResult::success(Some(JsonValue::from(value))),
            Err(f) => FieldResult::failure(f.status),
        })
        .collect()
}

fn lookup_one(doc: &StoredDocument, spec: &CommandSpec) -> Result<Value, Failure> {
    let virtual_attrs;
    let root = if spec.is_xattr() && spec.path().is_virtual() {
        virtual_attrs = doc.virtual_xattrs();
        &virtual_attrs
    } else if spec.is_xattr() {
        &doc.xattrs
    } else {
        &doc.body
    };

    let found = get_at_path(root, spec.path())?;
    match spec.op() {
        Operation::Get => Ok(found.clone()),
        Operation::Exists => Ok(Value::Bool(true)),
        Operation::Count => match found {
            Value::Array(arr) => Ok(Value::from(arr.len())),
            Value::Object(obj) => Ok(Value::from(obj.len())),
            other => Err(failure(
                FieldStatus::PathMismatch,
                format!("count needs an array or object, found {}", value_type_name(other)),
            )),
        },
        op => Err(failure(
            FieldStatus::InvalidValue,
            format!("{} is not a lookup", op),
        )),
    }
}

// =============================================================================
// Mutations
// =============================================================================

/// Apply mutation specs to a working copy of a document
///
/// Macro specs are applied after all other specs so that expanded values
/// describe the final body.
pub fn mutate(
    doc: &mut StoredDocument,
    specs: &[CommandSpec],
    version: NewVersion,
) -> Result<Vec<FieldResult>, SpecFailure> {
    let mut results: Vec<Option<FieldResult>> = vec![None; specs.len()];
    let order = (0..specs.len())
        .filter(|&i| !specs[i].expand_macro())
        .chain((0..specs.len()).filter(|&i| specs[i].expand_macro()));

    for index in order {
        let spec = &specs[index];
        let values: Vec<Value> = match spec.mutation_macro() {
            Some(m) => vec![expand_macro(m, doc, version)],
            None => spec.values().iter().map(|v| v.as_inner().clone()).collect(),
        };
        let root = if spec.is_xattr() {
            &mut doc.xattrs
        } else {
            &mut doc.body
        };
        match apply(root, spec, values) {
            Ok(value) => results[index] = Some(FieldResult::success(value.map(JsonValue::from))),
            Err(failure) => return Err(SpecFailure { index, failure }),
        }
    }

    Ok(results
        .into_iter()
        .map(|r| r.unwrap_or_else(|| FieldResult::success(None)))
        .collect())
}

fn expand_macro(m: MutationMacro, doc: &StoredDocument, version: NewVersion) -> Value {
    let text = match m {
        MutationMacro::Cas => format!("0x{:016x}", version.cas.as_u64()),
        MutationMacro::SequenceNumber => format!("0x{:016x}", version.seqno),
        MutationMacro::ValueCrc32c => format!("0x{:08x}", doc.value_crc32()),
    };
    Value::String(text)
}

fn single(values: Vec<Value>) -> Result<Value, Failure> {
    let mut values = values.into_iter();
    match (values.next(), values.next()) {
        (Some(v), None) => Ok(v),
        _ => Err(failure(
            FieldStatus::InvalidValue,
            "operation takes exactly one value",
        )),
    }
}

fn as_object(value: &mut Value) -> Result<&mut serde_json::Map<String, Value>, Failure> {
    match value {
        Value::Object(obj) => Ok(obj),
        other => Err(failure(
            FieldStatus::PathMismatch,
            format!("expected object, found {}", value_type_name(other)),
        )),
    }
}

fn as_array(value: &mut Value) -> Result<&mut Vec<Value>, Failure> {
    match value {
        Value::Array(arr) => Ok(arr),
        other => Err(failure(
            FieldStatus::PathMismatch,
            format!("expected array, found {}", value_type_name(other)),
        )),
    }
}

fn leaf_field(path: &Path) -> Result<&str, Failure> {
    match path.last_segment() {
        Some(PathSegment::Field(name)) => Ok(name),
        _ => Err(failure(
            FieldStatus::PathMismatch,
            "path must end in a field name",
        )),
    }
}

/// The array at `path`, created empty when missing and `create` is set
fn array_at<'a>(root: &'a mut Value, path: &Path, create: bool) -> Result<&'a mut Vec<Value>, Failure> {
    if create {
        if let Some(PathSegment::Field(name)) = path.last_segment() {
            let parent = as_object(parent_mut(root, path, true)?)?;
            let slot = parent
                .entry(name.clone())
                .or_insert_with(|| Value::Array(Vec::new()));
            return as_array(slot);
        }
    }
    as_array(get_at_path_mut(root, path)?)
}

/// The numeric slot at `path`, starting at 0 when missing and `create` is set
fn counter_slot<'a>(root: &'a mut Value, path: &Path, create: bool) -> Result<&'a mut Value, Failure> {
    let parent = parent_mut(root, path, create)?;
    match (path.last_segment(), parent) {
        (Some(PathSegment::Field(name)), Value::Object(obj)) => {
            if create {
                Ok(obj.entry(name.clone()).or_insert(Value::from(0)))
            } else {
                obj.get_mut(name)
                    .ok_or_else(|| failure(FieldStatus::PathNotFound, "counter does not exist"))
            }
        }
        (Some(PathSegment::Index(idx)), Value::Array(arr)) => arr
            .get_mut(*idx)
            .ok_or_else(|| failure(FieldStatus::PathNotFound, "index beyond end of array")),
        (_, other) => Err(failure(
            FieldStatus::PathMismatch,
            format!("counter parent is {}", value_type_name(other)),
        )),
    }
}

fn apply(root: &mut Value, spec: &CommandSpec, values: Vec<Value>) -> Result<Option<Value>, Failure> {
    let path = spec.path();
    let create = spec.create_parents();

    match spec.op() {
        Operation::Insert | Operation::Upsert => {
            let name = leaf_field(path)?;
            let value = single(values)?;
            let parent = as_object(parent_mut(root, path, create)?)?;
            if spec.op() == Operation::Insert && parent.contains_key(name) {
                return Err(failure(FieldStatus::PathExists, "field already exists"));
            }
            parent.insert(name.to_string(), value);
            Ok(None)
        }
        Operation::Replace => {
            let value = single(values)?;
            *get_at_path_mut(root, path)? = value;
            Ok(None)
        }
        Operation::Remove => {
            delete_at_path(root, path)?;
            Ok(None)
        }
        Operation::ArrayAppend => {
            array_at(root, path, create)?.extend(values);
            Ok(None)
        }
        Operation::ArrayPrepend => {
            array_at(root, path, create)?.splice(0..0, values);
            Ok(None)
        }
        Operation::ArrayInsert => {
            let array_path = path.parent().unwrap_or_default();
            let arr = as_array(get_at_path_mut(root, &array_path)?)?;
            let at = match path.last_segment() {
                Some(PathSegment::Index(idx)) => *idx,
                Some(PathSegment::AppendMarker) => arr.len(),
                _ => {
                    return Err(failure(
                        FieldStatus::PathMismatch,
                        "array_insert needs an index",
                    ))
                }
            };
            if at > arr.len() {
                return Err(failure(
                    FieldStatus::PathNotFound,
                    format!("index {} beyond array of length {}", at, arr.len()),
                ));
            }
            arr.splice(at..at, values);
            Ok(None)
        }
        Operation::ArrayAddUnique => {
            let value = single(values)?;
            if value.is_array() || value.is_object() {
                return Err(failure(
                    FieldStatus::InvalidValue,
                    "array_add_unique only accepts scalar values",
                ));
            }
            let arr = array_at(root, path, create)?;
            if arr.iter().any(|v| v.is_array() || v.is_object()) {
                return Err(failure(
                    FieldStatus::PathMismatch,
                    "array contains non-scalar values",
                ));
            }
            if arr.contains(&value) {
                return Err(failure(FieldStatus::PathExists, "value already present"));
            }
            arr.push(value);
            Ok(None)
        }
        Operation::Increment | Operation::Decrement => {
            let delta = spec
                .delta()
                .ok_or_else(|| failure(FieldStatus::InvalidValue, "missing counter delta"))?;
            let slot = counter_slot(root, path, create)?;
            let current = slot.as_i64().ok_or_else(|| {
                failure(
                    FieldStatus::PathMismatch,
                    format!("counter target is {}", value_type_name(slot)),
                )
            })?;
            let next = current
                .checked_add(delta)
                .ok_or_else(|| failure(FieldStatus::InvalidValue, "counter overflow"))?;
            *slot = Value::from(next);
            Ok(Some(Value::from(next)))
        }
        op @ (Operation::Get | Operation::Exists | Operation::Count) => Err(failure(
            FieldStatus::InvalidValue,
            format!("{} is not a mutation", op),
        )),
    }
}
