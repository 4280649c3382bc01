//! Kubernetes helpers shared by controllers
//!
//! Finalizer bookkeeping and optimistic-write patch bodies. Every patch built
//! here carries `metadata.resourceVersion`, so the API server rejects it with
//! 409 Conflict when the object changed since it was read.

use kube::{Resource, ResourceExt};
use serde::Serialize;
use serde_json::{json, Value};

use crate::Error;

/// Check whether a resource carries the given finalizer
pub fn has_finalizer<K: Resource>(obj: &K, finalizer: &str) -> bool {
    obj.finalizers().iter().any(|f| f == finalizer)
}

/// Check whether deletion has been requested for a resource
pub fn is_being_deleted<K: Resource>(obj: &K) -> bool {
    obj.meta().deletion_timestamp.is_some()
}

/// Finalizer list with `finalizer` appended, or `None` if already present
pub fn finalizers_with<K: Resource>(obj: &K, finalizer: &str) -> Option<Vec<String>> {
    if has_finalizer(obj, finalizer) {
        return None;
    }
    let mut finalizers = obj.finalizers().to_vec();
    finalizers.push(finalizer.to_string());
    Some(finalizers)
}

/// Finalizer list with every occurrence of `finalizer` removed, preserving order
pub fn finalizers_without<K: Resource>(obj: &K, finalizer: &str) -> Vec<String> {
    obj.finalizers()
        .iter()
        .filter(|f| *f != finalizer)
        .cloned()
        .collect()
}

/// Merge patch replacing the finalizer list, guarded by the observed resourceVersion
pub fn finalizer_patch<K: Resource>(obj: &K, finalizers: &[String]) -> Value {
    json!({
        "metadata": {
            "resourceVersion": obj.resource_version(),
            "finalizers": finalizers,
        }
    })
}

/// Merge patch moving the status subresource from `previous` to `status`,
/// guarded by the observed resourceVersion
///
/// Fields set in `previous` but absent from `status` go out as explicit
/// `null`s; a merge patch that merely omits them leaves the old values in place.
pub fn status_patch<K: Resource, S: Serialize>(
    obj: &K,
    previous: Option<&S>,
    status: &S,
) -> Result<Value, Error> {
    let next = to_status_value(status)?;
    let body = match previous {
        Some(previous) => merge_diff(&to_status_value(previous)?, next),
        None => next,
    };
    Ok(json!({
        "metadata": {
            "resourceVersion": obj.resource_version(),
        },
        "status": body,
    }))
}

fn to_status_value<S: Serialize>(status: &S) -> Result<Value, Error> {
    serde_json::to_value(status).map_err(|e| Error::serialization_for_kind("status", e.to_string()))
}

/// RFC 7386 patch that turns `from` into `to`
fn merge_diff(from: &Value, to: Value) -> Value {
    match (from, to) {
        (Value::Object(from), Value::Object(mut to)) => {
            for (key, value) in to.iter_mut() {
                if let Some(old) = from.get(key) {
                    *value = merge_diff(old, value.take());
                }
            }
            for key in from.keys() {
                if !to.contains_key(key) {
                    to.insert(key.clone(), Value::Null);
                }
            }
            Value::Object(to)
        }
        (_, to) => to,
    }
}

/// True for a 404 from the API server
pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 404)
}

/// True for a 409 from the API server (stale resourceVersion)
pub fn is_conflict(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 409)
}
