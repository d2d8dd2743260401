//! Snapshot-and-diff persistence for a control plane
//!
//! [`PatchHelper`] remembers the object as it was when the reconcile began.
//! Flushing diffs the live object against that snapshot and writes only what
//! changed, in two steps:
//!
//! 1. metadata (labels, annotations, finalizers, owner references) and spec,
//!    guarded by `metadata.resourceVersion`;
//! 2. status, merged onto the latest server copy. A status field or
//!    condition changed both locally and by another writer is a conflict.
//!    Owned conditions set during this call are kept in a ledger and always
//!    written with the values they were set to, even if the status was
//!    replaced afterwards.

use serde_json::{Map, Value};
use tracing::debug;

use rosa_common::crd::{Condition, ROSAControlPlane, ROSA_CONTROL_PLANE_KIND};
use rosa_common::kube_utils::object_key;
use rosa_common::{Error, Result};

use crate::store::ControlPlaneStore;

/// Metadata fields written by the main patch
const PATCHED_METADATA: &[&str] = &["labels", "annotations", "finalizers", "ownerReferences"];

/// Compute an RFC 7386 merge patch turning `before` into `after`.
///
/// Removed object keys become `null`; arrays and scalars are replaced whole.
pub fn create_merge_patch(before: &Value, after: &Value) -> Value {
    match (before, after) {
        (Value::Object(b), Value::Object(a)) => {
            let mut patch = Map::new();
            for (key, old) in b {
                match a.get(key) {
                    None => {
                        patch.insert(key.clone(), Value::Null);
                    }
                    Some(new) if new != old => {
                        patch.insert(key.clone(), create_merge_patch(old, new));
                    }
                    Some(_) => {}
                }
            }
            for (key, new) in a {
                if !b.contains_key(key) {
                    patch.insert(key.clone(), new.clone());
                }
            }
            Value::Object(patch)
        }
        _ => after.clone(),
    }
}

fn is_empty_patch(patch: &Value) -> bool {
    patch.as_object().is_some_and(Map::is_empty)
}

/// The parts of an object the main (non-status) patch covers
fn main_view(obj: &Value) -> Value {
    let mut metadata = Map::new();
    if let Some(meta) = obj.get("metadata").and_then(Value::as_object) {
        for key in PATCHED_METADATA {
            if let Some(v) = meta.get(*key) {
                metadata.insert((*key).to_string(), v.clone());
            }
        }
    }
    let mut view = Map::new();
    view.insert("metadata".to_string(), Value::Object(metadata));
    view.insert(
        "spec".to_string(),
        obj.get("spec").cloned().unwrap_or(Value::Null),
    );
    Value::Object(view)
}

/// Status without its conditions, as an object
fn status_fields(status: &Value) -> Value {
    let mut fields = status.as_object().cloned().unwrap_or_default();
    fields.remove("conditions");
    Value::Object(fields)
}

fn conditions_of(status: &Value) -> Result<Vec<Condition>> {
    match status.get("conditions") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(v) => serde_json::from_value(v.clone())
            .map_err(|e| Error::serialization(format!("invalid status conditions: {}", e))),
    }
}

fn find<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

fn same(a: Option<&Condition>, b: Option<&Condition>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => !a.differs_from(b),
        _ => false,
    }
}

fn to_json(obj: &ROSAControlPlane) -> Result<Value> {
    serde_json::to_value(obj)
        .map_err(|e| Error::serialization(format!("failed to serialize control plane: {}", e)))
}

/// Tracks changes to one control plane during a reconcile
#[derive(Debug)]
pub struct PatchHelper {
    before: Value,
    owned: Vec<Condition>,
}

impl PatchHelper {
    /// Snapshot `obj` as the baseline for later diffs
    pub fn new(obj: &ROSAControlPlane) -> Result<Self> {
        Ok(Self {
            before: to_json(obj)?,
            owned: Vec::new(),
        })
    }

    /// Record the value an owned condition was set to during this call.
    ///
    /// A later value for the same type replaces the earlier one.
    pub fn record_owned_condition(&mut self, condition: &Condition) {
        match self.owned.iter_mut().find(|c| c.type_ == condition.type_) {
            Some(existing) => *existing = condition.clone(),
            None => self.owned.push(condition.clone()),
        }
    }

    /// Owned conditions recorded so far
    pub fn owned_conditions(&self) -> &[Condition] {
        &self.owned
    }

    fn owned(&self, type_: &str) -> Option<&Condition> {
        find(&self.owned, type_)
    }

    /// True if some ledger entry is not reflected in `status`
    fn owned_pending(&self, status: &Value) -> Result<bool> {
        let conditions = conditions_of(status)?;
        Ok(self
            .owned
            .iter()
            .any(|c| !same(Some(c), find(&conditions, &c.type_))))
    }

    /// Persist every change made to `obj` since the snapshot.
    ///
    /// On success `obj` carries the server's new resource version and the
    /// merged status, and becomes the new baseline.
    pub async fn patch(
        &mut self,
        store: &dyn ControlPlaneStore,
        obj: &mut ROSAControlPlane,
    ) -> Result<()> {
        let namespace = obj.metadata.namespace.clone().unwrap_or_default();
        let name = obj.metadata.name.clone().unwrap_or_default();
        let after = to_json(obj)?;

        let main_patch = create_merge_patch(&main_view(&self.before), &main_view(&after));
        if !is_empty_patch(&main_patch) {
            let mut body = main_patch;
            body["metadata"]["resourceVersion"] =
                Value::from(obj.metadata.resource_version.clone().unwrap_or_default());
            debug!(
                object = %object_key(&obj.metadata),
                patch = %body,
                "patching metadata and spec"
            );
            let updated = store.patch_control_plane(&namespace, &name, &body).await?;
            obj.metadata.resource_version = updated.metadata.resource_version;
        }

        let before_status = self.before.get("status").cloned().unwrap_or(Value::Null);
        let after_status = after.get("status").cloned().unwrap_or(Value::Null);
        if before_status != after_status || self.owned_pending(&after_status)? {
            self.patch_status(store, obj, &namespace, &name, &before_status, &after_status)
                .await?;
        }

        self.before = to_json(obj)?;
        Ok(())
    }

    async fn patch_status(
        &self,
        store: &dyn ControlPlaneStore,
        obj: &mut ROSAControlPlane,
        namespace: &str,
        name: &str,
        before: &Value,
        after: &Value,
    ) -> Result<()> {
        let key = format!("{}/{}", namespace, name);
        let Some(latest) = store.get_control_plane(namespace, name).await? else {
            debug!(object = %key, "object gone before status write");
            return Ok(());
        };
        let latest_status = serde_json::to_value(&latest.status)
            .map_err(|e| Error::serialization(format!("failed to serialize status: {}", e)))?;

        let before_fields = status_fields(before);
        let after_fields = status_fields(after);
        let latest_fields = status_fields(&latest_status);
        let field_patch = create_merge_patch(&before_fields, &after_fields);

        if let Some(changed) = field_patch.as_object() {
            for field in changed.keys() {
                let ours = after_fields.get(field);
                let base = before_fields.get(field);
                let theirs = latest_fields.get(field);
                if theirs != base && theirs != ours {
                    return Err(Error::conflict(
                        ROSA_CONTROL_PLANE_KIND,
                        &key,
                        format!("status.{} was changed by another writer", field),
                    ));
                }
            }
        }

        let before_conditions = conditions_of(before)?;
        let after_conditions = conditions_of(after)?;
        let latest_conditions = conditions_of(&latest_status)?;
        let merged = self.merge_conditions(
            &key,
            &before_conditions,
            &after_conditions,
            &latest_conditions,
        )?;
        let conditions_changed = merged.len() != latest_conditions.len()
            || merged
                .iter()
                .any(|c| !same(Some(c), find(&latest_conditions, &c.type_)));

        let mut status_patch = field_patch.as_object().cloned().unwrap_or_default();
        if conditions_changed {
            status_patch.insert(
                "conditions".to_string(),
                serde_json::to_value(&merged).map_err(|e| {
                    Error::serialization(format!("failed to serialize conditions: {}", e))
                })?,
            );
        }
        if status_patch.is_empty() {
            return Ok(());
        }

        let body = serde_json::json!({
            "metadata": {"resourceVersion": latest.metadata.resource_version},
            "status": Value::Object(status_patch),
        });
        debug!(object = %key, patch = %body, "patching status");
        let updated = store
            .patch_control_plane_status(namespace, name, &body)
            .await?;

        obj.metadata.resource_version = updated.metadata.resource_version;
        obj.status.get_or_insert_with(Default::default).conditions = merged;
        Ok(())
    }

    /// Apply local condition changes onto the latest server conditions,
    /// then force every ledger entry.
    fn merge_conditions(
        &self,
        key: &str,
        before: &[Condition],
        after: &[Condition],
        latest: &[Condition],
    ) -> Result<Vec<Condition>> {
        let mut types: Vec<&str> = Vec::new();
        for c in before.iter().chain(after.iter()) {
            if !types.contains(&c.type_.as_str()) {
                types.push(&c.type_);
            }
        }

        let mut merged = latest.to_vec();
        for type_ in types {
            if self.owned(type_).is_some() {
                continue;
            }
            let ours = find(after, type_);
            if same(find(before, type_), ours) {
                continue;
            }
            if !same(find(before, type_), find(latest, type_)) {
                return Err(Error::conflict(
                    ROSA_CONTROL_PLANE_KIND,
                    key,
                    format!("condition {} was changed by another writer", type_),
                ));
            }
            merged.retain(|c| c.type_ != type_);
            if let Some(c) = ours {
                merged.push(c.clone());
            }
        }
        for owned in &self.owned {
            merged.retain(|c| c.type_ != owned.type_);
            merged.push(owned.clone());
        }
        Ok(merged)
    }
}
