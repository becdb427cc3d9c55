//!
//! nimbus resource store
//! ---------------------
//! In-memory store for all emulated resources. Owns id allocation, tag
//! storage, insertion-ordered listing, and the back-reference index used for
//! delete-time dependency-integrity checks.
//!
//! Key responsibilities:
//! - `<prefix>-<random-hex>` id allocation with bounded collision retry.
//! - Reference indexing over the type-declared reference fields only.
//! - Integrity-checked delete with the per-type cascade exception list.
//! - Tag merge/remove with overwrite-by-key and stable enumeration order.
//!
//! The public API centers around the `Store` type, wrapped in a thread-safe
//! `SharedStore` (`Arc<Mutex<Store>>`). Every operation is a single critical
//! section under that lock, so a delete's integrity check and its removal are
//! atomic relative to any racing create or update: the race in §concurrency
//! always resolves to NotFound on the create or DependencyViolation on the
//! delete, never both outcomes at once.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::{ApiError, ApiResult};
use crate::types::ResourceType;
use crate::value::Value;

/// Bounded retry for id allocation. Collisions are effectively impossible at
/// 17 hex chars; the retry path exists for correctness, not performance.
const MAX_ID_ATTEMPTS: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Tag { key: key.into(), value: value.into() }
    }
}

/// A single emulated resource. `attributes` is a heterogeneous per-type tree;
/// handlers shape it, the store only reads the declared reference fields and
/// mirrors the resource's own id into its canonical id attribute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    pub rtype: ResourceType,
    pub id: String,
    pub attributes: Value,
    pub tags: Vec<Tag>,
    pub state: String,
    pub created_at: DateTime<Utc>,
    /// Created implicitly by the emulator (a vpc's default security group or
    /// main route table); only implicit resources participate in cascades.
    pub implicit: bool,
}

impl Resource {
    pub fn tag_value(&self, key: &str) -> Option<&str> {
        self.tags.iter().find(|t| t.key == key).map(|t| t.value.as_str())
    }

    pub fn attr(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attributes.get_str(key)
    }
}

/// Per-type resource map plus insertion order for stable listing.
#[derive(Debug, Default)]
struct TypedSet {
    items: HashMap<String, Resource>,
    order: Vec<String>,
}

impl TypedSet {
    fn insert(&mut self, r: Resource) {
        if !self.items.contains_key(&r.id) {
            self.order.push(r.id.clone());
        }
        self.items.insert(r.id.clone(), r);
    }

    fn remove(&mut self, id: &str) -> Option<Resource> {
        let removed = self.items.remove(id);
        if removed.is_some() {
            self.order.retain(|x| x != id);
        }
        removed
    }

    fn list(&self) -> Vec<Resource> {
        self.order.iter().filter_map(|id| self.items.get(id).cloned()).collect()
    }
}

/// Random lowercase hex string of the requested length, used for id suffixes
/// and reservation ids.
pub fn random_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len.div_ceil(2)];
    let _ = getrandom::getrandom(&mut bytes);
    let mut out = String::with_capacity(len + 1);
    use std::fmt::Write as _;
    for b in &bytes {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out.truncate(len);
    out
}

#[derive(Debug, Default)]
pub struct Store {
    sets: HashMap<ResourceType, TypedSet>,
    /// referenced id -> ids of resources whose declared reference fields
    /// point at it. Maintained incrementally on create/update/delete.
    referenced_by: HashMap<String, HashSet<String>>,
}

impl Store {
    pub fn new() -> Self {
        Store::default()
    }

    /// Create a resource: verify declared references, allocate an id, mirror
    /// it into the canonical id attribute, merge tags, and index references.
    /// The resource is visible to queries the moment this returns.
    pub fn create(&mut self, rtype: ResourceType, attributes: Value, tags: Vec<Tag>) -> ApiResult<Resource> {
        self.create_inner(rtype, attributes, tags, false)
    }

    /// Create a resource flagged as emulator-implicit (eligible for cascade
    /// deletion when its referenced parent goes away).
    pub fn create_implicit(&mut self, rtype: ResourceType, attributes: Value, tags: Vec<Tag>) -> ApiResult<Resource> {
        self.create_inner(rtype, attributes, tags, true)
    }

    fn create_inner(&mut self, rtype: ResourceType, mut attributes: Value, tags: Vec<Tag>, implicit: bool) -> ApiResult<Resource> {
        if !attributes.is_map() {
            return Err(ApiError::internal("resource attributes must be a map"));
        }
        let refs = Self::collect_refs(rtype, &attributes);
        self.verify_refs_exist(&refs)?;

        let id = self.allocate_id(rtype)?;
        attributes.set(rtype.id_attribute(), Value::str(&id));

        let resource = Resource {
            rtype,
            id: id.clone(),
            attributes,
            tags: merge_tags(Vec::new(), tags),
            state: rtype.initial_state().to_string(),
            created_at: Utc::now(),
            implicit,
        };

        for r in &refs {
            self.referenced_by.entry(r.clone()).or_default().insert(id.clone());
        }
        self.sets.entry(rtype).or_default().insert(resource.clone());
        debug!(target: "nimbus::store", "create: type='{}' id='{}' refs={} implicit={}", rtype.wire_name(), id, refs.len(), implicit);
        Ok(resource)
    }

    pub fn get(&self, rtype: ResourceType, id: &str) -> ApiResult<&Resource> {
        self.sets
            .get(&rtype)
            .and_then(|s| s.items.get(id))
            .ok_or_else(|| not_found(rtype, id))
    }

    pub fn get_cloned(&self, rtype: ResourceType, id: &str) -> ApiResult<Resource> {
        self.get(rtype, id).cloned()
    }

    /// All resources of a type, in insertion order.
    pub fn list(&self, rtype: ResourceType) -> Vec<Resource> {
        self.sets.get(&rtype).map(|s| s.list()).unwrap_or_default()
    }

    /// Every stored resource, grouped by type in the fixed type order. Used by
    /// cross-type actions such as DescribeTags.
    pub fn all_resources(&self) -> Vec<Resource> {
        let mut out = Vec::new();
        for t in ResourceType::ALL {
            out.extend(self.list(t));
        }
        out
    }

    /// Resolve any id to its resource via the prefix table.
    pub fn find_by_id(&self, id: &str) -> Option<&Resource> {
        let rtype = ResourceType::from_id(id)?;
        self.sets.get(&rtype).and_then(|s| s.items.get(id))
    }

    /// Apply an attribute/state/tag mutation atomically. The mutator runs on a
    /// copy; the copy is committed (and references re-indexed) only if the
    /// mutator succeeds, the resulting state is valid for the type, and any
    /// newly referenced ids exist.
    pub fn update<F>(&mut self, rtype: ResourceType, id: &str, mutator: F) -> ApiResult<Resource>
    where
        F: FnOnce(&mut Resource) -> ApiResult<()>,
    {
        let current = self.get(rtype, id)?.clone();
        let old_refs = Self::collect_refs(rtype, &current.attributes);

        let mut updated = current;
        mutator(&mut updated)?;
        updated.id = id.to_string();
        updated.rtype = rtype;
        updated.attributes.set(rtype.id_attribute(), Value::str(id));
        if !rtype.valid_states().contains(&updated.state.as_str()) {
            return Err(ApiError::validation(
                "IncorrectState",
                format!("'{}' is not a valid state for a {}", updated.state, rtype.wire_name()),
            ));
        }

        let new_refs = Self::collect_refs(rtype, &updated.attributes);
        self.verify_refs_exist(&new_refs)?;

        for r in &old_refs {
            if let Some(set) = self.referenced_by.get_mut(r) {
                set.remove(id);
                if set.is_empty() {
                    self.referenced_by.remove(r);
                }
            }
        }
        for r in &new_refs {
            self.referenced_by.entry(r.clone()).or_default().insert(id.to_string());
        }
        self.sets.entry(rtype).or_default().insert(updated.clone());
        debug!(target: "nimbus::store", "update: type='{}' id='{}'", rtype.wire_name(), id);
        Ok(updated)
    }

    /// Convenience state transition through `update`.
    pub fn set_state(&mut self, rtype: ResourceType, id: &str, state: &str) -> ApiResult<Resource> {
        let state = state.to_string();
        self.update(rtype, id, move |r| {
            r.state = state;
            Ok(())
        })
    }

    /// Delete a resource. Fails with DependencyViolation if the reference
    /// index shows live referencing resources outside the type's cascade
    /// exception list; implicit dependents on that list are deleted together
    /// with the target.
    pub fn delete(&mut self, rtype: ResourceType, id: &str) -> ApiResult<()> {
        self.get(rtype, id)?;

        let referrers: Vec<String> = self
            .referenced_by
            .get(id)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default();

        let mut cascade: Vec<(ResourceType, String)> = Vec::new();
        for rid in referrers {
            let Some(rt) = ResourceType::from_id(&rid) else { continue };
            let Some(res) = self.sets.get(&rt).and_then(|s| s.items.get(&rid)) else { continue };
            if rtype.cascade_allowed_from().contains(&rt) && res.implicit {
                cascade.push((rt, rid));
            } else {
                debug!(target: "nimbus::store", "delete blocked: type='{}' id='{}' referenced by '{}'", rtype.wire_name(), id, rid);
                return Err(ApiError::dependency(format!(
                    "The {} '{}' has dependencies and cannot be deleted.",
                    rtype.wire_name(),
                    id
                )));
            }
        }

        for (rt, rid) in cascade {
            debug!(target: "nimbus::store", "delete cascade: '{}' removed with '{}'", rid, id);
            self.remove_unchecked(rt, &rid);
        }
        self.remove_unchecked(rtype, id);
        debug!(target: "nimbus::store", "delete: type='{}' id='{}'", rtype.wire_name(), id);
        Ok(())
    }

    /// Merge tags into a resource's tag set (overwrite by key). The id may
    /// name any resource type.
    pub fn tag_resource(&mut self, id: &str, tags: Vec<Tag>) -> ApiResult<()> {
        let rtype = ResourceType::from_id(id)
            .ok_or_else(|| ApiError::validation("InvalidID", format!("The ID '{}' is not valid", id)))?;
        let set = self.sets.entry(rtype).or_default();
        let res = set.items.get_mut(id).ok_or_else(|| not_found(rtype, id))?;
        res.tags = merge_tags(std::mem::take(&mut res.tags), tags);
        Ok(())
    }

    /// Remove tags by key. Missing keys are ignored, matching the provider.
    pub fn untag_resource(&mut self, id: &str, keys: &[String]) -> ApiResult<()> {
        let rtype = ResourceType::from_id(id)
            .ok_or_else(|| ApiError::validation("InvalidID", format!("The ID '{}' is not valid", id)))?;
        let set = self.sets.entry(rtype).or_default();
        let res = set.items.get_mut(id).ok_or_else(|| not_found(rtype, id))?;
        res.tags.retain(|t| !keys.contains(&t.key));
        Ok(())
    }

    fn remove_unchecked(&mut self, rtype: ResourceType, id: &str) {
        if let Some(removed) = self.sets.get_mut(&rtype).and_then(|s| s.remove(id)) {
            for r in Self::collect_refs(rtype, &removed.attributes) {
                if let Some(set) = self.referenced_by.get_mut(&r) {
                    set.remove(id);
                    if set.is_empty() {
                        self.referenced_by.remove(&r);
                    }
                }
            }
        }
        self.referenced_by.remove(id);
    }

    fn allocate_id(&self, rtype: ResourceType) -> ApiResult<String> {
        let hex_len = rtype.id_form().hex_len();
        for _ in 0..MAX_ID_ATTEMPTS {
            let id = format!("{}-{}", rtype.prefix(), random_hex(hex_len));
            let taken = self.sets.get(&rtype).map(|s| s.items.contains_key(&id)).unwrap_or(false);
            if !taken {
                return Ok(id);
            }
        }
        error!(target: "nimbus::store", "id allocation exhausted for type '{}'", rtype.wire_name());
        Err(ApiError::internal(format!("unable to allocate a unique {} id", rtype.wire_name())))
    }

    /// Referenced ids from the type-declared reference fields. A field may be
    /// a single id or a list of ids; empty strings are skipped.
    fn collect_refs(rtype: ResourceType, attributes: &Value) -> Vec<String> {
        let mut out = Vec::new();
        for field in rtype.reference_fields() {
            match attributes.get(field) {
                Some(Value::Str(s)) if !s.is_empty() => out.push(s.clone()),
                Some(Value::List(items)) => {
                    for item in items {
                        if let Some(s) = item.as_str() {
                            if !s.is_empty() {
                                out.push(s.to_string());
                            }
                        }
                    }
                }
                _ => {}
            }
        }
        out
    }

    fn verify_refs_exist(&self, refs: &[String]) -> ApiResult<()> {
        for id in refs {
            let rtype = ResourceType::from_id(id).ok_or_else(|| {
                ApiError::validation("InvalidParameterValue", format!("Invalid id: \"{}\"", id))
            })?;
            if self.sets.get(&rtype).map(|s| !s.items.contains_key(id)).unwrap_or(true) {
                return Err(not_found(rtype, id));
            }
        }
        Ok(())
    }
}

fn not_found(rtype: ResourceType, id: &str) -> ApiError {
    ApiError::not_found(rtype.not_found_code(), format!("The id '{}' does not exist", id))
}

/// Overwrite-by-key tag merge preserving first-insertion order of keys.
fn merge_tags(mut existing: Vec<Tag>, incoming: Vec<Tag>) -> Vec<Tag> {
    for tag in incoming {
        match existing.iter_mut().find(|t| t.key == tag.key) {
            Some(t) => t.value = tag.value,
            None => existing.push(tag),
        }
    }
    existing
}

/// Thread-safe shared handle; clone freely across request tasks.
#[derive(Clone, Default)]
pub struct SharedStore(pub Arc<Mutex<Store>>);

impl SharedStore {
    pub fn new() -> Self {
        SharedStore(Arc::new(Mutex::new(Store::new())))
    }
}
