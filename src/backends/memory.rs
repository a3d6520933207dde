//! In-Memory Backend
//!
//! A multi-version object store plus an eventually consistent search index,
//! kept in process. Objects remember the version they were written under;
//! reading them through a version pair marked unconvertible yields the
//! server-style `status.conversion` failure marker. Index updates become
//! visible only after a configurable number of search calls.

use crate::domain::context::RequestContext;
use crate::domain::ports::{ResourceStore, SearchIndex, StoreProvider};
use crate::domain::types::{
    ConversionStatus, DeleteOptions, GetOptions, ListOptions, ResourceCount, ResourceList,
    ResourceObject, ResourceStats, ResourceType, SearchHit, SearchQuery, SearchResult,
    SEARCH_FIELD_NAME, SEARCH_FIELD_RESOURCE_VERSION,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::debug;

// =============================================================================
// Internal State
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct ObjectKey {
    group: String,
    plural: String,
    namespace: String,
    name: String,
}

impl ObjectKey {
    fn new(resource: &ResourceType, namespace: &str, name: &str) -> Self {
        Self {
            group: resource.group.clone(),
            plural: resource.plural.clone(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    fn same_collection(&self, resource: &ResourceType, namespace: &str) -> bool {
        self.group == resource.group
            && self.plural == resource.plural
            && self.namespace == namespace
    }
}

#[derive(Debug, Clone)]
struct StoredObject {
    object: ResourceObject,
    stored_version: String,
}

#[derive(Debug)]
enum IndexOp {
    Upsert(SearchHit),
    Remove,
}

#[derive(Debug)]
struct PendingIndexOp {
    key: ObjectKey,
    op: IndexOp,
    visible_at: u64,
}

#[derive(Debug, Default)]
struct State {
    objects: BTreeMap<ObjectKey, StoredObject>,
    next_rv: u64,
    /// (stored version, requested version) pairs that fail conversion
    unconvertible: HashSet<(String, String)>,
    index: BTreeMap<ObjectKey, SearchHit>,
    pending: VecDeque<PendingIndexOp>,
    search_calls: u64,
}

impl State {
    fn next_resource_version(&mut self) -> String {
        self.next_rv += 1;
        self.next_rv.to_string()
    }

    fn enqueue(&mut self, key: ObjectKey, op: IndexOp, lag: u64) {
        let visible_at = self.search_calls + lag + 1;
        self.pending.push_back(PendingIndexOp {
            key,
            op,
            visible_at,
        });
    }

    fn apply_due(&mut self) {
        while let Some(front) = self.pending.front() {
            if front.visible_at > self.search_calls {
                break;
            }
            let Some(pending) = self.pending.pop_front() else {
                break;
            };
            match pending.op {
                IndexOp::Upsert(hit) => {
                    self.index.insert(pending.key, hit);
                }
                IndexOp::Remove => {
                    self.index.remove(&pending.key);
                }
            }
        }
    }
}

fn search_hit(key: &ObjectKey, object: &ResourceObject) -> SearchHit {
    let mut fields = BTreeMap::new();
    if let Some(title) = object.field(&["spec", "title"]).and_then(Value::as_str) {
        fields.insert("title".to_string(), title.to_string());
    }
    for (k, v) in object.labels() {
        fields.insert(format!("labels.{}", k), v);
    }
    SearchHit {
        name: key.name.clone(),
        namespace: key.namespace.clone(),
        resource_version: object.resource_version().unwrap_or_default().to_string(),
        fields,
    }
}

fn hit_field<'a>(hit: &'a SearchHit, key: &str) -> Option<&'a str> {
    match key {
        SEARCH_FIELD_NAME => Some(&hit.name),
        SEARCH_FIELD_RESOURCE_VERSION => Some(&hit.resource_version),
        other => hit.fields.get(other).map(String::as_str),
    }
}

/// Parse an equality selector: `a=b,c=d`
fn parse_selector(selector: &str) -> Result<Vec<(String, String)>> {
    selector
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|term| {
            term.split_once('=')
                .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                .ok_or_else(|| {
                    Error::InvalidObject(format!("unsupported label selector {:?}", term))
                })
        })
        .collect()
}

// =============================================================================
// Memory Backend
// =============================================================================

/// Shared in-memory store and search index.
///
/// Index updates queue up until a search makes them due, so a backend
/// that takes writes but is never searched keeps one pending entry per
/// write. Intended for tests and embedders that also search.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<State>>,
    index_lag: u64,
}

impl MemoryBackend {
    /// Backend whose index reflects writes on the next search
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend whose index hides each write from the next `lag` searches
    pub fn with_index_lag(lag: u64) -> Self {
        Self {
            index_lag: lag,
            ..Default::default()
        }
    }

    /// Objects stored under `stored` cannot be served as `requested`
    pub fn mark_unconvertible(&self, stored: &str, requested: &str) {
        self.state
            .lock()
            .unconvertible
            .insert((stored.to_string(), requested.to_string()));
    }

    /// Index updates written but not yet applied
    pub fn pending_index_ops(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Version an object is currently stored in
    pub fn stored_version(
        &self,
        resource: &ResourceType,
        namespace: &str,
        name: &str,
    ) -> Option<String> {
        self.state
            .lock()
            .objects
            .get(&ObjectKey::new(resource, namespace, name))
            .map(|s| s.stored_version.clone())
    }
}

impl StoreProvider for MemoryBackend {
    fn store(&self, resource: &ResourceType) -> Result<Arc<dyn ResourceStore>> {
        Ok(Arc::new(MemoryStore {
            resource: resource.clone(),
            state: self.state.clone(),
            index_lag: self.index_lag,
        }))
    }
}

#[async_trait]
impl SearchIndex for MemoryBackend {
    async fn search(
        &self,
        _ctx: &RequestContext,
        namespace: &str,
        resource: &ResourceType,
        query: &SearchQuery,
    ) -> Result<SearchResult> {
        let mut state = self.state.lock();
        state.search_calls += 1;
        state.apply_due();

        let matched: Vec<SearchHit> = state
            .index
            .iter()
            .filter(|(key, _)| key.same_collection(resource, namespace))
            .filter(|(_, hit)| {
                query
                    .fields
                    .iter()
                    .all(|req| req.matches(hit_field(hit, &req.key)))
            })
            .map(|(_, hit)| hit.clone())
            .collect();

        let total_hits = matched.len() as i64;
        let hits = if query.limit > 0 {
            matched.into_iter().take(query.limit as usize).collect()
        } else {
            matched
        };
        Ok(SearchResult { total_hits, hits })
    }

    async fn stats(
        &self,
        _ctx: &RequestContext,
        namespace: &str,
        resources: &[ResourceType],
    ) -> Result<ResourceStats> {
        let state = self.state.lock();
        let counts = resources
            .iter()
            .map(|resource| ResourceCount {
                group: resource.group.clone(),
                resource: resource.plural.clone(),
                count: state
                    .index
                    .keys()
                    .filter(|key| key.same_collection(resource, namespace))
                    .count() as i64,
            })
            .collect();
        Ok(ResourceStats { counts })
    }
}

// =============================================================================
// Memory Store
// =============================================================================

/// Store view bound to one resource version
pub struct MemoryStore {
    resource: ResourceType,
    state: Arc<Mutex<State>>,
    index_lag: u64,
}

impl MemoryStore {
    /// Render a stored object as seen through this store's version
    fn render(&self, state: &State, stored: &StoredObject) -> ResourceObject {
        let requested = &self.resource.version;
        let mut object = stored.object.clone();
        object.set_field(&["apiVersion"], json!(self.resource.api_version()));

        if stored.stored_version != *requested
            && state
                .unconvertible
                .contains(&(stored.stored_version.clone(), requested.clone()))
        {
            let status = ConversionStatus {
                failed: true,
                stored_version: Some(stored.stored_version.clone()),
                error: Some(format!(
                    "cannot convert {} to {}",
                    stored.stored_version, requested
                )),
            };
            object.remove_field("spec");
            object.set_field(&["status", "conversion"], status.to_value());
        }
        object
    }

    fn not_found(&self, name: &str) -> Error {
        Error::not_found(&self.resource.plural, name)
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    fn resource(&self) -> &ResourceType {
        &self.resource
    }

    async fn get(
        &self,
        _ctx: &RequestContext,
        namespace: &str,
        name: &str,
        _opts: &GetOptions,
    ) -> Result<ResourceObject> {
        let state = self.state.lock();
        let stored = state
            .objects
            .get(&ObjectKey::new(&self.resource, namespace, name))
            .ok_or_else(|| self.not_found(name))?;
        Ok(self.render(&state, stored))
    }

    async fn create(
        &self,
        _ctx: &RequestContext,
        namespace: &str,
        mut obj: ResourceObject,
    ) -> Result<ResourceObject> {
        let name = obj.require_name()?.to_string();
        let key = ObjectKey::new(&self.resource, namespace, &name);

        let mut state = self.state.lock();
        if state.objects.contains_key(&key) {
            return Err(Error::AlreadyExists {
                kind: self.resource.plural.clone(),
                name,
            });
        }

        let rv = state.next_resource_version();
        obj.set_field(&["metadata", "resourceVersion"], json!(rv));
        obj.set_field(
            &["metadata", "creationTimestamp"],
            json!(chrono::Utc::now().to_rfc3339()),
        );
        state.objects.insert(
            key.clone(),
            StoredObject {
                object: obj.clone(),
                stored_version: self.resource.version.clone(),
            },
        );
        let hit = search_hit(&key, &obj);
        state.enqueue(key, IndexOp::Upsert(hit), self.index_lag);

        debug!(
            resource = %self.resource,
            namespace = %namespace,
            name = %name,
            rv = %rv,
            "Created object"
        );
        Ok(obj)
    }

    async fn update(
        &self,
        _ctx: &RequestContext,
        namespace: &str,
        mut obj: ResourceObject,
    ) -> Result<ResourceObject> {
        let name = obj.require_name()?.to_string();
        let key = ObjectKey::new(&self.resource, namespace, &name);

        let mut state = self.state.lock();
        let existing = state
            .objects
            .get(&key)
            .ok_or_else(|| self.not_found(&name))?;

        let current_rv = existing.object.resource_version().map(str::to_string);
        if let (Some(given), Some(current)) = (obj.resource_version(), current_rv.as_deref()) {
            if given != current {
                return Err(Error::Conflict {
                    kind: self.resource.plural.clone(),
                    name,
                    reason: format!("resourceVersion {} is stale, current is {}", given, current),
                });
            }
        }
        if let Some(created) = existing.object.field(&["metadata", "creationTimestamp"]).cloned() {
            obj.set_field(&["metadata", "creationTimestamp"], created);
        }

        let rv = state.next_resource_version();
        obj.set_field(&["metadata", "resourceVersion"], json!(rv));
        state.objects.insert(
            key.clone(),
            StoredObject {
                object: obj.clone(),
                stored_version: self.resource.version.clone(),
            },
        );
        let hit = search_hit(&key, &obj);
        state.enqueue(key, IndexOp::Upsert(hit), self.index_lag);
        Ok(obj)
    }

    async fn delete(
        &self,
        _ctx: &RequestContext,
        namespace: &str,
        name: &str,
        opts: &DeleteOptions,
    ) -> Result<()> {
        let key = ObjectKey::new(&self.resource, namespace, name);
        let mut state = self.state.lock();
        let existing = state.objects.get(&key).ok_or_else(|| self.not_found(name))?;

        if let Some(expected) = opts.resource_version.as_deref() {
            let current = existing.object.resource_version().unwrap_or_default();
            if expected != current {
                return Err(Error::Conflict {
                    kind: self.resource.plural.clone(),
                    name: name.to_string(),
                    reason: format!(
                        "resourceVersion {} is stale, current is {}",
                        expected, current
                    ),
                });
            }
        }

        state.objects.remove(&key);
        state.enqueue(key, IndexOp::Remove, self.index_lag);
        Ok(())
    }

    async fn delete_collection(&self, _ctx: &RequestContext, namespace: &str) -> Result<()> {
        let mut state = self.state.lock();
        let doomed: Vec<ObjectKey> = state
            .objects
            .keys()
            .filter(|key| key.same_collection(&self.resource, namespace))
            .cloned()
            .collect();
        for key in doomed {
            state.objects.remove(&key);
            state.enqueue(key, IndexOp::Remove, self.index_lag);
        }
        Ok(())
    }

    async fn list(
        &self,
        _ctx: &RequestContext,
        namespace: &str,
        opts: &ListOptions,
    ) -> Result<ResourceList> {
        let selector = match opts.label_selector.as_deref() {
            Some(s) => parse_selector(s)?,
            None => Vec::new(),
        };
        let state = self.state.lock();

        let mut items = Vec::new();
        let mut continue_token = None;
        for (key, stored) in state.objects.iter() {
            if !key.same_collection(&self.resource, namespace) {
                continue;
            }
            if let Some(after) = opts.continue_token.as_deref() {
                if key.name.as_str() <= after {
                    continue;
                }
            }
            let labels = stored.object.labels();
            if !selector
                .iter()
                .all(|(k, v)| labels.get(k).is_some_and(|actual| actual == v))
            {
                continue;
            }
            if let Some(limit) = opts.limit.filter(|l| *l > 0) {
                if items.len() == limit as usize {
                    continue_token = items
                        .last()
                        .and_then(|last: &ResourceObject| last.name().map(str::to_string));
                    break;
                }
            }
            items.push(self.render(&state, stored));
        }

        Ok(ResourceList {
            items,
            continue_token,
        })
    }
}
