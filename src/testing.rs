//! Scripted collaborators shared by the unit tests

use crate::domain::context::RequestContext;
use crate::domain::ports::{ResourceHandle, ResourceStore, SearchIndex, UserDirectory};
use crate::domain::types::{
    DeleteOptions, GetOptions, ListOptions, ResourceList, ResourceObject, ResourceStats,
    ResourceType, SearchQuery, SearchResult, UserRecord,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id, Record};
use tracing::subscriber::DefaultGuard;
use tracing::Subscriber;
use tracing_subscriber::layer::{Context as LayerContext, Layer};
use tracing_subscriber::prelude::*;

pub fn dashboards(version: &str) -> ResourceType {
    ResourceType::new("dashboard.grafana.app", version, "Dashboard", "dashboards")
}

pub fn user(id: i64, uid: &str) -> UserRecord {
    UserRecord {
        id,
        uid: uid.to_string(),
        login: format!("user{}", id),
        email: format!("user{}@example.com", id),
        name: format!("User {}", id),
        is_service_account: false,
    }
}

pub fn object(value: Value) -> ResourceObject {
    ResourceObject::from_value(value).expect("test object must be a JSON object")
}

// =============================================================================
// Store
// =============================================================================

pub struct MockStore {
    resource: ResourceType,
    objects: Mutex<BTreeMap<(String, String), ResourceObject>>,
    failure: Mutex<Option<String>>,
    calls: AtomicUsize,
    next_rv: AtomicU64,
}

impl MockStore {
    pub fn new(resource: ResourceType) -> Self {
        Self {
            resource,
            objects: Mutex::new(BTreeMap::new()),
            failure: Mutex::new(None),
            calls: AtomicUsize::new(0),
            next_rv: AtomicU64::new(1),
        }
    }

    pub fn insert(&self, namespace: &str, value: Value) {
        let obj = object(value);
        let name = obj.name().unwrap_or_default().to_string();
        self.objects.lock().insert((namespace.to_string(), name), obj);
    }

    pub fn fail_with(&self, reason: &str) {
        *self.failure.lock() = Some(reason.to_string());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn enter(&self, operation: &str) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.failure.lock().as_ref() {
            Some(reason) => Err(Error::transport(operation, reason.clone())),
            None => Ok(()),
        }
    }

    fn stamp(&self, mut obj: ResourceObject) -> ResourceObject {
        let rv = self.next_rv.fetch_add(1, Ordering::SeqCst);
        obj.set_field(&["metadata", "resourceVersion"], json!(rv.to_string()));
        obj
    }
}

#[async_trait]
impl ResourceStore for MockStore {
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
        self.enter("get")?;
        self.objects
            .lock()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| Error::not_found(&self.resource.plural, name))
    }

    async fn create(
        &self,
        _ctx: &RequestContext,
        namespace: &str,
        obj: ResourceObject,
    ) -> Result<ResourceObject> {
        self.enter("create")?;
        let name = obj.require_name()?.to_string();
        let mut objects = self.objects.lock();
        let key = (namespace.to_string(), name.clone());
        if objects.contains_key(&key) {
            return Err(Error::AlreadyExists {
                kind: self.resource.plural.clone(),
                name,
            });
        }
        let obj = self.stamp(obj);
        objects.insert(key, obj.clone());
        Ok(obj)
    }

    async fn update(
        &self,
        _ctx: &RequestContext,
        namespace: &str,
        obj: ResourceObject,
    ) -> Result<ResourceObject> {
        self.enter("update")?;
        let name = obj.require_name()?.to_string();
        let mut objects = self.objects.lock();
        let key = (namespace.to_string(), name.clone());
        if !objects.contains_key(&key) {
            return Err(Error::not_found(&self.resource.plural, name));
        }
        let obj = self.stamp(obj);
        objects.insert(key, obj.clone());
        Ok(obj)
    }

    async fn delete(
        &self,
        _ctx: &RequestContext,
        namespace: &str,
        name: &str,
        _opts: &DeleteOptions,
    ) -> Result<()> {
        self.enter("delete")?;
        self.objects
            .lock()
            .remove(&(namespace.to_string(), name.to_string()))
            .map(|_| ())
            .ok_or_else(|| Error::not_found(&self.resource.plural, name))
    }

    async fn delete_collection(&self, _ctx: &RequestContext, namespace: &str) -> Result<()> {
        self.enter("delete_collection")?;
        self.objects.lock().retain(|(ns, _), _| ns != namespace);
        Ok(())
    }

    async fn list(
        &self,
        _ctx: &RequestContext,
        namespace: &str,
        _opts: &ListOptions,
    ) -> Result<ResourceList> {
        self.enter("list")?;
        let items = self
            .objects
            .lock()
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, obj)| obj.clone())
            .collect();
        Ok(ResourceList {
            items,
            continue_token: None,
        })
    }
}

// =============================================================================
// Search
// =============================================================================

/// Reports scripted `total_hits` values, repeating the last one forever
#[derive(Default)]
pub struct MockSearch {
    hits: Mutex<VecDeque<i64>>,
    failure: Mutex<Option<String>>,
    queries: Mutex<Vec<(String, SearchQuery)>>,
}

impl MockSearch {
    pub fn with_hits(hits: &[i64]) -> Self {
        Self {
            hits: Mutex::new(hits.iter().copied().collect()),
            ..Default::default()
        }
    }

    pub fn fail_with(&self, reason: &str) {
        *self.failure.lock() = Some(reason.to_string());
    }

    pub fn queries(&self) -> Vec<SearchQuery> {
        self.queries.lock().iter().map(|(_, q)| q.clone()).collect()
    }

    pub fn namespaces(&self) -> Vec<String> {
        self.queries.lock().iter().map(|(ns, _)| ns.clone()).collect()
    }

    fn next_hits(&self) -> i64 {
        let mut hits = self.hits.lock();
        if hits.len() > 1 {
            hits.pop_front().unwrap_or_default()
        } else {
            hits.front().copied().unwrap_or_default()
        }
    }
}

#[async_trait]
impl SearchIndex for MockSearch {
    async fn search(
        &self,
        _ctx: &RequestContext,
        namespace: &str,
        _resource: &ResourceType,
        query: &SearchQuery,
    ) -> Result<SearchResult> {
        self.queries
            .lock()
            .push((namespace.to_string(), query.clone()));
        if let Some(reason) = self.failure.lock().as_ref() {
            return Err(Error::transport("search", reason.clone()));
        }
        Ok(SearchResult {
            total_hits: self.next_hits(),
            hits: Vec::new(),
        })
    }

    async fn stats(
        &self,
        _ctx: &RequestContext,
        _namespace: &str,
        _resources: &[ResourceType],
    ) -> Result<ResourceStats> {
        Ok(ResourceStats::default())
    }
}

// =============================================================================
// Users
// =============================================================================

#[derive(Default)]
pub struct MockDirectory {
    users: Vec<UserRecord>,
    lookups: Mutex<Vec<(Vec<String>, Vec<i64>)>>,
}

impl MockDirectory {
    pub fn new(users: Vec<UserRecord>) -> Self {
        Self {
            users,
            lookups: Mutex::new(Vec::new()),
        }
    }

    pub fn lookups(&self) -> Vec<(Vec<String>, Vec<i64>)> {
        self.lookups.lock().clone()
    }
}

#[async_trait]
impl UserDirectory for MockDirectory {
    async fn list_by_id_or_uid(
        &self,
        _ctx: &RequestContext,
        uids: &[String],
        ids: &[i64],
    ) -> Result<Vec<UserRecord>> {
        self.lookups.lock().push((uids.to_vec(), ids.to_vec()));
        Ok(self
            .users
            .iter()
            .filter(|u| ids.contains(&u.id) || uids.contains(&u.uid))
            .cloned()
            .collect())
    }
}

// =============================================================================
// Handle
// =============================================================================

/// Handle returning one scripted object from `get` and echoing writes
pub struct MockHandle {
    resource: ResourceType,
    object: Mutex<Option<Value>>,
    failure: Mutex<Option<String>>,
    search: MockSearch,
    gets: Mutex<Vec<String>>,
    writes: AtomicUsize,
    next_rv: AtomicU64,
}

impl MockHandle {
    pub fn new(version: &str) -> Self {
        Self {
            resource: dashboards(version),
            object: Mutex::new(None),
            failure: Mutex::new(None),
            search: MockSearch::default(),
            gets: Mutex::new(Vec::new()),
            writes: AtomicUsize::new(0),
            next_rv: AtomicU64::new(1),
        }
    }

    pub fn returning(version: &str, value: Value) -> Self {
        let handle = Self::new(version);
        *handle.object.lock() = Some(value);
        handle
    }

    pub fn with_search_hits(mut self, hits: &[i64]) -> Self {
        self.search = MockSearch::with_hits(hits);
        self
    }

    pub fn fail_with(&self, reason: &str) {
        *self.failure.lock() = Some(reason.to_string());
    }

    pub fn search_index(&self) -> &MockSearch {
        &self.search
    }

    pub fn get_calls(&self) -> Vec<String> {
        self.gets.lock().clone()
    }

    pub fn write_calls(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn check(&self, operation: &str) -> Result<()> {
        match self.failure.lock().as_ref() {
            Some(reason) => Err(Error::transport(operation, reason.clone())),
            None => Ok(()),
        }
    }

    fn write(&self, operation: &str, mut obj: ResourceObject) -> Result<ResourceObject> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.check(operation)?;
        let rv = self.next_rv.fetch_add(1, Ordering::SeqCst);
        obj.set_field(&["metadata", "resourceVersion"], json!(rv.to_string()));
        Ok(obj)
    }
}

#[async_trait]
impl ResourceHandle for MockHandle {
    fn resource(&self) -> &ResourceType {
        &self.resource
    }

    fn namespace(&self, org_id: i64) -> String {
        crate::domain::namespace::org_namespace(org_id)
    }

    async fn get(
        &self,
        ctx: &RequestContext,
        name: &str,
        _org_id: i64,
        _opts: &GetOptions,
    ) -> Result<ResourceObject> {
        ctx.check()?;
        self.gets.lock().push(name.to_string());
        self.check("get")?;
        match self.object.lock().clone() {
            Some(value) => ResourceObject::from_value(value),
            None => Err(Error::not_found(&self.resource.plural, name)),
        }
    }

    async fn create(
        &self,
        _ctx: &RequestContext,
        obj: ResourceObject,
        _org_id: i64,
    ) -> Result<ResourceObject> {
        self.write("create", obj)
    }

    async fn update(
        &self,
        _ctx: &RequestContext,
        obj: ResourceObject,
        _org_id: i64,
    ) -> Result<ResourceObject> {
        self.write("update", obj)
    }

    async fn delete(
        &self,
        _ctx: &RequestContext,
        _name: &str,
        _org_id: i64,
        _opts: &DeleteOptions,
    ) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.check("delete")
    }

    async fn delete_collection(&self, _ctx: &RequestContext, _org_id: i64) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.check("delete_collection")
    }

    async fn list(
        &self,
        _ctx: &RequestContext,
        _org_id: i64,
        _opts: &ListOptions,
    ) -> Result<ResourceList> {
        self.check("list")?;
        Ok(ResourceList::default())
    }

    async fn search(
        &self,
        ctx: &RequestContext,
        org_id: i64,
        query: &SearchQuery,
    ) -> Result<SearchResult> {
        self.search
            .search(ctx, &self.namespace(org_id), &self.resource, query)
            .await
    }

    async fn stats(&self, _ctx: &RequestContext, _org_id: i64) -> Result<ResourceStats> {
        Ok(ResourceStats::default())
    }

    async fn resolve_users(
        &self,
        _ctx: &RequestContext,
        _org_id: i64,
        _user_refs: &[String],
    ) -> Result<HashMap<String, UserRecord>> {
        Ok(HashMap::new())
    }
}

// =============================================================================
// Span Capture
// =============================================================================

/// One span as seen by `SpanCapture`, fields rendered as text
#[derive(Debug, Clone)]
pub struct CapturedSpan {
    id: u64,
    pub name: String,
    pub fields: BTreeMap<String, String>,
}

impl CapturedSpan {
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }
}

struct FieldText<'a>(&'a mut BTreeMap<String, String>);

impl Visit for FieldText<'_> {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.0.insert(field.name().to_string(), format!("{:?}", value));
    }
}

/// Layer recording every span's fields, including ones recorded later
#[derive(Clone, Default)]
pub struct SpanCapture {
    spans: Arc<Mutex<Vec<CapturedSpan>>>,
}

impl SpanCapture {
    /// Install on the current thread until the guard drops
    pub fn install(&self) -> DefaultGuard {
        tracing::subscriber::set_default(tracing_subscriber::registry().with(self.clone()))
    }

    pub fn spans(&self) -> Vec<CapturedSpan> {
        self.spans.lock().clone()
    }

    pub fn spans_named(&self, name: &str) -> Vec<CapturedSpan> {
        self.spans().into_iter().filter(|s| s.name == name).collect()
    }
}

impl<S: Subscriber> Layer<S> for SpanCapture {
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, _ctx: LayerContext<'_, S>) {
        let mut fields = BTreeMap::new();
        attrs.record(&mut FieldText(&mut fields));
        self.spans.lock().push(CapturedSpan {
            id: id.into_u64(),
            name: attrs.metadata().name().to_string(),
            fields,
        });
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, _ctx: LayerContext<'_, S>) {
        let mut spans = self.spans.lock();
        if let Some(span) = spans.iter_mut().rev().find(|s| s.id == id.into_u64()) {
            values.record(&mut FieldText(&mut span.fields));
        }
    }
}
