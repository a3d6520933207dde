//! Resource Handle
//!
//! Single-version client bound to one resource type. Forwards every call to
//! the store or search index under the namespace derived from the caller's
//! organization; nothing is cached here.

use crate::domain::context::RequestContext;
use crate::domain::namespace::NamespaceMapper;
use crate::domain::ports::{ResourceHandle, ResourceStore, SearchIndex, UserDirectory};
use crate::domain::types::{
    DeleteOptions, GetOptions, ListOptions, ResourceList, ResourceObject, ResourceStats,
    ResourceType, SearchQuery, SearchResult, UserRecord,
};
use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Resource Handle for one (group, version, kind)
pub struct ResourceClient {
    resource: ResourceType,
    namespacer: NamespaceMapper,
    store: Arc<dyn ResourceStore>,
    search: Arc<dyn SearchIndex>,
    users: Arc<dyn UserDirectory>,
}

impl ResourceClient {
    pub fn new(
        resource: ResourceType,
        namespacer: NamespaceMapper,
        store: Arc<dyn ResourceStore>,
        search: Arc<dyn SearchIndex>,
        users: Arc<dyn UserDirectory>,
    ) -> Self {
        Self {
            resource,
            namespacer,
            store,
            search,
            users,
        }
    }

    /// Fill in type and namespace metadata the caller left out
    fn prepare(&self, mut obj: ResourceObject, namespace: &str) -> ResourceObject {
        if obj.api_version().is_none() {
            obj.set_field(&["apiVersion"], Value::String(self.resource.api_version()));
        }
        if obj.field(&["kind"]).is_none() {
            obj.set_field(&["kind"], Value::String(self.resource.kind.clone()));
        }
        obj.set_field(&["metadata", "namespace"], Value::String(namespace.to_string()));
        obj
    }
}

#[async_trait]
impl ResourceHandle for ResourceClient {
    fn resource(&self) -> &ResourceType {
        &self.resource
    }

    fn namespace(&self, org_id: i64) -> String {
        (self.namespacer)(org_id)
    }

    async fn get(
        &self,
        ctx: &RequestContext,
        name: &str,
        org_id: i64,
        opts: &GetOptions,
    ) -> Result<ResourceObject> {
        let namespace = self.namespace(org_id);
        ctx.run(self.store.get(ctx, &namespace, name, opts)).await
    }

    async fn create(
        &self,
        ctx: &RequestContext,
        obj: ResourceObject,
        org_id: i64,
    ) -> Result<ResourceObject> {
        let namespace = self.namespace(org_id);
        let obj = self.prepare(obj, &namespace);
        ctx.run(self.store.create(ctx, &namespace, obj)).await
    }

    async fn update(
        &self,
        ctx: &RequestContext,
        obj: ResourceObject,
        org_id: i64,
    ) -> Result<ResourceObject> {
        let namespace = self.namespace(org_id);
        let obj = self.prepare(obj, &namespace);
        ctx.run(self.store.update(ctx, &namespace, obj)).await
    }

    async fn delete(
        &self,
        ctx: &RequestContext,
        name: &str,
        org_id: i64,
        opts: &DeleteOptions,
    ) -> Result<()> {
        let namespace = self.namespace(org_id);
        ctx.run(self.store.delete(ctx, &namespace, name, opts)).await
    }

    async fn delete_collection(&self, ctx: &RequestContext, org_id: i64) -> Result<()> {
        let namespace = self.namespace(org_id);
        ctx.run(self.store.delete_collection(ctx, &namespace)).await
    }

    async fn list(
        &self,
        ctx: &RequestContext,
        org_id: i64,
        opts: &ListOptions,
    ) -> Result<ResourceList> {
        let namespace = self.namespace(org_id);
        ctx.run(self.store.list(ctx, &namespace, opts)).await
    }

    async fn search(
        &self,
        ctx: &RequestContext,
        org_id: i64,
        query: &SearchQuery,
    ) -> Result<SearchResult> {
        let namespace = self.namespace(org_id);
        ctx.run(self.search.search(ctx, &namespace, &self.resource, query))
            .await
    }

    async fn stats(&self, ctx: &RequestContext, org_id: i64) -> Result<ResourceStats> {
        let namespace = self.namespace(org_id);
        ctx.run(
            self.search
                .stats(ctx, &namespace, std::slice::from_ref(&self.resource)),
        )
        .await
    }

    async fn resolve_users(
        &self,
        ctx: &RequestContext,
        _org_id: i64,
        user_refs: &[String],
    ) -> Result<HashMap<String, UserRecord>> {
        let Some(refs) = UserRefs::parse(user_refs) else {
            return Ok(HashMap::new());
        };
        if refs.is_empty() {
            return Ok(HashMap::new());
        }

        let records = ctx
            .run(self.users.list_by_id_or_uid(ctx, &refs.uids, &refs.ids))
            .await?;
        debug!(
            requested = user_refs.len(),
            found = records.len(),
            "Resolved user references"
        );
        Ok(refs.associate(records))
    }
}

// =============================================================================
// User Reference Parsing
// =============================================================================

/// Parsed `"<prefix>:<id-or-uid>"` references, bucketed by lookup key
#[derive(Debug, Default)]
struct UserRefs {
    ids: Vec<i64>,
    uids: Vec<String>,
    by_id: HashMap<i64, Vec<String>>,
    by_uid: HashMap<String, Vec<String>>,
}

impl UserRefs {
    /// `None` as soon as one reference lacks a `:` separator. The whole
    /// batch is dropped in that case, valid references included.
    fn parse(user_refs: &[String]) -> Option<Self> {
        let mut refs = Self::default();
        for user_ref in user_refs {
            let Some((_, suffix)) = user_ref.split_once(':') else {
                warn!(
                    user_ref = %user_ref,
                    batch = user_refs.len(),
                    "Malformed user reference, discarding the whole batch"
                );
                return None;
            };
            match suffix.parse::<i64>() {
                Ok(id) => {
                    let originals = refs.by_id.entry(id).or_default();
                    if originals.is_empty() {
                        refs.ids.push(id);
                    }
                    originals.push(user_ref.clone());
                }
                Err(_) => {
                    let originals = refs.by_uid.entry(suffix.to_string()).or_default();
                    if originals.is_empty() {
                        refs.uids.push(suffix.to_string());
                    }
                    originals.push(user_ref.clone());
                }
            }
        }
        Some(refs)
    }

    fn is_empty(&self) -> bool {
        self.ids.is_empty() && self.uids.is_empty()
    }

    /// Map every original reference string to the record it named
    fn associate(&self, records: Vec<UserRecord>) -> HashMap<String, UserRecord> {
        let mut out = HashMap::new();
        for record in records {
            let by_id = self.by_id.get(&record.id).into_iter().flatten();
            let by_uid = self.by_uid.get(&record.uid).into_iter().flatten();
            for user_ref in by_id.chain(by_uid) {
                out.insert(user_ref.clone(), record.clone());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::namespace::org_namespace;
    use crate::error::Error;
    use crate::testing::{dashboards, user, MockDirectory, MockSearch, MockStore};
    use assert_matches::assert_matches;
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    fn client(
        store: Arc<MockStore>,
        search: Arc<MockSearch>,
        users: Arc<MockDirectory>,
    ) -> ResourceClient {
        ResourceClient::new(dashboards("v1"), Arc::new(org_namespace), store, search, users)
    }

    fn store_client(store: Arc<MockStore>) -> ResourceClient {
        client(store, Arc::default(), Arc::default())
    }

    fn users_client(users: Arc<MockDirectory>) -> ResourceClient {
        client(Arc::new(MockStore::new(dashboards("v1"))), Arc::default(), users)
    }

    fn refs(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_get_uses_org_namespace() {
        let store = Arc::new(MockStore::new(dashboards("v1")));
        store.insert("org-2", json!({"metadata": {"name": "dash-1"}}));
        let client = store_client(store.clone());

        let ctx = RequestContext::new();
        let obj = client
            .get(&ctx, "dash-1", 2, &GetOptions::default())
            .await
            .unwrap();
        assert_eq!(obj.name(), Some("dash-1"));

        let missing = client.get(&ctx, "dash-1", 1, &GetOptions::default()).await;
        assert_matches!(missing, Err(ref e) if e.is_not_found());
    }

    #[tokio::test]
    async fn test_create_stamps_type_metadata() {
        let store = Arc::new(MockStore::new(dashboards("v1")));
        let client = store_client(store.clone());

        let obj = ResourceObject::from_value(json!({"metadata": {"name": "dash-1"}})).unwrap();
        let created = client.create(&RequestContext::new(), obj, 1).await.unwrap();
        assert_eq!(created.api_version(), Some("dashboard.grafana.app/v1"));
        assert_eq!(created.field(&["kind"]), Some(&json!("Dashboard")));
        assert_eq!(created.field(&["metadata", "namespace"]), Some(&json!("default")));
    }

    #[tokio::test]
    async fn test_transport_errors_pass_through() {
        let store = Arc::new(MockStore::new(dashboards("v1")));
        store.fail_with("connection refused");
        let client = store_client(store);

        let out = client
            .list(&RequestContext::new(), 1, &ListOptions::default())
            .await;
        assert_matches!(
            out,
            Err(Error::Transport { ref reason, .. }) if reason == "connection refused"
        );
    }

    #[tokio::test]
    async fn test_cancelled_context_skips_transport() {
        let store = Arc::new(MockStore::new(dashboards("v1")));
        let client = store_client(store.clone());

        let token = CancellationToken::new();
        token.cancel();
        let ctx = RequestContext::with_cancellation(token);
        let out = client.get(&ctx, "dash-1", 1, &GetOptions::default()).await;
        assert_matches!(out, Err(Error::Cancelled));
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn test_stats_and_search_forward_to_index() {
        let search = Arc::new(MockSearch::with_hits(&[1]));
        let client = client(
            Arc::new(MockStore::new(dashboards("v1"))),
            search.clone(),
            Arc::default(),
        );
        let ctx = RequestContext::new();

        let result = client
            .search(&ctx, 3, &SearchQuery::field_equals("name", "dash-1", 1))
            .await
            .unwrap();
        assert_eq!(result.total_hits, 1);
        assert_eq!(search.namespaces(), vec!["org-3".to_string()]);

        let stats = client.stats(&ctx, 3).await.unwrap();
        assert_eq!(stats.count_for("dashboard.grafana.app", "dashboards"), 0);
    }

    #[tokio::test]
    async fn test_resolve_users_by_id_and_uid() {
        let users = Arc::new(MockDirectory::new(vec![
            user(1, "uid-value"),
            user(2, "uid-value2"),
        ]));
        let client = users_client(users.clone());

        let out = client
            .resolve_users(
                &RequestContext::new(),
                1,
                &refs(&["user:1", "user:uid-value2"]),
            )
            .await
            .unwrap();

        assert_eq!(out.len(), 2);
        assert_eq!(out["user:1"].id, 1);
        assert_eq!(out["user:uid-value2"].id, 2);

        let lookups = users.lookups();
        assert_eq!(lookups.len(), 1, "lookup must be batched");
        assert_eq!(lookups[0], (vec!["uid-value2".to_string()], vec![1]));
    }

    #[tokio::test]
    async fn test_resolve_users_malformed_reference_empties_batch() {
        let users = Arc::new(MockDirectory::new(vec![user(1, "uid-value")]));
        let client = users_client(users.clone());

        let out = client
            .resolve_users(
                &RequestContext::new(),
                1,
                &refs(&["user:1", "no-separator"]),
            )
            .await
            .unwrap();

        assert!(out.is_empty());
        assert!(users.lookups().is_empty());
    }

    #[tokio::test]
    async fn test_resolve_users_shared_target() {
        let users = Arc::new(MockDirectory::new(vec![user(5, "abc")]));
        let client = users_client(users);

        let out = client
            .resolve_users(
                &RequestContext::new(),
                1,
                &refs(&["user:5", "service-account:abc", "user:5"]),
            )
            .await
            .unwrap();

        assert_eq!(out.len(), 2);
        assert_eq!(out["service-account:abc"].id, 5);
    }
}
