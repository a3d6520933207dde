//! Fallback Client
//!
//! Makes multi-version storage transparent for reads. When the primary
//! handle returns an object carrying a failed `status.conversion` marker,
//! the read is re-issued once against the version the object is stored in.
//! Every other operation goes straight to the primary handle.

use crate::client::router::VersionRouter;
use crate::domain::context::RequestContext;
use crate::domain::ports::ResourceHandle;
use crate::domain::types::{
    DeleteOptions, GetOptions, ListOptions, ResourceIdentity, ResourceList, ResourceObject,
    ResourceStats, ResourceType, SearchQuery, SearchResult, UserRecord,
};
use crate::error::Result;
use crate::metrics::ClientMetrics;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Read-path decorator resolving conversion failures with a single hop
pub struct FallbackClient {
    primary: Arc<dyn ResourceHandle>,
    router: Arc<VersionRouter>,
    metrics: ClientMetrics,
}

impl FallbackClient {
    pub fn new(
        primary: Arc<dyn ResourceHandle>,
        router: Arc<VersionRouter>,
        metrics: ClientMetrics,
    ) -> Self {
        Self {
            primary,
            router,
            metrics,
        }
    }

    pub fn primary(&self) -> &Arc<dyn ResourceHandle> {
        &self.primary
    }

    pub fn router(&self) -> &Arc<VersionRouter> {
        &self.router
    }
}

#[async_trait]
impl ResourceHandle for FallbackClient {
    fn resource(&self) -> &ResourceType {
        self.primary.resource()
    }

    fn namespace(&self, org_id: i64) -> String {
        self.primary.namespace(org_id)
    }

    async fn get(
        &self,
        ctx: &RequestContext,
        name: &str,
        org_id: i64,
        opts: &GetOptions,
    ) -> Result<ResourceObject> {
        let obj = self.primary.get(ctx, name, org_id, opts).await?;

        let Some(status) = obj.conversion_status() else {
            return Ok(obj);
        };
        let Some(stored_version) = status.fallback_version() else {
            return Ok(obj);
        };

        let identity = ResourceIdentity {
            resource: self.primary.resource().clone(),
            namespace: self.primary.namespace(org_id),
            name: name.to_string(),
        };
        warn!(
            object = %identity,
            stored_version = %stored_version,
            error = status.error.as_deref().unwrap_or_default(),
            "Conversion failed, reading from stored version"
        );
        self.metrics.record_conversion_fallback(stored_version);

        // Single hop: whatever the stored version returns is final.
        let fallback = self.router.handle(stored_version)?;
        fallback.get(ctx, name, org_id, opts).await
    }

    async fn create(
        &self,
        ctx: &RequestContext,
        obj: ResourceObject,
        org_id: i64,
    ) -> Result<ResourceObject> {
        self.primary.create(ctx, obj, org_id).await
    }

    async fn update(
        &self,
        ctx: &RequestContext,
        obj: ResourceObject,
        org_id: i64,
    ) -> Result<ResourceObject> {
        self.primary.update(ctx, obj, org_id).await
    }

    async fn delete(
        &self,
        ctx: &RequestContext,
        name: &str,
        org_id: i64,
        opts: &DeleteOptions,
    ) -> Result<()> {
        self.primary.delete(ctx, name, org_id, opts).await
    }

    async fn delete_collection(&self, ctx: &RequestContext, org_id: i64) -> Result<()> {
        self.primary.delete_collection(ctx, org_id).await
    }

    async fn list(
        &self,
        ctx: &RequestContext,
        org_id: i64,
        opts: &ListOptions,
    ) -> Result<ResourceList> {
        self.primary.list(ctx, org_id, opts).await
    }

    async fn search(
        &self,
        ctx: &RequestContext,
        org_id: i64,
        query: &SearchQuery,
    ) -> Result<SearchResult> {
        self.primary.search(ctx, org_id, query).await
    }

    async fn stats(&self, ctx: &RequestContext, org_id: i64) -> Result<ResourceStats> {
        self.primary.stats(ctx, org_id).await
    }

    async fn resolve_users(
        &self,
        ctx: &RequestContext,
        org_id: i64,
        user_refs: &[String],
    ) -> Result<HashMap<String, UserRecord>> {
        self.primary.resolve_users(ctx, org_id, user_refs).await
    }
}
