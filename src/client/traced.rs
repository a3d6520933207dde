//! Observability Wrapper
//!
//! Decorates a handle with one tracing span per operation. Errors are
//! recorded onto the span; results are returned untouched.

use crate::domain::context::RequestContext;
use crate::domain::ports::ResourceHandle;
use crate::domain::types::{
    DeleteOptions, GetOptions, ListOptions, ResourceList, ResourceObject, ResourceStats,
    ResourceType, SearchQuery, SearchResult, UserRecord,
};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use tracing::{debug, field, info_span, Instrument, Span};

/// Tracing decorator around a single-version handle
pub struct TracedHandle<H> {
    inner: H,
}

impl<H: ResourceHandle> TracedHandle<H> {
    pub fn new(inner: H) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &H {
        &self.inner
    }

    fn span(&self, operation: &'static str, org_id: i64, name: Option<&str>) -> Span {
        let resource = self.inner.resource();
        info_span!(
            "resource_client",
            operation,
            group = %resource.group,
            version = %resource.version,
            resource = %resource.plural,
            namespace = %self.inner.namespace(org_id),
            name = name.unwrap_or_default(),
            error = field::Empty,
        )
    }

    async fn observe<T, F>(&self, span: Span, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let out = fut.instrument(span.clone()).await;
        if let Err(e) = &out {
            span.record("error", field::display(e));
            debug!(parent: &span, error = %e, "Resource operation failed");
        }
        out
    }
}

#[async_trait]
impl<H: ResourceHandle> ResourceHandle for TracedHandle<H> {
    fn resource(&self) -> &ResourceType {
        self.inner.resource()
    }

    fn namespace(&self, org_id: i64) -> String {
        self.inner.namespace(org_id)
    }

    async fn get(
        &self,
        ctx: &RequestContext,
        name: &str,
        org_id: i64,
        opts: &GetOptions,
    ) -> Result<ResourceObject> {
        let span = self.span("get", org_id, Some(name));
        self.observe(span, self.inner.get(ctx, name, org_id, opts))
            .await
    }

    async fn create(
        &self,
        ctx: &RequestContext,
        obj: ResourceObject,
        org_id: i64,
    ) -> Result<ResourceObject> {
        let span = self.span("create", org_id, obj.name());
        self.observe(span, self.inner.create(ctx, obj, org_id)).await
    }

    async fn update(
        &self,
        ctx: &RequestContext,
        obj: ResourceObject,
        org_id: i64,
    ) -> Result<ResourceObject> {
        let span = self.span("update", org_id, obj.name());
        self.observe(span, self.inner.update(ctx, obj, org_id)).await
    }

    async fn delete(
        &self,
        ctx: &RequestContext,
        name: &str,
        org_id: i64,
        opts: &DeleteOptions,
    ) -> Result<()> {
        let span = self.span("delete", org_id, Some(name));
        self.observe(span, self.inner.delete(ctx, name, org_id, opts))
            .await
    }

    async fn delete_collection(&self, ctx: &RequestContext, org_id: i64) -> Result<()> {
        let span = self.span("delete_collection", org_id, None);
        self.observe(span, self.inner.delete_collection(ctx, org_id))
            .await
    }

    async fn list(
        &self,
        ctx: &RequestContext,
        org_id: i64,
        opts: &ListOptions,
    ) -> Result<ResourceList> {
        let span = self.span("list", org_id, None);
        self.observe(span, self.inner.list(ctx, org_id, opts)).await
    }

    async fn search(
        &self,
        ctx: &RequestContext,
        org_id: i64,
        query: &SearchQuery,
    ) -> Result<SearchResult> {
        let span = self.span("search", org_id, None);
        self.observe(span, self.inner.search(ctx, org_id, query))
            .await
    }

    async fn stats(&self, ctx: &RequestContext, org_id: i64) -> Result<ResourceStats> {
        let span = self.span("stats", org_id, None);
        self.observe(span, self.inner.stats(ctx, org_id)).await
    }

    async fn resolve_users(
        &self,
        ctx: &RequestContext,
        org_id: i64,
        user_refs: &[String],
    ) -> Result<HashMap<String, UserRecord>> {
        let span = self.span("resolve_users", org_id, None);
        self.observe(span, self.inner.resolve_users(ctx, org_id, user_refs))
            .await
    }
}
