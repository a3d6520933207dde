//! Domain Ports - Trait definitions for the resource client
//!
//! The collaborator ports (`ResourceStore`, `StoreProvider`, `SearchIndex`,
//! `UserDirectory`) are implemented by backend adapters. `ResourceHandle`
//! is the capability every client layer exposes upward; decorators wrap one
//! handle and implement the same trait.

use crate::domain::context::RequestContext;
use crate::domain::types::{
    DeleteOptions, GetOptions, ListOptions, ResourceList, ResourceObject, ResourceStats,
    ResourceType, SearchQuery, SearchResult, UserRecord,
};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

// =============================================================================
// Transport Port
// =============================================================================

/// Object store bound to one (group, version, kind)
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Resource type this store is bound to
    fn resource(&self) -> &ResourceType;

    async fn get(
        &self,
        ctx: &RequestContext,
        namespace: &str,
        name: &str,
        opts: &GetOptions,
    ) -> Result<ResourceObject>;

    async fn create(
        &self,
        ctx: &RequestContext,
        namespace: &str,
        obj: ResourceObject,
    ) -> Result<ResourceObject>;

    async fn update(
        &self,
        ctx: &RequestContext,
        namespace: &str,
        obj: ResourceObject,
    ) -> Result<ResourceObject>;

    async fn delete(
        &self,
        ctx: &RequestContext,
        namespace: &str,
        name: &str,
        opts: &DeleteOptions,
    ) -> Result<()>;

    async fn delete_collection(&self, ctx: &RequestContext, namespace: &str) -> Result<()>;

    async fn list(
        &self,
        ctx: &RequestContext,
        namespace: &str,
        opts: &ListOptions,
    ) -> Result<ResourceList>;
}

/// Creates stores for a resource type. Binding only, no network I/O.
pub trait StoreProvider: Send + Sync {
    fn store(&self, resource: &ResourceType) -> Result<Arc<dyn ResourceStore>>;
}

// =============================================================================
// Search Port
// =============================================================================

/// Eventually consistent index over the store's contents
#[async_trait]
pub trait SearchIndex: Send + Sync {
    async fn search(
        &self,
        ctx: &RequestContext,
        namespace: &str,
        resource: &ResourceType,
        query: &SearchQuery,
    ) -> Result<SearchResult>;

    async fn stats(
        &self,
        ctx: &RequestContext,
        namespace: &str,
        resources: &[ResourceType],
    ) -> Result<ResourceStats>;
}

// =============================================================================
// User Identity Port
// =============================================================================

#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Batch lookup matching either a UID or a numeric ID
    async fn list_by_id_or_uid(
        &self,
        ctx: &RequestContext,
        uids: &[String],
        ids: &[i64],
    ) -> Result<Vec<UserRecord>>;
}

// =============================================================================
// Resource Handle
// =============================================================================

/// Version-stable CRUD + search surface, parameterized by organization
#[async_trait]
pub trait ResourceHandle: Send + Sync {
    /// Resource type (and version) requests are issued under
    fn resource(&self) -> &ResourceType;

    /// Namespace an organization's objects live in
    fn namespace(&self, org_id: i64) -> String;

    async fn get(
        &self,
        ctx: &RequestContext,
        name: &str,
        org_id: i64,
        opts: &GetOptions,
    ) -> Result<ResourceObject>;

    async fn create(
        &self,
        ctx: &RequestContext,
        obj: ResourceObject,
        org_id: i64,
    ) -> Result<ResourceObject>;

    async fn update(
        &self,
        ctx: &RequestContext,
        obj: ResourceObject,
        org_id: i64,
    ) -> Result<ResourceObject>;

    async fn delete(
        &self,
        ctx: &RequestContext,
        name: &str,
        org_id: i64,
        opts: &DeleteOptions,
    ) -> Result<()>;

    async fn delete_collection(&self, ctx: &RequestContext, org_id: i64) -> Result<()>;

    async fn list(
        &self,
        ctx: &RequestContext,
        org_id: i64,
        opts: &ListOptions,
    ) -> Result<ResourceList>;

    async fn search(
        &self,
        ctx: &RequestContext,
        org_id: i64,
        query: &SearchQuery,
    ) -> Result<SearchResult>;

    async fn stats(&self, ctx: &RequestContext, org_id: i64) -> Result<ResourceStats>;

    /// Resolve `"<prefix>:<id-or-uid>"` references to user records
    async fn resolve_users(
        &self,
        ctx: &RequestContext,
        org_id: i64,
        user_refs: &[String],
    ) -> Result<HashMap<String, UserRecord>>;
}

// =============================================================================
// Type Aliases for Arc'd Traits
// =============================================================================

pub type ResourceStoreRef = Arc<dyn ResourceStore>;
pub type StoreProviderRef = Arc<dyn StoreProvider>;
pub type SearchIndexRef = Arc<dyn SearchIndex>;
pub type UserDirectoryRef = Arc<dyn UserDirectory>;
pub type ResourceHandleRef = Arc<dyn ResourceHandle>;
