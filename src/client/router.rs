//! Version Router & Cache
//!
//! Hands out one handle per API version, building it lazily on first use.
//! Lookups take the read lock; a miss escalates to the write lock, checks
//! again, and only then constructs. Entries are never evicted: the set of
//! served versions is small and fixed for the life of the process.

use crate::client::handle::ResourceClient;
use crate::client::traced::TracedHandle;
use crate::domain::namespace::NamespaceMapper;
use crate::domain::ports::{ResourceHandle, SearchIndex, StoreProvider, UserDirectory};
use crate::domain::types::ResourceType;
use crate::error::{Error, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

// =============================================================================
// Handle Factory
// =============================================================================

/// Builds the handle for one version. Binds configuration only, no I/O.
pub trait HandleFactory: Send + Sync {
    fn build(&self, version: &str) -> Result<Arc<dyn ResourceHandle>>;
}

/// Default factory: a traced `ResourceClient` per version, sharing the
/// namespace mapper, search index and user directory
pub struct ClientFactory {
    resource: ResourceType,
    namespacer: NamespaceMapper,
    stores: Arc<dyn StoreProvider>,
    search: Arc<dyn SearchIndex>,
    users: Arc<dyn UserDirectory>,
}

impl ClientFactory {
    pub fn new(
        resource: ResourceType,
        namespacer: NamespaceMapper,
        stores: Arc<dyn StoreProvider>,
        search: Arc<dyn SearchIndex>,
        users: Arc<dyn UserDirectory>,
    ) -> Self {
        Self {
            resource,
            namespacer,
            stores,
            search,
            users,
        }
    }

    /// Undecorated client for `version`
    pub fn build_client(&self, version: &str) -> Result<ResourceClient> {
        let resource = self.resource.with_version(version);
        let store = self.stores.store(&resource)?;
        Ok(ResourceClient::new(
            resource,
            self.namespacer.clone(),
            store,
            self.search.clone(),
            self.users.clone(),
        ))
    }
}

impl HandleFactory for ClientFactory {
    fn build(&self, version: &str) -> Result<Arc<dyn ResourceHandle>> {
        Ok(Arc::new(TracedHandle::new(self.build_client(version)?)))
    }
}

// =============================================================================
// Version Router
// =============================================================================

/// Per-version handle cache
pub struct VersionRouter {
    factory: Arc<dyn HandleFactory>,
    handles: RwLock<HashMap<String, Arc<dyn ResourceHandle>>>,
}

impl VersionRouter {
    pub fn new(factory: Arc<dyn HandleFactory>) -> Self {
        Self {
            factory,
            handles: RwLock::new(HashMap::new()),
        }
    }

    /// Handle for `version`, constructed at most once per router.
    ///
    /// The build runs under the map's write lock, so first lookups of
    /// different versions are serialized too. Factories only bind
    /// configuration and never do I/O, which keeps that wait short.
    pub fn handle(&self, version: &str) -> Result<Arc<dyn ResourceHandle>> {
        if version.is_empty() {
            return Err(Error::Configuration("empty API version".into()));
        }

        if let Some(handle) = self.handles.read().get(version) {
            return Ok(handle.clone());
        }

        let mut handles = self.handles.write();
        if let Some(handle) = handles.get(version) {
            debug!(version = %version, "Handle cached by a concurrent caller");
            return Ok(handle.clone());
        }

        // A failed build leaves no entry behind, so the next caller retries.
        let handle = self.factory.build(version)?;
        handles.insert(version.to_string(), handle.clone());
        info!(
            version = %version,
            resource = %handle.resource(),
            cached = handles.len(),
            "Cached resource handle"
        );
        Ok(handle)
    }

    /// Versions with a cached handle, sorted
    pub fn cached_versions(&self) -> Vec<String> {
        let mut versions: Vec<String> = self.handles.read().keys().cloned().collect();
        versions.sort();
        versions
    }

    pub fn len(&self) -> usize {
        self.handles.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.read().is_empty()
    }
}
