//! Client stack wiring
//!
//! Fixes the decorator order at construction time:
//!
//! ```text
//! ConsistentClient            (optional, write visibility)
//!   └─ FallbackClient         (read fallback, outermost read layer)
//!        └─ TracedHandle      (one span per call, per version)
//!             └─ ResourceClient (primary version)
//! ```
//!
//! The primary handle comes from the same `VersionRouter` used for fallback
//! hops, so primary and fallback handles are built and cached identically.

use crate::client::consistency::{ConsistentClient, RetryPlan};
use crate::client::fallback::FallbackClient;
use crate::client::router::{ClientFactory, HandleFactory, VersionRouter};
use crate::config::ClientConfig;
use crate::domain::namespace::namespace_mapper;
use crate::domain::ports::{ResourceHandle, SearchIndex, StoreProvider, UserDirectory};
use crate::error::Result;
use crate::metrics::ClientMetrics;
use std::sync::Arc;
use tracing::info;

/// Fully wired client for one resource kind
pub struct ClientStack {
    router: Arc<VersionRouter>,
    handle: Arc<dyn ResourceHandle>,
    metrics: ClientMetrics,
}

impl ClientStack {
    /// Wire the default stack from configuration and collaborators
    pub fn from_config(
        config: &ClientConfig,
        stores: Arc<dyn StoreProvider>,
        search: Arc<dyn SearchIndex>,
        users: Arc<dyn UserDirectory>,
        metrics: ClientMetrics,
    ) -> Result<Self> {
        config.validate()?;
        let factory = ClientFactory::new(
            config.resource.clone(),
            namespace_mapper(config.stack_id.as_deref()),
            stores,
            search,
            users,
        );
        let plan = config.consistent_writes.then(|| config.retry_plan());
        Self::build(Arc::new(factory), &config.resource.version, plan, metrics)
    }

    /// Wire a stack over any handle factory
    pub fn build(
        factory: Arc<dyn HandleFactory>,
        primary_version: &str,
        consistency: Option<RetryPlan>,
        metrics: ClientMetrics,
    ) -> Result<Self> {
        let router = Arc::new(VersionRouter::new(factory));
        let primary = router.handle(primary_version)?;
        let fallback = FallbackClient::new(primary, router.clone(), metrics.clone());

        let handle: Arc<dyn ResourceHandle> = match consistency {
            Some(plan) => Arc::new(ConsistentClient::new(fallback, plan, metrics.clone())),
            None => Arc::new(fallback),
        };

        info!(
            resource = %handle.resource(),
            consistent_writes = consistency.is_some(),
            "Resource client stack ready"
        );

        Ok(Self {
            router,
            handle,
            metrics,
        })
    }

    /// The outermost handle callers should use
    pub fn handle(&self) -> Arc<dyn ResourceHandle> {
        self.handle.clone()
    }

    pub fn router(&self) -> &Arc<VersionRouter> {
        &self.router
    }

    pub fn metrics(&self) -> &ClientMetrics {
        &self.metrics
    }
}
