//! Consistency-Polling Client
//!
//! The search index trails the store. After a write succeeds this client
//! polls search until the index reflects it, so callers that immediately
//! search again see their own write.
//!
//! | write  | query                          | done when        |
//! |--------|--------------------------------|------------------|
//! | create | `name = <name>`, limit 1       | `total_hits == 1` |
//! | update | `resource_version = <rv>`, limit 1 | `total_hits == 1` |
//! | delete | `name = <name>`, limit 1       | `total_hits == 0` |

use crate::domain::context::RequestContext;
use crate::domain::ports::ResourceHandle;
use crate::domain::types::{
    DeleteOptions, GetOptions, ListOptions, ResourceList, ResourceObject, ResourceStats,
    ResourceType, SearchQuery, SearchResult, UserRecord, SEARCH_FIELD_NAME,
    SEARCH_FIELD_RESOURCE_VERSION,
};
use crate::error::{Error, Result};
use crate::metrics::ClientMetrics;
use async_trait::async_trait;
use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

// =============================================================================
// Retry Plan
// =============================================================================

/// Bounded polling budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPlan {
    /// Search polls before giving up
    pub max_attempts: u32,
    /// Delay after the first unsatisfied poll
    pub min_backoff: Duration,
    /// Upper bound the doubling delay is capped at
    pub max_backoff: Duration,
}

impl Default for RetryPlan {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            min_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPlan {
    /// `max_attempts` is clamped to at least one poll
    pub fn new(max_attempts: u32, min_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            min_backoff,
            max_backoff,
        }
    }

    /// Deterministic doubling schedule from `min_backoff` up to `max_backoff`
    pub fn schedule(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.min_backoff)
            .with_max_interval(self.max_backoff.max(self.min_backoff))
            .with_multiplier(2.0)
            .with_randomization_factor(0.0)
            .with_max_elapsed_time(None)
            .build()
    }
}

/// Result of one visibility check
#[derive(Debug)]
pub enum PollOutcome {
    /// Index has not caught up yet
    Continue,
    /// Index reflects the write
    Succeed,
    /// Stop polling and report this error
    Fail(Error),
}

// =============================================================================
// Consistent Client
// =============================================================================

/// Write-path decorator waiting for search visibility
pub struct ConsistentClient<H> {
    inner: H,
    plan: RetryPlan,
    metrics: ClientMetrics,
}

impl<H: ResourceHandle> ConsistentClient<H> {
    pub fn new(inner: H, mut plan: RetryPlan, metrics: ClientMetrics) -> Self {
        plan.max_attempts = plan.max_attempts.max(1);
        Self {
            inner,
            plan,
            metrics,
        }
    }

    pub fn inner(&self) -> &H {
        &self.inner
    }

    pub fn retry_plan(&self) -> &RetryPlan {
        &self.plan
    }

    /// Poll `query` until the index reports `want_hits`.
    ///
    /// Search errors stop the loop immediately. Cancellation is checked
    /// before each attempt and interrupts the backoff sleep.
    async fn wait_for_hits(
        &self,
        ctx: &RequestContext,
        org_id: i64,
        operation: &'static str,
        name: &str,
        query: SearchQuery,
        want_hits: i64,
    ) -> Result<()> {
        let mut schedule = self.plan.schedule();

        for attempt in 1..=self.plan.max_attempts {
            ctx.check()?;
            self.metrics.record_visibility_poll(operation);

            let outcome = match self.inner.search(ctx, org_id, &query).await {
                Ok(result) if result.total_hits == want_hits => PollOutcome::Succeed,
                Ok(result) => {
                    debug!(
                        operation,
                        name = %name,
                        attempt,
                        total_hits = result.total_hits,
                        want_hits,
                        "Write not yet visible in search"
                    );
                    PollOutcome::Continue
                }
                Err(e) => PollOutcome::Fail(e),
            };

            match outcome {
                PollOutcome::Succeed => return Ok(()),
                PollOutcome::Fail(e) => return Err(e),
                PollOutcome::Continue if attempt < self.plan.max_attempts => {
                    let delay = schedule.next_backoff().unwrap_or(self.plan.max_backoff);
                    ctx.sleep(delay).await?;
                }
                PollOutcome::Continue => {}
            }
        }

        self.metrics.record_visibility_timeout(operation);
        warn!(
            operation,
            name = %name,
            attempts = self.plan.max_attempts,
            "Write not visible in search within retry budget"
        );
        Err(Error::VisibilityTimeout {
            operation: operation.to_string(),
            name: name.to_string(),
            attempts: self.plan.max_attempts,
        })
    }
}

fn existence_query(name: &str) -> SearchQuery {
    SearchQuery::field_equals(SEARCH_FIELD_NAME, name, 1)
}

#[async_trait]
impl<H: ResourceHandle> ResourceHandle for ConsistentClient<H> {
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
        self.inner.get(ctx, name, org_id, opts).await
    }

    async fn create(
        &self,
        ctx: &RequestContext,
        obj: ResourceObject,
        org_id: i64,
    ) -> Result<ResourceObject> {
        let created = self.inner.create(ctx, obj, org_id).await?;
        let name = created.require_name()?.to_string();
        self.wait_for_hits(ctx, org_id, "create", &name, existence_query(&name), 1)
            .await?;
        Ok(created)
    }

    async fn update(
        &self,
        ctx: &RequestContext,
        obj: ResourceObject,
        org_id: i64,
    ) -> Result<ResourceObject> {
        let updated = self.inner.update(ctx, obj, org_id).await?;
        let name = updated.require_name()?.to_string();
        let rv = updated
            .resource_version()
            .ok_or_else(|| {
                Error::InvalidObject(format!("updated object {} has no resourceVersion", name))
            })?
            .to_string();
        let query = SearchQuery::field_equals(SEARCH_FIELD_RESOURCE_VERSION, rv, 1);
        self.wait_for_hits(ctx, org_id, "update", &name, query, 1)
            .await?;
        Ok(updated)
    }

    async fn delete(
        &self,
        ctx: &RequestContext,
        name: &str,
        org_id: i64,
        opts: &DeleteOptions,
    ) -> Result<()> {
        self.inner.delete(ctx, name, org_id, opts).await?;
        self.wait_for_hits(ctx, org_id, "delete", name, existence_query(name), 0)
            .await
    }

    async fn delete_collection(&self, ctx: &RequestContext, org_id: i64) -> Result<()> {
        self.inner.delete_collection(ctx, org_id).await
    }

    async fn list(
        &self,
        ctx: &RequestContext,
        org_id: i64,
        opts: &ListOptions,
    ) -> Result<ResourceList> {
        self.inner.list(ctx, org_id, opts).await
    }

    async fn search(
        &self,
        ctx: &RequestContext,
        org_id: i64,
        query: &SearchQuery,
    ) -> Result<SearchResult> {
        self.inner.search(ctx, org_id, query).await
    }

    async fn stats(&self, ctx: &RequestContext, org_id: i64) -> Result<ResourceStats> {
        self.inner.stats(ctx, org_id).await
    }

    async fn resolve_users(
        &self,
        ctx: &RequestContext,
        org_id: i64,
        user_refs: &[String],
    ) -> Result<HashMap<String, UserRecord>> {
        self.inner.resolve_users(ctx, org_id, user_refs).await
    }
}
