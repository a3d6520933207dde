//! Versioned Resource Client
//!
//! A client for API-server-style resources that can be stored under one
//! version and requested under another. Reads that fail server-side
//! conversion are retried under the stored version; writes can optionally
//! wait until the search index reflects them.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          ConsistentClient                               │
//! │          (create / update / delete wait for search visibility)          │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                          FallbackClient                                 │
//! │       (get retries under status.conversion.storedVersion, 1 hop)        │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────────────────┐      ┌────────────────────────────────┐   │
//! │  │      VersionRouter       │ ───▶ │  TracedHandle(ResourceClient)  │   │
//! │  │  (one handle / version)  │      │      v1, v2, v2alpha1 ...      │   │
//! │  └──────────────────────────┘      └────────────────────────────────┘   │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                              Ports                                      │
//! │  ┌──────────────────┐  ┌──────────────────┐  ┌──────────────────────┐   │
//! │  │  StoreProvider   │  │   SearchIndex    │  │    UserDirectory     │   │
//! │  │ (kube / memory)  │  │    (memory)      │  │      (memory)        │   │
//! │  └──────────────────┘  └──────────────────┘  └──────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`client`]: Handle layers, version router and stack wiring
//! - [`backends`]: Store, search and user directory adapters
//! - [`domain`]: Core types, request context and port definitions
//! - [`config`]: YAML configuration
//! - [`logging`]: Subscriber setup
//! - [`metrics`]: Prometheus counters
//! - [`error`]: Error types and handling

pub mod backends;
pub mod client;
pub mod config;
pub mod domain;
pub mod error;
pub mod logging;
pub mod metrics;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use client::{
    ClientFactory, ClientStack, ConsistentClient, FallbackClient, HandleFactory, PollOutcome,
    ResourceClient, RetryPlan, TracedHandle, VersionRouter,
};

pub use config::{ClientConfig, RetrySettings};

pub use domain::{
    namespace_mapper, org_namespace, ConversionStatus, DeleteOptions, GetOptions, ListOptions,
    NamespaceMapper, RequestContext, ResourceHandle, ResourceHandleRef, ResourceIdentity,
    ResourceList, ResourceObject, ResourceStats, ResourceType, SearchIndex, SearchQuery,
    SearchResult, StoreProvider, UserDirectory, UserRecord,
};

pub use error::{Error, Result};

pub use logging::LogConfig;

pub use metrics::ClientMetrics;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
