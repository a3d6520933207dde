//! Domain layer - Core types and port definitions
//!
//! This module defines the core traits (ports) that adapters implement,
//! following hexagonal architecture principles.

pub mod context;
pub mod namespace;
pub mod ports;
pub mod types;

pub use context::RequestContext;
pub use namespace::{namespace_mapper, org_namespace, NamespaceMapper};
pub use ports::*;
pub use types::*;
