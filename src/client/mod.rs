//! Client layers
//!
//! Each layer implements [`ResourceHandle`](crate::domain::ports::ResourceHandle)
//! and wraps the one below it.

pub mod consistency;
pub mod fallback;
pub mod handle;
pub mod router;
pub mod stack;
pub mod traced;

pub use consistency::{ConsistentClient, PollOutcome, RetryPlan};
pub use fallback::FallbackClient;
pub use handle::ResourceClient;
pub use router::{ClientFactory, HandleFactory, VersionRouter};
pub use stack::ClientStack;
pub use traced::TracedHandle;
