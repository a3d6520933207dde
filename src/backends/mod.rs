//! Backend adapters
//!
//! - [`kubernetes`]: dynamic-object stores against a live API server
//! - [`memory`]: in-process store and lagging search index
//! - [`users`]: in-process user directory

pub mod kubernetes;
pub mod memory;
pub mod users;

pub use kubernetes::{KubeStore, KubeStoreProvider};
pub use memory::{MemoryBackend, MemoryStore};
pub use users::MemoryUserDirectory;
