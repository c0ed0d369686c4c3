//! Registry adapters — the lister trait and its implementations.

pub mod fixture;
pub mod lister;
pub mod memory;
pub mod remote;

pub use fixture::load_fixture;
pub use lister::{RegistryLister, Revision};
pub use memory::MemoryRegistry;
pub use remote::{RemoteConfig, RemoteRegistry};
