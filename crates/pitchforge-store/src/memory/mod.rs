//! In-memory queue store.

pub mod store;

pub use store::MemoryQueueStore;
