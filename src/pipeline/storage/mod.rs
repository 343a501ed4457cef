// In-process stores used for development and tests

pub mod in_memory;

pub use in_memory::{duplicate_count, InMemoryArchiveStore, InMemoryStagingStore};
