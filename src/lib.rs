// cache-engine - read-through key/value cache engine for channel code
// Core library module

pub mod config;
pub mod definition;
pub mod engine;
pub mod entry_store;
pub mod error;
pub mod facade;
pub mod loader;
pub mod pool;
pub mod registration;
pub mod snapshot;
pub mod stats;

pub use config::EngineConfig;
pub use definition::CacheDefinition;
pub use engine::{CacheEngine, NameResolver};
pub use error::{CacheError, Result};
pub use facade::{FacadeSink, InMemoryFacadeSink, LookupFacade};
pub use snapshot::{CacheSnapshot, SnapshotQuery};
pub use stats::CacheStatistics;
