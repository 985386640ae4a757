// Immutable per-cache bundle (spec sections 2 and 3).

use crate::config::EngineConfig;
use crate::definition::CacheDefinition;
use crate::entry_store::EntryStore;
use crate::loader::Loader;
use crate::pool::ConnectionPool;
use std::sync::Arc;

/// The live, atomic bundle of one cache's in-memory state and resources.
///
/// Immutable after publication: re-registering a cache builds a brand new
/// `Registration` and swaps it in wholesale, it never mutates one in place
/// (spec section 4.4, step 4 — "do not attempt to mutate the Registration;
/// replace it").
pub struct Registration {
    pub definition: CacheDefinition,
    pub store: Arc<EntryStore>,
    pub pool: Arc<ConnectionPool>,
    pub loader: Arc<Loader>,
}

impl Registration {
    pub fn new(definition: CacheDefinition, config: &EngineConfig) -> Result<Self, crate::CacheError> {
        let pool = Arc::new(ConnectionPool::new(&definition)?);
        let store = Arc::new(EntryStore::new(definition.max_size, definition.eviction_minutes));
        let loader = Arc::new(Loader::new(
            pool.clone(),
            &definition,
            config.pool_borrow_timeout,
        ));
        Ok(Self {
            definition,
            store,
            pool,
            loader,
        })
    }

    pub async fn close(&self) {
        self.store.invalidate_all();
        self.pool.close().await;
    }
}
