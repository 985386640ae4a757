// Channel-side lookup façade sink (spec section 9).
//
// The façade object itself (one per registered cache, keyed by cache name)
// is in scope for this crate; where it gets *published* — a host's script
// variable store, a process-wide registry, etc. — is a host concern. The
// engine only needs a sink it can `put`/`remove` entries into atomically
// with registration/unregistration.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

/// The object channel code calls to read a cached value by key.
#[async_trait]
pub trait LookupFacade: Send + Sync {
    async fn lookup(&self, key: &str) -> Option<String>;
}

/// Where the engine publishes and retracts per-cache lookup façades.
///
/// Abstracted as a two-method sink per spec section 9 so a host can supply
/// its own (e.g. a script-engine variable store) without this crate knowing
/// anything about that host's object model.
pub trait FacadeSink: Send + Sync {
    fn put(&self, name: &str, facade: Arc<dyn LookupFacade>);
    fn remove(&self, name: &str);
}

/// Default sink usable standalone, without a host-provided one.
#[derive(Default)]
pub struct InMemoryFacadeSink {
    facades: DashMap<String, Arc<dyn LookupFacade>>,
}

impl InMemoryFacadeSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn LookupFacade>> {
        self.facades.get(name).map(|f| f.clone())
    }
}

impl FacadeSink for InMemoryFacadeSink {
    fn put(&self, name: &str, facade: Arc<dyn LookupFacade>) {
        self.facades.insert(name.to_string(), facade);
    }

    fn remove(&self, name: &str) {
        self.facades.remove(name);
    }
}
