// Process-wide defaults for the cache engine (SPEC_FULL.md section 10.3).

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Defaults applied when a `CacheDefinition` or a per-call option is silent.
///
/// Definition fields (pool size, TTL, ...) remain the per-cache configuration
/// surface; `EngineConfig` only covers process-wide knobs that have no
/// per-definition equivalent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// How long `ConnectionPool::borrow` waits for a free connection.
    pub pool_borrow_timeout: Duration,

    /// Timeout for the `isValid` check performed by `testConnection`.
    pub test_connection_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pool_borrow_timeout: Duration::from_secs(5),
            test_connection_timeout: Duration::from_secs(10),
        }
    }
}
