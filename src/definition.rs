// Cache definition record and validation (spec sections 3 and 6).

use crate::error::CacheError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Operator-supplied description of one named cache.
///
/// Carried by value into the engine; `CacheEngine::register` always takes a
/// defensive copy so later mutation of a caller's `CacheDefinition` cannot
/// reach into a published `Registration`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheDefinition {
    pub id: Uuid,
    pub name: String,
    pub enabled: bool,
    pub driver: String,
    pub url: String,
    pub username: String,
    pub password: String,
    /// Parameterized SQL template with exactly one positional parameter.
    pub query: String,
    pub key_column: Option<String>,
    pub value_column: String,
    /// `0` means unbounded.
    pub max_size: u64,
    /// TTL measured from last access, in minutes. `0` means no TTL.
    pub eviction_minutes: u64,
    pub max_connections: u32,
}

impl CacheDefinition {
    /// Validation rules applied before `register` and at the REST boundary
    /// (spec section 6). Duplicate-name rejection is the engine's job, not
    /// this type's, since it requires knowledge of sibling registrations.
    pub fn validate(&self) -> Result<(), CacheError> {
        if self.name.trim().is_empty() {
            return Err(CacheError::validation("name must not be empty"));
        }
        if self.driver.trim().is_empty() {
            return Err(CacheError::validation("driver must not be empty"));
        }
        if self.url.trim().is_empty() {
            return Err(CacheError::validation("url must not be empty"));
        }
        if self.query.trim().is_empty() {
            return Err(CacheError::validation("query must not be empty"));
        }
        if self.value_column.trim().is_empty() {
            return Err(CacheError::validation("valueColumn must not be empty"));
        }
        if self.max_connections < 1 {
            return Err(CacheError::validation("maxConnections must be at least 1"));
        }
        // max_size and eviction_minutes are unsigned, so "non-negative" is
        // enforced by the type itself.
        Ok(())
    }
}
