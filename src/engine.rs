// Top-level orchestrator: registration lifecycle, lookup dispatch, and
// administrative operations (spec section 4.4).

use crate::config::EngineConfig;
use crate::definition::CacheDefinition;
use crate::error::CacheError;
use crate::facade::{FacadeSink, LookupFacade};
use crate::loader::{LoadOutcome, Loader, TestQueryOutcome};
use crate::pool::ConnectionPool;
use crate::registration::Registration;
use crate::snapshot::{build_snapshot, CacheEntry, CacheSnapshot, SnapshotQuery};
use crate::stats::{estimate_memory_bytes, CacheStatistics};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Registry of live caches plus the single synchronization point for
/// re-registration (spec section 4.4, step 4).
///
/// Both maps are updated together under `register`/`unregister`; there is no
/// engine-wide lock on the lookup hot path, matching the teacher's
/// `SessionManager` pattern of keying resources by id with a secondary
/// name index for O(1) lookup either way.
pub struct CacheEngine {
    registrations: DashMap<Uuid, Arc<Registration>>,
    names: DashMap<String, Uuid>,
    facade_sink: Arc<dyn FacadeSink>,
    config: EngineConfig,
}

impl CacheEngine {
    pub fn new(facade_sink: Arc<dyn FacadeSink>, config: EngineConfig) -> Self {
        Self {
            registrations: DashMap::new(),
            names: DashMap::new(),
            facade_sink,
            config,
        }
    }

    /// Register or atomically replace a cache definition.
    ///
    /// Builds the new `Registration` fully before touching any shared state;
    /// if construction fails (e.g. an unparseable URL) nothing about the
    /// live registry changes. Swapping in the new registration and retiring
    /// the old one's pool happens only after the new one is ready, so a
    /// concurrent lookup never observes a half-built cache.
    #[instrument(skip(self, definition), fields(cache = %definition.name))]
    pub async fn register(&self, definition: CacheDefinition) -> Result<Uuid, CacheError> {
        definition.validate()?;
        let id = definition.id;
        let name = definition.name.clone();

        if let Some(existing) = self.names.get(&name) {
            if *existing != id {
                return Err(CacheError::DuplicateName(name));
            }
        }

        let registration = Arc::new(Registration::new(definition, &self.config)?);
        let facade: Arc<dyn LookupFacade> = Arc::new(RegistrationFacade {
            registration: registration.clone(),
        });

        let previous = self.registrations.insert(id, registration);
        let previous_name = previous.as_ref().map(|r| r.definition.name.clone());
        self.names.insert(name.clone(), id);
        self.facade_sink.put(&name, facade);

        if let Some(old_name) = previous_name {
            if old_name != name {
                info!(cache = %name, old_name = %old_name, "cache renamed, retiring stale name mapping");
                self.names.remove(&old_name);
                self.facade_sink.remove(&old_name);
            }
        }

        if let Some(old) = previous {
            info!(cache = %name, "retiring previous registration after re-register");
            old.close().await;
        }

        Ok(id)
    }

    #[instrument(skip(self))]
    pub async fn unregister(&self, id: Uuid) -> Result<(), CacheError> {
        let (_, registration) = self
            .registrations
            .remove(&id)
            .ok_or_else(|| CacheError::unknown_cache(id.to_string()))?;
        self.names.remove(&registration.definition.name);
        self.facade_sink.remove(&registration.definition.name);
        registration.close().await;
        Ok(())
    }

    fn get_registration(&self, id: Uuid) -> Result<Arc<Registration>, CacheError> {
        self.registrations
            .get(&id)
            .map(|r| r.clone())
            .ok_or_else(|| CacheError::unknown_cache(id.to_string()))
    }

    fn resolve_name(&self, name: &str) -> Result<Uuid, CacheError> {
        self.names
            .get(name)
            .map(|id| *id)
            .ok_or_else(|| CacheError::unknown_cache(name.to_string()))
    }

    pub async fn lookup_by_id(&self, id: Uuid, key: &str) -> Result<Option<String>, CacheError> {
        let registration = self.get_registration(id)?;
        lookup_via(&registration, key).await
    }

    pub async fn lookup_by_name(&self, name: &str, key: &str) -> Result<Option<String>, CacheError> {
        let id = self.resolve_name(name)?;
        self.lookup_by_id(id, key).await
    }

    /// Re-execute the load query for every currently cached key. Each key is
    /// invalidated then synchronously reloaded through the same
    /// `get`-with-loader path used by ordinary lookups, so hit/miss/load
    /// counters reflect the reload activity (spec section 4.4). Returns the
    /// number of keys that failed to reload; a key whose reload fails is not
    /// re-inserted, since it was already invalidated before the reload ran.
    #[instrument(skip(self))]
    pub async fn refresh(&self, id: Uuid) -> Result<usize, CacheError> {
        let registration = self.get_registration(id)?;
        let keys = registration.store.keys();
        info!(count = keys.len(), "refreshing cached keys");

        let reloads = futures::future::join_all(keys.into_iter().map(|key| {
            let registration = registration.clone();
            async move {
                registration.store.invalidate(&key);
                registration.store.get(&key, &registration.loader).await
            }
        }))
        .await;

        let failures = reloads.iter().filter(|r| r.is_err()).count();
        if failures > 0 {
            warn!(failures, "refresh completed with reload failures");
        }
        Ok(failures)
    }

    pub fn snapshot(&self, id: Uuid, query: &SnapshotQuery) -> Result<CacheSnapshot, CacheError> {
        let registration = self.get_registration(id)?;
        let raw = registration.store.entries_snapshot();
        let stats = CacheStatistics::build(
            registration.definition.name.clone(),
            raw.len(),
            registration.store.counters(),
            estimate_memory_bytes(raw.iter().map(|(k, v, _, _)| (k.as_str(), v.as_str()))),
        );
        let entries = raw
            .into_iter()
            .map(|(key, value, loaded_at_millis, access_count)| CacheEntry {
                key,
                value,
                loaded_at_millis,
                access_count,
            })
            .collect();
        build_snapshot(stats, entries, query)
    }

    pub fn statistics(&self, id: Uuid) -> Result<CacheStatistics, CacheError> {
        let registration = self.get_registration(id)?;
        let raw = registration.store.entries_snapshot();
        Ok(CacheStatistics::build(
            registration.definition.name.clone(),
            registration.store.size(),
            registration.store.counters(),
            estimate_memory_bytes(raw.iter().map(|(k, v, _, _)| (k.as_str(), v.as_str()))),
        ))
    }

    pub fn all_statistics(&self) -> Vec<CacheStatistics> {
        self.registrations
            .iter()
            .map(|entry| {
                let registration = entry.value();
                let raw = registration.store.entries_snapshot();
                CacheStatistics::build(
                    registration.definition.name.clone(),
                    registration.store.size(),
                    registration.store.counters(),
                    estimate_memory_bytes(raw.iter().map(|(k, v, _, _)| (k.as_str(), v.as_str()))),
                )
            })
            .collect()
    }

    /// Verify connectivity for a definition that need not be registered yet,
    /// used by the admin "test connection" action before saving a
    /// definition. Always resolves to a human-readable status string rather
    /// than a `Result` — this is a diagnostic surface shown to an operator,
    /// not a call a caller branches on (spec section 4.4).
    pub async fn test_connection(&self, definition: &CacheDefinition) -> String {
        match ConnectionPool::check_connectivity(definition, self.config.test_connection_timeout).await {
            Ok(()) => format!("connection succeeded for '{}'", definition.name),
            Err(e) => format!("connection failed for '{}': {}", definition.name, e),
        }
    }

    /// Execute a definition's query against a sample key without publishing
    /// a registration, used by the admin "test query" action. Same
    /// always-a-string contract as `test_connection`.
    pub async fn test_query(&self, definition: &CacheDefinition, sample_key: &str) -> String {
        let pool = match ConnectionPool::new(definition) {
            Ok(p) => Arc::new(p),
            Err(e) => return format!("failed to build connection pool: {e}"),
        };
        let loader = Loader::new(pool.clone(), definition, self.config.pool_borrow_timeout);
        let result = loader.test_query(sample_key).await;
        pool.close().await;

        match result {
            Ok(TestQueryOutcome::Found { key, value }) => format!(
                "Key: {} Value: {}",
                key.as_deref().unwrap_or("<null>"),
                value.as_deref().unwrap_or("<null>")
            ),
            Ok(TestQueryOutcome::NoRows) => "no rows returned for sample key".to_string(),
            Err(CacheError::ColumnMissing { column, available }) => format!(
                "configured column '{column}' not found in result set; available columns: {available:?}"
            ),
            Err(e) => format!("query failed: {e}"),
        }
    }

    /// Close every registration's pool and clear the registry. Intended for
    /// process shutdown; an engine is not usable afterwards.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        let ids: Vec<Uuid> = self.registrations.iter().map(|e| *e.key()).collect();
        info!(count = ids.len(), "shutting down cache engine");
        for id in ids {
            if let Some((_, registration)) = self.registrations.remove(&id) {
                self.names.remove(&registration.definition.name);
                self.facade_sink.remove(&registration.definition.name);
                registration.close().await;
            }
        }
    }
}

async fn lookup_via(registration: &Registration, key: &str) -> Result<Option<String>, CacheError> {
    match registration.store.get(key, &registration.loader).await? {
        LoadOutcome::Found(value) => Ok(Some(value)),
        LoadOutcome::NotFound => Ok(None),
    }
}

/// `LookupFacade` bound to one live `Registration`, published into the
/// engine's `FacadeSink` on every `register` call (spec section 9).
struct RegistrationFacade {
    registration: Arc<Registration>,
}

#[async_trait]
impl LookupFacade for RegistrationFacade {
    async fn lookup(&self, key: &str) -> Option<String> {
        lookup_via(&self.registration, key).await.ok().flatten()
    }
}

/// Thin adapter handed to channel code: resolves a cache by name on every
/// call rather than holding a `Registration` directly, so it stays valid
/// across re-registration (spec section 9).
pub struct NameResolver {
    engine: Arc<CacheEngine>,
}

impl NameResolver {
    pub fn new(engine: Arc<CacheEngine>) -> Self {
        Self { engine }
    }

    pub async fn lookup(&self, cache_name: &str, key: &str) -> Result<Option<String>, CacheError> {
        self.engine.lookup_by_name(cache_name, key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facade::InMemoryFacadeSink;
    use crate::snapshot::SnapshotQuery;
    use std::time::Duration;

    /// Seeds a file-backed sqlite database (rather than `:memory:`) so the
    /// data survives the seeding pool closing and is visible to the
    /// separate pool the engine opens internally on `register`. The
    /// returned `TempPath` must be kept alive for the duration of the test.
    async fn seeded_def(name: &str) -> (tempfile::TempPath, CacheDefinition) {
        let id = Uuid::new_v4();
        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.into_temp_path();
        let url = format!("sqlite://{}?mode=rwc", path.display());

        let seed_pool = ConnectionPool::new(&CacheDefinition {
            id,
            name: name.into(),
            enabled: true,
            driver: "sqlite".into(),
            url: url.clone(),
            username: String::new(),
            password: String::new(),
            query: String::new(),
            key_column: None,
            value_column: "state".into(),
            max_size: 0,
            eviction_minutes: 0,
            max_connections: 2,
        })
        .unwrap();
        let mut conn = seed_pool.borrow(Duration::from_secs(5)).await.unwrap();
        sqlx::query("CREATE TABLE z (zip TEXT PRIMARY KEY, state TEXT)")
            .execute(&mut *conn)
            .await
            .unwrap();
        sqlx::query("INSERT INTO z (zip, state) VALUES ('10001', 'NY')")
            .execute(&mut *conn)
            .await
            .unwrap();
        seed_pool.release(conn);
        seed_pool.close().await;

        let def = CacheDefinition {
            id,
            name: name.into(),
            enabled: true,
            driver: "sqlite".into(),
            url,
            username: String::new(),
            password: String::new(),
            query: "SELECT state FROM z WHERE zip = ?".into(),
            key_column: Some("zip".into()),
            value_column: "state".into(),
            max_size: 100,
            eviction_minutes: 0,
            max_connections: 4,
        };
        (path, def)
    }

    fn engine() -> CacheEngine {
        CacheEngine::new(Arc::new(InMemoryFacadeSink::new()), EngineConfig::default())
    }

    #[tokio::test]
    async fn register_then_lookup_by_id_and_name() {
        let engine = engine();
        let (_guard, def) = seeded_def("engine_basic").await;
        let id = engine.register(def).await.unwrap();

        assert_eq!(
            engine.lookup_by_id(id, "10001").await.unwrap(),
            Some("NY".into())
        );
        assert_eq!(
            engine.lookup_by_name("engine_basic", "10001").await.unwrap(),
            Some("NY".into())
        );
        assert_eq!(engine.lookup_by_id(id, "00000").await.unwrap(), None);
    }

    #[tokio::test]
    async fn duplicate_name_with_different_id_is_rejected() {
        let engine = engine();
        let (_guard1, def1) = seeded_def("engine_dup").await;
        engine.register(def1).await.unwrap();

        let (_guard2, mut def2) = seeded_def("engine_dup").await;
        def2.id = Uuid::new_v4();
        let err = engine.register(def2).await.unwrap_err();
        assert!(matches!(err, CacheError::DuplicateName(_)));
    }

    #[tokio::test]
    async fn reregistering_same_id_swaps_atomically() {
        let engine = engine();
        let (_guard, def) = seeded_def("engine_swap").await;
        let id = engine.register(def.clone()).await.unwrap();
        engine.lookup_by_id(id, "10001").await.unwrap();

        let mut replacement = def;
        replacement.max_size = 5;
        let new_id = engine.register(replacement).await.unwrap();
        assert_eq!(new_id, id);
        assert_eq!(
            engine.lookup_by_id(id, "10001").await.unwrap(),
            Some("NY".into())
        );
    }

    #[tokio::test]
    async fn reregistering_with_new_name_retires_old_name_and_facade() {
        let engine = engine();
        let (_guard, def) = seeded_def("engine_rename_old").await;
        let id = engine.register(def.clone()).await.unwrap();
        engine.lookup_by_id(id, "10001").await.unwrap();

        let mut renamed = def;
        renamed.name = "engine_rename_new".into();
        let new_id = engine.register(renamed).await.unwrap();
        assert_eq!(new_id, id);

        let err = engine
            .lookup_by_name("engine_rename_old", "10001")
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::UnknownCache(_)));
        assert_eq!(
            engine
                .lookup_by_name("engine_rename_new", "10001")
                .await
                .unwrap(),
            Some("NY".into())
        );
    }

    #[tokio::test]
    async fn unregister_removes_lookup_and_facade() {
        let engine = engine();
        let (_guard, def) = seeded_def("engine_unreg").await;
        let id = engine.register(def).await.unwrap();
        engine.unregister(id).await.unwrap();

        let err = engine.lookup_by_id(id, "10001").await.unwrap_err();
        assert!(matches!(err, CacheError::UnknownCache(_)));
    }

    #[tokio::test]
    async fn statistics_reflect_hits_and_misses() {
        let engine = engine();
        let (_guard, def) = seeded_def("engine_stats").await;
        let id = engine.register(def).await.unwrap();
        engine.lookup_by_id(id, "10001").await.unwrap();
        engine.lookup_by_id(id, "10001").await.unwrap();

        let stats = engine.statistics(id).unwrap();
        assert_eq!(stats.hit_count, 1);
        assert_eq!(stats.miss_count, 1);
        assert_eq!(stats.load_success_count, 1);
    }

    #[tokio::test]
    async fn snapshot_filters_and_sorts() {
        let engine = engine();
        let (_guard, def) = seeded_def("engine_snapshot").await;
        let id = engine.register(def).await.unwrap();
        engine.lookup_by_id(id, "10001").await.unwrap();

        let snap = engine.snapshot(id, &SnapshotQuery::default()).unwrap();
        assert_eq!(snap.entries.len(), 1);
        assert_eq!(snap.entries[0].key, "10001");
    }

    #[tokio::test]
    async fn unknown_id_errors_on_every_operation() {
        let engine = engine();
        let bogus = Uuid::new_v4();
        assert!(engine.lookup_by_id(bogus, "k").await.is_err());
        assert!(engine.statistics(bogus).is_err());
        assert!(engine.snapshot(bogus, &SnapshotQuery::default()).is_err());
        assert!(engine.unregister(bogus).await.is_err());
    }

    #[tokio::test]
    async fn test_connection_reports_success_and_failure_as_strings() {
        let engine = engine();
        let (_guard, def) = seeded_def("engine_test_conn").await;
        let ok = engine.test_connection(&def).await;
        assert!(ok.contains("succeeded"));

        let mut bad = def;
        bad.url = "postgres://nonexistent-host-for-test:5432/db".into();
        let failed = engine.test_connection(&bad).await;
        assert!(failed.contains("failed"));
    }

    #[tokio::test]
    async fn test_query_reports_key_and_value_or_missing_column() {
        let engine = engine();
        let (_guard, mut def) = seeded_def("engine_test_query").await;
        def.query = "SELECT zip, state FROM z WHERE zip = ?".into();
        let found = engine.test_query(&def, "10001").await;
        assert!(found.contains("Key: 10001"));
        assert!(found.contains("Value: NY"));

        let mut bad_column = def;
        bad_column.value_column = "nonexistent".into();
        let missing = engine.test_query(&bad_column, "10001").await;
        assert!(missing.contains("not found"));
    }

    #[tokio::test]
    async fn name_resolver_delegates_to_engine() {
        let engine = Arc::new(engine());
        let (_guard, def) = seeded_def("engine_resolver").await;
        engine.register(def).await.unwrap();
        let resolver = NameResolver::new(engine);
        assert_eq!(
            resolver.lookup("engine_resolver", "10001").await.unwrap(),
            Some("NY".into())
        );
    }
}
