// Derived, point-in-time statistics (spec section 3).

use crate::entry_store::EntryStoreCounters;
use serde::{Deserialize, Serialize};

/// Snapshot of one cache's runtime counters, safe to serialize out to an
/// admin surface.
///
/// `hit_rate` is `f64::NAN` when `request_count == 0` — render it as a dash
/// rather than `0%`, per spec section 4.3; NaN is not itself serializable as
/// JSON so embedding hosts should special-case it before encoding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStatistics {
    pub name: String,
    pub size: usize,
    pub hit_count: u64,
    pub miss_count: u64,
    pub load_success_count: u64,
    pub load_exception_count: u64,
    pub hit_rate: f64,
    pub eviction_count: u64,
    pub request_count: u64,
    pub total_load_time_nanos: u64,
    pub average_load_penalty_nanos: f64,
    /// Lower-bound estimate: `sum(2*len(key) + 2*len(value))` over all
    /// entries. No per-entry overhead accounting; documented as an
    /// approximation, not replaced with a true sizing strategy (spec
    /// section 9, open question).
    pub estimated_memory_bytes: u64,
}

impl CacheStatistics {
    pub fn build(
        name: String,
        size: usize,
        counters: EntryStoreCounters,
        estimated_memory_bytes: u64,
    ) -> Self {
        let request_count = counters.hit_count + counters.miss_count;
        let hit_rate = if request_count > 0 {
            counters.hit_count as f64 / request_count as f64
        } else {
            f64::NAN
        };
        let average_load_penalty_nanos = if counters.load_success_count > 0 {
            counters.total_load_time_nanos as f64 / counters.load_success_count as f64
        } else {
            0.0
        };

        Self {
            name,
            size,
            hit_count: counters.hit_count,
            miss_count: counters.miss_count,
            load_success_count: counters.load_success_count,
            load_exception_count: counters.load_exception_count,
            hit_rate,
            eviction_count: counters.eviction_count,
            request_count,
            total_load_time_nanos: counters.total_load_time_nanos,
            average_load_penalty_nanos,
            estimated_memory_bytes,
        }
    }
}

/// `Σ (2*len(key) + 2*len(value))` over the given entries (spec section 4.3).
pub fn estimate_memory_bytes<'a>(entries: impl Iterator<Item = (&'a str, &'a str)>) -> u64 {
    entries
        .map(|(k, v)| 2 * k.len() as u64 + 2 * v.len() as u64)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_rate_is_nan_with_no_requests() {
        let stats = CacheStatistics::build("c".into(), 0, EntryStoreCounters::default(), 0);
        assert!(stats.hit_rate.is_nan());
    }

    #[test]
    fn hit_rate_computed_from_counters() {
        let counters = EntryStoreCounters {
            hit_count: 99,
            miss_count: 1,
            load_success_count: 1,
            load_exception_count: 0,
            eviction_count: 0,
            total_load_time_nanos: 500_000,
        };
        let stats = CacheStatistics::build("zip".into(), 1, counters, 20);
        assert_eq!(stats.request_count, 100);
        assert!((stats.hit_rate - 0.99).abs() < 1e-9);
        assert_eq!(stats.average_load_penalty_nanos, 500_000.0);
    }

    #[test]
    fn nan_hit_rate_is_not_json_serializable() {
        let stats = CacheStatistics::build("c".into(), 0, EntryStoreCounters::default(), 0);
        assert!(serde_json::to_string(&stats).is_err());
    }

    #[test]
    fn populated_statistics_serialize_to_json() {
        let counters = EntryStoreCounters {
            hit_count: 1,
            miss_count: 1,
            load_success_count: 1,
            load_exception_count: 0,
            eviction_count: 0,
            total_load_time_nanos: 100,
        };
        let stats = CacheStatistics::build("zip".into(), 1, counters, 10);
        let json = serde_json::to_string(&stats).unwrap();
        assert!(json.contains("\"name\":\"zip\""));
    }

    #[test]
    fn memory_estimate_is_lower_bound_sum() {
        let entries = vec![("10001", "NY"), ("90210", "CA")];
        let estimate = estimate_memory_bytes(entries.into_iter());
        // 2*5 + 2*2 + 2*5 + 2*2 = 28
        assert_eq!(estimate, 28);
    }
}
