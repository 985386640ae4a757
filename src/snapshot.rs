// Filter/sort/paginate service for administrative inspection (spec section 4.4).

use crate::error::CacheError;
use crate::stats::CacheStatistics;
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};

/// One entry as exposed to an admin snapshot view.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheEntry {
    pub key: String,
    pub value: String,
    pub loaded_at_millis: u64,
    pub access_count: u64,
}

/// Point-in-time, filterable, sortable, limited view of an `EntryStore`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSnapshot {
    pub statistics: CacheStatistics,
    pub entries: Vec<CacheEntry>,
    pub total_entries: usize,
    pub matched_entries: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortField {
    Key,
    Value,
    LoadedAt,
    AccessCount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterScope {
    Key,
    Value,
    Both,
}

/// Query parameters for `CacheEngine::snapshot`. Defaults match the REST
/// boundary's documented defaults (spec section 6): `limit=1000`,
/// `sort_by=Key`, `sort_dir=Asc`, `filter_scope=Key`, `filter_regex=false`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotQuery {
    pub limit: usize,
    pub sort_by: SortField,
    pub sort_dir: SortDirection,
    pub filter: Option<String>,
    pub filter_scope: FilterScope,
    pub filter_regex: bool,
}

impl Default for SnapshotQuery {
    fn default() -> Self {
        Self {
            limit: 1000,
            sort_by: SortField::Key,
            sort_dir: SortDirection::Asc,
            filter: None,
            filter_scope: FilterScope::Key,
            filter_regex: false,
        }
    }
}

/// Apply filter, count matches, sort, then cap to `limit` (0 = unbounded).
///
/// `entries` is expected to already be a defensive, point-in-time copy of
/// the store's contents; ordering relative to concurrent mutations of the
/// live store is best-effort only (spec section 4.4).
pub fn build_snapshot(
    statistics: CacheStatistics,
    mut entries: Vec<CacheEntry>,
    query: &SnapshotQuery,
) -> Result<CacheSnapshot, CacheError> {
    let total_entries = entries.len();

    let matcher = build_matcher(query)?;
    entries.retain(|e| matcher(e));
    let matched_entries = entries.len();

    sort_entries(&mut entries, query.sort_by, query.sort_dir);

    if query.limit > 0 {
        entries.truncate(query.limit);
    }

    Ok(CacheSnapshot {
        statistics,
        entries,
        total_entries,
        matched_entries,
    })
}

fn build_matcher(query: &SnapshotQuery) -> Result<Box<dyn Fn(&CacheEntry) -> bool>, CacheError> {
    let Some(pattern) = query.filter.clone() else {
        return Ok(Box::new(|_: &CacheEntry| true));
    };
    let scope = query.filter_scope;

    if query.filter_regex {
        let re = RegexBuilder::new(&pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| CacheError::validation(format!("invalid filter regex: {e}")))?;
        Ok(Box::new(move |e: &CacheEntry| match scope {
            FilterScope::Key => re.is_match(&e.key),
            FilterScope::Value => re.is_match(&e.value),
            FilterScope::Both => re.is_match(&e.key) || re.is_match(&e.value),
        }))
    } else {
        let needle = pattern.to_lowercase();
        Ok(Box::new(move |e: &CacheEntry| match scope {
            FilterScope::Key => e.key.to_lowercase().contains(&needle),
            FilterScope::Value => e.value.to_lowercase().contains(&needle),
            FilterScope::Both => {
                e.key.to_lowercase().contains(&needle) || e.value.to_lowercase().contains(&needle)
            }
        }))
    }
}

fn sort_entries(entries: &mut [CacheEntry], field: SortField, dir: SortDirection) {
    entries.sort_by(|a, b| {
        let ordering = match field {
            SortField::Key => a.key.to_lowercase().cmp(&b.key.to_lowercase()),
            SortField::Value => a.value.to_lowercase().cmp(&b.value.to_lowercase()),
            SortField::LoadedAt => a.loaded_at_millis.cmp(&b.loaded_at_millis),
            SortField::AccessCount => a.access_count.cmp(&b.access_count),
        };
        match dir {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    });
}
