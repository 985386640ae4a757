// Single-key query execution (spec section 4.2).

use crate::definition::CacheDefinition;
use crate::error::CacheError;
use crate::pool::{row_column_names, ConnectionPool};
use sqlx::Row;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Outcome of one `Loader::load` call, deliberately distinct from
/// `Option<String>` — a row whose value column is SQL NULL and "no row at
/// all" both collapse to `NotFound`, never to `Found(String::new())`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Found(String),
    NotFound,
}

/// Result of executing `CacheEngine::test_query` against a sample key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestQueryOutcome {
    NoRows,
    Found {
        key: Option<String>,
        value: Option<String>,
    },
}

/// Executes one cache's parameterized query against its `ConnectionPool`.
///
/// The query text's placeholder syntax must match the target driver (`?` for
/// SQLite/MySQL, `$1` for Postgres) — `sqlx`'s `Any` driver does not rewrite
/// placeholders across backends, so this is a property of the operator's
/// configured query, not something the loader can paper over.
pub struct Loader {
    pool: Arc<ConnectionPool>,
    cache_name: String,
    query: String,
    key_column: Option<String>,
    value_column: String,
    borrow_timeout: Duration,
}

impl Loader {
    pub fn new(pool: Arc<ConnectionPool>, def: &CacheDefinition, borrow_timeout: Duration) -> Self {
        Self {
            pool,
            cache_name: def.name.clone(),
            query: def.query.clone(),
            key_column: def.key_column.clone(),
            value_column: def.value_column.clone(),
            borrow_timeout,
        }
    }

    pub async fn load(&self, key: &str) -> Result<LoadOutcome, CacheError> {
        let mut conn = self.pool.borrow(self.borrow_timeout).await?;
        let result = sqlx::query(&self.query).bind(key).fetch_optional(&mut *conn).await;
        self.pool.release(conn);

        let row = match result {
            Ok(Some(row)) => row,
            Ok(None) => return Ok(LoadOutcome::NotFound),
            Err(e) => {
                warn!(cache = %self.cache_name, error = %e, "loader query failed");
                return Err(CacheError::QueryError(format!(
                    "cache {}: {}",
                    self.cache_name, e
                )));
            }
        };

        match resolve_value(&row, &self.value_column)? {
            Some(value) => Ok(LoadOutcome::Found(value)),
            None => Ok(LoadOutcome::NotFound),
        }
    }

    pub async fn test_query(&self, sample_key: &str) -> Result<TestQueryOutcome, CacheError> {
        let mut conn = self.pool.borrow(self.borrow_timeout).await?;
        let result = sqlx::query(&self.query)
            .bind(sample_key)
            .fetch_optional(&mut *conn)
            .await;
        self.pool.release(conn);

        let row = match result {
            Ok(Some(row)) => row,
            Ok(None) => return Ok(TestQueryOutcome::NoRows),
            Err(e) => {
                return Err(CacheError::QueryError(format!(
                    "cache {}: {}",
                    self.cache_name, e
                )))
            }
        };

        let value = resolve_value(&row, &self.value_column)?;
        let key = match &self.key_column {
            Some(col) => resolve_value(&row, col)?,
            None => None,
        };
        Ok(TestQueryOutcome::Found { key, value })
    }
}

/// Resolve `column` against `row`'s driver-reported labels, case-insensitive
/// first, then fall back to the raw label as the driver sees it.
fn resolve_value(row: &sqlx::any::AnyRow, column: &str) -> Result<Option<String>, CacheError> {
    let columns = row_column_names(row);
    let idx = columns
        .iter()
        .position(|c| c.eq_ignore_ascii_case(column));

    let outcome = match idx {
        Some(i) => row.try_get::<Option<String>, _>(i),
        None => row.try_get::<Option<String>, _>(column),
    };

    outcome.map_err(|_| CacheError::ColumnMissing {
        column: column.to_string(),
        available: columns,
    })
}
