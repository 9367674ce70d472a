use std::time::Duration;

use sqlx::{postgres::PgPoolOptions, PgPool};

use super::source::{format_followed, CatalogWriter, FollowChange, SnapshotSource};
use crate::{
    error::{AppResult, CatalogError},
    models::RawCatalog,
};

/// Creates a PostgreSQL connection pool
///
/// Connections are opened lazily so the service can start, and serve a
/// degraded empty catalog, while the database is still unreachable.
pub fn create_pool(database_url: &str, acquire_timeout: Duration) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(acquire_timeout)
        .connect_lazy(database_url)?;

    Ok(pool)
}

/// Catalog stored in four PostgreSQL tables
#[derive(Clone)]
pub struct PostgresCatalog {
    pool: PgPool,
}

impl PostgresCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Every row of `table` as a JSON object, in id order
    async fn fetch_relation(&self, table: &'static str) -> Vec<serde_json::Value> {
        let sql = format!("SELECT row_to_json(t)::text FROM {} t ORDER BY t.id", table);
        let rows = match sqlx::query_scalar::<_, String>(&sql)
            .fetch_all(&self.pool)
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(table, error = %e, "Failed to load relation, treating it as empty");
                return Vec::new();
            }
        };

        rows.iter()
            .filter_map(|row| match serde_json::from_str(row) {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::debug!(table, error = %e, "Skipping undecodable row");
                    None
                }
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl SnapshotSource for PostgresCatalog {
    async fn fetch(&self) -> Result<RawCatalog, CatalogError> {
        // One round trip up front tells an unreachable store apart from a broken table
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| CatalogError::SourceUnavailable(e.to_string()))?;

        Ok(RawCatalog {
            places: self.fetch_relation("places").await,
            reviews: self.fetch_relation("reviews").await,
            contributors: self.fetch_relation("contributors").await,
            users: self.fetch_relation("users").await,
        })
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}

#[async_trait::async_trait]
impl CatalogWriter for PostgresCatalog {
    async fn adjust_followers(&self, contributor_id: i64, change: FollowChange) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE contributors SET followers = GREATEST(followers + $2, 0) WHERE id = $1",
        )
        .bind(contributor_id)
        .bind(change.delta())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_followed(&self, user_id: i64, followed: &[i64]) -> AppResult<bool> {
        let result = sqlx::query("UPDATE users SET followed = $2 WHERE id = $1")
            .bind(user_id)
            .bind(format_followed(followed))
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
