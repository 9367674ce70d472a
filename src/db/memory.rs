use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use serde_json::Value;
use tokio::sync::RwLock;

use super::source::{format_followed, CatalogWriter, FollowChange, SnapshotSource};
use crate::{
    error::{AppError, AppResult, CatalogError},
    models::{coerce::Row, RawCatalog},
};

/// Catalog held in process memory, seeded from a JSON document
///
/// Used for local runs from a catalog file and as the store behind the
/// router tests. It can be switched offline to exercise the degraded path.
pub struct MemoryCatalog {
    catalog: RwLock<RawCatalog>,
    online: AtomicBool,
    fetches: AtomicUsize,
}

impl MemoryCatalog {
    pub fn new(catalog: RawCatalog) -> Self {
        Self {
            catalog: RwLock::new(catalog),
            online: AtomicBool::new(true),
            fetches: AtomicUsize::new(0),
        }
    }

    /// Loads a catalog file shaped like `{"places": [...], "reviews": [...], ...}`
    pub async fn from_file(path: &str) -> anyhow::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let catalog: RawCatalog = serde_json::from_slice(&bytes)?;
        tracing::info!(path, rows = catalog.row_count(), "Loaded catalog file");
        Ok(Self::new(catalog))
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Number of fetches served so far, failed ones included
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn ensure_online(&self) -> AppResult<()> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(AppError::Internal("catalog store is offline".to_string()))
        }
    }
}

fn find_row<'a>(
    rows: &'a mut [Value],
    relation: &'static str,
    id_columns: &[&'static str],
    id: i64,
) -> Option<&'a mut Value> {
    rows.iter_mut()
        .find(|row| Row::new(relation, row).int(id_columns) == id)
}

#[async_trait::async_trait]
impl SnapshotSource for MemoryCatalog {
    async fn fetch(&self) -> Result<RawCatalog, CatalogError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if !self.online.load(Ordering::SeqCst) {
            return Err(CatalogError::SourceUnavailable(
                "catalog store is offline".to_string(),
            ));
        }
        Ok(self.catalog.read().await.clone())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[async_trait::async_trait]
impl CatalogWriter for MemoryCatalog {
    async fn adjust_followers(&self, contributor_id: i64, change: FollowChange) -> AppResult<bool> {
        self.ensure_online()?;
        let mut catalog = self.catalog.write().await;
        let Some(row) = find_row(
            &mut catalog.contributors,
            "contributors",
            &["reviewer_id", "contributor_id", "id"],
            contributor_id,
        ) else {
            return Ok(false);
        };

        let followers = (Row::new("contributors", row).int(&["followers"]) + change.delta()).max(0);
        row["followers"] = Value::from(followers);
        Ok(true)
    }

    async fn set_followed(&self, user_id: i64, followed: &[i64]) -> AppResult<bool> {
        self.ensure_online()?;
        let mut catalog = self.catalog.write().await;
        let Some(row) = find_row(&mut catalog.users, "users", &["id", "user_id"], user_id) else {
            return Ok(false);
        };

        row["followed_reviewers"] = Value::from(format_followed(followed));
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn catalog() -> MemoryCatalog {
        MemoryCatalog::new(RawCatalog {
            contributors: vec![json!({"reviewer_id": 4, "name": "Ann", "followers": "0"})],
            users: vec![json!({"id": 1, "username": "me", "followed_reviewers": ""})],
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_adjust_followers_clamps_at_zero() {
        let store = catalog();
        assert!(store.adjust_followers(4, FollowChange::Unfollow).await.unwrap());
        assert!(store.adjust_followers(4, FollowChange::Follow).await.unwrap());
        assert!(store.adjust_followers(4, FollowChange::Follow).await.unwrap());

        let raw = store.fetch().await.unwrap();
        assert_eq!(raw.contributors[0]["followers"], json!(2));
    }

    #[tokio::test]
    async fn test_missing_rows_report_false() {
        let store = catalog();
        assert!(!store.adjust_followers(99, FollowChange::Follow).await.unwrap());
        assert!(!store.set_followed(99, &[4]).await.unwrap());
    }

    #[tokio::test]
    async fn test_set_followed_rewrites_list() {
        let store = catalog();
        assert!(store.set_followed(1, &[4, 7]).await.unwrap());
        let raw = store.fetch().await.unwrap();
        assert_eq!(raw.users[0]["followed_reviewers"], json!("4,7"));
    }

    #[tokio::test]
    async fn test_offline_store_fails_reads_and_writes() {
        let store = catalog();
        store.set_online(false);
        assert!(matches!(
            store.fetch().await,
            Err(CatalogError::SourceUnavailable(_))
        ));
        assert!(store.adjust_followers(4, FollowChange::Follow).await.is_err());
        assert_eq!(store.fetch_count(), 1);
    }
}
