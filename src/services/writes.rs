use std::sync::Arc;

use tokio::sync::Mutex;

use crate::{
    db::{CatalogWriter, FollowChange},
    error::{AppError, AppResult},
};

use super::coordinator::CacheCoordinator;

/// Routes follow/unfollow mutations to the store and invalidates the
/// snapshot cache after every successful commit
///
/// Mutations run one at a time across all clones, since each one reads the
/// followed list from the snapshot and writes the whole list back.
#[derive(Clone)]
pub struct WriteGateway {
    writer: Arc<dyn CatalogWriter>,
    coordinator: Arc<CacheCoordinator>,
    write_lock: Arc<Mutex<()>>,
}

impl WriteGateway {
    pub fn new(writer: Arc<dyn CatalogWriter>, coordinator: Arc<CacheCoordinator>) -> Self {
        Self {
            writer,
            coordinator,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub async fn follow(&self, user_id: i64, contributor_id: i64) -> AppResult<Vec<i64>> {
        self.apply(user_id, contributor_id, FollowChange::Follow)
            .await
    }

    pub async fn unfollow(&self, user_id: i64, contributor_id: i64) -> AppResult<Vec<i64>> {
        self.apply(user_id, contributor_id, FollowChange::Unfollow)
            .await
    }

    /// Returns the user's followed list after the change
    ///
    /// Following someone already followed, or unfollowing someone not
    /// followed, commits nothing.
    async fn apply(
        &self,
        user_id: i64,
        contributor_id: i64,
        change: FollowChange,
    ) -> AppResult<Vec<i64>> {
        let _write = self.write_lock.lock().await;
        let snapshot = self.coordinator.get_snapshot().await;

        let user = snapshot
            .user(user_id)
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))?;
        if snapshot.contributor(contributor_id).is_none() {
            return Err(AppError::NotFound(format!(
                "Contributor {} not found",
                contributor_id
            )));
        }

        let mut followed = user.followed.clone();
        let already = user.follows(contributor_id);
        match change {
            FollowChange::Follow if already => return Ok(followed),
            FollowChange::Unfollow if !already => return Ok(followed),
            FollowChange::Follow => followed.push(contributor_id),
            FollowChange::Unfollow => followed.retain(|id| *id != contributor_id),
        }
        drop(snapshot);

        if !self.writer.adjust_followers(contributor_id, change).await? {
            return Err(AppError::NotFound(format!(
                "Contributor {} not found",
                contributor_id
            )));
        }
        self.coordinator.invalidate().await;

        let stored = match self.writer.set_followed(user_id, &followed).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(AppError::NotFound(format!("User {} not found", user_id))),
            Err(e) => Err(e),
        };
        if let Err(e) = stored {
            self.revert_followers(contributor_id, change).await;
            return Err(e);
        }
        self.coordinator.invalidate().await;

        tracing::info!(user_id, contributor_id, change = ?change, "Follow list updated");
        Ok(followed)
    }

    /// Undoes a follower count change whose followed-list write failed
    async fn revert_followers(&self, contributor_id: i64, change: FollowChange) {
        let undo = change.reverse();
        match self.writer.adjust_followers(contributor_id, undo).await {
            Ok(_) => tracing::warn!(contributor_id, change = ?change, "Follower count reverted"),
            Err(e) => tracing::error!(
                error = %e,
                contributor_id,
                change = ?change,
                "Follower count left out of step with followed list"
            ),
        }
        self.coordinator.invalidate().await;
    }
}
