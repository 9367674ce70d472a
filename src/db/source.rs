use crate::{error::AppResult, error::CatalogError, models::RawCatalog};

/// Where catalog snapshots come from
///
/// A relation that fails on its own comes back empty; only a store that
/// cannot be reached at all is reported as `SourceUnavailable`.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch(&self) -> Result<RawCatalog, CatalogError>;

    /// Source name for logging
    fn name(&self) -> &'static str;
}

/// Direction of a follower count change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowChange {
    Follow,
    Unfollow,
}

impl FollowChange {
    pub fn delta(self) -> i64 {
        match self {
            FollowChange::Follow => 1,
            FollowChange::Unfollow => -1,
        }
    }

    pub fn reverse(self) -> Self {
        match self {
            FollowChange::Follow => FollowChange::Unfollow,
            FollowChange::Unfollow => FollowChange::Follow,
        }
    }
}

/// Mutations against the backing store
///
/// Both operations report `false` when the target row does not exist.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait CatalogWriter: Send + Sync {
    /// Adds or removes one follower, never going below zero
    async fn adjust_followers(&self, contributor_id: i64, change: FollowChange) -> AppResult<bool>;

    /// Replaces a user's followed-contributor list
    async fn set_followed(&self, user_id: i64, followed: &[i64]) -> AppResult<bool>;
}

/// Renders a followed list the way the store keeps it: `1,2,3`
pub fn format_followed(followed: &[i64]) -> String {
    followed
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_follow_change_delta() {
        assert_eq!(FollowChange::Follow.delta(), 1);
        assert_eq!(FollowChange::Unfollow.delta(), -1);
        assert_eq!(FollowChange::Follow.reverse(), FollowChange::Unfollow);
        assert_eq!(FollowChange::Unfollow.reverse().delta(), 1);
    }

    #[test]
    fn test_format_followed() {
        assert_eq!(format_followed(&[3, 1, 12]), "3,1,12");
        assert_eq!(format_followed(&[]), "");
    }
}
