use thiserror::Error;

use crate::storage::{DatabaseError, Feed, FeedStore};

/// Why no feed was selected
#[derive(Debug, Error)]
pub enum SelectError {
    /// No feeds are registered. Expected on a fresh install.
    #[error("No feeds registered")]
    NoFeeds,
    #[error(transparent)]
    Store(#[from] DatabaseError),
}

/// The feed most overdue for a refresh.
///
/// Staleness is `last_fetched_at` ascending with never-fetched feeds first,
/// so feeds are visited round-robin and a feed whose fetch failed comes back
/// around once every other feed has had its turn. Read-only.
pub async fn select_next_feed<S: FeedStore + ?Sized>(store: &S) -> Result<Feed, SelectError> {
    store
        .select_most_stale_feed()
        .await?
        .ok_or(SelectError::NoFeeds)
}
