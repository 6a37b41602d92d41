use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::schema::Database;
use super::types::{DatabaseError, Feed, InsertOutcome, NewPost};

/// The persistent-store operations the aggregation pipeline depends on.
///
/// [`Database`] is the production implementation. The pipeline is generic
/// over this trait so it never needs to know the storage engine.
#[async_trait]
pub trait FeedStore: Send + Sync {
    /// Feed with the oldest `last_fetched_at` (never-fetched first), or `None`
    async fn select_most_stale_feed(&self) -> Result<Option<Feed>, DatabaseError>;

    async fn touch_feed_fetched_at(
        &self,
        feed_id: i64,
        fetched_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError>;

    async fn insert_post_if_absent(&self, post: &NewPost) -> Result<InsertOutcome, DatabaseError>;
}

#[async_trait]
impl FeedStore for Database {
    async fn select_most_stale_feed(&self) -> Result<Option<Feed>, DatabaseError> {
        Database::select_most_stale_feed(self).await
    }

    async fn touch_feed_fetched_at(
        &self,
        feed_id: i64,
        fetched_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        Database::touch_feed_fetched_at(self, feed_id, fetched_at).await
    }

    async fn insert_post_if_absent(&self, post: &NewPost) -> Result<InsertOutcome, DatabaseError> {
        Database::insert_post_if_absent(self, post).await
    }
}
