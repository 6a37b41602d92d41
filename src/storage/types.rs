use chrono::{DateTime, Utc};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process holds a lock on the database file
    #[error("The gator database is locked by another process. Please close it and try again.")]
    Locked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// A stored timestamp could not be converted back to an instant
    #[error("Corrupt timestamp in column {column}: {value}")]
    CorruptTimestamp { column: &'static str, value: i64 },

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Classify a sqlx error, mapping SQLite lock conditions to [`DatabaseError::Locked`]
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5), SQLITE_LOCKED (6)
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
        {
            return DatabaseError::Locked;
        }

        DatabaseError::Other(err)
    }
}

// ============================================================================
// Timestamp Conversion
// ============================================================================

/// Instants are stored as UTC Unix milliseconds.
pub(crate) fn to_millis(instant: DateTime<Utc>) -> i64 {
    instant.timestamp_millis()
}

pub(crate) fn from_millis(column: &'static str, value: i64) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::from_timestamp_millis(value).ok_or(DatabaseError::CorruptTimestamp { column, value })
}

pub(crate) fn from_optional_millis(
    column: &'static str,
    value: Option<i64>,
) -> Result<Option<DateTime<Utc>>, DatabaseError> {
    value.map(|v| from_millis(column, v)).transpose()
}

// ============================================================================
// Row Types
// ============================================================================

/// Internal row type for feed queries (converted via `into_feed`)
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct FeedDbRow {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub user_id: i64,
    pub created_at: i64,
    pub last_fetched_at: Option<i64>,
}

impl FeedDbRow {
    pub(crate) fn into_feed(self) -> Result<Feed, DatabaseError> {
        Ok(Feed {
            id: self.id,
            name: self.name,
            url: self.url,
            user_id: self.user_id,
            created_at: from_millis("feeds.created_at", self.created_at)?,
            last_fetched_at: from_optional_millis("feeds.last_fetched_at", self.last_fetched_at)?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PostDbRow {
    pub id: i64,
    pub feed_id: i64,
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    pub published_at: Option<i64>,
    pub created_at: i64,
}

impl PostDbRow {
    pub(crate) fn into_post(self) -> Result<Post, DatabaseError> {
        Ok(Post {
            id: self.id,
            feed_id: self.feed_id,
            title: self.title,
            url: self.url,
            description: self.description,
            published_at: from_optional_millis("posts.published_at", self.published_at)?,
            created_at: from_millis("posts.created_at", self.created_at)?,
        })
    }
}

// ============================================================================
// Data Structures
// ============================================================================

/// A registered user. Owns the feeds it adds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// A registered, periodically polled feed.
///
/// `last_fetched_at` is `None` until the first aggregation attempt; the
/// selector treats that as maximally stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feed {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
    pub last_fetched_at: Option<DateTime<Utc>>,
}

/// A feed joined with the name of the user who registered it
#[derive(Debug, Clone)]
pub struct FeedWithOwner {
    pub feed: Feed,
    pub owner_name: String,
}

/// A persisted feed entry. Unique per `(feed_id, url)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub id: i64,
    pub feed_id: i64,
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Everything needed to insert a post; the id is assigned by the store.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub feed_id: i64,
    pub url: String,
    pub title: String,
    pub description: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Result of `insert_post_if_absent`.
///
/// A duplicate is an expected outcome, not an error: the `(feed_id, url)`
/// uniqueness constraint is how repeated deliveries are detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Created(i64),
    Duplicate,
}

/// A user's followed feed, as listed by `following`
#[derive(Debug, Clone)]
pub struct FollowedFeed {
    pub feed_id: i64,
    pub feed_name: String,
    pub feed_url: String,
}
