use anyhow::{bail, Result};
use chrono::{DateTime, Utc};

use super::schema::Database;
use super::types::{to_millis, DatabaseError, Feed, FeedDbRow, FeedWithOwner};

const FEED_COLUMNS: &str = "id, name, url, user_id, created_at, last_fetched_at";

impl Database {
    // ========================================================================
    // Feed Operations
    // ========================================================================

    /// Register a feed owned by `user_id`. Feed URLs are unique.
    pub async fn insert_feed(&self, name: &str, url: &str, user_id: i64) -> Result<Feed> {
        let now = to_millis(Utc::now());
        let result = sqlx::query_as::<_, FeedDbRow>(&format!(
            r#"
            INSERT INTO feeds (name, url, user_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING {FEED_COLUMNS}
        "#
        ))
        .bind(name)
        .bind(url)
        .bind(user_id)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => Ok(row.into_feed()?),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                bail!("a feed with URL {} is already registered", url)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// All feeds with the name of the user who registered them, ordered by name
    pub async fn list_feeds(&self) -> Result<Vec<FeedWithOwner>> {
        let rows: Vec<(i64, String, String, i64, i64, Option<i64>, String)> = sqlx::query_as(
            r#"
                SELECT f.id, f.name, f.url, f.user_id, f.created_at, f.last_fetched_at,
                       u.name AS owner_name
                FROM feeds f
                JOIN users u ON u.id = f.user_id
                ORDER BY f.name, f.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(
                |(id, name, url, user_id, created_at, last_fetched_at, owner_name)| -> Result<FeedWithOwner> {
                    let feed = FeedDbRow {
                        id,
                        name,
                        url,
                        user_id,
                        created_at,
                        last_fetched_at,
                    }
                    .into_feed()?;
                    Ok(FeedWithOwner { feed, owner_name })
                },
            )
            .collect()
    }

    /// Look up a feed by its source URL
    pub async fn get_feed_by_url(&self, url: &str) -> Result<Option<Feed>> {
        let row: Option<FeedDbRow> =
            sqlx::query_as(&format!("SELECT {FEED_COLUMNS} FROM feeds WHERE url = ?"))
                .bind(url)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(FeedDbRow::into_feed).transpose()?)
    }

    /// Delete every feed (cascades to follows and posts). Returns the count removed.
    pub async fn delete_all_feeds(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM feeds").execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    // ========================================================================
    // Scheduling Operations
    // ========================================================================

    /// The feed that has gone longest without a fetch attempt.
    ///
    /// Never-fetched feeds (NULL `last_fetched_at`) sort first; ties break by
    /// ascending id. Returns `None` when no feeds are registered. Read-only.
    pub async fn select_most_stale_feed(&self) -> Result<Option<Feed>, DatabaseError> {
        let row: Option<FeedDbRow> = sqlx::query_as(&format!(
            r#"
            SELECT {FEED_COLUMNS}
            FROM feeds
            ORDER BY last_fetched_at IS NOT NULL, last_fetched_at ASC, id ASC
            LIMIT 1
        "#
        ))
        .fetch_optional(&self.pool)
        .await?;

        row.map(FeedDbRow::into_feed).transpose()
    }

    /// Record a fetch attempt at `fetched_at`.
    ///
    /// Fails with `RowNotFound` if the feed no longer exists.
    pub async fn touch_feed_fetched_at(
        &self,
        feed_id: i64,
        fetched_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        let millis = to_millis(fetched_at);
        let result =
            sqlx::query("UPDATE feeds SET last_fetched_at = ?, updated_at = ? WHERE id = ?")
                .bind(millis)
                .bind(millis)
                .bind(feed_id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::Other(sqlx::Error::RowNotFound));
        }
        Ok(())
    }
}
