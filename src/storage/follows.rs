use anyhow::{bail, Result};
use chrono::Utc;

use super::schema::Database;
use super::types::{to_millis, FollowedFeed};

impl Database {
    // ========================================================================
    // Follow Operations
    // ========================================================================

    /// Make `user_id` follow `feed_id`. Following twice is an error.
    pub async fn create_feed_follow(&self, user_id: i64, feed_id: i64) -> Result<FollowedFeed> {
        let result = sqlx::query("INSERT INTO feed_follows (user_id, feed_id, created_at) VALUES (?, ?, ?)")
            .bind(user_id)
            .bind(feed_id)
            .bind(to_millis(Utc::now()))
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => {}
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                bail!("already following this feed")
            }
            Err(e) => return Err(e.into()),
        }

        let (feed_id, feed_name, feed_url): (i64, String, String) =
            sqlx::query_as("SELECT id, name, url FROM feeds WHERE id = ?")
                .bind(feed_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(FollowedFeed {
            feed_id,
            feed_name,
            feed_url,
        })
    }

    /// Feeds followed by a user, ordered by feed name
    pub async fn get_feed_follows_for_user(&self, user_id: i64) -> Result<Vec<FollowedFeed>> {
        let rows: Vec<(i64, String, String)> = sqlx::query_as(
            r#"
            SELECT f.id, f.name, f.url
            FROM feed_follows ff
            JOIN feeds f ON f.id = ff.feed_id
            WHERE ff.user_id = ?
            ORDER BY f.name, f.id
        "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(feed_id, feed_name, feed_url)| FollowedFeed {
                feed_id,
                feed_name,
                feed_url,
            })
            .collect())
    }

    /// Remove a follow, returning whether one existed (idempotent)
    pub async fn delete_feed_follow(&self, user_id: i64, feed_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM feed_follows WHERE user_id = ? AND feed_id = ?")
            .bind(user_id)
            .bind(feed_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
