use anyhow::Result;

use super::schema::Database;
use super::types::{to_millis, DatabaseError, InsertOutcome, NewPost, Post, PostDbRow};

const POST_COLUMNS: &str = "id, feed_id, title, url, description, published_at, created_at";

impl Database {
    // ========================================================================
    // Post Operations
    // ========================================================================

    /// Insert a post unless one already exists for `(feed_id, url)`.
    ///
    /// The uniqueness check is the table constraint itself, so concurrent
    /// writers can't both win. A violation of it is reported as
    /// [`InsertOutcome::Duplicate`]; every other failure is an error.
    pub async fn insert_post_if_absent(&self, post: &NewPost) -> Result<InsertOutcome, DatabaseError> {
        let created_at = to_millis(post.created_at);
        let result: Result<(i64,), sqlx::Error> = sqlx::query_as(
            r#"
            INSERT INTO posts (feed_id, title, url, description, published_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING id
        "#,
        )
        .bind(post.feed_id)
        .bind(&post.title)
        .bind(&post.url)
        .bind(&post.description)
        .bind(post.published_at.map(to_millis))
        .bind(created_at)
        .bind(created_at)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok((id,)) => Ok(InsertOutcome::Created(id)),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Ok(InsertOutcome::Duplicate)
            }
            Err(e) => Err(DatabaseError::from_sqlx(e)),
        }
    }

    /// All posts of a feed in insertion order
    pub async fn get_posts_for_feed(&self, feed_id: i64) -> Result<Vec<Post>> {
        let rows: Vec<PostDbRow> = sqlx::query_as(&format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE feed_id = ? ORDER BY id"
        ))
        .bind(feed_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(PostDbRow::into_post)
            .collect::<Result<_, _>>()?)
    }

    /// Newest posts from the feeds a user follows.
    ///
    /// Posts without a publish date sort after dated ones, then newest
    /// ingestion first.
    pub async fn get_posts_for_user(&self, user_id: i64, limit: u32) -> Result<Vec<Post>> {
        let rows: Vec<PostDbRow> = sqlx::query_as(
            r#"
            SELECT p.id, p.feed_id, p.title, p.url, p.description, p.published_at, p.created_at
            FROM posts p
            JOIN feed_follows ff ON ff.feed_id = p.feed_id
            WHERE ff.user_id = ?
            ORDER BY p.published_at IS NULL, p.published_at DESC, p.created_at DESC, p.id DESC
            LIMIT ?
        "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(PostDbRow::into_post)
            .collect::<Result<_, _>>()?)
    }

    /// Delete every post. Returns the count removed.
    pub async fn delete_all_posts(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM posts").execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    /// Number of stored posts, across all feeds
    pub async fn count_posts(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM posts")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
