use anyhow::{bail, Result};
use chrono::Utc;

use super::schema::Database;
use super::types::{from_millis, to_millis, User};

type UserRow = (i64, String, i64);

fn into_user((id, name, created_at): UserRow) -> Result<User> {
    Ok(User {
        id,
        name,
        created_at: from_millis("users.created_at", created_at)?,
    })
}

impl Database {
    // ========================================================================
    // User Operations
    // ========================================================================

    /// Create a user. Fails if the name is already taken.
    pub async fn create_user(&self, name: &str) -> Result<User> {
        let now = to_millis(Utc::now());
        let result = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (name, created_at, updated_at)
            VALUES (?, ?, ?)
            RETURNING id, name, created_at
        "#,
        )
        .bind(name)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => into_user(row),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                bail!("user {} already exists", name)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Look up a user by name
    pub async fn get_user_by_name(&self, name: &str) -> Result<Option<User>> {
        let row: Option<UserRow> =
            sqlx::query_as("SELECT id, name, created_at FROM users WHERE name = ?")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;

        row.map(into_user).transpose()
    }

    /// All users, alphabetically
    pub async fn list_users(&self) -> Result<Vec<User>> {
        let rows: Vec<UserRow> =
            sqlx::query_as("SELECT id, name, created_at FROM users ORDER BY name")
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(into_user).collect()
    }

    /// Delete every user; feeds, follows and posts go with them via cascade.
    ///
    /// Returns the number of users removed.
    pub async fn delete_all_users(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM users")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
