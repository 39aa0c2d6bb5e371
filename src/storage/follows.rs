use anyhow::Result;

use super::schema::Database;
use super::types::{now_millis, FollowedFeed};

const FOLLOW_SELECT: &str = r#"
    SELECT ff.id, ff.user_id, ff.feed_id, u.name AS user_name, f.name AS feed_name, ff.created_at
    FROM feed_follows ff
    JOIN users u ON u.id = ff.user_id
    JOIN feeds f ON f.id = ff.feed_id
"#;

impl Database {
    // ========================================================================
    // Follow Operations
    // ========================================================================

    /// Make `user_id` follow `feed_id`.
    ///
    /// Returns `None` if the user already follows the feed.
    pub async fn create_feed_follow(
        &self,
        user_id: i64,
        feed_id: i64,
    ) -> Result<Option<FollowedFeed>> {
        let now = now_millis();
        let inserted: Option<(i64,)> = sqlx::query_as(
            r#"
            INSERT INTO feed_follows (user_id, feed_id, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(user_id, feed_id) DO NOTHING
            RETURNING id
        "#,
        )
        .bind(user_id)
        .bind(feed_id)
        .bind(now)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        let Some((follow_id,)) = inserted else {
            return Ok(None);
        };

        let follow = sqlx::query_as::<_, FollowedFeed>(&format!("{FOLLOW_SELECT} WHERE ff.id = ?"))
            .bind(follow_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(Some(follow))
    }

    /// Feeds followed by a user, in the order they were followed.
    pub async fn feed_follows_for_user(&self, user_id: i64) -> Result<Vec<FollowedFeed>> {
        let follows = sqlx::query_as::<_, FollowedFeed>(&format!(
            "{FOLLOW_SELECT} WHERE ff.user_id = ? ORDER BY ff.created_at, ff.id"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(follows)
    }

    /// Remove a follow; returns whether one existed.
    pub async fn delete_feed_follow(&self, user_id: i64, feed_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM feed_follows WHERE user_id = ? AND feed_id = ?")
            .bind(user_id)
            .bind(feed_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
