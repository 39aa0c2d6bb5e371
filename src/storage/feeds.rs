use anyhow::Result;

use super::schema::Database;
use super::types::{now_millis, DatabaseError, Feed, FeedListing};

const FEED_COLUMNS: &str = "id, name, url, user_id, last_fetched_at, last_error, \
                            consecutive_failures, created_at, updated_at";

impl Database {
    // ========================================================================
    // Feed Operations
    // ========================================================================

    /// Consecutive fetch failures after which a failing feed is rotated to
    /// the back of the queue instead of staying the next candidate.
    pub const FAILURE_THRESHOLD: i64 = 5;

    /// Create a feed owned by `user_id`.
    ///
    /// Returns `None` when a feed with the same URL already exists.
    pub async fn create_feed(&self, name: &str, url: &str, user_id: i64) -> Result<Option<Feed>> {
        let now = now_millis();
        let feed = sqlx::query_as::<_, Feed>(&format!(
            r#"
            INSERT INTO feeds (name, url, user_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(url) DO NOTHING
            RETURNING {FEED_COLUMNS}
        "#
        ))
        .bind(name)
        .bind(url)
        .bind(user_id)
        .bind(now)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(feed)
    }

    pub async fn get_feed(&self, feed_id: i64) -> Result<Option<Feed>> {
        let feed = sqlx::query_as::<_, Feed>(&format!(
            "SELECT {FEED_COLUMNS} FROM feeds WHERE id = ?"
        ))
        .bind(feed_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(feed)
    }

    pub async fn get_feed_by_url(&self, url: &str) -> Result<Option<Feed>> {
        let feed = sqlx::query_as::<_, Feed>(&format!(
            "SELECT {FEED_COLUMNS} FROM feeds WHERE url = ?"
        ))
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;
        Ok(feed)
    }

    /// All feeds with the name of the user who added them, ordered by name.
    pub async fn list_feeds_with_owners(&self) -> Result<Vec<FeedListing>> {
        let feeds = sqlx::query_as::<_, FeedListing>(
            r#"
            SELECT f.name, f.url, u.name AS owner_name, f.last_fetched_at,
                   f.last_error, f.consecutive_failures
            FROM feeds f
            JOIN users u ON u.id = f.user_id
            ORDER BY f.name, f.id
        "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(feeds)
    }

    // ========================================================================
    // Fetch Bookkeeping
    // ========================================================================

    /// The feed that has waited longest: never-fetched feeds first, then the
    /// oldest `last_fetched_at`, ties broken by ascending id.
    pub async fn next_feed_to_fetch(&self) -> Result<Option<Feed>, DatabaseError> {
        let feed = sqlx::query_as::<_, Feed>(&format!(
            r#"
            SELECT {FEED_COLUMNS}
            FROM feeds
            ORDER BY last_fetched_at ASC NULLS FIRST, id ASC
            LIMIT 1
        "#
        ))
        .fetch_optional(&self.pool)
        .await?;
        Ok(feed)
    }

    /// Stamp a successful fetch: advance `last_fetched_at`, clear the error
    /// and reset the failure counter.
    ///
    /// `MAX()` keeps the timestamp monotonic even if the clock steps back.
    pub async fn mark_feed_fetched(&self, feed_id: i64) -> Result<(), DatabaseError> {
        let now = now_millis();
        sqlx::query(
            r#"
            UPDATE feeds SET
                last_fetched_at = MAX(COALESCE(last_fetched_at, 0), ?),
                last_error = NULL,
                consecutive_failures = 0,
                updated_at = ?
            WHERE id = ?
        "#,
        )
        .bind(now)
        .bind(now)
        .bind(feed_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Record a failed fetch and return the new consecutive failure count.
    ///
    /// Below [`FAILURE_THRESHOLD`](Self::FAILURE_THRESHOLD) the fetch time is
    /// left untouched so the feed stays the next candidate. From the threshold
    /// on, the failure also stamps `last_fetched_at`, moving the feed behind
    /// every other feed.
    pub async fn record_fetch_failure(
        &self,
        feed_id: i64,
        error: &str,
    ) -> Result<i64, DatabaseError> {
        let now = now_millis();
        let result: (i64,) = sqlx::query_as(
            r#"
            UPDATE feeds SET
                consecutive_failures = consecutive_failures + 1,
                last_error = ?,
                last_fetched_at = CASE
                    WHEN consecutive_failures + 1 >= ? THEN MAX(COALESCE(last_fetched_at, 0), ?)
                    ELSE last_fetched_at
                END,
                updated_at = ?
            WHERE id = ?
            RETURNING consecutive_failures
        "#,
        )
        .bind(error)
        .bind(Self::FAILURE_THRESHOLD)
        .bind(now)
        .bind(now)
        .bind(feed_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(result.0)
    }
}
