use anyhow::Result;

use super::schema::Database;
use super::types::{now_millis, DatabaseError, FeedPost, NewPost, Post, PostInsert};

/// Maximum number of posts returned by a single browse query
const MAX_BROWSE_LIMIT: i64 = 500;

impl Database {
    // ========================================================================
    // Post Operations
    // ========================================================================

    /// Insert a post unless one with the same URL already exists.
    ///
    /// The uniqueness check and the insert are a single statement, so two
    /// writers racing on the same URL still produce one row.
    pub async fn create_post(&self, post: &NewPost) -> Result<PostInsert, DatabaseError> {
        let now = now_millis();
        let published_at = post.published_at.timestamp_millis();
        let inserted: Option<(i64,)> = sqlx::query_as(
            r#"
            INSERT INTO posts (title, url, description, published_at, feed_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(url) DO NOTHING
            RETURNING id
        "#,
        )
        .bind(&post.title)
        .bind(&post.url)
        .bind(&post.description)
        .bind(published_at)
        .bind(post.feed_id)
        .bind(now)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match inserted {
            Some((id,)) => PostInsert::Created(Post {
                id,
                title: post.title.clone(),
                url: post.url.clone(),
                description: post.description.clone(),
                published_at,
                feed_id: post.feed_id,
                created_at: now,
                updated_at: now,
            }),
            None => PostInsert::Duplicate,
        })
    }

    /// Newest posts from the feeds a user follows.
    ///
    /// `limit` is capped at MAX_BROWSE_LIMIT.
    pub async fn posts_for_user(&self, user_id: i64, limit: i64) -> Result<Vec<FeedPost>> {
        let limit = limit.clamp(0, MAX_BROWSE_LIMIT);
        let posts = sqlx::query_as::<_, FeedPost>(
            r#"
            SELECT p.id, p.title, p.url, p.description, p.published_at, p.feed_id,
                   p.created_at, p.updated_at, f.name AS feed_name
            FROM posts p
            JOIN feeds f ON f.id = p.feed_id
            JOIN feed_follows ff ON ff.feed_id = p.feed_id
            WHERE ff.user_id = ?
            ORDER BY p.published_at DESC, p.id DESC
            LIMIT ?
        "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(posts)
    }

    /// All posts of one feed, newest first.
    pub async fn posts_for_feed(&self, feed_id: i64) -> Result<Vec<Post>> {
        let posts = sqlx::query_as::<_, Post>(
            r#"
            SELECT id, title, url, description, published_at, feed_id, created_at, updated_at
            FROM posts
            WHERE feed_id = ?
            ORDER BY published_at DESC, id DESC
        "#,
        )
        .bind(feed_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(posts)
    }

    pub async fn count_posts_for_feed(&self, feed_id: i64) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM posts WHERE feed_id = ?")
            .bind(feed_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::{Database, Feed, NewPost, PostInsert, User};
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    async fn setup() -> (Database, User, Feed) {
        let db = Database::open(":memory:").await.unwrap();
        let user = db.create_user("alice").await.unwrap().unwrap();
        let feed = db
            .create_feed("Boot.dev Blog", "https://blog.boot.dev/index.xml", user.id)
            .await
            .unwrap()
            .unwrap();
        (db, user, feed)
    }

    fn new_post(feed_id: i64, slug: &str, day: u32) -> NewPost {
        NewPost {
            feed_id,
            title: format!("Post {}", slug),
            url: format!("https://blog.boot.dev/{}", slug),
            description: Some("Summary".to_string()),
            published_at: Utc.with_ymd_and_hms(2024, 1, day, 12, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_create_post_then_duplicate() {
        let (db, _, feed) = setup().await;

        let first = db.create_post(&new_post(feed.id, "a", 1)).await.unwrap();
        let created = match first {
            PostInsert::Created(post) => post,
            PostInsert::Duplicate => panic!("First insert should create"),
        };
        assert_eq!(created.url, "https://blog.boot.dev/a");
        assert_eq!(
            created.published(),
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap())
        );

        // Same URL with different content is still a duplicate
        let mut changed = new_post(feed.id, "a", 2);
        changed.title = "Retitled".to_string();
        let second = db.create_post(&changed).await.unwrap();
        assert_eq!(second, PostInsert::Duplicate);

        let stored = db.posts_for_feed(feed.id).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].title, "Post a");
    }

    #[tokio::test]
    async fn test_create_post_unknown_feed_is_other_error() {
        let (db, _, _) = setup().await;

        let err = db.create_post(&new_post(9_999, "orphan", 1)).await.unwrap_err();
        assert!(
            !err.is_connection_lost(),
            "Foreign key violations are per-item failures, got {:?}",
            err
        );
    }

    #[tokio::test]
    async fn test_posts_for_user_only_followed_newest_first() {
        let (db, user, feed) = setup().await;
        let other = db
            .create_feed("Other", "https://other.example.com/rss", user.id)
            .await
            .unwrap()
            .unwrap();
        db.create_feed_follow(user.id, feed.id).await.unwrap().unwrap();

        for (slug, day) in [("old", 1), ("new", 3), ("mid", 2)] {
            db.create_post(&new_post(feed.id, slug, day)).await.unwrap();
        }
        db.create_post(&NewPost {
            url: "https://other.example.com/x".to_string(),
            ..new_post(other.id, "x", 4)
        })
        .await
        .unwrap();

        let posts = db.posts_for_user(user.id, 10).await.unwrap();
        let titles: Vec<&str> = posts.iter().map(|p| p.post.title.as_str()).collect();
        assert_eq!(titles, vec!["Post new", "Post mid", "Post old"]);
        assert!(posts.iter().all(|p| p.feed_name == "Boot.dev Blog"));

        let limited = db.posts_for_user(user.id, 2).await.unwrap();
        assert_eq!(limited.len(), 2);
    }
}
