use chrono::{DateTime, Utc};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database errors, split by whether the storage layer is still reachable.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// The pool can no longer hand out working connections
    #[error("Lost connection to the database: {0}")]
    ConnectionLost(#[source] sqlx::Error),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Any other failure of a single statement
    #[error("Database error: {0}")]
    Other(#[source] sqlx::Error),
}

impl DatabaseError {
    /// Classify a sqlx error by whether it indicates connectivity loss.
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
            | sqlx::Error::Io(_) => DatabaseError::ConnectionLost(err),
            other => DatabaseError::Other(other),
        }
    }

    /// True when the error means no further statement can succeed.
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, DatabaseError::ConnectionLost(_))
    }
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        Self::from_sqlx(err)
    }
}

/// Current time as Unix milliseconds, the unit of every stored timestamp.
pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn millis_to_datetime(millis: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
}

// ============================================================================
// Data Structures
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Feed row as seen by the scheduler.
///
/// `last_fetched_at` is `None` until the first successful fetch and only ever
/// moves forward afterwards.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Feed {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub user_id: i64,
    pub last_fetched_at: Option<i64>,
    pub last_error: Option<String>,
    /// Number of consecutive fetch failures (reset on success)
    pub consecutive_failures: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Feed joined with the name of the user who added it (`feeds` command).
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FeedListing {
    pub name: String,
    pub url: String,
    pub owner_name: String,
    pub last_fetched_at: Option<i64>,
    pub last_error: Option<String>,
    pub consecutive_failures: i64,
}

impl FeedListing {
    pub fn last_fetched(&self) -> Option<DateTime<Utc>> {
        self.last_fetched_at.and_then(millis_to_datetime)
    }
}

/// A follow relation with both sides resolved to names.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct FollowedFeed {
    pub id: i64,
    pub user_id: i64,
    pub feed_id: i64,
    pub user_name: String,
    pub feed_name: String,
    pub created_at: i64,
}

/// Candidate post built by the ingestion pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPost {
    pub feed_id: i64,
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    pub published_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    pub published_at: i64,
    pub feed_id: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Post {
    pub fn published(&self) -> Option<DateTime<Utc>> {
        millis_to_datetime(self.published_at)
    }
}

/// Post together with the name of the feed it came from (`browse` command).
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FeedPost {
    #[sqlx(flatten)]
    pub post: Post,
    pub feed_name: String,
}

/// Outcome of an insert-if-absent on the post URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostInsert {
    Created(Post),
    /// A post with this URL already exists; nothing was written
    Duplicate,
}
