//! Background aggregation: pick the stalest feed, fetch it, store its posts.
//!
//! [`Scheduler`] drives the loop; [`ingest`] turns one fetched document into
//! post inserts. Both talk to storage through [`FeedGateway`] so they can run
//! against an in-memory fake in tests.

mod ingest;
mod scheduler;

pub use ingest::{ingest, IngestReport};
pub use scheduler::{parse_interval, Scheduler, SchedulerError, SchedulerSettings, TickOutcome};

use std::future::Future;

use crate::storage::{Database, DatabaseError, Feed, NewPost, PostInsert};

/// The storage operations the aggregator needs.
pub trait FeedGateway: Send + Sync {
    fn next_feed_to_fetch(&self)
        -> impl Future<Output = Result<Option<Feed>, DatabaseError>> + Send;

    fn mark_feed_fetched(&self, feed_id: i64)
        -> impl Future<Output = Result<(), DatabaseError>> + Send;

    /// Returns the feed's consecutive failure count after recording.
    fn record_fetch_failure(
        &self,
        feed_id: i64,
        error: &str,
    ) -> impl Future<Output = Result<i64, DatabaseError>> + Send;

    fn create_post(
        &self,
        post: &NewPost,
    ) -> impl Future<Output = Result<PostInsert, DatabaseError>> + Send;
}

impl FeedGateway for Database {
    fn next_feed_to_fetch(
        &self,
    ) -> impl Future<Output = Result<Option<Feed>, DatabaseError>> + Send {
        Database::next_feed_to_fetch(self)
    }

    fn mark_feed_fetched(
        &self,
        feed_id: i64,
    ) -> impl Future<Output = Result<(), DatabaseError>> + Send {
        Database::mark_feed_fetched(self, feed_id)
    }

    fn record_fetch_failure(
        &self,
        feed_id: i64,
        error: &str,
    ) -> impl Future<Output = Result<i64, DatabaseError>> + Send {
        Database::record_fetch_failure(self, feed_id, error)
    }

    fn create_post(
        &self,
        post: &NewPost,
    ) -> impl Future<Output = Result<PostInsert, DatabaseError>> + Send {
        Database::create_post(self, post)
    }
}
