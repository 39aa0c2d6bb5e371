use std::time::Duration;

use thiserror::Error;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::Config;
use crate::feed::fetch_feed;
use crate::storage::{DatabaseError, Feed};

use super::ingest::{ingest, IngestReport};
use super::FeedGateway;

const MIN_INTERVAL: Duration = Duration::from_secs(1);

const BUDGET_EXCEEDED: &str = "Time budget exceeded before the feed was fetched";

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Invalid interval {input:?}: {reason}")]
    InvalidInterval { input: String, reason: String },
}

/// Parse a `time_between_reqs` value such as `30s`, `1m` or `1h30m`.
///
/// # Errors
///
/// [`SchedulerError::InvalidInterval`] when the string is not a duration or
/// is shorter than one second.
pub fn parse_interval(input: &str) -> Result<Duration, SchedulerError> {
    let interval = humantime::parse_duration(input.trim()).map_err(|e| {
        SchedulerError::InvalidInterval {
            input: input.to_string(),
            reason: e.to_string(),
        }
    })?;

    if interval < MIN_INTERVAL {
        return Err(SchedulerError::InvalidInterval {
            input: input.to_string(),
            reason: "must be at least 1s".to_string(),
        });
    }
    Ok(interval)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSettings {
    /// Time between ticks
    pub interval: Duration,
    /// Bound on a single HTTP fetch
    pub fetch_timeout: Duration,
    /// Bound on fetch plus ingest for one feed
    pub feed_budget: Duration,
}

impl SchedulerSettings {
    /// Both bounds are at least one second, and the budget never undercuts
    /// the fetch timeout.
    pub fn from_config(config: &Config, interval: Duration) -> Self {
        let fetch_timeout_secs = config.fetch_timeout_secs.max(1);
        let feed_budget_secs = config.feed_budget_secs.max(fetch_timeout_secs);
        if feed_budget_secs != config.feed_budget_secs
            || fetch_timeout_secs != config.fetch_timeout_secs
        {
            tracing::warn!(
                fetch_timeout_secs,
                feed_budget_secs,
                "Adjusted fetch_timeout_secs/feed_budget_secs from config"
            );
        }
        Self {
            interval,
            fetch_timeout: Duration::from_secs(fetch_timeout_secs),
            feed_budget: Duration::from_secs(feed_budget_secs),
        }
    }
}

/// What a single tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// No feeds are registered
    NoFeeds,
    /// The fetch failed; `failures` is the feed's consecutive failure count
    FetchFailed {
        feed_id: i64,
        failures: i64,
        error: String,
    },
    Ingested { feed_id: i64, report: IngestReport },
    /// Fetch plus ingest ran past the per-feed budget
    BudgetExceeded { feed_id: i64 },
    /// A storage call failed without losing the connection; the tick was dropped
    StorageError { message: String },
}

/// Sequential fetch loop: one feed per tick, stalest first.
pub struct Scheduler<G> {
    gateway: G,
    client: reqwest::Client,
    settings: SchedulerSettings,
}

impl<G: FeedGateway> Scheduler<G> {
    pub fn new(gateway: G, client: reqwest::Client, settings: SchedulerSettings) -> Self {
        Self {
            gateway,
            client,
            settings,
        }
    }

    /// Tick forever. The first tick fires immediately; a slow tick delays the
    /// next one instead of causing a burst.
    ///
    /// Returns only when the database connection is lost.
    pub async fn run(&self) -> Result<(), DatabaseError> {
        let mut ticker = tokio::time::interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            interval = %humantime::format_duration(self.settings.interval),
            "Collecting feeds"
        );

        loop {
            ticker.tick().await;
            self.tick().await?;
        }
    }

    /// Fetch and ingest the feed that has waited longest.
    ///
    /// The fetch and the ingest share one `feed_budget` deadline. Running out
    /// of budget before the feed is marked counts as a failed fetch, so a
    /// hanging feed backs off like any other failing one.
    pub async fn tick(&self) -> Result<TickOutcome, DatabaseError> {
        let feed = match self.gateway.next_feed_to_fetch().await {
            Ok(Some(feed)) => feed,
            Ok(None) => {
                tracing::debug!("No feeds to fetch");
                return Ok(TickOutcome::NoFeeds);
            }
            Err(e) => return storage_error(e, "select next feed"),
        };
        let deadline = Instant::now() + self.settings.feed_budget;

        tracing::debug!(feed_id = feed.id, url = %feed.url, "Fetching feed");
        let fetched = tokio::time::timeout_at(
            deadline,
            fetch_feed(&self.client, &feed.url, self.settings.fetch_timeout),
        )
        .await;

        let doc = match fetched {
            Ok(Ok(doc)) => doc,
            Ok(Err(fetch_err)) => {
                let error = fetch_err.to_string();
                let failures = match self.gateway.record_fetch_failure(feed.id, &error).await {
                    Ok(failures) => failures,
                    Err(e) => return storage_error(e, "record fetch failure"),
                };
                tracing::warn!(
                    feed_id = feed.id,
                    url = %feed.url,
                    failures,
                    error = %error,
                    "Failed to fetch feed"
                );
                return Ok(TickOutcome::FetchFailed {
                    feed_id: feed.id,
                    failures,
                    error,
                });
            }
            Err(_) => {
                let failures = match self
                    .gateway
                    .record_fetch_failure(feed.id, BUDGET_EXCEEDED)
                    .await
                {
                    Ok(failures) => failures,
                    Err(e) => return storage_error(e, "record fetch failure"),
                };
                self.warn_budget_exceeded(&feed, Some(failures));
                return Ok(TickOutcome::BudgetExceeded { feed_id: feed.id });
            }
        };

        if let Err(e) = self.gateway.mark_feed_fetched(feed.id).await {
            return storage_error(e, "mark feed fetched");
        }

        // Already marked: an ingest cut short resumes on the next poll
        let report = match tokio::time::timeout_at(deadline, ingest(&self.gateway, &feed, &doc)).await
        {
            Ok(report) => report?,
            Err(_) => {
                self.warn_budget_exceeded(&feed, None);
                return Ok(TickOutcome::BudgetExceeded { feed_id: feed.id });
            }
        };
        tracing::info!(
            feed = %feed.name,
            items = doc.items.len(),
            created = report.created,
            skipped = report.skipped(),
            failed = report.failed,
            "Feed collected"
        );

        Ok(TickOutcome::Ingested {
            feed_id: feed.id,
            report,
        })
    }

    fn warn_budget_exceeded(&self, feed: &Feed, failures: Option<i64>) {
        tracing::warn!(
            feed_id = feed.id,
            url = %feed.url,
            budget_ms = self.settings.feed_budget.as_millis() as u64,
            failures,
            "Feed exceeded its time budget"
        );
    }
}

/// Lost connections stop the loop; anything else only drops this tick.
fn storage_error(e: DatabaseError, operation: &str) -> Result<TickOutcome, DatabaseError> {
    if e.is_connection_lost() {
        tracing::error!(operation, error = %e, "Database connection lost");
        return Err(e);
    }
    tracing::error!(operation, error = %e, "Storage error, skipping tick");
    Ok(TickOutcome::StorageError {
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::build_client;
    use crate::storage::{NewPost, PostInsert};
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    #[test]
    fn test_parse_interval() {
        assert_eq!(parse_interval("1s").unwrap(), Duration::from_secs(1));
        assert_eq!(parse_interval("1m").unwrap(), Duration::from_secs(60));
        assert_eq!(parse_interval("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_interval(" 10s ").unwrap(), Duration::from_secs(10));
    }

    #[test]
    fn test_parse_interval_rejects_invalid() {
        for input in ["", "soon", "10", "-1s"] {
            assert!(
                matches!(
                    parse_interval(input),
                    Err(SchedulerError::InvalidInterval { .. })
                ),
                "{:?} should be rejected",
                input
            );
        }
    }

    #[test]
    fn test_parse_interval_rejects_sub_second() {
        let err = parse_interval("500ms").unwrap_err();
        assert!(err.to_string().contains("at least 1s"));
    }

    #[test]
    fn test_settings_from_config() {
        let config = Config::default();
        let settings = SchedulerSettings::from_config(&config, Duration::from_secs(60));
        assert_eq!(settings.interval, Duration::from_secs(60));
        assert_eq!(settings.fetch_timeout, Duration::from_secs(30));
        assert_eq!(settings.feed_budget, Duration::from_secs(120));
    }

    #[test]
    fn test_settings_budget_never_below_fetch_timeout() {
        let config = Config {
            fetch_timeout_secs: 30,
            feed_budget_secs: 5,
            ..Config::default()
        };
        let settings = SchedulerSettings::from_config(&config, Duration::from_secs(60));
        assert_eq!(settings.feed_budget, Duration::from_secs(30));

        let zeros = Config {
            fetch_timeout_secs: 0,
            feed_budget_secs: 0,
            ..Config::default()
        };
        let settings = SchedulerSettings::from_config(&zeros, Duration::from_secs(60));
        assert_eq!(settings.fetch_timeout, Duration::from_secs(1));
        assert_eq!(settings.feed_budget, Duration::from_secs(1));
    }

    /// Gateway whose selection step fails with a configurable error.
    struct BrokenGateway {
        lost: bool,
        selections: Mutex<usize>,
    }

    impl FeedGateway for BrokenGateway {
        async fn next_feed_to_fetch(&self) -> Result<Option<Feed>, DatabaseError> {
            *self.selections.lock().unwrap() += 1;
            if self.lost {
                Err(DatabaseError::ConnectionLost(sqlx::Error::PoolTimedOut))
            } else {
                Err(DatabaseError::Other(sqlx::Error::RowNotFound))
            }
        }

        async fn mark_feed_fetched(&self, _feed_id: i64) -> Result<(), DatabaseError> {
            Ok(())
        }

        async fn record_fetch_failure(
            &self,
            _feed_id: i64,
            _error: &str,
        ) -> Result<i64, DatabaseError> {
            Ok(1)
        }

        async fn create_post(&self, _post: &NewPost) -> Result<PostInsert, DatabaseError> {
            Ok(PostInsert::Duplicate)
        }
    }

    fn scheduler(lost: bool) -> Scheduler<BrokenGateway> {
        Scheduler::new(
            BrokenGateway {
                lost,
                selections: Mutex::new(0),
            },
            build_client("gator", Duration::from_secs(1)).unwrap(),
            SchedulerSettings {
                interval: Duration::from_secs(1),
                fetch_timeout: Duration::from_secs(1),
                feed_budget: Duration::from_secs(5),
            },
        )
    }

    #[tokio::test]
    async fn test_tick_survives_statement_error() {
        let scheduler = scheduler(false);
        let outcome = scheduler.tick().await.unwrap();
        assert!(matches!(outcome, TickOutcome::StorageError { .. }));
    }

    #[tokio::test]
    async fn test_run_stops_on_connection_loss() {
        let scheduler = scheduler(true);
        let err = scheduler.run().await.unwrap_err();
        assert!(err.is_connection_lost());
        assert_eq!(*scheduler.gateway.selections.lock().unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_keeps_ticking_after_storage_errors() {
        let scheduler = scheduler(false);
        let result =
            tokio::time::timeout(Duration::from_millis(3500), scheduler.run()).await;

        assert!(result.is_err(), "run should still be looping");
        // Immediate first tick plus one per elapsed second
        assert_eq!(*scheduler.gateway.selections.lock().unwrap(), 4);
    }
}
