//! Handlers for the CLI subcommands.
//!
//! Each handler writes its human-readable output to `out` so tests can
//! capture it; diagnostics go through `tracing` to stderr.
use anyhow::{bail, Context, Result};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::Config;
use crate::feed::build_client;
use crate::scraper::{Scheduler, SchedulerSettings};
use crate::storage::{Database, FeedPost, User};
use crate::util::validate_feed_url;

/// Default number of posts shown by `browse`.
pub const DEFAULT_BROWSE_LIMIT: i64 = 2;

const SEPARATOR: &str =
    "------------------------------------------------------------------------------";

/// Everything a command needs: the loaded config, where it lives, and the
/// open database.
pub struct Session {
    pub config: Config,
    pub config_path: PathBuf,
    pub db: Database,
}

impl Session {
    /// Load the config at `config_path` and open the database it points to.
    pub async fn open(config_path: PathBuf) -> Result<Self> {
        let config = Config::load(&config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
        let db_path = config.database_path(&config_path);
        let db = Database::open(&db_path.to_string_lossy())
            .await
            .with_context(|| format!("Failed to open database at {}", db_path.display()))?;
        Ok(Self {
            config,
            config_path,
            db,
        })
    }

    /// The logged-in user.
    ///
    /// Fails when nobody is logged in or the stored user no longer exists
    /// (e.g. after `reset`).
    pub async fn current_user(&self) -> Result<User> {
        let Some(name) = self.config.current_user_name.as_deref() else {
            bail!("Not logged in; run `gator register <name>` or `gator login <name>` first");
        };
        match self.db.get_user_by_name(name).await? {
            Some(user) => Ok(user),
            None => bail!("Current user {:?} no longer exists; log in again", name),
        }
    }

    fn switch_user(&mut self, name: &str) -> Result<()> {
        self.config.set_current_user(name);
        self.config
            .save(&self.config_path)
            .with_context(|| format!("Failed to save config to {}", self.config_path.display()))
    }

    // ========================================================================
    // Users
    // ========================================================================

    pub async fn register(&mut self, name: &str, out: &mut impl Write) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            bail!("User name must not be empty");
        }
        let Some(user) = self.db.create_user(name).await? else {
            bail!("User {:?} already exists", name);
        };
        self.switch_user(&user.name)?;
        tracing::info!(user = %user.name, "Registered user");
        writeln!(out, "User {} was created and logged in", user.name)?;
        Ok(())
    }

    pub async fn login(&mut self, name: &str, out: &mut impl Write) -> Result<()> {
        let Some(user) = self.db.get_user_by_name(name.trim()).await? else {
            bail!("User {:?} does not exist", name.trim());
        };
        self.switch_user(&user.name)?;
        writeln!(out, "Current user was set to: {}", user.name)?;
        Ok(())
    }

    /// Delete every user. Feeds, follows and posts go with them.
    pub async fn reset(&mut self, out: &mut impl Write) -> Result<()> {
        let deleted = self.db.reset_users().await?;
        tracing::info!(deleted, "Reset users");
        writeln!(out, "Deleted {} users and everything they owned", deleted)?;
        Ok(())
    }

    pub async fn users(&self, out: &mut impl Write) -> Result<()> {
        let current = self.config.current_user_name.as_deref();
        for user in self.db.list_users().await? {
            if Some(user.name.as_str()) == current {
                writeln!(out, "* {} (current)", user.name)?;
            } else {
                writeln!(out, "* {}", user.name)?;
            }
        }
        Ok(())
    }

    // ========================================================================
    // Feeds and follows
    // ========================================================================

    /// Register a feed owned by the current user and follow it.
    pub async fn add_feed(&mut self, name: &str, url: &str, out: &mut impl Write) -> Result<()> {
        let user = self.current_user().await?;
        let url = validate_feed_url(url)?;

        let Some(feed) = self.db.create_feed(name.trim(), url.as_str(), user.id).await? else {
            bail!("A feed with URL {} already exists; use `gator follow` instead", url);
        };
        self.db.create_feed_follow(user.id, feed.id).await?;

        tracing::info!(feed_id = feed.id, url = %feed.url, "Added feed");
        writeln!(out, "Added feed {} ({})", feed.name, feed.url)?;
        writeln!(out, "{} is now following {}", user.name, feed.name)?;
        Ok(())
    }

    pub async fn feeds(&self, out: &mut impl Write) -> Result<()> {
        let feeds = self.db.list_feeds_with_owners().await?;
        if feeds.is_empty() {
            writeln!(out, "No feeds were added yet")?;
            return Ok(());
        }

        for feed in feeds {
            writeln!(out, "{} ({}) added by {}", feed.name, feed.url, feed.owner_name)?;
            match (feed.last_fetched(), feed.last_error.as_deref()) {
                (_, Some(error)) => writeln!(
                    out,
                    "    last attempt failed ({} in a row): {}",
                    feed.consecutive_failures, error
                )?,
                (Some(at), None) => {
                    writeln!(out, "    last fetched {}", at.format("%Y-%m-%d %H:%M:%S UTC"))?
                }
                (None, None) => writeln!(out, "    never fetched")?,
            }
        }
        Ok(())
    }

    pub async fn follow(&mut self, url: &str, out: &mut impl Write) -> Result<()> {
        let user = self.current_user().await?;
        let url = validate_feed_url(url)?;
        let Some(feed) = self.db.get_feed_by_url(url.as_str()).await? else {
            bail!("No feed with URL {}; add it with `gator addfeed`", url);
        };

        match self.db.create_feed_follow(user.id, feed.id).await? {
            Some(follow) => writeln!(out, "{} is now following {}", follow.user_name, follow.feed_name)?,
            None => writeln!(out, "{} already follows {}", user.name, feed.name)?,
        }
        Ok(())
    }

    pub async fn following(&self, out: &mut impl Write) -> Result<()> {
        let user = self.current_user().await?;
        let follows = self.db.feed_follows_for_user(user.id).await?;
        if follows.is_empty() {
            writeln!(out, "{} is not following any feeds", user.name)?;
            return Ok(());
        }
        for follow in follows {
            writeln!(out, "* {}", follow.feed_name)?;
        }
        Ok(())
    }

    pub async fn unfollow(&mut self, url: &str, out: &mut impl Write) -> Result<()> {
        let user = self.current_user().await?;
        let url = validate_feed_url(url)?;
        let Some(feed) = self.db.get_feed_by_url(url.as_str()).await? else {
            bail!("No feed with URL {}", url);
        };

        if !self.db.delete_feed_follow(user.id, feed.id).await? {
            bail!("{} is not following {}", user.name, feed.name);
        }
        writeln!(out, "{} unfollowed {}", user.name, feed.name)?;
        Ok(())
    }

    // ========================================================================
    // Posts
    // ========================================================================

    /// Print the newest `limit` posts from the current user's feeds.
    pub async fn browse(&self, limit: i64, out: &mut impl Write) -> Result<()> {
        if limit < 1 {
            bail!("Limit must be at least 1");
        }
        let user = self.current_user().await?;
        let posts = self.db.posts_for_user(user.id, limit).await?;
        if posts.is_empty() {
            writeln!(out, "No posts yet; run `gator agg <interval>` to collect some")?;
            return Ok(());
        }
        for post in &posts {
            write_post(out, post)?;
        }
        Ok(())
    }

    // ========================================================================
    // Aggregation
    // ========================================================================

    /// Run the fetch loop every `interval` until Ctrl-C or a lost database
    /// connection.
    pub async fn agg(&self, interval: Duration, out: &mut impl Write) -> Result<()> {
        let settings = SchedulerSettings::from_config(&self.config, interval);
        let client = build_client(&self.config.user_agent, settings.fetch_timeout)
            .context("Failed to build HTTP client")?;
        let scheduler = Scheduler::new(self.db.clone(), client, settings);

        writeln!(
            out,
            "Collecting feeds every {}",
            humantime::format_duration(interval)
        )?;
        out.flush()?;

        tokio::select! {
            result = scheduler.run() => {
                result.context("Aggregation stopped")?;
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl-C")?;
                tracing::info!("Interrupted, stopping aggregation");
            }
        }
        Ok(())
    }
}

fn write_post(out: &mut impl Write, entry: &FeedPost) -> Result<()> {
    let post = &entry.post;
    writeln!(out, "Title: {}", post.title)?;
    writeln!(out, "Feed: {}", entry.feed_name)?;
    if let Some(published) = post.published() {
        writeln!(out, "Published at: {}", published.format("%a, %d %b %Y %H:%M:%S UTC"))?;
    }
    writeln!(out, "URL: {}", post.url)?;
    if let Some(description) = post.description.as_deref() {
        writeln!(out, "Description: {}", description)?;
    }
    writeln!(out, "{}", SEPARATOR)?;
    Ok(())
}
