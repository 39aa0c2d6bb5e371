use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use gator::commands::{Session, DEFAULT_BROWSE_LIMIT};
use gator::config::Config;
use gator::scraper::parse_interval;

#[derive(Parser, Debug)]
#[command(name = "gator", version, about = "Command-line RSS aggregator")]
struct Args {
    /// Config file (default: ~/.config/gator/config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a user and log in as them
    Register { name: String },
    /// Switch to an existing user
    Login { name: String },
    /// Delete all users, feeds, follows and posts
    Reset,
    /// List users
    Users,
    /// Add a feed and follow it
    #[command(name = "addfeed")]
    AddFeed { name: String, url: String },
    /// List all feeds
    Feeds,
    /// Follow an existing feed by URL
    Follow { url: String },
    /// List the feeds you follow
    Following,
    /// Stop following a feed
    Unfollow { url: String },
    /// Show the newest posts from the feeds you follow
    Browse {
        #[arg(default_value_t = DEFAULT_BROWSE_LIMIT)]
        limit: i64,
    },
    /// Fetch feeds continuously, one per interval (e.g. 30s, 1m, 1h30m)
    Agg {
        #[arg(value_parser = parse_interval)]
        time_between_reqs: Duration,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so command output stays pipeable
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("gator=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config_path = args.config.unwrap_or_else(Config::default_path);
    let mut session = Session::open(config_path).await?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match args.command {
        Command::Register { name } => session.register(&name, &mut out).await,
        Command::Login { name } => session.login(&name, &mut out).await,
        Command::Reset => session.reset(&mut out).await,
        Command::Users => session.users(&mut out).await,
        Command::AddFeed { name, url } => session.add_feed(&name, &url, &mut out).await,
        Command::Feeds => session.feeds(&mut out).await,
        Command::Follow { url } => session.follow(&url, &mut out).await,
        Command::Following => session.following(&mut out).await,
        Command::Unfollow { url } => session.unfollow(&url, &mut out).await,
        Command::Browse { limit } => session.browse(limit, &mut out).await,
        Command::Agg { time_between_reqs } => session.agg(time_between_reqs, &mut out).await,
    }
}
