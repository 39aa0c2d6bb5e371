//! gator: a command-line RSS aggregator.
//!
//! Users register feeds and follow them; `agg` polls the feed that has waited
//! longest on a fixed interval and stores new posts in SQLite.

pub mod commands;
pub mod config;
pub mod feed;
pub mod scraper;
pub mod storage;
pub mod util;
