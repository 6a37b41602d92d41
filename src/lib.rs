//! gator: a command-line RSS aggregator.
//!
//! Users register feeds; `gator agg <interval>` then polls them one at a
//! time, stalest first, and stores every entry it has not seen before.
//!
//! - [`storage`] - SQLite persistence and the [`storage::FeedStore`] seam
//! - [`feed`] - HTTP retrieval, RSS decoding and date normalization
//! - [`aggregate`] - feed selection, the ingestion pipeline and the scheduler
//! - [`config`] - the TOML config file and interval parsing
//! - [`commands`] - handlers behind the CLI subcommands

pub mod aggregate;
pub mod commands;
pub mod config;
pub mod feed;
pub mod storage;
pub mod util;
