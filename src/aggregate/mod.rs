//! Feed aggregation: pick the stalest feed, fetch it, store what's new, repeat.
//!
//! Control flows one way: [`run_scheduler`] drives [`Pipeline::run_cycle`],
//! which uses [`select_next_feed`], the [`FeedFetcher`](crate::feed::FeedFetcher)
//! and [`normalize_published`](crate::feed::normalize_published) against a
//! [`FeedStore`](crate::storage::FeedStore).

mod pipeline;
mod scheduler;
mod selector;

pub use pipeline::{CycleOutcome, CycleReport, Pipeline};
pub use scheduler::{
    run_scheduler, shutdown_channel, CycleRunner, SchedulerSummary, Shutdown, ShutdownTrigger,
};
pub use selector::{select_next_feed, SelectError};
