use chrono::Utc;

use super::selector::{select_next_feed, SelectError};
use crate::feed::{normalize_published, FeedEntry, FeedFetcher};
use crate::storage::{Feed, FeedStore, InsertOutcome, NewPost};

/// How a cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Nothing registered; the cycle did nothing
    NoFeeds,
    /// The store failed while choosing a feed
    SelectFailed,
    /// The fetch slot could not be recorded, so the feed was not fetched
    TouchFailed,
    /// The feed could not be retrieved or decoded
    FetchFailed,
    /// The document was fetched and every entry was attempted
    Ingested,
}

/// Outcome of one [`Pipeline::run_cycle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub outcome: CycleOutcome,
    /// The feed the cycle worked on, if one was selected
    pub feed: Option<Feed>,
    /// Channel title of the fetched document
    pub channel_title: Option<String>,
    pub seen: usize,
    pub stored: usize,
    pub duplicates: usize,
    pub failed: usize,
}

impl CycleReport {
    fn new(outcome: CycleOutcome, feed: Option<Feed>) -> Self {
        Self {
            outcome,
            feed,
            channel_title: None,
            seen: 0,
            stored: 0,
            duplicates: 0,
            failed: 0,
        }
    }
}

/// One feed per cycle: select, mark, fetch, store new entries.
///
/// The pipeline owns no scheduling state. Everything it needs to pick the
/// next feed lives in the store, so any number of cycles can be run back to
/// back, by the scheduler or by hand.
pub struct Pipeline<S> {
    store: S,
    fetcher: FeedFetcher,
}

impl<S: FeedStore> Pipeline<S> {
    pub fn new(store: S, fetcher: FeedFetcher) -> Self {
        Self { store, fetcher }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run one ingestion cycle.
    ///
    /// Never fails: every problem is logged, reflected in the report, and
    /// confined to the narrowest scope it affects (one entry, one feed).
    ///
    /// The feed's `last_fetched_at` is advanced *before* the fetch, so a feed
    /// that always fails still yields its turn to the others.
    pub async fn run_cycle(&self) -> CycleReport {
        let feed = match select_next_feed(&self.store).await {
            Ok(feed) => feed,
            Err(SelectError::NoFeeds) => {
                tracing::info!("No feeds to aggregate");
                return CycleReport::new(CycleOutcome::NoFeeds, None);
            }
            Err(SelectError::Store(e)) => {
                tracing::warn!(error = %e, "Failed to select next feed");
                return CycleReport::new(CycleOutcome::SelectFailed, None);
            }
        };

        if let Err(e) = self.store.touch_feed_fetched_at(feed.id, Utc::now()).await {
            tracing::warn!(
                feed_id = feed.id,
                feed = %feed.name,
                error = %e,
                "Failed to mark feed as fetched, skipping"
            );
            return CycleReport::new(CycleOutcome::TouchFailed, Some(feed));
        }

        tracing::info!(feed_id = feed.id, feed = %feed.name, url = %feed.url, "Fetching feed");

        let document = match self.fetcher.fetch(&feed.url).await {
            Ok(document) => document,
            Err(e) => {
                tracing::warn!(
                    feed_id = feed.id,
                    url = %feed.url,
                    error = %e,
                    "Failed to fetch feed"
                );
                return CycleReport::new(CycleOutcome::FetchFailed, Some(feed));
            }
        };

        let mut report = CycleReport::new(CycleOutcome::Ingested, None);
        report.channel_title = Some(document.title);
        for entry in document.entries {
            report.seen += 1;
            self.ingest_entry(&feed, entry, &mut report).await;
        }

        tracing::info!(
            feed_id = feed.id,
            channel = report.channel_title.as_deref().unwrap_or_default(),
            seen = report.seen,
            stored = report.stored,
            duplicates = report.duplicates,
            failed = report.failed,
            "Aggregated feed"
        );

        report.feed = Some(feed);
        report
    }

    async fn ingest_entry(&self, feed: &Feed, entry: FeedEntry, report: &mut CycleReport) {
        let published_at = normalize_published(&entry.published);
        if published_at.is_none() && !entry.published.trim().is_empty() {
            tracing::debug!(raw = %entry.published, link = %entry.link, "Unrecognized publish date");
        }

        let post = NewPost {
            feed_id: feed.id,
            url: entry.link,
            title: entry.title,
            description: Some(entry.description).filter(|d| !d.is_empty()),
            published_at,
            created_at: Utc::now(),
        };

        match self.store.insert_post_if_absent(&post).await {
            Ok(InsertOutcome::Created(id)) => {
                tracing::debug!(post_id = id, title = %post.title, "Stored post");
                report.stored += 1;
            }
            Ok(InsertOutcome::Duplicate) => {
                tracing::debug!(url = %post.url, "Post already stored");
                report.duplicates += 1;
            }
            Err(e) => {
                tracing::warn!(
                    feed_id = feed.id,
                    url = %post.url,
                    error = %e,
                    "Failed to store post"
                );
                report.failed += 1;
            }
        }
    }
}
