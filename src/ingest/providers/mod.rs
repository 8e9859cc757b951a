pub mod rss_feed;

pub use rss_feed::RssFeedProvider;

use crate::config::FeedConfig;
use crate::ingest::types::NewsSource;

/// One provider per configured feed.
pub fn from_feeds(feeds: &[FeedConfig]) -> Vec<Box<dyn NewsSource>> {
    feeds
        .iter()
        .map(|f| Box::new(RssFeedProvider::from_config(f)) as Box<dyn NewsSource>)
        .collect()
}
