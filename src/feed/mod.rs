mod fetcher;
mod scraper;

pub use fetcher::{FeedFetcher, FeedSource, RssFeed, RssItem};
pub use scraper::scrape_feeds;
