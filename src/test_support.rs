//! Shared fixtures for unit tests.

use std::collections::HashMap;

use async_trait::async_trait;
use tempfile::TempDir;

use crate::app::App;
use crate::config::Config;
use crate::db::Repository;
use crate::error::{FetchError, Result};
use crate::feed::{FeedSource, RssFeed, RssItem};

/// Serves canned feeds by URL; anything else is a 404.
#[derive(Default, Clone)]
pub struct StaticSource {
    feeds: HashMap<String, RssFeed>,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_feed(mut self, url: &str, feed: RssFeed) -> Self {
        self.feeds.insert(url.to_string(), feed);
        self
    }
}

#[async_trait]
impl FeedSource for StaticSource {
    async fn fetch_feed(&self, url: &str) -> Result<RssFeed> {
        self.feeds.get(url).cloned().ok_or_else(|| {
            FetchError::Status {
                url: url.to_string(),
                status: reqwest::StatusCode::NOT_FOUND,
            }
            .into()
        })
    }
}

pub fn item(title: &str, link: &str, pub_date: &str) -> RssItem {
    RssItem {
        title: title.to_string(),
        link: Some(link.to_string()),
        description: None,
        pub_date: Some(pub_date.to_string()),
    }
}

/// An app over an in-memory database, with its config file in a temp dir.
/// Keep the returned [`TempDir`] alive for the duration of the test.
pub async fn test_app(source: StaticSource) -> (App, TempDir) {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("config.toml");
    let config = Config {
        db_url: ":memory:".to_string(),
        current_user_name: None,
        request_timeout_secs: 5,
    };
    config.save(&config_path).unwrap();

    let repository = Repository::open_in_memory().await.unwrap();
    let app = App::from_parts(config, config_path, repository, Box::new(source));
    (app, dir)
}
