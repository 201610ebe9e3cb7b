use std::path::PathBuf;
use std::time::Duration;

use crate::config::Config;
use crate::db::Repository;
use crate::error::Result;
use crate::feed::{FeedFetcher, FeedSource};

/// Everything a command handler can touch during one invocation.
pub struct App {
    pub config: Config,
    config_path: PathBuf,

    // Services
    pub repository: Repository,
    pub fetcher: Box<dyn FeedSource>,
}

impl App {
    pub async fn new(config: Config, config_path: PathBuf) -> Result<Self> {
        let repository = Repository::open(&config.db_url).await?;
        let fetcher = FeedFetcher::new(Duration::from_secs(config.request_timeout_secs))?;

        Ok(Self::from_parts(
            config,
            config_path,
            repository,
            Box::new(fetcher),
        ))
    }

    pub fn from_parts(
        config: Config,
        config_path: PathBuf,
        repository: Repository,
        fetcher: Box<dyn FeedSource>,
    ) -> Self {
        Self {
            config,
            config_path,
            repository,
            fetcher,
        }
    }

    pub fn current_user_name(&self) -> Option<&str> {
        self.config.current_user_name.as_deref()
    }

    /// Switches the current user and writes the config back to disk.
    pub fn set_current_user(&mut self, name: &str) -> Result<()> {
        self.config.current_user_name = Some(name.to_string());
        self.config.save(&self.config_path)?;
        tracing::debug!("Current user set to {}", name);
        Ok(())
    }
}
