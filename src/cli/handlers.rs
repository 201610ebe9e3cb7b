use async_trait::async_trait;
use url::Url;

use crate::app::App;
use crate::error::{AppError, AuthError, Result};
use crate::feed::scrape_feeds;
use crate::models::{Post, User};

use super::command::{Command, Usage};
use super::middleware::AuthedHandler;
use super::registry::CommandHandler;

const DEFAULT_BROWSE_LIMIT: usize = 2;

pub struct Login;
pub struct Register;
pub struct Reset;
pub struct Users;
pub struct Agg;
pub struct AddFeed;
pub struct Feeds;
pub struct Follow;
pub struct Following;
pub struct Unfollow;
pub struct Browse;

impl Login {
    const USAGE: Usage = Usage::exactly(1, "<username>");
}

#[async_trait]
impl CommandHandler for Login {
    async fn execute(&self, app: &mut App, cmd: &Command) -> Result<()> {
        Self::USAGE.check(cmd)?;
        let name = &cmd.args[0];

        if app.repository.get_user(name).await?.is_none() {
            return Err(AuthError::UserNotFound(name.clone()).into());
        }
        app.set_current_user(name)?;

        println!("{} has been set as the current user", name);
        Ok(())
    }
}

impl Register {
    const USAGE: Usage = Usage::exactly(1, "<username>");
}

#[async_trait]
impl CommandHandler for Register {
    async fn execute(&self, app: &mut App, cmd: &Command) -> Result<()> {
        Self::USAGE.check(cmd)?;

        let user = app.repository.create_user(&cmd.args[0]).await?;
        app.set_current_user(&user.name)?;

        tracing::info!("Registered user {} ({})", user.name, user.id);
        println!("User {} has been created and set as the current user", user.name);
        Ok(())
    }
}

impl Reset {
    const USAGE: Usage = Usage::exactly(0, "");
}

#[async_trait]
impl CommandHandler for Reset {
    async fn execute(&self, app: &mut App, cmd: &Command) -> Result<()> {
        Self::USAGE.check(cmd)?;

        let deleted = app.repository.delete_all_users().await?;

        tracing::info!("Reset removed {} users", deleted);
        println!("All users have been deleted");
        Ok(())
    }
}

impl Users {
    const USAGE: Usage = Usage::exactly(0, "");
}

#[async_trait]
impl CommandHandler for Users {
    async fn execute(&self, app: &mut App, cmd: &Command) -> Result<()> {
        Self::USAGE.check(cmd)?;

        for user in app.repository.get_users().await? {
            if app.current_user_name() == Some(user.name.as_str()) {
                println!("* {} (current)", user.name);
            } else {
                println!("* {}", user.name);
            }
        }
        Ok(())
    }
}

impl Agg {
    const USAGE: Usage = Usage::exactly(1, "<single|continuous>");
}

#[async_trait]
impl CommandHandler for Agg {
    async fn execute(&self, app: &mut App, cmd: &Command) -> Result<()> {
        Self::USAGE.check(cmd)?;

        match cmd.args[0].as_str() {
            "single" => scrape_feeds(&app.repository, app.fetcher.as_ref()).await,
            "continuous" => {
                tracing::warn!("Continuous aggregation requested but not supported");
                println!("Continuous mode not implemented yet");
                Ok(())
            }
            _ => Err(Self::USAGE.error(cmd)),
        }
    }
}

#[async_trait]
impl AuthedHandler for AddFeed {
    fn usage(&self) -> Usage {
        Usage::exactly(2, "<name> <url>")
    }

    async fn execute(&self, app: &mut App, cmd: &Command, user: User) -> Result<()> {
        let name = &cmd.args[0];
        let url = validate_feed_url(&cmd.args[1])?;

        let feed = app.repository.create_feed(name, &url, user.id).await?;
        app.repository.create_feed_follow(user.id, feed.id).await?;

        println!("Feed has been created:");
        println!("* Name: {}", feed.name);
        println!("* URL: {}", feed.url);
        println!("* Owner: {}", user.name);
        Ok(())
    }
}

impl Feeds {
    const USAGE: Usage = Usage::exactly(0, "");
}

#[async_trait]
impl CommandHandler for Feeds {
    async fn execute(&self, app: &mut App, cmd: &Command) -> Result<()> {
        Self::USAGE.check(cmd)?;

        let feeds = app.repository.get_feeds().await?;
        if feeds.is_empty() {
            println!("No feeds registered");
        }
        for listing in feeds {
            println!(
                "* {} ({}) added by {}",
                listing.feed.name, listing.feed.url, listing.user_name
            );
        }
        Ok(())
    }
}

#[async_trait]
impl AuthedHandler for Follow {
    fn usage(&self) -> Usage {
        Usage::exactly(1, "<feed-url>")
    }

    async fn execute(&self, app: &mut App, cmd: &Command, user: User) -> Result<()> {
        let url = &cmd.args[0];
        let feed = app
            .repository
            .get_feed_by_url(url)
            .await?
            .ok_or_else(|| AppError::FeedNotFound(url.clone()))?;

        let follow = app.repository.create_feed_follow(user.id, feed.id).await?;

        println!(
            "User {} is now following feed {}",
            follow.user_name, follow.feed_name
        );
        Ok(())
    }
}

#[async_trait]
impl AuthedHandler for Following {
    fn usage(&self) -> Usage {
        Usage::exactly(0, "")
    }

    async fn execute(&self, app: &mut App, _cmd: &Command, user: User) -> Result<()> {
        let follows = app.repository.get_feed_follows_for_user(user.id).await?;
        if follows.is_empty() {
            println!("User {} is not following any feeds", user.name);
        }
        for follow in follows {
            println!("* {}", follow.feed_name);
        }
        Ok(())
    }
}

#[async_trait]
impl AuthedHandler for Unfollow {
    fn usage(&self) -> Usage {
        Usage::exactly(1, "<feed-url>")
    }

    async fn execute(&self, app: &mut App, cmd: &Command, user: User) -> Result<()> {
        let url = &cmd.args[0];
        let feed = app
            .repository
            .get_feed_by_url(url)
            .await?
            .ok_or_else(|| AppError::FeedNotFound(url.clone()))?;

        if app.repository.delete_feed_follow(user.id, feed.id).await? {
            println!("User {} has unfollowed feed {}", user.name, feed.name);
        } else {
            println!("User {} was not following feed {}", user.name, feed.name);
        }
        Ok(())
    }
}

impl Browse {
    /// Newest posts from the user's followed feeds, `[limit]` defaulting to two.
    async fn select_posts(app: &App, cmd: &Command, user: &User) -> Result<Vec<Post>> {
        let limit = match cmd.args.first() {
            Some(raw) => raw.parse::<usize>().map_err(|e| {
                AppError::InvalidArgument(format!("limit {:?}: {}", raw, e))
            })?,
            None => DEFAULT_BROWSE_LIMIT,
        };

        app.repository.get_posts_for_user(user.id, limit).await
    }
}

#[async_trait]
impl AuthedHandler for Browse {
    fn usage(&self) -> Usage {
        Usage::at_most(1, "[limit]")
    }

    async fn execute(&self, app: &mut App, cmd: &Command, user: User) -> Result<()> {
        let posts = Self::select_posts(app, cmd, &user).await?;

        for post in posts {
            println!("* Title: {}", post.title);
            println!("* Url: {}", post.url);
            println!("* Description: {}", post.description.unwrap_or_default());
            println!("* Published At: {}", post.published_at.to_rfc2822());
            println!();
        }
        Ok(())
    }
}

fn validate_feed_url(raw: &str) -> Result<String> {
    let url = Url::parse(raw)
        .map_err(|e| AppError::InvalidArgument(format!("feed url {:?}: {}", raw, e)))?;

    match url.scheme() {
        "http" | "https" => Ok(raw.to_string()),
        scheme => Err(AppError::InvalidArgument(format!(
            "feed url {:?}: unsupported scheme {}",
            raw, scheme
        ))),
    }
}
