use async_trait::async_trait;

use crate::app::App;
use crate::error::{AuthError, Result};
use crate::models::User;

use super::command::{Command, Usage};
use super::registry::CommandHandler;

/// A handler that acts on behalf of the current user.
#[async_trait]
pub trait AuthedHandler: Send + Sync {
    fn usage(&self) -> Usage;

    async fn execute(&self, app: &mut App, cmd: &Command, user: User) -> Result<()>;
}

/// Resolves the user named in the config before delegating to `H`.
pub struct LoggedIn<H> {
    inner: H,
}

impl<H> LoggedIn<H> {
    pub fn new(inner: H) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<H: AuthedHandler> CommandHandler for LoggedIn<H> {
    async fn execute(&self, app: &mut App, cmd: &Command) -> Result<()> {
        self.inner.usage().check(cmd)?;
        let user = current_user(app).await?;
        self.inner.execute(app, cmd, user).await
    }
}

pub async fn current_user(app: &App) -> Result<User> {
    let name = app.current_user_name().ok_or(AuthError::NoCurrentUser)?;
    let user = app
        .repository
        .get_user(name)
        .await?
        .ok_or_else(|| AuthError::UserNotFound(name.to_string()))?;
    Ok(user)
}
