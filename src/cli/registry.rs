use std::collections::HashMap;

use async_trait::async_trait;

use crate::app::App;
use crate::error::{AppError, Result};

use super::command::{Command, CommandKind};
use super::handlers::{
    AddFeed, Agg, Browse, Feeds, Follow, Following, Login, Register, Reset, Unfollow, Users,
};
use super::middleware::LoggedIn;

/// A command implementation. Handlers validate their own arguments.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn execute(&self, app: &mut App, cmd: &Command) -> Result<()>;
}

#[derive(Default)]
pub struct CommandRegistry {
    handlers: HashMap<CommandKind, Box<dyn CommandHandler>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The full command set; feed and browsing commands require a logged-in user.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(CommandKind::Login, Login);
        registry.register(CommandKind::Register, Register);
        registry.register(CommandKind::Reset, Reset);
        registry.register(CommandKind::Users, Users);
        registry.register(CommandKind::Agg, Agg);
        registry.register(CommandKind::AddFeed, LoggedIn::new(AddFeed));
        registry.register(CommandKind::Feeds, Feeds);
        registry.register(CommandKind::Follow, LoggedIn::new(Follow));
        registry.register(CommandKind::Following, LoggedIn::new(Following));
        registry.register(CommandKind::Unfollow, LoggedIn::new(Unfollow));
        registry.register(CommandKind::Browse, LoggedIn::new(Browse));
        registry
    }

    /// Installs `handler` for `kind`, replacing any previous one.
    pub fn register<H>(&mut self, kind: CommandKind, handler: H)
    where
        H: CommandHandler + 'static,
    {
        self.handlers.insert(kind, Box::new(handler));
    }

    pub async fn run(&self, app: &mut App, cmd: &Command) -> Result<()> {
        let kind: CommandKind = cmd.name.parse()?;
        let handler = self
            .handlers
            .get(&kind)
            .ok_or_else(|| AppError::CommandNotFound(cmd.name.clone()))?;

        tracing::debug!("Running {} with {} args", kind, cmd.args.len());
        handler.execute(app, cmd).await
    }
}
