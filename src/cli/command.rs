use std::ffi::OsString;
use std::fmt;
use std::str::FromStr;

use crate::error::{AppError, Result};

/// One CLI invocation: `<program> <name> [args...]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub name: String,
    pub args: Vec<String>,
}

impl Command {
    pub fn new(name: &str, args: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// Builds a command from raw process arguments, skipping the program name.
    pub fn from_args<I>(args: I) -> Option<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut args = args.into_iter().skip(1);
        let name = args.next()?;
        Some(Self {
            name,
            args: args.collect(),
        })
    }

    /// Like [`Command::from_args`], but rejects arguments that are not valid UTF-8.
    pub fn from_os_args<I>(args: I) -> Result<Option<Self>>
    where
        I: IntoIterator<Item = OsString>,
    {
        let args = args
            .into_iter()
            .map(|arg| {
                arg.into_string().map_err(|raw| {
                    AppError::InvalidArgument(format!("non UTF-8 argument {:?}", raw))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::from_args(args))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Login,
    Register,
    Reset,
    Users,
    Agg,
    AddFeed,
    Feeds,
    Follow,
    Following,
    Unfollow,
    Browse,
}

impl CommandKind {
    pub const ALL: [CommandKind; 11] = [
        CommandKind::Login,
        CommandKind::Register,
        CommandKind::Reset,
        CommandKind::Users,
        CommandKind::Agg,
        CommandKind::AddFeed,
        CommandKind::Feeds,
        CommandKind::Follow,
        CommandKind::Following,
        CommandKind::Unfollow,
        CommandKind::Browse,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::Login => "login",
            CommandKind::Register => "register",
            CommandKind::Reset => "reset",
            CommandKind::Users => "users",
            CommandKind::Agg => "agg",
            CommandKind::AddFeed => "addfeed",
            CommandKind::Feeds => "feeds",
            CommandKind::Follow => "follow",
            CommandKind::Following => "following",
            CommandKind::Unfollow => "unfollow",
            CommandKind::Browse => "browse",
        }
    }
}

impl FromStr for CommandKind {
    type Err = AppError;

    fn from_str(name: &str) -> Result<Self> {
        CommandKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == name)
            .ok_or_else(|| AppError::CommandNotFound(name.to_string()))
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exactly(usize),
    AtMost(usize),
}

impl Arity {
    fn accepts(&self, count: usize) -> bool {
        match *self {
            Arity::Exactly(n) => count == n,
            Arity::AtMost(n) => count <= n,
        }
    }
}

/// Argument contract of a handler, e.g. `<name> <url>` with exactly two args.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Usage {
    pub syntax: &'static str,
    pub arity: Arity,
}

impl Usage {
    pub const fn exactly(count: usize, syntax: &'static str) -> Self {
        Self {
            syntax,
            arity: Arity::Exactly(count),
        }
    }

    pub const fn at_most(count: usize, syntax: &'static str) -> Self {
        Self {
            syntax,
            arity: Arity::AtMost(count),
        }
    }

    pub fn check(&self, cmd: &Command) -> Result<()> {
        if self.arity.accepts(cmd.args.len()) {
            Ok(())
        } else {
            Err(self.error(cmd))
        }
    }

    pub fn error(&self, cmd: &Command) -> AppError {
        let line = format!("{} {}", cmd.name, self.syntax);
        AppError::Usage(line.trim_end().to_string())
    }
}
