mod command;
mod handlers;
mod middleware;
mod registry;

pub use command::Command;
pub use registry::CommandRegistry;
