mod app;
mod cli;
mod config;
mod db;
mod error;
mod feed;
mod models;

#[cfg(test)]
mod test_support;

use app::App;
use cli::{Command, CommandRegistry};
use config::Config;
use error::Result;

#[tokio::main]
async fn main() {
    // Initialize logging (only show warnings and errors by default)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cmd = match Command::from_os_args(std::env::args_os()) {
        Ok(Some(cmd)) => cmd,
        Ok(None) => {
            eprintln!("usage: gator <command> [args...]");
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(cmd).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cmd: Command) -> Result<()> {
    let config_path = Config::config_path();
    let config = Config::load(&config_path)?;

    let mut app = App::new(config, config_path).await?;
    let registry = CommandRegistry::standard();

    registry.run(&mut app, &cmd).await
}
