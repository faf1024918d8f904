use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to the feeds configuration file
    #[arg(short, long, env = "NEWS_CONFIG", default_value = "feeds.toml")]
    pub config: String,

    /// SQLite connection string
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "sqlite:news_aggregator.db?mode=rwc"
    )]
    pub database_url: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Serve the HTTP API and refresh feeds in the background (default)
    Serve,
    /// Run a single aggregation pass and exit
    Scrape,
}

impl Cli {
    pub fn command(&self) -> Command {
        self.command.unwrap_or(Command::Serve)
    }
}
