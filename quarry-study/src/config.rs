use clap::{Parser, ValueEnum};
use quarry_core::{FlushMode, SessionOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FlushModeArg {
    /// Flush queued inserts before every query
    Auto,
    /// Flush only on commit
    Commit,
}

impl From<FlushModeArg> for FlushMode {
    fn from(arg: FlushModeArg) -> Self {
        match arg {
            FlushModeArg::Auto => FlushMode::Auto,
            FlushModeArg::Commit => FlushMode::Commit,
        }
    }
}

#[derive(Debug, Clone, Parser)]
#[command(name = "quarry-study")]
#[command(about = "Runs the Member/Team study queries and prints their results", long_about = None)]
pub struct StudyConfig {
    /// SQLite database URL
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite::memory:")]
    pub database_url: String,
    /// Pool size for file databases (in-memory databases always use one connection)
    #[arg(long, env = "QUARRY_MAX_CONNECTIONS", default_value_t = 5)]
    pub max_connections: u32,
    #[arg(long, value_enum, default_value_t = FlushModeArg::Auto)]
    pub flush_mode: FlushModeArg,
    /// Filter directive for tracing, e.g. `info` or `quarry_core=debug`
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,
}

impl StudyConfig {
    /// Reads `.env` if present, then the command line.
    pub fn load() -> Self {
        dotenvy::dotenv().ok();
        Self::parse()
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            flush_mode: self.flush_mode.into(),
        }
    }
}
