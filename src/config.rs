use std::net::SocketAddr;

use clap::Parser;

/// Process settings. Every flag falls back to an environment variable, which
/// `.env` may provide.
#[derive(Debug, Clone, Parser)]
#[command(name = "roomchat", version, about = "Multi-room chat")]
pub struct Config {
    /// SQLite connection string
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://roomchat.db?mode=rwc")]
    pub database_url: String,

    /// Address the web server listens on
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8080")]
    pub bind: SocketAddr,

    #[arg(long, env = "MAX_CONNECTIONS", default_value_t = 16)]
    pub max_connections: u32,

    /// Minutes of inactivity before a session expires
    #[arg(long, env = "SESSION_IDLE_MINUTES", default_value_t = 60)]
    pub session_idle_minutes: i64,
}

impl Config {
    pub fn session_idle(&self) -> time::Duration {
        time::Duration::minutes(self.session_idle_minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let config = Config::try_parse_from([
            "roomchat",
            "--database-url",
            "sqlite::memory:",
            "--bind",
            "127.0.0.1:9000",
            "--session-idle-minutes",
            "5",
        ])
        .unwrap();

        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.bind.port(), 9000);
        assert_eq!(config.session_idle(), time::Duration::minutes(5));
    }
}
