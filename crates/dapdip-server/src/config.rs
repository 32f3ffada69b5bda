//! Server configuration loaded from environment variables.
//!
//! All settings have development defaults so the server starts with zero
//! configuration; override them in production (`DAPDIP_JWT_SECRET` above all).

use std::path::PathBuf;

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct Config {
    /// Interface to bind. Env: `DAPDIP_HOST`. Default: `0.0.0.0`
    pub host: String,

    /// Port to bind. Env: `DAPDIP_PORT`. Default: `3000`
    pub port: u16,

    /// SQLite database file. Env: `DAPDIP_DB_PATH`. Default: `dapdip.db`
    pub db_path: PathBuf,

    /// HS256 signing secret for session tokens. Env: `DAPDIP_JWT_SECRET`.
    /// Default: a development-only placeholder.
    pub jwt_secret: String,

    /// How often the stream janitor sweeps, in seconds.
    /// Env: `DAPDIP_JANITOR_INTERVAL_SECS`. Default: `300`
    pub janitor_interval_secs: u64,

    /// Streams live for longer than this many hours are force-ended.
    /// Env: `DAPDIP_MAX_STREAM_HOURS`. Default: `12`
    pub max_stream_hours: u32,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let port = std::env::var("DAPDIP_PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .context("DAPDIP_PORT must be a port number")?;

        let janitor_interval_secs = std::env::var("DAPDIP_JANITOR_INTERVAL_SECS")
            .unwrap_or_else(|_| "300".into())
            .parse()
            .context("DAPDIP_JANITOR_INTERVAL_SECS must be a number of seconds")?;

        let max_stream_hours = std::env::var("DAPDIP_MAX_STREAM_HOURS")
            .unwrap_or_else(|_| "12".into())
            .parse()
            .context("DAPDIP_MAX_STREAM_HOURS must be a number of hours")?;

        Ok(Self {
            host: std::env::var("DAPDIP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port,
            db_path: PathBuf::from(
                std::env::var("DAPDIP_DB_PATH").unwrap_or_else(|_| "dapdip.db".into()),
            ),
            jwt_secret: std::env::var("DAPDIP_JWT_SECRET")
                .unwrap_or_else(|_| "dev-secret-change-me".into()),
            janitor_interval_secs,
            max_stream_hours,
        })
    }
}
