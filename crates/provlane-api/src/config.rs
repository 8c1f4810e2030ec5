//! Server configuration
//!
//! Defaults are overridden by `PROVLANE_*` environment variables (after
//! loading `.env`), which are in turn overridden by command-line flags.

use anyhow::{Context, Result};
use provlane_types::constants::DEFAULT_OBSERVATION_DISPLAY_CAP;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Configuration for the live distribution server
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// Listen port
    pub port: u16,
    /// Maximum events kept per session for late subscribers
    pub backlog_capacity: usize,
    /// Frames buffered per client before it is disconnected
    pub client_queue_capacity: usize,
    /// A stream with no traffic for this long is closed
    pub client_idle_timeout: Duration,
    /// How long closed sessions are kept before being swept
    pub session_retention: Duration,
    /// Interval of the retention sweep
    pub gc_interval: Duration,
    /// Observation display cap on derived nodes, in characters
    pub observation_cap: usize,
    /// Where proof-of-work artifacts of closed sessions are written
    pub proof_of_work_dir: Option<PathBuf>,
}

impl ServerConfig {
    pub fn new() -> Self {
        Self {
            port: 3000,
            backlog_capacity: 10_000,
            client_queue_capacity: 256,
            client_idle_timeout: Duration::from_secs(300),
            session_retention: Duration::from_secs(3600),
            gc_interval: Duration::from_secs(60),
            observation_cap: DEFAULT_OBSERVATION_DISPLAY_CAP,
            proof_of_work_dir: Some(PathBuf::from("output")),
        }
    }

    /// Load from the environment on top of the defaults.
    ///
    /// Recognized: `PORT`, `PROVLANE_PORT`, `PROVLANE_BACKLOG_CAPACITY`,
    /// `PROVLANE_CLIENT_QUEUE_CAPACITY`, `PROVLANE_CLIENT_IDLE_TIMEOUT_SECS`,
    /// `PROVLANE_SESSION_RETENTION_SECS`, `PROVLANE_GC_INTERVAL_SECS`,
    /// `PROVLANE_OBSERVATION_CAP` and `PROVLANE_PROOF_OF_WORK_DIR`
    /// (empty disables artifact writing).
    pub fn from_env() -> Result<Self> {
        let mut config = Self::new();

        if let Some(port) = env_parse::<u16>("PORT")? {
            config.port = port;
        }
        if let Some(port) = env_parse::<u16>("PROVLANE_PORT")? {
            config.port = port;
        }
        if let Some(capacity) = env_parse("PROVLANE_BACKLOG_CAPACITY")? {
            config.backlog_capacity = capacity;
        }
        if let Some(capacity) = env_parse("PROVLANE_CLIENT_QUEUE_CAPACITY")? {
            config.client_queue_capacity = capacity;
        }
        if let Some(secs) = env_parse("PROVLANE_CLIENT_IDLE_TIMEOUT_SECS")? {
            config.client_idle_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse("PROVLANE_SESSION_RETENTION_SECS")? {
            config.session_retention = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse("PROVLANE_GC_INTERVAL_SECS")? {
            config.gc_interval = Duration::from_secs(secs);
        }
        if let Some(cap) = env_parse("PROVLANE_OBSERVATION_CAP")? {
            config.observation_cap = cap;
        }
        if let Ok(dir) = std::env::var("PROVLANE_PROOF_OF_WORK_DIR") {
            config.proof_of_work_dir = if dir.trim().is_empty() {
                None
            } else {
                Some(PathBuf::from(dir))
            };
        }

        Ok(config)
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_backlog_capacity(mut self, capacity: usize) -> Self {
        self.backlog_capacity = capacity;
        self
    }

    /// Set the per-client queue size; zero is raised to one
    pub fn with_client_queue_capacity(mut self, capacity: usize) -> Self {
        self.client_queue_capacity = capacity.max(1);
        self
    }

    pub fn with_client_idle_timeout(mut self, timeout: Duration) -> Self {
        self.client_idle_timeout = timeout;
        self
    }

    pub fn with_session_retention(mut self, retention: Duration) -> Self {
        self.session_retention = retention;
        self
    }

    pub fn with_gc_interval(mut self, interval: Duration) -> Self {
        self.gc_interval = interval;
        self
    }

    pub fn with_observation_cap(mut self, cap: usize) -> Self {
        self.observation_cap = cap;
        self
    }

    pub fn with_proof_of_work_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.proof_of_work_dir = dir;
        self
    }

    pub fn bind_address(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("Invalid value for {name}: {value}")),
        _ => Ok(None),
    }
}
