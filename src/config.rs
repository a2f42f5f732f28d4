//! Server Configuration

use crate::{DEFAULT_HOST, DEFAULT_PORT, DEFAULT_SNAPSHOT_PATH};
use std::path::PathBuf;

/// Startup parameters for [`Server`](crate::server::Server).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// File used by `SAVE` and `LOAD`.
    pub snapshot_path: PathBuf,
    /// Restore the snapshot file, if present, before accepting clients.
    pub load_on_startup: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            snapshot_path: PathBuf::from(DEFAULT_SNAPSHOT_PATH),
            load_on_startup: true,
        }
    }
}

impl Config {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
