//! Status Report for `INFO`
//!
//! The processor asks a [`HostIntrospection`] source for process-level
//! figures and combines them with the store's own counters.

use crate::connection::ConnectionStats;
use crate::storage::StorageStats;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use sysinfo::{Pid, System};

/// Process and host facts surfaced by `INFO`.
pub trait HostIntrospection: Send {
    fn uptime(&self) -> Duration;

    /// Resident memory of the server process in bytes.
    fn resident_memory(&mut self) -> u64;

    fn connected_clients(&self) -> u64;

    fn os_version(&self) -> String;
}

/// Version of the compiler that built this binary.
pub const RUSTC_VERSION: &str = env!("LITEKV_RUSTC_VERSION");

/// Reads the running process through `sysinfo`.
pub struct ProcessHost {
    started: SystemTime,
    system: System,
    pid: Option<Pid>,
    stats: Arc<ConnectionStats>,
}

impl ProcessHost {
    pub fn new(stats: Arc<ConnectionStats>) -> Self {
        let mut system = System::new();
        let pid = sysinfo::get_current_pid().ok();

        // Falls back to now if the process table cannot be read.
        let started = pid
            .filter(|pid| system.refresh_process(*pid))
            .and_then(|pid| system.process(pid))
            .map(|process| UNIX_EPOCH + Duration::from_secs(process.start_time()))
            .unwrap_or_else(SystemTime::now);

        Self {
            started,
            system,
            pid,
            stats,
        }
    }
}

impl HostIntrospection for ProcessHost {
    fn uptime(&self) -> Duration {
        SystemTime::now()
            .duration_since(self.started)
            .unwrap_or_default()
    }

    fn resident_memory(&mut self) -> u64 {
        let Some(pid) = self.pid else {
            return 0;
        };
        self.system.refresh_process(pid);
        self.system.process(pid).map(|p| p.memory()).unwrap_or(0)
    }

    fn connected_clients(&self) -> u64 {
        self.stats.active_connections.load(Ordering::Relaxed)
    }

    fn os_version(&self) -> String {
        System::long_os_version().unwrap_or_else(|| std::env::consts::OS.to_string())
    }
}

/// Everything one `INFO` reply shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub version: &'static str,
    pub rust_version: &'static str,
    pub uptime_secs: u64,
    pub connected_clients: u64,
    pub used_memory: u64,
    pub storage: StorageStats,
    pub os: String,
}

impl StatusReport {
    pub fn collect(host: &mut dyn HostIntrospection, storage: StorageStats) -> Self {
        Self {
            version: crate::VERSION,
            rust_version: RUSTC_VERSION,
            uptime_secs: host.uptime().as_secs(),
            connected_clients: host.connected_clients(),
            used_memory: host.resident_memory(),
            storage,
            os: host.os_version(),
        }
    }

    /// Renders `key:value` lines grouped under `# Section` headers.
    pub fn render(&self) -> String {
        format!(
            "# Server\r\n\
             litekv_version:{}\r\n\
             rust_version:{}\r\n\
             uptime_in_seconds:{}\r\n\
             \r\n\
             # Clients\r\n\
             connected_clients:{}\r\n\
             \r\n\
             # Memory\r\n\
             used_memory:{}\r\n\
             used_memory_human:{:.2}M\r\n\
             \r\n\
             # Stats\r\n\
             get_ops:{}\r\n\
             set_ops:{}\r\n\
             del_ops:{}\r\n\
             expired_keys:{}\r\n\
             \r\n\
             # Keyspace\r\n\
             db0:keys={},expires={}\r\n\
             \r\n\
             # System\r\n\
             os:{}\r\n",
            self.version,
            self.rust_version,
            self.uptime_secs,
            self.connected_clients,
            self.used_memory,
            self.used_memory as f64 / (1024.0 * 1024.0),
            self.storage.get_ops,
            self.storage.set_ops,
            self.storage.del_ops,
            self.storage.expired,
            self.storage.keys,
            self.storage.expires,
            self.os,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_sections() {
        let report = StatusReport {
            version: "0.1.0",
            rust_version: "1.75",
            uptime_secs: 42,
            connected_clients: 3,
            used_memory: 2 * 1024 * 1024,
            storage: StorageStats {
                keys: 5,
                expires: 1,
                ..StorageStats::default()
            },
            os: "Linux".to_string(),
        };

        let text = report.render();
        assert!(text.starts_with("# Server\r\nlitekv_version:0.1.0\r\n"));
        assert!(text.contains("uptime_in_seconds:42\r\n"));
        assert!(text.contains("# Clients\r\nconnected_clients:3\r\n"));
        assert!(text.contains("used_memory:2097152\r\nused_memory_human:2.00M\r\n"));
        assert!(text.contains("db0:keys=5,expires=1\r\n"));
        assert!(text.ends_with("# System\r\nos:Linux\r\n"));
    }

    #[test]
    fn test_process_host_reads_connection_stats() {
        let stats = Arc::new(ConnectionStats::new());
        stats.connection_opened();
        stats.connection_opened();
        stats.connection_closed();

        let mut host = ProcessHost::new(Arc::clone(&stats));
        assert_eq!(host.connected_clients(), 1);
        assert!(!host.os_version().is_empty());
        assert!(host.resident_memory() > 0);
    }

    #[test]
    fn test_uptime_counts_from_process_start() {
        std::thread::sleep(Duration::from_millis(1100));

        let late = ProcessHost::new(Arc::new(ConnectionStats::new()));
        assert!(late.uptime() >= Duration::from_secs(1));
    }

    #[test]
    fn test_rust_version_is_the_building_compiler() {
        let parts: Vec<&str> = RUSTC_VERSION.split('.').collect();
        assert_eq!(parts.len(), 3, "unexpected version {RUSTC_VERSION}");
        assert!(parts[0].parse::<u32>().is_ok());
        assert!(parts[1].parse::<u32>().is_ok());
        assert_ne!(RUSTC_VERSION, env!("CARGO_PKG_RUST_VERSION"));

        let report = StatusReport::collect(
            &mut ProcessHost::new(Arc::new(ConnectionStats::new())),
            StorageStats::default(),
        );
        assert_eq!(report.rust_version, RUSTC_VERSION);
    }
}
