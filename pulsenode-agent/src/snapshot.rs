//! Status snapshot and the system probe behind it
//!
//! The snapshot is the wire payload published on every cycle: identity,
//! uptime, current rate, link details, runtime stats and the static system
//! descriptors collected once per cycle.

use chrono::Utc;
use serde::Serialize;
use sysinfo::{Disks, System};

/// Descriptors that do not change while the agent runs. Collected once per
/// cycle, not per publish.
#[derive(Debug, Clone, Serialize)]
pub struct SystemDescriptors {
    pub sysname: String,
    pub release: String,
    pub version: String,
    pub machine: String,
    pub hostname: String,
    #[serde(rename = "uniqueId")]
    pub unique_id: String,
}

/// Per-publish runtime readings.
#[derive(Debug, Clone, Serialize)]
pub struct RuntimeStats {
    /// Free memory in bytes.
    pub free_ram: u64,
    /// Identifier of the storage backing the root filesystem.
    pub storage_id: String,
    /// CPU frequency in MHz.
    pub cpu_freq: u64,
}

/// Point-in-time status record. Built fresh each publish cycle, immutable
/// once built, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub client_id: String,
    /// Milliseconds on the wrapping tick counter since cycle start.
    pub uptime: u64,
    pub ip: String,
    /// Publish interval in force when the snapshot was built.
    pub rate: u32,
    pub ts: String,
    /// Link signal level in dBm when the link reports one.
    pub rssi: Option<i64>,
    pub stats: RuntimeStats,
    pub system: SystemDescriptors,
}

impl StatusSnapshot {
    pub fn timestamp_now() -> String {
        Utc::now().to_rfc3339()
    }
}

/// System-info collaborator. `stats` may refresh its sampler before
/// reading, the memory-reclaim analog of the original hardware agent.
pub trait SystemProbe {
    fn descriptors(&mut self) -> SystemDescriptors;
    fn stats(&mut self) -> RuntimeStats;
}

/// Probe backed by `sysinfo`.
pub struct HostProbe {
    sys: System,
    unique_id: String,
    storage_id: String,
}

impl HostProbe {
    pub fn new(unique_id: &str) -> Self {
        Self {
            sys: System::new(),
            unique_id: unique_id.to_string(),
            storage_id: root_storage_id(),
        }
    }
}

impl SystemProbe for HostProbe {
    fn descriptors(&mut self) -> SystemDescriptors {
        SystemDescriptors {
            sysname: System::name().unwrap_or_else(|| std::env::consts::OS.to_string()),
            release: System::kernel_version().unwrap_or_else(|| "unknown".to_string()),
            version: System::os_version().unwrap_or_else(|| "unknown".to_string()),
            machine: std::env::consts::ARCH.to_string(),
            hostname: gethostname::gethostname().to_string_lossy().to_string(),
            unique_id: self.unique_id.clone(),
        }
    }

    fn stats(&mut self) -> RuntimeStats {
        // Refresh before reading so the free-memory figure is current.
        self.sys.refresh_memory();
        self.sys.refresh_cpu_frequency();

        let cpu_freq = self.sys.cpus().first().map(|c| c.frequency()).unwrap_or(0);

        RuntimeStats {
            free_ram: self.sys.available_memory(),
            storage_id: self.storage_id.clone(),
            cpu_freq,
        }
    }
}

/// Name of the disk backing `/`, or the first listed disk as fallback.
fn root_storage_id() -> String {
    let disks = Disks::new_with_refreshed_list();
    let root = std::path::Path::new("/");
    disks
        .iter()
        .find(|d| d.mount_point() == root)
        .or_else(|| disks.iter().next())
        .map(|d| d.name().to_string_lossy().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}
