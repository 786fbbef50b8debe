//! Advisory resource metrics
//!
//! Numbers here are informational only; nothing enforces limits on them.

use serde::{Deserialize, Serialize};
use sysinfo::{Disks, Pid, ProcessRefreshKind, ProcessesToUpdate, System};

/// Host metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostMetrics {
    /// CPU usage percentage (0-100)
    pub cpu_usage: f32,
    pub cpu_count: usize,

    pub memory_used: u64,
    pub memory_total: u64,

    /// Usage of the disk holding the platform's data
    pub disk_used: u64,
    pub disk_total: u64,

    pub uptime_secs: u64,
    pub hostname: String,
}

/// Collect host metrics
pub fn host_metrics() -> HostMetrics {
    let mut sys = System::new();
    sys.refresh_cpu_usage();
    sys.refresh_memory();

    let disks = Disks::new_with_refreshed_list();
    let (disk_used, disk_total) = disks.iter().fold((0u64, 0u64), |(used, total), disk| {
        (
            used + disk.total_space().saturating_sub(disk.available_space()),
            total + disk.total_space(),
        )
    });

    HostMetrics {
        cpu_usage: sys.global_cpu_usage(),
        cpu_count: sys.cpus().len(),
        memory_used: sys.used_memory(),
        memory_total: sys.total_memory(),
        disk_used,
        disk_total,
        uptime_secs: System::uptime(),
        hostname: System::host_name().unwrap_or_else(|| "unknown".to_string()),
    }
}

/// Metrics of one application process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessMetrics {
    pub pid: u32,

    /// CPU usage percentage; may exceed 100 on multi-core hosts
    pub cpu_usage: f32,

    /// Resident memory in bytes
    pub memory: u64,

    pub virtual_memory: u64,
    pub run_time_secs: u64,
}

/// Sample a process. CPU usage needs two refreshes, so this waits for
/// sysinfo's minimum update interval. Returns `None` if the process is gone.
pub async fn process_metrics(pid: u32) -> Option<ProcessMetrics> {
    let target = Pid::from_u32(pid);
    let pids = [target];
    let refresh = ProcessRefreshKind::nothing().with_cpu().with_memory();

    let mut sys = System::new();
    sys.refresh_processes_specifics(ProcessesToUpdate::Some(&pids), true, refresh);
    tokio::time::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL).await;
    sys.refresh_processes_specifics(ProcessesToUpdate::Some(&pids), true, refresh);

    let process = sys.process(target)?;
    Some(ProcessMetrics {
        pid,
        cpu_usage: process.cpu_usage(),
        memory: process.memory(),
        virtual_memory: process.virtual_memory(),
        run_time_secs: process.run_time(),
    })
}
