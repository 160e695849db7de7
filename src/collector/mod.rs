//! Point-in-time snapshot of runtime and host metrics.
//!
//! A [`Collector`] builds a complete [`Snapshot`] in a local map and hands it
//! out only once finished, so readers never observe a partial sample.
//! Unreadable /proc files are skipped with a debug log.

pub mod host;
pub mod runtime;

use std::collections::BTreeMap;
use tracing::{debug, instrument};

use crate::model::MetricValue;

use host::CpuStatsCache;

/// Metric name -> current reading.
pub type Snapshot = BTreeMap<String, MetricValue>;

/// Reads process and host counters on demand.
#[derive(Default)]
pub struct Collector {
    cpu_cache: CpuStatsCache,
}

fn put(snapshot: &mut Snapshot, name: &str, value: Option<f64>) {
    if let Some(v) = value {
        snapshot.insert(name.to_string(), MetricValue::Gauge(v));
    }
}

impl Collector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes one snapshot. Never fails; unavailable sources are omitted.
    #[instrument(skip(self))]
    pub fn sample(&self) -> Snapshot {
        let mut snapshot = Snapshot::new();

        match runtime::read_status() {
            Ok(status) => {
                let as_f64 = |v: Option<u64>| v.map(|n| n as f64);
                put(&mut snapshot, "VmRSS", as_f64(status.vm_rss));
                put(&mut snapshot, "VmSize", as_f64(status.vm_size));
                put(&mut snapshot, "VmPeak", as_f64(status.vm_peak));
                put(&mut snapshot, "VmData", as_f64(status.vm_data));
                put(&mut snapshot, "VmStk", as_f64(status.vm_stk));
                put(&mut snapshot, "VmSwap", as_f64(status.vm_swap));
                put(&mut snapshot, "Threads", as_f64(status.threads));
            }
            Err(e) => debug!("Skipping process status: {}", e),
        }

        match runtime::read_stat() {
            Ok(stat) => {
                put(&mut snapshot, "CPUTimeUser", Some(stat.user_seconds));
                put(&mut snapshot, "CPUTimeSystem", Some(stat.system_seconds));
                put(&mut snapshot, "MinorFaults", Some(stat.minor_faults as f64));
                put(&mut snapshot, "MajorFaults", Some(stat.major_faults as f64));
            }
            Err(e) => debug!("Skipping process stat: {}", e),
        }

        match host::read_memory_info() {
            Ok(mem) => {
                let as_f64 = |v: Option<u64>| v.map(|n| n as f64);
                put(&mut snapshot, "TotalMemory", as_f64(mem.total_bytes));
                put(&mut snapshot, "FreeMemory", as_f64(mem.free_bytes));
                put(&mut snapshot, "AvailableMemory", as_f64(mem.available_bytes));
                put(&mut snapshot, "CachedMemory", as_f64(mem.cached_bytes));
                put(&mut snapshot, "BuffersMemory", as_f64(mem.buffers_bytes));
                put(&mut snapshot, "SwapTotal", as_f64(mem.swap_total_bytes));
                put(&mut snapshot, "SwapFree", as_f64(mem.swap_free_bytes));
            }
            Err(e) => debug!("Skipping memory info: {}", e),
        }

        match host::read_load_average() {
            Ok(load) => {
                put(&mut snapshot, "Load1", Some(load.one_min));
                put(&mut snapshot, "Load5", Some(load.five_min));
                put(&mut snapshot, "Load15", Some(load.fifteen_min));
            }
            Err(e) => debug!("Skipping load average: {}", e),
        }

        match host::read_cpu_stats() {
            Ok(stats) => {
                for (core, usage) in self.cpu_cache.utilization(stats) {
                    put(&mut snapshot, &format!("CPUutilization{}", core + 1), Some(usage));
                }
            }
            Err(e) => debug!("Skipping cpu stats: {}", e),
        }

        debug!("Collected {} readings", snapshot.len());
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(target_os = "linux")]
    fn test_sample_on_linux() {
        let collector = Collector::new();
        let first = collector.sample();
        assert!(first.contains_key("VmRSS"), "missing VmRSS: {:?}", first.keys());
        assert!(first.contains_key("TotalMemory"));
        assert!(first.values().all(|v| matches!(v, MetricValue::Gauge(_))));
        // Utilization needs two samples
        assert!(!first.keys().any(|k| k.starts_with("CPUutilization")));
    }
}
