//! Host-wide readings from the /proc filesystem.
//!
//! This module reads load average, memory and per-core CPU counters.
//! Parsing is split from file access so the formats can be tested directly.

use ahash::AHashMap as HashMap;
use std::fs;
use std::sync::Mutex;

/// System load averages for 1, 5, and 15 minute intervals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadAverage {
    pub one_min: f64,
    pub five_min: f64,
    pub fifteen_min: f64,
}

/// Host memory counters in bytes. Fields missing from /proc/meminfo stay `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MemoryInfo {
    pub total_bytes: Option<u64>,
    pub free_bytes: Option<u64>,
    pub available_bytes: Option<u64>,
    pub cached_bytes: Option<u64>,
    pub buffers_bytes: Option<u64>,
    pub swap_total_bytes: Option<u64>,
    pub swap_free_bytes: Option<u64>,
}

/// CPU time counters of one /proc/stat line, in clock ticks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CpuStat {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
}

impl CpuStat {
    pub fn total(&self) -> u64 {
        self.user
            + self.nice
            + self.system
            + self.idle
            + self.iowait
            + self.irq
            + self.softirq
            + self.steal
    }

    /// Non-active time (idle + iowait).
    pub fn idle_total(&self) -> u64 {
        self.idle + self.iowait
    }
}

/// Parses the content of /proc/loadavg, e.g. "0.00 0.01 0.05 1/234 5678".
pub fn parse_load_average(content: &str) -> Result<LoadAverage, String> {
    let parts: Vec<&str> = content.split_whitespace().collect();
    if parts.len() < 3 {
        return Err(format!(
            "Invalid /proc/loadavg format: expected at least 3 fields, got {}",
            parts.len()
        ));
    }

    let field = |idx: usize, label: &str| {
        parts[idx]
            .parse::<f64>()
            .map_err(|e| format!("Failed to parse {} load average: {}", label, e))
    };

    Ok(LoadAverage {
        one_min: field(0, "1min")?,
        five_min: field(1, "5min")?,
        fifteen_min: field(2, "15min")?,
    })
}

pub fn read_load_average() -> Result<LoadAverage, String> {
    let content = fs::read_to_string("/proc/loadavg")
        .map_err(|e| format!("Failed to read /proc/loadavg: {}", e))?;
    parse_load_average(&content)
}

/// Parses /proc/meminfo. Values are reported in kB and converted to bytes.
pub fn parse_memory_info(content: &str) -> MemoryInfo {
    let mut info = MemoryInfo::default();

    for line in content.lines() {
        let mut parts = line.split_whitespace();
        let (Some(key), Some(value)) = (parts.next(), parts.next()) else {
            continue;
        };
        let Ok(kb) = value.parse::<u64>() else {
            continue;
        };
        let bytes = Some(kb * 1024);

        match key {
            "MemTotal:" => info.total_bytes = bytes,
            "MemFree:" => info.free_bytes = bytes,
            "MemAvailable:" => info.available_bytes = bytes,
            "Cached:" => info.cached_bytes = bytes,
            "Buffers:" => info.buffers_bytes = bytes,
            "SwapTotal:" => info.swap_total_bytes = bytes,
            "SwapFree:" => info.swap_free_bytes = bytes,
            _ => {}
        }
    }

    info
}

pub fn read_memory_info() -> Result<MemoryInfo, String> {
    let content = fs::read_to_string("/proc/meminfo")
        .map_err(|e| format!("Failed to read /proc/meminfo: {}", e))?;
    Ok(parse_memory_info(&content))
}

/// Parses the per-core lines of /proc/stat ("cpu0", "cpu1", ...).
///
/// The aggregate "cpu" line is skipped.
pub fn parse_cpu_stats(content: &str) -> HashMap<usize, CpuStat> {
    let mut stats = HashMap::new();

    for line in content.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 8 {
            continue;
        }
        let Some(index) = parts[0].strip_prefix("cpu") else {
            continue;
        };
        if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
            continue;
        }
        let Ok(core) = index.parse::<usize>() else {
            continue;
        };

        let field = |idx: usize| parts.get(idx).and_then(|v| v.parse::<u64>().ok()).unwrap_or(0);
        stats.insert(
            core,
            CpuStat {
                user: field(1),
                nice: field(2),
                system: field(3),
                idle: field(4),
                iowait: field(5),
                irq: field(6),
                softirq: field(7),
                steal: field(8),
            },
        );
    }

    stats
}

pub fn read_cpu_stats() -> Result<HashMap<usize, CpuStat>, String> {
    let content = fs::read_to_string("/proc/stat")
        .map_err(|e| format!("Failed to read /proc/stat: {}", e))?;
    let stats = parse_cpu_stats(&content);
    if stats.is_empty() {
        return Err("No CPU statistics found in /proc/stat".to_string());
    }
    Ok(stats)
}

/// Keeps the previous /proc/stat sample to turn tick counters into utilization.
#[derive(Default)]
pub struct CpuStatsCache {
    previous: Mutex<Option<HashMap<usize, CpuStat>>>,
}

impl CpuStatsCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Utilization (percent, 0..=100) per core since the previous call.
    ///
    /// The first call only primes the cache and returns an empty map.
    pub fn utilization(&self, current: HashMap<usize, CpuStat>) -> HashMap<usize, f64> {
        let mut usage = HashMap::new();
        let Ok(mut previous) = self.previous.lock() else {
            return usage;
        };

        if let Some(prev_stats) = previous.as_ref() {
            for (core, now) in &current {
                let Some(before) = prev_stats.get(core) else {
                    continue;
                };
                let delta_total = now.total().saturating_sub(before.total());
                let delta_idle = now.idle_total().saturating_sub(before.idle_total());
                if delta_total > 0 {
                    let active = delta_total.saturating_sub(delta_idle);
                    usage.insert(*core, active as f64 / delta_total as f64 * 100.0);
                }
            }
        }

        *previous = Some(current);
        usage
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_load_average() {
        let load = parse_load_average("0.52 0.58 0.59 2/1190 12345").unwrap();
        assert!((load.one_min - 0.52).abs() < 0.001);
        assert!((load.five_min - 0.58).abs() < 0.001);
        assert!((load.fifteen_min - 0.59).abs() < 0.001);
    }

    #[test]
    fn test_parse_load_average_invalid() {
        assert!(parse_load_average("0.52 0.58").is_err());
        assert!(parse_load_average("abc def ghi 1/2 3").is_err());
    }

    #[test]
    fn test_parse_memory_info_partial() {
        let info = parse_memory_info(
            "MemTotal:       16318480 kB\nMemFree:         1022356 kB\nBogus line\nSwapTotal: 0 kB\n",
        );
        assert_eq!(info.total_bytes, Some(16318480 * 1024));
        assert_eq!(info.free_bytes, Some(1022356 * 1024));
        assert_eq!(info.swap_total_bytes, Some(0));
        assert_eq!(info.available_bytes, None);
    }

    #[test]
    fn test_cpu_utilization_from_deltas() {
        let before = "cpu  10 0 10 80 0 0 0 0\ncpu0 10 0 10 80 0 0 0 0\n";
        let after = "cpu  40 0 20 140 0 0 0 0\ncpu0 40 0 20 140 0 0 0 0\n";

        let cache = CpuStatsCache::new();
        assert!(cache.utilization(parse_cpu_stats(before)).is_empty());

        let usage = cache.utilization(parse_cpu_stats(after));
        // 40 active ticks out of 100
        assert!((usage[&0] - 40.0).abs() < 1e-9);
        assert_eq!(usage.len(), 1);
    }

    #[test]
    fn test_parse_cpu_stats_skips_aggregate() {
        let content = "cpu  1000 0 500 9000 0 0 0 0 0 0\n\
                       cpu0 600 0 300 4500 0 0 0 0 0 0\n\
                       cpu1 400 0 200 4500 0 0 0 0 0 0\n\
                       cpuX 1 0 1 1 0 0 0 0\n\
                       intr 12345 0 0 0 0 0 0 0\n";
        let stats = parse_cpu_stats(content);

        let mut cores: Vec<usize> = stats.keys().copied().collect();
        cores.sort_unstable();
        assert_eq!(cores, vec![0, 1]);
        assert_eq!(stats[&0].user, 600);
        assert_eq!(stats[&1].idle, 4500);
    }
}
