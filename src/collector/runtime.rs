//! Readings about the agent process itself from /proc/self.

use once_cell::sync::Lazy;
use std::fs;

/// Get system clock ticks per second (usually 100, but can vary).
fn get_clk_tck() -> f64 {
    #[cfg(unix)]
    {
        // SAFETY: sysconf is safe to call with _SC_CLK_TCK
        // Returns -1 on error, 0 if undefined - both are handled by the > 0 check
        unsafe {
            let tck = libc::sysconf(libc::_SC_CLK_TCK);
            if tck > 0 {
                return tck as f64;
            }
        }
    }
    100.0
}

/// System clock ticks per second (for CPU time calculation).
pub static CLK_TCK: Lazy<f64> = Lazy::new(get_clk_tck);

/// Memory and thread figures from /proc/self/status (bytes where applicable).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProcessStatus {
    pub vm_rss: Option<u64>,
    pub vm_size: Option<u64>,
    pub vm_peak: Option<u64>,
    pub vm_data: Option<u64>,
    pub vm_stk: Option<u64>,
    pub vm_swap: Option<u64>,
    pub threads: Option<u64>,
}

/// CPU time and fault counters from /proc/self/stat.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessStat {
    pub user_seconds: f64,
    pub system_seconds: f64,
    pub minor_faults: u64,
    pub major_faults: u64,
}

pub fn parse_status(content: &str) -> ProcessStatus {
    let mut status = ProcessStatus::default();

    for line in content.lines() {
        let Some((key, rest)) = line.split_once(':') else {
            continue;
        };
        let Some(number) = rest.split_whitespace().next().and_then(|v| v.parse::<u64>().ok())
        else {
            continue;
        };
        let kb = Some(number * 1024);

        match key {
            "VmRSS" => status.vm_rss = kb,
            "VmSize" => status.vm_size = kb,
            "VmPeak" => status.vm_peak = kb,
            "VmData" => status.vm_data = kb,
            "VmStk" => status.vm_stk = kb,
            "VmSwap" => status.vm_swap = kb,
            "Threads" => status.threads = Some(number),
            _ => {}
        }
    }

    status
}

/// Parses /proc/<pid>/stat. The command name may contain spaces, so fields
/// are counted from the closing parenthesis.
pub fn parse_stat(content: &str) -> Result<ProcessStat, String> {
    let after_comm = content
        .rfind(')')
        .map(|idx| &content[idx + 1..])
        .ok_or_else(|| "Invalid stat format: missing command name".to_string())?;
    let parts: Vec<&str> = after_comm.split_whitespace().collect();
    // parts[0] is the state (field 3); utime is field 14
    if parts.len() < 13 {
        return Err("Invalid stat format".to_string());
    }

    let number = |idx: usize| parts[idx].parse::<u64>().unwrap_or(0);
    Ok(ProcessStat {
        minor_faults: number(7),
        major_faults: number(9),
        user_seconds: number(11) as f64 / *CLK_TCK,
        system_seconds: number(12) as f64 / *CLK_TCK,
    })
}

pub fn read_status() -> Result<ProcessStatus, String> {
    fs::read_to_string("/proc/self/status")
        .map(|content| parse_status(&content))
        .map_err(|e| format!("Failed to read /proc/self/status: {}", e))
}

pub fn read_stat() -> Result<ProcessStat, String> {
    let content = fs::read_to_string("/proc/self/stat")
        .map_err(|e| format!("Failed to read /proc/self/stat: {}", e))?;
    parse_stat(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_status() {
        let status = parse_status(
            "Name:\tmetric-agent\nVmPeak:\t  2048 kB\nVmRSS:\t   512 kB\nThreads:\t7\n",
        );
        assert_eq!(status.vm_peak, Some(2048 * 1024));
        assert_eq!(status.vm_rss, Some(512 * 1024));
        assert_eq!(status.threads, Some(7));
        assert_eq!(status.vm_swap, None);
    }

    #[test]
    fn test_parse_stat_with_spaces_in_name() {
        let line = "4242 (metric agent) S 1 4242 4242 0 -1 4194560 120 0 3 0 250 50 0 0 20 0 8 0";
        let stat = parse_stat(line).unwrap();
        assert_eq!(stat.minor_faults, 120);
        assert_eq!(stat.major_faults, 3);
        assert!((stat.user_seconds - 250.0 / *CLK_TCK).abs() < 1e-9);
        assert!((stat.system_seconds - 50.0 / *CLK_TCK).abs() < 1e-9);
    }

    #[test]
    fn test_parse_stat_invalid() {
        assert!(parse_stat("garbage").is_err());
        assert!(parse_stat("1 (x) S 1 2").is_err());
    }
}
