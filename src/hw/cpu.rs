use super::CpuSampler;
use std::fs;
use tracing::warn;

/// Whole-system CPU sampler backed by `/proc/stat` deltas.
///
/// The first call establishes the baseline and returns `None`; every later
/// call returns busy-time over total-time for the interval since the
/// previous call.
pub struct ProcStatSampler {
    path: String,
    last: Option<CpuTimes>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CpuTimes {
    busy: u64,
    total: u64,
}

impl ProcStatSampler {
    pub fn new() -> Self {
        Self::with_path("/proc/stat")
    }

    pub fn with_path<S: Into<String>>(path: S) -> Self {
        Self {
            path: path.into(),
            last: None,
        }
    }

    fn read_times(&self) -> Option<CpuTimes> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) => {
                warn!("Failed to read {}: {}", self.path, e);
                return None;
            }
        };
        parse_cpu_line(&contents)
    }
}

impl Default for ProcStatSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuSampler for ProcStatSampler {
    fn sample(&mut self) -> Option<f32> {
        let now = self.read_times()?;
        let prev = match self.last.replace(now) {
            Some(p) => p,
            None => return None,
        };

        let total = now.total.saturating_sub(prev.total);
        if total == 0 {
            return None;
        }
        let busy = now.busy.saturating_sub(prev.busy);
        Some((busy as f32 / total as f32) * 100.0)
    }
}

/// Parse the aggregate `cpu ` line: user nice system idle iowait irq softirq
/// steal [guest guest_nice]. Idle time is idle + iowait.
fn parse_cpu_line(contents: &str) -> Option<CpuTimes> {
    let line = contents
        .lines()
        .find(|l| l.starts_with("cpu ") || l.trim() == "cpu")?;
    let fields: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .filter_map(|f| f.parse().ok())
        .collect();
    if fields.len() < 4 {
        return None;
    }

    let idle = fields[3] + fields.get(4).copied().unwrap_or(0);
    let total: u64 = fields.iter().take(8).sum();
    Some(CpuTimes {
        busy: total - idle,
        total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_stat(busy_extra: u64, idle_extra: u64) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "cpu  {} 0 {} {} {} 0 0 0",
            1000 + busy_extra,
            500,
            8000 + idle_extra,
            100
        )
        .unwrap();
        writeln!(file, "cpu0 1000 0 500 8000 100 0 0 0").unwrap();
        file
    }

    #[test]
    fn test_parse_cpu_line() {
        let times = parse_cpu_line("cpu  100 0 50 800 50 0 0 0\n").unwrap();
        assert_eq!(times.total, 1000);
        assert_eq!(times.busy, 150);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_cpu_line("").is_none());
        assert!(parse_cpu_line("intr 12345").is_none());
        assert!(parse_cpu_line("cpu one two\n").is_none());
    }

    #[test]
    fn test_first_sample_is_baseline() {
        let file = write_stat(0, 0);
        let mut sampler = ProcStatSampler::with_path(file.path().to_string_lossy());
        assert!(sampler.sample().is_none());
    }

    #[test]
    fn test_delta_utilisation() {
        let file = write_stat(0, 0);
        let path = file.path().to_path_buf();
        let mut sampler = ProcStatSampler::with_path(path.to_string_lossy());
        sampler.sample();

        // +300 busy, +100 idle since baseline -> 75% busy
        let file2 = write_stat(300, 100);
        std::fs::copy(file2.path(), &path).unwrap();
        let pct = sampler.sample().unwrap();
        assert!((pct - 75.0).abs() < 0.5, "got {}", pct);
    }

    #[test]
    fn test_missing_file_yields_none() {
        let mut sampler = ProcStatSampler::with_path("/nonexistent/stat");
        assert!(sampler.sample().is_none());
    }
}
