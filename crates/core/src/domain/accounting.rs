// Process accounting parsers (Linux procfs text formats)
//
// Pure functions over the raw text of /proc/<pid>/smaps, /proc/<pid>/stat
// and /proc/stat. Reading the files is the job of the ProcessAccounting port.

use thiserror::Error;

/// Field prefix of the proportional set size line in smaps
const PSS_PREFIX: &str = "Pss:";

/// Index of utime in /proc/<pid>/stat, counted from the field after `comm`
/// (field 3, `state`, is index 0; utime is field 14)
const UTIME_INDEX: usize = 11;

/// Sampling errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SampleError {
    /// Target process has exited (its /proc entry is gone)
    #[error("Process not found: {0}")]
    ProcessNotFound(u32),

    #[error("Accounting read failed: {0}")]
    Io(String),

    #[error("Accounting record malformed: {0}")]
    Parse(String),
}

/// One streamed sample from a polling loop
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResourceSample {
    Memory { pid: u32, kilobytes: u64 },
    Cpu { pid: u32, percent: f64 },
}

/// One end of a CPU sampling window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CpuSnapshot {
    /// utime + stime + cutime + cstime of the target process
    pub process_jiffies: u64,
    /// Sum of every scheduler bucket on the aggregate `cpu` line
    pub total_jiffies: u64,
}

impl CpuSnapshot {
    /// CPU percentage used by the process between two snapshots
    ///
    /// Returns 0.0 when the system-wide counter did not move.
    pub fn percent_since(&self, earlier: &CpuSnapshot) -> f64 {
        let total_delta = self.total_jiffies.saturating_sub(earlier.total_jiffies);
        if total_delta == 0 {
            return 0.0;
        }
        let process_delta = self.process_jiffies.saturating_sub(earlier.process_jiffies);
        100.0 * process_delta as f64 / total_delta as f64
    }
}

/// Sum every `Pss:` field across all mapped regions, in kilobytes
pub fn parse_smaps_pss(smaps: &str) -> Result<u64, SampleError> {
    let mut total = 0u64;
    for line in smaps.lines() {
        let Some(rest) = line.strip_prefix(PSS_PREFIX) else {
            continue;
        };
        let value = rest
            .split_whitespace()
            .next()
            .ok_or_else(|| SampleError::Parse(format!("empty Pss field: {:?}", line)))?;
        let kb: u64 = value
            .parse()
            .map_err(|_| SampleError::Parse(format!("bad Pss value: {:?}", line)))?;
        total += kb;
    }
    Ok(total)
}

/// Sum of every counter on the aggregate `cpu` line of /proc/stat
pub fn parse_system_jiffies(stat: &str) -> Result<u64, SampleError> {
    let line = stat
        .lines()
        .find(|l| l.starts_with("cpu "))
        .ok_or_else(|| SampleError::Parse("missing aggregate cpu line".to_string()))?;

    line.split_whitespace()
        .skip(1)
        .try_fold(0u64, |acc, field| {
            field
                .parse::<u64>()
                .map(|v| acc + v)
                .map_err(|_| SampleError::Parse(format!("bad cpu counter: {:?}", field)))
        })
}

/// utime + stime + cutime + cstime from /proc/<pid>/stat
///
/// `comm` may contain spaces and parentheses, so fields are split after the
/// last `)`.
pub fn parse_process_jiffies(stat: &str) -> Result<u64, SampleError> {
    let close = stat
        .rfind(')')
        .ok_or_else(|| SampleError::Parse("missing comm terminator".to_string()))?;
    let fields: Vec<&str> = stat[close + 1..].split_whitespace().collect();

    if fields.len() < UTIME_INDEX + 4 {
        return Err(SampleError::Parse(format!(
            "short stat record: {} fields after comm",
            fields.len()
        )));
    }

    let mut sum = 0u64;
    for field in &fields[UTIME_INDEX..UTIME_INDEX + 4] {
        // cutime/cstime are signed longs in the kernel ABI
        let value: i64 = field
            .parse()
            .map_err(|_| SampleError::Parse(format!("bad time field: {:?}", field)))?;
        sum += value.max(0) as u64;
    }
    Ok(sum)
}
