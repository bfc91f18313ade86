// Supervision constants (no magic values)
use std::time::Duration;

/// Flush the transcript every N appended entries (unified across producers)
pub const FLUSH_EVERY_ENTRIES: u64 = 5;

/// Content type of the persisted transcript object
pub const TRANSCRIPT_CONTENT_TYPE: &str = "application/json";

/// Resource sampling cadence (1 sample/second per metric)
/// Also the length of the CPU measurement window
pub const SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// Sampler loops give up after this many consecutive non-fatal errors
pub const MAX_CONSECUTIVE_SAMPLE_ERRORS: u32 = 3;

/// Time between SIGTERM and SIGKILL when the deadline fires
pub const TERMINATE_GRACE: Duration = Duration::from_secs(1);

/// Drain bound used only when the child's process group could not be swept
/// A producer still blocked afterwards is aborted
pub const PRODUCER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Prefix of the synthetic transcript entry appended on deadline expiry
pub const TIMEOUT_MARKER_PREFIX: &str = "Command timed out at";
