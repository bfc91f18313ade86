//! Resource Sampler - CPU and memory usage of a live process
//!
//! Two independent polling loops, one sample per second each, streamed to the
//! caller over an mpsc channel. Loops stop when:
//! - the run's exit signal fires,
//! - the target process disappears (`SampleError::ProcessNotFound`),
//! - the receiver is dropped,
//! - `MAX_CONSECUTIVE_SAMPLE_ERRORS` other errors happen in a row.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::application::constants::{MAX_CONSECUTIVE_SAMPLE_ERRORS, SAMPLE_INTERVAL};
use crate::application::exit_signal::ExitWatch;
use crate::domain::accounting::{
    parse_process_jiffies, parse_smaps_pss, parse_system_jiffies, CpuSnapshot,
};
use crate::domain::{ResourceSample, SampleError};
use crate::port::ProcessAccounting;

/// Which metric a polling loop produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Metric {
    Memory,
    Cpu,
}

/// Why a polling loop ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SamplerStop {
    /// Exit signal observed
    RunFinished,
    /// The pid no longer exists
    ProcessGone,
    /// Nobody is listening anymore
    ReceiverClosed,
    /// Error budget exhausted
    TooManyErrors(SampleError),
}

pub struct ResourceSampler {
    accounting: Arc<dyn ProcessAccounting>,
    interval: Duration,
}

impl ResourceSampler {
    pub fn new(accounting: Arc<dyn ProcessAccounting>) -> Self {
        Self {
            accounting,
            interval: SAMPLE_INTERVAL,
        }
    }

    /// Override the sampling interval (tests)
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Proportional set size of `pid`, in kilobytes
    ///
    /// # Errors
    /// - SampleError::ProcessNotFound if the process has exited
    pub async fn memory_sample(&self, pid: u32) -> Result<u64, SampleError> {
        let smaps = self.accounting.read_smaps(pid).await?;
        parse_smaps_pss(&smaps)
    }

    async fn cpu_snapshot(&self, pid: u32) -> Result<CpuSnapshot, SampleError> {
        let system = self.accounting.read_system_stat().await?;
        let process = self.accounting.read_process_stat(pid).await?;
        Ok(CpuSnapshot {
            process_jiffies: parse_process_jiffies(&process)?,
            total_jiffies: parse_system_jiffies(&system)?,
        })
    }

    /// CPU percentage of `pid` over one sampling interval
    ///
    /// Blocks for the interval between the two snapshots. Reports 0.0 when
    /// the system-wide counter did not move.
    pub async fn cpu_sample(&self, pid: u32) -> Result<f64, SampleError> {
        let before = self.cpu_snapshot(pid).await?;
        sleep(self.interval).await;
        let after = self.cpu_snapshot(pid).await?;
        Ok(after.percent_since(&before))
    }

    /// Stream memory samples until the loop stops
    pub async fn watch_memory(
        &self,
        pid: u32,
        exit: ExitWatch,
        tx: mpsc::Sender<ResourceSample>,
    ) -> SamplerStop {
        self.watch(Metric::Memory, pid, exit, tx).await
    }

    /// Stream CPU samples until the loop stops
    pub async fn watch_cpu(
        &self,
        pid: u32,
        exit: ExitWatch,
        tx: mpsc::Sender<ResourceSample>,
    ) -> SamplerStop {
        self.watch(Metric::Cpu, pid, exit, tx).await
    }

    async fn sample(&self, metric: Metric, pid: u32) -> Result<ResourceSample, SampleError> {
        match metric {
            Metric::Memory => self
                .memory_sample(pid)
                .await
                .map(|kilobytes| ResourceSample::Memory { pid, kilobytes }),
            Metric::Cpu => self
                .cpu_sample(pid)
                .await
                .map(|percent| ResourceSample::Cpu { pid, percent }),
        }
    }

    async fn watch(
        &self,
        metric: Metric,
        pid: u32,
        mut exit: ExitWatch,
        tx: mpsc::Sender<ResourceSample>,
    ) -> SamplerStop {
        info!(pid = %pid, metric = ?metric, "Sampler started");
        let mut consecutive_errors = 0u32;

        let stop = loop {
            if exit.has_exited() {
                break SamplerStop::RunFinished;
            }

            let result = tokio::select! {
                r = self.sample(metric, pid) => r,
                _ = exit.wait() => break SamplerStop::RunFinished,
            };

            match result {
                Ok(sample) => {
                    consecutive_errors = 0;
                    if tx.send(sample).await.is_err() {
                        break SamplerStop::ReceiverClosed;
                    }
                }
                Err(SampleError::ProcessNotFound(_)) => break SamplerStop::ProcessGone,
                Err(e) => {
                    consecutive_errors += 1;
                    warn!(
                        pid = %pid,
                        metric = ?metric,
                        error = %e,
                        consecutive_errors = consecutive_errors,
                        "Sample failed"
                    );
                    if consecutive_errors >= MAX_CONSECUTIVE_SAMPLE_ERRORS {
                        break SamplerStop::TooManyErrors(e);
                    }
                }
            }

            // The CPU window already spans one interval unless it failed early
            if metric == Metric::Memory || consecutive_errors > 0 {
                tokio::select! {
                    _ = sleep(self.interval) => {},
                    _ = exit.wait() => break SamplerStop::RunFinished,
                }
            }
        };

        debug!(pid = %pid, metric = ?metric, stop = ?stop, "Sampler stopped");
        stop
    }
}
