//! Proctor - Main Entry Point
//! Verify fixtures, supervise one run, stream samples, persist the transcript

mod config;
mod logging;

use anyhow::{Context, Result};
use clap::Parser;
use std::collections::HashMap;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use proctor_core::application::{ExitWatch, ResourceSampler};
use proctor_core::domain::{FileStatus, ResourceSample, TerminalStatus};
use proctor_core::port::id_provider::UuidProvider;
use proctor_core::port::time_provider::SystemTimeProvider;
use proctor_core::port::ObjectStore;
use proctor_core::AppError;
use proctor_infra_objstore::{S3ObjectStore, SpooledStore};
use proctor_infra_system::{IntegrityVerifier, Orchestrator, ProcfsAccounting};

use config::{
    Cli, EXIT_COMPLETED, EXIT_INTEGRITY_INVALID, EXIT_PROCESS_ERROR, EXIT_STARTUP_FAILURE,
    EXIT_TIMED_OUT,
};

const SAMPLE_CHANNEL_CAPACITY: usize = 64;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = ?e, "Proctor failed");
            eprintln!("proctor: {:#}", e);
            ExitCode::from(EXIT_STARTUP_FAILURE)
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    // 1. Logging (guard lives until the end of the run)
    let _log_guard = logging::init(cli.log_format, cli.log_dir().as_deref())
        .context("failed to initialize logging")?;

    info!("Proctor v{} starting...", proctor_core::VERSION);

    // 2. Optional fixture integrity check
    if let Some((root, requirements_path)) = cli.verification() {
        if !verify_fixtures(&root, &requirements_path).await? {
            return Ok(ExitCode::from(EXIT_INTEGRITY_INVALID));
        }
    }

    // 3. Wiring
    let run_config = cli.run_config().context("invalid run configuration")?;
    let store = build_store(&cli).await;
    let orchestrator = Orchestrator::new(
        store,
        Arc::new(SystemTimeProvider),
        Arc::new(UuidProvider),
    );

    // 4. Start the child
    let handle = match orchestrator.start(run_config).await {
        Ok(handle) => handle,
        Err(e) => {
            let err = AppError::from(e);
            error!(error = %err, fatal = err.is_fatal(), "Could not start executable");
            return Ok(ExitCode::from(EXIT_STARTUP_FAILURE));
        }
    };

    // 5. Samplers run alongside and stop on their own once the child is reaped
    let samplers = if cli.no_sampling {
        None
    } else {
        Some(spawn_samplers(handle.pid(), handle.exit_watch()))
    };

    let report = handle.wait().await?;

    if let Some(samplers) = samplers {
        if let Err(e) = samplers.await {
            warn!(error = %e, "Sample reporter failed");
        }
    }

    for fault in &report.faults {
        warn!(run_id = %report.run_id, fault = %fault, "Producer fault");
    }
    if let Err(e) = &report.final_flush {
        error!(run_id = %report.run_id, error = %e, "Final transcript upload failed");
    }

    info!(
        run_id = %report.run_id,
        status = %report.status,
        entries = report.entries,
        "Run complete"
    );

    Ok(ExitCode::from(exit_code(&report.status)))
}

fn exit_code(status: &TerminalStatus) -> u8 {
    match status {
        TerminalStatus::Completed { .. } => EXIT_COMPLETED,
        TerminalStatus::TimedOut { .. } => EXIT_TIMED_OUT,
        TerminalStatus::ProcessError(_) => EXIT_PROCESS_ERROR,
    }
}

async fn build_store(cli: &Cli) -> Arc<dyn ObjectStore> {
    let s3 = S3ObjectStore::connect(&cli.store_config()).await;

    match cli.spool_dir() {
        Some(dir) => {
            info!(spool_dir = %dir.display(), "Spooling transcripts locally");
            Arc::new(SpooledStore::new(s3, dir))
        }
        None => Arc::new(s3),
    }
}

fn load_requirements(path: &Path) -> Result<HashMap<String, String>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read requirements file {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("requirements file {} is not a JSON object of hashes", path.display()))
}

/// Returns false when the fixture tree fails the check
async fn verify_fixtures(root: &Path, requirements_path: &Path) -> Result<bool> {
    let requirements = load_requirements(requirements_path)?;
    let root_buf = root.to_path_buf();

    let report = tokio::task::spawn_blocking(move || {
        IntegrityVerifier::new().verify(&root_buf, &requirements)
    })
    .await
    .context("integrity check task failed")?
    .with_context(|| format!("integrity check of {} failed", root.display()))?;

    if report.is_valid() {
        info!(root = %root.display(), files = report.files.len(), "Fixtures verified");
        return Ok(true);
    }

    error!(
        root = %root.display(),
        unchanged = ?report.with_status(FileStatus::Unchanged),
        missing = ?report.with_status(FileStatus::Missing),
        extra = ?report.with_status(FileStatus::Extra),
        "Fixture integrity check failed, refusing to run"
    );
    Ok(false)
}

/// Spawn memory + CPU samplers and a reporter logging every sample
fn spawn_samplers(pid: u32, exit: ExitWatch) -> JoinHandle<()> {
    let sampler = Arc::new(ResourceSampler::new(Arc::new(ProcfsAccounting::new())));
    let (tx, mut rx) = mpsc::channel(SAMPLE_CHANNEL_CAPACITY);

    let memory = {
        let sampler = Arc::clone(&sampler);
        let exit = exit.clone();
        let tx = tx.clone();
        tokio::spawn(async move { sampler.watch_memory(pid, exit, tx).await })
    };
    let cpu = tokio::spawn(async move { sampler.watch_cpu(pid, exit, tx).await });

    tokio::spawn(async move {
        // Ends once both samplers dropped their senders
        while let Some(sample) = rx.recv().await {
            match sample {
                ResourceSample::Memory { pid, kilobytes } => {
                    info!(pid = %pid, kilobytes = kilobytes, "Memory used: {} KB", kilobytes)
                }
                ResourceSample::Cpu { pid, percent } => {
                    info!(pid = %pid, percent = percent, "CPU usage: {:.2}%", percent)
                }
            }
        }

        for (name, handle) in [("memory", memory), ("cpu", cpu)] {
            match handle.await {
                Ok(stop) => debug!(sampler = name, reason = ?stop, "Sampler stopped"),
                Err(e) => warn!(sampler = name, error = %e, "Sampler task failed"),
            }
        }
    })
}
