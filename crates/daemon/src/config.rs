// Command-line / environment configuration
// Everything is passed down explicitly as RunConfig + StoreConfig

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

use proctor_core::domain::{DomainError, RunConfig};
use proctor_infra_objstore::StoreConfig;

const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_ENDPOINT: &str = "http://localhost:9000";
const DEFAULT_REGION: &str = "us-east-1";

/// Process exit codes
pub const EXIT_COMPLETED: u8 = 0;
pub const EXIT_PROCESS_ERROR: u8 = 1;
pub const EXIT_STARTUP_FAILURE: u8 = 2;
pub const EXIT_INTEGRITY_INVALID: u8 = 3;
pub const EXIT_TIMED_OUT: u8 = 124;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable, coloured
    Pretty,
    /// One JSON object per event
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "proctor")]
#[command(about = "Run an executable against a fixture and persist its transcript", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Executable under supervision
    pub executable: String,

    /// Arguments passed to the executable
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,

    /// Fixture file fed line by line to the executable's stdin
    #[arg(short, long, env = "PROCTOR_FIXTURE")]
    pub fixture: String,

    /// Destination bucket for the transcript
    #[arg(short, long, env = "PROCTOR_BUCKET")]
    pub bucket: String,

    /// Destination object key for the transcript
    #[arg(short, long, env = "PROCTOR_KEY")]
    pub key: String,

    /// Wall-clock limit for the executable
    #[arg(short, long, env = "PROCTOR_TIMEOUT_SECS", default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout_secs: u64,

    /// S3-compatible endpoint (scheme selects TLS)
    #[arg(long, env = "PROCTOR_S3_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,

    #[arg(long, env = "PROCTOR_S3_REGION", default_value = DEFAULT_REGION)]
    pub region: String,

    #[arg(long, env = "PROCTOR_ACCESS_KEY", hide_env_values = true)]
    pub access_key: String,

    #[arg(long, env = "PROCTOR_SECRET_KEY", hide_env_values = true)]
    pub secret_key: String,

    /// Keep a local copy of every upload under this directory
    #[arg(long, env = "PROCTOR_SPOOL_DIR")]
    pub spool_dir: Option<String>,

    /// Check this fixture tree before running
    #[arg(long, env = "PROCTOR_VERIFY_ROOT", requires = "requirements")]
    pub verify_root: Option<String>,

    /// JSON object mapping relative paths to template SHA-256 hashes
    #[arg(long, env = "PROCTOR_REQUIREMENTS", requires = "verify_root")]
    pub requirements: Option<String>,

    /// Skip CPU / memory sampling
    #[arg(long)]
    pub no_sampling: bool,

    /// Also write JSON logs to a daily rolling file in this directory
    #[arg(long, env = "PROCTOR_LOG_DIR")]
    pub log_dir: Option<String>,

    #[arg(long, env = "PROCTOR_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

/// Expand `~` in user-supplied paths
pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}

impl Cli {
    pub fn run_config(&self) -> Result<RunConfig, DomainError> {
        Ok(RunConfig::new(
            expand_path(&self.executable),
            expand_path(&self.fixture),
            self.bucket.as_str(),
            self.key.as_str(),
            Duration::from_secs(self.timeout_secs),
        )?
        .with_args(self.args.iter().cloned()))
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig::new(
            self.endpoint.as_str(),
            self.access_key.as_str(),
            self.secret_key.as_str(),
        )
        .with_region(self.region.as_str())
    }

    pub fn spool_dir(&self) -> Option<PathBuf> {
        self.spool_dir.as_deref().map(expand_path)
    }

    pub fn log_dir(&self) -> Option<PathBuf> {
        self.log_dir.as_deref().map(expand_path)
    }

    /// Fixture root and requirements file, when verification is requested
    pub fn verification(&self) -> Option<(PathBuf, PathBuf)> {
        match (&self.verify_root, &self.requirements) {
            (Some(root), Some(requirements)) => Some((expand_path(root), expand_path(requirements))),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec![
            "proctor",
            "--fixture",
            "in.txt",
            "--bucket",
            "logs",
            "--key",
            "log",
            "--access-key",
            "ak",
            "--secret-key",
            "sk",
        ];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_trailing_args_go_to_executable() {
        let cli = parse(&["./run", "--fast", "-v"]);
        assert_eq!(cli.executable, "./run");
        assert_eq!(cli.args, vec!["--fast", "-v"]);

        let config = cli.run_config().unwrap();
        assert_eq!(config.args(), ["--fast", "-v"]);
        assert_eq!(config.timeout(), Duration::from_secs(DEFAULT_TIMEOUT_SECS));
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let cli = parse(&["--timeout-secs", "0", "./run"]);
        assert!(matches!(cli.run_config(), Err(DomainError::InvalidConfig(_))));
    }

    #[test]
    fn test_verify_root_requires_requirements() {
        let result = Cli::try_parse_from([
            "proctor",
            "-f",
            "in.txt",
            "-b",
            "logs",
            "-k",
            "log",
            "--access-key",
            "ak",
            "--secret-key",
            "sk",
            "--verify-root",
            "fixtures",
            "./run",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_tilde_is_expanded() {
        let cli = parse(&["--spool-dir", "~/spool", "./run"]);
        let spool = cli.spool_dir().unwrap();
        assert!(!spool.starts_with("~"));
        assert!(spool.ends_with("spool"));
    }

    #[test]
    fn test_store_config_from_flags() {
        let cli = parse(&["--endpoint", "https://minio.internal:9000", "./run"]);
        let store = cli.store_config();
        assert_eq!(store.endpoint, "https://minio.internal:9000");
        assert_eq!(store.access_key, "ak");
        assert!(store.force_path_style);
    }
}
