//! Command-line and environment configuration.

use std::path::PathBuf;
use std::time::Duration;

use chainlab_runner::DispatcherConfig;
use clap::Parser;

/// Chainlab - a simulated Solana developer terminal
#[derive(Parser, Debug, Clone)]
#[command(name = "chainlab")]
#[command(about = "Simulated Solana/Anchor terminal with real build and deploy runs")]
pub struct Args {
    /// Directory holding the saved session
    #[arg(long, env = "CHAINLAB_DATA_DIR", default_value = ".chainlab")]
    pub data_dir: PathBuf,

    /// Seed for a fresh session (ignored when a saved session is restored)
    #[arg(long, env = "CHAINLAB_SEED")]
    pub seed: Option<String>,

    /// Remote runner base URL; toolchain jobs run locally when unset
    #[arg(long, env = "RUNNER_URL")]
    pub runner_url: Option<String>,

    /// Shared secret for signing runner requests
    #[arg(long, env = "RUNNER_SHARED_SECRET", hide_env_values = true)]
    pub runner_secret: Option<String>,

    /// Workspace identifier sent with every job
    #[arg(long, env = "CHAINLAB_WORKSPACE_ID", default_value = "default")]
    pub workspace_id: String,

    /// Delay between job result polls in milliseconds
    #[arg(long, env = "RUNNER_POLL_INTERVAL_MS", default_value = "500")]
    pub poll_interval_ms: u64,

    /// Overall job timeout in milliseconds
    #[arg(long, env = "RUNNER_JOB_TIMEOUT_MS", default_value = "120000")]
    pub job_timeout_ms: u64,

    /// Binaries the local worker may run
    #[arg(long, env = "CHAINLAB_TOOLCHAIN_ALLOW", value_delimiter = ',', default_value = "anchor,cargo")]
    pub toolchain_allow: Vec<String>,

    /// Mission script (YAML) to track
    #[arg(long, env = "CHAINLAB_MISSION")]
    pub mission: Option<PathBuf>,

    /// Discard the saved session and start over
    #[arg(long, default_value = "false")]
    pub reset: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "warn")]
    pub log_level: String,
}

impl Args {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.poll_interval_ms == 0 {
            return Err("RUNNER_POLL_INTERVAL_MS must be greater than zero".to_string());
        }

        if self.job_timeout_ms == 0 {
            return Err("RUNNER_JOB_TIMEOUT_MS must be greater than zero".to_string());
        }

        if self.poll_interval_ms > self.job_timeout_ms {
            return Err(
                "RUNNER_POLL_INTERVAL_MS must be less than or equal to RUNNER_JOB_TIMEOUT_MS"
                    .to_string(),
            );
        }

        if self.runner_url.is_none() && self.toolchain_allow.iter().all(|b| b.trim().is_empty()) {
            return Err("CHAINLAB_TOOLCHAIN_ALLOW must name at least one binary".to_string());
        }

        if let Some(url) = &self.runner_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(format!("RUNNER_URL must be an http(s) URL, got {}", url));
            }
        }

        Ok(())
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            workspace_id: self.workspace_id.clone(),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            job_timeout: Duration::from_millis(self.job_timeout_ms),
            ..Default::default()
        }
    }

    /// Allow-list with blanks removed.
    pub fn toolchain(&self) -> Vec<String> {
        self.toolchain_allow
            .iter()
            .map(|b| b.trim().to_string())
            .filter(|b| !b.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Args {
        let mut argv = vec!["chainlab"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn test_defaults_are_valid() {
        let args = parse(&[]);
        assert!(args.validate().is_ok());
        assert_eq!(args.toolchain(), vec!["anchor", "cargo"]);

        let config = args.dispatcher_config();
        assert_eq!(config.poll_interval, Duration::from_millis(500));
        assert_eq!(config.job_timeout, Duration::from_secs(120));
    }

    #[test]
    fn test_interval_checks() {
        assert!(parse(&["--poll-interval-ms", "0"]).validate().is_err());
        assert!(parse(&["--job-timeout-ms", "100", "--poll-interval-ms", "200"])
            .validate()
            .is_err());
        assert!(parse(&["--job-timeout-ms", "200", "--poll-interval-ms", "200"])
            .validate()
            .is_ok());
    }

    #[test]
    fn test_runner_url_must_be_http() {
        assert!(parse(&["--runner-url", "ftp://runner"]).validate().is_err());
        assert!(parse(&["--runner-url", "https://runner.example.org"]).validate().is_ok());
    }

    #[test]
    fn test_toolchain_list_is_comma_separated() {
        let args = parse(&["--toolchain-allow", "anchor, solana ,"]);
        assert_eq!(args.toolchain(), vec!["anchor", "solana"]);
    }
}
