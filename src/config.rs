//! Controller configuration
//!
//! Every setting is a command-line flag with an environment fallback, so the
//! same binary can be configured from a Deployment manifest or a shell.

use std::time::Duration;

use clap::Args;

use crate::telemetry::LogFormat;
use crate::{DEFAULT_ERROR_BACKOFF_SECS, DEFAULT_FIELD_MANAGER, DEFAULT_RESYNC_INTERVAL_SECS};

/// Settings for the `controller` subcommand
#[derive(Args, Clone, Debug, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Field manager name used for server-side apply
    #[arg(long, env = "KF_FIELD_MANAGER", default_value = DEFAULT_FIELD_MANAGER)]
    pub field_manager: String,

    /// Seconds between periodic resyncs of a converged App
    #[arg(long, env = "KF_RESYNC_INTERVAL_SECS", default_value_t = DEFAULT_RESYNC_INTERVAL_SECS)]
    pub resync_interval_secs: u64,

    /// Seconds to wait before retrying a failed reconcile
    #[arg(long, env = "KF_ERROR_BACKOFF_SECS", default_value_t = DEFAULT_ERROR_BACKOFF_SECS)]
    pub error_backoff_secs: u64,

    /// Only watch Apps in this namespace (all namespaces when unset)
    #[arg(long, env = "KF_WATCH_NAMESPACE")]
    pub namespace: Option<String>,

    /// Log output format
    #[arg(long, env = "KF_LOG_FORMAT", value_enum, default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,
}

impl ControllerConfig {
    /// Interval between periodic resyncs
    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_secs)
    }

    /// Delay before retrying a failed reconcile
    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_backoff_secs)
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            field_manager: DEFAULT_FIELD_MANAGER.to_string(),
            resync_interval_secs: DEFAULT_RESYNC_INTERVAL_SECS,
            error_backoff_secs: DEFAULT_ERROR_BACKOFF_SECS,
            namespace: None,
            log_format: LogFormat::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        config: ControllerConfig,
    }

    #[test]
    fn test_defaults_match_constants() {
        let config = ControllerConfig::default();
        assert_eq!(config.field_manager, "kf-controller");
        assert_eq!(config.resync_interval(), Duration::from_secs(300));
        assert_eq!(config.error_backoff(), Duration::from_secs(5));
        assert!(config.namespace.is_none());
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_flags_override_defaults() {
        let cli = TestCli::try_parse_from([
            "kf",
            "--field-manager",
            "custom",
            "--resync-interval-secs",
            "60",
            "--error-backoff-secs",
            "1",
            "--namespace",
            "dev",
            "--log-format",
            "text",
        ])
        .expect("parse");

        assert_eq!(cli.config.field_manager, "custom");
        assert_eq!(cli.config.resync_interval(), Duration::from_secs(60));
        assert_eq!(cli.config.error_backoff(), Duration::from_secs(1));
        assert_eq!(cli.config.namespace.as_deref(), Some("dev"));
        assert_eq!(cli.config.log_format, LogFormat::Text);
    }

    #[test]
    fn test_rejects_unknown_log_format() {
        let result = TestCli::try_parse_from(["kf", "--log-format", "xml"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_non_numeric_interval() {
        let result = TestCli::try_parse_from(["kf", "--resync-interval-secs", "soon"]);
        assert!(result.is_err());
    }
}
