//! Engine tuning knobs.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::client::ClientSettings;
use crate::retry::RetryConfig;

/// What happens to a group after a setup operation does not pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetupFailurePolicy {
    /// Stop the setup phase, warn, and still execute run and teardown.
    #[default]
    Continue,
    /// Skip the run phase, execute teardown, and fail the group.
    Abort,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Default group parallelism when neither the plan nor the invocation decides.
    pub parallel: bool,
    pub max_parallel_groups: usize,
    /// When set, every operation call goes through the retry policy.
    pub retry: Option<RetryConfig>,
    pub client: ClientSettings,
    /// Substitute a no-op for unknown operation names instead of recording an error.
    pub lenient_operations: bool,
    pub setup_failure: SetupFailurePolicy,
    /// Validate operations without performing them.
    pub dry_run: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            parallel: false,
            max_parallel_groups: 8,
            retry: None,
            client: ClientSettings::default(),
            lenient_operations: false,
            setup_failure: SetupFailurePolicy::default(),
            dry_run: false,
        }
    }
}

impl EngineSettings {
    /// Defaults overridden by `S3PROBE_*` environment variables.
    /// Setting any retry variable switches retries on.
    pub fn from_env() -> Self {
        let mut settings = Self::default();

        let retry_vars = [
            "S3PROBE_MAX_ATTEMPTS",
            "S3PROBE_BASE_DELAY_MS",
            "S3PROBE_MAX_DELAY_MS",
            "S3PROBE_EXPONENTIAL_FACTOR",
            "S3PROBE_RETRY_JITTER",
        ];
        if retry_vars.iter().any(|v| std::env::var_os(v).is_some()) {
            let defaults = RetryConfig::default();
            settings.retry = Some(RetryConfig {
                max_attempts: env_parse("S3PROBE_MAX_ATTEMPTS").unwrap_or(defaults.max_attempts),
                base_delay: env_parse("S3PROBE_BASE_DELAY_MS")
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.base_delay),
                max_delay: env_parse("S3PROBE_MAX_DELAY_MS")
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.max_delay),
                exponential_factor: env_parse::<f64>("S3PROBE_EXPONENTIAL_FACTOR")
                    .filter(|f| f.is_finite() && *f >= 1.0)
                    .unwrap_or(defaults.exponential_factor),
                jitter: env_flag("S3PROBE_RETRY_JITTER").unwrap_or(defaults.jitter),
                transport_retries: defaults.transport_retries,
            });
        }

        if let Some(secs) = env_parse("S3PROBE_CONNECT_TIMEOUT_SECS") {
            settings.client.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse("S3PROBE_READ_TIMEOUT_SECS") {
            settings.client.operation_timeout = Duration::from_secs(secs);
        }
        if let Some(parallel) = env_flag("S3PROBE_PARALLEL") {
            settings.parallel = parallel;
        }
        if let Some(dry_run) = env_flag("S3PROBE_DRY_RUN") {
            settings.dry_run = dry_run;
        }

        settings
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_setup_failure(mut self, policy: SetupFailurePolicy) -> Self {
        self.setup_failure = policy;
        self
    }

    pub fn with_lenient_operations(mut self, lenient: bool) -> Self {
        self.lenient_operations = lenient;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(var = name, value = %raw, "ignoring invalid environment value");
            None
        }
    }
}

fn env_flag(name: &str) -> Option<bool> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            warn!(var = name, value = %raw, "ignoring invalid boolean environment value");
            None
        }
    }
}
