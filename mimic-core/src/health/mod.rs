//! Health gate: readiness probes with retry semantics and aggregation.
//!
//! Probes never raise; every failure mode is represented as a [`ProbeResult`]
//! status so that the executor can gate on readiness without unwinding.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, instrument};

mod probes;

/// Classification of a probe outcome (or an aggregate of several).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Probe passed
    Healthy,

    /// Target reachable but the check failed (wrong status, exit code, output)
    Unhealthy,

    /// Mixed signals: some probes passed, others timed out or were unknown
    Degraded,

    /// Probe could not be evaluated (e.g. malformed request, spawn failure)
    Unknown,

    /// The probe's own execution exceeded its timeout budget
    Timeout,
}

/// A single configured readiness probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// What to probe and how
    #[serde(flatten)]
    pub probe: ProbeSpec,

    /// Budget for a single probe attempt, in seconds
    #[serde(default = "default_timeout", with = "duration_secs")]
    pub timeout: Duration,

    /// Total attempts before giving up
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Sleep between attempts, in seconds
    #[serde(default = "default_retry_delay", with = "duration_secs")]
    pub retry_delay: Duration,
}

/// Probe kind and target, tagged by `type` in the fleet file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProbeSpec {
    /// TCP connect check: healthy iff the connection succeeds
    Tcp {
        #[serde(default = "default_host")]
        host: String,
        port: u16,
    },

    /// HTTP request check: healthy iff the status code matches and any
    /// configured body/JSON expectations hold
    Http {
        url: String,
        #[serde(default = "default_method")]
        method: String,
        #[serde(default = "default_expected_status")]
        expected_status: u16,
        #[serde(default)]
        expected_body: Option<String>,
        #[serde(default)]
        expected_json: Option<HashMap<String, serde_json::Value>>,
    },

    /// Command check (run via `sh -c`): healthy iff the exit code matches
    /// and stdout contains any configured expected output
    Command {
        command: String,
        #[serde(default)]
        expected_exit_code: i32,
        #[serde(default)]
        expected_output: Option<String>,
    },
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_expected_status() -> u16 {
    200
}

fn default_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_retries() -> u32 {
    3
}

fn default_retry_delay() -> Duration {
    Duration::from_secs(2)
}

/// Serialize durations as (fractional) seconds in fleet files.
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        if !secs.is_finite() || secs < 0.0 {
            return Err(serde::de::Error::custom("duration must be a non-negative number"));
        }
        Ok(Duration::from_secs_f64(secs))
    }
}

/// Outcome of a single probe run (or retry loop).
#[derive(Debug, Clone, Serialize)]
pub struct ProbeResult {
    /// Classification of the outcome
    pub status: HealthStatus,

    /// How long the probe took
    pub duration: Duration,

    /// Human-readable diagnostic, if any
    pub message: Option<String>,

    /// HTTP status code observed (http probes)
    pub status_code: Option<u16>,

    /// Exit code observed (command probes)
    pub exit_code: Option<i32>,

    /// Captured stdout (command probes)
    pub output: Option<String>,
}

impl ProbeResult {
    fn new(status: HealthStatus, duration: Duration) -> Self {
        Self { status, duration, message: None, status_code: None, exit_code: None, output: None }
    }

    fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// The readiness decision point: runs probes, retries, and classifies.
pub struct HealthGate;

impl HealthGate {
    /// Run a probe with the configured retry semantics.
    ///
    /// Makes up to `retries` attempts (at least one) with `retry_delay`
    /// between them, returning the first `Healthy` result or, after
    /// exhausting attempts, the last non-healthy one.
    #[instrument(skip(config), fields(retries = config.retries))]
    pub async fn check(config: &ProbeConfig) -> ProbeResult {
        let attempts = config.retries.max(1);
        let mut last = None;

        for attempt in 1..=attempts {
            let result = probes::run(config).await;
            if result.status == HealthStatus::Healthy {
                return result;
            }
            debug!(attempt, status = ?result.status, "probe attempt did not pass");
            last = Some(result);
            if attempt < attempts {
                tokio::time::sleep(config.retry_delay).await;
            }
        }

        // attempts >= 1, so at least one result was recorded
        last.unwrap_or_else(|| ProbeResult::new(HealthStatus::Unknown, Duration::ZERO))
    }

    /// Combine several probe results into one status for a VM.
    ///
    /// All healthy -> `Healthy`; any unhealthy -> `Unhealthy`; otherwise the
    /// mix (timeouts, unknowns) is `Degraded`. An empty slice is `Unknown`.
    pub fn aggregate(results: &[ProbeResult]) -> HealthStatus {
        if results.is_empty() {
            return HealthStatus::Unknown;
        }
        if results.iter().any(|r| r.status == HealthStatus::Unhealthy) {
            HealthStatus::Unhealthy
        } else if results.iter().all(|r| r.status == HealthStatus::Healthy) {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        }
    }

    /// Poll `check()` until it reports healthy or `timeout` elapses.
    ///
    /// Sleeps `poll_interval` between polls. Returns true on the first
    /// healthy result, false if the deadline passes first.
    #[instrument(skip(config))]
    pub async fn wait_healthy(
        config: &ProbeConfig,
        timeout: Duration,
        poll_interval: Duration,
    ) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if Self::check(config).await.status == HealthStatus::Healthy {
                return true;
            }
            if Instant::now() + poll_interval >= deadline {
                return false;
            }
            tokio::time::sleep(poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(status: HealthStatus) -> ProbeResult {
        ProbeResult::new(status, Duration::from_millis(1))
    }

    #[test]
    fn test_aggregate_all_healthy() {
        let results = [result(HealthStatus::Healthy), result(HealthStatus::Healthy)];
        assert_eq!(HealthGate::aggregate(&results), HealthStatus::Healthy);
    }

    #[test]
    fn test_aggregate_any_unhealthy_wins() {
        let results = [result(HealthStatus::Healthy), result(HealthStatus::Unhealthy)];
        assert_eq!(HealthGate::aggregate(&results), HealthStatus::Unhealthy);

        let results = [result(HealthStatus::Unhealthy), result(HealthStatus::Timeout)];
        assert_eq!(HealthGate::aggregate(&results), HealthStatus::Unhealthy);
    }

    #[test]
    fn test_aggregate_timeout_degrades() {
        let results = [result(HealthStatus::Healthy), result(HealthStatus::Timeout)];
        assert_eq!(HealthGate::aggregate(&results), HealthStatus::Degraded);
    }

    #[test]
    fn test_aggregate_mixed_unknown_degrades() {
        let results = [result(HealthStatus::Healthy), result(HealthStatus::Unknown)];
        assert_eq!(HealthGate::aggregate(&results), HealthStatus::Degraded);
    }

    #[test]
    fn test_aggregate_empty_is_unknown() {
        assert_eq!(HealthGate::aggregate(&[]), HealthStatus::Unknown);
    }

    #[test]
    fn test_probe_config_defaults_from_yaml() {
        let config: ProbeConfig =
            serde_yaml::from_str("type: tcp\nport: 5432\n").expect("parse probe");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.retries, 3);
        assert_eq!(config.retry_delay, Duration::from_secs(2));
        match &config.probe {
            ProbeSpec::Tcp { host, port } => {
                assert_eq!(host, "127.0.0.1");
                assert_eq!(*port, 5432);
            }
            other => panic!("unexpected probe spec: {:?}", other),
        }
    }

    #[test]
    fn test_probe_config_explicit_fields() {
        let yaml = r#"
type: http
url: http://10.0.0.5:8080/healthz
expected_status: 204
timeout: 0.5
retries: 10
retry_delay: 0.1
"#;
        let config: ProbeConfig = serde_yaml::from_str(yaml).expect("parse probe");
        assert_eq!(config.timeout, Duration::from_millis(500));
        assert_eq!(config.retries, 10);
        match &config.probe {
            ProbeSpec::Http { expected_status, method, .. } => {
                assert_eq!(*expected_status, 204);
                assert_eq!(method, "GET");
            }
            other => panic!("unexpected probe spec: {:?}", other),
        }
    }

    fn command_probe(command: &str, retries: u32) -> ProbeConfig {
        ProbeConfig {
            probe: ProbeSpec::Command {
                command: command.to_string(),
                expected_exit_code: 0,
                expected_output: None,
            },
            timeout: Duration::from_secs(5),
            retries,
            retry_delay: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn test_check_returns_first_healthy() {
        let result = HealthGate::check(&command_probe("true", 3)).await;
        assert_eq!(result.status, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn test_check_retries_until_healthy() {
        // First attempt creates the flag file and fails; second attempt passes.
        let dir = tempfile::tempdir().expect("tempdir");
        let flag = dir.path().join("ready");
        let command =
            format!("test -f {0} || {{ touch {0}; exit 1; }}", flag.display());

        let result = HealthGate::check(&command_probe(&command, 3)).await;
        assert_eq!(result.status, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn test_check_exhausts_retries_and_keeps_last_result() {
        let result = HealthGate::check(&command_probe("exit 7", 2)).await;
        assert_eq!(result.status, HealthStatus::Unhealthy);
        assert_eq!(result.exit_code, Some(7));
    }

    #[tokio::test]
    async fn test_wait_healthy_flips_after_delay() {
        let dir = tempfile::tempdir().expect("tempdir");
        let flag = dir.path().join("up");
        let command = format!("test -f {}", flag.display());

        let flag_clone = flag.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            std::fs::write(&flag_clone, b"").expect("write flag");
        });

        let healthy = HealthGate::wait_healthy(
            &command_probe(&command, 1),
            Duration::from_secs(5),
            Duration::from_millis(50),
        )
        .await;
        assert!(healthy);
    }

    #[tokio::test]
    async fn test_wait_healthy_gives_up_at_deadline() {
        let healthy = HealthGate::wait_healthy(
            &command_probe("false", 1),
            Duration::from_millis(200),
            Duration::from_millis(50),
        )
        .await;
        assert!(!healthy);
    }
}
