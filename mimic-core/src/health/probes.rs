//! Probe executions: TCP connect, HTTP request, host command.
//!
//! Each probe is bounded by the config's per-attempt timeout. A probe that
//! exceeds its own budget classifies as `Timeout`, distinct from `Unhealthy`
//! (target responded but failed the check).

use super::{HealthStatus, ProbeConfig, ProbeResult, ProbeSpec};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::trace;

/// Run a single probe attempt.
pub(super) async fn run(config: &ProbeConfig) -> ProbeResult {
    match &config.probe {
        ProbeSpec::Tcp { host, port } => probe_tcp(host, *port, config.timeout).await,
        ProbeSpec::Http { url, method, expected_status, expected_body, expected_json } => {
            probe_http(url, method, *expected_status, expected_body, expected_json, config.timeout)
                .await
        }
        ProbeSpec::Command { command, expected_exit_code, expected_output } => {
            probe_command(command, *expected_exit_code, expected_output, config.timeout).await
        }
    }
}

async fn probe_tcp(host: &str, port: u16, budget: Duration) -> ProbeResult {
    let started = Instant::now();
    trace!(host, port, "tcp probe");

    match timeout(budget, TcpStream::connect((host, port))).await {
        Ok(Ok(_stream)) => ProbeResult::new(HealthStatus::Healthy, started.elapsed()),
        Ok(Err(e)) => ProbeResult::new(HealthStatus::Unhealthy, started.elapsed())
            .with_message(format!("connect to {}:{} failed: {}", host, port, e)),
        Err(_) => ProbeResult::new(HealthStatus::Timeout, started.elapsed())
            .with_message(format!("connect to {}:{} timed out", host, port)),
    }
}

async fn probe_http(
    url: &str,
    method: &str,
    expected_status: u16,
    expected_body: &Option<String>,
    expected_json: &Option<HashMap<String, serde_json::Value>>,
    budget: Duration,
) -> ProbeResult {
    let started = Instant::now();
    trace!(url, method, "http probe");

    let client = match reqwest::Client::builder().timeout(budget).build() {
        Ok(client) => client,
        Err(e) => {
            return ProbeResult::new(HealthStatus::Unknown, started.elapsed())
                .with_message(format!("failed to build http client: {}", e));
        }
    };

    let method = match reqwest::Method::from_bytes(method.to_uppercase().as_bytes()) {
        Ok(m) => m,
        Err(_) => {
            return ProbeResult::new(HealthStatus::Unknown, started.elapsed())
                .with_message(format!("invalid http method: {}", method));
        }
    };

    let response = match client.request(method, url).send().await {
        Ok(response) => response,
        Err(e) if e.is_timeout() => {
            return ProbeResult::new(HealthStatus::Timeout, started.elapsed())
                .with_message(format!("request to {} timed out", url));
        }
        Err(e) => {
            return ProbeResult::new(HealthStatus::Unhealthy, started.elapsed())
                .with_message(format!("request to {} failed: {}", url, e));
        }
    };

    let status = response.status().as_u16();
    let mut result = ProbeResult::new(HealthStatus::Healthy, started.elapsed());
    result.status_code = Some(status);

    if status != expected_status {
        result.status = HealthStatus::Unhealthy;
        result.message = Some(format!("expected status {}, got {}", expected_status, status));
        result.duration = started.elapsed();
        return result;
    }

    // Body checks only run when configured
    if expected_body.is_some() || expected_json.is_some() {
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) if e.is_timeout() => {
                result.status = HealthStatus::Timeout;
                result.message = Some(format!("reading body from {} timed out", url));
                result.duration = started.elapsed();
                return result;
            }
            Err(e) => {
                result.status = HealthStatus::Unhealthy;
                result.message = Some(format!("failed to read body: {}", e));
                result.duration = started.elapsed();
                return result;
            }
        };

        if let Some(expected) = expected_body {
            if !body.contains(expected.as_str()) {
                result.status = HealthStatus::Unhealthy;
                result.message = Some(format!("body does not contain {:?}", expected));
                result.duration = started.elapsed();
                return result;
            }
        }

        if let Some(expected) = expected_json {
            match serde_json::from_str::<serde_json::Value>(&body) {
                Ok(json) => {
                    for (field, want) in expected {
                        let got = json.get(field);
                        if got != Some(want) {
                            result.status = HealthStatus::Unhealthy;
                            result.message = Some(format!(
                                "json field {:?}: expected {}, got {}",
                                field,
                                want,
                                got.map(|v| v.to_string()).unwrap_or_else(|| "<missing>".into())
                            ));
                            result.duration = started.elapsed();
                            return result;
                        }
                    }
                }
                Err(e) => {
                    result.status = HealthStatus::Unhealthy;
                    result.message = Some(format!("body is not valid json: {}", e));
                    result.duration = started.elapsed();
                    return result;
                }
            }
        }
    }

    result.duration = started.elapsed();
    result
}

async fn probe_command(
    command: &str,
    expected_exit_code: i32,
    expected_output: &Option<String>,
    budget: Duration,
) -> ProbeResult {
    let started = Instant::now();
    trace!(command, "command probe");

    let output_fut = Command::new("sh").arg("-c").arg(command).kill_on_drop(true).output();

    let output = match timeout(budget, output_fut).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            return ProbeResult::new(HealthStatus::Unknown, started.elapsed())
                .with_message(format!("failed to spawn command: {}", e));
        }
        Err(_) => {
            return ProbeResult::new(HealthStatus::Timeout, started.elapsed())
                .with_message(format!("command {:?} timed out", command));
        }
    };

    let exit_code = output.status.code().unwrap_or(-1);
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();

    let mut result = ProbeResult::new(HealthStatus::Healthy, started.elapsed());
    result.exit_code = Some(exit_code);
    result.output = Some(stdout.clone());

    if exit_code != expected_exit_code {
        result.status = HealthStatus::Unhealthy;
        result.message =
            Some(format!("expected exit code {}, got {}", expected_exit_code, exit_code));
        return result;
    }

    if let Some(expected) = expected_output {
        if !stdout.contains(expected.as_str()) {
            result.status = HealthStatus::Unhealthy;
            result.message = Some(format!("stdout does not contain {:?}", expected));
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::super::{HealthGate, HealthStatus, ProbeConfig, ProbeSpec};
    use std::collections::HashMap;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn single_attempt(probe: ProbeSpec, timeout: Duration) -> ProbeConfig {
        ProbeConfig { probe, timeout, retries: 1, retry_delay: Duration::from_millis(10) }
    }

    #[tokio::test]
    async fn test_tcp_probe_healthy_when_listening() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();

        let config = single_attempt(
            ProbeSpec::Tcp { host: "127.0.0.1".to_string(), port },
            Duration::from_secs(1),
        );
        let result = HealthGate::check(&config).await;
        assert_eq!(result.status, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn test_tcp_probe_unhealthy_when_refused() {
        // Bind then drop to get a port with nothing listening on it.
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        drop(listener);

        let config = single_attempt(
            ProbeSpec::Tcp { host: "127.0.0.1".to_string(), port },
            Duration::from_secs(1),
        );
        let result = HealthGate::check(&config).await;
        assert_eq!(result.status, HealthStatus::Unhealthy);
        assert!(result.message.is_some());
    }

    #[tokio::test]
    async fn test_command_probe_exit_code_mismatch() {
        let config = single_attempt(
            ProbeSpec::Command {
                command: "exit 3".to_string(),
                expected_exit_code: 0,
                expected_output: None,
            },
            Duration::from_secs(5),
        );
        let result = HealthGate::check(&config).await;
        assert_eq!(result.status, HealthStatus::Unhealthy);
        assert_eq!(result.exit_code, Some(3));
    }

    #[tokio::test]
    async fn test_command_probe_expected_output() {
        let config = single_attempt(
            ProbeSpec::Command {
                command: "echo ready".to_string(),
                expected_exit_code: 0,
                expected_output: Some("ready".to_string()),
            },
            Duration::from_secs(5),
        );
        let result = HealthGate::check(&config).await;
        assert_eq!(result.status, HealthStatus::Healthy);
        assert!(result.output.expect("output").contains("ready"));
    }

    #[tokio::test]
    async fn test_command_probe_output_mismatch() {
        let config = single_attempt(
            ProbeSpec::Command {
                command: "echo nope".to_string(),
                expected_exit_code: 0,
                expected_output: Some("ready".to_string()),
            },
            Duration::from_secs(5),
        );
        let result = HealthGate::check(&config).await;
        assert_eq!(result.status, HealthStatus::Unhealthy);
    }

    #[tokio::test]
    async fn test_command_probe_timeout_is_distinct() {
        let config = single_attempt(
            ProbeSpec::Command {
                command: "sleep 5".to_string(),
                expected_exit_code: 0,
                expected_output: None,
            },
            Duration::from_millis(100),
        );
        let result = HealthGate::check(&config).await;
        assert_eq!(result.status, HealthStatus::Timeout);
    }

    /// Serve one canned HTTP response on an ephemeral port.
    async fn serve_once(body: &str, status_line: &str) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let response = format!(
            "{}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status_line,
            body.len(),
            body
        );
        tokio::spawn(async move {
            if let Ok((mut sock, _)) = listener.accept().await {
                let mut buf = [0u8; 2048];
                let _ = sock.read(&mut buf).await;
                let _ = sock.write_all(response.as_bytes()).await;
                let _ = sock.shutdown().await;
            }
        });
        port
    }

    fn http_probe(port: u16, expected_status: u16) -> ProbeSpec {
        ProbeSpec::Http {
            url: format!("http://127.0.0.1:{}/healthz", port),
            method: "GET".to_string(),
            expected_status,
            expected_body: None,
            expected_json: None,
        }
    }

    #[tokio::test]
    async fn test_http_probe_matching_status() {
        let port = serve_once("{\"status\":\"ok\"}", "HTTP/1.1 200 OK").await;
        let config = single_attempt(http_probe(port, 200), Duration::from_secs(2));
        let result = HealthGate::check(&config).await;
        assert_eq!(result.status, HealthStatus::Healthy);
        assert_eq!(result.status_code, Some(200));
    }

    #[tokio::test]
    async fn test_http_probe_status_mismatch() {
        let port = serve_once("oops", "HTTP/1.1 500 Internal Server Error").await;
        let config = single_attempt(http_probe(port, 200), Duration::from_secs(2));
        let result = HealthGate::check(&config).await;
        assert_eq!(result.status, HealthStatus::Unhealthy);
        assert_eq!(result.status_code, Some(500));
    }

    #[tokio::test]
    async fn test_http_probe_json_field_match() {
        let port = serve_once("{\"status\":\"ok\",\"ready\":true}", "HTTP/1.1 200 OK").await;
        let mut expected = HashMap::new();
        expected.insert("ready".to_string(), serde_json::Value::Bool(true));
        let config = single_attempt(
            ProbeSpec::Http {
                url: format!("http://127.0.0.1:{}/healthz", port),
                method: "GET".to_string(),
                expected_status: 200,
                expected_body: None,
                expected_json: Some(expected),
            },
            Duration::from_secs(2),
        );
        let result = HealthGate::check(&config).await;
        assert_eq!(result.status, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn test_http_probe_json_field_mismatch_records_detail() {
        let port = serve_once("{\"status\":\"starting\"}", "HTTP/1.1 200 OK").await;
        let mut expected = HashMap::new();
        expected.insert("status".to_string(), serde_json::Value::String("ok".to_string()));
        let config = single_attempt(
            ProbeSpec::Http {
                url: format!("http://127.0.0.1:{}/healthz", port),
                method: "GET".to_string(),
                expected_status: 200,
                expected_body: None,
                expected_json: Some(expected),
            },
            Duration::from_secs(2),
        );
        let result = HealthGate::check(&config).await;
        assert_eq!(result.status, HealthStatus::Unhealthy);
        assert!(result.message.expect("message").contains("status"));
    }

    #[tokio::test]
    async fn test_http_probe_body_substring() {
        let port = serve_once("service is up and running", "HTTP/1.1 200 OK").await;
        let config = single_attempt(
            ProbeSpec::Http {
                url: format!("http://127.0.0.1:{}/healthz", port),
                method: "GET".to_string(),
                expected_status: 200,
                expected_body: Some("up and running".to_string()),
                expected_json: None,
            },
            Duration::from_secs(2),
        );
        let result = HealthGate::check(&config).await;
        assert_eq!(result.status, HealthStatus::Healthy);
    }
}
