//! Command-line VM driver.
//!
//! Drives an external single-VM provisioner binary: `<prog> up <name> ...`,
//! `<prog> stop <name>`, `<prog> info <name> --json`. This keeps the whole
//! provisioning stack out of process while giving the executor the three
//! primitives it needs.

use super::{VmDriver, VmInfo};
use crate::error::{MimicError, Result};
use crate::types::{VmSource, VmSpec};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, instrument};

/// Driver that shells out to an external provisioner program.
pub struct CommandDriver {
    program: String,
}

impl CommandDriver {
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into() }
    }

    async fn run(&self, args: &[String]) -> Result<String> {
        debug!(program = %self.program, ?args, "invoking driver");

        let output = Command::new(&self.program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| MimicError::DriverCommand {
                program: self.program.clone(),
                reason: format!("failed to spawn: {}", e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MimicError::DriverCommand {
                program: self.program.clone(),
                reason: format!(
                    "exited with {}: {}",
                    output.status.code().unwrap_or(-1),
                    stderr.trim()
                ),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[async_trait]
impl VmDriver for CommandDriver {
    #[instrument(skip(self, spec), fields(vm = %spec.name))]
    async fn create_and_start(&self, spec: &VmSpec) -> Result<String> {
        let mut args = vec!["up".to_string(), spec.name.clone()];

        match &spec.source {
            VmSource::Config(path) => {
                args.push("--config".to_string());
                args.push(path.to_string_lossy().to_string());
            }
            VmSource::Template(template) => {
                args.push("--template".to_string());
                args.push(template.clone());
            }
        }

        for (key, value) in &spec.environment {
            args.push("--env".to_string());
            args.push(format!("{}={}", key, value));
        }

        for (host, guest) in &spec.volumes {
            args.push("--volume".to_string());
            args.push(format!("{}:{}", host, guest));
        }

        for (key, value) in &spec.overrides {
            let rendered = serde_yaml::to_string(value)
                .map_err(MimicError::internal)?
                .trim_end()
                .to_string();
            args.push("--set".to_string());
            args.push(format!("{}={}", key, rendered));
        }

        let stdout = self.run(&args).await?;
        let id = stdout.trim();
        Ok(if id.is_empty() { spec.name.clone() } else { id.to_string() })
    }

    #[instrument(skip(self))]
    async fn stop(&self, name: &str, force: bool) -> Result<()> {
        let mut args = vec!["stop".to_string(), name.to_string()];
        if force {
            args.push("--force".to_string());
        }
        self.run(&args).await?;
        Ok(())
    }

    async fn get_info(&self, name: &str) -> Result<VmInfo> {
        let args =
            vec!["info".to_string(), name.to_string(), "--json".to_string()];
        let stdout = self.run(&args).await?;

        serde_json::from_str(stdout.trim()).map_err(|e| MimicError::DriverCommand {
            program: self.program.clone(),
            reason: format!("invalid info payload: {}", e),
        })
    }
}
