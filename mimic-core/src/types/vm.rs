//! VM domain types.

use crate::health::ProbeConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

/// Declarative definition of a single VM within a fleet.
///
/// Built once at fleet load time and immutable thereafter; the orchestration
/// plan hands shared references (or clones) to the executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmSpec {
    /// Unique VM name (map key in the fleet file)
    pub name: String,

    /// Names of VMs that must be started before this one
    pub depends_on: Vec<String>,

    /// Where the single-VM configuration comes from
    pub source: VmSource,

    /// Readiness probe run after the VM starts (optional)
    pub health_check: Option<ProbeConfig>,

    /// Environment variables injected into the VM
    pub environment: HashMap<String, String>,

    /// Host path -> guest path volume mappings
    pub volumes: HashMap<String, String>,

    /// Free-form override fields merged into the single-VM config
    /// (fleet `defaults` with per-VM `vm:` entries layered on top)
    pub overrides: HashMap<String, serde_yaml::Value>,
}

/// Source of a VM's single-machine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VmSource {
    /// Path to a standalone single-VM config file
    Config(PathBuf),

    /// Name of a built-in template
    Template(String),
}

/// Orchestration state of a VM.
///
/// `Pending → Creating → Starting → Running → {Healthy | Unhealthy}`, and
/// independently `Running/Healthy/Unhealthy → Stopping → Stopped`. Any step
/// may divert to `Failed`, which is terminal for that invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VmState {
    /// Not yet touched by the executor
    Pending,

    /// VM is being materialized by the driver
    Creating,

    /// VM is booting
    Starting,

    /// VM is up; health not yet classified (or no probe configured)
    Running,

    /// VM is up and its health probe passed
    Healthy,

    /// VM is up but its health probe did not pass
    Unhealthy,

    /// VM is shutting down
    Stopping,

    /// VM is stopped
    Stopped,

    /// A lifecycle step failed
    Failed,
}

impl std::fmt::Display for VmState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Creating => write!(f, "creating"),
            Self::Starting => write!(f, "starting"),
            Self::Running => write!(f, "running"),
            Self::Healthy => write!(f, "healthy"),
            Self::Unhealthy => write!(f, "unhealthy"),
            Self::Stopping => write!(f, "stopping"),
            Self::Stopped => write!(f, "stopped"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Mutable per-VM record owned by the executor.
///
/// Created in `Pending` when the executor is built and kept for the
/// executor's lifetime, so state survives repeated `up`/`down` calls.
#[derive(Debug, Clone)]
pub struct VmRuntimeState {
    /// Current orchestration state
    pub state: VmState,

    /// Error from the most recent failed step, if any
    pub error: Option<String>,

    /// When the VM last entered `Running`
    pub started_at: Option<SystemTime>,

    /// Whether the health probe has passed at least once
    pub health_passed: bool,
}

impl Default for VmRuntimeState {
    fn default() -> Self {
        Self { state: VmState::Pending, error: None, started_at: None, health_passed: false }
    }
}

/// Combined in-memory and live-driver view of a VM, returned by `status()`.
#[derive(Debug, Clone, Serialize)]
pub struct VmStatusInfo {
    /// Orchestration state tracked by the executor
    pub state: VmState,

    /// State reported by the driver, or "unknown" if the query failed
    pub actual_state: String,

    /// IP address reported by the driver
    pub ip: Option<String>,

    /// Last recorded error, if any
    pub error: Option<String>,

    /// Whether the health probe has passed
    pub health_passed: bool,
}

/// Aggregate outcome of one `up()` or `down()` invocation.
///
/// Produced fresh per call and never mutated afterward.
#[derive(Debug, Clone)]
pub struct OrchestrationResult {
    /// True iff no VM in the working set recorded an error
    pub success: bool,

    /// Final orchestration state of every VM in the working set
    pub states: HashMap<String, VmState>,

    /// Per-VM error messages for failed lifecycle steps
    pub errors: HashMap<String, String>,

    /// Wall-clock duration of the whole invocation
    pub duration: Duration,
}
