//! mimic core library
//!
//! Orchestration engine for cloning a workstation environment into a fleet
//! of interdependent VMs: dependency planning, concurrent lifecycle
//! execution, and health-gated readiness tracking.

pub mod audit;
pub mod driver;
pub mod error;
pub mod fleet;
pub mod health;
pub mod orchestrator;
pub mod planner;
pub mod types;

// Re-export commonly used items
pub use audit::{AuditEvent, AuditSink, LogAuditSink, NullAuditSink};
pub use driver::{CommandDriver, VmDriver, VmInfo};
pub use error::{MimicError, Result};
pub use health::{HealthGate, HealthStatus, ProbeConfig, ProbeResult, ProbeSpec};
pub use orchestrator::{LifecycleExecutor, DEFAULT_MAX_WORKERS};
pub use planner::{DependencyPlanner, OrchestrationPlan};
pub use types::{OrchestrationResult, VmRuntimeState, VmSource, VmSpec, VmState, VmStatusInfo};
