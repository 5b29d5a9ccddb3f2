//! VM driver abstraction.
//!
//! Single-VM provisioning (disk creation, boot configuration, hypervisor
//! control) lives entirely behind this trait; the orchestration engine only
//! asks for create-and-start, stop, and a best-effort info query.

use crate::error::Result;
use crate::types::VmSpec;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

mod command;
pub use command::CommandDriver;

/// External single-VM lifecycle primitive.
#[async_trait]
pub trait VmDriver: Send + Sync {
    /// Materialize and boot the VM described by `spec`.
    ///
    /// Blocks for the full boot time. Returns a driver-assigned identifier.
    async fn create_and_start(&self, spec: &VmSpec) -> Result<String>;

    /// Stop a VM. `force` requests a hard kill instead of a clean shutdown.
    async fn stop(&self, name: &str, force: bool) -> Result<()>;

    /// Query live VM state. Best-effort; callers must tolerate failure.
    async fn get_info(&self, name: &str) -> Result<VmInfo>;
}

/// Live VM information reported by the driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmInfo {
    /// Driver-reported state (e.g. "running", "shut off")
    pub state: String,

    /// Guest IP address, if known
    #[serde(default)]
    pub ip: Option<String>,
}
