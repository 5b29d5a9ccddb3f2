//! Core domain types.

pub mod vm;

pub use vm::{
    OrchestrationResult, VmRuntimeState, VmSource, VmSpec, VmState, VmStatusInfo,
};
