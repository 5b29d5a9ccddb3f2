//! Fleet file handling: parse the declarative multi-VM spec and convert it
//! into typed [`VmSpec`]s ready for planning.

mod converter;
mod parser;
mod types;

pub use converter::FleetConverter;
pub use parser::FleetParser;
pub use types::{Environment, FleetFile, VmEntry};

use crate::error::Result;
use crate::planner::{DependencyPlanner, OrchestrationPlan};
use std::path::Path;

/// Load a fleet file and build its orchestration plan in one step.
pub fn load<P: AsRef<Path> + std::fmt::Debug>(path: P) -> Result<OrchestrationPlan> {
    let file = FleetParser::parse_file(path)?;
    let specs = FleetConverter::convert(file)?;
    DependencyPlanner::build(specs)
}
