//! Fleet file to VM spec converter.
//!
//! Layers fleet-wide `defaults` under each VM's `vm:` overrides and produces
//! the strongly-typed [`VmSpec`] map the planner consumes.

use super::types::FleetFile;
use crate::error::{MimicError, Result};
use crate::types::{VmSource, VmSpec};
use std::collections::HashMap;
use tracing::instrument;

/// Converter from a parsed fleet file to VM specs.
pub struct FleetConverter;

impl FleetConverter {
    /// Convert a fleet file into VM specs keyed by name.
    #[instrument(skip(fleet), fields(vms = fleet.vms.len()))]
    pub fn convert(fleet: FleetFile) -> Result<HashMap<String, VmSpec>> {
        let defaults = fleet.defaults;
        let mut specs = HashMap::with_capacity(fleet.vms.len());

        for (name, entry) in fleet.vms {
            let source = match (entry.config, entry.template) {
                (Some(path), None) => VmSource::Config(path),
                (None, Some(template)) => VmSource::Template(template),
                // The parser rejects these before conversion.
                _ => {
                    return Err(MimicError::InvalidConfig {
                        reason: format!("VM '{}' must name exactly one of config or template", name),
                    });
                }
            };

            let mut overrides = defaults.clone();
            overrides.extend(entry.vm);

            specs.insert(
                name.clone(),
                VmSpec {
                    name,
                    depends_on: entry.depends_on,
                    source,
                    health_check: entry.health_check,
                    environment: entry.environment.to_map(),
                    volumes: entry.volumes,
                    overrides,
                },
            );
        }

        Ok(specs)
    }
}
