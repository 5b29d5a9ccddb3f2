//! Fleet file parser.
//!
//! Parses fleet YAML files and validates them before any VM is touched.

use super::types::{FleetFile, VmEntry};
use crate::error::{MimicError, Result};
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, instrument};

/// Parser for fleet files.
pub struct FleetParser;

impl FleetParser {
    /// Parse a fleet file from a string.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The YAML is invalid
    /// - The fleet file version is unsupported
    /// - No VMs are defined, or a VM names neither `config` nor `template`
    #[instrument(skip(content))]
    pub fn parse(content: &str) -> Result<FleetFile> {
        let fleet: FleetFile = serde_yaml::from_str(content)
            .map_err(|e| MimicError::FleetParseError { reason: e.to_string() })?;

        Self::validate_version(&fleet.version)?;
        Self::validate_vms(&fleet.vms)?;

        Ok(fleet)
    }

    /// Parse a fleet file from a file path.
    #[instrument]
    pub fn parse_file<P: AsRef<Path> + std::fmt::Debug>(path: P) -> Result<FleetFile> {
        let path = path.as_ref();
        info!("Reading fleet file from {:?}", path);

        let content = std::fs::read_to_string(path).map_err(|e| MimicError::FileReadError {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;

        Self::parse(&content)
    }

    /// Validate that the fleet file version is supported.
    ///
    /// Only version "1" is supported; an absent version is treated as "1".
    fn validate_version(version: &str) -> Result<()> {
        if version.is_empty() || version == "1" {
            Ok(())
        } else {
            Err(MimicError::UnsupportedFleetVersion { version: version.to_string() })
        }
    }

    /// Validate that VM entries are properly defined.
    fn validate_vms(vms: &HashMap<String, VmEntry>) -> Result<()> {
        if vms.is_empty() {
            return Err(MimicError::FleetParseError { reason: "No VMs defined".to_string() });
        }

        for (name, entry) in vms {
            match (&entry.config, &entry.template) {
                (None, None) => {
                    return Err(MimicError::InvalidConfig {
                        reason: format!("VM '{}' names neither a config nor a template", name),
                    });
                }
                (Some(_), Some(_)) => {
                    return Err(MimicError::InvalidConfig {
                        reason: format!("VM '{}' names both a config and a template", name),
                    });
                }
                _ => {}
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FLEET_YAML: &str = r#"
version: "1"
defaults:
  memory_mb: 1024
vms:
  db:
    template: postgres
    health_check:
      type: tcp
      port: 5432
  web:
    config: ./web.yaml
    depends_on: [db]
    environment:
      - DATABASE_URL=postgres://db:5432/app
    volumes:
      ./src: /app/src
    vm:
      memory_mb: 2048
"#;

    #[test]
    fn test_parse_full_fleet_file() {
        let fleet = FleetParser::parse(FLEET_YAML).expect("parse");
        assert_eq!(fleet.version, "1");
        assert_eq!(fleet.vms.len(), 2);

        let web = &fleet.vms["web"];
        assert_eq!(web.depends_on, vec!["db".to_string()]);
        assert_eq!(
            web.environment.to_map().get("DATABASE_URL"),
            Some(&"postgres://db:5432/app".to_string())
        );
        assert_eq!(web.volumes.get("./src"), Some(&"/app/src".to_string()));

        let db = &fleet.vms["db"];
        assert!(db.health_check.is_some());
        assert_eq!(db.template.as_deref(), Some("postgres"));
    }

    #[test]
    fn test_validate_version_accepts_one_and_empty() {
        assert!(FleetParser::validate_version("1").is_ok());
        assert!(FleetParser::validate_version("").is_ok());
    }

    #[test]
    fn test_validate_version_rejects_others() {
        let err = FleetParser::validate_version("2").unwrap_err();
        assert!(matches!(err, MimicError::UnsupportedFleetVersion { .. }));
        assert!(FleetParser::validate_version("0").is_err());
    }

    #[test]
    fn test_parse_rejects_unsupported_version() {
        let err = FleetParser::parse("version: \"3\"\nvms:\n  a:\n    template: t\n").unwrap_err();
        assert!(matches!(err, MimicError::UnsupportedFleetVersion { .. }));
    }

    #[test]
    fn test_parse_rejects_empty_vms() {
        let err = FleetParser::parse("version: \"1\"\nvms: {}\n").unwrap_err();
        assert!(matches!(err, MimicError::FleetParseError { .. }));
    }

    #[test]
    fn test_parse_rejects_vm_without_source() {
        let err = FleetParser::parse("version: \"1\"\nvms:\n  a: {}\n").unwrap_err();
        assert!(matches!(err, MimicError::InvalidConfig { .. }));
    }

    #[test]
    fn test_parse_rejects_vm_with_both_sources() {
        let err = FleetParser::parse(
            "version: \"1\"\nvms:\n  a:\n    config: ./a.yaml\n    template: t\n",
        )
        .unwrap_err();
        assert!(matches!(err, MimicError::InvalidConfig { .. }));
    }

    #[test]
    fn test_parse_rejects_invalid_yaml() {
        let err = FleetParser::parse("vms: [not: a map").unwrap_err();
        assert!(matches!(err, MimicError::FleetParseError { .. }));
    }
}
