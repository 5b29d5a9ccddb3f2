//! Fleet file format types.

use crate::health::ProbeConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Root structure of a fleet file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetFile {
    /// Fleet file format version (currently "1")
    #[serde(default)]
    pub version: String,

    /// Override fields applied to every VM (per-VM `vm:` entries win)
    #[serde(default)]
    pub defaults: HashMap<String, serde_yaml::Value>,

    /// VMs to orchestrate, keyed by name
    pub vms: HashMap<String, VmEntry>,

    /// Named volumes (passed through to the driver)
    #[serde(default)]
    pub volumes: HashMap<String, serde_yaml::Value>,

    /// Networks (passed through to the driver)
    #[serde(default)]
    pub networks: HashMap<String, serde_yaml::Value>,
}

/// A single VM entry in a fleet file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmEntry {
    /// Path to a single-VM config file
    #[serde(default)]
    pub config: Option<PathBuf>,

    /// Built-in template name (alternative to `config`)
    #[serde(default)]
    pub template: Option<String>,

    /// VMs that must be started before this one
    #[serde(default)]
    pub depends_on: Vec<String>,

    /// Readiness probe
    #[serde(default)]
    pub health_check: Option<ProbeConfig>,

    /// Environment variables
    #[serde(default)]
    pub environment: Environment,

    /// Host path -> guest path volume mappings
    #[serde(default)]
    pub volumes: HashMap<String, String>,

    /// Override fields merged into the single-VM config
    #[serde(default)]
    pub vm: HashMap<String, serde_yaml::Value>,
}

/// Environment variables can be specified as a map or list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Environment {
    /// Environment as key-value map
    Map(HashMap<String, String>),
    /// Environment as list of KEY=value strings
    List(Vec<String>),
}

impl Default for Environment {
    fn default() -> Self {
        Environment::Map(HashMap::new())
    }
}

impl Environment {
    /// Convert environment to a HashMap regardless of input format.
    pub fn to_map(&self) -> HashMap<String, String> {
        match self {
            Environment::Map(map) => map.clone(),
            Environment::List(list) => list
                .iter()
                .filter_map(|s| {
                    let parts: Vec<&str> = s.splitn(2, '=').collect();
                    if parts.len() == 2 {
                        Some((parts[0].to_string(), parts[1].to_string()))
                    } else {
                        None
                    }
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_to_map_from_list() {
        let env = Environment::List(vec![
            "ENV=production".to_string(),
            "DEBUG=false".to_string(),
        ]);
        let map = env.to_map();
        assert_eq!(map.get("ENV"), Some(&"production".to_string()));
        assert_eq!(map.get("DEBUG"), Some(&"false".to_string()));
    }

    #[test]
    fn test_environment_to_map_from_map() {
        let mut expected = HashMap::new();
        expected.insert("ENV".to_string(), "production".to_string());
        let env = Environment::Map(expected.clone());
        assert_eq!(env.to_map(), expected);
    }

    #[test]
    fn test_environment_list_skips_malformed_entries() {
        let env = Environment::List(vec!["GOOD=1".to_string(), "BROKEN".to_string()]);
        let map = env.to_map();
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("GOOD"), Some(&"1".to_string()));
    }
}
