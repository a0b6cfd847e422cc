//! Admission configuration: the ordered plugin list with per-plugin settings,
//! read from a YAML (or JSON) file.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{AdmissionError, AdmissionResult};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration: Option<serde_json::Value>,
}

/// ```yaml
/// plugins:
///   - name: DisallowFoo
///     configuration:
///       namespaces: [kube-system]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdmissionConfig {
    #[serde(default)]
    pub plugins: Vec<PluginConfig>,
}

impl AdmissionConfig {
    /// Plugins in the given order, without configuration.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Self {
        Self {
            plugins: names
                .iter()
                .map(|n| n.as_ref().trim())
                .filter(|n| !n.is_empty())
                .map(|n| PluginConfig { name: n.to_string(), configuration: None })
                .collect(),
        }
    }

    pub fn from_yaml_str(s: &str) -> AdmissionResult<Self> {
        serde_yaml::from_str(s).map_err(|e| AdmissionError::config(format!("parse: {e}")))
    }

    pub fn load(path: &Path) -> AdmissionResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| AdmissionError::config(format!("read {}: {e}", path.display())))?;
        Self::from_yaml_str(&text)
    }

    /// Keep only plugins named in `enabled`, in the order given there. Plugins
    /// missing from the file are appended without configuration.
    pub fn select<S: AsRef<str>>(&self, enabled: &[S]) -> Self {
        let plugins = enabled
            .iter()
            .map(|n| n.as_ref().trim())
            .filter(|n| !n.is_empty())
            .map(|n| {
                self.plugins
                    .iter()
                    .find(|p| p.name == n)
                    .cloned()
                    .unwrap_or_else(|| PluginConfig { name: n.to_string(), configuration: None })
            })
            .collect();
        Self { plugins }
    }

    pub fn names(&self) -> Vec<&str> { self.plugins.iter().map(|p| p.name.as_str()).collect() }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
plugins:
  - name: AlwaysAdmit
  - name: DisallowFoo
    configuration:
      namespaces: [kube-system, restricted]
"#;

    #[test]
    fn parses_yaml() {
        let cfg = AdmissionConfig::from_yaml_str(SAMPLE).unwrap();
        assert_eq!(cfg.names(), vec!["AlwaysAdmit", "DisallowFoo"]);
        assert_eq!(cfg.plugins[0].configuration, None);
        assert_eq!(cfg.plugins[1].configuration, Some(serde_json::json!({"namespaces": ["kube-system", "restricted"]})));
    }

    #[test]
    fn json_is_yaml_too() {
        let cfg = AdmissionConfig::from_yaml_str(r#"{"plugins":[{"name":"AlwaysDeny"}]}"#).unwrap();
        assert_eq!(cfg.names(), vec!["AlwaysDeny"]);
        assert!(AdmissionConfig::from_yaml_str("plugins: 3").is_err());
    }

    #[test]
    fn select_orders_by_enabled_list() {
        let cfg = AdmissionConfig::from_yaml_str(SAMPLE).unwrap().select(&["DisallowFoo", "AlwaysDeny"]);
        assert_eq!(cfg.names(), vec!["DisallowFoo", "AlwaysDeny"]);
        assert!(cfg.plugins[0].configuration.is_some());
        assert_eq!(AdmissionConfig::from_names(&["a", " ", "b"]).names(), vec!["a", "b"]);
    }
}
