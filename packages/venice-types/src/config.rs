//! Property-map configuration.
//!
//! The controller is configured from an environment-agnostic
//! `String -> String` property map. `ControllerConfig::from_properties`
//! parses that map into a typed struct with a sensible `Default`,
//! constructed once at startup.

use std::collections::HashMap;
use std::time::Duration;

use thiserror::Error;

/// A key was present but could not be parsed as the expected type.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },
}

/// Typed view of the property map recognized by the controller core.
/// Unrecognized keys are ignored.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    pub controller_cluster_name: String,
    pub controller_cluster_replica: u32,
    pub admin_port: u16,
    pub admin_secure_port: u16,
    pub message_bus_bootstrap_servers: String,
    pub message_bus_ssl_bootstrap_servers: Option<String>,
    pub deprecated_job_topic_retention_ms: u64,
    pub deprecated_job_topic_max_retention_ms: u64,
    pub min_number_of_unused_topics_to_preserve: u32,
    pub min_number_of_store_versions_to_preserve: u32,
    pub native_replication_source_fabric: Option<String>,
    pub ssl_allowlist: Vec<String>,
    pub min_number_of_partitions: u32,
    pub max_number_of_partitions: u32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            controller_cluster_name: "venice-controllers".to_string(),
            controller_cluster_replica: 3,
            admin_port: 7075,
            admin_secure_port: 7076,
            message_bus_bootstrap_servers: "localhost:9092".to_string(),
            message_bus_ssl_bootstrap_servers: None,
            // 5 minutes -- deprecated topics keep a short retention so
            // in-flight slow consumers can still finish.
            deprecated_job_topic_retention_ms: 5 * 60 * 1000,
            // 1 day -- a topic whose retention is above this is not yet
            // considered "truncated".
            deprecated_job_topic_max_retention_ms: 24 * 60 * 60 * 1000,
            min_number_of_unused_topics_to_preserve: 2,
            min_number_of_store_versions_to_preserve: 2,
            native_replication_source_fabric: None,
            ssl_allowlist: Vec::new(),
            min_number_of_partitions: 1,
            max_number_of_partitions: 1024,
        }
    }
}

impl ControllerConfig {
    /// Parses a property map of recognized keys.
    /// Missing keys fall back to the `Default`; present-but-malformed
    /// values are reported as `ConfigError::InvalidValue`.
    pub fn from_properties(props: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let mut cfg = Self::default();

        if let Some(v) = props.get("controllerClusterName") {
            cfg.controller_cluster_name = v.clone();
        }
        if let Some(v) = parse_opt::<u32>(props, "controllerClusterReplica")? {
            cfg.controller_cluster_replica = v;
        }
        if let Some(v) = parse_opt::<u16>(props, "adminPort")? {
            cfg.admin_port = v;
        }
        if let Some(v) = parse_opt::<u16>(props, "adminSecurePort")? {
            cfg.admin_secure_port = v;
        }
        if let Some(v) = props.get("messageBusBootstrapServers") {
            cfg.message_bus_bootstrap_servers = v.clone();
        }
        if let Some(v) = props.get("messageBusSslBootstrapServers") {
            cfg.message_bus_ssl_bootstrap_servers = Some(v.clone());
        }
        if let Some(v) = parse_opt::<u64>(props, "deprecatedJobTopicRetentionMs")? {
            cfg.deprecated_job_topic_retention_ms = v;
        }
        if let Some(v) = parse_opt::<u64>(props, "deprecatedJobTopicMaxRetentionMs")? {
            cfg.deprecated_job_topic_max_retention_ms = v;
        }
        if let Some(v) = parse_opt::<u32>(props, "minNumberOfUnusedTopicsToPreserve")? {
            cfg.min_number_of_unused_topics_to_preserve = v;
        }
        if let Some(v) = parse_opt::<u32>(props, "minNumberOfStoreVersionsToPreserve")? {
            cfg.min_number_of_store_versions_to_preserve = v;
        }
        if let Some(v) = props.get("nativeReplicationSourceFabric") {
            cfg.native_replication_source_fabric = Some(v.clone());
        }
        if let Some(v) = props.get("sslAllowlist") {
            cfg.ssl_allowlist = v.split(',').map(str::to_string).collect();
        }
        if let Some(v) = parse_opt::<u32>(props, "minNumberOfPartitions")? {
            cfg.min_number_of_partitions = v;
        }
        if let Some(v) = parse_opt::<u32>(props, "maxNumberOfPartitions")? {
            cfg.max_number_of_partitions = v;
        }

        Ok(cfg)
    }

    #[must_use]
    pub fn deprecated_retention(&self) -> Duration {
        Duration::from_millis(self.deprecated_job_topic_retention_ms)
    }

    #[must_use]
    pub fn deprecated_max_retention(&self) -> Duration {
        Duration::from_millis(self.deprecated_job_topic_max_retention_ms)
    }
}

fn parse_opt<T: std::str::FromStr>(
    props: &HashMap<String, String>,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    match props.get(key) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                reason: format!("could not parse '{raw}'"),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_map_empty() {
        let cfg = ControllerConfig::from_properties(&HashMap::new()).unwrap();
        assert_eq!(cfg, ControllerConfig::default());
    }

    #[test]
    fn overrides_recognized_keys() {
        let mut props = HashMap::new();
        props.insert("controllerClusterName".to_string(), "venice-ctl-1".to_string());
        props.insert("adminPort".to_string(), "9000".to_string());
        props.insert("sslAllowlist".to_string(), "TLSv1.2,TLSv1.3".to_string());

        let cfg = ControllerConfig::from_properties(&props).unwrap();
        assert_eq!(cfg.controller_cluster_name, "venice-ctl-1");
        assert_eq!(cfg.admin_port, 9000);
        assert_eq!(cfg.ssl_allowlist, vec!["TLSv1.2", "TLSv1.3"]);
    }

    #[test]
    fn malformed_numeric_value_is_reported() {
        let mut props = HashMap::new();
        props.insert("adminPort".to_string(), "not-a-port".to_string());
        let err = ControllerConfig::from_properties(&props).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key, .. } if key == "adminPort"));
    }

    #[test]
    fn unrecognized_keys_are_ignored() {
        let mut props = HashMap::new();
        props.insert("someUnknownKey".to_string(), "whatever".to_string());
        let cfg = ControllerConfig::from_properties(&props).unwrap();
        assert_eq!(cfg, ControllerConfig::default());
    }
}
