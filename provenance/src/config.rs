//! Configuration for the provenance engine.

use serde::{Deserialize, Serialize};

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// YAML could not be parsed
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A value is out of range
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Proposal approval policy
    pub governance: GovernanceConfig,
    /// Change log settings
    pub ledger: LedgerConfig,
    /// Event retention
    pub events: EventConfig,
    /// General settings
    pub general: GeneralConfig,
}

impl EngineConfig {
    /// Load config from YAML and validate it.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Reject values the engine cannot operate with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.governance.approval_threshold == 0 {
            return Err(ConfigError::Invalid(
                "governance.approval_threshold must be at least 1".to_string(),
            ));
        }
        if self.events.retention == 0 {
            return Err(ConfigError::Invalid(
                "events.retention must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Approval policy for governance proposals.
///
/// A proposal applies once the number of distinct approving parties reaches
/// `approval_threshold`. When `proposer_counts` is set, opening a proposal
/// counts as the proposer's approval and the proposer cannot approve again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernanceConfig {
    /// Distinct parties required to apply a proposal
    pub approval_threshold: usize,
    /// Whether the proposer counts toward the threshold
    pub proposer_counts: bool,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            approval_threshold: 2,
            proposer_counts: true,
        }
    }
}

impl GovernanceConfig {
    /// Policy where the proposer must approve their own proposal explicitly
    /// and that single approval applies it.
    pub fn self_approval() -> Self {
        Self {
            approval_threshold: 1,
            proposer_counts: false,
        }
    }
}

/// Which prior records a new data hash is compared against when a resource
/// enforces uniqueness.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UniquenessScope {
    /// Only the most recent record
    #[default]
    Latest,
    /// Every record ever appended
    History,
}

/// Change log configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Duplicate detection scope
    pub uniqueness_scope: UniquenessScope,
}

/// Event log configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventConfig {
    /// Maximum event records retained before pruning the oldest
    pub retention: usize,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self { retention: 10_000 }
    }
}

/// General configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Default log filter
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.governance.approval_threshold, 2);
        assert!(config.governance.proposer_counts);
        assert_eq!(config.ledger.uniqueness_scope, UniquenessScope::Latest);
        assert_eq!(config.events.retention, 10_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml_roundtrip() {
        let mut config = EngineConfig::default();
        config.ledger.uniqueness_scope = UniquenessScope::History;
        let yaml = config.to_yaml().unwrap();
        let parsed = EngineConfig::from_yaml(&yaml).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "governance:\n  approval_threshold: 3\n";
        let config = EngineConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.governance.approval_threshold, 3);
        assert!(config.governance.proposer_counts);
        assert_eq!(config.events.retention, 10_000);
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let yaml = "governance:\n  approval_threshold: 0\n";
        assert!(matches!(
            EngineConfig::from_yaml(yaml),
            Err(ConfigError::Invalid(_))
        ));
    }
}
