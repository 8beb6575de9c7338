//! Configuration management for floodgate.
//!
//! Configuration is loaded once at process start, validated, and never
//! mutated afterwards. Runtime reconfiguration is deliberately unsupported.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::error::{FloodgateError, Result};

/// Upper bound on a window length (one year). Anything larger is a
/// configuration mistake, and keeping windows below this bound makes
/// duration conversions infallible.
pub const MAX_WINDOW_SECS: u64 = 365 * 86_400;

/// Main configuration for the floodgate engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FloodgateConfig {
    /// Per-tier quota table
    #[serde(default = "default_tiers")]
    pub tiers: HashMap<String, TierConfig>,

    /// Sweeper configuration
    #[serde(default)]
    pub sweeper: SweeperConfig,
}

impl Default for FloodgateConfig {
    fn default() -> Self {
        Self {
            tiers: default_tiers(),
            sweeper: SweeperConfig::default(),
        }
    }
}

/// Quota for a single tier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TierConfig {
    /// Maximum requests allowed per window
    pub limit: u64,

    /// Window length in seconds
    pub window_secs: u64,
}

impl TierConfig {
    /// The window length as a duration.
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Sweeper configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SweeperConfig {
    /// How often the sweeper scans for idle entries, in seconds
    #[serde(default = "default_sweep_interval")]
    pub interval_secs: u64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_sweep_interval(),
        }
    }
}

impl SweeperConfig {
    /// The sweep interval as a duration.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

fn default_tiers() -> HashMap<String, TierConfig> {
    HashMap::from([
        (
            "tier1".to_string(),
            TierConfig {
                limit: 60,
                window_secs: 60,
            },
        ),
        (
            "tier2".to_string(),
            TierConfig {
                limit: 120,
                window_secs: 60,
            },
        ),
        (
            "tier3".to_string(),
            TierConfig {
                limit: 300,
                window_secs: 60,
            },
        ),
    ])
}

fn default_sweep_interval() -> u64 {
    120
}

impl FloodgateConfig {
    /// Load configuration from a YAML file and validate it.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string and validate it.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: FloodgateConfig = serde_yaml::from_str(yaml)
            .map_err(|e| FloodgateError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject invalid quotas before any traffic is served.
    pub fn validate(&self) -> Result<()> {
        if self.tiers.is_empty() {
            return Err(FloodgateError::Config(
                "at least one tier must be configured".to_string(),
            ));
        }

        for (name, tier) in &self.tiers {
            if tier.limit == 0 {
                return Err(FloodgateError::Config(format!(
                    "tier {}: limit must be greater than zero",
                    name
                )));
            }
            if tier.window_secs == 0 {
                return Err(FloodgateError::Config(format!(
                    "tier {}: window must be greater than zero",
                    name
                )));
            }
            if tier.window_secs > MAX_WINDOW_SECS {
                return Err(FloodgateError::Config(format!(
                    "tier {}: window exceeds {} seconds",
                    name, MAX_WINDOW_SECS
                )));
            }
        }

        if self.sweeper.interval_secs == 0 {
            return Err(FloodgateError::Config(
                "sweeper interval must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = FloodgateConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tiers["tier1"].limit, 60);
        assert_eq!(config.tiers["tier2"].limit, 120);
        assert_eq!(config.tiers["tier3"].limit, 300);
        assert_eq!(config.sweeper.interval_secs, 120);
    }

    #[test]
    fn test_parse_yaml_config() {
        let yaml = r#"
tiers:
  tier1:
    limit: 10
    window_secs: 30
  internal:
    limit: 5000
    window_secs: 60
sweeper:
  interval_secs: 90
"#;
        let config = FloodgateConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.tiers.len(), 2);
        assert_eq!(config.tiers["tier1"].window(), Duration::from_secs(30));
        assert_eq!(config.tiers["internal"].limit, 5000);
        assert_eq!(config.sweeper.interval(), Duration::from_secs(90));
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config = FloodgateConfig::from_yaml("sweeper:\n  interval_secs: 30\n").unwrap();
        assert_eq!(config.tiers.len(), 3);
        assert_eq!(config.sweeper.interval_secs, 30);
    }

    #[test]
    fn test_zero_limit_rejected() {
        let yaml = r#"
tiers:
  tier1:
    limit: 0
    window_secs: 60
"#;
        let err = FloodgateConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("limit must be greater than zero"));
    }

    #[test]
    fn test_zero_window_rejected() {
        let yaml = r#"
tiers:
  tier1:
    limit: 60
    window_secs: 0
"#;
        assert!(FloodgateConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_empty_tier_table_rejected() {
        let yaml = "tiers: {}\n";
        assert!(FloodgateConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_zero_sweep_interval_rejected() {
        let yaml = r#"
sweeper:
  interval_secs: 0
"#;
        assert!(FloodgateConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_oversized_window_rejected() {
        let yaml = r#"
tiers:
  tier1:
    limit: 60
    window_secs: 99999999999
"#;
        assert!(FloodgateConfig::from_yaml(yaml).is_err());
    }
}
