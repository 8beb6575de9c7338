//! Tier quota resolution.
//!
//! Maps a caller's tier name to its quota. The table is built once from
//! validated configuration and never changes at runtime.

use std::collections::HashMap;
use std::time::Duration;

use tracing::debug;

use crate::config::{FloodgateConfig, TierConfig};
use crate::error::{FloodgateError, Result};

/// The quota attached to one tier: at most `limit` requests per `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierQuota {
    /// Maximum requests allowed in the window
    pub limit: u64,
    /// Window length
    pub window: Duration,
}

impl From<TierConfig> for TierQuota {
    fn from(config: TierConfig) -> Self {
        Self {
            limit: config.limit,
            window: config.window(),
        }
    }
}

/// Immutable tier-to-quota lookup table.
///
/// Unknown tier names resolve to the most restrictive configured quota
/// instead of erroring, so a mislabeled account degrades toward the
/// tightest policy rather than escaping rate limiting.
pub struct TierPolicy {
    quotas: HashMap<String, TierQuota>,
    fallback: TierQuota,
}

impl TierPolicy {
    /// Build a policy from a tier table. Fails on an empty table.
    pub fn new(quotas: HashMap<String, TierQuota>) -> Result<Self> {
        let fallback = quotas
            .values()
            .copied()
            .min_by_key(|q| q.limit)
            .ok_or_else(|| {
                FloodgateError::Config("at least one tier must be configured".to_string())
            })?;

        Ok(Self { quotas, fallback })
    }

    /// Build a policy from validated configuration.
    pub fn from_config(config: &FloodgateConfig) -> Result<Self> {
        let quotas = config
            .tiers
            .iter()
            .map(|(name, tier)| (name.clone(), TierQuota::from(*tier)))
            .collect();
        Self::new(quotas)
    }

    /// Resolve a tier name to its quota.
    pub fn resolve(&self, tier: &str) -> TierQuota {
        match self.quotas.get(tier) {
            Some(quota) => *quota,
            None => {
                debug!(
                    tier = tier,
                    fallback_limit = self.fallback.limit,
                    "Unknown tier, using most restrictive quota"
                );
                self.fallback
            }
        }
    }

    /// The smallest configured window, for sizing sweep intervals.
    pub fn smallest_window(&self) -> Duration {
        self.quotas
            .values()
            .map(|q| q.window)
            .min()
            .unwrap_or(self.fallback.window)
    }
}
