//! Session and path-finding configuration loading.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::CoreError;
use crate::types::{MilliSatoshi, Satoshi};

/// Global parameters that control the trade-off in path finding between
/// fees and success probability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathFindingConfig {
    /// Fixed virtual cost in msat charged per payment attempt.
    #[serde(default = "default_attempt_cost_msat")]
    pub attempt_cost_msat: u64,
    /// Proportional virtual cost per attempt, in parts per million of the amount.
    #[serde(default = "default_attempt_cost_ppm")]
    pub attempt_cost_ppm: i64,
    /// Paths with a success probability below this are never returned.
    #[serde(default = "default_min_probability")]
    pub min_probability: f64,
}

/// Parameters scoped to a single payment session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Amount below which a payment is not split any further when no route
    /// is found.
    #[serde(default = "default_min_shard_amt_msat")]
    pub min_shard_amt_msat: u64,

    #[serde(default)]
    pub path_finding: PathFindingConfig,
}

fn default_attempt_cost_msat() -> u64 {
    100_000
}
fn default_attempt_cost_ppm() -> i64 {
    1_000
}
fn default_min_probability() -> f64 {
    0.01
}
fn default_min_shard_amt_msat() -> u64 {
    MilliSatoshi::from_satoshis(Satoshi(10_000)).0
}

impl Default for PathFindingConfig {
    fn default() -> Self {
        Self {
            attempt_cost_msat: default_attempt_cost_msat(),
            attempt_cost_ppm: default_attempt_cost_ppm(),
            min_probability: default_min_probability(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            min_shard_amt_msat: default_min_shard_amt_msat(),
            path_finding: PathFindingConfig::default(),
        }
    }
}

impl PathFindingConfig {
    pub fn validate(&self) -> Result<(), CoreError> {
        if !(0.0..=1.0).contains(&self.min_probability) {
            return Err(CoreError::InvalidConfig(format!(
                "min_probability must be within [0, 1], got {}",
                self.min_probability
            )));
        }
        if self.attempt_cost_ppm < 0 {
            return Err(CoreError::InvalidConfig(format!(
                "attempt_cost_ppm must not be negative, got {}",
                self.attempt_cost_ppm
            )));
        }
        Ok(())
    }
}

impl SessionConfig {
    /// Minimum shard amount as a typed value.
    pub fn min_shard_amt(&self) -> MilliSatoshi {
        MilliSatoshi(self.min_shard_amt_msat)
    }

    /// Parse from TOML, filling unspecified fields with defaults.
    pub fn from_toml_str(contents: &str) -> Result<Self, CoreError> {
        let config: SessionConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "session config not found, using defaults");
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.min_shard_amt_msat == 0 {
            return Err(CoreError::InvalidConfig(
                "min_shard_amt_msat must be greater than zero".into(),
            ));
        }
        self.path_finding.validate()
    }
}
