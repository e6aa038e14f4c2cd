use anyhow::{Context, Result};
use std::path::Path;

/// An f64 holds about 15 significant decimal digits, more places don't change the value.
pub const MAX_AVERAGE_DECIMALS: u32 = 15;

/// Knobs for the tree and aggregation passes.
/// Every field has a default, so a config file only needs to list what it changes.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Decimal places kept in `AggregateResult::average`.
    pub average_decimals: u32,
    /// Add the `[index]` suffix even when a fan-out list holds a single node.
    pub suffix_single_fan_out: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            average_decimals: 2,
            suffix_single_fan_out: false,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<EngineConfig> {
        serde_json::from_str(json).context("Failed to parse engine config")
    }

    pub fn load(path: &Path) -> Result<EngineConfig> {
        tracing::debug!("Reading engine config from {}", path.display());
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read engine config from {}", path.display()))?;
        Self::from_json_str(&json)
    }

    /// Round to `average_decimals` places, half away from zero. More than
    /// [`MAX_AVERAGE_DECIMALS`] places are treated as that many.
    pub fn round_average(&self, value: f64) -> f64 {
        let decimals = self.average_decimals.min(MAX_AVERAGE_DECIMALS);
        let factor = 10f64.powi(decimals as i32);
        (value * factor).round() / factor
    }
}
