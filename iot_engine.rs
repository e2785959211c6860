// Supply-Use to Input-Output transformation engine
// Baseline IOT derivation plus circular-economy policy scenarios

// ============================================================================
// INPUT REQUIREMENTS - IOT ENGINE
// ============================================================================
//
// SUPPLY-USE ACCOUNTS:
// Matrices: V (supply), U (use), Y (final demand), E (primary inputs)
// Extensions: Be/Br/Bm (environmental, resource, material) per industry
// Final-demand extensions: YBe/YBr/YBm per destination
// Orientation: V and U are product x industry, Y is product x destination
//
// AXIS LABELS:
// Products and industries: (category, region)
// Final-demand destinations: (stage, region)
// Extension rows: (code, unit)
//
// SCENARIO SPECIFICATIONS:
// One ordered list of intervention rows per scenario, each naming the target
// matrix, the A-side coordinate, the optional B-side coordinate and the
// coefficient pairs for life-cycle extension, sharing, recycling, expansion.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub mod iot_accounts;
pub mod iot_balance;
pub mod iot_coordinates;
pub mod iot_final_demand;
pub mod iot_labels;
pub mod iot_policy;
pub mod iot_results;
pub mod iot_scenario;
pub mod iot_table;
pub mod iot_transforms;

pub use iot_accounts::{AccountError, SupplyUseAccounts};
pub use iot_balance::{safe_reciprocal, verify_balance, BalanceQuantities};
pub use iot_coordinates::{AxisSelector, Coordinate, CoordinateError};
pub use iot_labels::{AxisLabels, AxisLevel, IotLabels, LabeledMatrix};
pub use iot_policy::{InterventionKind, InterventionRecord, PolicyEngine, PolicyError, PolicyRow};
pub use iot_results::{AnalysisRow, ResultSelector, ResultsError, Side};
pub use iot_scenario::{ScenarioEngine, ScenarioError, ScenarioId, ScenarioOutcome, ScenarioSpec};
pub use iot_table::IotTable;
pub use iot_transforms::TransformError;

/// Rows of the primary-input block that count as value added in the
/// balance check. The rows after these are non-primary extensions.
pub const PRIMARY_INPUT_ROWS: usize = 9;

// ---
// Configuration
// ---

/// Rule used to turn the asymmetric supply-use pair into a symmetric
/// product x product table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TechnologyAssumption {
    /// Industry-technology via the transformation matrix T
    TransformationCoefficient,
    /// Industry-technology via market-share coefficients D
    MarketShareCoefficient,
}

impl TechnologyAssumption {
    pub fn label(&self) -> &'static str {
        match self {
            Self::TransformationCoefficient => "pxp industry technology, transformation coefficients",
            Self::MarketShareCoefficient => "pxp industry technology, market share coefficients",
        }
    }
}

/// Ordered region identifiers shared by the labels, the coordinate resolver
/// and the scenario validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionVocabulary(Vec<String>);

impl RegionVocabulary {
    pub fn new<I, S>(regions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(regions.into_iter().map(Into::into).collect())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|r| r == name)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for RegionVocabulary {
    fn default() -> Self {
        Self::new(["EU", "ROW"])
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub method: TechnologyAssumption,
    pub regions: RegionVocabulary,
    pub primary_input_rows: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            method: TechnologyAssumption::TransformationCoefficient,
            regions: RegionVocabulary::default(),
            primary_input_rows: PRIMARY_INPUT_ROWS,
        }
    }
}

impl EngineConfig {
    pub fn with_method(mut self, method: TechnologyAssumption) -> Self {
        self.method = method;
        self
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: EngineConfig = serde_json::from_str(&raw)
            .with_context(|| format!("Malformed config {}", path.display()))?;
        if config.regions.is_empty() {
            anyhow::bail!("Config {} lists no regions", path.display());
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.method, TechnologyAssumption::TransformationCoefficient);
        assert_eq!(config.primary_input_rows, 9);
        assert!(config.regions.contains("EU"));
        assert!(config.regions.contains("ROW"));
        assert!(!config.regions.contains("US"));
    }

    #[test]
    fn test_config_partial_json() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"method": "market_share_coefficient"}"#).unwrap();
        assert_eq!(config.method, TechnologyAssumption::MarketShareCoefficient);
        assert_eq!(config.regions, RegionVocabulary::default());
        assert_eq!(config.primary_input_rows, PRIMARY_INPUT_ROWS);
    }

    #[test]
    fn test_config_custom_regions() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"regions": ["NL", "DE", "ROW"], "primary_input_rows": 3}"#)
                .unwrap();
        assert_eq!(config.regions.len(), 3);
        assert_eq!(config.regions.as_slice()[0], "NL");
        assert_eq!(config.primary_input_rows, 3);
    }
}
