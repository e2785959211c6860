// Scenario orchestrator
// Baseline table + policy rows -> counterfactual table
//
// Per scenario, on copies of the baseline:
//   1. policy on S
//   2. q = rowsum(S) + rowsum(Y), A = S inv(diag q)
//   3. policy on A, Y, RE, RBe, RBr, RBm, RYBe, RYBr, RYBm (in that order)
//   4. L = (I - A)^-1, q = L yi, S = A diag(q)
//   5. extension levels from coefficients, final-demand levels from diag(yj)
//   6. balance vector
// The baseline itself is never modified.

use std::fmt;
use std::sync::Arc;

use log::{info, warn};
use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::iot_accounts::{AccountError, SupplyUseAccounts};
use crate::iot_balance::{col_sums, diag, inv_diag, row_sums, verify_balance};
use crate::iot_labels::{IotLabels, LabelError};
use crate::iot_policy::{InterventionRecord, PolicyEngine, PolicyError, PolicyRow};
use crate::iot_table::{ExtensionPair, ExtensionSet, FinalDemandExtensionSet, IotTable};
use crate::iot_transforms::{derive_baseline, generic, TransformError};
use crate::EngineConfig;

/// Matrices open to policy rows, in application order.
pub const POLICY_TARGETS: [&str; 10] =
    ["S", "A", "Y", "RE", "RBe", "RBr", "RBm", "RYBe", "RYBr", "RYBm"];

const BASELINE_NAMES: [&str; 3] = ["baseline", "base", "0"];

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("Scenario identifier '{0}' must be an integer or scenario_<n>")]
    InvalidName(String),

    #[error("Invalid supply-use accounts: {0}")]
    Accounts(#[from] AccountError),

    #[error("Baseline derivation failed: {0}")]
    Baseline(#[source] TransformError),

    #[error("Scenario {scenario}: row {row} targets matrix {matrix}, which takes no interventions")]
    UnknownMatrix {
        scenario: String,
        row: usize,
        matrix: String,
    },

    #[error("Scenario {scenario}, matrix {matrix}: {source}")]
    Policy {
        scenario: String,
        matrix: String,
        #[source]
        source: PolicyError,
    },

    #[error("Scenario {scenario}: {source}")]
    Labels {
        scenario: String,
        #[source]
        source: LabelError,
    },

    #[error("Scenario {scenario}: {source}")]
    Transform {
        scenario: String,
        #[source]
        source: TransformError,
    },
}

/// Scenario identifier as written in a scenario sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScenarioId {
    Baseline,
    Named(String),
}

impl ScenarioId {
    /// `3` -> `scenario_3`, `scenario_x` kept as is, baseline aliases
    /// recognized. Anything else is rejected.
    pub fn parse(raw: &str) -> Result<Self, ScenarioError> {
        let raw = raw.trim();
        if BASELINE_NAMES.contains(&raw) {
            return Ok(ScenarioId::Baseline);
        }
        if raw.parse::<u32>().is_ok() {
            return Ok(ScenarioId::Named(format!("scenario_{}", raw)));
        }
        if raw.starts_with("scenario_") {
            return Ok(ScenarioId::Named(raw.to_string()));
        }
        Err(ScenarioError::InvalidName(raw.to_string()))
    }
}

impl fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScenarioId::Baseline => f.write_str("baseline"),
            ScenarioId::Named(name) => f.write_str(name),
        }
    }
}

/// One scenario sheet: a name and its ordered intervention rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioSpec {
    pub name: String,
    #[serde(default)]
    pub rows: Vec<PolicyRow>,
}

/// Result of one scenario run.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioOutcome {
    pub name: String,
    pub table: IotTable,
    pub interventions: Vec<InterventionRecord>,
}

pub struct ScenarioEngine {
    config: EngineConfig,
    labels: IotLabels,
    policy: PolicyEngine,
    baseline: Arc<IotTable>,
}

impl ScenarioEngine {
    /// Validate the accounts and derive the baseline once.
    pub fn new(
        accounts: &SupplyUseAccounts,
        labels: IotLabels,
        config: EngineConfig,
    ) -> Result<Self, ScenarioError> {
        accounts.validate()?;
        let baseline = derive_baseline(accounts, config.method, config.primary_input_rows)
            .map_err(ScenarioError::Baseline)?;
        info!(
            "Baseline ready, balance range [{:.3}, {:.3}]",
            baseline.ver.iter().cloned().fold(f64::INFINITY, f64::min),
            baseline.ver.iter().cloned().fold(f64::NEG_INFINITY, f64::max)
        );
        Ok(Self {
            policy: PolicyEngine::new(config.regions.clone()),
            config,
            labels,
            baseline: Arc::new(baseline),
        })
    }

    pub fn baseline(&self) -> &IotTable {
        &self.baseline
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn labels(&self) -> &IotLabels {
        &self.labels
    }

    /// Apply the rows of `spec` that target `target` to a copy-owned matrix.
    fn intervene(
        &self,
        name: &str,
        spec: &ScenarioSpec,
        target: &str,
        data: Array2<f64>,
        records: &mut Vec<InterventionRecord>,
    ) -> Result<Array2<f64>, ScenarioError> {
        let rows: Vec<&PolicyRow> = spec.rows.iter().filter(|r| r.matrix == target).collect();
        if rows.is_empty() {
            return Ok(data);
        }

        let mut matrix = self
            .labels
            .label(target, data)
            .map_err(|source| ScenarioError::Labels {
                scenario: name.to_string(),
                source,
            })?;
        let applied = self
            .policy
            .apply_rows(&mut matrix, rows)
            .map_err(|source| ScenarioError::Policy {
                scenario: name.to_string(),
                matrix: target.to_string(),
                source,
            })?;
        records.extend(applied);
        Ok(matrix.into_data())
    }

    /// Reject rows that can never apply before any copy is modified.
    fn check_rows(&self, name: &str, spec: &ScenarioSpec) -> Result<(), ScenarioError> {
        for (index, row) in spec.rows.iter().enumerate() {
            if !POLICY_TARGETS.contains(&row.matrix.as_str()) {
                return Err(ScenarioError::UnknownMatrix {
                    scenario: name.to_string(),
                    row: index,
                    matrix: row.matrix.clone(),
                });
            }
            self.policy
                .check(index, row)
                .map_err(|source| ScenarioError::Policy {
                    scenario: name.to_string(),
                    matrix: row.matrix.clone(),
                    source,
                })?;
        }
        Ok(())
    }

    /// Compute one scenario table. Baseline aliases return the baseline.
    pub fn scenario(&self, spec: &ScenarioSpec) -> Result<ScenarioOutcome, ScenarioError> {
        let name = match ScenarioId::parse(&spec.name)? {
            ScenarioId::Baseline => {
                warn!(
                    "'{}' names the baseline, no interventions applied",
                    spec.name
                );
                return Ok(ScenarioOutcome {
                    name: ScenarioId::Baseline.to_string(),
                    table: (*self.baseline).clone(),
                    interventions: Vec::new(),
                });
            }
            ScenarioId::Named(name) => name,
        };
        self.check_rows(&name, spec)?;
        info!("Scenario {}: {} intervention rows", name, spec.rows.len());

        let base = &self.baseline;
        let mut records = Vec::new();
        let mut step = |target: &str, data: &Array2<f64>| {
            self.intervene(&name, spec, target, data.clone(), &mut records)
        };

        let s = step("S", &base.s)?;
        let q = generic::total_output(&s, &base.y);
        let a = generic::technical_coefficients(&s, &inv_diag(&q));

        let a = step("A", &a)?;
        let y = step("Y", &base.y)?;
        let re = step("RE", &base.extensions.primary_inputs.coefficients)?;
        let rbe = step("RBe", &base.extensions.environmental.coefficients)?;
        let rbr = step("RBr", &base.extensions.resources.coefficients)?;
        let rbm = step("RBm", &base.extensions.materials.coefficients)?;
        let rybe = step("RYBe", &base.fd_extensions.environmental.coefficients)?;
        let rybr = step("RYBr", &base.fd_extensions.resources.coefficients)?;
        let rybm = step("RYBm", &base.fd_extensions.materials.coefficients)?;

        let l = generic::leontief(&a).map_err(|source| ScenarioError::Transform {
            scenario: name.clone(),
            source,
        })?;
        let yi = row_sums(&y.view());
        let diag_yj = diag(&col_sums(&y.view()));
        let q = generic::output_from_demand(&l, &yi);
        let diag_q = diag(&q);
        let s = generic::intermediates(&a, &diag_q);

        let extensions = ExtensionSet {
            primary_inputs: ExtensionPair::from_coefficients(re, &diag_q),
            environmental: ExtensionPair::from_coefficients(rbe, &diag_q),
            resources: ExtensionPair::from_coefficients(rbr, &diag_q),
            materials: ExtensionPair::from_coefficients(rbm, &diag_q),
        };
        let fd_extensions = FinalDemandExtensionSet {
            environmental: ExtensionPair::from_coefficients(rybe, &diag_yj),
            resources: ExtensionPair::from_coefficients(rybr, &diag_yj),
            materials: ExtensionPair::from_coefficients(rybm, &diag_yj),
        };
        let ver = verify_balance(
            &s,
            &y,
            &extensions.primary_inputs.levels,
            self.config.primary_input_rows,
        );

        Ok(ScenarioOutcome {
            name,
            table: IotTable {
                method: base.method,
                a,
                l,
                s,
                q,
                y,
                extensions,
                fd_extensions,
                ver,
                transformation: None,
            },
            interventions: records,
        })
    }

    /// Evaluate every scenario in parallel. A failing scenario is logged and
    /// reported in its slot; the others still complete.
    pub fn run_batch(
        &self,
        specs: &[ScenarioSpec],
    ) -> Vec<(String, Result<ScenarioOutcome, ScenarioError>)> {
        specs
            .par_iter()
            .map(|spec| {
                let result = self.scenario(spec);
                if let Err(e) = &result {
                    warn!("Scenario {} failed: {}", spec.name, e);
                }
                (spec.name.clone(), result)
            })
            .collect()
    }
}
