// Policy intervention engine
// Scenario rows -> in-place modification of labeled matrix copies
//
// Intervention kinds:
//   direct     a' = a (1 - kt/100 * kp/100)
//   indirect   the amount removed by the direct step at A, scaled by fx_kp/100,
//              is added onto the B coordinate; A itself keeps its value
//   expansion  a' = a (1 + e/100)
//
// Direct and indirect rows carry up to three coefficient pairs applied in the
// order life-cycle extension, sharing, recycling. Expansion rows apply only the
// expansion coefficient.

use std::fmt;
use std::str::FromStr;

use log::{debug, warn};
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::iot_coordinates::{self, Coordinate, CoordinateError};
use crate::iot_labels::LabeledMatrix;
use crate::RegionVocabulary;

#[derive(Debug, Error, PartialEq)]
pub enum PolicyError {
    #[error("Unknown intervention kind '{0}' (allowed: direct, indirect, expansion)")]
    UnknownIntervention(String),

    #[error("Row {row}: region '{region}' not allowed (allowed: {allowed})")]
    DisallowedRegion {
        row: usize,
        region: String,
        allowed: String,
    },

    #[error("Row {row}: region unspecified, set at least reg_A1 (allowed: {allowed})")]
    RegionUnspecified { row: usize, allowed: String },

    #[error("Row {row}: indirect intervention without fx_kp")]
    MissingSpillover { row: usize },

    #[error("Row {row}: targets matrix {found} but was applied to {expected}")]
    WrongMatrix {
        row: usize,
        expected: String,
        found: String,
    },

    #[error("Row {row}: change of shape {from:?} cannot be spread onto {to:?}")]
    ShapeMismatch {
        row: usize,
        from: (usize, usize),
        to: (usize, usize),
    },

    #[error("Row {row}: {source}")]
    Coordinate {
        row: usize,
        #[source]
        source: CoordinateError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterventionKind {
    Direct,
    Indirect,
    Expansion,
}

impl FromStr for InterventionKind {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "direct" => Ok(InterventionKind::Direct),
            "indirect" => Ok(InterventionKind::Indirect),
            "expansion" => Ok(InterventionKind::Expansion),
            other => Err(PolicyError::UnknownIntervention(other.to_string())),
        }
    }
}

impl fmt::Display for InterventionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InterventionKind::Direct => "direct",
            InterventionKind::Indirect => "indirect",
            InterventionKind::Expansion => "expansion",
        };
        f.write_str(name)
    }
}

/// One line of a scenario sheet. Field names follow the sheet columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyRow {
    pub intervention: String,
    pub matrix: String,

    #[serde(rename = "catA")]
    pub cat_a: Option<String>,
    #[serde(rename = "reg_A1")]
    pub reg_a1: Option<String>,
    #[serde(rename = "stageA")]
    pub stage_a: Option<String>,
    #[serde(rename = "reg_A2")]
    pub reg_a2: Option<String>,

    #[serde(rename = "catB")]
    pub cat_b: Option<String>,
    #[serde(rename = "reg_B1")]
    pub reg_b1: Option<String>,
    #[serde(rename = "stageB")]
    pub stage_b: Option<String>,
    #[serde(rename = "reg_B2")]
    pub reg_b2: Option<String>,

    pub life: Option<f64>,
    pub l_kp: Option<f64>,
    pub share: Option<f64>,
    pub s_kp: Option<f64>,
    pub recycle: Option<f64>,
    pub r_kp: Option<f64>,
    pub expansion: Option<f64>,
    pub fx_kp: Option<f64>,
}

impl PolicyRow {
    pub fn kind(&self) -> Result<InterventionKind, PolicyError> {
        self.intervention.parse()
    }

    pub fn primary(&self) -> Coordinate {
        Coordinate::new(
            self.cat_a.as_deref(),
            self.reg_a1.as_deref(),
            self.stage_a.as_deref(),
            self.reg_a2.as_deref(),
        )
    }

    /// B-side coordinate. Any B part left unset while its A counterpart is
    /// set takes the A value.
    pub fn secondary(&self) -> Coordinate {
        let mut defaulted = Vec::new();
        let mut pick = |b: &Option<String>, a: &Option<String>, name: &'static str| match (b, a) {
            (Some(b), _) => Some(b.clone()),
            (None, Some(a)) => {
                defaulted.push(name);
                Some(a.clone())
            }
            (None, None) => None,
        };
        let cat = pick(&self.cat_b, &self.cat_a, "catB");
        let reg1 = pick(&self.reg_b1, &self.reg_a1, "reg_B1");
        let stage = pick(&self.stage_b, &self.stage_a, "stageB");
        let reg2 = pick(&self.reg_b2, &self.reg_a2, "reg_B2");

        if !defaulted.is_empty() {
            warn!(
                "Matrix {}: {} assumed equal to the A side",
                self.matrix,
                defaulted.join(", ")
            );
        }
        Coordinate::new(cat.as_deref(), reg1.as_deref(), stage.as_deref(), reg2.as_deref())
    }

    /// Coefficient pairs in application order, with their names.
    fn coefficient_pairs(&self) -> [(&'static str, Option<f64>, Option<f64>); 3] {
        [
            ("life", self.life, self.l_kp),
            ("share", self.share, self.s_kp),
            ("recycle", self.recycle, self.r_kp),
        ]
    }

    fn regions(&self) -> impl Iterator<Item = &str> {
        [&self.reg_a1, &self.reg_a2, &self.reg_b1, &self.reg_b2]
            .into_iter()
            .filter_map(|r| r.as_deref())
    }
}

// ---
// Formulas
// ---

fn nan_to_zero(x: f64) -> f64 {
    if x.is_nan() {
        0.0
    } else {
        x
    }
}

/// `a (1 - kt/100 * kp/100)`
pub fn direct(a: &Array2<f64>, kt: f64, kp: f64) -> Array2<f64> {
    let factor = 1.0 - (kt * 1e-2) * (kp * 1e-2);
    a.mapv(|x| nan_to_zero(x * factor))
}

/// `d + c fx_kp/100`. `c` must already be broadcast to the shape of `d`.
pub fn indirect(d: &Array2<f64>, c: &ArrayView2<f64>, fx_kp: f64) -> Array2<f64> {
    let scale = fx_kp * 1e-2;
    let mut out = d.clone();
    out.zip_mut_with(c, |o, &x| *o = nan_to_zero(*o + x * scale));
    out
}

/// `a (1 + e/100)`
pub fn expansion(a: &Array2<f64>, e: f64) -> Array2<f64> {
    let factor = 1.0 + e * 1e-2;
    a.mapv(|x| nan_to_zero(x * factor))
}

// ---
// Application
// ---

/// What one applied sub-intervention did, read back from the matrix.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InterventionRecord {
    pub matrix: String,
    pub row: usize,
    pub kind: InterventionKind,
    /// life, share, recycle or expansion
    pub step: &'static str,
    pub kt: Option<f64>,
    pub kp: Option<f64>,
    pub expansion: Option<f64>,
    /// Coordinate that was written
    pub target: String,
    /// Slice at the A coordinate before the step
    pub original: Array2<f64>,
    /// Direct or expansion result at the A coordinate
    pub computed: Array2<f64>,
    /// Slice read back from the written coordinate
    pub applied: Array2<f64>,
}

/// Validated view of one row. `secondary` is resolved once, and only for
/// indirect rows.
struct PreparedRow<'r> {
    index: usize,
    kind: InterventionKind,
    row: &'r PolicyRow,
    secondary: Option<Coordinate>,
}

pub struct PolicyEngine {
    regions: RegionVocabulary,
}

impl PolicyEngine {
    pub fn new(regions: RegionVocabulary) -> Self {
        Self { regions }
    }

    pub fn regions(&self) -> &RegionVocabulary {
        &self.regions
    }

    fn allowed(&self) -> String {
        self.regions.as_slice().join(", ")
    }

    /// Checks made before any matrix is touched.
    pub fn check(&self, index: usize, row: &PolicyRow) -> Result<InterventionKind, PolicyError> {
        let kind = row.kind()?;

        for region in row.regions() {
            if !self.regions.contains(region) {
                return Err(PolicyError::DisallowedRegion {
                    row: index,
                    region: region.to_string(),
                    allowed: self.allowed(),
                });
            }
        }
        if row.reg_a1.is_none() && row.reg_a2.is_none() {
            return Err(PolicyError::RegionUnspecified {
                row: index,
                allowed: self.allowed(),
            });
        }
        if kind == InterventionKind::Indirect && row.fx_kp.is_none() {
            return Err(PolicyError::MissingSpillover { row: index });
        }
        Ok(kind)
    }

    /// Apply `rows` in order to `matrix`. Every row is checked first; on a
    /// failed check the matrix is left untouched.
    pub fn apply_rows<'r, I>(
        &self,
        matrix: &mut LabeledMatrix,
        rows: I,
    ) -> Result<Vec<InterventionRecord>, PolicyError>
    where
        I: IntoIterator<Item = &'r PolicyRow>,
    {
        let mut prepared = Vec::new();
        for (index, row) in rows.into_iter().enumerate() {
            if row.matrix != matrix.name {
                return Err(PolicyError::WrongMatrix {
                    row: index,
                    expected: matrix.name.clone(),
                    found: row.matrix.clone(),
                });
            }
            let kind = self.check(index, row)?;
            let secondary = (kind == InterventionKind::Indirect).then(|| row.secondary());
            prepared.push(PreparedRow {
                index,
                kind,
                row,
                secondary,
            });
        }

        let mut records = Vec::new();
        for p in &prepared {
            debug!("Matrix {}: applying {} row {}", matrix.name, p.kind, p.index);
            match p.kind {
                InterventionKind::Direct | InterventionKind::Indirect => {
                    for (step, kt, kp) in p.row.coefficient_pairs() {
                        match (kt, kp) {
                            (Some(kt), Some(kp)) => {
                                records.push(self.apply_reduction(matrix, p, step, kt, kp)?);
                            }
                            (None, None) => {}
                            // A lone coefficient is ignored, never read as NaN
                            _ => warn!(
                                "Matrix {}: row {} has a half-specified {} pair, skipped",
                                matrix.name, p.index, step
                            ),
                        }
                    }
                }
                InterventionKind::Expansion => match p.row.expansion {
                    Some(e) => records.push(self.apply_expansion(matrix, p, e)?),
                    None => warn!(
                        "Matrix {}: expansion row {} has no expansion coefficient, skipped",
                        matrix.name, p.index
                    ),
                },
            }
        }
        Ok(records)
    }

    fn apply_reduction(
        &self,
        matrix: &mut LabeledMatrix,
        p: &PreparedRow<'_>,
        step: &'static str,
        kt: f64,
        kp: f64,
    ) -> Result<InterventionRecord, PolicyError> {
        let coord_err = |source| PolicyError::Coordinate { row: p.index, source };

        let primary = p.row.primary();
        let sel_a = iot_coordinates::resolve(matrix, &primary, &self.regions).map_err(coord_err)?;
        let original = iot_coordinates::read(matrix, &sel_a);
        let computed = direct(&original, kt, kp);

        let (target, applied) = if let Some(secondary) = &p.secondary {
            let removed = &original - &computed;
            let sel_b =
                iot_coordinates::resolve(matrix, secondary, &self.regions).map_err(coord_err)?;
            let d = iot_coordinates::read(matrix, &sel_b);
            let spread = removed.broadcast(d.dim()).ok_or(PolicyError::ShapeMismatch {
                row: p.index,
                from: removed.dim(),
                to: d.dim(),
            })?;
            // fx_kp presence is checked up front
            let fx_kp = p.row.fx_kp.unwrap_or(0.0);
            iot_coordinates::write(matrix, &sel_b, &indirect(&d, &spread, fx_kp));
            (secondary.to_string(), iot_coordinates::read(matrix, &sel_b))
        } else {
            iot_coordinates::write(matrix, &sel_a, &computed);
            (primary.to_string(), iot_coordinates::read(matrix, &sel_a))
        };

        Ok(InterventionRecord {
            matrix: matrix.name.clone(),
            row: p.index,
            kind: p.kind,
            step,
            kt: Some(kt),
            kp: Some(kp),
            expansion: None,
            target,
            original,
            computed,
            applied,
        })
    }

    fn apply_expansion(
        &self,
        matrix: &mut LabeledMatrix,
        p: &PreparedRow<'_>,
        e: f64,
    ) -> Result<InterventionRecord, PolicyError> {
        let primary = p.row.primary();
        let sel = iot_coordinates::resolve(matrix, &primary, &self.regions)
            .map_err(|source| PolicyError::Coordinate { row: p.index, source })?;
        let original = iot_coordinates::read(matrix, &sel);
        let computed = expansion(&original, e);
        iot_coordinates::write(matrix, &sel, &computed);

        Ok(InterventionRecord {
            matrix: matrix.name.clone(),
            row: p.index,
            kind: p.kind,
            step: "expansion",
            kt: None,
            kp: None,
            expansion: Some(e),
            target: primary.to_string(),
            applied: iot_coordinates::read(matrix, &sel),
            original,
            computed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iot_labels::fixtures::two_region_labels;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn s_matrix() -> LabeledMatrix {
        let data = array![
            [10.0, 20.0, 30.0, 40.0],
            [50.0, 60.0, 70.0, 80.0],
            [90.0, 100.0, 110.0, 120.0],
            [130.0, 140.0, 150.0, 160.0],
        ];
        two_region_labels().label("S", data).unwrap()
    }

    fn engine() -> PolicyEngine {
        PolicyEngine::new(RegionVocabulary::default())
    }

    fn row(kind: &str) -> PolicyRow {
        PolicyRow {
            intervention: kind.to_string(),
            matrix: "S".to_string(),
            ..Default::default()
        }
    }

    fn some(s: &str) -> Option<String> {
        Some(s.to_string())
    }

    #[test]
    fn test_direct_boundaries() {
        let a = array![[3.0, -2.0]];
        assert_eq!(direct(&a, 0.0, 80.0), a);
        assert_eq!(direct(&a, 80.0, 0.0), a);
        assert_eq!(direct(&a, 100.0, 100.0), array![[0.0, 0.0]]);
        assert_eq!(direct(&array![[f64::NAN]], 50.0, 50.0), array![[0.0]]);
    }

    #[test]
    fn test_expansion_identity() {
        let a = array![[3.0, 7.5]];
        assert_eq!(expansion(&a, 0.0), a);
        assert_relative_eq!(expansion(&a, 20.0)[[0, 1]], 9.0, epsilon = 1e-12);
        assert_eq!(expansion(&a, -100.0), array![[0.0, 0.0]]);
    }

    #[test]
    fn test_indirect_conservation() {
        let a = array![[40.0]];
        let d = array![[5.0]];
        let removed = &a - &direct(&a, 50.0, 50.0);
        let out = indirect(&d, &removed.view(), 100.0);
        // The full removed amount lands on d
        assert_relative_eq!(out[[0, 0]] - d[[0, 0]], 10.0, epsilon = 1e-12);
    }

    #[test]
    fn test_intervention_kind_parse() {
        assert_eq!("indirect".parse::<InterventionKind>(), Ok(InterventionKind::Indirect));
        assert_eq!(
            "rebound".parse::<InterventionKind>(),
            Err(PolicyError::UnknownIntervention("rebound".to_string()))
        );
    }

    #[test]
    fn test_direct_row_quarter_reduction() {
        let mut m = s_matrix();
        let r = PolicyRow {
            cat_a: some("cars"),
            reg_a1: some("EU"),
            stage_a: some("steel"),
            reg_a2: some("ROW"),
            life: Some(50.0),
            l_kp: Some(50.0),
            ..row("direct")
        };
        let records = engine().apply_rows(&mut m, [&r]).unwrap();
        assert_eq!(records.len(), 1);
        assert_relative_eq!(m.data[[1, 2]], 52.5, epsilon = 1e-12);
        assert_eq!(records[0].original, array![[70.0]]);
        assert_eq!(records[0].applied, array![[52.5]]);

        let untouched = s_matrix();
        for ((i, j), v) in m.data.indexed_iter() {
            if (i, j) != (1, 2) {
                assert_eq!(*v, untouched.data[[i, j]]);
            }
        }
    }

    #[test]
    fn test_pairs_apply_in_sequence() {
        let mut m = s_matrix();
        let r = PolicyRow {
            cat_a: some("steel"),
            reg_a1: some("EU"),
            stage_a: some("steel"),
            reg_a2: some("EU"),
            life: Some(50.0),
            l_kp: Some(100.0),
            share: Some(20.0),
            s_kp: Some(50.0),
            recycle: Some(10.0),
            r_kp: None,
            ..row("direct")
        };
        let records = engine().apply_rows(&mut m, [&r]).unwrap();
        // life then share; recycle is half specified
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].step, "life");
        assert_eq!(records[1].step, "share");
        assert_relative_eq!(m.data[[0, 0]], 10.0 * 0.5 * 0.9, epsilon = 1e-12);
    }

    #[test]
    fn test_indirect_moves_delta_to_b() {
        let mut m = s_matrix();
        let r = PolicyRow {
            cat_a: some("steel"),
            reg_a1: some("EU"),
            stage_a: some("cars"),
            reg_a2: some("EU"),
            cat_b: some("steel"),
            reg_b1: some("ROW"),
            stage_b: some("cars"),
            reg_b2: some("EU"),
            life: Some(50.0),
            l_kp: Some(50.0),
            fx_kp: Some(100.0),
            ..row("indirect")
        };
        let records = engine().apply_rows(&mut m, [&r]).unwrap();
        // A keeps its value, B receives 25% of A
        assert_eq!(m.data[[0, 1]], 20.0);
        assert_relative_eq!(m.data[[2, 1]], 105.0, epsilon = 1e-12);
        assert_eq!(records[0].target, "[steel, ROW] x [cars, EU]");
    }

    #[test]
    fn test_indirect_b_defaults_to_a() {
        let mut m = s_matrix();
        let r = PolicyRow {
            cat_a: some("cars"),
            reg_a1: some("ROW"),
            stage_a: some("steel"),
            reg_a2: some("ROW"),
            reg_b1: some("EU"),
            life: Some(100.0),
            l_kp: Some(50.0),
            fx_kp: Some(50.0),
            ..row("indirect")
        };
        engine().apply_rows(&mut m, [&r]).unwrap();
        // B = (cars, EU) x (steel, ROW); removed 75, half of it moved
        assert_relative_eq!(m.data[[1, 2]], 70.0 + 37.5, epsilon = 1e-12);
        assert_eq!(m.data[[3, 2]], 150.0);
    }

    #[test]
    fn test_indirect_pairs_share_one_b_side() {
        let mut m = s_matrix();
        let r = PolicyRow {
            cat_a: some("cars"),
            reg_a1: some("ROW"),
            stage_a: some("steel"),
            reg_a2: some("ROW"),
            reg_b1: some("EU"),
            life: Some(50.0),
            l_kp: Some(50.0),
            share: Some(50.0),
            s_kp: Some(50.0),
            recycle: Some(50.0),
            r_kp: Some(50.0),
            fx_kp: Some(100.0),
            ..row("indirect")
        };
        let records = engine().apply_rows(&mut m, [&r]).unwrap();
        assert_eq!(records.len(), 3);
        for record in &records {
            assert_eq!(record.target, "[cars, EU] x [steel, ROW]");
        }
        // A stays at 150, so every sub-step moves 37.5
        assert_eq!(m.data[[3, 2]], 150.0);
        assert_relative_eq!(m.data[[1, 2]], 70.0 + 3.0 * 37.5, epsilon = 1e-12);
        assert_relative_eq!(records[2].applied[[0, 0]], 182.5, epsilon = 1e-12);
    }

    #[test]
    fn test_expansion_row() {
        let mut m = s_matrix();
        let r = PolicyRow {
            reg_a1: some("ROW"),
            stage_a: some("cars"),
            expansion: Some(10.0),
            life: Some(90.0),
            l_kp: Some(90.0),
            ..row("expansion")
        };
        let records = engine().apply_rows(&mut m, [&r]).unwrap();
        assert_eq!(records.len(), 1);
        assert_relative_eq!(m.data[[2, 1]], 110.0, epsilon = 1e-12);
        assert_relative_eq!(m.data[[3, 3]], 176.0, epsilon = 1e-12);
        assert_eq!(m.data[[0, 1]], 20.0);
    }

    #[test]
    fn test_region_errors() {
        let mut m = s_matrix();
        let unspecified = PolicyRow {
            cat_a: some("steel"),
            life: Some(10.0),
            l_kp: Some(10.0),
            ..row("direct")
        };
        let err = engine().apply_rows(&mut m, [&unspecified]).unwrap_err();
        assert!(matches!(err, PolicyError::RegionUnspecified { row: 0, .. }));

        let foreign = PolicyRow {
            reg_a1: some("EU"),
            reg_a2: some("US"),
            ..unspecified.clone()
        };
        let err = engine().apply_rows(&mut m, [&foreign]).unwrap_err();
        assert_eq!(
            err,
            PolicyError::DisallowedRegion {
                row: 0,
                region: "US".to_string(),
                allowed: "EU, ROW".to_string(),
            }
        );
        assert_eq!(m, s_matrix());
    }

    #[test]
    fn test_bad_row_rejected_before_mutation() {
        let mut m = s_matrix();
        let good = PolicyRow {
            reg_a1: some("EU"),
            life: Some(50.0),
            l_kp: Some(50.0),
            ..row("direct")
        };
        let bad = PolicyRow {
            reg_a1: some("EU"),
            ..row("substitution")
        };
        let err = engine().apply_rows(&mut m, [&good, &bad]).unwrap_err();
        assert_eq!(err, PolicyError::UnknownIntervention("substitution".to_string()));
        assert_eq!(m, s_matrix());

        let no_fx = PolicyRow {
            reg_a1: some("EU"),
            ..row("indirect")
        };
        let err = engine().apply_rows(&mut m, [&no_fx]).unwrap_err();
        assert_eq!(err, PolicyError::MissingSpillover { row: 0 });
    }

    #[test]
    fn test_policy_row_from_sheet_json() {
        let raw = r#"{
            "intervention": "direct", "matrix": "A",
            "catA": "steel", "reg_A1": "EU", "stageA": null, "reg_A2": "ROW",
            "life": 30.0, "l_kp": 60.0
        }"#;
        let r: PolicyRow = serde_json::from_str(raw).unwrap();
        assert_eq!(r.kind(), Ok(InterventionKind::Direct));
        assert_eq!(r.cat_a.as_deref(), Some("steel"));
        assert_eq!(r.reg_a2.as_deref(), Some("ROW"));
        assert!(r.stage_a.is_none());
        assert!(r.share.is_none());
    }
}
