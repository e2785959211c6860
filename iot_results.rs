// Result selection and scenario differences
// Analysis rows pick extension values out of finished tables

use log::warn;
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::iot_coordinates::{self, AxisSelector, Coordinate, CoordinateError};
use crate::iot_labels::{IotLabels, LabelError};
use crate::iot_table::IotTable;
use crate::RegionVocabulary;

#[derive(Debug, Error, PartialEq)]
pub enum ResultsError {
    #[error("Matrix {0} is not a labeled matrix of the table")]
    UnknownMatrix(String),

    #[error(transparent)]
    Labels(#[from] LabelError),

    #[error(transparent)]
    Coordinate(#[from] CoordinateError),

    #[error("Cannot compare {name}: shapes {left:?} and {right:?}")]
    ShapeMismatch {
        name: &'static str,
        left: Vec<usize>,
        right: Vec<usize>,
    },
}

/// Which comparison side of an analysis row a table reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Baseline reads stageA / regA
    Baseline,
    /// Scenarios read stageB / regB
    Scenario,
}

/// One line of the analysis sheet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisRow {
    pub matrix: String,
    pub ext: Option<String>,
    #[serde(rename = "stageA")]
    pub stage_a: Option<String>,
    #[serde(rename = "stageB")]
    pub stage_b: Option<String>,
    #[serde(rename = "regA")]
    pub reg_a: Option<String>,
    #[serde(rename = "regB")]
    pub reg_b: Option<String>,
}

impl AnalysisRow {
    /// Fill an unset B stage or region from the A side.
    pub fn with_defaults(&self) -> Self {
        let mut row = self.clone();
        if row.stage_b.is_none() && row.stage_a.is_some() {
            warn!(
                "{}, {}: stageB assumed equal to stageA",
                row.matrix,
                row.ext.as_deref().unwrap_or("all")
            );
            row.stage_b = row.stage_a.clone();
        }
        if row.reg_b.is_none() && row.reg_a.is_some() {
            warn!(
                "{}, {}: regB assumed equal to regA",
                row.matrix,
                row.ext.as_deref().unwrap_or("all")
            );
            row.reg_b = row.reg_a.clone();
        }
        row
    }

    /// (region, stage) for one side. Call on a defaulted row.
    pub fn side(&self, side: Side) -> (Option<&str>, Option<&str>) {
        match side {
            Side::Baseline => (self.reg_a.as_deref(), self.stage_a.as_deref()),
            Side::Scenario => (self.reg_b.as_deref(), self.stage_b.as_deref()),
        }
    }
}

/// One selected block with display keys.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectedResult {
    /// `<matrix>, <ext>, <region>, <stage>`
    pub key: String,
    pub rows: Vec<String>,
    pub cols: Vec<String>,
    pub values: Array2<f64>,
}

fn result_key(matrix: &str, ext: Option<&str>, region: Option<&str>, stage: Option<&str>) -> String {
    [matrix, ext.unwrap_or("all"), region.unwrap_or("all"), stage.unwrap_or("all")].join(", ")
}

pub struct ResultSelector<'a> {
    labels: &'a IotLabels,
    regions: &'a RegionVocabulary,
}

impl<'a> ResultSelector<'a> {
    pub fn new(labels: &'a IotLabels, regions: &'a RegionVocabulary) -> Self {
        Self { labels, regions }
    }

    /// Extension `ext` by product/stage and region. A region without a
    /// product/stage is summed over that region's columns.
    pub fn select(
        &self,
        table: &IotTable,
        matrix: &str,
        ext: Option<&str>,
        region: Option<&str>,
        product: Option<&str>,
    ) -> Result<SelectedResult, ResultsError> {
        let data = table
            .matrix(matrix)
            .ok_or_else(|| ResultsError::UnknownMatrix(matrix.to_string()))?;
        let mut labeled = self.labels.label(matrix, data.clone())?;

        let coordinate = Coordinate {
            rows: ext.map_or(AxisSelector::All, |e| AxisSelector::Label(e.to_string())),
            cols: AxisSelector::from_parts(product, region),
        };
        let selection = iot_coordinates::resolve(&mut labeled, &coordinate, self.regions)?;
        let values = iot_coordinates::read(&labeled, &selection);

        let rows = selection
            .rows
            .iter()
            .map(|&i| labeled.rows.keys[i].join(", "))
            .collect();
        let (cols, values) = match coordinate.cols {
            AxisSelector::Region(ref r) => {
                let summed = values.sum_axis(Axis(1)).insert_axis(Axis(1));
                (vec![r.clone()], summed)
            }
            _ => {
                let cols = selection
                    .cols
                    .iter()
                    .map(|&j| labeled.cols.keys[j].join(", "))
                    .collect();
                (cols, values)
            }
        };

        Ok(SelectedResult {
            key: result_key(matrix, ext, region, product),
            rows,
            cols,
            values,
        })
    }

    /// Every analysis row read from one table.
    pub fn gather(
        &self,
        table: &IotTable,
        analysis: &[AnalysisRow],
        side: Side,
    ) -> Result<Vec<SelectedResult>, ResultsError> {
        analysis
            .iter()
            .map(|row| {
                let row = row.with_defaults();
                let (region, stage) = row.side(side);
                self.select(table, &row.matrix, row.ext.as_deref(), region, stage)
            })
            .collect()
    }
}

// ---
// Differences between two tables
// ---

/// `Y - Y_alt`
pub fn delta_y(y: &Array2<f64>, y_alt: &Array2<f64>) -> Result<Array2<f64>, ResultsError> {
    if y.shape() != y_alt.shape() {
        return Err(ResultsError::ShapeMismatch {
            name: "Y",
            left: y.shape().to_vec(),
            right: y_alt.shape().to_vec(),
        });
    }
    Ok(y - y_alt)
}

/// `(L - L_alt) y`
pub fn delta_q(
    l: &Array2<f64>,
    l_alt: &Array2<f64>,
    y: &Array1<f64>,
) -> Result<Array1<f64>, ResultsError> {
    if l.shape() != l_alt.shape() || l.ncols() != y.len() {
        return Err(ResultsError::ShapeMismatch {
            name: "L",
            left: l.shape().to_vec(),
            right: l_alt.shape().to_vec(),
        });
    }
    Ok((l - l_alt).dot(y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iot_accounts::fixtures::toy_accounts;
    use crate::iot_labels::fixtures::toy_labels;
    use crate::iot_transforms::derive_baseline;
    use crate::TechnologyAssumption;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn table() -> IotTable {
        derive_baseline(&toy_accounts(), TechnologyAssumption::TransformationCoefficient, 9).unwrap()
    }

    fn regions() -> RegionVocabulary {
        RegionVocabulary::new(["EU"])
    }

    #[test]
    fn test_select_single_product() {
        let (table, labels, regions) = (table(), toy_labels(), regions());
        let selector = ResultSelector::new(&labels, &regions);
        let res = selector
            .select(&table, "Be", Some("CO2"), Some("EU"), Some("mining"))
            .unwrap();
        assert_eq!(res.key, "Be, CO2, EU, mining");
        assert_eq!(res.rows, vec!["CO2, kg".to_string()]);
        assert_eq!(res.cols, vec!["mining, EU".to_string()]);
        assert_abs_diff_eq!(res.values[[0, 0]], table.extensions.environmental.levels[[0, 1]], epsilon = 1e-12);
    }

    #[test]
    fn test_select_region_sums_columns() {
        let (table, labels, regions) = (table(), toy_labels(), regions());
        let selector = ResultSelector::new(&labels, &regions);
        let res = selector.select(&table, "Be", Some("CH4"), Some("EU"), None).unwrap();
        let total: f64 = table.extensions.environmental.levels.row(1).sum();
        assert_eq!(res.values.dim(), (1, 1));
        assert_eq!(res.cols, vec!["EU".to_string()]);
        assert_abs_diff_eq!(res.values[[0, 0]], total, epsilon = 1e-12);
    }

    #[test]
    fn test_select_unknown_matrix() {
        let (table, labels, regions) = (table(), toy_labels(), regions());
        let selector = ResultSelector::new(&labels, &regions);
        assert_eq!(
            selector.select(&table, "q", None, None, None).unwrap_err(),
            ResultsError::UnknownMatrix("q".to_string())
        );
    }

    #[test]
    fn test_analysis_b_side_defaults() {
        let row = AnalysisRow {
            matrix: "YBe".to_string(),
            ext: Some("CO2".to_string()),
            stage_a: Some("households".to_string()),
            reg_a: Some("EU".to_string()),
            ..Default::default()
        };
        let filled = row.with_defaults();
        assert_eq!(filled.side(Side::Scenario), (Some("EU"), Some("households")));
        assert_eq!(filled.side(Side::Baseline), filled.side(Side::Scenario));
    }

    #[test]
    fn test_gather_sides() {
        let (table, labels, regions) = (table(), toy_labels(), regions());
        let selector = ResultSelector::new(&labels, &regions);
        let analysis = vec![AnalysisRow {
            matrix: "YBe".to_string(),
            ext: Some("CO2".to_string()),
            stage_a: Some("households".to_string()),
            stage_b: Some("government".to_string()),
            reg_a: Some("EU".to_string()),
            ..Default::default()
        }];
        let base = selector.gather(&table, &analysis, Side::Baseline).unwrap();
        let scen = selector.gather(&table, &analysis, Side::Scenario).unwrap();
        assert_eq!(base[0].key, "YBe, CO2, EU, households");
        assert_eq!(scen[0].key, "YBe, CO2, EU, government");
        assert_abs_diff_eq!(base[0].values[[0, 0]], table.fd_extensions.environmental.levels[[0, 0]], epsilon = 1e-12);
        assert_abs_diff_eq!(scen[0].values[[0, 0]], table.fd_extensions.environmental.levels[[0, 1]], epsilon = 1e-12);
    }

    #[test]
    fn test_differences() {
        let y = array![[4.0, 1.0], [2.0, 2.0]];
        let y_alt = array![[3.0, 1.0], [2.0, 0.5]];
        assert_eq!(delta_y(&y, &y_alt).unwrap(), array![[1.0, 0.0], [0.0, 1.5]]);

        let l = array![[1.5, 0.2], [0.1, 1.2]];
        let l_alt = array![[1.25, 0.2], [0.1, 1.0]];
        let d = delta_q(&l, &l_alt, &array![4.0, 5.0]).unwrap();
        assert_abs_diff_eq!(d[0], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(d[1], 1.0, epsilon = 1e-12);

        assert!(matches!(
            delta_y(&y, &array![[1.0]]),
            Err(ResultsError::ShapeMismatch { name: "Y", .. })
        ));
    }
}
