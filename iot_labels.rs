// Axis labels for IOT matrices
// Two-part keys per axis entry, kept apart from the numeric arrays

use std::fmt;

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum LabelError {
    #[error("Matrix {matrix}: {axis} has {actual} entries but {expected} labels")]
    LengthMismatch {
        matrix: String,
        axis: &'static str,
        actual: usize,
        expected: usize,
    },

    #[error("No label layout known for matrix {0}")]
    UnknownMatrix(String),
}

/// Name of one level of a two-part axis key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AxisLevel {
    Category,
    Region,
    Stage,
    Code,
    Unit,
}

impl fmt::Display for AxisLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AxisLevel::Category => "category",
            AxisLevel::Region => "region",
            AxisLevel::Stage => "stage",
            AxisLevel::Code => "code",
            AxisLevel::Unit => "unit",
        };
        f.write_str(name)
    }
}

/// Keys of one matrix axis. `levels` names the two key positions in their
/// current order; every key in `keys` follows that order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisLabels {
    pub levels: [AxisLevel; 2],
    pub keys: Vec<[String; 2]>,
}

impl AxisLabels {
    pub fn new(levels: [AxisLevel; 2], keys: Vec<[String; 2]>) -> Self {
        Self { levels, keys }
    }

    /// Region-major block layout: every category of the first region, then
    /// every category of the next one.
    pub fn regional<S: AsRef<str>>(leading: AxisLevel, labels: &[S], regions: &[S]) -> Self {
        let mut keys = Vec::with_capacity(labels.len() * regions.len());
        for region in regions {
            for label in labels {
                keys.push([label.as_ref().to_string(), region.as_ref().to_string()]);
            }
        }
        Self::new([leading, AxisLevel::Region], keys)
    }

    pub fn products<S: AsRef<str>>(categories: &[S], regions: &[S]) -> Self {
        Self::regional(AxisLevel::Category, categories, regions)
    }

    pub fn destinations<S: AsRef<str>>(stages: &[S], regions: &[S]) -> Self {
        Self::regional(AxisLevel::Stage, stages, regions)
    }

    pub fn extensions<S: AsRef<str>>(codes: &[(S, S)]) -> Self {
        let keys = codes
            .iter()
            .map(|(code, unit)| [code.as_ref().to_string(), unit.as_ref().to_string()])
            .collect();
        Self::new([AxisLevel::Code, AxisLevel::Unit], keys)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn region_position(&self) -> Option<usize> {
        self.levels.iter().position(|l| *l == AxisLevel::Region)
    }

    /// Swap the two key positions. Entry order is unchanged.
    pub fn swap_levels(&mut self) {
        self.levels.swap(0, 1);
        for key in &mut self.keys {
            key.swap(0, 1);
        }
    }

    /// Put the region level first (`region_first`) or second. No-op when
    /// already in that order or when the axis has no region level.
    /// Returns whether a swap happened.
    pub fn align_region(&mut self, region_first: bool) -> bool {
        let wanted = if region_first { 0 } else { 1 };
        match self.region_position() {
            Some(pos) if pos != wanted => {
                self.swap_levels();
                true
            }
            _ => false,
        }
    }
}

/// A numeric matrix with its row and column labels.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledMatrix {
    pub name: String,
    pub data: Array2<f64>,
    pub rows: AxisLabels,
    pub cols: AxisLabels,
}

impl LabeledMatrix {
    pub fn new(
        name: impl Into<String>,
        data: Array2<f64>,
        rows: AxisLabels,
        cols: AxisLabels,
    ) -> Result<Self, LabelError> {
        let name = name.into();
        if data.nrows() != rows.len() {
            return Err(LabelError::LengthMismatch {
                matrix: name,
                axis: "rows",
                actual: data.nrows(),
                expected: rows.len(),
            });
        }
        if data.ncols() != cols.len() {
            return Err(LabelError::LengthMismatch {
                matrix: name,
                axis: "columns",
                actual: data.ncols(),
                expected: cols.len(),
            });
        }
        Ok(Self { name, data, rows, cols })
    }

    pub fn into_data(self) -> Array2<f64> {
        self.data
    }
}

/// Every axis layout used by the IOT bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IotLabels {
    pub products: AxisLabels,
    pub final_demand: AxisLabels,
    pub primary_inputs: AxisLabels,
    pub environmental: AxisLabels,
    pub resources: AxisLabels,
    pub materials: AxisLabels,
}

impl IotLabels {
    /// Row and column labels for a bundle matrix name.
    pub fn axes_for(&self, matrix: &str) -> Result<(&AxisLabels, &AxisLabels), LabelError> {
        let axes = match matrix {
            "A" | "L" | "S" => (&self.products, &self.products),
            "Y" => (&self.products, &self.final_demand),
            "E" | "RE" => (&self.primary_inputs, &self.products),
            "Be" | "RBe" => (&self.environmental, &self.products),
            "Br" | "RBr" => (&self.resources, &self.products),
            "Bm" | "RBm" => (&self.materials, &self.products),
            "YBe" | "RYBe" => (&self.environmental, &self.final_demand),
            "YBr" | "RYBr" => (&self.resources, &self.final_demand),
            "YBm" | "RYBm" => (&self.materials, &self.final_demand),
            other => return Err(LabelError::UnknownMatrix(other.to_string())),
        };
        Ok(axes)
    }

    /// Attach the labels for `name` to a copy-owned matrix.
    pub fn label(&self, name: &str, data: Array2<f64>) -> Result<LabeledMatrix, LabelError> {
        let (rows, cols) = self.axes_for(name)?;
        LabeledMatrix::new(name, data, rows.clone(), cols.clone())
    }
}
