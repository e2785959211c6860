// Coordinate resolution inside labeled matrices
// Partially specified (category, region) x (stage, region) keys -> index sets
//
// Resolution order per axis:
//   1. align the axis level order with the selector (region-first for region
//      selectors, category/stage-first otherwise); never re-applied once aligned
//   2. exact lookup on the leading level, or on both levels for compound keys
//   3. columns only: retry matching the selector parts on any key level,
//      which picks up a row across a whole column group
//   4. give up with the levels and keys that were tried

use std::fmt;

use ndarray::{Array2, Axis};
use thiserror::Error;

use crate::iot_labels::{AxisLabels, LabeledMatrix};
use crate::RegionVocabulary;

#[derive(Debug, Error, PartialEq)]
pub enum CoordinateError {
    #[error("Matrix {matrix}: no {axis} match for key ({selector}) on index levels [{levels}]")]
    NotFound {
        matrix: String,
        axis: &'static str,
        levels: String,
        selector: String,
    },
}

/// Selection along one axis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AxisSelector {
    /// Full axis
    All,
    /// Category (or stage) across every region
    Label(String),
    /// Whole region block
    Region(String),
    /// One category (or stage) in one region
    Compound(String, String),
}

impl AxisSelector {
    pub fn from_parts(label: Option<&str>, region: Option<&str>) -> Self {
        match (label, region) {
            (Some(l), Some(r)) => AxisSelector::Compound(l.to_string(), r.to_string()),
            (Some(l), None) => AxisSelector::Label(l.to_string()),
            (None, Some(r)) => AxisSelector::Region(r.to_string()),
            (None, None) => AxisSelector::All,
        }
    }

    fn leading(&self) -> Option<&str> {
        match self {
            AxisSelector::All => None,
            AxisSelector::Label(l) | AxisSelector::Compound(l, _) => Some(l),
            AxisSelector::Region(r) => Some(r),
        }
    }

    fn parts(&self) -> Vec<&str> {
        match self {
            AxisSelector::All => Vec::new(),
            AxisSelector::Label(l) | AxisSelector::Region(l) => vec![l.as_str()],
            AxisSelector::Compound(l, r) => vec![l.as_str(), r.as_str()],
        }
    }

    /// Exact match against a key in the current level order.
    fn matches(&self, key: &[String; 2]) -> bool {
        match self {
            AxisSelector::All => true,
            AxisSelector::Label(x) | AxisSelector::Region(x) => key[0] == *x,
            AxisSelector::Compound(x, r) => key[0] == *x && key[1] == *r,
        }
    }

    /// Every selector part appears somewhere in the key.
    fn matches_any_level(&self, key: &[String; 2]) -> bool {
        self.parts().iter().all(|p| key.iter().any(|k| k == p))
    }
}

impl fmt::Display for AxisSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AxisSelector::All => write!(f, ":"),
            AxisSelector::Label(l) => write!(f, "{}", l),
            AxisSelector::Region(r) => write!(f, "{}", r),
            AxisSelector::Compound(l, r) => write!(f, "{}, {}", l, r),
        }
    }
}

/// Row and column selectors for one matrix slice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coordinate {
    pub rows: AxisSelector,
    pub cols: AxisSelector,
}

impl Coordinate {
    /// `category`/`row_region` select rows, `stage`/`col_region` columns.
    pub fn new(
        category: Option<&str>,
        row_region: Option<&str>,
        stage: Option<&str>,
        col_region: Option<&str>,
    ) -> Self {
        Self {
            rows: AxisSelector::from_parts(category, row_region),
            cols: AxisSelector::from_parts(stage, col_region),
        }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] x [{}]", self.rows, self.cols)
    }
}

/// Resolved row and column indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub rows: Vec<usize>,
    pub cols: Vec<usize>,
}

impl Selection {
    pub fn shape(&self) -> (usize, usize) {
        (self.rows.len(), self.cols.len())
    }
}

fn align(axis: &mut AxisLabels, selector: &AxisSelector, regions: &RegionVocabulary) {
    if let Some(leading) = selector.leading() {
        axis.align_region(regions.contains(leading));
    }
}

fn exact(axis: &AxisLabels, selector: &AxisSelector) -> Vec<usize> {
    axis.keys
        .iter()
        .enumerate()
        .filter(|(_, key)| selector.matches(key))
        .map(|(i, _)| i)
        .collect()
}

fn any_level(axis: &AxisLabels, selector: &AxisSelector) -> Vec<usize> {
    axis.keys
        .iter()
        .enumerate()
        .filter(|(_, key)| selector.matches_any_level(key))
        .map(|(i, _)| i)
        .collect()
}

fn not_found(matrix: &LabeledMatrix, axis: &'static str, selector: &AxisSelector) -> CoordinateError {
    let labels = if axis == "row" { &matrix.rows } else { &matrix.cols };
    CoordinateError::NotFound {
        matrix: matrix.name.clone(),
        axis,
        levels: format!("{}, {}", labels.levels[0], labels.levels[1]),
        selector: selector.to_string(),
    }
}

/// Resolve a coordinate to index sets, aligning the matrix axes as needed.
pub fn resolve(
    matrix: &mut LabeledMatrix,
    coordinate: &Coordinate,
    regions: &RegionVocabulary,
) -> Result<Selection, CoordinateError> {
    align(&mut matrix.rows, &coordinate.rows, regions);
    align(&mut matrix.cols, &coordinate.cols, regions);

    let rows = exact(&matrix.rows, &coordinate.rows);
    if rows.is_empty() {
        return Err(not_found(matrix, "row", &coordinate.rows));
    }

    let mut cols = exact(&matrix.cols, &coordinate.cols);
    if cols.is_empty() {
        cols = any_level(&matrix.cols, &coordinate.cols);
    }
    if cols.is_empty() {
        return Err(not_found(matrix, "column", &coordinate.cols));
    }

    Ok(Selection { rows, cols })
}

/// Copy of the selected slice.
pub fn read(matrix: &LabeledMatrix, selection: &Selection) -> Array2<f64> {
    matrix
        .data
        .select(Axis(0), &selection.rows)
        .select(Axis(1), &selection.cols)
}

/// Write `values` (shaped like the selection) back into the matrix.
pub fn write(matrix: &mut LabeledMatrix, selection: &Selection, values: &Array2<f64>) {
    debug_assert_eq!(values.dim(), selection.shape());
    for (i, &r) in selection.rows.iter().enumerate() {
        for (j, &c) in selection.cols.iter().enumerate() {
            matrix.data[[r, c]] = values[[i, j]];
        }
    }
}
