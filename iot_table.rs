// IOT bundle
// Named matrices of one baseline or scenario table

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::TechnologyAssumption;

/// Coefficient form (per unit of output) and level form (absolute flow)
/// of one extension block. Always produced together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtensionPair {
    pub coefficients: Array2<f64>,
    pub levels: Array2<f64>,
}

impl ExtensionPair {
    pub fn from_coefficients(coefficients: Array2<f64>, diag_output: &Array2<f64>) -> Self {
        let levels = coefficients.dot(diag_output);
        Self { coefficients, levels }
    }
}

/// Extensions attached to products (E, Be, Br, Bm)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtensionSet {
    pub primary_inputs: ExtensionPair,
    pub environmental: ExtensionPair,
    pub resources: ExtensionPair,
    pub materials: ExtensionPair,
}

/// Extensions attached to final-demand destinations (YBe, YBr, YBm)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalDemandExtensionSet {
    pub environmental: ExtensionPair,
    pub resources: ExtensionPair,
    pub materials: ExtensionPair,
}

#[derive(Debug, Clone, Copy)]
pub enum TableEntry<'a> {
    Matrix(&'a Array2<f64>),
    Vector(&'a Array1<f64>),
}

impl<'a> TableEntry<'a> {
    pub fn as_matrix(&self) -> Option<&'a Array2<f64>> {
        match *self {
            TableEntry::Matrix(m) => Some(m),
            TableEntry::Vector(_) => None,
        }
    }

    pub fn as_vector(&self) -> Option<&'a Array1<f64>> {
        match *self {
            TableEntry::Vector(v) => Some(v),
            TableEntry::Matrix(_) => None,
        }
    }
}

/// One symmetric input-output table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IotTable {
    pub method: TechnologyAssumption,
    /// Technical coefficients
    pub a: Array2<f64>,
    /// Leontief inverse
    pub l: Array2<f64>,
    /// Intermediates
    pub s: Array2<f64>,
    /// Total product output
    pub q: Array1<f64>,
    /// Final demand
    pub y: Array2<f64>,
    pub extensions: ExtensionSet,
    pub fd_extensions: FinalDemandExtensionSet,
    /// Balance verification ratio per product (percent)
    pub ver: Array1<f64>,
    /// T (TC) or D (MSC), baseline only
    pub transformation: Option<Array2<f64>>,
}

impl IotTable {
    /// Look up a matrix or vector by its conventional name. The transformation
    /// matrix answers to `T` under TC and `D` under MSC.
    pub fn get(&self, name: &str) -> Option<TableEntry<'_>> {
        use TableEntry::{Matrix, Vector};
        let entry = match name {
            "A" => Matrix(&self.a),
            "L" => Matrix(&self.l),
            "S" => Matrix(&self.s),
            "q" => Vector(&self.q),
            "Y" => Matrix(&self.y),
            "E" => Matrix(&self.extensions.primary_inputs.levels),
            "RE" => Matrix(&self.extensions.primary_inputs.coefficients),
            "Be" => Matrix(&self.extensions.environmental.levels),
            "RBe" => Matrix(&self.extensions.environmental.coefficients),
            "Br" => Matrix(&self.extensions.resources.levels),
            "RBr" => Matrix(&self.extensions.resources.coefficients),
            "Bm" => Matrix(&self.extensions.materials.levels),
            "RBm" => Matrix(&self.extensions.materials.coefficients),
            "YBe" => Matrix(&self.fd_extensions.environmental.levels),
            "RYBe" => Matrix(&self.fd_extensions.environmental.coefficients),
            "YBr" => Matrix(&self.fd_extensions.resources.levels),
            "RYBr" => Matrix(&self.fd_extensions.resources.coefficients),
            "YBm" => Matrix(&self.fd_extensions.materials.levels),
            "RYBm" => Matrix(&self.fd_extensions.materials.coefficients),
            "ver" => Vector(&self.ver),
            "T" if self.method == TechnologyAssumption::TransformationCoefficient => {
                Matrix(self.transformation.as_ref()?)
            }
            "D" if self.method == TechnologyAssumption::MarketShareCoefficient => {
                Matrix(self.transformation.as_ref()?)
            }
            _ => return None,
        };
        Some(entry)
    }

    pub fn matrix(&self, name: &str) -> Option<&Array2<f64>> {
        self.get(name).and_then(|e| e.as_matrix())
    }

    pub fn vector(&self, name: &str) -> Option<&Array1<f64>> {
        self.get(name).and_then(|e| e.as_vector())
    }
}
