// Supply-Use account bundle
// Immutable monetary and extension matrices for one run

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum AccountError {
    #[error("Matrix {name} has shape {actual:?}, expected {expected:?}")]
    ShapeMismatch {
        name: &'static str,
        actual: (usize, usize),
        expected: (usize, usize),
    },

    #[error("Matrix {name} has {actual} columns, expected {expected} ({axis})")]
    ColumnMismatch {
        name: &'static str,
        actual: usize,
        expected: usize,
        axis: &'static str,
    },

    #[error("Matrix {name} has {actual} rows, expected {expected} ({axis})")]
    RowMismatch {
        name: &'static str,
        actual: usize,
        expected: usize,
        axis: &'static str,
    },

    #[error("Matrix {0} is empty")]
    Empty(&'static str),
}

/// Raw accounts as supplied by the loader. V and U are product x industry,
/// Y is product x destination, the B blocks are extension rows x industry,
/// the YB blocks extension rows x destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupplyUseAccounts {
    #[serde(rename = "V")]
    pub supply: Array2<f64>,
    #[serde(rename = "U")]
    pub use_: Array2<f64>,
    #[serde(rename = "Y")]
    pub final_demand: Array2<f64>,
    #[serde(rename = "E")]
    pub primary_inputs: Array2<f64>,
    #[serde(rename = "Be")]
    pub environmental: Array2<f64>,
    #[serde(rename = "Br")]
    pub resources: Array2<f64>,
    #[serde(rename = "Bm")]
    pub materials: Array2<f64>,
    #[serde(rename = "YBe")]
    pub fd_environmental: Array2<f64>,
    #[serde(rename = "YBr")]
    pub fd_resources: Array2<f64>,
    #[serde(rename = "YBm")]
    pub fd_materials: Array2<f64>,
}

impl SupplyUseAccounts {
    pub fn n_products(&self) -> usize {
        self.supply.nrows()
    }

    pub fn n_industries(&self) -> usize {
        self.supply.ncols()
    }

    pub fn n_destinations(&self) -> usize {
        self.final_demand.ncols()
    }

    /// Check the dimension pairing every transform relies on.
    pub fn validate(&self) -> Result<(), AccountError> {
        if self.supply.is_empty() {
            return Err(AccountError::Empty("V"));
        }
        let (n_prod, n_ind) = self.supply.dim();

        if self.use_.dim() != (n_prod, n_ind) {
            return Err(AccountError::ShapeMismatch {
                name: "U",
                actual: self.use_.dim(),
                expected: (n_prod, n_ind),
            });
        }
        if self.final_demand.nrows() != n_prod {
            return Err(AccountError::RowMismatch {
                name: "Y",
                actual: self.final_demand.nrows(),
                expected: n_prod,
                axis: "products",
            });
        }
        let industry_blocks = [
            ("E", &self.primary_inputs),
            ("Be", &self.environmental),
            ("Br", &self.resources),
            ("Bm", &self.materials),
        ];
        for (name, block) in industry_blocks {
            if block.ncols() != n_ind {
                return Err(AccountError::ColumnMismatch {
                    name,
                    actual: block.ncols(),
                    expected: n_ind,
                    axis: "industries",
                });
            }
        }

        let n_dest = self.n_destinations();
        let destination_blocks = [
            ("YBe", &self.fd_environmental, &self.environmental),
            ("YBr", &self.fd_resources, &self.resources),
            ("YBm", &self.fd_materials, &self.materials),
        ];
        for (name, block, intermediate) in destination_blocks {
            if block.ncols() != n_dest {
                return Err(AccountError::ColumnMismatch {
                    name,
                    actual: block.ncols(),
                    expected: n_dest,
                    axis: "final-demand destinations",
                });
            }
            if block.nrows() != intermediate.nrows() {
                return Err(AccountError::RowMismatch {
                    name,
                    actual: block.nrows(),
                    expected: intermediate.nrows(),
                    axis: "extension codes",
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use ndarray::array;

    /// Four-product single-region economy with balanced supply and use.
    /// Product rows: U row sum + Y row sum = V row sum.
    /// Industry columns: U col sum + E[:2] col sum = V col sum.
    pub fn toy_accounts() -> SupplyUseAccounts {
        let supply = array![
            [90.0, 5.0, 0.0, 5.0],
            [0.0, 75.0, 5.0, 0.0],
            [10.0, 0.0, 55.0, 0.0],
            [0.0, 0.0, 0.0, 40.0],
        ];
        let use_ = array![
            [10.0, 20.0, 5.0, 5.0],
            [15.0, 5.0, 10.0, 5.0],
            [5.0, 10.0, 5.0, 5.0],
            [10.0, 5.0, 5.0, 5.0],
        ];
        // q = [100, 80, 65, 40], rowsum(U) = [40, 35, 25, 25]
        let final_demand = array![
            [40.0, 20.0],
            [30.0, 15.0],
            [25.0, 15.0],
            [10.0, 5.0],
        ];
        // g = [100, 80, 60, 45], colsum(U) = [40, 40, 25, 20]
        let primary_inputs = array![
            [35.0, 25.0, 20.0, 15.0],
            [25.0, 15.0, 15.0, 10.0],
        ];
        let environmental = array![[12.0, 8.0, 6.0, 2.0], [1.0, 0.5, 0.2, 0.1]];
        let resources = array![[3.0, 2.0, 1.0, 0.5]];
        let materials = array![[20.0, 10.0, 5.0, 1.0]];
        let fd_environmental = array![[4.0, 1.0], [0.3, 0.1]];
        let fd_resources = array![[0.5, 0.2]];
        let fd_materials = array![[2.0, 0.5]];

        SupplyUseAccounts {
            supply,
            use_,
            final_demand,
            primary_inputs,
            environmental,
            resources,
            materials,
            fd_environmental,
            fd_resources,
            fd_materials,
        }
    }

    /// Three products made by two industries; industry 0 co-produces
    /// products 0 and 2.
    pub fn rectangular_accounts() -> SupplyUseAccounts {
        // q = [60, 30, 20], g = [70, 40]
        SupplyUseAccounts {
            supply: array![[50.0, 10.0], [0.0, 30.0], [20.0, 0.0]],
            use_: array![[10.0, 5.0], [5.0, 5.0], [5.0, 5.0]],
            final_demand: array![[45.0], [20.0], [10.0]],
            primary_inputs: array![[50.0, 25.0]],
            environmental: array![[7.0, 4.0]],
            resources: array![[1.0, 1.0]],
            materials: array![[2.0, 1.0]],
            fd_environmental: array![[3.0]],
            fd_resources: array![[0.5]],
            fd_materials: array![[1.0]],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::{rectangular_accounts, toy_accounts};
    use super::*;
    use ndarray::Array2;

    #[test]
    fn test_toy_accounts_validate() {
        let accounts = toy_accounts();
        assert!(accounts.validate().is_ok());
        assert_eq!(accounts.n_products(), 4);
        assert_eq!(accounts.n_destinations(), 2);
    }

    #[test]
    fn test_toy_accounts_balanced() {
        let accounts = toy_accounts();
        let q = accounts.supply.sum_axis(ndarray::Axis(1));
        let demand = accounts.use_.sum_axis(ndarray::Axis(1)) + accounts.final_demand.sum_axis(ndarray::Axis(1));
        assert_eq!(q, demand);

        let g = accounts.supply.sum_axis(ndarray::Axis(0));
        let inputs = accounts.use_.sum_axis(ndarray::Axis(0)) + accounts.primary_inputs.sum_axis(ndarray::Axis(0));
        assert_eq!(g, inputs);
    }

    #[test]
    fn test_rectangular_accounts_validate() {
        let accounts = rectangular_accounts();
        assert_eq!(accounts.validate(), Ok(()));
        assert_eq!(accounts.n_products(), 3);
        assert_eq!(accounts.n_industries(), 2);
    }

    #[test]
    fn test_use_shape_mismatch() {
        let mut accounts = toy_accounts();
        accounts.use_ = Array2::zeros((4, 3));
        assert!(matches!(
            accounts.validate(),
            Err(AccountError::ShapeMismatch { name: "U", .. })
        ));
    }

    #[test]
    fn test_extension_row_mismatch() {
        let mut accounts = toy_accounts();
        accounts.fd_environmental = Array2::zeros((1, 2));
        assert!(matches!(
            accounts.validate(),
            Err(AccountError::RowMismatch { name: "YBe", .. })
        ));
    }
}
