// Technology-assumption transforms
// Supply-Use pair -> symmetric product x product coefficients and multipliers
//
// Three derivation paths share the same outputs:
//   TC  - transformation matrix T = inv(diag g) V'
//   MSC - market shares D = V' inv(diag q), requirements Z = U inv(diag g)
//   generic - starting from already symmetric intermediates S
// With q and g nonzero the TC and MSC paths give the same A, L and S.

use log::{debug, info};
use nalgebra::DMatrix;
use ndarray::{Array1, Array2};
use thiserror::Error;

use crate::iot_accounts::SupplyUseAccounts;
use crate::iot_balance::{inv_diag, diag, verify_balance, BalanceQuantities};
use crate::iot_final_demand::final_demand_extension;
use crate::iot_table::{ExtensionPair, ExtensionSet, FinalDemandExtensionSet, IotTable};
use crate::TechnologyAssumption;

#[derive(Debug, Error, PartialEq)]
pub enum TransformError {
    #[error("(I - A) is singular, Leontief inverse undefined for {dim}x{dim} table")]
    SingularMatrix { dim: usize },

    #[error("Leontief inverse needs a square A, got {rows}x{cols}")]
    NonSquare { rows: usize, cols: usize },
}

/// `L = (I - A)^-1`. Fails instead of returning NaN/inf entries.
pub fn leontief_inverse(a: &Array2<f64>) -> Result<Array2<f64>, TransformError> {
    let (rows, cols) = a.dim();
    if rows != cols {
        return Err(TransformError::NonSquare { rows, cols });
    }

    let identity_minus_a = DMatrix::from_fn(rows, cols, |i, j| {
        let identity = if i == j { 1.0 } else { 0.0 };
        identity - a[[i, j]]
    });
    let inverse = identity_minus_a
        .try_inverse()
        .ok_or(TransformError::SingularMatrix { dim: rows })?;

    let l = Array2::from_shape_fn((rows, cols), |(i, j)| inverse[(i, j)]);
    if l.iter().any(|v| !v.is_finite()) {
        return Err(TransformError::SingularMatrix { dim: rows });
    }
    debug!("Leontief inverse computed for {}x{} table", rows, cols);
    Ok(l)
}

// ---
// Transformation-coefficient path
// ---

pub struct TransformationCoefficients {
    /// Industry x product transformation matrix
    pub t: Array2<f64>,
}

impl TransformationCoefficients {
    pub fn new(v: &Array2<f64>, inv_diag_g: &Array2<f64>) -> Self {
        Self { t: inv_diag_g.dot(&v.t()) }
    }

    pub fn technical_coefficients(&self, u: &Array2<f64>, inv_diag_q: &Array2<f64>) -> Array2<f64> {
        u.dot(&self.t).dot(inv_diag_q)
    }

    pub fn leontief(&self, u: &Array2<f64>, inv_diag_q: &Array2<f64>) -> Result<Array2<f64>, TransformError> {
        leontief_inverse(&self.technical_coefficients(u, inv_diag_q))
    }

    /// `R = X T inv(diag q)`
    pub fn coefficients(&self, x: &Array2<f64>, inv_diag_q: &Array2<f64>) -> Array2<f64> {
        x.dot(&self.t).dot(inv_diag_q)
    }

    pub fn extension(&self, x: &Array2<f64>, inv_diag_q: &Array2<f64>, diag_q: &Array2<f64>) -> ExtensionPair {
        ExtensionPair::from_coefficients(self.coefficients(x, inv_diag_q), diag_q)
    }

    /// Product x product intermediates `S = U T`
    pub fn intermediates(&self, u: &Array2<f64>) -> Array2<f64> {
        u.dot(&self.t)
    }
}

// ---
// Market-share-coefficient path
// ---

pub struct MarketShareCoefficients {
    /// Input requirements per unit of industry output
    pub z: Array2<f64>,
    /// Market shares, industry x product
    pub d: Array2<f64>,
}

impl MarketShareCoefficients {
    pub fn new(
        u: &Array2<f64>,
        v: &Array2<f64>,
        inv_diag_g: &Array2<f64>,
        inv_diag_q: &Array2<f64>,
    ) -> Self {
        Self {
            z: u.dot(inv_diag_g),
            d: v.t().dot(inv_diag_q),
        }
    }

    pub fn technical_coefficients(&self) -> Array2<f64> {
        self.z.dot(&self.d)
    }

    pub fn leontief(&self) -> Result<Array2<f64>, TransformError> {
        leontief_inverse(&self.technical_coefficients())
    }

    /// `R = X inv(diag g) D`
    pub fn coefficients(&self, x: &Array2<f64>, inv_diag_g: &Array2<f64>) -> Array2<f64> {
        x.dot(inv_diag_g).dot(&self.d)
    }

    pub fn extension(&self, x: &Array2<f64>, inv_diag_g: &Array2<f64>, diag_q: &Array2<f64>) -> ExtensionPair {
        ExtensionPair::from_coefficients(self.coefficients(x, inv_diag_g), diag_q)
    }

    /// `S = Z D diag(q)`
    pub fn intermediates(&self, diag_q: &Array2<f64>) -> Array2<f64> {
        self.z.dot(&self.d).dot(diag_q)
    }
}

// ---
// Assumption-agnostic path
// ---

pub mod generic {
    use super::*;
    use crate::iot_balance::row_sums;

    /// Total product output from the row side: `rowsum(S) + rowsum(Y)`.
    pub fn total_output(s: &Array2<f64>, y: &Array2<f64>) -> Array1<f64> {
        row_sums(&s.view()) + row_sums(&y.view())
    }

    /// `A = S inv(diag q)`
    pub fn technical_coefficients(s: &Array2<f64>, inv_diag_q: &Array2<f64>) -> Array2<f64> {
        s.dot(inv_diag_q)
    }

    pub fn leontief(a: &Array2<f64>) -> Result<Array2<f64>, TransformError> {
        leontief_inverse(a)
    }

    /// `R = B inv(diag q)`
    pub fn coefficients(b: &Array2<f64>, inv_diag_q: &Array2<f64>) -> Array2<f64> {
        b.dot(inv_diag_q)
    }

    /// `B = R diag(q)`
    pub fn levels(r: &Array2<f64>, diag_q: &Array2<f64>) -> Array2<f64> {
        r.dot(diag_q)
    }

    /// `q = L yi`
    pub fn output_from_demand(l: &Array2<f64>, yi: &Array1<f64>) -> Array1<f64> {
        l.dot(yi)
    }

    /// `S = A diag(q)`
    pub fn intermediates(a: &Array2<f64>, diag_q: &Array2<f64>) -> Array2<f64> {
        a.dot(diag_q)
    }

    /// Full re-derivation of a table from symmetric intermediates, final
    /// demand and extension levels. Final-demand extensions pass through.
    pub fn rebuild_from_intermediates(
        s: &Array2<f64>,
        y: &Array2<f64>,
        extensions: &ExtensionSet,
        fd_extensions: FinalDemandExtensionSet,
        method: TechnologyAssumption,
        primary_rows: usize,
    ) -> Result<IotTable, TransformError> {
        let q = total_output(s, y);
        let diag_q = diag(&q);
        let inv_diag_q = inv_diag(&q);
        let yi = row_sums(&y.view());

        let a = technical_coefficients(s, &inv_diag_q);
        let l = leontief(&a)?;

        let rederive = |block: &ExtensionPair| {
            ExtensionPair::from_coefficients(coefficients(&block.levels, &inv_diag_q), &diag_q)
        };
        let extensions = ExtensionSet {
            primary_inputs: rederive(&extensions.primary_inputs),
            environmental: rederive(&extensions.environmental),
            resources: rederive(&extensions.resources),
            materials: rederive(&extensions.materials),
        };

        let s = intermediates(&a, &diag_q);
        let q = output_from_demand(&l, &yi);
        let ver = verify_balance(&s, y, &extensions.primary_inputs.levels, primary_rows);

        Ok(IotTable {
            method,
            a,
            l,
            s,
            q,
            y: y.clone(),
            extensions,
            fd_extensions,
            ver,
            transformation: None,
        })
    }
}

// ---
// Baseline derivation
// ---

/// Build the baseline table from raw accounts under one technology assumption.
pub fn derive_baseline(
    accounts: &SupplyUseAccounts,
    method: TechnologyAssumption,
    primary_rows: usize,
) -> Result<IotTable, TransformError> {
    let bq = BalanceQuantities::from_accounts(accounts, primary_rows);
    info!(
        "Deriving baseline IOT ({}) for {} products",
        method.label(),
        accounts.n_products()
    );

    let (l, s, extensions, transformation) = match method {
        TechnologyAssumption::TransformationCoefficient => {
            let tc = TransformationCoefficients::new(&accounts.supply, &bq.inv_diag_g);
            let l = tc.leontief(&accounts.use_, &bq.inv_diag_q)?;
            let ext = |x: &Array2<f64>| tc.extension(x, &bq.inv_diag_q, &bq.diag_q);
            let extensions = ExtensionSet {
                primary_inputs: ext(&accounts.primary_inputs),
                environmental: ext(&accounts.environmental),
                resources: ext(&accounts.resources),
                materials: ext(&accounts.materials),
            };
            let s = tc.intermediates(&accounts.use_);
            (l, s, extensions, tc.t)
        }
        TechnologyAssumption::MarketShareCoefficient => {
            let msc = MarketShareCoefficients::new(
                &accounts.use_,
                &accounts.supply,
                &bq.inv_diag_g,
                &bq.inv_diag_q,
            );
            let l = msc.leontief()?;
            let ext = |x: &Array2<f64>| msc.extension(x, &bq.inv_diag_g, &bq.diag_q);
            let extensions = ExtensionSet {
                primary_inputs: ext(&accounts.primary_inputs),
                environmental: ext(&accounts.environmental),
                resources: ext(&accounts.resources),
                materials: ext(&accounts.materials),
            };
            let s = msc.intermediates(&bq.diag_q);
            (l, s, extensions, msc.d)
        }
    };

    let q = generic::output_from_demand(&l, &bq.yi);
    let a = generic::technical_coefficients(&s, &bq.inv_diag_q);

    let fd_extensions = FinalDemandExtensionSet {
        environmental: final_demand_extension(&accounts.fd_environmental, &bq.diag_yj),
        resources: final_demand_extension(&accounts.fd_resources, &bq.diag_yj),
        materials: final_demand_extension(&accounts.fd_materials, &bq.diag_yj),
    };

    let ver = verify_balance(
        &s,
        &accounts.final_demand,
        &extensions.primary_inputs.levels,
        primary_rows,
    );

    Ok(IotTable {
        method,
        a,
        l,
        s,
        q,
        y: accounts.final_demand.clone(),
        extensions,
        fd_extensions,
        ver,
        transformation: Some(transformation),
    })
}
