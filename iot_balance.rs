// Balance-derived quantities
// Row/column totals of the accounts, their diagonals and zero-safe inverses

use ndarray::{s, Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::iot_accounts::SupplyUseAccounts;

/// Elementwise `1/x` where a zero denominator yields 0 instead of inf/NaN.
/// Zero-output sectors then receive zero share downstream.
pub fn safe_reciprocal(x: &Array1<f64>) -> Array1<f64> {
    x.mapv(|v| {
        let r = 1.0 / v;
        if r.is_finite() { r } else { 0.0 }
    })
}

pub fn diag(x: &Array1<f64>) -> Array2<f64> {
    Array2::from_diag(x)
}

/// `inv(diag(x))` with the zero-safe convention.
pub fn inv_diag(x: &Array1<f64>) -> Array2<f64> {
    Array2::from_diag(&safe_reciprocal(x))
}

/// Row sums (one entry per row).
pub fn row_sums(m: &ArrayView2<f64>) -> Array1<f64> {
    m.sum_axis(Axis(1))
}

/// Column sums (one entry per column).
pub fn col_sums(m: &ArrayView2<f64>) -> Array1<f64> {
    m.sum_axis(Axis(0))
}

/// Totals of one account set, computed once per run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceQuantities {
    /// Value added per industry (first primary-input rows only)
    pub e: Array1<f64>,
    /// Final demand per product
    pub yi: Array1<f64>,
    /// Final demand per destination
    pub yj: Array1<f64>,
    /// Total product output
    pub q: Array1<f64>,
    /// Total industry output
    pub g: Array1<f64>,

    pub diag_q: Array2<f64>,
    pub diag_g: Array2<f64>,
    pub diag_yi: Array2<f64>,
    pub diag_yj: Array2<f64>,

    pub inv_diag_q: Array2<f64>,
    pub inv_diag_g: Array2<f64>,
    pub inv_diag_yi: Array2<f64>,
    pub inv_diag_yj: Array2<f64>,
}

impl BalanceQuantities {
    pub fn new(
        v: &Array2<f64>,
        y: &Array2<f64>,
        e: &Array2<f64>,
        primary_rows: usize,
    ) -> Self {
        let e = col_sums(&primary_block(e, primary_rows));
        let yi = row_sums(&y.view());
        let yj = col_sums(&y.view());
        let q = row_sums(&v.view());
        let g = col_sums(&v.view());

        BalanceQuantities {
            diag_q: diag(&q),
            diag_g: diag(&g),
            diag_yi: diag(&yi),
            diag_yj: diag(&yj),
            inv_diag_q: inv_diag(&q),
            inv_diag_g: inv_diag(&g),
            inv_diag_yi: inv_diag(&yi),
            inv_diag_yj: inv_diag(&yj),
            e,
            yi,
            yj,
            q,
            g,
        }
    }

    pub fn from_accounts(accounts: &SupplyUseAccounts, primary_rows: usize) -> Self {
        Self::new(
            &accounts.supply,
            &accounts.final_demand,
            &accounts.primary_inputs,
            primary_rows,
        )
    }
}

/// Leading `rows` rows of a primary-input block, or all of them when the
/// block is shorter.
pub fn primary_block<'a>(e: &'a Array2<f64>, rows: usize) -> ArrayView2<'a, f64> {
    let n = rows.min(e.nrows());
    e.slice(s![..n, ..])
}

/// Balance verification ratio per product, in percent.
///
/// `(rowsum(S) + rowsum(Y)) / (colsum(S) + colsum(E[..primary_rows])) * 100`.
/// 0/0 positions report 0.
pub fn verify_balance(
    s: &Array2<f64>,
    y: &Array2<f64>,
    e: &Array2<f64>,
    primary_rows: usize,
) -> Array1<f64> {
    let from_rows = row_sums(&s.view()) + row_sums(&y.view());
    let from_cols = col_sums(&s.view()) + col_sums(&primary_block(e, primary_rows));

    let mut ratio = from_rows / from_cols * 100.0;
    ratio.mapv_inplace(|v| if v.is_nan() { 0.0 } else { v });
    ratio
}
