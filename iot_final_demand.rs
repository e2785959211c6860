// Final-demand extension transform
// Extensions attached to final-demand destinations (households, government, ...)

use ndarray::Array2;

use crate::iot_balance::safe_reciprocal;
use crate::iot_table::ExtensionPair;

/// `RYB = YB inv(diag yj)`
pub fn final_demand_coefficients(yb: &Array2<f64>, diag_yj: &Array2<f64>) -> Array2<f64> {
    let yj = diag_yj.diag().to_owned();
    yb.dot(&Array2::from_diag(&safe_reciprocal(&yj)))
}

/// `YB = RYB diag(yj)`
pub fn final_demand_levels(ryb: &Array2<f64>, diag_yj: &Array2<f64>) -> Array2<f64> {
    ryb.dot(diag_yj)
}

/// Coefficients from raw levels, then levels recomputed from those
/// coefficients. Destinations with zero total demand end up with zero levels.
pub fn final_demand_extension(yb: &Array2<f64>, diag_yj: &Array2<f64>) -> ExtensionPair {
    let coefficients = final_demand_coefficients(yb, diag_yj);
    let levels = final_demand_levels(&coefficients, diag_yj);
    ExtensionPair { coefficients, levels }
}
