//! Resource constraint and preferences of the sovereign.

use nalgebra::DVector;

/// Consumption when repaying: income plus current assets minus the cost of next-period
/// assets bought at `price`. Negative `assets` are debt.
#[inline]
pub fn consumption(income: f64, assets: f64, price: f64, next_assets: f64) -> f64 {
    income + assets - price * next_assets
}

/// CRRA utility `c^(1 - gamma) / (1 - gamma)`, logarithmic when `gamma == 1`.
///
/// Non-positive consumption is infeasible and maps to negative infinity.
#[inline]
pub fn crra_utility(c: f64, gamma: f64) -> f64 {
    if !(c > 0.0) {
        return f64::NEG_INFINITY;
    }
    if (gamma - 1.0).abs() < 1e-12 {
        c.ln()
    } else {
        c.powf(1.0 - gamma) / (1.0 - gamma)
    }
}

/// Output available while excluded from credit markets, `h(y) = min(cost * mean(y), y)`.
pub fn default_endowment(incomes: &DVector<f64>, cost: f64) -> DVector<f64> {
    let ceiling = cost * incomes.mean();
    incomes.map(|y| y.min(ceiling))
}
