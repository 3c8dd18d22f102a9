//! Bond-price schedule: interpolation off the grid and the update from default decisions.

use nalgebra::{DMatrix, DVector};

use crate::error::{Result, SovereignError};

/// Risk-adjusted bond prices on the (income state, debt node) grid.
///
/// Rows are income states and columns are debt nodes, the transpose of the collocation
/// node ordering. Queries are exact in the income dimension and linear in debt, held
/// flat outside the debt node range.
#[derive(Clone, Debug)]
pub struct PriceSchedule {
    debt_nodes: Vec<f64>,
    prices: DMatrix<f64>,
}

impl PriceSchedule {
    /// Wraps a price matrix whose columns correspond to `debt_nodes`.
    pub fn new(debt_nodes: Vec<f64>, prices: DMatrix<f64>) -> Result<Self> {
        if prices.ncols() != debt_nodes.len() {
            return Err(SovereignError::dimension_mismatch(
                "price schedule columns",
                debt_nodes.len(),
                prices.ncols(),
            ));
        }
        if debt_nodes.is_empty() {
            return Err(SovereignError::dimension_mismatch("price schedule nodes", 1, 0));
        }
        Ok(Self { debt_nodes, prices })
    }

    /// Flat schedule at the risk-free price.
    pub fn risk_free(debt_nodes: Vec<f64>, income_states: usize, price: f64) -> Self {
        let prices = DMatrix::from_element(income_states, debt_nodes.len(), price);
        Self { debt_nodes, prices }
    }

    /// Price matrix, income states by debt nodes.
    pub fn prices(&self) -> &DMatrix<f64> {
        &self.prices
    }

    /// Debt nodes indexing the columns.
    pub fn debt_nodes(&self) -> &[f64] {
        &self.debt_nodes
    }

    /// Price of issuing `next_assets` when current income is state `income_index`.
    pub fn price(&self, income_index: usize, next_assets: f64) -> f64 {
        let nodes = &self.debt_nodes;
        let last = nodes.len() - 1;
        if next_assets <= nodes[0] {
            return self.prices[(income_index, 0)];
        }
        if next_assets >= nodes[last] {
            return self.prices[(income_index, last)];
        }
        let right = nodes.partition_point(|b| *b <= next_assets).min(last);
        let left = right - 1;
        let weight = (next_assets - nodes[left]) / (nodes[right] - nodes[left]);
        (1.0 - weight) * self.prices[(income_index, left)]
            + weight * self.prices[(income_index, right)]
    }
}

/// Default probabilities and bond prices implied by the current value functions.
#[derive(Clone, Debug, PartialEq)]
pub struct PriceUpdate {
    /// Probability of default next period, income states by debt nodes.
    pub default_probability: DMatrix<f64>,
    /// Bond prices `(1 - default_probability) / (1 + r)`.
    pub prices: DMatrix<f64>,
}

/// Recomputes default probabilities and prices.
///
/// `repayment` holds the repayment value at every collocation node (debt fastest) and
/// `default` the default value at every income state. The sovereign defaults at a node
/// when the default value strictly exceeds the repayment value; the probability of
/// default tomorrow is that indicator averaged with the transition probabilities.
pub fn update_prices(
    repayment: &DVector<f64>,
    default: &DVector<f64>,
    transition: &DMatrix<f64>,
    risk_free_rate: f64,
) -> Result<PriceUpdate> {
    let ny = default.len();
    if transition.nrows() != ny || transition.ncols() != ny {
        return Err(SovereignError::dimension_mismatch(
            "transition matrix",
            ny,
            transition.nrows(),
        ));
    }
    if ny == 0 || repayment.len() % ny != 0 {
        return Err(SovereignError::dimension_mismatch(
            "repayment values",
            ny,
            repayment.len(),
        ));
    }
    let nb = repayment.len() / ny;

    let indicator = DMatrix::from_fn(ny, nb, |iy, ib| {
        if default[iy] > repayment[iy * nb + ib] {
            1.0
        } else {
            0.0
        }
    });
    let default_probability = (transition * indicator).map(|p| p.clamp(0.0, 1.0));
    let risk_free_price = 1.0 / (1.0 + risk_free_rate);
    let prices =
        default_probability.map(|p| ((1.0 - p) * risk_free_price).clamp(0.0, risk_free_price));

    Ok(PriceUpdate {
        default_probability,
        prices,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn price_is_linear_inside_and_flat_outside() {
        let prices = DMatrix::from_row_slice(2, 3, &[0.5, 0.8, 0.9, 0.2, 0.6, 0.7]);
        let schedule = PriceSchedule::new(vec![-0.2, 0.0, 0.2], prices).unwrap();
        assert_relative_eq!(schedule.price(0, -0.1), 0.65, epsilon = 1e-12);
        assert_relative_eq!(schedule.price(1, 0.1), 0.65, epsilon = 1e-12);
        assert_relative_eq!(schedule.price(0, 0.0), 0.8, epsilon = 1e-12);
        assert_eq!(schedule.price(0, -5.0), 0.5);
        assert_eq!(schedule.price(1, 5.0), 0.7);
    }

    #[test]
    fn default_probability_averages_indicator_over_transitions() {
        // Two income states, two debt nodes; default only in the low state at high debt.
        let repayment = DVector::from_vec(vec![-2.0, -1.0, -1.0, -0.5]);
        let default = DVector::from_vec(vec![-1.5, -3.0]);
        let transition = DMatrix::from_row_slice(2, 2, &[0.75, 0.25, 0.25, 0.75]);
        let update = update_prices(&repayment, &default, &transition, 0.0).unwrap();

        assert_relative_eq!(update.default_probability[(0, 0)], 0.75);
        assert_relative_eq!(update.default_probability[(1, 0)], 0.25);
        assert_eq!(update.default_probability[(0, 1)], 0.0);
        assert_relative_eq!(update.prices[(0, 0)], 0.25);
        assert_relative_eq!(update.prices[(1, 1)], 1.0);
    }

    #[test]
    fn update_is_idempotent() {
        let repayment = DVector::from_vec(vec![-2.0, -1.0, -1.0, -0.5]);
        let default = DVector::from_vec(vec![-1.5, -0.7]);
        let transition = DMatrix::from_row_slice(2, 2, &[0.9, 0.1, 0.2, 0.8]);
        let first = update_prices(&repayment, &default, &transition, 0.017).unwrap();
        let second = update_prices(&repayment, &default, &transition, 0.017).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn ties_are_resolved_towards_repayment() {
        let repayment = DVector::from_vec(vec![-1.0, -1.0]);
        let default = DVector::from_vec(vec![-1.0]);
        let transition = DMatrix::identity(1, 1);
        let update = update_prices(&repayment, &default, &transition, 0.017).unwrap();
        assert!(update.default_probability.iter().all(|p| *p == 0.0));
        assert_relative_eq!(update.prices[(0, 0)], 1.0 / 1.017);
    }
}
