//! Post-processing of a solved economy on an arbitrary debt grid.

use nalgebra::{DMatrix, DVector};

use crate::economy::Economy;
use crate::error::{Result, SovereignError};
use crate::pricing::{update_prices, PriceUpdate};

/// Value, default and price surfaces on a user-supplied debt grid.
///
/// Matrices are indexed by income state (rows) and debt grid point (columns).
#[derive(Clone, Debug)]
pub struct Surfaces {
    pub debt_grid: Vec<f64>,
    pub repayment_value: DMatrix<f64>,
    pub default_value: DVector<f64>,
    /// `max(repayment_value, default_value)`.
    pub value: DMatrix<f64>,
    /// One where the sovereign would default today.
    pub default_indicator: DMatrix<f64>,
    pub default_probability: DMatrix<f64>,
    pub prices: DMatrix<f64>,
    /// Optimal next-period assets when repaying.
    pub debt_policy: DMatrix<f64>,
}

impl Economy {
    /// Evaluates the current solution on `debt_grid` without iterating further.
    ///
    /// Repayment values come from the basis expansion with `omega_c`; default
    /// probabilities and prices are recomputed on the new grid from the same default
    /// rule the solver uses, and the debt policy solves the node problem at each point
    /// against the current continuation and price schedule.
    pub fn evaluate_on(&self, debt_grid: &[f64]) -> Result<Surfaces> {
        if debt_grid.is_empty() {
            return Err(SovereignError::dimension_mismatch("evaluation grid", 1, 0));
        }
        let ny = self.nodes.income_count();
        let m = debt_grid.len();
        let incomes = self.chain.states();
        let solution = &self.solution;

        let mut repayment = DVector::zeros(ny * m);
        for iy in 0..ny {
            for (k, assets) in debt_grid.iter().enumerate() {
                repayment[iy * m + k] = self.surface_value(&solution.omega_c, *assets, iy)?;
            }
        }
        let repayment_value = DMatrix::from_fn(ny, m, |iy, k| repayment[iy * m + k]);
        let default_value = self.default_values();
        let value = DMatrix::from_fn(ny, m, |iy, k| {
            repayment_value[(iy, k)].max(default_value[iy])
        });
        let default_indicator = DMatrix::from_fn(ny, m, |iy, k| {
            if default_value[iy] > repayment_value[(iy, k)] {
                1.0
            } else {
                0.0
            }
        });
        let PriceUpdate {
            default_probability,
            prices,
        } = update_prices(
            &repayment,
            &default_value,
            self.chain.transition(),
            self.params.r,
        )?;

        let continuation = self.continuation_coefficients(&solution.omega_e);
        let problem = self.debt_choice_problem(&continuation);
        let debt_policy = DMatrix::from_fn(ny, m, |iy, k| {
            problem
                .choose(iy * m + k, iy, incomes[iy], debt_grid[k])
                .next_assets
        });

        Ok(Surfaces {
            debt_grid: debt_grid.to_vec(),
            repayment_value,
            default_value,
            value,
            default_indicator,
            default_probability,
            prices,
            debt_policy,
        })
    }
}
