//! Fixed-point iteration over the three coefficient vectors and diagnostics.
//!
//! One sweep updates, in order:
//!
//! 1. `omega_e` from `(Pi kron I) max(Phi omega_c, Phi_d omega_d)` using the previous
//!    `omega_c` and `omega_d`;
//! 2. `omega_d` from `u(h(y)) + beta Pi (theta V_c(0, y) + (1 - theta) V_d(y))`, again with
//!    the previous `omega_c` and `omega_d`;
//! 3. `omega_c` from the per-node debt choice against the new `omega_e`;
//! 4. default probabilities and prices from the new `omega_c` and `omega_d`.
//!
//! The expectation is taken once per sweep on the coefficient side, so the per-node
//! optimization only evaluates a one-dimensional basis expansion.

use log::{debug, info, warn};
use nalgebra::{DMatrix, DVector};
use serde::Serialize;

use crate::economy::Economy;
use crate::error::{Result, SovereignError};
use crate::pricing::PriceSchedule;

/// Euclidean norms of the coefficient changes in one sweep.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Residuals {
    pub repayment: f64,
    pub default: f64,
    pub expectation: f64,
}

impl Residuals {
    fn unavailable() -> Self {
        Self {
            repayment: f64::INFINITY,
            default: f64::INFINITY,
            expectation: f64::INFINITY,
        }
    }

    /// Largest of the three norms; the quantity compared against the tolerance.
    pub fn max(&self) -> f64 {
        self.repayment.max(self.default).max(self.expectation)
    }
}

/// How the iteration ended.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum SolveStatus {
    /// The coefficient change fell below the tolerance.
    Converged,
    /// The iteration cap was reached first.
    IterationLimit,
    /// A sweep produced non-finite coefficients; the previous iterate was kept.
    Diverged {
        iteration: usize,
        context: &'static str,
    },
}

/// Diagnostics returned by [`Economy::solve`].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ConvergenceReport {
    pub status: SolveStatus,
    /// Number of completed sweeps.
    pub iterations: usize,
    /// Residuals of the last completed sweep.
    pub residuals: Residuals,
}

impl ConvergenceReport {
    pub fn converged(&self) -> bool {
        self.status == SolveStatus::Converged
    }

    /// Largest coefficient change in the last completed sweep.
    pub fn distance(&self) -> f64 {
        self.residuals.max()
    }

    /// Turns a non-converged report into the matching error.
    pub fn ensure_converged(self) -> Result<Self> {
        match self.status {
            SolveStatus::Converged => Ok(self),
            SolveStatus::IterationLimit => Err(SovereignError::NonConvergence {
                iterations: self.iterations,
                distance: self.distance(),
            }),
            SolveStatus::Diverged { iteration, context } => {
                Err(SovereignError::NumericalDivergence { iteration, context })
            }
        }
    }
}

impl Economy {
    /// Iterates sweeps until the coefficients converge, the cap is hit, or a sweep
    /// diverges. Only construction-level failures such as a singular solve are errors.
    pub fn solve(&mut self) -> Result<ConvergenceReport> {
        let tolerance = self.params.tolerance;
        let max_iterations = self.params.max_iterations;
        let mut residuals = Residuals::unavailable();

        for iteration in 1..=max_iterations {
            match self.sweep(iteration) {
                Ok(latest) => residuals = latest,
                Err(SovereignError::NumericalDivergence { iteration, context }) => {
                    warn!("sweep {iteration} produced non-finite {context}; keeping previous iterate");
                    return Ok(ConvergenceReport {
                        status: SolveStatus::Diverged { iteration, context },
                        iterations: iteration - 1,
                        residuals,
                    });
                }
                Err(err) => return Err(err),
            }

            debug!(
                "sweep {iteration}: |d omega_c| = {:.3e}, |d omega_d| = {:.3e}, |d omega_e| = {:.3e}",
                residuals.repayment, residuals.default, residuals.expectation
            );

            if residuals.max() < tolerance {
                info!(
                    "collocation converged after {iteration} sweeps (distance {:.3e})",
                    residuals.max()
                );
                return Ok(ConvergenceReport {
                    status: SolveStatus::Converged,
                    iterations: iteration,
                    residuals,
                });
            }
        }

        warn!(
            "collocation stopped at the cap of {max_iterations} sweeps with distance {:.3e}",
            residuals.max()
        );
        Ok(ConvergenceReport {
            status: SolveStatus::IterationLimit,
            iterations: max_iterations,
            residuals,
        })
    }

    /// Performs one sweep. The new iterate is committed only if every coefficient is finite;
    /// otherwise [`SovereignError::NumericalDivergence`] is returned and the economy is unchanged.
    pub fn sweep(&mut self, iteration: usize) -> Result<Residuals> {
        let omega_e = self.phi.solve(&self.expectation_rhs())?;
        ensure_finite(&omega_e, iteration, "expected continuation coefficients")?;

        let omega_d = self.phi_d.solve(&self.default_rhs())?;
        ensure_finite(&omega_d, iteration, "default value coefficients")?;

        let continuation = self.continuation_coefficients(&omega_e);
        let choices = self
            .debt_choice_problem(&continuation)
            .solve_all(&self.nodes, self.options.parallel);
        let rhs_c = DVector::from_iterator(choices.len(), choices.iter().map(|c| c.value));
        let omega_c = self.phi.solve(&rhs_c)?;
        ensure_finite(&omega_c, iteration, "repayment value coefficients")?;

        let residuals = Residuals {
            repayment: (&omega_c - &self.solution.omega_c).norm(),
            default: (&omega_d - &self.solution.omega_d).norm(),
            expectation: (&omega_e - &self.solution.omega_e).norm(),
        };

        self.solution.omega_c = omega_c;
        self.solution.omega_d = omega_d;
        self.solution.omega_e = omega_e;
        self.solution.debt_policy =
            DVector::from_iterator(choices.len(), choices.iter().map(|c| c.next_assets));
        self.refresh_prices()?;

        Ok(residuals)
    }

    /// Recomputes default probabilities and the price schedule from the current coefficients.
    pub fn refresh_prices(&mut self) -> Result<()> {
        let update = self.price_update()?;
        self.price_schedule =
            PriceSchedule::new(self.debt_nodes().to_vec(), update.prices.clone())?;
        self.solution.prices = update.prices;
        self.solution.default_probability = update.default_probability;
        Ok(())
    }

    /// `(Pi kron I_nb) max(Phi omega_c, Phi_d omega_d)` at the collocation nodes.
    fn expectation_rhs(&self) -> DVector<f64> {
        let nb = self.nodes.debt_count();
        let ny = self.nodes.income_count();
        let repayment = self.repayment_values();
        let default = self.default_values();
        let best = DMatrix::from_fn(nb, ny, |ib, iy| {
            let vc = repayment[iy * nb + ib];
            let vd = default[iy];
            if vc.is_nan() || vd.is_nan() {
                f64::NAN
            } else {
                vc.max(vd)
            }
        });
        let expected = best * self.chain.transition().transpose();
        DVector::from_column_slice(expected.as_slice())
    }

    /// `u(h(y)) + beta Pi (theta V_c(0, y) + (1 - theta) V_d(y))` at the income states.
    fn default_rhs(&self) -> DVector<f64> {
        let theta = self.params.theta;
        let reentry = &self.zero_debt_rows * &self.solution.omega_c;
        let excluded = self.default_values();
        let continuation = reentry * theta + excluded * (1.0 - theta);
        &self.default_utility + self.chain.transition() * continuation * self.params.beta
    }
}

fn ensure_finite(values: &DVector<f64>, iteration: usize, context: &'static str) -> Result<()> {
    if values.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(SovereignError::NumericalDivergence { iteration, context })
    }
}
