//! Economy calibration and solver configuration.
//!
//! Both structures deserialize with `#[serde(default)]`, so a configuration file
//! only needs to name the values it overrides.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SovereignError};

/// Structural parameters of the Arellano economy together with the stopping rule.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EconomyParameters {
    /// Discount factor.
    pub beta: f64,
    /// Coefficient of relative risk aversion.
    pub gamma: f64,
    /// Risk-free interest rate.
    pub r: f64,
    /// Persistence of log income.
    pub rho: f64,
    /// Standard deviation of the log-income innovation.
    pub eta: f64,
    /// Probability of regaining market access while excluded.
    pub theta: f64,
    /// Number of income states.
    pub ny: usize,
    /// Number of debt nodes.
    pub nb: usize,
    /// Lower bound of the asset grid (maximum debt).
    pub b_low: f64,
    /// Upper bound of the asset grid.
    pub b_up: f64,
    /// Output kept in default as a share of mean income, `h(y) = min(cost * mean(y), y)`.
    pub default_cost: f64,
    /// Euclidean-norm tolerance on the coefficient change between sweeps.
    pub tolerance: f64,
    /// Maximum number of sweeps.
    pub max_iterations: usize,
}

impl Default for EconomyParameters {
    fn default() -> Self {
        Self {
            beta: 0.953,
            gamma: 2.0,
            r: 0.017,
            rho: 0.945,
            eta: 0.025,
            theta: 0.282,
            ny: 15,
            nb: 15,
            b_low: -0.4,
            b_up: 0.4,
            default_cost: 0.969,
            tolerance: 1e-9,
            max_iterations: 2_000,
        }
    }
}

impl EconomyParameters {
    /// Override the discount factor.
    pub fn with_beta(mut self, beta: f64) -> Self {
        self.beta = beta;
        self
    }

    /// Override the risk aversion coefficient.
    pub fn with_gamma(mut self, gamma: f64) -> Self {
        self.gamma = gamma;
        self
    }

    /// Override the risk-free rate.
    pub fn with_risk_free_rate(mut self, r: f64) -> Self {
        self.r = r;
        self
    }

    /// Override the AR(1) persistence and innovation volatility of log income.
    pub fn with_income_process(mut self, rho: f64, eta: f64) -> Self {
        self.rho = rho;
        self.eta = eta;
        self
    }

    /// Override the re-access probability.
    pub fn with_theta(mut self, theta: f64) -> Self {
        self.theta = theta;
        self
    }

    /// Override the number of income and debt nodes.
    pub fn with_grid_sizes(mut self, ny: usize, nb: usize) -> Self {
        self.ny = ny;
        self.nb = nb;
        self
    }

    /// Override the asset grid bounds.
    pub fn with_debt_bounds(mut self, b_low: f64, b_up: f64) -> Self {
        self.b_low = b_low;
        self.b_up = b_up;
        self
    }

    /// Override the convergence tolerance.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Set the maximum number of sweeps that should be attempted.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Price of a default-free bond, `1 / (1 + r)`.
    pub fn risk_free_price(&self) -> f64 {
        1.0 / (1.0 + self.r)
    }

    /// Checks that every parameter lies in its admissible range.
    pub fn validate(&self) -> Result<()> {
        if !(self.beta > 0.0 && self.beta < 1.0) {
            return Err(SovereignError::invalid_parameter(
                "beta",
                self.beta,
                "must lie in (0, 1)",
            ));
        }
        if !(self.gamma > 0.0) || !self.gamma.is_finite() {
            return Err(SovereignError::invalid_parameter(
                "gamma",
                self.gamma,
                "must be positive and finite",
            ));
        }
        if !(self.r > -1.0) {
            return Err(SovereignError::invalid_parameter(
                "r",
                self.r,
                "must exceed -1",
            ));
        }
        if !(self.rho.abs() < 1.0) {
            return Err(SovereignError::invalid_parameter(
                "rho",
                self.rho,
                "income process must be stationary",
            ));
        }
        if !(self.eta > 0.0) {
            return Err(SovereignError::invalid_parameter(
                "eta",
                self.eta,
                "must be positive",
            ));
        }
        if !(0.0..=1.0).contains(&self.theta) {
            return Err(SovereignError::invalid_parameter(
                "theta",
                self.theta,
                "must be a probability",
            ));
        }
        if self.ny == 0 {
            return Err(SovereignError::dimension_mismatch("income states", 1, 0));
        }
        if self.nb < 2 {
            return Err(SovereignError::dimension_mismatch("debt nodes", 2, self.nb));
        }
        if !(self.b_low < self.b_up) {
            return Err(SovereignError::invalid_parameter(
                "b_low",
                self.b_low,
                "must be strictly below b_up",
            ));
        }
        // The default stage reads repayment values at zero debt.
        if self.b_low > 0.0 {
            return Err(SovereignError::invalid_parameter(
                "b_low",
                self.b_low,
                "the debt grid must contain zero",
            ));
        }
        if self.b_up < 0.0 {
            return Err(SovereignError::invalid_parameter(
                "b_up",
                self.b_up,
                "the debt grid must contain zero",
            ));
        }
        if !(self.default_cost > 0.0 && self.default_cost <= 1.0) {
            return Err(SovereignError::invalid_parameter(
                "default_cost",
                self.default_cost,
                "must lie in (0, 1]",
            ));
        }
        if !(self.tolerance > 0.0) {
            return Err(SovereignError::invalid_parameter(
                "tolerance",
                self.tolerance,
                "must be positive",
            ));
        }
        if self.max_iterations == 0 {
            return Err(SovereignError::invalid_parameter(
                "max_iterations",
                0.0,
                "at least one sweep is required",
            ));
        }
        Ok(())
    }
}

/// Family of basis functions used along the debt dimension.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BasisKind {
    /// Piecewise-linear hat functions on an evenly spaced grid.
    #[default]
    LinearSpline,
    /// Clamped cubic B-splines collocated at their Greville abscissae.
    CubicSpline,
    /// Chebyshev polynomials collocated at the Chebyshev nodes.
    Chebyshev,
}

/// Method used to turn the AR(1) log-income process into a Markov chain.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum IncomeDiscretization {
    /// Tauchen (1986) with a grid spanning `width` unconditional standard deviations.
    Tauchen { width: f64 },
    /// Rouwenhorst (1995), exact in the first two conditional moments.
    Rouwenhorst,
}

impl Default for IncomeDiscretization {
    fn default() -> Self {
        Self::Tauchen { width: 3.0 }
    }
}

/// Numerical knobs of the collocation solver.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverOptions {
    /// Basis used for the debt dimension.
    pub debt_basis: BasisKind,
    /// Discretization of the income process.
    pub income_discretization: IncomeDiscretization,
    /// Bracket width at which the golden-section search stops.
    pub golden_tolerance: f64,
    /// Margin subtracted from income when forming the upper bound on next-period assets.
    pub borrowing_buffer: f64,
    /// Solve the per-node debt choices on the rayon thread pool.
    pub parallel: bool,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            debt_basis: BasisKind::default(),
            income_discretization: IncomeDiscretization::default(),
            golden_tolerance: 1e-10,
            borrowing_buffer: 1e-5,
            parallel: true,
        }
    }
}

impl SolverOptions {
    /// Override the debt basis while keeping other defaults.
    pub fn with_debt_basis(mut self, debt_basis: BasisKind) -> Self {
        self.debt_basis = debt_basis;
        self
    }

    /// Override the income discretization.
    pub fn with_income_discretization(mut self, discretization: IncomeDiscretization) -> Self {
        self.income_discretization = discretization;
        self
    }

    /// Enable or disable the parallel per-node optimization.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Checks that the numerical knobs are usable.
    pub fn validate(&self) -> Result<()> {
        if !(self.golden_tolerance > 0.0) {
            return Err(SovereignError::invalid_parameter(
                "golden_tolerance",
                self.golden_tolerance,
                "must be positive",
            ));
        }
        if !(self.borrowing_buffer >= 0.0) {
            return Err(SovereignError::invalid_parameter(
                "borrowing_buffer",
                self.borrowing_buffer,
                "must be non-negative",
            ));
        }
        if let IncomeDiscretization::Tauchen { width } = self.income_discretization {
            if !(width > 0.0) {
                return Err(SovereignError::invalid_parameter(
                    "tauchen width",
                    width,
                    "must be positive",
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_calibration() {
        let params = EconomyParameters::default();
        assert_eq!(params.ny, 15);
        assert_eq!(params.nb, 15);
        assert_eq!(params.max_iterations, 2_000);
        assert!(params.validate().is_ok());
        assert!((params.risk_free_price() - 1.0 / 1.017).abs() < 1e-15);
    }

    #[test]
    fn validate_rejects_inverted_bounds() {
        let params = EconomyParameters::default().with_debt_bounds(0.4, -0.4);
        assert!(matches!(
            params.validate(),
            Err(SovereignError::InvalidParameter { name: "b_low", .. })
        ));
    }

    #[test]
    fn validate_rejects_grid_without_zero_debt() {
        let lending_only = EconomyParameters::default().with_debt_bounds(0.05, 0.4);
        assert!(matches!(
            lending_only.validate(),
            Err(SovereignError::InvalidParameter { name: "b_low", .. })
        ));
        let debt_only = EconomyParameters::default().with_debt_bounds(-0.4, -0.05);
        assert!(matches!(
            debt_only.validate(),
            Err(SovereignError::InvalidParameter { name: "b_up", .. })
        ));
        assert!(EconomyParameters::default()
            .with_debt_bounds(-0.4, 0.0)
            .validate()
            .is_ok());
    }

    #[test]
    fn validate_rejects_unit_root_income() {
        let params = EconomyParameters::default().with_income_process(1.0, 0.025);
        assert!(params.validate().is_err());
    }

    #[test]
    fn partial_json_overrides_defaults() {
        let params: EconomyParameters =
            serde_json::from_str(r#"{ "nb": 21, "theta": 0.1 }"#).unwrap();
        assert_eq!(params.nb, 21);
        assert_eq!(params.theta, 0.1);
        assert_eq!(params.ny, 15);

        let options: SolverOptions =
            serde_json::from_str(r#"{ "debt_basis": "CubicSpline" }"#).unwrap();
        assert_eq!(options.debt_basis, BasisKind::CubicSpline);
        assert!(options.parallel);
    }
}
