//! Construction of the collocation problem: grids, income chain, bases and basis matrices.

use std::sync::Arc;

use log::info;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::basis::{
    combine, Basis, ChebyshevBasis, CollocationSystem, CubicSplineBasis, LinearSplineBasis,
};
use crate::budget::{crra_utility, default_endowment};
use crate::error::{Result, SovereignError};
use crate::markov::MarkovChain;
use crate::optimize::DebtChoiceProblem;
use crate::options::{BasisKind, EconomyParameters, IncomeDiscretization, SolverOptions};
use crate::pricing::{update_prices, PriceSchedule, PriceUpdate};

/// The `(debt, income)` collocation nodes, every debt node crossed with every income
/// state. Debt varies fastest: node `n` pairs debt node `n % nb` with income state `n / nb`.
#[derive(Clone, Debug)]
pub struct CollocationNodes {
    nb: usize,
    ny: usize,
    points: DMatrix<f64>,
}

impl CollocationNodes {
    /// Cross product of `debt` and `income` nodes.
    pub fn new(debt: &[f64], income: &[f64]) -> Self {
        let nb = debt.len();
        let ny = income.len();
        let points = DMatrix::from_fn(nb * ny, 2, |n, column| {
            if column == 0 {
                debt[n % nb]
            } else {
                income[n / nb]
            }
        });
        Self { nb, ny, points }
    }

    /// Total number of nodes.
    pub fn len(&self) -> usize {
        self.nb * self.ny
    }

    /// Whether the node table is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of debt nodes.
    pub fn debt_count(&self) -> usize {
        self.nb
    }

    /// Number of income states.
    pub fn income_count(&self) -> usize {
        self.ny
    }

    /// The `N x 2` node table, debt in the first column.
    pub fn points(&self) -> &DMatrix<f64> {
        &self.points
    }

    pub fn debt(&self, node: usize) -> f64 {
        self.points[(node, 0)]
    }

    pub fn income(&self, node: usize) -> f64 {
        self.points[(node, 1)]
    }

    pub fn income_index(&self, node: usize) -> usize {
        node / self.nb
    }

    pub fn debt_index(&self, node: usize) -> usize {
        node % self.nb
    }
}

/// Coefficient vectors and the price schedule that together constitute the solution.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Solution {
    /// Coefficients of the repayment value `V_c(b, y) = Phi(b, y) omega_c`.
    pub omega_c: DVector<f64>,
    /// Coefficients of the default value `V_d(y) = Phi_d(y) omega_d`.
    pub omega_d: DVector<f64>,
    /// Coefficients of the expected continuation value `E[max(V_c, V_d)](b', y)`.
    pub omega_e: DVector<f64>,
    /// Bond prices, income states by debt nodes.
    pub prices: DMatrix<f64>,
    /// Probability of default next period, income states by debt nodes.
    pub default_probability: DMatrix<f64>,
    /// Next-period assets chosen at each collocation node in the latest sweep.
    pub debt_policy: DVector<f64>,
}

/// An Arellano economy prepared for collocation, together with its current iterate.
#[derive(Clone, Debug)]
pub struct Economy {
    pub(crate) params: EconomyParameters,
    pub(crate) options: SolverOptions,
    pub(crate) chain: MarkovChain,
    pub(crate) debt_basis: Arc<dyn Basis>,
    pub(crate) income_basis: LinearSplineBasis,
    pub(crate) nodes: CollocationNodes,
    pub(crate) phi: CollocationSystem,
    pub(crate) phi_d: CollocationSystem,
    /// Combined basis rows at zero debt for every income state.
    pub(crate) zero_debt_rows: DMatrix<f64>,
    pub(crate) default_endowment: DVector<f64>,
    pub(crate) default_utility: DVector<f64>,
    pub(crate) price_schedule: PriceSchedule,
    pub(crate) solution: Solution,
}

impl Economy {
    /// Builds the economy with default solver options.
    pub fn new(params: EconomyParameters) -> Result<Self> {
        Self::with_options(params, SolverOptions::default())
    }

    /// Builds the economy, discretizing income as configured in `options`.
    pub fn with_options(params: EconomyParameters, options: SolverOptions) -> Result<Self> {
        params.validate()?;
        options.validate()?;
        let chain = match options.income_discretization {
            IncomeDiscretization::Tauchen { width } => {
                MarkovChain::tauchen(params.ny, params.rho, params.eta, width)?
            }
            IncomeDiscretization::Rouwenhorst => {
                MarkovChain::rouwenhorst(params.ny, params.rho, params.eta)?
            }
        };
        Self::with_income_process(params, options, chain)
    }

    /// Builds the economy around an externally discretized income chain.
    ///
    /// The chain's states must be strictly increasing and its length must equal `ny`.
    pub fn with_income_process(
        params: EconomyParameters,
        options: SolverOptions,
        chain: MarkovChain,
    ) -> Result<Self> {
        params.validate()?;
        options.validate()?;
        if chain.len() != params.ny {
            return Err(SovereignError::dimension_mismatch(
                "income chain states",
                params.ny,
                chain.len(),
            ));
        }

        let debt_basis: Arc<dyn Basis> = match options.debt_basis {
            BasisKind::LinearSpline => {
                Arc::new(LinearSplineBasis::uniform(params.nb, params.b_low, params.b_up)?)
            }
            BasisKind::CubicSpline => {
                Arc::new(CubicSplineBasis::new(params.nb, params.b_low, params.b_up)?)
            }
            BasisKind::Chebyshev => {
                Arc::new(ChebyshevBasis::new(params.nb, params.b_low, params.b_up)?)
            }
        };
        let ygrid: Vec<f64> = chain.states().iter().copied().collect();
        let income_basis = LinearSplineBasis::new(ygrid.clone())?;

        let debt_nodes = debt_basis.nodes().to_vec();
        let nodes = CollocationNodes::new(&debt_nodes, &ygrid);
        let debt_points: Vec<f64> = (0..nodes.len()).map(|n| nodes.debt(n)).collect();
        let income_points: Vec<f64> = (0..nodes.len()).map(|n| nodes.income(n)).collect();
        let phi_matrix = combine(
            &debt_basis.evaluate(&debt_points),
            &income_basis.evaluate(&income_points),
        )?;
        let phi = CollocationSystem::new(phi_matrix, "collocation basis matrix")?;
        let phi_d = CollocationSystem::new(income_basis.node_matrix(), "default basis matrix")?;

        let zero_debt_rows = combine(
            &debt_basis.evaluate(&vec![0.0; ygrid.len()]),
            &income_basis.evaluate(&ygrid),
        )?;

        let default_endowment = default_endowment(chain.states(), params.default_cost);
        let default_utility = default_endowment.map(|h| crra_utility(h, params.gamma));

        let n = nodes.len();
        let ny = params.ny;
        let nb = params.nb;
        let risk_free = params.risk_free_price();
        let price_schedule = PriceSchedule::risk_free(debt_nodes, ny, risk_free);
        let solution = Solution {
            omega_c: DVector::zeros(n),
            omega_d: DVector::zeros(ny),
            omega_e: DVector::zeros(n),
            prices: DMatrix::from_element(ny, nb, risk_free),
            default_probability: DMatrix::zeros(ny, nb),
            debt_policy: DVector::from_iterator(n, (0..n).map(|node| nodes.debt(node))),
        };

        info!(
            "built Arellano economy with {} income states, {} debt nodes ({:?} basis)",
            ny, nb, options.debt_basis
        );

        Ok(Self {
            params,
            options,
            chain,
            debt_basis,
            income_basis,
            nodes,
            phi,
            phi_d,
            zero_debt_rows,
            default_endowment,
            default_utility,
            price_schedule,
            solution,
        })
    }

    pub fn params(&self) -> &EconomyParameters {
        &self.params
    }

    pub fn options(&self) -> &SolverOptions {
        &self.options
    }

    /// Discretized income process.
    pub fn chain(&self) -> &MarkovChain {
        &self.chain
    }

    /// Basis along the debt dimension.
    pub fn debt_basis(&self) -> &dyn Basis {
        self.debt_basis.as_ref()
    }

    /// Basis along the income dimension, pinned at the income states.
    pub fn income_basis(&self) -> &LinearSplineBasis {
        &self.income_basis
    }

    /// Debt nodes of the collocation grid.
    pub fn debt_nodes(&self) -> &[f64] {
        self.debt_basis.nodes()
    }

    pub fn nodes(&self) -> &CollocationNodes {
        &self.nodes
    }

    /// Combined basis matrix `Phi` at the collocation nodes.
    pub fn phi(&self) -> &CollocationSystem {
        &self.phi
    }

    /// Income-only basis matrix `Phi_d` at the income states.
    pub fn phi_d(&self) -> &CollocationSystem {
        &self.phi_d
    }

    /// Output while excluded, `h(y)`, per income state.
    pub fn default_endowment(&self) -> &DVector<f64> {
        &self.default_endowment
    }

    /// The current iterate; the solution once [`Economy::solve`](crate::Economy::solve) converged.
    pub fn solution(&self) -> &Solution {
        &self.solution
    }

    /// Interpolant of the current price schedule.
    pub fn price_schedule(&self) -> &PriceSchedule {
        &self.price_schedule
    }

    /// Repayment value at every collocation node.
    pub fn repayment_values(&self) -> DVector<f64> {
        self.phi.apply(&self.solution.omega_c)
    }

    /// Default value at every income state.
    pub fn default_values(&self) -> DVector<f64> {
        self.phi_d.apply(&self.solution.omega_d)
    }

    /// Default probabilities and prices implied by the current `omega_c` and `omega_d`.
    pub fn price_update(&self) -> Result<PriceUpdate> {
        update_prices(
            &self.repayment_values(),
            &self.default_values(),
            self.chain.transition(),
            self.params.r,
        )
    }

    /// Evaluates the two-dimensional function with `coefficients` at `(assets, y_i)`
    /// for income state `income_index`.
    pub fn surface_value(
        &self,
        coefficients: &DVector<f64>,
        assets: f64,
        income_index: usize,
    ) -> Result<f64> {
        let ny = self.nodes.income_count();
        if income_index >= ny {
            return Err(SovereignError::dimension_mismatch(
                "income state",
                ny,
                income_index,
            ));
        }
        if coefficients.len() != self.nodes.len() {
            return Err(SovereignError::dimension_mismatch(
                "surface coefficients",
                self.nodes.len(),
                coefficients.len(),
            ));
        }
        let nb = self.nodes.debt_count();
        let mut income_row = vec![0.0; self.income_basis.len()];
        self.income_basis
            .evaluate_into(self.chain.states()[income_index], &mut income_row);
        let value = income_row
            .iter()
            .enumerate()
            .filter(|(_, weight)| **weight != 0.0)
            .map(|(jy, weight)| {
                let block = &coefficients.as_slice()[jy * nb..(jy + 1) * nb];
                weight * self.debt_basis.interpolate(assets, block)
            })
            .sum::<f64>();
        Ok(value)
    }

    /// Debt-basis coefficients of the continuation value for each income state,
    /// `reshape(omega_e) * Phi_d^T`.
    pub(crate) fn continuation_coefficients(&self, omega_e: &DVector<f64>) -> DMatrix<f64> {
        let nb = self.nodes.debt_count();
        let ny = self.nodes.income_count();
        let blocks = DMatrix::from_column_slice(nb, ny, omega_e.as_slice());
        blocks * self.phi_d.matrix().transpose()
    }

    /// The per-node debt-choice problem given continuation coefficients.
    pub(crate) fn debt_choice_problem<'a>(
        &'a self,
        continuation: &'a DMatrix<f64>,
    ) -> DebtChoiceProblem<'a> {
        DebtChoiceProblem {
            debt_basis: self.debt_basis.as_ref(),
            prices: &self.price_schedule,
            continuation,
            beta: self.params.beta,
            gamma: self.params.gamma,
            lower: self.params.b_low,
            upper: self.params.b_up,
            buffer: self.options.borrowing_buffer,
            tolerance: self.options.golden_tolerance,
        }
    }
}
