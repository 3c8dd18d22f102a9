//! Monte Carlo simulation of income, debt and default from a solved economy.

use log::warn;
use nalgebra::DVector;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::economy::Economy;
use crate::error::{Result, SovereignError};

/// One simulated history. Entry `t` describes period `t`.
#[derive(Clone, Debug, Default)]
pub struct SimulationPath {
    pub income_index: Vec<usize>,
    /// Output actually available, `h(y)` while excluded.
    pub output: Vec<f64>,
    /// Assets at the start of the period.
    pub assets: Vec<f64>,
    /// Next-period assets chosen (zero in periods spent in default or exclusion).
    pub next_assets: Vec<f64>,
    /// The sovereign defaulted in this period.
    pub defaulted: Vec<bool>,
    /// The sovereign had no market access in this period.
    pub excluded: Vec<bool>,
}

impl SimulationPath {
    pub fn len(&self) -> usize {
        self.income_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.income_index.is_empty()
    }

    /// Defaults per period spent with market access.
    pub fn default_frequency(&self) -> f64 {
        let in_market = self
            .excluded
            .iter()
            .zip(self.defaulted.iter())
            .filter(|(excluded, defaulted)| !**excluded || **defaulted)
            .count();
        if in_market == 0 {
            return 0.0;
        }
        self.defaulted.iter().filter(|d| **d).count() as f64 / in_market as f64
    }
}

impl Economy {
    /// Simulates `periods` periods from income state `initial_income` and assets
    /// `initial_assets` with market access, using the current solution.
    ///
    /// A sovereign with access defaults when the default value strictly exceeds the
    /// repayment value, consumes `h(y)` with zero assets while excluded, and regains
    /// access with probability `theta` at the start of each later period.
    pub fn simulate(
        &self,
        periods: usize,
        initial_income: usize,
        initial_assets: f64,
        seed: u64,
    ) -> Result<SimulationPath> {
        let ny = self.nodes.income_count();
        if initial_income >= ny {
            return Err(SovereignError::dimension_mismatch(
                "initial income state",
                ny,
                initial_income,
            ));
        }

        let mut rng = SmallRng::seed_from_u64(seed);
        let continuation = self.continuation_coefficients(&self.solution.omega_e);
        let problem = self.debt_choice_problem(&continuation);
        let default_values: DVector<f64> = self.default_values();
        let incomes = self.chain.states();

        let mut path = SimulationPath::default();
        let mut income = initial_income;
        let mut assets = initial_assets;
        let mut excluded = false;

        for t in 0..periods {
            if excluded && rng.gen::<f64>() < self.params.theta {
                excluded = false;
                assets = 0.0;
            }

            let mut defaulted = false;
            let mut next_assets = 0.0;
            let output;
            if excluded {
                output = self.default_endowment[income];
            } else {
                let repay = self.surface_value(&self.solution.omega_c, assets, income)?;
                if default_values[income] > repay {
                    defaulted = true;
                    excluded = true;
                    output = self.default_endowment[income];
                } else {
                    output = incomes[income];
                    next_assets = match problem.solve_node(t, income, incomes[income], assets) {
                        Ok(choice) => choice.next_assets,
                        Err(_) => {
                            let (lower, upper) = problem.bounds(incomes[income]);
                            warn!(
                                "no feasible debt choice in simulated period {t} (income state \
                                 {income}, assets {assets}): bracket [{lower}, {upper}]; \
                                 clamping to the debt floor"
                            );
                            problem.floor_choice(income, incomes[income], assets).next_assets
                        }
                    };
                }
            }

            path.income_index.push(income);
            path.output.push(output);
            path.assets.push(if excluded && !defaulted { 0.0 } else { assets });
            path.next_assets.push(next_assets);
            path.defaulted.push(defaulted);
            path.excluded.push(excluded);

            assets = next_assets;
            income = self.chain.next_state(income, rng.gen::<f64>());
        }

        Ok(path)
    }
}
